//! 多角色调度：关节合并的拓扑分层与并行更新
//!
//! 合并关系在更新前声明。同一层级的角色互不依赖，用 rayon 并行更新；
//! 父角色总是在更早的层级完成。

use rayon::prelude::*;

use super::Character;
use crate::skeleton::NetTransform;
use crate::{AnimError, Result};

/// 调度器中的角色句柄
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CharacterId(usize);

impl CharacterId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Default)]
pub struct CharacterScheduler {
    characters: Vec<Character>,
    merge_parents: Vec<Option<usize>>,
    /// 按层级分组的角色索引，合并关系变化后重建
    levels: Option<Vec<Vec<usize>>>,
}

impl CharacterScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_character(&mut self, character: Character) -> CharacterId {
        log::info!("调度器加入角色 '{}' (共 {} 个)", character.name, self.characters.len() + 1);
        self.characters.push(character);
        self.merge_parents.push(None);
        self.levels = None;
        CharacterId(self.characters.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.characters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.characters.is_empty()
    }

    pub fn character(&self, id: CharacterId) -> Option<&Character> {
        self.characters.get(id.0)
    }

    pub fn character_mut(&mut self, id: CharacterId) -> Option<&mut Character> {
        self.characters.get_mut(id.0)
    }

    pub fn merge_parent(&self, id: CharacterId) -> Option<CharacterId> {
        self.merge_parents.get(id.0).copied().flatten().map(CharacterId)
    }

    /// 把 `child` 的同名关节合并到 `parent` 上；`None` 解除合并
    pub fn set_merge_parent(&mut self, child: CharacterId, parent: Option<CharacterId>) -> Result<()> {
        if child.0 >= self.characters.len() {
            return Err(AnimError::Merge(format!("角色 {} 不存在", child.0)));
        }
        let Some(parent) = parent else {
            self.merge_parents[child.0] = None;
            self.characters[child.0].set_merge_links(Vec::new());
            self.levels = None;
            return Ok(());
        };
        if parent.0 >= self.characters.len() {
            return Err(AnimError::Merge(format!("角色 {} 不存在", parent.0)));
        }

        // 从父角色向上追溯，碰到子角色即成环
        let mut cursor = Some(parent.0);
        while let Some(current) = cursor {
            if current == child.0 {
                return Err(AnimError::Merge(format!(
                    "角色 '{}' 与 '{}' 的合并关系成环",
                    self.characters[child.0].name, self.characters[parent.0].name
                )));
            }
            cursor = self.merge_parents[current];
        }

        let links: Vec<(usize, usize)> = {
            let child_skeleton = self.characters[child.0].skeleton();
            let parent_skeleton = self.characters[parent.0].skeleton();
            child_skeleton
                .joints()
                .iter()
                .filter_map(|j| parent_skeleton.find_joint(&j.name).map(|p| (j.index, p)))
                .collect()
        };
        if links.is_empty() {
            log::warn!(
                "角色 '{}' 与 '{}' 没有同名关节，合并无效",
                self.characters[child.0].name,
                self.characters[parent.0].name
            );
        }
        self.characters[child.0].set_merge_links(links);
        self.merge_parents[child.0] = Some(parent.0);
        self.levels = None;
        Ok(())
    }

    fn depth(&self, index: usize) -> usize {
        let mut depth = 0;
        let mut cursor = self.merge_parents[index];
        while let Some(parent) = cursor {
            depth += 1;
            cursor = self.merge_parents[parent];
        }
        depth
    }

    /// 拓扑层级：第 0 层没有合并父角色，第 n 层的父角色位于第 n-1 层
    pub fn levels(&mut self) -> &[Vec<usize>] {
        if self.levels.is_none() {
            let mut levels: Vec<Vec<usize>> = Vec::new();
            for index in 0..self.characters.len() {
                let depth = self.depth(index);
                if levels.len() <= depth {
                    levels.resize_with(depth + 1, Vec::new);
                }
                levels[depth].push(index);
            }
            log::debug!("合并调度重建: {} 个层级", levels.len());
            self.levels = Some(levels);
        }
        self.levels.as_deref().unwrap_or(&[])
    }

    /// 推进并合成所有角色
    pub fn update_all(&mut self, dt: f32) {
        let levels = self.levels().to_vec();
        let mut level_of = vec![0; self.characters.len()];
        for (level, members) in levels.iter().enumerate() {
            for &index in members {
                level_of[index] = level;
            }
        }

        for level in 0..levels.len() {
            // 父角色在更早的层级已经完成，先取出它们的净变换
            let parent_nets: Vec<Option<Vec<NetTransform>>> = self
                .merge_parents
                .iter()
                .enumerate()
                .map(|(index, parent)| match parent {
                    Some(p) if level_of[index] == level => Some(self.characters[*p].net_transforms().to_vec()),
                    _ => None,
                })
                .collect();

            self.characters
                .par_iter_mut()
                .zip(parent_nets.par_iter())
                .enumerate()
                .filter(|(index, _)| level_of[*index] == level)
                .for_each(|(_, (character, parent_net))| {
                    character.update(dt);
                    if let Some(net) = parent_net {
                        character.apply_merge(net);
                    }
                });
        }
    }
}
