//! 通道与角色骨架之间的名字绑定
//!
//! 通道树加入角色时按名字一次性解析，之后的每帧求值只查索引。
//! 找不到的关节映射为 -1，所有求值路径都跳过它们。

use std::collections::HashMap;
use std::sync::Arc;

use wide::f32x4;

use crate::animation::{Channel, ChannelId, IkEventKind};
use crate::math::{group_count, SIMD_WIDTH};
use crate::skeleton::Skeleton;

/// 单个 (角色, 通道) 的绑定
#[derive(Clone, Debug)]
pub struct ChannelBinding {
    /// 通道关节 → 角色关节
    pub joint_map: Vec<i32>,
    /// 通道滑杆 → 角色滑杆
    pub slider_map: Vec<i32>,
    /// 按角色关节分组的混合权重
    pub group_mask: Vec<f32x4>,
    /// 所有角色关节权重都为 1
    pub unmasked: bool,
    /// 按 IK 事件索引解析出的接触关节
    pub ik_touch_joints: Vec<i32>,
}

impl ChannelBinding {
    /// 解析叶子通道或组合通道的绑定
    pub fn build(skeleton: &Skeleton, sliders: &[String], channel: &Channel) -> Self {
        let joint_count = skeleton.joint_count();
        let groups = group_count(joint_count);
        let header = &channel.header;

        let slider_map = header
            .slider_names
            .iter()
            .map(|name| match sliders.iter().position(|s| s == name) {
                Some(i) => i as i32,
                None => {
                    log::warn!("通道 '{}' 的滑杆 '{}' 在角色上不存在", channel.name, name);
                    -1
                }
            })
            .collect();

        let ik_touch_joints = header
            .ik_events
            .iter()
            .map(|event| match &event.kind {
                IkEventKind::Touch { joint } => match skeleton.find_joint(joint) {
                    Some(i) => i as i32,
                    None => {
                        log::warn!("通道 '{}' 的接触关节 '{}' 在角色上不存在", channel.name, joint);
                        -1
                    }
                },
                IkEventKind::Lock => -1,
            })
            .collect();

        // 组合通道没有自己的关节，覆盖整个骨架
        if header.joint_names.is_empty() {
            let mut weights = vec![0.0; groups * SIMD_WIDTH];
            weights[..joint_count].fill(1.0);
            return Self {
                joint_map: Vec::new(),
                slider_map,
                group_mask: pack_lanes(&weights),
                unmasked: true,
                ik_touch_joints,
            };
        }

        let mut weights = vec![0.0; groups * SIMD_WIDTH];
        let joint_map: Vec<i32> = header
            .joint_names
            .iter()
            .enumerate()
            .map(|(i, name)| match skeleton.find_joint(name) {
                Some(target) => {
                    weights[target] = header.weight_mask.as_ref().map_or(1.0, |m| m[i]);
                    target as i32
                }
                None => {
                    log::warn!("通道 '{}' 的关节 '{}' 在角色上不存在", channel.name, name);
                    -1
                }
            })
            .collect();

        let unbound = weights[..joint_count].iter().filter(|&&w| w == 0.0).count();
        if unbound > 0 {
            log::debug!("通道 '{}' 未驱动角色的 {} 个关节", channel.name, unbound);
        }
        let unmasked = weights[..joint_count].iter().all(|&w| w >= 1.0);

        Self {
            joint_map,
            slider_map,
            group_mask: pack_lanes(&weights),
            unmasked,
            ik_touch_joints,
        }
    }

    /// 角色关节的混合权重
    pub fn joint_weight(&self, joint: usize) -> f32 {
        self.group_mask
            .get(joint / SIMD_WIDTH)
            .map_or(0.0, |g| g.to_array()[joint % SIMD_WIDTH])
    }

    pub fn touch_joint(&self, event: usize) -> Option<usize> {
        self.ik_touch_joints
            .get(event)
            .and_then(|&j| usize::try_from(j).ok())
    }
}

fn pack_lanes(weights: &[f32]) -> Vec<f32x4> {
    weights
        .chunks_exact(SIMD_WIDTH)
        .map(|c| f32x4::from([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// 一个角色上所有通道的绑定
#[derive(Debug, Default)]
pub struct BindingTable {
    bindings: HashMap<ChannelId, ChannelBinding>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 绑定整棵通道树，已绑定的通道跳过
    pub fn bind_tree(&mut self, skeleton: &Skeleton, sliders: &[String], root: &Arc<Channel>) {
        if self.bindings.contains_key(&root.id()) {
            return;
        }
        self.bindings
            .insert(root.id(), ChannelBinding::build(skeleton, sliders, root));
        for child in root.children() {
            self.bind_tree(skeleton, sliders, child);
        }
    }

    pub fn get(&self, id: ChannelId) -> Option<&ChannelBinding> {
        self.bindings.get(&id)
    }

    pub fn contains(&self, id: ChannelId) -> bool {
        self.bindings.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
