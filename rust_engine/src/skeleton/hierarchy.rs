//! 骨架层级

use std::collections::HashMap;

use super::{Joint, JointTransform, NetTransform};
use crate::math::{group_count, read_joint, write_joint, JointGroup};
use crate::{AnimError, Result};

/// 单个骨架允许的最大关节数
pub const MAX_JOINTS: usize = 256;

/// 角色的关节数组
///
/// 父关节总是排在子关节之前，因此按索引顺序遍历即为自顶向下。
#[derive(Clone, Debug)]
pub struct Skeleton {
    joints: Vec<Joint>,
    name_to_index: HashMap<String, usize>,
    bind_groups: Vec<JointGroup>,
}

impl Skeleton {
    /// 构建骨架，校验关节数与父子顺序
    pub fn new(mut joints: Vec<Joint>) -> Result<Self> {
        if joints.len() > MAX_JOINTS {
            return Err(AnimError::TooManyJoints {
                count: joints.len(),
                max: MAX_JOINTS,
            });
        }

        let mut name_to_index = HashMap::with_capacity(joints.len());
        for i in 0..joints.len() {
            joints[i].index = i;
            joints[i].children.clear();
            let parent = joints[i].parent_index;
            if parent >= i as i32 {
                return Err(AnimError::Skeleton(format!(
                    "关节 '{}' 的父关节 {} 必须排在它之前",
                    joints[i].name, parent
                )));
            }
            if parent >= 0 {
                joints[parent as usize].children.push(i);
            }
            if name_to_index.insert(joints[i].name.clone(), i).is_some() {
                log::warn!("骨架中存在重名关节 '{}'，按名称查找将命中最后一个", joints[i].name);
            }
        }

        let mut bind_groups = vec![JointGroup::identity(); group_count(joints.len())];
        for joint in &joints {
            write_joint(&mut bind_groups, joint.index, &joint.bind);
        }

        Ok(Self {
            joints,
            name_to_index,
            bind_groups,
        })
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    pub fn group_count(&self) -> usize {
        self.bind_groups.len()
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn joint(&self, index: usize) -> Option<&Joint> {
        self.joints.get(index)
    }

    /// 通过名称查找关节
    pub fn find_joint(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    pub fn parent(&self, index: usize) -> Option<usize> {
        self.joints.get(index).and_then(Joint::parent)
    }

    /// SoA 形式的绑定姿态
    pub fn bind_groups(&self) -> &[JointGroup] {
        &self.bind_groups
    }

    pub fn bind_transform(&self, index: usize) -> JointTransform {
        self.joints
            .get(index)
            .map(|j| j.bind)
            .unwrap_or_default()
    }

    /// 由局部姿态计算全部关节的净变换
    pub fn compute_net_transforms(&self, groups: &[JointGroup], out: &mut Vec<NetTransform>) {
        out.clear();
        out.reserve(self.joints.len());
        for joint in &self.joints {
            let local = read_joint(groups, joint.index);
            let net = match joint.parent() {
                Some(parent) => out[parent].compose(&local),
                None => NetTransform::IDENTITY.compose(&local),
            };
            out.push(net);
        }
    }

    /// 只计算单个关节的净变换（沿父链递归）
    pub fn net_transform(&self, groups: &[JointGroup], index: usize) -> NetTransform {
        let local = read_joint(groups, index);
        match self.parent(index) {
            Some(parent) => self.net_transform(groups, parent).compose(&local),
            None => NetTransform::IDENTITY.compose(&local),
        }
    }

    /// 父关节的净变换，根关节返回单位变换
    pub fn parent_net_transform(&self, groups: &[JointGroup], index: usize) -> NetTransform {
        match self.parent(index) {
            Some(parent) => self.net_transform(groups, parent),
            None => NetTransform::IDENTITY,
        }
    }
}
