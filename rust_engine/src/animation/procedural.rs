//! 程序姿态通道：由外部代码直接写入的单帧姿态

use std::sync::RwLock;

use super::PoseBuffer;
use crate::math::write_joint;
use crate::model::ChannelBinding;
use crate::skeleton::JointTransform;

/// 程序姿态
///
/// 姿态放在 `RwLock` 后面，共享的 `Arc<Channel>` 也能在帧与帧之间被修改；
/// 求值只取读锁。
#[derive(Debug)]
pub struct ProceduralChannel {
    pose: RwLock<Vec<JointTransform>>,
}

impl ProceduralChannel {
    pub fn new(pose: Vec<JointTransform>) -> Self {
        Self { pose: RwLock::new(pose) }
    }

    pub fn identity(joint_count: usize) -> Self {
        Self::new(vec![JointTransform::IDENTITY; joint_count])
    }

    pub fn joint_count(&self) -> usize {
        self.pose.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// 写入单个关节，索引越界返回 false
    pub fn set_joint(&self, index: usize, xf: JointTransform) -> bool {
        let mut pose = self.pose.write().unwrap_or_else(|e| e.into_inner());
        match pose.get_mut(index) {
            Some(slot) => {
                *slot = xf;
                true
            }
            None => false,
        }
    }

    /// 整体替换姿态，长度必须与原姿态一致
    pub fn set_pose(&self, xfs: &[JointTransform]) -> bool {
        let mut pose = self.pose.write().unwrap_or_else(|e| e.into_inner());
        if pose.len() != xfs.len() {
            log::warn!("程序姿态长度不匹配: 期望 {}, 实际 {}", pose.len(), xfs.len());
            return false;
        }
        pose.copy_from_slice(xfs);
        true
    }

    pub fn joint(&self, index: usize) -> Option<JointTransform> {
        self.pose.read().unwrap_or_else(|e| e.into_inner()).get(index).copied()
    }

    pub fn write_pose(&self, binding: Option<&ChannelBinding>, out: &mut PoseBuffer) {
        let Some(binding) = binding else {
            return;
        };
        let pose = self.pose.read().unwrap_or_else(|e| e.into_inner());
        for (xf, &target) in pose.iter().zip(&binding.joint_map) {
            if target >= 0 {
                write_joint(out.groups_mut(), target as usize, xf);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};

    #[test]
    fn test_set_joint_bounds() {
        let p = ProceduralChannel::identity(3);
        let xf = JointTransform::from_translation_rotation(Vec3::X, Quat::IDENTITY);
        assert!(p.set_joint(2, xf));
        assert!(!p.set_joint(3, xf));
        assert_eq!(p.joint(2).unwrap().translation, Vec3::X);
    }

    #[test]
    fn test_set_pose_requires_same_length() {
        let p = ProceduralChannel::identity(2);
        assert!(!p.set_pose(&[JointTransform::IDENTITY]));
        let xf = JointTransform::from_translation_rotation(Vec3::Y, Quat::IDENTITY);
        assert!(p.set_pose(&[xf, xf]));
        assert_eq!(p.joint(0).unwrap().translation, Vec3::Y);
    }
}
