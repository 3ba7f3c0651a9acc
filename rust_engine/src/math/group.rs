//! 一组 W 个关节的 SoA 变换

use wide::f32x4;

use super::{SoaQuat, SoaVec3};
use crate::skeleton::JointTransform;

/// W 个关节的位置、旋转、缩放与错切
#[derive(Clone, Copy, Debug)]
pub struct JointGroup {
    pub translation: SoaVec3,
    pub rotation: SoaQuat,
    pub scale: SoaVec3,
    pub shear: SoaVec3,
}

impl Default for JointGroup {
    fn default() -> Self {
        Self::identity()
    }
}

impl JointGroup {
    pub fn identity() -> Self {
        Self {
            translation: SoaVec3::zero(),
            rotation: SoaQuat::identity(),
            scale: SoaVec3::one(),
            shear: SoaVec3::zero(),
        }
    }

    pub fn get(&self, lane: usize) -> JointTransform {
        JointTransform {
            translation: self.translation.lane(lane),
            rotation: self.rotation.lane(lane),
            scale: self.scale.lane(lane),
            shear: self.shear.lane(lane),
        }
    }

    pub fn set(&mut self, lane: usize, xf: &JointTransform) {
        self.translation.set_lane(lane, xf.translation);
        self.rotation.set_lane(lane, xf.rotation);
        self.scale.set_lane(lane, xf.scale);
        self.shear.set_lane(lane, xf.shear);
    }

    /// 位置/缩放/错切线性插值，旋转对齐插值
    pub fn lerp(&self, other: &Self, t: f32x4) -> Self {
        Self {
            translation: self.translation.lerp(other.translation, t),
            rotation: self.rotation.lerp(other.rotation, t),
            scale: self.scale.lerp(other.scale, t),
            shear: self.shear.lerp(other.shear, t),
        }
    }
}

/// 按关节索引读取
pub fn read_joint(groups: &[JointGroup], joint: usize) -> JointTransform {
    groups[joint / super::SIMD_WIDTH].get(joint % super::SIMD_WIDTH)
}

/// 按关节索引写入
pub fn write_joint(groups: &mut [JointGroup], joint: usize, xf: &JointTransform) {
    groups[joint / super::SIMD_WIDTH].set(joint % super::SIMD_WIDTH, xf);
}
