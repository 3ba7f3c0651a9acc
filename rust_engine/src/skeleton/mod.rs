//! 骨架：关节层级、绑定姿态、网格无关的净变换，以及两骨 IK 求解

mod hierarchy;
mod ik_solver;
mod joint;

pub use hierarchy::{Skeleton, MAX_JOINTS};
pub use ik_solver::{solve_two_bone, IkAnchor, IkChain, TwoBoneSolution};
pub use joint::Joint;

use glam::{Quat, Vec3};

/// 关节局部变换（位置、旋转、缩放、错切）
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JointTransform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    /// 错切系数 (xy, xz, yz)
    pub shear: Vec3,
}

impl Default for JointTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl JointTransform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
        shear: Vec3::ZERO,
    };

    pub fn from_translation_rotation(translation: Vec3, rotation: Quat) -> Self {
        Self {
            translation,
            rotation,
            ..Self::IDENTITY
        }
    }
}

/// 模型空间下的净变换
///
/// 组合时忽略错切，IK 与关节合并只关心位置和朝向。
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NetTransform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for NetTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl NetTransform {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    /// parent * local
    pub fn compose(&self, local: &JointTransform) -> Self {
        Self {
            position: self.position + self.rotation * (self.scale * local.translation),
            rotation: (self.rotation * local.rotation).normalize(),
            scale: self.scale * local.scale,
        }
    }

    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        self.position + self.rotation * (self.scale * p)
    }

    /// 以 self 为参考系表示 `other`（只含位置和旋转）
    pub fn relative(&self, other: &NetTransform) -> (Vec3, Quat) {
        let inv = self.rotation.inverse();
        let offset = inv * (other.position - self.position) / self.scale.max(Vec3::splat(1e-6));
        (offset, inv * other.rotation)
    }

    /// `relative` 的逆运算
    pub fn reanchor(&self, offset: Vec3, rotation: Quat) -> (Vec3, Quat) {
        (self.transform_point(offset), (self.rotation * rotation).normalize())
    }

    /// 把模型空间净变换转换为相对本节点的局部变换
    pub fn to_local(&self, child: &NetTransform) -> JointTransform {
        let (translation, rotation) = self.relative(child);
        JointTransform {
            translation,
            rotation: rotation.normalize(),
            scale: child.scale / self.scale.max(Vec3::splat(1e-6)),
            shear: Vec3::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_reanchor_inverse() {
        let anchor = NetTransform {
            position: Vec3::new(1.0, 2.0, 3.0),
            rotation: Quat::from_rotation_z(0.8),
            scale: Vec3::ONE,
        };
        let target = NetTransform {
            position: Vec3::new(-1.0, 0.5, 2.0),
            rotation: Quat::from_rotation_x(0.3),
            scale: Vec3::ONE,
        };
        let (offset, rot) = anchor.relative(&target);
        let (p, q) = anchor.reanchor(offset, rot);
        assert!((p - target.position).length() < 1e-5);
        assert!(q.dot(target.rotation).abs() > 0.99999);
    }

    #[test]
    fn test_to_local_recomposes() {
        let parent = NetTransform {
            position: Vec3::new(0.0, 1.0, 0.0),
            rotation: Quat::from_rotation_y(1.2),
            scale: Vec3::ONE,
        };
        let local = JointTransform::from_translation_rotation(
            Vec3::new(0.0, 0.0, 2.0),
            Quat::from_rotation_x(0.4),
        );
        let child = parent.compose(&local);
        let back = parent.to_local(&child);
        assert!((back.translation - local.translation).length() < 1e-5);
        assert!(back.rotation.dot(local.rotation).abs() > 0.99999);
    }
}
