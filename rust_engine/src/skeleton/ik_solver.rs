//! 两骨解析 IK 求解器

use glam::{Quat, Vec3};

use super::{NetTransform, Skeleton};
use crate::math::{read_joint, write_joint, JointGroup, EPSILON};
use crate::{AnimError, Result};

/// 目标距离上限系数，避免完全伸直的奇异构型
const MAX_REACH_SCALE: f32 = 0.9998;
/// 目标距离下限系数，避免完全折叠的奇异构型
const MIN_REACH_DIFF_SCALE: f32 = 1.15;
const MIN_REACH_SHORT_SCALE: f32 = 0.15;

/// 两骨求解结果，相对近端关节的位置
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TwoBoneSolution {
    pub middle: Vec3,
    pub end: Vec3,
}

/// 解析求解两骨链
///
/// `l1` 为近端到中间关节的长度，`l2` 为中间到远端的长度，`target` 为相对近端
/// 关节的目标位置。`preferred` 给出中间关节弯曲的偏好方向，缺省或与目标轴
/// 共线时任取一个垂直方向。前置条件不满足时返回 `None`，调用方保持原姿态。
pub fn solve_two_bone(l1: f32, l2: f32, target: Vec3, preferred: Option<Vec3>) -> Option<TwoBoneSolution> {
    if l1 <= EPSILON || l2 <= EPSILON {
        return None;
    }
    let dist = target.length();
    if dist <= EPSILON {
        return None;
    }

    let max_reach = (l1 + l2) * MAX_REACH_SCALE;
    let min_reach = ((l1 - l2).abs() * MIN_REACH_DIFF_SCALE).max(l1.min(l2) * MIN_REACH_SHORT_SCALE);
    if min_reach > max_reach {
        return None;
    }
    let c = dist.clamp(min_reach, max_reach);
    let axis = target / dist;

    // 圆-圆求交：d 为中间关节在目标轴上的投影，e 为到轴的距离
    let d = (c + (l1 * l1 - l2 * l2) / c) * 0.5;
    if d <= c - l2 || d >= l1 {
        return None;
    }
    let e = (l1 * l1 - d * d).max(0.0).sqrt();

    let bend = preferred
        .map(|p| p - axis * p.dot(axis))
        .filter(|p| p.length_squared() > EPSILON)
        .map(Vec3::normalize)
        .unwrap_or_else(|| axis.any_orthonormal_vector());

    Some(TwoBoneSolution {
        middle: axis * d + bend * e,
        end: axis * c,
    })
}

/// 退化求解时的锚定参数
#[derive(Clone, Debug, PartialEq)]
pub struct IkAnchor {
    /// 模型空间中的参考中心
    pub center: Vec3,
    /// 参考点相对中心的高度
    pub height: f32,
    /// 目标高度下限（地面），`None` 表示不夹取
    pub floor: Option<f32>,
    /// 地面之上的额外留白
    pub pad: f32,
}

impl Default for IkAnchor {
    fn default() -> Self {
        Self {
            center: Vec3::ZERO,
            height: 0.0,
            floor: None,
            pad: 0.0,
        }
    }
}

/// 三关节 IK 链（近端 → 中间 → 远端）
#[derive(Clone, Debug)]
pub struct IkChain {
    pub name: String,
    pub joints: [usize; 3],
    /// 近端关节局部空间中的膝盖弯曲方向
    pub knee_dir: Vec3,
    pub anchor: IkAnchor,
}

impl IkChain {
    /// 创建 IK 链，要求三个关节依次为父子关系
    pub fn new(skeleton: &Skeleton, name: impl Into<String>, joints: [usize; 3], knee_dir: Vec3) -> Result<Self> {
        let name = name.into();
        for &j in &joints {
            if j >= skeleton.joint_count() {
                return Err(AnimError::IkChain(format!("链 '{}' 引用了不存在的关节 {}", name, j)));
            }
        }
        if skeleton.parent(joints[1]) != Some(joints[0]) || skeleton.parent(joints[2]) != Some(joints[1]) {
            return Err(AnimError::IkChain(format!("链 '{}' 的关节 {:?} 不是连续的父子链", name, joints)));
        }
        Ok(Self {
            name,
            joints,
            knee_dir,
            anchor: IkAnchor::default(),
        })
    }

    pub fn with_anchor(mut self, anchor: IkAnchor) -> Self {
        self.anchor = anchor;
        self
    }

    pub fn end_joint(&self) -> usize {
        self.joints[2]
    }

    /// 地面夹取
    pub fn clamp_target(&self, target: Vec3) -> Vec3 {
        match self.anchor.floor {
            Some(floor) => Vec3::new(target.x, target.y.max(floor + self.anchor.pad), target.z),
            None => target,
        }
    }

    fn preferred_direction(&self, n0: &NetTransform, n1: &NetTransform, axis: Vec3) -> Vec3 {
        let off_axis = |v: Vec3| v - axis * v.dot(axis);

        let current = off_axis(n1.position - n0.position);
        if current.length_squared() > EPSILON {
            return current;
        }
        let knee = off_axis(n0.rotation * self.knee_dir);
        if knee.length_squared() > EPSILON {
            return knee;
        }
        off_axis(self.anchor.center + Vec3::Y * self.anchor.height - n0.position)
    }

    /// 把远端关节拉向 `target_pos`，按 `weight` 把结果混入局部姿态
    ///
    /// `target_rot` 给定时远端关节的净旋转被恢复为该值。求解失败返回 false，
    /// 姿态保持不变。
    pub fn solve(
        &self,
        skeleton: &Skeleton,
        groups: &mut [JointGroup],
        target_pos: Vec3,
        target_rot: Option<Quat>,
        weight: f32,
    ) -> bool {
        let [j0, j1, j2] = self.joints;
        debug_assert!(j2 < skeleton.joint_count());
        if j2 >= skeleton.joint_count() || weight <= 0.0 {
            return false;
        }

        let parent = skeleton.parent_net_transform(groups, j0);
        let local0 = read_joint(groups, j0);
        let local1 = read_joint(groups, j1);
        let local2 = read_joint(groups, j2);
        let n0 = parent.compose(&local0);
        let n1 = n0.compose(&local1);
        let n2 = n1.compose(&local2);

        let l1 = (n1.position - n0.position).length();
        let l2 = (n2.position - n1.position).length();
        let target = self.clamp_target(target_pos) - n0.position;
        let axis = target.normalize_or_zero();
        let preferred = self.preferred_direction(&n0, &n1, axis);

        let Some(solution) = solve_two_bone(l1, l2, target, Some(preferred)) else {
            return false;
        };

        let new_mid = n0.position + solution.middle;
        let new_end = n0.position + solution.end;

        let r0 = arc(n1.position - n0.position, new_mid - n0.position);
        let rot0 = (r0 * n0.rotation).normalize();
        let r1 = arc(r0 * (n2.position - n1.position), new_end - new_mid);
        let rot1 = (r1 * r0 * n1.rotation).normalize();
        let rot2 = target_rot.unwrap_or(r1 * r0 * n2.rotation).normalize();

        let solved = [
            (j0, local0, parent.rotation.inverse() * rot0),
            (j1, local1, rot0.inverse() * rot1),
            (j2, local2, rot1.inverse() * rot2),
        ];
        let weight = weight.min(1.0);
        for (joint, mut local, rotation) in solved {
            local.rotation = local.rotation.lerp(rotation.normalize(), weight);
            write_joint(groups, joint, &local);
        }
        true
    }
}

/// 把 `from` 方向转到 `to` 方向的最小旋转
fn arc(from: Vec3, to: Vec3) -> Quat {
    let from = from.normalize_or_zero();
    let to = to.normalize_or_zero();
    if from == Vec3::ZERO || to == Vec3::ZERO {
        return Quat::IDENTITY;
    }
    Quat::from_rotation_arc(from, to)
}
