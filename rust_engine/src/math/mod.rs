//! 批量姿态数学
//!
//! 以 SoA（structure-of-arrays）方式一次处理 [`SIMD_WIDTH`] 个关节，
//! 所有通道求值与混合都建立在这一层之上。

mod group;
mod soa;

pub use group::{read_joint, write_joint, JointGroup};
pub use soa::{SoaFloat, SoaQuat, SoaVec3, SIMD_WIDTH};

/// 可忽略的浮点量
pub const EPSILON: f32 = 1e-6;

/// 计算容纳 `joint_count` 个关节需要的 SIMD 组数
pub fn group_count(joint_count: usize) -> usize {
    (joint_count + SIMD_WIDTH - 1) / SIMD_WIDTH
}

/// 3s² − 2s³ 平滑插值
pub fn smooth_step(s: f32) -> f32 {
    let s = s.clamp(0.0, 1.0);
    s * s * (3.0 - 2.0 * s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_count() {
        assert_eq!(group_count(0), 0);
        assert_eq!(group_count(1), 1);
        assert_eq!(group_count(4), 1);
        assert_eq!(group_count(5), 2);
    }

    #[test]
    fn test_smooth_step_endpoints() {
        assert_eq!(smooth_step(0.0), 0.0);
        assert_eq!(smooth_step(1.0), 1.0);
        assert!((smooth_step(0.5) - 0.5).abs() < 1e-6);
    }
}
