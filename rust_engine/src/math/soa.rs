//! SoA 向量与四元数（W = 4）

use glam::{Quat, Vec3};
use std::ops::{Add, Mul, Sub};
use wide::{f32x4, CmpLt};

use super::EPSILON;

/// SIMD 宽度：每组关节数
pub const SIMD_WIDTH: usize = 4;

/// W 路标量
pub type SoaFloat = f32x4;

#[inline]
fn splat(v: f32) -> f32x4 {
    f32x4::splat(v)
}

#[inline]
fn write_lane(v: &mut f32x4, lane: usize, value: f32) {
    let mut arr = v.to_array();
    arr[lane] = value;
    *v = f32x4::from(arr);
}

/// W 个三维向量
#[derive(Clone, Copy, Debug)]
pub struct SoaVec3 {
    pub x: f32x4,
    pub y: f32x4,
    pub z: f32x4,
}

impl SoaVec3 {
    pub fn splat(v: Vec3) -> Self {
        Self {
            x: splat(v.x),
            y: splat(v.y),
            z: splat(v.z),
        }
    }

    pub fn zero() -> Self {
        Self::splat(Vec3::ZERO)
    }

    pub fn one() -> Self {
        Self::splat(Vec3::ONE)
    }

    /// 读取第 `lane` 个分量
    pub fn lane(&self, lane: usize) -> Vec3 {
        Vec3::new(
            self.x.to_array()[lane],
            self.y.to_array()[lane],
            self.z.to_array()[lane],
        )
    }

    pub fn set_lane(&mut self, lane: usize, v: Vec3) {
        write_lane(&mut self.x, lane, v.x);
        write_lane(&mut self.y, lane, v.y);
        write_lane(&mut self.z, lane, v.z);
    }

    pub fn scale(self, s: f32x4) -> Self {
        Self {
            x: self.x * s,
            y: self.y * s,
            z: self.z * s,
        }
    }

    /// self + other * s
    pub fn mul_add(self, other: Self, s: f32x4) -> Self {
        Self {
            x: other.x.mul_add(s, self.x),
            y: other.y.mul_add(s, self.y),
            z: other.z.mul_add(s, self.z),
        }
    }

    /// 线性插值，t = 0 返回 self
    pub fn lerp(self, other: Self, t: f32x4) -> Self {
        self.mul_add(other - self, t)
    }

    pub fn dot(self, other: Self) -> f32x4 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }
}

impl Add for SoaVec3 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
            z: self.z + rhs.z,
        }
    }
}

impl Sub for SoaVec3 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
            z: self.z - rhs.z,
        }
    }
}

/// W 个四元数
///
/// 输入默认为单位四元数；`lerp` 不做归一化，需要单位长度的调用方自己调用
/// [`SoaQuat::normalize`]。
#[derive(Clone, Copy, Debug)]
pub struct SoaQuat {
    pub x: f32x4,
    pub y: f32x4,
    pub z: f32x4,
    pub w: f32x4,
}

impl SoaQuat {
    pub fn identity() -> Self {
        Self::splat(Quat::IDENTITY)
    }

    pub fn splat(q: Quat) -> Self {
        Self {
            x: splat(q.x),
            y: splat(q.y),
            z: splat(q.z),
            w: splat(q.w),
        }
    }

    pub fn lane(&self, lane: usize) -> Quat {
        Quat::from_xyzw(
            self.x.to_array()[lane],
            self.y.to_array()[lane],
            self.z.to_array()[lane],
            self.w.to_array()[lane],
        )
    }

    pub fn set_lane(&mut self, lane: usize, q: Quat) {
        write_lane(&mut self.x, lane, q.x);
        write_lane(&mut self.y, lane, q.y);
        write_lane(&mut self.z, lane, q.z);
        write_lane(&mut self.w, lane, q.w);
    }

    pub fn dot(self, other: Self) -> f32x4 {
        self.x * other.x + self.y * other.y + self.z * other.z + self.w * other.w
    }

    fn scale(self, s: f32x4) -> Self {
        Self {
            x: self.x * s,
            y: self.y * s,
            z: self.z * s,
            w: self.w * s,
        }
    }

    pub fn conjugate(self) -> Self {
        let zero = splat(0.0);
        Self {
            x: zero - self.x,
            y: zero - self.y,
            z: zero - self.z,
            w: self.w,
        }
    }

    /// 翻转与 `reference` 点积为负的分量，使插值走短弧
    pub fn align(self, reference: Self) -> Self {
        let sign = self
            .dot(reference)
            .cmp_lt(splat(0.0))
            .blend(splat(-1.0), splat(1.0));
        self.scale(sign)
    }

    /// 对齐后逐分量线性插值（不归一化）
    pub fn lerp(self, other: Self, t: f32x4) -> Self {
        let b = other.align(self);
        Self {
            x: (b.x - self.x).mul_add(t, self.x),
            y: (b.y - self.y).mul_add(t, self.y),
            z: (b.z - self.z).mul_add(t, self.z),
            w: (b.w - self.w).mul_add(t, self.w),
        }
    }

    pub fn nlerp(self, other: Self, t: f32x4) -> Self {
        self.lerp(other, t).normalize()
    }

    /// 对齐后球面插值
    ///
    /// 三角函数逐通道交给 glam 计算，批量只负责对齐。
    pub fn slerp(self, other: Self, t: f32x4) -> Self {
        let b = other.align(self);
        let t = t.to_array();
        let mut out = self;
        for lane in 0..SIMD_WIDTH {
            out.set_lane(lane, self.lane(lane).slerp(b.lane(lane), t[lane]));
        }
        out
    }

    /// 归一化；接近零长度的分量回退为单位四元数
    pub fn normalize(self) -> Self {
        let len2 = self.dot(self);
        let degenerate = len2.cmp_lt(splat(EPSILON));
        let inv = splat(1.0) / len2.max(splat(EPSILON)).sqrt();
        let n = self.scale(inv);
        Self {
            x: degenerate.blend(splat(0.0), n.x),
            y: degenerate.blend(splat(0.0), n.y),
            z: degenerate.blend(splat(0.0), n.z),
            w: degenerate.blend(splat(1.0), n.w),
        }
    }

    /// base * (identity → delta 按 s 缩放)
    pub fn accumulate_scaled_rhs(self, delta: Self, s: f32x4) -> Self {
        self * Self::identity().nlerp(delta, s)
    }

    /// (identity → delta 按 s 缩放) * base
    pub fn accumulate_scaled_lhs(self, delta: Self, s: f32x4) -> Self {
        Self::identity().nlerp(delta, s) * self
    }
}

impl Mul for SoaQuat {
    type Output = Self;

    /// Hamilton 乘积，与 `glam::Quat` 的乘法顺序一致
    fn mul(self, b: Self) -> Self {
        let a = self;
        Self {
            w: a.w * b.w - a.x * b.x - a.y * b.y - a.z * b.z,
            x: a.w * b.x + a.x * b.w + a.y * b.z - a.z * b.y,
            y: a.w * b.y - a.x * b.z + a.y * b.w + a.z * b.x,
            z: a.w * b.z + a.x * b.y - a.y * b.x + a.z * b.w,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quat_close(a: Quat, b: Quat) -> bool {
        (a.x - b.x).abs() < 1e-5
            && (a.y - b.y).abs() < 1e-5
            && (a.z - b.z).abs() < 1e-5
            && (a.w - b.w).abs() < 1e-5
    }

    fn sample_quats() -> (Quat, Quat) {
        (
            Quat::from_rotation_y(0.7),
            Quat::from_euler(glam::EulerRot::XYZ, 0.3, -0.4, 1.1),
        )
    }

    #[test]
    fn test_mul_matches_glam() {
        let (a, b) = sample_quats();
        let r = SoaQuat::splat(a) * SoaQuat::splat(b);
        for lane in 0..SIMD_WIDTH {
            assert!(quat_close(r.lane(lane), a * b));
        }
    }

    #[test]
    fn test_lane_roundtrip_is_isolated() {
        let mut v = SoaVec3::zero();
        v.set_lane(2, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(v.lane(2), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(v.lane(1), Vec3::ZERO);
    }

    #[test]
    fn test_align_takes_short_arc() {
        let (a, _) = sample_quats();
        let flipped = SoaQuat::splat(-a).align(SoaQuat::splat(a));
        assert!(quat_close(flipped.lane(0), a));
    }

    #[test]
    fn test_lerp_endpoints() {
        let (a, b) = sample_quats();
        let qa = SoaQuat::splat(a);
        let qb = SoaQuat::splat(b);
        assert!(quat_close(qa.lerp(qb, splat(0.0)).lane(0), a));
        assert!(quat_close(qa.lerp(qb, splat(1.0)).lane(0), b));
    }

    #[test]
    fn test_slerp_matches_glam() {
        let (a, b) = sample_quats();
        let r = SoaQuat::splat(a).slerp(SoaQuat::splat(b), splat(0.25));
        assert!(quat_close(r.lane(3), a.slerp(b, 0.25)));
    }

    #[test]
    fn test_accumulate_scaled() {
        let (a, b) = sample_quats();
        let base = SoaQuat::splat(a);
        let delta = SoaQuat::splat(b);
        assert!(quat_close(base.accumulate_scaled_rhs(delta, splat(0.0)).lane(0), a));
        assert!(quat_close(base.accumulate_scaled_rhs(delta, splat(1.0)).lane(0), a * b));
        assert!(quat_close(base.accumulate_scaled_lhs(delta, splat(1.0)).lane(0), b * a));
    }

    #[test]
    fn test_normalize_degenerate_lane() {
        let mut q = SoaQuat::splat(Quat::from_xyzw(0.0, 0.0, 0.0, 2.0));
        q.set_lane(1, Quat::from_xyzw(0.0, 0.0, 0.0, 0.0));
        let n = q.normalize();
        assert!(quat_close(n.lane(0), Quat::IDENTITY));
        assert!(quat_close(n.lane(1), Quat::IDENTITY));
    }

    #[test]
    fn test_vec_lerp() {
        let a = SoaVec3::splat(Vec3::ZERO);
        let b = SoaVec3::splat(Vec3::new(2.0, 4.0, -2.0));
        let m = a.lerp(b, splat(0.5));
        assert!((m.lane(0) - Vec3::new(1.0, 2.0, -1.0)).length() < 1e-6);
    }
}
