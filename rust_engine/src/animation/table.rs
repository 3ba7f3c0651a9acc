//! 关键帧表通道
//!
//! 存储布局：
//! - 每个关节一个 12 位分量掩码
//! - 第 0 帧为每个关节存全部 12 个分量（静止值），顺序为
//!   x, y, z, 半角正弦 h, p, r, 缩放 i, j, k, 错切 a, b, c
//! - 之后每帧只存掩码中置位的分量，按位序紧密排列，关节按声明顺序首尾相接
//!
//! 旋转以四元数虚部（半角正弦）存储，w 分量由单位长度恢复并取非负。

use bitflags::bitflags;
use glam::{Quat, Vec3};
use wide::f32x4;

use super::{CycleWindow, EvalContext, PlayMode, PoseBuffer};
use crate::math::{write_joint, JointGroup};
use crate::model::ChannelBinding;
use crate::skeleton::JointTransform;
use crate::{AnimError, Result};

/// 每个关节的分量数
pub const COMPONENT_COUNT: usize = 12;

/// 单个关节一帧的完整记录
pub type FrameRecord = [f32; COMPONENT_COUNT];

bitflags! {
    /// 逐关节的动画分量掩码
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ComponentMask: u16 {
        const TX = 1 << 0;
        const TY = 1 << 1;
        const TZ = 1 << 2;
        const RH = 1 << 3;
        const RP = 1 << 4;
        const RR = 1 << 5;
        const SI = 1 << 6;
        const SJ = 1 << 7;
        const SK = 1 << 8;
        const SA = 1 << 9;
        const SB = 1 << 10;
        const SC = 1 << 11;

        const TRANSLATION = Self::TX.bits() | Self::TY.bits() | Self::TZ.bits();
        const ROTATION = Self::RH.bits() | Self::RP.bits() | Self::RR.bits();
        const SCALE = Self::SI.bits() | Self::SJ.bits() | Self::SK.bits();
        const SHEAR = Self::SA.bits() | Self::SB.bits() | Self::SC.bits();
    }
}

impl ComponentMask {
    fn has_component(self, component: usize) -> bool {
        self.bits() & (1 << component) != 0
    }
}

/// 把局部变换编码为 12 分量记录
pub fn encode_transform(xf: &JointTransform) -> FrameRecord {
    let mut q = xf.rotation.normalize();
    if q.w < 0.0 {
        q = -q;
    }
    [
        xf.translation.x,
        xf.translation.y,
        xf.translation.z,
        q.x,
        q.y,
        q.z,
        xf.scale.x,
        xf.scale.y,
        xf.scale.z,
        xf.shear.x,
        xf.shear.y,
        xf.shear.z,
    ]
}

/// 解码 12 分量记录
pub fn decode_record(r: &FrameRecord) -> JointTransform {
    let v = Vec3::new(r[3], r[4], r[5]);
    let w = (1.0 - v.length_squared()).max(0.0).sqrt();
    JointTransform {
        translation: Vec3::new(r[0], r[1], r[2]),
        rotation: Quat::from_xyzw(v.x, v.y, v.z, w).normalize(),
        scale: Vec3::new(r[6], r[7], r[8]),
        shear: Vec3::new(r[9], r[10], r[11]),
    }
}

/// 每个关节在帧记录中的偏移，以及一帧的总长度
fn layout(masks: &[ComponentMask]) -> (Vec<usize>, usize) {
    let mut offsets = Vec::with_capacity(masks.len());
    let mut stride = 0;
    for mask in masks {
        offsets.push(stride);
        stride += mask.bits().count_ones() as usize;
    }
    (offsets, stride)
}

/// 关键帧表
#[derive(Clone, Debug)]
pub struct TableChannel {
    frame_count: usize,
    masks: Vec<ComponentMask>,
    rest: Vec<FrameRecord>,
    frames: Vec<f32>,
    offsets: Vec<usize>,
    stride: usize,
    root_motion: Vec3,
}

impl TableChannel {
    /// 从打包数据构建，校验记录长度
    pub fn new(frame_count: usize, masks: Vec<ComponentMask>, rest: Vec<FrameRecord>, frames: Vec<f32>) -> Result<Self> {
        if frame_count == 0 {
            return Err(AnimError::Table("帧数不能为 0".into()));
        }
        if masks.len() != rest.len() {
            return Err(AnimError::Table(format!(
                "掩码数 {} 与静止帧关节数 {} 不一致",
                masks.len(),
                rest.len()
            )));
        }
        let (offsets, stride) = layout(&masks);
        let expected = stride * (frame_count - 1);
        if frames.len() != expected {
            return Err(AnimError::Table(format!(
                "帧数据长度 {} 与掩码推算的 {} 不一致",
                frames.len(),
                expected
            )));
        }
        Ok(Self {
            frame_count,
            masks,
            rest,
            frames,
            offsets,
            stride,
            root_motion: Vec3::ZERO,
        })
    }

    /// 从逐帧的完整关节变换构建，掩码由与第 0 帧的差异推出
    pub fn from_frames(frames: &[Vec<JointTransform>]) -> Result<Self> {
        let Some(first) = frames.first() else {
            return Err(AnimError::Table("至少需要一帧".into()));
        };
        let joint_count = first.len();
        if frames.iter().any(|f| f.len() != joint_count) {
            return Err(AnimError::Table("各帧关节数不一致".into()));
        }

        let encoded: Vec<Vec<FrameRecord>> = frames
            .iter()
            .map(|f| f.iter().map(encode_transform).collect())
            .collect();
        let rest = encoded[0].clone();

        let mut masks = vec![ComponentMask::empty(); joint_count];
        for frame in &encoded[1..] {
            for (j, record) in frame.iter().enumerate() {
                for c in 0..COMPONENT_COUNT {
                    if record[c] != rest[j][c] {
                        masks[j] |= ComponentMask::from_bits_truncate(1 << c);
                    }
                }
            }
        }

        let mut packed = Vec::new();
        for frame in &encoded[1..] {
            for (j, record) in frame.iter().enumerate() {
                for c in 0..COMPONENT_COUNT {
                    if masks[j].has_component(c) {
                        packed.push(record[c]);
                    }
                }
            }
        }
        Self::new(frames.len(), masks, rest, packed)
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn joint_count(&self) -> usize {
        self.masks.len()
    }

    pub fn mask(&self, joint: usize) -> ComponentMask {
        self.masks.get(joint).copied().unwrap_or_default()
    }

    /// 提取出的根运动位移
    pub fn root_motion(&self) -> Vec3 {
        self.root_motion
    }

    /// 未解码的分量记录，缺失分量取自第 0 帧
    pub fn raw_record(&self, frame: usize, joint: usize) -> FrameRecord {
        let mut record = self.rest[joint];
        if frame == 0 || frame >= self.frame_count {
            return record;
        }
        let mask = self.masks[joint];
        let mut cursor = (frame - 1) * self.stride + self.offsets[joint];
        for (c, value) in record.iter_mut().enumerate() {
            if mask.has_component(c) {
                *value = self.frames[cursor];
                cursor += 1;
            }
        }
        record
    }

    pub fn decode(&self, frame: usize, joint: usize) -> JointTransform {
        decode_record(&self.raw_record(frame, joint))
    }

    fn write_frame(&self, frame: usize, binding: &ChannelBinding, out: &mut [JointGroup]) {
        for (joint, &target) in binding.joint_map.iter().enumerate() {
            if target < 0 || joint >= self.joint_count() {
                continue;
            }
            write_joint(out, target as usize, &self.decode(frame, joint));
        }
    }

    /// 当前帧、下一帧与两者之间的插值比例
    pub fn frame_position(&self, cycle: f32, mode: PlayMode, window: CycleWindow) -> (usize, usize, f32) {
        let n = self.frame_count;
        if n <= 1 {
            return (0, 0, 0.0);
        }
        let mut t = cycle.max(0.0) * n as f32;
        let snapped = t.round();
        if (t - snapped).abs() < 1e-4 {
            t = snapped;
        }
        let mut frame = t.floor() as usize;
        let mut frac = t - frame as f32;
        if frame >= n {
            frame = n - 1;
            frac = 0.0;
        }

        let first = ((window.start * n as f32).floor() as usize).min(n - 1);
        let last = ((window.end * n as f32).ceil() as usize)
            .saturating_sub(1)
            .clamp(first, n - 1);
        let next = match mode {
            PlayMode::Pose => (frame + 1).min(n - 1),
            PlayMode::Play => {
                if frame >= last {
                    frame
                } else {
                    frame + 1
                }
            }
            PlayMode::Loop => {
                if frame >= last {
                    first
                } else {
                    frame + 1
                }
            }
            PlayMode::PingPong => {
                if frame >= last {
                    frame.saturating_sub(1).max(first)
                } else {
                    frame + 1
                }
            }
        };
        (frame, next, frac)
    }

    /// 在 `out.cycle` 处采样，写入已绑定的关节
    pub fn sample(&self, ctx: &EvalContext, binding: Option<&ChannelBinding>, out: &mut PoseBuffer) {
        let Some(binding) = binding else {
            return;
        };
        let (frame, next, frac) = self.frame_position(out.cycle, ctx.play_mode, ctx.window);
        self.write_frame(frame, binding, out.groups_mut());

        if !ctx.interpolate || next == frame || frac <= 0.0 {
            return;
        }
        let mut other = PoseBuffer::copied(ctx, out, out.cycle);
        self.write_frame(next, binding, other.groups_mut());
        let t = f32x4::splat(frac);
        for g in 0..ctx.group_count {
            let b = other.groups()[g];
            let dst = &mut out.groups_mut()[g];
            *dst = dst.lerp(&b, t);
        }
    }

    /// 提取根运动
    ///
    /// 记录 `joint` 在 `axes` 上首帧到末帧的位移，并把这些分量从表中清除，
    /// 之后所有帧都使用第 0 帧的值。返回本次提取的位移。
    pub fn calc_root_motion(&mut self, joint: usize, axes: ComponentMask) -> Vec3 {
        if joint >= self.joint_count() || self.frame_count < 2 {
            return Vec3::ZERO;
        }
        let axes = axes & ComponentMask::TRANSLATION;
        let first = self.raw_record(0, joint);
        let last = self.raw_record(self.frame_count - 1, joint);

        let mut delta = Vec3::ZERO;
        for axis in 0..3 {
            if axes.has_component(axis) {
                delta[axis] = last[axis] - first[axis];
            }
        }

        let mut masks = self.masks.clone();
        masks[joint].remove(axes);
        self.repack(masks);
        self.root_motion += delta;
        delta
    }

    /// 以新的掩码重新打包帧数据（新掩码只能是旧掩码的子集）
    fn repack(&mut self, masks: Vec<ComponentMask>) {
        let mut frames = Vec::with_capacity(self.frames.len());
        for frame in 1..self.frame_count {
            for (joint, mask) in masks.iter().enumerate() {
                let record = self.raw_record(frame, joint);
                for (c, value) in record.iter().enumerate() {
                    if mask.has_component(c) {
                        frames.push(*value);
                    }
                }
            }
        }
        let (offsets, stride) = layout(&masks);
        self.masks = masks;
        self.frames = frames;
        self.offsets = offsets;
        self.stride = stride;
    }
}
