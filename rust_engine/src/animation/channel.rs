//! 通道：把周期映射为姿态的动画源
//!
//! 通道树是封闭的变体集合（关键帧表、程序姿态、一维混合、二维混合、分层），
//! 通过 [`Channel::calc_pose`] 统一求值。子通道以 `Arc` 共享，构造完成后只读，
//! 可以在多个角色、多个线程间直接复用。

use std::f32::consts::FRAC_PI_2;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bitflags::bitflags;
use glam::{Quat, Vec2};
use wide::f32x4;

use super::{
    Activity, Blend1D, Blend2D, EvalContext, IkEvent, IkHelper, IkScope, Layered, LayeredEntry, PoseBuffer,
    ProceduralChannel, TableChannel, TimelineEvent,
};
use crate::config::LegacyDeltaFixup;
use crate::math::EPSILON;
use crate::model::PoseParameters;
use crate::{AnimError, Result};

bitflags! {
    /// 通道标志
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ChannelFlags: u32 {
        /// 叠加（delta）通道
        const ADDITIVE = 1 << 0;
        /// 叠加旋转左乘（垫在底下）而不是右乘
        const ADDITIVE_UNDERLAY = 1 << 1;
        const ZERO_ROOT_X = 1 << 2;
        const ZERO_ROOT_Y = 1 << 3;
        const ZERO_ROOT_Z = 1 << 4;
        const LOOPING = 1 << 5;
        /// 不参与淡入淡出，立即以满权重生效
        const SNAP = 1 << 6;
        /// 周期由单调时钟驱动
        const REALTIME = 1 << 7;
        /// 旧管线导出的 delta 动画，需要根关节修正
        const LEGACY_DELTA = 1 << 8;
    }
}

/// 旧 delta 动画约定下根关节的固定反向旋转
fn legacy_root_fixup() -> Quat {
    Quat::from_rotation_z(-FRAC_PI_2)
}

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// 进程内唯一的通道标识
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u64);

impl ChannelId {
    fn next() -> Self {
        ChannelId(NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// 所有变体共有的属性
#[derive(Clone, Debug)]
pub struct ChannelHeader {
    pub frame_count: u32,
    pub frame_rate: f32,
    pub flags: ChannelFlags,
    /// 叶子通道的关节名，顺序即通道内关节索引
    pub joint_names: Vec<String>,
    pub slider_names: Vec<String>,
    /// 按通道关节索引的权重遮罩
    pub weight_mask: Option<Vec<f32>>,
    pub fade_in: f32,
    pub fade_out: f32,
    pub activities: Vec<Activity>,
    pub events: Vec<TimelineEvent>,
    pub ik_events: Vec<IkEvent>,
}

impl Default for ChannelHeader {
    fn default() -> Self {
        Self {
            frame_count: 1,
            frame_rate: 30.0,
            flags: ChannelFlags::empty(),
            joint_names: Vec::new(),
            slider_names: Vec::new(),
            weight_mask: None,
            fade_in: 0.0,
            fade_out: 0.0,
            activities: Vec::new(),
            events: Vec::new(),
            ik_events: Vec::new(),
        }
    }
}

/// 通道变体
pub enum ChannelKind {
    Table(TableChannel),
    Procedural(ProceduralChannel),
    Blend1D(Blend1D),
    Blend2D(Blend2D),
    Layered(Layered),
}

/// 通道
pub struct Channel {
    id: ChannelId,
    pub name: String,
    pub header: ChannelHeader,
    pub kind: ChannelKind,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.kind {
            ChannelKind::Table(_) => "table",
            ChannelKind::Procedural(_) => "procedural",
            ChannelKind::Blend1D(_) => "blend1d",
            ChannelKind::Blend2D(_) => "blend2d",
            ChannelKind::Layered(_) => "layered",
        };
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &kind)
            .finish()
    }
}

impl Channel {
    fn with_kind(name: impl Into<String>, header: ChannelHeader, kind: ChannelKind) -> Self {
        Self {
            id: ChannelId::next(),
            name: name.into(),
            header,
            kind,
        }
    }

    /// 关键帧表通道，`joint_names` 与表中关节一一对应
    pub fn table(name: impl Into<String>, joint_names: Vec<String>, frame_rate: f32, table: TableChannel) -> Result<Self> {
        let name = name.into();
        if joint_names.len() != table.joint_count() {
            return Err(AnimError::Channel(format!(
                "通道 '{}' 有 {} 个关节名，但表中有 {} 个关节",
                name,
                joint_names.len(),
                table.joint_count()
            )));
        }
        let header = ChannelHeader {
            frame_count: table.frame_count() as u32,
            frame_rate,
            joint_names,
            ..ChannelHeader::default()
        };
        Ok(Self::with_kind(name, header, ChannelKind::Table(table)))
    }

    pub fn procedural(name: impl Into<String>, joint_names: Vec<String>, pose: ProceduralChannel) -> Result<Self> {
        let name = name.into();
        if joint_names.len() != pose.joint_count() {
            return Err(AnimError::Channel(format!(
                "通道 '{}' 的关节名数量与程序姿态不一致",
                name
            )));
        }
        let header = ChannelHeader {
            joint_names,
            ..ChannelHeader::default()
        };
        Ok(Self::with_kind(name, header, ChannelKind::Procedural(pose)))
    }

    /// 由姿态参数 `param` 驱动的一维混合
    pub fn blend1d(name: impl Into<String>, param: usize) -> Self {
        Self::with_kind(name, ChannelHeader::default(), ChannelKind::Blend1D(Blend1D::new(param)))
    }

    /// 由姿态参数 `x_param`/`y_param` 驱动的二维混合
    pub fn blend2d(name: impl Into<String>, x_param: usize, y_param: usize) -> Self {
        Self::with_kind(
            name,
            ChannelHeader::default(),
            ChannelKind::Blend2D(Blend2D::new(x_param, y_param)),
        )
    }

    pub fn layered(name: impl Into<String>) -> Self {
        Self::with_kind(name, ChannelHeader::default(), ChannelKind::Layered(Layered::default()))
    }

    pub fn with_flags(mut self, flags: ChannelFlags) -> Self {
        self.header.flags |= flags;
        self
    }

    pub fn with_fades(mut self, fade_in: f32, fade_out: f32) -> Self {
        self.header.fade_in = fade_in.max(0.0);
        self.header.fade_out = fade_out.max(0.0);
        self
    }

    pub fn with_sliders(mut self, slider_names: Vec<String>) -> Self {
        self.header.slider_names = slider_names;
        self
    }

    /// 设置权重遮罩，长度必须等于通道关节数
    pub fn with_weight_mask(mut self, mask: Vec<f32>) -> Result<Self> {
        if mask.len() != self.header.joint_names.len() {
            return Err(AnimError::Channel(format!(
                "通道 '{}' 的遮罩长度 {} 与关节数 {} 不一致",
                self.name,
                mask.len(),
                self.header.joint_names.len()
            )));
        }
        self.header.weight_mask = Some(mask.into_iter().map(|w| w.clamp(0.0, 1.0)).collect());
        Ok(self)
    }

    pub fn with_activity(mut self, name: impl Into<String>, weight: f32) -> Self {
        self.header.activities.push(Activity {
            name: name.into(),
            weight: weight.max(0.0),
        });
        self
    }

    pub fn with_event(mut self, event: TimelineEvent) -> Self {
        self.header.events.push(event);
        self.header
            .events
            .sort_by(|a, b| a.cycle.total_cmp(&b.cycle));
        self
    }

    pub fn with_ik_event(mut self, event: IkEvent) -> Self {
        self.header.ik_events.push(event);
        self
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn flags(&self) -> ChannelFlags {
        self.header.flags
    }

    pub fn is_additive(&self) -> bool {
        self.header.flags.contains(ChannelFlags::ADDITIVE)
    }

    pub fn has_activity(&self, name: &str) -> Option<f32> {
        self.header
            .activities
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.weight)
    }

    /// 直接子通道
    pub fn children(&self) -> Vec<&Arc<Channel>> {
        match &self.kind {
            ChannelKind::Table(_) | ChannelKind::Procedural(_) => Vec::new(),
            ChannelKind::Blend1D(b) => b.entries().iter().map(|e| &e.channel).collect(),
            ChannelKind::Blend2D(b) => b.entries().iter().map(|e| &e.channel).collect(),
            ChannelKind::Layered(l) => l.entries().iter().map(|e| &e.channel).collect(),
        }
    }

    /// 自身或任一后代是否为 `id`
    pub fn contains(&self, id: ChannelId) -> bool {
        self.id == id || self.children().iter().any(|c| c.contains(id))
    }

    fn check_child(&self, child: &Channel) -> Result<()> {
        if child.contains(self.id) {
            return Err(AnimError::CyclicChannel(self.name.clone()));
        }
        Ok(())
    }

    fn adopt_timing(&mut self, child: &Channel, force: bool) {
        if force || self.children().len() == 1 {
            self.header.frame_count = child.header.frame_count;
            self.header.frame_rate = child.header.frame_rate;
        }
    }

    /// 向一维混合添加子通道
    pub fn add_blend1d_child(&mut self, coord: f32, child: Arc<Channel>) -> Result<()> {
        self.check_child(&child)?;
        let ChannelKind::Blend1D(blend) = &mut self.kind else {
            return Err(AnimError::Channel(format!("通道 '{}' 不是一维混合", self.name)));
        };
        blend.insert(coord, child.clone());
        self.adopt_timing(&child, false);
        Ok(())
    }

    /// 向二维混合添加子通道（三角剖分随之失效）
    pub fn add_blend2d_child(&mut self, coord: Vec2, child: Arc<Channel>) -> Result<()> {
        self.check_child(&child)?;
        let ChannelKind::Blend2D(blend) = &mut self.kind else {
            return Err(AnimError::Channel(format!("通道 '{}' 不是二维混合", self.name)));
        };
        blend.insert(coord, child.clone());
        self.adopt_timing(&child, false);
        Ok(())
    }

    /// 向分层通道追加一层；第一层决定帧数与帧率
    pub fn add_layer(&mut self, entry: LayeredEntry) -> Result<()> {
        self.check_child(&entry.channel)?;
        let child = entry.channel.clone();
        let ChannelKind::Layered(layered) = &mut self.kind else {
            return Err(AnimError::Channel(format!("通道 '{}' 不是分层通道", self.name)));
        };
        let is_base = layered.entries().is_empty();
        layered.push(entry);
        if is_base {
            self.adopt_timing(&child, true);
        }
        Ok(())
    }

    /// 时长（秒）；组合通道按当前权重混合子通道时长
    pub fn get_length(&self, params: &PoseParameters) -> f32 {
        match &self.kind {
            ChannelKind::Table(_) | ChannelKind::Procedural(_) => {
                if self.header.frame_rate > EPSILON {
                    self.header.frame_count as f32 / self.header.frame_rate
                } else {
                    0.0
                }
            }
            ChannelKind::Blend1D(b) => b.length(params),
            ChannelKind::Blend2D(b) => b.length(params),
            ChannelKind::Layered(l) => l.length(params),
        }
    }

    /// 每秒推进的周期
    pub fn cycle_rate(&self, params: &PoseParameters) -> f32 {
        let length = self.get_length(params);
        if length > EPSILON {
            1.0 / length
        } else {
            0.0
        }
    }

    fn effective_cycle(&self, ctx: &EvalContext, cycle: f32) -> f32 {
        if !self.header.flags.contains(ChannelFlags::REALTIME) {
            return cycle;
        }
        let length = self.get_length(ctx.params) as f64;
        if length <= EPSILON as f64 {
            return cycle;
        }
        (ctx.clock / length).fract() as f32
    }

    /// 求值并按 `data.weight` 混入 `data`
    ///
    /// 权重为零时不触碰 `data`。锁定目标取自混入本通道之前的 `data`，
    /// 接触目标取自本通道自己的姿态。
    pub fn calc_pose(&self, ctx: &EvalContext, ik: &mut IkHelper, data: &mut PoseBuffer) {
        if data.weight <= 0.0 {
            return;
        }
        let cycle = self.effective_cycle(ctx, data.cycle);
        let weight = data.weight;
        let additive = self.is_additive();

        let mark = ik.pre_ik(ctx, self, data.groups(), cycle, IkScope::Local, 1.0);

        let (mut scratch, blend_weight) = match &self.kind {
            // 分层通道以调用方的姿态和权重为底逐层累积，结果已含调用方权重
            ChannelKind::Layered(_) => {
                let mut scratch = if additive {
                    PoseBuffer::seeded(ctx, true, cycle)
                } else {
                    PoseBuffer::copied(ctx, data, cycle)
                };
                scratch.weight = weight;
                (scratch, 1.0)
            }
            _ => (PoseBuffer::seeded(ctx, additive, cycle), weight),
        };
        self.do_calc_pose(ctx, ik, &mut scratch);
        self.zero_root_axes(ctx, &mut scratch);

        ik.pre_ik(ctx, self, scratch.groups(), cycle, IkScope::Global, weight);
        self.blend(ctx, data, &mut scratch, blend_weight);
        ik.apply_local(ctx, mark, data, weight);
    }

    fn do_calc_pose(&self, ctx: &EvalContext, ik: &mut IkHelper, out: &mut PoseBuffer) {
        match &self.kind {
            ChannelKind::Table(table) => table.sample(ctx, ctx.binding(self.id), out),
            ChannelKind::Procedural(pose) => pose.write_pose(ctx.binding(self.id), out),
            ChannelKind::Blend1D(blend) => blend.calc(ctx, ik, out),
            ChannelKind::Blend2D(blend) => blend.calc(ctx, ik, out),
            ChannelKind::Layered(layered) => layered.accumulate(ctx, ik, out),
        }
    }

    fn zero_root_axes(&self, ctx: &EvalContext, out: &mut PoseBuffer) {
        let flags = self.header.flags;
        let axes = [ChannelFlags::ZERO_ROOT_X, ChannelFlags::ZERO_ROOT_Y, ChannelFlags::ZERO_ROOT_Z];
        if ctx.joint_count == 0 || !axes.iter().any(|a| flags.contains(*a)) {
            return;
        }
        let mut root = out.pose.joint(0);
        for (axis, flag) in axes.iter().enumerate() {
            if flags.contains(*flag) {
                root.translation[axis] = 0.0;
            }
        }
        out.pose.set_joint(0, &root);
    }

    fn needs_legacy_fixup(&self, ctx: &EvalContext) -> bool {
        match ctx.legacy_delta_fixup {
            LegacyDeltaFixup::Disabled => false,
            LegacyDeltaFixup::FlaggedOnly => self.header.flags.contains(ChannelFlags::LEGACY_DELTA),
            LegacyDeltaFixup::AllDelta => true,
        }
    }

    /// 把 `b` 按 `weight` 混入 `a`
    ///
    /// 无遮罩、满权重的非叠加通道直接接管 `b` 的缓冲区，`b` 随后失效。
    pub fn blend(&self, ctx: &EvalContext, a: &mut PoseBuffer, b: &mut PoseBuffer, weight: f32) {
        if weight <= 0.0 {
            return;
        }
        let binding = ctx.binding(self.id);
        let unmasked = binding.map_or(true, |bd| bd.unmasked);
        let additive = self.is_additive();

        if unmasked && weight >= 1.0 && !additive {
            a.pose.steal(&mut b.pose);
            return;
        }

        let mut underlay = self.header.flags.contains(ChannelFlags::ADDITIVE_UNDERLAY);
        if additive && ctx.joint_count > 0 && self.needs_legacy_fixup(ctx) {
            let mut root = b.pose.joint(0);
            root.rotation = legacy_root_fixup() * root.rotation;
            b.pose.set_joint(0, &root);
            underlay ^= ctx.source_quat_order;
        }

        let w = f32x4::splat(weight.min(1.0));
        for g in 0..ctx.group_count {
            let s = match binding {
                Some(bd) => w * bd.group_mask[g],
                None => w,
            };
            let src = b.groups()[g];
            let dst = &mut a.groups_mut()[g];
            if additive {
                dst.translation = dst.translation.mul_add(src.translation, s);
                dst.rotation = if underlay {
                    dst.rotation.accumulate_scaled_lhs(src.rotation, s)
                } else {
                    dst.rotation.accumulate_scaled_rhs(src.rotation, s)
                };
            } else {
                *dst = dst.lerp(&src, s);
            }
        }
    }
}
