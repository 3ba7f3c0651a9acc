//! 求值上下文与姿态缓冲区
//!
//! 临时姿态从线程局部的空闲链表取出，`Pose` 被 drop 时自动归还，
//! 每帧的求值路径在预热后不再分配堆内存。

use std::cell::RefCell;

use crate::config::{self, AnimConfig, LegacyDeltaFixup};
use crate::math::{read_joint, write_joint, JointGroup, SIMD_WIDTH};
use crate::model::{BindingTable, ChannelBinding, PoseParameters};
use crate::skeleton::{IkChain, JointTransform, Skeleton, MAX_JOINTS};

use super::ChannelId;

/// 单个姿态缓冲区的最大 SIMD 组数
pub const MAX_GROUPS: usize = MAX_JOINTS / SIMD_WIDTH;

struct PosePool {
    free: Vec<Box<[JointGroup]>>,
    capacity: usize,
}

thread_local! {
    static POSE_POOL: RefCell<PosePool> = RefCell::new(PosePool {
        free: Vec::new(),
        capacity: config::get_config().max_pooled_poses,
    });
}

/// 固定容量的 SoA 姿态，离开作用域时归还线程池
pub struct Pose {
    groups: Option<Box<[JointGroup]>>,
}

impl Pose {
    /// 从线程池取出一个缓冲区，内容为上次使用留下的数据
    pub fn acquire() -> Self {
        let pooled = POSE_POOL
            .try_with(|pool| pool.borrow_mut().free.pop())
            .ok()
            .flatten();
        let groups = pooled.unwrap_or_else(|| vec![JointGroup::identity(); MAX_GROUPS].into_boxed_slice());
        Self { groups: Some(groups) }
    }

    pub fn groups(&self) -> &[JointGroup] {
        self.groups.as_deref().unwrap_or(&[])
    }

    pub fn groups_mut(&mut self) -> &mut [JointGroup] {
        self.groups.as_deref_mut().unwrap_or(&mut [])
    }

    /// 接管 `other` 的缓冲区（交换所有权，不复制），`other` 随后视为失效
    pub fn steal(&mut self, other: &mut Pose) {
        std::mem::swap(&mut self.groups, &mut other.groups);
    }

    pub fn copy_from(&mut self, src: &[JointGroup]) {
        let n = src.len().min(MAX_GROUPS);
        self.groups_mut()[..n].copy_from_slice(&src[..n]);
    }

    pub fn fill_identity(&mut self, group_count: usize) {
        for group in &mut self.groups_mut()[..group_count] {
            *group = JointGroup::identity();
        }
    }

    pub fn joint(&self, index: usize) -> JointTransform {
        read_joint(self.groups(), index)
    }

    pub fn set_joint(&mut self, index: usize, xf: &JointTransform) {
        write_joint(self.groups_mut(), index, xf);
    }
}

impl Clone for Pose {
    fn clone(&self) -> Self {
        let mut pose = Pose::acquire();
        pose.copy_from(self.groups());
        pose
    }
}

impl Drop for Pose {
    fn drop(&mut self) {
        if let Some(groups) = self.groups.take() {
            let _ = POSE_POOL.try_with(move |pool| {
                let mut pool = pool.borrow_mut();
                if pool.free.len() < pool.capacity {
                    pool.free.push(groups);
                }
            });
        }
    }
}

impl std::fmt::Debug for Pose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pose").field("groups", &self.groups().len()).finish()
    }
}

/// 姿态 + 随之传递的权重和周期
#[derive(Debug)]
pub struct PoseBuffer {
    pub pose: Pose,
    pub weight: f32,
    pub cycle: f32,
}

impl PoseBuffer {
    pub fn new(weight: f32, cycle: f32) -> Self {
        Self {
            pose: Pose::acquire(),
            weight,
            cycle,
        }
    }

    /// 以绑定姿态（叠加通道为单位姿态）为底的缓冲区
    pub fn seeded(ctx: &EvalContext, additive: bool, cycle: f32) -> Self {
        let mut buffer = Self::new(1.0, cycle);
        if additive {
            buffer.pose.fill_identity(ctx.group_count);
        } else {
            buffer.pose.copy_from(ctx.skeleton.bind_groups());
        }
        buffer
    }

    /// 复制另一个缓冲区的姿态内容作为起点
    pub fn copied(ctx: &EvalContext, src: &PoseBuffer, cycle: f32) -> Self {
        let mut buffer = Self::new(1.0, cycle);
        buffer.pose.copy_from(&src.groups()[..ctx.group_count]);
        buffer
    }

    pub fn groups(&self) -> &[JointGroup] {
        self.pose.groups()
    }

    pub fn groups_mut(&mut self) -> &mut [JointGroup] {
        self.pose.groups_mut()
    }
}

/// 层的播放模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayMode {
    /// 周期由外部设置，不自动推进
    Pose,
    /// 播放一次，停在窗口末尾
    #[default]
    Play,
    /// 在窗口内循环
    Loop,
    /// 在窗口内往返
    PingPong,
}

impl PlayMode {
    pub fn is_looping(self) -> bool {
        matches!(self, PlayMode::Loop | PlayMode::PingPong)
    }
}

/// 播放的周期窗口（按帧区间播放时使用）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleWindow {
    pub start: f32,
    pub end: f32,
}

impl Default for CycleWindow {
    fn default() -> Self {
        Self { start: 0.0, end: 1.0 }
    }
}

impl CycleWindow {
    pub fn new(start: f32, end: f32) -> Self {
        let start = start.clamp(0.0, 1.0);
        Self {
            start,
            end: end.clamp(start, 1.0),
        }
    }

    pub fn span(&self) -> f32 {
        self.end - self.start
    }
}

/// 一帧内不可变的求值上下文
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    pub skeleton: &'a Skeleton,
    pub bindings: &'a BindingTable,
    pub params: &'a PoseParameters,
    pub ik_chains: &'a [IkChain],
    pub joint_count: usize,
    pub group_count: usize,
    pub interpolate: bool,
    pub play_mode: PlayMode,
    pub window: CycleWindow,
    /// 单调时钟（秒），实时周期通道使用
    pub clock: f64,
    pub negligible_weight: f32,
    pub ik_enabled: bool,
    pub legacy_delta_fixup: LegacyDeltaFixup,
    pub source_quat_order: bool,
}

impl<'a> EvalContext<'a> {
    pub fn new(
        skeleton: &'a Skeleton,
        bindings: &'a BindingTable,
        params: &'a PoseParameters,
        ik_chains: &'a [IkChain],
        config: &AnimConfig,
    ) -> Self {
        debug_assert!(skeleton.joint_count() <= MAX_JOINTS);
        Self {
            skeleton,
            bindings,
            params,
            ik_chains,
            joint_count: skeleton.joint_count(),
            group_count: skeleton.group_count(),
            interpolate: config.interpolate_frames,
            play_mode: PlayMode::Play,
            window: CycleWindow::default(),
            clock: 0.0,
            negligible_weight: config.negligible_weight,
            ik_enabled: config.ik_enabled,
            legacy_delta_fixup: config.legacy_delta_fixup,
            source_quat_order: config.source_quat_order,
        }
    }

    pub fn with_playback(mut self, play_mode: PlayMode, window: CycleWindow) -> Self {
        self.play_mode = play_mode;
        self.window = window;
        self
    }

    pub fn with_clock(mut self, clock: f64) -> Self {
        self.clock = clock;
        self
    }

    pub fn binding(&self, id: ChannelId) -> Option<&'a ChannelBinding> {
        self.bindings.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_steal_swaps_buffers() {
        let mut a = Pose::acquire();
        let mut b = Pose::acquire();
        a.fill_identity(1);
        let mut xf = JointTransform::IDENTITY;
        xf.translation = Vec3::new(1.0, 2.0, 3.0);
        b.set_joint(0, &xf);
        a.steal(&mut b);
        assert_eq!(a.joint(0).translation, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(a.groups().len(), MAX_GROUPS);
    }

    #[test]
    fn test_pool_reuses_released_buffers() {
        let first = Pose::acquire();
        drop(first);
        let before = POSE_POOL.with(|p| p.borrow().free.len());
        let again = Pose::acquire();
        let after = POSE_POOL.with(|p| p.borrow().free.len());
        assert_eq!(after + 1, before);
        drop(again);
    }

    #[test]
    fn test_cycle_window_clamps() {
        let w = CycleWindow::new(0.5, 0.2);
        assert_eq!(w.start, 0.5);
        assert_eq!(w.end, 0.5);
        assert_eq!(CycleWindow::default().span(), 1.0);
    }
}
