//! IK 辅助：求值时采集目标，混合完成后求解
//!
//! 锁定事件在单个通道内部闭环：混合前记下末端关节的净变换，混合后把它
//! 拉回原处（局部目标）。接触事件记录末端相对接触关节的偏移，等整个
//! 姿态合成完毕后再统一求解（全局目标）。

use glam::{Quat, Vec3};

use super::{Channel, EvalContext, IkEventKind, PoseBuffer};
use crate::math::JointGroup;

/// 采集目标的作用域
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IkScope {
    /// 接触目标，角色合成完毕后求解
    Global,
    /// 锁定目标，在同一次 `calc_pose` 内求解
    Local,
}

#[derive(Clone, Copy, Debug)]
enum TargetKind {
    Lock { position: Vec3, rotation: Quat },
    Touch { joint: usize, offset: Vec3, rotation: Quat },
}

#[derive(Clone, Copy, Debug)]
struct IkTarget {
    chain: usize,
    weight: f32,
    kind: TargetKind,
}

/// 每个角色一份的瞬时 IK 目标
#[derive(Debug, Default)]
pub struct IkHelper {
    global: Vec<IkTarget>,
    local: Vec<IkTarget>,
}

impl IkHelper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.global.clear();
        self.local.clear();
    }

    pub fn pending_global(&self) -> usize {
        self.global.len()
    }

    pub fn pending_local(&self) -> usize {
        self.local.len()
    }

    /// 采集 `channel` 的 IK 事件目标
    ///
    /// 返回采集前局部目标的数量，作为 [`IkHelper::apply_local`] 的起点标记。
    pub fn pre_ik(
        &mut self,
        ctx: &EvalContext,
        channel: &Channel,
        groups: &[JointGroup],
        cycle: f32,
        scope: IkScope,
        scale: f32,
    ) -> usize {
        let mark = self.local.len();
        if !ctx.ik_enabled || channel.header.ik_events.is_empty() {
            return mark;
        }
        let binding = ctx.binding(channel.id());

        for (index, event) in channel.header.ik_events.iter().enumerate() {
            let wanted = match scope {
                IkScope::Local => event.is_lock(),
                IkScope::Global => !event.is_lock(),
            };
            if !wanted {
                continue;
            }
            let Some(chain) = ctx.ik_chains.get(event.chain) else {
                log::debug!("通道 '{}' 引用了不存在的 IK 链 {}", channel.name, event.chain);
                continue;
            };
            let end = chain.end_joint();
            if binding.is_some_and(|b| b.joint_weight(end) <= 0.0) {
                continue;
            }
            let Some(window_scale) = event.window.scale(cycle) else {
                continue;
            };
            let weight = window_scale * scale;
            if weight <= ctx.negligible_weight {
                continue;
            }

            let end_net = ctx.skeleton.net_transform(groups, end);
            let kind = match &event.kind {
                IkEventKind::Lock => TargetKind::Lock {
                    position: end_net.position,
                    rotation: end_net.rotation,
                },
                IkEventKind::Touch { .. } => {
                    let Some(joint) = binding.and_then(|b| b.touch_joint(index)) else {
                        continue;
                    };
                    let touch_net = ctx.skeleton.net_transform(groups, joint);
                    let (offset, rotation) = touch_net.relative(&end_net);
                    TargetKind::Touch { joint, offset, rotation }
                }
            };
            let target = IkTarget {
                chain: event.chain,
                weight,
                kind,
            };
            match scope {
                IkScope::Local => self.local.push(target),
                IkScope::Global => self.global.push(target),
            }
        }
        mark
    }

    fn solve(ctx: &EvalContext, target: &IkTarget, data: &mut PoseBuffer, weight: f32) -> bool {
        let Some(chain) = ctx.ik_chains.get(target.chain) else {
            return false;
        };
        let (position, rotation) = match target.kind {
            TargetKind::Lock { position, rotation } => (position, rotation),
            TargetKind::Touch { joint, offset, rotation } => {
                let anchor = ctx.skeleton.net_transform(data.groups(), joint);
                anchor.reanchor(offset, rotation)
            }
        };
        chain.solve(ctx.skeleton, data.groups_mut(), position, Some(rotation), weight)
    }

    /// 求解 `mark` 之后采集的局部目标并丢弃它们
    pub fn apply_local(&mut self, ctx: &EvalContext, mark: usize, data: &mut PoseBuffer, weight: f32) {
        if mark >= self.local.len() {
            return;
        }
        for target in self.local.drain(mark..) {
            let w = (target.weight * weight).min(1.0);
            if w > ctx.negligible_weight && !Self::solve(ctx, &target, data, w) {
                log::debug!("IK 链 {} 锁定求解失败", target.chain);
            }
        }
    }

    /// 求解全部全局目标
    pub fn apply_ik(&mut self, ctx: &EvalContext, data: &mut PoseBuffer) {
        for target in std::mem::take(&mut self.global) {
            let w = target.weight.min(1.0);
            if w > ctx.negligible_weight && !Self::solve(ctx, &target, data, w) {
                log::debug!("IK 链 {} 接触求解失败", target.chain);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{IkEvent, Window};
    use crate::skeleton::JointTransform;
    use crate::test_util::{procedural_channel, TestRig};
    use std::sync::Arc;

    fn bent_knee(angle: f32) -> JointTransform {
        JointTransform::from_translation_rotation(glam::Vec3::new(0.0, -1.0, 0.0), Quat::from_rotation_x(angle))
    }

    fn locked_channel(rig: &mut TestRig, angle: f32) -> Arc<Channel> {
        let locked = procedural_channel("locked", &rig.skeleton).with_ik_event(IkEvent::lock(0, Window::full()));
        if let crate::animation::ChannelKind::Procedural(p) = &locked.kind {
            p.set_joint(2, bent_knee(angle));
        }
        let locked = Arc::new(locked);
        rig.bind(&locked);
        locked
    }

    #[test]
    fn test_lock_keeps_foot_in_place() {
        let mut rig = TestRig::new();
        let locked = locked_channel(&mut rig, 0.9);
        let ctx = rig.context();

        let mut data = PoseBuffer::seeded(&ctx, false, 0.0);
        data.pose.set_joint(2, &bent_knee(0.3));
        let before = ctx.skeleton.net_transform(data.groups(), 3).position;

        let unlocked = {
            let mut scratch = PoseBuffer::seeded(&ctx, false, 0.0);
            scratch.pose.set_joint(2, &bent_knee(0.9));
            ctx.skeleton.net_transform(scratch.groups(), 3).position
        };
        assert!((unlocked - before).length() > 0.1);

        let mut ik = IkHelper::new();
        locked.calc_pose(&ctx, &mut ik, &mut data);
        let after = ctx.skeleton.net_transform(data.groups(), 3).position;
        assert!((after - before).length() < 1e-3, "{:?} vs {:?}", after, before);
        assert_eq!(ik.pending_local(), 0);
    }

    #[test]
    fn test_lock_holds_foot_of_straight_leg() {
        let mut rig = TestRig::new();
        let locked = locked_channel(&mut rig, 0.6);
        let ctx = rig.context();

        let mut ik = IkHelper::new();
        let mut data = PoseBuffer::seeded(&ctx, false, 0.0);
        locked.calc_pose(&ctx, &mut ik, &mut data);
        let foot = ctx.skeleton.net_transform(data.groups(), 3).position;
        // 完全伸直的目标会被收到最大伸展距离之内
        assert!((foot - glam::Vec3::new(0.0, 1.0, 0.0)).length() < 1e-3, "{:?}", foot);
    }

    #[test]
    fn test_lock_disabled_follows_channel() {
        let mut rig = TestRig::new();
        let locked = locked_channel(&mut rig, 0.6);
        let mut ctx = rig.context();
        ctx.ik_enabled = false;

        let mut ik = IkHelper::new();
        let mut data = PoseBuffer::seeded(&ctx, false, 0.0);
        locked.calc_pose(&ctx, &mut ik, &mut data);
        let foot = ctx.skeleton.net_transform(data.groups(), 3).position;
        assert!((foot - glam::Vec3::new(0.0, 1.0, 0.0)).length() > 0.5);
    }

    #[test]
    fn test_touch_collected_as_global() {
        let mut rig = TestRig::new();
        let touch = Arc::new(
            procedural_channel("touch", &rig.skeleton).with_ik_event(IkEvent::touch(0, "root", Window::full())),
        );
        rig.bind(&touch);
        let ctx = rig.context();
        let mut ik = IkHelper::new();
        let mut data = PoseBuffer::seeded(&ctx, false, 0.0);
        touch.calc_pose(&ctx, &mut ik, &mut data);
        assert_eq!(ik.pending_global(), 1);

        let before = ctx.skeleton.net_transform(data.groups(), 3).position;
        ik.apply_ik(&ctx, &mut data);
        let after = ctx.skeleton.net_transform(data.groups(), 3).position;
        assert!((before - after).length() < 1e-3);
        assert_eq!(ik.pending_global(), 0);
    }

    #[test]
    fn test_masked_end_joint_skipped() {
        let mut rig = TestRig::new();
        let channel = Arc::new(
            procedural_channel("masked", &rig.skeleton)
                .with_weight_mask(vec![1.0, 1.0, 1.0, 0.0, 1.0])
                .unwrap()
                .with_ik_event(IkEvent::lock(0, Window::full())),
        );
        rig.bind(&channel);
        let ctx = rig.context();
        let mut ik = IkHelper::new();
        let data = PoseBuffer::seeded(&ctx, false, 0.0);
        let mark = ik.pre_ik(&ctx, &channel, data.groups(), data.cycle, IkScope::Local, 1.0);
        assert_eq!(mark, 0);
        assert_eq!(ik.pending_local(), 0);
    }
}
