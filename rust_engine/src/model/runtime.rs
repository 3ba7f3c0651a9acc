//! 角色运行时
//!
//! 每帧流程：推进各层周期 → 按次序合成活动层 → 全局 IK → 强制值 →
//! 关节合并（由调度器驱动）→ 净变换。

use std::sync::Arc;

use crate::animation::{
    AnimationLayerConfig, AnimationLayerManager, Channel, EvalContext, FiredEvent, IkHelper, LayerId, PoseBuffer,
};
use crate::config::get_config;
use crate::math::{read_joint, write_joint, JointGroup};
use crate::skeleton::{IkChain, JointTransform, NetTransform, Skeleton};

use super::{BindingTable, PoseParameters};

/// 角色
pub struct Character {
    pub name: String,
    skeleton: Skeleton,
    sliders: Vec<String>,
    bindings: BindingTable,
    params: PoseParameters,
    ik_chains: Vec<IkChain>,
    ik: IkHelper,
    layers: AnimationLayerManager,
    /// 已加入角色的顶层通道，活动选择在其中进行
    channels: Vec<Arc<Channel>>,
    forced: Vec<Option<JointTransform>>,
    local: Vec<JointGroup>,
    net: Vec<NetTransform>,
    /// 合并链接：(本角色关节, 父角色关节)
    merge_links: Vec<(usize, usize)>,
    clock: f64,
}

impl Character {
    pub fn new(name: impl Into<String>, skeleton: Skeleton) -> Self {
        let name = name.into();
        let local = skeleton.bind_groups().to_vec();
        let mut net = Vec::new();
        skeleton.compute_net_transforms(&local, &mut net);
        log::info!(
            "角色 '{}' 创建: {} 个关节, {} 个 SIMD 组",
            name,
            skeleton.joint_count(),
            skeleton.group_count()
        );
        Self {
            name,
            forced: vec![None; skeleton.joint_count()],
            skeleton,
            sliders: Vec::new(),
            bindings: BindingTable::new(),
            params: PoseParameters::new(),
            ik_chains: Vec::new(),
            ik: IkHelper::new(),
            layers: AnimationLayerManager::default(),
            channels: Vec::new(),
            local,
            net,
            merge_links: Vec::new(),
            clock: 0.0,
        }
    }

    pub fn with_sliders(mut self, sliders: Vec<String>) -> Self {
        self.sliders = sliders;
        self
    }

    pub fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    pub fn params(&self) -> &PoseParameters {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut PoseParameters {
        &mut self.params
    }

    pub fn bindings(&self) -> &BindingTable {
        &self.bindings
    }

    pub fn add_ik_chain(&mut self, chain: IkChain) -> usize {
        self.ik_chains.push(chain);
        self.ik_chains.len() - 1
    }

    pub fn ik_chains(&self) -> &[IkChain] {
        &self.ik_chains
    }

    pub fn layers(&self) -> &AnimationLayerManager {
        &self.layers
    }

    /// 层控制（权重、速率、跳转、回收、优先级）
    pub fn layers_mut(&mut self) -> &mut AnimationLayerManager {
        &mut self.layers
    }

    /// 加入一棵通道树并解析绑定
    pub fn add_channel(&mut self, channel: Arc<Channel>) {
        if self.channels.iter().any(|c| c.id() == channel.id()) {
            return;
        }
        self.bindings.bind_tree(&self.skeleton, &self.sliders, &channel);
        self.channels.push(channel);
    }

    pub fn channels(&self) -> &[Arc<Channel>] {
        &self.channels
    }

    /// 在新层上播放 `channel`，槽位用尽返回 `None`
    pub fn play(&mut self, channel: Arc<Channel>, config: Option<&AnimationLayerConfig>) -> Option<LayerId> {
        self.add_channel(channel.clone());
        self.layers.allocate_layer(channel, config)
    }

    /// 按权重从带 `activity` 标签的通道中选一个，`roll` 取 [0, 1)
    pub fn select_activity(&self, activity: &str, roll: f32) -> Option<Arc<Channel>> {
        let candidates: Vec<(&Arc<Channel>, f32)> = self
            .channels
            .iter()
            .filter_map(|c| c.has_activity(activity).map(|w| (c, w)))
            .filter(|(_, w)| *w > 0.0)
            .collect();
        let total: f32 = candidates.iter().map(|(_, w)| w).sum();
        if total <= 0.0 {
            return None;
        }
        let mut pick = roll.clamp(0.0, 1.0) * total;
        for (channel, weight) in &candidates {
            if pick < *weight {
                return Some(Arc::clone(channel));
            }
            pick -= weight;
        }
        candidates.last().map(|(c, _)| Arc::clone(c))
    }

    pub fn play_activity(&mut self, activity: &str, roll: f32, config: Option<&AnimationLayerConfig>) -> Option<LayerId> {
        let Some(channel) = self.select_activity(activity, roll) else {
            log::warn!("角色 '{}' 没有活动 '{}' 的通道", self.name, activity);
            return None;
        };
        self.layers.allocate_activity_layer(channel, activity, config)
    }

    /// 设置或清除关节的强制局部变换（在 IK 之后生效）
    pub fn set_forced_value(&mut self, joint: usize, value: Option<JointTransform>) -> bool {
        match self.forced.get_mut(joint) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn fired_events(&self) -> &[FiredEvent] {
        self.layers.fired_events()
    }

    pub fn clock(&self) -> f64 {
        self.clock
    }

    /// 推进时钟与所有层
    pub fn advance(&mut self, dt: f32) {
        self.clock += dt.max(0.0) as f64;
        self.layers.advance(dt, &self.params);
    }

    /// 合成当前帧的局部姿态与净变换
    pub fn compute_pose(&mut self) {
        let config = get_config();
        let ctx = EvalContext::new(&self.skeleton, &self.bindings, &self.params, &self.ik_chains, &config)
            .with_clock(self.clock);

        self.ik.clear();
        let mut running = PoseBuffer::seeded(&ctx, false, 0.0);
        for (_, layer) in self.layers.active_layers() {
            let weight = layer.effective_weight();
            if weight <= ctx.negligible_weight {
                continue;
            }
            let Some(channel) = layer.channel() else {
                continue;
            };
            let layer_ctx = ctx.with_playback(layer.play_mode(), layer.window());
            running.weight = weight;
            running.cycle = layer.cycle();
            channel.calc_pose(&layer_ctx, &mut self.ik, &mut running);
        }

        for group in &mut running.groups_mut()[..ctx.group_count] {
            group.rotation = group.rotation.normalize();
        }

        if ctx.ik_enabled {
            self.ik.apply_ik(&ctx, &mut running);
        }

        for (joint, forced) in self.forced.iter().enumerate() {
            if let Some(xf) = forced {
                write_joint(running.groups_mut(), joint, xf);
            }
        }

        self.local.clear();
        self.local.extend_from_slice(&running.groups()[..ctx.group_count]);
        self.skeleton.compute_net_transforms(&self.local, &mut self.net);
    }

    pub fn update(&mut self, dt: f32) {
        self.advance(dt);
        self.compute_pose();
    }

    pub(crate) fn set_merge_links(&mut self, links: Vec<(usize, usize)>) {
        self.merge_links = links;
    }

    pub fn merge_links(&self) -> &[(usize, usize)] {
        &self.merge_links
    }

    /// 合并关节直接采用父角色的净变换，局部变换按本骨架重新推导
    pub(crate) fn apply_merge(&mut self, parent_net: &[NetTransform]) {
        if self.merge_links.is_empty() {
            return;
        }
        for &(joint, parent_joint) in &self.merge_links {
            let Some(target) = parent_net.get(parent_joint) else {
                continue;
            };
            let anchor = match self.skeleton.parent(joint) {
                Some(p) => self.net[p],
                None => NetTransform::IDENTITY,
            };
            let mut local = anchor.to_local(target);
            local.shear = read_joint(&self.local, joint).shear;
            write_joint(&mut self.local, joint, &local);
            self.net[joint] = anchor.compose(&local);
            // 子关节沿用已有的局部变换，净变换跟随合并关节
            for child in joint + 1..self.skeleton.joint_count() {
                if let Some(p) = self.skeleton.parent(child) {
                    if p >= joint {
                        self.net[child] = self.net[p].compose(&read_joint(&self.local, child));
                    }
                }
            }
        }
    }

    pub fn local_pose(&self) -> &[JointGroup] {
        &self.local
    }

    pub fn local_transform(&self, joint: usize) -> JointTransform {
        read_joint(&self.local, joint)
    }

    pub fn net_transforms(&self) -> &[NetTransform] {
        &self.net
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{AnimationLayerConfig, Channel, ChannelFlags, IkEvent, TimelineEvent, Window};
    use crate::test_util::{leg_skeleton, procedural_channel};
    use glam::{Quat, Vec3};

    fn root_offset(character: &Character, name: &str, y: f32) -> Arc<Channel> {
        let channel = procedural_channel(name, character.skeleton());
        if let crate::animation::ChannelKind::Procedural(p) = &channel.kind {
            p.set_joint(0, JointTransform::from_translation_rotation(Vec3::new(0.0, y, 0.0), Quat::IDENTITY));
        }
        Arc::new(channel)
    }

    #[test]
    fn test_no_layers_gives_bind_pose() {
        let mut character = Character::new("hero", leg_skeleton());
        character.update(0.016);
        assert!((character.net_transforms()[3].position - Vec3::new(0.0, 1.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn test_layers_compose_in_order() {
        let mut character = Character::new("hero", leg_skeleton());
        let low = root_offset(&character, "low", 1.0);
        let high = root_offset(&character, "high", 5.0);
        let half = AnimationLayerConfig {
            weight: 0.5,
            ..AnimationLayerConfig::default()
        };
        character.play(low, None).unwrap();
        character.play(high, Some(&half)).unwrap();
        character.compute_pose();
        assert!((character.local_transform(0).translation.y - 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_additive_layer_on_top() {
        let mut character = Character::new("hero", leg_skeleton());
        let base = root_offset(&character, "base", 1.0);
        let delta = procedural_channel("delta", character.skeleton()).with_flags(ChannelFlags::ADDITIVE);
        if let crate::animation::ChannelKind::Procedural(p) = &delta.kind {
            let n = character.skeleton().joint_count();
            p.set_pose(&vec![JointTransform::IDENTITY; n]);
            p.set_joint(0, JointTransform::from_translation_rotation(Vec3::new(0.0, 0.5, 0.0), Quat::IDENTITY));
        }
        character.play(base, None).unwrap();
        character.play(Arc::new(delta), None).unwrap();
        character.compute_pose();
        assert!((character.local_transform(0).translation.y - 1.5).abs() < 1e-5);
        assert!((character.local_transform(2).translation.y + 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_forced_value_overrides() {
        let mut character = Character::new("hero", leg_skeleton());
        let forced = JointTransform::from_translation_rotation(Vec3::new(9.0, 0.0, 0.0), Quat::IDENTITY);
        assert!(character.set_forced_value(4, Some(forced)));
        assert!(!character.set_forced_value(40, None));
        character.update(0.1);
        assert_eq!(character.local_transform(4).translation, Vec3::new(9.0, 0.0, 0.0));
    }

    #[test]
    fn test_activity_selection() {
        let mut character = Character::new("hero", leg_skeleton());
        let idle_a = procedural_channel("idle_a", character.skeleton()).with_activity("idle", 1.0);
        let idle_b = procedural_channel("idle_b", character.skeleton()).with_activity("idle", 3.0);
        character.add_channel(Arc::new(idle_a));
        character.add_channel(Arc::new(idle_b));

        assert_eq!(character.select_activity("idle", 0.1).unwrap().name, "idle_a");
        assert_eq!(character.select_activity("idle", 0.5).unwrap().name, "idle_b");
        assert!(character.select_activity("run", 0.5).is_none());

        let id = character.play_activity("idle", 0.9, None).unwrap();
        assert_eq!(character.layers().get_layer(id).unwrap().activity(), Some("idle"));
    }

    #[test]
    fn test_fired_events_surface() {
        let mut character = Character::new("hero", leg_skeleton());
        let mut channel = procedural_channel("step", character.skeleton()).with_event(TimelineEvent::new(0.5, 42, 1));
        channel.header.frame_count = 30;
        character.play(Arc::new(channel), None).unwrap();
        character.update(0.6);
        assert_eq!(character.fired_events().len(), 1);
        assert_eq!(character.fired_events()[0].event.payload, 1);
    }

    #[test]
    fn test_touch_ik_runs_after_composition() {
        let mut character = Character::new("hero", leg_skeleton());
        let chain = IkChain::new(character.skeleton(), "leg", [1, 2, 3], Vec3::Z).unwrap();
        character.add_ik_chain(chain);

        let bent = JointTransform::from_translation_rotation(Vec3::new(0.0, -1.0, 0.0), Quat::from_rotation_x(0.5));
        let touch = procedural_channel("touch", character.skeleton())
            .with_ik_event(IkEvent::touch(0, "root", Window::full()));
        if let crate::animation::ChannelKind::Procedural(p) = &touch.kind {
            p.set_joint(2, bent);
        }
        character.play(Arc::new(touch), None).unwrap();

        // 后一层把膝盖拉直，IK 需要把脚拉回接触层记录的位置
        let straighten = procedural_channel("straighten", character.skeleton())
            .with_weight_mask(vec![0.0, 0.0, 1.0, 0.0, 0.0])
            .unwrap();
        let config = AnimationLayerConfig {
            priority: 1,
            ..AnimationLayerConfig::default()
        };
        character.play(Arc::new(straighten), Some(&config)).unwrap();
        character.compute_pose();

        let expected = {
            let skeleton = leg_skeleton();
            let mut groups = skeleton.bind_groups().to_vec();
            write_joint(&mut groups, 2, &bent);
            skeleton.net_transform(&groups, 3).position - skeleton.net_transform(&groups, 0).position
        };
        let net = character.net_transforms();
        assert!(((net[3].position - net[0].position) - expected).length() < 1e-3);
    }
}
