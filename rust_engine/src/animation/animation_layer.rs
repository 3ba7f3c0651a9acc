//! 动画层系统 - 多层通道的调度
//!
//! 每个角色持有固定数量的层槽位：
//! - 每层有独立的周期、播放速度、权重和播放模式
//! - 按 (优先级, 插入序号) 排序后依次合成
//! - 淡入淡出由通道声明，回收（kill）有独立的延迟和衰减速率
//! - 死亡的槽位先经过一帧 Dying 再回到 Dead，之后才能被重新分配

use std::collections::BTreeSet;
use std::sync::Arc;

use super::{crossed_events, Channel, ChannelFlags, CycleWindow, PlayMode, TimelineEvent};
use crate::math::EPSILON;
use crate::model::PoseParameters;

/// 默认层槽位数
pub const MAX_LAYERS: usize = 16;

/// 周期上限（不含 1）
const MAX_CYCLE: f32 = 1.0 - f32::EPSILON;

/// 动画层状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum AnimationLayerState {
    /// 空闲槽位
    #[default]
    Dead,
    /// 正常播放
    Active,
    /// 回收中，权重按速率衰减
    Killing,
    /// 已移出排序，下一帧回到 Dead
    Dying,
}

/// 层句柄，槽位被回收后旧句柄失效
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LayerId {
    slot: usize,
    generation: u32,
}

impl LayerId {
    pub fn slot(&self) -> usize {
        self.slot
    }
}

/// 新建层的配置
#[derive(Clone, Debug)]
pub struct AnimationLayerConfig {
    /// 层权重（0.0 - 1.0）
    pub weight: f32,
    /// 播放速度倍率
    pub rate: f32,
    pub priority: i32,
    pub play_mode: PlayMode,
    pub window: CycleWindow,
    /// 播放结束后自动回收
    pub autokill: bool,
    /// 自动回收的衰减速率（每秒）
    pub kill_rate: f32,
}

impl Default for AnimationLayerConfig {
    fn default() -> Self {
        Self {
            weight: 1.0,
            rate: 1.0,
            priority: 0,
            play_mode: PlayMode::Play,
            window: CycleWindow::default(),
            autokill: false,
            kill_rate: 4.0,
        }
    }
}

/// 周期推进中跨过的时间轴事件
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FiredEvent {
    pub layer: LayerId,
    pub event: TimelineEvent,
}

/// 单个动画层
#[derive(Debug, Default)]
pub struct AnimationLayer {
    channel: Option<Arc<Channel>>,
    generation: u32,
    state: AnimationLayerState,
    cycle: f32,
    prev_cycle: f32,
    start_cycle: f32,
    window: CycleWindow,
    rate: f32,
    weight: f32,
    ramp: f32,
    kill_weight: f32,
    kill_rate: f32,
    kill_delay: f32,
    priority: i32,
    order: usize,
    sequence: u64,
    activity: Option<String>,
    play_mode: PlayMode,
    autokill: bool,
    auto_kill_rate: f32,
    finished: bool,
    backward: bool,
    age: f32,
}

impl AnimationLayer {
    fn start(&mut self, channel: Arc<Channel>, config: &AnimationLayerConfig, sequence: u64) {
        let generation = self.generation;
        *self = Self {
            generation,
            state: AnimationLayerState::Active,
            cycle: config.window.start,
            prev_cycle: config.window.start,
            start_cycle: config.window.start,
            window: config.window,
            rate: config.rate.max(0.0),
            weight: config.weight.clamp(0.0, 1.0),
            ramp: if channel.header.fade_in > EPSILON && !channel.flags().contains(ChannelFlags::SNAP) {
                0.0
            } else {
                1.0
            },
            kill_weight: 1.0,
            priority: config.priority,
            sequence,
            play_mode: config.play_mode,
            autokill: config.autokill,
            auto_kill_rate: config.kill_rate,
            channel: Some(channel),
            ..Self::default()
        };
    }

    /// 清空槽位，旧句柄随之失效
    fn reset(&mut self) {
        let generation = self.generation.wrapping_add(1);
        *self = Self {
            generation,
            ..Self::default()
        };
    }

    fn id(&self, slot: usize) -> LayerId {
        LayerId {
            slot,
            generation: self.generation,
        }
    }

    fn in_order(&self) -> bool {
        matches!(self.state, AnimationLayerState::Active | AnimationLayerState::Killing)
    }

    fn order_key(&self, slot: usize) -> (i32, u64, usize) {
        (self.priority, self.sequence, slot)
    }

    fn begin_kill(&mut self, rate: f32, delay: f32) {
        if self.state != AnimationLayerState::Active {
            return;
        }
        self.state = AnimationLayerState::Killing;
        self.kill_rate = rate;
        self.kill_delay = delay.max(0.0);
    }

    pub fn channel(&self) -> Option<&Arc<Channel>> {
        self.channel.as_ref()
    }

    pub fn state(&self) -> AnimationLayerState {
        self.state
    }

    pub fn cycle(&self) -> f32 {
        self.cycle
    }

    pub fn prev_cycle(&self) -> f32 {
        self.prev_cycle
    }

    pub fn start_cycle(&self) -> f32 {
        self.start_cycle
    }

    pub fn window(&self) -> CycleWindow {
        self.window
    }

    pub fn play_mode(&self) -> PlayMode {
        self.play_mode
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    /// 获取配置权重
    pub fn weight(&self) -> f32 {
        self.weight
    }

    /// 淡入淡出系数
    pub fn ramp(&self) -> f32 {
        self.ramp
    }

    pub fn kill_weight(&self) -> f32 {
        self.kill_weight
    }

    /// 合成时使用的权重
    pub fn effective_weight(&self) -> f32 {
        if !self.in_order() {
            return 0.0;
        }
        (self.weight * self.ramp * self.kill_weight).clamp(0.0, 1.0)
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// 在活动层中的合成次序
    pub fn order(&self) -> usize {
        self.order
    }

    pub fn activity(&self) -> Option<&str> {
        self.activity.as_deref()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// 推进周期，顺带收集跨过的事件
    fn advance_cycle(&mut self, dt: f32, length: f32, fired: &mut Vec<FiredEvent>, id: LayerId) {
        self.prev_cycle = self.cycle;
        if self.play_mode == PlayMode::Pose || length <= EPSILON {
            return;
        }
        let delta = dt * self.rate / length;
        if delta <= 0.0 {
            return;
        }
        let CycleWindow { start, end } = self.window;
        let span = end - start;
        let from = self.cycle;
        let events: &[TimelineEvent] = match &self.channel {
            Some(c) => &c.header.events,
            None => &[],
        };
        let mut fire = |from: f32, to: f32, wrapped: bool, backward: bool| {
            fired.extend(crossed_events(events, from, to, wrapped, backward).map(|e| FiredEvent { layer: id, event: *e }));
        };

        match self.play_mode {
            PlayMode::Pose => {}
            PlayMode::Play => {
                let mut to = from + delta;
                if to >= end {
                    to = end.min(MAX_CYCLE);
                    self.finished = true;
                }
                fire(from, to, false, false);
                self.cycle = to;
            }
            PlayMode::Loop => {
                let mut to = from + delta;
                if to >= end {
                    to = if span > EPSILON {
                        start + (to - start) % span
                    } else {
                        start
                    };
                    self.finished = true;
                    fire(from, to, true, false);
                } else {
                    fire(from, to, false, false);
                }
                self.cycle = to.min(MAX_CYCLE);
            }
            PlayMode::PingPong => {
                let mut delta = delta;
                if span > EPSILON {
                    delta %= 2.0 * span;
                }
                if !self.backward {
                    let to = from + delta;
                    if to >= end {
                        let back = (end - (to - end)).max(start);
                        fire(from, end, false, false);
                        fire(end, back, false, true);
                        self.backward = true;
                        self.cycle = back.min(MAX_CYCLE);
                    } else {
                        fire(from, to, false, false);
                        self.cycle = to;
                    }
                } else {
                    let to = from - delta;
                    if to <= start {
                        let fwd = (start + (start - to)).min(end);
                        fire(from, start, false, true);
                        fire(start, fwd, false, false);
                        self.backward = false;
                        self.finished = true;
                        self.cycle = fwd.min(MAX_CYCLE);
                    } else {
                        fire(from, to, false, true);
                        self.cycle = to;
                    }
                }
            }
        }
    }

    fn update_ramp(&mut self, length: f32) {
        let Some(channel) = &self.channel else {
            self.ramp = 0.0;
            return;
        };
        if channel.flags().contains(ChannelFlags::SNAP) {
            self.ramp = 1.0;
            return;
        }
        let fade_in = channel.header.fade_in;
        let fade_out = channel.header.fade_out;
        let ramp_in = if fade_in > EPSILON {
            (self.age / fade_in).min(1.0)
        } else {
            1.0
        };
        let ramp_out = if fade_out > EPSILON && self.play_mode == PlayMode::Play && self.rate > EPSILON {
            let remaining = (self.window.end - self.cycle).max(0.0) * length / self.rate;
            (remaining / fade_out).min(1.0)
        } else {
            1.0
        };
        self.ramp = (ramp_in * ramp_out).clamp(0.0, 1.0);
    }
}

/// 动画层管理器
pub struct AnimationLayerManager {
    layers: Vec<AnimationLayer>,
    order: BTreeSet<(i32, u64, usize)>,
    next_sequence: u64,
    defaults: AnimationLayerConfig,
    fired: Vec<FiredEvent>,
}

impl Default for AnimationLayerManager {
    fn default() -> Self {
        Self::new(MAX_LAYERS)
    }
}

impl AnimationLayerManager {
    /// 创建层管理器
    pub fn new(max_layers: usize) -> Self {
        let mut layers = Vec::with_capacity(max_layers);
        layers.resize_with(max_layers, AnimationLayer::default);
        Self {
            layers,
            order: BTreeSet::new(),
            next_sequence: 0,
            defaults: AnimationLayerConfig::default(),
            fired: Vec::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.layers.len()
    }

    pub fn default_config(&self) -> &AnimationLayerConfig {
        &self.defaults
    }

    pub fn set_default_config(&mut self, config: AnimationLayerConfig) {
        self.defaults = config;
    }

    fn next_sequence(&mut self) -> u64 {
        let seq = self.next_sequence;
        self.next_sequence += 1;
        seq
    }

    fn renumber(&mut self) {
        for (order, &(_, _, slot)) in self.order.iter().enumerate() {
            self.layers[slot].order = order;
        }
    }

    fn get_mut(&mut self, id: LayerId) -> Option<&mut AnimationLayer> {
        self.layers
            .get_mut(id.slot)
            .filter(|l| l.generation == id.generation && l.state != AnimationLayerState::Dead)
    }

    /// 获取层（只读），句柄失效时返回 `None`
    pub fn get_layer(&self, id: LayerId) -> Option<&AnimationLayer> {
        self.layers
            .get(id.slot)
            .filter(|l| l.generation == id.generation && l.state != AnimationLayerState::Dead)
    }

    /// 在编号最小的空闲槽位上播放 `channel`，槽位用尽返回 `None`
    pub fn allocate_layer(&mut self, channel: Arc<Channel>, config: Option<&AnimationLayerConfig>) -> Option<LayerId> {
        let Some(slot) = self
            .layers
            .iter()
            .position(|l| l.state == AnimationLayerState::Dead)
        else {
            log::warn!("层槽位已满 ({}), 丢弃通道 '{}'", self.layers.len(), channel.name);
            return None;
        };
        let config = config.cloned().unwrap_or_else(|| self.defaults.clone());
        let sequence = self.next_sequence();
        let layer = &mut self.layers[slot];
        log::debug!("层 {} 开始播放 '{}' (优先级 {})", slot, channel.name, config.priority);
        layer.start(channel, &config, sequence);
        let key = layer.order_key(slot);
        let id = layer.id(slot);
        self.order.insert(key);
        self.renumber();
        Some(id)
    }

    /// 带活动标签的播放
    pub fn allocate_activity_layer(
        &mut self,
        channel: Arc<Channel>,
        activity: &str,
        config: Option<&AnimationLayerConfig>,
    ) -> Option<LayerId> {
        let id = self.allocate_layer(channel, config)?;
        if let Some(layer) = self.get_mut(id) {
            layer.activity = Some(activity.to_string());
        }
        Some(id)
    }

    /// 设置层权重
    pub fn set_layer_weight(&mut self, id: LayerId, weight: f32) -> bool {
        match self.get_mut(id) {
            Some(layer) => {
                layer.weight = weight.clamp(0.0, 1.0);
                true
            }
            None => false,
        }
    }

    /// 设置层播放速度
    pub fn set_layer_rate(&mut self, id: LayerId, rate: f32) -> bool {
        match self.get_mut(id) {
            Some(layer) => {
                layer.rate = rate.max(0.0);
                true
            }
            None => false,
        }
    }

    /// 跳转到指定周期（夹在播放窗口内），不触发事件
    pub fn seek_layer(&mut self, id: LayerId, cycle: f32) -> bool {
        match self.get_mut(id) {
            Some(layer) => {
                let c = cycle.clamp(layer.window.start, layer.window.end).min(MAX_CYCLE);
                layer.cycle = c;
                layer.prev_cycle = c;
                layer.finished = false;
                true
            }
            None => false,
        }
    }

    /// 开始回收：先等待 `delay` 秒，再以 `rate`（每秒）把权重衰减到零
    pub fn kill_layer(&mut self, id: LayerId, rate: f32, delay: f32) -> bool {
        match self.get_mut(id) {
            Some(layer) if layer.state == AnimationLayerState::Active => {
                log::debug!("层 {} 开始回收 (速率 {}, 延迟 {})", id.slot, rate, delay);
                layer.begin_kill(rate, delay);
                true
            }
            _ => false,
        }
    }

    /// 立即移除
    pub fn remove_layer(&mut self, id: LayerId) -> bool {
        let Some(layer) = self.get_mut(id) else {
            return false;
        };
        let key = layer.order_key(id.slot);
        layer.reset();
        self.order.remove(&key);
        self.renumber();
        true
    }

    /// 修改优先级；以新的插入序号重新排序
    pub fn set_layer_priority(&mut self, id: LayerId, priority: i32) -> bool {
        let sequence = self.next_sequence();
        let Some(layer) = self.get_mut(id) else {
            return false;
        };
        let old = layer.order_key(id.slot);
        let in_order = layer.in_order();
        layer.priority = priority;
        layer.sequence = sequence;
        let new = layer.order_key(id.slot);
        if in_order {
            self.order.remove(&old);
            self.order.insert(new);
            self.renumber();
        }
        true
    }

    /// 按合成次序列出活动层（含回收中的层）
    pub fn active_layers(&self) -> impl Iterator<Item = (LayerId, &AnimationLayer)> + '_ {
        self.order.iter().map(move |&(_, _, slot)| {
            let layer = &self.layers[slot];
            (layer.id(slot), layer)
        })
    }

    pub fn active_count(&self) -> usize {
        self.order.len()
    }

    /// 上一次 [`advance`](Self::advance) 触发的事件
    pub fn fired_events(&self) -> &[FiredEvent] {
        &self.fired
    }

    /// 推进所有层的周期与生命周期
    pub fn advance(&mut self, dt: f32, params: &PoseParameters) {
        self.fired.clear();
        let dt = dt.max(0.0);
        let mut order_changed = false;

        for slot in 0..self.layers.len() {
            let layer = &mut self.layers[slot];
            match layer.state {
                // 失效句柄无法写入空闲槽位，权重恒为零
                AnimationLayerState::Dead => debug_assert_eq!(layer.weight, 0.0),
                AnimationLayerState::Dying => {
                    log::debug!("层 {} 回收完毕", slot);
                    layer.reset();
                }
                AnimationLayerState::Killing => {
                    let mut remaining = dt;
                    if layer.kill_delay > 0.0 {
                        let used = layer.kill_delay.min(remaining);
                        layer.kill_delay -= used;
                        remaining -= used;
                    }
                    if layer.kill_rate <= 0.0 {
                        if layer.kill_delay <= 0.0 {
                            layer.kill_weight = 0.0;
                        }
                    } else {
                        layer.kill_weight -= layer.kill_rate * remaining;
                    }
                    if layer.kill_weight <= EPSILON {
                        layer.kill_weight = 0.0;
                        layer.state = AnimationLayerState::Dying;
                        self.order.remove(&layer.order_key(slot));
                        order_changed = true;
                    }
                }
                AnimationLayerState::Active => {
                    let length = layer.channel.as_ref().map_or(0.0, |c| c.get_length(params));
                    let id = layer.id(slot);
                    layer.age += dt;
                    layer.advance_cycle(dt, length, &mut self.fired, id);
                    layer.update_ramp(length);
                    if layer.finished && layer.autokill {
                        let rate = layer.auto_kill_rate;
                        layer.begin_kill(rate, 0.0);
                    }
                }
            }
        }

        if order_changed {
            self.renumber();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{procedural_channel, TestRig};

    fn manager_with(n: usize) -> (TestRig, AnimationLayerManager, Vec<LayerId>) {
        let rig = TestRig::new();
        let mut manager = AnimationLayerManager::new(4);
        let ids = (0..n)
            .map(|i| {
                let channel = Arc::new(procedural_channel(&format!("c{}", i), &rig.skeleton));
                manager.allocate_layer(channel, None).unwrap()
            })
            .collect();
        (rig, manager, ids)
    }

    fn assert_dense(manager: &AnimationLayerManager) {
        let orders: Vec<usize> = manager.active_layers().map(|(_, l)| l.order()).collect();
        assert_eq!(orders, (0..manager.active_count()).collect::<Vec<_>>());
    }

    #[test]
    fn test_allocation_uses_lowest_free_slot() {
        let (rig, mut manager, ids) = manager_with(4);
        let extra = Arc::new(procedural_channel("extra", &rig.skeleton));
        assert!(manager.allocate_layer(extra.clone(), None).is_none());

        assert!(manager.remove_layer(ids[1]));
        let again = manager.allocate_layer(extra, None).unwrap();
        assert_eq!(again.slot(), 1);
        assert!(manager.get_layer(ids[1]).is_none());
        assert!(manager.get_layer(again).is_some());
    }

    #[test]
    fn test_removed_slot_stays_dead() {
        let (rig, mut manager, ids) = manager_with(2);
        assert!(manager.remove_layer(ids[0]));
        assert!(!manager.set_layer_weight(ids[0], 1.0));
        assert!(!manager.seek_layer(ids[0], 0.5));

        for _ in 0..3 {
            manager.advance(0.1, &rig.params);
        }
        assert!(manager.get_layer(ids[0]).is_none());
        assert_eq!(manager.active_count(), 1);
        assert!(manager.fired_events().is_empty());

        let again = manager
            .allocate_layer(Arc::new(procedural_channel("again", &rig.skeleton)), None)
            .unwrap();
        assert_eq!(again.slot(), 0);
        assert_eq!(manager.get_layer(again).unwrap().state(), AnimationLayerState::Active);
    }

    #[test]
    fn test_order_stays_dense() {
        let (rig, mut manager, ids) = manager_with(3);
        assert_dense(&manager);

        manager.set_layer_priority(ids[0], 5);
        assert_dense(&manager);
        let first = manager.active_layers().last().map(|(id, _)| id);
        assert_eq!(first, Some(ids[0]));

        manager.remove_layer(ids[1]);
        assert_dense(&manager);

        let channel = Arc::new(procedural_channel("late", &rig.skeleton));
        let late = manager.allocate_layer(channel, None).unwrap();
        assert_dense(&manager);
        assert_eq!(manager.get_layer(late).unwrap().order(), 1);
    }

    #[test]
    fn test_equal_priority_keeps_insertion_order() {
        let (_, manager, ids) = manager_with(3);
        let listed: Vec<LayerId> = manager.active_layers().map(|(id, _)| id).collect();
        assert_eq!(listed, ids);
    }

    #[test]
    fn test_kill_lifecycle() {
        let (rig, mut manager, ids) = manager_with(1);
        let id = ids[0];
        assert!(manager.kill_layer(id, 2.0, 0.0));

        manager.advance(0.25, &rig.params);
        assert_eq!(manager.get_layer(id).unwrap().state(), AnimationLayerState::Killing);
        assert!((manager.get_layer(id).unwrap().effective_weight() - 0.5).abs() < 1e-6);

        manager.advance(0.25, &rig.params);
        assert_eq!(manager.get_layer(id).unwrap().state(), AnimationLayerState::Dying);
        assert_eq!(manager.active_count(), 0);

        manager.advance(0.25, &rig.params);
        assert!(manager.get_layer(id).is_none());

        let channel = Arc::new(procedural_channel("next", &rig.skeleton));
        let config = AnimationLayerConfig {
            priority: 3,
            ..AnimationLayerConfig::default()
        };
        let reused = manager.allocate_layer(channel, Some(&config)).unwrap();
        assert_eq!(reused.slot(), id.slot());
        let layer = manager.get_layer(reused).unwrap();
        assert_eq!(layer.order(), 0);
        assert_eq!(layer.priority(), 3);
        assert_eq!(layer.kill_weight(), 1.0);
    }

    #[test]
    fn test_kill_delay() {
        let (rig, mut manager, ids) = manager_with(1);
        manager.kill_layer(ids[0], 1.0, 0.5);
        manager.advance(0.25, &rig.params);
        assert_eq!(manager.get_layer(ids[0]).unwrap().kill_weight(), 1.0);
        manager.advance(0.5, &rig.params);
        assert!((manager.get_layer(ids[0]).unwrap().kill_weight() - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_loop_wraps_and_fires_events() {
        let rig = TestRig::new();
        let channel = Arc::new(
            rig.timed_channel("loop", 10, 10.0)
                .with_event(TimelineEvent::new(0.1, 7, 0))
                .with_event(TimelineEvent::new(0.9, 9, 0)),
        );
        let mut manager = AnimationLayerManager::default();
        let config = AnimationLayerConfig {
            play_mode: PlayMode::Loop,
            ..AnimationLayerConfig::default()
        };
        let id = manager.allocate_layer(channel, Some(&config)).unwrap();

        manager.advance(0.5, &rig.params);
        assert!((manager.get_layer(id).unwrap().cycle() - 0.5).abs() < 1e-5);
        assert_eq!(manager.fired_events().len(), 1);
        assert_eq!(manager.fired_events()[0].event.kind, 7);

        manager.advance(0.7, &rig.params);
        let layer = manager.get_layer(id).unwrap();
        assert!((layer.cycle() - 0.2).abs() < 1e-5);
        assert!(layer.is_finished());
        let kinds: Vec<i32> = manager.fired_events().iter().map(|e| e.event.kind).collect();
        assert_eq!(kinds, vec![7, 9]);
    }

    #[test]
    fn test_play_clamps_and_autokills() {
        let rig = TestRig::new();
        let channel = Arc::new(rig.timed_channel("once", 10, 10.0));
        let mut manager = AnimationLayerManager::default();
        let config = AnimationLayerConfig {
            autokill: true,
            ..AnimationLayerConfig::default()
        };
        let id = manager.allocate_layer(channel, Some(&config)).unwrap();
        manager.advance(2.0, &rig.params);
        let layer = manager.get_layer(id).unwrap();
        assert!(layer.cycle() < 1.0);
        assert!(layer.is_finished());
        assert_eq!(layer.state(), AnimationLayerState::Killing);
    }

    #[test]
    fn test_pingpong_bounces() {
        let rig = TestRig::new();
        let channel = Arc::new(rig.timed_channel("pp", 10, 10.0));
        let mut manager = AnimationLayerManager::default();
        let config = AnimationLayerConfig {
            play_mode: PlayMode::PingPong,
            ..AnimationLayerConfig::default()
        };
        let id = manager.allocate_layer(channel, Some(&config)).unwrap();
        manager.advance(0.75, &rig.params);
        manager.advance(0.5, &rig.params);
        assert!((manager.get_layer(id).unwrap().cycle() - 0.75).abs() < 1e-5);
        manager.advance(1.0, &rig.params);
        let layer = manager.get_layer(id).unwrap();
        assert!((layer.cycle() - 0.25).abs() < 1e-5);
        assert!(layer.is_finished());
    }

    #[test]
    fn test_fade_in_ramp() {
        let rig = TestRig::new();
        let channel = Arc::new(rig.timed_channel("fade", 10, 10.0).with_fades(0.5, 0.0));
        let mut manager = AnimationLayerManager::default();
        let id = manager.allocate_layer(channel, None).unwrap();
        assert_eq!(manager.get_layer(id).unwrap().effective_weight(), 0.0);
        manager.advance(0.25, &rig.params);
        assert!((manager.get_layer(id).unwrap().effective_weight() - 0.5).abs() < 1e-5);
    }
}
