//! 分层通道：按窗口把多个子通道依次叠到同一个姿态上

use std::sync::Arc;

use super::{Channel, EvalContext, IkHelper, PoseBuffer, Window, WindowPolicy};
use crate::model::PoseParameters;

/// 窗口的驱动量
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum WindowDriver {
    /// 父通道的周期
    #[default]
    Cycle,
    /// 姿态参数的原始值
    PoseParam(usize),
}

/// 分层通道中的一层
#[derive(Clone, Debug)]
pub struct LayeredEntry {
    pub channel: Arc<Channel>,
    pub window: Window,
    pub policy: WindowPolicy,
    pub driver: WindowDriver,
    /// 把子通道周期映射到窗口内
    pub local: bool,
}

impl LayeredEntry {
    pub fn new(channel: Arc<Channel>, window: Window) -> Self {
        Self {
            channel,
            window,
            policy: WindowPolicy::default(),
            driver: WindowDriver::default(),
            local: false,
        }
    }

    pub fn with_policy(mut self, policy: WindowPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn driven_by(mut self, param: usize) -> Self {
        self.driver = WindowDriver::PoseParam(param);
        self
    }

    pub fn local(mut self) -> Self {
        self.local = true;
        self
    }

    fn index(&self, ctx: &EvalContext, cycle: f32) -> f32 {
        match self.driver {
            WindowDriver::Cycle => cycle,
            WindowDriver::PoseParam(param) => ctx.params.value(param),
        }
    }
}

#[derive(Debug, Default)]
pub struct Layered {
    entries: Vec<LayeredEntry>,
}

impl Layered {
    pub fn entries(&self) -> &[LayeredEntry] {
        &self.entries
    }

    pub fn push(&mut self, entry: LayeredEntry) {
        self.entries.push(entry);
    }

    /// 基础层的时长
    pub fn length(&self, params: &PoseParameters) -> f32 {
        self.entries
            .first()
            .map_or(0.0, |base| base.channel.get_length(params))
    }

    /// 把各层依次累积进 `data`，以 `data.weight` 为累计权重
    pub fn accumulate(&self, ctx: &EvalContext, ik: &mut IkHelper, data: &mut PoseBuffer) {
        let accumulated = data.weight;
        let cycle = data.cycle;

        for entry in &self.entries {
            let index = entry.index(ctx, cycle);
            let Some(scale) = entry.window.scale(index) else {
                continue;
            };
            let weight = entry.policy.weight(&entry.window, index, scale, accumulated);
            if weight <= ctx.negligible_weight {
                continue;
            }
            data.weight = weight;
            data.cycle = if entry.local {
                entry.window.local_cycle(index)
            } else {
                cycle
            };
            entry.channel.calc_pose(ctx, ik, data);
        }

        data.weight = accumulated;
        data.cycle = cycle;
    }
}
