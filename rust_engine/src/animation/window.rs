//! 时间窗口：start → peak 渐入，peak → tail 保持，tail → end 渐出
//!
//! 分层通道和 IK 事件共用这一套权重计算。

use crate::math::{smooth_step, EPSILON};

/// 四点窗口
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Window {
    pub start: f32,
    pub peak: f32,
    pub tail: f32,
    pub end: f32,
    /// 用 3s² − 2s³ 平滑渐入渐出
    pub spline: bool,
}

impl Window {
    pub fn new(start: f32, peak: f32, tail: f32, end: f32) -> Self {
        Self {
            start,
            peak: peak.max(start),
            tail: tail.max(peak.max(start)),
            end: end.max(tail.max(peak.max(start))),
            spline: false,
        }
    }

    /// 覆盖整个周期、没有渐变的窗口
    pub fn full() -> Self {
        Self::new(0.0, 0.0, 1.0, 1.0)
    }

    pub fn with_spline(mut self) -> Self {
        self.spline = true;
        self
    }

    pub fn contains(&self, index: f32) -> bool {
        index >= self.start && index < self.end
    }

    /// `index` 处的渐变系数，窗口外返回 `None`
    pub fn scale(&self, index: f32) -> Option<f32> {
        if !self.contains(index) {
            return None;
        }
        let s = if index < self.peak && self.peak - self.start > EPSILON {
            (index - self.start) / (self.peak - self.start)
        } else if index >= self.tail && self.end - self.tail > EPSILON {
            (self.end - index) / (self.end - self.tail)
        } else {
            1.0
        };
        let s = s.clamp(0.0, 1.0);
        Some(if self.spline { smooth_step(s) } else { s })
    }

    /// 把 `index` 映射到窗口内的局部周期 [0, 1)
    pub fn local_cycle(&self, index: f32) -> f32 {
        let span = self.end - self.start;
        if span <= EPSILON {
            return 0.0;
        }
        ((index - self.start) / span).clamp(0.0, 1.0)
    }
}

/// 窗口权重与累计权重的组合方式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum WindowPolicy {
    /// 与累计权重相乘
    #[default]
    Multiply,
    /// 直接使用窗口系数，忽略累计权重
    NoBlend,
    /// 过了 tail 之后做真正的交叉淡化
    Crossfade,
}

impl WindowPolicy {
    pub fn weight(self, window: &Window, index: f32, scale: f32, accumulated: f32) -> f32 {
        match self {
            WindowPolicy::NoBlend => scale,
            WindowPolicy::Crossfade if index > window.tail => {
                let denom = 1.0 - accumulated + scale * accumulated;
                if denom <= EPSILON {
                    0.0
                } else {
                    (scale * accumulated / denom).clamp(0.0, 1.0)
                }
            }
            WindowPolicy::Multiply | WindowPolicy::Crossfade => scale * accumulated,
        }
    }
}
