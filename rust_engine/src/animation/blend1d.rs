//! 一维混合：按姿态参数在相邻两个子通道间插值

use std::sync::Arc;

use wide::f32x4;

use super::{Channel, EvalContext, IkHelper, PoseBuffer};
use crate::math::EPSILON;
use crate::model::PoseParameters;

/// 一维混合的子通道
#[derive(Clone, Debug)]
pub struct Blend1DEntry {
    /// 归一化参数空间中的坐标
    pub coord: f32,
    pub channel: Arc<Channel>,
}

/// 参数查询的结果：`high` 为空时只使用 `low`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Blend1DSelection {
    pub low: usize,
    pub high: Option<usize>,
    pub frac: f32,
}

#[derive(Debug)]
pub struct Blend1D {
    param: usize,
    entries: Vec<Blend1DEntry>,
}

impl Blend1D {
    pub fn new(param: usize) -> Self {
        Self {
            param,
            entries: Vec::new(),
        }
    }

    pub fn param(&self) -> usize {
        self.param
    }

    pub fn entries(&self) -> &[Blend1DEntry] {
        &self.entries
    }

    /// 按坐标升序插入
    pub fn insert(&mut self, coord: f32, channel: Arc<Channel>) {
        let at = self.entries.partition_point(|e| e.coord <= coord);
        self.entries.insert(at, Blend1DEntry { coord, channel });
    }

    pub fn select(&self, coord: f32) -> Option<Blend1DSelection> {
        let last = self.entries.len().checked_sub(1)?;
        let single = |index| Blend1DSelection {
            low: index,
            high: None,
            frac: 0.0,
        };
        if coord <= self.entries[0].coord {
            return Some(single(0));
        }
        if coord >= self.entries[last].coord {
            return Some(single(last));
        }

        let high = self.entries.partition_point(|e| e.coord < coord);
        if (self.entries[high].coord - coord).abs() <= EPSILON {
            return Some(single(high));
        }
        let low = high - 1;
        let span = self.entries[high].coord - self.entries[low].coord;
        if span <= EPSILON {
            return Some(single(low));
        }
        Some(Blend1DSelection {
            low,
            high: Some(high),
            frac: (coord - self.entries[low].coord) / span,
        })
    }

    fn query(&self, params: &PoseParameters) -> Option<Blend1DSelection> {
        self.select(params.normalized(self.param))
    }

    pub fn length(&self, params: &PoseParameters) -> f32 {
        let Some(sel) = self.query(params) else {
            return 0.0;
        };
        let low = self.entries[sel.low].channel.get_length(params);
        match sel.high {
            Some(high) => {
                let high = self.entries[high].channel.get_length(params);
                low + (high - low) * sel.frac
            }
            None => low,
        }
    }

    pub fn calc(&self, ctx: &EvalContext, ik: &mut IkHelper, out: &mut PoseBuffer) {
        let Some(sel) = self.query(ctx.params) else {
            return;
        };
        let low = &self.entries[sel.low].channel;
        let Some(high) = sel.high else {
            out.weight = 1.0;
            low.calc_pose(ctx, ik, out);
            return;
        };
        let high = &self.entries[high].channel;

        let mut other = PoseBuffer::copied(ctx, out, out.cycle);
        out.weight = 1.0;
        low.calc_pose(ctx, ik, out);
        high.calc_pose(ctx, ik, &mut other);

        let t = f32x4::splat(sel.frac);
        for g in 0..ctx.group_count {
            let b = other.groups()[g];
            let dst = &mut out.groups_mut()[g];
            *dst = dst.lerp(&b, t);
        }
    }
}
