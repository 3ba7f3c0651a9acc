//! 二维混合：在两个姿态参数张成的平面上按三角剖分插值

use std::sync::{Arc, OnceLock};

use glam::Vec2;
use wide::f32x4;

use super::delaunay::{blend_weights, triangulate, BlendWeights};
use super::{Channel, EvalContext, IkHelper, PoseBuffer};
use crate::math::EPSILON;
use crate::model::PoseParameters;

#[derive(Clone, Debug)]
pub struct Blend2DEntry {
    /// 归一化参数平面上的坐标
    pub coord: Vec2,
    pub channel: Arc<Channel>,
}

/// 坐标快照与它的三角剖分，随子通道一起失效
#[derive(Debug)]
struct Triangulation {
    points: Vec<Vec2>,
    triangles: Vec<[usize; 3]>,
}

#[derive(Debug)]
pub struct Blend2D {
    x_param: usize,
    y_param: usize,
    entries: Vec<Blend2DEntry>,
    triangulation: OnceLock<Triangulation>,
}

impl Blend2D {
    pub fn new(x_param: usize, y_param: usize) -> Self {
        Self {
            x_param,
            y_param,
            entries: Vec::new(),
            triangulation: OnceLock::new(),
        }
    }

    pub fn entries(&self) -> &[Blend2DEntry] {
        &self.entries
    }

    /// 添加子通道，已有的三角剖分作废
    pub fn insert(&mut self, coord: Vec2, channel: Arc<Channel>) {
        self.entries.push(Blend2DEntry { coord, channel });
        self.triangulation = OnceLock::new();
    }

    fn triangulation(&self) -> &Triangulation {
        self.triangulation.get_or_init(|| {
            let points: Vec<Vec2> = self.entries.iter().map(|e| e.coord).collect();
            let triangles = triangulate(&points);
            log::debug!("二维混合重建三角剖分: {} 个点, {} 个三角形", points.len(), triangles.len());
            Triangulation { points, triangles }
        })
    }

    pub fn triangles(&self) -> &[[usize; 3]] {
        &self.triangulation().triangles
    }

    pub fn weights_at(&self, query: Vec2) -> Option<BlendWeights> {
        let triangulation = self.triangulation();
        blend_weights(&triangulation.points, &triangulation.triangles, query)
    }

    fn query(&self, params: &PoseParameters) -> Option<BlendWeights> {
        let q = Vec2::new(params.normalized(self.x_param), params.normalized(self.y_param));
        self.weights_at(q)
    }

    pub fn length(&self, params: &PoseParameters) -> f32 {
        let Some(weights) = self.query(params) else {
            return 0.0;
        };
        weights
            .iter()
            .map(|(i, w)| self.entries[i].channel.get_length(params) * w)
            .sum()
    }

    pub fn calc(&self, ctx: &EvalContext, ik: &mut IkHelper, out: &mut PoseBuffer) {
        let Some(weights) = self.query(ctx.params) else {
            return;
        };
        if let Some((index, _)) = weights.iter().find(|(_, w)| *w >= 1.0 - EPSILON) {
            out.weight = 1.0;
            self.entries[index].channel.calc_pose(ctx, ik, out);
            return;
        }

        let [ia, ib, ic] = weights.indices;
        let [wa, wb, wc] = weights.weights;

        let mut b = PoseBuffer::copied(ctx, out, out.cycle);
        let mut c = if weights.count == 3 {
            Some(PoseBuffer::copied(ctx, out, out.cycle))
        } else {
            None
        };
        out.weight = 1.0;
        self.entries[ia].channel.calc_pose(ctx, ik, out);
        self.entries[ib].channel.calc_pose(ctx, ik, &mut b);
        if let Some(c) = c.as_mut() {
            self.entries[ic].channel.calc_pose(ctx, ik, c);
        }

        let (sa, sb, sc) = (f32x4::splat(wa), f32x4::splat(wb), f32x4::splat(wc));
        for g in 0..ctx.group_count {
            let gb = b.groups()[g];
            let gc = c.as_ref().map(|c| c.groups()[g]);
            let dst = &mut out.groups_mut()[g];

            let mut translation = dst.translation.scale(sa) + gb.translation.scale(sb);
            let mut scale = dst.scale.scale(sa) + gb.scale.scale(sb);
            let mut shear = dst.shear.scale(sa) + gb.shear.scale(sb);
            let mut rotation = dst.rotation;
            match gc {
                Some(gc) => {
                    translation = translation.mul_add(gc.translation, sc);
                    scale = scale.mul_add(gc.scale, sc);
                    shear = shear.mul_add(gc.shear, sc);
                    if wb > EPSILON {
                        rotation = rotation.lerp(gb.rotation, f32x4::splat(wb / (wa + wb)));
                        rotation = rotation.lerp(gc.rotation, sc);
                    } else if wa + wc > EPSILON {
                        rotation = rotation.lerp(gc.rotation, f32x4::splat(wc / (wa + wc)));
                    }
                }
                None => {
                    rotation = rotation.lerp(gb.rotation, sb);
                }
            }
            dst.translation = translation;
            dst.rotation = rotation;
            dst.scale = scale;
            dst.shear = shear;
        }
    }
}
