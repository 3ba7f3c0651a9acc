//! Bowyer–Watson 三角剖分与二维混合权重

use glam::Vec2;

use crate::math::EPSILON;

/// 最多三个子通道及其权重
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlendWeights {
    pub indices: [usize; 3],
    pub weights: [f32; 3],
    pub count: usize,
}

impl BlendWeights {
    fn single(index: usize) -> Self {
        Self {
            indices: [index, 0, 0],
            weights: [1.0, 0.0, 0.0],
            count: 1,
        }
    }

    fn edge(a: usize, b: usize, t: f32) -> Self {
        Self {
            indices: [a, b, 0],
            weights: [1.0 - t, t, 0.0],
            count: 2,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f32)> + '_ {
        self.indices[..self.count]
            .iter()
            .copied()
            .zip(self.weights[..self.count].iter().copied())
    }

    pub fn sum(&self) -> f32 {
        self.weights[..self.count].iter().sum()
    }
}

/// 外接圆
fn circumcircle(a: Vec2, b: Vec2, c: Vec2) -> Option<(Vec2, f32)> {
    let d = 2.0 * (a.x * (b.y - c.y) + b.x * (c.y - a.y) + c.x * (a.y - b.y));
    if d.abs() <= EPSILON {
        return None;
    }
    let (a2, b2, c2) = (a.length_squared(), b.length_squared(), c.length_squared());
    let center = Vec2::new(
        (a2 * (b.y - c.y) + b2 * (c.y - a.y) + c2 * (a.y - b.y)) / d,
        (a2 * (c.x - b.x) + b2 * (a.x - c.x) + c2 * (b.x - a.x)) / d,
    );
    Some((center, center.distance_squared(a)))
}

/// 对点集做 Delaunay 三角剖分，返回点索引三元组
///
/// 少于三个点或全部共线时结果为空。
pub fn triangulate(points: &[Vec2]) -> Vec<[usize; 3]> {
    let n = points.len();
    if n < 3 {
        return Vec::new();
    }

    let (min, max) = points
        .iter()
        .fold((points[0], points[0]), |(lo, hi), p| (lo.min(*p), hi.max(*p)));
    let span = (max - min).max_element().max(1.0);
    let mid = (min + max) * 0.5;

    // 超级三角形的三个顶点放在 n, n+1, n+2
    let mut verts = points.to_vec();
    verts.push(mid + Vec2::new(-20.0 * span, -span));
    verts.push(mid + Vec2::new(0.0, 20.0 * span));
    verts.push(mid + Vec2::new(20.0 * span, -span));

    let mut triangles: Vec<[usize; 3]> = vec![[n, n + 1, n + 2]];
    for i in 0..n {
        let p = verts[i];
        let (bad, good): (Vec<[usize; 3]>, Vec<[usize; 3]>) = triangles.into_iter().partition(|t| {
            match circumcircle(verts[t[0]], verts[t[1]], verts[t[2]]) {
                Some((center, r2)) => center.distance_squared(p) < r2,
                None => false,
            }
        });
        triangles = good;

        // 只属于一个坏三角形的边构成空洞边界
        let mut boundary: Vec<(usize, usize)> = Vec::new();
        for t in &bad {
            for (a, b) in [(t[0], t[1]), (t[1], t[2]), (t[2], t[0])] {
                let shared = bad.iter().filter(|o| {
                    let has = |v| o.contains(&v);
                    has(a) && has(b)
                });
                if shared.count() == 1 {
                    boundary.push((a, b));
                }
            }
        }
        for (a, b) in boundary {
            triangles.push([a, b, i]);
        }
    }

    triangles.retain(|t| t.iter().all(|&v| v < n));
    triangles
}

/// 重心坐标
fn barycentric(p: Vec2, a: Vec2, b: Vec2, c: Vec2) -> Option<[f32; 3]> {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;
    let denom = v0.x * v1.y - v1.x * v0.y;
    if denom.abs() <= EPSILON {
        return None;
    }
    let wb = (v2.x * v1.y - v1.x * v2.y) / denom;
    let wc = (v0.x * v2.y - v2.x * v0.y) / denom;
    Some([1.0 - wb - wc, wb, wc])
}

/// 计算查询点的混合权重
///
/// 严格落在某个三角形内部时使用重心坐标；否则投影到最近的边上，
/// 没有三角形时所有点对都视为边。
pub fn blend_weights(points: &[Vec2], triangles: &[[usize; 3]], query: Vec2) -> Option<BlendWeights> {
    match points.len() {
        0 => return None,
        1 => return Some(BlendWeights::single(0)),
        _ => {}
    }

    for t in triangles {
        let Some(w) = barycentric(query, points[t[0]], points[t[1]], points[t[2]]) else {
            continue;
        };
        if w.iter().all(|&x| x > 0.0) {
            return Some(BlendWeights {
                indices: *t,
                weights: w,
                count: 3,
            });
        }
    }

    // 没有三角形时退化为全部点对
    let pair_count = if triangles.is_empty() { points.len() } else { 0 };
    let pairs = (0..pair_count).flat_map(|a| (a + 1..pair_count).map(move |b| (a, b)));
    let edges = triangles
        .iter()
        .flat_map(|t| [(t[0], t[1]), (t[1], t[2]), (t[2], t[0])]);

    let mut best: Option<(f32, BlendWeights)> = None;
    for (a, b) in pairs.chain(edges) {
        let pa = points[a];
        let ab = points[b] - pa;
        let len2 = ab.length_squared();
        let (t, weights) = if len2 <= EPSILON {
            (0.0, BlendWeights::single(a))
        } else {
            let t = ((query - pa).dot(ab) / len2).clamp(0.0, 1.0);
            (t, BlendWeights::edge(a, b, t))
        };
        let dist = query.distance_squared(pa + ab * t);
        if best.as_ref().map_or(true, |(d, _)| dist < *d) {
            best = Some((dist, weights));
        }
    }
    best.map(|(_, w)| w)
}
