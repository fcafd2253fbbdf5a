//! Flow and time field relaxation on a single layer.

use crate::foundation::core::{Affine, NodeId, Point, Vec2, normalized, perp};
use crate::foundation::error::{KnitError, KnitResult};
use crate::foundation::issue::Issue;
use crate::sketch::{ConstraintKind, ConstraintTarget, ConstraintWeight, NodeKind, Outline, Scene, flatten_contour};

use super::layer::Layer;

/// Angle between two direction constraints beyond which they conflict.
const CONFLICT_ANGLE_DEG: f64 = 60.0;
/// Deviation between time gradient and flow that earns a warning.
const DEVIATION_ANGLE_DEG: f64 = 45.0;

/// A flow constraint flattened into global millimetres.
#[derive(Clone, Debug, PartialEq)]
pub struct ConstraintLine {
    pub target: ConstraintTarget,
    pub kind: ConstraintKind,
    pub points: Vec<Point>,
    /// Target flow direction per polyline piece.
    pub dirs: Vec<Vec2>,
    pub weight: ConstraintWeight,
}

impl ConstraintLine {
    pub fn length(&self) -> f64 {
        self.points.windows(2).map(|w| (w[1] - w[0]).hypot()).sum()
    }

    /// Length-weighted mean target direction.
    pub fn mean_dir(&self) -> Option<Vec2> {
        let sum = self
            .points
            .windows(2)
            .zip(&self.dirs)
            .fold(Vec2::ZERO, |acc, (w, d)| acc + *d * (w[1] - w[0]).hypot());
        normalized(sum)
    }

    pub fn centroid(&self) -> Point {
        let n = self.points.len().max(1) as f64;
        let sum = self.points.iter().fold(Vec2::ZERO, |acc, p| acc + p.to_vec2());
        (sum / n).to_point()
    }
}

/// Flatten the constraints of `sketch` into target-direction polylines.
pub fn constraint_lines(
    scene: &Scene,
    sketch: NodeId,
    outline: &Outline,
    to_mm: Affine,
) -> KnitResult<Vec<ConstraintLine>> {
    let node = scene
        .node(sketch)
        .ok_or_else(|| KnitError::flow(format!("unknown sketch {sketch}")))?;
    let Some(data) = node.sketch() else {
        return Ok(Vec::new());
    };
    let mut out = Vec::new();
    for c in &data.constraints {
        let points = match c.target {
            ConstraintTarget::Segment(seg) => {
                let mut pts: Vec<Point> = outline
                    .edges
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| e.segment == seg)
                    .map(|(i, _)| outline.points[i])
                    .collect();
                if let Some(end) = outline.point_at(seg, 1.0) {
                    pts.push(end);
                }
                pts
            }
            ConstraintTarget::Curve(id) => match scene.node(id).map(|n| &n.kind) {
                Some(NodeKind::Curve { contour }) => {
                    flatten_contour(contour, to_mm * scene.global_transform(id), 1.0)
                }
                Some(NodeKind::PCurve(_)) => scene
                    .pcurve_points(id, 32)?
                    .unwrap_or_default()
                    .into_iter()
                    .map(|p| to_mm * p)
                    .collect(),
                _ => Vec::new(),
            },
        };
        if points.len() < 2 {
            continue;
        }
        let sign = if c.dir < 0 { -1.0 } else { 1.0 };
        let dirs = points
            .windows(2)
            .map(|w| {
                let t = normalized(w[1] - w[0]).unwrap_or(Vec2::ZERO) * sign;
                match c.kind {
                    ConstraintKind::Direction => t,
                    ConstraintKind::Isoline => perp(t),
                }
            })
            .collect();
        out.push(ConstraintLine {
            target: c.target,
            kind: c.kind,
            points,
            dirs,
            weight: c.weight,
        });
    }
    Ok(out)
}

/// Per-sample soft target `(direction, weight)` from the constraint lines.
pub fn bind_constraints(layer: &Layer, lines: &[ConstraintLine]) -> Vec<Option<(Vec2, f64)>> {
    let reach = 0.75 * layer.eta;
    let mut bound: Vec<Option<(Vec2, f64)>> = vec![None; layer.len()];
    for line in lines {
        let mut hits = Vec::new();
        for (i, s) in layer.samples.iter().enumerate() {
            let mut best: Option<(f64, Vec2)> = None;
            for (w, d) in line.points.windows(2).zip(&line.dirs) {
                let (q, _) = crate::foundation::core::project_on_segment(s.pos, w[0], w[1]);
                let dist = (s.pos - q).hypot();
                if dist <= reach && best.is_none_or(|(bd, _)| dist < bd) {
                    best = Some((dist, *d));
                }
            }
            if let Some((_, d)) = best {
                hits.push((i, d));
            }
        }
        if hits.is_empty() {
            continue;
        }
        let w = match line.weight {
            ConstraintWeight::Auto => layer.eta / line.length().max(layer.eta) * hits.len() as f64,
            ConstraintWeight::Value(v) => v.max(0.0),
        };
        for (i, d) in hits {
            bound[i] = Some(match bound[i] {
                Some((d0, w0)) => (normalized(d0 * w0 + d * w).unwrap_or(d), w0 + w),
                None => (d, w),
            });
        }
    }
    bound
}

/// Weighted mean of all constraint directions, `(0, 1)` without constraints.
pub fn initial_flow(lines: &[ConstraintLine]) -> Vec2 {
    let sum = lines.iter().fold(Vec2::ZERO, |acc, l| {
        acc + l.mean_dir().unwrap_or(Vec2::ZERO) * l.length()
    });
    normalized(sum).unwrap_or(Vec2::new(0.0, 1.0))
}

/// One Gauss-Seidel sweep of the direction energy. Returns the largest update.
pub fn relax_flow(layer: &mut Layer, targets: &[Option<(Vec2, f64)>]) -> f64 {
    let mut max_delta: f64 = 0.0;
    for i in 0..layer.len() {
        let mut acc = Vec2::ZERO;
        for &n in &layer.samples[i].neighbors {
            acc += layer.flow[n as usize];
        }
        if let Some((d, w)) = targets[i] {
            acc += d * w * 4.0;
        }
        if let Some(f) = normalized(acc) {
            max_delta = max_delta.max((f - layer.flow[i]).hypot());
            layer.flow[i] = f;
        }
    }
    max_delta
}

/// Seed time as the projection of positions on the mean flow.
pub fn seed_time(layer: &mut Layer) {
    let mean = normalized(layer.flow.iter().fold(Vec2::ZERO, |a, f| a + *f))
        .unwrap_or(Vec2::new(0.0, 1.0));
    for (t, s) in layer.time.iter_mut().zip(&layer.samples) {
        *t = mean.dot(s.pos.to_vec2());
    }
}

/// One Gauss-Seidel sweep of `Σ (t_j - t_i - f̄·(p_j - p_i))²`. Returns the largest update.
pub fn relax_time(layer: &mut Layer) -> f64 {
    let mut max_delta: f64 = 0.0;
    for i in 0..layer.len() {
        let s = &layer.samples[i];
        if s.neighbors.is_empty() {
            continue;
        }
        let mut acc = 0.0;
        for &n in &s.neighbors {
            let n = n as usize;
            let f = (layer.flow[i] + layer.flow[n]) * 0.5;
            acc += layer.time[n] - f.dot(layer.samples[n].pos - s.pos);
        }
        let t = acc / s.neighbors.len() as f64;
        max_delta = max_delta.max((t - layer.time[i]).abs());
        layer.time[i] = t;
    }
    max_delta
}

/// Initialize a finer layer from the solved coarser one.
pub fn seed_from(layer: &mut Layer, coarse: &Layer) {
    for i in 0..layer.len() {
        let p = layer.samples[i].pos;
        if let Some(f) = coarse.interpolate(&coarse.flow, p).and_then(normalized) {
            layer.flow[i] = f;
        }
        if let Some(t) = coarse_time(coarse, p) {
            layer.time[i] = t;
        }
    }
}

/// Bilinear time where the coarse cell is complete, else first-order extrapolation along the
/// flow from the nearest coarse sample.
fn coarse_time(coarse: &Layer, p: Point) -> Option<f64> {
    let (gx, gy) = (
        (p.x - coarse.origin.x) / coarse.eta,
        (p.y - coarse.origin.y) / coarse.eta,
    );
    if gx >= 0.0 && gy >= 0.0 {
        let (c, r) = (gx.floor() as usize, gy.floor() as usize);
        let complete = [(c, r), (c + 1, r), (c, r + 1), (c + 1, r + 1)]
            .iter()
            .all(|&(c, r)| coarse.sample_at(c, r).is_some());
        if complete {
            return coarse.interpolate(&coarse.time, p);
        }
    }
    let j = coarse.nearest(p)?;
    Some(coarse.time[j] + coarse.flow[j].dot(p - coarse.samples[j].pos))
}

/// Flip the orientation of the field.
pub fn invert(layer: &mut Layer) {
    for t in layer.time.iter_mut() {
        *t = -*t;
    }
    for f in layer.flow.iter_mut() {
        *f = -*f;
    }
}

/// Recompute stress, stretch and kappa from the current fields.
pub fn derive(layer: &mut Layer) {
    let angles: Vec<f64> = layer.flow.iter().map(|f| f.y.atan2(f.x)).collect();
    for i in 0..layer.len() {
        let g = layer.gradient(&layer.time, i);
        layer.stretch[i] = g.hypot();
        layer.stress[i] = (g - layer.flow[i]).hypot();
        let s = &layer.samples[i];
        let mut k: f64 = 0.0;
        for &n in &s.neighbors {
            let mut d = angles[n as usize] - angles[i];
            while d > std::f64::consts::PI {
                d -= std::f64::consts::TAU;
            }
            while d < -std::f64::consts::PI {
                d += std::f64::consts::TAU;
            }
            k = k.max(d.abs() / layer.eta);
        }
        layer.kappa[i] = k;
    }
}

/// Direction constraints of one sketch that pull the flow apart.
pub fn direction_conflicts(sketch: NodeId, lines: &[ConstraintLine]) -> Vec<Issue> {
    let limit = CONFLICT_ANGLE_DEG.to_radians().cos();
    let dirs: Vec<(usize, Vec2)> = lines
        .iter()
        .enumerate()
        .filter(|(_, l)| l.kind == ConstraintKind::Direction)
        .filter_map(|(i, l)| l.mean_dir().map(|d| (i, d)))
        .collect();
    let mut out = Vec::new();
    for (a, (ia, da)) in dirs.iter().enumerate() {
        for (ib, db) in &dirs[a + 1..] {
            if da.dot(*db) < limit {
                let (ca, cb) = (lines[*ia].centroid(), lines[*ib].centroid());
                let angle = da.dot(*db).clamp(-1.0, 1.0).acos().to_degrees();
                out.push(
                    Issue::error(format!(
                        "direction constraints disagree by {angle:.0} degrees"
                    ))
                    .at(ca.midpoint(cb))
                    .on(sketch),
                );
            }
        }
    }
    out
}

/// Interior samples whose time gradient strays from the flow.
pub fn gradient_deviation(sketch: NodeId, layer: &Layer) -> Option<Issue> {
    let limit = DEVIATION_ANGLE_DEG.to_radians().cos();
    let bad: Vec<u32> = layer
        .interior()
        .filter(|&i| {
            let g = layer.gradient(&layer.time, i);
            normalized(g).is_some_and(|g| g.dot(layer.flow[i]) < limit)
        })
        .map(|i| i as u32)
        .collect();
    if bad.is_empty() {
        return None;
    }
    let sum = bad
        .iter()
        .fold(Vec2::ZERO, |a, &i| a + layer.samples[i as usize].pos.to_vec2());
    let center = (sum / bad.len() as f64).to_point();
    Some(
        Issue::warning(format!(
            "time gradient deviates from the flow at {} samples",
            bad.len()
        ))
        .at(center)
        .on(sketch)
        .with_samples(bad),
    )
}

#[cfg(test)]
#[path = "../../tests/unit/mesh/solve.rs"]
mod tests;
