use kurbo::ParamCurveArclen;

use super::model::Contour;
use super::scene::Scene;
use crate::foundation::core::{
    Affine, CubicBez, GEOM_EPS, Line, NodeId, ParamCurve, Point, QuadBez, Rect, project_on_segment,
    segment_intersection,
};
use crate::foundation::error::{KnitError, KnitResult};

const ARCLEN_ACCURACY: f64 = 1e-6;
const MAX_PIECES: usize = 64;

/// A contour segment as a kurbo curve.
#[derive(Clone, Copy, Debug)]
pub enum SegCurve {
    Line(Line),
    Quad(QuadBez),
    Cubic(CubicBez),
}

impl SegCurve {
    pub fn eval(&self, t: f64) -> Point {
        match self {
            Self::Line(c) => c.eval(t),
            Self::Quad(c) => c.eval(t),
            Self::Cubic(c) => c.eval(t),
        }
    }

    pub fn arclen(&self) -> f64 {
        match self {
            Self::Line(c) => c.arclen(ARCLEN_ACCURACY),
            Self::Quad(c) => c.arclen(ARCLEN_ACCURACY),
            Self::Cubic(c) => c.arclen(ARCLEN_ACCURACY),
        }
    }

    /// Split at `t`, returning the two halves.
    pub fn split(&self, t: f64) -> (SegCurve, SegCurve) {
        match self {
            Self::Line(c) => (Self::Line(c.subsegment(0.0..t)), Self::Line(c.subsegment(t..1.0))),
            Self::Quad(c) => (Self::Quad(c.subsegment(0.0..t)), Self::Quad(c.subsegment(t..1.0))),
            Self::Cubic(c) => (
                Self::Cubic(c.subsegment(0.0..t)),
                Self::Cubic(c.subsegment(t..1.0)),
            ),
        }
    }

    pub fn start(&self) -> Point {
        self.eval(0.0)
    }

    /// Interior control points.
    pub fn controls(&self) -> Vec<Point> {
        match self {
            Self::Line(_) => Vec::new(),
            Self::Quad(c) => vec![c.p1],
            Self::Cubic(c) => vec![c.p1, c.p2],
        }
    }

    pub fn transformed(&self, a: Affine) -> SegCurve {
        match self {
            Self::Line(c) => Self::Line(a * *c),
            Self::Quad(c) => Self::Quad(a * *c),
            Self::Cubic(c) => Self::Cubic(a * *c),
        }
    }
}

/// Segment `seg` of a contour in its local frame.
pub fn segment_curve(contour: &Contour, seg: usize) -> SegCurve {
    let (p0, p1) = contour.endpoints(seg);
    let ctrl = &contour.segments[seg].controls;
    match ctrl.len() {
        0 => SegCurve::Line(Line::new(p0, p1)),
        1 => SegCurve::Quad(QuadBez::new(p0, ctrl[0], p1)),
        _ => SegCurve::Cubic(CubicBez::new(p0, ctrl[0], ctrl[1], p1)),
    }
}

/// Polyline of a whole contour under `xf`, with pieces no longer than `step`.
pub fn flatten_contour(contour: &Contour, xf: Affine, step: f64) -> Vec<Point> {
    let mut out = Vec::new();
    for seg in 0..contour.segment_count() {
        let curve = segment_curve(contour, seg).transformed(xf);
        let pieces = piece_count(&curve, step);
        for k in 0..pieces {
            out.push(curve.eval(k as f64 / pieces as f64));
        }
    }
    if !contour.closed {
        if let Some(last) = contour.vertices.last() {
            out.push(xf * *last);
        }
    }
    out
}

fn piece_count(curve: &SegCurve, step: f64) -> usize {
    match curve {
        SegCurve::Line(_) => 1,
        _ => ((curve.arclen() / step.max(1e-3)).ceil() as usize).clamp(2, MAX_PIECES),
    }
}

/// Origin of one outline edge: a parameter range of a sketch segment.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OutlineEdge {
    pub segment: usize,
    pub t0: f64,
    pub t1: f64,
}

/// Flattened closed boundary of a sketch in millimetres.
#[derive(Clone, Debug, PartialEq)]
pub struct Outline {
    pub sketch: NodeId,
    pub points: Vec<Point>,
    pub edges: Vec<OutlineEdge>,
    segment_lengths: Vec<f64>,
}

impl Outline {
    /// Flatten sketch `id` under its global transform followed by `to_mm`.
    pub fn build(scene: &Scene, id: NodeId, to_mm: Affine, step: f64) -> KnitResult<Self> {
        let node = scene.require(id)?;
        let sketch = node
            .sketch()
            .ok_or_else(|| KnitError::scene(format!("node {id} is not a sketch")))?;
        let xf = to_mm * scene.global_transform(id);
        let contour = &sketch.contour;
        let mut points = Vec::new();
        let mut edges = Vec::new();
        let mut segment_lengths = Vec::new();
        for seg in 0..contour.segment_count() {
            let curve = segment_curve(contour, seg).transformed(xf);
            segment_lengths.push(curve.arclen());
            let pieces = piece_count(&curve, step);
            for k in 0..pieces {
                let t0 = k as f64 / pieces as f64;
                let t1 = (k + 1) as f64 / pieces as f64;
                points.push(curve.eval(t0));
                edges.push(OutlineEdge {
                    segment: seg,
                    t0,
                    t1,
                });
            }
        }
        if points.len() < 3 {
            return Err(KnitError::scene(format!(
                "sketch {id} needs at least three vertices"
            )));
        }
        Ok(Self {
            sketch: id,
            points,
            edges,
            segment_lengths,
        })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn edge(&self, i: usize) -> (Point, Point) {
        (self.points[i], self.points[(i + 1) % self.points.len()])
    }

    pub fn bbox(&self) -> Rect {
        let mut r = Rect::from_points(self.points[0], self.points[0]);
        for p in &self.points[1..] {
            r = r.union_pt(*p);
        }
        r
    }

    pub fn segment_length(&self, seg: usize) -> f64 {
        self.segment_lengths.get(seg).copied().unwrap_or(0.0)
    }

    pub fn contains(&self, p: Point) -> bool {
        crate::foundation::core::point_in_polygon(p, &self.points)
    }

    /// Segment and segment parameter at fraction `frac` of outline edge `edge`.
    pub fn param_at(&self, edge: usize, frac: f64) -> (usize, f64) {
        let e = self.edges[edge];
        (e.segment, e.t0 + (e.t1 - e.t0) * frac)
    }

    /// Point of segment `seg` at parameter `t`, along the flattened boundary.
    pub fn point_at(&self, seg: usize, t: f64) -> Option<Point> {
        let t = t.clamp(0.0, 1.0);
        let (i, e) = self
            .edges
            .iter()
            .enumerate()
            .filter(|(_, e)| e.segment == seg)
            .find(|(_, e)| t <= e.t1 + 1e-12)?;
        let (a, b) = self.edge(i);
        let span = (e.t1 - e.t0).max(1e-12);
        Some(a.lerp(b, ((t - e.t0) / span).clamp(0.0, 1.0)))
    }

    /// Closest boundary point: `(distance, edge index, fraction along the edge)`.
    pub fn closest(&self, p: Point) -> (f64, usize, f64) {
        let mut best = (f64::INFINITY, 0, 0.0);
        for i in 0..self.points.len() {
            let (a, b) = self.edge(i);
            let (q, t) = project_on_segment(p, a, b);
            let d = (p - q).hypot();
            if d < best.0 {
                best = (d, i, t);
            }
        }
        best
    }

    /// First crossing between two non-adjacent edges, if the boundary self-intersects.
    pub fn self_intersection(&self) -> Option<Point> {
        let n = self.points.len();
        for i in 0..n {
            let (a, b) = self.edge(i);
            for j in (i + 2)..n {
                if i == 0 && j == n - 1 {
                    continue;
                }
                let (c, d) = self.edge(j);
                if let Some((t, _)) = segment_intersection(a, b, c, d) {
                    return Some(a.lerp(b, t));
                }
            }
        }
        None
    }

    /// Whether two consecutive outline points coincide.
    pub fn has_degenerate_edge(&self) -> bool {
        (0..self.points.len()).any(|i| {
            let (a, b) = self.edge(i);
            (a - b).hypot() <= GEOM_EPS
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/sketch/geometry.rs"]
mod tests;
