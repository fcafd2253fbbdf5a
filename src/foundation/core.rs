pub use kurbo::{Affine, BezPath, CubicBez, Line, ParamCurve, Point, QuadBez, Rect, Vec2};

/// Absolute tolerance for sketch coordinates (millimetres).
pub const GEOM_EPS: f64 = 1e-6;

/// Absolute tolerance for time-field comparisons in normalized units.
pub const TIME_EPS: f64 = 1e-3;

/// Stable identifier of a scene-graph node inside a [`crate::sketch::Scene`] arena.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct NodeId(pub u32);

/// Stable identifier of a border link inside a [`crate::sketch::Scene`] arena.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct LinkId(pub u32);

/// Index of a stitch inside a [`crate::sampler::Sampler`].
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct StitchId(pub u32);

impl StitchId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Approximate equality of two points within [`GEOM_EPS`].
pub fn points_close(a: Point, b: Point) -> bool {
    (a - b).hypot() <= GEOM_EPS
}

/// Rotate a vector by +90 degrees.
pub fn perp(v: Vec2) -> Vec2 {
    Vec2::new(-v.y, v.x)
}

/// Normalize a vector, returning `None` for near-zero input.
pub fn normalized(v: Vec2) -> Option<Vec2> {
    let len = v.hypot();
    if len <= 1e-12 || !len.is_finite() {
        return None;
    }
    Some(v / len)
}

/// Even-odd point-in-polygon test over a closed polyline.
pub fn point_in_polygon(p: Point, poly: &[Point]) -> bool {
    let n = poly.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (a, b) = (poly[i], poly[j]);
        if (a.y > p.y) != (b.y > p.y) {
            let x = a.x + (p.y - a.y) * (b.x - a.x) / (b.y - a.y);
            if p.x < x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Closest point on segment `ab` to `p`, returned with its parameter in `[0, 1]`.
pub fn project_on_segment(p: Point, a: Point, b: Point) -> (Point, f64) {
    let ab = b - a;
    let len2 = ab.hypot2();
    if len2 <= 1e-18 {
        return (a, 0.0);
    }
    let t = ((p - a).dot(ab) / len2).clamp(0.0, 1.0);
    (a + ab * t, t)
}

/// Proper intersection of segments `ab` and `cd`, returned as parameters on both.
pub fn segment_intersection(a: Point, b: Point, c: Point, d: Point) -> Option<(f64, f64)> {
    let r = b - a;
    let s = d - c;
    let denom = r.cross(s);
    if denom.abs() <= 1e-15 {
        return None;
    }
    let ac = c - a;
    let t = ac.cross(s) / denom;
    let u = ac.cross(r) / denom;
    if (-1e-12..=1.0 + 1e-12).contains(&t) && (-1e-12..=1.0 + 1e-12).contains(&u) {
        Some((t.clamp(0.0, 1.0), u.clamp(0.0, 1.0)))
    } else {
        None
    }
}

/// Signed area of a closed polyline (positive for counter-clockwise in y-up frames).
pub fn signed_area(poly: &[Point]) -> f64 {
    let n = poly.len();
    let mut acc = 0.0;
    for i in 0..n {
        let a = poly[i];
        let b = poly[(i + 1) % n];
        acc += a.x * b.y - b.x * a.y;
    }
    acc * 0.5
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
