use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::foundation::core::{Point, Vec2};
use crate::sketch::{Outline, Scene, SegmentRef};

/// Upper bound on the number of grid points a single layer may cover.
pub const MAX_LAYER_SAMPLES: usize = 250_000;

const NONE: u32 = u32::MAX;

/// Role of a sample relative to the sketch outline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleKind {
    /// Inside the outline.
    Interior,
    /// Ghost sample just outside a free border.
    Border,
    /// Ghost sample just outside a linked border.
    Intermediate,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub pos: Point,
    pub kind: SampleKind,
    pub col: u32,
    pub row: u32,
    /// Up to four grid neighbours.
    pub neighbors: SmallVec<[u32; 4]>,
    /// Closest outline edge, recorded for ghost samples.
    pub edge: Option<u32>,
}

/// One level of a mesh: a regular grid of samples at spacing `eta` carrying the flow and time
/// fields.
#[derive(Clone, Debug)]
pub struct Layer {
    pub level: usize,
    pub eta: f64,
    pub origin: Point,
    pub cols: usize,
    pub rows: usize,
    cells: Vec<u32>,
    pub samples: Vec<Sample>,
    pub flow: Vec<Vec2>,
    pub time: Vec<f64>,
    pub stress: Vec<f64>,
    pub stretch: Vec<f64>,
    pub kappa: Vec<f64>,
}

/// Grow `eta` until the padded outline box holds at most [`MAX_LAYER_SAMPLES`] grid points.
pub fn clamp_eta(outline: &Outline, eta: f64) -> f64 {
    let bbox = outline.bbox();
    let mut eta = eta.max(1e-3);
    loop {
        let cols = (bbox.width() / eta).ceil() + 5.0;
        let rows = (bbox.height() / eta).ceil() + 5.0;
        if cols * rows <= MAX_LAYER_SAMPLES as f64 {
            return eta;
        }
        eta *= 1.25;
    }
}

impl Layer {
    /// Sample the outline on a grid of spacing `eta` plus a ghost band of `1.5 * eta`.
    pub fn build(scene: &Scene, outline: &Outline, level: usize, eta: f64) -> Self {
        let bbox = outline.bbox();
        let origin = Point::new(bbox.x0 - 2.0 * eta, bbox.y0 - 2.0 * eta);
        let cols = (bbox.width() / eta).ceil() as usize + 5;
        let rows = (bbox.height() / eta).ceil() as usize + 5;
        let mut cells = vec![NONE; cols * rows];
        let mut samples = Vec::new();
        let band = 1.5 * eta;
        for r in 0..rows {
            for c in 0..cols {
                let pos = Point::new(origin.x + c as f64 * eta, origin.y + r as f64 * eta);
                let (kind, edge) = if outline.contains(pos) {
                    (SampleKind::Interior, None)
                } else {
                    let (d, e, _) = outline.closest(pos);
                    if d > band {
                        continue;
                    }
                    let seg = outline.edges[e].segment;
                    let linked = scene
                        .link_at(SegmentRef::new(outline.sketch, seg))
                        .is_some();
                    let kind = if linked {
                        SampleKind::Intermediate
                    } else {
                        SampleKind::Border
                    };
                    (kind, Some(e as u32))
                };
                cells[r * cols + c] = samples.len() as u32;
                samples.push(Sample {
                    pos,
                    kind,
                    col: c as u32,
                    row: r as u32,
                    neighbors: SmallVec::new(),
                    edge,
                });
            }
        }
        for s in samples.iter_mut() {
            let (c, r) = (s.col as i64, s.row as i64);
            for (dc, dr) in [(-1, 0), (1, 0), (0, -1), (0, 1)] {
                let (nc, nr) = (c + dc, r + dr);
                if nc < 0 || nr < 0 || nc >= cols as i64 || nr >= rows as i64 {
                    continue;
                }
                let n = cells[nr as usize * cols + nc as usize];
                if n != NONE {
                    s.neighbors.push(n);
                }
            }
        }
        let n = samples.len();
        Self {
            level,
            eta,
            origin,
            cols,
            rows,
            cells,
            samples,
            flow: vec![Vec2::new(0.0, 1.0); n],
            time: vec![0.0; n],
            stress: vec![0.0; n],
            stretch: vec![0.0; n],
            kappa: vec![0.0; n],
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample_at(&self, col: usize, row: usize) -> Option<usize> {
        if col >= self.cols || row >= self.rows {
            return None;
        }
        match self.cells[row * self.cols + col] {
            NONE => None,
            i => Some(i as usize),
        }
    }

    pub fn interior(&self) -> impl Iterator<Item = usize> + '_ {
        self.samples
            .iter()
            .enumerate()
            .filter(|(_, s)| s.kind == SampleKind::Interior)
            .map(|(i, _)| i)
    }

    pub fn interior_count(&self) -> usize {
        self.interior().count()
    }

    /// Grid cells whose four corners all exist, as `[lower-left, lower-right, upper-right,
    /// upper-left]`.
    pub fn faces(&self) -> impl Iterator<Item = [usize; 4]> + '_ {
        (0..self.rows.saturating_sub(1)).flat_map(move |r| {
            (0..self.cols.saturating_sub(1)).filter_map(move |c| {
                Some([
                    self.sample_at(c, r)?,
                    self.sample_at(c + 1, r)?,
                    self.sample_at(c + 1, r + 1)?,
                    self.sample_at(c, r + 1)?,
                ])
            })
        })
    }

    /// Fractional grid coordinates of `p`.
    fn grid_coords(&self, p: Point) -> (f64, f64) {
        ((p.x - self.origin.x) / self.eta, (p.y - self.origin.y) / self.eta)
    }

    /// Closest existing sample, searching rings of growing radius around `p`.
    pub fn nearest(&self, p: Point) -> Option<usize> {
        let (gx, gy) = self.grid_coords(p);
        let (c0, r0) = (gx.round() as i64, gy.round() as i64);
        let max_ring = self.cols.max(self.rows) as i64;
        for ring in 0..=max_ring {
            let mut best: Option<(f64, usize)> = None;
            for r in (r0 - ring)..=(r0 + ring) {
                for c in (c0 - ring)..=(c0 + ring) {
                    if (r - r0).abs() != ring && (c - c0).abs() != ring {
                        continue;
                    }
                    if r < 0 || c < 0 {
                        continue;
                    }
                    if let Some(i) = self.sample_at(c as usize, r as usize) {
                        let d = (self.samples[i].pos - p).hypot2();
                        if best.is_none_or(|(bd, _)| d < bd) {
                            best = Some((d, i));
                        }
                    }
                }
            }
            if let Some((_, i)) = best {
                return Some(i);
            }
        }
        None
    }

    /// Bilinear interpolation of a per-sample value, falling back to the nearest sample where
    /// the surrounding cell is incomplete.
    pub fn interpolate<T>(&self, values: &[T], p: Point) -> Option<T>
    where
        T: Copy + std::ops::Mul<f64, Output = T> + std::ops::Add<Output = T>,
    {
        let (gx, gy) = self.grid_coords(p);
        if gx >= 0.0 && gy >= 0.0 {
            let (c, r) = (gx.floor() as usize, gy.floor() as usize);
            let (fx, fy) = (gx - c as f64, gy - r as f64);
            let corners = (
                self.sample_at(c, r),
                self.sample_at(c + 1, r),
                self.sample_at(c, r + 1),
                self.sample_at(c + 1, r + 1),
            );
            if let (Some(a), Some(b), Some(d), Some(e)) = corners {
                let lo = values[a] * (1.0 - fx) + values[b] * fx;
                let hi = values[d] * (1.0 - fx) + values[e] * fx;
                return Some(lo * (1.0 - fy) + hi * fy);
            }
        }
        self.nearest(p).map(|i| values[i])
    }

    /// Finite-difference gradient of `values` at sample `i`.
    pub fn gradient(&self, values: &[f64], i: usize) -> Vec2 {
        let s = &self.samples[i];
        let (c, r) = (s.col as usize, s.row as usize);
        let axis = |prev: Option<usize>, next: Option<usize>| match (prev, next) {
            (Some(a), Some(b)) => (values[b] - values[a]) / (2.0 * self.eta),
            (Some(a), None) => (values[i] - values[a]) / self.eta,
            (None, Some(b)) => (values[b] - values[i]) / self.eta,
            (None, None) => 0.0,
        };
        let left = c.checked_sub(1).and_then(|c| self.sample_at(c, r));
        let down = r.checked_sub(1).and_then(|r| self.sample_at(c, r));
        Vec2::new(
            axis(left, self.sample_at(c + 1, r)),
            axis(down, self.sample_at(c, r + 1)),
        )
    }

    /// Time range over interior samples.
    pub fn time_range(&self) -> Option<(f64, f64)> {
        self.interior().fold(None, |acc, i| {
            let t = self.time[i];
            Some(match acc {
                None => (t, t),
                Some((lo, hi)) => (lo.min(t), hi.max(t)),
            })
        })
    }
}
