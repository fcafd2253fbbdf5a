//! Stitch sampling: courses along isolines of the time field, wales between consecutive
//! courses, then sketch layers on top.

pub mod stitch;
pub mod wales;

use crate::foundation::core::{Affine, GEOM_EPS, NodeId, StitchId};
use crate::foundation::error::{KnitError, KnitResult};
use crate::foundation::issue::Issue;
use crate::layers::{CompiledLayer, ImageCache, LayerContext, LayerOutput, StitchQuery};
use crate::mesh::regions::nearest_interior;
use crate::mesh::{FlowGroup, IsoChain, isolines};
use crate::pipeline::ResolvedParams;
use crate::sketch::Scene;

pub use stitch::{Course, CourseJunction, Stitch, StitchKind};
pub use wales::match_wales;

/// Rows sampled per call to [`Sampler::step`].
const ROWS_PER_STEP: usize = 4;

/// Number of stitches below which a course of a short-row region is knit as a short row.
pub const SHORT_ROW_STITCHES: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq)]
struct RowPlan {
    region: usize,
    time: f64,
    row: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Rows,
    Finish,
    Done,
}

/// Stitches of one flow group.
#[derive(Clone, Debug)]
pub struct Sampler {
    pub sketches: Vec<NodeId>,
    pub stitches: Vec<Stitch>,
    pub courses: Vec<Course>,
    pub issues: Vec<Issue>,
    plan: Vec<RowPlan>,
    cursor: usize,
    phase: Phase,
    /// Courses of the last sampled row of the current region.
    below: Vec<usize>,
    below_region: Option<usize>,
}

impl Sampler {
    /// Plan the rows of every reduced region of `group`. A group carrying an error issue yields
    /// an empty sampler holding those issues.
    #[tracing::instrument(skip_all, fields(sketches = ?group.sketches))]
    pub fn new(group: &FlowGroup, params: &ResolvedParams) -> Self {
        let mut sampler = Self {
            sketches: group.sketches.clone(),
            stitches: Vec::new(),
            courses: Vec::new(),
            issues: Vec::new(),
            plan: Vec::new(),
            cursor: 0,
            phase: Phase::Done,
            below: Vec::new(),
            below_region: None,
        };
        if group.has_errors() {
            sampler.issues = group.issues.iter().filter(|i| i.is_error()).cloned().collect();
            tracing::warn!(errors = sampler.issues.len(), "flow group not sampled");
            return sampler;
        }
        let Some((t0, t1)) = outline_time_range(group) else {
            return sampler;
        };
        let graph = &group.regions;
        let last_band = graph.bands.len().saturating_sub(1);
        for (ri, rr) in graph.reduced.iter().enumerate() {
            let bands = rr.regions.iter().map(|&r| graph.regions[r].band);
            let (Some(b_lo), Some(b_hi)) = (bands.clone().min(), bands.max()) else {
                continue;
            };
            let lo = if b_lo == 0 { t0 } else { graph.bands[b_lo].0 };
            let hi = if b_hi == last_band { t1 } else { graph.bands[b_hi].1 };
            let span = hi - lo;
            if span <= 0.0 {
                continue;
            }
            let n_rows = ((span / params.course_dist).round() as usize).max(1);
            for k in 0..n_rows {
                let time = lo + (k as f64 + 0.5) * span / n_rows as f64;
                let row = ((time - t0) / params.course_dist).floor().max(0.0) as u32;
                sampler.plan.push(RowPlan {
                    region: ri,
                    time,
                    row,
                });
            }
        }
        sampler.phase = Phase::Rows;
        sampler
    }

    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    pub fn progress(&self) -> f64 {
        match self.phase {
            Phase::Rows if !self.plan.is_empty() => {
                0.95 * self.cursor as f64 / self.plan.len() as f64
            }
            Phase::Rows | Phase::Finish => 0.95,
            Phase::Done => 1.0,
        }
    }

    /// Sample a few rows, or finish once every row is placed. Returns `true` when done.
    pub fn step(
        &mut self,
        scene: &Scene,
        group: &FlowGroup,
        params: &ResolvedParams,
        images: &ImageCache,
    ) -> KnitResult<bool> {
        match self.phase {
            Phase::Rows => {
                let end = (self.cursor + ROWS_PER_STEP).min(self.plan.len());
                for k in self.cursor..end {
                    let plan = self.plan[k];
                    self.sample_row(scene, group, params, plan)?;
                }
                self.cursor = end;
                if self.cursor == self.plan.len() {
                    self.phase = Phase::Finish;
                }
            }
            Phase::Finish => {
                self.finish(scene, group, params, images);
                self.phase = Phase::Done;
                tracing::debug!(
                    stitches = self.stitches.len(),
                    courses = self.courses.len(),
                    "sampling done"
                );
            }
            Phase::Done => {}
        }
        Ok(self.is_done())
    }

    /// Run every remaining step.
    pub fn sample(
        &mut self,
        scene: &Scene,
        group: &FlowGroup,
        params: &ResolvedParams,
        images: &ImageCache,
    ) -> KnitResult<()> {
        while !self.step(scene, group, params, images)? {}
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.stitches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stitches.is_empty()
    }

    pub fn stitch(&self, id: StitchId) -> Option<&Stitch> {
        self.stitches.get(id.index())
    }

    pub fn course_of(&self, id: StitchId) -> Option<&Course> {
        let s = self.stitch(id)?;
        self.courses.get(s.course as usize)
    }

    pub fn covers(&self, sketch: NodeId) -> bool {
        self.sketches.contains(&sketch)
    }

    pub fn irregular_count(&self) -> usize {
        self.stitches.iter().filter(|s| s.is_irregular()).count()
    }

    pub fn count_kind(&self, kind: StitchKind) -> usize {
        self.stitches.iter().filter(|s| s.kind == kind).count()
    }

    /// Check the wale and course graph: at most two wales each way, symmetric links.
    pub fn validate(&self) -> KnitResult<()> {
        let get = |id: StitchId| {
            self.stitch(id)
                .ok_or_else(|| KnitError::sampling(format!("dangling stitch reference {}", id.0)))
        };
        for (i, s) in self.stitches.iter().enumerate() {
            let me = StitchId(i as u32);
            if s.prev_wales.len() > 2 || s.next_wales.len() > 2 {
                return Err(KnitError::sampling(format!("stitch {i} has more than two wales")));
            }
            for &n in &s.next_wales {
                if !get(n)?.prev_wales.contains(&me) {
                    return Err(KnitError::sampling(format!("wale {i} -> {} is one-sided", n.0)));
                }
            }
            for &p in &s.prev_wales {
                if !get(p)?.next_wales.contains(&me) {
                    return Err(KnitError::sampling(format!("wale {} -> {i} is one-sided", p.0)));
                }
            }
            if let Some(n) = s.next_course
                && get(n)?.prev_course != Some(me)
            {
                return Err(KnitError::sampling(format!("course link {i} -> {} is one-sided", n.0)));
            }
        }
        Ok(())
    }

    fn sample_row(
        &mut self,
        scene: &Scene,
        group: &FlowGroup,
        params: &ResolvedParams,
        plan: RowPlan,
    ) -> KnitResult<()> {
        if self.below_region != Some(plan.region) {
            self.below.clear();
            self.below_region = Some(plan.region);
        }
        let chains: Vec<IsoChain> = isolines::extract(scene, &group.meshes, plan.time)
            .into_iter()
            .filter(|c| chain_region(group, c) == Some(plan.region))
            .collect();
        let mut row = Vec::with_capacity(chains.len());
        for chain in &chains {
            if let Some(c) = self.add_course(scene, chain, plan, params)? {
                row.push(c);
            }
        }
        self.link_wales(&row);
        self.below = row;
        Ok(())
    }

    fn add_course(
        &mut self,
        scene: &Scene,
        chain: &IsoChain,
        plan: RowPlan,
        params: &ResolvedParams,
    ) -> KnitResult<Option<usize>> {
        let len = chain.length();
        if len < GEOM_EPS || chain.points.is_empty() {
            return Ok(None);
        }
        let n = ((len / params.wale_dist).round() as usize).max(1);
        let course = self.courses.len();
        let start = self.stitches.len() as u32;
        let layer = chain.points[0].layer;
        let at = |k: usize| {
            if chain.closed {
                k as f64 * len / n as f64
            } else {
                (k as f64 + 0.5) * len / n as f64
            }
        };
        let mut frame: Option<(NodeId, Affine)> = None;
        for k in 0..n {
            let (sketch, pos) = chain
                .point_at(at(k))
                .ok_or_else(|| KnitError::sampling("isoline without points"))?;
            let to_local = match frame {
                Some((s, m)) if s == sketch => m,
                _ => {
                    let m = (params.to_mm() * scene.global_transform(sketch)).inverse();
                    frame = Some((sketch, m));
                    m
                }
            };
            let id = start + k as u32;
            self.stitches.push(Stitch {
                pos,
                local: to_local * pos,
                sketch,
                layer,
                course: course as u32,
                prev_wales: Default::default(),
                next_wales: Default::default(),
                prev_course: (k > 0).then(|| StitchId(id - 1)),
                next_course: (k + 1 < n).then(|| StitchId(id + 1)),
                kind: StitchKind::Regular,
                program: 0,
                yarn_mask: 0,
            });
        }
        let end = start + n as u32;
        let closed = chain.closed && n > 1;
        if closed {
            self.stitches[start as usize].prev_course = Some(StitchId(end - 1));
            self.stitches[end as usize - 1].next_course = Some(StitchId(start));
        }

        let arc = arc_lengths(chain);
        let junctions = chain
            .junctions
            .iter()
            .map(|j| {
                let s = arc.get(j.point).copied().unwrap_or(0.0);
                let k = (0..n).find(|&k| at(k) >= s - GEOM_EPS).unwrap_or(0);
                CourseJunction {
                    stitch: k as u32,
                    from: j.from,
                    to: j.to,
                }
            })
            .collect();
        self.courses.push(Course {
            stitches: start..end,
            closed,
            time: plan.time,
            row: plan.row,
            region: plan.region,
            short_row: false,
            junctions,
        });
        Ok(Some(course))
    }

    /// Connect each new course to the nearest unused course of the previous row.
    fn link_wales(&mut self, row: &[usize]) {
        let mut used = vec![false; self.below.len()];
        for &upper in row {
            let mid = {
                let c = &self.courses[upper];
                self.stitches[(c.stitches.start + c.stitches.end) as usize / 2].pos
            };
            let best = self
                .below
                .iter()
                .enumerate()
                .filter(|(k, _)| !used[*k])
                .map(|(k, &c)| {
                    let d = self.courses[c]
                        .ids()
                        .map(|id| (self.stitches[id.index()].pos - mid).hypot2())
                        .fold(f64::INFINITY, f64::min);
                    (k, c, d)
                })
                .min_by(|a, b| a.2.total_cmp(&b.2));
            let Some((k, lower, _)) = best else {
                continue;
            };
            used[k] = true;
            self.connect(lower, upper);
        }
    }

    fn connect(&mut self, lower: usize, upper: usize) {
        let lo: Vec<StitchId> = self.courses[lower].ids().collect();
        let mut up: Vec<StitchId> = self.courses[upper].ids().collect();
        if self.courses[lower].closed && self.courses[upper].closed {
            let (sketch, pos) = {
                let first = &self.stitches[lo[0].index()];
                (first.sketch, first.pos)
            };
            // Align on a stitch of the same sketch when there is one.
            let same: Vec<usize> = (0..up.len())
                .filter(|&k| self.stitches[up[k].index()].sketch == sketch)
                .collect();
            let pool: Vec<usize> = if same.is_empty() {
                (0..up.len()).collect()
            } else {
                same
            };
            let pts: Vec<_> = pool.iter().map(|&k| self.stitches[up[k].index()].pos).collect();
            up.rotate_left(pool[wales::closed_offset(pos, &pts)]);
        }
        for (i, j) in match_wales(lo.len(), up.len()) {
            let (a, b) = (lo[i], up[j]);
            self.stitches[a.index()].next_wales.push(b);
            self.stitches[b.index()].prev_wales.push(a);
        }
    }

    fn finish(&mut self, scene: &Scene, group: &FlowGroup, params: &ResolvedParams, images: &ImageCache) {
        for s in &mut self.stitches {
            s.kind = if s.prev_wales.is_empty() {
                StitchKind::CastOn
            } else if s.next_wales.is_empty() {
                StitchKind::CastOff
            } else if s.prev_wales.len() > 1 {
                StitchKind::Decrease
            } else if s.next_wales.len() > 1 {
                StitchKind::Increase
            } else {
                StitchKind::Regular
            };
        }
        for c in &mut self.courses {
            let region_short = group
                .regions
                .reduced
                .get(c.region)
                .is_some_and(|r| r.short_row);
            c.short_row = region_short && c.len() < SHORT_ROW_STITCHES;
        }
        let default_mask = params
            .carriers
            .default_device()
            .and_then(|d| params.carriers.device_index(&d.name))
            .filter(|&i| i < 32)
            .map_or(1, |i| 1u32 << i);
        for s in &mut self.stitches {
            s.yarn_mask = default_mask;
        }
        self.apply_layers(scene, params, images);
    }

    fn apply_layers(&mut self, scene: &Scene, params: &ResolvedParams, images: &ImageCache) {
        let ctx = LayerContext {
            scene,
            carriers: &params.carriers,
            images,
            to_mm: params.to_mm(),
        };
        let subdiv = params.subdiv.max(1) as usize;
        let sketches = self.sketches.clone();
        for sketch in sketches {
            let Some(data) = scene.node(sketch).and_then(|n| n.sketch()) else {
                continue;
            };
            for (index, desc) in data.layers.iter().enumerate() {
                let layer = match CompiledLayer::compile(desc, index, &ctx) {
                    Ok(Some(layer)) => layer,
                    Ok(None) => continue,
                    Err(e) => {
                        self.layer_issue(sketch, index, &e);
                        continue;
                    }
                };
                if let Err(e) = self.apply_layer(sketch, &layer, subdiv) {
                    self.layer_issue(sketch, index, &e);
                }
            }
        }
    }

    fn apply_layer(&mut self, sketch: NodeId, layer: &CompiledLayer, subdiv: usize) -> KnitResult<()> {
        for i in 0..self.stitches.len() {
            let s = &self.stitches[i];
            if s.sketch != sketch {
                continue;
            }
            let course = &self.courses[s.course as usize];
            let q = StitchQuery {
                pos: s.pos,
                row: course.row as usize / subdiv,
                col: (i - course.stitches.start as usize) / subdiv,
                index: i,
            };
            let LayerOutput { program, yarn_mask } = layer.query(&q)?;
            let s = &mut self.stitches[i];
            if let Some(p) = program {
                s.program = p;
            }
            if let Some(m) = yarn_mask {
                s.yarn_mask = m;
            }
        }
        Ok(())
    }

    fn layer_issue(&mut self, sketch: NodeId, index: usize, e: &KnitError) {
        tracing::warn!(sketch = sketch.0, layer = index, error = %e, "layer skipped");
        self.issues
            .push(Issue::warning(format!("layer {index} skipped: {e}")).on(sketch));
    }
}

/// Reduced region holding the midpoint of `chain`.
fn chain_region(group: &FlowGroup, chain: &IsoChain) -> Option<usize> {
    let (sketch, p) = chain.midpoint()?;
    let m = group.meshes.iter().position(|m| m.sketch == sketch)?;
    let s = nearest_interior(&group.meshes, m, p)?;
    let r = group.regions.region_of(m, s)?;
    group.regions.reduced_of(r)
}

/// Arc length at every chain point, jumps between sketches excluded.
fn arc_lengths(chain: &IsoChain) -> Vec<f64> {
    let mut acc = 0.0;
    let mut out = Vec::with_capacity(chain.points.len());
    for (i, p) in chain.points.iter().enumerate() {
        if i > 0 && !p.start {
            acc += (p.pos - chain.points[i - 1].pos).hypot();
        }
        out.push(acc);
    }
    out
}

/// Time range of the group over its outlines.
fn outline_time_range(group: &FlowGroup) -> Option<(f64, f64)> {
    group
        .meshes
        .iter()
        .flat_map(|m| {
            let layer = m.finest_layer();
            m.outline
                .points
                .iter()
                .filter_map(move |p| layer.interpolate(&layer.time, *p))
        })
        .fold(None, |acc, t| match acc {
            None => Some((t, t)),
            Some((lo, hi)) => Some((f64::min(lo, t), f64::max(hi, t))),
        })
}

#[cfg(test)]
#[path = "../../tests/unit/sampler/sampler.rs"]
mod tests;
