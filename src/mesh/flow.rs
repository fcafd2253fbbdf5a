//! Incremental solve of one group of linked sketches.

use std::collections::{BTreeMap, VecDeque};

use crate::foundation::core::{NodeId, Point, Vec2};
use crate::foundation::error::KnitResult;
use crate::foundation::issue::Issue;
use crate::pipeline::ResolvedParams;
use crate::sketch::Scene;

use super::regions::{RegionGraph, link_point_pairs};
use super::{Mesh, solve};

/// Gauss-Seidel sweeps run per call to [`FlowGroup::step`].
const SWEEPS_PER_STEP: usize = 8;
/// Sweep cap per level and field.
const MAX_SWEEPS: usize = 400;
const FLOW_TOLERANCE: f64 = 1e-4;
/// Relative share of a link's segment lengths beyond which the two sides are flagged.
const LINK_LENGTH_TOLERANCE: f64 = 0.1;

/// Where a [`FlowGroup`] stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowPhase {
    Flow { level: usize, sweeps: usize },
    Time { level: usize, sweeps: usize },
    Link,
    Regions,
    Done,
}

/// Meshes, fields and regions of one connected set of root sketches.
#[derive(Clone, Debug)]
pub struct FlowGroup {
    pub sketches: Vec<NodeId>,
    pub meshes: Vec<Mesh>,
    pub issues: Vec<Issue>,
    pub regions: RegionGraph,
    phase: FlowPhase,
    levels: usize,
    targets: Vec<Vec<Option<(Vec2, f64)>>>,
}

impl FlowGroup {
    /// Build the meshes of `sketches`; solving happens in [`FlowGroup::step`].
    #[tracing::instrument(skip(scene, params))]
    pub fn new(scene: &Scene, sketches: Vec<NodeId>, params: &ResolvedParams) -> KnitResult<Self> {
        let mut meshes = Vec::with_capacity(sketches.len());
        let mut issues = Vec::new();
        for &s in &sketches {
            let (mesh, found) = Mesh::build(scene, s, params)?;
            issues.extend(found);
            meshes.extend(mesh);
        }
        let phase = if meshes.is_empty() {
            FlowPhase::Done
        } else {
            FlowPhase::Flow {
                level: 0,
                sweeps: 0,
            }
        };
        Ok(Self {
            sketches,
            meshes,
            issues,
            regions: RegionGraph::default(),
            phase,
            levels: params.mesh_levels,
            targets: Vec::new(),
        })
    }

    pub fn phase(&self) -> FlowPhase {
        self.phase
    }

    pub fn is_done(&self) -> bool {
        self.phase == FlowPhase::Done
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(Issue::is_error)
    }

    /// Mesh of `sketch`, if it belongs to this group and could be built.
    pub fn mesh(&self, sketch: NodeId) -> Option<&Mesh> {
        self.meshes.iter().find(|m| m.sketch == sketch)
    }

    /// Completion fraction in `[0, 1]`, non-decreasing across steps.
    pub fn progress(&self) -> f64 {
        let units = (2 * self.levels + 2) as f64;
        let partial = |sweeps: usize| (sweeps as f64 / MAX_SWEEPS as f64).min(0.99);
        let done = match self.phase {
            FlowPhase::Flow { level, sweeps } => (2 * level) as f64 + partial(sweeps),
            FlowPhase::Time { level, sweeps } => (2 * level + 1) as f64 + partial(sweeps),
            FlowPhase::Link => (2 * self.levels) as f64,
            FlowPhase::Regions => (2 * self.levels + 1) as f64,
            FlowPhase::Done => return 1.0,
        };
        done / units
    }

    /// Advance the solve by a bounded amount of work. Returns `true` once finished.
    pub fn step(&mut self, scene: &Scene, params: &ResolvedParams) -> KnitResult<bool> {
        self.phase = match self.phase {
            FlowPhase::Flow { level, sweeps } => self.step_flow(level, sweeps),
            FlowPhase::Time { level, sweeps } => self.step_time(level, sweeps, params),
            FlowPhase::Link => {
                self.link(scene);
                self.finish(params);
                FlowPhase::Regions
            }
            FlowPhase::Regions => {
                self.regions = RegionGraph::build(scene, &self.meshes, params);
                let found = self.regions.issues(&self.meshes);
                for issue in &found {
                    tracing::warn!(issue = %issue.message, "region issue");
                }
                self.issues.extend(found);
                FlowPhase::Done
            }
            FlowPhase::Done => FlowPhase::Done,
        };
        Ok(self.is_done())
    }

    /// Run every remaining step.
    pub fn solve(&mut self, scene: &Scene, params: &ResolvedParams) -> KnitResult<()> {
        while !self.step(scene, params)? {}
        Ok(())
    }

    fn step_flow(&mut self, level: usize, sweeps: usize) -> FlowPhase {
        if sweeps == 0 {
            self.enter_level(level);
        }
        let mut delta: f64 = 0.0;
        for _ in 0..SWEEPS_PER_STEP {
            delta = 0.0;
            for (mesh, targets) in self.meshes.iter_mut().zip(&self.targets) {
                delta = delta.max(solve::relax_flow(&mut mesh.layers[level], targets));
            }
            if delta < FLOW_TOLERANCE {
                break;
            }
        }
        let sweeps = sweeps + SWEEPS_PER_STEP;
        if delta < FLOW_TOLERANCE || sweeps >= MAX_SWEEPS {
            if level == 0 {
                for mesh in &mut self.meshes {
                    solve::seed_time(&mut mesh.layers[0]);
                }
            }
            FlowPhase::Time { level, sweeps: 0 }
        } else {
            FlowPhase::Flow { level, sweeps }
        }
    }

    fn step_time(&mut self, level: usize, sweeps: usize, params: &ResolvedParams) -> FlowPhase {
        let mut delta: f64 = 0.0;
        let mut tolerance = 0.0;
        for _ in 0..SWEEPS_PER_STEP {
            delta = 0.0;
            for mesh in &mut self.meshes {
                let layer = &mut mesh.layers[level];
                tolerance = 1e-4 * layer.eta;
                delta = delta.max(solve::relax_time(layer));
            }
            if delta < tolerance {
                break;
            }
        }
        let sweeps = sweeps + SWEEPS_PER_STEP;
        if delta >= tolerance && sweeps < MAX_SWEEPS {
            return FlowPhase::Time { level, sweeps };
        }
        if params.verbose {
            tracing::debug!(level, sweeps, residual = delta, "time field settled");
        }
        if level + 1 < self.levels {
            FlowPhase::Flow {
                level: level + 1,
                sweeps: 0,
            }
        } else {
            FlowPhase::Link
        }
    }

    fn enter_level(&mut self, level: usize) {
        self.targets = self
            .meshes
            .iter()
            .map(|m| solve::bind_constraints(&m.layers[level], &m.constraints))
            .collect();
        for mesh in &mut self.meshes {
            if level == 0 {
                let f = solve::initial_flow(&mesh.constraints);
                mesh.layers[0].flow.fill(f);
            } else {
                let (coarse, fine) = mesh.layers.split_at_mut(level);
                solve::seed_from(&mut fine[0], &coarse[level - 1]);
            }
        }
    }

    /// Offset the time of linked meshes so both sides of every link agree, then report
    /// links that cannot be honored.
    fn link(&mut self, scene: &Scene) {
        let index: BTreeMap<NodeId, usize> = self
            .meshes
            .iter()
            .enumerate()
            .map(|(i, m)| (m.sketch, i))
            .collect();

        let pairs = link_point_pairs(scene, &self.meshes);
        let mut diffs: BTreeMap<(usize, usize), (f64, usize)> = BTreeMap::new();
        for &(ia, ib, pa, pb) in &pairs {
            let (Some(ta), Some(tb)) = (self.time_at(ia, pa), self.time_at(ib, pb)) else {
                continue;
            };
            let e = diffs.entry((ia, ib)).or_insert((0.0, 0));
            e.0 += ta - tb;
            e.1 += 1;
        }

        // Breadth-first from the lowest sketch id: offset_b = offset_a + mean(t_a - t_b).
        let mut offsets: Vec<Option<f64>> = vec![None; self.meshes.len()];
        for root in 0..self.meshes.len() {
            if offsets[root].is_some() {
                continue;
            }
            offsets[root] = Some(0.0);
            let mut queue = VecDeque::from([root]);
            while let Some(m) = queue.pop_front() {
                let base = offsets[m].unwrap_or(0.0);
                for (&(ia, ib), &(sum, n)) in &diffs {
                    let d = sum / n as f64;
                    let (other, off) = if ia == m {
                        (ib, base + d)
                    } else if ib == m {
                        (ia, base - d)
                    } else {
                        continue;
                    };
                    if offsets[other].is_none() {
                        offsets[other] = Some(off);
                        queue.push_back(other);
                    }
                }
            }
        }
        for (mesh, off) in self.meshes.iter_mut().zip(offsets) {
            let off = off.unwrap_or(0.0);
            for layer in &mut mesh.layers {
                layer.time.iter_mut().for_each(|t| *t += off);
            }
        }

        // Residual disagreement after offsetting.
        let mut worst: BTreeMap<(usize, usize), (f64, Point)> = BTreeMap::new();
        for &(ia, ib, pa, pb) in &pairs {
            if let (Some(ta), Some(tb)) = (self.time_at(ia, pa), self.time_at(ib, pb)) {
                let e = worst.entry((ia, ib)).or_insert((0.0, pa));
                if (ta - tb).abs() > e.0 {
                    *e = ((ta - tb).abs(), pa);
                }
            }
        }
        for ((ia, _), (gap, at)) in worst {
            let eta = self.meshes[ia].finest_layer().eta;
            if gap > 2.0 * eta {
                self.issues.push(
                    Issue::warning(format!("linked borders disagree in time by {gap:.1} mm"))
                        .at(at)
                        .on(self.meshes[ia].sketch),
                );
            }
        }

        for link in scene.links() {
            let (a, b) = (index.get(&link.a.sketch), index.get(&link.b.sketch));
            match (a, b) {
                (Some(&ia), Some(&ib)) => {
                    let la = self.meshes[ia].outline.segment_length(link.a.segment);
                    let lb = self.meshes[ib].outline.segment_length(link.b.segment);
                    if (la - lb).abs() > LINK_LENGTH_TOLERANCE * la.max(lb) {
                        let at = self.meshes[ia].outline.point_at(link.a.segment, 0.5);
                        let mut issue = Issue::warning(format!(
                            "linked segments differ in length ({la:.1} mm vs {lb:.1} mm)"
                        ))
                        .on(link.a.sketch);
                        if let Some(p) = at {
                            issue = issue.at(p);
                        }
                        self.issues.push(issue);
                    }
                }
                (Some(&i), None) | (None, Some(&i)) => {
                    let (side, other) = if a.is_some() {
                        (link.a, link.b)
                    } else {
                        (link.b, link.a)
                    };
                    let mut issue = Issue::warning(format!(
                        "border linked to sketch {} which is not meshed with this group",
                        other.sketch
                    ))
                    .on(side.sketch);
                    if let Some(p) = self.meshes[i].outline.point_at(side.segment, 0.5) {
                        issue = issue.at(p);
                    }
                    self.issues.push(issue);
                }
                (None, None) => {}
            }
        }
    }

    fn finish(&mut self, params: &ResolvedParams) {
        for mesh in &mut self.meshes {
            for layer in &mut mesh.layers {
                if params.invert_time {
                    solve::invert(layer);
                }
                solve::derive(layer);
            }
            if let Some(issue) = solve::gradient_deviation(mesh.sketch, mesh.finest_layer()) {
                tracing::warn!(sketch = mesh.sketch.0, issue = %issue.message, "flow issue");
                self.issues.push(issue);
            }
        }
    }

    fn time_at(&self, mesh: usize, p: Point) -> Option<f64> {
        let layer = self.meshes.get(mesh)?.finest_layer();
        layer.interpolate(&layer.time, p)
    }
}

/// Build one [`FlowGroup`] per linked set of root sketches.
pub fn flow_groups(scene: &Scene, params: &ResolvedParams) -> KnitResult<Vec<FlowGroup>> {
    scene
        .linked_groups()
        .into_iter()
        .map(|g| FlowGroup::new(scene, g, params))
        .collect()
}

#[cfg(test)]
#[path = "../../tests/unit/mesh/flow.rs"]
mod tests;
