//! Tracing: linearize the stitch graph of a sampler into carriage passes.

pub mod entry;
pub mod needles;
pub mod seams;

use crate::foundation::core::{NodeId, StitchId};
use crate::foundation::error::{KnitError, KnitResult};
use crate::foundation::issue::Issue;
use crate::knitout::{Direction, Needle, Side};
use crate::pipeline::ResolvedParams;
use crate::sampler::Sampler;
use crate::sketch::Scene;

pub use entry::{
    CarrierRange, NodeKind, Pass, PassKind, TraceFlags, TraceNode, TraceStats, TracedStitch,
};

/// Courses traced per call to [`Trace::step`].
const COURSES_PER_STEP: usize = 8;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TracerState {
    #[default]
    Idle,
    Knitting,
    /// Between a region change or yarn break and the next fed stitch.
    Transitioning,
}

/// Ordered carriage passes over the stitches of one sampler.
#[derive(Clone, Debug, Default)]
pub struct Trace {
    pub sketches: Vec<NodeId>,
    pub entries: Vec<TracedStitch>,
    pub passes: Vec<Pass>,
    pub nodes: Vec<TraceNode>,
    pub issues: Vec<Issue>,
    pub stats: TraceStats,
    logical: Vec<Option<(Side, i32)>>,
    homes: Vec<Option<Needle>>,
    seen: Vec<u8>,
    cursor: usize,
    total: usize,
    done: bool,
    state: TracerState,
    last_dir: Direction,
    last_region: Option<usize>,
    last_mask: u32,
    seam_start: Option<StitchId>,
    closed_courses: usize,
    devices_seen: u32,
}

impl Trace {
    pub fn new(sampler: &Sampler) -> Self {
        let n = sampler.len();
        Self {
            sketches: sampler.sketches.clone(),
            logical: vec![None; n],
            homes: vec![None; n],
            seen: vec![0; n],
            total: sampler.courses.len(),
            done: sampler.courses.is_empty(),
            last_dir: Direction::Left,
            ..Self::default()
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn state(&self) -> TracerState {
        self.state
    }

    pub fn progress(&self) -> f64 {
        if self.done {
            1.0
        } else if self.total == 0 {
            0.0
        } else {
            0.99 * self.cursor as f64 / self.total as f64
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Home needle of a traced stitch.
    pub fn home(&self, id: StitchId) -> Option<Needle> {
        self.homes.get(id.index()).copied().flatten()
    }

    /// Nodes as `(start, end)` entry intervals.
    pub fn node_index(&self) -> Vec<(usize, usize)> {
        self.nodes.iter().map(|n| (n.start, n.end)).collect()
    }

    /// Trace a few courses. Returns `true` once every course is traced.
    pub fn step(&mut self, scene: &Scene, sampler: &Sampler, params: &ResolvedParams) -> KnitResult<bool> {
        if self.done {
            return Ok(true);
        }
        let end = (self.cursor + COURSES_PER_STEP).min(self.total);
        for c in self.cursor..end {
            self.trace_course(scene, sampler, params, c)?;
        }
        self.cursor = end;
        if self.cursor == self.total {
            self.finish();
        }
        Ok(self.done)
    }

    #[tracing::instrument(skip_all, fields(sketches = ?sampler.sketches, stitches = sampler.len()))]
    pub fn trace(scene: &Scene, sampler: &Sampler, params: &ResolvedParams) -> KnitResult<Self> {
        let mut trace = Self::new(sampler);
        while !trace.step(scene, sampler, params)? {}
        Ok(trace)
    }

    /// Every stitch appears once or twice, the second time marked `TWICE`.
    pub fn validate(&self, sampler: &Sampler) -> KnitResult<()> {
        let mut count = vec![0u8; sampler.len()];
        for (i, e) in self.entries.iter().enumerate() {
            let slot = count
                .get_mut(e.stitch.index())
                .ok_or_else(|| KnitError::trace(format!("entry {i} names unknown stitch {}", e.stitch.0)))?;
            *slot += 1;
            let twice = e.flags.contains(TraceFlags::TWICE);
            if (*slot == 2) != twice || *slot > 2 {
                return Err(KnitError::trace(format!(
                    "stitch {} appears {} times, entry {i} twice flag {twice}",
                    e.stitch.0, slot
                )));
            }
        }
        if let Some(missing) = count.iter().position(|&c| c == 0) {
            return Err(KnitError::trace(format!("stitch {missing} is never traced")));
        }
        Ok(())
    }

    fn trace_course(
        &mut self,
        scene: &Scene,
        sampler: &Sampler,
        params: &ResolvedParams,
        c: usize,
    ) -> KnitResult<()> {
        let course = &sampler.courses[c];
        if course.is_empty() {
            return Ok(());
        }
        if self.last_region.is_some_and(|r| r != course.region) {
            self.transition("region change");
        }
        self.last_region = Some(course.region);

        let n = course.len();
        let start = seams::course_start(
            scene,
            sampler,
            course,
            self.seam_start,
            params.seam_stop,
            params.seam_weight,
        );
        let mut order: Vec<StitchId> = course.ids().collect();
        order.rotate_left(start);
        if course.closed {
            self.seam_start = Some(order[0]);
        }

        let rel = needles::relative_slots(n, course.closed);
        let mut pairs = Vec::new();
        for (k, id) in order.iter().enumerate() {
            for p in &sampler.stitches[id.index()].prev_wales {
                if let Some(below) = self.logical[p.index()] {
                    pairs.push((rel[k], below));
                }
            }
        }
        let base = needles::choose_base(&pairs);
        for (k, id) in order.iter().enumerate() {
            let (side, off) = rel[k];
            self.logical[id.index()] = Some((side, off + base));
            self.homes[id.index()] = Some(needles::physical(side, off + base, params.gauge));
        }
        for id in &order {
            let Some(here) = self.homes[id.index()] else {
                continue;
            };
            for p in &sampler.stitches[id.index()].prev_wales {
                let Some(below) = self.homes[p.index()] else {
                    continue;
                };
                let shift = (here.offset - below.offset).abs();
                if shift > params.max_racking {
                    return Err(KnitError::trace(format!(
                        "wale shift of {shift} needles from stitch {} to stitch {} exceeds the racking limit of {}",
                        p.0, id.0, params.max_racking
                    )));
                }
                self.stats.max_shift = self.stats.max_shift.max(shift);
            }
        }

        let stitches = &sampler.stitches;
        let cast_on: Vec<StitchId> = order
            .iter()
            .copied()
            .filter(|id| stitches[id.index()].prev_wales.is_empty())
            .collect();
        let knit_forward = if course.closed {
            self.closed_courses += 1;
            self.closed_courses % 2 == 1
        } else {
            let first = if cast_on.is_empty() {
                self.last_dir.reverse()
            } else {
                self.last_dir
            };
            first == Direction::Right
        };

        let course_no = c as u32;
        if !cast_on.is_empty() {
            let start = self.entries.len();
            for (dir, ids) in self.visits(&cast_on, course.closed, !knit_forward) {
                self.push_pass(sampler, PassKind::CastOn, course_no, dir, &ids, !knit_forward);
            }
            self.push_node(NodeKind::CastOn, course_no, start);
        }

        let start = self.entries.len();
        for (dir, ids) in self.visits(&order, course.closed, knit_forward) {
            self.push_pass(sampler, PassKind::Knit, course_no, dir, &ids, !knit_forward);
        }
        self.push_node(NodeKind::Course, course_no, start);
        self.check_carriers(sampler, start);

        let cast_off: Vec<StitchId> = order
            .iter()
            .copied()
            .filter(|id| stitches[id.index()].next_wales.is_empty() && self.seen[id.index()] < 2)
            .collect();
        if !cast_off.is_empty() {
            let start = self.entries.len();
            for (dir, ids) in self.visits(&cast_off, course.closed, !knit_forward) {
                self.push_pass(sampler, PassKind::CastOff, course_no, dir, &ids, knit_forward);
            }
            self.push_node(NodeKind::CastOff, course_no, start);
        }

        self.stats.courses += 1;
        if course.short_row {
            self.stats.short_rows += 1;
        }
        Ok(())
    }

    /// Passes visiting `ids` (in course order): open courses run right when `forward`, closed
    /// courses go right along one bed and come back along the other.
    fn visits(&self, ids: &[StitchId], closed: bool, forward: bool) -> Vec<(Direction, Vec<StitchId>)> {
        if !closed {
            let mut ids = ids.to_vec();
            if !forward {
                ids.reverse();
                return vec![(Direction::Left, ids)];
            }
            return vec![(Direction::Right, ids)];
        }
        let on_front = |id: &StitchId| {
            self.logical[id.index()].is_none_or(|(side, _)| side.is_front())
        };
        let mut front: Vec<StitchId> = ids.iter().copied().filter(|id| on_front(id)).collect();
        let mut back: Vec<StitchId> = ids.iter().copied().filter(|id| !on_front(id)).collect();
        if forward {
            vec![(Direction::Right, front), (Direction::Left, back)]
        } else {
            back.reverse();
            front.reverse();
            vec![(Direction::Right, back), (Direction::Left, front)]
        }
    }

    fn push_pass(
        &mut self,
        sampler: &Sampler,
        kind: PassKind,
        course: u32,
        dir: Direction,
        ids: &[StitchId],
        inverse: bool,
    ) {
        if ids.is_empty() {
            return;
        }
        if self.last_dir == dir && !self.passes.is_empty() {
            self.stats.direction_breaks += 1;
        }
        let pass = self.passes.len() as u32;
        let start = self.entries.len();
        let mut union = 0;
        for &id in ids {
            let stitch = &sampler.stitches[id.index()];
            let mask = stitch.yarn_mask;
            if mask == 0 {
                if self.state == TracerState::Knitting {
                    self.transition("yarn break");
                }
            } else {
                self.state = TracerState::Knitting;
            }
            let mut flags = match kind {
                PassKind::CastOn => TraceFlags::CAST_ON,
                PassKind::Knit => TraceFlags::NONE,
                PassKind::CastOff => TraceFlags::CAST_OFF,
            };
            if self.seen[id.index()] > 0 {
                flags |= TraceFlags::TWICE;
            }
            if inverse {
                flags |= TraceFlags::INVERSE;
            }
            if mask & !self.devices_seen != 0 {
                flags |= TraceFlags::YARN_START;
                self.devices_seen |= mask;
            }
            self.seen[id.index()] += 1;
            union |= mask;
            self.entries.push(TracedStitch {
                stitch: id,
                pass,
                dir,
                needle: self.homes[id.index()].unwrap_or(Needle::front(0)),
                yarn_mask: mask,
                flags,
            });
        }
        match kind {
            PassKind::CastOn => self.stats.cast_on += ids.len(),
            PassKind::CastOff => self.stats.cast_off += ids.len(),
            PassKind::Knit => {
                if self.last_mask != 0 && union != 0 && union != self.last_mask {
                    self.transition("yarn change");
                    self.state = TracerState::Knitting;
                }
                if union != 0 {
                    self.last_mask = union;
                }
            }
        }
        let entries = start..self.entries.len();
        let ranges = carrier_ranges(&self.entries[entries.clone()], union);
        self.passes.push(Pass {
            kind,
            course,
            dir,
            entries,
            yarn_mask: union,
            ranges,
        });
        self.last_dir = dir;
        self.stats.passes += 1;
    }

    fn push_node(&mut self, kind: NodeKind, course: u32, start: usize) {
        let end = self.entries.len();
        if end > start {
            self.nodes.push(TraceNode {
                kind,
                course,
                start,
                end,
            });
        }
    }

    fn transition(&mut self, why: &str) {
        if self.state == TracerState::Knitting {
            tracing::trace!(why, entry = self.entries.len(), "transition");
            self.state = TracerState::Transitioning;
            self.stats.transitions += 1;
        }
    }

    /// Warn once per course about a stitch fed differently from both of its neighbours.
    fn check_carriers(&mut self, sampler: &Sampler, from: usize) {
        let run = &self.entries[from..];
        let odd = run.windows(3).find(|w| {
            w[0].pass == w[1].pass
                && w[1].pass == w[2].pass
                && w[1].yarn_mask != w[0].yarn_mask
                && w[1].yarn_mask != w[2].yarn_mask
        });
        if let Some(w) = odd {
            let s = &sampler.stitches[w[1].stitch.index()];
            let issue = Issue::warning(format!(
                "stitch {} carriers disagree with its neighbours",
                w[1].stitch.0
            ))
            .at(s.pos)
            .on(s.sketch);
            tracing::warn!(issue = %issue.message, "trace warning");
            self.issues.push(issue);
        }
    }

    fn finish(&mut self) {
        let mut ended = 0u32;
        for e in self.entries.iter_mut().rev() {
            if e.yarn_mask & !ended != 0 {
                e.flags |= TraceFlags::YARN_END;
                ended |= e.yarn_mask;
            }
        }
        self.state = TracerState::Idle;
        self.done = true;
        tracing::debug!(
            entries = self.entries.len(),
            passes = self.stats.passes,
            "tracing done"
        );
    }
}

fn carrier_ranges(entries: &[TracedStitch], union: u32) -> Vec<CarrierRange> {
    (0..32)
        .filter(|d| union & (1 << d) != 0)
        .filter_map(|d| {
            let offsets = entries
                .iter()
                .filter(|e| e.yarn_mask & (1 << d) != 0)
                .map(|e| e.needle.offset);
            let left = offsets.clone().min()?;
            let right = offsets.max()?;
            Some(CarrierRange {
                device: d,
                left,
                right,
            })
        })
        .collect()
}

#[cfg(test)]
#[path = "../../tests/unit/trace/trace.rs"]
mod tests;
