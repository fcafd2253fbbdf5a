//! Cooperative stepping of staged algorithms.
//!
//! A job is a list of stages, each a list of sub-stages. Within a sub-stage every algorithm
//! of the state is stepped in turn until all of them report done; only then does the job move
//! on. [`Scheduler::tick`] runs steps for about [`UPDATE_DELTA`] and returns what the host
//! should hear about.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::{Duration, Instant};

use crate::foundation::error::KnitResult;

/// Length of one run of steps between two progress reports.
pub const UPDATE_DELTA: Duration = Duration::from_millis(60);
/// Minimum delay between two snapshot transfers inside a stage.
pub const TRANSFER_DELTA: Duration = Duration::from_millis(150);

/// Step algorithm `index` once; `true` once it is finished with the sub-stage.
pub type StepFn<S> = fn(&mut S, usize) -> KnitResult<bool>;

/// Work that must succeed before the first step.
pub type Preload<S> = Box<dyn FnOnce(&mut S) -> KnitResult<()> + Send>;

pub struct SubStage<S> {
    pub step: StepFn<S>,
    pub message: &'static str,
}

pub struct Stage<S> {
    pub name: &'static str,
    pub steps: Vec<SubStage<S>>,
}

impl<S> Stage<S> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            steps: Vec::new(),
        }
    }

    pub fn then(mut self, message: &'static str, step: StepFn<S>) -> Self {
        self.steps.push(SubStage { step, message });
        self
    }
}

/// State the scheduler can drive.
pub trait Staged {
    /// Number of algorithms stepped in lock-step during `(stage, sub_stage)`.
    fn algorithms(&self, stage: usize, sub_stage: usize) -> usize;

    /// Completion of `stage` in `[0, 1]`.
    fn progress(&self, stage: usize) -> f64;
}

#[derive(Clone, Debug, PartialEq)]
pub enum Tick {
    Progress {
        stage: usize,
        sub_stage: usize,
        progress: f64,
        /// A snapshot transfer is due.
        transfer: bool,
    },
    /// The time slice ran out without measurable progress.
    Pending,
    StageDone {
        stage: usize,
        last: bool,
    },
    Finished,
    Failed {
        stage: usize,
        error: String,
    },
}

pub struct Scheduler<S> {
    stages: Vec<Stage<S>>,
    preload: Vec<Preload<S>>,
    stage: usize,
    sub: usize,
    done: Vec<bool>,
    reported: f64,
    last_transfer: Instant,
    pub update_delta: Duration,
    pub transfer_delta: Duration,
}

impl<S: Staged> Scheduler<S> {
    pub fn new(stages: Vec<Stage<S>>) -> Self {
        Self {
            stages,
            preload: Vec::new(),
            stage: 0,
            sub: 0,
            done: Vec::new(),
            reported: 0.0,
            last_transfer: Instant::now(),
            update_delta: UPDATE_DELTA,
            transfer_delta: TRANSFER_DELTA,
        }
    }

    /// Skip the stages before `stage`.
    pub fn starting_at(mut self, stage: usize) -> Self {
        self.stage = stage.min(self.stages.len());
        self
    }

    pub fn with_preload(mut self, preload: Preload<S>) -> Self {
        self.preload.push(preload);
        self
    }

    pub fn stage(&self) -> usize {
        self.stage
    }

    pub fn sub_stage(&self) -> usize {
        self.sub
    }

    /// Message of the current sub-stage, empty once finished.
    pub fn message(&self) -> &'static str {
        self.stages
            .get(self.stage)
            .and_then(|s| s.steps.get(self.sub))
            .map_or("", |s| s.message)
    }

    pub fn stage_name(&self, stage: usize) -> &'static str {
        self.stages.get(stage).map_or("", |s| s.name)
    }

    pub fn is_finished(&self) -> bool {
        self.stage >= self.stages.len()
    }

    pub fn tick(&mut self, state: &mut S) -> Tick {
        for preload in std::mem::take(&mut self.preload) {
            let stage = self.stage;
            match catch_unwind(AssertUnwindSafe(|| preload(state))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return self.fail(stage, e.to_string()),
                Err(panic) => return self.fail(stage, panic_message(panic.as_ref())),
            }
        }
        let started = Instant::now();
        loop {
            if self.is_finished() {
                return Tick::Finished;
            }
            let stage = self.stage;
            let Some(sub) = self.stages[stage].steps.get(self.sub) else {
                return self.advance_stage();
            };
            let step = sub.step;
            let n = state.algorithms(stage, self.sub);
            if self.done.len() != n {
                self.done = vec![false; n];
            }
            for i in 0..n {
                if self.done[i] {
                    continue;
                }
                match catch_unwind(AssertUnwindSafe(|| step(state, i))) {
                    Ok(Ok(finished)) => self.done[i] = finished,
                    Ok(Err(e)) => return self.fail(stage, e.to_string()),
                    Err(panic) => return self.fail(stage, panic_message(panic.as_ref())),
                }
            }
            if self.done.iter().all(|&d| d) {
                self.done.clear();
                self.sub += 1;
                if self.sub == self.stages[stage].steps.len() {
                    return self.advance_stage();
                }
            }
            if started.elapsed() >= self.update_delta {
                let progress = state.progress(stage).clamp(0.0, 1.0).min(0.999);
                if progress <= self.reported {
                    return Tick::Pending;
                }
                self.reported = progress;
                let transfer = self.last_transfer.elapsed() >= self.transfer_delta;
                if transfer {
                    self.last_transfer = Instant::now();
                }
                return Tick::Progress {
                    stage,
                    sub_stage: self.sub,
                    progress,
                    transfer,
                };
            }
        }
    }

    fn advance_stage(&mut self) -> Tick {
        let stage = self.stage;
        self.stage += 1;
        self.sub = 0;
        self.done.clear();
        self.reported = 0.0;
        self.last_transfer = Instant::now();
        Tick::StageDone {
            stage,
            last: self.is_finished(),
        }
    }

    fn fail(&mut self, stage: usize, error: String) -> Tick {
        tracing::warn!(stage, %error, "stage failed");
        self.stage = self.stages.len();
        self.preload.clear();
        Tick::Failed { stage, error }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("internal error: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("internal error: {s}")
    } else {
        "internal error".to_string()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/worker/scheduler.rs"]
mod tests;
