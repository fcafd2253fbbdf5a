//! The four pipeline stages over one scene snapshot.

use std::path::PathBuf;

use crate::compile::{Compilation, Compiler};
use crate::foundation::error::KnitResult;
use crate::foundation::issue::Issue;
use crate::layers::ImageCache;
use crate::mesh::{FlowGroup, flow_groups};
use crate::pipeline::ResolvedParams;
use crate::sampler::Sampler;
use crate::sketch::Scene;
use crate::trace::Trace;

use super::scheduler::{Scheduler, Stage, Staged, Tick};
use super::{Snapshot, StartRequest, Update};

pub const FLOW: usize = 0;
pub const SAMPLING: usize = 1;
pub const TRACING: usize = 2;
pub const COMPILE: usize = 3;

/// Everything produced by one run, in pipeline order.
#[derive(Clone, Debug, Default)]
pub struct Artifacts {
    pub meshes: Vec<FlowGroup>,
    pub samplers: Vec<Sampler>,
    pub traces: Vec<Trace>,
    pub knitouts: Vec<Compilation>,
}

impl Artifacts {
    /// Issues of every artifact, upstream first.
    pub fn issues(&self) -> Vec<&Issue> {
        self.meshes
            .iter()
            .flat_map(|g| g.issues.iter())
            .chain(self.samplers.iter().flat_map(|s| s.issues.iter()))
            .chain(self.traces.iter().flat_map(|t| t.issues.iter()))
            .chain(self.knitouts.iter().flat_map(|k| k.issues.iter()))
            .collect()
    }
}

/// Worker-side state of a run.
pub struct PipelineState {
    scene: Scene,
    params: ResolvedParams,
    images: ImageCache,
    artifacts: Artifacts,
    compilers: Vec<Compiler>,
}

impl PipelineState {
    pub fn into_artifacts(self) -> Artifacts {
        self.artifacts
    }

    /// Artifacts of `stage`. While the stage runs only samplers and traces are sent; meshes
    /// and instruction stores go out once, on completion.
    fn snapshot(&mut self, stage: usize, complete: bool, last: bool) -> Option<Snapshot> {
        let a = &mut self.artifacts;
        let snap = match stage {
            FLOW if complete => Snapshot {
                meshes: Some(a.meshes.clone()),
                ..Snapshot::default()
            },
            SAMPLING => Snapshot {
                samplers: Some(a.samplers.clone()),
                ..Snapshot::default()
            },
            TRACING => Snapshot {
                node_indices: Some(a.traces.iter().map(Trace::node_index).collect()),
                traces: Some(a.traces.clone()),
                ..Snapshot::default()
            },
            COMPILE if complete => Snapshot {
                knitouts: Some(if last {
                    std::mem::take(&mut a.knitouts)
                } else {
                    a.knitouts.clone()
                }),
                ..Snapshot::default()
            },
            _ => return None,
        };
        Some(snap)
    }
}

impl Staged for PipelineState {
    fn algorithms(&self, stage: usize, sub_stage: usize) -> usize {
        let a = &self.artifacts;
        match (stage, sub_stage) {
            (FLOW, 1) => a.meshes.len(),
            (SAMPLING, 1) => a.samplers.len(),
            (TRACING, 1) => a.traces.len(),
            (COMPILE, 1) => self.compilers.len(),
            _ => 1,
        }
    }

    fn progress(&self, stage: usize) -> f64 {
        let a = &self.artifacts;
        let mean = |it: Vec<f64>| {
            if it.is_empty() {
                0.0
            } else {
                it.iter().sum::<f64>() / it.len() as f64
            }
        };
        match stage {
            FLOW => mean(a.meshes.iter().map(FlowGroup::progress).collect()),
            SAMPLING => mean(a.samplers.iter().map(Sampler::progress).collect()),
            TRACING => mean(a.traces.iter().map(Trace::progress).collect()),
            COMPILE => mean(
                self.compilers
                    .iter()
                    .zip(&a.traces)
                    .map(|(c, t)| c.progress(t))
                    .collect(),
            ),
            _ => 1.0,
        }
    }
}

fn build_meshes(s: &mut PipelineState, _: usize) -> KnitResult<bool> {
    s.artifacts.meshes = flow_groups(&s.scene, &s.params)?;
    tracing::debug!(groups = s.artifacts.meshes.len(), "meshes built");
    Ok(true)
}

fn solve_flow(s: &mut PipelineState, i: usize) -> KnitResult<bool> {
    s.artifacts.meshes[i].step(&s.scene, &s.params)
}

fn plan_rows(s: &mut PipelineState, _: usize) -> KnitResult<bool> {
    s.artifacts.samplers = s
        .artifacts
        .meshes
        .iter()
        .map(|g| Sampler::new(g, &s.params))
        .collect();
    Ok(true)
}

fn sample_stitches(s: &mut PipelineState, i: usize) -> KnitResult<bool> {
    let a = &mut s.artifacts;
    a.samplers[i].step(&s.scene, &a.meshes[i], &s.params, &s.images)
}

fn prepare_traces(s: &mut PipelineState, _: usize) -> KnitResult<bool> {
    s.artifacts.traces = s.artifacts.samplers.iter().map(Trace::new).collect();
    Ok(true)
}

fn trace_courses(s: &mut PipelineState, i: usize) -> KnitResult<bool> {
    let a = &mut s.artifacts;
    a.traces[i].step(&s.scene, &a.samplers[i], &s.params)
}

fn prepare_compilers(s: &mut PipelineState, _: usize) -> KnitResult<bool> {
    let a = &s.artifacts;
    s.compilers = a
        .traces
        .iter()
        .zip(&a.samplers)
        .map(|(t, sampler)| Compiler::new(t, sampler, &s.params))
        .collect::<KnitResult<_>>()?;
    Ok(true)
}

fn emit_instructions(s: &mut PipelineState, i: usize) -> KnitResult<bool> {
    let a = &s.artifacts;
    s.compilers[i].step(&a.traces[i], &a.samplers[i], &s.params)
}

fn collect_knitouts(s: &mut PipelineState, _: usize) -> KnitResult<bool> {
    s.artifacts.knitouts = std::mem::take(&mut s.compilers)
        .into_iter()
        .map(Compiler::into_compilation)
        .collect();
    Ok(true)
}

fn stages() -> Vec<Stage<PipelineState>> {
    vec![
        Stage::new("flow")
            .then("Building meshes", build_meshes)
            .then("Solving flow", solve_flow),
        Stage::new("sampling")
            .then("Planning rows", plan_rows)
            .then("Sampling stitches", sample_stitches),
        Stage::new("tracing")
            .then("Preparing traces", prepare_traces)
            .then("Tracing courses", trace_courses),
        Stage::new("compile")
            .then("Preparing compilers", prepare_compilers)
            .then("Emitting instructions", emit_instructions)
            .then("Collecting knitouts", collect_knitouts),
    ]
}

/// One run of the pipeline, stepped by the worker or to completion by the caller.
pub struct PipelineJob {
    pub run: u64,
    state: PipelineState,
    scheduler: Scheduler<PipelineState>,
    verbose: bool,
}

impl PipelineJob {
    /// A seam edit with samplers restarts at tracing; anything else starts from the flow.
    pub fn new(run: u64, request: StartRequest) -> Self {
        let StartRequest {
            scene,
            params,
            meshes,
            samplers,
            seam_edit,
            assets_root,
        } = request;
        let resume = seam_edit && !samplers.is_empty();
        let verbose = params.verbose;
        let mut scheduler = Scheduler::new(stages());
        let artifacts = if resume {
            scheduler = scheduler.starting_at(TRACING);
            Artifacts {
                meshes,
                samplers,
                ..Artifacts::default()
            }
        } else {
            Artifacts::default()
        };
        if !resume {
            scheduler = scheduler.with_preload(Box::new(move |s: &mut PipelineState| {
                s.images = preload_images(&s.scene, assets_root)?;
                Ok(())
            }));
        }
        Self {
            run,
            state: PipelineState {
                scene,
                params,
                images: ImageCache::new(),
                artifacts,
                compilers: Vec::new(),
            },
            scheduler,
            verbose,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.scheduler.is_finished()
    }

    /// Run one time slice and report it. Returns the updates for the host and whether the run
    /// is over.
    pub fn tick(&mut self) -> (Vec<Update>, bool) {
        let sub_stage = self.scheduler.sub_stage();
        let message = self.scheduler.message();
        let tick = self.scheduler.tick(&mut self.state);
        let mut update = Update {
            run: self.run,
            stage: 0,
            sub_stage,
            progress: 0.0,
            message: message.to_string(),
            done: false,
            error: None,
            snapshot: None,
        };
        match tick {
            Tick::Pending => (Vec::new(), false),
            Tick::Finished => (Vec::new(), true),
            Tick::Progress {
                stage,
                sub_stage,
                progress,
                transfer,
            } => {
                if self.verbose {
                    tracing::debug!(stage, sub_stage, progress, "{}", self.scheduler.message());
                }
                update.stage = stage;
                update.sub_stage = sub_stage;
                update.progress = progress;
                update.message = self.scheduler.message().to_string();
                if transfer {
                    update.snapshot = self.state.snapshot(stage, false, false);
                }
                (vec![update], false)
            }
            Tick::StageDone { stage, last } => {
                tracing::debug!(stage = self.scheduler.stage_name(stage), "stage done");
                update.stage = stage;
                update.progress = 1.0;
                update.message = format!("{} done", self.scheduler.stage_name(stage));
                update.done = last;
                update.snapshot = self.state.snapshot(stage, true, last);
                (vec![update], last)
            }
            Tick::Failed { stage, error } => {
                update.stage = stage;
                update.message = format!("{} failed", self.scheduler.stage_name(stage));
                update.error = Some(error);
                (vec![update], true)
            }
        }
    }

    /// Run to completion on the calling thread, handing every update to `on_update`.
    pub fn run_to_end(mut self, mut on_update: impl FnMut(&Update)) -> Result<Artifacts, Update> {
        loop {
            let (updates, over) = self.tick();
            for u in updates {
                on_update(&u);
                if u.error.is_some() {
                    return Err(u);
                }
                // The final snapshot moves the instruction stores out of the state.
                if let Some(knitouts) = u.snapshot.and_then(|s| s.knitouts)
                    && u.done
                {
                    self.state.artifacts.knitouts = knitouts;
                }
            }
            if over {
                return Ok(self.state.into_artifacts());
            }
        }
    }
}

fn preload_images(scene: &Scene, root: Option<PathBuf>) -> KnitResult<ImageCache> {
    match root {
        Some(root) => ImageCache::preload(scene, &root),
        None => Ok(ImageCache::new()),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/worker/job.rs"]
mod tests;
