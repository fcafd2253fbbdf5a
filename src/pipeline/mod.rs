//! Host side of the pipeline: parameters, a background worker, and the latest artifacts.
//!
//! Editing the sketch calls [`Pipeline::update_meshes`]; editing only seams calls
//! [`Pipeline::update_seams`], which keeps flow and samplers and retraces. Artifacts arrive
//! through [`Pipeline::poll`] or [`Pipeline::wait`] and replace the previous ones stage by
//! stage.

pub mod params;

use std::path::PathBuf;
use std::time::Duration;

use crate::compile::Compilation;
use crate::foundation::core::NodeId;
use crate::foundation::error::{KnitError, KnitResult};
use crate::mesh::FlowGroup;
use crate::sampler::Sampler;
use crate::sketch::Scene;
use crate::trace::Trace;
use crate::worker::{Artifacts, PipelineJob, StartRequest, Update, Worker, WorkerMessage};

pub use params::{PipelineParams, ResolvedParams, SketchSizing, Sizing, StitchSizing};

type Callback = Box<dyn FnMut(&Update)>;

#[derive(Clone, Debug, PartialEq)]
pub enum RunStatus {
    Idle,
    Running(u64),
    Done,
    Failed { stage: usize, error: String },
}

pub struct Pipeline {
    params: PipelineParams,
    assets_root: Option<PathBuf>,
    worker: Option<Worker>,
    status: RunStatus,
    artifacts: Artifacts,
    node_indices: Vec<Vec<(usize, usize)>>,
    callbacks: Vec<Callback>,
}

impl Pipeline {
    pub fn new(params: PipelineParams) -> Self {
        Self {
            params,
            assets_root: None,
            worker: None,
            status: RunStatus::Idle,
            artifacts: Artifacts::default(),
            node_indices: Vec::new(),
            callbacks: Vec::new(),
        }
    }

    /// Resolve image nodes against `root`.
    pub fn with_assets_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.assets_root = Some(root.into());
        self
    }

    pub fn params(&self) -> &PipelineParams {
        &self.params
    }

    pub fn set_params(&mut self, params: PipelineParams) {
        self.params = params;
    }

    pub fn status(&self) -> &RunStatus {
        &self.status
    }

    pub fn is_running(&self) -> bool {
        matches!(self.status, RunStatus::Running(_))
    }

    /// Recompute everything from `scene`.
    pub fn update_meshes(&mut self, scene: &Scene) -> KnitResult<u64> {
        let request = self.request(scene, false)?;
        self.artifacts = Artifacts::default();
        self.node_indices.clear();
        self.start(request)
    }

    /// Retrace `scene` with the current flow and samplers. Without samplers this is a full
    /// update.
    pub fn update_seams(&mut self, scene: &Scene) -> KnitResult<u64> {
        if self.artifacts.samplers.is_empty() {
            return self.update_meshes(scene);
        }
        let mut request = self.request(scene, true)?;
        request.meshes = self.artifacts.meshes.clone();
        request.samplers = self.artifacts.samplers.clone();
        self.artifacts.traces.clear();
        self.artifacts.knitouts.clear();
        self.node_indices.clear();
        self.start(request)
    }

    fn request(&self, scene: &Scene, seam_edit: bool) -> KnitResult<StartRequest> {
        Ok(StartRequest {
            scene: scene.clone(),
            params: self.params.resolve()?,
            meshes: Vec::new(),
            samplers: Vec::new(),
            seam_edit,
            assets_root: self.assets_root.clone(),
        })
    }

    fn start(&mut self, request: StartRequest) -> KnitResult<u64> {
        if self.worker.is_none() {
            self.worker = Some(Worker::spawn()?);
        }
        let worker = self
            .worker
            .as_mut()
            .ok_or_else(|| KnitError::worker("worker not started"))?;
        let run = worker.start(request)?;
        self.status = RunStatus::Running(run);
        Ok(run)
    }

    /// Run the whole pipeline on the calling thread.
    pub fn run_blocking(&mut self, scene: &Scene) -> KnitResult<()> {
        self.cancel()?;
        let request = self.request(scene, false)?;
        let job = PipelineJob::new(0, request);
        let callbacks = &mut self.callbacks;
        let result = job.run_to_end(|u| {
            for cb in callbacks.iter_mut() {
                cb(u);
            }
        });
        self.node_indices.clear();
        match result {
            Ok(artifacts) => {
                self.node_indices = artifacts.traces.iter().map(Trace::node_index).collect();
                self.artifacts = artifacts;
                self.status = RunStatus::Done;
                Ok(())
            }
            Err(failed) => {
                let error = failed.error.unwrap_or_default();
                self.artifacts = Artifacts::default();
                self.status = RunStatus::Failed {
                    stage: failed.stage,
                    error: error.clone(),
                };
                Err(KnitError::worker(format!("stage {}: {error}", failed.stage)))
            }
        }
    }

    /// Apply every message already received. Returns the number of updates applied.
    pub fn poll(&mut self) -> KnitResult<usize> {
        let mut applied = 0;
        loop {
            let Some(worker) = &self.worker else { break };
            let Some(msg) = worker.try_recv()? else { break };
            if let WorkerMessage::Update(u) = msg
                && self.apply(*u)
            {
                applied += 1;
            }
        }
        Ok(applied)
    }

    /// Block until the current run ends, applying its updates.
    pub fn wait(&mut self) -> KnitResult<()> {
        while self.is_running() {
            let msg = match &self.worker {
                Some(w) => w.recv_timeout(Duration::from_millis(50))?,
                None => return Err(KnitError::worker("no worker for a running pipeline")),
            };
            if let Some(WorkerMessage::Update(u)) = msg {
                self.apply(*u);
            }
        }
        match &self.status {
            RunStatus::Failed { stage, error } => {
                Err(KnitError::worker(format!("stage {stage}: {error}")))
            }
            _ => Ok(()),
        }
    }

    fn apply(&mut self, update: Update) -> bool {
        if self.status != RunStatus::Running(update.run) {
            return false;
        }
        for cb in &mut self.callbacks {
            cb(&update);
        }
        if let Some(snap) = update.snapshot {
            if let Some(meshes) = snap.meshes {
                self.artifacts.meshes = meshes;
            }
            if let Some(samplers) = snap.samplers {
                self.artifacts.samplers = samplers;
            }
            if let Some(traces) = snap.traces {
                self.artifacts.traces = traces;
            }
            if let Some(nodes) = snap.node_indices {
                self.node_indices = nodes;
            }
            if let Some(knitouts) = snap.knitouts {
                self.artifacts.knitouts = knitouts;
            }
        }
        if let Some(error) = update.error {
            self.status = RunStatus::Failed {
                stage: update.stage,
                error,
            };
        } else if update.done {
            self.status = RunStatus::Done;
        }
        true
    }

    /// Stop the current run, if any. Updates of that run are ignored from now on.
    pub fn cancel(&mut self) -> KnitResult<()> {
        if let (RunStatus::Running(_), Some(w)) = (&self.status, &self.worker) {
            w.cancel()?;
            self.status = RunStatus::Idle;
        }
        Ok(())
    }

    /// Cancel and drop every artifact.
    pub fn clear(&mut self) -> KnitResult<()> {
        self.cancel()?;
        self.artifacts = Artifacts::default();
        self.node_indices.clear();
        self.status = RunStatus::Idle;
        Ok(())
    }

    /// Called with every update of the current run, before it is applied.
    pub fn register_callback(&mut self, callback: impl FnMut(&Update) + 'static) {
        self.callbacks.push(Box::new(callback));
    }

    pub fn get_meshes(&self) -> &[FlowGroup] {
        &self.artifacts.meshes
    }

    /// Sampler of the flow group containing `sketch`.
    pub fn get_sampler(&self, sketch: NodeId) -> Option<&Sampler> {
        self.artifacts.samplers.iter().find(|s| s.covers(sketch))
    }

    pub fn get_samplers(&self) -> &[Sampler] {
        &self.artifacts.samplers
    }

    pub fn get_trace_index(&self, sampler: &Sampler) -> Option<usize> {
        self.artifacts
            .traces
            .iter()
            .position(|t| t.sketches == sampler.sketches)
    }

    pub fn get_trace(&self, sampler: &Sampler) -> Option<&Trace> {
        self.get_trace_index(sampler)
            .and_then(|i| self.artifacts.traces.get(i))
    }

    pub fn get_traces(&self) -> &[Trace] {
        &self.artifacts.traces
    }

    /// `(start, end)` entry intervals of the nodes of trace `trace_idx`.
    pub fn get_node_index(&self, trace_idx: usize) -> Option<&[(usize, usize)]> {
        self.node_indices.get(trace_idx).map(Vec::as_slice)
    }

    pub fn get_knitouts(&self) -> &[Compilation] {
        &self.artifacts.knitouts
    }

    pub fn artifacts(&self) -> &Artifacts {
        &self.artifacts
    }

    pub fn into_artifacts(self) -> Artifacts {
        self.artifacts
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(PipelineParams::default())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/pipeline/pipeline.rs"]
mod tests;
