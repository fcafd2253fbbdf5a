//! Background execution of the pipeline.
//!
//! The host talks to a [`Worker`] thread by message only. A [`HostMessage::Start`] begins (or
//! replaces) a run; [`HostMessage::Cancel`] drops it and is acknowledged with
//! [`WorkerMessage::Cancelled`]. Every [`Update`] carries the id of its run so a host can
//! ignore messages of a run it already abandoned.

pub mod job;
pub mod scheduler;

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Context;

use crate::compile::Compilation;
use crate::foundation::error::{KnitError, KnitResult};
use crate::mesh::FlowGroup;
use crate::pipeline::ResolvedParams;
use crate::sampler::Sampler;
use crate::sketch::Scene;
use crate::trace::Trace;

pub use job::{Artifacts, COMPILE, FLOW, PipelineJob, SAMPLING, TRACING};
pub use scheduler::{Scheduler, Stage, Staged, TRANSFER_DELTA, Tick, UPDATE_DELTA};

/// Inputs of a run.
#[derive(Clone, Debug)]
pub struct StartRequest {
    pub scene: Scene,
    pub params: ResolvedParams,
    /// Flow groups of a previous run, reused by a seam edit.
    pub meshes: Vec<FlowGroup>,
    /// Samplers of a previous run, reused by a seam edit.
    pub samplers: Vec<Sampler>,
    /// Only seam annotations changed: restart at tracing.
    pub seam_edit: bool,
    /// Directory image nodes are resolved against; no images are loaded when unset.
    pub assets_root: Option<PathBuf>,
}

#[derive(Debug)]
pub enum HostMessage {
    Start { run: u64, request: Box<StartRequest> },
    Cancel,
    Shutdown,
}

/// Artifacts transferred with an [`Update`]. Only the fields of the reporting stage are set.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    pub meshes: Option<Vec<FlowGroup>>,
    pub samplers: Option<Vec<Sampler>>,
    pub traces: Option<Vec<Trace>>,
    pub node_indices: Option<Vec<Vec<(usize, usize)>>>,
    pub knitouts: Option<Vec<Compilation>>,
}

#[derive(Clone, Debug)]
pub struct Update {
    pub run: u64,
    pub stage: usize,
    pub sub_stage: usize,
    pub progress: f64,
    pub message: String,
    /// Last update of a successful run.
    pub done: bool,
    /// Set on the last update of a failed run.
    pub error: Option<String>,
    pub snapshot: Option<Snapshot>,
}

#[derive(Debug)]
pub enum WorkerMessage {
    Update(Box<Update>),
    /// Acknowledges a [`HostMessage::Cancel`].
    Cancelled,
}

/// Handle on the worker thread; dropping it stops the thread.
pub struct Worker {
    tx: Sender<HostMessage>,
    rx: Receiver<WorkerMessage>,
    handle: Option<JoinHandle<()>>,
    next_run: u64,
}

impl Worker {
    pub fn spawn() -> KnitResult<Self> {
        let (host_tx, host_rx) = mpsc::channel::<HostMessage>();
        let (worker_tx, worker_rx) = mpsc::channel::<WorkerMessage>();
        let handle = std::thread::Builder::new()
            .name("knitflow-worker".to_string())
            .spawn(move || worker_loop(host_rx, worker_tx))
            .context("spawn worker thread")?;
        Ok(Self {
            tx: host_tx,
            rx: worker_rx,
            handle: Some(handle),
            next_run: 1,
        })
    }

    /// Start a run, replacing the current one. Returns the new run id.
    pub fn start(&mut self, request: StartRequest) -> KnitResult<u64> {
        let run = self.next_run;
        self.next_run += 1;
        self.send(HostMessage::Start {
            run,
            request: Box::new(request),
        })?;
        Ok(run)
    }

    pub fn cancel(&self) -> KnitResult<()> {
        self.send(HostMessage::Cancel)
    }

    fn send(&self, msg: HostMessage) -> KnitResult<()> {
        self.tx
            .send(msg)
            .map_err(|_| KnitError::worker("worker thread is not accepting messages"))
    }

    pub fn try_recv(&self) -> KnitResult<Option<WorkerMessage>> {
        match self.rx.try_recv() {
            Ok(m) => Ok(Some(m)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(KnitError::worker("worker thread exited")),
        }
    }

    pub fn recv(&self) -> KnitResult<WorkerMessage> {
        self.rx
            .recv()
            .map_err(|_| KnitError::worker("worker thread exited"))
    }

    pub fn recv_timeout(&self, timeout: Duration) -> KnitResult<Option<WorkerMessage>> {
        match self.rx.recv_timeout(timeout) {
            Ok(m) => Ok(Some(m)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(KnitError::worker("worker thread exited")),
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        let _ = self.tx.send(HostMessage::Shutdown);
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            tracing::warn!("worker thread panicked");
        }
    }
}

enum Control {
    Continue,
    Stop,
}

fn handle(msg: HostMessage, job: &mut Option<PipelineJob>, tx: &Sender<WorkerMessage>) -> Control {
    match msg {
        HostMessage::Start { run, request } => {
            tracing::debug!(run, seam_edit = request.seam_edit, "run started");
            *job = Some(PipelineJob::new(run, *request));
            Control::Continue
        }
        HostMessage::Cancel => {
            if let Some(j) = job.take() {
                tracing::debug!(run = j.run, "run cancelled");
            }
            match tx.send(WorkerMessage::Cancelled) {
                Ok(()) => Control::Continue,
                Err(_) => Control::Stop,
            }
        }
        HostMessage::Shutdown => Control::Stop,
    }
}

fn worker_loop(rx: Receiver<HostMessage>, tx: Sender<WorkerMessage>) {
    let mut job: Option<PipelineJob> = None;
    loop {
        if job.is_none() {
            let Ok(msg) = rx.recv() else { return };
            if let Control::Stop = handle(msg, &mut job, &tx) {
                return;
            }
        }
        // Host messages take effect between two time slices.
        loop {
            match rx.try_recv() {
                Ok(msg) => {
                    if let Control::Stop = handle(msg, &mut job, &tx) {
                        return;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return,
            }
        }
        let Some(j) = job.as_mut() else { continue };
        let (updates, over) = j.tick();
        for u in updates {
            if tx.send(WorkerMessage::Update(Box::new(u))).is_err() {
                return;
            }
        }
        if over {
            job = None;
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/worker/worker.rs"]
mod tests;
