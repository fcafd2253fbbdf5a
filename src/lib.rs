//! knitflow compiles 2D garment sketches into knitout programs for weft-knitting machines.
//!
//! The pipeline runs in four stages over a [`Scene`]:
//!
//! - Flow: mesh every sketch and solve a time field ([`FlowGroup`])
//! - Sampling: place stitches along isolines of the time field ([`Sampler`])
//! - Tracing: order stitches into carriage passes ([`Trace`])
//! - Compiling: emit knitout instructions ([`Compilation`])
//!
//! [`Pipeline`] drives the stages on a background [`Worker`] or on the calling thread.
#![forbid(unsafe_code)]

pub mod foundation;

pub mod carriers;
pub mod compile;
pub mod knitout;
pub mod layers;
pub mod mesh;
pub mod pipeline;
pub mod sampler;
pub mod sketch;
pub mod trace;
pub mod units;
pub mod worker;
pub mod yarn;

pub use crate::foundation::core::{Affine, LinkId, NodeId, Point, StitchId, Vec2};
pub use crate::foundation::error::{KnitError, KnitResult};
pub use crate::foundation::issue::{Issue, IssueKind};

pub use crate::carriers::{CarrierConfig, CarrierDevice};
pub use crate::compile::{Compilation, CompileStats, Compiler, compile, join_parts};
pub use crate::knitout::{InstructionStore, TextOptions, parse_text, write_text};
pub use crate::mesh::{FlowGroup, flow_groups};
pub use crate::pipeline::{Pipeline, PipelineParams, ResolvedParams, RunStatus};
pub use crate::sampler::Sampler;
pub use crate::sketch::{Scene, import_svg};
pub use crate::trace::{Trace, TraceStats};
pub use crate::worker::{Artifacts, Update, Worker, WorkerMessage};
