//! Per-sketch planar meshes, the time/flow field solved on them, region segmentation and
//! isoline extraction.

pub mod flow;
pub mod geodesic;
pub mod isolines;
pub mod layer;
pub mod regions;
pub mod solve;

use crate::foundation::core::NodeId;
use crate::foundation::error::KnitResult;
use crate::foundation::issue::Issue;
use crate::pipeline::ResolvedParams;
use crate::sketch::{Outline, Scene};

pub use flow::{FlowGroup, FlowPhase, flow_groups};
pub use isolines::{IsoChain, IsoPoint, Junction};
pub use layer::{Layer, Sample, SampleKind};
pub use regions::{ReducedRegion, Region, RegionGraph, RegionStatus};
pub use solve::ConstraintLine;

/// Mesh hierarchy of one root sketch, coarse layers first.
#[derive(Clone, Debug)]
pub struct Mesh {
    pub sketch: NodeId,
    pub outline: Outline,
    /// Never empty.
    pub layers: Vec<Layer>,
    pub constraints: Vec<ConstraintLine>,
}

impl Mesh {
    /// Flatten the sketch and sample every level. Geometry problems come back as issues
    /// and no mesh.
    #[tracing::instrument(skip(scene, params))]
    pub fn build(
        scene: &Scene,
        sketch: NodeId,
        params: &ResolvedParams,
    ) -> KnitResult<(Option<Self>, Vec<Issue>)> {
        let to_mm = params.to_mm();
        let outline = Outline::build(scene, sketch, to_mm, 0.5 * params.eta)?;
        let mut issues = Vec::new();
        if let Some(p) = outline.self_intersection() {
            issues.push(Issue::error("sketch outline intersects itself").at(p).on(sketch));
        }
        if outline.has_degenerate_edge() {
            let c = outline.bbox().center();
            issues.push(Issue::error("sketch outline has a zero-length edge").at(c).on(sketch));
        }
        if !issues.is_empty() {
            return Ok((None, issues));
        }
        let constraints = solve::constraint_lines(scene, sketch, &outline, to_mm)?;
        issues.extend(solve::direction_conflicts(sketch, &constraints));
        let mut layers = Vec::with_capacity(params.mesh_levels);
        for level in 0..params.mesh_levels {
            let eta = layer::clamp_eta(&outline, params.level_eta(level));
            layers.push(Layer::build(scene, &outline, level, eta));
        }
        let finest = &layers[layers.len() - 1];
        if finest.interior_count() == 0 {
            issues.push(
                Issue::error("sketch is too small for the mesh resolution")
                    .at(outline.bbox().center())
                    .on(sketch),
            );
            return Ok((None, issues));
        }
        tracing::debug!(
            sketch = sketch.0,
            samples = finest.len(),
            eta = finest.eta,
            "mesh built"
        );
        Ok((
            Some(Self {
                sketch,
                outline,
                layers,
                constraints,
            }),
            issues,
        ))
    }

    pub fn finest_layer(&self) -> &Layer {
        &self.layers[self.layers.len() - 1]
    }
}

#[cfg(test)]
#[path = "../../tests/unit/mesh/mesh.rs"]
mod tests;
