//! Scene graph of sketches, curves and their annotations.

pub mod edit;
pub mod geometry;
pub mod model;
mod pcurve;
pub mod scene;
pub mod svg;

pub use edit::Axis;
pub use geometry::{Outline, OutlineEdge, SegCurve, flatten_contour, segment_curve};
pub use model::{
    Constraint, ConstraintKind, ConstraintTarget, ConstraintWeight, Contour, CurveSample,
    ImageData, Link, Node, NodeKind, PCurveData, SeamMode, Segment, SegmentRef, SketchData,
    Transmission,
};
pub use scene::{Scene, SceneDoc};
pub use svg::import_svg;
