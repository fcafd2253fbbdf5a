use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::foundation::core::{Affine, LinkId, NodeId, Point};
use crate::layers::LayerDesc;

/// Per-segment seam preference used when choosing where closed courses start.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeamMode {
    #[default]
    Auto,
    None,
    Seam,
}

/// One segment of a contour, from vertex `i` to vertex `i + 1`.
///
/// The segment degree is `controls.len() + 1`: a line has no control point, a quadratic one and
/// a cubic two.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    #[serde(default, skip_serializing_if = "SmallVec::is_empty")]
    pub controls: SmallVec<[Point; 2]>,
    #[serde(default)]
    pub seam: SeamMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<LinkId>,
}

impl Segment {
    pub fn line() -> Self {
        Self::default()
    }

    pub fn degree(&self) -> usize {
        self.controls.len() + 1
    }
}

/// Vertices and segments of a sketch or curve, in node-local coordinates.
///
/// A closed contour has one segment per vertex; an open one has one fewer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Contour {
    pub vertices: Vec<Point>,
    pub segments: Vec<Segment>,
    pub closed: bool,
}

impl Contour {
    pub fn polygon(points: &[Point]) -> Self {
        Self {
            vertices: points.to_vec(),
            segments: vec![Segment::line(); points.len()],
            closed: true,
        }
    }

    pub fn polyline(points: &[Point]) -> Self {
        Self {
            vertices: points.to_vec(),
            segments: vec![Segment::line(); points.len().saturating_sub(1)],
            closed: false,
        }
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Start and end vertex of segment `seg`.
    pub fn endpoints(&self, seg: usize) -> (Point, Point) {
        let n = self.vertices.len();
        (self.vertices[seg], self.vertices[(seg + 1) % n])
    }

    pub fn is_well_formed(&self) -> bool {
        let expected = if self.closed {
            self.vertices.len()
        } else {
            self.vertices.len().saturating_sub(1)
        };
        self.segments.len() == expected && self.segments.iter().all(|s| s.controls.len() <= 2)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    Direction,
    Isoline,
}

/// What a flow constraint follows: a child curve of the sketch, or one of its own segments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintTarget {
    Curve(NodeId),
    Segment(usize),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintWeight {
    #[default]
    Auto,
    Value(f64),
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub target: ConstraintTarget,
    pub kind: ConstraintKind,
    /// `+1` or `-1`.
    pub dir: i8,
    #[serde(default)]
    pub weight: ConstraintWeight,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SketchData {
    pub contour: Contour,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<Constraint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub layers: Vec<LayerDesc>,
}

/// Position on another curve: `t` along segment `seg` of `curve`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CurveSample {
    pub curve: NodeId,
    pub seg: usize,
    pub t: f64,
}

/// A curve whose control points are sampled from other curves.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PCurveData {
    pub degree: u8,
    pub samples: [Option<CurveSample>; 4],
}

impl PCurveData {
    /// Sample slots that are meaningful for a degree.
    pub fn slots_for(degree: u8) -> &'static [usize] {
        match degree {
            1 => &[0, 3],
            2 => &[0, 1, 3],
            _ => &[0, 1, 2, 3],
        }
    }

    pub fn is_complete(&self) -> bool {
        Self::slots_for(self.degree)
            .iter()
            .all(|&s| self.samples[s].is_some())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageData {
    /// Path of the raster, resolved by the host.
    pub src: String,
    pub width: f64,
    pub height: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    Sketch(SketchData),
    Curve { contour: Contour },
    #[serde(rename = "pcurve")]
    PCurve(PCurveData),
    Image(ImageData),
    Anchor,
    Rect { width: f64, height: f64 },
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sketch(_) => "sketch",
            Self::Curve { .. } => "curve",
            Self::PCurve(_) => "pcurve",
            Self::Image(_) => "image",
            Self::Anchor => "anchor",
            Self::Rect { .. } => "rect",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default = "identity", skip_serializing_if = "is_identity")]
    pub transform: Affine,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeId>,
    #[serde(flatten)]
    pub kind: NodeKind,
}

fn identity() -> Affine {
    Affine::IDENTITY
}

fn is_identity(a: &Affine) -> bool {
    *a == Affine::IDENTITY
}

impl Node {
    pub fn contour(&self) -> Option<&Contour> {
        match &self.kind {
            NodeKind::Sketch(s) => Some(&s.contour),
            NodeKind::Curve { contour } => Some(contour),
            _ => None,
        }
    }

    pub fn contour_mut(&mut self) -> Option<&mut Contour> {
        match &mut self.kind {
            NodeKind::Sketch(s) => Some(&mut s.contour),
            NodeKind::Curve { contour } => Some(contour),
            _ => None,
        }
    }

    pub fn sketch(&self) -> Option<&SketchData> {
        match &self.kind {
            NodeKind::Sketch(s) => Some(s),
            _ => None,
        }
    }

    pub fn sketch_mut(&mut self) -> Option<&mut SketchData> {
        match &mut self.kind {
            NodeKind::Sketch(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_sketch(&self) -> bool {
        matches!(self.kind, NodeKind::Sketch(_))
    }
}

/// Which side of a link propagates edits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transmission {
    #[default]
    Parent,
    Child,
    Both,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SegmentRef {
    pub sketch: NodeId,
    pub segment: usize,
}

impl SegmentRef {
    pub fn new(sketch: NodeId, segment: usize) -> Self {
        Self { sketch, segment }
    }
}

/// Symmetric association between two segments of different sketches.
///
/// Without `mirror`, parameter `u` on `a` corresponds to `1 - u` on `b`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    pub a: SegmentRef,
    pub b: SegmentRef,
    #[serde(default)]
    pub transmission: Transmission,
    #[serde(default)]
    pub mirror: bool,
}

impl Link {
    /// The end opposite to `side`, if `side` is one of this link's segments.
    pub fn other(&self, side: SegmentRef) -> Option<SegmentRef> {
        if side == self.a {
            Some(self.b)
        } else if side == self.b {
            Some(self.a)
        } else {
            None
        }
    }

    pub fn touches(&self, sketch: NodeId) -> bool {
        self.a.sketch == sketch || self.b.sketch == sketch
    }

    /// Map a segment parameter across the link.
    pub fn map_param(&self, u: f64) -> f64 {
        if self.mirror { u } else { 1.0 - u }
    }
}
