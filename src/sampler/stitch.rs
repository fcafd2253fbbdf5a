use std::ops::Range;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::foundation::core::{NodeId, Point, StitchId};
use crate::sketch::SegmentRef;

/// Role of a stitch in the wale graph.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StitchKind {
    #[default]
    Regular,
    CastOn,
    CastOff,
    /// Two loops from below merge into this one.
    Decrease,
    /// This loop feeds two stitches above.
    Increase,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stitch {
    /// Global millimetres.
    pub pos: Point,
    /// Position in the frame of `sketch`, before its transforms and the sketch scale.
    pub local: Point,
    pub sketch: NodeId,
    /// Mesh layer the stitch was sampled on.
    pub layer: usize,
    pub course: u32,
    pub prev_wales: SmallVec<[StitchId; 2]>,
    pub next_wales: SmallVec<[StitchId; 2]>,
    pub prev_course: Option<StitchId>,
    pub next_course: Option<StitchId>,
    pub kind: StitchKind,
    /// Program code written by sketch layers.
    pub program: u8,
    /// Carrier devices feeding this stitch, bit `i` for device `i`.
    pub yarn_mask: u32,
}

impl Stitch {
    pub fn is_irregular(&self) -> bool {
        self.prev_wales.len() > 1 || self.next_wales.len() > 1
    }
}

/// Where a course crosses a link: stitches from `stitch` on lie past the junction.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CourseJunction {
    pub stitch: u32,
    pub from: SegmentRef,
    pub to: SegmentRef,
}

/// One sampled isoline: a contiguous run of stitch ids.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub stitches: Range<u32>,
    pub closed: bool,
    pub time: f64,
    /// Row number counted in course spacings from the bottom of the group.
    pub row: u32,
    /// Reduced region index.
    pub region: usize,
    pub short_row: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub junctions: Vec<CourseJunction>,
}

impl Course {
    pub fn len(&self) -> usize {
        self.stitches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stitches.is_empty()
    }

    pub fn ids(&self) -> impl DoubleEndedIterator<Item = StitchId> + ExactSizeIterator + '_ {
        self.stitches.clone().map(StitchId)
    }
}
