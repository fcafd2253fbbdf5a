use std::ops::{BitOr, BitOrAssign, Range};

use serde::{Deserialize, Serialize};

use crate::foundation::core::StitchId;
use crate::knitout::{Direction, Needle};

/// Per-entry markers of a traced stitch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraceFlags(u8);

impl TraceFlags {
    pub const NONE: Self = Self(0);
    /// Visited against the course order of its stitches.
    pub const INVERSE: Self = Self(1);
    /// Second appearance of the stitch in the trace.
    pub const TWICE: Self = Self(1 << 1);
    pub const CAST_ON: Self = Self(1 << 2);
    pub const CAST_OFF: Self = Self(1 << 3);
    /// First entry fed by one of its carrier devices.
    pub const YARN_START: Self = Self(1 << 4);
    /// Last entry fed by one of its carrier devices.
    pub const YARN_END: Self = Self(1 << 5);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for TraceFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for TraceFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracedStitch {
    pub stitch: StitchId,
    pub pass: u32,
    pub dir: Direction,
    /// Home needle of the stitch, gauge applied.
    pub needle: Needle,
    /// Carrier devices feeding this entry.
    pub yarn_mask: u32,
    pub flags: TraceFlags,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassKind {
    CastOn,
    Knit,
    CastOff,
}

/// Needle span covered by one carrier device within a pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarrierRange {
    pub device: u32,
    pub left: i32,
    pub right: i32,
}

/// One carriage pass: a contiguous run of entries sharing a direction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pass {
    pub kind: PassKind,
    pub course: u32,
    pub dir: Direction,
    pub entries: Range<usize>,
    /// Union of the entries' yarn masks.
    pub yarn_mask: u32,
    pub ranges: Vec<CarrierRange>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    CastOn,
    Course,
    CastOff,
}

/// A logical unit of the trace, highlighted as a whole by hosts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceNode {
    pub kind: NodeKind,
    pub course: u32,
    pub start: usize,
    pub end: usize,
}

impl TraceNode {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceStats {
    pub passes: usize,
    pub courses: usize,
    pub short_rows: usize,
    pub cast_on: usize,
    pub cast_off: usize,
    /// Region changes and yarn breaks.
    pub transitions: usize,
    /// Consecutive passes running the same way.
    pub direction_breaks: usize,
    /// Largest wale shift, in needles.
    pub max_shift: i32,
}
