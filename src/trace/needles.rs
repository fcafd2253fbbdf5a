//! Needle placement of courses.
//!
//! Positions are logical (one slot per stitch) until [`physical`] applies the gauge: at half
//! gauge front loops sit on even needles and back loops on odd ones.

use crate::knitout::{Needle, Side};

/// Bed side and logical offset, relative to the course base, of each position of a course
/// of `n` stitches. Closed courses put the first half on the front bed going right and the
/// rest on the back bed coming back.
pub fn relative_slots(n: usize, closed: bool) -> Vec<(Side, i32)> {
    if !closed {
        return (0..n).map(|k| (Side::Front, k as i32)).collect();
    }
    let front = n.div_ceil(2);
    (0..n)
        .map(|k| {
            if k < front {
                (Side::Front, k as i32)
            } else {
                (Side::Back, (n - 1 - k) as i32)
            }
        })
        .collect()
}

/// Base offset that keeps the course over the loops it is knit from: the median of the
/// offsets between each stitch and its wales below, same-bed pairs preferred.
pub fn choose_base(pairs: &[((Side, i32), (Side, i32))]) -> i32 {
    let same: Vec<i32> = pairs
        .iter()
        .filter(|(here, below)| here.0 == below.0)
        .map(|(here, below)| below.1 - here.1)
        .collect();
    let mut diffs = if same.is_empty() {
        pairs.iter().map(|(here, below)| below.1 - here.1).collect()
    } else {
        same
    };
    if diffs.is_empty() {
        return 0;
    }
    diffs.sort_unstable();
    diffs[diffs.len() / 2]
}

pub fn physical(side: Side, logical: i32, gauge: u8) -> Needle {
    let g = i32::from(gauge.max(1));
    let odd = if g > 1 && !side.is_front() { 1 } else { 0 };
    Needle::new(side, logical * g + odd)
}

#[cfg(test)]
#[path = "../../tests/unit/trace/needles.rs"]
mod tests;
