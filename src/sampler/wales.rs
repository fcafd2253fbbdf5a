//! Monotone wale matching between two consecutive courses.

use crate::foundation::core::Point;

/// Pairs `(lower, upper)` linking a course of `m` stitches to the next one of `n`.
///
/// The larger course is walked and every stitch is sent to the proportional stitch of the
/// smaller one, so decreases (or increases) spread evenly. Beyond a factor of two only the
/// centered `2 * min(m, n)` stitches of the larger course find a partner; the rest start or
/// end a short row.
pub fn match_wales(m: usize, n: usize) -> Vec<(usize, usize)> {
    if m == 0 || n == 0 {
        return Vec::new();
    }
    if m >= n {
        let used = m.min(2 * n);
        let off = (m - used) / 2;
        (0..used)
            .map(|k| (off + k, (((k as f64 + 0.5) * n as f64) / used as f64).floor() as usize))
            .map(|(i, j)| (i, j.min(n - 1)))
            .collect()
    } else {
        let used = n.min(2 * m);
        let off = (n - used) / 2;
        (0..used)
            .map(|k| ((((k as f64 + 0.5) * m as f64) / used as f64).floor() as usize, off + k))
            .map(|(i, j)| (i.min(m - 1), j))
            .collect()
    }
}

/// Rotation applied to an upper closed course so that index 0 sits over lower index 0.
pub fn closed_offset(lower_first: Point, upper: &[Point]) -> usize {
    upper
        .iter()
        .enumerate()
        .min_by(|a, b| {
            (*a.1 - lower_first)
                .hypot2()
                .total_cmp(&(*b.1 - lower_first).hypot2())
        })
        .map(|(i, _)| i)
        .unwrap_or(0)
}

#[cfg(test)]
#[path = "../../tests/unit/sampler/wales.rs"]
mod tests;
