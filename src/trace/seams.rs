//! Where closed courses begin.
//!
//! A closed course starts above the previous course's start, following its first wale. When
//! a junction on a border marked as a seam lies within `seam_stop * seam_weight` stitches, the
//! start moves onto it. Borders marked as seamless never host the start.

use crate::foundation::core::StitchId;
use crate::sampler::{Course, CourseJunction, Sampler};
use crate::sketch::{Scene, SeamMode, SegmentRef};

pub fn seam_mode(scene: &Scene, seg: SegmentRef) -> SeamMode {
    scene
        .node(seg.sketch)
        .and_then(|n| n.contour())
        .and_then(|c| c.segments.get(seg.segment))
        .map(|s| s.seam)
        .unwrap_or_default()
}

fn junction_mode(scene: &Scene, j: &CourseJunction) -> SeamMode {
    match (seam_mode(scene, j.from), seam_mode(scene, j.to)) {
        (SeamMode::Seam, _) | (_, SeamMode::Seam) => SeamMode::Seam,
        (SeamMode::None, _) | (_, SeamMode::None) => SeamMode::None,
        _ => SeamMode::Auto,
    }
}

fn cyclic_distance(a: usize, b: usize, n: usize) -> usize {
    let d = a.abs_diff(b);
    d.min(n - d)
}

/// Index, within `course`, of the stitch the course starts with.
pub fn course_start(
    scene: &Scene,
    sampler: &Sampler,
    course: &Course,
    prev_start: Option<StitchId>,
    seam_stop: f64,
    seam_weight: f64,
) -> usize {
    let n = course.len();
    if !course.closed || n == 0 {
        return 0;
    }
    let seams: Vec<usize> = course
        .junctions
        .iter()
        .filter(|j| junction_mode(scene, j) == SeamMode::Seam)
        .map(|j| j.stitch as usize % n)
        .collect();
    let followed = prev_start
        .and_then(|p| sampler.stitch(p))
        .and_then(|s| s.next_wales.iter().find(|w| course.stitches.contains(&w.0)))
        .map(|w| (w.0 - course.stitches.start) as usize);

    let mut start = match followed {
        Some(k) => {
            let reach = seam_stop * seam_weight;
            seams
                .iter()
                .map(|&s| (cyclic_distance(k, s, n), s))
                .filter(|(d, _)| *d as f64 <= reach)
                .min()
                .map_or(k, |(_, s)| s)
        }
        None => seams.first().copied().unwrap_or(0),
    };

    let avoided: Vec<usize> = course
        .junctions
        .iter()
        .filter(|j| junction_mode(scene, j) == SeamMode::None)
        .map(|j| j.stitch as usize % n)
        .collect();
    for _ in 0..n {
        if !avoided.contains(&start) {
            break;
        }
        start = (start + 1) % n;
    }
    start
}

#[cfg(test)]
#[path = "../../tests/unit/trace/seams.rs"]
mod tests;
