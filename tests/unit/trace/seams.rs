use super::*;
use crate::foundation::core::{NodeId, Point};
use crate::layers::ImageCache;
use crate::mesh::FlowGroup;
use crate::pipeline::{PipelineParams, ResolvedParams};
use crate::sketch::Transmission;

fn rect_at(scene: &mut Scene, x: f64) -> NodeId {
    scene
        .create_sketch(&[
            Point::new(x, 0.0),
            Point::new(x + 20.0, 0.0),
            Point::new(x + 20.0, 4.0),
            Point::new(x, 4.0),
        ])
        .unwrap()
}

fn tube() -> (Scene, NodeId, NodeId) {
    let mut scene = Scene::new();
    let a = rect_at(&mut scene, 0.0);
    let b = rect_at(&mut scene, 30.0);
    scene
        .set_link(SegmentRef::new(a, 1), SegmentRef::new(b, 3), Transmission::Parent)
        .unwrap();
    scene
        .set_link(SegmentRef::new(a, 3), SegmentRef::new(b, 1), Transmission::Parent)
        .unwrap();
    (scene, a, b)
}

fn sample(scene: &Scene, sketches: Vec<NodeId>) -> (Sampler, ResolvedParams) {
    let params = PipelineParams::default().resolve().unwrap();
    let mut group = FlowGroup::new(scene, sketches, &params).unwrap();
    group.solve(scene, &params).unwrap();
    let mut sampler = Sampler::new(&group, &params);
    sampler
        .sample(scene, &group, &params, &ImageCache::new())
        .unwrap();
    (sampler, params)
}

fn start_of(scene: &Scene, sampler: &Sampler, c: usize, prev: Option<StitchId>, p: &ResolvedParams) -> usize {
    course_start(scene, sampler, &sampler.courses[c], prev, p.seam_stop, p.seam_weight)
}

#[test]
fn unmarked_tube_starts_at_the_chain_start_and_follows_wales() {
    let (scene, a, b) = tube();
    let (sampler, p) = sample(&scene, vec![a, b]);
    assert_eq!(start_of(&scene, &sampler, 0, None, &p), 0);
    let first = StitchId(sampler.courses[0].stitches.start + 37);
    assert_eq!(start_of(&scene, &sampler, 1, Some(first), &p), 37);
}

#[test]
fn seam_border_attracts_the_start() {
    let (mut scene, a, b) = tube();
    scene.set_seam_mode(SegmentRef::new(a, 1), SeamMode::Seam).unwrap();
    let (sampler, p) = sample(&scene, vec![a, b]);
    assert_eq!(start_of(&scene, &sampler, 0, None, &p), 100);

    let base = sampler.courses[0].stitches.start;
    let near = StitchId(base + 98);
    assert_eq!(start_of(&scene, &sampler, 1, Some(near), &p), 100);
    let far = StitchId(base + 50);
    assert_eq!(start_of(&scene, &sampler, 1, Some(far), &p), 50);
}

#[test]
fn seamless_border_pushes_the_start_off() {
    let (mut scene, a, b) = tube();
    scene.set_seam_mode(SegmentRef::new(a, 3), SeamMode::None).unwrap();
    let (sampler, p) = sample(&scene, vec![a, b]);
    assert_eq!(start_of(&scene, &sampler, 0, None, &p), 1);
    assert_eq!(seam_mode(&scene, SegmentRef::new(a, 3)), SeamMode::None);
    assert_eq!(seam_mode(&scene, SegmentRef::new(b, 3)), SeamMode::Auto);
}

#[test]
fn open_courses_always_start_at_zero() {
    let mut scene = Scene::new();
    let a = rect_at(&mut scene, 0.0);
    let (sampler, p) = sample(&scene, vec![a]);
    let prev = StitchId(sampler.courses[0].stitches.start + 5);
    assert_eq!(start_of(&scene, &sampler, 1, Some(prev), &p), 0);
}
