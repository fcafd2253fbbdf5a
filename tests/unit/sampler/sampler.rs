use serde_json::json;

use super::*;
use crate::foundation::core::{Affine, Point, Vec2};
use crate::layers::{LayerDesc, LayerKind, StitchCode};
use crate::pipeline::PipelineParams;
use crate::sketch::{SegmentRef, Transmission};

fn params() -> ResolvedParams {
    PipelineParams::default().resolve().unwrap()
}

fn rect_at(scene: &mut Scene, x: f64, w: f64, h: f64) -> NodeId {
    scene
        .create_sketch(&[
            Point::new(x, 0.0),
            Point::new(x + w, 0.0),
            Point::new(x + w, h),
            Point::new(x, h),
        ])
        .unwrap()
}

fn sampled(scene: &Scene, sketches: Vec<NodeId>, params: &ResolvedParams) -> Sampler {
    let mut group = FlowGroup::new(scene, sketches, params).unwrap();
    group.solve(scene, params).unwrap();
    let mut sampler = Sampler::new(&group, params);
    sampler
        .sample(scene, &group, params, &ImageCache::new())
        .unwrap();
    sampler
}

#[test]
fn rectangle_samples_a_regular_grid() {
    let mut scene = Scene::new();
    let s = rect_at(&mut scene, 0.0, 20.0, 10.0);
    let sampler = sampled(&scene, vec![s], &params());
    assert!(sampler.is_done());
    assert!(sampler.issues.is_empty(), "{:?}", sampler.issues);
    assert_eq!(sampler.courses.len(), 50);
    assert!(sampler.courses.iter().all(|c| c.len() == 100 && !c.closed));
    assert_eq!(sampler.len(), 5000);
    assert_eq!(sampler.count_kind(StitchKind::CastOn), 100);
    assert_eq!(sampler.count_kind(StitchKind::CastOff), 100);
    assert_eq!(sampler.irregular_count(), 0);
    sampler.validate().unwrap();

    let first = &sampler.stitches[0];
    assert!((first.pos - Point::new(0.1, 0.1)).hypot() < 1e-6);
    assert_eq!(first.sketch, s);
    let rows: Vec<u32> = sampler.courses.iter().map(|c| c.row).collect();
    assert_eq!(rows, (0..50).collect::<Vec<u32>>());
    let above = first.next_wales[0];
    assert!((sampler.stitch(above).unwrap().pos - Point::new(0.1, 0.3)).hypot() < 1e-6);
    assert_eq!(sampler.course_of(above).unwrap().row, 1);
    assert!(sampler.covers(s));
}

#[test]
fn every_stitch_defaults_to_the_default_carrier() {
    let mut scene = Scene::new();
    let s = rect_at(&mut scene, 0.0, 4.0, 4.0);
    let sampler = sampled(&scene, vec![s], &params());
    assert!(!sampler.is_empty());
    assert!(sampler.stitches.iter().all(|st| st.yarn_mask == 1 && st.program == 0));
}

#[test]
fn narrowing_shape_decreases() {
    let mut scene = Scene::new();
    let s = scene
        .create_sketch(&[
            Point::new(0.0, 0.0),
            Point::new(20.0, 0.0),
            Point::new(15.0, 10.0),
            Point::new(5.0, 10.0),
        ])
        .unwrap();
    let sampler = sampled(&scene, vec![s], &params());
    assert!(!sampler.issues.iter().any(|i| i.is_error()), "{:?}", sampler.issues);
    sampler.validate().unwrap();
    assert!(sampler.count_kind(StitchKind::Decrease) > 0);
    assert_eq!(sampler.count_kind(StitchKind::Increase), 0);
    let lens: Vec<usize> = sampler.courses.iter().map(|c| c.len()).collect();
    assert!(lens.windows(2).all(|w| w[1] <= w[0]), "{lens:?}");
    assert!(lens[0] > *lens.last().unwrap());
}

#[test]
fn tube_courses_close_across_both_links() {
    let mut scene = Scene::new();
    let a = rect_at(&mut scene, 0.0, 20.0, 10.0);
    let b = rect_at(&mut scene, 30.0, 20.0, 10.0);
    scene
        .set_link(SegmentRef::new(a, 1), SegmentRef::new(b, 3), Transmission::Parent)
        .unwrap();
    scene
        .set_link(SegmentRef::new(a, 3), SegmentRef::new(b, 1), Transmission::Parent)
        .unwrap();
    let sampler = sampled(&scene, vec![a, b], &params());
    assert!(sampler.issues.is_empty(), "{:?}", sampler.issues);
    sampler.validate().unwrap();
    assert_eq!(sampler.courses.len(), 50);
    for c in &sampler.courses {
        assert!(c.closed);
        assert_eq!(c.len(), 200);
        let at: Vec<u32> = c.junctions.iter().map(|j| j.stitch).collect();
        assert_eq!(at, vec![0, 100]);
        let first = &sampler.stitches[c.stitches.start as usize];
        let last = &sampler.stitches[c.stitches.end as usize - 1];
        assert_eq!(first.prev_course, Some(StitchId(c.stitches.end - 1)));
        assert_eq!(last.next_course, Some(StitchId(c.stitches.start)));
        assert_eq!(first.sketch, a);
        assert_eq!(last.sketch, b);
    }
    assert_eq!(sampler.irregular_count(), 0);
    assert_eq!(sampler.count_kind(StitchKind::CastOn), 200);
}

#[test]
fn program_layers_follow_the_subdivided_grid() {
    let mut scene = Scene::new();
    let s = rect_at(&mut scene, 0.0, 4.0, 4.0);
    scene
        .add_layer(
            s,
            LayerDesc::new(LayerKind::Program).with("program", json!("col % 2 == 0 ? purl : knit")),
        )
        .unwrap();
    let mut p = params();
    p.subdiv = 2;
    let sampler = sampled(&scene, vec![s], &p);
    assert!(sampler.issues.is_empty(), "{:?}", sampler.issues);
    let course = &sampler.courses[0];
    for (k, id) in course.ids().enumerate() {
        let want = if (k / 2) % 2 == 0 {
            StitchCode::Purl
        } else {
            StitchCode::Knit
        };
        assert_eq!(sampler.stitch(id).unwrap().program, want as u8, "stitch {k}");
    }
}

#[test]
fn yarn_layer_overrides_the_mask() {
    let mut scene = Scene::new();
    let s = rect_at(&mut scene, 0.0, 4.0, 4.0);
    scene
        .add_layer(
            s,
            LayerDesc::new(LayerKind::Yarn)
                .with("yarn", json!("2"))
                .with("where", json!("row >= 3")),
        )
        .unwrap();
    let sampler = sampled(&scene, vec![s], &params());
    for st in &sampler.stitches {
        let row = sampler.courses[st.course as usize].row;
        assert_eq!(st.yarn_mask, if row >= 3 { 0b10 } else { 1 });
    }
}

#[test]
fn each_sketch_of_a_group_applies_its_own_layers() {
    let mut scene = Scene::new();
    let a = rect_at(&mut scene, 0.0, 4.0, 4.0);
    let b = rect_at(&mut scene, 10.0, 4.0, 4.0);
    scene
        .set_link(SegmentRef::new(a, 1), SegmentRef::new(b, 3), Transmission::Parent)
        .unwrap();
    scene
        .set_link(SegmentRef::new(a, 3), SegmentRef::new(b, 1), Transmission::Parent)
        .unwrap();
    scene
        .add_layer(a, LayerDesc::new(LayerKind::Program).with("program", json!("tuck")))
        .unwrap();
    scene
        .add_layer(b, LayerDesc::new(LayerKind::Yarn).with("yarn", json!("2")))
        .unwrap();
    let sampler = sampled(&scene, vec![a, b], &params());
    assert!(sampler.issues.is_empty(), "{:?}", sampler.issues);
    assert!(sampler.stitches.iter().any(|st| st.sketch == a));
    assert!(sampler.stitches.iter().any(|st| st.sketch == b));
    for st in &sampler.stitches {
        if st.sketch == a {
            assert_eq!((st.program, st.yarn_mask), (StitchCode::Tuck as u8, 1));
        } else {
            assert_eq!((st.program, st.yarn_mask), (0, 0b10));
        }
    }
}

#[test]
fn stitches_keep_their_sketch_local_position() {
    let mut scene = Scene::new();
    let s = rect_at(&mut scene, 0.0, 20.0, 10.0);
    scene
        .set_transform(s, Affine::translate(Vec2::new(1000.0, 0.0)))
        .unwrap();
    let sampler = sampled(&scene, vec![s], &params());
    assert_eq!(sampler.len(), 5000);
    for st in &sampler.stitches {
        assert!((st.pos.x - st.local.x - 1000.0).abs() < 1e-6);
        assert!((st.pos.y - st.local.y).abs() < 1e-6);
        assert!((0.0..20.0).contains(&st.local.x) && (0.0..10.0).contains(&st.local.y));
    }

    let mut p = params();
    p.mm_per_px = 2.0;
    let mut scene = Scene::new();
    let s = rect_at(&mut scene, 0.0, 5.0, 5.0);
    let sampler = sampled(&scene, vec![s], &p);
    assert!(!sampler.is_empty());
    for st in &sampler.stitches {
        assert!((st.pos.to_vec2() - st.local.to_vec2() * 2.0).hypot() < 1e-6);
    }
}

#[test]
fn broken_layer_becomes_a_warning() {
    let mut scene = Scene::new();
    let s = rect_at(&mut scene, 0.0, 4.0, 4.0);
    scene
        .add_layer(s, LayerDesc::new(LayerKind::Program).with("program", json!("row +")))
        .unwrap();
    let sampler = sampled(&scene, vec![s], &params());
    let issue = sampler
        .issues
        .iter()
        .find(|i| i.message.contains("layer 0"))
        .unwrap();
    assert!(!issue.is_error());
    assert_eq!(issue.sketch, Some(s));
    assert!(sampler.stitches.iter().all(|st| st.program == 0));
}

#[test]
fn group_with_errors_is_not_sampled() {
    let mut scene = Scene::new();
    let s = scene
        .create_sketch(&[
            Point::new(0.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(10.0, 0.0),
            Point::new(0.0, 10.0),
        ])
        .unwrap();
    let p = params();
    let mut group = FlowGroup::new(&scene, vec![s], &p).unwrap();
    group.solve(&scene, &p).unwrap();
    assert!(group.has_errors());
    let mut sampler = Sampler::new(&group, &p);
    assert!(sampler.is_done());
    assert!(sampler.issues.iter().all(|i| i.is_error()));
    assert!(!sampler.issues.is_empty());
    sampler
        .sample(&scene, &group, &p, &ImageCache::new())
        .unwrap();
    assert!(sampler.is_empty());
}

#[test]
fn progress_grows_until_done() {
    let mut scene = Scene::new();
    let s = rect_at(&mut scene, 0.0, 10.0, 10.0);
    let p = params();
    let mut group = FlowGroup::new(&scene, vec![s], &p).unwrap();
    group.solve(&scene, &p).unwrap();
    let mut sampler = Sampler::new(&group, &p);
    let images = ImageCache::new();
    let mut last = sampler.progress();
    assert_eq!(last, 0.0);
    while !sampler.step(&scene, &group, &p, &images).unwrap() {
        let now = sampler.progress();
        assert!(now >= last);
        assert!(now < 1.0);
        last = now;
    }
    assert_eq!(sampler.progress(), 1.0);
}
