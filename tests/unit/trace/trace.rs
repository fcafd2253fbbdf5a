use serde_json::json;

use super::*;
use crate::foundation::core::Point;
use crate::layers::{ImageCache, LayerDesc, LayerKind};
use crate::mesh::FlowGroup;
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

fn sample(scene: &Scene, sketches: Vec<NodeId>, params: &ResolvedParams) -> Sampler {
    let mut group = FlowGroup::new(scene, sketches, params).unwrap();
    group.solve(scene, params).unwrap();
    let mut sampler = Sampler::new(&group, params);
    sampler
        .sample(scene, &group, params, &ImageCache::new())
        .unwrap();
    sampler
}

fn tube(scene: &mut Scene) -> Vec<NodeId> {
    let a = rect_at(scene, 0.0, 20.0, 4.0);
    let b = rect_at(scene, 30.0, 20.0, 4.0);
    scene
        .set_link(SegmentRef::new(a, 1), SegmentRef::new(b, 3), Transmission::Parent)
        .unwrap();
    scene
        .set_link(SegmentRef::new(a, 3), SegmentRef::new(b, 1), Transmission::Parent)
        .unwrap();
    vec![a, b]
}

#[test]
fn rectangle_is_cast_on_knit_and_cast_off() {
    let mut scene = Scene::new();
    let s = rect_at(&mut scene, 0.0, 20.0, 10.0);
    let p = params();
    let sampler = sample(&scene, vec![s], &p);
    let trace = Trace::trace(&scene, &sampler, &p).unwrap();
    trace.validate(&sampler).unwrap();
    assert!(trace.is_done());
    assert_eq!(trace.state(), TracerState::Idle);
    assert_eq!(trace.len(), 5000 + 100 + 100);

    let first = trace.nodes.first().unwrap();
    assert_eq!((first.kind, first.len()), (NodeKind::CastOn, 100));
    let last = trace.nodes.last().unwrap();
    assert_eq!((last.kind, last.len()), (NodeKind::CastOff, 100));
    assert_eq!(trace.nodes.iter().filter(|n| n.kind == NodeKind::Course).count(), 50);

    assert_eq!(trace.stats.passes, 52);
    assert_eq!(trace.stats.courses, 50);
    assert_eq!(trace.stats.cast_on, 100);
    assert_eq!(trace.stats.cast_off, 100);
    assert_eq!(trace.stats.direction_breaks, 0);
    assert_eq!(trace.stats.max_shift, 0);
    assert!(trace.passes.windows(2).all(|w| w[0].dir == w[1].dir.reverse()));

    // The cast-on tucks go right, so the first course is knit leftwards.
    assert_eq!(trace.passes[0].kind, PassKind::CastOn);
    assert_eq!(trace.passes[0].dir, Direction::Right);
    assert_eq!(trace.passes[1].dir, Direction::Left);
    let knit = &trace.entries[trace.passes[1].entries.clone()];
    assert!(knit.iter().all(|e| e.flags.contains(TraceFlags::TWICE | TraceFlags::INVERSE)));
    assert_eq!(knit[0].needle, Needle::front(99));

    for (k, id) in sampler.courses[7].ids().enumerate() {
        assert_eq!(trace.home(id), Some(Needle::front(k as i32)));
    }
    let tail = &trace.entries[last.start..last.end];
    assert!(tail.iter().all(|e| e.flags.contains(TraceFlags::CAST_OFF | TraceFlags::TWICE)));
    assert_eq!(trace.node_index()[0], (0, 100));
}

#[test]
fn single_yarn_starts_and_ends_once() {
    let mut scene = Scene::new();
    let s = rect_at(&mut scene, 0.0, 4.0, 2.0);
    let p = params();
    let sampler = sample(&scene, vec![s], &p);
    let trace = Trace::trace(&scene, &sampler, &p).unwrap();
    let starts = trace
        .entries
        .iter()
        .filter(|e| e.flags.contains(TraceFlags::YARN_START))
        .count();
    let ends: Vec<usize> = trace
        .entries
        .iter()
        .enumerate()
        .filter(|(_, e)| e.flags.contains(TraceFlags::YARN_END))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(starts, 1);
    assert!(trace.entries[0].flags.contains(TraceFlags::YARN_START));
    assert_eq!(ends, vec![trace.len() - 1]);
    assert_eq!(trace.stats.transitions, 0);
    let pass = &trace.passes[1];
    assert_eq!(pass.yarn_mask, 1);
    assert_eq!(
        pass.ranges,
        vec![CarrierRange {
            device: 0,
            left: 0,
            right: 19
        }]
    );
}

#[test]
fn yarn_change_is_a_transition() {
    let mut scene = Scene::new();
    let s = rect_at(&mut scene, 0.0, 4.0, 4.0);
    scene
        .add_layer(
            s,
            LayerDesc::new(LayerKind::Yarn)
                .with("yarn", json!("2"))
                .with("where", json!("row >= 10")),
        )
        .unwrap();
    let p = params();
    let sampler = sample(&scene, vec![s], &p);
    let trace = Trace::trace(&scene, &sampler, &p).unwrap();
    assert_eq!(trace.stats.transitions, 1);
    let starts: Vec<u32> = trace
        .entries
        .iter()
        .filter(|e| e.flags.contains(TraceFlags::YARN_START))
        .map(|e| e.yarn_mask)
        .collect();
    assert_eq!(starts, vec![0b01, 0b10]);
    assert!(trace.issues.is_empty());
}

#[test]
fn tube_alternates_around_both_beds() {
    let mut scene = Scene::new();
    let sketches = tube(&mut scene);
    let p = params();
    let sampler = sample(&scene, sketches, &p);
    let trace = Trace::trace(&scene, &sampler, &p).unwrap();
    trace.validate(&sampler).unwrap();
    assert_eq!(trace.stats.direction_breaks, 0);
    assert!(trace.passes.windows(2).all(|w| w[0].dir == w[1].dir.reverse()));

    let course_passes = |c: u32| -> Vec<&Pass> {
        trace
            .passes
            .iter()
            .filter(|ps| ps.course == c && ps.kind == PassKind::Knit)
            .collect()
    };
    let c0 = course_passes(0);
    assert_eq!(c0.len(), 2);
    assert_eq!((c0[0].dir, c0[0].entries.len()), (Direction::Right, 100));
    assert!(
        trace.entries[c0[0].entries.clone()]
            .iter()
            .all(|e| e.needle.side == Side::Front)
    );
    assert!(
        trace.entries[c0[1].entries.clone()]
            .iter()
            .all(|e| e.needle.side == Side::Back)
    );

    // The next course runs the other way round the tube.
    let c1 = course_passes(1);
    let first = trace.entries[c1[0].entries.start];
    assert_eq!(first.needle.side, Side::Back);
    assert!(first.flags.contains(TraceFlags::INVERSE));
    assert_eq!(first.stitch.0, sampler.courses[1].stitches.end - 1);
    assert_eq!(first.needle, Needle::back(0));
}

#[test]
fn half_gauge_uses_even_and_odd_needles() {
    let mut scene = Scene::new();
    let sketches = tube(&mut scene);
    let mut p = params();
    p.gauge = 2;
    let sampler = sample(&scene, sketches, &p);
    let trace = Trace::trace(&scene, &sampler, &p).unwrap();
    for e in &trace.entries {
        let odd = e.needle.offset % 2 == 1;
        assert_eq!(odd, e.needle.side == Side::Back, "{e:?}");
    }
}

#[test]
fn excessive_wale_shift_aborts() {
    let mut scene = Scene::new();
    let s = scene
        .create_sketch(&[
            Point::new(0.0, 0.0),
            Point::new(20.0, 0.0),
            Point::new(15.0, 5.0),
            Point::new(5.0, 5.0),
        ])
        .unwrap();
    let mut p = params();
    p.course_dist = 1.0;
    let sampler = sample(&scene, vec![s], &p);
    let err = Trace::trace(&scene, &sampler, &p).unwrap_err();
    assert!(err.to_string().contains("racking limit"), "{err}");

    p.max_racking = 8;
    let trace = Trace::trace(&scene, &sampler, &p).unwrap();
    assert!(trace.stats.max_shift > 4);
}

#[test]
fn validate_catches_missing_and_repeated_stitches() {
    let mut scene = Scene::new();
    let s = rect_at(&mut scene, 0.0, 4.0, 2.0);
    let p = params();
    let sampler = sample(&scene, vec![s], &p);
    let trace = Trace::trace(&scene, &sampler, &p).unwrap();

    let mut missing = trace.clone();
    let i = missing.passes[2].entries.start;
    missing.entries.remove(i);
    assert!(missing.validate(&sampler).is_err());

    let mut unmarked = trace.clone();
    let i = unmarked.passes[1].entries.start;
    unmarked.entries[i].flags = TraceFlags::NONE;
    assert!(unmarked.validate(&sampler).is_err());
}

#[test]
fn progress_grows_until_done() {
    let mut scene = Scene::new();
    let s = rect_at(&mut scene, 0.0, 4.0, 10.0);
    let p = params();
    let sampler = sample(&scene, vec![s], &p);
    let mut trace = Trace::new(&sampler);
    let mut last = trace.progress();
    while !trace.step(&scene, &sampler, &p).unwrap() {
        assert!(trace.progress() > last);
        last = trace.progress();
        assert_eq!(trace.state(), TracerState::Knitting);
    }
    assert_eq!(trace.progress(), 1.0);
}

#[test]
fn unsampled_group_traces_nothing() {
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
    let sampler = sample(&scene, vec![s], &p);
    assert!(sampler.is_empty());
    let trace = Trace::trace(&scene, &sampler, &p).unwrap();
    assert!(trace.is_done());
    assert!(trace.is_empty());
    assert_eq!(trace.progress(), 1.0);
}
