use super::*;
use crate::foundation::core::Point;
use crate::pipeline::PipelineParams;
use crate::sketch::{ConstraintKind, ConstraintTarget, ConstraintWeight, SegmentRef, Transmission};

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

fn solved(scene: &Scene, sketches: Vec<NodeId>, params: &ResolvedParams) -> FlowGroup {
    let mut g = FlowGroup::new(scene, sketches, params).unwrap();
    g.solve(scene, params).unwrap();
    g
}

fn assert_time_follows(mesh: &Mesh, f: impl Fn(Point) -> f64) {
    let layer = mesh.finest_layer();
    for i in layer.interior() {
        let want = f(layer.samples[i].pos);
        assert!((layer.time[i] - want).abs() < 1e-6, "t = {} want {want}", layer.time[i]);
    }
}

#[test]
fn unconstrained_rectangle_runs_bottom_to_top() {
    let mut scene = Scene::new();
    let s = rect_at(&mut scene, 0.0, 20.0, 10.0);
    let g = solved(&scene, vec![s], &params());
    assert!(g.is_done());
    assert!(g.issues.is_empty(), "{:?}", g.issues);
    let mesh = g.mesh(s).unwrap();
    assert_time_follows(mesh, |p| p.y);
    let layer = mesh.finest_layer();
    for i in layer.interior() {
        assert!((layer.stretch[i] - 1.0).abs() < 1e-6);
        assert!(layer.stress[i] < 1e-6);
    }
    assert_eq!(g.regions.reduced.len(), 1);
}

#[test]
fn isoline_constraint_sign_sets_flow_direction() {
    for (dir, sign) in [(1, 1.0), (-1, -1.0)] {
        let mut scene = Scene::new();
        let s = rect_at(&mut scene, 0.0, 20.0, 10.0);
        scene
            .set_constraint(
                s,
                ConstraintTarget::Segment(0),
                ConstraintKind::Isoline,
                dir,
                ConstraintWeight::Auto,
            )
            .unwrap();
        let g = solved(&scene, vec![s], &params());
        let mesh = g.mesh(s).unwrap();
        let layer = mesh.finest_layer();
        for i in layer.interior() {
            assert!((layer.flow[i] - Vec2::new(0.0, sign)).hypot() < 1e-6);
        }
        assert_time_follows(mesh, |p| sign * p.y);
    }
}

#[test]
fn direction_curve_turns_the_flow() {
    let mut scene = Scene::new();
    let s = rect_at(&mut scene, 0.0, 20.0, 10.0);
    let c = scene
        .create_curve(&[Point::new(2.0, 5.0), Point::new(18.0, 5.0)], false, Some(s))
        .unwrap();
    scene
        .set_constraint(
            s,
            ConstraintTarget::Curve(c),
            ConstraintKind::Direction,
            1,
            ConstraintWeight::Value(2.0),
        )
        .unwrap();
    let g = solved(&scene, vec![s], &params());
    assert_time_follows(g.mesh(s).unwrap(), |p| p.x);
}

#[test]
fn invert_time_flips_field() {
    let mut scene = Scene::new();
    let s = rect_at(&mut scene, 0.0, 20.0, 10.0);
    let mut p = params();
    p.invert_time = true;
    let g = solved(&scene, vec![s], &p);
    let mesh = g.mesh(s).unwrap();
    assert_time_follows(mesh, |p| -p.y);
    let layer = mesh.finest_layer();
    assert!(layer.interior().all(|i| layer.flow[i].y < -0.999));
}

#[test]
fn progress_is_monotonic_and_completes() {
    let mut scene = Scene::new();
    let s = rect_at(&mut scene, 0.0, 30.0, 30.0);
    let p = params();
    let mut g = FlowGroup::new(&scene, vec![s], &p).unwrap();
    assert_eq!(g.phase(), FlowPhase::Flow { level: 0, sweeps: 0 });
    let mut last = g.progress();
    assert_eq!(last, 0.0);
    let mut steps = 0;
    while !g.step(&scene, &p).unwrap() {
        let now = g.progress();
        assert!(now >= last && now < 1.0);
        last = now;
        steps += 1;
        assert!(steps < 10_000);
    }
    assert_eq!(g.progress(), 1.0);
    assert!(g.step(&scene, &p).unwrap());
}

#[test]
fn tube_halves_share_one_time_field() {
    let mut scene = Scene::new();
    let a = rect_at(&mut scene, 0.0, 50.0, 100.0);
    let b = rect_at(&mut scene, 60.0, 50.0, 100.0);
    scene
        .set_link(SegmentRef::new(a, 1), SegmentRef::new(b, 3), Transmission::Parent)
        .unwrap();
    scene
        .set_link(SegmentRef::new(a, 3), SegmentRef::new(b, 1), Transmission::Parent)
        .unwrap();
    let p = params();
    let mut groups = flow_groups(&scene, &p).unwrap();
    assert_eq!(groups.len(), 1);
    let g = &mut groups[0];
    assert_eq!(g.sketches, vec![a, b]);
    g.solve(&scene, &p).unwrap();
    assert!(g.issues.is_empty(), "{:?}", g.issues);
    assert_time_follows(g.mesh(a).unwrap(), |p| p.y);
    assert_time_follows(g.mesh(b).unwrap(), |p| p.y);
}

#[test]
fn mismatched_link_lengths_warn() {
    let mut scene = Scene::new();
    let a = rect_at(&mut scene, 0.0, 20.0, 10.0);
    let b = rect_at(&mut scene, 30.0, 20.0, 15.0);
    scene
        .set_link(SegmentRef::new(a, 1), SegmentRef::new(b, 3), Transmission::Parent)
        .unwrap();
    let g = solved(&scene, vec![a, b], &params());
    let w = g
        .issues
        .iter()
        .find(|i| i.message.contains("differ in length"))
        .unwrap();
    assert!(!w.is_error());
    assert_eq!(w.sketch, Some(a));
    assert!((w.center.unwrap() - Point::new(20.0, 5.0)).hypot() < 1e-6);
}

#[test]
fn link_to_unmeshed_sketch_warns() {
    let mut scene = Scene::new();
    let a = rect_at(&mut scene, 0.0, 20.0, 10.0);
    let b = rect_at(&mut scene, 30.0, 20.0, 10.0);
    scene
        .set_link(SegmentRef::new(a, 1), SegmentRef::new(b, 3), Transmission::Parent)
        .unwrap();
    let g = solved(&scene, vec![a], &params());
    assert!(g.issues.iter().any(|i| i.message.contains("not meshed")));
}
