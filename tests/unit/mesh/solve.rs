use super::*;
use crate::sketch::Scene;

fn square(scene: &mut Scene) -> NodeId {
    scene
        .create_sketch(&[
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ])
        .unwrap()
}

fn layer_of(scene: &Scene, s: NodeId) -> (Outline, Layer) {
    let outline = Outline::build(scene, s, Affine::IDENTITY, 0.5).unwrap();
    let layer = Layer::build(scene, &outline, 0, 1.0);
    (outline, layer)
}

#[test]
fn segment_constraint_follows_the_outline() {
    let mut scene = Scene::new();
    let s = square(&mut scene);
    scene
        .set_constraint(
            s,
            ConstraintTarget::Segment(1),
            ConstraintKind::Direction,
            -1,
            ConstraintWeight::Auto,
        )
        .unwrap();
    let (outline, _) = layer_of(&scene, s);
    let lines = constraint_lines(&scene, s, &outline, Affine::IDENTITY).unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].points, vec![Point::new(10.0, 0.0), Point::new(10.0, 10.0)]);
    assert_eq!(lines[0].dirs, vec![Vec2::new(0.0, -1.0)]);
    assert!((lines[0].length() - 10.0).abs() < 1e-12);
    assert_eq!(initial_flow(&lines), Vec2::new(0.0, -1.0));
}

#[test]
fn unconstrained_flow_points_up() {
    assert_eq!(initial_flow(&[]), Vec2::new(0.0, 1.0));
}

#[test]
fn bound_samples_sit_near_the_line() {
    let mut scene = Scene::new();
    let s = square(&mut scene);
    let c = scene
        .create_curve(&[Point::new(0.0, 5.0), Point::new(10.0, 5.0)], false, Some(s))
        .unwrap();
    scene
        .set_constraint(
            s,
            ConstraintTarget::Curve(c),
            ConstraintKind::Isoline,
            1,
            ConstraintWeight::Value(3.0),
        )
        .unwrap();
    let (outline, layer) = layer_of(&scene, s);
    let lines = constraint_lines(&scene, s, &outline, Affine::IDENTITY).unwrap();
    assert_eq!(lines[0].dirs, vec![Vec2::new(0.0, 1.0)]);
    let bound = bind_constraints(&layer, &lines);
    for (i, b) in bound.iter().enumerate() {
        let p = layer.samples[i].pos;
        let near = (p.y - 5.0).abs() <= 0.75 && (0.0..=10.0).contains(&p.x);
        assert_eq!(b.is_some(), near, "sample at {p:?}");
        if let Some((d, w)) = b {
            assert_eq!(*d, Vec2::new(0.0, 1.0));
            assert_eq!(*w, 3.0);
        }
    }
}

#[test]
fn opposed_directions_conflict() {
    let lines = [Vec2::new(1.0, 0.0), Vec2::new(-1.0, 0.0)].map(|d| ConstraintLine {
        target: ConstraintTarget::Segment(0),
        kind: ConstraintKind::Direction,
        points: vec![Point::ZERO, Point::new(4.0, 0.0)],
        dirs: vec![d],
        weight: ConstraintWeight::Auto,
    });
    let issues = direction_conflicts(NodeId(3), &lines);
    assert_eq!(issues.len(), 1);
    assert!(issues[0].message.contains("180"));
    assert_eq!(issues[0].sketch, Some(NodeId(3)));

    let aligned = [lines[0].clone(), lines[0].clone()];
    assert!(direction_conflicts(NodeId(3), &aligned).is_empty());
}

#[test]
fn time_seeding_and_relaxation_agree_with_uniform_flow() {
    let mut scene = Scene::new();
    let s = square(&mut scene);
    let (_, mut layer) = layer_of(&scene, s);
    layer.flow.fill(Vec2::new(1.0, 0.0));
    seed_time(&mut layer);
    assert!(relax_time(&mut layer) < 1e-9);
    for (t, sample) in layer.time.iter().zip(&layer.samples) {
        assert!((t - sample.pos.x).abs() < 1e-9);
    }
    derive(&mut layer);
    assert!(layer.interior().all(|i| layer.stress[i] < 1e-9 && layer.kappa[i] == 0.0));
    invert(&mut layer);
    assert!(layer.flow.iter().all(|f| *f == Vec2::new(-1.0, 0.0)));
}

#[test]
fn gradient_against_flow_warns() {
    let mut scene = Scene::new();
    let s = square(&mut scene);
    let (_, mut layer) = layer_of(&scene, s);
    for (t, sample) in layer.time.iter_mut().zip(&layer.samples) {
        *t = sample.pos.x;
    }
    let issue = gradient_deviation(s, &layer).unwrap();
    assert!(!issue.is_error());
    assert_eq!(issue.samples.len(), layer.interior_count());

    layer.flow.fill(Vec2::new(1.0, 0.0));
    assert!(gradient_deviation(s, &layer).is_none());
}

#[test]
fn finer_layer_inherits_coarse_fields() {
    let mut scene = Scene::new();
    let s = square(&mut scene);
    let outline = Outline::build(&scene, s, Affine::IDENTITY, 0.5).unwrap();
    let mut coarse = Layer::build(&scene, &outline, 0, 2.0);
    coarse.flow.fill(Vec2::new(0.0, 1.0));
    seed_time(&mut coarse);
    let mut fine = Layer::build(&scene, &outline, 1, 1.0);
    seed_from(&mut fine, &coarse);
    for (t, sample) in fine.time.iter().zip(&fine.samples) {
        assert!((t - sample.pos.y).abs() < 1e-9);
    }
}
