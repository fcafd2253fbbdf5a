use super::*;
use crate::mesh::FlowGroup;
use crate::pipeline::{PipelineParams, ResolvedParams};
use crate::sketch::Transmission;

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

fn solved(scene: &Scene, sketches: Vec<NodeId>) -> FlowGroup {
    let p = params();
    let mut g = FlowGroup::new(scene, sketches, &p).unwrap();
    g.solve(scene, &p).unwrap();
    g
}

#[test]
fn rectangle_isoline_is_clipped_to_the_outline() {
    let mut scene = Scene::new();
    let s = rect_at(&mut scene, 0.0, 20.0, 10.0);
    let g = solved(&scene, vec![s]);
    let chains = extract(&scene, &g.meshes, 5.5);
    assert_eq!(chains.len(), 1);
    let c = &chains[0];
    assert!(!c.closed);
    assert!(c.junctions.is_empty());
    assert!((c.length() - 20.0).abs() < 1e-6);
    let first = c.points.first().unwrap();
    let last = c.points.last().unwrap();
    assert!((first.pos - Point::new(0.0, 5.5)).hypot() < 1e-6);
    assert!((last.pos - Point::new(20.0, 5.5)).hypot() < 1e-6);
    assert!(c.points.iter().all(|p| p.sketch == s && p.layer == 2 && !p.start));
    let (sk, mid) = c.midpoint().unwrap();
    assert_eq!(sk, s);
    assert!((mid - Point::new(10.0, 5.5)).hypot() < 1e-6);
}

#[test]
fn level_outside_the_field_has_no_isoline() {
    let mut scene = Scene::new();
    let s = rect_at(&mut scene, 0.0, 20.0, 10.0);
    let g = solved(&scene, vec![s]);
    assert!(extract(&scene, &g.meshes, -50.0).is_empty());
    assert!(extract(&scene, &g.meshes, 50.0).is_empty());
}

#[test]
fn one_link_continues_the_chain() {
    let mut scene = Scene::new();
    let a = rect_at(&mut scene, 0.0, 50.0, 20.0);
    let b = rect_at(&mut scene, 60.0, 50.0, 20.0);
    scene
        .set_link(SegmentRef::new(a, 1), SegmentRef::new(b, 3), Transmission::Parent)
        .unwrap();
    let g = solved(&scene, vec![a, b]);
    let chains = extract(&scene, &g.meshes, 10.5);
    assert_eq!(chains.len(), 1);
    let c = &chains[0];
    assert!(!c.closed);
    assert!((c.length() - 100.0).abs() < 1e-6);
    assert_eq!(c.junctions.len(), 1);
    let j = c.junctions[0];
    assert_eq!(j.from, SegmentRef::new(a, 1));
    assert_eq!(j.to, SegmentRef::new(b, 3));
    assert!(c.points[j.point].start);
    assert_eq!(c.points[j.point].sketch, b);
    assert_eq!(c.points[j.point - 1].sketch, a);
    let (sk, p) = c.point_at(75.0).unwrap();
    assert_eq!(sk, b);
    assert!((p - Point::new(85.0, 10.5)).hypot() < 1e-6);
}

#[test]
fn tube_isoline_closes_on_itself() {
    let mut scene = Scene::new();
    let a = rect_at(&mut scene, 0.0, 50.0, 100.0);
    let b = rect_at(&mut scene, 60.0, 50.0, 100.0);
    scene
        .set_link(SegmentRef::new(a, 1), SegmentRef::new(b, 3), Transmission::Parent)
        .unwrap();
    scene
        .set_link(SegmentRef::new(a, 3), SegmentRef::new(b, 1), Transmission::Parent)
        .unwrap();
    let g = solved(&scene, vec![a, b]);
    let chains = extract(&scene, &g.meshes, 50.5);
    assert_eq!(chains.len(), 1);
    let c = &chains[0];
    assert!(c.closed);
    assert_eq!(c.junctions.len(), 2);
    assert!((c.length() - 100.0).abs() < 1e-6);
    // Starts in the lowest sketch, entered across the wrap-around link.
    assert_eq!(c.points[0].sketch, a);
    assert!(c.points[0].start);
    assert_eq!(c.junctions[0].point, 0);
    assert_eq!(c.junctions[0].to, SegmentRef::new(a, 3));
    let (sk, _) = c.point_at(99.0).unwrap();
    assert_eq!(sk, b);
}
