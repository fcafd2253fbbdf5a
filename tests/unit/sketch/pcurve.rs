use super::*;

#[test]
fn slots_follow_degree() {
    let mut scene = Scene::new();
    let c = scene
        .create_curve(&[Point::new(0.0, 0.0), Point::new(10.0, 0.0)], false, None)
        .unwrap();
    let p = scene.create_pcurve(1, None).unwrap();
    let s = CurveSample {
        curve: c,
        seg: 0,
        t: 0.5,
    };
    assert!(scene.set_pcurve_sample(p, 1, Some(s)).is_err());
    scene.set_pcurve_sample(p, 0, Some(s)).unwrap();
    assert_eq!(scene.pcurve_points(p, 4).unwrap(), None);

    scene
        .set_pcurve_sample(p, 3, Some(CurveSample { t: 1.0, ..s }))
        .unwrap();
    let pts = scene.pcurve_points(p, 2).unwrap().unwrap();
    assert_eq!(pts.len(), 3);
    assert!((pts[1] - Point::new(7.5, 0.0)).hypot() < 1e-12);

    scene.set_pcurve_degree(p, 2).unwrap();
    scene.set_pcurve_sample(p, 1, Some(s)).unwrap();
    scene.set_pcurve_degree(p, 1).unwrap();
    assert!(scene.pcurve_points(p, 2).unwrap().is_some());
}

#[test]
fn samples_out_of_range_are_rejected() {
    let mut scene = Scene::new();
    let c = scene
        .create_curve(&[Point::new(0.0, 0.0), Point::new(10.0, 0.0)], false, None)
        .unwrap();
    let p = scene.create_pcurve(3, None).unwrap();
    let bad = CurveSample {
        curve: c,
        seg: 3,
        t: 0.5,
    };
    assert!(scene.set_pcurve_sample(p, 0, Some(bad)).is_err());
    assert!(scene.create_pcurve(4, None).is_err());
}

#[test]
fn deleting_sampled_curve_clears_samples() {
    let mut scene = Scene::new();
    let c = scene
        .create_curve(&[Point::new(0.0, 0.0), Point::new(10.0, 0.0)], false, None)
        .unwrap();
    let p = scene.create_pcurve(1, None).unwrap();
    let s = CurveSample {
        curve: c,
        seg: 0,
        t: 0.0,
    };
    scene.set_pcurve_sample(p, 0, Some(s)).unwrap();
    scene.delete_node(c).unwrap();
    match &scene.node(p).unwrap().kind {
        NodeKind::PCurve(data) => assert!(data.samples[0].is_none()),
        other => panic!("unexpected node {other:?}"),
    }
}
