use super::*;
use crate::foundation::core::{Affine, Point};
use crate::mesh::SampleKind;
use crate::sketch::{Outline, Scene};

fn layer(w: f64, h: f64) -> Layer {
    let mut scene = Scene::new();
    let s = scene
        .create_sketch(&[
            Point::new(0.0, 0.0),
            Point::new(w, 0.0),
            Point::new(w, h),
            Point::new(0.0, h),
        ])
        .unwrap();
    let outline = Outline::build(&scene, s, Affine::IDENTITY, 0.5).unwrap();
    Layer::build(&scene, &outline, 0, 1.0)
}

fn at(layer: &Layer, x: f64, y: f64) -> usize {
    layer.nearest(Point::new(x, y)).unwrap()
}

#[test]
fn grid_distances_are_manhattan() {
    let l = layer(6.0, 4.0);
    let src = at(&l, 0.0, 0.0);
    let d = distances(&l, &[src]);
    assert_eq!(d[src], 0.0);
    assert!((d[at(&l, 3.0, 2.0)] - 5.0).abs() < 1e-9);
    assert!((d[at(&l, 5.0, 3.0)] - 8.0).abs() < 1e-9);
}

#[test]
fn restricted_walk_goes_around() {
    let l = layer(6.0, 4.0);
    // Wall at x = 2 except the top row.
    let wall = |i: usize| {
        let p = l.samples[i].pos;
        !((p.x - 2.0).abs() < 1e-9 && p.y < 3.0)
    };
    let src = at(&l, 0.0, 0.0);
    let d = distances_within(&l, &[src], wall);
    assert!((d[at(&l, 4.0, 0.0)] - 10.0).abs() < 1e-9);
    assert!(d[at(&l, 2.0, 0.0)].is_infinite());
}

#[test]
fn distance_to_border_grows_inward() {
    let l = layer(6.0, 6.0);
    let d = distance_to_kind(&l, SampleKind::Border);
    let corner = at(&l, 0.0, 0.0);
    let center = at(&l, 3.0, 3.0);
    assert!(d[center] > d[corner]);
    assert!(l.samples.iter().zip(&d).all(|(s, d)| s.kind != SampleKind::Border || *d == 0.0));
}

#[test]
fn disallowed_sources_are_ignored() {
    let l = layer(4.0, 4.0);
    let d = distances_within(&l, &[0], |_| false);
    assert!(d.iter().all(|v| v.is_infinite()));
}
