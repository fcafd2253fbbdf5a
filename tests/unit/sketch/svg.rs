use super::*;

const SVG: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" width="200" height="200">
  <path d="M 0 0 L 100 0 L 100 50 L 0 50 Z"/>
  <g transform="translate(10 20)">
    <path d="M 0 0 Q 5 5 10 0" fill="none" stroke="black"/>
  </g>
</svg>"#;

#[test]
fn closed_paths_become_sketches_and_open_paths_curves() {
    let mut scene = Scene::new();
    let ids = import_svg(&mut scene, SVG.as_bytes()).unwrap();
    assert_eq!(ids.len(), 2);

    let sketch = scene.node(ids[0]).unwrap();
    let contour = sketch.contour().unwrap();
    assert!(sketch.is_sketch());
    assert_eq!(contour.vertices.len(), 4);
    assert!((contour.vertices[2] - Point::new(100.0, -50.0)).hypot() < 1e-4);

    let curve = scene.node(ids[1]).unwrap();
    let contour = curve.contour().unwrap();
    assert!(!contour.closed);
    assert!(contour.segments[0].degree() >= 2);
    assert!((contour.vertices[0] - Point::new(10.0, -20.0)).hypot() < 1e-4);
    scene.validate().unwrap();
}

#[test]
fn invalid_svg_is_an_error() {
    let mut scene = Scene::new();
    assert!(import_svg(&mut scene, b"not svg").is_err());
}
