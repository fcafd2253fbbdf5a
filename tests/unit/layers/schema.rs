use super::*;
use crate::foundation::core::Point;
use crate::layers::LayerDesc;
use crate::sketch::ImageData;
use serde_json::json;

fn scene_with_image() -> (Scene, NodeId, NodeId) {
    let mut scene = Scene::new();
    let sketch = scene
        .create_sketch(&[
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
        ])
        .unwrap();
    let image = scene
        .create_image(
            ImageData {
                src: "motif.png".to_string(),
                width: 10.0,
                height: 10.0,
            },
            Some(sketch),
        )
        .unwrap();
    (scene, sketch, image)
}

#[test]
fn program_layer_requires_program() {
    let (scene, _, _) = scene_with_image();
    let desc = LayerDesc::new(LayerKind::Program);
    let err = validate_layer(&desc, 2, &scene, &CarrierConfig::default()).unwrap_err();
    assert_eq!(err.path, "$.layers[2].params.program");
    assert!(err.message.contains("missing"));
}

#[test]
fn unknown_parameter_is_rejected() {
    let (scene, _, _) = scene_with_image();
    let desc = LayerDesc::new(LayerKind::Program)
        .with("program", json!("knit"))
        .with("colour", json!(1));
    let err = validate_layer(&desc, 0, &scene, &CarrierConfig::default()).unwrap_err();
    assert_eq!(err.path, "$.layers[0].params.colour");
}

#[test]
fn image_parameter_must_reference_an_image_node() {
    let (scene, sketch, image) = scene_with_image();
    let carriers = CarrierConfig::default();
    let ok = LayerDesc::new(LayerKind::Image).with("image", json!(image.0));
    assert!(validate_layer(&ok, 0, &scene, &carriers).is_ok());

    let wrong = LayerDesc::new(LayerKind::Image).with("image", json!(sketch.0));
    let err = validate_layer(&wrong, 0, &scene, &carriers).unwrap_err();
    assert!(err.message.contains("not an image"), "{err}");

    let missing = LayerDesc::new(LayerKind::Image).with("image", json!(999));
    assert!(validate_layer(&missing, 0, &scene, &carriers).is_err());
}

#[test]
fn enum_and_mapping_values_are_checked() {
    let (scene, _, _) = scene_with_image();
    let carriers = CarrierConfig::default();
    let bad_mode = LayerDesc::new(LayerKind::Pattern)
        .with("pattern", json!("ab"))
        .with("mode", json!("stretch"));
    assert_eq!(
        validate_layer(&bad_mode, 1, &scene, &carriers)
            .unwrap_err()
            .path,
        "$.layers[1].params.mode"
    );

    let bad_mapping = LayerDesc::new(LayerKind::Pattern)
        .with("pattern", json!("ab"))
        .with("mapping", json!({"ab": 1}));
    assert!(validate_layer(&bad_mapping, 0, &scene, &carriers).is_err());

    let good = LayerDesc::new(LayerKind::Pattern)
        .with("pattern", json!("ab\nba"))
        .with("mapping", json!({"a": 0, "b": 1}))
        .with("mode", json!("tile"));
    assert!(validate_layer(&good, 0, &scene, &carriers).is_ok());
}

#[test]
fn yarn_layer_needs_a_carrier_selection() {
    let (scene, _, _) = scene_with_image();
    let carriers = CarrierConfig::default();
    let none = LayerDesc::new(LayerKind::Yarn);
    assert_eq!(
        validate_layer(&none, 3, &scene, &carriers).unwrap_err().path,
        "$.layers[3].params"
    );
    let named = LayerDesc::new(LayerKind::Yarn).with("yarn", json!("3"));
    assert!(validate_layer(&named, 0, &scene, &carriers).is_ok());
    let unknown = LayerDesc::new(LayerKind::Yarn).with("yarn", json!("nylon"));
    assert!(validate_layer(&unknown, 0, &scene, &carriers).is_err());
}

#[test]
fn yarn_masks_accept_bits_or_names() {
    let carriers = CarrierConfig::default();
    assert_eq!(yarn_mask(&json!(5), &carriers), Ok(5));
    assert_eq!(yarn_mask(&json!(["1", "3"]), &carriers), Ok(0b101));
    assert!(yarn_mask(&json!(0), &carriers).is_err());
    assert!(yarn_mask(&json!(1 << 10), &carriers).is_err());
    assert!(yarn_mask(&json!(["12"]), &carriers).is_err());
}

#[test]
fn param_error_converts_into_validation_error() {
    let e: KnitError = ParamError {
        path: "$.layers[0].params.area".to_string(),
        message: "unknown node #9".to_string(),
    }
    .into();
    assert!(matches!(e, KnitError::Validation(_)));
    assert!(e.to_string().contains("$.layers[0].params.area"));
}
