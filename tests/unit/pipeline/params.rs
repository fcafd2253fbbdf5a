use super::*;

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn defaults_resolve_to_five_stitches_per_mm() {
    let p = PipelineParams::default().resolve().unwrap();
    assert!(close(p.mm_per_px, 1.0));
    assert!(close(p.wale_dist, 0.2));
    assert!(close(p.course_dist, 0.2));
    assert!(close(p.eta, 1.0));
    assert_eq!(p.mesh_levels, 3);
    assert!(close(p.min_region_dt, 2.0));
    assert!(close(p.max_region_dt, 100.0));
    assert_eq!((p.gauge, p.subdiv, p.max_racking), (1, 1, 4));
    assert_eq!(p.carriers.devices().len(), 10);
}

#[test]
fn camel_case_json_overrides_defaults() {
    let p = PipelineParams::from_json(
        r#"{
            "sizing": {
                "sketch": { "scale": "2 mm / 1 px" },
                "default": { "wale": "4 stitches / 1 mm" }
            },
            "meshLevels": 2,
            "minResolution": "1 cm",
            "minRegionDT": "3 mm",
            "invertTime": true,
            "gauge": 2
        }"#,
    )
    .unwrap();
    assert_eq!(p.sizing.default.course, "5 stitches / 1 mm");
    let r = p.resolve().unwrap();
    assert!(close(r.mm_per_px, 2.0));
    assert!(close(r.wale_dist, 0.25));
    assert!(close(r.course_dist, 0.2));
    assert!(close(r.eta, 10.0));
    assert!(close(r.min_region_dt, 3.0));
    assert!(r.invert_time);
    assert_eq!(r.gauge, 2);
    assert_eq!(r.to_mm(), Affine::scale(2.0));
}

#[test]
fn level_spacing_grows_towards_coarse_levels() {
    let p = PipelineParams::default().resolve().unwrap();
    assert!(close(p.level_eta(0), 4.0));
    assert!(close(p.level_eta(1), 2.0));
    assert!(close(p.level_eta(2), 1.0));
}

#[test]
fn invalid_values_are_rejected() {
    assert!(PipelineParams::from_json(r#"{"meshlevels": 2}"#).is_err());

    let mut p = PipelineParams {
        gauge: 3,
        ..PipelineParams::default()
    };
    assert!(p.resolve().unwrap_err().to_string().contains("gauge"));

    p.gauge = 1;
    p.min_region_dt = "200 mm".to_string();
    assert!(p.resolve().is_err());

    p.min_region_dt = "2 mm".to_string();
    p.sizing.default.wale = "0 stitches / 1 mm".to_string();
    assert!(p.resolve().is_err());

    p.sizing.default.wale = "5 kg".to_string();
    assert!(p.resolve().is_err());
}

#[test]
fn carrier_mapping_is_resolved_strictly() {
    let p = PipelineParams::from_json(
        r##"{"carriers": {"default": "main", "main": {"type": "knit", "carriers": ["3"], "color": "#00ff00"}}}"##,
    )
    .unwrap();
    let r = p.resolve().unwrap();
    assert_eq!(r.carriers.default_device().unwrap().bitmask, 0b100);

    let bad = PipelineParams::from_json(
        r#"{"carriers": {"default": "main", "main": {"carriers": ["12"]}}}"#,
    )
    .unwrap();
    assert!(bad.resolve().is_err());
}

#[test]
fn region_bands_are_at_least_one_course_tall() {
    let mut p = PipelineParams {
        min_region_dt: "0 mm".to_string(),
        max_region_dt: "0.001 mm".to_string(),
        ..PipelineParams::default()
    };
    let err = p.resolve().unwrap_err().to_string();
    assert!(err.contains("maxRegionDT"), "{err}");

    p.max_region_dt = "0.5 mm".to_string();
    assert!(close(p.resolve().unwrap().max_region_dt, 0.5));
}
