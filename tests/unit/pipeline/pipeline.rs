use std::cell::RefCell;
use std::rc::Rc;

use super::*;
use crate::foundation::core::Point;

fn scene_with(pts: &[(f64, f64)]) -> (Scene, NodeId) {
    let mut scene = Scene::new();
    let pts: Vec<Point> = pts.iter().map(|&(x, y)| Point::new(x, y)).collect();
    let id = scene.create_sketch(&pts).unwrap();
    (scene, id)
}

fn small_rect() -> (Scene, NodeId) {
    scene_with(&[(0.0, 0.0), (4.0, 0.0), (4.0, 2.0), (0.0, 2.0)])
}

#[test]
fn blocking_run_fills_every_accessor() {
    let (scene, id) = small_rect();
    let mut pipeline = Pipeline::default();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&seen);
    pipeline.register_callback(move |u| log.borrow_mut().push((u.stage, u.progress)));

    pipeline.run_blocking(&scene).unwrap();
    assert_eq!(pipeline.status(), &RunStatus::Done);
    assert_eq!(pipeline.get_meshes().len(), 1);
    assert_eq!(pipeline.get_samplers().len(), 1);
    let sampler = pipeline.get_sampler(id).unwrap();
    assert_eq!(sampler.len(), 200);
    assert!(pipeline.get_sampler(NodeId(999)).is_none());
    assert_eq!(pipeline.get_trace_index(sampler), Some(0));
    assert_eq!(pipeline.get_trace(sampler).unwrap().len(), 220);
    assert_eq!(pipeline.get_traces().len(), 1);
    assert_eq!(pipeline.get_node_index(0).unwrap()[0], (0, 20));
    assert!(pipeline.get_node_index(1).is_none());
    assert_eq!(pipeline.get_knitouts().len(), 1);

    let seen = seen.borrow();
    assert_eq!(seen.iter().filter(|(_, p)| *p == 1.0).count(), 4);
}

#[test]
fn background_run_matches_blocking_run() {
    let (scene, _) = small_rect();
    let mut blocking = Pipeline::default();
    blocking.run_blocking(&scene).unwrap();

    let mut pipeline = Pipeline::default();
    let run = pipeline.update_meshes(&scene).unwrap();
    assert_eq!(pipeline.status(), &RunStatus::Running(run));
    pipeline.wait().unwrap();
    assert_eq!(pipeline.status(), &RunStatus::Done);
    assert_eq!(
        pipeline.get_knitouts()[0].to_text(),
        blocking.get_knitouts()[0].to_text()
    );
    assert_eq!(pipeline.get_node_index(0), blocking.get_node_index(0));
}

#[test]
fn seam_update_keeps_samplers_and_retraces() {
    let (scene, _) = small_rect();
    let mut pipeline = Pipeline::default();
    pipeline.update_meshes(&scene).unwrap();
    pipeline.wait().unwrap();
    let stitches = pipeline.get_samplers()[0].len();

    let stages = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&stages);
    pipeline.register_callback(move |u| log.borrow_mut().push(u.stage));
    pipeline.update_seams(&scene).unwrap();
    assert!(pipeline.get_traces().is_empty());
    assert_eq!(pipeline.get_samplers()[0].len(), stitches);
    pipeline.wait().unwrap();
    assert!(stages.borrow().iter().all(|&s| s >= crate::worker::TRACING));
    assert_eq!(pipeline.get_traces().len(), 1);
    assert_eq!(pipeline.get_knitouts().len(), 1);
}

#[test]
fn clear_drops_artifacts() {
    let (scene, _) = small_rect();
    let mut pipeline = Pipeline::default();
    pipeline.run_blocking(&scene).unwrap();
    pipeline.clear().unwrap();
    assert_eq!(pipeline.status(), &RunStatus::Idle);
    assert!(pipeline.get_samplers().is_empty());
    assert!(pipeline.get_traces().is_empty());
    assert!(pipeline.get_node_index(0).is_none());
    assert_eq!(pipeline.poll().unwrap(), 0);
}

#[test]
fn failed_stage_is_reported() {
    // Each side moves in by five wales per course.
    let (scene, _) = scene_with(&[(0.0, 0.0), (60.0, 0.0), (35.0, 5.0), (25.0, 5.0)]);
    let mut pipeline = Pipeline::default();
    let err = pipeline.run_blocking(&scene).unwrap_err();
    assert!(err.to_string().contains("stage 2"), "{err}");
    assert!(matches!(
        pipeline.status(),
        RunStatus::Failed { stage: 2, error } if error.contains("racking limit")
    ));
}

#[test]
fn invalid_params_fail_before_starting() {
    let (scene, _) = small_rect();
    let mut pipeline = Pipeline::new(PipelineParams {
        gauge: 5,
        ..PipelineParams::default()
    });
    assert!(pipeline.update_meshes(&scene).is_err());
    assert_eq!(pipeline.status(), &RunStatus::Idle);
}
