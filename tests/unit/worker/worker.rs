use super::*;
use crate::foundation::core::Point;
use crate::pipeline::PipelineParams;

fn rect_request(w: f64, h: f64) -> StartRequest {
    let mut scene = Scene::new();
    scene
        .create_sketch(&[
            Point::new(0.0, 0.0),
            Point::new(w, 0.0),
            Point::new(w, h),
            Point::new(0.0, h),
        ])
        .unwrap();
    StartRequest {
        scene,
        params: PipelineParams::default().resolve().unwrap(),
        meshes: Vec::new(),
        samplers: Vec::new(),
        seam_edit: false,
        assets_root: None,
    }
}

fn next_update(worker: &Worker) -> Box<Update> {
    match worker.recv_timeout(Duration::from_secs(60)).unwrap() {
        Some(WorkerMessage::Update(u)) => u,
        other => panic!("expected an update, got {other:?}"),
    }
}

#[test]
fn run_ends_with_a_done_update() {
    let mut worker = Worker::spawn().unwrap();
    let run = worker.start(rect_request(4.0, 2.0)).unwrap();
    loop {
        let u = next_update(&worker);
        assert_eq!(u.run, run);
        assert!(u.error.is_none());
        if u.done {
            assert_eq!(u.stage, COMPILE);
            assert_eq!(u.progress, 1.0);
            let knitouts = u.snapshot.and_then(|s| s.knitouts).unwrap();
            assert!(knitouts[0].to_text().starts_with(";!knitout-2"));
            break;
        }
    }
    assert!(
        worker
            .recv_timeout(Duration::from_millis(100))
            .unwrap()
            .is_none()
    );
}

#[test]
fn cancel_is_acknowledged_and_silences_the_run() {
    let mut worker = Worker::spawn().unwrap();
    worker.start(rect_request(60.0, 30.0)).unwrap();
    let first = next_update(&worker);
    assert_eq!(first.stage, FLOW);
    worker.cancel().unwrap();
    // Updates already sent before the cancel arrived may still be queued.
    loop {
        match worker.recv_timeout(Duration::from_secs(60)).unwrap() {
            Some(WorkerMessage::Cancelled) => break,
            Some(WorkerMessage::Update(_)) => {}
            None => panic!("no acknowledgment"),
        }
    }
    assert!(
        worker
            .recv_timeout(Duration::from_millis(300))
            .unwrap()
            .is_none()
    );
}

#[test]
fn cancel_while_idle_is_still_acknowledged() {
    let worker = Worker::spawn().unwrap();
    worker.cancel().unwrap();
    assert!(matches!(
        worker.recv_timeout(Duration::from_secs(5)).unwrap(),
        Some(WorkerMessage::Cancelled)
    ));
}

#[test]
fn start_replaces_the_running_job() {
    let mut worker = Worker::spawn().unwrap();
    let first = worker.start(rect_request(60.0, 30.0)).unwrap();
    let second = worker.start(rect_request(4.0, 2.0)).unwrap();
    assert!(second > first);
    loop {
        let u = next_update(&worker);
        if u.done {
            assert_eq!(u.run, second);
            break;
        }
    }
}
