use serde_json::json;

use super::*;
use crate::foundation::core::{NodeId, Point};
use crate::knitout::{Side, parse_text};
use crate::layers::{ImageCache, LayerDesc, LayerKind};
use crate::mesh::FlowGroup;
use crate::pipeline::PipelineParams;
use crate::sketch::{Scene, SegmentRef, Transmission};

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

fn build(scene: &Scene, sketches: Vec<NodeId>, p: &ResolvedParams) -> (Sampler, Trace, Compilation) {
    let mut group = FlowGroup::new(scene, sketches, p).unwrap();
    group.solve(scene, p).unwrap();
    let mut sampler = Sampler::new(&group, p);
    sampler.sample(scene, &group, p, &ImageCache::new()).unwrap();
    let trace = Trace::trace(scene, &sampler, p).unwrap();
    let out = compile(&trace, &sampler, p).unwrap();
    (sampler, trace, out)
}

fn small_rect() -> (Scene, NodeId) {
    let mut scene = Scene::new();
    let s = rect_at(&mut scene, 0.0, 4.0, 2.0);
    (scene, s)
}

#[test]
fn rectangle_compiles_to_a_complete_program() {
    let (scene, s) = small_rect();
    let p = params();
    let (_, trace, out) = build(&scene, vec![s], &p);
    let store = &out.store;
    assert_eq!(store.header("Carriers"), Some("1 2 3 4 5 6 7 8 9 10"));
    assert_eq!(store.header("Gauge"), Some("15"));
    assert_eq!(store.opcode(0), Opcode::XStitchNumber);
    assert_eq!(store.opcode(1), Opcode::Inhook);

    assert_eq!(store.count(Opcode::Tuck), 20);
    assert_eq!(store.count(Opcode::Knit), 200 + 20);
    assert_eq!(store.count(Opcode::Inhook), 1);
    assert_eq!(store.count(Opcode::Releasehook), 1);
    assert_eq!(store.count(Opcode::Outhook), 1);
    // The bind-off chain hands every loop but the last one along.
    assert_eq!(out.stats.xfers, 2 * 19);
    assert_eq!(store.count(Opcode::Drop), 1);
    assert_eq!(out.stats.ops.get("knit"), Some(&220));
    assert_eq!(out.stats.instructions, store.len());
    assert_eq!(out.stats.collisions, 0);
    assert!(out.issues.is_empty());

    // Releasing the hook follows the cast-on pass.
    let release = (0..store.len())
        .find(|&r| store.opcode(r) == Opcode::Releasehook)
        .unwrap();
    assert_eq!(store.opcode(release - 1), Opcode::Tuck);
    assert_eq!(store.meta(2), Some(1));
    assert_eq!(store.comment(2), Some("cast-on course 0"));

    // Every stitch instruction points back at a trace entry of the same stitch needle.
    for row in 0..store.len() {
        if !matches!(store.opcode(row), Opcode::Knit | Opcode::Tuck) {
            continue;
        }
        let meta = store.meta(row).unwrap() as usize;
        let entry = &trace.entries[meta - 1];
        assert_eq!(store.direction(row), entry.dir);
    }
}

#[test]
fn text_form_round_trips() {
    let (scene, s) = small_rect();
    let p = params();
    let (_, _, out) = build(&scene, vec![s], &p);
    let text = out.to_text();
    assert!(text.starts_with(";!knitout-2\n;;Carriers: 1 2 3 4 5 6 7 8 9 10\n"));
    let back = parse_text(&text, TextOptions::default()).unwrap();
    assert_eq!(back.len(), out.store.len());
    for r in 0..back.len() {
        assert_eq!(back.instruction(r), out.store.instruction(r), "row {r}");
    }
    assert_eq!(write_text(&back, TextOptions::default()), text);
}

#[test]
fn purls_are_knit_on_the_back_bed() {
    let (mut scene, s) = small_rect();
    scene
        .add_layer(s, LayerDesc::new(LayerKind::Program).with("program", json!("purl")))
        .unwrap();
    let p = params();
    let (_, _, out) = build(&scene, vec![s], &p);
    let store = &out.store;
    let back_knits = (0..store.len())
        .filter(|&r| store.opcode(r) == Opcode::Knit && store.needle_arg(r, 0).side == Side::Back)
        .count();
    assert_eq!(back_knits, 220);
    // Cast-on loops cross once, the chain shifts the rest.
    assert_eq!(out.stats.xfers, 20 + 19);
}

#[test]
fn tube_knits_both_beds_without_collisions() {
    let mut scene = Scene::new();
    let a = rect_at(&mut scene, 0.0, 20.0, 4.0);
    let b = rect_at(&mut scene, 30.0, 20.0, 4.0);
    scene
        .set_link(SegmentRef::new(a, 1), SegmentRef::new(b, 3), Transmission::Parent)
        .unwrap();
    scene
        .set_link(SegmentRef::new(a, 3), SegmentRef::new(b, 1), Transmission::Parent)
        .unwrap();
    let p = params();
    let (sampler, _, out) = build(&scene, vec![a, b], &p);
    let store = &out.store;
    assert!(store.count(Opcode::Knit) >= sampler.len());
    let sides: Vec<Side> = (0..store.len())
        .filter(|&r| store.opcode(r) == Opcode::Knit)
        .map(|r| store.needle_arg(r, 0).side)
        .collect();
    assert!(sides.contains(&Side::Front) && sides.contains(&Side::Back));
}

#[test]
fn parts_join_under_one_header() {
    let (scene, s) = small_rect();
    let p = params();
    let (_, _, one) = build(&scene, vec![s], &p);
    let joint = join_parts(&[one.clone(), one.clone()]).unwrap();
    assert_eq!(joint.count(Opcode::Knit), 2 * one.store.count(Opcode::Knit));
    assert_eq!(joint.comment(0), Some(" Part 1"));
    assert_eq!(joint.header("Gauge"), Some("15"));
    assert!(join_parts(&[]).is_err());
}

#[test]
fn empty_trace_compiles_to_headers_only() {
    let p = params();
    let mut scene = Scene::new();
    let s = scene
        .create_sketch(&[
            Point::new(0.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(10.0, 0.0),
            Point::new(0.0, 10.0),
        ])
        .unwrap();
    let (_, trace, out) = build(&scene, vec![s], &p);
    assert!(trace.is_empty());
    assert_eq!(out.store.len(), 1);
    assert_eq!(out.store.opcode(0), Opcode::XStitchNumber);
}

#[test]
fn progress_grows_until_done() {
    let mut scene = Scene::new();
    let s = rect_at(&mut scene, 0.0, 4.0, 10.0);
    let p = params();
    let mut group = FlowGroup::new(&scene, vec![s], &p).unwrap();
    group.solve(&scene, &p).unwrap();
    let mut sampler = Sampler::new(&group, &p);
    sampler.sample(&scene, &group, &p, &ImageCache::new()).unwrap();
    let trace = Trace::trace(&scene, &sampler, &p).unwrap();
    let mut compiler = Compiler::new(&trace, &sampler, &p).unwrap();
    let mut last = compiler.progress(&trace);
    while !compiler.step(&trace, &sampler, &p).unwrap() {
        assert!(compiler.progress(&trace) > last);
        last = compiler.progress(&trace);
    }
    assert_eq!(compiler.progress(&trace), 1.0);
    assert!(compiler.is_done());
}
