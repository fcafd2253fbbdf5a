use super::*;
use crate::knitout::Opcode;

fn run(bed: &mut BedState, moves: &[Move]) -> (InstructionStore, TransferReport) {
    let mut store = InstructionStore::new(&["1"]);
    let mut racking = 0;
    let report = Transfers {
        store: &mut store,
        bed,
        racking: &mut racking,
        meta: 7,
    }
    .run(moves);
    assert_eq!(racking, 0);
    (store, report)
}

#[test]
fn racking_aligns_opposite_needles() {
    assert_eq!(racking_for(Needle::front(5), Needle::back(3)), 2);
    assert_eq!(racking_for(Needle::back(3), Needle::front(5)), 2);
    assert_eq!(racking_for(Needle::front(4), Needle::back(4)), 0);
}

#[test]
fn same_bed_shift_parks_on_the_other_bed() {
    let mut bed = BedState::new();
    bed.stack(Needle::front(3)).set_front_yarns(1);
    let (store, report) = run(
        &mut bed,
        &[Move {
            from: Needle::front(3),
            to: Needle::front(4),
        }],
    );
    assert_eq!(report, TransferReport { xfers: 2, racks: 2, collisions: 0 });
    let ops: Vec<Opcode> = (0..store.len()).map(|r| store.opcode(r)).collect();
    assert_eq!(ops, vec![Opcode::Xfer, Opcode::Rack, Opcode::Xfer, Opcode::Rack]);
    assert_eq!(store.needle_arg(0, 1), Needle::back(3));
    assert_eq!(store.float_arg(1, 0), 1.0);
    assert_eq!(store.meta(0), Some(7));
    assert!(bed.get(Needle::front(3)).is_empty());
    assert_eq!(bed.get(Needle::front(4)).front, 1);
}

#[test]
fn moves_are_batched_by_racking() {
    let mut bed = BedState::new();
    let moves = [
        Move { from: Needle::front(0), to: Needle::front(1) },
        Move { from: Needle::front(5), to: Needle::front(6) },
        Move { from: Needle::front(9), to: Needle::front(8) },
        Move { from: Needle::front(2), to: Needle::front(2) },
    ];
    let (store, report) = run(&mut bed, &moves);
    assert_eq!(report.xfers, 6);
    assert_eq!(report.racks, 3);
    let racks: Vec<f32> = (0..store.len())
        .filter(|&r| store.opcode(r) == Opcode::Rack)
        .map(|r| store.float_arg(r, 0))
        .collect();
    assert_eq!(racks, vec![-1.0, 1.0, 0.0]);
}

#[test]
fn parking_on_a_held_needle_is_a_collision() {
    let mut bed = BedState::new();
    bed.stack(Needle::front(1)).set_front_yarns(1);
    bed.stack(Needle::back(1)).set_front_yarns(2);
    let (_, report) = run(
        &mut bed,
        &[Move {
            from: Needle::front(1),
            to: Needle::front(0),
        }],
    );
    assert_eq!(report.collisions, 1);
    // Both loops travel on together.
    assert_eq!(bed.get(Needle::front(0)).front, 3);
}

#[test]
fn cross_bed_moves_need_no_parking() {
    let mut bed = BedState::new();
    let (store, report) = run(
        &mut bed,
        &[Move {
            from: Needle::front(2),
            to: Needle::back(2),
        }],
    );
    assert_eq!(report, TransferReport { xfers: 1, racks: 0, collisions: 0 });
    assert_eq!(store.len(), 1);
}
