//! Loop transfers batched by racking.

use std::collections::BTreeMap;

use crate::knitout::{InstructionStore, Needle};
use crate::yarn::BedState;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Move {
    pub from: Needle,
    pub to: Needle,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransferReport {
    pub xfers: usize,
    pub racks: usize,
    /// Loops parked on a needle that already held one.
    pub collisions: usize,
}

/// Racking aligning `from` with `to` on the opposite bed: front needle `n` faces back needle
/// `n - r`.
pub fn racking_for(from: Needle, to: Needle) -> i32 {
    if from.side.is_front() {
        from.offset - to.offset
    } else {
        to.offset - from.offset
    }
}

/// Bed-state tracker that writes every transfer, grouped by racking, to a store.
pub struct Transfers<'a> {
    pub store: &'a mut InstructionStore,
    pub bed: &'a mut BedState,
    pub racking: &'a mut i32,
    pub meta: u32,
}

impl Transfers<'_> {
    fn rack(&mut self, r: i32, report: &mut TransferReport) {
        if *self.racking != r {
            self.store.rack(r as f32);
            *self.racking = r;
            report.racks += 1;
        }
    }

    fn xfer(&mut self, from: Needle, to: Needle, report: &mut TransferReport) {
        let row = self.store.xfer(from, to);
        if self.meta != 0 {
            self.store.set_meta(row, self.meta);
        }
        self.bed.transfer(from, to);
        report.xfers += 1;
    }

    /// Move every loop of `moves`. Same-bed moves park on the opposite bed first; the rest go
    /// across one racking at a time, ending at racking zero.
    pub fn run(&mut self, moves: &[Move]) -> TransferReport {
        let mut report = TransferReport::default();
        let moves: Vec<Move> = moves.iter().copied().filter(|m| m.from != m.to).collect();
        if moves.is_empty() {
            return report;
        }
        let mut across: BTreeMap<i32, Vec<Move>> = BTreeMap::new();
        let mut parked = Vec::new();
        for m in &moves {
            if m.from.side == m.to.side {
                let hold = Needle::new(m.from.side.opposite(), m.from.offset);
                parked.push((m.from, hold));
                across
                    .entry(racking_for(hold, m.to))
                    .or_default()
                    .push(Move { from: hold, to: m.to });
            } else {
                across.entry(racking_for(m.from, m.to)).or_default().push(*m);
            }
        }
        if !parked.is_empty() {
            self.rack(0, &mut report);
            for (from, hold) in parked {
                if !self.bed.get(hold).is_empty() {
                    report.collisions += 1;
                }
                self.xfer(from, hold, &mut report);
            }
        }
        for (r, batch) in across {
            self.rack(r, &mut report);
            for m in batch {
                self.xfer(m.from, m.to, &mut report);
            }
        }
        self.rack(0, &mut report);
        report
    }
}

#[cfg(test)]
#[path = "../../tests/unit/compile/transfer.rs"]
mod tests;
