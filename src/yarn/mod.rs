//! Per-needle yarn occupancy.
//!
//! A needle records which carriers hold loops on it. Front presence is one bit per carrier
//! (10 bits); back state is two bits per carrier (20 bits) encoding [`BackYarn`].

use std::collections::BTreeMap;

use crate::knitout::Needle;

pub const FRONT_BITS: u32 = 10;
const FRONT_MASK: u32 = (1 << FRONT_BITS) - 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum BackYarn {
    None = 0,
    Miss = 1,
    Tuck = 2,
    Knit = 3,
}

impl BackYarn {
    fn from_bits(b: u32) -> Self {
        match b & 3 {
            1 => Self::Miss,
            2 => Self::Tuck,
            3 => Self::Knit,
            _ => Self::None,
        }
    }
}

/// Raw occupancy bits of one needle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct YarnBits {
    pub front: u32,
    pub back: u32,
}

impl YarnBits {
    pub fn is_empty(self) -> bool {
        self.front == 0 && self.back == 0
    }
}

type Commit<'a> = Box<dyn FnMut(YarnBits) + 'a>;

/// Mutable view over one needle's yarn bits with an optional commit hook.
pub struct YarnStack<'a> {
    bits: YarnBits,
    commit: Option<Commit<'a>>,
}

impl std::fmt::Debug for YarnStack<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YarnStack")
            .field("front", &format_args!("{:#012b}", self.bits.front))
            .field("back", &format_args!("{:#022b}", self.bits.back))
            .finish()
    }
}

impl Default for YarnStack<'_> {
    fn default() -> Self {
        Self::new(YarnBits::default())
    }
}

impl<'a> YarnStack<'a> {
    pub fn new(bits: YarnBits) -> Self {
        Self { bits, commit: None }
    }

    /// Stack whose every mutation is forwarded to `commit`.
    pub fn with_commit(bits: YarnBits, commit: impl FnMut(YarnBits) + 'a) -> Self {
        Self {
            bits,
            commit: Some(Box::new(commit)),
        }
    }

    pub fn bits(&self) -> YarnBits {
        self.bits
    }

    pub fn front_yarns(&self) -> u32 {
        self.bits.front
    }

    /// Carriers with any non-`None` back state.
    pub fn back_yarns(&self) -> u32 {
        (0..FRONT_BITS)
            .filter(|&c| self.back_state(c) != BackYarn::None)
            .fold(0, |m, c| m | (1 << c))
    }

    /// Logical yarn set: every carrier present on either side.
    pub fn yarns(&self) -> u32 {
        self.bits.front | self.back_yarns()
    }

    pub fn back_state(&self, carrier: u32) -> BackYarn {
        BackYarn::from_bits(self.bits.back >> (2 * carrier))
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    fn put_back(&mut self, carrier: u32, state: BackYarn) {
        let shift = 2 * carrier;
        self.bits.back = (self.bits.back & !(3 << shift)) | ((state as u32) << shift);
    }

    fn fire(&mut self) {
        let bits = self.bits;
        if let Some(commit) = self.commit.as_mut() {
            commit(bits);
        }
    }

    /// Replace the front set. Carriers leaving the front fall back to `Miss`.
    pub fn set_front_yarns(&mut self, mask: u32) {
        self.set_front_yarns_with(mask, BackYarn::Miss);
    }

    /// Replace the front set; carriers leaving the front take `leaving` on the back.
    pub fn set_front_yarns_with(&mut self, mask: u32, leaving: BackYarn) {
        let mask = mask & FRONT_MASK;
        let gone = self.bits.front & !mask;
        for c in 0..FRONT_BITS {
            if mask & (1 << c) != 0 {
                self.put_back(c, BackYarn::None);
            } else if gone & (1 << c) != 0 {
                self.put_back(c, leaving);
            }
        }
        self.bits.front = mask;
        self.fire();
    }

    /// Move `mask` carriers to the back with the given state.
    pub fn set_back_yarns(&mut self, mask: u32, state: BackYarn) {
        let mask = mask & FRONT_MASK;
        for c in 0..FRONT_BITS {
            if mask & (1 << c) != 0 {
                self.put_back(c, state);
            }
        }
        self.bits.front &= !mask;
        self.fire();
    }

    pub fn set_front_back_yarns(&mut self, front: u32, back: u32, back_state: BackYarn) {
        let front = front & FRONT_MASK;
        let back = back & FRONT_MASK & !front;
        self.bits.front = front;
        for c in 0..FRONT_BITS {
            let state = if back & (1 << c) != 0 {
                back_state
            } else {
                BackYarn::None
            };
            self.put_back(c, state);
        }
        self.fire();
    }

    /// Make sure every carrier of `mask` is in the logical yarn set, as `Miss` if absent.
    pub fn allocate_yarns(&mut self, mask: u32) {
        let missing = mask & FRONT_MASK & !self.yarns();
        for c in 0..FRONT_BITS {
            if missing & (1 << c) != 0 {
                self.put_back(c, BackYarn::Miss);
            }
        }
        self.fire();
    }

    pub fn reset_front_yarns(&mut self) {
        self.bits.front = 0;
        self.fire();
    }

    pub fn reset_back_yarns(&mut self) {
        self.bits.back = 0;
        self.fire();
    }
}

/// Yarn occupancy of a whole needle bed, keyed by needle.
#[derive(Clone, Debug, Default)]
pub struct BedState {
    cells: BTreeMap<Needle, YarnBits>,
}

impl BedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, needle: Needle) -> YarnBits {
        self.cells.get(&needle).copied().unwrap_or_default()
    }

    /// Write-through stack for one needle. Empty cells are pruned on commit.
    pub fn stack(&mut self, needle: Needle) -> YarnStack<'_> {
        let bits = self.get(needle);
        let cells = &mut self.cells;
        YarnStack::with_commit(bits, move |b| {
            if b.is_empty() {
                cells.remove(&needle);
            } else {
                cells.insert(needle, b);
            }
        })
    }

    /// Move loops from `from` onto `to`, merging with what `to` already holds.
    pub fn transfer(&mut self, from: Needle, to: Needle) {
        let Some(src) = self.cells.remove(&from) else {
            return;
        };
        let dst = self.cells.entry(to).or_default();
        dst.front |= src.front;
        let mut back = 0;
        for c in 0..FRONT_BITS {
            let shift = 2 * c;
            let code = ((dst.back >> shift) & 3).max((src.back >> shift) & 3);
            if dst.front & (1 << c) == 0 {
                back |= code << shift;
            }
        }
        dst.back = back;
    }

    pub fn clear(&mut self, needle: Needle) {
        self.cells.remove(&needle);
    }

    /// Needles that currently hold loops, in bed order.
    pub fn occupied(&self) -> impl Iterator<Item = (Needle, YarnBits)> + '_ {
        self.cells.iter().map(|(n, b)| (*n, *b))
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/yarn/stack.rs"]
mod tests;
