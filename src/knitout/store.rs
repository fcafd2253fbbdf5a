use std::collections::HashMap;

use super::opcode::{Direction, Needle, Opcode, PresserMode};
use crate::foundation::error::{KnitError, KnitResult};

/// Bitmask over the store's carrier list (bit `i` is `carriers[i]`).
pub type CarrierMask = u32;

pub const CARRIERS_HEADER: &str = "Carriers";

/// Carriers addressable by a [`CarrierMask`].
pub const MAX_CARRIERS: usize = CarrierMask::BITS as usize;

/// Decoded arguments of one instruction row.
#[derive(Clone, Debug, PartialEq)]
pub enum Args {
    None,
    Carriers(CarrierMask),
    Needle(Needle),
    NeedleCarriers(Needle, CarrierMask),
    Needles(Needle, Needle),
    NeedlesCarriers(Needle, Needle, CarrierMask),
    Racking(f32),
    Stitch(f32, f32),
    Count(u32),
    Speed(f32),
    Presser(PresserMode),
}

/// Fully decoded view of one row of an [`InstructionStore`].
#[derive(Clone, Debug, PartialEq)]
pub struct Instruction {
    pub op: Opcode,
    pub dir: Direction,
    pub args: Args,
    pub comment: Option<String>,
    pub meta: Option<u32>,
}

/// Packed columnar instruction array.
///
/// Each row holds one opcode byte (with the direction folded into its high bits), three raw
/// 32-bit argument slots, a comment reference and a metadata integer. Comment and metadata use
/// `0` as the "absent" sentinel; stored comments are `index + 1` into a table of unique
/// strings.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InstructionStore {
    version: u32,
    headers: Vec<(String, String)>,
    carriers: Vec<String>,
    ops: Vec<u8>,
    args: [Vec<u32>; 3],
    comments: Vec<u32>,
    metas: Vec<u32>,
    comment_table: Vec<String>,
    comment_index: HashMap<String, u32>,
}

impl InstructionStore {
    pub const DEFAULT_VERSION: u32 = 2;

    /// Create an empty store with the mandatory `Carriers` header.
    pub fn new<S: AsRef<str>>(carriers: &[S]) -> Self {
        let mut s = Self {
            version: Self::DEFAULT_VERSION,
            ..Self::default()
        };
        let names: Vec<String> = carriers.iter().map(|c| c.as_ref().to_string()).collect();
        s.headers
            .push((CARRIERS_HEADER.to_string(), names.join(" ")));
        s.carriers = names;
        s
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn set_version(&mut self, version: u32) {
        self.version = version;
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn carriers(&self) -> &[String] {
        &self.carriers
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Set (or replace) a header; setting `Carriers` also replaces the carrier list.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if name == CARRIERS_HEADER {
            self.carriers = value.split_whitespace().map(str::to_string).collect();
        }
        match self.headers.iter_mut().find(|(k, _)| k == name) {
            Some(slot) => slot.1 = value,
            None => self.headers.push((name.to_string(), value)),
        }
    }

    /// Bitmask for a list of carrier names.
    pub fn carrier_mask<S: AsRef<str>>(&self, names: &[S]) -> KnitResult<CarrierMask> {
        let mut mask = 0;
        for n in names {
            let n = n.as_ref();
            let i = self
                .carriers
                .iter()
                .position(|c| c == n)
                .ok_or_else(|| KnitError::compile(format!("unknown carrier '{n}'")))?;
            if i >= MAX_CARRIERS {
                return Err(KnitError::compile(format!(
                    "carrier '{n}' is past the first {MAX_CARRIERS} carriers"
                )));
            }
            mask |= 1 << i;
        }
        Ok(mask)
    }

    /// Carrier names selected by a bitmask, in header order.
    pub fn carrier_names(&self, mask: CarrierMask) -> Vec<&str> {
        self.carriers
            .iter()
            .enumerate()
            .take(MAX_CARRIERS)
            .filter(|(i, _)| mask & (1 << i) != 0)
            .map(|(_, c)| c.as_str())
            .collect()
    }

    /// Append a raw row and return its index.
    pub fn push_raw(&mut self, op: Opcode, dir: Direction, args: [u32; 3]) -> usize {
        self.ops.push(op as u8 | dir.bits());
        for (col, v) in self.args.iter_mut().zip(args) {
            col.push(v);
        }
        self.comments.push(0);
        self.metas.push(0);
        self.ops.len() - 1
    }

    pub fn opcode(&self, row: usize) -> Opcode {
        Opcode::from_id(self.ops[row] & !Direction::MASK).unwrap_or(Opcode::Noop)
    }

    pub fn direction(&self, row: usize) -> Direction {
        Direction::from_bits(self.ops[row])
    }

    pub fn raw_arg(&self, row: usize, slot: usize) -> u32 {
        self.args[slot][row]
    }

    pub fn needle_arg(&self, row: usize, slot: usize) -> Needle {
        Needle::unpack(self.args[slot][row])
    }

    pub fn float_arg(&self, row: usize, slot: usize) -> f32 {
        f32::from_bits(self.args[slot][row])
    }

    pub fn comment(&self, row: usize) -> Option<&str> {
        match self.comments[row] {
            0 => None,
            k => Some(self.comment_table[(k - 1) as usize].as_str()),
        }
    }

    pub fn set_comment(&mut self, row: usize, text: impl Into<String>) {
        let text = text.into();
        if text.is_empty() {
            self.comments[row] = 0;
            return;
        }
        let k = match self.comment_index.get(&text) {
            Some(&k) => k,
            None => {
                self.comment_table.push(text.clone());
                let k = self.comment_table.len() as u32;
                self.comment_index.insert(text, k);
                k
            }
        };
        self.comments[row] = k;
    }

    /// Unique comment strings in first-use order.
    pub fn comment_table(&self) -> &[String] {
        &self.comment_table
    }

    pub fn meta(&self, row: usize) -> Option<u32> {
        match self.metas[row] {
            0 => None,
            m => Some(m),
        }
    }

    /// Attach metadata; `0` clears it.
    pub fn set_meta(&mut self, row: usize, meta: u32) {
        self.metas[row] = meta;
    }

    pub fn count(&self, op: Opcode) -> usize {
        self.ops
            .iter()
            .filter(|&&b| b & !Direction::MASK == op as u8)
            .count()
    }

    // Typed writers.

    pub fn noop(&mut self) -> usize {
        self.push_raw(Opcode::Noop, Direction::None, [0; 3])
    }

    /// Pure comment line.
    pub fn comment_line(&mut self, text: impl Into<String>) -> usize {
        let row = self.noop();
        self.set_comment(row, text);
        row
    }

    pub fn yarn_op(&mut self, op: Opcode, carriers: CarrierMask) -> usize {
        debug_assert!(matches!(
            op,
            Opcode::In | Opcode::Inhook | Opcode::Releasehook | Opcode::Out | Opcode::Outhook
        ));
        self.push_raw(op, Direction::None, [carriers, 0, 0])
    }

    /// Carriage operations must move left or right.
    fn directed(op: Opcode, dir: Direction) -> KnitResult<Direction> {
        match dir {
            Direction::None => Err(KnitError::compile(format!(
                "'{}' needs a direction",
                op.name()
            ))),
            d => Ok(d),
        }
    }

    pub fn knit(&mut self, dir: Direction, needle: Needle, carriers: CarrierMask) -> KnitResult<usize> {
        let dir = Self::directed(Opcode::Knit, dir)?;
        Ok(self.push_raw(Opcode::Knit, dir, [needle.pack(), carriers, 0]))
    }

    pub fn tuck(&mut self, dir: Direction, needle: Needle, carriers: CarrierMask) -> KnitResult<usize> {
        let dir = Self::directed(Opcode::Tuck, dir)?;
        Ok(self.push_raw(Opcode::Tuck, dir, [needle.pack(), carriers, 0]))
    }

    pub fn miss(&mut self, dir: Direction, needle: Needle, carriers: CarrierMask) -> KnitResult<usize> {
        let dir = Self::directed(Opcode::Miss, dir)?;
        Ok(self.push_raw(Opcode::Miss, dir, [needle.pack(), carriers, 0]))
    }

    pub fn split(
        &mut self,
        dir: Direction,
        from: Needle,
        to: Needle,
        carriers: CarrierMask,
    ) -> KnitResult<usize> {
        let dir = Self::directed(Opcode::Split, dir)?;
        Ok(self.push_raw(Opcode::Split, dir, [from.pack(), to.pack(), carriers]))
    }

    pub fn xfer(&mut self, from: Needle, to: Needle) -> usize {
        self.push_raw(Opcode::Xfer, Direction::None, [from.pack(), to.pack(), 0])
    }

    pub fn drop_loop(&mut self, needle: Needle) -> usize {
        self.push_raw(Opcode::Drop, Direction::None, [needle.pack(), 0, 0])
    }

    pub fn amiss(&mut self, needle: Needle) -> usize {
        self.push_raw(Opcode::Amiss, Direction::None, [needle.pack(), 0, 0])
    }

    pub fn rack(&mut self, racking: f32) -> usize {
        self.push_raw(Opcode::Rack, Direction::None, [racking.to_bits(), 0, 0])
    }

    pub fn stitch(&mut self, leading: f32, stitch: f32) -> usize {
        self.push_raw(
            Opcode::Stitch,
            Direction::None,
            [leading.to_bits(), stitch.to_bits(), 0],
        )
    }

    pub fn pause(&mut self) -> usize {
        self.push_raw(Opcode::Pause, Direction::None, [0; 3])
    }

    pub fn x_stitch_number(&mut self, n: u32) -> usize {
        self.push_raw(Opcode::XStitchNumber, Direction::None, [n, 0, 0])
    }

    pub fn x_speed_number(&mut self, speed: f32) -> usize {
        self.push_raw(Opcode::XSpeedNumber, Direction::None, [speed.to_bits(), 0, 0])
    }

    pub fn x_presser_mode(&mut self, mode: PresserMode) -> usize {
        self.push_raw(Opcode::XPresserMode, Direction::None, [mode as u32, 0, 0])
    }

    /// Decode one row.
    pub fn instruction(&self, row: usize) -> Instruction {
        let op = self.opcode(row);
        let a = |s: usize| self.raw_arg(row, s);
        let args = match op {
            Opcode::Noop | Opcode::Pause => Args::None,
            Opcode::In | Opcode::Inhook | Opcode::Releasehook | Opcode::Out | Opcode::Outhook => {
                Args::Carriers(a(0))
            }
            Opcode::Stitch => Args::Stitch(self.float_arg(row, 0), self.float_arg(row, 1)),
            Opcode::Rack => Args::Racking(self.float_arg(row, 0)),
            Opcode::Knit | Opcode::Tuck | Opcode::Miss => {
                Args::NeedleCarriers(Needle::unpack(a(0)), a(1))
            }
            Opcode::Split => {
                Args::NeedlesCarriers(Needle::unpack(a(0)), Needle::unpack(a(1)), a(2))
            }
            Opcode::Drop | Opcode::Amiss => Args::Needle(Needle::unpack(a(0))),
            Opcode::Xfer => Args::Needles(Needle::unpack(a(0)), Needle::unpack(a(1))),
            Opcode::XStitchNumber => Args::Count(a(0)),
            Opcode::XSpeedNumber => Args::Speed(self.float_arg(row, 0)),
            Opcode::XPresserMode => Args::Presser(PresserMode::from_code(a(0))),
        };
        Instruction {
            op,
            dir: self.direction(row),
            args,
            comment: self.comment(row).map(str::to_string),
            meta: self.meta(row),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Instruction> + '_ {
        (0..self.len()).map(|r| self.instruction(r))
    }

    /// Append every row of `other` (which must share the carrier list).
    pub fn extend_from(&mut self, other: &InstructionStore) -> KnitResult<()> {
        if other.carriers != self.carriers {
            return Err(KnitError::compile(
                "cannot join instruction stores with different carriers",
            ));
        }
        for row in 0..other.len() {
            let args = [
                other.raw_arg(row, 0),
                other.raw_arg(row, 1),
                other.raw_arg(row, 2),
            ];
            let r = self.push_raw(other.opcode(row), other.direction(row), args);
            if let Some(c) = other.comment(row) {
                self.set_comment(r, c);
            }
            self.metas[r] = other.metas[row];
        }
        Ok(())
    }

    /// Joint export: headers of the first part, each body preceded by `; Part i`.
    pub fn join(parts: &[InstructionStore]) -> KnitResult<InstructionStore> {
        let Some(first) = parts.first() else {
            return Err(KnitError::compile("nothing to join"));
        };
        let mut out = InstructionStore {
            version: first.version,
            headers: first.headers.clone(),
            carriers: first.carriers.clone(),
            ..InstructionStore::default()
        };
        for (i, part) in parts.iter().enumerate() {
            out.comment_line(format!(" Part {}", i + 1));
            out.extend_from(part)?;
        }
        Ok(out)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/knitout/store.rs"]
mod tests;
