//! Instruction emission: turn a trace into a knitout instruction store.

pub mod transfer;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::foundation::error::KnitResult;
use crate::foundation::issue::Issue;
use crate::knitout::{
    CarrierMask, InstructionStore, Needle, Opcode, TextOptions, write_text,
};
use crate::layers::StitchCode;
use crate::pipeline::ResolvedParams;
use crate::sampler::Sampler;
use crate::trace::{Pass, PassKind, Trace, TracedStitch};
use crate::yarn::{BackYarn, BedState};

use transfer::{Move, TransferReport, Transfers};

/// Passes emitted per call to [`Compiler::step`].
const PASSES_PER_STEP: usize = 16;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileStats {
    pub instructions: usize,
    /// Instruction count per opcode name.
    pub ops: BTreeMap<String, usize>,
    pub xfers: usize,
    pub racks: usize,
    pub collisions: usize,
    /// Entries without any carrier.
    pub unfed: usize,
}

/// Result of compiling one trace.
#[derive(Clone, Debug, PartialEq)]
pub struct Compilation {
    pub store: InstructionStore,
    pub stats: CompileStats,
    pub issues: Vec<Issue>,
}

impl Compilation {
    pub fn to_text(&self) -> String {
        write_text(&self.store, TextOptions::default())
    }
}

/// Incremental trace-to-instructions compiler.
#[derive(Clone, Debug)]
pub struct Compiler {
    store: InstructionStore,
    bed: BedState,
    /// Current needle of each stitch's loop.
    loops: Vec<Option<Needle>>,
    /// Store carrier mask of each carrier device.
    devices: Vec<CarrierMask>,
    /// Last pass using each store carrier bit.
    last_use: BTreeMap<u32, usize>,
    carriers_in: CarrierMask,
    hooked: CarrierMask,
    racking: i32,
    cursor: usize,
    done: bool,
    stats: CompileStats,
    issues: Vec<Issue>,
}

impl Compiler {
    pub fn new(trace: &Trace, sampler: &Sampler, params: &ResolvedParams) -> KnitResult<Self> {
        let ids = params.carriers.carrier_ids();
        let mut store = InstructionStore::new(&ids);
        store.set_version(params.knitout_version);
        store.set_header("Gauge", params.machine_gauge.to_string());
        store.x_stitch_number(params.stitch_number);

        let mut devices = Vec::with_capacity(params.carriers.devices().len());
        for d in params.carriers.devices() {
            devices.push(store.carrier_mask(&d.carriers)?);
        }
        let mut compiler = Self {
            store,
            bed: BedState::new(),
            loops: vec![None; sampler.len()],
            devices,
            last_use: BTreeMap::new(),
            carriers_in: 0,
            hooked: 0,
            racking: 0,
            cursor: 0,
            done: trace.passes.is_empty(),
            stats: CompileStats::default(),
            issues: Vec::new(),
        };
        for (i, pass) in trace.passes.iter().enumerate() {
            let mask = compiler.carriers(pass.yarn_mask);
            for bit in 0..32 {
                if mask & (1 << bit) != 0 {
                    compiler.last_use.insert(bit, i);
                }
            }
        }
        if compiler.done {
            compiler.finish();
        }
        Ok(compiler)
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Fraction of passes emitted.
    pub fn progress(&self, trace: &Trace) -> f64 {
        if self.done {
            1.0
        } else if trace.passes.is_empty() {
            0.0
        } else {
            0.99 * self.cursor as f64 / trace.passes.len() as f64
        }
    }

    /// Emit a few passes. Returns `true` once the final drops are written.
    pub fn step(
        &mut self,
        trace: &Trace,
        sampler: &Sampler,
        params: &ResolvedParams,
    ) -> KnitResult<bool> {
        if self.done {
            return Ok(true);
        }
        let end = (self.cursor + PASSES_PER_STEP).min(trace.passes.len());
        for i in self.cursor..end {
            self.emit_pass(trace, sampler, params, i)?;
        }
        self.cursor = end;
        if self.cursor == trace.passes.len() {
            self.finish();
        }
        Ok(self.done)
    }

    pub fn into_compilation(self) -> Compilation {
        Compilation {
            store: self.store,
            stats: self.stats,
            issues: self.issues,
        }
    }

    /// Store carrier mask for a device yarn mask.
    fn carriers(&self, yarn_mask: u32) -> CarrierMask {
        self.devices
            .iter()
            .enumerate()
            .filter(|(i, _)| *i < 32 && yarn_mask & (1 << i) != 0)
            .fold(0, |m, (_, c)| m | c)
    }

    fn meta(&mut self, row: usize, entry: usize) {
        self.store.set_meta(row, entry as u32 + 1);
    }

    fn transfers(&mut self, moves: &[Move], meta: u32) {
        let report = Transfers {
            store: &mut self.store,
            bed: &mut self.bed,
            racking: &mut self.racking,
            meta,
        }
        .run(moves);
        self.record(report);
    }

    fn record(&mut self, report: TransferReport) {
        self.stats.xfers += report.xfers;
        self.stats.racks += report.racks;
        self.stats.collisions += report.collisions;
    }

    fn emit_pass(
        &mut self,
        trace: &Trace,
        sampler: &Sampler,
        params: &ResolvedParams,
        index: usize,
    ) -> KnitResult<()> {
        let pass = &trace.passes[index];
        let cs = self.carriers(pass.yarn_mask);
        let incoming = cs & !self.carriers_in;
        if incoming != 0 {
            self.store.yarn_op(Opcode::Inhook, incoming);
            self.carriers_in |= incoming;
            self.hooked |= incoming;
        }
        let first = self.store.len();
        match pass.kind {
            PassKind::CastOn => self.cast_on(trace, pass)?,
            PassKind::Knit => self.knit(trace, sampler, params, pass)?,
            PassKind::CastOff => self.cast_off(trace, params, pass)?,
        }
        if self.store.len() > first {
            let label = match pass.kind {
                PassKind::CastOn => "cast-on",
                PassKind::Knit => "knit",
                PassKind::CastOff => "cast-off",
            };
            self.store
                .set_comment(first, format!("{label} course {}", pass.course));
        }
        if self.hooked != 0 {
            self.store.yarn_op(Opcode::Releasehook, self.hooked);
            self.hooked = 0;
        }
        let leaving = self
            .last_use
            .iter()
            .filter(|&(_, &last)| last == index)
            .fold(0, |m, (&bit, _)| m | (1 << bit));
        if leaving != 0 {
            self.store.yarn_op(Opcode::Outhook, leaving);
            self.carriers_in &= !leaving;
        }
        Ok(())
    }

    fn cast_on(&mut self, trace: &Trace, pass: &Pass) -> KnitResult<()> {
        for i in pass.entries.clone() {
            let e = trace.entries[i];
            let cs = self.carriers(e.yarn_mask);
            if cs == 0 {
                self.stats.unfed += 1;
                continue;
            }
            let row = self.store.tuck(e.dir, e.needle, cs)?;
            self.meta(row, i);
            self.bed.stack(e.needle).set_back_yarns(cs, BackYarn::Tuck);
            self.loops[e.stitch.index()] = Some(e.needle);
        }
        Ok(())
    }

    /// Needle a stitch is formed on: its home, or the opposite bed for purls where that bed
    /// is free for it.
    fn working_needle(e: &TracedStitch, sampler: &Sampler, params: &ResolvedParams) -> Needle {
        let stitch = &sampler.stitches[e.stitch.index()];
        let open = sampler
            .courses
            .get(stitch.course as usize)
            .is_some_and(|c| !c.closed);
        if StitchCode::from_code(stitch.program) == StitchCode::Purl && (open || params.gauge > 1) {
            Needle::new(e.needle.side.opposite(), e.needle.offset)
        } else {
            e.needle
        }
    }

    fn knit(
        &mut self,
        trace: &Trace,
        sampler: &Sampler,
        params: &ResolvedParams,
        pass: &Pass,
    ) -> KnitResult<()> {
        let mut moves = Vec::new();
        for i in pass.entries.clone() {
            let e = &trace.entries[i];
            let work = Self::working_needle(e, sampler, params);
            for p in &sampler.stitches[e.stitch.index()].prev_wales {
                if let Some(from) = self.loops[p.index()].take() {
                    moves.push(Move { from, to: work });
                }
            }
            if let Some(from) = self.loops[e.stitch.index()].take() {
                // Cast-on loop of this very stitch.
                moves.push(Move { from, to: work });
            }
        }
        self.transfers(&moves, 0);

        for i in pass.entries.clone() {
            let e = trace.entries[i];
            let work = Self::working_needle(&e, sampler, params);
            self.loops[e.stitch.index()] = Some(work);
            let cs = self.carriers(e.yarn_mask);
            if cs == 0 {
                self.stats.unfed += 1;
                continue;
            }
            let code = StitchCode::from_code(sampler.stitches[e.stitch.index()].program);
            let row = match code {
                StitchCode::Knit | StitchCode::Purl => {
                    let row = self.store.knit(e.dir, work, cs)?;
                    self.bed
                        .stack(work)
                        .set_front_back_yarns(cs, 0, BackYarn::None);
                    row
                }
                StitchCode::Tuck => {
                    let row = self.store.tuck(e.dir, work, cs)?;
                    self.bed.stack(work).set_back_yarns(cs, BackYarn::Tuck);
                    row
                }
                StitchCode::Miss => self.store.miss(e.dir, work, cs)?,
            };
            self.meta(row, i);
        }
        Ok(())
    }

    /// Chain bind-off: knit each loop, then hand it to the next loop of the pass.
    fn cast_off(&mut self, trace: &Trace, params: &ResolvedParams, pass: &Pass) -> KnitResult<()> {
        let entries: Vec<(usize, TracedStitch)> =
            pass.entries.clone().map(|i| (i, trace.entries[i])).collect();
        for (j, &(i, e)) in entries.iter().enumerate() {
            let at = self.loops[e.stitch.index()].unwrap_or(e.needle);
            let cs = self.carriers(e.yarn_mask);
            if cs == 0 {
                self.stats.unfed += 1;
            } else {
                let row = self.store.knit(e.dir, at, cs)?;
                self.meta(row, i);
                self.bed.stack(at).set_front_back_yarns(cs, 0, BackYarn::None);
            }
            let Some(&(_, next)) = entries.get(j + 1) else {
                self.loops[e.stitch.index()] = Some(at);
                continue;
            };
            let to = self.loops[next.stitch.index()].unwrap_or(next.needle);
            if (to.offset - at.offset).abs() <= params.max_racking {
                self.transfers(&[Move { from: at, to }], i as u32 + 1);
                self.loops[e.stitch.index()] = None;
            } else {
                self.loops[e.stitch.index()] = Some(at);
            }
        }
        Ok(())
    }

    fn finish(&mut self) {
        if self.carriers_in != 0 {
            self.store.yarn_op(Opcode::Outhook, self.carriers_in);
            self.carriers_in = 0;
        }
        if self.racking != 0 {
            self.store.rack(0.0);
            self.racking = 0;
        }
        let held: Vec<Needle> = self.bed.occupied().map(|(n, _)| n).collect();
        for n in held {
            self.store.drop_loop(n);
            self.bed.clear(n);
        }
        self.loops.iter_mut().for_each(|l| *l = None);

        self.stats.instructions = self.store.len();
        self.stats.ops = Opcode::ALL
            .iter()
            .map(|&op| (op.name().to_string(), self.store.count(op)))
            .filter(|(_, n)| *n > 0)
            .collect();
        if self.stats.collisions > 0 {
            let issue = Issue::warning(format!(
                "{} transfers parked a loop on an occupied needle",
                self.stats.collisions
            ));
            tracing::warn!(issue = %issue.message, "compile warning");
            self.issues.push(issue);
        }
        self.done = true;
        tracing::debug!(
            instructions = self.stats.instructions,
            xfers = self.stats.xfers,
            "compile done"
        );
    }
}

/// Compile a whole trace in one go.
#[tracing::instrument(skip_all, fields(entries = trace.len()))]
pub fn compile(trace: &Trace, sampler: &Sampler, params: &ResolvedParams) -> KnitResult<Compilation> {
    let mut compiler = Compiler::new(trace, sampler, params)?;
    while !compiler.step(trace, sampler, params)? {}
    Ok(compiler.into_compilation())
}

/// Joint export: one headered store, each part introduced by a `Part i` comment line.
pub fn join_parts(parts: &[Compilation]) -> KnitResult<InstructionStore> {
    let stores: Vec<InstructionStore> = parts.iter().map(|p| p.store.clone()).collect();
    InstructionStore::join(&stores)
}

#[cfg(test)]
#[path = "../../tests/unit/compile/compile.rs"]
mod tests;
