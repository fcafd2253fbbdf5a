//! Packed instruction store and its knitout text form.

mod opcode;
mod store;
mod text;

pub use opcode::{Direction, Needle, Opcode, PresserMode, Side};
pub use store::{Args, CARRIERS_HEADER, CarrierMask, Instruction, InstructionStore, MAX_CARRIERS};
pub use text::{TextOptions, parse_text, write_text};
