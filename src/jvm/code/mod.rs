//! Bytecode representation, decoding, and assembly
//!
//! Method bodies are decoded into a flat list of instructions (with absolute jump targets) and
//! re-assembled from a [`CodeBuffer`] in which jump targets are symbolic [`Label`]s. We split up
//! the [list of bytecode instructions][0] into two groups:
//!
//!   - [`Instruction`] for straight-line instructions
//!   - [`BranchInstruction`] for instructions that may jump, return, or throw
//!
//! Going through labels means instructions can be freely inserted into an existing body: all
//! jump offsets, switch paddings, and the offsets reported back for each label get recomputed
//! when the buffer is assembled.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se18/html/jvms-6.html#jvms-6.5

mod assembler;
mod decode;
mod instruction;
mod label;

pub use assembler::*;
pub use decode::*;
pub use instruction::*;
pub use label::*;
