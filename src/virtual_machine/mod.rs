//! Intcode virtual machine.
//!
//! A stored-program computer over one flat integer memory. Programs are
//! comma-separated integers loaded at address 0 and executed from there.
//!
//! # Architecture
//!
//! - **Memory**: non-negative addresses, unwritten cells read as zero, no
//!   upper bound
//! - **Registers**: program counter and relative base, both starting at 0
//! - **Instruction format**: decimal word, opcode in the two lowest digits,
//!   one addressing mode digit per parameter above them
//! - **I/O**: opcode 3 reads from an [`port::Input`], opcode 4 writes to an
//!   [`port::Output`]
//!
//! # Modules
//!
//! - [`ascii`]: Text conversions for programs that talk in character codes
//! - [`disasm`]: Program listings
//! - [`errors`]: Load and execution error types
//! - [`isa`]: Opcode table and instruction decoding
//! - [`operand`]: Parameter roles, addressing modes and operand resolution
//! - [`port`]: Input and output port traits and implementations
//! - [`program`]: Program text parsing
//! - [`vm`]: Execution engine

pub mod ascii;
pub mod disasm;
pub mod errors;
pub mod isa;
#[cfg(test)]
mod isa_static_check;
pub mod operand;
pub mod port;
pub mod program;
pub mod vm;
