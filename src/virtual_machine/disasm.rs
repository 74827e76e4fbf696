//! Best-effort program listing.
//!
//! Intcode does not separate code from data, so the listing walks the image
//! linearly: a word that decodes to an instruction with all of its parameters
//! present is printed as that instruction, anything else as `DATA`.
//!
//! Operand notation: `[x]` reads or writes address `x`, a bare `x` is an
//! immediate, `[rb+x]` is relative to the relative base.

use crate::virtual_machine::isa::Instruction;
use crate::virtual_machine::operand::{Mode, Role};

/// Formats one instruction at `address`, returning the line and how many
/// words it covers.
pub fn line_at(words: &[i64], address: usize) -> Option<(String, usize)> {
    let word = *words.get(address)?;
    let decoded = Instruction::decode(word)
        .ok()
        .filter(|instr| address + instr.width() as usize <= words.len());

    let Some(instr) = decoded else {
        return Some((format!("{:>5}: DATA {}", address, word), 1));
    };

    let operands: Vec<String> = instr
        .roles()
        .iter()
        .enumerate()
        .map(|(param, role)| {
            let mode = instr.mode(param).unwrap_or(role.default_mode());
            operand(*role, mode, words[address + param + 1])
        })
        .collect();

    let mut line = format!("{:>5}: {}", address, instr.opcode().mnemonic());
    if !operands.is_empty() {
        line.push(' ');
        line.push_str(&operands.join(", "));
    }
    Some((line, instr.width() as usize))
}

/// Lists the whole image.
pub fn disassemble(words: &[i64]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut address = 0;
    while let Some((line, width)) = line_at(words, address) {
        lines.push(line);
        address += width;
    }
    lines
}

fn operand(role: Role, mode: Mode, raw: i64) -> String {
    match (role, mode) {
        (Role::Read, Mode::Immediate) => raw.to_string(),
        (Role::Read, Mode::Position) | (Role::Write, Mode::Immediate) => format!("[{}]", raw),
        (_, Mode::Relative) if raw < 0 => format!("[rb{}]", raw),
        (_, Mode::Relative) => format!("[rb+{}]", raw),
        // Faults when executed.
        (Role::Write, Mode::Position) => format!("[[{}]]", raw),
    }
}
