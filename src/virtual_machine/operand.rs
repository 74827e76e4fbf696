//! Parameter roles, addressing modes, and operand resolution.

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::Opcode;

/// How an instruction uses one of its parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// The parameter yields a value.
    Read,
    /// The parameter names the address the instruction stores into.
    Write,
}

impl Role {
    /// Mode applied when the instruction word has no digit for this parameter.
    ///
    /// A write target is conventionally encoded as a direct address, so its
    /// literal already is the target.
    pub const fn default_mode(self) -> Mode {
        match self {
            Role::Read => Mode::Position,
            Role::Write => Mode::Immediate,
        }
    }
}

/// Addressing mode of a parameter.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Mode {
    /// The literal is an address.
    Position = 0,
    /// The literal is the value.
    Immediate = 1,
    /// The literal is an offset from the relative base.
    Relative = 2,
}

impl TryFrom<i64> for Mode {
    type Error = i64;

    fn try_from(digit: i64) -> Result<Self, Self::Error> {
        match digit {
            0 => Ok(Mode::Position),
            1 => Ok(Mode::Immediate),
            2 => Ok(Mode::Relative),
            other => Err(other),
        }
    }
}

/// A parameter after its mode has been applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operand {
    /// Use this value as is.
    Literal(i64),
    /// Read from, or write to, this absolute address.
    Address(i64),
}

impl Operand {
    /// Applies `mode` (or the role default when `None`) to the raw parameter `raw`.
    ///
    /// Fails with [`VMError::InvalidWriteMode`] when a write parameter uses
    /// position mode.
    pub fn locate(
        opcode: Opcode,
        param: usize,
        mode: Option<Mode>,
        raw: i64,
        relative_base: i64,
    ) -> Result<Operand, VMError> {
        let role = opcode.roles()[param];
        let mode = mode.unwrap_or(role.default_mode());

        match (role, mode) {
            (Role::Read, Mode::Position) => Ok(Operand::Address(raw)),
            (Role::Read, Mode::Immediate) => Ok(Operand::Literal(raw)),
            (Role::Write, Mode::Immediate) => Ok(Operand::Address(raw)),
            (_, Mode::Relative) => Ok(Operand::Address(relative_base.wrapping_add(raw))),
            (Role::Write, Mode::Position) => Err(VMError::InvalidWriteMode {
                instruction: opcode.mnemonic(),
                param: param + 1,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_try_from_digits() {
        assert_eq!(Mode::try_from(0), Ok(Mode::Position));
        assert_eq!(Mode::try_from(1), Ok(Mode::Immediate));
        assert_eq!(Mode::try_from(2), Ok(Mode::Relative));
        assert_eq!(Mode::try_from(3), Err(3));
        assert_eq!(Mode::try_from(9), Err(9));
    }

    #[test]
    fn role_defaults_are_asymmetric() {
        assert_eq!(Role::Read.default_mode(), Mode::Position);
        assert_eq!(Role::Write.default_mode(), Mode::Immediate);
    }

    #[test]
    fn read_parameters() {
        assert_eq!(
            Operand::locate(Opcode::Add, 0, None, 7, 100),
            Ok(Operand::Address(7))
        );
        assert_eq!(
            Operand::locate(Opcode::Add, 1, Some(Mode::Immediate), 7, 100),
            Ok(Operand::Literal(7))
        );
        assert_eq!(
            Operand::locate(Opcode::Add, 0, Some(Mode::Relative), -7, 100),
            Ok(Operand::Address(93))
        );
    }

    #[test]
    fn write_parameters() {
        assert_eq!(
            Operand::locate(Opcode::Add, 2, None, 12, 100),
            Ok(Operand::Address(12))
        );
        assert_eq!(
            Operand::locate(Opcode::Input, 0, Some(Mode::Immediate), 12, 100),
            Ok(Operand::Address(12))
        );
        assert_eq!(
            Operand::locate(Opcode::Input, 0, Some(Mode::Relative), 12, 100),
            Ok(Operand::Address(112))
        );
    }

    #[test]
    fn write_parameter_rejects_position_mode() {
        assert_eq!(
            Operand::locate(Opcode::Mul, 2, Some(Mode::Position), 12, 0),
            Err(VMError::InvalidWriteMode {
                instruction: "MUL",
                param: 3,
            })
        );
    }
}
