//! Instruction Set Architecture (ISA) definitions.
//!
//! The [`for_each_instruction!`](crate::for_each_instruction) macro holds the
//! canonical opcode table and invokes a callback macro for code generation, so
//! the decoder and the engine's dispatch never drift apart.
//!
//! This module generates:
//! - The [`Opcode`] enum with its numeric codes
//! - `TryFrom<i64>` for decoding opcodes
//! - Per-opcode mnemonics and parameter roles
//!
//! # Instruction word
//!
//! An instruction word is read as a decimal number. The two lowest digits are
//! the opcode; each further digit, least significant first, is the
//! [`Mode`] of the next parameter. Missing digits leave the mode unset and the
//! parameter's [`Role`] default applies.

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::operand::{Mode, Role};
use std::fmt;

/// Largest number of parameters any instruction takes.
pub const MAX_PARAMS: usize = 3;

/// Invokes a callback macro with the complete instruction definition list.
#[macro_export]
macro_rules! for_each_instruction {
    ($callback:ident) => {
        $callback! {
            /// ADD a, b, dst ; dst = a + b
            Add = 1, "ADD" => [a: Read, b: Read, dst: Write],
            /// MUL a, b, dst ; dst = a * b
            Mul = 2, "MUL" => [a: Read, b: Read, dst: Write],
            /// IN dst ; dst = next value from the input port
            Input = 3, "IN" => [dst: Write],
            /// OUT value ; send value to the output port
            Output = 4, "OUT" => [value: Read],
            /// JNZ cond, target ; if cond != 0 then PC = target
            JumpIfTrue = 5, "JNZ" => [cond: Read, target: Read],
            /// JZ cond, target ; if cond == 0 then PC = target
            JumpIfFalse = 6, "JZ" => [cond: Read, target: Read],
            /// LT a, b, dst ; dst = (a < b) as 1 or 0
            LessThan = 7, "LT" => [a: Read, b: Read, dst: Write],
            /// EQ a, b, dst ; dst = (a == b) as 1 or 0
            Equals = 8, "EQ" => [a: Read, b: Read, dst: Write],
            /// ARB offset ; relative base += offset
            AdjustBase = 9, "ARB" => [offset: Read],
            /// HALT ; stop the machine
            Halt = 99, "HALT" => [],
        }
    };
}

#[macro_export]
macro_rules! define_instructions {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:literal, $mnemonic:literal => [
                $( $field:ident : $role:ident ),* $(,)?
            ]
        ),* $(,)?
    ) => {
        /// Operation selected by the two lowest digits of an instruction word.
        #[repr(u8)]
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        pub enum Opcode {
            $(
                $(#[$doc])*
                $name = $opcode,
            )*
        }

        impl TryFrom<i64> for Opcode {
            type Error = VMError;

            fn try_from(value: i64) -> Result<Self, Self::Error> {
                match value {
                    $( $opcode => Ok(Opcode::$name), )*
                    _ => Err(VMError::UnknownOpcode {
                        opcode: value,
                        word: value,
                    }),
                }
            }
        }

        impl Opcode {
            /// Every opcode, in table order.
            pub const ALL: &'static [Opcode] = &[$( Opcode::$name, )*];

            /// Returns the numeric opcode.
            pub const fn code(&self) -> i64 {
                *self as u8 as i64
            }

            /// Returns the assembly mnemonic for this opcode.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Opcode::$name => $mnemonic, )*
                }
            }

            /// Returns the role of each parameter, in order.
            pub const fn roles(&self) -> &'static [Role] {
                match self {
                    $( Opcode::$name => &[$( Role::$role ),*], )*
                }
            }

            /// Returns the number of parameters.
            pub const fn arity(&self) -> usize {
                self.roles().len()
            }
        }
    };
}

for_each_instruction!(define_instructions);

/// A decoded instruction word.
///
/// Modes are kept as written: `None` means the word had no digit for that
/// parameter and the role default applies when the parameter is resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Instruction {
    opcode: Opcode,
    modes: [Option<Mode>; MAX_PARAMS],
}

impl Instruction {
    /// Decodes an instruction word.
    pub fn decode(word: i64) -> Result<Self, VMError> {
        if word < 0 {
            return Err(VMError::UnknownOpcode {
                opcode: word,
                word,
            });
        }

        let opcode = Opcode::try_from(word % 100).map_err(|_| VMError::UnknownOpcode {
            opcode: word % 100,
            word,
        })?;

        let mut modes = [None; MAX_PARAMS];
        let mut rest = word / 100;
        let mut param = 0;
        while rest != 0 {
            let digit = rest % 10;
            if param >= MAX_PARAMS {
                return Err(VMError::InvalidMode {
                    digit,
                    param: param + 1,
                    word,
                });
            }
            modes[param] = Some(Mode::try_from(digit).map_err(|digit| VMError::InvalidMode {
                digit,
                param: param + 1,
                word,
            })?);
            rest /= 10;
            param += 1;
        }

        Ok(Self { opcode, modes })
    }

    /// Builds an instruction with explicit per-parameter modes.
    pub const fn with_modes(opcode: Opcode, modes: [Option<Mode>; MAX_PARAMS]) -> Self {
        Self { opcode, modes }
    }

    pub const fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Mode digit written for parameter `param` (0-based), if any.
    pub fn mode(&self, param: usize) -> Option<Mode> {
        self.modes.get(param).copied().flatten()
    }

    /// Modes of the parameters this opcode actually takes.
    pub fn modes(&self) -> &[Option<Mode>] {
        &self.modes[..self.opcode.arity()]
    }

    pub const fn roles(&self) -> &'static [Role] {
        self.opcode.roles()
    }

    /// Number of memory cells the instruction occupies (opcode word plus parameters).
    pub const fn width(&self) -> i64 {
        self.opcode.arity() as i64 + 1
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode.mnemonic())?;
        for (param, role) in self.roles().iter().enumerate() {
            let mode = self.mode(param).unwrap_or(role.default_mode());
            let sep = if param == 0 { " " } else { ", " };
            write!(f, "{}{:?}", sep, mode)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_try_from_invalid() {
        assert!(matches!(
            Opcode::try_from(42),
            Err(VMError::UnknownOpcode { opcode: 42, .. })
        ));
        assert!(Opcode::try_from(0).is_err());
    }

    #[test]
    fn opcode_codes_round_trip() {
        for opcode in Opcode::ALL {
            assert_eq!(Opcode::try_from(opcode.code()), Ok(*opcode));
        }
    }

    #[test]
    fn decode_without_mode_digits() {
        let instr = Instruction::decode(1).unwrap();
        assert_eq!(instr.opcode(), Opcode::Add);
        assert_eq!(instr.modes(), &[None, None, None]);
        assert_eq!(instr.width(), 4);
    }

    #[test]
    fn decode_explicit_modes_least_significant_first() {
        let instr = Instruction::decode(1002).unwrap();
        assert_eq!(instr.opcode(), Opcode::Mul);
        assert_eq!(
            instr.modes(),
            &[Some(Mode::Position), Some(Mode::Immediate), None]
        );

        let instr = Instruction::decode(21101).unwrap();
        assert_eq!(
            instr.modes(),
            &[
                Some(Mode::Immediate),
                Some(Mode::Immediate),
                Some(Mode::Relative)
            ]
        );
    }

    #[test]
    fn decode_halt_and_relative_base() {
        assert_eq!(Instruction::decode(99).unwrap().width(), 1);
        let instr = Instruction::decode(209).unwrap();
        assert_eq!(instr.opcode(), Opcode::AdjustBase);
        assert_eq!(instr.modes(), &[Some(Mode::Relative)]);
    }

    #[test]
    fn decode_unknown_opcode_reports_word() {
        assert_eq!(
            Instruction::decode(1042),
            Err(VMError::UnknownOpcode {
                opcode: 42,
                word: 1042
            })
        );
        assert!(matches!(
            Instruction::decode(-1),
            Err(VMError::UnknownOpcode { word: -1, .. })
        ));
    }

    #[test]
    fn decode_invalid_mode_digit() {
        assert_eq!(
            Instruction::decode(301),
            Err(VMError::InvalidMode {
                digit: 3,
                param: 1,
                word: 301
            })
        );
        assert!(matches!(
            Instruction::decode(1_111_101),
            Err(VMError::InvalidMode { param: 4, .. })
        ));
    }

    #[test]
    fn display_applies_role_defaults() {
        let instr = Instruction::decode(1002).unwrap();
        assert_eq!(instr.to_string(), "MUL Position, Immediate, Immediate");
    }
}
