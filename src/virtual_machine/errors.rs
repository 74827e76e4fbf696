use intcode_derive::Error;

/// Errors raised while loading or executing an Intcode program.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VMError {
    /// A memory access computed a negative address.
    #[error("invalid address {address}")]
    InvalidAddress { address: i64 },
    /// The low two digits of an instruction word name no instruction.
    #[error("unknown opcode {opcode} in instruction word {word}")]
    UnknownOpcode { opcode: i64, word: i64 },
    /// A mode digit other than 0, 1 or 2.
    #[error("invalid mode digit {digit} for parameter {param} in instruction word {word}")]
    InvalidMode { digit: i64, param: usize, word: i64 },
    /// A write parameter resolved through position mode.
    #[error("{instruction} parameter {param} is a write target and cannot use position mode")]
    InvalidWriteMode {
        instruction: &'static str,
        param: usize,
    },
    /// The output port refused a value.
    #[error("output port rejected {value}: {reason}")]
    OutputClosed { value: i64, reason: String },
    /// The configured cycle budget ran out before the program halted.
    #[error("cycle limit of {limit} exceeded")]
    CycleLimitExceeded { limit: u64 },
    /// `run` was called on a machine that already halted.
    #[error("machine already halted")]
    AlreadyHalted,
    /// `run` was called on a machine that previously faulted.
    #[error("machine was poisoned by an earlier fault")]
    Poisoned,
    /// A program item is not a base-10 integer.
    #[error("item {index} of program text is not an integer: {item:?}")]
    ParseError { index: usize, item: String },
    /// Program text contained no items.
    #[error("program text is empty")]
    EmptyProgram,
    /// Reading the program source failed.
    #[error("io error: {0}")]
    Io(String),
}

/// A fatal [`VMError`] tagged with the program counter of the faulting instruction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("fault at pc {pc}: {source}")]
pub struct Fault {
    /// Address of the instruction word being executed.
    pub pc: i64,
    /// What went wrong.
    pub source: VMError,
}

impl Fault {
    pub fn new(pc: i64, source: VMError) -> Self {
        Self { pc, source }
    }

    /// Returns the underlying error.
    pub fn error(&self) -> &VMError {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn fault_display_includes_pc() {
        let fault = Fault::new(
            12,
            VMError::UnknownOpcode {
                opcode: 42,
                word: 1042,
            },
        );
        assert_eq!(
            fault.to_string(),
            "fault at pc 12: unknown opcode 42 in instruction word 1042"
        );
    }

    #[test]
    fn fault_source_is_vm_error() {
        let fault = Fault::new(0, VMError::InvalidAddress { address: -3 });
        let source = fault.source().expect("fault has a source");
        assert_eq!(source.to_string(), "invalid address -3");
    }

    #[test]
    fn parse_error_quotes_item() {
        let err = VMError::ParseError {
            index: 2,
            item: "x".into(),
        };
        assert_eq!(err.to_string(), "item 2 of program text is not an integer: \"x\"");
    }
}
