//! Intcode program text and its loaded form.
//!
//! A program is a comma-separated list of base-10 signed integers. Whitespace
//! around the whole text and around each item is ignored, and a single
//! trailing comma is tolerated so files ending in `,\n` load cleanly.

use crate::virtual_machine::errors::VMError;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// Immutable program image.
///
/// Cloning is cheap: every clone shares the same backing slice, so one loaded
/// program can seed any number of machines.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Program {
    words: Arc<[i64]>,
}

impl Program {
    /// Wraps an already parsed image.
    pub fn new(words: impl Into<Arc<[i64]>>) -> Self {
        Self {
            words: words.into(),
        }
    }

    /// Reads and parses the program text at `path`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, VMError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| VMError::Io(format!("{}: {}", path.display(), e)))?;
        text.parse()
    }

    /// Returns a copy with the given `(address, value)` cells overwritten.
    ///
    /// Addresses past the end of the image extend it with zeros.
    pub fn patched(&self, cells: &[(usize, i64)]) -> Self {
        let mut words = self.words.to_vec();
        for &(address, value) in cells {
            if address >= words.len() {
                words.resize(address + 1, 0);
            }
            words[address] = value;
        }
        Self::new(words)
    }

    pub fn words(&self) -> &[i64] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl FromStr for Program {
    type Err = VMError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.trim();
        let text = text.strip_suffix(',').unwrap_or(text);
        if text.trim().is_empty() {
            return Err(VMError::EmptyProgram);
        }

        let words = text
            .split(',')
            .enumerate()
            .map(|(index, item)| {
                let item = item.trim();
                item.parse::<i64>().map_err(|_| VMError::ParseError {
                    index,
                    item: item.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(words))
    }
}

impl From<Vec<i64>> for Program {
    fn from(words: Vec<i64>) -> Self {
        Self::new(words)
    }
}

impl From<&[i64]> for Program {
    fn from(words: &[i64]) -> Self {
        Self::new(words)
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, word) in self.words.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", word)?;
        }
        Ok(())
    }
}
