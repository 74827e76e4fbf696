//! Intcode library.
//!
//! Provides the Intcode virtual machine, its I/O ports, and orchestrators that
//! run many machines together.

pub mod orchestration;
pub mod utils;
pub mod virtual_machine;

#[cfg(test)]
mod test_utils;
