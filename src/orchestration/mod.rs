//! Wiring several machines together.
//!
//! Each machine runs on its own blocking thread; the orchestrators here are
//! async and run on a tokio runtime. Machines only talk through their ports.
//!
//! # Modules
//!
//! - [`machine_thread`]: Running one machine on the blocking pool
//! - [`pipeline`]: Chains and feedback loops of machines
//! - [`network`]: Packet-switched networks with a NAT and idle detection
//! - [`session`]: Scripting an interactive ASCII program
//! - [`errors`]: Orchestration error type

pub mod errors;
pub mod machine_thread;
pub mod network;
pub mod pipeline;
pub mod session;

pub use errors::OrchestrationError;
pub use machine_thread::{MachineThread, spawn};
