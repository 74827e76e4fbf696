use crate::virtual_machine::errors::Fault;
use crate::virtual_machine::port::PortError;
use intcode_derive::Error;
use std::time::Duration;

/// Errors raised while wiring and running several machines together.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrchestrationError {
    /// One machine faulted. Its siblings were stopped or ran to completion.
    #[error("{machine} faulted: {fault}")]
    MachineFault {
        machine: String,
        #[source]
        fault: Fault,
    },
    /// A machine thread panicked or was cancelled.
    #[error("machine thread failed: {0}")]
    Join(String),
    #[error("pipeline has no stages")]
    EmptyPipeline,
    #[error("network has no machines")]
    EmptyNetwork,
    /// Every machine stopped before producing a result.
    #[error("pipeline produced no output")]
    NoOutput,
    /// The machines went quiet with nothing left to deliver.
    #[error("{machine} stalled with no pending input")]
    Stalled { machine: String },
    #[error("no result after {0:?}")]
    Timeout(Duration),
    /// The machine behind a session stopped reading or writing.
    #[error("session closed")]
    SessionClosed,
    /// Seeding a queue failed.
    #[error("port error: {0}")]
    Port(#[source] PortError),
}

impl OrchestrationError {
    /// The fault behind a [`OrchestrationError::MachineFault`].
    pub fn fault(&self) -> Option<&Fault> {
        match self {
            OrchestrationError::MachineFault { fault, .. } => Some(fault),
            _ => None,
        }
    }
}
