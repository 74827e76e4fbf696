use std::time::Duration;

/// Value opcode 3 stores when a non-blocking input reports no data.
pub const DEFAULT_NO_DATA_VALUE: i64 = -1;

/// Per-machine execution settings.
///
/// The defaults run a program as fast as possible with no cycle budget.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MachineConfig {
    /// Name used to tag log lines.
    pub name: String,
    /// Pause after every executed instruction.
    pub clock_delay: Option<Duration>,
    /// Fault with `CycleLimitExceeded` once this many instructions have run.
    pub cycle_limit: Option<u64>,
    /// Value stored by opcode 3 when the input reports `NoData`.
    pub no_data_value: i64,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            name: "intcode".to_string(),
            clock_delay: None,
            cycle_limit: None,
            no_data_value: DEFAULT_NO_DATA_VALUE,
        }
    }
}

impl MachineConfig {
    /// Default settings with a custom log name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_cycle_limit(mut self, limit: u64) -> Self {
        self.cycle_limit = Some(limit);
        self
    }

    pub fn with_clock_delay(mut self, delay: Duration) -> Self {
        self.clock_delay = Some(delay);
        self
    }
}
