//! Running a machine on its own blocking thread.

use crate::debug;
use crate::orchestration::errors::OrchestrationError;
use crate::virtual_machine::errors::Fault;
use crate::virtual_machine::port::{Input, Output};
use crate::virtual_machine::vm::{Exit, Machine};
use tokio::task::JoinHandle;

/// What a machine thread hands back: the machine, ports included, and how
/// its run ended.
pub type Finished<I, O> = (Machine<I, O>, Result<Exit, Fault>);

/// Handle to a machine running on the blocking thread pool.
pub struct MachineThread<I, O> {
    name: String,
    handle: JoinHandle<Finished<I, O>>,
}

/// Starts `machine` on a blocking thread.
///
/// Once the run ends, successfully or not, the machine's output is closed so
/// whoever reads it sees the end of the stream instead of waiting forever.
/// Must be called from within a tokio runtime.
pub fn spawn<I, O>(mut machine: Machine<I, O>) -> MachineThread<I, O>
where
    I: Input + 'static,
    O: Output + 'static,
{
    let name = machine.name().to_string();
    debug!("starting {}", name);
    let handle = tokio::task::spawn_blocking(move || {
        let result = machine.run();
        machine.close_output();
        (machine, result)
    });
    MachineThread { name, handle }
}

impl<I, O> MachineThread<I, O> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the run has ended.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the run to end and returns the machine with its result.
    pub async fn join(self) -> Result<Finished<I, O>, OrchestrationError> {
        let name = self.name;
        self.handle
            .await
            .map_err(|e| OrchestrationError::Join(format!("{}: {}", name, e)))
    }

    /// Like [`join`](Self::join), but a fault becomes an error.
    pub async fn finish(self) -> Result<(Machine<I, O>, Exit), OrchestrationError> {
        let name = self.name.clone();
        let (machine, result) = self.join().await?;
        match result {
            Ok(exit) => Ok((machine, exit)),
            Err(fault) => Err(OrchestrationError::MachineFault {
                machine: name,
                fault,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::virtual_machine::errors::VMError;
    use crate::virtual_machine::port::{self, CollectOutput, Receive, ScriptedInput};
    use crate::virtual_machine::vm::MachineConfig;

    #[tokio::test]
    async fn join_returns_machine_and_ports() {
        let program = "3,0,4,0,99".parse().unwrap();
        let machine = Machine::new(&program, ScriptedInput::new([5]), CollectOutput::new());
        let (machine, result) = spawn(machine).join().await.unwrap();
        assert_eq!(result, Ok(Exit::Halted));
        assert_eq!(machine.output().values(), &[5]);
    }

    #[tokio::test]
    async fn output_is_closed_after_run() {
        let program = "104,1,104,2,99".parse().unwrap();
        let (tx, mut rx) = port::channel();
        let machine = Machine::new(&program, ScriptedInput::default(), tx);
        spawn(machine).finish().await.unwrap();

        assert_eq!(rx.drain(), vec![1, 2]);
        assert_eq!(rx.try_receive(), Receive::Closed);
    }

    #[tokio::test]
    async fn fault_is_reported_with_machine_name() {
        let program = "42".parse().unwrap();
        let machine = Machine::with_config(
            &program,
            ScriptedInput::default(),
            CollectOutput::new(),
            MachineConfig::named("broken"),
        );
        let err = spawn(machine).finish().await.err().unwrap();
        assert!(matches!(
            err,
            OrchestrationError::MachineFault { ref machine, ref fault }
                if machine == "broken" && matches!(fault.source, VMError::UnknownOpcode { opcode: 42, .. })
        ));
    }
}
