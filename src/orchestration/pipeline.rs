//! Linear chains and feedback loops of machines.
//!
//! Stage `i` writes into the queue stage `i + 1` reads from. The last stage
//! writes into a collector that records every value leaving the chain and, in
//! a feedback loop, forwards it to the first stage.

use crate::info;
use crate::orchestration::errors::OrchestrationError;
use crate::orchestration::machine_thread::{MachineThread, spawn};
use crate::virtual_machine::port::{self, ChannelInput, ChannelOutput, Output};
use crate::virtual_machine::program::Program;
use crate::virtual_machine::vm::{Machine, MachineConfig, Snapshot};
use tokio::sync::mpsc::unbounded_channel;

/// Outcome of a pipeline run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineReport {
    /// Final state of every stage, in stage order.
    pub snapshots: Vec<Snapshot>,
    /// Every value the last stage produced, in order.
    pub outputs: Vec<i64>,
}

impl PipelineReport {
    /// The last value that left the chain.
    pub fn last_output(&self) -> Option<i64> {
        self.outputs.last().copied()
    }
}

/// Builder for a chain of machines running the same program.
#[derive(Clone, Debug)]
pub struct Pipeline {
    program: Program,
    stages: Vec<Vec<i64>>,
    feedback: bool,
    config: MachineConfig,
}

impl Pipeline {
    pub fn new(program: &Program) -> Self {
        Self {
            program: program.clone(),
            stages: Vec::new(),
            feedback: false,
            config: MachineConfig::named("stage"),
        }
    }

    /// Appends a stage whose queue starts with `initial` (e.g. a phase setting).
    pub fn stage(mut self, initial: impl IntoIterator<Item = i64>) -> Self {
        self.stages.push(initial.into_iter().collect());
        self
    }

    /// Appends one stage per phase setting.
    pub fn phases(mut self, phases: impl IntoIterator<Item = i64>) -> Self {
        self.stages.extend(phases.into_iter().map(|phase| vec![phase]));
        self
    }

    /// Wires the last stage's output back into the first stage.
    pub fn feedback(mut self, enabled: bool) -> Self {
        self.feedback = enabled;
        self
    }

    /// Settings for every stage. Stage names get an index suffix.
    pub fn config(mut self, config: MachineConfig) -> Self {
        self.config = config;
        self
    }

    /// Runs every stage to completion with `seed` queued after the first
    /// stage's initial values.
    pub async fn run(self, seed: i64) -> Result<PipelineReport, OrchestrationError> {
        if self.stages.is_empty() {
            return Err(OrchestrationError::EmptyPipeline);
        }

        let mut senders = Vec::with_capacity(self.stages.len());
        let mut inputs = Vec::with_capacity(self.stages.len());
        for initial in &self.stages {
            let (mut tx, rx) = port::channel();
            for &value in initial {
                tx.send(value).map_err(OrchestrationError::Port)?;
            }
            senders.push(tx);
            inputs.push(rx);
        }
        senders[0].send(seed).map_err(OrchestrationError::Port)?;

        let (tail_tx, mut tail_rx) = unbounded_channel();
        let mut outputs: Vec<ChannelOutput> = senders.iter().skip(1).cloned().collect();
        outputs.push(ChannelOutput::from(tail_tx));

        let mut forward = self.feedback.then(|| senders[0].clone());
        // Stages now hold the only other senders, so a queue closes when its
        // upstream stage finishes.
        drop(senders);

        let collector = tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(value) = tail_rx.recv().await {
                seen.push(value);
                if let Some(tx) = forward.as_mut() {
                    // The first stage may already have halted.
                    let _ = tx.send(value);
                }
            }
            seen
        });

        let threads: Vec<MachineThread<ChannelInput, ChannelOutput>> = inputs
            .into_iter()
            .zip(outputs)
            .enumerate()
            .map(|(i, (input, output))| {
                let mut config = self.config.clone();
                config.name = format!("{}-{}", self.config.name, i);
                spawn(Machine::with_config(&self.program, input, output, config))
            })
            .collect();

        info!(
            "running {} stages{}",
            threads.len(),
            if self.feedback { " in a feedback loop" } else { "" }
        );

        let mut snapshots = Vec::with_capacity(threads.len());
        let mut first_error = None;
        for thread in threads {
            let name = thread.name().to_string();
            let (machine, result) = thread.join().await?;
            match result {
                Ok(_) => snapshots.extend(machine.snapshot()),
                Err(fault) => {
                    first_error.get_or_insert(OrchestrationError::MachineFault {
                        machine: name,
                        fault,
                    });
                }
            }
        }

        let outputs = collector
            .await
            .map_err(|e| OrchestrationError::Join(e.to_string()))?;

        match first_error {
            Some(err) => Err(err),
            None => Ok(PipelineReport { snapshots, outputs }),
        }
    }
}

/// Runs one machine per phase in a line and returns the last stage's final output.
pub async fn run_chain(
    program: &Program,
    phases: &[i64],
    seed: i64,
) -> Result<i64, OrchestrationError> {
    Pipeline::new(program)
        .phases(phases.iter().copied())
        .run(seed)
        .await?
        .last_output()
        .ok_or(OrchestrationError::NoOutput)
}

/// Runs one machine per phase in a loop and returns the value left circulating
/// once every machine has halted.
pub async fn run_feedback_loop(
    program: &Program,
    phases: &[i64],
    seed: i64,
) -> Result<i64, OrchestrationError> {
    Pipeline::new(program)
        .phases(phases.iter().copied())
        .feedback(true)
        .run(seed)
        .await?
        .last_output()
        .ok_or(OrchestrationError::NoOutput)
}

/// Tries every ordering of `phases` and returns the one with the highest
/// final signal.
pub async fn best_phase_order(
    program: &Program,
    phases: &[i64],
    feedback: bool,
    seed: i64,
) -> Result<(Vec<i64>, i64), OrchestrationError> {
    let mut best: Option<(Vec<i64>, i64)> = None;
    for order in permutations(phases) {
        let signal = Pipeline::new(program)
            .phases(order.iter().copied())
            .feedback(feedback)
            .run(seed)
            .await?
            .last_output()
            .ok_or(OrchestrationError::NoOutput)?;
        if best.as_ref().is_none_or(|(_, top)| signal > *top) {
            best = Some((order, signal));
        }
    }
    best.ok_or(OrchestrationError::EmptyPipeline)
}

/// Every ordering of `items`, generated with Heap's algorithm.
fn permutations(items: &[i64]) -> Vec<Vec<i64>> {
    let mut items = items.to_vec();
    let mut result = vec![items.clone()];
    let mut counters = vec![0; items.len()];
    let mut i = 1;
    while i < items.len() {
        if counters[i] < i {
            let j = if i % 2 == 0 { 0 } else { counters[i] };
            items.swap(j, i);
            result.push(items.clone());
            counters[i] += 1;
            i = 1;
        } else {
            counters[i] = 0;
            i += 1;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{AMPLIFIER, COUNTER, FEEDBACK_AMPLIFIER, program};
    use crate::virtual_machine::errors::VMError;
    use crate::virtual_machine::port::FnOutput;
    use crate::virtual_machine::vm::Exit;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn amplifier_chain() {
        let signal = run_chain(&program(AMPLIFIER), &[4, 3, 2, 1, 0], 0)
            .await
            .unwrap();
        assert_eq!(signal, 43210);
    }

    #[tokio::test]
    async fn amplifier_feedback_loop() {
        let signal = run_feedback_loop(&program(FEEDBACK_AMPLIFIER), &[9, 8, 7, 6, 5], 0)
            .await
            .unwrap();
        assert_eq!(signal, 139629729);
    }

    #[tokio::test]
    async fn best_order_for_chain() {
        let (order, signal) = best_phase_order(&program(AMPLIFIER), &[0, 1, 2, 3, 4], false, 0)
            .await
            .unwrap();
        assert_eq!(order, vec![4, 3, 2, 1, 0]);
        assert_eq!(signal, 43210);
    }

    #[tokio::test]
    async fn two_machine_loop_report() {
        let report = Pipeline::new(&program(COUNTER))
            .stage([])
            .stage([])
            .feedback(true)
            .run(0)
            .await
            .unwrap();
        assert_eq!(report.outputs, vec![2, 4, 6]);
        assert_eq!(report.last_output(), Some(6));
        assert_eq!(report.snapshots.len(), 2);
        assert!(report.snapshots.iter().all(|s| s.exit == Exit::Halted));
    }

    #[tokio::test]
    async fn two_machine_loop_delivers_in_order() {
        // Both machines log every value they send before passing it on.
        let log = Arc::new(Mutex::new(Vec::new()));
        let counter = program(COUNTER);
        let (to_a, a_input) = port::channel();
        let (to_b, b_input) = port::channel();

        let tap = |log: Arc<Mutex<Vec<i64>>>, mut next: ChannelOutput| {
            FnOutput::new(move |value| {
                log.lock().unwrap().push(value);
                next.send(value)
            })
        };

        let mut seed = to_a.clone();
        seed.send(0).unwrap();
        drop(seed);

        let a = spawn(Machine::new(&counter, a_input, tap(log.clone(), to_b)));
        let b = spawn(Machine::new(&counter, b_input, tap(log.clone(), to_a)));

        // Keep A, and with it A's queue, alive until B has sent its last value.
        let (_a, a_exit) = a.finish().await.unwrap();
        let (_b, b_exit) = b.finish().await.unwrap();
        assert_eq!(a_exit, Exit::Halted);
        assert_eq!(b_exit, Exit::Halted);
        assert_eq!(*log.lock().unwrap(), vec![1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn fault_in_one_stage_is_reported() {
        // Stage 0 reads its phase and faults on the next word.
        let report = Pipeline::new(&program("3,0,42"))
            .phases([1, 2])
            .run(0)
            .await;
        let err = report.unwrap_err();
        assert!(matches!(
            err,
            OrchestrationError::MachineFault { ref machine, ref fault }
                if machine == "stage-0" && matches!(fault.source, VMError::UnknownOpcode { .. })
        ));
    }

    #[tokio::test]
    async fn empty_pipeline_is_rejected() {
        let result = Pipeline::new(&program(AMPLIFIER)).run(0).await;
        assert_eq!(result, Err(OrchestrationError::EmptyPipeline));
    }

    #[test]
    fn permutations_are_complete_and_distinct() {
        let all = permutations(&[0, 1, 2, 3]);
        assert_eq!(all.len(), 24);
        let distinct: HashSet<_> = all.into_iter().collect();
        assert_eq!(distinct.len(), 24);
        assert_eq!(permutations(&[]), vec![Vec::<i64>::new()]);
    }
}
