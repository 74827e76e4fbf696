//! Driving an interactive ASCII program from async code.
//!
//! A [`Session`] runs one machine on queue ports. The caller types lines into
//! it and reads its output back as text, the way a droid or springscript
//! controller is scripted.

use crate::orchestration::errors::OrchestrationError;
use crate::orchestration::machine_thread::{MachineThread, spawn};
use crate::virtual_machine::ascii;
use crate::virtual_machine::port::{self, ChannelInput, ChannelOutput, Output};
use crate::virtual_machine::program::Program;
use crate::virtual_machine::vm::{Exit, Machine, MachineConfig, Snapshot};
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

/// How a session ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionReport {
    pub exit: Exit,
    /// Output nobody read before the session finished.
    pub unread: Vec<i64>,
    pub snapshot: Option<Snapshot>,
}

/// A running machine with a keyboard and a screen.
pub struct Session {
    keyboard: ChannelOutput,
    screen: UnboundedReceiver<i64>,
    thread: MachineThread<ChannelInput, ChannelOutput>,
    /// Non-ASCII values seen while reading text.
    values: Vec<i64>,
    /// Text read so far that has not yet reached a marker. Survives a timeout.
    pending: String,
    timeout: Option<Duration>,
}

impl Session {
    /// Starts `program` on its own thread. Must be called within a tokio runtime.
    pub fn start(program: &Program, config: MachineConfig) -> Self {
        let (keyboard, input) = port::channel();
        let (screen_tx, screen) = unbounded_channel();
        let machine = Machine::with_config(program, input, ChannelOutput::from(screen_tx), config);
        Self {
            keyboard,
            screen,
            thread: spawn(machine),
            values: Vec::new(),
            pending: String::new(),
            timeout: None,
        }
    }

    /// Bounds how long [`read_until`](Self::read_until) waits.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Queues one raw value.
    pub fn send(&mut self, value: i64) -> Result<(), OrchestrationError> {
        self.keyboard
            .send(value)
            .map_err(|_| OrchestrationError::SessionClosed)
    }

    /// Types `line` followed by a newline.
    pub fn send_line(&mut self, line: &str) -> Result<(), OrchestrationError> {
        ascii::encode_line(line)
            .into_iter()
            .try_for_each(|value| self.send(value))
    }

    /// Reads output until the text read so far ends with `marker`.
    ///
    /// Values outside the ASCII range are not part of the text; they are kept
    /// and returned by [`values`](Self::values). Text read before a timeout is
    /// kept and returned by the next call.
    pub async fn read_until(&mut self, marker: &str) -> Result<String, OrchestrationError> {
        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.read_text(marker))
                .await
                .map_err(|_| OrchestrationError::Timeout(timeout))?,
            None => self.read_text(marker).await,
        }
    }

    async fn read_text(&mut self, marker: &str) -> Result<String, OrchestrationError> {
        while !self.pending.ends_with(marker) {
            let value = self
                .screen
                .recv()
                .await
                .ok_or(OrchestrationError::SessionClosed)?;
            match ascii::to_char(value) {
                Some(c) => self.pending.push(c),
                None => self.values.push(value),
            }
        }
        Ok(std::mem::take(&mut self.pending))
    }

    /// Takes whatever output is queued right now, without waiting, including
    /// text a timed-out [`read_until`](Self::read_until) left behind.
    pub fn read_available(&mut self) -> Vec<i64> {
        let mut values: Vec<i64> = self.pending.drain(..).map(|c| c as i64).collect();
        while let Ok(value) = self.screen.try_recv() {
            values.push(value);
        }
        values
    }

    /// Non-ASCII values seen by [`read_until`](Self::read_until).
    pub fn values(&self) -> &[i64] {
        &self.values
    }

    /// Closes the keyboard and waits for the machine to stop.
    pub async fn finish(mut self) -> Result<SessionReport, OrchestrationError> {
        self.keyboard.close();
        let (machine, exit) = self.thread.finish().await?;
        let mut unread: Vec<i64> = self.pending.chars().map(|c| c as i64).collect();
        while let Some(value) = self.screen.recv().await {
            unread.push(value);
        }
        Ok(SessionReport {
            exit,
            unread,
            snapshot: machine.snapshot(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ECHO, program};
    use crate::virtual_machine::errors::VMError;

    #[tokio::test]
    async fn echoes_lines() {
        let mut session = Session::start(&program(ECHO), MachineConfig::named("echo"))
            .timeout(Duration::from_secs(5));
        session.send_line("hello").unwrap();
        assert_eq!(session.read_until("\n").await.unwrap(), "hello\n");

        session.send_line("again").unwrap();
        assert_eq!(session.read_until("ain\n").await.unwrap(), "again\n");

        let report = session.finish().await.unwrap();
        assert_eq!(report.exit, Exit::AwaitingInput);
        assert!(report.unread.is_empty());
        assert!(report.snapshot.is_some());
    }

    #[tokio::test]
    async fn timed_out_read_keeps_partial_text() {
        let mut session = Session::start(&program(ECHO), MachineConfig::named("echo"))
            .timeout(Duration::from_millis(100));
        session.send(b'a' as i64).unwrap();
        session.send(b'b' as i64).unwrap();
        assert_eq!(
            session.read_until("\n").await,
            Err(OrchestrationError::Timeout(Duration::from_millis(100)))
        );

        session.send_line("c").unwrap();
        let mut session = session.timeout(Duration::from_secs(5));
        assert_eq!(session.read_until("\n").await.unwrap(), "abc\n");
        session.finish().await.unwrap();
    }

    #[tokio::test]
    async fn timed_out_text_is_reported_unread() {
        let mut session = Session::start(&program(ECHO), MachineConfig::default())
            .timeout(Duration::from_millis(100));
        session.send(b'h' as i64).unwrap();
        assert!(session.read_until(">").await.is_err());
        let report = session.finish().await.unwrap();
        assert_eq!(report.unread, vec![b'h' as i64]);
    }

    #[tokio::test]
    async fn keeps_non_ascii_values_aside() {
        let mut session = Session::start(&program(ECHO), MachineConfig::default());
        session.send(500).unwrap();
        session.send_line("ok").unwrap();
        assert_eq!(session.read_until("ok\n").await.unwrap(), "ok\n");
        assert_eq!(session.values(), &[500]);
        session.finish().await.unwrap();
    }

    #[tokio::test]
    async fn finish_returns_unread_output() {
        let session = Session::start(&program("104,72,104,105,99"), MachineConfig::default());
        let report = session.finish().await.unwrap();
        assert_eq!(report.exit, Exit::Halted);
        assert_eq!(report.unread, vec![72, 105]);
    }

    #[tokio::test]
    async fn reading_from_stopped_machine_fails() {
        let mut session = Session::start(&program("99"), MachineConfig::default());
        assert_eq!(
            session.read_until(">").await,
            Err(OrchestrationError::SessionClosed)
        );
        session.finish().await.unwrap();
    }

    #[tokio::test]
    async fn fault_surfaces_on_finish() {
        let mut session = Session::start(&program("3,0,4,0,42"), MachineConfig::named("bad"));
        session.send(1).unwrap();
        let err = session.finish().await.unwrap_err();
        assert!(matches!(
            err,
            OrchestrationError::MachineFault { ref fault, .. }
                if matches!(fault.source, VMError::UnknownOpcode { opcode: 42, .. })
        ));
    }
}
