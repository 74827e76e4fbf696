//! Input and output ports.
//!
//! A machine talks to the world one integer at a time: opcode 3 pulls from
//! its [`Input`], opcode 4 pushes to its [`Output`]. Ports decide what that
//! means: another machine's queue, a fixed script, a terminal, or a closure
//! with puzzle logic behind it.

use crate::virtual_machine::ascii;
use intcode_derive::Error;
use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Stdin, Stdout, Write};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

/// Result of asking an input port for a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Receive {
    /// The next value, consumed.
    Value(i64),
    /// A non-blocking port had nothing queued. Not an error.
    NoData,
    /// No value will ever arrive.
    Closed,
}

/// Reasons an output port refuses a value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PortError {
    #[error("port closed")]
    Closed,
    #[error("{0}")]
    Rejected(String),
}

/// Source of values for opcode 3.
pub trait Input: Send {
    /// Returns the next value, blocking if the port blocks.
    fn receive(&mut self) -> Receive;
}

/// Sink for values from opcode 4.
pub trait Output: Send {
    fn send(&mut self, value: i64) -> Result<(), PortError>;

    /// Signals that no further values will be sent.
    fn close(&mut self) {}
}

impl<T: Input + ?Sized> Input for &mut T {
    fn receive(&mut self) -> Receive {
        (**self).receive()
    }
}

impl<T: Input + ?Sized> Input for Box<T> {
    fn receive(&mut self) -> Receive {
        (**self).receive()
    }
}

impl<T: Output + ?Sized> Output for &mut T {
    fn send(&mut self, value: i64) -> Result<(), PortError> {
        (**self).send(value)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

impl<T: Output + ?Sized> Output for Box<T> {
    fn send(&mut self, value: i64) -> Result<(), PortError> {
        (**self).send(value)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Creates a connected pair of queue ports.
///
/// Values sent on the [`ChannelOutput`] are received in order by the
/// [`ChannelInput`]. The queue is unbounded so sending never blocks.
pub fn channel() -> (ChannelOutput, ChannelInput) {
    let (tx, rx) = unbounded_channel();
    (ChannelOutput::from(tx), ChannelInput::from(rx))
}

/// Receiving end of a machine queue.
///
/// `receive` blocks the calling thread, so it must run on a blocking thread
/// rather than inside an async task.
#[derive(Debug)]
pub struct ChannelInput {
    rx: UnboundedReceiver<i64>,
}

impl From<UnboundedReceiver<i64>> for ChannelInput {
    fn from(rx: UnboundedReceiver<i64>) -> Self {
        Self { rx }
    }
}

impl ChannelInput {
    /// Takes a value if one is queued, without blocking.
    pub fn try_receive(&mut self) -> Receive {
        use tokio::sync::mpsc::error::TryRecvError;
        match self.rx.try_recv() {
            Ok(value) => Receive::Value(value),
            Err(TryRecvError::Empty) => Receive::NoData,
            Err(TryRecvError::Disconnected) => Receive::Closed,
        }
    }

    /// Drains every value currently queued.
    pub fn drain(&mut self) -> Vec<i64> {
        let mut values = Vec::new();
        while let Ok(value) = self.rx.try_recv() {
            values.push(value);
        }
        values
    }
}

impl Input for ChannelInput {
    fn receive(&mut self) -> Receive {
        match self.rx.blocking_recv() {
            Some(value) => Receive::Value(value),
            None => Receive::Closed,
        }
    }
}

/// Sending end of a machine queue. Clones feed the same queue.
#[derive(Clone, Debug)]
pub struct ChannelOutput {
    tx: Option<UnboundedSender<i64>>,
}

impl From<UnboundedSender<i64>> for ChannelOutput {
    fn from(tx: UnboundedSender<i64>) -> Self {
        Self { tx: Some(tx) }
    }
}

impl ChannelOutput {
    pub fn is_closed(&self) -> bool {
        self.tx.as_ref().is_none_or(|tx| tx.is_closed())
    }
}

impl Output for ChannelOutput {
    fn send(&mut self, value: i64) -> Result<(), PortError> {
        match &self.tx {
            Some(tx) => tx.send(value).map_err(|_| PortError::Closed),
            None => Err(PortError::Closed),
        }
    }

    /// Drops this handle's sender. The receiver sees `Closed` once every
    /// other clone is gone too.
    fn close(&mut self) {
        self.tx = None;
    }
}

/// Feeds a fixed sequence, then reports `Closed`.
#[derive(Clone, Debug, Default)]
pub struct ScriptedInput {
    values: VecDeque<i64>,
}

impl ScriptedInput {
    pub fn new(values: impl IntoIterator<Item = i64>) -> Self {
        Self {
            values: values.into_iter().collect(),
        }
    }

    /// Queues one more value, e.g. before resuming a machine that ran dry.
    pub fn push(&mut self, value: i64) {
        self.values.push_back(value);
    }

    pub fn extend(&mut self, values: impl IntoIterator<Item = i64>) {
        self.values.extend(values);
    }

    /// Values not yet consumed.
    pub fn remaining(&self) -> usize {
        self.values.len()
    }
}

impl Input for ScriptedInput {
    fn receive(&mut self) -> Receive {
        match self.values.pop_front() {
            Some(value) => Receive::Value(value),
            None => Receive::Closed,
        }
    }
}

/// Records every value sent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CollectOutput {
    values: Vec<i64>,
}

impl CollectOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn values(&self) -> &[i64] {
        &self.values
    }

    /// Returns the values collected so far and starts over.
    pub fn take(&mut self) -> Vec<i64> {
        std::mem::take(&mut self.values)
    }

    pub fn into_values(self) -> Vec<i64> {
        self.values
    }
}

impl Output for CollectOutput {
    fn send(&mut self, value: i64) -> Result<(), PortError> {
        self.values.push(value);
        Ok(())
    }
}

/// Input backed by a closure.
pub struct FnInput<F> {
    f: F,
}

impl<F: FnMut() -> Receive + Send> FnInput<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F: FnMut() -> Receive + Send> Input for FnInput<F> {
    fn receive(&mut self) -> Receive {
        (self.f)()
    }
}

/// Output backed by a closure.
pub struct FnOutput<F> {
    f: F,
}

impl<F: FnMut(i64) -> Result<(), PortError> + Send> FnOutput<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F: FnMut(i64) -> Result<(), PortError> + Send> Output for FnOutput<F> {
    fn send(&mut self, value: i64) -> Result<(), PortError> {
        (self.f)(value)
    }
}

/// Always closed. For programs that never read.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullInput;

impl Input for NullInput {
    fn receive(&mut self) -> Receive {
        Receive::Closed
    }
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullOutput;

impl Output for NullOutput {
    fn send(&mut self, _value: i64) -> Result<(), PortError> {
        Ok(())
    }
}

/// How a terminal port maps between text and integers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminalMode {
    /// One integer per line.
    Numeric,
    /// One character per value; input lines end with a newline value.
    Ascii,
}

/// Interactive input read line by line from `reader`.
///
/// In numeric mode a prompt is written to `prompt` before each read and a line
/// that is not an integer is reported and asked again. In ASCII mode a whole
/// line is buffered and handed out one character at a time.
pub struct TerminalInput<R, W> {
    reader: R,
    prompt: W,
    mode: TerminalMode,
    pending: VecDeque<i64>,
}

impl TerminalInput<BufReader<Stdin>, Stdout> {
    /// Reads standard input, prompting on standard output.
    pub fn stdio(mode: TerminalMode) -> Self {
        Self::new(BufReader::new(io::stdin()), io::stdout(), mode)
    }
}

impl<R: BufRead + Send, W: Write + Send> TerminalInput<R, W> {
    pub fn new(reader: R, prompt: W, mode: TerminalMode) -> Self {
        Self {
            reader,
            prompt,
            mode,
            pending: VecDeque::new(),
        }
    }

    fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
        }
    }
}

impl<R: BufRead + Send, W: Write + Send> Input for TerminalInput<R, W> {
    fn receive(&mut self) -> Receive {
        if let Some(value) = self.pending.pop_front() {
            return Receive::Value(value);
        }

        loop {
            if self.mode == TerminalMode::Numeric {
                let _ = write!(self.prompt, "> ");
                let _ = self.prompt.flush();
            }

            let Some(line) = self.read_line() else {
                return Receive::Closed;
            };

            match self.mode {
                TerminalMode::Ascii => {
                    self.pending.extend(ascii::encode_line(&line));
                    if let Some(value) = self.pending.pop_front() {
                        return Receive::Value(value);
                    }
                }
                TerminalMode::Numeric => match line.trim().parse::<i64>() {
                    Ok(value) => return Receive::Value(value),
                    Err(_) => {
                        let _ = writeln!(self.prompt, "not an integer: {:?}", line.trim());
                    }
                },
            }
        }
    }
}

/// Writes values to `writer` as text.
///
/// ASCII mode prints values in `0..128` as characters and anything else as a
/// number on its own line.
pub struct TerminalOutput<W> {
    writer: W,
    mode: TerminalMode,
}

impl TerminalOutput<Stdout> {
    pub fn stdout(mode: TerminalMode) -> Self {
        Self::new(io::stdout(), mode)
    }
}

impl<W: Write + Send> TerminalOutput<W> {
    pub fn new(writer: W, mode: TerminalMode) -> Self {
        Self { writer, mode }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> Output for TerminalOutput<W> {
    fn send(&mut self, value: i64) -> Result<(), PortError> {
        let result = match (self.mode, ascii::to_char(value)) {
            (TerminalMode::Ascii, Some(c)) => write!(self.writer, "{}", c),
            _ => writeln!(self.writer, "{}", value),
        };
        result
            .and_then(|_| self.writer.flush())
            .map_err(|e| PortError::Rejected(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_input_drains_then_closes() {
        let mut input = ScriptedInput::new([4, 5]);
        assert_eq!(input.receive(), Receive::Value(4));
        input.push(6);
        assert_eq!(input.receive(), Receive::Value(5));
        assert_eq!(input.receive(), Receive::Value(6));
        assert_eq!(input.receive(), Receive::Closed);
        assert_eq!(input.remaining(), 0);
    }

    #[test]
    fn channel_is_fifo_and_closes_with_senders() {
        let (mut tx, mut rx) = channel();
        let mut second = tx.clone();
        tx.send(1).unwrap();
        second.send(2).unwrap();
        tx.send(3).unwrap();
        assert_eq!(rx.receive(), Receive::Value(1));
        assert_eq!(rx.receive(), Receive::Value(2));

        tx.close();
        assert_eq!(tx.send(9), Err(PortError::Closed));
        assert_eq!(rx.try_receive(), Receive::Value(3));
        assert_eq!(rx.try_receive(), Receive::NoData);

        drop(second);
        assert_eq!(rx.receive(), Receive::Closed);
    }

    #[test]
    fn channel_send_fails_once_receiver_is_gone() {
        let (mut tx, rx) = channel();
        drop(rx);
        assert!(tx.is_closed());
        assert_eq!(tx.send(1), Err(PortError::Closed));
    }

    #[test]
    fn blanket_impls_forward() {
        let mut collect = CollectOutput::new();
        {
            let mut boxed: Box<dyn Output + '_> = Box::new(&mut collect);
            boxed.send(3).unwrap();
        }
        assert_eq!(collect.values(), &[3]);

        let mut scripted = ScriptedInput::new([8]);
        let mut by_ref: &mut ScriptedInput = &mut scripted;
        assert_eq!(Input::receive(&mut by_ref), Receive::Value(8));
    }

    #[test]
    fn closures_as_ports() {
        let mut n = 0;
        let mut input = FnInput::new(move || {
            n += 1;
            if n > 2 { Receive::NoData } else { Receive::Value(n) }
        });
        assert_eq!(input.receive(), Receive::Value(1));
        assert_eq!(input.receive(), Receive::Value(2));
        assert_eq!(input.receive(), Receive::NoData);

        let mut output = FnOutput::new(|value| {
            if value < 0 {
                Err(PortError::Rejected("negative".into()))
            } else {
                Ok(())
            }
        });
        assert!(output.send(1).is_ok());
        assert_eq!(output.send(-1), Err(PortError::Rejected("negative".into())));
    }

    #[test]
    fn terminal_numeric_reprompts_on_garbage() {
        let mut prompt = Vec::new();
        let mut input = TerminalInput::new(&b"abc\n 42 \n"[..], &mut prompt, TerminalMode::Numeric);
        assert_eq!(input.receive(), Receive::Value(42));
        assert_eq!(input.receive(), Receive::Closed);
        drop(input);
        let prompt = String::from_utf8(prompt).unwrap();
        assert!(prompt.contains("not an integer: \"abc\""));
        assert_eq!(prompt.matches("> ").count(), 3);
    }

    #[test]
    fn terminal_ascii_feeds_line_with_newline() {
        let mut input = TerminalInput::new(&b"NOT\n"[..], io::sink(), TerminalMode::Ascii);
        let mut values = Vec::new();
        while let Receive::Value(v) = input.receive() {
            values.push(v);
        }
        assert_eq!(values, vec![78, 79, 84, 10]);
    }

    #[test]
    fn terminal_output_modes() {
        let mut out = TerminalOutput::new(Vec::new(), TerminalMode::Ascii);
        for value in [72, 105, 10, 19_349_722] {
            out.send(value).unwrap();
        }
        assert_eq!(String::from_utf8(out.into_inner()).unwrap(), "Hi\n19349722\n");

        let mut out = TerminalOutput::new(Vec::new(), TerminalMode::Numeric);
        out.send(72).unwrap();
        assert_eq!(String::from_utf8(out.into_inner()).unwrap(), "72\n");
    }

    #[test]
    fn null_ports() {
        assert_eq!(NullInput.receive(), Receive::Closed);
        assert!(NullOutput.send(1).is_ok());
    }
}
