//! Core Intcode execution engine.
//!
//! A [`Machine`] owns its memory, program counter and relative base, plus one
//! input and one output port. Each cycle decodes the word at the program
//! counter, resolves the parameters through their modes and applies the
//! opcode. All arithmetic wraps on overflow.

mod config;
mod memory;

pub use config::{DEFAULT_NO_DATA_VALUE, MachineConfig};
pub use memory::Memory;

use crate::virtual_machine::errors::{Fault, VMError};
use crate::virtual_machine::isa::{Instruction, Opcode};
use crate::virtual_machine::operand::Operand;
use crate::virtual_machine::port::{Input, NullInput, NullOutput, Output, Receive};
use crate::virtual_machine::program::Program;
use crate::{debug, error};

/// Lifecycle of a machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MachineState {
    /// Ready to execute the instruction at the program counter.
    Running,
    /// Stopped on an input instruction whose port was closed. Resumable.
    AwaitingInput,
    /// Executed opcode 99. Terminal.
    Halted,
    /// Stopped by a fault. Terminal.
    Faulted,
}

/// Why [`Machine::run`] returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Exit {
    Halted,
    /// The input port reported `Closed`. The program counter still points at
    /// the input instruction, so `run` resumes there once input is available.
    AwaitingInput,
}

impl From<Exit> for MachineState {
    fn from(exit: Exit) -> Self {
        match exit {
            Exit::Halted => MachineState::Halted,
            Exit::AwaitingInput => MachineState::AwaitingInput,
        }
    }
}

/// Final state of a machine that ran to completion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub exit: Exit,
    /// Dense memory image, at least as long as the program.
    pub memory: Vec<i64>,
    pub pc: i64,
    pub relative_base: i64,
    pub cycles: u64,
}

/// One executed instruction, handed to the trace hook.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CycleTrace {
    /// Address the instruction was fetched from.
    pub pc: i64,
    pub instruction: Instruction,
    /// Relative base after the instruction ran.
    pub relative_base: i64,
    /// Number of instructions executed so far, this one included.
    pub cycle: u64,
}

type TraceHook = Box<dyn FnMut(&CycleTrace) + Send>;

/// What the program counter does after an instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Flow {
    Next,
    Jump(i64),
    Exit(Exit),
}

macro_rules! exec_vm {
    // Entry point
    (
        vm = $vm:ident,
        instr = $instr:ident,
        { $( $variant:ident => $handler:ident ( $( $field:ident : $kind:ident @ $param:literal ),* $(,)? ) ),* $(,)? }
    ) => {{
        match $instr.opcode() {
            $(
                Opcode::$variant => {
                    $( let $field = exec_vm!(@operand $vm, $instr, $param, $kind)?; )*
                    $vm.$handler($( $field ),*)
                }
            ),*
        }
    }};

    // Value of a read parameter
    (@operand $vm:ident, $instr:ident, $param:literal, Read) => {{
        $vm.read_param(&$instr, $param)
    }};

    // Address of a write parameter
    (@operand $vm:ident, $instr:ident, $param:literal, Write) => {{
        $vm.target_param(&$instr, $param)
    }};
}

/// Intcode machine.
///
/// Generic over its ports so wiring stays static where possible; use
/// `Box<dyn Input>`/`Box<dyn Output>` when the port is chosen at runtime.
pub struct Machine<I, O> {
    memory: Memory,
    pc: i64,
    relative_base: i64,
    cycles: u64,
    state: MachineState,
    input: I,
    output: O,
    config: MachineConfig,
    hook: Option<TraceHook>,
}

impl Machine<NullInput, NullOutput> {
    /// A machine with no I/O, for programs that only compute in memory.
    pub fn headless(program: &Program) -> Self {
        Self::new(program, NullInput, NullOutput)
    }
}

impl<I: Input, O: Output> Machine<I, O> {
    /// Creates a machine with `program` loaded at address 0.
    pub fn new(program: &Program, input: I, output: O) -> Self {
        Self::with_config(program, input, output, MachineConfig::default())
    }

    pub fn with_config(program: &Program, input: I, output: O, config: MachineConfig) -> Self {
        Self {
            memory: Memory::new(program.words()),
            pc: 0,
            relative_base: 0,
            cycles: 0,
            state: MachineState::Running,
            input,
            output,
            config,
            hook: None,
        }
    }

    /// Installs a callback invoked after every executed instruction.
    pub fn with_hook(mut self, hook: impl FnMut(&CycleTrace) + Send + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    /// Runs until the program halts or its input port closes.
    pub fn run(&mut self) -> Result<Exit, Fault> {
        loop {
            if let Some(exit) = self.step()? {
                return Ok(exit);
            }
        }
    }

    /// Runs to completion and returns the final memory.
    pub fn execute(mut self) -> Result<Snapshot, Fault> {
        let exit = self.run()?;
        Ok(self.capture(exit))
    }

    /// Executes one instruction. Returns `Some` when the machine stopped.
    pub fn step(&mut self) -> Result<Option<Exit>, Fault> {
        match self.state {
            MachineState::Halted => return Err(Fault::new(self.pc, VMError::AlreadyHalted)),
            MachineState::Faulted => return Err(Fault::new(self.pc, VMError::Poisoned)),
            MachineState::Running | MachineState::AwaitingInput => {}
        }
        self.state = MachineState::Running;

        match self.cycle() {
            Ok(Flow::Exit(exit)) => {
                self.state = exit.into();
                if exit == Exit::Halted {
                    debug!(
                        "{} halted at pc {} after {} cycles",
                        self.config.name, self.pc, self.cycles
                    );
                }
                Ok(Some(exit))
            }
            Ok(_) => Ok(None),
            Err(source) => {
                self.state = MachineState::Faulted;
                let fault = Fault::new(self.pc, source);
                error!("{}: {}", self.config.name, fault);
                Err(fault)
            }
        }
    }

    fn cycle(&mut self) -> Result<Flow, VMError> {
        if let Some(limit) = self.config.cycle_limit
            && self.cycles >= limit
        {
            return Err(VMError::CycleLimitExceeded { limit });
        }

        let pc = self.pc;
        let instruction = Instruction::decode(self.memory.read(pc)?)?;
        let flow = self.exec(instruction)?;

        match flow {
            // Nothing happened; the instruction runs again on resume.
            Flow::Exit(Exit::AwaitingInput) => return Ok(flow),
            Flow::Next => self.pc = pc.wrapping_add(instruction.width()),
            Flow::Jump(target) => self.pc = target,
            Flow::Exit(Exit::Halted) => {}
        }
        self.cycles += 1;

        if let Some(hook) = self.hook.as_mut() {
            hook(&CycleTrace {
                pc,
                instruction,
                relative_base: self.relative_base,
                cycle: self.cycles,
            });
        }
        if let Some(delay) = self.config.clock_delay {
            std::thread::sleep(delay);
        }
        Ok(flow)
    }

    /// Executes a single decoded instruction.
    fn exec(&mut self, instruction: Instruction) -> Result<Flow, VMError> {
        exec_vm! {
            vm = self,
            instr = instruction,
            {
                Add => op_add(a: Read @ 0, b: Read @ 1, dst: Write @ 2),
                Mul => op_mul(a: Read @ 0, b: Read @ 1, dst: Write @ 2),
                Input => op_input(dst: Write @ 0),
                Output => op_output(value: Read @ 0),
                JumpIfTrue => op_jump_if_true(cond: Read @ 0, target: Read @ 1),
                JumpIfFalse => op_jump_if_false(cond: Read @ 0, target: Read @ 1),
                LessThan => op_less_than(a: Read @ 0, b: Read @ 1, dst: Write @ 2),
                Equals => op_equals(a: Read @ 0, b: Read @ 1, dst: Write @ 2),
                AdjustBase => op_adjust_base(offset: Read @ 0),
                Halt => op_halt(),
            }
        }
    }

    /// Resolves parameter `param` of the current instruction.
    fn locate(&self, instruction: &Instruction, param: usize) -> Result<Operand, VMError> {
        let raw = self.memory.read(self.pc.wrapping_add(param as i64 + 1))?;
        Operand::locate(
            instruction.opcode(),
            param,
            instruction.mode(param),
            raw,
            self.relative_base,
        )
    }

    fn read_param(&self, instruction: &Instruction, param: usize) -> Result<i64, VMError> {
        match self.locate(instruction, param)? {
            Operand::Literal(value) => Ok(value),
            Operand::Address(address) => self.memory.read(address),
        }
    }

    fn target_param(&self, instruction: &Instruction, param: usize) -> Result<i64, VMError> {
        match self.locate(instruction, param)? {
            Operand::Address(address) => Ok(address),
            Operand::Literal(_) => Err(VMError::InvalidWriteMode {
                instruction: instruction.opcode().mnemonic(),
                param: param + 1,
            }),
        }
    }

    fn op_add(&mut self, a: i64, b: i64, dst: i64) -> Result<Flow, VMError> {
        self.memory.write(dst, a.wrapping_add(b))?;
        Ok(Flow::Next)
    }

    fn op_mul(&mut self, a: i64, b: i64, dst: i64) -> Result<Flow, VMError> {
        self.memory.write(dst, a.wrapping_mul(b))?;
        Ok(Flow::Next)
    }

    fn op_input(&mut self, dst: i64) -> Result<Flow, VMError> {
        // A bad target must fault before a value is taken off the port.
        Memory::check_address(dst)?;
        let value = match self.input.receive() {
            Receive::Value(value) => value,
            Receive::NoData => self.config.no_data_value,
            Receive::Closed => return Ok(Flow::Exit(Exit::AwaitingInput)),
        };
        self.memory.write(dst, value)?;
        Ok(Flow::Next)
    }

    fn op_output(&mut self, value: i64) -> Result<Flow, VMError> {
        self.output
            .send(value)
            .map_err(|e| VMError::OutputClosed {
                value,
                reason: e.to_string(),
            })?;
        Ok(Flow::Next)
    }

    fn op_jump_if_true(&mut self, cond: i64, target: i64) -> Result<Flow, VMError> {
        Ok(if cond != 0 { Flow::Jump(target) } else { Flow::Next })
    }

    fn op_jump_if_false(&mut self, cond: i64, target: i64) -> Result<Flow, VMError> {
        Ok(if cond == 0 { Flow::Jump(target) } else { Flow::Next })
    }

    fn op_less_than(&mut self, a: i64, b: i64, dst: i64) -> Result<Flow, VMError> {
        self.memory.write(dst, (a < b) as i64)?;
        Ok(Flow::Next)
    }

    fn op_equals(&mut self, a: i64, b: i64, dst: i64) -> Result<Flow, VMError> {
        self.memory.write(dst, (a == b) as i64)?;
        Ok(Flow::Next)
    }

    fn op_adjust_base(&mut self, offset: i64) -> Result<Flow, VMError> {
        self.relative_base = self.relative_base.wrapping_add(offset);
        Ok(Flow::Next)
    }

    fn op_halt(&mut self) -> Result<Flow, VMError> {
        Ok(Flow::Exit(Exit::Halted))
    }
}

impl<I, O: Output> Machine<I, O> {
    /// Closes the output port so downstream readers see the end of the stream.
    pub fn close_output(&mut self) {
        self.output.close();
    }
}

impl<I, O> Machine<I, O> {
    /// Captures the final state of a machine that has stopped without faulting.
    pub fn snapshot(&self) -> Option<Snapshot> {
        let exit = match self.state {
            MachineState::Halted => Exit::Halted,
            MachineState::AwaitingInput => Exit::AwaitingInput,
            MachineState::Running | MachineState::Faulted => return None,
        };
        Some(self.capture(exit))
    }

    fn capture(&self, exit: Exit) -> Snapshot {
        Snapshot {
            exit,
            memory: self.memory.snapshot(),
            pc: self.pc,
            relative_base: self.relative_base,
            cycles: self.cycles,
        }
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Mutable access, for patching cells before the first run.
    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    pub fn pc(&self) -> i64 {
        self.pc
    }

    pub fn relative_base(&self) -> i64 {
        self.relative_base
    }

    /// Instructions executed so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn state(&self) -> MachineState {
        self.state
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn input(&self) -> &I {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut I {
        &mut self.input
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut O {
        &mut self.output
    }

    pub fn into_ports(self) -> (I, O) {
        (self.input, self.output)
    }
}
