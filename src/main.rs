//! Intcode interpreter CLI.
//!
//! Loads a program and runs it with terminal ports.
//!
//! # Usage
//! ```text
//! intcode <program> [OPTIONS]
//! ```
//!
//! # Arguments
//! - `program`: File holding comma-separated program text
//!
//! # Options
//! - `--ascii`: Exchange text instead of one integer per line
//! - `--input <a,b,c>`: Feed these values instead of reading the terminal
//! - `--delay-us <n>`: Pause after every instruction
//! - `--max-cycles <n>`: Fault once this many instructions have run
//! - `--disasm`: Print a listing instead of running
//! - `--trace`: Log every executed instruction
//! - `--quiet`: Only log warnings and errors
//! - `--verbose`: Log debug messages too
//!
//! # Examples
//! ```text
//! intcode day9.txt --input 1
//! intcode springdroid.txt --ascii
//! intcode day2.txt --disasm
//! ```

use intcode::utils::log::{self, Level};
use intcode::virtual_machine::disasm;
use intcode::virtual_machine::errors::Fault;
use intcode::virtual_machine::port::{
    Input, ScriptedInput, TerminalInput, TerminalMode, TerminalOutput,
};
use intcode::virtual_machine::program::Program;
use intcode::virtual_machine::vm::{CycleTrace, Exit, Machine, MachineConfig};
use intcode::{debug, error, info, warn};
use std::env;
use std::process;
use std::time::Duration;

struct Options {
    program_path: String,
    mode: TerminalMode,
    input: Option<Vec<i64>>,
    delay: Option<Duration>,
    max_cycles: Option<u64>,
    disasm: bool,
    trace: bool,
}

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage(&args[0]);
        process::exit(if args.len() < 2 { 1 } else { 0 });
    }

    let options = parse_args(&args);

    let program = match Program::from_file(&options.program_path) {
        Ok(program) => program,
        Err(e) => {
            error!("Failed to load {}: {}", options.program_path, e);
            process::exit(1);
        }
    };

    if options.disasm {
        for line in disasm::disassemble(program.words()) {
            println!("{}", line);
        }
        return;
    }

    match run(&program, &options) {
        Ok((exit, cell0, cycles)) => {
            if exit == Exit::AwaitingInput {
                warn!("Input ran out before the program halted");
            }
            info!("Finished after {} cycles, memory[0] = {}", cycles, cell0);
        }
        Err(fault) => {
            if let Some((line, _)) = disasm::line_at(program.words(), fault.pc as usize) {
                error!("Faulting instruction: {}", line.trim_start());
            }
            process::exit(1);
        }
    }
}

fn run(program: &Program, options: &Options) -> Result<(Exit, i64, u64), Fault> {
    let input: Box<dyn Input> = match &options.input {
        Some(values) => Box::new(ScriptedInput::new(values.iter().copied())),
        None => Box::new(TerminalInput::stdio(options.mode)),
    };
    let output = TerminalOutput::stdout(options.mode);

    let config = MachineConfig {
        clock_delay: options.delay,
        cycle_limit: options.max_cycles,
        ..MachineConfig::named("intcode")
    };

    let mut machine = Machine::with_config(program, input, output, config);
    if options.trace {
        machine = machine.with_hook(|trace: &CycleTrace| {
            debug!(
                "pc={:<5} rb={:<5} {}",
                trace.pc, trace.relative_base, trace.instruction
            );
        });
    }

    let exit = machine.run()?;
    let cell0 = machine.memory().read(0).unwrap_or_default();
    Ok((exit, cell0, machine.cycles()))
}

fn parse_args(args: &[String]) -> Options {
    let mut options = Options {
        program_path: args[1].clone(),
        mode: TerminalMode::Numeric,
        input: None,
        delay: None,
        max_cycles: None,
        disasm: false,
        trace: false,
    };

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--ascii" => {
                options.mode = TerminalMode::Ascii;
                i += 1;
            }
            "--disasm" => {
                options.disasm = true;
                i += 1;
            }
            "--trace" => {
                options.trace = true;
                log::set_level(Level::Debug);
                i += 1;
            }
            "--quiet" => {
                log::set_level(Level::Warn);
                i += 1;
            }
            "--verbose" => {
                log::set_level(Level::Debug);
                i += 1;
            }
            k @ ("--input" | "--delay-us" | "--max-cycles") => {
                i += 1;
                if i >= args.len() {
                    error!("{k} requires an argument");
                    process::exit(1);
                }
                let value = &args[i];
                match k {
                    "--input" => options.input = Some(parse_values(value)),
                    "--delay-us" => {
                        options.delay = Some(Duration::from_micros(parse_number(k, value)))
                    }
                    _ => options.max_cycles = Some(parse_number(k, value)),
                }
                i += 1;
            }
            other => {
                error!("Unknown option: {}", other);
                print_usage(&args[0]);
                process::exit(1);
            }
        }
    }

    options
}

fn parse_values(text: &str) -> Vec<i64> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    match text.parse::<Program>() {
        Ok(values) => values.words().to_vec(),
        Err(e) => {
            error!("Invalid --input values: {}", e);
            process::exit(1);
        }
    }
}

fn parse_number(flag: &str, text: &str) -> u64 {
    text.parse::<u64>().unwrap_or_else(|_| {
        error!("Invalid {} value: '{}' is not a valid number", flag, text);
        process::exit(1);
    })
}

fn print_usage(program: &str) {
    eprintln!("Usage: {} <program> [OPTIONS]", program);
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <program>             File holding comma-separated program text");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --ascii               Exchange text instead of one integer per line");
    eprintln!("  --input <a,b,c>       Feed these values instead of reading the terminal");
    eprintln!("  --delay-us <n>        Pause after every instruction");
    eprintln!("  --max-cycles <n>      Fault once this many instructions have run");
    eprintln!("  --disasm              Print a listing instead of running");
    eprintln!("  --trace               Log every executed instruction");
    eprintln!("  --quiet               Only log warnings and errors");
    eprintln!("  --verbose             Log debug messages too");
    eprintln!("  -h, --help            Show this help message");
}
