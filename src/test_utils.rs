//! Sample programs shared by tests.

use crate::virtual_machine::program::Program;

/// Parses program text, panicking on malformed fixtures.
pub fn program(text: &str) -> Program {
    text.parse().expect("fixture program")
}

/// Reads a phase, then a signal, and outputs `signal * 10 + phase`.
pub const AMPLIFIER: &str = "3,15,3,16,1002,16,10,16,1,16,15,15,4,15,99,0,0";

/// Feedback-loop amplifier: loops five times before halting.
pub const FEEDBACK_AMPLIFIER: &str = "3,26,1001,26,-4,26,3,27,1002,27,2,27,1,27,26,27,4,27,1001,28,-1,28,1005,28,6,99,0,0,5";

/// Reads a value, outputs it plus one. Halts after three rounds.
pub const COUNTER: &str = "3,50,1001,50,1,50,4,50,1001,51,1,51,1007,51,3,52,1005,52,0,99";

/// Reports `(255, address, 42)` once, then polls forever.
pub const SIMPLE_NIC: &str = "3,100,104,255,4,100,104,42,3,101,1105,1,8,99";

/// Address 0 sends `(1, 5, 6)`. Every other address forwards each packet it
/// receives to the NAT as `(x, x + y)`. Both then poll forever.
pub const ROUTING_NIC: &str = "3,100,1005,100,20,104,1,104,5,104,6,3,101,1105,1,11,99,0,0,0,\
3,101,1008,101,-1,103,1005,103,20,3,102,104,255,4,101,1,101,102,104,4,104,1105,1,20,99";

/// Echoes every value it reads.
pub const ECHO: &str = "3,100,4,100,1105,1,0";
