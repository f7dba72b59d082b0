//! Command-line interface for the TinyGKit console.

use clap::Parser;
use std::path::PathBuf;

/// Talk to a TinyG board from the terminal.
///
/// Lines typed on stdin are queued to the board. `!`, `~` and `%` are sent
/// immediately as feed hold, resume and queue flush; `^x` sends a reset.
#[derive(Parser, Debug)]
#[command(name = "tinygkit", version)]
pub struct Cli {
    /// Serial port the board is attached to (for example `/dev/ttyUSB0`).
    #[arg(long, short = 'p', required_unless_present = "list")]
    pub port: Option<String>,
    /// Baud rate.
    #[arg(long, short = 'b', default_value_t = 115_200)]
    pub baud: u32,
    /// Driver configuration file (TOML).
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,
    /// Program to stream after connecting.
    #[arg(long, short = 'f')]
    pub file: Option<PathBuf>,
    /// Also print status reports and buffer updates.
    #[arg(long, short = 'v')]
    pub verbose: bool,
    /// List candidate serial ports and exit.
    #[arg(long)]
    pub list: bool,
}

/// What a line typed on the console means
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput<'a> {
    /// Single-byte control
    Control(tinygkit_communication::ControlSignal),
    /// Leave the console
    Quit,
    /// Queue to the board
    Command(&'a str),
    /// Nothing to do
    Empty,
}

/// Classify one stdin line
pub fn classify(line: &str) -> ConsoleInput<'_> {
    use tinygkit_communication::ControlSignal;

    match line.trim() {
        "" => ConsoleInput::Empty,
        "!" => ConsoleInput::Control(ControlSignal::Pause),
        "~" => ConsoleInput::Control(ControlSignal::Resume),
        "%" => ConsoleInput::Control(ControlSignal::QueueFlush),
        "^x" | "^X" => ConsoleInput::Control(ControlSignal::Reset),
        "quit" | "exit" => ConsoleInput::Quit,
        command => ConsoleInput::Command(command),
    }
}
