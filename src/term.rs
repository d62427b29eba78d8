use std::collections::VecDeque;
use std::fmt;
use std::io::{self, BufRead, IsTerminal};

use colored::Colorize;
use console::Term;

use crate::output::Output;
use crate::runtime::{Display, InputSource, StepGate, StepView, INPUT_MAX};
use crate::symbol::Radix;

/// Rejected `INPUT` value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputError {
    NotInteger(String),
    TooLarge(String),
}

impl std::error::Error for InputError {}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInteger(text) => write!(f, "`{}` is not an integer", text),
            Self::TooLarge(text) => {
                write!(f, "`{}` is larger than 0x{:X} in magnitude", text, INPUT_MAX)
            }
        }
    }
}

/// Parse a value for an `INPUT` instruction.
///
/// Without an explicit radix, `0x`/`x` prefixed text is hexadecimal and anything else decimal.
pub fn parse_input(text: &str, radix: Option<Radix>) -> Result<u16, InputError> {
    let trimmed = text.trim();
    let (negative, unsigned) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let (digits, radix) = match radix {
        Some(radix) => (unsigned, radix),
        None => {
            let lower = unsigned.to_ascii_lowercase();
            if lower.starts_with("0x") {
                (&unsigned[2..], Radix::Hex)
            } else if lower.starts_with('x') {
                (&unsigned[1..], Radix::Hex)
            } else {
                (unsigned, Radix::Dec)
            }
        }
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix.base())) {
        return Err(InputError::NotInteger(trimmed.to_string()));
    }
    let magnitude = u32::from_str_radix(digits, radix.base())
        .map_err(|_| InputError::TooLarge(trimmed.to_string()))?;
    if magnitude > INPUT_MAX as u32 {
        return Err(InputError::TooLarge(trimmed.to_string()));
    }
    let magnitude = magnitude as u16;
    Ok(if negative {
        magnitude.wrapping_neg()
    } else {
        magnitude
    })
}

/// Where `INPUT` values come from.
#[derive(Debug)]
pub enum InputMode {
    /// Values given on the command line
    Argument(VecDeque<u16>),
    /// Stdin which is not attached to a terminal, one value per line
    Stdin(io::Stdin),
    /// Interactive terminal, prompting until a valid value is given
    Terminal(Term),
}

impl InputMode {
    pub fn from(argument: Option<Vec<u16>>) -> Self {
        if let Some(values) = argument {
            return InputMode::Argument(values.into());
        }
        let stdin = io::stdin();
        if stdin.is_terminal() {
            return InputMode::Terminal(Term::stderr());
        }
        InputMode::Stdin(stdin)
    }
}

impl InputSource for InputMode {
    fn read_input(&mut self) -> Option<u16> {
        match self {
            Self::Argument(values) => values.read_input(),
            Self::Stdin(stdin) => read_piped(stdin),
            Self::Terminal(term) => read_terminal(term),
        }
    }
}

fn read_piped(stdin: &io::Stdin) -> Option<u16> {
    let mut line = String::new();
    loop {
        line.clear();
        // Read errors are treated as EOF
        if stdin.lock().read_line(&mut line).unwrap_or(0) == 0 {
            return None;
        }
        if line.trim().is_empty() {
            continue;
        }
        match parse_input(&line, None) {
            Ok(value) => return Some(value),
            Err(err) => {
                Output::Debugger.print_str(&format!("{} {}, skipping\n", "Warning:".yellow(), err))
            }
        }
    }
}

fn read_terminal(term: &Term) -> Option<u16> {
    Output::Debugger.print_str(&format!("{}\n", "User input requested:".cyan()));
    loop {
        let _ = term.write_str("Is the input a hexadecimal value (Y/N)? ");
        let answer = term.read_line().ok()?;
        let radix = if answer.trim().to_ascii_uppercase().starts_with('Y') {
            Radix::Hex
        } else {
            Radix::Dec
        };
        let _ = term.write_str("Enter your input: ");
        let text = term.read_line().ok()?;
        match parse_input(&text, Some(radix)) {
            Ok(value) => return Some(value),
            Err(err) => {
                Output::Debugger.print_str(&format!("{} {}, try again\n", "Error:".red(), err))
            }
        }
    }
}

/// Step gate printing the machine state, then waiting for Enter when a terminal is attached.
pub struct TermGate {
    term: Term,
    interactive: bool,
}

impl TermGate {
    pub fn new() -> Self {
        let term = Term::stderr();
        let interactive = term.is_term() && io::stdin().is_terminal();
        TermGate { term, interactive }
    }
}

impl Default for TermGate {
    fn default() -> Self {
        Self::new()
    }
}

impl StepGate for TermGate {
    fn step(&mut self, view: StepView<'_>) {
        let out = Output::Debugger;
        if self.interactive && !Output::is_minimal() {
            let _ = self.term.clear_screen();
        }
        out.print_trace(view.trace);
        out.print_str("\n");
        out.print_registers(view.regs);
        out.print_str("\n");
        out.print_memory(view.mem);
        if self.interactive {
            let _ = self.term.write_str("Enter to continue...");
            // A closed terminal cannot acknowledge; carry on regardless
            let _ = self.term.read_line();
        }
    }
}

/// Prints the output sequence to stdout.
pub struct TermDisplay;

impl Display for TermDisplay {
    fn show_output(&mut self, outputs: &[u16], hex: bool) {
        Output::Normal.print_outputs(outputs, hex);
    }
}
