use std::{error::Error, fmt, ops::Range};

use miette::{miette, LabeledSpan, Report, Severity};

/// Fault raised by the bounded memory store.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MemoryError {
    AddressOutOfBounds(u16),
    ValueOverflow(u32),
}

/// Assembly failure, tagged with the 1-indexed source line (blank lines included).
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AssemblyError {
    pub line: usize,
    pub kind: AssemblyErrorKind,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum AssemblyErrorKind {
    Addressing(AddressingFault),
    KeywordMissing,
    IntegerExpected { token: String },
    SkipcondInvalid { token: String },
    /// Token which cannot take part in an instruction, such as a second opcode.
    UnexpectedToken { token: String },
    /// Program does not fit in memory.
    Memory(MemoryError),
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum AddressingFault {
    MultipleMarkers,
    MissingLabel,
    DuplicateLabel { label: String, first_line: usize },
}

/// Fatal fault during a run, tagged with the address of the faulting instruction.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ExecutionError {
    pub addr: u16,
    pub kind: ExecutionErrorKind,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ExecutionErrorKind {
    /// Holds bits 15-12 of the instruction word.
    UndecodableOpcode(u16),
    Memory(MemoryError),
    /// Input source ran dry while an `INPUT` instruction was waiting.
    InputUnavailable,
}

/// Malformed persisted program image, tagged with the 1-indexed image line.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ImageError {
    pub line: usize,
    pub kind: ImageErrorKind,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ImageErrorKind {
    NotHex(String),
    Memory(MemoryError),
}

impl Error for MemoryError {}
impl Error for AssemblyError {}
impl Error for ExecutionError {}
impl Error for ImageError {}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddressOutOfBounds(addr) => {
                write!(f, "address out of bounds (0x{:04X})", addr)
            }
            Self::ValueOverflow(value) => {
                write!(f, "storage bound exceeded by 0x{:X} (max 0xFFFF)", value)
            }
        }
    }
}

impl AssemblyErrorKind {
    fn code(&self) -> &'static str {
        match self {
            Self::Addressing(_) => "asm::addressing",
            Self::KeywordMissing => "asm::keyword_missing",
            Self::IntegerExpected { .. } => "asm::integer_expected",
            Self::SkipcondInvalid { .. } => "asm::skipcond_invalid",
            Self::UnexpectedToken { .. } => "asm::unexpected_token",
            Self::Memory(_) => "asm::memory",
        }
    }

    fn help(&self) -> &'static str {
        match self {
            Self::Addressing(AddressingFault::MultipleMarkers) => {
                "a line may hold at most one `label,` prefix"
            }
            Self::Addressing(AddressingFault::MissingLabel) => {
                "write the label name before the comma, like `loop, LOAD X`"
            }
            Self::Addressing(AddressingFault::DuplicateLabel { .. }) => {
                "labels may only be declared once per file"
            }
            Self::KeywordMissing => "every line needs an instruction or a HEX/DEC literal",
            Self::IntegerExpected { .. } => {
                "HEX takes a base 16 literal like `HEX 1F`, DEC a base 10 literal like `DEC -3`"
            }
            Self::SkipcondInvalid { .. } => {
                "operands must be declared labels; SKIPCOND also takes 000, 400 or 800"
            }
            Self::UnexpectedToken { .. } => "each line holds one instruction and one operand",
            Self::Memory(_) => "programs are limited to 4096 words",
        }
    }
}

impl fmt::Display for AssemblyErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Addressing(AddressingFault::MultipleMarkers) => {
                write!(f, "multiple address markers")
            }
            Self::Addressing(AddressingFault::MissingLabel) => write!(f, "missing address label"),
            Self::Addressing(AddressingFault::DuplicateLabel { label, first_line }) => write!(
                f,
                "label `{}` already declared at line {}",
                label, first_line
            ),
            Self::KeywordMissing => write!(f, "keyword missing"),
            Self::IntegerExpected { token } => write!(f, "integer expected, found `{}`", token),
            Self::SkipcondInvalid { token } => write!(
                f,
                "`{}` is neither a declared label nor a skip condition",
                token
            ),
            Self::UnexpectedToken { token } => write!(f, "unexpected token `{}`", token),
            Self::Memory(err) => write!(f, "{}", err),
        }
    }
}

impl fmt::Display for AssemblyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Assembly Error: {} at line {}", self.kind, self.line)
    }
}

impl fmt::Display for ExecutionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UndecodableOpcode(opcode) => write!(
                f,
                "instruction 0x{:X} is outside the instruction set",
                opcode
            ),
            Self::Memory(err) => write!(f, "{}", err),
            Self::InputUnavailable => write!(f, "no input left to read"),
        }
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Execution Error: {} (address 0x{:03X})",
            self.kind, self.addr
        )
    }
}

impl fmt::Display for ImageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ImageErrorKind::NotHex(word) => {
                write!(f, "expected a hex word at line {}, found `{}`", self.line, word)
            }
            ImageErrorKind::Memory(err) => write!(f, "{} at line {}", err, self.line),
        }
    }
}

// Diagnostics

/// Byte range of the 1-indexed `line` within `src`, excluding the line terminator.
fn line_range(src: &str, line: usize) -> Range<usize> {
    let mut start = 0;
    for (i, text) in src.split_inclusive('\n').enumerate() {
        if i + 1 == line {
            let trimmed = text.trim_end_matches(['\n', '\r']);
            return start..start + trimmed.len();
        }
        start += text.len();
    }
    src.len()..src.len()
}

pub fn asm_report(err: &AssemblyError, src: String) -> Report {
    let range = line_range(&src, err.line);
    miette!(
        severity = Severity::Error,
        code = err.kind.code(),
        help = err.kind.help(),
        labels = vec![LabeledSpan::at(range, err.kind.to_string())],
        "Assembly failed at line {}.",
        err.line,
    )
    .with_source_code(src)
}

pub fn exec_report(err: &ExecutionError) -> Report {
    let help = match err.kind {
        ExecutionErrorKind::UndecodableOpcode(_) => {
            "data words reached by the program counter are executed as instructions; check for a missing HALT"
        }
        ExecutionErrorKind::Memory(_) => "operands must address memory below 0x1000",
        ExecutionErrorKind::InputUnavailable => "provide more values with `--input` or on stdin",
    };
    miette!(
        severity = Severity::Error,
        code = "exec::fault",
        help = help,
        "{}",
        err,
    )
}

pub fn image_report(err: &ImageError) -> Report {
    miette!(
        severity = Severity::Error,
        code = "image::malformed",
        help = "images hold one 4-digit hex word per line, starting at address 0",
        "{}",
        err,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_ranges() {
        let src = "LOAD X\n\nA, B, HALT\r\nX, HEX 1";
        assert_eq!(&src[line_range(src, 1)], "LOAD X");
        assert_eq!(&src[line_range(src, 2)], "");
        assert_eq!(&src[line_range(src, 3)], "A, B, HALT");
        assert_eq!(&src[line_range(src, 4)], "X, HEX 1");
        assert_eq!(line_range(src, 9), src.len()..src.len());
    }

    #[test]
    fn messages() {
        let err = AssemblyError {
            line: 3,
            kind: AssemblyErrorKind::Addressing(AddressingFault::MultipleMarkers),
        };
        assert_eq!(
            err.to_string(),
            "Assembly Error: multiple address markers at line 3"
        );
        let err = ExecutionError {
            addr: 0x12,
            kind: ExecutionErrorKind::UndecodableOpcode(0xF),
        };
        assert_eq!(
            err.to_string(),
            "Execution Error: instruction 0xF is outside the instruction set (address 0x012)"
        );
    }
}
