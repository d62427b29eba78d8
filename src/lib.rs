// Assembling
mod assembler;
pub use assembler::{assemble, Assembler};
mod lexer;

// Storage
mod memory;
pub use memory::Memory;

// Running
mod runtime;
pub use runtime::{Collaborators, Display, InputSource, Registers, RunState, StepGate, StepView};
pub mod output;
pub mod term;

mod symbol;
pub use symbol::{AddressBook, Opcode, Radix, MEMORY_MAX};

pub mod error;
pub use error::{AssemblyError, ExecutionError, ImageError, MemoryError};

pub mod env;

/// Amount of lines to show as context, each side of focus line (line containing span).
pub const DIAGNOSTIC_CONTEXT_LINES: usize = 4;
