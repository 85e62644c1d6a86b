//! Result and errors.
use std::fmt::{self, Display, Formatter};

use crate::constants::{Address, MAX_PROGRAM_SIZE};

pub type Chip8Result<T> = std::result::Result<T, Chip8Error>;

#[derive(Debug)]
pub enum Chip8Error {
    /// Attempt to load a program that can't fit in memory.
    RomTooLarge { len: usize },
    /// Failure reading a program from its source.
    Io(std::io::Error),
    /// Fatal error raised by the interpreter. The machine is halted.
    Runtime(RuntimeError),
}

impl Chip8Error {
    /// The runtime fault, if this error halted the machine.
    pub fn runtime(&self) -> Option<&RuntimeError> {
        match self {
            Self::Runtime(err) => Some(err),
            _ => None,
        }
    }
}

impl Display for Chip8Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::RomTooLarge { len } => write!(
                f,
                "program of {len} bytes too large for VM memory (max {MAX_PROGRAM_SIZE})"
            ),
            Self::Io(err) => write!(f, "{}", err),
            Self::Runtime(err) => write!(f, "runtime error: {}", err),
        }
    }
}

impl std::error::Error for Chip8Error {}

impl From<std::io::Error> for Chip8Error {
    fn from(err: std::io::Error) -> Self {
        Chip8Error::Io(err)
    }
}

impl From<RuntimeError> for Chip8Error {
    fn from(err: RuntimeError) -> Self {
        Chip8Error::Runtime(err)
    }
}

/// Fault that stopped execution, with the offending instruction and its location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    /// Program counter where the instruction was fetched.
    pub pc: Address,
    /// The instruction word that faulted.
    pub word: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeErrorKind {
    UnknownOpcode,
    /// `CALL` with all stack slots in use.
    StackOverflow,
    /// `RET` with an empty stack.
    StackUnderflow,
}

impl Display for RuntimeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let Self { kind, pc, word } = self;
        let msg = match kind {
            RuntimeErrorKind::UnknownOpcode => "unsupported opcode",
            RuntimeErrorKind::StackOverflow => "call stack overflow",
            RuntimeErrorKind::StackUnderflow => "call stack underflow",
        };
        write!(f, "{msg} {word:04X} at 0x{pc:04X}")
    }
}

impl std::error::Error for RuntimeError {}
