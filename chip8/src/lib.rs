//! Chip-8 virtual machine.
//!
//! The [`Chip8Vm`](prelude::Chip8Vm) is driven by the caller: feed it a
//! program, then call `tick` with a millisecond timestamp as often as
//! possible, and forward key presses as they happen.
mod bytecode;
mod clock;
pub mod constants;
mod cpu;
mod devices;
mod disasm;
mod error;
mod vm;

pub use self::{
    bytecode::Op,
    devices::{Diagnostics, InvalidKeyCode, KeyCode, Level, LogDiagnostics, NullDiagnostics},
    error::{Chip8Error, Chip8Result, RuntimeError, RuntimeErrorKind},
    vm::{Chip8DisplayBuffer, Flow, ShiftQuirk},
};

pub const IMPL_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod prelude {
    pub use super::{
        cpu::Chip8Cpu,
        disasm::Disassembler,
        error::{Chip8Error, Chip8Result},
        vm::{Chip8Conf, Chip8Vm, Flow, ShiftQuirk},
        KeyCode,
    };
}
