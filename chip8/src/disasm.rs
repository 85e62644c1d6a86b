//! Disassembler.
use std::fmt::{self, Write as FmtWrite};

use crate::{
    bytecode::{word, Op},
    constants::MEM_START,
};

/// Prints a program as a listing of the instructions the machine would decode.
///
/// There is no attempt at separating code from data. Words that don't
/// decode, such as sprites, are shown as `??`.
pub struct Disassembler<'a> {
    bytecode: &'a [u8],
}

impl<'a> Disassembler<'a> {
    pub fn new(bytecode: &'a [u8]) -> Self {
        Self { bytecode }
    }

    /// Write the whole program, one instruction per line.
    pub fn disassemble<W: FmtWrite>(&self, w: &mut W) -> fmt::Result {
        for (i, chunk) in self.bytecode.chunks(2).enumerate() {
            let addr = MEM_START + i * 2;

            match *chunk {
                [a, b] => {
                    let instr = word([a, b]);
                    match Op::decode(instr) {
                        Some(op) => writeln!(w, "0x{addr:04X} {instr:04X} {op}")?,
                        None => writeln!(w, "0x{addr:04X} {instr:04X} ??")?,
                    }
                }
                // Trailing odd byte.
                [a] => writeln!(w, "0x{addr:04X} {a:02X}")?,
                _ => unreachable!("chunks are never empty"),
            }
        }

        Ok(())
    }

    pub fn to_listing(&self) -> Result<String, fmt::Error> {
        let mut buf = String::new();
        self.disassemble(&mut buf)?;
        Ok(buf)
    }
}
