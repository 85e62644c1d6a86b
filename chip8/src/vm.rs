//! Virtual machine.
use std::{
    fmt::{self, Write},
    fs::File,
    io::Read,
    path::Path,
};

use rand::prelude::*;

use crate::{
    bytecode::Op,
    clock::Gate,
    constants::*,
    cpu::Chip8Cpu,
    devices::{Diagnostics, KeyCode, Level, LogDiagnostics},
    error::{Chip8Error, Chip8Result, RuntimeError, RuntimeErrorKind},
};

pub type Chip8DisplayBuffer<'a> = &'a [u8; DISPLAY_BUFFER_SIZE];

pub struct Chip8Vm {
    cpu: Chip8Cpu,
    /// Throttles instruction execution.
    clock: Gate,
    /// Throttles the 60Hz countdown of the delay and sound timers.
    timer: Gate,
    rng: StdRng,
    /// Set when execution hit a fatal error. The machine stays halted until reset.
    fault: Option<RuntimeError>,
    conf: Chip8Conf,
    diagnostics: Box<dyn Diagnostics>,
}

impl Chip8Vm {
    /// Create a machine that reports diagnostics to the `log` facade.
    pub fn new(conf: Chip8Conf) -> Self {
        Self::with_diagnostics(conf, Box::new(LogDiagnostics))
    }

    pub fn with_diagnostics(conf: Chip8Conf, diagnostics: Box<dyn Diagnostics>) -> Self {
        let mut vm = Chip8Vm {
            cpu: Chip8Cpu::new(),
            clock: Gate::new(conf.instruction_interval_ms),
            timer: Gate::new(TIMER_INTERVAL_MS),
            rng: seed_rng(&conf),
            fault: None,
            conf,
            diagnostics,
        };
        vm.reset();
        vm
    }

    /// Configuration that was used to instantiate the VM.
    pub fn config(&self) -> &Chip8Conf {
        &self.conf
    }

    pub fn cpu(&self) -> &Chip8Cpu {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Chip8Cpu {
        &mut self.cpu
    }

    /// Clear all state in preparation for a fresh startup.
    ///
    /// Memory is wiped except for the builtin font. Program memory must be loaded again.
    pub fn reset(&mut self) {
        self.cpu.clear();
        self.clock.reset();
        self.timer.reset();
        self.fault = None;
        self.rng = seed_rng(&self.conf);

        self.diagnostics.emit(Level::Debug, "machine reset");
    }

    /// Load a program into memory at `MEM_START`.
    ///
    /// The machine is fully reset first. If the program doesn't fit,
    /// nothing is changed.
    pub fn load_bytecode(&mut self, bytecode: &[u8]) -> Chip8Result<()> {
        if !check_program_size(bytecode) {
            self.diagnostics.emit(
                Level::Error,
                &format!("rejected program of {} bytes", bytecode.len()),
            );
            return Err(Chip8Error::RomTooLarge {
                len: bytecode.len(),
            });
        }

        // Start with clean memory to avoid leaking previous program.
        self.reset();

        self.cpu.ram[MEM_START..MEM_START + bytecode.len()].copy_from_slice(bytecode);

        self.diagnostics.emit(
            Level::Info,
            &format!("loaded program of {} bytes", bytecode.len()),
        );

        Ok(())
    }

    /// Read a whole program from the given source and load it.
    ///
    /// A read failure is reported as [`Chip8Error::Io`] and leaves the machine untouched.
    pub fn load_rom<R: Read>(&mut self, mut reader: R) -> Chip8Result<()> {
        let mut bytecode = Vec::with_capacity(MAX_PROGRAM_SIZE);

        if let Err(err) = reader.read_to_end(&mut bytecode) {
            self.diagnostics
                .emit(Level::Error, &format!("failed to read program: {err}"));
            return Err(err.into());
        }

        self.load_bytecode(&bytecode)
    }

    /// Open a ROM file and load its contents.
    pub fn load_file(&mut self, filepath: impl AsRef<Path>) -> Chip8Result<()> {
        let filepath = filepath.as_ref();
        let file = File::open(filepath).map_err(|err| {
            self.diagnostics.emit(
                Level::Error,
                &format!("failed to open {}: {err}", filepath.display()),
            );
            err
        })?;

        self.load_rom(file)
    }

    pub fn display_buffer(&self) -> Chip8DisplayBuffer {
        &self.cpu.display
    }

    /// Whether the display changed since the flag was last cleared.
    pub fn is_dirty(&self) -> bool {
        self.cpu.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.cpu.dirty = false;
    }

    /// Consume the dirty flag, returning whether a redraw is needed.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.cpu.dirty, false)
    }

    /// The buzzer sounds while the sound timer is counting down.
    pub fn is_buzzing(&self) -> bool {
        self.cpu.sound_timer > 0
    }

    /// Register waiting to receive a key press, if execution is blocked.
    pub fn awaiting_key(&self) -> Option<u8> {
        self.cpu.key_wait
    }

    /// The error that halted the machine, if any.
    pub fn fault(&self) -> Option<&RuntimeError> {
        self.fault.as_ref()
    }
}

fn check_program_size(bytecode: &[u8]) -> bool {
    bytecode.len() <= MAX_PROGRAM_SIZE
}

fn seed_rng(conf: &Chip8Conf) -> StdRng {
    match conf.rng_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Outcome of a tick, for the caller's benefit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// No instruction was due.
    Idle,
    Ok,
    /// Program counter has jumped to a new address.
    ///
    /// This is returned when the interpreter encounters:
    ///
    /// - 1nnn (`JP addr`)
    /// - 2nnn (`CALL addr`)
    /// - 00EE (`RET`)
    /// - Bnnn (`JP V0, addr`)
    Jump,
    /// The display buffer was changed.
    Draw,
    /// The sound timer was set.
    Sound,
    /// Wait for a keypress.
    ///
    /// This is triggered by the opcode `Fx0A` (`LD Vx, K`), which stops
    /// execution until a key is pressed, and loads the key value into `Vx`.
    KeyWait,
}

/// VM Configuration Parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(default))]
pub struct Chip8Conf {
    /// Operand source of the shift instructions `8xy6` and `8xyE`.
    pub shift_quirk: ShiftQuirk,
    /// Milliseconds that must pass before the next instruction executes.
    pub instruction_interval_ms: u64,
    /// Fixed seed for `RND`. Drawn from entropy when unset.
    pub rng_seed: Option<u64>,
}

impl Default for Chip8Conf {
    fn default() -> Self {
        Self {
            shift_quirk: ShiftQuirk::default(),
            instruction_interval_ms: INSTRUCTION_INTERVAL_MS,
            rng_seed: None,
        }
    }
}

/// Historical interpreters disagree on which register the shift instructions read.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum ShiftQuirk {
    /// COSMAC VIP: `Vx = Vy >> 1`
    Legacy,
    /// CHIP-48 and later: `Vx = Vx >> 1`, `Vy` is ignored.
    #[default]
    Modern,
}

/// Interpreter
impl Chip8Vm {
    /// Press a key.
    ///
    /// If the VM is blocked waiting for keyboard input, the key is stored in the
    /// waiting register and execution resumes at the next instruction.
    pub fn key_down(&mut self, key: KeyCode) {
        let key_id = key.as_u8();
        self.cpu.set_key_state(key_id, true);

        if let Some(vx) = self.cpu.key_wait.take() {
            self.cpu.registers[vx as usize] = key_id;
            self.cpu.pc = self.cpu.pc.wrapping_add(2);

            self.diagnostics
                .emit(Level::Debug, &format!("{key} resumed execution into v{vx:X}"));
        }
    }

    /// Release a key. Never resumes a blocked machine.
    pub fn key_up(&mut self, key: KeyCode) {
        self.cpu.set_key_state(key.as_u8(), false);
    }

    /// Clear the keyboard input state, setting all keys to up.
    pub fn clear_keys(&mut self) {
        self.cpu.key_state = 0;
    }

    /// Advance the machine to the given time, in milliseconds.
    ///
    /// Timestamps must not decrease. At most one instruction is executed
    /// per call, and the timers count down independently at 60Hz. Nothing
    /// happens on the very first call after a reset, other than noting the time.
    pub fn tick(&mut self, now: u64) -> Chip8Result<Flow> {
        if let Some(fault) = self.fault {
            return Err(fault.into());
        }

        let mut flow = Flow::Idle;

        if self.cpu.key_wait.is_none() {
            if self.clock.poll(now) {
                flow = self.step()?;
            }
        } else {
            self.clock.arm(now);
        }

        if self.timer.poll(now) {
            self.cpu.tick_timers();
        }

        Ok(flow)
    }

    /// Fetch and execute the instruction at the program counter, ignoring the clock.
    ///
    /// While waiting for a key press this does nothing and returns [`Flow::KeyWait`].
    pub fn step(&mut self) -> Chip8Result<Flow> {
        let word = self.cpu.instr_word();
        self.execute_word(word)
    }

    /// Execute the given instruction as if it was fetched at the current program counter.
    ///
    /// A halted machine refuses with its fault, and a machine waiting
    /// for a key press does nothing.
    pub fn execute_word(&mut self, word: u16) -> Chip8Result<Flow> {
        if let Some(fault) = self.fault {
            return Err(fault.into());
        }

        if self.cpu.key_wait.is_some() {
            return Ok(Flow::KeyWait);
        }

        let pc = self.cpu.pc;

        let result = match Op::decode(word) {
            Some(op) => {
                op_trace(&*self.diagnostics, pc, op);
                self.exec(op)
            }
            None => Err(RuntimeErrorKind::UnknownOpcode),
        };

        result.map_err(|kind| {
            let err = RuntimeError { kind, pc, word };
            self.fault = Some(err);
            self.diagnostics.emit(Level::Error, &err.to_string());
            Chip8Error::Runtime(err)
        })
    }

    /// Move on to the next instruction.
    #[inline(always)]
    fn next(&mut self) {
        self.cpu.pc = self.cpu.pc.wrapping_add(2);
    }

    /// Move on to the next instruction, skipping one if the condition holds.
    #[inline(always)]
    fn skip_if(&mut self, cond: bool) {
        let offset = if cond { 4 } else { 2 };
        self.cpu.pc = self.cpu.pc.wrapping_add(offset);
    }

    /// Value the shift instructions operate on.
    #[inline]
    fn shift_operand(&self, vx: u8, vy: u8) -> u8 {
        match self.conf.shift_quirk {
            ShiftQuirk::Legacy => self.cpu.registers[vy as usize],
            ShiftQuirk::Modern => self.cpu.registers[vx as usize],
        }
    }

    /// Apply one decoded instruction.
    ///
    /// Faults are detected before anything is written, so a failed
    /// instruction leaves the state as it was.
    fn exec(&mut self, op: Op) -> Result<Flow, RuntimeErrorKind> {
        let mut control_flow = Flow::Ok;

        match op {
            // 00E0 (CLS)
            Op::ClearScreen => {
                self.cpu.clear_display();
                self.next();
                control_flow = Flow::Draw;
            }
            // 00EE (RET)
            //
            // Pop the call site off the stack, and continue after it.
            Op::Return => {
                let address = self.cpu.pop_stack()?;
                self.cpu.pc = address.wrapping_add(2);
                control_flow = Flow::Jump;
            }
            // 1nnn (JP addr)
            Op::Jump { address } => {
                self.cpu.pc = address;
                control_flow = Flow::Jump;
            }
            // 2nnn (CALL addr)
            //
            // The call site itself is pushed. Returning skips over it.
            Op::Call { address } => {
                self.cpu.push_stack(self.cpu.pc)?;
                self.cpu.pc = address;
                control_flow = Flow::Jump;
            }
            // 3xnn (SE Vx, byte)
            Op::Skip_Eq_Byte { vx, nn } => {
                self.skip_if(self.cpu.registers[vx as usize] == nn);
            }
            // 4xnn (SNE Vx, byte)
            Op::Skip_NotEq_Byte { vx, nn } => {
                self.skip_if(self.cpu.registers[vx as usize] != nn);
            }
            // 5xy0 (SE Vx, Vy)
            Op::Skip_Eq { vx, vy } => {
                let (x, y) = self.pair(vx, vy);
                self.skip_if(x == y);
            }
            // 6xnn (LD Vx, byte)
            Op::Load_Byte { vx, nn } => {
                self.cpu.registers[vx as usize] = nn;
                self.next();
            }
            // 7xnn (ADD Vx, byte)
            //
            // Carry flag is not set.
            Op::Add_Byte { vx, nn } => {
                let x = self.cpu.registers[vx as usize];
                self.cpu.registers[vx as usize] = x.wrapping_add(nn);
                self.next();
            }
            // ----------------------------------------------------------------
            // Arithmetic
            //
            // Flag is written before the result, so when Vx is VF the result wins.
            Op::Load_Vx_Vy { vx, vy } => {
                self.cpu.registers[vx as usize] = self.cpu.registers[vy as usize];
                self.next();
            }
            Op::Or_Vx_Vy { vx, vy } => {
                self.cpu.registers[vx as usize] |= self.cpu.registers[vy as usize];
                self.next();
            }
            Op::And_Vx_Vy { vx, vy } => {
                self.cpu.registers[vx as usize] &= self.cpu.registers[vy as usize];
                self.next();
            }
            Op::Xor_Vx_Vy { vx, vy } => {
                self.cpu.registers[vx as usize] ^= self.cpu.registers[vy as usize];
                self.next();
            }
            // 8xy4 (ADD Vx, Vy)
            Op::Add_Vx_Vy { vx, vy } => {
                let (x, y) = self.pair(vx, vy);
                let (result, carry) = x.overflowing_add(y);
                self.set_flag_and(vx, carry, result);
            }
            // 8xy5 (SUB Vx, Vy)
            Op::Sub_Vx_Vy { vx, vy } => {
                let (x, y) = self.pair(vx, vy);
                self.set_flag_and(vx, x > y, x.wrapping_sub(y));
            }
            // 8xy6 (SHR Vx {, Vy})
            Op::ShiftRight { vx, vy } => {
                let value = self.shift_operand(vx, vy);
                self.set_flag_and(vx, value & 1 == 1, value >> 1);
            }
            // 8xy7 (SUBN Vx, Vy)
            Op::SubReverse_Vx_Vy { vx, vy } => {
                let (x, y) = self.pair(vx, vy);
                self.set_flag_and(vx, y > x, y.wrapping_sub(x));
            }
            // 8xyE (SHL Vx {, Vy})
            Op::ShiftLeft { vx, vy } => {
                let value = self.shift_operand(vx, vy);
                self.set_flag_and(vx, value >> 7 == 1, value << 1);
            }
            // ----------------------------------------------------------------
            // 9xy0 (SNE Vx, Vy)
            Op::Skip_NotEq { vx, vy } => {
                let (x, y) = self.pair(vx, vy);
                self.skip_if(x != y);
            }
            // Annn (LD I, addr)
            Op::Load_Address { address } => {
                self.cpu.address = address;
                self.next();
            }
            // Bnnn (JP V0, addr)
            Op::Jump_V0 { address } => {
                self.cpu.pc = address.wrapping_add(self.cpu.registers[0] as Address);
                control_flow = Flow::Jump;
            }
            // Cxnn (RND Vx, byte)
            Op::Random { vx, nn } => {
                self.cpu.registers[vx as usize] = nn & self.rng.gen::<u8>();
                self.next();
            }
            // Dxyn (DRW Vx, Vy, nibble)
            Op::Draw { vx, vy, n } => {
                self.draw(vx, vy, n);
                self.next();
                control_flow = Flow::Draw;
            }
            // ----------------------------------------------------------------
            // Ex9E (SKP Vx)
            Op::Skip_Key { vx } => {
                let key = self.cpu.registers[vx as usize];
                self.skip_if(self.cpu.key_state(key));
            }
            // ExA1 (SKNP Vx)
            Op::Skip_NotKey { vx } => {
                let key = self.cpu.registers[vx as usize];
                self.skip_if(!self.cpu.key_state(key));
            }
            // ----------------------------------------------------------------
            // Fx07 (LD Vx, DT)
            Op::Load_Vx_Delay { vx } => {
                self.cpu.registers[vx as usize] = self.cpu.delay_timer;
                self.next();
            }
            // Fx0A (LD Vx, K)
            //
            // The program counter stays put until a key press resumes the machine.
            Op::Wait_Key { vx } => {
                self.cpu.key_wait = Some(vx);
                control_flow = Flow::KeyWait;
            }
            // Fx15 (LD DT, Vx)
            Op::Load_Delay_Vx { vx } => {
                self.cpu.delay_timer = self.cpu.registers[vx as usize];
                self.next();
            }
            // Fx18 (LD ST, Vx)
            Op::Load_Sound_Vx { vx } => {
                self.cpu.sound_timer = self.cpu.registers[vx as usize];
                self.next();
                control_flow = Flow::Sound;
            }
            // Fx1E (ADD I, Vx)
            Op::Add_Address { vx } => {
                let x = self.cpu.registers[vx as usize] as Address;
                self.cpu.address = self.cpu.address.wrapping_add(x);
                self.next();
            }
            // Fx29 (LD F, Vx)
            Op::Load_Font { vx } => {
                let x = self.cpu.registers[vx as usize] as Address;
                self.cpu.address = FONTSET_START + x * FONTSET_HEIGHT as Address;
                self.next();
            }
            // Fx33 (LD B, Vx)
            #[rustfmt::skip]
            Op::Store_Bcd { vx } => {
                let addr = self.cpu.address as usize;
                let x = self.cpu.registers[vx as usize];
                self.cpu.write(addr,     x / 100);
                self.cpu.write(addr + 1, x / 10 % 10);
                self.cpu.write(addr + 2, x % 10);
                self.next();
            }
            // Fx55 (LD [I], Vx)
            //
            // I is left unchanged.
            Op::Store_Registers { vx } => {
                let addr = self.cpu.address as usize;
                for v in 0..=vx as usize {
                    self.cpu.write(addr + v, self.cpu.registers[v]);
                }
                self.next();
            }
            // Fx65 (LD Vx, [I])
            Op::Load_Registers { vx } => {
                let addr = self.cpu.address as usize;
                for v in 0..=vx as usize {
                    self.cpu.registers[v] = self.cpu.read(addr + v);
                }
                self.next();
            }
        }

        Ok(control_flow)
    }

    #[inline(always)]
    fn pair(&self, vx: u8, vy: u8) -> (u8, u8) {
        (
            self.cpu.registers[vx as usize],
            self.cpu.registers[vy as usize],
        )
    }

    /// Write VF, then the result into Vx, and continue.
    #[inline]
    fn set_flag_and(&mut self, vx: u8, flag: bool, result: u8) {
        self.cpu.registers[FLAG_REGISTER] = flag as u8;
        self.cpu.registers[vx as usize] = result;
        self.next();
    }

    /// XOR a sprite of `n` rows, read from address I, onto the display at (Vx, Vy).
    ///
    /// There is no wrapping. A row running past the right edge continues on the
    /// next display row, and pixels past the end of the buffer are dropped.
    /// VF is set to 1 if any lit pixel was erased.
    fn draw(&mut self, vx: u8, vy: u8, n: u8) {
        let (x, y) = self.pair(vx, vy);
        let (x, y) = (x as usize, y as usize);
        let base = self.cpu.address as usize;
        let mut is_erased = false;

        for r in 0..n as usize {
            // Each row is 8 bits representing the 8 pixels of the sprite.
            let row = self.cpu.read(base + r);

            for c in 0..8 {
                if (row >> (7 - c)) & 1 == 0 {
                    continue;
                }

                let index = (y + r) * DISPLAY_WIDTH + (x + c);
                if let Some(px) = self.cpu.display.get_mut(index) {
                    is_erased |= *px == 1;
                    *px ^= 1;
                }
            }
        }

        // If a pixel was erased, then a collision occurred.
        self.cpu.registers[FLAG_REGISTER] = is_erased as u8;
        self.cpu.dirty = true;
    }
}

/// Troubleshooting
#[doc(hidden)]
impl Chip8Vm {
    /// Returns the program memory as a human readable string.
    pub fn dump_ram(&self, count: usize) -> Result<String, fmt::Error> {
        let iter = self
            .cpu
            .ram
            .iter()
            .enumerate()
            .skip(MEM_START)
            .take(count)
            .step_by(2);
        let mut buf = String::new();

        for (i, op) in iter {
            writeln!(buf, "{:04X}: {:02X}{:02X}", i, op, self.cpu.read(i + 1))?;
        }

        Ok(buf)
    }

    pub fn dump_display(&self) -> Result<String, fmt::Error> {
        let mut buf = String::new();

        for row in self.cpu.display.chunks(DISPLAY_WIDTH) {
            for px in row {
                if *px == 1 {
                    write!(buf, "#")?;
                } else {
                    write!(buf, ".")?;
                }
            }
            writeln!(buf)?;
        }

        Ok(buf)
    }

    pub fn dump_keys(&self) -> Result<String, fmt::Error> {
        let mut buf = String::new();

        if self.cpu.any_key() {
            write!(buf, "keys:")?;
            for i in 0..KEY_COUNT {
                if self.cpu.key_state(i) {
                    write!(buf, " k{i:x}")?;
                }
            }
        }

        Ok(buf)
    }
}

#[cfg(feature = "op_trace")]
#[inline]
fn op_trace(diagnostics: &dyn Diagnostics, pc: Address, op: Op) {
    diagnostics.emit(Level::Trace, &format!("{pc:04X}: {op}"));
}

#[cfg(not(feature = "op_trace"))]
#[inline]
fn op_trace(_: &dyn Diagnostics, _: Address, _: Op) {}
