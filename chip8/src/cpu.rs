//! CPU and memory state.
use crate::{
    bytecode::word,
    constants::*,
    error::RuntimeErrorKind,
};

/// Core state for a chip8 interpreter.
///
/// Holds everything the machine mutates, and exposes plain accessors so
/// state can be arranged directly when testing individual instructions.
pub struct Chip8Cpu {
    // ------------------------------------------------------------------------
    // Registers
    /// Program counter pointing to the current position in the bytecode.
    pub(crate) pc: Address,
    /// Stack pointer, indicating the next free slot on the stack.
    pub(crate) sp: u8,
    /// General purpose registers for temporary values.
    ///
    /// Register 16 (VF) is used for either the carry flag or borrow switch depending on opcode.
    pub(crate) registers: [u8; REGISTER_COUNT],
    /// Pointer register used for temporarily storing an address.
    pub(crate) address: Address,
    /// (DT) Delay timer that counts down to 0.
    pub(crate) delay_timer: u8,
    /// (ST) Sound timer that counts down to 0. When it has a non-zero value, a beep is played.
    pub(crate) sound_timer: u8,
    /// Register waiting for a keypress, if the machine is blocked on `Fx0A`.
    pub(crate) key_wait: Option<u8>,
    /// Keyboard input state. Pressed is a 1 bit, released is a 0 bit.
    pub(crate) key_state: u16,

    // ------------------------------------------------------------------------
    // Memory
    /// Main memory storage space.
    pub(crate) ram: Box<[u8; MEM_SIZE]>,
    /// Stack of return pointers used for jumping when a routine call finishes.
    pub(crate) stack: [Address; STACK_SIZE],
    /// Screen buffer that is drawn to. Each pixel is either 0 or 1.
    pub(crate) display: Box<[u8; DISPLAY_BUFFER_SIZE]>,
    /// The display changed since the renderer last looked.
    pub(crate) dirty: bool,
}

impl Default for Chip8Cpu {
    fn default() -> Self {
        Self {
            pc: MEM_START as Address,
            sp: 0,
            registers: [0; REGISTER_COUNT],
            address: 0,
            delay_timer: 0,
            sound_timer: 0,
            key_wait: None,
            key_state: 0,

            ram: Box::new([0; MEM_SIZE]),
            stack: [0; STACK_SIZE],
            display: Box::new([0; DISPLAY_BUFFER_SIZE]),
            dirty: false,
        }
    }
}

impl Chip8Cpu {
    pub fn new() -> Self {
        Default::default()
    }

    /// Return to power-on state, with the font loaded and an otherwise empty memory.
    pub(crate) fn clear(&mut self) {
        self.pc = MEM_START as Address;
        self.sp = 0;
        self.registers.fill(0);
        self.address = 0;
        self.delay_timer = 0;
        self.sound_timer = 0;
        self.key_wait = None;
        self.key_state = 0;

        self.ram.fill(0);
        self.stack.fill(0);
        // Whatever was on screen before is gone and must be repainted.
        self.display.fill(0);
        self.dirty = true;

        let font_start = FONTSET_START as usize;
        self.ram[font_start..font_start + FONTSET_DATA_LENGTH].copy_from_slice(&FONTSET);
    }

    pub fn clear_display(&mut self) {
        self.display.fill(0);
        self.dirty = true;
    }

    // ------------------------------------------------------------------------
    // Registers

    pub fn pc(&self) -> Address {
        self.pc
    }

    pub fn set_pc(&mut self, pc: Address) {
        self.pc = pc;
    }

    pub fn register(&self, index: usize) -> u8 {
        self.registers[index & 0xF]
    }

    pub fn set_register(&mut self, index: usize, value: u8) {
        self.registers[index & 0xF] = value;
    }

    pub fn registers(&self) -> &[u8; REGISTER_COUNT] {
        &self.registers
    }

    /// Address register `I`.
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn set_address(&mut self, address: Address) {
        self.address = address;
    }

    pub fn delay_timer(&self) -> u8 {
        self.delay_timer
    }

    pub fn set_delay_timer(&mut self, value: u8) {
        self.delay_timer = value;
    }

    pub fn sound_timer(&self) -> u8 {
        self.sound_timer
    }

    pub fn set_sound_timer(&mut self, value: u8) {
        self.sound_timer = value;
    }

    // ------------------------------------------------------------------------
    // Stack

    pub fn sp(&self) -> u8 {
        self.sp
    }

    /// Return addresses currently on the stack, bottom first.
    pub fn stack(&self) -> &[Address] {
        &self.stack[..self.sp as usize]
    }

    /// Replace the stack contents. The stack pointer ends up just past the last entry.
    ///
    /// Entries beyond the stack capacity are dropped.
    pub fn set_stack(&mut self, entries: &[Address]) {
        let len = entries.len().min(STACK_SIZE);
        self.stack.fill(0);
        self.stack[..len].copy_from_slice(&entries[..len]);
        self.sp = len as u8;
    }

    pub(crate) fn push_stack(&mut self, address: Address) -> Result<(), RuntimeErrorKind> {
        let slot = self
            .stack
            .get_mut(self.sp as usize)
            .ok_or(RuntimeErrorKind::StackOverflow)?;
        *slot = address;
        self.sp += 1;
        Ok(())
    }

    pub(crate) fn pop_stack(&mut self) -> Result<Address, RuntimeErrorKind> {
        let sp = self
            .sp
            .checked_sub(1)
            .ok_or(RuntimeErrorKind::StackUnderflow)?;
        self.sp = sp;
        Ok(self.stack[sp as usize])
    }

    // ------------------------------------------------------------------------
    // Memory

    pub fn ram(&self) -> &[u8; MEM_SIZE] {
        &self.ram
    }

    pub fn ram_mut(&mut self) -> &mut [u8; MEM_SIZE] {
        &mut self.ram
    }

    /// Read a byte, wrapping the address to the 12-bit space.
    #[inline(always)]
    pub fn read(&self, address: usize) -> u8 {
        self.ram[address & ADDRESS_MASK]
    }

    /// Write a byte, wrapping the address to the 12-bit space.
    #[inline(always)]
    pub fn write(&mut self, address: usize, value: u8) {
        self.ram[address & ADDRESS_MASK] = value;
    }

    /// Extract the instruction word at the current program counter.
    #[inline(always)]
    pub fn instr_word(&self) -> u16 {
        let pc = self.pc as usize;
        word([self.read(pc), self.read(pc + 1)])
    }

    // ------------------------------------------------------------------------
    // Display

    pub fn display(&self) -> &[u8; DISPLAY_BUFFER_SIZE] {
        &self.display
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    // ------------------------------------------------------------------------
    // Keypad

    pub fn set_key_state(&mut self, key_id: u8, state: bool) {
        if key_id < KEY_COUNT {
            if state {
                self.key_state |= 1 << key_id;
            } else {
                self.key_state &= !(1 << key_id);
            }
        }
    }

    pub fn key_state(&self, key_id: u8) -> bool {
        if key_id < KEY_COUNT {
            self.key_state & (1 << key_id) > 0
        } else {
            false
        }
    }

    /// Check whether any key is pressed down.
    #[inline(always)]
    pub fn any_key(&self) -> bool {
        self.key_state > 0
    }

    /// Register that will receive the next key press, if blocked.
    pub fn key_wait(&self) -> Option<u8> {
        self.key_wait
    }

    /// Count down both timers, stopping at zero.
    #[inline]
    pub fn tick_timers(&mut self) {
        self.delay_timer = self.delay_timer.saturating_sub(1);
        self.sound_timer = self.sound_timer.saturating_sub(1);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_key_state() {
        let mut cpu = Chip8Cpu::default();

        cpu.set_key_state(0, true);
        assert_eq!(cpu.key_state, 0b00000000_00000001);
        assert!(cpu.key_state(0));
        assert!(!cpu.key_state(1));

        cpu.set_key_state(7, true);
        assert_eq!(cpu.key_state, 0b00000000_10000001);
        assert!(cpu.key_state(7));

        cpu.set_key_state(0, false);
        assert_eq!(cpu.key_state, 0b00000000_10000000);
        assert!(!cpu.key_state(0));
        assert!(cpu.any_key());

        cpu.set_key_state(15, true);
        assert_eq!(cpu.key_state, 0b10000000_10000000);
        assert!(cpu.key_state(15));

        // out of range keys are ignored
        cpu.set_key_state(16, true);
        assert_eq!(cpu.key_state, 0b10000000_10000000);
        assert!(!cpu.key_state(16));
    }

    #[test]
    fn test_stack_bounds() {
        let mut cpu = Chip8Cpu::new();
        assert_eq!(cpu.pop_stack(), Err(RuntimeErrorKind::StackUnderflow));

        for i in 0..STACK_SIZE {
            cpu.push_stack(i as Address).unwrap();
        }
        assert_eq!(cpu.sp(), 16);
        assert_eq!(cpu.push_stack(0x300), Err(RuntimeErrorKind::StackOverflow));
        assert_eq!(cpu.sp(), 16);

        assert_eq!(cpu.pop_stack(), Ok(15));
        assert_eq!(cpu.sp(), 15);
    }

    #[test]
    fn test_set_stack() {
        let mut cpu = Chip8Cpu::new();
        cpu.set_stack(&[0x200, 0x246]);
        assert_eq!(cpu.sp(), 2);
        assert_eq!(cpu.stack(), &[0x200, 0x246]);
    }

    #[test]
    fn test_timers_saturate() {
        let mut cpu = Chip8Cpu::new();
        cpu.set_delay_timer(1);
        cpu.tick_timers();
        cpu.tick_timers();
        assert_eq!(cpu.delay_timer(), 0);
        assert_eq!(cpu.sound_timer(), 0);
    }

    #[test]
    fn test_clear_loads_font() {
        let mut cpu = Chip8Cpu::new();
        cpu.set_register(3, 9);
        cpu.write(0x300, 0xAB);
        cpu.clear();

        assert_eq!(&cpu.ram()[..FONTSET_DATA_LENGTH], &FONTSET[..]);
        assert_eq!(cpu.read(0x300), 0);
        assert_eq!(cpu.register(3), 0);
        assert_eq!(cpu.pc(), 0x200);
    }

    #[test]
    fn test_instr_word_wraps() {
        let mut cpu = Chip8Cpu::new();
        cpu.write(0xFFF, 0x12);
        cpu.write(0x000, 0x34);
        cpu.set_pc(0xFFF);
        assert_eq!(cpu.instr_word(), 0x1234);
    }
}
