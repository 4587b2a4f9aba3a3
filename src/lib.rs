//! A CHIP-8 virtual machine. The interpreter is a plain value: something else
//! (see [`stepper`]) has to call [`VirtualMachine::execute`] at the clock rate and
//! [`VirtualMachine::tick_timers`] at 60 Hz, and deliver key events.
#[macro_use]
extern crate slog;

// # Interpreter
// * 4096 (0x1000) bytes of memory
// * the bootstrap region (hex font set) lives below the program base 0x200
// * 16 8-bit registers: V0 - VF
// * VF is the carry flag in addition, "no borrow" flag in subtraction, shifted out
// bit in shifts, and collision flag when drawing
// * the index register I is 12 bits wide but kept in a u16 so overflow past
// 0x1000 can be seen
// * the stack only stores return addresses, 16 deep

// # Timers
// * two 8-bit timers counting down at 60 hertz while nonzero
//  - delay timer is used for events, it can be set and read
//  - sound timer beeps when its value is nonzero

// # Input
// a 16 key hex keypad, 0 - F. FX0A parks the interpreter until a key goes down.

// # Graphics
// 64x32 monochrome pixels, sprites are XORed on and wrap at the edges

pub mod config;
pub mod error;
pub mod graphics;
pub mod inspect;
pub mod keyboard;
pub mod logger;
pub mod op;
pub mod rom;
pub mod session;
pub mod stepper;


pub use crate::config::Config;
pub use crate::error::{Error, Result};
pub use crate::graphics::{Framebuffer, Renderer, HEIGHT, WIDTH};
pub use crate::inspect::Inspection;
pub use crate::keyboard::{AsKeyboard, Key, WaitState};
pub use crate::op::Op;

use crate::keyboard::{Keyboard, NUM_KEYS};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use slog::Logger;
use std::fmt;
use std::fs;
use std::path::Path;

pub const MEMORY_SIZE: usize = 0x1000;
/// Where programs are loaded unless told otherwise
pub const BASE: usize = 0x200;
pub const STACK_DEPTH: usize = 16;
pub const NUM_REGISTERS: usize = 16;

/// VF
const FLAG: usize = 0xF;

pub struct VirtualMachine {
    pub(crate) memory: [u8; MEMORY_SIZE],

    pub(crate) stack: [u16; STACK_DEPTH], // return addresses
    pub(crate) sp: usize,                 // number of addresses on the stack

    pub(crate) addr: u16, // index register I
    pub(crate) pc: u16,   // program counter

    // 16 8-bit registers. VF is used as a flag by several of the opcodes (see @Op)
    pub(crate) v: [u8; NUM_REGISTERS],

    pub(crate) graphics: Framebuffer,

    pub(crate) delay_timer: u8,
    pub(crate) sound_timer: u8,

    pub(crate) keyboard: Keyboard,

    pub(crate) cycles: u64, // instructions executed since the last reset
    halted: bool,
    fault: Option<String>, // why the machine halted

    // kept so a reset can rebuild memory exactly as it was after loading
    program: Vec<u8>,
    base: u16,

    rng: StdRng,
    logger: Logger,
}

impl VirtualMachine {
    /// A machine with an empty program at [`BASE`]
    pub fn new(logger: Option<Logger>) -> Self {
        Self::with_image(Vec::new(), BASE as u16, logger)
    }

    /// A machine running the built-in boot program
    pub fn boot(logger: Option<Logger>) -> Self {
        Self::with_image(rom::BOOT.to_vec(), BASE as u16, logger)
    }

    /// Copy `program` into memory at `base` and reset everything else.
    pub fn load(program: &[u8], base: usize, logger: Option<Logger>) -> Result<Self> {
        let max = MEMORY_SIZE.saturating_sub(base);
        if base > MEMORY_SIZE || program.len() > max {
            return Err(Error::ProgramTooLarge {
                size: program.len(),
                max,
            });
        }
        Ok(Self::with_image(program.to_vec(), base as u16, logger))
    }

    /// Read a raw program file and [`load`](Self::load) it. I/O failures come back
    /// as [`Error::Io`].
    pub fn with_program_file<P: AsRef<Path>>(
        path: P,
        base: usize,
        logger: Option<Logger>,
    ) -> Result<Self> {
        let program = fs::read(path.as_ref())?;
        Self::load(&program, base, logger)
    }

    fn with_image(program: Vec<u8>, base: u16, logger: Option<Logger>) -> Self {
        let logger = crate::logger::or_discard(logger);
        info!(logger, "loading program"; "bytes" => program.len(), "base" => format!("{:#05X}", base));

        let mut vm = VirtualMachine {
            memory: [0; MEMORY_SIZE],
            stack: [0; STACK_DEPTH],
            sp: 0,
            addr: 0,
            pc: base,
            v: [0; NUM_REGISTERS],
            graphics: Framebuffer::new(),
            delay_timer: 0,
            sound_timer: 0,
            keyboard: Keyboard::new(),
            cycles: 0,
            halted: false,
            fault: None,
            program,
            base,
            rng: StdRng::from_entropy(),
            logger,
        };
        vm.reset();
        vm
    }

    /// Seed the random number generator used by CXNN, for reproducible runs
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Put the machine back into its freshly loaded state. The program stays.
    pub fn reset(&mut self) {
        let base = self.base as usize;
        self.memory = [0; MEMORY_SIZE];
        rom::write_bootstrap(&mut self.memory[..base]);
        self.memory[base..base + self.program.len()].copy_from_slice(&self.program);

        self.stack = [0; STACK_DEPTH];
        self.sp = 0;
        self.addr = 0;
        self.pc = self.base;
        self.v = [0; NUM_REGISTERS];
        self.graphics.clear();
        self.delay_timer = 0;
        self.sound_timer = 0;
        self.keyboard = Keyboard::new();
        self.cycles = 0;
        self.halted = false;
        self.fault = None;

        debug!(self.logger, "reset");
    }

    /// Run one fetch-decode-execute cycle and return the op that ran. While an
    /// FX0A is waiting on a key nothing happens and `None` comes back. A fatal
    /// error halts the machine; from then on every call returns [`Error::Halted`].
    pub fn execute(&mut self) -> Result<Option<Op>> {
        if self.halted {
            return Err(Error::Halted);
        }
        if self.keyboard.is_blocking() {
            return Ok(None);
        }

        let address = self.pc;
        let word = match self.fetch() {
            Ok(word) => word,
            Err(e) => return Err(self.halt(e)),
        };
        let op = match Op::decode(word, address) {
            Ok(op) => op,
            Err(e) => return Err(self.halt(e)),
        };
        trace!(self.logger, "execute"; "pc" => format!("{:#05X}", address), "op" => %op);

        self.execute_op(op)?;
        Ok(Some(op))
    }

    /// Apply an already decoded op against the current state. The program counter
    /// is not advanced first, so jumps and skips act relative to wherever it
    /// currently points. An op with a register, address or height that no
    /// instruction word could encode is refused with
    /// [`Error::OperandOutOfRange`] and changes nothing.
    pub fn execute_op(&mut self, op: Op) -> Result<()> {
        if self.halted {
            return Err(Error::Halted);
        }
        if !op.in_range() {
            return Err(Error::OperandOutOfRange(op));
        }
        match self.apply(op) {
            Ok(()) => {
                self.cycles += 1;
                Ok(())
            }
            Err(e) => Err(self.halt(e)),
        }
    }

    fn halt(&mut self, err: Error) -> Error {
        self.halted = true;
        self.fault = Some(err.to_string());
        error!(self.logger, "halting"; "error" => %err, "cycles" => self.cycles);
        err
    }

    /// Read the big-endian word at the program counter and step past it
    fn fetch(&mut self) -> Result<u16> {
        let pc = self.pc as usize;
        if pc + 1 >= MEMORY_SIZE {
            return Err(Error::ProgramCounterOutOfBounds { address: self.pc });
        }
        let word = u16::from(self.memory[pc]) << 8 | u16::from(self.memory[pc + 1]);
        self.pc += 2;
        Ok(word)
    }

    fn apply(&mut self, op: Op) -> Result<()> {
        match op {
            Op::DispClear => self.graphics.clear(),
            Op::Return => {
                if self.sp == 0 {
                    return Err(Error::StackUnderflow {
                        address: self.pc.wrapping_sub(2),
                    });
                }
                self.sp -= 1;
                self.pc = self.stack[self.sp];
            }
            Op::Goto(a) => self.pc = a,
            Op::GotoSubRtn(a) => {
                if self.sp >= STACK_DEPTH {
                    return Err(Error::StackOverflow {
                        address: self.pc.wrapping_sub(2),
                    });
                }
                self.stack[self.sp] = self.pc;
                self.sp += 1;
                self.pc = a;
            }
            Op::CondVxEq(x, b) => self.skip_if(self.v[x as usize] == b),
            Op::CondVxNe(x, b) => self.skip_if(self.v[x as usize] != b),
            Op::CondVxVyEq(x, y) => self.skip_if(self.v[x as usize] == self.v[y as usize]),
            Op::ConstSetVx(x, b) => self.v[x as usize] = b,
            Op::ConstAddVx(x, b) => self.v[x as usize] = self.v[x as usize].wrapping_add(b),
            Op::AssignVyToVx(x, y) => self.v[x as usize] = self.v[y as usize],
            Op::BitOpOr(x, y) => self.v[x as usize] |= self.v[y as usize],
            Op::BitOpAnd(x, y) => self.v[x as usize] &= self.v[y as usize],
            Op::BitOpXor(x, y) => self.v[x as usize] ^= self.v[y as usize],
            Op::MathVxAddVy(x, y) => {
                let (sum, carry) = self.v[x as usize].overflowing_add(self.v[y as usize]);
                self.v[x as usize] = sum;
                self.v[FLAG] = carry as u8;
            }
            // the flag is written before the result in the three ops below, so
            // with x == 0xF the result wins
            Op::MathVxMinusVy(x, y) => {
                let (vx, vy) = (self.v[x as usize], self.v[y as usize]);
                self.v[FLAG] = (vx >= vy) as u8;
                self.v[x as usize] = vx.wrapping_sub(vy);
            }
            Op::MathVyMinusVx(x, y) => {
                let (vx, vy) = (self.v[x as usize], self.v[y as usize]);
                self.v[FLAG] = (vy >= vx) as u8;
                self.v[x as usize] = vy.wrapping_sub(vx);
            }
            Op::BitOpRtShift(x) => {
                let vx = self.v[x as usize];
                self.v[FLAG] = vx & 0x1;
                self.v[x as usize] = vx >> 1;
            }
            Op::BitOpLftShift(x) => {
                let vx = self.v[x as usize];
                self.v[FLAG] = vx >> 7;
                self.v[x as usize] = vx << 1;
            }
            Op::CondVxVyNe(x, y) => self.skip_if(self.v[x as usize] != self.v[y as usize]),
            Op::MemSetI(a) => self.addr = a,
            Op::GotoPlusV0(a) => self.pc = a + u16::from(self.v[0]),
            Op::Rand(x, b) => self.v[x as usize] = self.rng.gen::<u8>() & b,
            Op::DispDraw(x, y, n) => self.draw(x, y, n),
            Op::KeyOpEqVx(x) => {
                let pressed = self.keyboard.get_key_state(self.v[x as usize] as usize);
                self.skip_if(pressed);
            }
            Op::KeyOpNeVx(x) => {
                let pressed = self.keyboard.get_key_state(self.v[x as usize] as usize);
                self.skip_if(!pressed);
            }
            Op::DelayGet(x) => self.v[x as usize] = self.delay_timer,
            Op::KeyOpGet(x) => {
                debug!(self.logger, "waiting for key"; "register" => x);
                self.keyboard.block(x);
            }
            Op::DelaySet(x) => self.delay_timer = self.v[x as usize],
            Op::SoundSet(x) => self.sound_timer = self.v[x as usize],
            Op::MemIPlusEqVx(x) => {
                self.addr = self.addr.wrapping_add(u16::from(self.v[x as usize]));
                self.v[FLAG] = (self.addr as usize >= MEMORY_SIZE) as u8;
            }
            Op::MemISetSprite(x) => {
                self.addr = u16::from(self.v[x as usize]) * rom::FONT_GLYPH_BYTES as u16;
            }
            Op::Bcd(x) => {
                let digits = double_dabble(self.v[x as usize]);
                for (i, digit) in digits.iter().enumerate() {
                    self.write_byte(self.addr as usize + i, *digit);
                }
            }
            Op::RegDump(x) => {
                for i in 0..=x as usize {
                    self.write_byte(self.addr as usize + i, self.v[i]);
                }
            }
            Op::RegLoad(x) => {
                for i in 0..=x as usize {
                    self.v[i] = self.read_byte(self.addr as usize + i);
                }
            }
        }
        Ok(())
    }

    fn skip_if(&mut self, cond: bool) {
        if cond {
            self.pc = self.pc.wrapping_add(2);
        }
    }

    /// XOR an `n` row sprite from memory at I onto the display at (VX, VY)
    fn draw(&mut self, x: u8, y: u8, n: u8) {
        let (col, row) = (self.v[x as usize] as usize, self.v[y as usize] as usize);

        let mut sprite = [0u8; 15];
        for (j, line) in sprite.iter_mut().enumerate().take(n as usize) {
            *line = self.read_byte(self.addr as usize + j);
        }

        let collision = self.graphics.draw_sprite(col, row, &sprite[..n as usize]);
        self.v[FLAG] = collision as u8;
    }

    /// Out of range reads come back as 0
    fn read_byte(&self, address: usize) -> u8 {
        self.memory.get(address).copied().unwrap_or(0)
    }

    /// Out of range writes are dropped
    fn write_byte(&mut self, address: usize, value: u8) {
        if let Some(b) = self.memory.get_mut(address) {
            *b = value;
        }
    }

    /// Handle a key going down. If an FX0A is waiting, the key's code lands in
    /// its register and execution resumes. Codes past 0xF are ignored.
    pub fn press_key(&mut self, code: u8) {
        if let Some(reg) = self.keyboard.press(code) {
            self.v[reg as usize] = code;
            debug!(self.logger, "key resolved wait"; "key" => code, "register" => reg);
        }
    }

    /// Handle a key going up. Codes past 0xF are ignored.
    pub fn release_key(&mut self, code: u8) {
        self.keyboard.release(code);
    }

    /// Given a source of currently held keys, fire press and release events for
    /// every key whose state changed since the last call
    pub fn handle_key_input<K: AsKeyboard>(&mut self, keyboard: &K) {
        let down: Vec<u8> = keyboard.keys_down().into_iter().map(Key::code).collect();

        // check each of the 16 keys to see which have changed from up to down or vice versa
        for code in 0..NUM_KEYS as u8 {
            let host_down = down.contains(&code);
            let vm_down = self.keyboard.get_key_state(code as usize);

            if host_down && !vm_down {
                self.press_key(code);
            } else if !host_down && vm_down {
                self.release_key(code);
            }
        }
    }

    /// Count both timers down by one if they are nonzero. Meant to be called at
    /// 60 Hz regardless of how fast instructions run.
    pub fn tick_timers(&mut self) {
        self.delay_timer = self.delay_timer.saturating_sub(1);
        self.sound_timer = self.sound_timer.saturating_sub(1);
    }

    /// True while a tone should be playing
    pub fn sound_active(&self) -> bool {
        self.sound_timer > 0
    }

    pub fn framebuffer(&self) -> &Framebuffer {
        &self.graphics
    }

    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    pub fn registers(&self) -> &[u8; NUM_REGISTERS] {
        &self.v
    }

    pub fn program_counter(&self) -> u16 {
        self.pc
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// The error that halted the machine, until the next reset
    pub fn fault(&self) -> Option<&str> {
        self.fault.as_deref()
    }

    pub fn wait_state(&self) -> WaitState {
        self.keyboard.wait_state()
    }

    pub fn is_key_down(&self, code: u8) -> bool {
        self.keyboard.get_key_state(code as usize)
    }

    /// The program bytes as they were loaded
    pub fn program(&self) -> &[u8] {
        &self.program
    }

    pub fn base(&self) -> u16 {
        self.base
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }
}

impl fmt::Debug for VirtualMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualMachine")
            .field("pc", &format_args!("{:#05X}", self.pc))
            .field("i", &format_args!("{:#05X}", self.addr))
            .field("sp", &self.sp)
            .field("v", &self.v)
            .field("cycles", &self.cycles)
            .field("fault", &self.fault)
            .field("wait", &self.keyboard.wait_state())
            .finish()
    }
}

/// Split a byte into hundreds, tens and ones with shift-and-add-3, no division.
pub fn double_dabble(value: u8) -> [u8; 3] {
    let mut scratch: u32 = 0;
    for i in 0..8 {
        for &shift in &[0u32, 4, 8] {
            if (scratch >> shift) & 0xF >= 5 {
                scratch += 3u32 << shift;
            }
        }
        scratch = (scratch << 1) | ((u32::from(value) >> (7 - i)) & 1);
    }
    [
        ((scratch >> 8) & 0xF) as u8,
        ((scratch >> 4) & 0xF) as u8,
        (scratch & 0xF) as u8,
    ]
}
