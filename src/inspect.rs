//! Read-only view of the machine for debuggers and status displays
use crate::keyboard::WaitState;
use crate::{VirtualMachine, NUM_REGISTERS, STACK_DEPTH};
use serde::Serialize;
use std::fmt;

/// Copy of everything an inspector shows. Taking one never changes the machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Inspection {
    pub registers: [u8; NUM_REGISTERS],
    pub stack: [u16; STACK_DEPTH],
    pub program_counter: u16,
    pub stack_pointer: usize,
    pub index_register: u16,
    pub delay_timer: u8,
    pub sound_timer: u8,
    pub cycles: u64,
    /// register an FX0A is waiting to fill, if any
    pub awaiting_key: Option<u8>,
    pub halted: bool,
}

impl VirtualMachine {
    pub fn inspect(&self) -> Inspection {
        Inspection {
            registers: self.v,
            stack: self.stack,
            program_counter: self.pc,
            stack_pointer: self.sp,
            index_register: self.addr,
            delay_timer: self.delay_timer,
            sound_timer: self.sound_timer,
            cycles: self.cycles,
            awaiting_key: match self.keyboard.wait_state() {
                WaitState::AwaitingKey(x) => Some(x),
                WaitState::Running => None,
            },
            halted: self.is_halted(),
        }
    }
}

/// Two column table: registers on the left, stack slots on the right, then
/// the special registers.
impl fmt::Display for Inspection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (v, s)) in self.registers.iter().zip(self.stack.iter()).enumerate() {
            writeln!(f, "V{:X}: {:02X}    S{:X}: {:04X}", i, v, i, s)?;
        }
        writeln!(f, "PC: {:04X}  DT: {:02X}", self.program_counter, self.delay_timer)?;
        writeln!(f, "SP: {:02X}    ST: {:02X}", self.stack_pointer, self.sound_timer)?;
        write!(f, " I: {:04X}", self.index_register)
    }
}
