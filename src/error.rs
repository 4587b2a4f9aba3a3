use crate::op::Op;
use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while loading or running a program.
///
/// `ProgramTooLarge` and `Io` are load-time failures and leave any previously
/// running machine untouched. `InvalidOpcode`, `StackOverflow`, `StackUnderflow`
/// and `ProgramCounterOutOfBounds` are fatal to the machine that raised them: it
/// halts and reports `Halted` on every later step until it is reset.
/// `OperandOutOfRange` is a refused hand-built op and leaves the machine as it was.
#[derive(Debug, Error)]
pub enum Error {
    #[error("program is {size} bytes but only {max} bytes fit in memory")]
    ProgramTooLarge { size: usize, max: usize },

    #[error("invalid opcode {opcode:#06X} at {address:#05X}")]
    InvalidOpcode { opcode: u16, address: u16 },

    #[error("stack overflow calling from {address:#05X}")]
    StackOverflow { address: u16 },

    #[error("stack underflow returning from {address:#05X}")]
    StackUnderflow { address: u16 },

    #[error("program counter {address:#05X} is outside of memory")]
    ProgramCounterOutOfBounds { address: u16 },

    #[error("operand out of range in {0}")]
    OperandOutOfRange(Op),

    #[error("virtual machine is halted")]
    Halted,

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("unable to parse config: {0}")]
    Config(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("unable to build logger: {0}")]
    Logger(String),
}

impl Error {
    /// True for the errors that stop a machine from executing any further.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::InvalidOpcode { .. }
                | Error::StackOverflow { .. }
                | Error::StackUnderflow { .. }
                | Error::ProgramCounterOutOfBounds { .. }
                | Error::Halted
        )
    }
}
