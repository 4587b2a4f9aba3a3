use crate::error::Error;
use std::convert::TryFrom;
use std::fmt;

/// The 34 CHIP-8 instructions. Register indices (`x`, `y`) are guaranteed to be
/// between 0x0 and 0xF, addresses fit in 12 bits and sprite heights in 4 bits.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Op {
    // 00E0     clear the display
    DispClear,
    // 00EE     return from a subroutine
    Return,

    // 1NNN     goto NNN
    Goto(u16),
    // 2NNN     call subroutine at NNN
    GotoSubRtn(u16),

    // 3XNN     skip next if VX == NN
    CondVxEq(u8, u8),
    // 4XNN     skip next if VX != NN
    CondVxNe(u8, u8),
    // 5XY_     skip next if VX == VY
    CondVxVyEq(u8, u8),

    // 6XNN     VX = NN
    ConstSetVx(u8, u8),
    // 7XNN     VX += NN, carry flag untouched
    ConstAddVx(u8, u8),

    // 8XYN     register to register
    AssignVyToVx(u8, u8),
    BitOpOr(u8, u8),
    BitOpAnd(u8, u8),
    BitOpXor(u8, u8),
    MathVxAddVy(u8, u8),
    MathVxMinusVy(u8, u8),
    BitOpRtShift(u8),
    MathVyMinusVx(u8, u8),
    BitOpLftShift(u8),

    // 9XY0     skip next if VX != VY
    CondVxVyNe(u8, u8),

    // ANNN     I = NNN
    MemSetI(u16),
    // BNNN     goto NNN + V0
    GotoPlusV0(u16),
    // CXNN     VX = rand() & NN
    Rand(u8, u8),
    // DXYN     draw an N row sprite from I at (VX, VY)
    DispDraw(u8, u8, u8),

    // EX9E / EXA1
    KeyOpEqVx(u8),
    KeyOpNeVx(u8),

    // FX__
    DelayGet(u8),
    KeyOpGet(u8),
    DelaySet(u8),
    SoundSet(u8),
    MemIPlusEqVx(u8),
    MemISetSprite(u8),
    Bcd(u8),
    RegDump(u8),
    RegLoad(u8),
}

/// Fixed sub-fields of an instruction word
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct Fields {
    /// low 12 bits
    pub a: u16,
    /// low 8 bits
    pub b: u8,
    /// low 4 bits
    pub n: u8,
    /// bits 8-11
    pub x: u8,
    /// bits 4-7
    pub y: u8,
}

impl From<u16> for Fields {
    fn from(word: u16) -> Self {
        Fields {
            a: word & 0x0FFF,
            b: (word & 0xFF) as u8,
            n: (word & 0xF) as u8,
            x: ((word >> 8) & 0xF) as u8,
            y: ((word >> 4) & 0xF) as u8,
        }
    }
}

/// The decoder needs the address the word was fetched from only to report it,
/// so plain `TryFrom<u16>` reports address 0. The executor uses [`Op::decode`].
impl TryFrom<u16> for Op {
    type Error = Error;

    fn try_from(word: u16) -> Result<Self, Self::Error> {
        Op::decode(word, 0)
    }
}

impl Op {
    /// Match `word` against the instruction table. `address` is where the word
    /// lives and only ends up in the error.
    pub fn decode(word: u16, address: u16) -> Result<Self, Error> {
        let Fields { a, b, n, x, y } = Fields::from(word);

        let op = match word {
            0x00E0 => Op::DispClear,
            0x00EE => Op::Return,
            _ => match word & 0xF000 {
                0x1000 => Op::Goto(a),
                0x2000 => Op::GotoSubRtn(a),
                0x3000 => Op::CondVxEq(x, b),
                0x4000 => Op::CondVxNe(x, b),
                0x5000 => Op::CondVxVyEq(x, y),
                0x6000 => Op::ConstSetVx(x, b),
                0x7000 => Op::ConstAddVx(x, b),
                0x8000 => match n {
                    0x0 => Op::AssignVyToVx(x, y),
                    0x1 => Op::BitOpOr(x, y),
                    0x2 => Op::BitOpAnd(x, y),
                    0x3 => Op::BitOpXor(x, y),
                    0x4 => Op::MathVxAddVy(x, y),
                    0x5 => Op::MathVxMinusVy(x, y),
                    0x6 => Op::BitOpRtShift(x),
                    0x7 => Op::MathVyMinusVx(x, y),
                    0xE => Op::BitOpLftShift(x),
                    _ => return Err(invalid(word, address)),
                },
                0x9000 if n == 0 => Op::CondVxVyNe(x, y),
                0xA000 => Op::MemSetI(a),
                0xB000 => Op::GotoPlusV0(a),
                0xC000 => Op::Rand(x, b),
                0xD000 => Op::DispDraw(x, y, n),
                0xE000 => match b {
                    0x9E => Op::KeyOpEqVx(x),
                    0xA1 => Op::KeyOpNeVx(x),
                    _ => return Err(invalid(word, address)),
                },
                0xF000 => match b {
                    0x07 => Op::DelayGet(x),
                    0x0A => Op::KeyOpGet(x),
                    0x15 => Op::DelaySet(x),
                    0x18 => Op::SoundSet(x),
                    0x1E => Op::MemIPlusEqVx(x),
                    0x29 => Op::MemISetSprite(x),
                    0x33 => Op::Bcd(x),
                    0x55 => Op::RegDump(x),
                    0x65 => Op::RegLoad(x),
                    _ => return Err(invalid(word, address)),
                },
                _ => return Err(invalid(word, address)),
            },
        };
        Ok(op)
    }

    /// True when every register index fits in 4 bits, every address in 12 bits
    /// and the sprite height in 4 bits. Anything [`Op::decode`] returns passes.
    pub fn in_range(&self) -> bool {
        let reg = |r: u8| r <= 0xF;
        match *self {
            Op::DispClear | Op::Return => true,
            Op::Goto(a) | Op::GotoSubRtn(a) | Op::MemSetI(a) | Op::GotoPlusV0(a) => a <= 0x0FFF,
            Op::CondVxEq(x, _)
            | Op::CondVxNe(x, _)
            | Op::ConstSetVx(x, _)
            | Op::ConstAddVx(x, _)
            | Op::Rand(x, _)
            | Op::BitOpRtShift(x)
            | Op::BitOpLftShift(x)
            | Op::KeyOpEqVx(x)
            | Op::KeyOpNeVx(x)
            | Op::DelayGet(x)
            | Op::KeyOpGet(x)
            | Op::DelaySet(x)
            | Op::SoundSet(x)
            | Op::MemIPlusEqVx(x)
            | Op::MemISetSprite(x)
            | Op::Bcd(x)
            | Op::RegDump(x)
            | Op::RegLoad(x) => reg(x),
            Op::CondVxVyEq(x, y)
            | Op::AssignVyToVx(x, y)
            | Op::BitOpOr(x, y)
            | Op::BitOpAnd(x, y)
            | Op::BitOpXor(x, y)
            | Op::MathVxAddVy(x, y)
            | Op::MathVxMinusVy(x, y)
            | Op::MathVyMinusVx(x, y)
            | Op::CondVxVyNe(x, y) => reg(x) && reg(y),
            Op::DispDraw(x, y, n) => reg(x) && reg(y) && n <= 0xF,
        }
    }

    /// Returns true if running this op changes the display
    pub fn is_display_op(&self) -> bool {
        matches!(self, Op::DispClear | Op::DispDraw(..))
    }
}

fn invalid(opcode: u16, address: u16) -> Error {
    Error::InvalidOpcode { opcode, address }
}

/// Assembler style mnemonics, as used by most CHIP-8 disassemblers.
impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Op::DispClear => write!(f, "CLS"),
            Op::Return => write!(f, "RET"),
            Op::Goto(a) => write!(f, "JP {:#05X}", a),
            Op::GotoSubRtn(a) => write!(f, "CALL {:#05X}", a),
            Op::CondVxEq(x, b) => write!(f, "SE V{:X}, {:#04X}", x, b),
            Op::CondVxNe(x, b) => write!(f, "SNE V{:X}, {:#04X}", x, b),
            Op::CondVxVyEq(x, y) => write!(f, "SE V{:X}, V{:X}", x, y),
            Op::ConstSetVx(x, b) => write!(f, "LD V{:X}, {:#04X}", x, b),
            Op::ConstAddVx(x, b) => write!(f, "ADD V{:X}, {:#04X}", x, b),
            Op::AssignVyToVx(x, y) => write!(f, "LD V{:X}, V{:X}", x, y),
            Op::BitOpOr(x, y) => write!(f, "OR V{:X}, V{:X}", x, y),
            Op::BitOpAnd(x, y) => write!(f, "AND V{:X}, V{:X}", x, y),
            Op::BitOpXor(x, y) => write!(f, "XOR V{:X}, V{:X}", x, y),
            Op::MathVxAddVy(x, y) => write!(f, "ADD V{:X}, V{:X}", x, y),
            Op::MathVxMinusVy(x, y) => write!(f, "SUB V{:X}, V{:X}", x, y),
            Op::BitOpRtShift(x) => write!(f, "SHR V{:X}", x),
            Op::MathVyMinusVx(x, y) => write!(f, "SUBN V{:X}, V{:X}", x, y),
            Op::BitOpLftShift(x) => write!(f, "SHL V{:X}", x),
            Op::CondVxVyNe(x, y) => write!(f, "SNE V{:X}, V{:X}", x, y),
            Op::MemSetI(a) => write!(f, "LD I, {:#05X}", a),
            Op::GotoPlusV0(a) => write!(f, "JP V0, {:#05X}", a),
            Op::Rand(x, b) => write!(f, "RND V{:X}, {:#04X}", x, b),
            Op::DispDraw(x, y, n) => write!(f, "DRW V{:X}, V{:X}, {}", x, y, n),
            Op::KeyOpEqVx(x) => write!(f, "SKP V{:X}", x),
            Op::KeyOpNeVx(x) => write!(f, "SKNP V{:X}", x),
            Op::DelayGet(x) => write!(f, "LD V{:X}, DT", x),
            Op::KeyOpGet(x) => write!(f, "LD V{:X}, K", x),
            Op::DelaySet(x) => write!(f, "LD DT, V{:X}", x),
            Op::SoundSet(x) => write!(f, "LD ST, V{:X}", x),
            Op::MemIPlusEqVx(x) => write!(f, "ADD I, V{:X}", x),
            Op::MemISetSprite(x) => write!(f, "LD F, V{:X}", x),
            Op::Bcd(x) => write!(f, "LD B, V{:X}", x),
            Op::RegDump(x) => write!(f, "LD [I], V{:X}", x),
            Op::RegLoad(x) => write!(f, "LD V{:X}, [I]", x),
        }
    }
}

/// Decode every word of `program` as if it were loaded at `base`. A trailing
/// odd byte is ignored. Data mixed into code shows up as decode errors, which
/// is why each entry keeps its own result.
pub fn disassemble(program: &[u8], base: u16) -> Vec<(u16, u16, Result<Op, Error>)> {
    program
        .chunks_exact(2)
        .enumerate()
        .map(|(i, pair)| {
            let address = base.wrapping_add((i * 2) as u16);
            let word = u16::from(pair[0]) << 8 | u16::from(pair[1]);
            (address, word, Op::decode(word, address))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(word: u16) -> Op {
        Op::try_from(word).unwrap()
    }

    #[test]
    fn convert_opcodes() {
        assert_eq!(op(0x00E0), Op::DispClear);
        assert_eq!(op(0x00EE), Op::Return);
        assert_eq!(op(0x1000), Op::Goto(0x000));
        assert_eq!(op(0x2AAA), Op::GotoSubRtn(0xAAA));
        assert_eq!(op(0x3FAA), Op::CondVxEq(0xF, 0xAA));
        assert_eq!(op(0x4FAA), Op::CondVxNe(0xF, 0xAA));
        assert_eq!(op(0x5FAB), Op::CondVxVyEq(0xF, 0xA));
        assert_eq!(op(0x6FAB), Op::ConstSetVx(0xF, 0xAB));
        assert_eq!(op(0x7FAB), Op::ConstAddVx(0xF, 0xAB));
        assert_eq!(op(0x8FA0), Op::AssignVyToVx(0xF, 0xA));
        assert_eq!(op(0x8FA1), Op::BitOpOr(0xF, 0xA));
        assert_eq!(op(0x8FA2), Op::BitOpAnd(0xF, 0xA));
        assert_eq!(op(0x8FA3), Op::BitOpXor(0xF, 0xA));
        assert_eq!(op(0x8FA4), Op::MathVxAddVy(0xF, 0xA));
        assert_eq!(op(0x8FA5), Op::MathVxMinusVy(0xF, 0xA));
        assert_eq!(op(0x8FA6), Op::BitOpRtShift(0xF));
        assert_eq!(op(0x8FA7), Op::MathVyMinusVx(0xF, 0xA));
        assert_eq!(op(0x8FAE), Op::BitOpLftShift(0xF));
        assert_eq!(op(0x9FA0), Op::CondVxVyNe(0xF, 0xA));
        assert_eq!(op(0xAFAB), Op::MemSetI(0xFAB));
        assert_eq!(op(0xBFAB), Op::GotoPlusV0(0xFAB));
        assert_eq!(op(0xCFAB), Op::Rand(0xF, 0xAB));
        assert_eq!(op(0xDFAB), Op::DispDraw(0xF, 0xA, 0xB));
        assert_eq!(op(0xEF9E), Op::KeyOpEqVx(0xF));
        assert_eq!(op(0xEFA1), Op::KeyOpNeVx(0xF));
        assert_eq!(op(0xF907), Op::DelayGet(0x9));
        assert_eq!(op(0xF90A), Op::KeyOpGet(0x9));
        assert_eq!(op(0xF915), Op::DelaySet(0x9));
        assert_eq!(op(0xF918), Op::SoundSet(0x9));
        assert_eq!(op(0xF91E), Op::MemIPlusEqVx(0x9));
        assert_eq!(op(0xF929), Op::MemISetSprite(0x9));
        assert_eq!(op(0xF933), Op::Bcd(0x9));
        assert_eq!(op(0xF955), Op::RegDump(0x9));
        assert_eq!(op(0xF965), Op::RegLoad(0x9));
    }

    #[test]
    fn invalid_opcodes() {
        for word in &[0x8DEF, 0x9DEF, 0xED9F, 0xFDEF, 0x0123, 0x0000, 0x00E1] {
            match Op::decode(*word, 0x2F0) {
                Err(Error::InvalidOpcode { opcode, address }) => {
                    assert_eq!(opcode, *word);
                    assert_eq!(address, 0x2F0);
                }
                other => panic!("{:#06X} decoded to {:?}", word, other),
            }
        }
    }

    #[test]
    fn decoded_ops_are_in_range() {
        for word in 0..=0xFFFFu16 {
            if let Ok(op) = Op::decode(word, 0) {
                assert!(op.in_range(), "{:#06X} decoded to {:?}", word, op);
            }
        }
    }

    #[test]
    fn out_of_range_operands() {
        assert!(!Op::ConstSetVx(0x10, 0).in_range());
        assert!(!Op::MathVxAddVy(0x1, 0x10).in_range());
        assert!(!Op::GotoPlusV0(0xFFFF).in_range());
        assert!(!Op::Goto(0x1000).in_range());
        assert!(!Op::DispDraw(0, 0, 0x10).in_range());
        assert!(Op::DispDraw(0xF, 0xF, 0xF).in_range());
    }

    #[test]
    fn fields() {
        let f = Fields::from(0xD12A);
        assert_eq!(f.a, 0x12A);
        assert_eq!(f.b, 0x2A);
        assert_eq!(f.n, 0xA);
        assert_eq!(f.x, 0x1);
        assert_eq!(f.y, 0x2);
    }

    #[test]
    fn display_ops() {
        assert!(op(0x00E0).is_display_op());
        assert!(op(0xD015).is_display_op());
        assert!(!op(0x1200).is_display_op());
    }

    #[test]
    fn mnemonics() {
        assert_eq!(op(0x1228).to_string(), "JP 0x228");
        assert_eq!(op(0x610A).to_string(), "LD V1, 0x0A");
        assert_eq!(op(0xD015).to_string(), "DRW V0, V1, 5");
        assert_eq!(op(0xFA65).to_string(), "LD VA, [I]");
    }

    #[test]
    fn disassemble_program() {
        let listing = disassemble(&[0x00, 0xE0, 0x01, 0x23, 0x12], 0x200);
        assert_eq!(listing.len(), 2);
        assert_eq!(listing[0].0, 0x200);
        assert_eq!(listing[0].1, 0x00E0);
        assert!(matches!(listing[0].2, Ok(Op::DispClear)));
        assert_eq!(listing[1].0, 0x202);
        assert!(matches!(
            listing[1].2,
            Err(Error::InvalidOpcode { address: 0x202, .. })
        ));
    }
}
