//! Instruction word decoder.
//!
//! Instructions are 32-bit words with the following fields, high to low:
//!
//! | bits  | field  | meaning                                  |
//! |-------|--------|------------------------------------------|
//! | 31    | unused |                                          |
//! | 26-30 | op     | operation code                           |
//! | 22-25 | cond   | condition mask gating execution          |
//! | 18-21 | target | target register index                    |
//! | 14-17 | src1   | first source register index              |
//! | 10-13 | src2   | second source register index             |
//! | 0-9   | offset | signed immediate, two's complement       |
//!
//! `decode` and `encode` are pure inverses over this layout. A word whose
//! op field names no operation is a fatal decode fault.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const OP_SHIFT: u32 = 26;
const OP_MASK: u32 = 0x1f;
const COND_SHIFT: u32 = 22;
const COND_MASK: u32 = 0xf;
const TARGET_SHIFT: u32 = 18;
const SRC1_SHIFT: u32 = 14;
const SRC2_SHIFT: u32 = 10;
const REG_MASK: u32 = 0xf;
const OFFSET_BITS: u32 = 10;
const OFFSET_MASK: u32 = (1 << OFFSET_BITS) - 1;

/// Smallest encodable immediate offset.
pub const OFFSET_MIN: i32 = -(1 << (OFFSET_BITS - 1));
/// Largest encodable immediate offset.
pub const OFFSET_MAX: i32 = (1 << (OFFSET_BITS - 1)) - 1;

/// Operation codes.
///
/// The instruction set is closed: arithmetic, memory access, and halt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpCode {
    /// Stop execution.
    Halt = 0,
    /// Read memory into the target register.
    Load = 1,
    /// Write the target register to memory.
    Store = 2,
    Add = 3,
    Sub = 4,
    Mul = 5,
    Div = 6,
}

impl OpCode {
    /// Decode a raw op field value.
    pub fn from_code(code: u32) -> Option<OpCode> {
        match code {
            0 => Some(OpCode::Halt),
            1 => Some(OpCode::Load),
            2 => Some(OpCode::Store),
            3 => Some(OpCode::Add),
            4 => Some(OpCode::Sub),
            5 => Some(OpCode::Mul),
            6 => Some(OpCode::Div),
            _ => None,
        }
    }

    /// The raw op field value.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Assembly mnemonic.
    pub fn mnemonic(self) -> &'static str {
        match self {
            OpCode::Halt => "HALT",
            OpCode::Load => "LOAD",
            OpCode::Store => "STORE",
            OpCode::Add => "ADD",
            OpCode::Sub => "SUB",
            OpCode::Mul => "MUL",
            OpCode::Div => "DIV",
        }
    }
}

bitflags! {
    /// Condition flags.
    ///
    /// One flag describes the sign of the last arithmetic result (M, Z, P)
    /// or an invalid computation (V). An instruction's cond field is a mask
    /// of these flags; the instruction executes when the mask and the CPU's
    /// current flag intersect.
    pub struct CondFlag: u8 {
        /// Result was negative (minus).
        const M = 0b0001;
        /// Result was zero.
        const Z = 0b0010;
        /// Result was positive.
        const P = 0b0100;
        /// Computation was invalid (e.g. divided by zero).
        const V = 0b1000;
        /// Mask matching nothing.
        const NEVER = 0;
        /// Mask matching every flag.
        const ALWAYS = Self::M.bits | Self::Z.bits | Self::P.bits | Self::V.bits;
    }
}

impl CondFlag {
    /// Parse a condition name as written in assembly: `ALWAYS`, `NEVER`,
    /// or any combination of the letters M, Z, P, V (e.g. `ZP`).
    pub fn from_name(name: &str) -> Option<CondFlag> {
        match name {
            "ALWAYS" => return Some(CondFlag::ALWAYS),
            "NEVER" => return Some(CondFlag::NEVER),
            _ => {}
        }

        let mut mask = CondFlag::empty();
        for ch in name.chars() {
            match ch {
                'M' => mask |= CondFlag::M,
                'Z' => mask |= CondFlag::Z,
                'P' => mask |= CondFlag::P,
                'V' => mask |= CondFlag::V,
                _ => return None,
            }
        }
        if name.is_empty() {
            return None;
        }
        Some(mask)
    }
}

impl std::fmt::Display for CondFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if *self == CondFlag::ALWAYS {
            return write!(f, "ALWAYS");
        }
        if self.is_empty() {
            return write!(f, "NEVER");
        }
        for (flag, letter) in [
            (CondFlag::M, 'M'),
            (CondFlag::Z, 'Z'),
            (CondFlag::P, 'P'),
            (CondFlag::V, 'V'),
        ] {
            if self.contains(flag) {
                write!(f, "{}", letter)?;
            }
        }
        Ok(())
    }
}

// bitflags types cannot derive serde; serialize the raw mask.
impl Serialize for CondFlag {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.bits())
    }
}

impl<'de> Deserialize<'de> for CondFlag {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bits = u8::deserialize(deserializer)?;
        CondFlag::from_bits(bits)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid condition mask {:#x}", bits)))
    }
}

/// A decoded instruction.
///
/// Immutable once decoded; the CPU never re-inspects the raw word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    /// Operation to perform.
    pub op: OpCode,
    /// Condition mask that must intersect the CPU's current flag.
    pub cond: CondFlag,
    /// Target register index.
    pub target: usize,
    /// First source register index.
    pub src1: usize,
    /// Second source register index.
    pub src2: usize,
    /// Signed immediate offset added to the second source operand.
    pub offset: i32,
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.op.mnemonic())?;
        if self.cond != CondFlag::ALWAYS {
            write!(f, "/{}", self.cond)?;
        }
        if self.op != OpCode::Halt {
            write!(f, " r{},r{},r{}", self.target, self.src1, self.src2)?;
            if self.offset != 0 {
                write!(f, ",{}", self.offset)?;
            }
        }
        Ok(())
    }
}

/// Decode a raw instruction word.
pub fn decode(word: i32) -> Result<Instruction, DecodeError> {
    let w = word as u32;

    let code = (w >> OP_SHIFT) & OP_MASK;
    let op = OpCode::from_code(code).ok_or(DecodeError::InvalidOpcode(code))?;

    let cond = CondFlag::from_bits_truncate(((w >> COND_SHIFT) & COND_MASK) as u8);
    let target = ((w >> TARGET_SHIFT) & REG_MASK) as usize;
    let src1 = ((w >> SRC1_SHIFT) & REG_MASK) as usize;
    let src2 = ((w >> SRC2_SHIFT) & REG_MASK) as usize;

    // Sign-extend the 10-bit offset field.
    let offset = (((w & OFFSET_MASK) as i32) << (32 - OFFSET_BITS)) >> (32 - OFFSET_BITS);

    Ok(Instruction {
        op,
        cond,
        target,
        src1,
        src2,
        offset,
    })
}

/// Encode an instruction back into a raw word.
pub fn encode(instr: &Instruction) -> Result<i32, DecodeError> {
    if instr.offset < OFFSET_MIN || instr.offset > OFFSET_MAX {
        return Err(DecodeError::OffsetOutOfRange(instr.offset));
    }

    let w = (instr.op.code() << OP_SHIFT)
        | ((instr.cond.bits() as u32) << COND_SHIFT)
        | ((instr.target as u32 & REG_MASK) << TARGET_SHIFT)
        | ((instr.src1 as u32 & REG_MASK) << SRC1_SHIFT)
        | ((instr.src2 as u32 & REG_MASK) << SRC2_SHIFT)
        | ((instr.offset as u32) & OFFSET_MASK);

    Ok(w as i32)
}

/// Errors that can occur during instruction decoding or encoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid opcode {0} in instruction word")]
    InvalidOpcode(u32),

    #[error("offset {0} does not fit in the immediate field")]
    OffsetOutOfRange(i32),
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_decode_halt() {
        // Opcode 0 with everything else zeroed: HALT/NEVER.
        let instr = decode(0).unwrap();
        assert_eq!(instr.op, OpCode::Halt);
        assert_eq!(instr.cond, CondFlag::NEVER);
    }

    #[test]
    fn test_decode_fields() {
        let instr = Instruction {
            op: OpCode::Add,
            cond: CondFlag::ALWAYS,
            target: 1,
            src1: 2,
            src2: 3,
            offset: 5,
        };
        let word = encode(&instr).unwrap();
        let decoded = decode(word).unwrap();
        assert_eq!(decoded, instr);
    }

    #[test]
    fn test_offset_sign_extension() {
        for offset in [OFFSET_MIN, -1, 0, 1, OFFSET_MAX] {
            let instr = Instruction {
                op: OpCode::Load,
                cond: CondFlag::ALWAYS,
                target: 4,
                src1: 0,
                src2: 0,
                offset,
            };
            let decoded = decode(encode(&instr).unwrap()).unwrap();
            assert_eq!(decoded.offset, offset);
        }
    }

    #[test]
    fn test_invalid_opcode() {
        // Op field 31 names no operation.
        let word = (31u32 << 26) as i32;
        assert_eq!(decode(word), Err(DecodeError::InvalidOpcode(31)));
    }

    #[test]
    fn test_offset_out_of_range() {
        let instr = Instruction {
            op: OpCode::Add,
            cond: CondFlag::ALWAYS,
            target: 0,
            src1: 0,
            src2: 0,
            offset: OFFSET_MAX + 1,
        };
        assert_eq!(
            encode(&instr),
            Err(DecodeError::OffsetOutOfRange(OFFSET_MAX + 1))
        );
    }

    #[test]
    fn test_cond_names() {
        assert_eq!(CondFlag::from_name("ALWAYS"), Some(CondFlag::ALWAYS));
        assert_eq!(CondFlag::from_name("NEVER"), Some(CondFlag::NEVER));
        assert_eq!(CondFlag::from_name("M"), Some(CondFlag::M));
        assert_eq!(
            CondFlag::from_name("ZP"),
            Some(CondFlag::Z | CondFlag::P)
        );
        assert_eq!(CondFlag::from_name("Q"), None);
        assert_eq!(CondFlag::from_name(""), None);
    }

    #[test]
    fn test_cond_display() {
        assert_eq!(CondFlag::ALWAYS.to_string(), "ALWAYS");
        assert_eq!(CondFlag::NEVER.to_string(), "NEVER");
        assert_eq!(CondFlag::M.to_string(), "M");
        assert_eq!((CondFlag::Z | CondFlag::P).to_string(), "ZP");
    }

    #[test]
    fn test_instruction_display() {
        let instr = Instruction {
            op: OpCode::Add,
            cond: CondFlag::P,
            target: 1,
            src1: 2,
            src2: 3,
            offset: -4,
        };
        assert_eq!(instr.to_string(), "ADD/P r1,r2,r3,-4");

        let halt = Instruction {
            op: OpCode::Halt,
            cond: CondFlag::ALWAYS,
            target: 0,
            src1: 0,
            src2: 0,
            offset: 0,
        };
        assert_eq!(halt.to_string(), "HALT");
    }

    proptest! {
        #[test]
        fn prop_encode_decode_roundtrip(
            code in 0u32..7,
            cond_bits in 0u8..16,
            target in 0usize..16,
            src1 in 0usize..16,
            src2 in 0usize..16,
            offset in OFFSET_MIN..=OFFSET_MAX,
        ) {
            let instr = Instruction {
                op: OpCode::from_code(code).unwrap(),
                cond: CondFlag::from_bits_truncate(cond_bits),
                target,
                src1,
                src2,
                offset,
            };
            let decoded = decode(encode(&instr).unwrap()).unwrap();
            prop_assert_eq!(decoded, instr);
        }
    }
}
