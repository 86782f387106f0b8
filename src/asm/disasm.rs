//! Disassembler.
//!
//! Converts raw instruction words back to readable assembly.

use crate::cpu::decode::decode;

/// Disassemble a single instruction word to text.
pub fn disassemble_instruction(word: i32) -> String {
    match decode(word) {
        Ok(instr) => instr.to_string(),
        Err(_) => format!("??? ; {:#010x}", word as u32),
    }
}

/// Disassemble a program image to a listing.
pub fn disassemble(words: &[i32]) -> String {
    let mut output = String::new();
    output.push_str("; Disassembly\n");
    output.push_str("; -----------\n\n");

    for (addr, word) in words.iter().enumerate() {
        let line = disassemble_instruction(*word);
        output.push_str(&format!("{:4}: {:28} ; {:#010x}\n", addr, line, *word as u32));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::{encode, CondFlag, Instruction, OpCode};

    #[test]
    fn test_disassemble_instruction() {
        let word = encode(&Instruction {
            op: OpCode::Add,
            cond: CondFlag::M,
            target: 1,
            src1: 2,
            src2: 3,
            offset: 7,
        })
        .unwrap();

        assert_eq!(disassemble_instruction(word), "ADD/M r1,r2,r3,7");
    }

    #[test]
    fn test_disassemble_unknown_word() {
        let bad_word = (31u32 << 26) as i32;
        assert!(disassemble_instruction(bad_word).starts_with("???"));
    }

    #[test]
    fn test_disassemble_listing() {
        let halt = encode(&Instruction {
            op: OpCode::Halt,
            cond: CondFlag::ALWAYS,
            target: 0,
            src1: 0,
            src2: 0,
            offset: 0,
        })
        .unwrap();

        let listing = disassemble(&[halt]);
        assert!(listing.contains("0: HALT"));
    }
}
