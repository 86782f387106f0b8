//! Two-pass assembler.
//!
//! Syntax:
//! ```text
//! ; Comment
//! LOOP:                   ; Define a label
//!     ADD r1,r0,r0,5      ; target,src1,src2 and an optional offset
//!     SUB/Z r2,r1,r3      ; condition mask suffix on the mnemonic
//!     LOAD r4,r0,r0,TABLE ; labels resolve to their address
//!     STORE r4,r0,r0,100
//!     JUMP LOOP           ; pseudo: ADD r15,r0,r0,LOOP
//!     MOVE r2,r1          ; pseudo: ADD r2,r1,r0
//!     NOP                 ; pseudo: ADD r0,r0,r0
//!     HALT
//!
//!     ORG 100             ; Set origin address
//! TABLE:
//!     DAT 42              ; Define a data word
//! ```
//!
//! Register names are `r0`..`r15` (`pc` is accepted for `r15`). Values are
//! decimal or `0x` hex literals, or label references resolved in pass two.

use crate::cpu::decode::{encode, CondFlag, DecodeError, Instruction, OpCode};
use crate::cpu::registers::{NUM_REGISTERS, PC_REG};
use std::collections::HashMap;
use thiserror::Error;

/// Assemble source text into a program image loaded at address 0.
pub fn assemble(source: &str) -> Result<Vec<i32>, AssemblerError> {
    let mut asm = Assembler::new();
    asm.assemble(source)
}

/// A numeric operand, possibly still a label reference.
#[derive(Debug, Clone)]
enum Operand {
    Value(i32),
    Label(String),
}

#[derive(Debug, Clone)]
enum StmtBody {
    /// A raw data word (DAT).
    Data(Operand),
    /// An instruction with an unresolved offset operand.
    Instr {
        op: OpCode,
        cond: CondFlag,
        target: usize,
        src1: usize,
        src2: usize,
        offset: Operand,
    },
}

#[derive(Debug, Clone)]
struct Statement {
    line: usize,
    addr: usize,
    body: StmtBody,
}

/// The assembler state.
struct Assembler {
    /// Address the next emitted word will occupy.
    current_addr: usize,
    /// Symbol table (label -> address).
    symbols: HashMap<String, usize>,
    /// Parsed statements awaiting label resolution.
    statements: Vec<Statement>,
}

impl Assembler {
    fn new() -> Self {
        Self {
            current_addr: 0,
            symbols: HashMap::new(),
            statements: Vec::new(),
        }
    }

    fn assemble(&mut self, source: &str) -> Result<Vec<i32>, AssemblerError> {
        // Pass 1: collect labels and parse statements
        for (line_num, line) in source.lines().enumerate() {
            self.process_line(line, line_num + 1)?;
        }

        // Pass 2: resolve references and encode
        let size = self
            .statements
            .iter()
            .map(|s| s.addr + 1)
            .max()
            .unwrap_or(0);
        let mut words = vec![0i32; size];

        for stmt in &self.statements {
            words[stmt.addr] = self.encode_statement(stmt)?;
        }

        Ok(words)
    }

    fn process_line(&mut self, line: &str, line_num: usize) -> Result<(), AssemblerError> {
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with(';') {
            return Ok(());
        }

        // Remove inline comments
        let line = if let Some(idx) = line.find(';') {
            line[..idx].trim()
        } else {
            line
        };

        if line.is_empty() {
            return Ok(());
        }

        // Check for label definition
        if let Some(colon_idx) = line.find(':') {
            let label = line[..colon_idx].trim().to_uppercase();
            if !label.is_empty() {
                if self.symbols.contains_key(&label) {
                    return Err(AssemblerError::DuplicateLabel {
                        line: line_num,
                        label,
                    });
                }
                self.symbols.insert(label, self.current_addr);
            }

            // Process rest of line if any
            let rest = line[colon_idx + 1..].trim();
            if !rest.is_empty() {
                return self.process_statement(rest, line_num);
            }
            return Ok(());
        }

        self.process_statement(line, line_num)
    }

    fn process_statement(&mut self, line: &str, line_num: usize) -> Result<(), AssemblerError> {
        let (head, rest) = match line.split_once(char::is_whitespace) {
            Some((head, rest)) => (head.to_uppercase(), rest.trim()),
            None => (line.to_uppercase(), ""),
        };

        match head.as_str() {
            // Directives
            "ORG" => {
                let addr = self.parse_value(rest, line_num)?;
                let addr = match addr {
                    Operand::Value(v) if v >= 0 => v as usize,
                    Operand::Value(v) => {
                        return Err(AssemblerError::ValueOutOfRange {
                            line: line_num,
                            value: v,
                        })
                    }
                    Operand::Label(_) => {
                        return Err(AssemblerError::SyntaxError {
                            line: line_num,
                            message: "ORG requires a numeric address".into(),
                        })
                    }
                };
                if addr < self.current_addr {
                    return Err(AssemblerError::SyntaxError {
                        line: line_num,
                        message: "ORG cannot move backwards".into(),
                    });
                }
                self.current_addr = addr;
            }

            "DAT" | "DATA" => {
                if rest.is_empty() {
                    return Err(AssemblerError::SyntaxError {
                        line: line_num,
                        message: "DAT requires a value".into(),
                    });
                }
                let value = self.parse_value(rest, line_num)?;
                self.emit(line_num, StmtBody::Data(value));
            }

            // Instructions and pseudo-instructions
            _ => {
                let body = self.parse_instruction(&head, rest, line_num)?;
                self.emit(line_num, body);
            }
        }

        Ok(())
    }

    fn parse_instruction(
        &mut self,
        mnemonic: &str,
        operands: &str,
        line_num: usize,
    ) -> Result<StmtBody, AssemblerError> {
        // Split an optional /COND suffix off the mnemonic
        let (name, cond) = match mnemonic.split_once('/') {
            Some((name, cond_name)) => {
                let cond = CondFlag::from_name(cond_name).ok_or_else(|| {
                    AssemblerError::SyntaxError {
                        line: line_num,
                        message: format!("unknown condition '{}'", cond_name),
                    }
                })?;
                (name, cond)
            }
            None => (mnemonic, CondFlag::ALWAYS),
        };

        let op = match name {
            "ADD" => OpCode::Add,
            "SUB" => OpCode::Sub,
            "MUL" => OpCode::Mul,
            "DIV" => OpCode::Div,
            "LOAD" => OpCode::Load,
            "STORE" => OpCode::Store,

            "HALT" | "HLT" => {
                return Ok(StmtBody::Instr {
                    op: OpCode::Halt,
                    cond,
                    target: 0,
                    src1: 0,
                    src2: 0,
                    offset: Operand::Value(0),
                })
            }

            // Pseudo: JUMP addr = ADD r15,r0,r0,addr
            "JUMP" | "JMP" => {
                let offset = self.parse_value(operands, line_num)?;
                return Ok(StmtBody::Instr {
                    op: OpCode::Add,
                    cond,
                    target: PC_REG,
                    src1: 0,
                    src2: 0,
                    offset,
                });
            }

            // Pseudo: MOVE rd,rs = ADD rd,rs,r0
            "MOVE" | "MOV" => {
                let parts: Vec<&str> = operands.split(',').map(str::trim).collect();
                if parts.len() != 2 {
                    return Err(AssemblerError::SyntaxError {
                        line: line_num,
                        message: "MOVE requires two registers".into(),
                    });
                }
                return Ok(StmtBody::Instr {
                    op: OpCode::Add,
                    cond,
                    target: self.parse_register(parts[0], line_num)?,
                    src1: self.parse_register(parts[1], line_num)?,
                    src2: 0,
                    offset: Operand::Value(0),
                });
            }

            // Pseudo: NOP = ADD r0,r0,r0
            "NOP" => {
                return Ok(StmtBody::Instr {
                    op: OpCode::Add,
                    cond,
                    target: 0,
                    src1: 0,
                    src2: 0,
                    offset: Operand::Value(0),
                })
            }

            _ => {
                return Err(AssemblerError::UnknownMnemonic {
                    line: line_num,
                    mnemonic: mnemonic.to_string(),
                })
            }
        };

        // Regular form: target,src1,src2[,offset]
        let parts: Vec<&str> = operands.split(',').map(str::trim).collect();
        if parts.len() < 3 || parts.len() > 4 {
            return Err(AssemblerError::SyntaxError {
                line: line_num,
                message: format!("{} requires target,src1,src2[,offset]", name),
            });
        }

        let target = self.parse_register(parts[0], line_num)?;
        let src1 = self.parse_register(parts[1], line_num)?;
        let src2 = self.parse_register(parts[2], line_num)?;
        let offset = if parts.len() == 4 {
            self.parse_value(parts[3], line_num)?
        } else {
            Operand::Value(0)
        };

        Ok(StmtBody::Instr {
            op,
            cond,
            target,
            src1,
            src2,
            offset,
        })
    }

    fn parse_register(&self, operand: &str, line_num: usize) -> Result<usize, AssemblerError> {
        let upper = operand.to_uppercase();
        if upper == "PC" {
            return Ok(PC_REG);
        }

        let index = upper
            .strip_prefix('R')
            .and_then(|digits| digits.parse::<usize>().ok())
            .filter(|index| *index < NUM_REGISTERS);

        index.ok_or_else(|| AssemblerError::SyntaxError {
            line: line_num,
            message: format!("invalid register '{}'", operand),
        })
    }

    fn parse_value(&self, operand: &str, line_num: usize) -> Result<Operand, AssemblerError> {
        let operand = operand.trim();
        if operand.is_empty() {
            return Err(AssemblerError::SyntaxError {
                line: line_num,
                message: "missing value".into(),
            });
        }

        // Hex literal
        if let Some(hex) = operand
            .strip_prefix("0x")
            .or_else(|| operand.strip_prefix("0X"))
        {
            return i32::from_str_radix(hex, 16)
                .map(Operand::Value)
                .map_err(|_| AssemblerError::SyntaxError {
                    line: line_num,
                    message: format!("invalid hex literal '{}'", operand),
                });
        }

        // Decimal number
        if let Ok(num) = operand.parse::<i32>() {
            return Ok(Operand::Value(num));
        }

        // Label reference, resolved in pass 2
        Ok(Operand::Label(operand.to_uppercase()))
    }

    fn emit(&mut self, line: usize, body: StmtBody) {
        self.statements.push(Statement {
            line,
            addr: self.current_addr,
            body,
        });
        self.current_addr += 1;
    }

    fn resolve(&self, operand: &Operand, line: usize) -> Result<i32, AssemblerError> {
        match operand {
            Operand::Value(value) => Ok(*value),
            Operand::Label(label) => self
                .symbols
                .get(label)
                .map(|addr| *addr as i32)
                .ok_or_else(|| AssemblerError::UndefinedLabel {
                    line,
                    label: label.clone(),
                }),
        }
    }

    fn encode_statement(&self, stmt: &Statement) -> Result<i32, AssemblerError> {
        match &stmt.body {
            StmtBody::Data(operand) => self.resolve(operand, stmt.line),
            StmtBody::Instr {
                op,
                cond,
                target,
                src1,
                src2,
                offset,
            } => {
                let offset = self.resolve(offset, stmt.line)?;
                encode(&Instruction {
                    op: *op,
                    cond: *cond,
                    target: *target,
                    src1: *src1,
                    src2: *src2,
                    offset,
                })
                .map_err(|err| match err {
                    DecodeError::OffsetOutOfRange(value) => AssemblerError::ValueOutOfRange {
                        line: stmt.line,
                        value,
                    },
                    other => AssemblerError::SyntaxError {
                        line: stmt.line,
                        message: other.to_string(),
                    },
                })
            }
        }
    }
}

/// Errors that can occur during assembly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblerError {
    #[error("syntax error on line {line}: {message}")]
    SyntaxError { line: usize, message: String },

    #[error("unknown mnemonic on line {line}: {mnemonic}")]
    UnknownMnemonic { line: usize, mnemonic: String },

    #[error("undefined label on line {line}: {label}")]
    UndefinedLabel { line: usize, label: String },

    #[error("duplicate label on line {line}: {label}")]
    DuplicateLabel { line: usize, label: String },

    #[error("value out of range on line {line}: {value}")]
    ValueOutOfRange { line: usize, value: i32 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::decode::decode;

    #[test]
    fn test_assemble_simple() {
        let source = r#"
            ; Store 5 at address 100, then stop
            ADD r1,r0,r0,5
            STORE r1,r0,r0,100
            HALT
        "#;

        let words = assemble(source).unwrap();
        assert_eq!(words.len(), 3);

        let first = decode(words[0]).unwrap();
        assert_eq!(first.op, OpCode::Add);
        assert_eq!(first.cond, CondFlag::ALWAYS);
        assert_eq!(first.target, 1);
        assert_eq!(first.offset, 5);

        assert_eq!(decode(words[1]).unwrap().op, OpCode::Store);
        assert_eq!(decode(words[2]).unwrap().op, OpCode::Halt);
    }

    #[test]
    fn test_condition_suffix() {
        let words = assemble("SUB/ZP r2,r1,r3\n").unwrap();
        let instr = decode(words[0]).unwrap();
        assert_eq!(instr.op, OpCode::Sub);
        assert_eq!(instr.cond, CondFlag::Z | CondFlag::P);
    }

    #[test]
    fn test_labels_and_jump() {
        let source = r#"
        START:
            ADD r1,r0,r0,1
            JUMP END
            ADD r1,r0,r0,99
        END:
            HALT
        "#;

        let words = assemble(source).unwrap();
        assert_eq!(words.len(), 4);

        let jump = decode(words[1]).unwrap();
        assert_eq!(jump.op, OpCode::Add);
        assert_eq!(jump.target, PC_REG);
        assert_eq!(jump.offset, 3);
    }

    #[test]
    fn test_move_and_nop_pseudo_ops() {
        let words = assemble("MOVE r2,r1\nNOP\n").unwrap();

        let mv = decode(words[0]).unwrap();
        assert_eq!(mv.op, OpCode::Add);
        assert_eq!(mv.target, 2);
        assert_eq!(mv.src1, 1);
        assert_eq!(mv.src2, 0);
        assert_eq!(mv.offset, 0);

        let nop = decode(words[1]).unwrap();
        assert_eq!(nop.op, OpCode::Add);
        assert_eq!(nop.target, 0);
    }

    #[test]
    fn test_org_and_data() {
        let source = r#"
            HALT
            ORG 10
        TABLE:
            DAT 42
            DAT -17
        "#;

        let words = assemble(source).unwrap();
        assert_eq!(words.len(), 12);
        assert_eq!(words[10], 42);
        assert_eq!(words[11], -17);
        // The gap is zero-filled
        assert_eq!(words[5], 0);
    }

    #[test]
    fn test_data_label_reference() {
        let source = r#"
            LOAD r1,r0,r0,VALUE
            HALT
        VALUE:
            DAT 7
        "#;

        let words = assemble(source).unwrap();
        assert_eq!(decode(words[0]).unwrap().offset, 2);
        assert_eq!(words[2], 7);
    }

    #[test]
    fn test_undefined_label() {
        let err = assemble("JUMP NOWHERE\n").unwrap_err();
        assert_eq!(
            err,
            AssemblerError::UndefinedLabel {
                line: 1,
                label: "NOWHERE".into()
            }
        );
    }

    #[test]
    fn test_duplicate_label() {
        let err = assemble("A:\nA:\n").unwrap_err();
        assert_eq!(
            err,
            AssemblerError::DuplicateLabel {
                line: 2,
                label: "A".into()
            }
        );
    }

    #[test]
    fn test_unknown_mnemonic() {
        let err = assemble("FROB r1,r2,r3\n").unwrap_err();
        assert!(matches!(err, AssemblerError::UnknownMnemonic { line: 1, .. }));
    }

    #[test]
    fn test_invalid_register() {
        let err = assemble("ADD r16,r0,r0\n").unwrap_err();
        assert!(matches!(err, AssemblerError::SyntaxError { line: 1, .. }));
    }

    #[test]
    fn test_offset_out_of_range() {
        let err = assemble("ADD r1,r0,r0,5000\n").unwrap_err();
        assert_eq!(
            err,
            AssemblerError::ValueOutOfRange {
                line: 1,
                value: 5000
            }
        );
    }
}
