//! CPU emulation for the register machine.
//!
//! This module implements the complete machine:
//! - a flat bank of word-sized memory cells
//! - 16 registers (r0 wired to zero, r15 the program counter)
//! - a 7-instruction set with per-instruction condition masks

pub mod alu;
pub mod decode;
pub mod execute;
pub mod memory;
pub mod registers;

pub use decode::{decode, encode, CondFlag, DecodeError, Instruction, OpCode};
pub use execute::{Cpu, CpuError, StepEvent, StepObserver, TraceObserver};
pub use memory::{Memory, MemoryError, MEMORY_SIZE};
pub use registers::{Register, RegisterFile, NUM_REGISTERS, PC_REG, ZERO_REG};
