//! # regmach
//!
//! A single-core register-machine CPU simulator for instruction-cycle
//! study: fetch, decode, conditional-predicate evaluation, arithmetic-logic
//! dispatch, and the resulting state mutation over a flat memory and a
//! 16-register bank.
//!
//! Every instruction carries a condition mask tested against the CPU's
//! current flag; arithmetic results set the flag (M/Z/P by sign, V on an
//! invalid computation), so branching falls out of conditional execution
//! plus arithmetic writes to the program-counter register.

pub mod asm;
pub mod cpu;

// Re-export commonly used types
pub use asm::{assemble, disassemble, load_object, save_object, AssemblerError, ObjectFile};
pub use cpu::{
    decode, encode, CondFlag, Cpu, CpuError, Instruction, Memory, MemoryError, OpCode,
    RegisterFile, StepEvent, StepObserver, TraceObserver,
};
