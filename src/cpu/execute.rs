//! CPU execution engine.
//!
//! Implements the fetch-decode-execute cycle over the register bank and
//! main memory, the conditional-execution predicate, and the run loop that
//! steps until a HALT instruction executes.

use crate::cpu::alu;
use crate::cpu::decode::{decode, CondFlag, DecodeError, Instruction, OpCode};
use crate::cpu::memory::{Memory, MemoryError};
use crate::cpu::registers::RegisterFile;
use std::io::Write;
use thiserror::Error;

/// Snapshot published to observers once per cycle, before execution.
///
/// Observers see the machine as it was at fetch time: the program counter
/// still points at the fetched word and no side effect of the instruction
/// has been applied yet.
pub struct StepEvent<'a> {
    /// The CPU about to execute the instruction.
    pub cpu: &'a Cpu,
    /// Program-counter value at fetch time.
    pub pc_addr: i32,
    /// The raw instruction word.
    pub word: i32,
    /// The decoded instruction.
    pub instr: Instruction,
}

/// Receives one [`StepEvent`] per cycle, before execution.
///
/// The event borrows the CPU immutably, so an observer cannot influence
/// execution.
pub trait StepObserver {
    fn on_step(&mut self, event: &StepEvent);
}

/// Observer that writes a disassembled trace line per cycle to a sink
/// supplied at construction.
pub struct TraceObserver<W: Write> {
    out: W,
}

impl<W: Write> TraceObserver<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Give back the underlying sink.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> StepObserver for TraceObserver<W> {
    fn on_step(&mut self, event: &StepEvent) {
        // A failing trace sink must not disturb execution.
        let _ = writeln!(
            self.out,
            "{:4}: [{:08x}] {:24} cond={}",
            event.pc_addr,
            event.word as u32,
            event.instr.to_string(),
            event.cpu.condition,
        );
    }
}

/// The central processing unit.
///
/// Owns the 16-register bank (r0 wired to zero, r15 the program counter),
/// the current condition flag, the halted state, and the connection to main
/// memory. One CPU instance exclusively owns its memory and registers;
/// execution is single-threaded and fully synchronous.
pub struct Cpu {
    /// Register bank.
    pub regs: RegisterFile,
    /// Main memory.
    pub mem: Memory,
    /// Condition flag set by the last executed arithmetic instruction.
    pub condition: CondFlag,
    /// True once a HALT instruction has executed.
    pub halted: bool,
    /// Completed fetch-decode cycles (for display and profiling).
    pub cycles: u64,
    observers: Vec<Box<dyn StepObserver>>,
    step_gate: Option<Box<dyn FnMut(u64)>>,
}

impl Cpu {
    /// Create a CPU connected to the given memory.
    ///
    /// Registers start at zero, the condition flag at ALWAYS, halted false.
    pub fn new(mem: Memory) -> Self {
        Self {
            regs: RegisterFile::new(),
            mem,
            condition: CondFlag::ALWAYS,
            halted: false,
            cycles: 0,
            observers: Vec::new(),
            step_gate: None,
        }
    }

    /// Load a program image into memory starting at `start_addr`.
    pub fn load_program(&mut self, start_addr: usize, program: &[i32]) -> Result<(), MemoryError> {
        self.mem.load_program(start_addr, program)
    }

    /// Register an observer for step events.
    pub fn add_observer(&mut self, observer: Box<dyn StepObserver>) {
        self.observers.push(observer);
    }

    /// Install the acknowledgment gate consulted between single-step
    /// iterations. The gate receives the number of steps taken so far and
    /// blocks until the driver confirms the next one.
    pub fn set_step_gate(&mut self, gate: Box<dyn FnMut(u64)>) {
        self.step_gate = Some(gate);
    }

    /// Execute one fetch-decode-execute cycle.
    ///
    /// Memory and decode faults are fatal and propagate; arithmetic faults
    /// never reach here (the ALU folds them into the V flag).
    pub fn step(&mut self) -> Result<(), CpuError> {
        // Fetch
        let pc_addr = self.regs.pc();
        let word = self.mem.get(pc_addr)?;

        // Decode
        let instr = decode(word)?;

        // Publish the pre-execution snapshot before any side effect
        self.publish(pc_addr, word, instr);
        self.cycles += 1;

        // Predicate: skipped instructions only advance the program counter
        if (self.condition & instr.cond).is_empty() {
            self.regs.set_pc(pc_addr.wrapping_add(1));
            return Ok(());
        }

        // Operands and ALU
        let left = self.regs.get(instr.src1);
        let right = self.regs.get(instr.src2).wrapping_add(instr.offset);
        let (result, flag) = alu::execute(instr.op, left, right);

        // The program counter advances before the opcode effect, so an
        // effect that references r15 sees the next address.
        self.regs.set_pc(pc_addr.wrapping_add(1));

        match instr.op {
            OpCode::Store => {
                self.mem.put(result, self.regs.get(instr.target))?;
            }
            OpCode::Load => {
                let value = self.mem.get(result)?;
                self.regs.put(instr.target, value);
            }
            OpCode::Halt => {
                self.halted = true;
            }
            OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div => {
                self.regs.put(instr.target, result);
                self.condition = flag;
            }
        }

        Ok(())
    }

    /// Run from `from_addr` until a HALT instruction executes.
    ///
    /// Resets the halted state and the program counter; register contents
    /// and the condition flag persist from any earlier run. With
    /// `single_step` the installed gate is consulted before every cycle.
    /// A program without a reachable HALT runs until it faults or forever.
    pub fn run(&mut self, from_addr: i32, single_step: bool) -> Result<(), CpuError> {
        self.halted = false;
        self.regs.set_pc(from_addr);

        let mut steps: u64 = 0;
        while !self.halted {
            if single_step {
                if let Some(gate) = self.step_gate.as_mut() {
                    gate(steps);
                }
            }
            self.step()?;
            steps += 1;
        }
        Ok(())
    }

    /// Check if the CPU has halted.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Hand the pre-execution snapshot to every observer.
    fn publish(&mut self, pc_addr: i32, word: i32, instr: Instruction) {
        if self.observers.is_empty() {
            return;
        }
        // Move the observer list out so the event can borrow the CPU.
        let mut observers = std::mem::take(&mut self.observers);
        {
            let event = StepEvent {
                cpu: &*self,
                pc_addr,
                word,
                instr,
            };
            for observer in observers.iter_mut() {
                observer.on_step(&event);
            }
        }
        self.observers = observers;
    }
}

impl std::fmt::Debug for Cpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("halted", &self.halted)
            .field("condition", &self.condition)
            .field("cycles", &self.cycles)
            .field("regs", &self.regs)
            .finish()
    }
}

/// Errors that abort execution.
///
/// Both kinds are fatal: the run loop stops and the fault reaches the
/// caller. There are no retries anywhere in the simulator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuError {
    #[error("memory fault: {0}")]
    Memory(#[from] MemoryError),

    #[error("decode fault: {0}")]
    Decode(#[from] DecodeError),
}
