//! Arithmetic-logic unit.
//!
//! A stateless dispatch over the opcode: two integer operands in, a result
//! and a derived condition flag out. The unit is total; it never reports an
//! error. An arithmetic fault (zero divisor, overflowed i32 arithmetic)
//! yields result 0 with the V flag. Nothing else is caught.

use crate::cpu::decode::{CondFlag, OpCode};

/// Apply `op` to `left` and `right`.
///
/// For LOAD and STORE the unit only performs the address arithmetic
/// `left + right`; the memory access itself is the CPU's job. HALT computes
/// nothing. The flag encodes the sign of the result: negative M, zero Z,
/// positive P, or V on an arithmetic fault.
pub fn execute(op: OpCode, left: i32, right: i32) -> (i32, CondFlag) {
    let result = match op {
        OpCode::Add => left.checked_add(right),
        OpCode::Sub => left.checked_sub(right),
        OpCode::Mul => left.checked_mul(right),
        OpCode::Div => floor_div(left, right),
        // Address calculation for the memory access operations
        OpCode::Load | OpCode::Store => left.checked_add(right),
        OpCode::Halt => Some(0),
    };

    match result {
        Some(value) if value < 0 => (value, CondFlag::M),
        Some(0) => (0, CondFlag::Z),
        Some(value) => (value, CondFlag::P),
        None => (0, CondFlag::V),
    }
}

/// Floor division: the quotient rounds toward negative infinity.
///
/// Returns `None` for a zero divisor and for the one overflowing quotient
/// (`i32::MIN / -1`).
fn floor_div(dividend: i32, divisor: i32) -> Option<i32> {
    let quotient = dividend.checked_div(divisor)?;
    let remainder = dividend % divisor;
    if remainder != 0 && (remainder < 0) != (divisor < 0) {
        Some(quotient - 1)
    } else {
        Some(quotient)
    }
}
