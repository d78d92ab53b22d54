//! Checked arithmetic and ordered comparison over leaves.
//!
//! Every arithmetic step coerces both operands to the node's declared
//! kind first. Overflow and division or modulus by zero are errors, never
//! wrapped or saturated values.

use std::cmp::Ordering;

use rust_decimal::Decimal;

use crate::types::{ArithmeticOp, ComparatorOp, EvalError, Leaf, NumericKind, ScalarKind};

/// Apply one arithmetic step `left op right` in the given kind.
pub fn apply_arithmetic(
    op: ArithmeticOp,
    kind: NumericKind,
    left: &Leaf,
    right: &Leaf,
) -> Result<Leaf, EvalError> {
    match kind {
        NumericKind::Number => {
            int_step(op, left.as_number()?, right.as_number()?).map(Leaf::Number)
        }
        NumericKind::Decimal => {
            decimal_step(op, left.as_decimal()?, right.as_decimal()?).map(Leaf::Decimal)
        }
    }
}

fn overflow(op: ArithmeticOp) -> EvalError {
    EvalError::ArithmeticError {
        message: format!("{} overflow", op.name()),
    }
}

fn by_zero(op: ArithmeticOp) -> EvalError {
    EvalError::ArithmeticError {
        message: format!("{} by zero", op.name()),
    }
}

fn int_step(op: ArithmeticOp, l: i64, r: i64) -> Result<i64, EvalError> {
    let result = match op {
        ArithmeticOp::Add => l.checked_add(r),
        ArithmeticOp::Subtract => l.checked_sub(r),
        ArithmeticOp::Multiply => l.checked_mul(r),
        ArithmeticOp::Divide | ArithmeticOp::Modulus if r == 0 => return Err(by_zero(op)),
        ArithmeticOp::Divide => l.checked_div(r),
        ArithmeticOp::Modulus => l.checked_rem(r),
    };
    result.ok_or_else(|| overflow(op))
}

fn decimal_step(op: ArithmeticOp, l: Decimal, r: Decimal) -> Result<Decimal, EvalError> {
    let result = match op {
        ArithmeticOp::Add => l.checked_add(r),
        ArithmeticOp::Subtract => l.checked_sub(r),
        ArithmeticOp::Multiply => l.checked_mul(r),
        ArithmeticOp::Divide | ArithmeticOp::Modulus if r.is_zero() => return Err(by_zero(op)),
        ArithmeticOp::Divide => l.checked_div(r),
        ArithmeticOp::Modulus => l.checked_rem(r),
    };
    result.ok_or_else(|| overflow(op))
}

/// Compare `left op right` after coercing both sides to `kind`.
/// Text compares lexicographically.
pub fn compare(
    op: ComparatorOp,
    kind: ScalarKind,
    left: &Leaf,
    right: &Leaf,
) -> Result<bool, EvalError> {
    let ordering = match kind {
        ScalarKind::Number => left.as_number()?.cmp(&right.as_number()?),
        ScalarKind::Decimal => left.as_decimal()?.cmp(&right.as_decimal()?),
        ScalarKind::Text => left.as_text()?.cmp(&right.as_text()?),
    };
    Ok(holds(op, ordering))
}

fn holds(op: ComparatorOp, ordering: Ordering) -> bool {
    match op {
        ComparatorOp::Equals => ordering == Ordering::Equal,
        ComparatorOp::GreaterThan => ordering == Ordering::Greater,
        ComparatorOp::LessThan => ordering == Ordering::Less,
        ComparatorOp::GreaterThanEquals => ordering != Ordering::Less,
        ComparatorOp::LessThanEquals => ordering != Ordering::Greater,
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
