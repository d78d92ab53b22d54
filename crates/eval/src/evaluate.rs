//! Expression evaluator.
//!
//! Evaluates an [`Expression`] tree against an [`Environment`]. Every
//! branch returns a leaf or a typed error; a failure anywhere in the tree
//! aborts the whole evaluation.

use crate::env::Environment;
use crate::numeric;
use crate::provenance::ProvenanceCollector;
use crate::types::{EvalError, Expression, Leaf, LogicalOp};

impl Expression {
    /// Evaluate without recording provenance.
    pub fn eval(&self, env: &Environment) -> Result<Leaf, EvalError> {
        eval_expr(self, env, &mut ProvenanceCollector::new())
    }
}

/// Evaluate `expr` against `env`, recording every path read in `collector`.
pub fn eval_expr(
    expr: &Expression,
    env: &Environment,
    collector: &mut ProvenanceCollector,
) -> Result<Leaf, EvalError> {
    match expr {
        Expression::Literal(leaf) => Ok(leaf.clone()),

        Expression::Path(path) => {
            collector.record_path(path);
            env.lookup(path).cloned()
        }

        Expression::Arithmetic {
            op,
            kind,
            first,
            rest,
        } => {
            let mut acc = eval_expr(first, env, collector)?.coerce(kind.leaf_kind())?;
            for operand in rest {
                let next = eval_expr(operand, env, collector)?;
                acc = numeric::apply_arithmetic(*op, *kind, &acc, &next)?;
            }
            Ok(acc)
        }

        Expression::Comparator {
            op,
            kind,
            first,
            second,
            rest,
        } => {
            let left = eval_expr(first, env, collector)?;
            let mut prev = eval_expr(second, env, collector)?;
            let mut acc = numeric::compare(*op, *kind, &left, &prev)?;
            // Once false the chain stays false, but every operand is still
            // evaluated and `prev` keeps advancing.
            for operand in rest {
                let next = eval_expr(operand, env, collector)?;
                if acc {
                    acc = numeric::compare(*op, *kind, &prev, &next)?;
                }
                prev = next;
            }
            Ok(Leaf::Boolean(acc))
        }

        Expression::Logical {
            op,
            first,
            second,
            rest,
        } => {
            let a = eval_expr(first, env, collector)?.as_boolean()?;
            let b = eval_expr(second, env, collector)?.as_boolean()?;
            let mut acc = combine(*op, a, b);
            // Every operand must be boolean, even after the result is settled.
            for operand in rest {
                let next = eval_expr(operand, env, collector)?.as_boolean()?;
                acc = combine(*op, acc, next);
            }
            Ok(Leaf::Boolean(acc))
        }

        Expression::Not(operand) => {
            let b = eval_expr(operand, env, collector)?.as_boolean()?;
            Ok(Leaf::Boolean(!b))
        }

        Expression::Match {
            condition,
            guards,
            otherwise,
        } => {
            let cond = eval_expr(condition, env, collector)?;
            for guard in guards {
                let key = eval_expr(&guard.key, env, collector)?;
                // No coercion here: Number(2) never matches Decimal(2).
                if key.same_variant_eq(&cond) {
                    return eval_expr(&guard.value, env, collector);
                }
            }
            eval_expr(otherwise, env, collector)
        }
    }
}

fn combine(op: LogicalOp, a: bool, b: bool) -> bool {
    match op {
        LogicalOp::And => a && b,
        LogicalOp::Or => a || b,
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
