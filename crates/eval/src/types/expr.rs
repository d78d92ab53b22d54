//! Expression trees and their canonical `{op, type, args}` form.
//!
//! Expressions are built once from schema definitions and evaluated many
//! times against different environments. Operand minimums are part of the
//! shape: arithmetic nodes always have a `first` operand, comparators and
//! logical nodes always have `first` and `second`.

use std::collections::BTreeSet;

use super::path::{PathString, Snapshot};
use super::values::{Leaf, LeafKind};
use super::EvalError;

// ──────────────────────────────────────────────
// Operators and kinds
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulus,
}

impl ArithmeticOp {
    pub fn name(&self) -> &'static str {
        match self {
            ArithmeticOp::Add => "add",
            ArithmeticOp::Subtract => "subtract",
            ArithmeticOp::Multiply => "multiply",
            ArithmeticOp::Divide => "divide",
            ArithmeticOp::Modulus => "modulus",
        }
    }

    fn from_name(name: &str) -> Option<ArithmeticOp> {
        match name {
            "add" => Some(ArithmeticOp::Add),
            "subtract" => Some(ArithmeticOp::Subtract),
            "multiply" => Some(ArithmeticOp::Multiply),
            "divide" => Some(ArithmeticOp::Divide),
            "modulus" => Some(ArithmeticOp::Modulus),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparatorOp {
    Equals,
    GreaterThan,
    LessThan,
    GreaterThanEquals,
    LessThanEquals,
}

impl ComparatorOp {
    pub fn name(&self) -> &'static str {
        match self {
            ComparatorOp::Equals => "equals",
            ComparatorOp::GreaterThan => "greater_than",
            ComparatorOp::LessThan => "less_than",
            ComparatorOp::GreaterThanEquals => "greater_than_equals",
            ComparatorOp::LessThanEquals => "less_than_equals",
        }
    }

    fn from_name(name: &str) -> Option<ComparatorOp> {
        match name {
            "equals" => Some(ComparatorOp::Equals),
            "greater_than" => Some(ComparatorOp::GreaterThan),
            "less_than" => Some(ComparatorOp::LessThan),
            "greater_than_equals" => Some(ComparatorOp::GreaterThanEquals),
            "less_than_equals" => Some(ComparatorOp::LessThanEquals),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

impl LogicalOp {
    pub fn name(&self) -> &'static str {
        match self {
            LogicalOp::And => "and",
            LogicalOp::Or => "or",
        }
    }
}

/// Operand kind of an arithmetic node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericKind {
    Number,
    Decimal,
}

impl NumericKind {
    pub fn leaf_kind(&self) -> LeafKind {
        match self {
            NumericKind::Number => LeafKind::Number,
            NumericKind::Decimal => LeafKind::Decimal,
        }
    }
}

/// Operand kind of a comparator node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Number,
    Decimal,
    Text,
}

impl ScalarKind {
    pub fn leaf_kind(&self) -> LeafKind {
        match self {
            ScalarKind::Number => LeafKind::Number,
            ScalarKind::Decimal => LeafKind::Decimal,
            ScalarKind::Text => LeafKind::Text,
        }
    }
}

// ──────────────────────────────────────────────
// Expression tree
// ──────────────────────────────────────────────

/// One `(key, value)` arm of a Match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guard {
    pub key: Expression,
    pub value: Expression,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    Literal(Leaf),
    /// Dot-path into the environment.
    Path(PathString),
    Arithmetic {
        op: ArithmeticOp,
        kind: NumericKind,
        first: Box<Expression>,
        rest: Vec<Expression>,
    },
    /// Chained comparison: `a < b < c` means `a < b` and `b < c`.
    Comparator {
        op: ComparatorOp,
        kind: ScalarKind,
        first: Box<Expression>,
        second: Box<Expression>,
        rest: Vec<Expression>,
    },
    Logical {
        op: LogicalOp,
        first: Box<Expression>,
        second: Box<Expression>,
        rest: Vec<Expression>,
    },
    Not(Box<Expression>),
    Match {
        condition: Box<Expression>,
        guards: Vec<Guard>,
        otherwise: Box<Expression>,
    },
}

impl Expression {
    pub fn number(n: i64) -> Expression {
        Expression::Literal(Leaf::Number(n))
    }

    pub fn text(s: &str) -> Expression {
        Expression::Literal(Leaf::text(s))
    }

    pub fn boolean(b: bool) -> Expression {
        Expression::Literal(Leaf::Boolean(b))
    }

    pub fn path(s: &str) -> Result<Expression, EvalError> {
        PathString::parse(s).map(Expression::Path)
    }

    pub fn arithmetic(
        op: ArithmeticOp,
        kind: NumericKind,
        first: Expression,
        rest: Vec<Expression>,
    ) -> Expression {
        Expression::Arithmetic {
            op,
            kind,
            first: Box::new(first),
            rest,
        }
    }

    pub fn comparator(
        op: ComparatorOp,
        kind: ScalarKind,
        first: Expression,
        second: Expression,
        rest: Vec<Expression>,
    ) -> Expression {
        Expression::Comparator {
            op,
            kind,
            first: Box::new(first),
            second: Box::new(second),
            rest,
        }
    }

    pub fn logical(
        op: LogicalOp,
        first: Expression,
        second: Expression,
        rest: Vec<Expression>,
    ) -> Expression {
        Expression::Logical {
            op,
            first: Box::new(first),
            second: Box::new(second),
            rest,
        }
    }

    pub fn not(operand: Expression) -> Expression {
        Expression::Not(Box::new(operand))
    }

    pub fn matching(condition: Expression, guards: Vec<Guard>, otherwise: Expression) -> Expression {
        Expression::Match {
            condition: Box::new(condition),
            guards,
            otherwise: Box::new(otherwise),
        }
    }

    /// Direct children in declared order.
    pub fn children(&self) -> Vec<&Expression> {
        match self {
            Expression::Literal(_) | Expression::Path(_) => Vec::new(),
            Expression::Arithmetic { first, rest, .. } => {
                std::iter::once(first.as_ref()).chain(rest.iter()).collect()
            }
            Expression::Comparator {
                first,
                second,
                rest,
                ..
            }
            | Expression::Logical {
                first,
                second,
                rest,
                ..
            } => [first.as_ref(), second.as_ref()]
                .into_iter()
                .chain(rest.iter())
                .collect(),
            Expression::Not(operand) => vec![operand.as_ref()],
            Expression::Match {
                condition,
                guards,
                otherwise,
            } => {
                let mut out = vec![condition.as_ref()];
                for g in guards {
                    out.push(&g.key);
                    out.push(&g.value);
                }
                out.push(otherwise.as_ref());
                out
            }
        }
    }

    /// Every path this expression can read, in first-appearance order.
    pub fn referenced_paths(&self) -> Vec<PathString> {
        let mut out = Vec::new();
        self.collect_paths(&mut out);
        out
    }

    fn collect_paths(&self, out: &mut Vec<PathString>) {
        if let Expression::Path(p) = self {
            if !out.contains(p) {
                out.push(p.clone());
            }
        }
        for child in self.children() {
            child.collect_paths(out);
        }
    }

    /// Snapshot roots referenced anywhere in the tree.
    pub fn snapshot_tags(&self) -> BTreeSet<Snapshot> {
        self.referenced_paths()
            .iter()
            .filter_map(PathString::snapshot)
            .collect()
    }

    /// The leaf kind this expression produces, when known without evaluation.
    pub fn result_kind(&self) -> Option<LeafKind> {
        match self {
            Expression::Literal(leaf) => Some(leaf.kind()),
            Expression::Path(_) => None,
            Expression::Arithmetic { kind, .. } => Some(kind.leaf_kind()),
            Expression::Comparator { .. } | Expression::Logical { .. } | Expression::Not(_) => {
                Some(LeafKind::Boolean)
            }
            Expression::Match {
                guards, otherwise, ..
            } => {
                let kind = otherwise.result_kind()?;
                guards
                    .iter()
                    .all(|g| g.value.result_kind() == Some(kind))
                    .then_some(kind)
            }
        }
    }

    /// Canonical `{op, type, args}` form. Args keep declared operand order.
    pub fn serialize(&self) -> serde_json::Value {
        let node = |op: &str, ty: &str, args: Vec<serde_json::Value>| {
            serde_json::json!({ "op": op, "type": ty, "args": args })
        };
        let all = |e: &Expression| -> Vec<serde_json::Value> {
            e.children().into_iter().map(Expression::serialize).collect()
        };
        match self {
            Expression::Literal(leaf) => node("literal", leaf.kind().name(), vec![leaf.serialize()]),
            Expression::Path(p) => node("path", "ref", vec![serde_json::json!(p.to_string())]),
            Expression::Arithmetic { op, kind, .. } => {
                node(op.name(), kind.leaf_kind().name(), all(self))
            }
            Expression::Comparator { op, kind, .. } => {
                node(op.name(), kind.leaf_kind().name(), all(self))
            }
            Expression::Logical { op, .. } => node(op.name(), "boolean", all(self)),
            Expression::Not(_) => node("not", "boolean", all(self)),
            Expression::Match {
                condition,
                guards,
                otherwise,
            } => {
                let mut args = vec![condition.serialize()];
                for g in guards {
                    args.push(node(
                        "guard",
                        "pair",
                        vec![g.key.serialize(), g.value.serialize()],
                    ));
                }
                args.push(otherwise.serialize());
                node("match", "match", args)
            }
        }
    }
}

// ──────────────────────────────────────────────
// Parsing from the canonical form
// ──────────────────────────────────────────────

/// Parse an expression from its canonical `{op, type, args}` form.
pub fn parse_expression(v: &serde_json::Value) -> Result<Expression, EvalError> {
    let op = v
        .get("op")
        .and_then(|o| o.as_str())
        .ok_or_else(|| EvalError::schema(format!("expression missing 'op': {}", v)))?;
    let ty = v.get("type").and_then(|t| t.as_str()).unwrap_or("");
    let args = v
        .get("args")
        .and_then(|a| a.as_array())
        .ok_or_else(|| EvalError::schema(format!("expression '{}' missing 'args' array", op)))?;

    match op {
        "literal" => {
            let kind = LeafKind::from_name(ty)
                .ok_or_else(|| EvalError::schema(format!("unknown literal type '{}'", ty)))?;
            let raw = single_arg(op, args)?;
            Ok(Expression::Literal(Leaf::from_json(kind, raw)?))
        }
        "path" => {
            let raw = single_arg(op, args)?;
            let s = raw
                .as_str()
                .ok_or_else(|| EvalError::schema("path argument must be a string"))?;
            let path = PathString::parse(s)?;
            if path.is_empty() {
                return Err(EvalError::schema("path argument must not be empty"));
            }
            Ok(Expression::Path(path))
        }
        "not" => {
            let operand = parse_expression(single_arg(op, args)?)?;
            Ok(Expression::not(operand))
        }
        "and" | "or" => {
            let logical = if op == "and" {
                LogicalOp::And
            } else {
                LogicalOp::Or
            };
            let (first, second, rest) = at_least_two(op, args)?;
            Ok(Expression::logical(logical, first, second, rest))
        }
        "match" => parse_match(args),
        _ => {
            if let Some(arith) = ArithmeticOp::from_name(op) {
                let kind = match ty {
                    "number" => NumericKind::Number,
                    "decimal" => NumericKind::Decimal,
                    other => {
                        return Err(EvalError::schema(format!(
                            "arithmetic '{}' has non-numeric type '{}'",
                            op, other
                        )))
                    }
                };
                let mut operands = parse_all(args)?.into_iter();
                let first = operands.next().ok_or_else(|| {
                    EvalError::schema(format!("arithmetic '{}' needs at least one operand", op))
                })?;
                return Ok(Expression::arithmetic(arith, kind, first, operands.collect()));
            }
            if let Some(cmp) = ComparatorOp::from_name(op) {
                let kind = match ty {
                    "number" => ScalarKind::Number,
                    "decimal" => ScalarKind::Decimal,
                    "text" => ScalarKind::Text,
                    other => {
                        return Err(EvalError::schema(format!(
                            "comparator '{}' has unsupported type '{}'",
                            op, other
                        )))
                    }
                };
                let (first, second, rest) = at_least_two(op, args)?;
                return Ok(Expression::comparator(cmp, kind, first, second, rest));
            }
            Err(EvalError::schema(format!("unknown operator: {}", op)))
        }
    }
}

fn single_arg<'a>(op: &str, args: &'a [serde_json::Value]) -> Result<&'a serde_json::Value, EvalError> {
    match args {
        [only] => Ok(only),
        _ => Err(EvalError::schema(format!(
            "'{}' takes exactly one argument, got {}",
            op,
            args.len()
        ))),
    }
}

fn parse_all(args: &[serde_json::Value]) -> Result<Vec<Expression>, EvalError> {
    args.iter().map(parse_expression).collect()
}

fn at_least_two(
    op: &str,
    args: &[serde_json::Value],
) -> Result<(Expression, Expression, Vec<Expression>), EvalError> {
    if args.len() < 2 {
        return Err(EvalError::schema(format!(
            "'{}' needs at least two operands, got {}",
            op,
            args.len()
        )));
    }
    let mut operands = parse_all(args)?.into_iter();
    match (operands.next(), operands.next()) {
        (Some(first), Some(second)) => Ok((first, second, operands.collect())),
        _ => Err(EvalError::schema(format!("'{}' needs at least two operands", op))),
    }
}

fn parse_match(args: &[serde_json::Value]) -> Result<Expression, EvalError> {
    let (condition, rest) = args
        .split_first()
        .ok_or_else(|| EvalError::schema("match needs a condition"))?;
    let (otherwise, guard_args) = rest
        .split_last()
        .ok_or_else(|| EvalError::schema("match needs an otherwise branch"))?;

    let mut guards = Vec::with_capacity(guard_args.len());
    for g in guard_args {
        if g.get("op").and_then(|o| o.as_str()) != Some("guard") {
            return Err(EvalError::schema(format!("match arm must be a guard: {}", g)));
        }
        let pair = g
            .get("args")
            .and_then(|a| a.as_array())
            .ok_or_else(|| EvalError::schema("guard missing 'args'"))?;
        match pair.as_slice() {
            [key, value] => guards.push(Guard {
                key: parse_expression(key)?,
                value: parse_expression(value)?,
            }),
            _ => return Err(EvalError::schema("guard takes exactly a key and a value")),
        }
    }

    Ok(Expression::matching(
        parse_expression(condition)?,
        guards,
        parse_expression(otherwise)?,
    ))
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
