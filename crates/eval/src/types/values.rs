//! Leaf values and their capability coercions.

use std::fmt;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use super::EvalError;

// ──────────────────────────────────────────────
// Leaf kinds
// ──────────────────────────────────────────────

/// Discriminant of a [`Leaf`], also used as the declared kind of
/// typed expression nodes and primitive fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LeafKind {
    Number,
    Decimal,
    Text,
    Boolean,
}

impl LeafKind {
    /// Lowercase name used in the interchange form.
    pub fn name(&self) -> &'static str {
        match self {
            LeafKind::Number => "number",
            LeafKind::Decimal => "decimal",
            LeafKind::Text => "text",
            LeafKind::Boolean => "boolean",
        }
    }

    pub fn from_name(name: &str) -> Option<LeafKind> {
        match name {
            "number" => Some(LeafKind::Number),
            "decimal" => Some(LeafKind::Decimal),
            "text" => Some(LeafKind::Text),
            "boolean" => Some(LeafKind::Boolean),
            _ => None,
        }
    }
}

impl fmt::Display for LeafKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LeafKind::Number => "Number",
            LeafKind::Decimal => "Decimal",
            LeafKind::Text => "Text",
            LeafKind::Boolean => "Boolean",
        };
        f.write_str(s)
    }
}

// ──────────────────────────────────────────────
// Leaf values
// ──────────────────────────────────────────────

/// A concrete scalar value.
///
/// Numeric values never go through `f64`: `Number` is an `i64` and
/// `Decimal` is a `rust_decimal::Decimal`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Leaf {
    Number(i64),
    Decimal(Decimal),
    Text(String),
    Boolean(bool),
}

impl Leaf {
    pub fn text(s: impl Into<String>) -> Leaf {
        Leaf::Text(s.into())
    }

    /// Build a Number from a fractional value, truncating toward zero.
    pub fn number_from_decimal(d: Decimal) -> Result<Leaf, EvalError> {
        truncate(d).map(Leaf::Number)
    }

    pub fn kind(&self) -> LeafKind {
        match self {
            Leaf::Number(_) => LeafKind::Number,
            Leaf::Decimal(_) => LeafKind::Decimal,
            Leaf::Text(_) => LeafKind::Text,
            Leaf::Boolean(_) => LeafKind::Boolean,
        }
    }

    /// Returns a human-readable type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Leaf::Number(_) => "Number",
            Leaf::Decimal(_) => "Decimal",
            Leaf::Text(_) => "Text",
            Leaf::Boolean(_) => "Boolean",
        }
    }

    /// Integer view. Decimals truncate toward zero.
    pub fn as_number(&self) -> Result<i64, EvalError> {
        match self {
            Leaf::Number(n) => Ok(*n),
            Leaf::Decimal(d) => truncate(*d),
            other => Err(EvalError::mismatch("Number", other.type_name())),
        }
    }

    /// Fractional view. Numbers widen exactly.
    pub fn as_decimal(&self) -> Result<Decimal, EvalError> {
        match self {
            Leaf::Number(n) => Ok(Decimal::from(*n)),
            Leaf::Decimal(d) => Ok(*d),
            other => Err(EvalError::mismatch("Decimal", other.type_name())),
        }
    }

    /// Display form. Every variant supports it.
    pub fn as_text(&self) -> Result<String, EvalError> {
        Ok(self.to_string())
    }

    pub fn as_boolean(&self) -> Result<bool, EvalError> {
        match self {
            Leaf::Boolean(b) => Ok(*b),
            Leaf::Text(t) if t == "true" => Ok(true),
            Leaf::Text(t) if t == "false" => Ok(false),
            other => Err(EvalError::mismatch("Boolean", other.type_name())),
        }
    }

    /// Coerce into a leaf of the requested kind.
    pub fn coerce(&self, kind: LeafKind) -> Result<Leaf, EvalError> {
        match kind {
            LeafKind::Number => self.as_number().map(Leaf::Number),
            LeafKind::Decimal => self.as_decimal().map(Leaf::Decimal),
            LeafKind::Text => self.as_text().map(Leaf::Text),
            LeafKind::Boolean => self.as_boolean().map(Leaf::Boolean),
        }
    }

    /// Loose equality: both sides are coerced to a shared representation
    /// first. Number/Decimal pairs meet in Decimal, anything paired with
    /// Text meets in Text. A failed coercion means "not equal".
    pub fn equals(&self, other: &Leaf) -> bool {
        let target = match (self.kind(), other.kind()) {
            (a, b) if a == b => a,
            (LeafKind::Text, _) | (_, LeafKind::Text) => LeafKind::Text,
            (LeafKind::Number, LeafKind::Decimal) | (LeafKind::Decimal, LeafKind::Number) => {
                LeafKind::Decimal
            }
            (a, _) => a,
        };
        match (self.coerce(target), other.coerce(target)) {
            (Ok(l), Ok(r)) => l == r,
            _ => false,
        }
    }

    /// Strict equality: discriminants must match before payloads are compared.
    pub fn same_variant_eq(&self, other: &Leaf) -> bool {
        self.kind() == other.kind() && self == other
    }

    /// Canonical raw scalar. Decimals serialize as strings to keep every digit.
    pub fn serialize(&self) -> serde_json::Value {
        match self {
            Leaf::Number(n) => serde_json::json!(n),
            Leaf::Decimal(d) => serde_json::Value::String(d.to_string()),
            Leaf::Text(t) => serde_json::Value::String(t.clone()),
            Leaf::Boolean(b) => serde_json::Value::Bool(*b),
        }
    }

    /// Parse a raw JSON scalar as a leaf of the given kind.
    ///
    /// Numbers accept fractional input and truncate it; decimals accept
    /// either a JSON number or a string of digits.
    pub fn from_json(kind: LeafKind, v: &serde_json::Value) -> Result<Leaf, EvalError> {
        match kind {
            LeafKind::Number => {
                if let Some(n) = v.as_i64() {
                    return Ok(Leaf::Number(n));
                }
                let d = parse_decimal(v)?;
                Leaf::number_from_decimal(d)
            }
            LeafKind::Decimal => parse_decimal(v).map(Leaf::Decimal),
            LeafKind::Text => v
                .as_str()
                .map(|s| Leaf::Text(s.to_string()))
                .ok_or_else(|| EvalError::schema(format!("expected text literal, got {}", v))),
            LeafKind::Boolean => v
                .as_bool()
                .map(Leaf::Boolean)
                .ok_or_else(|| EvalError::schema(format!("expected boolean literal, got {}", v))),
        }
    }
}

impl fmt::Display for Leaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Leaf::Number(n) => write!(f, "{}", n),
            Leaf::Decimal(d) => write!(f, "{}", d),
            Leaf::Text(t) => f.write_str(t),
            Leaf::Boolean(b) => write!(f, "{}", b),
        }
    }
}

fn truncate(d: Decimal) -> Result<i64, EvalError> {
    d.trunc().to_i64().ok_or_else(|| EvalError::ArithmeticError {
        message: format!("{} does not fit in a Number", d),
    })
}

fn parse_decimal(v: &serde_json::Value) -> Result<Decimal, EvalError> {
    let s = match v {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        other => {
            return Err(EvalError::schema(format!(
                "expected numeric literal, got {}",
                other
            )))
        }
    };
    Decimal::from_str(&s)
        .or_else(|_| Decimal::from_scientific(&s))
        .map_err(|e| EvalError::schema(format!("invalid decimal '{}': {}", s, e)))
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
