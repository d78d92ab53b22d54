//! Field paths and snapshot roots.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::EvalError;

/// Snapshot roots an expression path may start with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Snapshot {
    /// Entity state before the change.
    Prev,
    /// Entity state after the change.
    Curr,
    /// Values offered by an actor to prove a borrow.
    Borrow,
}

impl Snapshot {
    pub fn as_str(&self) -> &'static str {
        match self {
            Snapshot::Prev => "_prev",
            Snapshot::Curr => "_curr",
            Snapshot::Borrow => "_borrow",
        }
    }

    pub fn from_segment(segment: &str) -> Option<Snapshot> {
        match segment {
            "_prev" => Some(Snapshot::Prev),
            "_curr" => Some(Snapshot::Curr),
            "_borrow" => Some(Snapshot::Borrow),
            _ => None,
        }
    }
}

/// An ordered sequence of field-name hops.
///
/// Displayed and serialized in dotted form (`customer.owner`). The empty
/// path is only used as a prefix accumulator.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PathString(Vec<String>);

/// Set of paths with set semantics (duplicates collapse, order irrelevant).
pub type PathSet = BTreeSet<PathString>;

impl PathString {
    /// Parse a dotted path. Empty segments are rejected; the empty string
    /// parses to the empty path.
    pub fn parse(s: &str) -> Result<PathString, EvalError> {
        if s.is_empty() {
            return Ok(PathString::default());
        }
        let segments: Vec<String> = s.split('.').map(|seg| seg.to_string()).collect();
        if segments.iter().any(|seg| seg.is_empty()) {
            return Err(EvalError::schema(format!(
                "path '{}' contains an empty segment",
                s
            )));
        }
        Ok(PathString(segments))
    }

    pub fn from_segments<I, S>(segments: I) -> PathString
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PathString(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn head(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Everything after the first hop.
    pub fn tail(&self) -> PathString {
        PathString(self.0.iter().skip(1).cloned().collect())
    }

    /// This path with one more hop appended.
    pub fn child(&self, segment: &str) -> PathString {
        let mut segments = self.0.clone();
        segments.push(segment.to_string());
        PathString(segments)
    }

    /// This path followed by `other`.
    pub fn join(&self, other: &PathString) -> PathString {
        let mut segments = self.0.clone();
        segments.extend(other.0.iter().cloned());
        PathString(segments)
    }

    pub fn starts_with(&self, prefix: &PathString) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// The snapshot root this path starts with, if any.
    pub fn snapshot(&self) -> Option<Snapshot> {
        self.head().and_then(Snapshot::from_segment)
    }

    /// The path with a leading snapshot root removed.
    pub fn relative(&self) -> PathString {
        if self.snapshot().is_some() {
            self.tail()
        } else {
            self.clone()
        }
    }
}

impl fmt::Display for PathString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

impl TryFrom<String> for PathString {
    type Error = EvalError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        PathString::parse(&s)
    }
}

impl From<PathString> for String {
    fn from(p: PathString) -> String {
        p.to_string()
    }
}

/// Parse a JSON array of dotted path strings.
pub(crate) fn parse_path_list(v: &serde_json::Value, what: &str) -> Result<Vec<PathString>, EvalError> {
    let arr = v
        .as_array()
        .ok_or_else(|| EvalError::schema(format!("{} must be an array of paths", what)))?;
    arr.iter()
        .map(|p| {
            let s = p
                .as_str()
                .ok_or_else(|| EvalError::schema(format!("{} entries must be strings", what)))?;
            PathString::parse(s)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> PathString {
        PathString::parse(s).unwrap()
    }

    #[test]
    fn parse_and_display() {
        let path = p("customer.owner");
        assert_eq!(path.segments(), &["customer".to_string(), "owner".to_string()]);
        assert_eq!(path.to_string(), "customer.owner");
        assert!(PathString::parse("a..b").is_err());
        assert!(p("").is_empty());
    }

    #[test]
    fn snapshot_root_is_stripped_by_relative() {
        let path = p("_curr.customer.total");
        assert_eq!(path.snapshot(), Some(Snapshot::Curr));
        assert_eq!(path.relative(), p("customer.total"));
        assert_eq!(p("total").relative(), p("total"));
    }

    #[test]
    fn join_child_and_tail() {
        let prefix = p("order");
        assert_eq!(prefix.child("total"), p("order.total"));
        assert_eq!(prefix.join(&p("customer.name")), p("order.customer.name"));
        assert_eq!(p("a.b.c").tail(), p("b.c"));
        assert!(p("a.b.c").starts_with(&p("a.b")));
    }

    #[test]
    fn serde_uses_dotted_form() {
        let path: PathString = serde_json::from_value(serde_json::json!("a.b")).unwrap();
        assert_eq!(path, p("a.b"));
        assert_eq!(serde_json::to_value(&path).unwrap(), serde_json::json!("a.b"));
    }
}
