//! Typed structs representing the graft schema bundle JSON.
//!
//! Nested rule tables (permissions, effects, checks) are stored as
//! `serde_json::Value`; the evaluator parses them into its own types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Source location recorded by whatever tool produced the bundle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Provenance {
    pub file: String,
    pub line: u64,
}

/// Top-level schema bundle containing all constructs.
#[derive(Debug, Clone)]
pub struct SchemaBundle {
    /// Bundle identifier (schema name).
    pub id: String,
    /// Bundle format version (e.g. "1.0"). Empty when absent.
    pub graft: String,
    pub constructs: Vec<SchemaConstruct>,
}

impl SchemaBundle {
    /// Iterate over every Struct construct in declaration order.
    pub fn structs(&self) -> impl Iterator<Item = &StructConstruct> {
        self.constructs.iter().map(|c| match c {
            SchemaConstruct::Struct(s) => s,
        })
    }
}

/// A single construct from the bundle, dispatched by kind.
#[derive(Debug, Clone)]
pub enum SchemaConstruct {
    Struct(StructConstruct),
}

// ── Field ───────────────────────────────────────────────────────────

/// A field declaration inside a Struct.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldConstruct {
    pub name: String,
    /// One of `number`, `decimal`, `text`, `boolean`, `other`.
    pub field_type: String,
    /// Target struct name for `other` fields.
    pub target: Option<String>,
    /// Raw default scalar, if declared.
    pub default: Option<serde_json::Value>,
}

// ── Struct ──────────────────────────────────────────────────────────

/// A Struct construct from the bundle.
#[derive(Debug, Clone)]
pub struct StructConstruct {
    pub id: String,
    pub fields: BTreeMap<String, FieldConstruct>,
    /// Uniqueness constraint groups, each a list of field names.
    pub unique: Vec<Vec<String>>,
    /// The full permissions object (`ownership`, `borrow`, `private`, `public`).
    pub permissions: Option<serde_json::Value>,
    /// Effect table keyed by effect name.
    pub effects: Option<serde_json::Value>,
    /// Check table keyed by check name.
    pub checks: Option<serde_json::Value>,
    pub provenance: Option<Provenance>,
}

impl StructConstruct {
    /// The `permissions.ownership` rule list.
    pub fn ownership(&self) -> Option<&serde_json::Value> {
        self.permissions.as_ref().and_then(|p| p.get("ownership"))
    }

    /// The `permissions.borrow` table.
    pub fn borrow(&self) -> Option<&serde_json::Value> {
        self.permissions.as_ref().and_then(|p| p.get("borrow"))
    }

    /// The `permissions.private` grant table.
    pub fn private(&self) -> Option<&serde_json::Value> {
        self.permissions.as_ref().and_then(|p| p.get("private"))
    }

    /// The `permissions.public` path list.
    pub fn public(&self) -> Option<&serde_json::Value> {
        self.permissions.as_ref().and_then(|p| p.get("public"))
    }
}
