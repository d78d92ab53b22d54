//! Deserialization from schema bundle JSON into typed structs.
//!
//! The main entry point is [`from_interchange`], which takes a
//! `&serde_json::Value` and produces a [`SchemaBundle`].

use std::collections::BTreeMap;
use std::fmt;

use crate::types::*;

/// Why a schema bundle could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterchangeError {
    /// `id` or `constructs` is absent at the top level.
    MissingField { field: String },
    /// A struct declaration is malformed. `id` is `<unknown>` when the
    /// declaration has none.
    ConstructError {
        kind: String,
        id: String,
        message: String,
    },
    /// The bundle's shape is wrong: `constructs` is not an array of objects.
    InvalidBundle(String),
}

impl fmt::Display for InterchangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterchangeError::MissingField { field } => {
                write!(f, "schema bundle has no '{}'", field)
            }
            InterchangeError::ConstructError { kind, id, message } => {
                write!(f, "{} declaration '{}': {}", kind, id, message)
            }
            InterchangeError::InvalidBundle(msg) => {
                write!(f, "malformed schema bundle: {}", msg)
            }
        }
    }
}

impl std::error::Error for InterchangeError {}

/// Deserialize a schema bundle into typed structs.
///
/// Walks the `constructs` array and dispatches on the `kind` field.
/// Unknown construct kinds are silently skipped for forward compatibility.
pub fn from_interchange(bundle: &serde_json::Value) -> Result<SchemaBundle, InterchangeError> {
    let id = bundle
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| InterchangeError::MissingField {
            field: "id".to_string(),
        })?
        .to_string();

    let graft = bundle
        .get("graft")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let constructs_arr = bundle
        .get("constructs")
        .and_then(|c| c.as_array())
        .ok_or_else(|| InterchangeError::MissingField {
            field: "constructs".to_string(),
        })?;

    let mut constructs = Vec::with_capacity(constructs_arr.len());

    for (index, obj) in constructs_arr.iter().enumerate() {
        if !obj.is_object() {
            return Err(InterchangeError::InvalidBundle(format!(
                "constructs[{}] must be an object",
                index
            )));
        }
        let kind = obj.get("kind").and_then(|k| k.as_str()).unwrap_or("");

        let construct = match kind {
            "Struct" => Some(SchemaConstruct::Struct(parse_struct(obj)?)),
            _ => None,
        };

        if let Some(c) = construct {
            constructs.push(c);
        }
    }

    Ok(SchemaBundle {
        id,
        graft,
        constructs,
    })
}

// ── Parsing helpers ─────────────────────────────────────────────────

fn required_id(obj: &serde_json::Value, kind: &str) -> Result<String, InterchangeError> {
    obj.get("id")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| InterchangeError::ConstructError {
            kind: kind.to_string(),
            id: "<unknown>".to_string(),
            message: "missing 'id' field".to_string(),
        })
}

fn parse_provenance(obj: &serde_json::Value) -> Option<Provenance> {
    let prov = obj.get("provenance")?;
    let file = prov.get("file")?.as_str()?.to_string();
    let line = prov.get("line")?.as_u64()?;
    Some(Provenance { file, line })
}

fn optional_table(obj: &serde_json::Value, field: &str) -> Option<serde_json::Value> {
    obj.get(field)
        .and_then(|v| if v.is_null() { None } else { Some(v.clone()) })
}

fn struct_error(id: &str, message: impl Into<String>) -> InterchangeError {
    InterchangeError::ConstructError {
        kind: "Struct".to_string(),
        id: id.to_string(),
        message: message.into(),
    }
}

fn parse_struct(obj: &serde_json::Value) -> Result<StructConstruct, InterchangeError> {
    let id = required_id(obj, "Struct")?;

    let fields_obj = obj
        .get("fields")
        .and_then(|f| f.as_object())
        .ok_or_else(|| struct_error(&id, "missing 'fields' object"))?;

    let mut fields = BTreeMap::new();
    for (name, decl) in fields_obj {
        fields.insert(name.clone(), parse_field(&id, name, decl)?);
    }

    let unique = match obj.get("unique") {
        None | Some(serde_json::Value::Null) => Vec::new(),
        Some(groups) => {
            let arr = groups
                .as_array()
                .ok_or_else(|| struct_error(&id, "'unique' must be an array of groups"))?;
            let mut out = Vec::with_capacity(arr.len());
            for group in arr {
                let names = group
                    .as_array()
                    .ok_or_else(|| struct_error(&id, "uniqueness group must be an array"))?
                    .iter()
                    .map(|n| {
                        n.as_str()
                            .map(|s| s.to_string())
                            .ok_or_else(|| struct_error(&id, "uniqueness member must be a string"))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                out.push(names);
            }
            out
        }
    };

    Ok(StructConstruct {
        fields,
        unique,
        permissions: optional_table(obj, "permissions"),
        effects: optional_table(obj, "effects"),
        checks: optional_table(obj, "checks"),
        provenance: parse_provenance(obj),
        id,
    })
}

fn parse_field(
    struct_id: &str,
    name: &str,
    decl: &serde_json::Value,
) -> Result<FieldConstruct, InterchangeError> {
    let field_type = decl
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| struct_error(struct_id, format!("field '{}' missing 'type'", name)))?
        .to_string();

    let target = decl
        .get("struct")
        .and_then(|s| s.as_str())
        .map(|s| s.to_string());

    if field_type == "other" && target.is_none() {
        return Err(struct_error(
            struct_id,
            format!("field '{}' of type 'other' missing 'struct'", name),
        ));
    }

    Ok(FieldConstruct {
        name: name.to_string(),
        field_type,
        target,
        default: optional_table(decl, "default"),
    })
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_bundle(constructs: Vec<serde_json::Value>) -> serde_json::Value {
        json!({
            "id": "test-bundle",
            "kind": "Bundle",
            "graft": "1.0",
            "constructs": constructs
        })
    }

    #[test]
    fn test_empty_bundle() {
        let bundle = make_bundle(vec![]);
        let result = from_interchange(&bundle).unwrap();
        assert_eq!(result.id, "test-bundle");
        assert_eq!(result.graft, "1.0");
        assert!(result.constructs.is_empty());
    }

    #[test]
    fn test_missing_constructs_array() {
        let bundle = json!({"id": "test", "kind": "Bundle"});
        match from_interchange(&bundle).unwrap_err() {
            InterchangeError::MissingField { field } => assert_eq!(field, "constructs"),
            other => panic!("expected MissingField, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_bundle_id() {
        let bundle = json!({"constructs": []});
        match from_interchange(&bundle).unwrap_err() {
            InterchangeError::MissingField { field } => assert_eq!(field, "id"),
            other => panic!("expected MissingField, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_kind_skipped() {
        let bundle = make_bundle(vec![
            json!({"kind": "Widget", "id": "w"}),
            json!({"kind": "Struct", "id": "User", "fields": {}}),
        ]);
        let result = from_interchange(&bundle).unwrap();
        assert_eq!(result.constructs.len(), 1);
        assert_eq!(result.structs().next().unwrap().id, "User");
    }

    #[test]
    fn test_struct_fields_and_tables() {
        let bundle = make_bundle(vec![json!({
            "kind": "Struct",
            "id": "Order",
            "provenance": { "file": "shop.schema", "line": 4 },
            "fields": {
                "owner": { "type": "other", "struct": "User" },
                "qty": { "type": "number", "default": 1 }
            },
            "unique": [["qty"]],
            "permissions": {
                "ownership": [{ "field": "owner" }],
                "public": ["qty"]
            },
            "checks": null
        })]);
        let result = from_interchange(&bundle).unwrap();
        let s = result.structs().next().unwrap();
        assert_eq!(s.fields.len(), 2);
        assert_eq!(s.fields["owner"].target.as_deref(), Some("User"));
        assert_eq!(s.fields["qty"].default, Some(json!(1)));
        assert_eq!(s.unique, vec![vec!["qty".to_string()]]);
        assert!(s.ownership().is_some());
        assert_eq!(s.public(), Some(&json!(["qty"])));
        assert!(s.borrow().is_none());
        assert!(s.checks.is_none());
        assert_eq!(
            s.provenance,
            Some(Provenance {
                file: "shop.schema".to_string(),
                line: 4
            })
        );
    }

    #[test]
    fn test_other_field_requires_struct() {
        let bundle = make_bundle(vec![json!({
            "kind": "Struct",
            "id": "Order",
            "fields": { "owner": { "type": "other" } }
        })]);
        match from_interchange(&bundle).unwrap_err() {
            InterchangeError::ConstructError { kind, id, message } => {
                assert_eq!(kind, "Struct");
                assert_eq!(id, "Order");
                assert!(message.contains("owner"));
            }
            other => panic!("expected ConstructError, got {:?}", other),
        }
    }

    #[test]
    fn test_non_object_construct() {
        let bundle = make_bundle(vec![json!("User")]);
        assert_eq!(
            from_interchange(&bundle).unwrap_err().to_string(),
            "malformed schema bundle: constructs[0] must be an object"
        );
    }

    #[test]
    fn test_struct_missing_id() {
        let bundle = make_bundle(vec![json!({ "kind": "Struct", "fields": {} })]);
        assert_eq!(
            from_interchange(&bundle).unwrap_err().to_string(),
            "Struct declaration '<unknown>': missing 'id' field"
        );
    }

    #[test]
    fn test_malformed_unique_group() {
        let bundle = make_bundle(vec![json!({
            "kind": "Struct",
            "id": "Order",
            "fields": {},
            "unique": ["code"]
        })]);
        assert!(matches!(
            from_interchange(&bundle),
            Err(InterchangeError::ConstructError { .. })
        ));
    }
}
