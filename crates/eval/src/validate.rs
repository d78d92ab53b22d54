//! Load-time schema validation.
//!
//! Catches inconsistencies that would otherwise surface as confusing
//! evaluation failures much later. Returns the first problem found.

use crate::ownership::check_delegated_path;
use crate::types::{EvalError, FieldType, LeafKind, Registry, Snapshot, Struct};

pub fn validate_registry(registry: &Registry) -> Result<(), EvalError> {
    for strct in registry.structs() {
        validate_struct(registry, strct).map_err(|message| {
            EvalError::schema(format!("struct '{}': {}", strct.name, message))
        })?;
    }
    Ok(())
}

fn validate_struct(registry: &Registry, strct: &Struct) -> Result<(), String> {
    // Fields
    for field in strct.fields.values() {
        match &field.ty {
            FieldType::Other(target) => {
                if target.is_empty() {
                    return Err(format!("other field '{}' has no target struct", field.name));
                }
                if target != registry.user_struct() && registry.lookup_struct(target).is_none() {
                    return Err(format!(
                        "field '{}' targets unknown struct '{}'",
                        field.name, target
                    ));
                }
            }
            FieldType::Primitive(kind) => {
                if let Some(default) = &field.default {
                    if default.kind() != *kind {
                        return Err(format!(
                            "default for '{}' is {}, expected {}",
                            field.name,
                            default.type_name(),
                            kind
                        ));
                    }
                }
            }
        }
    }

    for group in &strct.unique {
        if group.is_empty() {
            return Err("empty uniqueness group".to_string());
        }
        if let Some(missing) = group.iter().find(|f| strct.field(f).is_none()) {
            return Err(format!("uniqueness group names unknown field '{}'", missing));
        }
    }

    // Permissions
    let permissions = &strct.permissions;
    for rule in &permissions.ownership {
        match strct.field(&rule.field) {
            Some(f) if f.target().is_some() => {}
            Some(_) => {
                return Err(format!(
                    "ownership field '{}' is not an other field",
                    rule.field
                ))
            }
            None => return Err(format!("ownership field '{}' is not declared", rule.field)),
        }
    }
    let ownership_fields = strct.ownership_fields();
    for (key, grant) in &permissions.private {
        if !ownership_fields.contains(&key.as_str()) {
            return Err(format!("private grant '{}' is not an ownership field", key));
        }
        for path in grant.read.iter().chain(&grant.write) {
            registry
                .field_at(strct, path)
                .map_err(|_| format!("private grant '{}' names unknown path '{}'", key, path))?;
        }
    }
    for path in &permissions.public {
        registry
            .field_at(strct, path)
            .map_err(|_| format!("public grant names unknown path '{}'", path))?;
    }
    for (key, rule) in &permissions.borrow {
        if strct.field(key).is_none() {
            return Err(format!("borrow '{}' is keyed by unknown field '{}'", rule.name, key));
        }
        if rule.ownership.is_empty() || rule.ownership.iter().any(|p| p.is_empty()) {
            return Err(format!("borrow '{}' has no delegated ownership path", rule.name));
        }
        for path in &rule.ownership {
            check_delegated_path(registry, strct, path)
                .map_err(|e| format!("borrow '{}': {}", rule.name, e))?;
        }
    }

    // Effects and checks
    for effect in &strct.effects {
        for stmt in &effect.mutate {
            let rooted = matches!(stmt.target.snapshot(), Some(Snapshot::Prev | Snapshot::Curr));
            if !rooted || stmt.target.len() < 2 {
                return Err(format!(
                    "effect '{}' target '{}' must be rooted at _prev or _curr",
                    effect.name, stmt.target
                ));
            }
        }
    }
    if registry.config().checks.require_boolean {
        for rule in &permissions.ownership {
            if let Some(kind) = rule.guard.result_kind() {
                if kind != LeafKind::Boolean {
                    return Err(format!(
                        "ownership guard on '{}' produces {}, expected boolean",
                        rule.field, kind
                    ));
                }
            }
        }
        for check in &strct.checks {
            if let Some(kind) = check.expr.result_kind() {
                if kind != LeafKind::Boolean {
                    return Err(format!(
                        "check '{}' produces {}, expected boolean",
                        check.name, kind
                    ));
                }
            }
        }
    }
    Ok(())
}
