//! Ownership paths and field-level permission resolution.
//!
//! An actor proves ownership of an entity by presenting paths that walk
//! `other` fields from the entity to a user record (`owner`,
//! `customer.owner`). Each proven path unlocks the private grants declared
//! along it; borrow rules unlock the same grants read-only.

use tracing::{debug, warn};

use crate::env::{EnvironmentBuilder, PathResolver};
use crate::evaluate::eval_expr;
use crate::provenance::ProvenanceCollector;
use crate::types::{EvalError, Leaf, PathSet, PathString, Registry, Struct};

// ──────────────────────────────────────────────
// Path validation
// ──────────────────────────────────────────────

/// Check that `path` walks `other` fields from `strct` and ends on a field
/// targeting the configured user struct. Returns the path unchanged.
pub fn validate_ownership_path(
    registry: &Registry,
    strct: &Struct,
    path: &PathString,
) -> Result<PathString, EvalError> {
    let invalid = |reason: String| EvalError::InvalidOwnershipPath {
        struct_name: strct.name.clone(),
        path: path.to_string(),
        reason,
    };
    if path.is_empty() {
        return Err(invalid("path is empty".to_string()));
    }
    let max_depth = registry.config().engine.max_path_depth;
    if path.len() > max_depth {
        return Err(invalid(format!(
            "path has {} hops, more than the limit of {}",
            path.len(),
            max_depth
        )));
    }
    walk(registry, strct, path.segments()).map_err(invalid)?;
    Ok(path.clone())
}

fn walk(registry: &Registry, current: &Struct, hops: &[String]) -> Result<(), String> {
    let Some((head, rest)) = hops.split_first() else {
        return Err(format!("path ends at '{}' before reaching a user", current.name));
    };
    let field = current
        .field(head)
        .ok_or_else(|| format!("struct '{}' has no field '{}'", current.name, head))?;
    let target = field
        .target()
        .ok_or_else(|| format!("field '{}' on '{}' is not an other field", head, current.name))?;
    if target == registry.user_struct() && rest.is_empty() {
        return Ok(());
    }
    if rest.is_empty() {
        return Err(format!("path ends at '{}' before reaching a user", target));
    }
    let next = registry
        .lookup_struct(target)
        .ok_or_else(|| format!("target struct '{}' does not exist", target))?;
    walk(registry, next, rest)
}

// ──────────────────────────────────────────────
// Permission resolution
// ──────────────────────────────────────────────

/// Resolve the `(write_set, read_set)` an actor holds on `strct`.
///
/// `ownership_paths` are the paths the actor has proven; `borrow_fields`
/// are the borrow rules the actor requests (normally the output of
/// [`prove_borrows`]). Any invalid ownership path fails the whole call.
pub fn get_permissions(
    registry: &Registry,
    strct: &Struct,
    ownership_paths: &[PathString],
    borrow_fields: &[String],
) -> Result<(PathSet, PathSet), EvalError> {
    let validated = ownership_paths
        .iter()
        .map(|p| validate_ownership_path(registry, strct, p))
        .collect::<Result<Vec<_>, _>>()?;

    let declared = strct.ownership_fields();
    let allowed: Vec<&PathString> = validated
        .iter()
        .filter(|p| p.head().is_some_and(|h| declared.contains(&h)))
        .collect();
    let accessed: Vec<&str> = allowed.iter().filter_map(|p| p.head()).collect();

    // Direct ownership of a field always wins over borrowing it.
    let allowed_borrows: Vec<&str> = strct
        .permissions
        .borrow
        .keys()
        .map(String::as_str)
        .filter(|f| declared.contains(f))
        .filter(|f| borrow_fields.iter().any(|b| b == f))
        .filter(|f| !accessed.contains(f))
        .collect();

    let mut write_set = PathSet::new();
    let mut read_set = PathSet::new();

    for path in &allowed {
        let (w, r) = resolve(registry, &PathString::default(), strct, path, false)?;
        write_set.extend(w);
        read_set.extend(r);
    }

    for field in &allowed_borrows {
        let Some(rule) = strct.permissions.borrow.get(*field) else {
            continue;
        };
        for path in &rule.ownership {
            let path = validate_ownership_path(registry, strct, path)?;
            let (w, r) = resolve(registry, &PathString::default(), strct, &path, true)?;
            read_set.extend(w);
            read_set.extend(r);
        }
    }

    debug!(
        struct_name = %strct.name,
        ownership = allowed.len(),
        borrows = allowed_borrows.len(),
        write = write_set.len(),
        read = read_set.len(),
        "resolved permissions"
    );
    Ok((write_set, read_set))
}

/// Collect the grants unlocked by owning `path` on `strct`, with every
/// result path prefixed by `prefix`. Borrowed resolution never writes.
fn resolve(
    registry: &Registry,
    prefix: &PathString,
    strct: &Struct,
    path: &PathString,
    borrow: bool,
) -> Result<(PathSet, PathSet), EvalError> {
    let invalid = |reason: String| EvalError::InvalidOwnershipPath {
        struct_name: strct.name.clone(),
        path: path.to_string(),
        reason,
    };
    let head = path
        .head()
        .ok_or_else(|| invalid("path is empty".to_string()))?;
    let grant = strct
        .permissions
        .private
        .get(head)
        .ok_or_else(|| invalid(format!("no private grant for '{}'", head)))?;

    let mut write: PathSet = grant.write.iter().map(|p| prefix.join(p)).collect();
    let mut read: PathSet = grant.read.iter().map(|p| prefix.join(p)).collect();
    read.insert(prefix.child(head));
    read.extend(strct.permissions.public.iter().map(|p| prefix.join(p)));

    if path.len() > 1 {
        let rest = path.tail();
        let next_hop = rest.head().unwrap_or_default();
        let target = strct
            .field(head)
            .and_then(|f| f.target())
            .ok_or_else(|| invalid(format!("field '{}' is not an other field", head)))?;
        let next = registry
            .lookup_struct(target)
            .ok_or_else(|| invalid(format!("target struct '{}' does not exist", target)))?;
        if next.field(next_hop).is_none() {
            return Err(invalid(format!(
                "struct '{}' has no field '{}'",
                next.name, next_hop
            )));
        }
        let (w, r) = resolve(registry, &prefix.child(head), next, &rest, borrow)?;
        if borrow {
            read.extend(w);
        } else {
            write.extend(w);
        }
        read.extend(r);
    }

    if borrow {
        read.append(&mut write);
    }
    Ok((write, read))
}

/// Check a borrow rule's delegated path the way `get_permissions` will use
/// it: the walk must reach a user and every hop must carry a private grant.
pub(crate) fn check_delegated_path(
    registry: &Registry,
    strct: &Struct,
    path: &PathString,
) -> Result<(), EvalError> {
    let path = validate_ownership_path(registry, strct, path)?;
    resolve(registry, &PathString::default(), strct, &path, true).map(|_| ())
}

// ──────────────────────────────────────────────
// Borrow proofs
// ──────────────────────────────────────────────

/// Names of the borrow rules on `strct` whose `prove` expression holds.
///
/// `_borrow.*` paths in a prove expression are answered by `resolver`
/// from the borrowing actor's session. Anything other than
/// `Boolean(true)`, including an evaluation failure, denies the borrow.
pub fn prove_borrows(
    registry: &Registry,
    strct: &Struct,
    resolver: &dyn PathResolver,
) -> Vec<String> {
    let builder = EnvironmentBuilder::new(resolver).with_defaults(registry, strct);
    let mut granted = Vec::new();
    for (field, rule) in &strct.permissions.borrow {
        let outcome = builder
            .build_for(&rule.prove)
            .and_then(|env| eval_expr(&rule.prove, &env, &mut ProvenanceCollector::new()));
        match outcome {
            Ok(Leaf::Boolean(true)) => granted.push(field.clone()),
            Ok(other) => debug!(
                struct_name = %strct.name,
                borrow = %rule.name,
                result = %other,
                "borrow denied"
            ),
            Err(e) => warn!(
                struct_name = %strct.name,
                borrow = %rule.name,
                error = %e,
                "borrow proof failed"
            ),
        }
    }
    granted
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn p(s: &str) -> PathString {
        PathString::parse(s).unwrap()
    }

    fn set(paths: &[&str]) -> PathSet {
        paths.iter().map(|s| p(s)).collect()
    }

    fn registry() -> Registry {
        let bundle = json!({
            "id": "shop",
            "constructs": [
                { "kind": "Struct", "id": "User", "fields": { "name": { "type": "text" } } },
                {
                    "kind": "Struct",
                    "id": "Customer",
                    "fields": {
                        "owner": { "type": "other", "struct": "User" },
                        "name": { "type": "text" },
                        "vip": { "type": "boolean", "default": false }
                    },
                    "permissions": {
                        "ownership": [{ "field": "owner" }],
                        "private": { "owner": { "read": ["vip"], "write": ["name"] } }
                    }
                },
                {
                    "kind": "Struct",
                    "id": "Order",
                    "fields": {
                        "owner": { "type": "other", "struct": "User" },
                        "approver": { "type": "other", "struct": "User" },
                        "customer": { "type": "other", "struct": "Customer" },
                        "qty": { "type": "number" },
                        "total": { "type": "decimal" },
                        "code": { "type": "text" }
                    },
                    "permissions": {
                        "ownership": [{ "field": "owner" }, { "field": "customer" }],
                        "borrow": {
                            "owner": {
                                "name": "reviewer",
                                "prove": {
                                    "op": "equals", "type": "text",
                                    "args": [
                                        { "op": "path", "type": "ref", "args": ["_borrow.role"] },
                                        { "op": "literal", "type": "text", "args": ["reviewer"] }
                                    ]
                                },
                                "ownership": ["customer.owner"]
                            }
                        },
                        "private": {
                            "owner": { "read": ["total"], "write": ["qty", "code"] },
                            "customer": { "read": ["qty"], "write": [] }
                        },
                        "public": ["code"]
                    }
                }
            ]
        });
        Registry::from_interchange(&bundle, EngineConfig::default()).unwrap()
    }

    #[test]
    fn validates_direct_and_nested_paths() {
        let r = registry();
        let order = r.get("Order").unwrap();
        assert_eq!(validate_ownership_path(&r, order, &p("owner")).unwrap(), p("owner"));
        assert_eq!(
            validate_ownership_path(&r, order, &p("customer.owner")).unwrap(),
            p("customer.owner")
        );
    }

    #[test]
    fn rejects_bad_ownership_paths() {
        let r = registry();
        let order = r.get("Order").unwrap();
        for bad in ["", "qty", "missing", "customer", "customer.name", "owner.name"] {
            assert!(
                matches!(
                    validate_ownership_path(&r, order, &p(bad)),
                    Err(EvalError::InvalidOwnershipPath { .. })
                ),
                "'{}' should be rejected",
                bad
            );
        }
    }

    #[test]
    fn depth_limit_applies() {
        let mut config = EngineConfig::default();
        config.engine.max_path_depth = 1;
        let base = registry();
        let r = Registry::new(&base.id, base.structs().cloned().collect(), config);
        let order = r.get("Order").unwrap();
        assert!(validate_ownership_path(&r, order, &p("owner")).is_ok());
        assert!(validate_ownership_path(&r, order, &p("customer.owner")).is_err());
    }

    #[test]
    fn direct_ownership_grants() {
        let r = registry();
        let order = r.get("Order").unwrap();
        let (write, read) = get_permissions(&r, order, &[p("owner")], &[]).unwrap();
        assert_eq!(write, set(&["qty", "code"]));
        assert_eq!(read, set(&["total", "owner", "code"]));
    }

    #[test]
    fn nested_ownership_prefixes_grants() {
        let r = registry();
        let order = r.get("Order").unwrap();
        let (write, read) = get_permissions(&r, order, &[p("customer.owner")], &[]).unwrap();
        assert_eq!(write, set(&["customer.name"]));
        assert_eq!(
            read,
            set(&["qty", "customer", "code", "customer.vip", "customer.owner"])
        );
    }

    #[test]
    fn borrow_is_read_only() {
        let r = registry();
        let order = r.get("Order").unwrap();
        let (write, read) = get_permissions(&r, order, &[], &["owner".to_string()]).unwrap();
        assert!(write.is_empty());
        assert!(read.contains(&p("customer.name")));
        assert!(read.contains(&p("customer.owner")));
    }

    #[test]
    fn direct_ownership_beats_borrow() {
        let r = registry();
        let order = r.get("Order").unwrap();
        let direct = get_permissions(&r, order, &[p("owner")], &[]).unwrap();
        let both = get_permissions(&r, order, &[p("owner")], &["owner".to_string()]).unwrap();
        assert_eq!(direct, both);
    }

    #[test]
    fn undeclared_ownership_field_grants_nothing() {
        let r = registry();
        let order = r.get("Order").unwrap();
        let (write, read) = get_permissions(&r, order, &[p("approver")], &[]).unwrap();
        assert!(write.is_empty());
        assert!(read.is_empty());
    }

    #[test]
    fn one_invalid_path_fails_the_call() {
        let r = registry();
        let order = r.get("Order").unwrap();
        assert!(get_permissions(&r, order, &[p("owner"), p("qty")], &[]).is_err());
    }

    #[test]
    fn prove_borrows_fails_closed() {
        let r = registry();
        let order = r.get("Order").unwrap();

        let mut session = BTreeMap::new();
        session.insert(p("_borrow.role"), Leaf::text("reviewer"));
        assert_eq!(prove_borrows(&r, order, &session), vec!["owner".to_string()]);

        session.insert(p("_borrow.role"), Leaf::text("guest"));
        assert!(prove_borrows(&r, order, &session).is_empty());

        let empty: BTreeMap<PathString, Leaf> = BTreeMap::new();
        assert!(prove_borrows(&r, order, &empty).is_empty());
    }
}
