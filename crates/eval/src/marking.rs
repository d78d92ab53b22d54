//! Dependency marking over a struct's accessible fields.
//!
//! Three independent passes annotate each candidate path: is it read by a
//! check, is it written by an effect (here or on a struct higher up the
//! graph), and does an effect read it. Paths are compared in relative form,
//! so `_curr.qty` in an expression marks the field `qty`.

use crate::ownership::get_permissions;
use crate::types::{EvalError, PathSet, PathString, Registry, Struct};

/// Access and dependency flags for one field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldAccess {
    pub path: PathString,
    pub readable: bool,
    pub writeable: bool,
    pub check_dependency: bool,
    /// Written by an effect. Never user-writeable.
    pub trigger_output: bool,
    pub trigger_dependency: bool,
}

/// A struct that reaches the one being marked through `prefix`, e.g.
/// `Order` reaching `Customer` through `customer`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ancestor {
    pub struct_name: String,
    pub prefix: PathString,
}

pub fn check_dependency(strct: &Struct, path: &PathString) -> bool {
    let path = path.relative();
    strct
        .checks
        .iter()
        .flat_map(|c| c.expr.referenced_paths())
        .any(|p| p.relative() == path)
}

pub fn trigger_output(
    registry: &Registry,
    strct: &Struct,
    ancestors: &[Ancestor],
    path: &PathString,
) -> bool {
    let path = path.relative();
    if targets(strct, &path) {
        return true;
    }
    ancestors.iter().any(|a| {
        registry
            .lookup_struct(&a.struct_name)
            .is_some_and(|higher| targets(higher, &a.prefix.join(&path)))
    })
}

fn targets(strct: &Struct, relative: &PathString) -> bool {
    strct
        .effects
        .iter()
        .flat_map(|e| &e.mutate)
        .any(|m| &m.target.relative() == relative)
}

/// True if any mutate expression (not target) reads `path`.
pub fn trigger_dependency(strct: &Struct, path: &PathString) -> bool {
    let path = path.relative();
    strct
        .effects
        .iter()
        .flat_map(|e| &e.mutate)
        .flat_map(|m| m.expr.referenced_paths())
        .any(|p| p.relative() == path)
}

/// Annotate every path in `write_set ∪ read_set`, sorted by path.
pub fn mark_fields(
    registry: &Registry,
    strct: &Struct,
    write_set: &PathSet,
    read_set: &PathSet,
    ancestors: &[Ancestor],
) -> Vec<FieldAccess> {
    write_set
        .union(read_set)
        .map(|path| {
            let output = trigger_output(registry, strct, ancestors, path);
            FieldAccess {
                path: path.clone(),
                readable: read_set.contains(path),
                writeable: write_set.contains(path) && !output,
                check_dependency: check_dependency(strct, path),
                trigger_output: output,
                trigger_dependency: trigger_dependency(strct, path),
            }
        })
        .collect()
}

/// Resolve permissions for an actor and mark the resulting fields.
pub fn field_access(
    registry: &Registry,
    strct: &Struct,
    ownership_paths: &[PathString],
    borrow_fields: &[String],
    ancestors: &[Ancestor],
) -> Result<Vec<FieldAccess>, EvalError> {
    let (write_set, read_set) = get_permissions(registry, strct, ownership_paths, borrow_fields)?;
    Ok(mark_fields(registry, strct, &write_set, &read_set, ancestors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use serde_json::json;

    fn p(s: &str) -> PathString {
        PathString::parse(s).unwrap()
    }

    fn path_expr(s: &str) -> serde_json::Value {
        json!({ "op": "path", "type": "ref", "args": [s] })
    }

    fn registry() -> Registry {
        let bundle = json!({
            "id": "shop",
            "constructs": [
                { "kind": "Struct", "id": "User", "fields": {} },
                {
                    "kind": "Struct",
                    "id": "Customer",
                    "fields": {
                        "owner": { "type": "other", "struct": "User" },
                        "spent": { "type": "decimal", "default": "0" },
                        "name": { "type": "text" }
                    },
                    "permissions": {
                        "ownership": [{ "field": "owner" }],
                        "private": { "owner": { "read": [], "write": ["spent", "name"] } }
                    }
                },
                {
                    "kind": "Struct",
                    "id": "Order",
                    "fields": {
                        "owner": { "type": "other", "struct": "User" },
                        "customer": { "type": "other", "struct": "Customer" },
                        "qty": { "type": "number" },
                        "price": { "type": "decimal" },
                        "total": { "type": "decimal" }
                    },
                    "permissions": {
                        "ownership": [{ "field": "owner" }],
                        "private": { "owner": { "read": [], "write": ["qty", "price", "total"] } }
                    },
                    "effects": {
                        "totals": {
                            "dependencies": ["_curr.qty", "_curr.price"],
                            "mutate": [
                                {
                                    "target": "_curr.total",
                                    "expr": {
                                        "op": "multiply", "type": "decimal",
                                        "args": [path_expr("_curr.qty"), path_expr("_curr.price")]
                                    }
                                },
                                {
                                    "target": "_curr.customer.spent",
                                    "expr": path_expr("_curr.total")
                                }
                            ]
                        }
                    },
                    "checks": {
                        "qty_positive": {
                            "expr": {
                                "op": "greater_than", "type": "number",
                                "args": [path_expr("_curr.qty"), { "op": "literal", "type": "number", "args": [0] }]
                            },
                            "error": "E_QTY"
                        }
                    }
                }
            ]
        });
        Registry::from_interchange(&bundle, EngineConfig::default()).unwrap()
    }

    fn find<'a>(fields: &'a [FieldAccess], path: &str) -> &'a FieldAccess {
        fields.iter().find(|f| f.path == p(path)).unwrap()
    }

    #[test]
    fn passes_mark_relative_paths() {
        let r = registry();
        let order = r.get("Order").unwrap();
        assert!(check_dependency(order, &p("qty")));
        assert!(!check_dependency(order, &p("price")));
        assert!(trigger_dependency(order, &p("price")));
        assert!(trigger_dependency(order, &p("total")));
        assert!(trigger_output(&r, order, &[], &p("total")));
        assert!(!trigger_output(&r, order, &[], &p("qty")));
    }

    #[test]
    fn trigger_output_is_never_writeable() {
        let r = registry();
        let order = r.get("Order").unwrap();
        let fields = field_access(&r, order, &[p("owner")], &[], &[]).unwrap();
        let total = find(&fields, "total");
        assert!(total.trigger_output);
        assert!(!total.writeable);
        let qty = find(&fields, "qty");
        assert!(qty.writeable);
        assert!(qty.check_dependency);
        assert!(qty.trigger_dependency);
    }

    #[test]
    fn ancestor_effects_mark_nested_outputs() {
        let r = registry();
        let customer = r.get("Customer").unwrap();
        let ancestors = vec![Ancestor {
            struct_name: "Order".to_string(),
            prefix: p("customer"),
        }];
        let fields = field_access(&r, customer, &[p("owner")], &[], &ancestors).unwrap();
        let spent = find(&fields, "spent");
        assert!(spent.trigger_output);
        assert!(!spent.writeable);
        assert!(find(&fields, "name").writeable);

        let alone = field_access(&r, customer, &[p("owner")], &[], &[]).unwrap();
        assert!(find(&alone, "spent").writeable);
    }

    #[test]
    fn output_is_sorted_by_path() {
        let r = registry();
        let order = r.get("Order").unwrap();
        let fields = field_access(&r, order, &[p("owner")], &[], &[]).unwrap();
        let paths: Vec<String> = fields.iter().map(|f| f.path.to_string()).collect();
        let mut sorted = paths.clone();
        sorted.sort();
        assert_eq!(paths, sorted);
    }
}
