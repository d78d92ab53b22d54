//! Graft rule engine -- accepts a schema bundle and resolved field values,
//! produces permission sets, check results and effect mutations.
//!
//! The engine consumes interchange JSON (not raw schema source), builds a
//! read-only [`Registry`], and answers three kinds of question against it:
//!
//! - what may this actor read and write ([`ownership`], [`marking`]),
//! - does this entity satisfy its checks ([`checks`]),
//! - which derived values change for a create, update or delete
//!   ([`effects`]).
//!
//! Every call is a pure function of its arguments. Field values come in
//! through a caller-supplied [`PathResolver`]; nothing is read from or
//! written to storage here.

pub mod checks;
pub mod config;
pub mod effects;
pub mod env;
pub mod evaluate;
pub mod marking;
pub mod numeric;
pub mod ownership;
pub mod provenance;
pub mod types;
pub mod uniqueness;
pub mod validate;

use std::collections::BTreeMap;

pub use checks::{evaluate_checks, CheckResult};
pub use config::EngineConfig;
pub use effects::{run_effects, statement_runs_on, EffectsReport, Lifecycle, Mutation};
pub use env::{Environment, EnvironmentBuilder, PathResolver, ResolverFn};
pub use evaluate::eval_expr;
pub use marking::{field_access, mark_fields, Ancestor, FieldAccess};
pub use ownership::{get_permissions, prove_borrows, validate_ownership_path};
pub use types::{EvalError, Expression, Leaf, PathSet, PathString, Registry, Struct};
pub use uniqueness::{unique_keys, UniqueKey};

/// Load and validate a schema registry from an interchange bundle.
pub fn load_registry(
    bundle: &serde_json::Value,
    config: EngineConfig,
) -> Result<Registry, EvalError> {
    Registry::from_interchange(bundle, config)
}

/// Result of evaluating one lifecycle event on an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleResult {
    /// Empty on delete: a deleted entity has no current state to check.
    pub checks: BTreeMap<String, CheckResult>,
    pub effects: EffectsReport,
    pub unique_keys: Vec<UniqueKey>,
}

impl LifecycleResult {
    /// True when every check passed and no effect failed.
    pub fn is_valid(&self) -> bool {
        self.checks.values().all(CheckResult::passed) && self.effects.is_clean()
    }
}

/// Evaluate checks, uniqueness keys and effects for one lifecycle event.
///
/// `resolver` answers `_prev` and `_curr` paths for the entity; `changed`
/// optionally narrows which effects fire on update.
pub fn evaluate_lifecycle(
    registry: &Registry,
    struct_name: &str,
    lifecycle: Lifecycle,
    resolver: &dyn PathResolver,
    changed: Option<&PathSet>,
) -> Result<LifecycleResult, EvalError> {
    let strct = registry.get(struct_name)?;
    let (checks, unique_keys) = match lifecycle {
        Lifecycle::Delete => (BTreeMap::new(), Vec::new()),
        Lifecycle::Create | Lifecycle::Update => (
            evaluate_checks(registry, strct, resolver),
            uniqueness::unique_keys(registry, strct, resolver),
        ),
    };
    let effects = run_effects(registry, strct, lifecycle, resolver, changed);
    Ok(LifecycleResult {
        checks,
        effects,
        unique_keys,
    })
}

/// Resolve field access for an actor: prove requested borrows against the
/// actor's session, then combine them with the proven ownership paths.
pub fn resolve_access(
    registry: &Registry,
    struct_name: &str,
    ownership_paths: &[PathString],
    session: &dyn PathResolver,
    ancestors: &[Ancestor],
) -> Result<Vec<FieldAccess>, EvalError> {
    let strct = registry.get(struct_name)?;
    let borrows = prove_borrows(registry, strct, session);
    field_access(registry, strct, ownership_paths, &borrows, ancestors)
}

// ──────────────────────────────────────────────
// Integration tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod integration_tests {
    use super::*;

    fn p(s: &str) -> PathString {
        PathString::parse(s).unwrap()
    }

    fn path(s: &str) -> serde_json::Value {
        serde_json::json!({ "op": "path", "type": "ref", "args": [s] })
    }

    fn bundle() -> serde_json::Value {
        serde_json::json!({
            "id": "shop",
            "kind": "Bundle",
            "graft": "1.0",
            "constructs": [
                { "kind": "Struct", "id": "User", "fields": { "role": { "type": "text" } } },
                {
                    "kind": "Struct",
                    "id": "Customer",
                    "provenance": { "file": "shop.schema", "line": 3 },
                    "fields": {
                        "owner": { "type": "other", "struct": "User" },
                        "orders": { "type": "number", "default": 0 }
                    },
                    "permissions": {
                        "ownership": [{ "field": "owner" }],
                        "private": { "owner": { "read": ["orders"], "write": [] } }
                    }
                },
                {
                    "kind": "Struct",
                    "id": "Order",
                    "provenance": { "file": "shop.schema", "line": 12 },
                    "fields": {
                        "owner": { "type": "other", "struct": "User" },
                        "customer": { "type": "other", "struct": "Customer" },
                        "code": { "type": "text" },
                        "qty": { "type": "number", "default": 1 }
                    },
                    "unique": [["code"]],
                    "permissions": {
                        "ownership": [{ "field": "owner" }],
                        "borrow": {
                            "owner": {
                                "name": "support",
                                "prove": {
                                    "op": "equals", "type": "text",
                                    "args": [path("_borrow.role"), { "op": "literal", "type": "text", "args": ["support"] }]
                                },
                                "ownership": ["owner"]
                            }
                        },
                        "private": { "owner": { "read": ["code"], "write": ["qty"] } }
                    },
                    "effects": {
                        "count_orders": {
                            "dependencies": [],
                            "mutate": [{
                                "target": "_curr.customer.orders",
                                "expr": {
                                    "op": "add", "type": "number",
                                    "args": [path("_curr.customer.orders"), { "op": "literal", "type": "number", "args": [1] }]
                                }
                            }]
                        }
                    },
                    "checks": {
                        "qty_positive": {
                            "expr": {
                                "op": "greater_than", "type": "number",
                                "args": [path("_curr.qty"), { "op": "literal", "type": "number", "args": [0] }]
                            },
                            "error": "E_QTY"
                        }
                    }
                }
            ]
        })
    }

    /// End-to-end create: checks pass, the counter effect fires, the
    /// uniqueness key is resolved.
    #[test]
    fn create_order() {
        let registry = load_registry(&bundle(), EngineConfig::default()).unwrap();
        let mut values = BTreeMap::new();
        values.insert(p("_curr.code"), Leaf::text("A-1"));
        values.insert(p("_curr.customer.orders"), Leaf::Number(4));

        let result = evaluate_lifecycle(&registry, "Order", Lifecycle::Create, &values, None).unwrap();
        assert!(result.is_valid());
        assert_eq!(
            result.effects.instructions(),
            vec![(p("_curr.customer.orders"), Leaf::Number(5))]
        );
        assert_eq!(result.unique_keys.len(), 1);
        assert_eq!(result.unique_keys[0].values, vec![Leaf::text("A-1")]);
    }

    /// The counter statement only references `_curr`, so it never runs on
    /// update or delete.
    #[test]
    fn update_and_delete_skip_create_statements() {
        let registry = load_registry(&bundle(), EngineConfig::default()).unwrap();
        let values: BTreeMap<PathString, Leaf> = BTreeMap::new();
        for lifecycle in [Lifecycle::Update, Lifecycle::Delete] {
            let result = evaluate_lifecycle(&registry, "Order", lifecycle, &values, None).unwrap();
            assert!(result.effects.mutations.is_empty());
        }
    }

    /// A failing check invalidates the lifecycle result.
    #[test]
    fn failing_check_invalidates() {
        let registry = load_registry(&bundle(), EngineConfig::default()).unwrap();
        let mut values = BTreeMap::new();
        values.insert(p("_curr.qty"), Leaf::Number(0));
        values.insert(p("_curr.customer.orders"), Leaf::Number(0));
        let result = evaluate_lifecycle(&registry, "Order", Lifecycle::Create, &values, None).unwrap();
        assert!(!result.is_valid());
        assert_eq!(result.checks["qty_positive"].code, "E_QTY");
    }

    #[test]
    fn unknown_struct_is_schema_error() {
        let registry = load_registry(&bundle(), EngineConfig::default()).unwrap();
        let values: BTreeMap<PathString, Leaf> = BTreeMap::new();
        assert!(matches!(
            evaluate_lifecycle(&registry, "Invoice", Lifecycle::Create, &values, None),
            Err(EvalError::InvalidSchema { .. })
        ));
    }

    /// Owner gets write access; a proven support borrow gets read only.
    #[test]
    fn access_by_ownership_and_borrow() {
        let registry = load_registry(&bundle(), EngineConfig::default()).unwrap();
        let empty: BTreeMap<PathString, Leaf> = BTreeMap::new();

        let owner = resolve_access(&registry, "Order", &[p("owner")], &empty, &[]).unwrap();
        let qty = owner.iter().find(|f| f.path == p("qty")).unwrap();
        assert!(qty.writeable);
        assert!(qty.check_dependency);

        let mut session = BTreeMap::new();
        session.insert(p("_borrow.role"), Leaf::text("support"));
        let support = resolve_access(&registry, "Order", &[], &session, &[]).unwrap();
        assert!(!support.is_empty());
        assert!(support.iter().all(|f| !f.writeable));
        assert!(support.iter().any(|f| f.path == p("code")));

        let nobody = resolve_access(&registry, "Order", &[], &empty, &[]).unwrap();
        assert!(nobody.is_empty());
    }

    /// Nested view of Customer reached from Order: the counter is derived.
    #[test]
    fn ancestor_marks_derived_counter() {
        let registry = load_registry(&bundle(), EngineConfig::default()).unwrap();
        let empty: BTreeMap<PathString, Leaf> = BTreeMap::new();
        let ancestors = [Ancestor {
            struct_name: "Order".to_string(),
            prefix: p("customer"),
        }];
        let fields = resolve_access(&registry, "Customer", &[p("owner")], &empty, &ancestors).unwrap();
        let orders = fields.iter().find(|f| f.path == p("orders")).unwrap();
        assert!(orders.readable);
        assert!(orders.trigger_output);
        assert!(!orders.writeable);
    }
}
