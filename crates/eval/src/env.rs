//! Evaluation environments.
//!
//! An [`Environment`] is a tree keyed by path segment whose nodes are
//! either a terminal leaf or a map of children, never both. It is built
//! fresh for each evaluation from the paths the expression references,
//! using a [`PathResolver`] supplied by the storage layer.

use std::collections::BTreeMap;

use crate::types::{EvalError, Expression, Leaf, PathString, Registry, Snapshot, Struct};

// ──────────────────────────────────────────────
// Resolver seam
// ──────────────────────────────────────────────

/// Current-value lookup supplied by the storage collaborator.
///
/// Paths arrive exactly as written in the schema, snapshot root included
/// (`_curr.customer.spent`). Returning `None` leaves the path unbound.
pub trait PathResolver {
    fn resolve(&self, path: &PathString) -> Option<Leaf>;
}

impl PathResolver for BTreeMap<PathString, Leaf> {
    fn resolve(&self, path: &PathString) -> Option<Leaf> {
        self.get(path).cloned()
    }
}

/// Adapts a closure into a [`PathResolver`].
pub struct ResolverFn<F>(pub F);

impl<F> PathResolver for ResolverFn<F>
where
    F: Fn(&PathString) -> Option<Leaf>,
{
    fn resolve(&self, path: &PathString) -> Option<Leaf> {
        (self.0)(path)
    }
}

// ──────────────────────────────────────────────
// Environment tree
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Leaf(Leaf),
    Node(BTreeMap<String, Environment>),
}

impl Default for Environment {
    fn default() -> Self {
        Environment::Node(BTreeMap::new())
    }
}

fn conflict(path: &PathString) -> EvalError {
    EvalError::EvaluationFailure {
        message: format!(
            "path '{}' would make an environment node both a value and a parent",
            path
        ),
    }
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `value` at `path`, creating intermediate nodes as needed.
    /// Rebinding the same terminal path replaces the old value.
    pub fn insert(&mut self, path: &PathString, value: Leaf) -> Result<(), EvalError> {
        let (last, hops) = path.segments().split_last().ok_or_else(|| EvalError::UnknownField {
            path: String::new(),
        })?;
        let mut node = self;
        for hop in hops {
            let children = match node {
                Environment::Node(children) => children,
                Environment::Leaf(_) => return Err(conflict(path)),
            };
            node = children.entry(hop.clone()).or_default();
        }
        match node {
            Environment::Node(children) => {
                if matches!(children.get(last), Some(Environment::Node(grand)) if !grand.is_empty()) {
                    return Err(conflict(path));
                }
                children.insert(last.clone(), Environment::Leaf(value));
                Ok(())
            }
            Environment::Leaf(_) => Err(conflict(path)),
        }
    }

    /// Descend to the leaf at `path`.
    ///
    /// A missing node, a leaf reached before the path is exhausted, or a
    /// path that ends on an inner node is an `UnknownField` failure.
    pub fn lookup(&self, path: &PathString) -> Result<&Leaf, EvalError> {
        let unknown = || EvalError::UnknownField {
            path: path.to_string(),
        };
        let mut node = self;
        for segment in path.segments() {
            node = match node {
                Environment::Node(children) => children.get(segment).ok_or_else(unknown)?,
                Environment::Leaf(_) => return Err(unknown()),
            };
        }
        match node {
            Environment::Leaf(leaf) => Ok(leaf),
            Environment::Node(_) => Err(unknown()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Environment::Node(children) if children.is_empty())
    }
}

// ──────────────────────────────────────────────
// Builder
// ──────────────────────────────────────────────

/// Builds environments from a resolver, optionally falling back to the
/// declared field defaults of a struct.
pub struct EnvironmentBuilder<'a> {
    resolver: &'a dyn PathResolver,
    schema: Option<(&'a Registry, &'a Struct)>,
}

impl<'a> EnvironmentBuilder<'a> {
    pub fn new(resolver: &'a dyn PathResolver) -> Self {
        EnvironmentBuilder {
            resolver,
            schema: None,
        }
    }

    /// Use `strct`'s field defaults for `_prev`, `_curr` and untagged
    /// paths the resolver cannot answer. `_borrow` paths never default.
    pub fn with_defaults(mut self, registry: &'a Registry, strct: &'a Struct) -> Self {
        self.schema = Some((registry, strct));
        self
    }

    pub fn resolve(&self, path: &PathString) -> Option<Leaf> {
        if let Some(leaf) = self.resolver.resolve(path) {
            return Some(leaf);
        }
        let (registry, strct) = self.schema?;
        if path.snapshot() == Some(Snapshot::Borrow) {
            return None;
        }
        registry
            .field_at(strct, &path.relative())
            .ok()
            .and_then(|f| f.default.clone())
    }

    /// Resolve every path in `paths`; unresolved paths stay unbound.
    pub fn build(&self, paths: &[PathString]) -> Result<Environment, EvalError> {
        let mut env = Environment::new();
        for path in paths {
            if let Some(leaf) = self.resolve(path) {
                env.insert(path, leaf)?;
            }
        }
        Ok(env)
    }

    /// Build the environment an expression needs.
    pub fn build_for(&self, expr: &Expression) -> Result<Environment, EvalError> {
        self.build(&expr.referenced_paths())
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::types::{Field, FieldType, LeafKind};

    fn p(s: &str) -> PathString {
        PathString::parse(s).unwrap()
    }

    #[test]
    fn insert_and_lookup_nested() {
        let mut env = Environment::new();
        env.insert(&p("_curr.customer.spent"), Leaf::Number(10)).unwrap();
        env.insert(&p("_curr.qty"), Leaf::Number(2)).unwrap();
        assert_eq!(env.lookup(&p("_curr.customer.spent")).unwrap(), &Leaf::Number(10));
        assert_eq!(env.lookup(&p("_curr.qty")).unwrap(), &Leaf::Number(2));
    }

    #[test]
    fn lookup_failures_are_unknown_field() {
        let mut env = Environment::new();
        env.insert(&p("_curr.qty"), Leaf::Number(2)).unwrap();
        for bad in ["_curr.total", "_curr.qty.more", "_curr", "_prev.qty"] {
            assert!(
                matches!(env.lookup(&p(bad)), Err(EvalError::UnknownField { .. })),
                "{} should fail",
                bad
            );
        }
    }

    #[test]
    fn leaf_and_children_conflict() {
        let mut env = Environment::new();
        env.insert(&p("_curr.customer"), Leaf::Number(7)).unwrap();
        assert!(matches!(
            env.insert(&p("_curr.customer.spent"), Leaf::Number(1)),
            Err(EvalError::EvaluationFailure { .. })
        ));

        let mut env = Environment::new();
        env.insert(&p("_curr.customer.spent"), Leaf::Number(1)).unwrap();
        assert!(env.insert(&p("_curr.customer"), Leaf::Number(7)).is_err());
    }

    #[test]
    fn builder_skips_unresolved_paths() {
        let mut values = BTreeMap::new();
        values.insert(p("_curr.qty"), Leaf::Number(3));
        let env = EnvironmentBuilder::new(&values)
            .build(&[p("_curr.qty"), p("_curr.missing")])
            .unwrap();
        assert_eq!(env.lookup(&p("_curr.qty")).unwrap(), &Leaf::Number(3));
        assert!(env.lookup(&p("_curr.missing")).is_err());
    }

    #[test]
    fn builder_falls_back_to_defaults() {
        let order = Struct::new(
            "Order",
            vec![Field {
                name: "qty".to_string(),
                ty: FieldType::Primitive(LeafKind::Number),
                default: Some(Leaf::Number(1)),
            }],
        );
        let registry = Registry::new("shop", vec![order.clone()], EngineConfig::default());
        let empty: BTreeMap<PathString, Leaf> = BTreeMap::new();
        let builder = EnvironmentBuilder::new(&empty).with_defaults(&registry, &order);
        assert_eq!(builder.resolve(&p("_curr.qty")), Some(Leaf::Number(1)));
        assert_eq!(builder.resolve(&p("qty")), Some(Leaf::Number(1)));
        assert_eq!(builder.resolve(&p("_borrow.qty")), None);
    }

    #[test]
    fn closure_resolver() {
        let resolver = ResolverFn(|path: &PathString| {
            (path.to_string() == "_curr.qty").then_some(Leaf::Number(4))
        });
        let env = EnvironmentBuilder::new(&resolver)
            .build(&[p("_curr.qty")])
            .unwrap();
        assert_eq!(env.lookup(&p("_curr.qty")).unwrap(), &Leaf::Number(4));
    }
}
