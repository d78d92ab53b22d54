//! Check evaluation. Checks fail closed: an evaluation error or a
//! non-boolean result is a failing check, never a passing one.

use std::collections::BTreeMap;

use tracing::debug;

use crate::env::{EnvironmentBuilder, PathResolver};
use crate::evaluate::eval_expr;
use crate::provenance::ProvenanceCollector;
use crate::types::{EvalError, Leaf, PathString, Registry, Struct};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    /// Error code surfaced to the user when the check fails.
    pub code: String,
    pub outcome: Result<bool, EvalError>,
    pub paths_used: Vec<PathString>,
}

impl CheckResult {
    pub fn passed(&self) -> bool {
        matches!(self.outcome, Ok(true))
    }
}

/// Evaluate every check on `strct`, keyed by check name.
pub fn evaluate_checks(
    registry: &Registry,
    strct: &Struct,
    resolver: &dyn PathResolver,
) -> BTreeMap<String, CheckResult> {
    let builder = EnvironmentBuilder::new(resolver).with_defaults(registry, strct);
    let mut results = BTreeMap::new();
    for check in &strct.checks {
        let mut collector = ProvenanceCollector::new();
        let outcome = builder
            .build_for(&check.expr)
            .and_then(|env| eval_expr(&check.expr, &env, &mut collector))
            .and_then(|leaf| match leaf {
                Leaf::Boolean(b) => Ok(b),
                other => Err(EvalError::mismatch("Boolean", other.type_name())),
            });
        if !matches!(outcome, Ok(true)) {
            debug!(
                struct_name = %strct.name,
                check = %check.name,
                code = %check.error_code,
                outcome = ?outcome,
                "check failed"
            );
        }
        results.insert(
            check.name.clone(),
            CheckResult {
                code: check.error_code.clone(),
                outcome,
                paths_used: collector.into_paths(),
            },
        );
    }
    results
}
