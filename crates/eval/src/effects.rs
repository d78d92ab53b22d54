//! Effects engine: lifecycle-gated mutate statements.
//!
//! One effect table serves create, update and delete. Each statement is
//! gated by the snapshot roots its target and expression mention:
//!
//! | lifecycle | runs statements that reference |
//! |-----------|--------------------------------|
//! | Create    | `_curr`, never `_prev`         |
//! | Update    | both `_prev` and `_curr`       |
//! | Delete    | `_prev`, never `_curr`         |
//!
//! Effects are all-or-nothing: a statement that fails discards every
//! instruction of its effect and is recorded under the effect's name.
//! Other effects on the same entity still run.

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, warn};

use crate::env::{EnvironmentBuilder, PathResolver};
use crate::evaluate::eval_expr;
use crate::provenance::ProvenanceCollector;
use crate::types::{
    Effect, EvalError, Leaf, MutateStatement, PathSet, PathString, Registry, Snapshot, Struct,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    Create,
    Update,
    Delete,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Lifecycle::Create => "create",
            Lifecycle::Update => "update",
            Lifecycle::Delete => "delete",
        })
    }
}

/// An instruction for the storage layer: write `value` at `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub effect: String,
    /// Snapshot-tagged target, as declared.
    pub target: PathString,
    pub value: Leaf,
    pub paths_used: Vec<PathString>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectsReport {
    pub mutations: Vec<Mutation>,
    /// Effects that were discarded, keyed by effect name.
    pub failures: BTreeMap<String, EvalError>,
}

impl EffectsReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// `(target, value)` pairs in emission order.
    pub fn instructions(&self) -> Vec<(PathString, Leaf)> {
        self.mutations
            .iter()
            .map(|m| (m.target.clone(), m.value.clone()))
            .collect()
    }
}

/// Whether `stmt` runs for `lifecycle`, judged from snapshot tags alone.
pub fn statement_runs_on(stmt: &MutateStatement, lifecycle: Lifecycle) -> bool {
    let mut tags = stmt.expr.snapshot_tags();
    tags.extend(stmt.target.snapshot());
    let prev = tags.contains(&Snapshot::Prev);
    let curr = tags.contains(&Snapshot::Curr);
    match lifecycle {
        Lifecycle::Create => curr && !prev,
        Lifecycle::Update => prev && curr,
        Lifecycle::Delete => prev && !curr,
    }
}

/// On update with a known change set, an effect only fires when one of
/// its dependencies changed.
fn triggered(effect: &Effect, lifecycle: Lifecycle, changed: Option<&PathSet>) -> bool {
    match (lifecycle, changed) {
        (Lifecycle::Update, Some(changed)) => effect.dependencies.iter().any(|dep| {
            let dep = dep.relative();
            changed.iter().any(|c| c.relative() == dep)
        }),
        _ => true,
    }
}

/// Run every effect of `strct` for one lifecycle event.
///
/// `resolver` must answer `_prev` and `_curr` paths from one consistent
/// pair of snapshots. Each statement resolves its own environment; no
/// state is threaded between statements.
pub fn run_effects(
    registry: &Registry,
    strct: &Struct,
    lifecycle: Lifecycle,
    resolver: &dyn PathResolver,
    changed: Option<&PathSet>,
) -> EffectsReport {
    let builder = EnvironmentBuilder::new(resolver).with_defaults(registry, strct);
    let mut report = EffectsReport::default();

    for effect in &strct.effects {
        if !triggered(effect, lifecycle, changed) {
            debug!(
                struct_name = %strct.name,
                effect = %effect.name,
                "no dependency changed, skipping effect"
            );
            continue;
        }

        let mut pending = Vec::new();
        let mut failure = None;
        for stmt in effect.mutate.iter().filter(|s| statement_runs_on(s, lifecycle)) {
            let mut collector = ProvenanceCollector::new();
            let result = builder
                .build_for(&stmt.expr)
                .and_then(|env| eval_expr(&stmt.expr, &env, &mut collector));
            match result {
                Ok(value) => pending.push(Mutation {
                    effect: effect.name.clone(),
                    target: stmt.target.clone(),
                    value,
                    paths_used: collector.into_paths(),
                }),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        match failure {
            Some(e) => {
                warn!(
                    struct_name = %strct.name,
                    effect = %effect.name,
                    %lifecycle,
                    discarded = pending.len(),
                    error = %e,
                    "effect failed"
                );
                report.failures.insert(effect.name.clone(), e);
            }
            None => {
                debug!(
                    struct_name = %strct.name,
                    effect = %effect.name,
                    %lifecycle,
                    mutations = pending.len(),
                    "effect applied"
                );
                report.mutations.append(&mut pending);
            }
        }
    }
    report
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
