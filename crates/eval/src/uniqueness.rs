//! Uniqueness keys handed to the storage layer for collision checks.

use tracing::debug;

use crate::env::{EnvironmentBuilder, PathResolver};
use crate::types::{Leaf, PathString, Registry, Snapshot, Struct};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueKey {
    pub fields: Vec<String>,
    pub values: Vec<Leaf>,
}

/// Resolve the current value of every uniqueness group on `strct`.
///
/// A group with any unresolved member is left out: absent values never
/// collide.
pub fn unique_keys(
    registry: &Registry,
    strct: &Struct,
    resolver: &dyn PathResolver,
) -> Vec<UniqueKey> {
    let builder = EnvironmentBuilder::new(resolver).with_defaults(registry, strct);
    strct
        .unique
        .iter()
        .filter_map(|group| {
            let values = group
                .iter()
                .map(|f| builder.resolve(&PathString::from_segments([Snapshot::Curr.as_str(), f.as_str()])))
                .collect::<Option<Vec<_>>>();
            if values.is_none() {
                debug!(
                    struct_name = %strct.name,
                    group = ?group,
                    "uniqueness group incomplete, skipped"
                );
            }
            Some(UniqueKey {
                fields: group.clone(),
                values: values?,
            })
        })
        .collect()
}
