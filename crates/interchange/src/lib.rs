//! graft-interchange: schema bundle JSON types and deserialization.
//!
//! Provides typed structs for the constructs of a graft schema bundle
//! and a single `from_interchange()` entry point that deserializes a
//! `serde_json::Value` bundle into a `SchemaBundle`.
//!
//! Only the structural shape is parsed here. Expression trees, grant
//! tables and effect statements are kept as `serde_json::Value` so the
//! evaluator can interpret them into its own domain types.

pub mod deserialize;
pub mod types;

pub use deserialize::{from_interchange, InterchangeError};
pub use types::*;
