//! Engine configuration (`graft.toml`).
//!
//! ```toml
//! [engine]
//! user_struct = "User"
//! max_path_depth = 32
//!
//! [checks]
//! require_boolean = true
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::EvalError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub checks: ChecksSection,
}

/// `[engine]` — schema-wide resolution settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSection {
    /// Struct every ownership path must terminate at.
    #[serde(default = "default_user_struct")]
    pub user_struct: String,
    /// Upper bound on ownership path length.
    #[serde(default = "default_max_path_depth")]
    pub max_path_depth: usize,
}

/// `[checks]` — load-time check validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksSection {
    /// Reject check expressions whose static result kind is not boolean.
    #[serde(default = "default_true")]
    pub require_boolean: bool,
}

fn default_user_struct() -> String {
    "User".to_string()
}

fn default_max_path_depth() -> usize {
    32
}

fn default_true() -> bool {
    true
}

impl Default for EngineSection {
    fn default() -> Self {
        EngineSection {
            user_struct: default_user_struct(),
            max_path_depth: default_max_path_depth(),
        }
    }
}

impl Default for ChecksSection {
    fn default() -> Self {
        ChecksSection {
            require_boolean: default_true(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<EngineConfig, EvalError> {
        toml::from_str(s).map_err(|e| EvalError::Config {
            message: format!("could not parse engine config: {}", e),
        })
    }

    /// Read and parse a TOML config file.
    pub fn load(path: &Path) -> Result<EngineConfig, EvalError> {
        let content = std::fs::read_to_string(path).map_err(|e| EvalError::Config {
            message: format!("could not read '{}': {}", path.display(), e),
        })?;
        EngineConfig::from_toml_str(&content)
    }
}
