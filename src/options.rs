//! Runtime configuration.

use serde::{Deserialize, Serialize};

use crate::error::{ReactiveError, Result};

/// What a store does with a callback failure after logging it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorPolicy {
    /// Log and swallow. Sibling callbacks still run and `set` returns `Ok`.
    #[default]
    Production,
    /// Log, finish the remaining callbacks, then return the first error.
    Development,
}

/// Names of the markup attributes the mount pass looks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttributeNames {
    pub bind: String,
    pub compute: String,
    pub watch: String,
    /// Marks an element whose `value` is mirrored into a store.
    pub model: String,
}

impl Default for AttributeNames {
    fn default() -> Self {
        Self {
            bind: "data-bind".to_string(),
            compute: "data-compute".to_string(),
            watch: "data-watch".to_string(),
            model: "data-model".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeOptions {
    pub error_policy: ErrorPolicy,
    /// Maximum nesting of notifications before `CycleDetected` is raised.
    /// `None` leaves cascades bounded only by the stack.
    pub max_notify_depth: Option<usize>,
    pub attributes: AttributeNames,
}

impl RuntimeOptions {
    pub fn development() -> Self {
        Self {
            error_policy: ErrorPolicy::Development,
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ReactiveError::Config {
            message: e.to_string(),
        })
    }
}
