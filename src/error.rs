//! Error taxonomy for the reactive runtime.
//!
//! Structural errors (`MalformedCall`, `MalformedRule`, `UnknownFunction`,
//! `WrongFunctionKind`, `MissingDependency`) abort the wiring of one rule and
//! surface to the caller. `Evaluation` and `CycleDetected` are raised inside
//! notification callbacks and are caught at the store boundary.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReactiveError {
    /// A subscription key is already live on this store.
    #[error("subscription key '{key}' is already registered")]
    DuplicateKey { key: String },

    /// Unsubscribe was called with a key the store does not know.
    #[error("subscription key '{key}' is not registered")]
    MissingKey { key: String },

    /// Text expected to look like `name(args)` did not.
    #[error("malformed call '{text}': expected `name(args)`")]
    MalformedCall { text: String },

    /// A rule attribute is missing one of its `|`-separated parts.
    #[error("malformed rule '{rule}': {reason}")]
    MalformedRule { rule: String, reason: String },

    #[error("function '{name}' is not registered")]
    UnknownFunction { name: String },

    #[error("function '{name}' is not registered as a {expected} function")]
    WrongFunctionKind { name: String, expected: &'static str },

    /// A rule names a source that cannot be subscribed to.
    #[error("dependency '{dependency}' of '{target}' has no reactive source")]
    MissingDependency { target: String, dependency: String },

    /// A registered function failed while computing `key`.
    #[error("evaluation of '{key}' failed: {message}")]
    Evaluation { key: String, message: String },

    #[error("template placeholder '{{{{{name}}}}}' has no value")]
    UnmappedPlaceholder { name: String },

    #[error("notification depth exceeded {limit} while notifying '{key}'")]
    CycleDetected { key: String, limit: usize },

    #[error("failed to read document: {message}")]
    Document { message: String },

    #[error("invalid runtime options: {message}")]
    Config { message: String },
}

impl ReactiveError {
    pub fn malformed_rule(rule: &str, reason: &str) -> Self {
        Self::MalformedRule {
            rule: rule.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn missing_dependency(target: &str, dependency: &str) -> Self {
        Self::MissingDependency {
            target: target.to_string(),
            dependency: dependency.to_string(),
        }
    }

    /// True for errors raised while a notification was running, as opposed
    /// to errors in the shape of a rule.
    pub fn is_runtime(&self) -> bool {
        matches!(self, Self::Evaluation { .. } | Self::CycleDetected { .. })
    }
}

/// Error returned by user-registered compute and watch functions.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct FunctionError {
    pub message: String,
    /// Offending input, when the function wants it in the log line.
    pub value: Option<Value>,
}

impl FunctionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            value: None,
        }
    }

    pub fn with_value(message: impl Into<String>, value: Value) -> Self {
        Self {
            message: message.into(),
            value: Some(value),
        }
    }
}

impl From<&str> for FunctionError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for FunctionError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_message_keeps_braces() {
        let err = ReactiveError::UnmappedPlaceholder {
            name: "title".to_string(),
        };
        assert_eq!(err.to_string(), "template placeholder '{{title}}' has no value");
    }

    #[test]
    fn test_runtime_classification() {
        assert!(ReactiveError::Evaluation {
            key: "total".into(),
            message: "boom".into()
        }
        .is_runtime());
        assert!(!ReactiveError::malformed_rule("x", "missing '|'").is_runtime());
    }
}
