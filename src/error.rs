//! Failure taxonomy for the Python sandbox.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Category of a failed execution attempt.
///
/// Every failure the sandbox can report falls into exactly one of these
/// kinds; callers can branch on the kind without parsing the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The submitted source could not be parsed.
    SyntaxError,
    /// The classifier rejected the source before evaluation.
    ForbiddenConstruct,
    /// Evaluation raised a Python exception.
    RuntimeError,
    /// Evaluation exceeded the configured timeout.
    Timeout,
}

impl FailureKind {
    /// The snake_case wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::SyntaxError => "syntax_error",
            FailureKind::ForbiddenConstruct => "forbidden_construct",
            FailureKind::RuntimeError => "runtime_error",
            FailureKind::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured execution failure.
///
/// The sandbox never surfaces raw exceptions to callers; every failure is
/// converted into one of these and embedded in the returned
/// [`ExecutionRecord`](crate::sandbox::executor::ExecutionRecord).
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct SandboxFailure {
    /// The failure category.
    pub kind: FailureKind,
    /// Human-readable detail. For runtime errors this carries the Python
    /// exception type and message (e.g. `"ZeroDivisionError: division by zero"`).
    pub message: String,
}

impl SandboxFailure {
    /// A parse failure, carrying the parser's error message.
    pub fn syntax(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::SyntaxError,
            message: message.into(),
        }
    }

    /// A classifier rejection.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::ForbiddenConstruct,
            message: message.into(),
        }
    }

    /// A Python exception raised during evaluation.
    pub fn runtime(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::RuntimeError,
            message: message.into(),
        }
    }

    /// A timeout expiry.
    pub fn timeout(limit: std::time::Duration) -> Self {
        Self {
            kind: FailureKind::Timeout,
            message: format!("execution exceeded the {:?} timeout", limit),
        }
    }

    /// Check if this failure is a timeout.
    pub fn is_timeout(&self) -> bool {
        self.kind == FailureKind::Timeout
    }

    /// Check if this failure is a classifier rejection.
    pub fn is_forbidden_construct(&self) -> bool {
        self.kind == FailureKind::ForbiddenConstruct
    }

    /// Check if this failure is a Python runtime error.
    pub fn is_runtime_error(&self) -> bool {
        self.kind == FailureKind::RuntimeError
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_joins_kind_and_message() {
        let failure = SandboxFailure::runtime("NameError: name 'x' is not defined");
        assert_eq!(
            failure.to_string(),
            "runtime_error: NameError: name 'x' is not defined"
        );
    }

    #[test]
    fn test_kind_wire_names() {
        assert_eq!(FailureKind::SyntaxError.as_str(), "syntax_error");
        assert_eq!(FailureKind::ForbiddenConstruct.as_str(), "forbidden_construct");
        assert_eq!(FailureKind::RuntimeError.as_str(), "runtime_error");
        assert_eq!(FailureKind::Timeout.as_str(), "timeout");
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&FailureKind::ForbiddenConstruct).unwrap();
        assert_eq!(json, "\"forbidden_construct\"");
    }

    #[test]
    fn test_failure_helpers() {
        let timeout = SandboxFailure::timeout(std::time::Duration::from_secs(5));
        assert!(timeout.is_timeout());
        assert!(!timeout.is_runtime_error());

        let forbidden = SandboxFailure::forbidden("import is not allowed");
        assert!(forbidden.is_forbidden_construct());
        assert!(!forbidden.is_timeout());
    }

    #[test]
    fn test_failure_round_trips_through_json() {
        let failure = SandboxFailure::syntax("invalid syntax at line 1");
        let json = serde_json::to_string(&failure).unwrap();
        let back: SandboxFailure = serde_json::from_str(&json).unwrap();
        assert_eq!(back, failure);
    }
}
