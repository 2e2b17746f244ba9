//! Error types for schema conversion and validation.

use serde::Serialize;
use thiserror::Error;

/// Errors raised while converting a schema fragment into a validator tree.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("invalid resolver configuration: {message}")]
    Configuration { message: String },

    #[error("schema fragment must be an object or a type-name string, got {actual}")]
    InvalidFragment { actual: &'static str },

    #[error("cannot resolve reference `{reference}` with base `{base_uri}`")]
    UnresolvedReference { reference: String, base_uri: String },

    #[error("could not resolve type `{name}`")]
    UnknownType { name: String },

    #[error("malformed `{keyword}` combinator: expected {expected}, got {actual}")]
    MalformedCombinator {
        keyword: &'static str,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("invalid pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Errors raised while validating a value against a node tree.
#[derive(Debug, Error)]
pub enum ValidateError {
    #[error("validation failed with {} violation(s)", .violations.len())]
    Invalid { violations: Vec<Violation> },
}

impl ValidateError {
    /// The individual failures collected during validation.
    pub fn violations(&self) -> &[Violation] {
        match self {
            ValidateError::Invalid { violations } => violations,
        }
    }
}

/// Single validation failure with instance-path context.
#[derive(Debug, Clone, Serialize)]
pub struct Violation {
    /// JSON Pointer (RFC 6901) to the offending value.
    pub path: String,
    /// Human-readable failure message.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolved_reference_message() {
        let err = ConvertError::UnresolvedReference {
            reference: "measurement#subNumber".into(),
            base_uri: "order".into(),
        };
        assert_eq!(
            err.to_string(),
            "cannot resolve reference `measurement#subNumber` with base `order`"
        );
    }

    #[test]
    fn unknown_type_message() {
        let err = ConvertError::UnknownType { name: "frob".into() };
        assert_eq!(err.to_string(), "could not resolve type `frob`");
    }

    #[test]
    fn violation_display() {
        let violation = Violation {
            path: "/buyer/email".into(),
            message: "expected string, got number".into(),
        };
        assert_eq!(
            violation.to_string(),
            "/buyer/email: expected string, got number"
        );
    }

    #[test]
    fn validate_error_counts_violations() {
        let err = ValidateError::Invalid {
            violations: vec![
                Violation {
                    path: "/a".into(),
                    message: "is required".into(),
                },
                Violation {
                    path: "/b".into(),
                    message: "is required".into(),
                },
            ],
        };
        assert_eq!(err.to_string(), "validation failed with 2 violation(s)");
        assert_eq!(err.violations().len(), 2);
    }
}
