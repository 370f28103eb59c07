//! Error types shared across the postmortem crates.

use thiserror::Error;

/// Main error type for report capture operations.
#[derive(Debug, Error)]
pub enum ReportError {
    /// A required input was empty or otherwise unusable.
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// The system was used before it was fully configured.
    #[error("{message}")]
    InvalidOperation { message: String },

    /// No resolver, writer, or formatter covers the requested combination.
    #[error("{message}")]
    Unsupported { message: String },

    /// A timeout elapsed or the caller cancelled the operation.
    #[error("Operation cancelled: {operation}")]
    Cancelled { operation: String },

    /// The token endpoint rejected the request or returned a malformed
    /// payload. Surfaces as a configuration failure and is never retried.
    #[error("Token acquisition failed: {message}")]
    Token { message: String },

    /// Transport-level request failure. Distinct from captured non-2xx
    /// responses, which are report content rather than errors.
    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Database error: {message}")]
    Database { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failures collected from concurrent orchestration; every
    /// per-reporter error is preserved.
    #[error("{} report(s) failed: {}", .0.len(), summarize_failures(.0))]
    Aggregate(Vec<ReportError>),
}

impl ReportError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument { message: message.into() }
    }

    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation { message: message.into() }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported { message: message.into() }
    }

    /// The dispatch-miss error, naming the reporter's runtime type.
    pub fn no_resolver(type_name: &str) -> Self {
        Self::Unsupported {
            message: format!("No resolver registered for reporter type {type_name}"),
        }
    }

    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled { operation: operation.into() }
    }

    pub fn token(message: impl Into<String>) -> Self {
        Self::Token { message: message.into() }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::Database { message: message.into() }
    }

    /// Collapse a batch of failures into a single error. A lone failure
    /// propagates as itself rather than a one-element aggregate.
    pub fn aggregate(mut errors: Vec<ReportError>) -> Self {
        if errors.len() == 1 {
            errors.remove(0)
        } else {
            Self::Aggregate(errors)
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

fn summarize_failures(errors: &[ReportError]) -> String {
    errors.iter().map(|error| error.to_string()).collect::<Vec<_>>().join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_resolver_names_the_runtime_type() {
        let error = ReportError::no_resolver("CustomReporter");
        assert_eq!(error.to_string(), "No resolver registered for reporter type CustomReporter");
    }

    #[test]
    fn aggregate_of_one_unwraps_to_the_inner_error() {
        let error = ReportError::aggregate(vec![ReportError::network("connection refused")]);
        assert!(matches!(error, ReportError::Network { .. }));
    }

    #[test]
    fn aggregate_display_lists_every_failure() {
        let error = ReportError::aggregate(vec![
            ReportError::network("connection refused"),
            ReportError::cancelled("send"),
        ]);
        let message = error.to_string();
        assert!(message.starts_with("2 report(s) failed:"), "got: {message}");
        assert!(message.contains("connection refused"));
        assert!(message.contains("send"));
    }

    #[test]
    fn invalid_operation_displays_the_bare_message() {
        let error = ReportError::invalid_operation("Destination location must be set before execution.");
        assert_eq!(error.to_string(), "Destination location must be set before execution.");
    }
}
