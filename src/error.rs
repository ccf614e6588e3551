//! Error types for the Jaeger Operator

use std::time::Duration;

use thiserror::Error;

/// Result type alias using the operator's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Operator error types
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Object already exists on create
    #[error("{kind} '{key}' already exists")]
    AlreadyExists { kind: String, key: String },

    /// A bounded wait ran out of time
    #[error("Timed out after {timeout:?} waiting for {what}")]
    DeadlineExceeded { what: String, timeout: Duration },

    /// An externally provisioned object disappeared while we were waiting on it
    #[error("{kind} '{key}' was removed while waiting for it to become ready")]
    ExternallyRemoved { kind: String, key: String },

    /// A blocking dependency job reported failure
    #[error("Dependency job '{key}' failed")]
    JobFailed { key: String },

    /// Shutdown requested while waiting
    #[error("Operation cancelled")]
    Cancelled,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Finalizer error
    #[error("Finalizer error: {0}")]
    Finalizer(#[source] Box<kube::runtime::finalizer::Error<Error>>),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Create a deadline error for the given wait target
    pub fn deadline(what: impl Into<String>, timeout: Duration) -> Self {
        Error::DeadlineExceeded {
            what: what.into(),
            timeout,
        }
    }

    /// True when the API server answered 404
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Kube(kube::Error::Api(e)) if e.code == 404)
    }

    /// True for conflicts on create, whether mapped by a store or raw from the API
    pub fn is_already_exists(&self) -> bool {
        match self {
            Error::AlreadyExists { .. } => true,
            Error::Kube(kube::Error::Api(e)) => e.code == 409 && e.reason == "AlreadyExists",
            _ => false,
        }
    }

    /// Short label used for metrics
    pub fn metric_label(&self) -> &'static str {
        match self {
            Error::Kube(_) => "kube",
            Error::AlreadyExists { .. } => "already_exists",
            Error::DeadlineExceeded { .. } => "deadline_exceeded",
            Error::ExternallyRemoved { .. } => "externally_removed",
            Error::JobFailed { .. } => "job_failed",
            Error::Cancelled => "cancelled",
            Error::Config(_) => "config",
            Error::Validation(_) => "validation",
            Error::Serialization(_) => "serialization",
            Error::Finalizer(_) => "finalizer",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: u16, reason: &str) -> Error {
        Error::Kube(kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: "boom".to_string(),
            reason: reason.to_string(),
            code,
        }))
    }

    #[test]
    fn not_found_detection() {
        assert!(api_error(404, "NotFound").is_not_found());
        assert!(!api_error(500, "InternalError").is_not_found());
        assert!(!Error::Cancelled.is_not_found());
    }

    #[test]
    fn already_exists_detection() {
        assert!(api_error(409, "AlreadyExists").is_already_exists());
        assert!(!api_error(409, "Conflict").is_already_exists());
        assert!(Error::AlreadyExists {
            kind: "Job".to_string(),
            key: "ns.job".to_string()
        }
        .is_already_exists());
    }

    #[test]
    fn deadline_message_names_target() {
        let err = Error::deadline("Deployment ns.demo-query", Duration::from_secs(300));
        assert!(err.to_string().contains("Deployment ns.demo-query"));
        assert_eq!(err.metric_label(), "deadline_exceeded");
    }
}
