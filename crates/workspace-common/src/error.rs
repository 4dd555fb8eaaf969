//! Error types for the workspace controller
//!
//! Errors carry enough context (workspace name, resource kind) to be useful in
//! logs. Classification helpers let callers tell the expected eventual-
//! consistency failures (not found, conflict) apart from real faults.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for workspace controller operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind or blob being serialized (if known)
        kind: Option<String>,
    },

    /// Validation error for a Workspace resource
    #[error("validation error for {workspace}: {message}")]
    Validation {
        /// Name of the workspace with invalid configuration
        workspace: String,
        /// Description of what's invalid
        message: String,
    },
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::serialization(e.to_string())
    }
}

impl Error {
    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create a validation error without workspace context
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            workspace: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
        }
    }

    /// Create a validation error with workspace context
    pub fn validation_for(workspace: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            workspace: workspace.into(),
            message: msg.into(),
        }
    }

    /// The API server reported 404 Not Found
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Kube { source } if crate::kube_utils::is_not_found(source))
    }

    /// The API server reported 409 Conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Kube { source } if crate::kube_utils::is_conflict(source))
    }

    /// Check if this error is retryable
    ///
    /// Validation and serialization errors need a spec fix and are not
    /// retryable. Kubernetes 4xx errors other than conflicts are permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => match source {
                kube::Error::Api(ae) => ae.code == 409 || !(400..500).contains(&ae.code),
                _ => true,
            },
            Error::Serialization { .. } => false,
            Error::Validation { .. } => false,
        }
    }
}
