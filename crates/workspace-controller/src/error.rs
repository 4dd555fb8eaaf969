//! Reconcile error types

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("{0}")]
    Common(#[from] workspace_common::Error),

    #[error("missing namespace on Workspace")]
    MissingNamespace,
}

impl ReconcileError {
    /// Whether retrying the same reconcile can succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::MissingNamespace => false,
            Self::Common(e) => e.is_retryable(),
        }
    }
}
