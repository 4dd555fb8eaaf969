//! Controller configuration
//!
//! Every setting has a default and an environment override so the operator
//! can run unconfigured in a Deployment and be tuned via env vars.

use std::time::Duration;

use clap::Args;

/// Tunables for the workspace controller
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Watch timeout in seconds; must stay below the client read timeout (30s)
    #[arg(long, env = "WORKSPACE_WATCH_TIMEOUT_SECS", default_value_t = 25)]
    pub watch_timeout_secs: u32,

    /// Requeue interval in seconds while a stopped workspace still has pods
    #[arg(long, env = "WORKSPACE_DRAIN_REQUEUE_SECS", default_value_t = 1)]
    pub drain_requeue_secs: u64,

    /// Requeue interval in seconds after a failed reconcile
    #[arg(long, env = "WORKSPACE_ERROR_REQUEUE_SECS", default_value_t = 30)]
    pub error_requeue_secs: u64,

    /// Maximum number of workspaces reconciled in parallel (0 = unbounded)
    #[arg(long, env = "WORKSPACE_CONCURRENCY", default_value_t = 16)]
    pub concurrency: u16,

    /// Field manager name used for status writes
    #[arg(long, env = "WORKSPACE_FIELD_MANAGER", default_value = crate::FIELD_MANAGER)]
    pub field_manager: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            watch_timeout_secs: 25,
            drain_requeue_secs: 1,
            error_requeue_secs: 30,
            concurrency: 16,
            field_manager: crate::FIELD_MANAGER.to_string(),
        }
    }
}

impl ControllerConfig {
    /// Requeue interval while pods of a stopped workspace are draining
    pub fn drain_requeue(&self) -> Duration {
        Duration::from_secs(self.drain_requeue_secs)
    }

    /// Requeue interval after a failed reconcile
    pub fn error_requeue(&self) -> Duration {
        Duration::from_secs(self.error_requeue_secs)
    }
}
