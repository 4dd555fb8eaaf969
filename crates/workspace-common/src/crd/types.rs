//! Shared status types used by the Workspace CRDs

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reason set on Scheduled/Initialized/Ready when provisioning reported a failure
pub const RECONCILE_FAILURE_REASON: &str = "ReconcileFailure";

/// Reason set on the Stopped condition while a workspace is shutting down
pub const STOPPING_REASON: &str = "Stopping";

/// Message set on the Stopped condition while a workspace is shutting down
pub const STOPPING_MESSAGE: &str = "User stopped the workspace";

/// Condition status following Kubernetes conventions
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl ConditionStatus {
    /// Parse the string form used by core Kubernetes objects (e.g. pod conditions).
    ///
    /// Anything other than "True" or "False" maps to `Unknown`.
    pub fn from_kube(status: &str) -> Self {
        match status {
            "True" => Self::True,
            "False" => Self::False,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Type of a Workspace condition
#[derive(
    Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum WorkspaceConditionType {
    /// The workspace pod has been scheduled onto a node
    Scheduled,
    /// All init containers of the workspace pod have completed
    Initialized,
    /// All containers of the workspace pod are ready
    Ready,
    /// The workspace is stopped (or stopping, when False)
    Stopped,
}

impl WorkspaceConditionType {
    /// Conditions mirrored from the workspace pod; meaningless while stopped
    pub const POD_DERIVED: [WorkspaceConditionType; 3] = [
        WorkspaceConditionType::Scheduled,
        WorkspaceConditionType::Initialized,
        WorkspaceConditionType::Ready,
    ];

    /// Map a pod condition type to the workspace condition it feeds
    pub fn from_pod_condition(pod_condition_type: &str) -> Option<Self> {
        match pod_condition_type {
            "PodScheduled" => Some(Self::Scheduled),
            "Initialized" => Some(Self::Initialized),
            "Ready" => Some(Self::Ready),
            _ => None,
        }
    }
}

impl std::fmt::Display for WorkspaceConditionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scheduled => write!(f, "Scheduled"),
            Self::Initialized => write!(f, "Initialized"),
            Self::Ready => write!(f, "Ready"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Kubernetes-style condition for Workspace status reporting
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Condition {
    /// Type of condition
    #[serde(rename = "type")]
    pub type_: WorkspaceConditionType,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    #[serde(default)]
    pub reason: String,

    /// Human-readable message
    #[serde(default)]
    pub message: String,

    /// Last time the condition transitioned
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(
        type_: WorkspaceConditionType,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::at(type_, status, reason, message, Utc::now())
    }

    /// Create a new condition with an explicit transition time
    pub fn at(
        type_: WorkspaceConditionType,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
        last_transition_time: DateTime<Utc>,
    ) -> Self {
        Self {
            type_,
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time,
        }
    }

    /// Whether `other` carries the same observable content (ignores the timestamp)
    pub fn same_content(&self, other: &Condition) -> bool {
        self.type_ == other.type_
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }
}
