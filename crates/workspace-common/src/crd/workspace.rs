//! Workspace CRD types
//!
//! A `Workspace` is one user's development environment. Its spec only carries
//! the desired intent (`started`) and an opaque devfile; everything else is
//! folded by the controller into `WorkspaceStatus` from the live child objects.

use std::collections::BTreeMap;

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::conditions::ConditionSet;

// =============================================================================
// Phase
// =============================================================================

/// Lifecycle phase of a Workspace
///
/// An unset phase (`None` on the status) is the implicit pre-state before the
/// first status write.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum WorkspacePhase {
    /// Child objects are being created or updated
    Starting,
    /// The workspace pod reports Ready
    Running,
    /// Child objects are being cleaned up
    Stopping,
    /// No workspace pods remain
    Stopped,
    /// Provisioning reported a failure
    Failed,
}

impl std::fmt::Display for WorkspacePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starting => write!(f, "Starting"),
            Self::Running => write!(f, "Running"),
            Self::Stopping => write!(f, "Stopping"),
            Self::Stopped => write!(f, "Stopped"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Display helper for an optional phase, rendering the unset pre-state as `""`
pub fn phase_name(phase: Option<WorkspacePhase>) -> String {
    phase.map(|p| p.to_string()).unwrap_or_default()
}

// =============================================================================
// CRD
// =============================================================================

/// Desired state of a Workspace
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "workspace.che.eclipse.org",
    version = "v1alpha1",
    kind = "Workspace",
    plural = "workspaces",
    shortname = "wksp",
    namespaced,
    status = "WorkspaceStatus",
    printcolumn = r#"{"name":"Workspace ID","type":"string","jsonPath":".status.workspaceId"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"URL","type":"string","jsonPath":".status.ideUrl"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceSpec {
    /// Whether the workspace should be running
    #[serde(default)]
    pub started: bool,

    /// Routing class used by the exposure layer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_class: Option<String>,

    /// Devfile describing the workspace components (opaque to the controller)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub devfile: Option<BTreeMap<String, serde_json::Value>>,
}

/// Container readiness of the workspace pod
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Members {
    /// Names of ready containers
    #[serde(default)]
    pub ready: Vec<String>,
    /// Names of containers that are not ready
    #[serde(default)]
    pub unready: Vec<String>,
}

/// Observed state of a Workspace
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceStatus {
    /// Identifier carried by every child object as the `che.workspace_id` label
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub workspace_id: String,

    /// Current lifecycle phase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<WorkspacePhase>,

    /// Ordered conditions, at most one per type
    #[serde(default)]
    pub conditions: ConditionSet,

    /// Container readiness of the workspace pod
    #[serde(default)]
    pub members: Members,

    /// URL of the primary interactive endpoint, empty when unset
    #[serde(default)]
    pub ide_url: String,

    /// Opaque JSON blobs keyed by purpose
    #[serde(default)]
    pub additional_info: BTreeMap<String, String>,
}

impl Workspace {
    /// Identifier used to label and enumerate this workspace's child objects.
    ///
    /// Uses the recorded `status.workspaceId` when present, otherwise derives
    /// one from the resource UID (falling back to the name for objects that
    /// have not been persisted yet).
    pub fn workspace_id(&self) -> String {
        if let Some(id) = self
            .status
            .as_ref()
            .map(|s| s.workspace_id.as_str())
            .filter(|id| !id.is_empty())
        {
            return id.to_string();
        }
        let seed = self.uid().unwrap_or_else(|| self.name_any());
        format!("workspace{}", seed.replace('-', ""))
    }

    /// Current phase, `None` before the first status write
    pub fn phase(&self) -> Option<WorkspacePhase> {
        self.status.as_ref().and_then(|s| s.phase)
    }
}
