//! WorkspaceExposure CRD types
//!
//! An exposure publishes the network-reachable endpoints of a workspace's
//! containers once routing is established. The controller only reads it.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Endpoint attribute marking a server as publicly reachable
pub const PUBLIC_ATTRIBUTE: &str = "public";

/// Server attribute expressing visibility with the opposite polarity of [`PUBLIC_ATTRIBUTE`]
pub const INTERNAL_ATTRIBUTE: &str = "internal";

/// Endpoint attribute carrying the endpoint type
pub const TYPE_ATTRIBUTE: &str = "type";

/// Value of [`TYPE_ATTRIBUTE`] on the primary interactive entry point
pub const IDE_ENDPOINT_TYPE: &str = "ide";

/// Routing readiness of an exposure
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ExposurePhase {
    /// Routing objects are still being created
    Pending,
    /// All endpoints are reachable
    Ready,
    /// Routing could not be established
    Failed,
}

/// Desired exposure of a workspace's endpoints
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "workspace.che.eclipse.org",
    version = "v1alpha1",
    kind = "WorkspaceExposure",
    plural = "workspaceexposures",
    namespaced,
    status = "WorkspaceExposureStatus",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceExposureSpec {
    /// Whether endpoints should be exposed at all
    #[serde(default)]
    pub exposed: bool,

    /// Routing class handling this exposure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_class: Option<String>,

    /// Identifier of the owning workspace
    #[serde(default)]
    pub workspace_id: String,
}

/// One endpoint published for a machine
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ExposedEndpoint {
    /// Endpoint name, unique within its machine
    pub name: String,
    /// Externally reachable URL
    pub url: String,
    /// Free-form endpoint attributes (`public`, `type`, `protocol`, ...)
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

/// Observed state of a WorkspaceExposure
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceExposureStatus {
    /// Routing readiness; absent means not ready yet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<ExposurePhase>,

    /// Endpoints keyed by machine (container) name
    #[serde(default)]
    pub exposed_endpoints: BTreeMap<String, Vec<ExposedEndpoint>>,
}

impl WorkspaceExposure {
    /// Whether routing reports every endpoint reachable
    pub fn is_ready(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|s| s.phase)
            .is_some_and(|p| p == ExposurePhase::Ready)
    }

    /// Endpoints published for the given machine
    pub fn endpoints_for(&self, machine: &str) -> &[ExposedEndpoint] {
        self.status
            .as_ref()
            .and_then(|s| s.exposed_endpoints.get(machine))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
