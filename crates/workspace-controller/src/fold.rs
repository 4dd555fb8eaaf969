//! Status folding
//!
//! [`fold_status`] turns a Workspace, a snapshot of its live child objects and
//! an optional provisioning report into the next `WorkspaceStatus`. It does no
//! I/O and never logs: problems found along the way are returned as
//! [`Diagnostic`]s for the caller to report.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Pod;

use workspace_common::crd::{
    ConditionStatus, Members, Workspace, WorkspaceConditionType, WorkspaceExposure,
    WorkspaceStatus, IDE_ENDPOINT_TYPE, INTERNAL_ATTRIBUTE, PUBLIC_ATTRIBUTE, TYPE_ATTRIBUTE,
};
use workspace_common::kube_utils::label;
use workspace_common::runtime::{
    read_component_statuses, write_component_statuses, write_runtime, RuntimeDescriptor, Server,
    ServerStatus,
};
use workspace_common::{ORIGINAL_NAME_LABEL, RUNTIME_KEY, WORKSPACE_POD_ORIGINAL_NAME};

use crate::client::WorkspaceClient;
use crate::phase::{next_state, PhaseInputs, PodConditionSignal};
use crate::provision::ProvisioningReport;

/// Live child objects of one workspace, enumerated by the workspace id label
#[derive(Clone, Debug, Default)]
pub struct ChildSnapshot {
    pub pods: Vec<Pod>,
    pub exposures: Vec<WorkspaceExposure>,
}

impl ChildSnapshot {
    /// List the pods and exposures labelled with `workspace_id`
    pub async fn load(
        client: &dyn WorkspaceClient,
        namespace: &str,
        workspace_id: &str,
    ) -> Result<Self, workspace_common::Error> {
        Ok(Self {
            pods: client.list_pods(namespace, workspace_id).await?,
            exposures: client.list_exposures(namespace, workspace_id).await?,
        })
    }

    fn workspace_pods(&self) -> impl Iterator<Item = &Pod> {
        self.pods.iter().filter(|pod| {
            label(&pod.metadata, ORIGINAL_NAME_LABEL) == Some(WORKSPACE_POD_ORIGINAL_NAME)
        })
    }
}

/// Non-fatal problem found while folding
#[derive(Clone, Debug, PartialEq)]
pub enum Diagnostic {
    /// Recorded component statuses could not be decoded
    InvalidComponentStatuses(String),
    /// Component statuses from provisioning could not be encoded
    ComponentStatusesEncoding(String),
    /// The runtime descriptor could not be encoded
    RuntimeEncoding(String),
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidComponentStatuses(e) => {
                write!(f, "recorded component statuses are invalid, ignoring them: {e}")
            }
            Self::ComponentStatusesEncoding(e) => {
                write!(f, "failed to encode component statuses: {e}")
            }
            Self::RuntimeEncoding(e) => write!(f, "failed to encode runtime descriptor: {e}"),
        }
    }
}

/// Result of one fold
#[derive(Clone, Debug, PartialEq)]
pub struct FoldOutcome {
    pub status: WorkspaceStatus,
    /// Intent is stopped but workspace pods are still terminating
    pub draining: bool,
    pub diagnostics: Vec<Diagnostic>,
}

/// Fold the next status of `workspace`.
///
/// `report` is the provisioning result of this pass, if provisioning ran.
/// `now` stamps conditions that change.
pub fn fold_status(
    workspace: &Workspace,
    snapshot: &ChildSnapshot,
    report: Option<&ProvisioningReport>,
    now: DateTime<Utc>,
) -> FoldOutcome {
    let started = workspace.spec.started;
    let mut diagnostics = Vec::new();
    let mut status = workspace.status.clone().unwrap_or_default();
    status.workspace_id = workspace.workspace_id();

    if let Some(report) = report {
        if let Err(e) = write_component_statuses(
            &mut status.additional_info,
            report.component_statuses.as_deref(),
        ) {
            diagnostics.push(Diagnostic::ComponentStatusesEncoding(e.to_string()));
        }
    }

    status.members = members(snapshot.workspace_pods());
    merge_exposures(&mut status, &snapshot.exposures, &mut diagnostics);

    let inputs = PhaseInputs {
        started,
        failure: report.and_then(|r| r.failure.clone()),
        objects_changed: report.is_some_and(|r| r.changed || r.created),
        objects_cleaned: report.is_some_and(|r| r.cleaned),
        workspace_pods: if started {
            snapshot.workspace_pods().map(pod_signals).collect()
        } else {
            Vec::new()
        },
        live_pods: snapshot.pods.len(),
    };
    let transition = next_state(status.phase, &status.conditions, &inputs, now);
    status.phase = transition.phase;
    status.conditions = transition.conditions;

    FoldOutcome {
        status,
        draining: !started && snapshot.workspace_pods().next().is_some(),
        diagnostics,
    }
}

fn members<'a>(pods: impl Iterator<Item = &'a Pod>) -> Members {
    let mut members = Members::default();
    let container_statuses = pods
        .filter_map(|pod| pod.status.as_ref())
        .filter_map(|status| status.container_statuses.as_ref())
        .flatten();
    for container in container_statuses {
        if container.ready {
            members.ready.push(container.name.clone());
        } else {
            members.unready.push(container.name.clone());
        }
    }
    members
}

fn pod_signals(pod: &Pod) -> Vec<PodConditionSignal> {
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .into_iter()
        .flatten()
        .filter_map(|c| {
            Some(PodConditionSignal {
                type_: WorkspaceConditionType::from_pod_condition(&c.type_)?,
                status: ConditionStatus::from_kube(&c.status),
                reason: c.reason.clone().unwrap_or_default(),
                message: c.message.clone().unwrap_or_default(),
            })
        })
        .collect()
}

/// Rebuild the runtime descriptor and `ideUrl` from the ready exposures.
///
/// Without a ready exposure both are cleared; nothing from a previous pass
/// survives. Every ready exposure contributes endpoints, and unready ones are
/// skipped rather than withdrawing the others. Machines are visited in name
/// order and endpoints in list order, so the last `ide` endpoint in that
/// order wins.
fn merge_exposures(
    status: &mut WorkspaceStatus,
    exposures: &[WorkspaceExposure],
    diagnostics: &mut Vec<Diagnostic>,
) {
    let ready: Vec<&WorkspaceExposure> = exposures.iter().filter(|e| e.is_ready()).collect();
    if ready.is_empty() {
        status.additional_info.remove(RUNTIME_KEY);
        status.ide_url.clear();
        return;
    }

    let statuses = match read_component_statuses(&status.additional_info) {
        Ok(statuses) => statuses.unwrap_or_default(),
        Err(e) => {
            diagnostics.push(Diagnostic::InvalidComponentStatuses(e.to_string()));
            Vec::new()
        }
    };

    let mut ide_url = None;
    let runtime = RuntimeDescriptor::assemble(&statuses, |machine| {
        let mut servers = BTreeMap::new();
        for endpoint in ready.iter().copied().flat_map(|e| e.endpoints_for(machine)) {
            if endpoint.attributes.get(TYPE_ATTRIBUTE).map(String::as_str)
                == Some(IDE_ENDPOINT_TYPE)
            {
                ide_url = Some(endpoint.url.clone());
            }
            servers.insert(
                endpoint.name.clone(),
                Server {
                    url: endpoint.url.clone(),
                    status: ServerStatus::Unknown,
                    attributes: invert_public(&endpoint.attributes),
                },
            );
        }
        servers
    });

    status.ide_url = ide_url.unwrap_or_default();
    if let Err(e) = write_runtime(&mut status.additional_info, &runtime) {
        status.additional_info.remove(RUNTIME_KEY);
        diagnostics.push(Diagnostic::RuntimeEncoding(e.to_string()));
    }
}

/// Copy endpoint attributes, expressing `public` as `internal` with the opposite value
pub fn invert_public(attributes: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    attributes
        .iter()
        .map(|(key, value)| {
            if key == PUBLIC_ATTRIBUTE {
                let internal = if value == "true" { "false" } else { "true" };
                (INTERNAL_ATTRIBUTE.to_string(), internal.to_string())
            } else {
                (key.clone(), value.clone())
            }
        })
        .collect()
}
