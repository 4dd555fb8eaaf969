//! Owner resolution for child objects
//!
//! Maps a Pod, Deployment or WorkspaceExposure back to the Workspace that
//! controls it by walking controller owner links. Pods usually sit two hops
//! away (Pod -> ReplicaSet -> Deployment -> Workspace). ReplicaSets are never
//! fetched; the Deployment is found through the `deployment` label the
//! provisioning layer stamps on them.

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::{debug, error};

use workspace_common::crd::WorkspaceExposure;
use workspace_common::kube_utils::{controller_owner, label};
use workspace_common::{DEPLOYMENT_LABEL, WORKSPACE_NAME_LABEL};

use crate::client::WorkspaceClient;

/// Maximum number of controller links followed before giving up
pub const MAX_OWNER_DEPTH: usize = 4;

/// A watched object that may belong to a Workspace
#[derive(Clone, Debug)]
pub enum ChildObject {
    /// A pod, possibly the workspace pod
    Pod(Pod),
    /// A deployment created by provisioning
    Deployment(Deployment),
    /// The routing exposure of a workspace
    Exposure(WorkspaceExposure),
}

impl ChildObject {
    /// Object metadata
    pub fn meta(&self) -> &ObjectMeta {
        match self {
            Self::Pod(pod) => &pod.metadata,
            Self::Deployment(deployment) => &deployment.metadata,
            Self::Exposure(exposure) => &exposure.metadata,
        }
    }

    /// Kind name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Pod(_) => "Pod",
            Self::Deployment(_) => "Deployment",
            Self::Exposure(_) => "WorkspaceExposure",
        }
    }
}

/// Namespaced name of a Workspace
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct WorkspaceRef {
    pub namespace: String,
    pub name: String,
}

/// Resolve the Workspace controlling `object`.
///
/// Returns `None` when the chain ends at something that is not a Workspace,
/// when any hop no longer exists, or when the depth bound is hit. Pods that
/// cannot be resolved through owner links fall back to their
/// `che.workspace_name` label.
pub async fn resolve_owner(
    client: &dyn WorkspaceClient,
    object: &ChildObject,
) -> Option<WorkspaceRef> {
    let resolved = follow_controller_chain(client, object.meta()).await;
    match (resolved, object) {
        (Some(owner), _) => Some(owner),
        (None, ChildObject::Pod(pod)) => workspace_name_fallback(&pod.metadata),
        (None, _) => None,
    }
}

async fn follow_controller_chain(
    client: &dyn WorkspaceClient,
    meta: &ObjectMeta,
) -> Option<WorkspaceRef> {
    let namespace = meta.namespace.clone()?;
    let mut current = meta.clone();

    for _ in 0..MAX_OWNER_DEPTH {
        let owner = controller_owner(&current)?;
        let deployment_name = match owner.kind.as_str() {
            "Workspace" => return fetch_workspace(client, &namespace, &owner.name).await,
            "Deployment" => owner.name.clone(),
            "ReplicaSet" => label(&current, DEPLOYMENT_LABEL)?.to_string(),
            _ => return None,
        };

        current = match client.get_deployment(&namespace, &deployment_name).await {
            Ok(Some(deployment)) => deployment.metadata,
            Ok(None) => {
                debug!(
                    namespace = %namespace,
                    deployment = %deployment_name,
                    "owner deployment is gone"
                );
                return None;
            }
            Err(e) => {
                error!(
                    namespace = %namespace,
                    deployment = %deployment_name,
                    error = %e,
                    "failed to fetch owner deployment"
                );
                return None;
            }
        };
    }

    debug!(namespace = %namespace, "owner chain exceeds depth bound");
    None
}

async fn fetch_workspace(
    client: &dyn WorkspaceClient,
    namespace: &str,
    name: &str,
) -> Option<WorkspaceRef> {
    match client.get_workspace(namespace, name).await {
        Ok(Some(_)) => Some(WorkspaceRef {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }),
        Ok(None) => {
            debug!(namespace, workspace = name, "owner workspace is gone");
            None
        }
        Err(e) => {
            error!(namespace, workspace = name, error = %e, "failed to fetch owner workspace");
            None
        }
    }
}

fn workspace_name_fallback(meta: &ObjectMeta) -> Option<WorkspaceRef> {
    Some(WorkspaceRef {
        namespace: meta.namespace.clone()?,
        name: label(meta, WORKSPACE_NAME_LABEL)?.to_string(),
    })
}
