//! Provisioning boundary
//!
//! Creating the workspace's Deployments and routing is the job of the
//! provisioning layer; the status controller only consumes its
//! [`ProvisioningReport`]. [`RestApisProvisioner`] is the built-in
//! implementation: it keeps the rest-apis ConfigMap in sync while the
//! workspace is started and removes the workspace's Deployments and ConfigMap
//! once it is stopped.

use std::sync::Arc;

use async_trait::async_trait;
use kube::ResourceExt;
use tracing::{info, warn};

#[cfg(test)]
use mockall::automock;

use workspace_common::crd::Workspace;
use workspace_common::runtime::{read_component_statuses, ComponentInstanceStatus};
use workspace_common::Error;

use crate::client::WorkspaceClient;
use crate::restapis::{config_map_name, desired_config_map, sync_config_map, SyncOutcome};

/// What one provisioning pass did
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProvisioningReport {
    /// Existing child objects were updated
    pub changed: bool,
    /// Child objects were created
    pub created: bool,
    /// Child objects were deleted because the workspace is stopped
    pub cleaned: bool,
    /// Provisioning failed in a way retrying will not fix
    pub failure: Option<String>,
    /// Component statuses to record; `None` removes the recorded ones
    pub component_statuses: Option<Vec<ComponentInstanceStatus>>,
}

/// Trait abstracting the provisioning layer
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Bring child objects towards the workspace's intent and report what changed.
    ///
    /// Must be idempotent: a pass with nothing to do reports no changes.
    async fn provision(&self, workspace: &Workspace) -> Result<ProvisioningReport, Error>;
}

/// Built-in provisioner managing the rest-apis ConfigMap and stop cleanup
pub struct RestApisProvisioner {
    client: Arc<dyn WorkspaceClient>,
}

impl RestApisProvisioner {
    /// Create a provisioner using the given client
    pub fn new(client: Arc<dyn WorkspaceClient>) -> Self {
        Self { client }
    }

    async fn sync_started(
        &self,
        workspace: &Workspace,
        namespace: &str,
        workspace_id: &str,
        report: &mut ProvisioningReport,
    ) -> Result<(), Error> {
        let exposures = self.client.list_exposures(namespace, workspace_id).await?;
        let statuses = report.component_statuses.as_deref().unwrap_or_default();

        let desired = match desired_config_map(workspace, workspace_id, statuses, &exposures) {
            Ok(desired) => desired,
            Err(e) if !e.is_retryable() => {
                report.failure = Some(e.to_string());
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        match sync_config_map(self.client.as_ref(), namespace, desired).await? {
            SyncOutcome::Created => report.created = true,
            SyncOutcome::Updated => report.changed = true,
            SyncOutcome::Unchanged => {}
        }
        Ok(())
    }

    async fn clean_up_stopped(
        &self,
        namespace: &str,
        workspace_id: &str,
        report: &mut ProvisioningReport,
    ) -> Result<(), Error> {
        let deployments = self.client.list_deployments(namespace, workspace_id).await?;
        for deployment in deployments
            .iter()
            .filter(|d| d.metadata.deletion_timestamp.is_none())
        {
            let name = deployment.name_any();
            if self.client.delete_deployment(namespace, &name).await? {
                info!(deployment = %name, "deleted deployment of stopped workspace");
                report.cleaned = true;
            }
        }

        let config_map = config_map_name(workspace_id);
        if self.client.delete_config_map(namespace, &config_map).await? {
            info!(config_map = %config_map, "deleted rest-apis configmap of stopped workspace");
            report.cleaned = true;
        }
        Ok(())
    }
}

#[async_trait]
impl Provisioner for RestApisProvisioner {
    async fn provision(&self, workspace: &Workspace) -> Result<ProvisioningReport, Error> {
        let name = workspace.name_any();
        let namespace = workspace
            .namespace()
            .ok_or_else(|| Error::validation_for(&name, "Workspace has no namespace"))?;
        let workspace_id = workspace.workspace_id();

        // Component statuses come from the provisioning layer; pass them through
        let component_statuses = match workspace
            .status
            .as_ref()
            .map(|s| read_component_statuses(&s.additional_info))
        {
            Some(Ok(statuses)) => statuses,
            Some(Err(e)) => {
                warn!(workspace = %name, error = %e, "dropping undecodable component statuses");
                None
            }
            None => None,
        };
        let mut report = ProvisioningReport {
            component_statuses,
            ..Default::default()
        };

        if workspace.spec.started {
            self.sync_started(workspace, &namespace, &workspace_id, &mut report)
                .await?;
        } else {
            self.clean_up_stopped(&namespace, &workspace_id, &mut report)
                .await?;
        }
        Ok(report)
    }
}
