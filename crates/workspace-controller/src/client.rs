//! Kubernetes access used by the workspace controller
//!
//! Every API call the controller makes goes through [`WorkspaceClient`] so the
//! owner resolver, status writer and provisioner can be tested against mocks.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Pod};
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::Client;

#[cfg(test)]
use mockall::automock;

use workspace_common::crd::{Workspace, WorkspaceExposure};
use workspace_common::kube_utils::{is_not_found, label_selector, patch_resource_status};
use workspace_common::{Error, WORKSPACE_ID_LABEL};

/// Trait abstracting Kubernetes client operations for Workspace reconciliation
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WorkspaceClient: Send + Sync {
    /// Get a Workspace by name, `None` if it does not exist
    async fn get_workspace(&self, namespace: &str, name: &str) -> Result<Option<Workspace>, Error>;

    /// Get a Deployment by name, `None` if it does not exist
    async fn get_deployment(&self, namespace: &str, name: &str)
        -> Result<Option<Deployment>, Error>;

    /// List pods labelled with the given workspace id
    async fn list_pods(&self, namespace: &str, workspace_id: &str) -> Result<Vec<Pod>, Error>;

    /// List exposures labelled with the given workspace id
    async fn list_exposures(
        &self,
        namespace: &str,
        workspace_id: &str,
    ) -> Result<Vec<WorkspaceExposure>, Error>;

    /// List deployments labelled with the given workspace id
    async fn list_deployments(
        &self,
        namespace: &str,
        workspace_id: &str,
    ) -> Result<Vec<Deployment>, Error>;

    /// Merge-patch the Workspace status, guarded by `resource_version` when given
    async fn patch_workspace_status(
        &self,
        namespace: &str,
        name: &str,
        resource_version: Option<String>,
        status: serde_json::Value,
        field_manager: &str,
    ) -> Result<(), Error>;

    /// Delete a Deployment; returns `false` if it was already gone
    async fn delete_deployment(&self, namespace: &str, name: &str) -> Result<bool, Error>;

    /// Get a ConfigMap by name, `None` if it does not exist
    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>, Error>;

    /// Create a ConfigMap
    async fn create_config_map(&self, namespace: &str, config_map: ConfigMap) -> Result<(), Error>;

    /// Replace a ConfigMap; `config_map` must carry the resource version it was read at
    async fn replace_config_map(&self, namespace: &str, config_map: ConfigMap)
        -> Result<(), Error>;

    /// Delete a ConfigMap; returns `false` if it was already gone
    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<bool, Error>;
}

/// An API server error response with the given status code
#[cfg(test)]
pub(crate) fn api_error(code: u16) -> Error {
    Error::from(kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: "request failed".to_string(),
        reason: "Reason".to_string(),
        code,
    }))
}

/// Real Kubernetes client implementation
pub struct WorkspaceClientImpl {
    client: Client,
}

impl WorkspaceClientImpl {
    /// Create a new WorkspaceClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn workspace_id_selector(workspace_id: &str) -> ListParams {
        let labels = BTreeMap::from([(WORKSPACE_ID_LABEL.to_string(), workspace_id.to_string())]);
        ListParams::default().labels(&label_selector(&labels))
    }
}

#[async_trait]
impl WorkspaceClient for WorkspaceClientImpl {
    async fn get_workspace(&self, namespace: &str, name: &str) -> Result<Option<Workspace>, Error> {
        let api: Api<Workspace> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Deployment>, Error> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn list_pods(&self, namespace: &str, workspace_id: &str) -> Result<Vec<Pod>, Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pods = api.list(&Self::workspace_id_selector(workspace_id)).await?;
        Ok(pods.items)
    }

    async fn list_exposures(
        &self,
        namespace: &str,
        workspace_id: &str,
    ) -> Result<Vec<WorkspaceExposure>, Error> {
        let api: Api<WorkspaceExposure> = Api::namespaced(self.client.clone(), namespace);
        let exposures = api.list(&Self::workspace_id_selector(workspace_id)).await?;
        Ok(exposures.items)
    }

    async fn list_deployments(
        &self,
        namespace: &str,
        workspace_id: &str,
    ) -> Result<Vec<Deployment>, Error> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let deployments = api.list(&Self::workspace_id_selector(workspace_id)).await?;
        Ok(deployments.items)
    }

    async fn patch_workspace_status(
        &self,
        namespace: &str,
        name: &str,
        resource_version: Option<String>,
        status: serde_json::Value,
        field_manager: &str,
    ) -> Result<(), Error> {
        patch_resource_status::<Workspace>(
            &self.client,
            name,
            namespace,
            resource_version.as_deref(),
            &status,
            field_manager,
        )
        .await?;
        Ok(())
    }

    async fn delete_deployment(&self, namespace: &str, name: &str) -> Result<bool, Error> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        match api.delete(name, &DeleteParams::background()).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ConfigMap>, Error> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create_config_map(&self, namespace: &str, config_map: ConfigMap) -> Result<(), Error> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        api.create(&PostParams::default(), &config_map).await?;
        Ok(())
    }

    async fn replace_config_map(
        &self,
        namespace: &str,
        config_map: ConfigMap,
    ) -> Result<(), Error> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        let name = config_map
            .metadata
            .name
            .clone()
            .ok_or_else(|| Error::validation("ConfigMap has no name"))?;
        api.replace(&name, &PostParams::default(), &config_map)
            .await?;
        Ok(())
    }

    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<bool, Error> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
