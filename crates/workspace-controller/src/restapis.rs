//! Rest-APIs ConfigMap
//!
//! Started workspaces get a ConfigMap `<workspaceId>-che-rest-apis` that the
//! in-workspace REST service mounts. It carries the runtime as JSON (servers
//! reported `RUNNING` with their raw endpoint attributes) and the devfile as
//! YAML.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Resource, ResourceExt};
use tracing::{debug, info};

use workspace_common::crd::{Workspace, WorkspaceExposure};
use workspace_common::runtime::{ComponentInstanceStatus, RuntimeDescriptor, Server, ServerStatus};
use workspace_common::{Error, WORKSPACE_ID_LABEL};

use crate::client::WorkspaceClient;

/// File holding the runtime JSON
pub const RUNTIME_JSON_FILE: &str = "runtime.json";

/// File holding the devfile YAML
pub const DEVFILE_YAML_FILE: &str = "devfile.yaml";

const CONFIG_MAP_KIND: &str = "ConfigMap";

/// Name of the rest-apis ConfigMap of a workspace
pub fn config_map_name(workspace_id: &str) -> String {
    format!("{workspace_id}-che-rest-apis")
}

/// Runtime JSON published to the in-workspace REST service
pub fn runtime_json(
    statuses: &[ComponentInstanceStatus],
    exposures: &[WorkspaceExposure],
) -> Result<String, Error> {
    let runtime = RuntimeDescriptor::assemble(statuses, |machine| {
        exposures
            .iter()
            .flat_map(|e| e.endpoints_for(machine))
            .map(|endpoint| {
                (
                    endpoint.name.clone(),
                    Server {
                        url: endpoint.url.clone(),
                        status: ServerStatus::Running,
                        attributes: endpoint.attributes.clone(),
                    },
                )
            })
            .collect()
    });
    serde_json::to_string(&runtime)
        .map_err(|e| Error::serialization_for_kind(CONFIG_MAP_KIND, e.to_string()))
}

/// The ConfigMap as it should exist for `workspace`
pub fn desired_config_map(
    workspace: &Workspace,
    workspace_id: &str,
    statuses: &[ComponentInstanceStatus],
    exposures: &[WorkspaceExposure],
) -> Result<ConfigMap, Error> {
    let devfile = workspace.spec.devfile.clone().unwrap_or_default();
    let devfile_yaml = serde_yaml::to_string(&devfile)
        .map_err(|e| Error::serialization_for_kind(CONFIG_MAP_KIND, e.to_string()))?;

    Ok(ConfigMap {
        metadata: ObjectMeta {
            name: Some(config_map_name(workspace_id)),
            namespace: workspace.namespace(),
            labels: Some(BTreeMap::from([(
                WORKSPACE_ID_LABEL.to_string(),
                workspace_id.to_string(),
            )])),
            owner_references: workspace.controller_owner_ref(&()).map(|r| vec![r]),
            ..Default::default()
        },
        data: Some(BTreeMap::from([
            (RUNTIME_JSON_FILE.to_string(), runtime_json(statuses, exposures)?),
            (DEVFILE_YAML_FILE.to_string(), devfile_yaml),
        ])),
        ..Default::default()
    })
}

/// What [`sync_config_map`] did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Create the ConfigMap or bring its data up to date.
///
/// Only `data` is compared. A conflicting update counts as updated; the next
/// reconcile retries against fresh state.
pub async fn sync_config_map(
    client: &dyn WorkspaceClient,
    namespace: &str,
    desired: ConfigMap,
) -> Result<SyncOutcome, Error> {
    let name = desired.name_any();
    let Some(mut existing) = client.get_config_map(namespace, &name).await? else {
        info!(config_map = %name, "creating rest-apis configmap");
        client.create_config_map(namespace, desired).await?;
        return Ok(SyncOutcome::Created);
    };

    if existing.data == desired.data {
        return Ok(SyncOutcome::Unchanged);
    }

    info!(config_map = %name, "updating rest-apis configmap");
    existing.data = desired.data;
    match client.replace_config_map(namespace, existing).await {
        Ok(()) => Ok(SyncOutcome::Updated),
        Err(e) if e.is_conflict() => {
            debug!(config_map = %name, "conflict updating rest-apis configmap");
            Ok(SyncOutcome::Updated)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{api_error, MockWorkspaceClient};
    use workspace_common::crd::{
        ExposedEndpoint, ExposurePhase, WorkspaceExposureStatus, WorkspaceSpec,
    };
    use workspace_common::runtime::MachineDescription;

    fn workspace() -> Workspace {
        let mut ws = Workspace::new(
            "my-ws",
            WorkspaceSpec {
                started: true,
                devfile: Some(BTreeMap::from([(
                    "apiVersion".to_string(),
                    serde_json::json!("1.0.0"),
                )])),
                ..Default::default()
            },
        );
        ws.metadata.namespace = Some("user-ns".to_string());
        ws.metadata.uid = Some("uid-1".to_string());
        ws
    }

    fn statuses() -> Vec<ComponentInstanceStatus> {
        vec![ComponentInstanceStatus {
            container_descriptions: BTreeMap::from([(
                "theia".to_string(),
                MachineDescription::default(),
            )]),
            ..Default::default()
        }]
    }

    fn exposure() -> WorkspaceExposure {
        let mut exposure = WorkspaceExposure::new("exp", Default::default());
        exposure.status = Some(WorkspaceExposureStatus {
            phase: Some(ExposurePhase::Pending),
            exposed_endpoints: BTreeMap::from([(
                "theia".to_string(),
                vec![ExposedEndpoint {
                    name: "theia".to_string(),
                    url: "https://theia.example.com".to_string(),
                    attributes: BTreeMap::from([("public".to_string(), "true".to_string())]),
                }],
            )]),
        });
        exposure
    }

    #[test]
    fn test_runtime_json_reports_running_servers_with_raw_attributes() {
        let json = runtime_json(&statuses(), &[exposure()]).unwrap();
        let runtime: RuntimeDescriptor = serde_json::from_str(&json).unwrap();
        let server = &runtime.machines["theia"].servers["theia"];
        assert_eq!(server.status, ServerStatus::Running);
        assert_eq!(server.attributes["public"], "true");
    }

    #[test]
    fn test_desired_config_map_shape() {
        let cm = desired_config_map(&workspace(), "workspaceuid1", &statuses(), &[]).unwrap();
        assert_eq!(cm.metadata.name.as_deref(), Some("workspaceuid1-che-rest-apis"));
        assert_eq!(cm.metadata.namespace.as_deref(), Some("user-ns"));
        assert_eq!(
            cm.metadata.labels.as_ref().unwrap()[WORKSPACE_ID_LABEL],
            "workspaceuid1"
        );
        let owner = &cm.metadata.owner_references.as_ref().unwrap()[0];
        assert_eq!(owner.kind, "Workspace");
        assert_eq!(owner.controller, Some(true));

        let data = cm.data.unwrap();
        assert!(data[DEVFILE_YAML_FILE].contains("apiVersion: 1.0.0"));
        assert!(data[RUNTIME_JSON_FILE].contains("\"activeEnv\":\"default\""));
    }

    #[tokio::test]
    async fn test_sync_creates_missing_config_map() {
        let mut client = MockWorkspaceClient::new();
        client.expect_get_config_map().returning(|_, _| Ok(None));
        client
            .expect_create_config_map()
            .times(1)
            .returning(|_, _| Ok(()));

        let desired = desired_config_map(&workspace(), "ws1", &[], &[]).unwrap();
        let outcome = sync_config_map(&client, "user-ns", desired).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Created);
    }

    #[tokio::test]
    async fn test_sync_leaves_matching_config_map_alone() {
        let desired = desired_config_map(&workspace(), "ws1", &[], &[]).unwrap();
        let existing = desired.clone();

        let mut client = MockWorkspaceClient::new();
        client
            .expect_get_config_map()
            .returning(move |_, _| Ok(Some(existing.clone())));
        client.expect_replace_config_map().never();

        let outcome = sync_config_map(&client, "user-ns", desired).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_sync_replaces_data_and_tolerates_conflict() {
        let desired = desired_config_map(&workspace(), "ws1", &statuses(), &[]).unwrap();
        let mut stale = desired.clone();
        stale.data = Some(BTreeMap::new());
        stale.metadata.resource_version = Some("42".to_string());

        let mut client = MockWorkspaceClient::new();
        client
            .expect_get_config_map()
            .returning(move |_, _| Ok(Some(stale.clone())));
        client
            .expect_replace_config_map()
            .withf(|_, cm| cm.metadata.resource_version.as_deref() == Some("42"))
            .returning(|_, _| Err(api_error(409)));

        let outcome = sync_config_map(&client, "user-ns", desired).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Updated);
    }
}
