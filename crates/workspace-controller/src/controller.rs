//! Workspace controller implementation
//!
//! Every reconcile, whether raised by a Workspace change or routed from a
//! child object, runs the same pass:
//! provision -> list children -> fold -> write -> publish events.

use std::sync::Arc;

use chrono::{SubsecRound, Utc};
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Client, Resource, ResourceExt};
use tracing::{error, instrument, warn};

use workspace_common::crd::{Workspace, WorkspacePhase};
use workspace_common::events::{actions, reasons, EventPublisher, KubeEventPublisher};
use workspace_common::ControllerConfig;

use crate::client::{WorkspaceClient, WorkspaceClientImpl};
use crate::error::ReconcileError;
use crate::fold::{fold_status, ChildSnapshot};
use crate::provision::{Provisioner, RestApisProvisioner};
use crate::writer::{write_status, WriteOutcome};

/// Name reported on published Kubernetes Events
pub const CONTROLLER_NAME: &str = "workspace-controller";

/// Shared context for the Workspace controller
pub struct Context {
    /// Kubernetes client for API operations (trait object for testability)
    pub kube: Arc<dyn WorkspaceClient>,
    /// Provisioning layer consulted at the start of each pass
    pub provisioner: Arc<dyn Provisioner>,
    /// Kubernetes Event publisher
    pub events: Arc<dyn EventPublisher>,
    pub config: ControllerConfig,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client) -> ContextBuilder {
        ContextBuilder::new(client)
    }

    /// Create a context for testing with custom mocks
    #[cfg(test)]
    pub fn for_testing(
        kube: Arc<dyn WorkspaceClient>,
        provisioner: Arc<dyn Provisioner>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            kube,
            provisioner,
            events,
            config: ControllerConfig::default(),
        }
    }
}

/// Builder for [`Context`]
pub struct ContextBuilder {
    client: Client,
    kube: Option<Arc<dyn WorkspaceClient>>,
    provisioner: Option<Arc<dyn Provisioner>>,
    config: ControllerConfig,
}

impl ContextBuilder {
    fn new(client: Client) -> Self {
        Self {
            client,
            kube: None,
            provisioner: None,
            config: ControllerConfig::default(),
        }
    }

    /// Override the Kubernetes client
    pub fn kube_client(mut self, kube: Arc<dyn WorkspaceClient>) -> Self {
        self.kube = Some(kube);
        self
    }

    /// Override the provisioning layer
    pub fn provisioner(mut self, provisioner: Arc<dyn Provisioner>) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    /// Set the controller tunables
    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        let kube: Arc<dyn WorkspaceClient> = self
            .kube
            .unwrap_or_else(|| Arc::new(WorkspaceClientImpl::new(self.client.clone())));
        let provisioner = self
            .provisioner
            .unwrap_or_else(|| Arc::new(RestApisProvisioner::new(kube.clone())));
        Context {
            kube,
            provisioner,
            events: Arc::new(KubeEventPublisher::new(self.client, CONTROLLER_NAME)),
            config: self.config,
        }
    }
}

/// Reconcile a Workspace
#[instrument(skip(workspace, ctx), fields(workspace = %workspace.name_any()))]
pub async fn reconcile(
    workspace: Arc<Workspace>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let name = workspace.name_any();
    let namespace = workspace
        .metadata
        .namespace
        .as_deref()
        .ok_or(ReconcileError::MissingNamespace)?;

    if workspace.metadata.deletion_timestamp.is_some() {
        // Children are garbage collected through owner references
        return Ok(Action::await_change());
    }

    let report = ctx.provisioner.provision(&workspace).await?;
    if let Some(failure) = &report.failure {
        warn!(workspace = %name, failure = %failure, "provisioning failed");
    }

    let snapshot =
        ChildSnapshot::load(ctx.kube.as_ref(), namespace, &workspace.workspace_id()).await?;
    let now = Utc::now().trunc_subsecs(0);
    let outcome = fold_status(&workspace, &snapshot, Some(&report), now);
    for diagnostic in &outcome.diagnostics {
        warn!(workspace = %name, "{diagnostic}");
    }

    let written = write_status(
        ctx.kube.as_ref(),
        &workspace,
        &outcome.status,
        &ctx.config.field_manager,
    )
    .await?;

    if written == WriteOutcome::Written && workspace.phase() != outcome.status.phase {
        publish_phase_event(&workspace, outcome.status.phase, report.failure, &ctx).await;
    }

    if outcome.draining {
        Ok(Action::requeue(ctx.config.drain_requeue()))
    } else {
        Ok(Action::await_change())
    }
}

async fn publish_phase_event(
    workspace: &Workspace,
    phase: Option<WorkspacePhase>,
    failure: Option<String>,
    ctx: &Context,
) {
    let (type_, reason, note) = match phase {
        Some(WorkspacePhase::Running) => (EventType::Normal, reasons::WORKSPACE_RUNNING, None),
        Some(WorkspacePhase::Stopped) => (EventType::Normal, reasons::WORKSPACE_STOPPED, None),
        Some(WorkspacePhase::Failed) => (EventType::Warning, reasons::WORKSPACE_FAILED, failure),
        _ => return,
    };
    ctx.events
        .publish(&workspace.object_ref(&()), type_, reason, actions::RECONCILE, note)
        .await;
}

/// Error policy for the controller
pub fn error_policy(
    workspace: Arc<Workspace>,
    error: &ReconcileError,
    ctx: Arc<Context>,
) -> Action {
    error!(
        ?error,
        workspace = %workspace.name_any(),
        retryable = error.is_retryable(),
        "workspace reconciliation failed"
    );
    Action::requeue(ctx.config.error_requeue())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{api_error, MockWorkspaceClient};
    use crate::provision::{MockProvisioner, ProvisioningReport};
    use async_trait::async_trait;
    use k8s_openapi::api::core::v1::{
        ContainerStatus, ObjectReference, Pod, PodCondition, PodStatus,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use workspace_common::crd::{WorkspaceSpec, WorkspaceStatus};
    use workspace_common::events::NoopEventPublisher;
    use workspace_common::{ORIGINAL_NAME_LABEL, WORKSPACE_POD_ORIGINAL_NAME};

    #[derive(Default)]
    struct RecordingPublisher {
        reasons: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EventPublisher for RecordingPublisher {
        async fn publish(
            &self,
            _resource_ref: &ObjectReference,
            _type_: EventType,
            reason: &str,
            _action: &str,
            _note: Option<String>,
        ) {
            self.reasons.lock().unwrap().push(reason.to_string());
        }
    }

    fn workspace(started: bool, status: Option<WorkspaceStatus>) -> Arc<Workspace> {
        let mut ws = Workspace::new(
            "my-ws",
            WorkspaceSpec {
                started,
                ..Default::default()
            },
        );
        ws.metadata.namespace = Some("user-ns".to_string());
        ws.metadata.uid = Some("ab-12".to_string());
        ws.status = status;
        Arc::new(ws)
    }

    fn ready_pod() -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some("ws-pod".to_string()),
                labels: Some(BTreeMap::from([(
                    ORIGINAL_NAME_LABEL.to_string(),
                    WORKSPACE_POD_ORIGINAL_NAME.to_string(),
                )])),
                ..Default::default()
            },
            status: Some(PodStatus {
                container_statuses: Some(vec![ContainerStatus {
                    name: "theia".to_string(),
                    ready: true,
                    ..Default::default()
                }]),
                conditions: Some(vec![PodCondition {
                    type_: "Ready".to_string(),
                    status: "True".to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn provisioner(report: ProvisioningReport) -> Arc<MockProvisioner> {
        let mut provisioner = MockProvisioner::new();
        provisioner
            .expect_provision()
            .returning(move |_| Ok(report.clone()));
        Arc::new(provisioner)
    }

    fn client_with(pods: Vec<Pod>, writes: usize) -> MockWorkspaceClient {
        let mut client = MockWorkspaceClient::new();
        client
            .expect_list_pods()
            .returning(move |_, _| Ok(pods.clone()));
        client.expect_list_exposures().returning(|_, _| Ok(Vec::new()));
        client
            .expect_patch_workspace_status()
            .times(writes)
            .returning(|_, _, _, _, _| Ok(()));
        client
    }

    #[tokio::test]
    async fn story_ready_pod_moves_workspace_to_running_and_publishes_event() {
        let publisher = Arc::new(RecordingPublisher::default());
        let ctx = Arc::new(Context::for_testing(
            Arc::new(client_with(vec![ready_pod()], 1)),
            provisioner(ProvisioningReport::default()),
            publisher.clone(),
        ));

        let action = reconcile(workspace(true, None), ctx).await.unwrap();
        assert_eq!(action, Action::await_change());
        assert_eq!(
            *publisher.reasons.lock().unwrap(),
            vec![reasons::WORKSPACE_RUNNING.to_string()]
        );
    }

    #[tokio::test]
    async fn test_stopped_workspace_with_pods_requeues() {
        let ctx = Arc::new(Context::for_testing(
            Arc::new(client_with(vec![ready_pod()], 1)),
            provisioner(ProvisioningReport {
                cleaned: true,
                ..Default::default()
            }),
            Arc::new(NoopEventPublisher),
        ));

        let action = reconcile(workspace(false, None), ctx).await.unwrap();
        assert_eq!(action, Action::requeue(Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_second_pass_writes_nothing() {
        let ws = workspace(true, None);
        let snapshot = ChildSnapshot {
            pods: vec![ready_pod()],
            exposures: Vec::new(),
        };
        let first = fold_status(&ws, &snapshot, Some(&ProvisioningReport::default()), Utc::now());

        // Persisted status equals the previous fold; reconciling again must not write
        let ctx = Arc::new(Context::for_testing(
            Arc::new(client_with(vec![ready_pod()], 0)),
            provisioner(ProvisioningReport::default()),
            Arc::new(NoopEventPublisher),
        ));
        reconcile(workspace(true, Some(first.status)), ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_namespace_is_an_error() {
        let mut ws = Workspace::new("my-ws", WorkspaceSpec::default());
        ws.metadata.namespace = None;
        let ctx = Arc::new(Context::for_testing(
            Arc::new(MockWorkspaceClient::new()),
            Arc::new(MockProvisioner::new()),
            Arc::new(NoopEventPublisher),
        ));

        let result = reconcile(Arc::new(ws), ctx).await;
        assert!(matches!(result, Err(ReconcileError::MissingNamespace)));
    }

    #[tokio::test]
    async fn test_provisioning_errors_abort_before_writing() {
        let mut provisioner = MockProvisioner::new();
        provisioner
            .expect_provision()
            .returning(|_| Err(api_error(503)));
        let mut client = MockWorkspaceClient::new();
        client.expect_patch_workspace_status().never();

        let ctx = Arc::new(Context::for_testing(
            Arc::new(client),
            Arc::new(provisioner),
            Arc::new(NoopEventPublisher),
        ));
        let result = reconcile(workspace(true, None), ctx.clone()).await;
        let err = result.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(
            error_policy(workspace(true, None), &err, ctx),
            Action::requeue(Duration::from_secs(30))
        );
    }
}
