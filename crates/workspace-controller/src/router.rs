//! Event routing from child objects to Workspace reconciles
//!
//! Pods, Deployments and WorkspaceExposures are watched cluster-wide. Each
//! watcher event is classified as create/update/delete, filtered by
//! [`admit`], resolved to its owning Workspace and turned into a
//! [`ReconcileRequest`]. The controller consumes the resulting object refs via
//! `Controller::reconcile_on`, which serializes them with spec-change
//! reconciles of the same Workspace.

use std::collections::{BTreeSet, HashSet};
use std::fmt::Debug;
use std::sync::Arc;

use futures::stream::{self, BoxStream};
use futures::{future, StreamExt};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use kube::api::Api;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use workspace_common::crd::{Workspace, WorkspaceExposure};
use workspace_common::kube_utils::label;
use workspace_common::WORKSPACE_ID_LABEL;

use crate::client::WorkspaceClient;
use crate::owner::{resolve_owner, ChildObject};

/// Key prefix marking reconciles triggered by a child object change
pub const OWNED_OBJECT_PREFIX: &str = "workspace-owned/";

/// What happened to a child object
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChildEventKind {
    Create,
    Update,
    Delete,
}

/// A classified change notification for a child object
#[derive(Clone, Debug)]
pub struct ChildEvent {
    pub kind: ChildEventKind,
    pub object: ChildObject,
}

/// Admission predicate: only state-relevant transitions pass.
///
/// Creates never pass; provisioning establishes initial state. Updates pass
/// for labelled Pods and Exposures, deletes for labelled Pods and Deployments.
pub fn admit(event: &ChildEvent) -> bool {
    if label(event.object.meta(), WORKSPACE_ID_LABEL).is_none() {
        return false;
    }
    match (event.kind, &event.object) {
        (ChildEventKind::Create, _) => false,
        (ChildEventKind::Update, ChildObject::Pod(_) | ChildObject::Exposure(_)) => true,
        (ChildEventKind::Update, ChildObject::Deployment(_)) => false,
        (ChildEventKind::Delete, ChildObject::Pod(_) | ChildObject::Deployment(_)) => true,
        (ChildEventKind::Delete, ChildObject::Exposure(_)) => false,
    }
}

/// A reconcile request for a Workspace, keyed by provenance
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReconcileRequest {
    pub namespace: String,
    pub key: String,
}

impl ReconcileRequest {
    /// Request raised by a change to an object owned by `workspace`
    pub fn owned(namespace: impl Into<String>, workspace: &str) -> Self {
        Self {
            namespace: namespace.into(),
            key: format!("{OWNED_OBJECT_PREFIX}{workspace}"),
        }
    }

    /// Whether the request came from a child object rather than the Workspace itself
    pub fn is_owned_object_triggered(&self) -> bool {
        self.key.starts_with(OWNED_OBJECT_PREFIX)
    }

    /// Name of the Workspace to reconcile
    pub fn workspace_name(&self) -> &str {
        self.key
            .strip_prefix(OWNED_OBJECT_PREFIX)
            .unwrap_or(&self.key)
    }

    /// Plain object reference, identical to one raised by a Workspace change
    pub fn object_ref(&self) -> ObjectRef<Workspace> {
        ObjectRef::new(self.workspace_name()).within(&self.namespace)
    }
}

/// Map an event to reconcile requests, one per distinct owning Workspace
pub async fn route(client: &dyn WorkspaceClient, event: &ChildEvent) -> Vec<ReconcileRequest> {
    if !admit(event) {
        return Vec::new();
    }

    let requests: BTreeSet<ReconcileRequest> = resolve_owner(client, &event.object)
        .await
        .into_iter()
        .map(|owner| ReconcileRequest::owned(owner.namespace, &owner.name))
        .collect();

    if requests.is_empty() {
        debug!(
            kind = event.object.kind(),
            name = event.object.meta().name.as_deref().unwrap_or_default(),
            "child object has no owning workspace"
        );
    }
    requests.into_iter().collect()
}

/// Turns raw watcher events into create/update/delete notifications.
///
/// Watchers only report "applied"; an object is a create the first time its
/// UID is seen and an update afterwards. Objects delivered by a listing count
/// as creates. Every (re-)listing starts a fresh set, so UIDs of objects
/// deleted while the watch was desynced do not linger.
#[derive(Debug, Default)]
pub struct EventClassifier {
    seen: HashSet<String>,
}

impl EventClassifier {
    /// Classify one watcher event; bookkeeping events yield `None`
    pub fn classify<K>(
        &mut self,
        event: watcher::Event<K>,
        wrap: fn(K) -> ChildObject,
    ) -> Option<ChildEvent>
    where
        K: Resource,
    {
        let (kind, object) = match event {
            watcher::Event::Init => {
                self.seen.clear();
                return None;
            }
            watcher::Event::InitDone => return None,
            watcher::Event::InitApply(obj) => {
                self.seen.insert(identity(&obj));
                (ChildEventKind::Create, obj)
            }
            watcher::Event::Apply(obj) => {
                let kind = if self.seen.insert(identity(&obj)) {
                    ChildEventKind::Create
                } else {
                    ChildEventKind::Update
                };
                (kind, obj)
            }
            watcher::Event::Delete(obj) => {
                self.seen.remove(&identity(&obj));
                (ChildEventKind::Delete, obj)
            }
        };
        Some(ChildEvent {
            kind,
            object: wrap(object),
        })
    }
}

fn identity<K: Resource>(obj: &K) -> String {
    obj.uid().unwrap_or_else(|| {
        format!(
            "{}/{}",
            obj.namespace().unwrap_or_default(),
            obj.name_any()
        )
    })
}

fn child_events<K>(
    api: Api<K>,
    config: watcher::Config,
    wrap: fn(K) -> ChildObject,
) -> BoxStream<'static, ChildEvent>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + 'static,
{
    let mut classifier = EventClassifier::default();
    watcher(api, config)
        .default_backoff()
        .filter_map(move |event| {
            let classified = match event {
                Ok(event) => classifier.classify(event, wrap),
                Err(e) => {
                    warn!(error = %e, "child object watch failed");
                    None
                }
            };
            future::ready(classified)
        })
        .boxed()
}

/// Stream of Workspace refs to reconcile because a child object changed.
///
/// Feed this to `Controller::reconcile_on`.
pub fn owned_object_triggers(
    client: Client,
    kube: Arc<dyn WorkspaceClient>,
    config: watcher::Config,
) -> BoxStream<'static, ObjectRef<Workspace>> {
    // Only objects carrying the workspace label are interesting
    let config = config.labels(WORKSPACE_ID_LABEL);

    let events = stream::select_all([
        child_events(Api::<Pod>::all(client.clone()), config.clone(), ChildObject::Pod),
        child_events(
            Api::<Deployment>::all(client.clone()),
            config.clone(),
            ChildObject::Deployment,
        ),
        child_events(
            Api::<WorkspaceExposure>::all(client),
            config,
            ChildObject::Exposure,
        ),
    ]);

    events
        .filter(|event| future::ready(admit(event)))
        .then(move |event| {
            let kube = kube.clone();
            async move { route(kube.as_ref(), &event).await }
        })
        .flat_map(|requests| stream::iter(requests.into_iter().map(|r| r.object_ref())))
        .boxed()
}
