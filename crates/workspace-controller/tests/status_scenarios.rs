//! End-to-end status folding scenarios
//!
//! Drives `fold_status` through the lifecycle of a workspace, feeding each
//! pass's status back in as the persisted status of the next one.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use k8s_openapi::api::core::v1::{ContainerStatus, Pod, PodCondition, PodStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use workspace_common::crd::{
    ConditionStatus, ExposedEndpoint, ExposurePhase, Workspace, WorkspaceConditionType,
    WorkspaceExposure, WorkspaceExposureStatus, WorkspacePhase, WorkspaceSpec, WorkspaceStatus,
    STOPPING_REASON,
};
use workspace_common::runtime::{
    read_runtime, write_component_statuses, ComponentInstanceStatus, MachineDescription,
};
use workspace_common::{ORIGINAL_NAME_LABEL, RUNTIME_KEY, WORKSPACE_POD_ORIGINAL_NAME};
use workspace_controller::{fold_status, ChildSnapshot, ProvisioningReport};

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).single().unwrap()
}

fn workspace(started: bool, status: Option<WorkspaceStatus>) -> Workspace {
    let mut ws = Workspace::new(
        "my-ws",
        WorkspaceSpec {
            started,
            ..Default::default()
        },
    );
    ws.metadata.namespace = Some("user-ns".to_string());
    ws.metadata.uid = Some("0c3e-11aa".to_string());
    ws.status = status;
    ws
}

fn workspace_pod(containers: &[(&str, bool)], ready: bool) -> Pod {
    let status = if ready { "True" } else { "False" };
    Pod {
        metadata: ObjectMeta {
            name: Some("my-ws-pod".to_string()),
            labels: Some(BTreeMap::from([(
                ORIGINAL_NAME_LABEL.to_string(),
                WORKSPACE_POD_ORIGINAL_NAME.to_string(),
            )])),
            ..Default::default()
        },
        status: Some(PodStatus {
            container_statuses: Some(
                containers
                    .iter()
                    .map(|(name, ready)| ContainerStatus {
                        name: name.to_string(),
                        ready: *ready,
                        ..Default::default()
                    })
                    .collect(),
            ),
            conditions: Some(
                ["PodScheduled", "Initialized", "Ready", "ContainersReady"]
                    .iter()
                    .map(|t| PodCondition {
                        type_: t.to_string(),
                        status: status.to_string(),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn exposure(phase: ExposurePhase) -> WorkspaceExposure {
    let mut exposure = WorkspaceExposure::new("my-ws-exposure", Default::default());
    exposure.status = Some(WorkspaceExposureStatus {
        phase: Some(phase),
        exposed_endpoints: BTreeMap::from([(
            "theia".to_string(),
            vec![
                ExposedEndpoint {
                    name: "ide".to_string(),
                    url: "https://ide.example.com".to_string(),
                    attributes: BTreeMap::from([
                        ("type".to_string(), "ide".to_string()),
                        ("public".to_string(), "true".to_string()),
                    ]),
                },
                ExposedEndpoint {
                    name: "debug".to_string(),
                    url: "https://debug.example.com".to_string(),
                    attributes: BTreeMap::from([("public".to_string(), "false".to_string())]),
                },
            ],
        )]),
    });
    exposure
}

fn with_theia_component(ws: &mut Workspace) {
    let statuses = vec![ComponentInstanceStatus {
        container_descriptions: BTreeMap::from([(
            "theia".to_string(),
            MachineDescription::default(),
        )]),
        ..Default::default()
    }];
    let status = ws.status.get_or_insert_with(Default::default);
    write_component_statuses(&mut status.additional_info, Some(statuses.as_slice())).unwrap();
}

#[test]
fn scenario_a_started_without_children_is_starting() {
    let outcome = fold_status(&workspace(true, None), &ChildSnapshot::default(), None, at(0));

    assert_eq!(outcome.status.phase, Some(WorkspacePhase::Starting));
    assert!(outcome.status.members.ready.is_empty());
    assert!(outcome.status.members.unready.is_empty());
    assert!(!outcome.status.additional_info.contains_key(RUNTIME_KEY));
    assert!(!outcome.draining);
}

#[test]
fn scenario_b_ready_pod_is_running() {
    let snapshot = ChildSnapshot {
        pods: vec![workspace_pod(&[("A", true)], true)],
        exposures: Vec::new(),
    };
    let outcome = fold_status(&workspace(true, None), &snapshot, None, at(0));

    assert_eq!(outcome.status.phase, Some(WorkspacePhase::Running));
    assert_eq!(outcome.status.members.ready, vec!["A"]);
    assert!(outcome
        .status
        .conditions
        .has_status(WorkspaceConditionType::Ready, ConditionStatus::True));
}

#[test]
fn scenario_c_stop_drains_then_converges_to_stopped() {
    let running = fold_status(
        &workspace(true, None),
        &ChildSnapshot {
            pods: vec![workspace_pod(&[("A", true)], true)],
            exposures: Vec::new(),
        },
        None,
        at(0),
    );

    // Intent flips while the pod still exists
    let cleanup = ProvisioningReport {
        cleaned: true,
        ..Default::default()
    };
    let stopping = fold_status(
        &workspace(false, Some(running.status)),
        &ChildSnapshot {
            pods: vec![workspace_pod(&[("A", false)], false)],
            exposures: Vec::new(),
        },
        Some(&cleanup),
        at(10),
    );
    assert_eq!(stopping.status.phase, Some(WorkspacePhase::Stopping));
    let stopped = stopping
        .status
        .conditions
        .get(WorkspaceConditionType::Stopped)
        .unwrap();
    assert_eq!(stopped.status, ConditionStatus::False);
    assert_eq!(stopped.reason, STOPPING_REASON);
    assert!(stopping.draining);

    // Pods are gone on a later pass
    let done = fold_status(
        &workspace(false, Some(stopping.status)),
        &ChildSnapshot::default(),
        Some(&ProvisioningReport::default()),
        at(20),
    );
    assert_eq!(done.status.phase, Some(WorkspacePhase::Stopped));
    assert!(done
        .status
        .conditions
        .has_status(WorkspaceConditionType::Stopped, ConditionStatus::True));
    for type_ in WorkspaceConditionType::POD_DERIVED {
        assert!(done.status.conditions.get(type_).is_none());
    }
    assert!(!done.draining);
}

#[test]
fn scenario_d_ide_endpoint_sets_ide_url() {
    let mut ws = workspace(true, None);
    with_theia_component(&mut ws);
    let snapshot = ChildSnapshot {
        pods: Vec::new(),
        exposures: vec![exposure(ExposurePhase::Ready)],
    };
    let outcome = fold_status(&ws, &snapshot, None, at(0));

    assert_eq!(outcome.status.ide_url, "https://ide.example.com");
    let runtime = read_runtime(&outcome.status.additional_info)
        .unwrap()
        .unwrap();
    let servers = &runtime.machines["theia"].servers;
    assert_eq!(servers["ide"].attributes["internal"], "false");
    assert_eq!(servers["debug"].attributes["internal"], "true");
}

#[test]
fn fold_is_idempotent() {
    let mut ws = workspace(true, None);
    with_theia_component(&mut ws);
    let snapshot = ChildSnapshot {
        pods: vec![workspace_pod(&[("theia", true), ("go", false)], true)],
        exposures: vec![exposure(ExposurePhase::Ready)],
    };
    let report = ProvisioningReport {
        created: true,
        component_statuses: Some(vec![ComponentInstanceStatus::default()]),
        ..Default::default()
    };

    let first = fold_status(&ws, &snapshot, Some(&report), at(0));
    let again = fold_status(
        &workspace(true, Some(first.status.clone())),
        &snapshot,
        Some(&report),
        at(60),
    );
    assert_eq!(first.status, again.status);
    assert_eq!(
        serde_json::to_string(&first.status).unwrap(),
        serde_json::to_string(&again.status).unwrap()
    );
}

#[test]
fn failure_beats_stopped_intent_regardless_of_pods() {
    let failure = ProvisioningReport {
        failure: Some("cannot delete deployment".to_string()),
        cleaned: true,
        ..Default::default()
    };
    for pods in [Vec::new(), vec![workspace_pod(&[("A", true)], true)]] {
        let outcome = fold_status(
            &workspace(false, None),
            &ChildSnapshot {
                pods,
                exposures: Vec::new(),
            },
            Some(&failure),
            at(0),
        );
        assert_eq!(outcome.status.phase, Some(WorkspacePhase::Failed));
    }
}

#[test]
fn runtime_is_all_or_nothing() {
    let mut ws = workspace(true, None);
    with_theia_component(&mut ws);
    let ready = fold_status(
        &ws,
        &ChildSnapshot {
            pods: Vec::new(),
            exposures: vec![exposure(ExposurePhase::Ready)],
        },
        None,
        at(0),
    );
    assert!(ready.status.additional_info.contains_key(RUNTIME_KEY));
    assert!(!ready.status.ide_url.is_empty());

    // Routing regresses to pending
    let pending = fold_status(
        &workspace(true, Some(ready.status)),
        &ChildSnapshot {
            pods: Vec::new(),
            exposures: vec![exposure(ExposurePhase::Pending)],
        },
        None,
        at(10),
    );
    assert!(!pending.status.additional_info.contains_key(RUNTIME_KEY));
    assert!(pending.status.ide_url.is_empty());
}
