//! Workspace phase state machine
//!
//! A pure function from the current phase and conditions plus the observed
//! signals of one pass to the next phase and conditions. Rules run in a fixed
//! order and later rules may overwrite the phase set by earlier ones:
//!
//! 1. A provisioning failure wins over everything: `Failed`.
//! 2. Started: objects changed or created (or no phase yet) means `Starting`;
//!    a workspace pod copies its conditions and moves to `Running` once Ready.
//! 3. Stopped: pod-derived conditions are dropped; a cleanup pass means
//!    `Stopping`; no live pods left means `Stopped`.

use chrono::{DateTime, Utc};

use workspace_common::crd::{
    Condition, ConditionStatus, WorkspaceConditionType, WorkspacePhase,
    RECONCILE_FAILURE_REASON, STOPPING_MESSAGE, STOPPING_REASON,
};
use workspace_common::ConditionSet;

/// One condition reported by a pod, already mapped to a Workspace condition type
#[derive(Clone, Debug, PartialEq)]
pub struct PodConditionSignal {
    pub type_: WorkspaceConditionType,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
}

/// Everything the state machine looks at besides the current state
#[derive(Clone, Debug, Default)]
pub struct PhaseInputs {
    /// Desired intent from the spec
    pub started: bool,
    /// Provisioning failure message, if provisioning failed this pass
    pub failure: Option<String>,
    /// Provisioning changed or created child objects this pass
    pub objects_changed: bool,
    /// Provisioning deleted child objects this pass
    pub objects_cleaned: bool,
    /// Mapped conditions of each workspace pod, in enumeration order
    pub workspace_pods: Vec<Vec<PodConditionSignal>>,
    /// Number of live pods labelled with the workspace id
    pub live_pods: usize,
}

/// Result of one state machine pass
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub phase: Option<WorkspacePhase>,
    pub conditions: ConditionSet,
}

/// Compute the next phase and conditions.
///
/// `now` stamps conditions that actually change; unchanged conditions keep
/// their stored transition time.
pub fn next_state(
    phase: Option<WorkspacePhase>,
    conditions: &ConditionSet,
    inputs: &PhaseInputs,
    now: DateTime<Utc>,
) -> Transition {
    let mut next = Transition {
        phase,
        conditions: conditions.clone(),
    };

    if let Some(message) = &inputs.failure {
        next.phase = Some(WorkspacePhase::Failed);
        for type_ in WorkspaceConditionType::POD_DERIVED {
            next.conditions.upsert(Condition::at(
                type_,
                ConditionStatus::False,
                RECONCILE_FAILURE_REASON,
                message.as_str(),
                now,
            ));
        }
        next.conditions.clear(WorkspaceConditionType::Stopped);
        return next;
    }

    if inputs.started {
        apply_started(&mut next, inputs, now);
    } else {
        apply_stopped(&mut next, inputs, now);
    }
    next
}

fn apply_started(next: &mut Transition, inputs: &PhaseInputs, now: DateTime<Utc>) {
    if inputs.objects_changed || next.phase.is_none() {
        next.phase = Some(WorkspacePhase::Starting);
        next.conditions.clear(WorkspaceConditionType::Stopped);
    }

    for pod_conditions in &inputs.workspace_pods {
        for type_ in WorkspaceConditionType::POD_DERIVED {
            match pod_conditions.iter().find(|c| c.type_ == type_) {
                Some(signal) => {
                    next.conditions.upsert(Condition::at(
                        type_,
                        signal.status,
                        signal.reason.as_str(),
                        signal.message.as_str(),
                        now,
                    ));
                }
                None => {
                    next.conditions.clear(type_);
                }
            }
        }
        next.conditions.clear(WorkspaceConditionType::Stopped);

        if next
            .conditions
            .has_status(WorkspaceConditionType::Ready, ConditionStatus::True)
        {
            next.phase = Some(WorkspacePhase::Running);
        }
    }
}

fn apply_stopped(next: &mut Transition, inputs: &PhaseInputs, now: DateTime<Utc>) {
    next.conditions.clear_all(&WorkspaceConditionType::POD_DERIVED);

    if inputs.objects_cleaned {
        next.phase = Some(WorkspacePhase::Stopping);
        next.conditions.upsert(Condition::at(
            WorkspaceConditionType::Stopped,
            ConditionStatus::False,
            STOPPING_REASON,
            STOPPING_MESSAGE,
            now,
        ));
    }

    if inputs.live_pods == 0 {
        next.phase = Some(WorkspacePhase::Stopped);
        next.conditions.upsert(Condition::at(
            WorkspaceConditionType::Stopped,
            ConditionStatus::True,
            "",
            "",
            now,
        ));
        next.conditions.clear_all(&WorkspaceConditionType::POD_DERIVED);
    }
}
