//! Status writer
//!
//! Writes a folded status only when it differs from the persisted one. The
//! patch is guarded by the resource version the fold was computed from, so a
//! concurrent writer makes this one fail with 409 instead of being clobbered.

use kube::ResourceExt;
use tracing::{debug, info, warn};

use workspace_common::crd::{phase_name, Workspace, WorkspaceStatus};
use workspace_common::Error;

use crate::client::WorkspaceClient;

/// What [`write_status`] did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Persisted status already matches
    Unchanged,
    /// Status was written
    Written,
    /// Someone else wrote first; the next reconcile converges
    Conflict,
    /// The Workspace is gone
    NotFound,
}

/// Build the merge patch body for `status`.
///
/// Merge patches only add or replace keys, so `additionalInfo` entries that
/// exist in `previous` but not in `status` are sent as explicit nulls.
pub fn status_patch(
    previous: Option<&WorkspaceStatus>,
    status: &WorkspaceStatus,
) -> Result<serde_json::Value, Error> {
    let mut patch = serde_json::to_value(status)?;
    if let Some(previous) = previous {
        if let Some(info) = patch
            .get_mut("additionalInfo")
            .and_then(serde_json::Value::as_object_mut)
        {
            for key in previous.additional_info.keys() {
                if !status.additional_info.contains_key(key) {
                    info.insert(key.clone(), serde_json::Value::Null);
                }
            }
        }
        if status.phase.is_none() && previous.phase.is_some() {
            patch["phase"] = serde_json::Value::Null;
        }
    }
    Ok(patch)
}

/// Write `status` to `workspace` unless it is already persisted.
pub async fn write_status(
    client: &dyn WorkspaceClient,
    workspace: &Workspace,
    status: &WorkspaceStatus,
    field_manager: &str,
) -> Result<WriteOutcome, Error> {
    let name = workspace.name_any();
    let previous = workspace.status.as_ref();
    if previous == Some(status) {
        debug!(workspace = %name, "status unchanged, skipping write");
        return Ok(WriteOutcome::Unchanged);
    }

    let namespace = workspace
        .namespace()
        .ok_or_else(|| Error::validation_for(&name, "Workspace has no namespace"))?;
    let patch = status_patch(previous, status)?;

    match client
        .patch_workspace_status(
            &namespace,
            &name,
            workspace.resource_version(),
            patch,
            field_manager,
        )
        .await
    {
        Ok(()) => {}
        Err(e) if e.is_conflict() => {
            warn!(workspace = %name, "status write conflicted, will retry on next event");
            return Ok(WriteOutcome::Conflict);
        }
        Err(e) if e.is_not_found() => {
            debug!(workspace = %name, "workspace deleted before status write");
            return Ok(WriteOutcome::NotFound);
        }
        Err(e) => return Err(e),
    }

    let old_phase = previous.and_then(|s| s.phase);
    if old_phase != status.phase {
        info!(
            workspace = %name,
            "Phase: {} => {}",
            phase_name(old_phase),
            phase_name(status.phase)
        );
    }
    Ok(WriteOutcome::Written)
}
