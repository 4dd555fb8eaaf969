//! Custom Resource Definitions for the workspace controller

mod exposure;
mod types;
mod workspace;

pub use exposure::{
    ExposedEndpoint, ExposurePhase, WorkspaceExposure, WorkspaceExposureSpec,
    WorkspaceExposureStatus, IDE_ENDPOINT_TYPE, INTERNAL_ATTRIBUTE, PUBLIC_ATTRIBUTE,
    TYPE_ATTRIBUTE,
};
pub use types::{
    Condition, ConditionStatus, WorkspaceConditionType, RECONCILE_FAILURE_REASON,
    STOPPING_MESSAGE, STOPPING_REASON,
};
pub use workspace::{
    phase_name, Members, Workspace, WorkspacePhase, WorkspaceSpec, WorkspaceStatus,
};
