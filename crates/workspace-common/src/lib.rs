//! Common types for the workspace controller: CRDs, conditions, runtime
//! descriptors, errors, and utilities

#![deny(missing_docs)]

pub mod conditions;
pub mod config;
pub mod crd;
pub mod error;
pub mod events;
pub mod kube_utils;
pub mod runtime;
pub mod telemetry;

pub use conditions::ConditionSet;
pub use config::ControllerConfig;
pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Label carrying the workspace identifier on every object that belongs to a workspace
pub const WORKSPACE_ID_LABEL: &str = "che.workspace_id";

/// Label carrying the workspace name, set on pods by the provisioning layer
pub const WORKSPACE_NAME_LABEL: &str = "che.workspace_name";

/// Label marking which pod template a pod was created from
pub const ORIGINAL_NAME_LABEL: &str = "che.original_name";

/// Value of [`ORIGINAL_NAME_LABEL`] on the main workspace pod
pub const WORKSPACE_POD_ORIGINAL_NAME: &str = "che-workspace-pod";

/// Label set by Deployments on their ReplicaSets and pods
pub const DEPLOYMENT_LABEL: &str = "deployment";

/// `additionalInfo` key holding the JSON-encoded component instance statuses
pub const COMPONENT_STATUSES_KEY: &str = "org.eclipse.che.workspace/componentstatuses";

/// `additionalInfo` key holding the JSON-encoded runtime descriptor
pub const RUNTIME_KEY: &str = "org.eclipse.che.workspace/runtime";

/// Field manager used for all status writes
pub const FIELD_MANAGER: &str = "workspace-controller";
