//! Workspace status controller
//!
//! Folds the live child objects of each Workspace (pods, deployments,
//! exposures) into its status and drives the phase state machine:
//! - `router` maps child object changes to Workspace reconciles via `owner`
//! - `fold` computes the next status, using `phase` for phase and conditions
//! - `writer` persists it only when it changed
//! - `provision` is the boundary to the provisioning layer

pub mod client;
pub mod controller;
pub mod error;
pub mod fold;
pub mod owner;
pub mod phase;
pub mod provision;
pub mod restapis;
pub mod router;
pub mod writer;

pub use controller::{error_policy, reconcile, Context};
pub use error::ReconcileError;
pub use fold::{fold_status, ChildSnapshot, Diagnostic, FoldOutcome};
pub use provision::{Provisioner, ProvisioningReport};
pub use router::{owned_object_triggers, ReconcileRequest};
