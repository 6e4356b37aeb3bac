//! Control loop: reconcile declared `Config` objects into materialized
//! deployment artifacts, and decide which declared objects need
//! re-reconciling when an external dependency changes.

pub mod reconcile;
pub mod watch;

pub use reconcile::{
    reconcile, reconcile_to_status, Condition, DeploymentSpec, MaterializedConfig, ObjectStatus, OwnerReference, Phase,
    ReconcileOutcome,
};
pub use watch::{ConfigReferenceWatcher, ReferenceWatcher};
