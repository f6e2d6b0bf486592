//! Controller for Cluster teardown
//!
//! `deletion` holds the phase machine, `reconciler` the kube-runtime wiring.

pub mod cluster_updater;
pub mod deletion;
pub mod finalizers;
pub mod metrics;
mod reconciler;

pub use deletion::{Deletion, DeletionConfig, Phase};
pub use metrics::DeletionMetrics;
pub use reconciler::{run_controller, ControllerState, Teardown};
