//! cluster-deletion: finalizer-driven teardown of Kubermatic user clusters
//!
//! When a `Cluster` is deleted, the controller removes everything that holds
//! cloud resources (LoadBalancer Services, volumes, OpenShift objects,
//! machines, provider firewalls and routes) before releasing the Cluster's
//! finalizers, so that deleting a cluster never leaks cloud resources.

pub mod client;
pub mod controller;
pub mod crd;
pub mod error;
pub mod provider;
pub mod retry;

#[cfg(feature = "rest-api")]
pub mod rest_api;

pub use crate::error::{Error, Result};
