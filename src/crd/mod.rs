//! Custom Resource Definitions used by the cluster deletion controller
//!
//! `Cluster` is the platform's own CRD; `external` lists user-cluster kinds
//! that are only touched as dynamic objects.

mod cluster;
pub mod external;
pub mod types;


pub use cluster::{Cluster, ClusterSpec};
pub use types::*;
