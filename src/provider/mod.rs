//! Cloud provider specific teardown
//!
//! Providers own finalizers of their own on the Cluster. They run once the
//! nodes of the cluster are gone, and the credentials Secret is only deleted
//! after all provider finalizers are removed.

use async_trait::async_trait;

use crate::crd::Cluster;
use crate::error::Result;

pub mod gcp;

pub use gcp::GcpCloudProvider;

#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Delete the cloud resources guarded by this provider's finalizers
    ///
    /// Each finalizer is removed right after its resource is confirmed gone;
    /// `cluster` is refreshed with every write.
    async fn clean_up_cloud_provider(&self, cluster: &mut Cluster) -> Result<()>;
}
