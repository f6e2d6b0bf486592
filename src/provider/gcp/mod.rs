//! GCP firewall rules and node routes
//!
//! Every cluster gets three firewall rules (`firewall-<cluster>-self`,
//! `-icmp` and `-nodeport`), each guarded by its own finalizer, and a
//! finalizer for the node routes created by the in-tree cloud provider.

use std::sync::Arc;

use async_trait::async_trait;
use kube::ResourceExt;
use tracing::{info, instrument, warn};

use crate::client::ObjectClient;
use crate::controller::cluster_updater::update_cluster;
use crate::controller::finalizers::{
    has_any_finalizer, has_finalizer, remove_finalizer, GCP_FIREWALL_ICMP_CLEANUP_FINALIZER,
    GCP_FIREWALL_NODEPORT_CLEANUP_FINALIZER, GCP_FIREWALL_SELF_CLEANUP_FINALIZER,
    GCP_ROUTES_CLEANUP_FINALIZER,
};
use crate::crd::{Cluster, GCP_DEFAULT_NETWORK};
use crate::error::{Error, Result, ResultExt};
use crate::retry::RetryConfig;

use super::CloudProvider;

pub mod client;
pub mod credentials;
pub mod routes;

pub use client::{ComputeClient, ComputeClientFactory, RestComputeClientFactory, Route};

/// Finalizers owned by the GCP provider
pub const GCP_FINALIZERS: [&str; 4] = [
    GCP_FIREWALL_SELF_CLEANUP_FINALIZER,
    GCP_FIREWALL_ICMP_CLEANUP_FINALIZER,
    GCP_FIREWALL_NODEPORT_CLEANUP_FINALIZER,
    GCP_ROUTES_CLEANUP_FINALIZER,
];

/// Firewall rule suffix per finalizer
const FIREWALL_RULES: [(&str, &str); 3] = [
    (GCP_FIREWALL_SELF_CLEANUP_FINALIZER, "self"),
    (GCP_FIREWALL_ICMP_CLEANUP_FINALIZER, "icmp"),
    (GCP_FIREWALL_NODEPORT_CLEANUP_FINALIZER, "nodeport"),
];

pub fn firewall_rule_name(cluster: &Cluster, suffix: &str) -> String {
    format!("firewall-{}-{suffix}", cluster.name_any())
}

pub struct GcpCloudProvider {
    seed: Arc<dyn ObjectClient>,
    compute: Arc<dyn ComputeClientFactory>,
    retry: RetryConfig,
}

impl GcpCloudProvider {
    pub fn new(
        seed: Arc<dyn ObjectClient>,
        compute: Arc<dyn ComputeClientFactory>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            seed,
            compute,
            retry,
        }
    }

    async fn release_finalizer(&self, cluster: &mut Cluster, finalizer: &str) -> Result<()> {
        update_cluster(self.seed.as_ref(), &self.retry, cluster, |c| {
            remove_finalizer(c, finalizer)
        })
        .await
        .with_context(|| format!("failed to remove {finalizer} finalizer"))
    }

    /// Delete node routes of this cluster whose instance no longer exists
    async fn clean_unused_routes(
        &self,
        compute: &dyn ComputeClient,
        cluster: &Cluster,
        network: &str,
    ) -> Result<()> {
        let filter = routes::route_filter(&routes::network_url(compute.project_id(), network));
        let candidates = compute
            .list_routes(&filter)
            .await
            .context("failed to list GCP routes")?;

        let pod_cidrs = &cluster.spec.cluster_network.pods.cidr_blocks;
        for route in &candidates {
            match routes::is_cluster_route(pod_cidrs, route) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    warn!(route = %route.name, error = %e, "Failed to determine route CIDR");
                    continue;
                }
            }
            if !routes::is_next_hop_not_found(route) {
                continue;
            }

            info!(route = %route.name, "Deleting unused GCP route");
            match compute.delete_route(&route.name).await {
                Err(e) if !e.is_not_found() => {
                    return Err(e.context(format!("failed to delete GCP route {}", route.name)))
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CloudProvider for GcpCloudProvider {
    #[instrument(skip(self, cluster), fields(cluster = %cluster.name_any()))]
    async fn clean_up_cloud_provider(&self, cluster: &mut Cluster) -> Result<()> {
        if !has_any_finalizer(cluster, &GCP_FINALIZERS) {
            return Ok(());
        }

        let spec = cluster
            .spec
            .cloud
            .gcp
            .clone()
            .ok_or_else(|| Error::ConfigError("cluster has no GCP cloud spec".to_string()))?;
        let service_account = credentials::service_account_for_cluster(self.seed.as_ref(), &spec)
            .await
            .context("failed to get GCP service account")?;
        let compute = self
            .compute
            .connect(&service_account)
            .await
            .context("failed to connect to GCP compute service")?;

        for (finalizer, suffix) in FIREWALL_RULES {
            if !has_finalizer(cluster, finalizer) {
                continue;
            }
            let name = firewall_rule_name(cluster, suffix);
            match compute.delete_firewall(&name).await {
                Ok(()) => info!(rule = %name, "Deleted firewall rule"),
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    return Err(e.context(format!("failed to delete firewall rule {name}")))
                }
            }
            self.release_finalizer(cluster, finalizer).await?;
        }

        if has_finalizer(cluster, GCP_ROUTES_CLEANUP_FINALIZER) {
            let network = if spec.network.is_empty() {
                GCP_DEFAULT_NETWORK
            } else {
                spec.network.as_str()
            };
            self.clean_unused_routes(compute.as_ref(), cluster, network)
                .await?;
            self.release_finalizer(cluster, GCP_ROUTES_CLEANUP_FINALIZER)
                .await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
