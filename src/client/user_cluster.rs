//! Access to the user cluster behind a `Cluster` object

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config, ResourceExt};
use tracing::debug;

use super::{typed, KubeObjectClient, ObjectClient};
use crate::crd::Cluster;
use crate::error::{Error, Result, ResultExt};

/// Name of the seed Secret holding the admin kubeconfig of a user cluster
pub const ADMIN_KUBECONFIG_SECRET_NAME: &str = "admin-kubeconfig";
pub const KUBECONFIG_SECRET_KEY: &str = "kubeconfig";

/// Hands out clients for user clusters
///
/// Callers ask for a client only when a phase actually needs one, so a
/// cluster whose API server is already gone can still finish the phases that
/// only touch the seed.
#[async_trait]
pub trait UserClusterClientProvider: Send + Sync {
    async fn client(&self, cluster: &Cluster) -> Result<Arc<dyn ObjectClient>>;
}

/// Builds user cluster clients from the admin kubeconfig stored in the seed
pub struct KubeconfigClientProvider {
    seed: Arc<dyn ObjectClient>,
}

impl KubeconfigClientProvider {
    pub fn new(seed: Arc<dyn ObjectClient>) -> Self {
        Self { seed }
    }
}

#[async_trait]
impl UserClusterClientProvider for KubeconfigClientProvider {
    async fn client(&self, cluster: &Cluster) -> Result<Arc<dyn ObjectClient>> {
        let namespace = cluster.seed_namespace();
        let secret: Secret = typed::get(
            self.seed.as_ref(),
            Some(&namespace),
            ADMIN_KUBECONFIG_SECRET_NAME,
        )
        .await
        .with_context(|| format!("failed to get admin kubeconfig for cluster {}", cluster.name_any()))?;

        let raw = secret
            .data
            .as_ref()
            .and_then(|d| d.get(KUBECONFIG_SECRET_KEY))
            .ok_or_else(|| {
                Error::ConfigError(format!(
                    "secret {namespace}/{ADMIN_KUBECONFIG_SECRET_NAME} has no {KUBECONFIG_SECRET_KEY:?} key"
                ))
            })?;
        let yaml = std::str::from_utf8(&raw.0)
            .map_err(|e| Error::ConfigError(format!("kubeconfig is not valid UTF-8: {e}")))?;

        let kubeconfig = Kubeconfig::from_yaml(yaml)
            .map_err(|e| Error::ConfigError(format!("failed to parse kubeconfig: {e}")))?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| Error::ConfigError(format!("invalid kubeconfig: {e}")))?;
        let client = Client::try_from(config)?;

        debug!(cluster = %cluster.name_any(), "Created user cluster client");
        Ok(Arc::new(KubeObjectClient::new(client)))
    }
}
