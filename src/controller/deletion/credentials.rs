//! The provider credentials Secret kept in the seed

use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use tracing::info;

use super::{delete_if_exists, Deletion};
use crate::client::typed::api_resource;
use crate::controller::cluster_updater::update_cluster;
use crate::controller::finalizers::{remove_finalizer, CREDENTIALS_SECRETS_CLEANUP_FINALIZER};
use crate::crd::Cluster;
use crate::error::Result;

/// `credential-<provider>-<cluster>`, or `None` for providers without credentials
pub fn credentials_secret_name(cluster: &Cluster) -> Option<String> {
    let provider = cluster.spec.cloud.provider()?;
    provider
        .has_credentials()
        .then(|| format!("credential-{provider}-{}", cluster.name_any()))
}

impl Deletion {
    pub(super) async fn cleanup_credentials_secret(&self, cluster: &mut Cluster) -> Result<()> {
        if let Some(name) = credentials_secret_name(cluster) {
            delete_if_exists(
                self.seed.as_ref(),
                &api_resource::<Secret>(),
                Some(self.config.credentials_namespace.as_str()),
                &name,
            )
            .await?;
            info!(secret = %name, "Deleted credentials secret");
        }

        update_cluster(self.seed.as_ref(), &self.config.conflict_retry, cluster, |c| {
            remove_finalizer(c, CREDENTIALS_SECRETS_CLEANUP_FINALIZER)
        })
        .await
    }
}
