//! Teardown of a user cluster
//!
//! [`Deletion::cleanup_cluster`] is invoked by the reconciler every time a
//! Cluster with a deletion timestamp changes (and periodically while
//! finalizers remain). Each invocation runs the cleaners whose finalizers
//! are still present and removes those finalizers once the cleanup is
//! confirmed. All resume state lives on the
//! Cluster object, so the function is safe to call any number of times with
//! stale input.
//!
//! Ordering:
//! 1. In-cluster resources: LoadBalancer Services, volumes (with the pods and
//!    PDBs blocking them), OpenShift image registry configs, OpenShift
//!    credentials requests.
//! 2. Nodes: MachineDeployments, then MachineSets, then Machines. Runs in
//!    the same pass as step 1, after its PV-using workloads were deleted, so
//!    CSI node plugins are still around to detach volumes.
//! 3. The provider credentials Secret in the seed, once nothing else is left.

use std::sync::Arc;
use std::time::Duration;

use kube::api::{ApiResource, DynamicObject};
use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{debug, info, instrument};

use crate::client::{ListOptions, ObjectClient, UserClusterClientProvider};
use crate::crd::{Cluster, ProviderKind};
use crate::error::{Result, ResultExt};
use crate::retry::RetryConfig;

use super::cluster_updater::update_cluster;
use super::finalizers::{
    has_finalizer, remove_finalizers, IN_CLUSTER_CREDENTIALS_REQUESTS_CLEANUP_FINALIZER,
    IN_CLUSTER_FINALIZERS, IN_CLUSTER_IMAGE_REGISTRY_CONFIG_CLEANUP_FINALIZER,
    IN_CLUSTER_LB_CLEANUP_FINALIZER, IN_CLUSTER_PV_CLEANUP_FINALIZER, NODE_DELETION_FINALIZER,
};
use super::metrics::StaleLoadBalancerRecorder;

mod credentials;
mod load_balancers;
mod nodes;
mod openshift;
mod phase;
mod volumes;
mod webhook;


pub use credentials::credentials_secret_name;
pub use load_balancers::{PendingLoadBalancers, CLEANED_UP_LOAD_BALANCERS_ANNOTATION};
pub use phase::Phase;
pub use webhook::{
    resource_protection_webhook, volume_protection_webhook, VOLUME_PROTECTION_WEBHOOK_NAME,
};

/// Tunables of the teardown
#[derive(Clone, Debug)]
pub struct DeletionConfig {
    /// Seed namespace holding the per-cluster provider credentials
    pub credentials_namespace: String,
    /// How long to wait for LoadBalancer deletion events before giving up
    pub lb_grace_period: Duration,
    /// Providers whose LoadBalancer deletion is only observable through an Event
    pub event_confirmed_providers: Vec<ProviderKind>,
    pub requeue_after: Duration,
    pub annotation_poll_interval: Duration,
    pub annotation_poll_timeout: Duration,
    pub conflict_retry: RetryConfig,
}

impl Default for DeletionConfig {
    fn default() -> Self {
        Self {
            credentials_namespace: "kubermatic".to_string(),
            lb_grace_period: Duration::from_secs(2 * 60 * 60),
            event_confirmed_providers: vec![
                ProviderKind::Aws,
                ProviderKind::Azure,
                ProviderKind::Openstack,
            ],
            requeue_after: Duration::from_secs(10),
            annotation_poll_interval: Duration::from_millis(10),
            annotation_poll_timeout: Duration::from_secs(5),
            conflict_retry: RetryConfig::default(),
        }
    }
}

/// The teardown orchestrator
pub struct Deletion {
    seed: Arc<dyn ObjectClient>,
    user_clusters: Arc<dyn UserClusterClientProvider>,
    stale_lbs: Arc<dyn StaleLoadBalancerRecorder>,
    config: DeletionConfig,
}

impl Deletion {
    pub fn new(
        seed: Arc<dyn ObjectClient>,
        user_clusters: Arc<dyn UserClusterClientProvider>,
        stale_lbs: Arc<dyn StaleLoadBalancerRecorder>,
        config: DeletionConfig,
    ) -> Self {
        Self {
            seed,
            user_clusters,
            stale_lbs,
            config,
        }
    }

    pub fn config(&self) -> &DeletionConfig {
        &self.config
    }

    /// Advance the teardown of `cluster` as far as possible
    ///
    /// `cluster` is kept in sync with every write made to the stored object.
    /// Returns a requeue while any finalizer is left.
    #[instrument(skip(self, cluster), fields(cluster = %cluster.name_any()))]
    pub async fn cleanup_cluster(&self, cluster: &mut Cluster) -> Result<Action> {
        let mut user_client = None;

        if Phase::current(cluster) == Phase::InClusterResources {
            debug!("Cleaning up in-cluster resources");
            let user = self.user_client(&mut user_client, cluster).await?;
            self.cleanup_in_cluster_resources(user.as_ref(), cluster)
                .await?;
        }

        // Machines go down even while in-cluster resources are still draining
        if has_finalizer(cluster, NODE_DELETION_FINALIZER) {
            debug!("Cleaning up nodes");
            let user = self.user_client(&mut user_client, cluster).await?;
            self.cleanup_nodes(user.as_ref(), cluster).await?;
        }

        if Phase::current(cluster) == Phase::CredentialsSecret {
            self.cleanup_credentials_secret(cluster).await?;
        }

        if cluster.finalizers().is_empty() {
            Ok(Action::await_change())
        } else {
            Ok(Action::requeue(self.config.requeue_after))
        }
    }

    async fn user_client(
        &self,
        cached: &mut Option<Arc<dyn ObjectClient>>,
        cluster: &Cluster,
    ) -> Result<Arc<dyn ObjectClient>> {
        if let Some(client) = cached {
            return Ok(client.clone());
        }
        let client = self
            .user_clusters
            .client(cluster)
            .await
            .context("failed to get user cluster client")?;
        *cached = Some(client.clone());
        Ok(client)
    }

    /// Clean up everything inside the user cluster that holds cloud resources
    ///
    /// The four in-cluster finalizers are removed together, and only once no
    /// cleaner deleted anything and every LoadBalancer deletion is confirmed.
    async fn cleanup_in_cluster_resources(
        &self,
        user: &dyn ObjectClient,
        cluster: &mut Cluster,
    ) -> Result<()> {
        let mut deleted_something = false;

        if has_finalizer(cluster, IN_CLUSTER_LB_CLEANUP_FINALIZER) {
            deleted_something |= self
                .cleanup_load_balancers(user, cluster)
                .await
                .context("failed to clean up LoadBalancers")?;
        }

        if has_finalizer(cluster, IN_CLUSTER_PV_CLEANUP_FINALIZER) {
            deleted_something |= volumes::cleanup_volumes(user)
                .await
                .context("failed to clean up volumes")?;
        }

        // The registry operator needs its credentials to clean up the registry storage
        if has_finalizer(cluster, IN_CLUSTER_IMAGE_REGISTRY_CONFIG_CLEANUP_FINALIZER)
            && openshift::cleanup_image_registry_configs(user)
                .await
                .context("failed to clean up image registry configs")?
        {
            return Ok(());
        }

        if has_finalizer(cluster, IN_CLUSTER_CREDENTIALS_REQUESTS_CLEANUP_FINALIZER)
            && openshift::cleanup_credentials_requests(user)
                .await
                .context("failed to clean up credentials requests")?
        {
            return Ok(());
        }

        // Deletes issued this pass have to land before anything can be confirmed
        if deleted_something {
            return Ok(());
        }

        let lbs_are_gone = self
            .check_if_all_loadbalancers_are_gone(user, cluster)
            .await
            .context("failed to check if all LoadBalancers are gone")?;
        if !lbs_are_gone {
            return Ok(());
        }

        update_cluster(
            self.seed.as_ref(),
            &self.config.conflict_retry,
            cluster,
            |c| remove_finalizers(c, &IN_CLUSTER_FINALIZERS),
        )
        .await?;
        info!("In-cluster resources are cleaned up");
        Ok(())
    }
}

/// List all objects of a kind, treating an unserved kind as empty
async fn list_if_served(
    client: &dyn ObjectClient,
    resource: &ApiResource,
    options: &ListOptions,
) -> Result<Vec<DynamicObject>> {
    match client.list(resource, options).await {
        Ok(items) => Ok(items),
        Err(e) if e.is_no_kind_match() => {
            debug!(kind = %resource.kind, "Kind is not served, nothing to clean up");
            Ok(Vec::new())
        }
        Err(e) => Err(e.context(format!("failed to list {}", resource.kind))),
    }
}

/// Delete one object; an already missing object counts as deleted
async fn delete_if_exists(
    client: &dyn ObjectClient,
    resource: &ApiResource,
    namespace: Option<&str>,
    name: &str,
) -> Result<()> {
    match client.delete(resource, namespace, name).await {
        Err(e) if e.is_not_found() => Ok(()),
        other => other.with_context(|| match namespace {
            Some(ns) => format!("failed to delete {} {ns}/{name}", resource.kind),
            None => format!("failed to delete {} {name}", resource.kind),
        }),
    }
}

/// Delete every listed object, stopping at the first failure
async fn delete_all(
    client: &dyn ObjectClient,
    resource: &ApiResource,
    objects: &[DynamicObject],
) -> Result<()> {
    for object in objects {
        delete_if_exists(
            client,
            resource,
            object.metadata.namespace.as_deref(),
            &object.name_any(),
        )
        .await?;
    }
    Ok(())
}
