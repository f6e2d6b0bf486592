//! Controller wiring for Cluster teardown
//!
//! Watches `Cluster` objects and drives [`Teardown::run`] for every cluster
//! with a deletion timestamp.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher::Config;
use kube::{Api, Client, ResourceExt};
use tracing::{debug, error, info, instrument};

use super::deletion::{Deletion, Phase};
use super::metrics::DeletionMetrics;
use crate::crd::Cluster;
use crate::error::{Error, Result};
use crate::provider::CloudProvider;

/// Runs the generic teardown and the provider specific cleanup
pub struct Teardown {
    deletion: Deletion,
    gcp: Option<Arc<dyn CloudProvider>>,
}

impl Teardown {
    pub fn new(deletion: Deletion, gcp: Option<Arc<dyn CloudProvider>>) -> Self {
        Self { deletion, gcp }
    }

    fn cloud_provider(&self, cluster: &Cluster) -> Option<&dyn CloudProvider> {
        if cluster.spec.cloud.gcp.is_some() {
            self.gcp.as_deref()
        } else {
            None
        }
    }

    /// One teardown pass over `cluster`
    ///
    /// Provider resources are released once nodes and in-cluster resources
    /// are gone; the credentials Secret outlives them.
    pub async fn run(&self, cluster: &mut Cluster) -> Result<Action> {
        let action = self.deletion.cleanup_cluster(cluster).await?;
        if Phase::current(cluster) != Phase::WaitingForOtherFinalizers {
            return Ok(action);
        }

        let Some(provider) = self.cloud_provider(cluster) else {
            return Ok(action);
        };
        provider.clean_up_cloud_provider(cluster).await?;

        // Provider finalizers may have been the last ones before the Secret
        self.deletion.cleanup_cluster(cluster).await
    }
}

/// Shared state of the controller
pub struct ControllerState {
    pub client: Client,
    pub teardown: Teardown,
    pub metrics: DeletionMetrics,
}

/// Main entry point to start the controller
pub async fn run_controller(state: Arc<ControllerState>) -> Result<()> {
    let clusters: Api<Cluster> = Api::all(state.client.clone());

    info!("Starting cluster deletion controller");

    match clusters.list(&Default::default()).await {
        Ok(_) => info!("Cluster CRD is available"),
        Err(e) => {
            error!("Cluster CRD not found. Please install the CRD first: {:?}", e);
            return Err(Error::ConfigError("Cluster CRD not installed".to_string()));
        }
    }

    Controller::new(clusters, Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, state)
        .for_each(|res| async move {
            match res {
                Ok(obj) => debug!("Reconciled: {:?}", obj),
                Err(e) => error!("Reconcile error: {:?}", e),
            }
        })
        .await;

    Ok(())
}

#[instrument(skip(cluster, ctx), fields(cluster = %cluster.name_any()))]
async fn reconcile(cluster: Arc<Cluster>, ctx: Arc<ControllerState>) -> Result<Action> {
    if cluster.metadata.deletion_timestamp.is_none() {
        return Ok(Action::await_change());
    }

    let start = Instant::now();
    let mut cluster = (*cluster).clone();
    let result = ctx.teardown.run(&mut cluster).await;
    ctx.metrics.observe_reconcile(start.elapsed().as_secs_f64());
    result
}

fn error_policy(cluster: Arc<Cluster>, error: &Error, ctx: Arc<ControllerState>) -> Action {
    error!(
        "Teardown of cluster {} failed: {}",
        cluster.name_any(),
        error
    );
    ctx.metrics.inc_reconcile_error(error);

    let retry_duration = if error.is_retriable() {
        Duration::from_secs(15)
    } else {
        Duration::from_secs(60)
    };

    Action::requeue(retry_duration)
}
