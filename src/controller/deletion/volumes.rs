//! PersistentVolumes, their claims and everything keeping them in use
//!
//! Volumes can only be released once no pod mounts them, so the workloads
//! using them go first. With CSI drivers running as pods on the nodes, this
//! has to happen before the nodes are removed.

use futures::future::{join_all, BoxFuture, FutureExt};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim, Pod};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use kube::api::ApiResource;
use kube::ResourceExt;
use tracing::{debug, info};

use super::webhook::{ensure_terminating_webhook, volume_protection_webhook};
use super::{delete_all, delete_if_exists, list_if_served};
use crate::client::typed::{self, api_resource};
use crate::client::{ListOptions, ObjectClient};
use crate::error::{Error, Result, ResultExt};

/// Delete PDBs, PV-using workloads, PVCs and PVs, in that order
///
/// Returns `true` while anything was found; each step returns early so the
/// next one only starts once the previous kind is drained.
pub(super) async fn cleanup_volumes(user: &dyn ObjectClient) -> Result<bool> {
    ensure_terminating_webhook(user, &volume_protection_webhook()).await?;

    // PDBs would block the eviction of the pods below
    let pdb = api_resource::<PodDisruptionBudget>();
    let pdbs = list_if_served(user, &pdb, &ListOptions::default()).await?;
    if !pdbs.is_empty() {
        delete_all(user, &pdb, &pdbs).await?;
        info!(count = pdbs.len(), "Deleted PodDisruptionBudgets");
        return Ok(true);
    }

    if cleanup_pv_using_workloads(user)
        .await
        .context("failed to clean up PV using workloads")?
    {
        return Ok(true);
    }

    let mut deleted_something = false;
    for resource in [
        api_resource::<PersistentVolumeClaim>(),
        api_resource::<PersistentVolume>(),
    ] {
        let objects = list_if_served(user, &resource, &ListOptions::default()).await?;
        if !objects.is_empty() {
            delete_all(user, &resource, &objects).await?;
            info!(kind = %resource.kind, count = objects.len(), "Deleted volume objects");
            deleted_something = true;
        }
    }
    Ok(deleted_something)
}

fn uses_persistent_volume(pod: &Pod) -> bool {
    pod.spec
        .as_ref()
        .and_then(|s| s.volumes.as_ref())
        .map_or(false, |volumes| {
            volumes.iter().any(|v| v.persistent_volume_claim.is_some())
        })
}

/// Delete the top-level owners of every pod mounting a PVC
///
/// Pods are resolved concurrently; failures of individual pods are collected
/// and returned together.
pub(super) async fn cleanup_pv_using_workloads(user: &dyn ObjectClient) -> Result<bool> {
    let pods: Vec<Pod> = typed::list(user, &ListOptions::default())
        .await
        .context("failed to list Pods")?;

    let pv_using: Vec<&Pod> = pods.iter().filter(|p| uses_persistent_volume(p)).collect();
    if pv_using.is_empty() {
        return Ok(false);
    }
    debug!(count = pv_using.len(), "Found pods using persistent volumes");

    let results = join_all(pv_using.iter().map(|pod| {
        delete_top_level_owner(user, "Pod".to_string(), pod.namespace(), pod.name_any())
    }))
    .await;

    let errors: Vec<Error> = results.into_iter().filter_map(|r| r.err()).collect();
    match Error::aggregate(errors) {
        Some(error) => Err(error),
        None => Ok(true),
    }
}

fn workload_resource(kind: &str) -> Result<ApiResource> {
    match kind {
        "Pod" => Ok(api_resource::<Pod>()),
        "ReplicaSet" => Ok(api_resource::<ReplicaSet>()),
        "Deployment" => Ok(api_resource::<Deployment>()),
        "StatefulSet" => Ok(api_resource::<StatefulSet>()),
        "DaemonSet" => Ok(api_resource::<DaemonSet>()),
        other => Err(Error::ConfigError(format!("kind {other:?} is unknown"))),
    }
}

/// Walk the owner references of an object upwards, deleting from the top
///
/// An owner that is already gone is skipped; with background deletion owners
/// disappear before their dependents.
fn delete_top_level_owner(
    client: &dyn ObjectClient,
    kind: String,
    namespace: Option<String>,
    name: String,
) -> BoxFuture<'_, Result<()>> {
    async move {
        let resource = workload_resource(&kind)?;
        let object = match client.get(&resource, namespace.as_deref(), &name).await {
            Ok(object) => object,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => {
                return Err(e.context(format!("failed to get {kind} {}", qualified(&namespace, &name))))
            }
        };

        for owner in object.owner_references() {
            delete_top_level_owner(
                client,
                owner.kind.clone(),
                namespace.clone(),
                owner.name.clone(),
            )
            .await?;
        }

        delete_if_exists(client, &resource, namespace.as_deref(), &name).await?;
        debug!(kind = %kind, name = %qualified(&namespace, &name), "Deleted PV using workload");
        Ok(())
    }
    .boxed()
}

fn qualified(namespace: &Option<String>, name: &str) -> String {
    match namespace {
        Some(ns) => format!("{ns}/{name}"),
        None => name.to_string(),
    }
}
