//! The single write path for Cluster finalizers and annotations

use kube::ResourceExt;

use crate::client::ObjectClient;
use crate::crd::Cluster;
use crate::error::{Result, ResultExt};
use crate::retry::{update_with_retry, RetryConfig};

/// Apply `mutate` to the latest stored version of `cluster` and write it back
///
/// Conflicting writes are retried on a fresh copy. On success `cluster` is
/// replaced by the stored result so later phases see the new finalizers and
/// resourceVersion.
pub async fn update_cluster<F>(
    seed: &dyn ObjectClient,
    retry: &RetryConfig,
    cluster: &mut Cluster,
    mutate: F,
) -> Result<()>
where
    F: FnMut(&mut Cluster),
{
    let name = cluster.name_any();
    let updated: Cluster = update_with_retry(seed, retry, None, &name, mutate)
        .await
        .with_context(|| format!("failed to update cluster {name}"))?;
    *cluster = updated;
    Ok(())
}
