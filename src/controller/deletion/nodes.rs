//! Node deprovisioning through the machine-controller objects

use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;
use tracing::{debug, info};

use super::{delete_all, list_if_served, Deletion};
use crate::client::{typed, ListOptions, ObjectClient};
use crate::controller::cluster_updater::update_cluster;
use crate::controller::finalizers::{remove_finalizer, NODE_DELETION_FINALIZER, SKIP_EVICTION_ANNOTATION};
use crate::crd::{external, Cluster};
use crate::error::{Result, ResultExt};
use crate::retry::update_with_retry;

const MACHINE_NAMESPACE: &str = "kube-system";

impl Deletion {
    /// Remove all machines, top-level objects first
    ///
    /// Only one level is deleted per pass; the next level is touched once the
    /// previous one is gone. The node finalizer is removed when all three are
    /// empty.
    pub(super) async fn cleanup_nodes(
        &self,
        user: &dyn ObjectClient,
        cluster: &mut Cluster,
    ) -> Result<()> {
        self.disable_eviction(user).await?;

        let options = ListOptions::in_namespace(MACHINE_NAMESPACE);
        for resource in [
            external::machine_deployment(),
            external::machine_set(),
            external::machine(),
        ] {
            let objects = list_if_served(user, &resource, &options).await?;
            if !objects.is_empty() {
                delete_all(user, &resource, &objects).await?;
                info!(kind = %resource.kind, count = objects.len(), "Deleting machines");
                return Ok(());
            }
        }

        update_cluster(self.seed.as_ref(), &self.config.conflict_retry, cluster, |c| {
            remove_finalizer(c, NODE_DELETION_FINALIZER)
        })
        .await?;
        info!("All machines are gone");
        Ok(())
    }

    /// Mark every node so the machine-controller deletes it without draining
    async fn disable_eviction(&self, user: &dyn ObjectClient) -> Result<()> {
        let nodes: Vec<Node> = typed::list(user, &ListOptions::default())
            .await
            .context("failed to list Nodes")?;

        for node in nodes.iter().filter(|n| !eviction_disabled(n)) {
            let name = node.name_any();
            let result = update_with_retry::<Node, _>(
                user,
                &self.config.conflict_retry,
                None,
                &name,
                |n| {
                    n.annotations_mut()
                        .insert(SKIP_EVICTION_ANNOTATION.to_string(), "true".to_string());
                },
            )
            .await;

            match result {
                Ok(_) => debug!(node = %name, "Disabled eviction"),
                // Deleted in the meantime
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    return Err(e.context(format!(
                        "failed to add the annotation {SKIP_EVICTION_ANNOTATION}=true to node {name}"
                    )))
                }
            }
        }
        Ok(())
    }
}

fn eviction_disabled(node: &Node) -> bool {
    node.annotations()
        .get(SKIP_EVICTION_ANNOTATION)
        .map_or(false, |v| v == "true")
}
