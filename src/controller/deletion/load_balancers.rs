//! LoadBalancer Services and the drain of their cloud load balancers
//!
//! In-tree cloud providers delete the cloud load balancer only after the
//! Service object is gone and report it with a `DeletedLoadBalancer` Event
//! on the Service's UID. The UIDs of deleted Services are therefore kept on
//! the Cluster until that Event shows up, or until the grace period ends.

use std::collections::BTreeSet;

use chrono::Utc;
use k8s_openapi::api::core::v1::{Event, Service};
use kube::ResourceExt;
use tracing::{info, warn};

use super::{delete_if_exists, Deletion};
use crate::client::{typed, ListOptions, ObjectClient};
use crate::controller::cluster_updater::update_cluster;
use crate::crd::Cluster;
use crate::error::{Result, ResultExt};
use crate::retry::poll_until;

/// Cluster annotation holding the UIDs of deleted LoadBalancer Services
pub const CLEANED_UP_LOAD_BALANCERS_ANNOTATION: &str = "kubermatic.io/cleaned-up-loadbalancers";

const DELETED_LOAD_BALANCER_REASON: &str = "DeletedLoadBalancer";

/// UIDs of Services whose cloud load balancer deletion is not confirmed yet
///
/// Stored as a comma separated list. Older writers prefixed every entry with
/// a comma, so empty entries are ignored when decoding.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PendingLoadBalancers(BTreeSet<String>);

impl PendingLoadBalancers {
    pub fn decode(raw: &str) -> Self {
        Self(
            raw.split(',')
                .map(str::trim)
                .filter(|uid| !uid.is_empty())
                .map(String::from)
                .collect(),
        )
    }

    pub fn encode(&self) -> String {
        self.0.iter().map(String::as_str).collect::<Vec<_>>().join(",")
    }

    pub fn from_cluster(cluster: &Cluster) -> Self {
        cluster
            .annotations()
            .get(CLEANED_UP_LOAD_BALANCERS_ANNOTATION)
            .map(|raw| Self::decode(raw))
            .unwrap_or_default()
    }

    /// Write the set to the annotation, dropping the key once empty
    pub fn store(&self, cluster: &mut Cluster) {
        if self.is_empty() {
            cluster
                .annotations_mut()
                .remove(CLEANED_UP_LOAD_BALANCERS_ANNOTATION);
        } else {
            cluster
                .annotations_mut()
                .insert(CLEANED_UP_LOAD_BALANCERS_ANNOTATION.to_string(), self.encode());
        }
    }

    pub fn insert(&mut self, uid: impl Into<String>) -> bool {
        self.0.insert(uid.into())
    }

    pub fn remove(&mut self, uid: &str) -> bool {
        self.0.remove(uid)
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.0.contains(uid)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

fn is_load_balancer(service: &Service) -> bool {
    service
        .spec
        .as_ref()
        .and_then(|s| s.type_.as_deref())
        .map_or(false, |t| t == "LoadBalancer")
}

impl Deletion {
    /// Delete all LoadBalancer Services and remember their UIDs on the Cluster
    ///
    /// Each UID is persisted before moving on, and the write is awaited until
    /// it is readable from the seed so the drain check sees it.
    pub(super) async fn cleanup_load_balancers(
        &self,
        user: &dyn ObjectClient,
        cluster: &mut Cluster,
    ) -> Result<bool> {
        let services: Vec<Service> = typed::list(user, &ListOptions::default())
            .await
            .context("failed to list Services")?;

        let mut deleted_something = false;
        for service in services.iter().filter(|s| is_load_balancer(s)) {
            let namespace = service.namespace();
            let name = service.name_any();
            delete_if_exists(
                user,
                &typed::api_resource::<Service>(),
                namespace.as_deref(),
                &name,
            )
            .await?;
            deleted_something = true;

            let Some(uid) = service.uid() else {
                warn!(service = %name, "Deleted LoadBalancer Service has no UID");
                continue;
            };
            info!(service = %name, uid = %uid, "Deleted LoadBalancer Service");

            update_cluster(self.seed.as_ref(), &self.config.conflict_retry, cluster, |c| {
                let mut pending = PendingLoadBalancers::from_cluster(c);
                pending.insert(uid.as_str());
                pending.store(c);
            })
            .await
            .context("failed to record UID of deleted LoadBalancer")?;

            self.wait_for_pending_load_balancer(&cluster.name_any(), &uid)
                .await?;
        }

        Ok(deleted_something)
    }

    async fn wait_for_pending_load_balancer(&self, cluster_name: &str, uid: &str) -> Result<()> {
        let seed = self.seed.as_ref();
        poll_until(
            self.config.annotation_poll_interval,
            self.config.annotation_poll_timeout,
            "deleted LoadBalancer annotation",
            move || async move {
                let latest: Cluster = typed::get(seed, None, cluster_name).await?;
                Ok(PendingLoadBalancers::from_cluster(&latest).contains(uid))
            },
        )
        .await
        .context("failed to wait for the deleted LoadBalancer annotation")
    }

    /// Whether every recorded LoadBalancer deletion has been confirmed
    ///
    /// Confirmed UIDs are dropped from the Cluster annotation.
    pub(super) async fn check_if_all_loadbalancers_are_gone(
        &self,
        user: &dyn ObjectClient,
        cluster: &mut Cluster,
    ) -> Result<bool> {
        let event_confirmed = cluster
            .spec
            .cloud
            .provider()
            .map_or(false, |p| self.config.event_confirmed_providers.contains(&p));
        if !event_confirmed {
            return Ok(true);
        }

        let mut pending = PendingLoadBalancers::from_cluster(cluster);
        if pending.is_empty() {
            return Ok(true);
        }

        // Events are best effort, they may never arrive
        let grace_period_expired = cluster
            .metadata
            .deletion_timestamp
            .as_ref()
            .and_then(|ts| Utc::now().signed_duration_since(ts.0).to_std().ok())
            .map_or(false, |elapsed| elapsed > self.config.lb_grace_period);
        if grace_period_expired {
            warn!(
                pending = pending.len(),
                "LoadBalancer deletion was not confirmed within the grace period"
            );
            self.stale_lbs
                .record_stale_load_balancers(&cluster.name_any(), pending.len());
            return Ok(true);
        }

        let before = pending.clone();
        for uid in before.iter() {
            let events: Vec<Event> = typed::list(
                user,
                &ListOptions::default().with_field_selector(format!("involvedObject.uid={uid}")),
            )
            .await
            .with_context(|| format!("failed to list events for Service {uid}"))?;

            if events
                .iter()
                .any(|e| e.reason.as_deref() == Some(DELETED_LOAD_BALANCER_REASON))
            {
                info!(uid = %uid, "LoadBalancer deletion confirmed");
                pending.remove(uid);
            }
        }

        if pending != before {
            update_cluster(self.seed.as_ref(), &self.config.conflict_retry, cluster, |c| {
                pending.store(c)
            })
            .await?;
        }

        Ok(pending.is_empty())
    }
}
