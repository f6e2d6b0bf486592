//! Prometheus metrics for the cluster deletion controller
//!
//! # Exported metrics
//! - `stale_lbs` (gauge): LoadBalancer Services of a cluster whose cloud-side
//!   deletion was never confirmed before the grace period ran out, labeled by cluster.
//! - `cluster_deletion_reconcile_duration_seconds` (histogram): reconcile duration.
//! - `cluster_deletion_reconcile_errors_total` (counter): reconcile errors labeled by kind.

use std::sync::atomic::{AtomicI64, AtomicU64};

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

use crate::error::Error;

/// Sink for the number of LoadBalancers abandoned after the grace period
pub trait StaleLoadBalancerRecorder: Send + Sync {
    fn record_stale_load_balancers(&self, cluster_name: &str, count: usize);
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ClusterLabels {
    pub cluster: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    /// Error category, e.g. "kube", "conflict", "gcp"
    pub kind: String,
}

fn reconcile_histogram() -> Histogram {
    // 1ms .. ~32s across 16 buckets.
    Histogram::new(exponential_buckets(0.001, 2.0, 16))
}

/// Metric families of the deletion controller
///
/// Cheap to clone; clones share the underlying values.
#[derive(Clone)]
pub struct DeletionMetrics {
    stale_lbs: Family<ClusterLabels, Gauge<i64, AtomicI64>>,
    reconcile_duration: Histogram,
    reconcile_errors: Family<ErrorLabels, Counter<u64, AtomicU64>>,
}

impl Default for DeletionMetrics {
    fn default() -> Self {
        Self {
            stale_lbs: Family::default(),
            reconcile_duration: reconcile_histogram(),
            reconcile_errors: Family::default(),
        }
    }
}

impl DeletionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, registry: &mut Registry) {
        registry.register(
            "stale_lbs",
            "Number of LoadBalancer Services whose deletion was not confirmed within the grace period",
            self.stale_lbs.clone(),
        );
        registry.register(
            "cluster_deletion_reconcile_duration_seconds",
            "Duration of cluster deletion reconcile loops in seconds",
            self.reconcile_duration.clone(),
        );
        registry.register(
            "cluster_deletion_reconcile_errors",
            "Total number of cluster deletion reconcile errors",
            self.reconcile_errors.clone(),
        );
    }

    pub fn stale_load_balancers(&self, cluster_name: &str) -> i64 {
        self.stale_lbs
            .get_or_create(&ClusterLabels {
                cluster: cluster_name.to_string(),
            })
            .get()
    }

    pub fn observe_reconcile(&self, seconds: f64) {
        self.reconcile_duration.observe(seconds);
    }

    pub fn inc_reconcile_error(&self, error: &Error) {
        self.reconcile_errors
            .get_or_create(&ErrorLabels {
                kind: error_kind(error).to_string(),
            })
            .inc();
    }
}

impl StaleLoadBalancerRecorder for DeletionMetrics {
    fn record_stale_load_balancers(&self, cluster_name: &str, count: usize) {
        self.stale_lbs
            .get_or_create(&ClusterLabels {
                cluster: cluster_name.to_string(),
            })
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }
}

fn error_kind(error: &Error) -> &'static str {
    match error.root() {
        Error::Conflict { .. } => "conflict",
        Error::NotFound { .. } | Error::NoKindMatch(_) | Error::AlreadyExists { .. } => "kube",
        Error::KubeError(_) => "kube",
        Error::GcpError { .. } | Error::HttpError(_) => "gcp",
        Error::Timeout(_) => "timeout",
        Error::ConfigError(_) => "config",
        _ => "unknown",
    }
}
