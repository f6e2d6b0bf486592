use std::sync::Mutex;

use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::ObjectMeta;

use super::client::RouteWarning;
use super::*;
use crate::client::fake::FakeObjectClient;
use crate::crd::{CloudSpec, ClusterNetworkingConfig, ClusterSpec, GCPCloudSpec, NetworkRanges};

#[derive(Default)]
struct FakeCompute {
    routes: Vec<Route>,
    missing_firewalls: Vec<String>,
    fail_firewalls: bool,
    calls: Mutex<Vec<String>>,
}

impl FakeCompute {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ComputeClient for FakeCompute {
    fn project_id(&self) -> &str {
        "my-project"
    }

    async fn delete_firewall(&self, name: &str) -> Result<()> {
        self.calls.lock().unwrap().push(format!("delete-firewall {name}"));
        if self.fail_firewalls {
            return Err(Error::GcpError {
                status: 403,
                message: "forbidden".into(),
            });
        }
        if self.missing_firewalls.iter().any(|m| m == name) {
            return Err(Error::GcpError {
                status: 404,
                message: "not found".into(),
            });
        }
        Ok(())
    }

    async fn list_routes(&self, filter: &str) -> Result<Vec<Route>> {
        self.calls.lock().unwrap().push(format!("list-routes {filter}"));
        Ok(self.routes.clone())
    }

    async fn delete_route(&self, name: &str) -> Result<()> {
        self.calls.lock().unwrap().push(format!("delete-route {name}"));
        Ok(())
    }
}

struct StaticCompute(Arc<FakeCompute>);

#[async_trait]
impl ComputeClientFactory for StaticCompute {
    async fn connect(&self, service_account: &str) -> Result<Arc<dyn ComputeClient>> {
        assert_eq!(service_account, "c2VjcmV0");
        let client: Arc<dyn ComputeClient> = self.0.clone();
        Ok(client)
    }
}

fn cluster(finalizers: &[&str]) -> Cluster {
    Cluster {
        metadata: ObjectMeta {
            name: Some("abc".into()),
            finalizers: Some(finalizers.iter().map(|f| f.to_string()).collect()),
            deletion_timestamp: Some(Time(Utc::now())),
            ..Default::default()
        },
        spec: ClusterSpec {
            cloud: CloudSpec {
                gcp: Some(GCPCloudSpec {
                    service_account: "c2VjcmV0".into(),
                    ..Default::default()
                }),
                ..Default::default()
            },
            cluster_network: ClusterNetworkingConfig {
                pods: NetworkRanges {
                    cidr_blocks: vec!["172.25.0.0/16".into()],
                },
                ..Default::default()
            },
            ..Default::default()
        },
    }
}

fn route(name: &str, dest_range: &str, next_hop_gone: bool) -> Route {
    Route {
        name: name.into(),
        dest_range: dest_range.into(),
        warnings: if next_hop_gone {
            vec![RouteWarning {
                code: "NEXT_HOP_INSTANCE_NOT_FOUND".into(),
                message: String::new(),
            }]
        } else {
            Vec::new()
        },
        ..Default::default()
    }
}

fn provider(seed: &Arc<FakeObjectClient>, compute: &Arc<FakeCompute>) -> GcpCloudProvider {
    GcpCloudProvider::new(
        seed.clone(),
        Arc::new(StaticCompute(compute.clone())),
        RetryConfig {
            initial_delay: std::time::Duration::from_millis(1),
            jitter: 0.0,
            ..Default::default()
        },
    )
}

#[tokio::test]
async fn test_firewalls_and_routes_are_cleaned_up() {
    let mut abc = cluster(&[
        GCP_FIREWALL_SELF_CLEANUP_FINALIZER,
        GCP_FIREWALL_ICMP_CLEANUP_FINALIZER,
        GCP_FIREWALL_NODEPORT_CLEANUP_FINALIZER,
        GCP_ROUTES_CLEANUP_FINALIZER,
        "other.io/keep",
    ]);
    let seed = Arc::new(FakeObjectClient::new());
    seed.add(&abc);
    let compute = Arc::new(FakeCompute {
        routes: vec![
            route("orphan", "172.25.3.0/24", true),
            route("alive", "172.25.4.0/24", false),
            route("foreign", "10.0.0.0/24", true),
        ],
        missing_firewalls: vec!["firewall-abc-icmp".into()],
        ..Default::default()
    });

    provider(&seed, &compute)
        .clean_up_cloud_provider(&mut abc)
        .await
        .unwrap();

    assert_eq!(
        compute.calls(),
        vec![
            "delete-firewall firewall-abc-self".to_string(),
            "delete-firewall firewall-abc-icmp".to_string(),
            "delete-firewall firewall-abc-nodeport".to_string(),
            format!(
                "list-routes {}",
                routes::route_filter(
                    "https://www.googleapis.com/compute/v1/projects/my-project/global/networks/default"
                )
            ),
            "delete-route orphan".to_string(),
        ]
    );
    let stored: Cluster = seed.stored(None, "abc").unwrap();
    assert_eq!(stored.finalizers(), ["other.io/keep".to_string()]);
    assert_eq!(abc.finalizers(), stored.finalizers());
}

#[tokio::test]
async fn test_only_pending_firewalls_are_deleted() {
    let mut abc = cluster(&[GCP_FIREWALL_NODEPORT_CLEANUP_FINALIZER]);
    let seed = Arc::new(FakeObjectClient::new());
    seed.add(&abc);
    let compute = Arc::new(FakeCompute::default());

    provider(&seed, &compute)
        .clean_up_cloud_provider(&mut abc)
        .await
        .unwrap();

    assert_eq!(compute.calls(), vec!["delete-firewall firewall-abc-nodeport"]);
    assert!(abc.finalizers().is_empty());
}

#[tokio::test]
async fn test_failed_firewall_delete_keeps_finalizer() {
    let mut abc = cluster(&[
        GCP_FIREWALL_SELF_CLEANUP_FINALIZER,
        GCP_ROUTES_CLEANUP_FINALIZER,
    ]);
    let seed = Arc::new(FakeObjectClient::new());
    seed.add(&abc);
    let compute = Arc::new(FakeCompute {
        fail_firewalls: true,
        ..Default::default()
    });

    let err = provider(&seed, &compute)
        .clean_up_cloud_provider(&mut abc)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("firewall-abc-self"));
    let stored: Cluster = seed.stored(None, "abc").unwrap();
    assert_eq!(stored.finalizers().len(), 2);
}

#[tokio::test]
async fn test_nothing_to_do_without_gcp_finalizers() {
    let mut abc = cluster(&["other.io/keep"]);
    abc.spec.cloud.gcp = None;
    let seed = Arc::new(FakeObjectClient::new());
    let compute = Arc::new(FakeCompute::default());

    provider(&seed, &compute)
        .clean_up_cloud_provider(&mut abc)
        .await
        .unwrap();

    assert!(compute.calls().is_empty());
    assert!(seed.calls().is_empty());
}

#[tokio::test]
async fn test_unparseable_route_is_skipped() {
    let mut abc = cluster(&[GCP_ROUTES_CLEANUP_FINALIZER]);
    abc.spec.cloud.gcp.as_mut().unwrap().network = "global/networks/custom".into();
    let seed = Arc::new(FakeObjectClient::new());
    seed.add(&abc);
    let compute = Arc::new(FakeCompute {
        routes: vec![
            route("broken", "not-a-cidr", true),
            route("orphan", "172.25.9.0/24", true),
        ],
        ..Default::default()
    });

    provider(&seed, &compute)
        .clean_up_cloud_provider(&mut abc)
        .await
        .unwrap();

    let calls = compute.calls();
    assert!(calls[0].contains("projects/my-project/global/networks/custom.*"));
    assert_eq!(calls[1..], ["delete-route orphan".to_string()]);
    assert!(abc.finalizers().is_empty());
}
