use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use cluster_deletion::client::{KubeObjectClient, KubeconfigClientProvider, ObjectClient};
use cluster_deletion::controller::{
    self, ControllerState, Deletion, DeletionConfig, DeletionMetrics, Teardown,
};
use cluster_deletion::crd::ProviderKind;
use cluster_deletion::provider::gcp::{GcpCloudProvider, RestComputeClientFactory};
use cluster_deletion::provider::CloudProvider;
use cluster_deletion::Error;
use prometheus_client::registry::Registry;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the controller
    Run(RunArgs),
    /// Show version information
    Version,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Seed namespace holding the provider credential Secrets
    #[arg(long, env = "KUBERMATIC_NAMESPACE", default_value = "kubermatic")]
    kubermatic_namespace: String,

    /// Listen address of the health and metrics server
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8085")]
    metrics_addr: SocketAddr,

    /// Requeue interval while a cluster still has finalizers
    #[arg(long, env = "REQUEUE_AFTER_SECS", default_value_t = 10)]
    requeue_after_secs: u64,

    /// How long to wait for LoadBalancer deletion events
    #[arg(long, env = "LB_GRACE_PERIOD_SECS", default_value_t = 7200)]
    lb_grace_period_secs: u64,

    /// Providers whose LoadBalancer deletion is confirmed by an Event
    #[arg(
        long,
        env = "EVENT_CONFIRMED_PROVIDERS",
        value_delimiter = ',',
        default_value = "aws,azure,openstack"
    )]
    event_confirmed_providers: Vec<ProviderKind>,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

impl RunArgs {
    fn deletion_config(&self) -> DeletionConfig {
        DeletionConfig {
            credentials_namespace: self.kubermatic_namespace.clone(),
            lb_grace_period: Duration::from_secs(self.lb_grace_period_secs),
            event_confirmed_providers: self.event_confirmed_providers.clone(),
            requeue_after: Duration::from_secs(self.requeue_after_secs),
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    match args.command {
        Commands::Version => {
            println!("cluster-deletion controller v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Run(run_args) => run_controller(run_args).await,
    }
}

fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();
    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Text => registry.with(fmt::layer().with_target(true)).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

async fn run_controller(args: RunArgs) -> Result<(), Error> {
    init_tracing(args.log_format);

    info!(
        "Starting cluster deletion controller v{}",
        env!("CARGO_PKG_VERSION")
    );

    let client = kube::Client::try_default()
        .await
        .map_err(Error::KubeError)?;
    info!("Connected to Kubernetes cluster");

    let seed: Arc<dyn ObjectClient> = Arc::new(KubeObjectClient::new(client.clone()));
    let metrics = DeletionMetrics::new();
    let mut registry = Registry::default();
    metrics.register(&mut registry);

    let config = args.deletion_config();
    let gcp: Arc<dyn CloudProvider> = Arc::new(GcpCloudProvider::new(
        seed.clone(),
        Arc::new(RestComputeClientFactory::default()),
        config.conflict_retry.clone(),
    ));
    let deletion = Deletion::new(
        seed.clone(),
        Arc::new(KubeconfigClientProvider::new(seed)),
        Arc::new(metrics.clone()),
        config,
    );

    let state = Arc::new(ControllerState {
        client,
        teardown: Teardown::new(deletion, Some(gcp)),
        metrics,
    });

    #[cfg(feature = "rest-api")]
    {
        let registry = Arc::new(registry);
        let addr = args.metrics_addr;
        tokio::spawn(async move {
            if let Err(e) = cluster_deletion::rest_api::run_server(addr, registry).await {
                tracing::error!("Metrics server error: {:?}", e);
            }
        });
    }

    controller::run_controller(state).await
}
