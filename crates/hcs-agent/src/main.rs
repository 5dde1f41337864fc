use anyhow::Context;
use clap::Parser;
use hcs_agent::{Agent, AgentConfig};
use hcs_core::{ComputeNodeStore, KubeStore};
use hcs_detector::{DetectorRegistry, MockDetector};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "hcs-agent",
    about = "Per-node hardware inventory agent for the heterogeneous compute scheduler"
)]
struct AgentCli {
    /// Name of the node this agent runs on
    #[arg(long, env = "NODE_NAME")]
    node_name: String,
    /// Seconds between hardware collections
    #[arg(long, default_value_t = 30)]
    collect_interval_secs: u64,
    /// Seconds between node record reports
    #[arg(long, default_value_t = 60)]
    report_interval_secs: u64,
    /// Use the mock detector instead of probing real hardware
    #[arg(long)]
    mock: bool,
    /// The verbosity level, can be used multiple times to increase verbosity
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_registry() -> DetectorRegistry {
    let mut registry = DetectorRegistry::new();
    #[cfg(feature = "nvml")]
    match hcs_detector::NvmlDetector::init() {
        Ok(probe) => registry.register(Arc::new(probe)),
        Err(e) => tracing::warn!(error = %e, "NVML unavailable"),
    }
    registry.register(Arc::new(MockDetector::default()));
    registry
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = AgentCli::parse();
    init_tracing(cli.verbose);

    let registry = build_registry();
    let detector = registry.select(cli.mock).await;

    let client = kube::Client::try_default()
        .await
        .context("building Kubernetes client")?;
    let store: Arc<dyn ComputeNodeStore> = Arc::new(KubeStore::new(client));

    let config = AgentConfig {
        node_name: cli.node_name,
        collect_interval: Duration::from_secs(cli.collect_interval_secs),
        report_interval: Duration::from_secs(cli.report_interval_secs),
    };
    let agent = Arc::new(Agent::new(config, detector, store));
    agent.start().await;

    // The kubelet terminates pods with SIGTERM; SIGINT covers local runs.
    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("SIGINT received"),
        _ = sigterm.recv() => info!("SIGTERM received"),
    }
    agent.stop().await?;
    Ok(())
}
