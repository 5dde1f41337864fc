use anyhow::Context;
use clap::Parser;
use hcs_calculator::config::load_calculator;
use hcs_core::{ComputeNodeStore, KubeStore};
use hcs_extender::plugin::ComputePlugin;
use hcs_extender::reservation::ReservationTable;
use hcs_extender::server::serve;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "hcs-extender",
    about = "Compute-aware scheduling extender for heterogeneous accelerators"
)]
struct ExtenderCli {
    /// Address the HTTP surface binds to
    #[arg(long, default_value = "0.0.0.0:8888")]
    bind_address: SocketAddr,
    /// Optional hardware profile override file (TOML)
    #[arg(long, env = "HCS_PROFILE_CONFIG")]
    profile_config: Option<PathBuf>,
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

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = ExtenderCli::parse();
    init_tracing(cli.verbose);

    let calculator = load_calculator(cli.profile_config.as_deref())
        .context("loading hardware profiles")?;
    info!(base = %calculator.base_model(), "calculator ready");

    let client = kube::Client::try_default()
        .await
        .context("building Kubernetes client")?;
    let store: Arc<dyn ComputeNodeStore> = Arc::new(KubeStore::new(client));

    let plugin = Arc::new(ComputePlugin::new(
        store,
        Arc::new(calculator),
        Arc::new(ReservationTable::new()),
    ));

    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    serve(plugin, cli.bind_address, async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("SIGINT received"),
            _ = sigterm.recv() => info!("SIGTERM received"),
        }
    })
    .await
    .context("serving extender")?;
    Ok(())
}
