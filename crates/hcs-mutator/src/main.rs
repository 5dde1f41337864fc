use anyhow::Context;
use clap::Parser;
use hcs_core::Vendor;
use hcs_mutator::profile::ProfileRegistry;
use hcs_mutator::quota::QuotaConfig;
use hcs_mutator::server::{MutatorState, build_router};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "hcs-mutator",
    about = "Pod-mutating admission hook for heterogeneous accelerators"
)]
struct MutatorCli {
    /// Address the HTTP surface binds to (TLS terminates in front of it)
    #[arg(long, default_value = "0.0.0.0:9443")]
    bind_address: SocketAddr,
    /// Vendor assumed when nothing else resolves one
    #[arg(long, env = "HCS_DEFAULT_VENDOR")]
    default_vendor: Option<String>,
    /// Optional vendor profile override file (TOML)
    #[arg(long, env = "HCS_PROFILE_OVERRIDES")]
    profile_overrides: Option<PathBuf>,
    /// Container path of the VRAM interceptor library
    #[arg(long, default_value = "/opt/hcs/lib/libhcs-vram-interceptor.so")]
    interceptor_path: String,
    /// Host directory holding the shim library
    #[arg(long, default_value = "/opt/hcs/lib")]
    shim_host_dir: String,
    /// Container names never to inject (repeatable)
    #[arg(long = "skip-container")]
    skip_containers: Vec<String>,
    /// Run without a Kubernetes client (node-label resolution disabled)
    #[arg(long)]
    no_kube: bool,
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
    let cli = MutatorCli::parse();
    init_tracing(cli.verbose);

    let registry = Arc::new(ProfileRegistry::with_defaults());
    if let Some(path) = &cli.profile_overrides {
        let count = registry
            .apply_file(path)
            .with_context(|| format!("loading profile overrides from {}", path.display()))?;
        info!(count, path = %path.display(), "profile overrides applied");
    }

    let client = if cli.no_kube {
        None
    } else {
        match kube::Client::try_default().await {
            Ok(client) => Some(client),
            Err(e) => {
                warn!(error = %e, "no Kubernetes client, node-label vendor resolution disabled");
                None
            }
        }
    };

    let state = Arc::new(MutatorState {
        registry,
        quota: QuotaConfig {
            interceptor_path: cli.interceptor_path,
            shim_host_dir: cli.shim_host_dir.clone(),
            shim_mount_path: cli.shim_host_dir,
        },
        default_vendor: cli.default_vendor.as_deref().map(Vendor::from),
        skip_containers: cli.skip_containers,
        client,
    });
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(cli.bind_address)
        .await
        .with_context(|| format!("binding {}", cli.bind_address))?;
    info!(addr = %cli.bind_address, "mutator listening");

    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("SIGINT received"),
                _ = sigterm.recv() => info!("SIGTERM received"),
            }
        })
        .await
        .context("serving mutator")?;
    Ok(())
}
