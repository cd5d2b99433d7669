//! dkvolume-local: directory-backed Docker volume plugin daemon.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use dkvolume::{Config, ListenerConfig, LocalAddr, VolumeHandler};
use dkvolume_local::LocalDriver;

#[derive(Parser, Debug)]
#[command(name = "dkvolume-local")]
#[command(about = "Directory-backed Docker volume plugin")]
struct Args {
    /// Path to a TOML config file. Flags below override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Plugin endpoint (unix:// or tcp://).
    #[arg(long, conflicts_with = "name")]
    endpoint: Option<String>,

    /// Plugin name; serves on <name>.sock in the plugin socket directory.
    #[arg(long)]
    name: Option<String>,

    /// Group owning the plugin socket (name or numeric gid, unix only).
    #[arg(long)]
    group: Option<String>,

    /// Storage root for volume directories.
    #[arg(long)]
    root: Option<PathBuf>,

    /// Verbosity level (0-3).
    #[arg(short, action = clap::ArgAction::Count)]
    v: u8,
}

impl Args {
    fn into_config(self) -> Result<Config> {
        let mut config = match self.config {
            Some(ref path) => Config::load(path)
                .with_context(|| format!("Failed to load config: {}", path.display()))?,
            None => Config::default(),
        };

        // CLI overrides
        if let Some(ref endpoint) = self.endpoint {
            let group = config.listener.group.take();
            config.listener = ListenerConfig::from_endpoint(endpoint)
                .with_context(|| format!("Invalid endpoint: {endpoint}"))?;
            config.listener.group = group;
        }
        if let Some(ref name) = self.name {
            let group = config.listener.group.take();
            config.listener = ListenerConfig::for_plugin(name);
            config.listener.group = group;
        }
        if let Some(group) = self.group {
            config.listener.group = Some(group);
        }
        if let Some(root) = self.root {
            config.root = root;
        }
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Only dkvolume crates get detailed logging; everything else stays at warn.
    let filter = match args.v {
        0 => "dkvolume=info,dkvolume_local=info,warn".to_string(),
        1 => "dkvolume=debug,dkvolume_local=debug,warn".to_string(),
        2 => "dkvolume=trace,dkvolume_local=trace,warn".to_string(),
        _ => "dkvolume=trace,dkvolume_local=trace,info".to_string(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    let config = args.into_config()?;
    std::fs::create_dir_all(&config.root)
        .with_context(|| format!("Failed to create storage root: {}", config.root.display()))?;

    info!(
        transport = %config.listener.transport,
        address = %config.listener.address,
        root = %config.root.display(),
        "starting local volume plugin"
    );

    let handler = VolumeHandler::from_config(&config, LocalDriver::new());
    let (ready_tx, ready_rx) = oneshot::channel::<LocalAddr>();
    let listener_config = config.listener.clone();
    let mut server =
        tokio::spawn(async move { handler.listen_and_serve(&listener_config, Some(ready_tx)).await });

    let bound = match ready_rx.await {
        Ok(addr) => {
            info!(%addr, "volume plugin ready");
            Some(addr)
        }
        // The server failed before binding; its error is reported below.
        Err(_) => None,
    };

    tokio::select! {
        result = &mut server => {
            result
                .context("Server task panicked")?
                .context("Volume plugin server failed")?;
        }
        _ = shutdown_signal() => {
            server.abort();
        }
    }

    if let Some(LocalAddr::Unix(path)) = bound {
        if let Err(e) = std::fs::remove_file(&path) {
            warn!(path = %path.display(), error = %e, "failed to remove plugin socket");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                warn!(error = %e, "failed to register SIGTERM handler");
                let _ = ctrl_c.await;
                info!("Received SIGINT");
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => info!("Received SIGINT"),
            _ = sigterm.recv() => info!("Received SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        info!("Received SIGINT");
    }
}
