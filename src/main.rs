//! rtmp-relay binary entry point.
//!
//! Usage:
//! ```bash
//! rtmp-relay --config relay.yaml
//! RUST_LOG=rtmp_relay=debug rtmp-relay --config relay.yaml
//! rtmp-relay --help
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use rtmp_relay::{Config, Relay};

#[derive(Parser, Debug)]
#[command(name = "rtmp-relay")]
#[command(version, about = "Configurable RTMP relay daemon", long_about = None)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run in the background (handled by the process supervisor)
    #[arg(long)]
    daemon: bool,

    /// Stop a running background instance (handled by the process supervisor)
    #[arg(long)]
    kill_daemon: bool,

    /// Ask a running instance to reload its configuration (handled by the process supervisor)
    #[arg(long)]
    reload_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.daemon || args.kill_daemon || args.reload_config {
        init_logging(&Config::default());
        info!(
            daemon = args.daemon,
            kill_daemon = args.kill_daemon,
            reload_config = args.reload_config,
            "Daemon control is delegated to the process supervisor, nothing to do"
        );
        return Ok(());
    }

    let path = args
        .config
        .context("no configuration file given, pass --config <PATH>")?;
    let config = Config::from_file(&path)
        .with_context(|| format!("failed to load {}", path.display()))?;

    init_logging(&config);
    info!(config = %path.display(), "rtmp-relay v{} starting", env!("CARGO_PKG_VERSION"));

    let relay = Relay::new(config)?;
    let signal = CancellationToken::new();
    tokio::spawn(forward_signals(signal.clone()));

    let result = relay.run(signal).await;
    relay.close();
    result?;

    info!("rtmp-relay stopped");
    Ok(())
}

fn init_logging(config: &Config) {
    // RUST_LOG wins over the configured level
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::default().add_directive(config.log.level_filter().into())
    });

    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .init();
}

/// Cancel `token` on the first termination signal
async fn forward_signals(token: CancellationToken) {
    match wait_for_signal().await {
        Ok(()) => {
            info!("Termination signal received");
            token.cancel();
        }
        Err(e) => tracing::error!(error = %e, "Failed to install signal handlers"),
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;
    let mut quit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = interrupt.recv() => {}
        _ = terminate.recv() => {}
        _ = hangup.recv() => {}
        _ = quit.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
