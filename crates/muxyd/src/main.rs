//! muxyd — the protocol-multiplexing reverse proxy daemon.
//!
//! Loads matcher and listener configuration, starts one accept loop
//! per listener, and runs until killed. There is no graceful shutdown:
//! a Ctrl-C exits the process immediately, dropping every in-flight
//! connection.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "muxyd", about = "Protocol-multiplexing reverse proxy")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load configuration and start every listener.
    Serve {
        /// Path to the matcher configuration JSON file.
        #[arg(long)]
        protocols: std::path::PathBuf,

        /// Path to the listener configuration JSON file.
        #[arg(long)]
        listeners: std::path::PathBuf,

        /// Override every listener's protocol-discovery timeout, in
        /// seconds. Useful for manual testing; the per-listener JSON
        /// value is otherwise authoritative.
        #[arg(long)]
        discovery_timeout_override: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,muxyd=debug,muxy_proxy=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            protocols,
            listeners,
            discovery_timeout_override,
        } => serve(protocols, listeners, discovery_timeout_override).await,
    }
}

async fn serve(
    protocols_path: std::path::PathBuf,
    listeners_path: std::path::PathBuf,
    discovery_timeout_override: Option<f64>,
) -> anyhow::Result<()> {
    let protocols = muxy_config::matchers::load(&protocols_path)?;
    info!(path = ?protocols_path, count = protocols.matchers().len(), "matcher configuration loaded");

    let mut materialized = muxy_config::listeners::load(&listeners_path, &protocols)?;
    info!(path = ?listeners_path, count = materialized.len(), "listener configuration loaded");

    if let Some(seconds) = discovery_timeout_override {
        let override_duration = std::time::Duration::from_secs_f64(seconds.max(0.0));
        for entry in &mut materialized {
            entry.config.discovery_timeout = override_duration;
        }
        info!(seconds, "protocol-discovery timeout overridden for every listener");
    }

    let mut tasks = Vec::new();
    for entry in materialized {
        let listener = Arc::new(entry.config);
        let tls_acceptor = entry.tls_acceptor;
        let tls_connector = muxy_config::tls::build_connector();
        let tag = muxy_core::ids::tag(listener.id);

        tasks.push(tokio::spawn(async move {
            if let Err(e) = muxy_proxy::listener::run(listener, tls_acceptor, tls_connector).await {
                error!(%tag, error = %e, "listener stopped");
            }
        }));
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received, exiting immediately");
        }
        _ = wait_for_all_listeners(tasks) => {
            info!("every listener has stopped");
        }
    }

    Ok(())
}

async fn wait_for_all_listeners(tasks: Vec<tokio::task::JoinHandle<()>>) {
    for task in tasks {
        let _ = task.await;
    }
}
