// crates/babel-daemon/src/main.rs
//
// Binary entrypoint for the Babel Protocol daemon.
//
// Parses CLI arguments, loads configuration, initializes tracing, wires the
// store, analysis client, event hub, and Consensus Manager together, then
// serves the WebSocket gateway until ctrl-c. Pending batch items are flushed
// before exit.

mod config;
mod gateway;

use std::sync::Arc;

use clap::Parser;
use config::DaemonConfig;
use gateway::Gateway;

use babel_consensus::{ConsensusManager, HttpAnalysisClient};
use babel_hub::EventHub;
use babel_store::InMemoryStore;

/// Babel Protocol daemon: consensus scoring with real-time event delivery.
#[derive(Parser, Debug)]
#[command(name = "babel-daemon", version = "0.1.0", about = "Babel Protocol consensus daemon")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "~/.babel/config.toml")]
    config: String,

    /// Address for the WebSocket gateway (overrides ws_host/ws_port).
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load before tracing is up so the configured log level can apply; the
    // outcome is logged right after.
    let config_path = expand_tilde(&args.config);
    let loaded = DaemonConfig::load(&config_path);
    let daemon_config = match &loaded {
        Ok(cfg) => cfg.clone(),
        Err(_) => DaemonConfig::default(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&daemon_config.log_level)),
        )
        .init();

    match loaded {
        Ok(_) => tracing::info!("Loaded configuration from {}", config_path),
        Err(e) => tracing::warn!(
            "Could not load config from {}: {}. Using defaults.",
            config_path,
            e
        ),
    }

    let listen_addr = args.listen.unwrap_or_else(|| daemon_config.listen_addr());

    tracing::info!("Babel Protocol Daemon v0.1.0");
    tracing::info!("Analysis service: {}", daemon_config.analysis_url);
    tracing::info!(
        "Batch policy: quiescence {}ms, max delay {}ms, max {} items",
        daemon_config.batch_quiescence_ms,
        daemon_config.batch_max_delay_ms,
        daemon_config.batch_max_items
    );

    let store = Arc::new(InMemoryStore::new());
    let analysis = Arc::new(HttpAnalysisClient::new(
        daemon_config.analysis_url.clone(),
        daemon_config.analysis_timeout(),
    ));
    let (hub, hub_task) = EventHub::spawn(daemon_config.hub_config());

    let manager = Arc::new(ConsensusManager::new(
        store.clone(),
        analysis,
        Arc::new(hub.clone()),
        daemon_config.manager_config(),
    ));
    let background = manager.spawn_background();

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!("WebSocket gateway listening on ws://{}", listen_addr);
    let gateway = Arc::new(Gateway::new(manager.clone(), hub, store));

    tokio::select! {
        result = gateway.serve(listener) => {
            if let Err(e) = result {
                tracing::error!("Gateway error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
        }
    }

    // Stop the batch loop before draining so nothing is processed twice.
    for task in background {
        task.abort();
    }
    match manager.flush().await {
        Ok(0) => {}
        Ok(n) => tracing::info!("Flushed {} pending items", n),
        Err(e) => tracing::warn!("Final flush failed: {}", e),
    }
    hub_task.abort();

    tracing::info!("Babel daemon shut down gracefully");
    Ok(())
}

/// Expand `~` at the start of a path to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return format!("{}/{}", home.display(), rest);
        }
    }
    path.to_string()
}
