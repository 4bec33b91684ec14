use anyhow::Context;
use std::sync::Arc;
use tracing::{info, warn};

use salone_assist::agent::AssistantClient;
use salone_assist::config::Config;
use salone_assist::entity::HeaderIdentity;
use salone_assist::server::{self, AppState};
use salone_assist::store::Store;
use salone_assist::{Gateway, Playbook};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before the filter so RUST_LOG from the file applies
    let dotenv = dotenvy::dotenv();

    // Initialize logging with default filter if RUST_LOG is not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    if let Err(e) = dotenv {
        info!("No .env file found or failed to load: {}", e);
    }

    info!("Salone assistant gateway starting...");

    let config = Config::from_env()?;

    info!("Initializing store at {}", config.database_path.display());
    let store = Store::new(&config.database_path).await?;
    store.init().await?;

    let playbook = match &config.playbook_path {
        Some(path) => Playbook::from_json_file(path)
            .with_context(|| format!("Failed to load playbook from {}", path.display()))?,
        None => Playbook::builtin(),
    };
    info!("Using playbook version {}", playbook.version);

    if config.assistant_endpoint.is_none() {
        warn!("ASSISTANT_ENDPOINT_URL is not set, every reply will use fallback copy");
    }
    let client = AssistantClient::new(config.assistant_endpoint.clone(), config.retry)?;

    let gateway = Gateway::new(playbook, store, Arc::new(client))
        .with_request_budget(config.request_budget);
    let identity = Arc::new(HeaderIdentity::new(config.identity_header.as_str()));
    let app = server::router(Arc::new(AppState::new(gateway, identity)));

    info!("Starting chat gateway on port {}", config.port);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        res = axum::serve(listener, app) => {
            if let Err(e) = res {
                warn!("Server stopped with error: {}", e);
            }
        }
    }

    Ok(())
}
