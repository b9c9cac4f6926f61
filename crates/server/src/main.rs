use anyhow::Context;
use log::{error, info, warn};
use rag_core::config::SessionBackend;
use rag_core::Config;
use server::{create_app, RagService};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const MAX_PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG wins; otherwise default to info
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting pdf-rag server");

    let config = Config::load_from_env().context("Failed to load configuration")?;
    let server_cfg = config.server.with_env_overrides();
    let session_cfg = config.session.clone();

    let service = Arc::new(
        RagService::from_config(config)
            .await
            .context("Failed to initialize RAG service")?,
    );

    info!("Loading documents from configured directory...");
    match service.load_documents().await {
        Ok(count) => info!("Loaded {} documents", count),
        Err(e) => {
            warn!("Failed to load documents: {:#}", e);
            warn!("Server will continue without pre-loaded documents");
        }
    }

    if let (SessionBackend::Memory, Some(ttl)) = (session_cfg.backend, session_cfg.ttl_seconds) {
        let period = Duration::from_secs(ttl.max(1)).min(MAX_PURGE_INTERVAL);
        let service = service.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                match service.purge_expired_sessions().await {
                    Ok(0) => {}
                    Ok(purged) => info!("Purged {} expired sessions", purged),
                    Err(e) => warn!("Session purge failed: {}", e),
                }
            }
        });
    }

    let app = create_app(service, server_cfg.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&server_cfg.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", server_cfg.bind_addr))?;

    info!("Server running on http://{}", server_cfg.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, stopping server...");
}
