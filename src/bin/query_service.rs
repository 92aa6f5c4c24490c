//! `query-service` — answers retrieval-augmented questions over the
//! vector index maintained by `update-service`.

use std::sync::Arc;

use ragsync::config::Config;
use ragsync::http::query::{router, QueryState};
use ragsync::query_processor::QueryProcessor;
use ragsync::state::Services;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    tracing::info!(
        service = ragsync::NAME,
        version = ragsync::VERSION,
        "starting query-service"
    );

    let config = Config::from_env()?;
    let services = Services::connect(&config).await?;

    let processor = Arc::new(QueryProcessor::new(
        services.vector_store.clone(),
        services.embedder.clone(),
        services.llm.clone(),
        services.cache.clone(),
        std::time::Duration::from_secs(config.cache_ttl),
    ));

    let app = router(QueryState {
        processor,
        collection_name: config.qdrant_collection_name.clone(),
    });
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.service_port)).await?;
    tracing::info!(port = config.service_port, "query-service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    services.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
