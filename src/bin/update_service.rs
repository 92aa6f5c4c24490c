//! `update-service` — consumes CDC events and keeps the vector index
//! consistent with the `documents` relational table.

use std::sync::Arc;

use ragsync::config::Config;
use ragsync::consumer;
use ragsync::event_processor::EventProcessor;
use ragsync::http::update::{router, UpdateState};
use ragsync::retry::RetryPolicy;
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
        "starting update-service"
    );

    let config = Config::from_env()?;
    let services = Arc::new(Services::connect(&config).await?);

    let retry_policy = RetryPolicy {
        max_attempts: config.max_retries,
        initial_delay: config.retry_delay,
        multiplier: config.retry_backoff_multiplier,
    };
    let processor = Arc::new(EventProcessor::new(
        services.vector_store.clone(),
        services.embedder.clone(),
        services.cache.clone(),
        ragsync::chunking::ChunkParams {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
        },
        retry_policy,
    ));

    let kafka_consumer = consumer::build_consumer(
        &config.kafka_bootstrap_servers,
        &config.kafka_topic_documents,
    )?;
    let dlq = services.dlq.clone();
    let topic = config.kafka_topic_documents.clone();
    let consumer_processor = processor.clone();
    let consumer_task = tokio::spawn(async move {
        consumer::run(kafka_consumer, consumer_processor, dlq, topic).await;
    });

    let app = router(UpdateState {
        services: services.clone(),
        processor,
        kafka_bootstrap_servers: config.kafka_bootstrap_servers.clone(),
    });
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.service_port)).await?;
    tracing::info!(port = config.service_port, "update-service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    consumer_task.abort();
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
