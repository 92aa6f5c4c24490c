//! HTTP surface for `update-service`: health/metrics plus document CRUD
//! and a manual event-injection endpoint, composed the way the teacher's
//! `api::routes` nests route groups behind one top-level router.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::consumer::check_event_bus;
use crate::documents::{Document, DocumentPatch, NewDocument};
use crate::error::AppError;
use crate::event_processor::EventProcessor;
use crate::health::{aggregate, is_ready, timed_check, DependencyHealth, Status};
use crate::metrics::METRICS;
use crate::state::Services;

#[derive(Clone)]
pub struct UpdateState {
    pub services: Arc<Services>,
    pub processor: Arc<EventProcessor>,
    pub kafka_bootstrap_servers: String,
}

pub fn router(state: UpdateState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(prometheus_metrics))
        .route("/api/metrics", get(json_metrics))
        .route("/api/pipeline/status", get(pipeline_status))
        .route("/process-event", post(process_event))
        .route("/api/documents", get(list_documents).post(create_document))
        .route(
            "/api/documents/:id",
            get(get_document).put(update_document).delete(delete_document),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn dependency_checks(state: &UpdateState) -> BTreeMap<String, DependencyHealth> {
    let mut deps = BTreeMap::new();
    let vector_store = state.services.vector_store.clone();
    deps.insert(
        "vector_store".to_string(),
        timed_check(|| async move {
            vector_store
                .ensure_collection()
                .await
                .map_err(|e| e.to_string())
        })
        .await,
    );

    let cache = state.services.cache.clone();
    deps.insert(
        "cache".to_string(),
        timed_check(|| async move {
            cache.get("health-check-probe").await;
            Ok(())
        })
        .await,
    );

    let documents = state.services.documents.clone();
    deps.insert(
        "postgres".to_string(),
        timed_check(|| async move { documents.ping().await.map_err(|e| e.to_string()) }).await,
    );

    deps.insert(
        "dlq".to_string(),
        if state.services.dlq_enabled {
            DependencyHealth {
                status: Status::Healthy,
                latency_ms: 0,
                error: None,
            }
        } else {
            DependencyHealth {
                status: Status::NotConfigured,
                latency_ms: 0,
                error: None,
            }
        },
    );

    let bootstrap_servers = state.kafka_bootstrap_servers.clone();
    deps.insert(
        "event_bus".to_string(),
        timed_check(|| async move {
            check_event_bus(&bootstrap_servers)
                .await
                .map_err(|e| e.to_string())
        })
        .await,
    );

    deps
}

async fn health(State(state): State<UpdateState>) -> Json<Value> {
    let deps = dependency_checks(&state).await;
    let report = aggregate(deps);
    Json(serde_json::to_value(report).unwrap())
}

async fn ready(State(state): State<UpdateState>) -> Json<Value> {
    let deps = dependency_checks(&state).await;
    let ready = is_ready(&deps);
    Json(json!({ "ready": ready, "dependencies": deps }))
}

async fn prometheus_metrics() -> String {
    METRICS.render()
}

async fn json_metrics() -> Json<Value> {
    Json(json!({
        "updates_total": METRICS.updates_total.get(),
        "update_errors_total": METRICS.update_errors_total.get(),
        "recent_processing_duration_seconds": METRICS.recent_samples("update_processing_duration_seconds", 10),
        "recent_lag_seconds": METRICS.recent_samples("update_lag_seconds", 10),
    }))
}

async fn pipeline_status() -> Json<Value> {
    Json(serde_json::to_value(METRICS.pipeline_status()).unwrap())
}

async fn process_event(
    State(state): State<UpdateState>,
    Json(event): Json<Value>,
) -> Result<StatusCode, AppError> {
    state.processor.process_event(&event).await?;
    Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
struct ListParams {
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

fn default_limit() -> i64 {
    20
}

async fn list_documents(
    State(state): State<UpdateState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>, AppError> {
    let documents = state
        .services
        .documents
        .list_documents(params.limit, params.offset)
        .await?;
    let total = state.services.documents.count_documents().await?;
    Ok(Json(json!({ "documents": documents, "total": total })))
}

async fn get_document(
    State(state): State<UpdateState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Document>, AppError> {
    let document = state.services.documents.get_document(id).await?;
    Ok(Json(document))
}

async fn create_document(
    State(state): State<UpdateState>,
    Json(new): Json<NewDocument>,
) -> Result<(StatusCode, Json<Document>), AppError> {
    let document = state.services.documents.create_document(new).await?;
    Ok((StatusCode::CREATED, Json(document)))
}

async fn update_document(
    State(state): State<UpdateState>,
    Path(id): Path<Uuid>,
    Json(patch): Json<DocumentPatch>,
) -> Result<Json<Document>, AppError> {
    let document = state.services.documents.update_document(id, patch).await?;
    Ok(Json(document))
}

async fn delete_document(
    State(state): State<UpdateState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.services.documents.delete_document(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
