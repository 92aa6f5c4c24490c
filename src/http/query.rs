//! HTTP surface for `query-service`: the `/query` endpoint plus the same
//! ambient health/metrics surface as `update-service`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::health::{aggregate, is_ready, timed_check, DependencyHealth};
use crate::metrics::METRICS;
use crate::query_processor::{QueryProcessor, QueryRequest, QueryResponse};

#[derive(Clone)]
pub struct QueryState {
    pub processor: Arc<QueryProcessor>,
    pub collection_name: String,
}

pub fn router(state: QueryState) -> Router {
    Router::new()
        .route("/query", axum::routing::post(query))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(prometheus_metrics))
        .route("/api/metrics", get(json_metrics))
        .route("/collections", get(collections))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct QueryBody {
    query: String,
    #[serde(default = "default_top_k")]
    top_k: usize,
    #[serde(default = "default_page")]
    page: usize,
    #[serde(default = "default_page_size")]
    page_size: usize,
}

fn default_top_k() -> usize {
    5
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    10
}

#[derive(Debug, Serialize)]
struct QueryResult {
    #[serde(flatten)]
    response: QueryResponse,
    latency_ms: u128,
}

async fn query(
    State(state): State<QueryState>,
    Json(body): Json<QueryBody>,
) -> Result<Json<QueryResult>, AppError> {
    if body.query.trim().is_empty() {
        return Err(AppError::BadRequest("query must not be empty".to_string()));
    }

    METRICS.queries_total.inc();
    let started = Instant::now();

    let request = QueryRequest {
        query: body.query,
        top_k: body.top_k,
        page: body.page,
        page_size: body.page_size,
    };

    let result = state.processor.process_query(&request).await;
    let elapsed = started.elapsed();

    match result {
        Ok(response) => {
            METRICS.query_latency_seconds.observe(elapsed.as_secs_f64());
            METRICS.record_sample("query_latency_seconds", elapsed.as_secs_f64());
            Ok(Json(QueryResult {
                response,
                latency_ms: elapsed.as_millis(),
            }))
        }
        Err(err) => {
            METRICS.query_errors_total.inc();
            Err(AppError::QueryFailed(Box::new(err)))
        }
    }
}

async fn dependency_checks(state: &QueryState) -> BTreeMap<String, DependencyHealth> {
    let mut deps = BTreeMap::new();
    let processor = state.processor.clone();
    deps.insert(
        "vector_store".to_string(),
        timed_check(|| async move {
            processor
                .vector_store
                .ensure_collection()
                .await
                .map_err(|e| e.to_string())
        })
        .await,
    );

    let processor = state.processor.clone();
    deps.insert(
        "cache".to_string(),
        timed_check(|| async move {
            processor.cache.get("health-check-probe").await;
            Ok(())
        })
        .await,
    );

    let processor = state.processor.clone();
    deps.insert(
        "llm".to_string(),
        timed_check(|| async move { processor.llm.health_check().await.map_err(|e| e.to_string()) })
            .await,
    );

    deps
}

async fn health(State(state): State<QueryState>) -> Json<Value> {
    let deps = dependency_checks(&state).await;
    let report = aggregate(deps);
    Json(serde_json::to_value(report).unwrap())
}

async fn ready(State(state): State<QueryState>) -> Json<Value> {
    let deps = dependency_checks(&state).await;
    let ready = is_ready(&deps);
    Json(json!({ "ready": ready, "dependencies": deps }))
}

async fn prometheus_metrics() -> String {
    METRICS.render()
}

async fn json_metrics() -> Json<Value> {
    Json(json!({
        "queries_total": METRICS.queries_total.get(),
        "query_errors_total": METRICS.query_errors_total.get(),
        "recent_query_latency_seconds": METRICS.recent_samples("query_latency_seconds", 10),
    }))
}

async fn collections(State(state): State<QueryState>) -> Json<Value> {
    Json(json!({ "collection": state.collection_name }))
}
