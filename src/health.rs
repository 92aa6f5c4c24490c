//! # Health and readiness checks
//!
//! Probes each external collaborator independently and reports latency
//! alongside status, so `/health` and `/ready` can aggregate without
//! re-deriving per-dependency detail.

use std::time::Instant;

use serde::{Deserialize, Serialize};

/// The status of a single dependency probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Healthy,
    Unhealthy,
    NotConfigured,
}

/// The result of probing one dependency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyHealth {
    pub status: Status,
    pub latency_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DependencyHealth {
    pub fn healthy(latency_ms: u128) -> Self {
        Self {
            status: Status::Healthy,
            latency_ms,
            error: None,
        }
    }

    pub fn unhealthy(latency_ms: u128, error: impl Into<String>) -> Self {
        Self {
            status: Status::Unhealthy,
            latency_ms,
            error: Some(error.into()),
        }
    }
}

/// Time an async probe and wrap its outcome as [`DependencyHealth`].
pub async fn timed_check<F, Fut>(probe: F) -> DependencyHealth
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<(), String>>,
{
    let started = Instant::now();
    match probe().await {
        Ok(()) => DependencyHealth::healthy(started.elapsed().as_millis()),
        Err(err) => DependencyHealth::unhealthy(started.elapsed().as_millis(), err),
    }
}

/// Aggregate report across every probed dependency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: Status,
    pub dependencies: std::collections::BTreeMap<String, DependencyHealth>,
}

/// Combine dependency probes into one report. Any `Unhealthy` dependency
/// makes the whole report `Unhealthy`; otherwise `Healthy`.
pub fn aggregate(dependencies: std::collections::BTreeMap<String, DependencyHealth>) -> HealthReport {
    let status = if dependencies
        .values()
        .any(|d| d.status == Status::Unhealthy)
    {
        Status::Unhealthy
    } else {
        Status::Healthy
    };
    HealthReport {
        status,
        dependencies,
    }
}

/// Readiness requires every dependency to be `Healthy` or deliberately
/// `NotConfigured`; only `Unhealthy` blocks it.
pub fn is_ready(dependencies: &std::collections::BTreeMap<String, DependencyHealth>) -> bool {
    dependencies
        .values()
        .all(|d| d.status != Status::Unhealthy)
}
