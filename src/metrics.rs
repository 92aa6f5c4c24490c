//! # Metrics
//!
//! A `prometheus::Registry` shared by both services, plus a small bounded
//! in-process sample ring so `/api/metrics` can return a lightweight JSON
//! summary without requiring a scrape. This is ambient observability, not
//! a feature — every service in this codebase carries it.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, Opts, Registry, TextEncoder,
};
use serde::Serialize;
use uuid::Uuid;

/// Maximum samples retained per metric in the in-process ring.
const MAX_SAMPLES: usize = 100;

/// Maximum recent update records retained for `/api/pipeline/status`.
const MAX_RECENT_UPDATES: usize = 10;

/// One committed create/update/delete, recorded for pipeline visualization.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineUpdateRecord {
    pub document_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub latency_seconds: f64,
}

/// Response body for `/api/pipeline/status`.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub last_update: Option<DateTime<Utc>>,
    pub recent_updates_count: usize,
    pub recent_updates: Vec<PipelineUpdateRecord>,
    pub total_latency_seconds: f64,
}

/// Process-wide Prometheus registry and named metrics. Built once via
/// [`Lazy`], matching the teacher's static-registry convention for
/// long-lived singletons that aren't part of the explicit dependency
/// struct.
pub static METRICS: Lazy<Metrics> = Lazy::new(Metrics::new);

pub struct Metrics {
    pub registry: Registry,
    pub updates_total: IntCounter,
    pub update_errors_total: IntCounter,
    pub update_lag_seconds: Histogram,
    pub update_processing_duration_seconds: Histogram,
    pub queries_total: IntCounter,
    pub query_errors_total: IntCounter,
    pub query_latency_seconds: Histogram,
    samples: Mutex<std::collections::HashMap<&'static str, VecDeque<f64>>>,
    recent_updates: Mutex<VecDeque<PipelineUpdateRecord>>,
}

impl Metrics {
    fn new() -> Self {
        let registry = Registry::new();

        let updates_total =
            IntCounter::with_opts(Opts::new("rag_updates_total", "Total CDC events processed"))
                .unwrap();
        let update_errors_total = IntCounter::with_opts(Opts::new(
            "rag_update_errors_total",
            "Total CDC events that raised an error",
        ))
        .unwrap();
        let update_lag_seconds = Histogram::with_opts(HistogramOpts::new(
            "rag_update_lag_seconds",
            "Delay between source commit and processing",
        ))
        .unwrap();
        let update_processing_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "rag_update_processing_duration_seconds",
            "Time spent processing one CDC event",
        ))
        .unwrap();
        let queries_total =
            IntCounter::with_opts(Opts::new("rag_queries_total", "Total queries served")).unwrap();
        let query_errors_total = IntCounter::with_opts(Opts::new(
            "rag_query_errors_total",
            "Total queries that raised an error",
        ))
        .unwrap();
        let query_latency_seconds = Histogram::with_opts(HistogramOpts::new(
            "rag_query_latency_seconds",
            "End-to-end query latency",
        ))
        .unwrap();

        for collector in [
            Box::new(updates_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(update_errors_total.clone()),
            Box::new(update_lag_seconds.clone()),
            Box::new(update_processing_duration_seconds.clone()),
            Box::new(queries_total.clone()),
            Box::new(query_errors_total.clone()),
            Box::new(query_latency_seconds.clone()),
        ] {
            registry.register(collector).expect("unique metric names");
        }

        Self {
            registry,
            updates_total,
            update_errors_total,
            update_lag_seconds,
            update_processing_duration_seconds,
            queries_total,
            query_errors_total,
            query_latency_seconds,
            samples: Mutex::new(std::collections::HashMap::new()),
            recent_updates: Mutex::new(VecDeque::new()),
        }
    }

    /// Record one committed create/update/delete for `/api/pipeline/status`,
    /// dropping the oldest entry once the ring exceeds
    /// [`MAX_RECENT_UPDATES`]. Dropped (no-op) events are never recorded
    /// here — only events that actually touched the vector store.
    pub fn record_update_activity(&self, document_id: Uuid, latency_seconds: f64) {
        let mut recent = self.recent_updates.lock();
        if recent.len() >= MAX_RECENT_UPDATES {
            recent.pop_front();
        }
        recent.push_back(PipelineUpdateRecord {
            document_id,
            timestamp: Utc::now(),
            latency_seconds,
        });
    }

    /// Snapshot of recent update activity for `/api/pipeline/status`.
    pub fn pipeline_status(&self) -> PipelineStatus {
        let recent = self.recent_updates.lock();
        PipelineStatus {
            last_update: recent.back().map(|r| r.timestamp),
            recent_updates_count: recent.len(),
            total_latency_seconds: recent.iter().map(|r| r.latency_seconds).sum(),
            recent_updates: recent.iter().cloned().collect(),
        }
    }

    /// Record a sample into the named bounded ring, dropping the oldest
    /// entry once the ring exceeds [`MAX_SAMPLES`].
    pub fn record_sample(&self, metric: &'static str, value: f64) {
        let mut samples = self.samples.lock();
        let ring = samples.entry(metric).or_default();
        if ring.len() >= MAX_SAMPLES {
            ring.pop_front();
        }
        ring.push_back(value);
    }

    /// The most recent `n` samples recorded for `metric`, oldest first.
    pub fn recent_samples(&self, metric: &str, n: usize) -> Vec<f64> {
        let samples = self.samples.lock();
        match samples.get(metric) {
            Some(ring) => {
                let skip = ring.len().saturating_sub(n);
                ring.iter().skip(skip).copied().collect()
            }
            None => Vec::new(),
        }
    }

    /// Render the registry in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&families, &mut buffer)
            .expect("prometheus text encoding never fails for well-formed families");
        String::from_utf8(buffer).expect("prometheus text encoder emits valid utf-8")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_ring_drops_oldest_past_capacity() {
        let metrics = Metrics::new();
        for i in 0..(MAX_SAMPLES + 10) {
            metrics.record_sample("test_metric", i as f64);
        }
        let recent = metrics.recent_samples("test_metric", MAX_SAMPLES);
        assert_eq!(recent.len(), MAX_SAMPLES);
        assert_eq!(recent[0], 10.0);
        assert_eq!(*recent.last().unwrap(), (MAX_SAMPLES + 9) as f64);
    }

    #[test]
    fn pipeline_status_summarizes_recent_update_activity() {
        let metrics = Metrics::new();
        assert_eq!(metrics.pipeline_status().recent_updates_count, 0);

        metrics.record_update_activity(Uuid::new_v4(), 0.5);
        metrics.record_update_activity(Uuid::new_v4(), 1.5);

        let status = metrics.pipeline_status();
        assert_eq!(status.recent_updates_count, 2);
        assert_eq!(status.total_latency_seconds, 2.0);
        assert!(status.last_update.is_some());
    }

    #[test]
    fn recent_update_ring_drops_oldest_past_capacity() {
        let metrics = Metrics::new();
        let mut ids = Vec::new();
        for _ in 0..(MAX_RECENT_UPDATES + 3) {
            let id = Uuid::new_v4();
            ids.push(id);
            metrics.record_update_activity(id, 1.0);
        }
        let status = metrics.pipeline_status();
        assert_eq!(status.recent_updates_count, MAX_RECENT_UPDATES);
        assert_eq!(status.recent_updates[0].document_id, ids[3]);
    }

    #[test]
    fn recent_samples_on_unknown_metric_is_empty() {
        let metrics = Metrics::new();
        assert!(metrics.recent_samples("does-not-exist", 5).is_empty());
    }

    #[test]
    fn render_includes_counter_names() {
        let metrics = Metrics::new();
        metrics.updates_total.inc();
        let rendered = metrics.render();
        assert!(rendered.contains("rag_updates_total"));
    }
}
