//! # Application State Management
//!
//! Shared state handed to every HTTP request handler. Almost everything here
//! is immutable for the process lifetime: the configuration is loaded and
//! validated once, and the model registry is built once at startup and only
//! ever read afterwards, so both are shared as plain values/`Arc`s with no
//! locking. The only mutable piece is the request metrics, guarded by an
//! `RwLock` because every request updates them.

use crate::config::AppConfig;
use crate::models::ModelRegistry;
use crate::pipeline::FeatureExtractor;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// Shared application state.
///
/// Cloning is cheap: the registry and extractor are behind `Arc`s, the
/// config is a small owned struct.
#[derive(Clone)]
pub struct AppState {
    /// Immutable configuration, fixed at startup
    pub config: AppConfig,

    /// Read-only model registry; concurrent lookups need no locking
    pub registry: Arc<ModelRegistry>,

    /// Feature toolkit handle (owns the extraction concurrency bound)
    pub extractor: Arc<FeatureExtractor>,

    /// Request metrics, updated by the metrics middleware
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// When the server started
    pub start_time: Instant,
}

/// Request counters collected across all endpoints.
#[derive(Debug, Default)]
pub struct AppMetrics {
    /// Total HTTP requests since startup
    pub request_count: u64,

    /// Total failed requests since startup
    pub error_count: u64,

    /// Predictions currently in flight
    pub active_predictions: u32,

    /// Per-endpoint counters, keyed by "METHOD /path"
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Counters for one endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

impl AppState {
    pub fn new(
        config: AppConfig,
        registry: Arc<ModelRegistry>,
        extractor: Arc<FeatureExtractor>,
    ) -> Self {
        Self {
            config,
            registry,
            extractor,
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    /// Record one finished request. Lock poisoning is not recoverable in any
    /// useful way here, so a poisoned lock just skips the bookkeeping.
    pub fn record_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        if let Ok(mut metrics) = self.metrics.write() {
            metrics.request_count += 1;
            if is_error {
                metrics.error_count += 1;
            }

            let endpoint_metric = metrics
                .endpoint_metrics
                .entry(endpoint.to_string())
                .or_default();
            endpoint_metric.request_count += 1;
            endpoint_metric.total_duration_ms += duration_ms;
            if is_error {
                endpoint_metric.error_count += 1;
            }
        }
    }

    pub fn prediction_started(&self) {
        if let Ok(mut metrics) = self.metrics.write() {
            metrics.active_predictions += 1;
        }
    }

    pub fn prediction_finished(&self) {
        if let Ok(mut metrics) = self.metrics.write() {
            if metrics.active_predictions > 0 {
                metrics.active_predictions -= 1;
            }
        }
    }

    /// Consistent copy of the metrics for the health/metrics endpoints.
    pub fn metrics_snapshot(&self) -> AppMetrics {
        match self.metrics.read() {
            Ok(metrics) => AppMetrics {
                request_count: metrics.request_count,
                error_count: metrics.error_count,
                active_predictions: metrics.active_predictions,
                endpoint_metrics: metrics.endpoint_metrics.clone(),
            },
            Err(_) => AppMetrics::default(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
