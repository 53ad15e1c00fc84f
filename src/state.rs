//! # Application State Management
//!
//! Shared state handed to every HTTP handler and WebSocket coordinator:
//! the runtime-updatable configuration, the process-wide session registry,
//! and relay/request metrics. Everything mutable sits behind Arc<RwLock<>>
//! so concurrent handlers can read cheaply while updates stay exclusive.
//!
//! The registry is owned here deliberately — it is constructed once at
//! startup and injected into coordinators through this state, never reached
//! through a global.

use crate::config::AppConfig;
use crate::relay::registry::SessionRegistry;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// Shared application state, cheap to clone (all Arcs).
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration (can be updated at runtime)
    pub config: Arc<RwLock<AppConfig>>,

    /// Live session bookkeeping, shared by all connection coordinators
    pub registry: Arc<SessionRegistry>,

    /// Relay and HTTP metrics, updated by middleware and coordinators
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// When the server started
    pub start_time: Instant,
}

/// Counters collected across the process lifetime.
#[derive(Debug, Default)]
pub struct AppMetrics {
    /// Total HTTP requests processed since server start
    pub request_count: u64,

    /// Total HTTP errors since server start
    pub error_count: u64,

    /// Relay sessions accepted since server start
    pub sessions_started: u64,

    /// Relay sessions fully torn down since server start
    pub sessions_completed: u64,

    /// Raw PCM bytes received across all sessions
    pub audio_bytes_received: u64,

    /// Binary chunks forwarded back to clients
    pub chunks_relayed: u64,

    /// Binary chunks withheld by the silence gate
    pub chunks_withheld: u64,

    /// Session WAV files successfully written
    pub files_written: u64,

    /// Session WAV writes that failed (accepted data loss)
    pub write_failures: u64,

    /// Per-endpoint request statistics, keyed by "METHOD /path"
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Request statistics for one API endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            registry: Arc::new(SessionRegistry::new()),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    /// Get a copy of the current configuration. Cloning releases the read
    /// lock immediately so other handlers are not blocked.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    /// Replace the configuration after validating it.
    pub fn update_config(&self, new_config: AppConfig) -> Result<(), String> {
        match new_config.validate() {
            Ok(_) => {
                *self.config.write().unwrap() = new_config;
                Ok(())
            }
            Err(e) => Err(e.to_string()),
        }
    }

    pub fn increment_request_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.request_count += 1;
    }

    pub fn increment_error_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.error_count += 1;
    }

    /// Record per-endpoint timing, called by the metrics middleware.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap();
        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;

        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    pub fn record_session_started(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.sessions_started += 1;
    }

    pub fn record_session_completed(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.sessions_completed += 1;
    }

    /// Record one inbound binary chunk and whether the gate forwarded it.
    pub fn record_chunk(&self, bytes: usize, relayed: bool) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.audio_bytes_received += bytes as u64;
        if relayed {
            metrics.chunks_relayed += 1;
        } else {
            metrics.chunks_withheld += 1;
        }
    }

    pub fn record_file_written(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.files_written += 1;
    }

    pub fn record_write_failure(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.write_failures += 1;
    }

    /// Consistent copy of the counters for the metrics endpoints.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        let metrics = self.metrics.read().unwrap();
        AppMetrics {
            request_count: metrics.request_count,
            error_count: metrics.error_count,
            sessions_started: metrics.sessions_started,
            sessions_completed: metrics.sessions_completed,
            audio_bytes_received: metrics.audio_bytes_received,
            chunks_relayed: metrics.chunks_relayed,
            chunks_withheld: metrics.chunks_withheld,
            files_written: metrics.files_written,
            write_failures: metrics.write_failures,
            endpoint_metrics: metrics.endpoint_metrics.clone(),
        }
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
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
