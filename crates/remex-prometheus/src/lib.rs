//! Prometheus backend for remote job metrics.
//!
//! [`PrometheusMetrics`] implements [`remex_core::MetricsBackend`]; hand it to
//! the executor as a [`remex_core::MetricsHandle`] and expose
//! [`PrometheusMetrics::encode_text`] from whatever HTTP server the host uses.
//!
//! ```rust
//! use std::sync::Arc;
//! use remex_core::MetricsHandle;
//! use remex_prometheus::PrometheusMetrics;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let metrics = PrometheusMetrics::new()?;
//! let handle: MetricsHandle = Arc::new(metrics.clone());
//! # let _ = handle;
//! let body = metrics.encode_text()?;
//! assert!(body.is_empty() || body.contains("remex_"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Metrics
//! - `remex_jobs_submitted_total{compute_pool}`
//! - `remex_jobs_finished_total{compute_pool, outcome}`
//! - `remex_jobs_in_flight{compute_pool}`
//! - `remex_job_duration_seconds{compute_pool}`
//! - `remex_runner_errors_total{compute_pool, error_kind}`
mod backend;
pub use backend::PrometheusMetrics;

pub use prometheus::{Encoder, Registry, TextEncoder};
