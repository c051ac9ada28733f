//! Metrics abstraction for remote job execution.
//!
//! Backends (prometheus, statsd, etc) implement [`MetricsBackend`] and are
//! injected through [`crate::ExecContext`]; handlers never know which one is in use.
mod backend;
pub use backend::{JobOutcome, MetricsBackend, MetricsHandle};

mod noop;
pub use noop::NoOpMetrics;

use std::sync::Arc;

/// Create a no-op metrics handle.
#[inline]
pub fn noop_metrics() -> MetricsHandle {
    Arc::new(NoOpMetrics)
}
