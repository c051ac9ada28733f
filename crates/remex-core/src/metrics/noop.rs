use crate::metrics::backend::{JobOutcome, MetricsBackend};

/// Metrics backend that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMetrics;

impl MetricsBackend for NoOpMetrics {
    #[inline(always)]
    fn record_job_submitted(&self, _: &str) {}

    #[inline(always)]
    fn record_job_finished(&self, _: &str, _: JobOutcome, _: u64) {}

    #[inline(always)]
    fn record_runner_error(&self, _: &str, _: &str) {}
}
