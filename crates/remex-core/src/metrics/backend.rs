use std::sync::Arc;

/// How a remote job ended, for metrics classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Job reported success.
    Success,
    /// Job reported an error.
    Failure,
    /// Job was killed before it finished.
    Canceled,
}

impl JobOutcome {
    /// Return label value for metrics.
    #[inline]
    pub fn as_label(&self) -> &'static str {
        match self {
            JobOutcome::Success => "success",
            JobOutcome::Failure => "failure",
            JobOutcome::Canceled => "canceled",
        }
    }
}

/// Metrics sink used by task handlers.
///
/// Every call is labelled with the compute pool the job runs in, which keeps
/// label cardinality bounded by configuration.
pub trait MetricsBackend: Send + Sync + 'static {
    /// A job statement was accepted by the control plane.
    fn record_job_submitted(&self, compute_pool: &str);

    /// A job reached a terminal state.
    ///
    /// `duration_ms` is measured from submission.
    fn record_job_finished(&self, compute_pool: &str, outcome: JobOutcome, duration_ms: u64);

    /// Handler-side failure outside the job itself (connection, submission, status polling).
    fn record_runner_error(&self, compute_pool: &str, error_kind: &str);
}

/// Shared handle to metrics backend.
pub type MetricsHandle = Arc<dyn MetricsBackend>;
