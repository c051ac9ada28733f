use std::sync::Arc;

use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, IntGaugeVec, Opts, Registry, TextEncoder,
    proto::MetricFamily,
};

use remex_core::{JobOutcome, MetricsBackend};

const NAMESPACE: &str = "remex";

/// Remote jobs run from seconds to hours.
const DURATION_BUCKETS: &[f64] = &[
    1.0, 5.0, 15.0, 30.0, 60.0, 300.0, 900.0, 1800.0, 3600.0, 7200.0, 14400.0,
];

/// Prometheus metrics backend.
///
/// Labels are bounded: `compute_pool` comes from configuration, `outcome`
/// is one of `success`, `failure`, `canceled`, and `error_kind` is a fixed
/// set of handler failure kinds.
#[derive(Clone)]
pub struct PrometheusMetrics {
    jobs_submitted: CounterVec,
    jobs_finished: CounterVec,
    jobs_in_flight: IntGaugeVec,
    job_duration: HistogramVec,
    runner_errors: CounterVec,
    registry: Arc<Registry>,
}

impl PrometheusMetrics {
    /// Register all collectors in `registry`.
    pub fn new_with_registry(registry: Arc<Registry>) -> Result<Self, prometheus::Error> {
        let jobs_submitted = CounterVec::new(
            Opts::new("jobs_submitted_total", "Jobs accepted by the job service")
                .namespace(NAMESPACE),
            &["compute_pool"],
        )?;
        registry.register(Box::new(jobs_submitted.clone()))?;

        let jobs_finished = CounterVec::new(
            Opts::new("jobs_finished_total", "Jobs that reached a terminal state")
                .namespace(NAMESPACE),
            &["compute_pool", "outcome"],
        )?;
        registry.register(Box::new(jobs_finished.clone()))?;

        let jobs_in_flight = IntGaugeVec::new(
            Opts::new("jobs_in_flight", "Submitted jobs not yet finished").namespace(NAMESPACE),
            &["compute_pool"],
        )?;
        registry.register(Box::new(jobs_in_flight.clone()))?;

        let job_duration = HistogramVec::new(
            HistogramOpts::new(
                "job_duration_seconds",
                "Time from submission to terminal state",
            )
            .namespace(NAMESPACE)
            .buckets(DURATION_BUCKETS.to_vec()),
            &["compute_pool"],
        )?;
        registry.register(Box::new(job_duration.clone()))?;

        let runner_errors = CounterVec::new(
            Opts::new("runner_errors_total", "Handler-side failures").namespace(NAMESPACE),
            &["compute_pool", "error_kind"],
        )?;
        registry.register(Box::new(runner_errors.clone()))?;

        Ok(Self {
            jobs_submitted,
            jobs_finished,
            jobs_in_flight,
            job_duration,
            runner_errors,
            registry,
        })
    }

    pub fn new() -> Result<Self, prometheus::Error> {
        Self::new_with_registry(Arc::new(Registry::new()))
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Render every family in the text exposition format.
    pub fn encode_text(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}

impl MetricsBackend for PrometheusMetrics {
    fn record_job_submitted(&self, compute_pool: &str) {
        self.jobs_submitted.with_label_values(&[compute_pool]).inc();
        self.jobs_in_flight.with_label_values(&[compute_pool]).inc();
    }

    fn record_job_finished(&self, compute_pool: &str, outcome: JobOutcome, duration_ms: u64) {
        self.jobs_finished
            .with_label_values(&[compute_pool, outcome.as_label()])
            .inc();
        self.jobs_in_flight.with_label_values(&[compute_pool]).dec();
        self.job_duration
            .with_label_values(&[compute_pool])
            .observe(duration_ms as f64 / 1000.0);
    }

    fn record_runner_error(&self, compute_pool: &str, error_kind: &str) {
        self.runner_errors
            .with_label_values(&[compute_pool, error_kind])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family<'a>(families: &'a [MetricFamily], name: &str) -> &'a MetricFamily {
        families
            .iter()
            .find(|f| f.name() == name)
            .unwrap_or_else(|| panic!("metric {name} not found"))
    }

    #[test]
    fn submitted_jobs_are_counted_per_pool() {
        let metrics = PrometheusMetrics::new().unwrap();

        metrics.record_job_submitted("CPU_S");
        metrics.record_job_submitted("CPU_S");
        metrics.record_job_submitted("GPU_M");

        let families = metrics.gather();
        assert_eq!(family(&families, "remex_jobs_submitted_total").get_metric().len(), 2);
        assert_eq!(family(&families, "remex_jobs_in_flight").get_metric().len(), 2);
    }

    #[test]
    fn finished_jobs_leave_flight_and_record_duration() {
        let metrics = PrometheusMetrics::new().unwrap();

        metrics.record_job_submitted("CPU_S");
        metrics.record_job_submitted("CPU_S");
        metrics.record_job_finished("CPU_S", JobOutcome::Success, 90_000);
        metrics.record_job_finished("CPU_S", JobOutcome::Failure, 1_500);

        let families = metrics.gather();
        assert_eq!(family(&families, "remex_jobs_finished_total").get_metric().len(), 2);


        let text = metrics.encode_text().unwrap();
        assert!(text.contains("remex_jobs_in_flight{compute_pool=\"CPU_S\"} 0"));
        assert!(text.contains("remex_job_duration_seconds_count{compute_pool=\"CPU_S\"} 2"));
    }

    #[test]
    fn runner_errors_are_labelled_by_kind() {
        let metrics = PrometheusMetrics::new().unwrap();

        metrics.record_runner_error("CPU_S", "submit_failed");
        metrics.record_runner_error("CPU_S", "submit_failed");
        metrics.record_runner_error("CPU_S", "connection_failed");

        let families = metrics.gather();
        assert_eq!(family(&families, "remex_runner_errors_total").get_metric().len(), 2);
    }

    #[test]
    fn text_exposition_contains_metric_names() {
        let metrics = PrometheusMetrics::new().unwrap();
        metrics.record_job_submitted("CPU_S");

        let text = metrics.encode_text().unwrap();
        assert!(text.contains("remex_jobs_submitted_total{compute_pool=\"CPU_S\"} 1"));
    }

    #[test]
    fn shared_registry_rejects_double_registration() {
        let registry = Arc::new(Registry::new());
        PrometheusMetrics::new_with_registry(registry.clone()).unwrap();

        assert!(PrometheusMetrics::new_with_registry(registry).is_err());
    }
}
