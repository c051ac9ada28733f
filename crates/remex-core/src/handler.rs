//! Per-task state machine driving one remote job.
//!
//! A handler is owned by exactly one polling driver. It holds at most one
//! borrowed connection, from `submit` until the job is observed terminal or
//! the handler is killed, and tracks that explicitly so the connection is
//! never returned twice.
use std::sync::Arc;

use async_trait::async_trait;
use remex_model::{JobTask, TaskState};
use tokio::time::Instant;
use tracing::{debug, info, instrument, trace, warn};

use crate::{
    builder::{CONTAINER_NAME, JobSpecBuilder},
    control::{Connection, QueryHandle, QueryStatus, quote_literal},
    error::CoreError,
    executor::ExecContext,
    metrics::JobOutcome,
};

/// Exit code reported for every failed job; the service exposes no finer code.
pub const FAILED_EXIT_CODE: i32 = 1;

/// Narrow interface consumed by polling drivers.
#[async_trait]
pub trait RemoteJobSubmitter: Send {
    /// Current lifecycle state.
    fn state(&self) -> TaskState;

    /// Submit the job. Allowed only once, from `Created`.
    async fn submit(&mut self) -> Result<(), CoreError>;

    /// `true` once the job has started or already finished.
    async fn poll_running(&mut self) -> Result<bool, CoreError>;

    /// `true` exactly once, when the terminal status is observed.
    async fn poll_completed(&mut self) -> Result<bool, CoreError>;

    /// Cancel the job and release resources. Safe to call at any time.
    async fn kill(&mut self);
}

/// State machine for one task on the remote job service.
pub struct TaskExecutionHandler {
    task: JobTask,
    ctx: ExecContext,
    job_name: String,
    state: TaskState,
    conn: Option<Arc<dyn Connection>>,
    query: Option<QueryHandle>,
    submitted_at: Option<Instant>,
    exit_code: Option<i32>,
    error_message: Option<String>,
    logs: Option<String>,
}

impl TaskExecutionHandler {
    /// Create a handler, rejecting tasks that can never be submitted.
    pub fn new(task: JobTask, ctx: ExecContext) -> Result<Self, CoreError> {
        if task.declared_image().is_none() {
            return Err(CoreError::MissingImage {
                task: task.id.to_string(),
            });
        }
        let job_name = job_name(ctx.run_id(), task.id.as_str());
        Ok(Self {
            task,
            ctx,
            job_name,
            state: TaskState::Created,
            conn: None,
            query: None,
            submitted_at: None,
            exit_code: None,
            error_message: None,
            logs: None,
        })
    }

    pub fn task(&self) -> &JobTask {
        &self.task
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// `0` after success, [`FAILED_EXIT_CODE`] after failure.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Remote error message of a failed job.
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Job output, or a diagnostic when it could not be fetched.
    pub fn logs(&self) -> Option<&str> {
        self.logs.as_deref()
    }

    /// Whether a pooled connection is currently borrowed by this handler.
    pub fn holds_connection(&self) -> bool {
        self.conn.is_some()
    }

    fn submission_statement(&self, spec_yaml: &str) -> String {
        format!(
            "execute job service\n  in compute pool {pool}\n  name = {name}\n  comment = {comment}\n  from specification $$\n{spec_yaml}$$",
            pool = self.ctx.compute_pool(),
            name = self.job_name,
            comment = quote_literal(&self.task.name),
        )
    }

    async fn poll_status(&mut self, op: &'static str) -> Result<QueryStatus, CoreError> {
        let (Some(conn), Some(query)) = (&self.conn, &self.query) else {
            return Err(CoreError::InvalidState {
                op,
                state: self.state,
            });
        };
        conn.query_status(query).await.map_err(|e| {
            self.ctx
                .metrics()
                .record_runner_error(self.ctx.compute_pool(), "status_failed");
            CoreError::from(e)
        })
    }

    /// Fetch the job output; failures become the returned text.
    async fn fetch_logs(&self) -> String {
        let Some(conn) = &self.conn else {
            return "job logs unavailable: no connection held".to_string();
        };
        let sql = format!(
            "select system$get_service_logs({}, 0, {})",
            quote_literal(&self.job_name),
            quote_literal(CONTAINER_NAME),
        );
        match conn.query_scalar(&sql).await {
            Ok(logs) => logs.unwrap_or_default(),
            Err(e) => {
                debug!(job = %self.job_name, error = %e, "log retrieval failed");
                format!("failed to fetch job logs: {e}")
            }
        }
    }

    async fn release_connection(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.ctx.pool().return_connection(Some(&conn)).await;
        }
    }

    async fn finish(&mut self, state: TaskState, exit_code: i32, outcome: JobOutcome) {
        self.logs = Some(self.fetch_logs().await);
        self.exit_code = Some(exit_code);
        self.state = state;
        self.release_connection().await;

        let elapsed = self
            .submitted_at
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or_default();
        self.ctx
            .metrics()
            .record_job_finished(self.ctx.compute_pool(), outcome, elapsed);
    }
}

#[async_trait]
impl RemoteJobSubmitter for TaskExecutionHandler {
    fn state(&self) -> TaskState {
        self.state
    }

    #[instrument(level = "debug", skip(self), fields(task = %self.task.id, job = %self.job_name))]
    async fn submit(&mut self) -> Result<(), CoreError> {
        if self.state != TaskState::Created {
            return Err(CoreError::InvalidState {
                op: "submit",
                state: self.state,
            });
        }
        let pool_name = self.ctx.compute_pool().to_string();
        let metrics = Arc::clone(self.ctx.metrics());

        let doc = JobSpecBuilder::new(self.ctx.mappings()).build(&self.task)?;
        let statement = self.submission_statement(&doc.to_yaml()?);

        let conn = self.ctx.pool().get_connection().await.inspect_err(|_| {
            metrics.record_runner_error(&pool_name, "connection_failed");
        })?;
        let query = match conn.execute_async(&statement).await {
            Ok(query) => query,
            Err(e) => {
                warn!(error = %e, "job submission failed");
                metrics.record_runner_error(&pool_name, "submit_failed");
                self.ctx.pool().return_connection(Some(&conn)).await;
                return Err(e.into());
            }
        };

        info!(query = %query, session = %conn.session_id(), "job submitted");
        self.conn = Some(conn);
        self.query = Some(query);
        self.submitted_at = Some(Instant::now());
        self.state = TaskState::Submitted;
        metrics.record_job_submitted(&pool_name);
        Ok(())
    }

    async fn poll_running(&mut self) -> Result<bool, CoreError> {
        match self.state {
            TaskState::Running => return Ok(true),
            TaskState::Submitted => {}
            _ => return Ok(false),
        }
        let status = self.poll_status("poll running").await?;
        if !status.has_started() {
            trace!(job = %self.job_name, "job pending");
            return Ok(false);
        }
        debug!(job = %self.job_name, ?status, done = status.is_done(), "job observed running");
        self.state = TaskState::Running;
        Ok(true)
    }

    async fn poll_completed(&mut self) -> Result<bool, CoreError> {
        if self.state != TaskState::Running {
            return Ok(false);
        }
        match self.poll_status("poll completed").await? {
            QueryStatus::Pending | QueryStatus::Running => Ok(false),
            QueryStatus::Success => {
                self.finish(TaskState::Completed, 0, JobOutcome::Success).await;
                info!(job = %self.job_name, "job completed");
                Ok(true)
            }
            QueryStatus::Error(message) => {
                self.error_message = Some(message);
                self.finish(TaskState::Failed, FAILED_EXIT_CODE, JobOutcome::Failure)
                    .await;
                warn!(
                    job = %self.job_name,
                    error = self.error_message.as_deref().unwrap_or_default(),
                    "job failed"
                );
                Ok(true)
            }
        }
    }

    #[instrument(level = "debug", skip(self), fields(task = %self.task.id, job = %self.job_name))]
    async fn kill(&mut self) {
        if let (Some(conn), Some(query)) = (&self.conn, &self.query) {
            if let Err(e) = conn.cancel(query).await {
                debug!(error = %e, "cancel request failed; releasing anyway");
            }
        }
        self.release_connection().await;

        if !self.state.is_terminal() {
            debug!(from = %self.state, "job killed");
            self.state = TaskState::Killed;
            if let Some(at) = self.submitted_at {
                self.ctx.metrics().record_job_finished(
                    self.ctx.compute_pool(),
                    JobOutcome::Canceled,
                    at.elapsed().as_millis() as u64,
                );
            }
        }
    }
}

/// Job name stable per run and task, restricted to `[a-z0-9_]`.
pub fn job_name(run_id: &str, task_id: &str) -> String {
    let raw = format!("remex_{run_id}_{task_id}");
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}
