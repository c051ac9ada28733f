use std::sync::Arc;

use remex_core::{JobServiceExecutor, JobSpecBuilder, RemoteJobSubmitter};
use remex_model::JobTask;
use taskvisor::{TaskError, TaskFn, TaskRef};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{
    error::ExecError,
    poll::{PollConfig, drive, task_error_from},
};

/// Builds supervised tasks that run on the remote job service.
#[derive(Debug, Clone)]
pub struct JobServiceRunner {
    executor: Arc<JobServiceExecutor>,
    poll: PollConfig,
}

impl JobServiceRunner {
    pub fn new(executor: Arc<JobServiceExecutor>) -> Self {
        Self {
            executor,
            poll: PollConfig::default(),
        }
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn executor(&self) -> &JobServiceExecutor {
        &self.executor
    }

    /// Build a task running `task` remotely.
    ///
    /// The job document is built once up front so tasks that can never be
    /// submitted are rejected here instead of inside the supervisor. Each
    /// attempt gets a fresh handler.
    pub fn build_task(&self, task: JobTask) -> Result<TaskRef, ExecError> {
        if task.id.as_str().trim().is_empty() {
            return Err(ExecError::InvalidSpec("task id must not be empty".into()));
        }
        JobSpecBuilder::new(self.executor.context().mappings()).build(&task)?;
        let name = self.executor.create_handler(task.clone())?.job_name().to_string();

        trace!(task = %task.id, job = %name, "building job service task");

        let executor = Arc::clone(&self.executor);
        let poll = self.poll;
        let task_ref: TaskRef = TaskFn::arc(name, move |cancel: CancellationToken| {
            let executor = Arc::clone(&executor);
            let task = task.clone();

            async move {
                let mut handler = executor
                    .create_handler(task)
                    .map_err(|e| task_error_from(&e))?;

                let result = drive(&mut handler, &poll, &cancel).await;
                match &result {
                    Ok(()) => debug!(
                        job = %handler.job_name(),
                        logs = handler.logs().unwrap_or_default(),
                        "remote job succeeded"
                    ),
                    Err(TaskError::Canceled) => {
                        debug!(job = %handler.job_name(), state = %handler.state(), "remote job canceled")
                    }
                    Err(e) => warn!(
                        job = %handler.job_name(),
                        exit_code = ?handler.exit_code(),
                        error = handler.error_message().unwrap_or_default(),
                        logs = handler.logs().unwrap_or_default(),
                        reason = ?e,
                        "remote job did not succeed"
                    ),
                }
                result
            }
        });
        Ok(task_ref)
    }
}

#[cfg(test)]
mod tests {
    use remex_core::{
        ConnectionPool, ExecutorConfig, PoolConfig,
        mock::{MockConnector, mock_auth},
        noop_metrics,
    };

    use super::*;

    async fn runner(connector: &Arc<MockConnector>) -> JobServiceRunner {
        let pool = Arc::new(ConnectionPool::with_auth(
            connector.clone(),
            PoolConfig::default(),
            mock_auth(),
        ));
        let config = ExecutorConfig {
            compute_pool: "POOL".into(),
            work_dir: Some("virtualscheme://stage/S/work".into()),
            registry_mappings: None,
            run_id: Some("r1".into()),
        };
        let executor = JobServiceExecutor::register(config, pool, noop_metrics())
            .await
            .unwrap();
        JobServiceRunner::new(Arc::new(executor))
    }

    #[tokio::test]
    async fn task_is_named_after_the_job() {
        let connector = Arc::new(MockConnector::new());
        let runner = runner(&connector).await;
        let task = JobTask::new("7", "x")
            .with_image("alpine:3")
            .with_work_dir("virtualscheme://stage/S/work/7");

        let task_ref = runner.build_task(task).unwrap();
        assert_eq!(task_ref.name(), "remex_r1_7");
        assert!(connector.executed().is_empty(), "nothing submitted at build time");
    }

    #[tokio::test]
    async fn unsubmittable_tasks_are_rejected_up_front() {
        let connector = Arc::new(MockConnector::new());
        let runner = runner(&connector).await;

        let err = match runner.build_task(JobTask::new("7", "x").with_work_dir("/w")) {
            Err(e) => e,
            Ok(_) => panic!("expected missing image to be rejected"),
        };
        assert!(err.is_fatal());

        let err = match runner.build_task(JobTask::new("7", "x").with_image("alpine:3")) {
            Err(e) => e,
            Ok(_) => panic!("expected missing work dir to be rejected"),
        };
        assert!(matches!(err, ExecError::Core(_)));

        let err = match runner.build_task(JobTask::new(" ", "x")) {
            Err(e) => e,
            Ok(_) => panic!("expected empty id to be rejected"),
        };
        assert!(matches!(err, ExecError::InvalidSpec(_)));
    }
}
