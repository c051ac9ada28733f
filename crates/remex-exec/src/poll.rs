use std::time::Duration;

use remex_core::{CoreError, RemoteJobSubmitter};
use remex_model::TaskState;
use serde::{Deserialize, Serialize};
use taskvisor::TaskError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Polling cadence for running jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PollConfig {
    /// Delay between status polls in milliseconds.
    pub interval_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self { interval_ms: 5_000 }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Map handler errors onto supervisor semantics.
///
/// Configuration errors are [`TaskError::Fatal`]; everything else may
/// succeed on a later attempt and is [`TaskError::Fail`].
pub fn task_error_from(err: &CoreError) -> TaskError {
    if err.is_fatal() {
        TaskError::Fatal {
            reason: err.to_string(),
        }
    } else {
        TaskError::Fail {
            reason: err.to_string(),
        }
    }
}

/// Submit the job and poll it until it finishes or `cancel` fires.
///
/// Any error after submission kills the job before returning, so the
/// borrowed connection always goes back to the pool.
pub async fn drive<S>(
    handler: &mut S,
    config: &PollConfig,
    cancel: &CancellationToken,
) -> Result<(), TaskError>
where
    S: RemoteJobSubmitter + ?Sized,
{
    if cancel.is_cancelled() {
        handler.kill().await;
        return Err(TaskError::Canceled);
    }
    if let Err(e) = handler.submit().await {
        handler.kill().await;
        return Err(task_error_from(&e));
    }

    loop {
        match poll_once(handler).await {
            Ok(true) => break,
            Ok(false) => {}
            Err(e) => {
                debug!(error = %e, "polling failed; killing job");
                handler.kill().await;
                return Err(task_error_from(&e));
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("cancellation requested; killing job");
                handler.kill().await;
                return Err(TaskError::Canceled);
            }
            _ = tokio::time::sleep(config.interval()) => {}
        }
    }

    match handler.state() {
        TaskState::Completed => Ok(()),
        TaskState::Failed => Err(TaskError::Fail {
            reason: "remote job failed".into(),
        }),
        other => Err(TaskError::Fail {
            reason: format!("job finished in unexpected state {other}"),
        }),
    }
}

async fn poll_once<S>(handler: &mut S) -> Result<bool, CoreError>
where
    S: RemoteJobSubmitter + ?Sized,
{
    if !handler.poll_running().await? {
        trace!(state = %handler.state(), "job not running yet");
        return Ok(false);
    }
    handler.poll_completed().await
}
