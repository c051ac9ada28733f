use thiserror::Error;

use remex_model::{ModelError, TaskState};

use crate::control::ControlError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("task '{task}' does not declare a container image")]
    MissingImage { task: String },

    #[error("work directory is not set")]
    MissingWorkDir,

    #[error("work directory must be a stage uri: {0}")]
    InvalidWorkDir(String),

    #[error("compute pool is not configured")]
    MissingComputePool,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("authentication settings error: {0}")]
    Auth(String),

    #[error("control plane error: {0}")]
    Control(#[from] ControlError),

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("cannot {op} while task is {state}")]
    InvalidState { op: &'static str, state: TaskState },
}

impl CoreError {
    /// Configuration errors that no retry can fix.
    ///
    /// Fatal errors abort the task before submission; everything else is an
    /// operational failure.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MissingImage { .. }
                | Self::MissingWorkDir
                | Self::InvalidWorkDir(_)
                | Self::MissingComputePool
                | Self::Model(_)
        )
    }
}
