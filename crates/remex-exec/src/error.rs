use remex_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("invalid task specification: {0}")]
    InvalidSpec(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ExecError {
    /// Whether retrying the same task can never succeed.
    pub fn is_fatal(&self) -> bool {
        match self {
            ExecError::InvalidSpec(_) => true,
            ExecError::Core(e) => e.is_fatal(),
        }
    }
}
