use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of a single task on the remote job service.
///
/// ```text
/// Created -> Submitted -> Running -> Completed | Failed
///     \__________\__________\______> Killed
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    #[default]
    Created,
    Submitted,
    Running,
    Completed,
    Failed,
    Killed,
}

impl TaskState {
    /// No further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Killed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Submitted => "submitted",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Killed => "killed",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
