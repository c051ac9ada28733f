mod state;
pub use state::TaskState;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Env;

/// Identifier of a task inside the host workflow engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unit of work handed over by the workflow engine.
///
/// The core never mutates a task; it only reads the declared requirements
/// when building the job document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobTask {
    /// Engine-assigned identifier, unique per run.
    pub id: TaskId,
    /// Human-readable name, used as the job comment.
    pub name: String,
    /// Container image reference (e.g. `docker.io/alpine:latest`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Requested CPU count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpus: Option<u32>,
    /// Requested memory in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_bytes: Option<u64>,
    /// Task working directory, normally a stage URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<String>,
    /// Variables exported into the job container.
    #[serde(default, skip_serializing_if = "Env::is_empty")]
    pub env: Env,
}

impl JobTask {
    /// Create a task with no declared requirements.
    pub fn new(id: impl Into<TaskId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            image: None,
            cpus: None,
            memory_bytes: None,
            work_dir: None,
            env: Env::new(),
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_cpus(mut self, cpus: u32) -> Self {
        self.cpus = Some(cpus);
        self
    }

    pub fn with_memory_bytes(mut self, bytes: u64) -> Self {
        self.memory_bytes = Some(bytes);
        self
    }

    pub fn with_work_dir(mut self, dir: impl Into<String>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    pub fn with_env(mut self, env: Env) -> Self {
        self.env = env;
        self
    }

    /// Returns the declared image, treating blank strings as undeclared.
    pub fn declared_image(&self) -> Option<&str> {
        self.image
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_image_counts_as_undeclared() {
        let task = JobTask::new("t1", "hello").with_image("   ");
        assert!(task.declared_image().is_none());

        let task = JobTask::new("t1", "hello").with_image("alpine:3");
        assert_eq!(task.declared_image(), Some("alpine:3"));
    }

    #[test]
    fn deserializes_with_missing_optionals() {
        let json = r#"{"id":"42","name":"align"}"#;
        let task: JobTask = serde_json::from_str(json).unwrap();

        assert_eq!(task.id.as_str(), "42");
        assert!(task.image.is_none());
        assert!(task.cpus.is_none());
        assert!(task.env.is_empty());
    }
}
