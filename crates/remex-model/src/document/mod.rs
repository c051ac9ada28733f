//! Job specification document submitted to the remote job service.
//!
//! Every optional field is an `Option` skipped during serialization, so a
//! value that was never set is absent from the rendered YAML rather than
//! written as `null` or an empty collection.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// Root of the document: `spec.containers` plus optional `spec.volumes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpecDocument {
    pub spec: JobServiceSpec,
}

impl JobSpecDocument {
    /// Document with a single container and no volumes.
    pub fn single(container: Container) -> Self {
        Self {
            spec: JobServiceSpec {
                containers: vec![container],
                volumes: None,
            },
        }
    }

    /// The job's only container.
    pub fn container(&self) -> Option<&Container> {
        self.spec.containers.first()
    }

    /// Render as block-style YAML.
    pub fn to_yaml(&self) -> Result<String, ModelError> {
        serde_yaml::to_string(self).map_err(|e| ModelError::Render(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobServiceSpec {
    pub containers: Vec<Container>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volumes: Option<Vec<Volume>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Resources>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_mounts: Option<Vec<VolumeMount>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    pub requests: ResourceRequests,
}

/// Requested resources; only declared keys are emitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequests {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<u32>,
    /// Memory with unit suffix, e.g. `2048Mi`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

impl ResourceRequests {
    pub fn is_empty(&self) -> bool {
        self.cpu.is_none() && self.memory.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
    pub name: String,
    pub mount_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub name: String,
    pub source: VolumeSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_config: Option<StageConfig>,
}

impl Volume {
    /// Network stage volume bound to `@<stage>` in read-write mode.
    pub fn stage(name: impl Into<String>, stage: &str) -> Self {
        Self {
            name: name.into(),
            source: VolumeSource::Stage,
            stage_config: Some(StageConfig {
                name: format!("@{stage}"),
                mode: StageMode::ReadWrite,
            }),
        }
    }

    /// Node-local ephemeral volume.
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: VolumeSource::Local,
            stage_config: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeSource {
    Stage,
    Local,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageConfig {
    /// Stage reference, `@` prefixed.
    pub name: String,
    pub mode: StageMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageMode {
    #[serde(rename = "rw")]
    ReadWrite,
    #[serde(rename = "ro")]
    ReadOnly,
}
