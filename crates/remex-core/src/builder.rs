//! Job specification synthesis.
//!
//! Turns a [`JobTask`] into the document handed to `execute job service`.
use remex_model::{
    JobSpecDocument, JobTask, MEBIBYTE, SCRATCH_MOUNT_PATH, StageUri,
    document::{Container, ResourceRequests, Resources, Volume, VolumeMount},
    stage::stage_mount_path,
};
use tracing::trace;

use crate::{error::CoreError, registry::RegistryMappings};

/// Name of the single container in every job.
pub const CONTAINER_NAME: &str = "main";

/// Wrapper script the engine stages into every task directory.
pub const WRAPPER_SCRIPT: &str = ".command.run";

const STAGE_VOLUME: &str = "stage";
const SCRATCH_VOLUME: &str = "scratch";

/// Builds job documents for tasks of one executor.
#[derive(Debug, Clone, Copy)]
pub struct JobSpecBuilder<'a> {
    mappings: &'a RegistryMappings,
}

impl<'a> JobSpecBuilder<'a> {
    pub fn new(mappings: &'a RegistryMappings) -> Self {
        Self { mappings }
    }

    /// Build the document for `task`.
    ///
    /// Fails when the task declares no image or no working directory, or
    /// when its working directory looks like a stage URI but is malformed.
    pub fn build(&self, task: &JobTask) -> Result<JobSpecDocument, CoreError> {
        let image = task.declared_image().ok_or_else(|| CoreError::MissingImage {
            task: task.id.to_string(),
        })?;
        let work_dir = task.work_dir.as_deref().ok_or(CoreError::MissingWorkDir)?;
        let stage = parse_stage(work_dir)?;

        let image = self.mappings.rewrite_image(image);
        let mounted_dir = match &stage {
            Some(uri) => uri.mount_path(),
            None => work_dir.to_string(),
        };

        let (volume_mounts, volumes) = volumes_for(stage.as_ref());
        let container = Container {
            name: CONTAINER_NAME.to_string(),
            image,
            command: command_for(&mounted_dir),
            env: task.env.to_map(),
            resources: resources_for(task),
            volume_mounts: Some(volume_mounts),
        };

        let mut doc = JobSpecDocument::single(container);
        doc.spec.volumes = Some(volumes);
        trace!(task = %task.id, ?doc, "job specification built");
        Ok(doc)
    }
}

/// Stage URIs are mounted; anything else is taken as a container path.
fn parse_stage(work_dir: &str) -> Result<Option<StageUri>, CoreError> {
    if work_dir.contains("://") {
        return Ok(Some(StageUri::parse(work_dir)?));
    }
    Ok(None)
}

fn command_for(dir: &str) -> Vec<String> {
    vec![
        "/bin/bash".to_string(),
        "-c".to_string(),
        format!("cd {dir} && bash {WRAPPER_SCRIPT}"),
    ]
}

fn resources_for(task: &JobTask) -> Option<Resources> {
    let requests = ResourceRequests {
        cpu: task.cpus,
        memory: task
            .memory_bytes
            .map(|bytes| format!("{}Mi", bytes.div_ceil(MEBIBYTE))),
    };
    if requests.is_empty() {
        return None;
    }
    Some(Resources { requests })
}

fn volumes_for(stage: Option<&StageUri>) -> (Vec<VolumeMount>, Vec<Volume>) {
    let mut mounts = Vec::with_capacity(2);
    let mut volumes = Vec::with_capacity(2);

    if let Some(uri) = stage {
        mounts.push(VolumeMount {
            name: STAGE_VOLUME.to_string(),
            mount_path: stage_mount_path(uri.name()),
        });
        volumes.push(Volume::stage(STAGE_VOLUME, uri.name()));
    }

    mounts.push(VolumeMount {
        name: SCRATCH_VOLUME.to_string(),
        mount_path: SCRATCH_MOUNT_PATH.to_string(),
    });
    volumes.push(Volume::local(SCRATCH_VOLUME));

    (mounts, volumes)
}

#[cfg(test)]
mod tests {
    use remex_model::{Env, document::VolumeSource};

    use super::*;

    fn task() -> JobTask {
        JobTask::new("7", "align (sample1)")
            .with_image("docker.io/alpine:latest")
            .with_work_dir("virtualscheme://stage/MYSTAGE/work/ab/cdef")
    }

    fn mappings() -> RegistryMappings {
        [("docker.io", "internal.example/repoA")].into_iter().collect()
    }

    #[test]
    fn builds_full_document() {
        let mappings = mappings();
        let doc = JobSpecBuilder::new(&mappings)
            .build(&task().with_cpus(2).with_memory_bytes(4 * 1024 * MEBIBYTE))
            .unwrap();

        let c = doc.container().unwrap();
        assert_eq!(c.name, "main");
        assert_eq!(c.image, "internal.example/repoA/alpine:latest");
        assert_eq!(
            c.command,
            vec![
                "/bin/bash",
                "-c",
                "cd /mnt/stage/mystage/work/ab/cdef && bash .command.run"
            ]
        );

        let requests = &c.resources.as_ref().unwrap().requests;
        assert_eq!(requests.cpu, Some(2));
        assert_eq!(requests.memory.as_deref(), Some("4096Mi"));

        let mounts = c.volume_mounts.as_ref().unwrap();
        assert_eq!(mounts[0].mount_path, "/mnt/stage/mystage");
        assert_eq!(mounts[1].mount_path, SCRATCH_MOUNT_PATH);

        let volumes = doc.spec.volumes.as_ref().unwrap();
        assert_eq!(volumes[0].source, VolumeSource::Stage);
        assert_eq!(volumes[0].stage_config.as_ref().unwrap().name, "@MYSTAGE");
        assert_eq!(volumes[1].source, VolumeSource::Local);
    }

    #[test]
    fn no_memory_means_no_memory_key() {
        let mappings = RegistryMappings::new();
        let doc = JobSpecBuilder::new(&mappings).build(&task()).unwrap();

        assert!(doc.container().unwrap().resources.is_none());
        let yaml = doc.to_yaml().unwrap();
        assert!(!yaml.contains("memory"));
        assert!(!yaml.contains("resources"));
        assert!(!yaml.contains("null"));
    }

    #[test]
    fn cpu_only_requests_contain_only_cpu() {
        let mappings = RegistryMappings::new();
        let doc = JobSpecBuilder::new(&mappings)
            .build(&task().with_cpus(4))
            .unwrap();

        let yaml = doc.to_yaml().unwrap();
        let value: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        let requests = &value["spec"]["containers"][0]["resources"]["requests"];

        let keys: Vec<_> = requests
            .as_mapping()
            .unwrap()
            .keys()
            .map(|k| k.as_str().unwrap().to_string())
            .collect();
        assert_eq!(keys, vec!["cpu"]);
        assert_eq!(requests["cpu"].as_u64(), Some(4));
    }

    #[test]
    fn memory_rounds_up_to_whole_mebibytes() {
        let mappings = RegistryMappings::new();
        let doc = JobSpecBuilder::new(&mappings)
            .build(&task().with_memory_bytes(MEBIBYTE + 1))
            .unwrap();

        let requests = &doc.container().unwrap().resources.as_ref().unwrap().requests;
        assert_eq!(requests.memory.as_deref(), Some("2Mi"));
        assert!(requests.cpu.is_none());
    }

    #[test]
    fn local_work_dir_only_gets_scratch() {
        let mappings = RegistryMappings::new();
        let doc = JobSpecBuilder::new(&mappings)
            .build(&task().with_work_dir("/data/work/ab"))
            .unwrap();

        let c = doc.container().unwrap();
        assert_eq!(c.command[2], "cd /data/work/ab && bash .command.run");
        assert_eq!(c.volume_mounts.as_ref().unwrap().len(), 1);
        assert_eq!(doc.spec.volumes.as_ref().unwrap().len(), 1);
        assert_eq!(c.image, "docker.io/alpine:latest");
    }

    #[test]
    fn env_is_forwarded() {
        let mappings = RegistryMappings::new();
        let env: Env = [("NXF_TASK_WORKDIR", "/mnt/stage/mystage/work")].into_iter().collect();
        let doc = JobSpecBuilder::new(&mappings)
            .build(&task().with_env(env))
            .unwrap();

        let yaml = doc.to_yaml().unwrap();
        assert!(yaml.contains("NXF_TASK_WORKDIR: /mnt/stage/mystage/work"));
    }

    #[test]
    fn missing_image_is_fatal() {
        let mappings = RegistryMappings::new();
        let err = JobSpecBuilder::new(&mappings)
            .build(&JobTask::new("1", "x").with_work_dir("/w"))
            .unwrap_err();
        assert!(matches!(err, CoreError::MissingImage { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn malformed_stage_work_dir_is_rejected() {
        let mappings = RegistryMappings::new();
        let err = JobSpecBuilder::new(&mappings)
            .build(&task().with_work_dir("virtualscheme://MYSTAGE/work"))
            .unwrap_err();
        assert!(err.is_fatal());
    }
}
