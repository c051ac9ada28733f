mod domain;
pub use domain::{Env, KeyValue, MEBIBYTE, SCRATCH_MOUNT_PATH, STAGE_MOUNT_ROOT, STAGE_SCHEME};

mod error;
pub use error::{ModelError, ModelResult};

mod task;
pub use task::{JobTask, TaskId, TaskState};

pub mod stage;
pub use stage::StageUri;

pub mod document;
pub use document::JobSpecDocument;
