mod kv;
pub use kv::KeyValue;

mod env;
pub use env::Env;

mod constants;
pub use constants::{MEBIBYTE, SCRATCH_MOUNT_PATH, STAGE_MOUNT_ROOT, STAGE_SCHEME};
