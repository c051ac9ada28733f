/// URI scheme used for network-stage paths (`virtualscheme://stage/<name>/<path>`).
pub const STAGE_SCHEME: &str = "virtualscheme";

/// Root directory under which stages are mounted inside a job container.
pub const STAGE_MOUNT_ROOT: &str = "/mnt/stage";

/// Mount point of the local ephemeral volume every job receives.
pub const SCRATCH_MOUNT_PATH: &str = "/mnt/scratch";

/// Bytes in one mebibyte.
pub const MEBIBYTE: u64 = 1024 * 1024;
