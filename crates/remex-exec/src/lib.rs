//! Supervised execution of remote job-service tasks.
//!
//! [`drive`] runs one [`remex_core::RemoteJobSubmitter`] to completion;
//! [`JobServiceRunner`] wraps that loop into a taskvisor [`taskvisor::TaskRef`].
mod error;
pub use error::ExecError;

mod poll;
pub use poll::{PollConfig, drive, task_error_from};

mod runner;
pub use runner::JobServiceRunner;
