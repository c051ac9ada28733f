pub mod auth;
pub mod builder;
pub mod control;
pub mod error;
pub mod executor;
pub mod handler;
pub mod metrics;
pub mod pool;
pub mod registry;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use auth::{AuthSource, ConnectionParams};
pub use builder::JobSpecBuilder;
pub use control::{Connection, ControlError, Connector, QueryHandle, QueryStatus, Row};
pub use error::CoreError;
pub use executor::{ExecContext, ExecutorConfig, JobServiceExecutor};
pub use handler::{RemoteJobSubmitter, TaskExecutionHandler};
pub use metrics::{JobOutcome, MetricsBackend, MetricsHandle, NoOpMetrics, noop_metrics};
pub use pool::{ConnectionPool, PoolConfig, PoolStats};
pub use registry::RegistryMappings;

pub mod prelude {
    pub use crate::error::CoreError;
    pub use crate::executor::{ExecutorConfig, JobServiceExecutor};
    pub use crate::handler::{RemoteJobSubmitter, TaskExecutionHandler};
    pub use crate::pool::{ConnectionPool, PoolConfig};
}
