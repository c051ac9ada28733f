//! Executor registration and the shared context handed to task handlers.
use std::{fmt, sync::Arc};

use remex_model::{JobTask, StageUri, stage::is_stage_uri};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::{
    error::CoreError,
    handler::TaskExecutionHandler,
    metrics::{MetricsHandle, noop_metrics},
    pool::ConnectionPool,
    registry::RegistryMappings,
};

/// Executor settings, usually read from the pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExecutorConfig {
    /// Compute pool every job runs in.
    pub compute_pool: String,
    /// Run working directory; must be a stage URI.
    pub work_dir: Option<String>,
    /// Registry mappings, `external:internal` pairs separated by commas.
    pub registry_mappings: Option<String>,
    /// Run identifier used in job names. Generated when absent.
    pub run_id: Option<String>,
}

impl ExecutorConfig {
    /// Check the settings that make every submission impossible when wrong.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.compute_pool.trim().is_empty() {
            return Err(CoreError::MissingComputePool);
        }
        let work_dir = self.work_dir.as_deref().ok_or(CoreError::MissingWorkDir)?;
        if !is_stage_uri(work_dir) {
            return Err(CoreError::InvalidWorkDir(work_dir.to_string()));
        }
        Ok(())
    }
}

/// Dependencies shared by all handlers of one executor.
#[derive(Clone)]
pub struct ExecContext {
    pool: Arc<ConnectionPool>,
    mappings: Arc<RegistryMappings>,
    metrics: MetricsHandle,
    compute_pool: String,
    run_id: String,
}

impl ExecContext {
    /// Create a context with no registry mappings and no-op metrics.
    pub fn new(
        pool: Arc<ConnectionPool>,
        compute_pool: impl Into<String>,
        run_id: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            mappings: Arc::new(RegistryMappings::new()),
            metrics: noop_metrics(),
            compute_pool: compute_pool.into(),
            run_id: run_id.into(),
        }
    }

    pub fn with_mappings(mut self, mappings: RegistryMappings) -> Self {
        self.mappings = Arc::new(mappings);
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn mappings(&self) -> &RegistryMappings {
        &self.mappings
    }

    pub fn metrics(&self) -> &MetricsHandle {
        &self.metrics
    }

    pub fn compute_pool(&self) -> &str {
        &self.compute_pool
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }
}

impl fmt::Debug for ExecContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecContext")
            .field("compute_pool", &self.compute_pool)
            .field("run_id", &self.run_id)
            .field("mappings", &self.mappings.len())
            .field("metrics", &"<handle>")
            .finish()
    }
}

impl fmt::Display for ExecContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ExecContext(pool={}, run={}, mappings={})",
            self.compute_pool,
            self.run_id,
            self.mappings.len()
        )
    }
}

/// Registered executor: validated configuration plus resolved mappings.
#[derive(Debug)]
pub struct JobServiceExecutor {
    ctx: ExecContext,
    work_dir: StageUri,
}

impl JobServiceExecutor {
    /// Validate `config` and resolve registry mappings.
    ///
    /// Mappings are looked up once, with a single borrowed connection that
    /// is returned to the pool before this call completes.
    #[instrument(level = "debug", skip_all, fields(compute_pool = %config.compute_pool))]
    pub async fn register(
        config: ExecutorConfig,
        pool: Arc<ConnectionPool>,
        metrics: MetricsHandle,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        let work_dir = StageUri::parse(config.work_dir.as_deref().unwrap_or_default())?;

        let conn = pool.get_connection().await?;
        let mappings = RegistryMappings::resolve(&*conn, config.registry_mappings.as_deref()).await;
        pool.return_connection(Some(&conn)).await;
        let mappings = mappings?;

        let run_id = config
            .run_id
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());

        let ctx = ExecContext::new(pool, config.compute_pool, run_id)
            .with_mappings(mappings)
            .with_metrics(metrics);
        info!(%ctx, work_dir = %work_dir, "job service executor registered");
        Ok(Self { ctx, work_dir })
    }

    pub fn context(&self) -> &ExecContext {
        &self.ctx
    }

    /// Run working directory.
    pub fn work_dir(&self) -> &StageUri {
        &self.work_dir
    }

    /// Create the state machine for one task.
    pub fn create_handler(&self, task: JobTask) -> Result<TaskExecutionHandler, CoreError> {
        TaskExecutionHandler::new(task, self.ctx.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mock::{MockConnector, mock_auth},
        pool::{PoolConfig, PoolStats},
    };

    fn config() -> ExecutorConfig {
        ExecutorConfig {
            compute_pool: "GPU_POOL".into(),
            work_dir: Some("virtualscheme://stage/MYSTAGE/work".into()),
            registry_mappings: Some("docker.io:repoA".into()),
            run_id: Some("run1".into()),
        }
    }

    fn pool(connector: &Arc<MockConnector>) -> Arc<ConnectionPool> {
        Arc::new(ConnectionPool::with_auth(
            connector.clone(),
            PoolConfig::default(),
            mock_auth(),
        ))
    }

    #[tokio::test]
    async fn register_resolves_mappings_and_returns_connection() {
        let connector = Arc::new(MockConnector::new());
        connector.add_repository("repoA", "internal.example/repoA");
        let pool = pool(&connector);

        let exec = JobServiceExecutor::register(config(), pool.clone(), noop_metrics())
            .await
            .unwrap();

        assert_eq!(exec.context().mappings().get("docker.io"), Some("internal.example/repoA"));
        assert_eq!(exec.context().run_id(), "run1");
        assert_eq!(exec.work_dir().name(), "MYSTAGE");
        assert_eq!(pool.stats().await, PoolStats { tracked: 1, available: 1 });
    }

    #[tokio::test]
    async fn work_dir_must_be_a_stage_uri() {
        let connector = Arc::new(MockConnector::new());
        let cfg = ExecutorConfig {
            work_dir: Some("/home/user/work".into()),
            ..config()
        };

        let err = JobServiceExecutor::register(cfg, pool(&connector), noop_metrics())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidWorkDir(_)));
        assert!(err.is_fatal());
        assert_eq!(connector.created(), 0, "no connection before validation passes");
    }

    #[tokio::test]
    async fn missing_work_dir_and_pool_are_fatal() {
        let connector = Arc::new(MockConnector::new());

        let no_dir = ExecutorConfig { work_dir: None, ..config() };
        let err = JobServiceExecutor::register(no_dir, pool(&connector), noop_metrics())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::MissingWorkDir));

        let no_pool = ExecutorConfig { compute_pool: " ".into(), ..config() };
        let err = JobServiceExecutor::register(no_pool, pool(&connector), noop_metrics())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::MissingComputePool));
    }

    #[tokio::test]
    async fn run_id_is_generated_when_absent() {
        let connector = Arc::new(MockConnector::new());
        let cfg = ExecutorConfig { run_id: None, ..config() };

        let exec = JobServiceExecutor::register(cfg, pool(&connector), noop_metrics())
            .await
            .unwrap();
        assert_eq!(exec.context().run_id().len(), 32);
    }

    #[test]
    fn config_deserializes_camel_case_with_defaults() {
        let json = r#"{"computePool":"CPU_X64_S","workDir":"virtualscheme://stage/S/w"}"#;
        let cfg: ExecutorConfig = serde_json::from_str(json).unwrap();

        assert_eq!(cfg.compute_pool, "CPU_X64_S");
        assert!(cfg.registry_mappings.is_none());
        assert!(cfg.validate().is_ok());
    }
}
