//! In-memory control plane for tests.
//!
//! [`MockConnector`] hands out [`MockConnection`]s that share one scripted
//! backend: queued statement statuses, a repository catalog and canned log
//! output.
use std::{
    collections::{HashMap, VecDeque},
    path::PathBuf,
    sync::{
        Arc, Mutex, OnceLock,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;

use crate::{
    auth::{AuthSource, ConnectionParams},
    control::{Connection, Connector, ControlError, QueryHandle, QueryStatus, Row},
};

const MOCK_PROFILE: &str = "default_connection_name = \"mock\"\n\n[mock]\naccount = \"mock\"\n";

/// Credential source that always resolves to the `mock` profile.
pub fn mock_auth() -> AuthSource {
    static PROFILE: OnceLock<PathBuf> = OnceLock::new();
    let path = PROFILE.get_or_init(|| {
        let path = std::env::temp_dir().join(format!("remex-mock-{}.toml", std::process::id()));
        std::fs::write(&path, MOCK_PROFILE).expect("write mock profile store");
        path
    });
    AuthSource::default()
        .with_token_path(path.with_extension("no-token"))
        .with_profile_path(path.clone())
        .with_env(|_| None)
}

#[derive(Default)]
struct Script {
    statuses: Mutex<VecDeque<QueryStatus>>,
    last_status: Mutex<Option<QueryStatus>>,
    repositories: Mutex<HashMap<String, String>>,
    logs: Mutex<Option<Result<String, String>>>,
    fail_submit: AtomicBool,
    status_polls: AtomicUsize,
    cancels: AtomicUsize,
    executed: Mutex<Vec<String>>,
}

/// Scripted connector.
#[derive(Default)]
pub struct MockConnector {
    script: Arc<Script>,
    connections: Mutex<Vec<Arc<MockConnection>>>,
    fail_connects: AtomicBool,
    params: Mutex<Vec<ConnectionParams>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `connect` fail.
    pub fn fail_connects(&self, fail: bool) {
        self.fail_connects.store(fail, Ordering::SeqCst);
    }

    /// Make every following `execute_async` fail.
    pub fn fail_submits(&self, fail: bool) {
        self.script.fail_submit.store(fail, Ordering::SeqCst);
    }

    /// Queue statuses reported by successive polls. The last one repeats;
    /// before any is queued the job is pending.
    pub fn push_statuses(&self, statuses: impl IntoIterator<Item = QueryStatus>) {
        self.script.statuses.lock().unwrap().extend(statuses);
    }

    /// Register a repository in the catalog.
    pub fn add_repository(&self, name: &str, url: &str) {
        self.script
            .repositories
            .lock()
            .unwrap()
            .insert(name.to_string(), url.to_string());
    }

    /// Set the outcome of the next log queries.
    pub fn set_logs(&self, logs: Result<&str, &str>) {
        *self.script.logs.lock().unwrap() = Some(logs.map(str::to_string).map_err(str::to_string));
    }

    /// Number of sessions opened so far.
    pub fn created(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    /// The `n`-th session opened by this connector.
    pub fn connection(&self, n: usize) -> Arc<MockConnection> {
        Arc::clone(&self.connections.lock().unwrap()[n])
    }

    /// A session sharing this connector's script but unknown to any pool.
    pub fn open_detached(&self, id: &str) -> Arc<MockConnection> {
        Arc::new(MockConnection::new(id.to_string(), Arc::clone(&self.script)))
    }

    /// Statements submitted with `execute_async`, across all sessions.
    pub fn executed(&self) -> Vec<String> {
        self.script.executed.lock().unwrap().clone()
    }

    pub fn status_polls(&self) -> usize {
        self.script.status_polls.load(Ordering::SeqCst)
    }

    pub fn cancels(&self) -> usize {
        self.script.cancels.load(Ordering::SeqCst)
    }

    /// Parameters seen by `connect`, in call order.
    pub fn params(&self) -> Vec<ConnectionParams> {
        self.params.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, params: &ConnectionParams) -> Result<Arc<dyn Connection>, ControlError> {
        if self.fail_connects.load(Ordering::SeqCst) {
            return Err(ControlError::Auth("mock login refused".into()));
        }
        self.params.lock().unwrap().push(params.clone());

        let mut conns = self.connections.lock().unwrap();
        let conn = Arc::new(MockConnection::new(
            format!("mock-session-{}", conns.len() + 1),
            Arc::clone(&self.script),
        ));
        conns.push(Arc::clone(&conn));
        Ok(conn)
    }
}

/// Scripted session.
pub struct MockConnection {
    id: String,
    closed: AtomicBool,
    script: Arc<Script>,
    queries: AtomicUsize,
}

impl MockConnection {
    fn new(id: String, script: Arc<Script>) -> Self {
        Self {
            id,
            closed: AtomicBool::new(false),
            script,
            queries: AtomicUsize::new(0),
        }
    }

    /// Simulate the server dropping the session.
    pub fn force_close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn ensure_open(&self) -> Result<(), ControlError> {
        if self.is_closed() {
            return Err(ControlError::Closed(self.id.clone()));
        }
        Ok(())
    }
}

/// Last single-quoted literal in a statement.
fn last_literal(sql: &str) -> Option<&str> {
    let end = sql.rfind('\'')?;
    let start = sql[..end].rfind('\'')?;
    Some(&sql[start + 1..end])
}

#[async_trait]
impl Connection for MockConnection {
    fn session_id(&self) -> &str {
        &self.id
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    async fn execute_async(&self, sql: &str) -> Result<QueryHandle, ControlError> {
        self.ensure_open()?;
        if self.script.fail_submit.load(Ordering::SeqCst) {
            return Err(ControlError::Statement("mock submission rejected".into()));
        }
        self.script.executed.lock().unwrap().push(sql.to_string());
        let n = self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(QueryHandle::new(format!("{}-q{n}", self.id)))
    }

    async fn query_status(&self, _query: &QueryHandle) -> Result<QueryStatus, ControlError> {
        self.ensure_open()?;
        self.script.status_polls.fetch_add(1, Ordering::SeqCst);

        let next = self.script.statuses.lock().unwrap().pop_front();
        let mut last = self.script.last_status.lock().unwrap();
        if let Some(status) = next {
            *last = Some(status);
        }
        Ok(last.clone().unwrap_or(QueryStatus::Pending))
    }

    async fn cancel(&self, _query: &QueryHandle) -> Result<(), ControlError> {
        self.script.cancels.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn query_rows(&self, sql: &str) -> Result<Vec<Row>, ControlError> {
        self.ensure_open()?;
        let Some(name) = last_literal(sql) else {
            return Ok(Vec::new());
        };
        let repos = self.script.repositories.lock().unwrap();
        Ok(repos
            .get(name)
            .map(|url| {
                let mut row = Row::new();
                row.insert("name".into(), name.to_string());
                row.insert("repository_url".into(), url.clone());
                vec![row]
            })
            .unwrap_or_default())
    }

    async fn query_scalar(&self, _sql: &str) -> Result<Option<String>, ControlError> {
        self.ensure_open()?;
        match self.script.logs.lock().unwrap().clone() {
            None => Ok(None),
            Some(Ok(text)) => Ok(Some(text)),
            Some(Err(msg)) => Err(ControlError::Statement(msg)),
        }
    }
}
