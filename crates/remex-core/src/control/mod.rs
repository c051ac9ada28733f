//! Control-plane connection abstraction.
//!
//! The SQL driver itself lives outside this crate. Everything the core needs
//! from it is captured by [`Connector`] (authenticate and open a session) and
//! [`Connection`] (run statements on that session).
use std::{collections::HashMap, fmt, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;

use crate::auth::ConnectionParams;

/// Single result row, keyed by lowercase column name.
pub type Row = HashMap<String, String>;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("session '{0}' is closed")]
    Closed(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("statement failed: {0}")]
    Statement(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Identifier of a statement submitted with [`Connection::execute_async`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryHandle(String);

impl QueryHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Observed status of an asynchronous statement.
///
/// The service exposes no structured failure code, only a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryStatus {
    /// Statement accepted, job not started yet.
    Pending,
    /// Job container is running.
    Running,
    Success,
    Error(String),
}

impl QueryStatus {
    /// `true` once the job has been observed started or finished.
    pub fn has_started(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// `true` once the statement has finished, successfully or not.
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Success | Self::Error(_))
    }
}

/// One authenticated control-plane session.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Opaque identifier, unique per live session.
    fn session_id(&self) -> &str;

    /// Whether the underlying session has been closed.
    fn is_closed(&self) -> bool;

    /// Close the session. Closing twice is harmless.
    async fn close(&self);

    /// Submit a statement without waiting for it to finish.
    async fn execute_async(&self, sql: &str) -> Result<QueryHandle, ControlError>;

    /// Current status of a statement submitted on this session.
    async fn query_status(&self, query: &QueryHandle) -> Result<QueryStatus, ControlError>;

    /// Ask the service to abandon a submitted statement.
    async fn cancel(&self, query: &QueryHandle) -> Result<(), ControlError>;

    /// Run a statement and collect its rows.
    async fn query_rows(&self, sql: &str) -> Result<Vec<Row>, ControlError>;

    /// Run a statement and return the first column of the first row.
    async fn query_scalar(&self, sql: &str) -> Result<Option<String>, ControlError>;
}

/// Opens new sessions for the pool.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, params: &ConnectionParams) -> Result<Arc<dyn Connection>, ControlError>;
}

/// Quote a value as a single-quoted SQL string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_literal_doubles_single_quotes() {
        assert_eq!(quote_literal("plain"), "'plain'");
        assert_eq!(quote_literal("it's"), "'it''s'");
    }

    #[test]
    fn pending_and_running_are_not_done() {
        assert!(!QueryStatus::Pending.is_done());
        assert!(!QueryStatus::Running.is_done());
        assert!(QueryStatus::Success.is_done());
        assert!(QueryStatus::Error("boom".into()).is_done());
    }

    #[test]
    fn only_pending_has_not_started() {
        assert!(!QueryStatus::Pending.has_started());
        assert!(QueryStatus::Running.has_started());
        assert!(QueryStatus::Success.has_started());
        assert!(QueryStatus::Error("boom".into()).has_started());
    }
}
