//! Pool of long-lived control-plane sessions shared by every task handler.
//!
//! One lock guards both the FIFO of available sessions and the map of all
//! tracked sessions. New sessions are opened while the lock is held, so
//! concurrent borrowers queue behind a slow login instead of racing it.
//! Expiry is only evaluated when a session is borrowed.
use std::{
    collections::{HashMap, VecDeque},
    fmt,
    sync::Arc,
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, info, instrument, trace, warn};

use crate::{
    auth::AuthSource,
    control::{Connection, Connector},
    error::CoreError,
};

/// Default idle lifetime of a pooled session.
pub const DEFAULT_EXPIRY_SECS: u64 = 2 * 60 * 60;

/// Pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Sessions returned longer ago than this are discarded at the next borrow.
    pub expiry_secs: u64,
    /// Profile name used when no session token is available.
    pub connection_name: Option<String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            expiry_secs: DEFAULT_EXPIRY_SECS,
            connection_name: None,
        }
    }
}

impl PoolConfig {
    pub fn expiry(&self) -> Duration {
        Duration::from_secs(self.expiry_secs)
    }
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Sessions known to the pool, borrowed or not.
    pub tracked: usize,
    /// Sessions waiting to be borrowed.
    pub available: usize,
}

impl PoolStats {
    pub fn borrowed(&self) -> usize {
        self.tracked - self.available
    }
}

struct PooledConnection {
    conn: Arc<dyn Connection>,
    created_at: Instant,
    last_borrowed: Option<Instant>,
    last_returned: Option<Instant>,
}

impl PooledConnection {
    fn new(conn: Arc<dyn Connection>, now: Instant) -> Self {
        Self {
            conn,
            created_at: now,
            last_borrowed: Some(now),
            last_returned: None,
        }
    }

    fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_returned.unwrap_or(self.created_at))
    }
}

#[derive(Default)]
struct PoolInner {
    available: VecDeque<String>,
    tracked: HashMap<String, PooledConnection>,
}

enum Verdict {
    Expired,
    Dead,
}

/// Pool of authenticated control-plane sessions.
pub struct ConnectionPool {
    connector: Arc<dyn Connector>,
    auth: AuthSource,
    config: PoolConfig,
    inner: Mutex<PoolInner>,
}

impl ConnectionPool {
    /// Create a pool reading credentials from the default [`AuthSource`].
    pub fn new(connector: Arc<dyn Connector>, config: PoolConfig) -> Self {
        Self::with_auth(connector, config, AuthSource::default())
    }

    /// Create a pool with an explicit credential source.
    pub fn with_auth(connector: Arc<dyn Connector>, config: PoolConfig, auth: AuthSource) -> Self {
        Self {
            connector,
            auth,
            config,
            inner: Mutex::new(PoolInner::default()),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Borrow a session, opening a new one when none is reusable.
    ///
    /// Available sessions are tried oldest first. Expired ones are closed and
    /// closed ones dropped, both silently.
    #[instrument(level = "debug", skip(self))]
    pub async fn get_connection(&self) -> Result<Arc<dyn Connection>, CoreError> {
        let mut inner = self.inner.lock().await;
        let expiry = self.config.expiry();

        while let Some(id) = inner.available.pop_front() {
            let now = Instant::now();
            let verdict = match inner.tracked.get_mut(&id) {
                None => continue,
                Some(entry) if entry.idle_for(now) > expiry => Verdict::Expired,
                Some(entry) if entry.conn.is_closed() => Verdict::Dead,
                Some(entry) => {
                    let previous = entry.last_borrowed.replace(now);
                    trace!(
                        session = %id,
                        since_last_borrow = ?previous.map(|at| now.saturating_duration_since(at)),
                        "reusing pooled session"
                    );
                    return Ok(Arc::clone(&entry.conn));
                }
            };

            if let Some(entry) = inner.tracked.remove(&id) {
                match verdict {
                    Verdict::Expired => {
                        debug!(session = %id, idle = ?entry.idle_for(now), "discarding expired session");
                        entry.conn.close().await;
                    }
                    Verdict::Dead => {
                        debug!(session = %id, "discarding closed session");
                    }
                }
            }
        }

        let params = self.auth.resolve(self.config.connection_name.as_deref())?;
        let conn = self.connector.connect(&params).await.map_err(|e| {
            warn!(error = %e, "failed to open control plane session");
            CoreError::Connection(e.to_string())
        })?;

        let id = conn.session_id().to_string();
        if let Some(stale) = inner.tracked.remove(&id) {
            warn!(session = %id, "connector reused a tracked session id; dropping old entry");
            inner.available.retain(|a| a != &id);
            stale.conn.close().await;
        }
        inner
            .tracked
            .insert(id.clone(), PooledConnection::new(Arc::clone(&conn), Instant::now()));
        info!(session = %id, tracked = inner.tracked.len(), "opened control plane session");
        Ok(conn)
    }

    /// Give a borrowed session back.
    ///
    /// `None` and sessions the pool does not track are ignored. A session
    /// that was closed while borrowed is forgotten instead of requeued.
    #[instrument(level = "debug", skip_all)]
    pub async fn return_connection(&self, conn: Option<&Arc<dyn Connection>>) {
        let Some(conn) = conn else {
            return;
        };
        let id = conn.session_id();

        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;

        let Some(entry) = inner.tracked.get_mut(id) else {
            trace!(session = %id, "ignoring unknown session");
            return;
        };
        if !Arc::ptr_eq(&entry.conn, conn) {
            trace!(session = %id, "ignoring foreign session with a tracked id");
            return;
        }
        entry.last_returned = Some(Instant::now());

        if entry.conn.is_closed() {
            if let Some(entry) = inner.tracked.remove(id) {
                inner.available.retain(|a| a != id);
                debug!(session = %id, "returned session is closed; removed");
                entry.conn.close().await;
            }
            return;
        }
        if !inner.available.iter().any(|a| a == id) {
            inner.available.push_back(id.to_string());
            trace!(session = %id, available = inner.available.len(), "session returned");
        }
    }

    /// Close and forget every tracked session.
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        inner.available.clear();
        let count = inner.tracked.len();
        for (_, entry) in inner.tracked.drain() {
            entry.conn.close().await;
        }
        info!(closed = count, "connection pool shut down");
    }

    pub async fn stats(&self) -> PoolStats {
        let inner = self.inner.lock().await;
        PoolStats {
            tracked: inner.tracked.len(),
            available: inner.available.len(),
        }
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.config)
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}
