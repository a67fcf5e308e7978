//! Session management.
//!
//! [`ConnectionManager`] owns the single logical session to the backend. It
//! opens the session lazily, hands out clones of the live handle, and
//! transparently reopens it (with bounded retry) once the backend reports it
//! closed.

use crate::db::backend::{Backend, ConnectionParams, Session};
use crate::db::retry::RetryPolicy;
use crate::error::{WatchError, WatchResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ConnectionManager {
    backend: Arc<dyn Backend>,
    params: ConnectionParams,
    retry: RetryPolicy,
    connect_timeout: Duration,
    session: RwLock<Option<Arc<dyn Session>>>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("backend", &self.backend.name())
            .field("account", &self.params.account)
            .field("retry", &self.retry)
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Create a manager. No session is opened until the first `acquire`.
    pub fn new(backend: Arc<dyn Backend>, params: ConnectionParams, retry: RetryPolicy) -> Self {
        Self {
            backend,
            params,
            retry,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            session: RwLock::new(None),
        }
    }

    /// Override the per-attempt connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Return the live session, opening a new one if needed.
    ///
    /// Fails with [`WatchError::BackendUnavailable`] once the retry policy is
    /// exhausted, or immediately for a permanent error.
    pub async fn acquire(&self) -> WatchResult<Arc<dyn Session>> {
        // Fast path: shared lock, clone the handle
        {
            let current = self.session.read().await;
            if let Some(session) = current.as_ref().filter(|s| !s.is_closed()) {
                return Ok(Arc::clone(session));
            }
        }

        // Slow path: exclusive lock, re-check before reconnecting so that
        // concurrent callers racing here install only one session
        let mut current = self.session.write().await;
        if let Some(session) = current.as_ref().filter(|s| !s.is_closed()) {
            debug!("Session reopened by a concurrent caller");
            return Ok(Arc::clone(session));
        }

        let stale = current.take();
        let session = self.open_session(stale.is_some()).await?;
        *current = Some(Arc::clone(&session));
        drop(current);

        if let Some(stale) = stale {
            stale.close().await;
        }
        Ok(session)
    }

    /// Close the session on shutdown.
    pub async fn close(&self) {
        let stale = self.session.write().await.take();
        if let Some(stale) = stale {
            stale.close().await;
            info!(backend = self.backend.name(), "Backend session closed");
        }
    }

    /// Whether a live session is currently held.
    pub async fn is_connected(&self) -> bool {
        self.session
            .read()
            .await
            .as_ref()
            .is_some_and(|s| !s.is_closed())
    }

    async fn open_session(&self, reconnect: bool) -> WatchResult<Arc<dyn Session>> {
        info!(
            backend = self.backend.name(),
            account = %self.params.account,
            database = %self.params.database,
            warehouse = %self.params.warehouse,
            role = %self.params.role,
            reconnect,
            "Opening new backend session"
        );

        let backend = &self.backend;
        let params = &self.params;
        let timeout = self.connect_timeout;
        let session = self
            .retry
            .run("connect", move |_| backend.connect(params, timeout))
            .await
            .map_err(|e| WatchError::backend_unavailable(e.attempts, e.last))?;

        info!(
            backend = self.backend.name(),
            created_at = %session.created_at(),
            "Backend session established"
        );
        Ok(session)
    }
}
