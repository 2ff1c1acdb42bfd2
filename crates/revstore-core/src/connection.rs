//! Connection acquisition with bounded retry and scoped release.
//!
//! Connections are not pooled. Every logical operation acquires one through
//! [`ConnectionManager::acquire`], runs its commands, and lets the returned
//! [`ConnectionGuard`] close it on drop, whichever way the operation exits.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::backend::{BackendError, Connection, Connector, ErrorCode, translate};
use crate::config::{ServerProfile, ServerRegistry, StoreConfig};
use crate::error::{ConfigError, ConnectionError, Result};
use crate::query::Command;
use crate::types::{Outcome, Role};

/// How often and how patiently to retry a failed connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Blocking pause between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Hands out connections to registered servers.
pub struct ConnectionManager {
    registry: ServerRegistry,
    prefix: RwLock<String>,
    connector: Arc<dyn Connector>,
    retry: RetryPolicy,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("servers", &self.registry.names())
            .field("prefix", &*self.prefix.read())
            .field("retry", &self.retry)
            .finish()
    }
}

impl ConnectionManager {
    pub fn new(config: StoreConfig, connector: Arc<dyn Connector>) -> Self {
        let (prefix, registry) = config.into_registry();
        Self {
            registry,
            prefix: RwLock::new(prefix),
            connector,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn registry(&self) -> &ServerRegistry {
        &self.registry
    }

    /// See [`ServerRegistry::register`].
    pub fn register(&self, name: &str, profile: ServerProfile, update: bool) -> bool {
        self.registry.register(name, profile, update)
    }

    /// Prefix applied to every resolved database name.
    pub fn prefix(&self) -> String {
        self.prefix.read().clone()
    }

    pub fn set_prefix(&self, prefix: impl Into<String>) {
        *self.prefix.write() = prefix.into();
    }

    /// Open a connection to `server` for `role`.
    ///
    /// An unregistered server fails at once with [`ConfigError::UnknownServer`].
    /// Driver failures are retried per the [`RetryPolicy`]; once the budget is
    /// spent the last failure is returned as a [`ConnectionError`].
    pub fn acquire(&self, server: &str, role: Role) -> Result<ConnectionGuard> {
        let profile = self
            .registry
            .get(server)
            .ok_or_else(|| ConfigError::UnknownServer(server.to_string()))?;

        let attempts = self.retry.attempts.max(1);
        let mut last = BackendError::new(ErrorCode::Driver, "no attempt made");
        for attempt in 1..=attempts {
            match self.connector.connect(&profile, role) {
                Ok(conn) => {
                    debug!(server, ?role, attempt, "connection acquired");
                    return Ok(ConnectionGuard {
                        server: server.to_string(),
                        conn: Some(conn),
                    });
                }
                Err(e) => {
                    warn!(server, attempt, attempts, error = %e, "connection attempt failed");
                    last = e;
                    if attempt < attempts {
                        std::thread::sleep(self.retry.delay);
                    }
                }
            }
        }

        Err(ConnectionError {
            server: server.to_string(),
            attempts,
            code: last.code,
            message: last.message,
        }
        .into())
    }

    /// Acquire, run one command, release.
    pub fn run(&self, server: &str, role: Role, command: &Command) -> Result<Outcome> {
        self.acquire(server, role)?.run(command)
    }
}

/// A connection released when dropped.
pub struct ConnectionGuard {
    server: String,
    conn: Option<Box<dyn Connection>>,
}

impl fmt::Debug for ConnectionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionGuard")
            .field("server", &self.server)
            .field("open", &self.conn.is_some())
            .finish()
    }
}

impl ConnectionGuard {
    pub fn server(&self) -> &str {
        &self.server
    }

    /// Run a command, mapping driver errors onto the domain taxonomy.
    pub fn run(&mut self, command: &Command) -> Result<Outcome> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| translate(BackendError::driver("Connection is closed.")))?;
        debug!(server = %self.server, command = command.name(), "run");
        conn.run(command).map_err(translate)
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            conn.close();
        }
    }
}
