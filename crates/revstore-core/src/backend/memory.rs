//! In-process driver over a shared [`Engine`].
//!
//! Besides embedding, this driver is what the test suite connects through:
//! it counts opened and closed connections and can simulate an unreachable
//! backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use tracing::trace;

use super::{BackendError, Connection, Connector};
use crate::config::ServerProfile;
use crate::engine::Engine;
use crate::query::Command;
use crate::types::{Outcome, Role};

#[derive(Debug, Default)]
struct Counters {
    opened: AtomicUsize,
    closed: AtomicUsize,
    fail_next: AtomicU32,
    unreachable: AtomicBool,
}

/// Connects every profile to the same in-process engine.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    engine: Arc<Engine>,
    counters: Arc<Counters>,
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new(Arc::new(Engine::new()))
    }
}

impl MemoryConnector {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Connections handed out so far.
    pub fn opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    /// Connections released so far.
    pub fn closed(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    /// Refuse the next `n` connection attempts.
    pub fn fail_next(&self, n: u32) {
        self.counters.fail_next.store(n, Ordering::SeqCst);
    }

    /// Refuse every connection attempt until reset.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.counters.unreachable.store(unreachable, Ordering::SeqCst);
    }
}

impl Connector for MemoryConnector {
    fn connect(
        &self,
        profile: &ServerProfile,
        role: Role,
    ) -> Result<Box<dyn Connection>, BackendError> {
        let endpoint = profile.endpoint(role);
        if self.counters.unreachable.load(Ordering::SeqCst) {
            return Err(BackendError::driver(format!(
                "Could not connect to {}:{}.",
                endpoint.host, endpoint.port
            )));
        }
        let refused = self
            .counters
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(BackendError::driver(format!(
                "Connection refused by {}:{}.",
                endpoint.host, endpoint.port
            )));
        }

        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        trace!(host = %endpoint.host, port = endpoint.port, ?role, "memory connection opened");
        Ok(Box::new(MemoryConnection {
            engine: Arc::clone(&self.engine),
            counters: Arc::clone(&self.counters),
            open: true,
        }))
    }
}

struct MemoryConnection {
    engine: Arc<Engine>,
    counters: Arc<Counters>,
    open: bool,
}

impl Connection for MemoryConnection {
    fn run(&mut self, command: &Command) -> Result<Outcome, BackendError> {
        if !self.open {
            return Err(BackendError::driver("Connection is closed."));
        }
        self.engine.run(command)
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}
