//! Live connection bookkeeping.
//!
//! The [`ConnectionRegistry`] is the single source of truth for which clients
//! are connected. The socket server adds an entry when it accepts a
//! connection and removes it when the connection closes; everything else
//! (tools, broadcast, status reporting) only reads from it. Lifecycle events
//! are re-published to subscribed [`ConnectionObserver`]s after the registry
//! lock has been released.

mod observer;

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use time::OffsetDateTime;

pub use self::observer::{ConnectionObserver, StructuredConnectionObserver};

/// Identifier assigned to a connection on accept. Never reused.
pub type ConnectionId = u64;

/// Write side of a connection as seen by the registry.
///
/// The socket itself stays owned by the transport; the registry only holds
/// this handle so broadcast and shutdown can reach every peer.
pub trait FrameSink: Send + Sync {
    /// Writes one complete, already delimited frame.
    fn send_frame(&self, frame: &[u8]) -> io::Result<()>;

    /// Stops reading further requests while leaving the write side open.
    fn close_read(&self) -> io::Result<()> {
        Ok(())
    }

    /// Ends the connection in both directions.
    fn close(&self) -> io::Result<()>;
}

/// Identity of a freshly accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionMeta {
    remote: SocketAddr,
}

impl ConnectionMeta {
    /// Records the peer address reported by `accept`.
    #[must_use]
    pub const fn new(remote: SocketAddr) -> Self {
        Self { remote }
    }
}

/// Snapshot of a registered connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSummary {
    /// Registry-assigned identifier.
    pub id: ConnectionId,
    /// Peer IP address.
    pub address: IpAddr,
    /// Peer TCP port.
    pub port: u16,
    /// Wall-clock time the connection was accepted.
    pub connected_at: OffsetDateTime,
    /// Whole seconds since `connected_at`, computed when the snapshot is taken.
    pub connected_for_secs: u64,
}

struct Connection {
    id: ConnectionId,
    meta: ConnectionMeta,
    connected_at: OffsetDateTime,
    sink: Arc<dyn FrameSink>,
}

impl Connection {
    fn summary(&self, now: OffsetDateTime) -> ConnectionSummary {
        let elapsed = (now - self.connected_at).whole_seconds();
        ConnectionSummary {
            id: self.id,
            address: self.meta.remote.ip(),
            port: self.meta.remote.port(),
            connected_at: self.connected_at,
            connected_for_secs: u64::try_from(elapsed).unwrap_or(0),
        }
    }
}

/// Process-wide table of open connections.
pub struct ConnectionRegistry {
    connections: Mutex<BTreeMap<ConnectionId, Connection>>,
    last_id: AtomicU64,
    observers: RwLock<Vec<Arc<dyn ConnectionObserver>>>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ConnectionRegistry")
            .field("count", &self.count())
            .field("last_id", &self.last_id.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl ConnectionRegistry {
    /// Creates an empty registry with no observers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(BTreeMap::new()),
            last_id: AtomicU64::new(0),
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Registers an observer for subsequent lifecycle events.
    pub fn subscribe(&self, observer: Arc<dyn ConnectionObserver>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    /// Registers a connection and returns its newly assigned identifier.
    pub fn add(&self, meta: ConnectionMeta, sink: Arc<dyn FrameSink>) -> ConnectionId {
        let id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;
        let connection = Connection {
            id,
            meta,
            connected_at: OffsetDateTime::now_utc(),
            sink,
        };
        let summary = connection.summary(connection.connected_at);
        self.lock().insert(id, connection);
        self.notify(|observer| observer.connected(&summary));
        id
    }

    /// Removes a connection, returning its final summary when it was present.
    pub fn remove(&self, id: ConnectionId) -> Option<ConnectionSummary> {
        let removed = self.lock().remove(&id)?;
        let summary = removed.summary(OffsetDateTime::now_utc());
        self.notify(|observer| observer.disconnected(&summary));
        Some(summary)
    }

    /// Summaries of every open connection, ordered by identifier.
    #[must_use]
    pub fn list(&self) -> Vec<ConnectionSummary> {
        let now = OffsetDateTime::now_utc();
        self.lock()
            .values()
            .map(|connection| connection.summary(now))
            .collect()
    }

    /// Number of open connections.
    #[must_use]
    pub fn count(&self) -> usize {
        self.lock().len()
    }

    /// Whether any connection is open.
    #[must_use]
    pub fn has_any(&self) -> bool {
        !self.lock().is_empty()
    }

    /// Write handles for every open connection, ordered by identifier.
    pub(crate) fn sinks(&self) -> Vec<(ConnectionId, Arc<dyn FrameSink>)> {
        self.lock()
            .values()
            .map(|connection| (connection.id, Arc::clone(&connection.sink)))
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<ConnectionId, Connection>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, event: impl Fn(&dyn ConnectionObserver)) {
        let observers = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for observer in &observers {
            event(observer.as_ref());
        }
    }
}
