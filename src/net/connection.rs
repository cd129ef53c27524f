//! Client connection identity and counting.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::net::ConnectionPermit;

/// Global atomic counter for connection IDs.
/// Relaxed ordering is enough, only uniqueness is needed.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Counts open client connections.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active_count: Arc<AtomicU64>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new connection from `peer`. The guard decrements the count
    /// on drop.
    pub fn track(&self, peer: SocketAddr) -> ConnectionGuard {
        let active = self.active_count.fetch_add(1, Ordering::SeqCst) + 1;
        crate::observability::metrics::set_open_connections(active);
        let id = ConnectionId::new();
        tracing::trace!(connection_id = %id, peer_addr = %peer, active, "Connection opened");
        ConnectionGuard {
            active_count: Arc::clone(&self.active_count),
            id,
            peer,
            opened: Instant::now(),
        }
    }

    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }
}

/// Guard that tracks a connection's lifetime.
#[derive(Debug)]
pub struct ConnectionGuard {
    active_count: Arc<AtomicU64>,
    id: ConnectionId,
    peer: SocketAddr,
    opened: Instant,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let active = self.active_count.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        crate::observability::metrics::set_open_connections(active);
        tracing::trace!(
            connection_id = %self.id,
            peer_addr = %self.peer,
            open_ms = self.opened.elapsed().as_millis() as u64,
            "Connection closed"
        );
    }
}

/// Everything that keeps one client connection counted: its tracker guard
/// and its listener slot.
///
/// Shared between the connection task and, after a protocol upgrade, the
/// splice that takes the socket over. The slot is released when the last
/// holder drops it.
#[derive(Debug)]
pub struct ConnectionLease {
    guard: ConnectionGuard,
    _permit: ConnectionPermit,
}

impl ConnectionLease {
    pub fn new(guard: ConnectionGuard, permit: ConnectionPermit) -> Arc<Self> {
        Arc::new(Self {
            guard,
            _permit: permit,
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.guard.id()
    }

    pub fn peer(&self) -> SocketAddr {
        self.guard.peer()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }

    #[test]
    fn connection_tracker_counts() {
        let tracker = ConnectionTracker::new();
        assert_eq!(tracker.active_count(), 0);

        let peer = SocketAddr::from(([127, 0, 0, 1], 40000));
        let guard1 = tracker.track(peer);
        let guard2 = tracker.track(peer);
        assert_eq!(tracker.active_count(), 2);
        assert_ne!(guard1.id(), guard2.id());
        assert_eq!(guard1.peer(), peer);

        drop(guard1);
        assert_eq!(tracker.active_count(), 1);
        drop(guard2);
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn lease_holds_slot_until_last_holder_drops() {
        let tcp = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = tcp.local_addr().unwrap();
        let listener = crate::net::Listener::from_tcp(tcp, 1).unwrap();
        let tracker = ConnectionTracker::new();

        let _client = tokio::net::TcpStream::connect(addr).await.unwrap();
        let (_stream, peer, permit) = listener.accept().await.unwrap();

        let lease = ConnectionLease::new(tracker.track(peer), permit);
        let handed_off = Arc::clone(&lease);
        assert_eq!(handed_off.peer(), peer);

        drop(lease);
        assert_eq!(listener.available_permits(), 0);
        assert_eq!(tracker.active_count(), 1);

        drop(handed_off);
        assert_eq!(listener.available_permits(), 1);
        assert_eq!(tracker.active_count(), 0);
    }
}
