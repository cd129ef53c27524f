//! Registry of in-flight forwarding contexts.
//!
//! Every request that matched a route holds an [`InFlightGuard`] from the
//! moment it is dispatched until its response (or spliced connection) is
//! finished. Dropping the guard removes the entry, so removal happens exactly
//! once whichever path ends the request.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::watch;

/// Global atomic counter for context IDs.
static CONTEXT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier of a forwarding context within this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    pub fn new() -> Self {
        Self(CONTEXT_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// What the lifecycle manager knows about an in-flight request.
#[derive(Debug, Clone)]
pub struct InFlightEntry {
    pub correlation_id: String,
    pub route: String,
    pub is_upgrade: bool,
    pub started: Instant,
}

/// Concurrent set of live forwarding contexts.
#[derive(Debug)]
pub struct InFlightSet {
    entries: DashMap<ContextId, InFlightEntry>,
    /// Count published for waiters. Incremented before insert and
    /// decremented after removal, so it never under-reports.
    count: watch::Sender<usize>,
    force_close: watch::Sender<bool>,
}

impl InFlightSet {
    pub fn new() -> Arc<Self> {
        let (count, _) = watch::channel(0);
        let (force_close, _) = watch::channel(false);
        Arc::new(Self {
            entries: DashMap::new(),
            count,
            force_close,
        })
    }

    /// Add an entry. The returned guard removes it on drop.
    pub fn register(self: &Arc<Self>, entry: InFlightEntry) -> InFlightGuard {
        let id = ContextId::new();
        self.count.send_modify(|n| *n += 1);
        self.entries.insert(id, entry);
        crate::observability::metrics::set_in_flight(self.len());
        InFlightGuard {
            id,
            set: Arc::clone(self),
        }
    }

    fn remove(&self, id: ContextId) {
        if self.entries.remove(&id).is_some() {
            self.count.send_modify(|n| *n = n.saturating_sub(1));
            crate::observability::metrics::set_in_flight(self.len());
        }
    }

    pub fn len(&self) -> usize {
        *self.count.borrow()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current entries, for diagnostics at shutdown.
    pub fn snapshot(&self) -> Vec<(ContextId, InFlightEntry)> {
        self.entries
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect()
    }

    /// Resolve once no contexts are registered.
    pub async fn wait_empty(&self) {
        let mut rx = self.count.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Ask every long-lived context (spliced connections) to close now.
    pub fn force_close(&self) {
        self.force_close.send_replace(true);
    }

    pub fn is_force_closing(&self) -> bool {
        *self.force_close.borrow()
    }

    /// Resolve when [`force_close`](Self::force_close) has been called.
    pub async fn force_closed(&self) {
        let mut rx = self.force_close.subscribe();
        let _ = rx.wait_for(|closing| *closing).await;
    }
}

/// Membership of one context in the [`InFlightSet`].
#[derive(Debug)]
pub struct InFlightGuard {
    id: ContextId,
    set: Arc<InFlightSet>,
}

impl InFlightGuard {
    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn set(&self) -> &Arc<InFlightSet> {
        &self.set
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.remove(self.id);
        tracing::trace!(context_id = %self.id, "Context left in-flight set");
    }
}
