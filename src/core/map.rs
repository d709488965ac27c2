use crate::core::listener::{EvictionListener, ListenerId};
use std::time::Duration;

/// The two grid capabilities the probe depends on.
///
/// A `TimerMap` stores entries with a per-entry time to live and announces
/// every entry it evicts on expiry. Nothing else about the grid (replication,
/// partition ownership, membership) is visible through this trait.
pub trait TimerMap<K, V>: Send + Sync {
    /// Schedules `key → value` to be stored with the given time to live.
    ///
    /// This is "fire-and-forget": the call returns before the entry is
    /// stored, and a put that cannot be applied is dropped without telling
    /// the caller. The TTL clock starts when the put is applied.
    fn put_with_expiry(&self, key: K, value: V, ttl: Duration);

    /// Registers `listener` for evictions of entries held by the local node.
    ///
    /// The listener is invoked at most once per evicted entry.
    fn subscribe_local_eviction<L>(&self, listener: L) -> ListenerId
    where
        L: EvictionListener<K, V> + 'static;
}
