use std::fmt;
use std::sync::Arc;

/// Notification that an entry expired and was evicted from a map.
///
/// The event owns the evicted key and the value the entry held when it was
/// removed. Listeners receive it by reference; the same event is shared by
/// every listener registered on the map.
#[derive(Debug, Clone)]
pub struct EntryEvent<K, V> {
    map_name: Arc<str>,
    key: K,
    old_value: V,
}

impl<K, V> EntryEvent<K, V> {
    #[inline]
    pub fn new(map_name: Arc<str>, key: K, old_value: V) -> Self {
        Self {
            map_name,
            key,
            old_value,
        }
    }

    /// Name of the map the entry was evicted from.
    #[inline]
    pub fn map_name(&self) -> &str {
        &self.map_name
    }

    #[inline]
    pub fn key(&self) -> &K {
        &self.key
    }

    /// The value the entry held when it was evicted.
    #[inline]
    pub fn old_value(&self) -> &V {
        &self.old_value
    }
}

/// Receives eviction notifications.
///
/// The grid invokes listeners from its event delivery threads. Events for the
/// same key arrive in order, but events for different keys may be delivered
/// concurrently and in any order, so implementations must be thread-safe.
pub trait EvictionListener<K, V>: Send + Sync {
    fn entry_evicted(&self, event: &EntryEvent<K, V>);
}

impl<K, V, F> EvictionListener<K, V> for F
where
    F: Fn(&EntryEvent<K, V>) + Send + Sync,
{
    #[inline]
    fn entry_evicted(&self, event: &EntryEvent<K, V>) {
        self(event)
    }
}

/// Handle returned on subscription, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub(crate) u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}
