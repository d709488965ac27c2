use crate::core::entry::Entry;
use crate::core::listener::{EntryEvent, EvictionListener, ListenerId};
use crate::core::map::TimerMap;
use crate::grid::executor::{StripedExecutor, panic_message};
use crate::grid::partition::{Lookup, Partition, partition_id};
use crossbeam::utils::CachePadded;
use dashmap::DashMap;
use std::borrow::Borrow;
use std::hash::Hash;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering::Relaxed;
use std::time::{Duration, Instant};
use tracing::{error, trace};

/// A named, partitioned map whose entries expire after a per-entry TTL.
///
/// Obtained from [`GridNode::map`](crate::grid::GridNode::map). Cloning is
/// cheap and every clone refers to the same map.
///
/// # Expiry
/// Expired entries are invisible to [`get`](Self::get) immediately, but they
/// are only *evicted* (removed and announced to listeners) when the node's
/// expiration sweeper visits their partition, or when an access finds them
/// expired. The delay between the two is what the probe measures.
pub struct ExpiringMap<K, V>
where
    K: Eq + Hash,
{
    state: Arc<MapState<K, V>>,
}

impl<K, V> Clone for ExpiringMap<K, V>
where
    K: Eq + Hash,
{
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<K, V> ExpiringMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        name: &str,
        partition_count: usize,
        operations: Arc<StripedExecutor>,
        events: Arc<StripedExecutor>,
    ) -> Self {
        let partitions = (0..partition_count)
            .map(|_| CachePadded::new(Partition::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            state: Arc::new(MapState {
                name: Arc::from(name),
                partitions,
                listeners: DashMap::new(),
                next_listener_id: AtomicU64::new(1),
                operations,
                events,
            }),
        }
    }

    /// The type-erased view the expiration sweeper works with.
    pub(crate) fn expirable(&self) -> Arc<dyn Expirable> {
        self.state.clone()
    }

    pub fn name(&self) -> &str {
        &self.state.name
    }

    /// Returns a copy of the live value for `key`.
    ///
    /// An entry found expired is evicted on the spot and its listeners are
    /// notified, exactly as if the sweeper had found it.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let now = Instant::now();
        let partition_id = self.state.partition_of(key);
        let partition = &self.state.partitions[partition_id];

        match partition.lookup(key, now) {
            Lookup::Live(value) => Some(value),
            Lookup::Absent => None,
            Lookup::Expired => {
                if let Some((key, value)) = partition.remove_expired(key, now) {
                    self.state.dispatch_eviction(partition_id, key, value);
                }
                None
            }
        }
    }

    /// Removes `key` and returns its value if it was live.
    ///
    /// Removing an entry that had already expired counts as its eviction.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let partition_id = self.state.partition_of(key);
        let (key, entry) = self.state.partitions[partition_id].remove(key)?;

        if entry.is_expired() {
            self.state
                .dispatch_eviction(partition_id, key, entry.into_value());
            None
        } else {
            Some(entry.into_value())
        }
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.state.partitions.iter().map(|p| p.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unregisters a listener. Returns `false` if it was not registered.
    ///
    /// Events already queued for delivery may still reach the listener.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.state.listeners.remove(&id).is_some()
    }
}

impl<K, V> TimerMap<K, V> for ExpiringMap<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn put_with_expiry(&self, key: K, value: V, ttl: Duration) {
        let partition_id = self.state.partition_of(&key);
        let state = Arc::clone(&self.state);

        let submitted = self.state.operations.execute(
            partition_id as u64,
            Box::new(move || {
                state.partitions[partition_id].insert(key, Entry::new(value, ttl));
            }),
        );

        if !submitted {
            trace!(map = %self.state.name, "put dropped, node is shut down");
        }
    }

    fn subscribe_local_eviction<L>(&self, listener: L) -> ListenerId
    where
        L: EvictionListener<K, V> + 'static,
    {
        let id = ListenerId(self.state.next_listener_id.fetch_add(1, Relaxed));
        self.state.listeners.insert(id, Arc::new(listener));
        id
    }
}

/// Shared state behind every clone of an [`ExpiringMap`].
pub(crate) struct MapState<K, V>
where
    K: Eq + Hash,
{
    name: Arc<str>,
    partitions: Box<[CachePadded<Partition<K, V>>]>,
    listeners: DashMap<ListenerId, Arc<dyn EvictionListener<K, V>>>,
    next_listener_id: AtomicU64,
    operations: Arc<StripedExecutor>,
    events: Arc<StripedExecutor>,
}

impl<K, V> MapState<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    #[inline]
    fn partition_of<Q>(&self, key: &Q) -> usize
    where
        Q: Hash + ?Sized,
    {
        partition_id(key, self.partitions.len())
    }

    /// Hands an evicted entry to the event stripe owning its partition.
    ///
    /// All keys of a partition share a stripe, which keeps the events of any
    /// single key in order.
    fn dispatch_eviction(&self, partition_id: usize, key: K, old_value: V) {
        let listeners = self
            .listeners
            .iter()
            .map(|listener| Arc::clone(listener.value()))
            .collect::<Vec<_>>();

        if listeners.is_empty() {
            return;
        }

        let event = EntryEvent::new(Arc::clone(&self.name), key, old_value);
        let submitted = self.events.execute(
            partition_id as u64,
            Box::new(move || deliver(&listeners, &event)),
        );

        if !submitted {
            trace!(map = %self.name, "eviction event dropped, node is shut down");
        }
    }
}

/// Invokes every listener, isolating one listener's panic from the others.
fn deliver<K, V>(listeners: &[Arc<dyn EvictionListener<K, V>>], event: &EntryEvent<K, V>) {
    for listener in listeners {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| listener.entry_evicted(event))) {
            error!(
                map = event.map_name(),
                panic = %panic_message(&*payload),
                "eviction listener panicked"
            );
        }
    }
}

/// What the expiration sweeper needs from a map, without its key and value types.
pub(crate) trait Expirable: Send + Sync {
    fn name(&self) -> &str;

    /// Evicts the expired entries of `partitions` and returns how many there were.
    fn evict_expired(&self, partitions: &[usize], now: Instant) -> usize;
}

impl<K, V> Expirable for MapState<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn evict_expired(&self, partitions: &[usize], now: Instant) -> usize {
        let mut evicted = 0;

        for &partition_id in partitions {
            let Some(partition) = self.partitions.get(partition_id) else {
                continue;
            };

            for (key, value) in partition.evict_expired(now) {
                self.dispatch_eviction(partition_id, key, value);
                evicted += 1;
            }
        }

        evicted
    }
}
