use crate::core::entry::Entry;
use dashmap::DashMap;
use std::borrow::Borrow;
use std::hash::{Hash, Hasher};
use std::time::Instant;
use twox_hash::XxHash64;

/// Shards of the per-partition map; partitions are small so a few suffice.
const PARTITION_SHARDS: usize = 4;

/// Maps a key to its partition.
///
/// Keys and their borrowed forms hash identically, so lookups by `&str` land
/// on the same partition as the `String` they were stored with.
#[inline]
pub(crate) fn partition_id<Q>(key: &Q, partition_count: usize) -> usize
where
    Q: Hash + ?Sized,
{
    let mut hasher = XxHash64::with_seed(0);
    key.hash(&mut hasher);
    (hasher.finish() % partition_count as u64) as usize
}

/// One hash slice of a map's entries.
#[derive(Debug)]
pub(crate) struct Partition<K, V>
where
    K: Eq + Hash,
{
    entries: DashMap<K, Entry<V>>,
}

impl<K, V> Partition<K, V>
where
    K: Eq + Hash + Clone,
{
    pub(crate) fn new() -> Self {
        Self {
            entries: DashMap::with_shard_amount(PARTITION_SHARDS),
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Stores `entry`, replacing any previous entry for `key`.
    #[inline]
    pub(crate) fn insert(&self, key: K, entry: Entry<V>) {
        self.entries.insert(key, entry);
    }

    /// Looks `key` up as of `now`.
    pub(crate) fn lookup<Q>(&self, key: &Q, now: Instant) -> Lookup<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
        V: Clone,
    {
        match self.entries.get(key) {
            None => Lookup::Absent,
            Some(found) => {
                let entry = found.value();
                if entry.is_expired_at(now) {
                    Lookup::Expired
                } else {
                    Lookup::Live(entry.value().clone())
                }
            }
        }
    }

    /// Removes `key` only if its entry is expired as of `now`.
    ///
    /// Removal is atomic with the expiry check, so concurrent callers cannot
    /// both evict the same entry.
    #[inline]
    pub(crate) fn remove_expired<Q>(&self, key: &Q, now: Instant) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.entries
            .remove_if(key, |_, entry| entry.is_expired_at(now))
            .map(|(key, entry)| (key, entry.into_value()))
    }

    #[inline]
    pub(crate) fn remove<Q>(&self, key: &Q) -> Option<(K, Entry<V>)>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.entries.remove(key)
    }

    /// Evicts every entry expired as of `now` and returns them.
    ///
    /// Keys are collected under shard read locks first and removed one by one
    /// afterwards, so puts to the partition are never blocked for a whole scan.
    pub(crate) fn evict_expired(&self, now: Instant) -> Vec<(K, V)> {
        let expired = self
            .entries
            .iter()
            .filter(|entry| entry.value().is_expired_at(now))
            .map(|entry| entry.key().clone())
            .collect::<Vec<_>>();

        expired
            .iter()
            .filter_map(|key| self.remove_expired(key, now))
            .collect()
    }
}

/// Outcome of a [`Partition::lookup`].
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Lookup<V> {
    Absent,
    Expired,
    Live(V),
}
