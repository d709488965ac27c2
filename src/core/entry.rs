use std::time::{Duration, Instant};

/// A value stored in a grid partition together with its expiration deadline.
#[derive(Debug, Clone)]
pub struct Entry<V> {
    /// The value stored in the map.
    value: V,
    /// Deadline after which the entry is expired; `None` never expires.
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    /// Creates an entry whose TTL starts now.
    ///
    /// A zero `ttl` creates an entry that never expires.
    #[inline]
    pub fn new(value: V, ttl: Duration) -> Self {
        Self::with_deadline(value, Instant::now(), ttl)
    }

    /// Creates an entry whose TTL starts at `start`.
    #[inline]
    pub fn with_deadline(value: V, start: Instant, ttl: Duration) -> Self {
        let expires_at = if ttl.is_zero() {
            None
        } else {
            start.checked_add(ttl)
        };

        Self { value, expires_at }
    }

    #[inline]
    pub fn value(&self) -> &V {
        &self.value
    }

    #[inline]
    pub fn into_value(self) -> V {
        self.value
    }

    #[inline]
    pub fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    /// Returns `true` once `now` has reached the deadline.
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }
}
