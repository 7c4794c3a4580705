//! # Cache and Rate Limiting
//!
//! Keyed TTL cache and sliding-window counter shared across tasks.
//! Both guard their maps with a mutex. Poisoned locks are recovered.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Keyed cache whose entries expire `ttl` after insertion
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, (Instant, V)>>,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Cached value if present and not expired; expired entries are evicted
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = lock(&self.entries);
        match entries.get(key) {
            Some((inserted, value)) if inserted.elapsed() < self.ttl => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: K, value: V) {
        // Zero TTL disables caching
        if self.ttl.is_zero() {
            return;
        }
        let mut entries = lock(&self.entries);
        let ttl = self.ttl;
        entries.retain(|_, (inserted, _)| inserted.elapsed() < ttl);
        entries.insert(key, (Instant::now(), value));
    }

    pub fn invalidate(&self, key: &K) {
        lock(&self.entries).remove(key);
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Counts events per key inside a sliding time window
#[derive(Debug)]
pub struct SlidingWindowCounter<K> {
    window: Duration,
    limit: usize,
    events: Mutex<HashMap<K, VecDeque<Instant>>>,
}

impl<K: Eq + Hash + Clone> SlidingWindowCounter<K> {
    /// `limit` of zero means unlimited
    pub fn new(window: Duration, limit: usize) -> Self {
        Self {
            window,
            limit,
            events: Mutex::new(HashMap::new()),
        }
    }

    /// Record an event for `key` if it fits in the window
    ///
    /// Returns `Err(retry_after)` when the limit is reached; the rejected
    /// attempt is not recorded.
    pub fn try_acquire(&self, key: &K) -> Result<(), Duration> {
        if self.limit == 0 {
            return Ok(());
        }

        let now = Instant::now();
        let mut events = lock(&self.events);
        let window = self.window;
        // Forget keys whose newest event has left the window
        events.retain(|_, timestamps| {
            timestamps
                .back()
                .is_some_and(|t| now.duration_since(*t) < window)
        });
        let timestamps = events.entry(key.clone()).or_default();
        while timestamps
            .front()
            .is_some_and(|t| now.duration_since(*t) >= window)
        {
            timestamps.pop_front();
        }

        if timestamps.len() >= self.limit {
            let retry_after = timestamps
                .front()
                .map(|oldest| window.saturating_sub(now.duration_since(*oldest)))
                .unwrap_or(window);
            return Err(retry_after);
        }

        timestamps.push_back(now);
        Ok(())
    }

    /// Events currently counted for `key`
    pub fn count(&self, key: &K) -> usize {
        let now = Instant::now();
        lock(&self.events)
            .get(key)
            .map(|timestamps| {
                timestamps
                    .iter()
                    .filter(|t| now.duration_since(**t) < self.window)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Number of keys with events still tracked
    pub fn tracked_keys(&self) -> usize {
        lock(&self.events).len()
    }
}
