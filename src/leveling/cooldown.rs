use dashmap::{mapref::entry::Entry, DashMap};
use std::{
    hash::Hash,
    sync::atomic::{AtomicU32, Ordering},
    time::Duration,
};
use tokio::time::Instant;

/// Expired buckets are swept once every this many `try_consume` calls.
const PRUNE_EVERY: u32 = 1024;

/// Fixed-window rate limiter: at most `limit` events per `window` for each key.
///
/// Buckets live in memory only and are lost on restart.  Calls for the same key are serialized
/// by the map's shard lock; calls for other keys don't wait on each other beyond that.
pub struct CooldownTracker<K> {
    window: Duration,
    limit: u32,
    buckets: DashMap<K, Bucket>,
    calls: AtomicU32,
}

struct Bucket {
    window_start: Instant,
    used: u32,
}

impl<K: Eq + Hash> CooldownTracker<K> {
    pub fn new(window: Duration, limit: u32) -> Self {
        Self {
            window,
            limit: limit.max(1),
            buckets: DashMap::new(),
            calls: AtomicU32::new(0),
        }
    }

    /// Take a token for `key` if one is left in the current window.  Denied attempts don't
    /// count against the key.
    pub fn try_consume(&self, key: K, now: Instant) -> bool {
        // Must run before `entry` below takes a shard lock.
        if self.calls.fetch_add(1, Ordering::Relaxed) % PRUNE_EVERY == PRUNE_EVERY - 1 {
            self.prune(now);
        }

        match self.buckets.entry(key) {
            Entry::Vacant(entry) => {
                entry.insert(Bucket {
                    window_start: now,
                    used: 1,
                });
                true
            }
            Entry::Occupied(mut entry) => {
                let bucket = entry.get_mut();
                if now.saturating_duration_since(bucket.window_start) >= self.window {
                    *bucket = Bucket {
                        window_start: now,
                        used: 1,
                    };
                    true
                } else if bucket.used < self.limit {
                    bucket.used += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Time left until `key` may consume again, `None` if it may consume now.
    pub fn retry_after(&self, key: &K, now: Instant) -> Option<Duration> {
        let bucket = self.buckets.get(key)?;
        let elapsed = now.saturating_duration_since(bucket.window_start);
        if elapsed >= self.window || bucket.used < self.limit {
            None
        } else {
            Some(self.window - elapsed)
        }
    }

    /// Drop every bucket whose window has ended.  Such a key would start a fresh window on its
    /// next event anyway.
    pub fn prune(&self, now: Instant) {
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.window_start) < self.window);
    }

    /// Drop any record of `key`.
    pub fn forget(&self, key: &K) {
        self.buckets.remove(key);
    }
}
