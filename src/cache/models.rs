//! Cache entry and statistics models.

// Author: kelexine (https://github.com/kelexine)

use std::time::Duration;
use tokio::time::Instant;

/// A single cached value with its lifetime bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    /// The cached value.
    pub data: T,
    /// When the entry was (re)inserted.
    pub created_at: Instant,
    /// How long the entry stays fresh.
    pub ttl: Duration,
    /// Successful reads since insertion. Drives eviction.
    pub access_count: u64,
}

impl<T> CacheEntry<T> {
    pub fn new(data: T, ttl: Duration) -> Self {
        Self {
            data,
            created_at: Instant::now(),
            ttl,
            access_count: 0,
        }
    }

    /// An entry is stale once its age exceeds the TTL.
    /// A zero TTL is stale immediately.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.ttl.is_zero() || now.saturating_duration_since(self.created_at) > self.ttl
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }
}

/// Point-in-time view of one entry, as reported by `get_stats`.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryStats {
    pub key: String,
    pub age: Duration,
    pub ttl: Duration,
    pub access_count: u64,
    pub expired: bool,
}

/// Statistics for cache operations.
#[derive(Debug, Default, Clone)]
pub struct CacheStats {
    /// Entries currently held, including expired ones not yet read.
    pub size: usize,
    /// Maximum number of entries.
    pub capacity: usize,
    /// Number of successful cache hits.
    pub hits: u64,
    /// Number of cache misses (absent or expired).
    pub misses: u64,
    /// Number of entries dropped to make room.
    pub evictions: u64,
    /// Per-entry details, in map iteration order.
    pub entries: Vec<EntryStats>,
}
