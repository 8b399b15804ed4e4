//! In-memory store backend
//!
//! A `StoreBackend` over a `HashMap` with per-key expiry, glob SCAN and an
//! availability switch for simulating outages. It stands in for Redis in tests
//! and in single-process deployments (`CACHE_BACKEND=memory`).
//!
//! Expiry uses `tokio::time::Instant`, so paused-clock tests can advance time
//! with `tokio::time::advance`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{glob, StoreBackend, StoreError, StoreResult, StoreStats};

/// Entry in the in-memory store with expiration
struct StoreEntry {
    value: String,
    expires_at: Option<Instant>,
    /// Insertion sequence; SCAN cursors walk this order
    seq: u64,
}

impl StoreEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|exp| now >= exp).unwrap_or(false)
    }
}

/// In-memory backend
///
/// # Thread Safety
///
/// Uses RwLock for interior mutability; every operation holds the lock for
/// its whole read-modify-write, so increments are atomic.
pub struct InMemoryBackend {
    data: RwLock<HashMap<String, StoreEntry>>,
    available: AtomicBool,
    next_seq: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            next_seq: AtomicU64::new(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Simulate the store going down (`false`) or coming back (`true`)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of live (unexpired) keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.read().values().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear all entries (useful for test isolation)
    pub fn clear(&self) {
        self.write().clear();
    }

    fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    fn ensure_available(&self) -> StoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable)
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, StoreEntry>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, StoreEntry>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove `key` if it has expired, so later lookups see it as absent
    fn purge_if_expired(data: &mut HashMap<String, StoreEntry>, key: &str, now: Instant) {
        if data.get(key).is_some_and(|e| e.is_expired(now)) {
            data.remove(key);
        }
    }
}

fn expiry(ttl_seconds: u64, now: Instant) -> Instant {
    now + Duration::from_secs(ttl_seconds)
}

#[async_trait]
impl StoreBackend for InMemoryBackend {
    async fn ping(&self) -> StoreResult<()> {
        self.ensure_available()
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.ensure_available()?;
        let now = Instant::now();
        let value = self
            .read()
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.value.clone());

        let counter = if value.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> StoreResult<()> {
        self.ensure_available()?;
        let now = Instant::now();
        let seq = self.next_seq();
        self.write().insert(
            key.to_string(),
            StoreEntry {
                value: value.to_string(),
                expires_at: ttl_seconds.map(|ttl| expiry(ttl, now)),
                seq,
            },
        );
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<u64> {
        self.ensure_available()?;
        let now = Instant::now();
        let mut data = self.write();
        let deleted = keys
            .iter()
            .filter_map(|key| data.remove(key))
            .filter(|entry| !entry.is_expired(now))
            .count();
        Ok(deleted as u64)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.ensure_available()?;
        let now = Instant::now();
        Ok(self.read().get(key).is_some_and(|e| !e.is_expired(now)))
    }

    async fn increment(
        &self,
        key: &str,
        amount: i64,
        ttl_seconds: Option<u64>,
    ) -> StoreResult<i64> {
        self.ensure_available()?;
        let now = Instant::now();
        let seq = self.next_seq();
        let mut data = self.write();
        Self::purge_if_expired(&mut data, key, now);

        let entry = data.entry(key.to_string()).or_insert_with(|| StoreEntry {
            value: "0".to_string(),
            expires_at: None,
            seq,
        });

        let current: i64 = entry
            .value
            .parse()
            .map_err(|_| StoreError::NotAnInteger(key.to_string()))?;
        let updated = current + amount;
        entry.value = updated.to_string();

        if let (Some(ttl), None) = (ttl_seconds, entry.expires_at) {
            entry.expires_at = Some(expiry(ttl, now));
        }

        Ok(updated)
    }

    async fn expire(&self, key: &str, seconds: u64) -> StoreResult<bool> {
        self.ensure_available()?;
        let now = Instant::now();
        let mut data = self.write();
        Self::purge_if_expired(&mut data, key, now);

        match data.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(expiry(seconds, now));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> StoreResult<i64> {
        self.ensure_available()?;
        let now = Instant::now();
        let ttl = match self.read().get(key) {
            None => -2,
            Some(entry) if entry.is_expired(now) => -2,
            Some(StoreEntry { expires_at: None, .. }) => -1,
            Some(StoreEntry {
                expires_at: Some(exp),
                ..
            }) => {
                // Round to the nearest second like Redis does
                let remaining = exp.saturating_duration_since(now).as_millis();
                ((remaining + 500) / 1000) as i64
            }
        };
        Ok(ttl)
    }

    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> StoreResult<(u64, Vec<String>)> {
        self.ensure_available()?;
        let now = Instant::now();

        // The cursor is the next insertion sequence to visit, so deleting keys
        // already returned never shifts later ones out of the walk.
        let mut remaining: Vec<(u64, String)> = self
            .read()
            .iter()
            .filter(|(_, e)| e.seq >= cursor && !e.is_expired(now))
            .map(|(k, e)| (e.seq, k.clone()))
            .collect();
        remaining.sort_unstable_by_key(|(seq, _)| *seq);

        let take = count.max(1).min(remaining.len());
        let next = if take < remaining.len() {
            remaining[take - 1].0 + 1
        } else {
            0
        };
        let page = remaining
            .into_iter()
            .take(take)
            .map(|(_, key)| key)
            .filter(|key| glob::matches(pattern, key))
            .collect();

        Ok((next, page))
    }

    async fn stats(&self) -> StoreResult<StoreStats> {
        self.ensure_available()?;
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        Ok(StoreStats {
            total_keys: self.len() as u64,
            keyspace_hits: hits,
            keyspace_misses: misses,
            hit_rate: StoreStats::hit_rate(hits, misses),
            memory_used: None,
            connected_clients: None,
        })
    }

    async fn close(&self) {}
}
