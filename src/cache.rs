//! Bounded TTL cache for upstream responses.
//!
//! Avoids redundant upstream calls for recently-fetched data. Entries expire
//! lazily on read and eagerly via an owned background sweep task. Missing or
//! expired keys are a normal outcome, never an error.

use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// A single cached value. Replaced wholesale on overwrite, never mutated.
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

/// Thread-safe key/value store with per-entry expiry.
///
/// Cloning is cheap and shares the underlying map, so the same cache can be
/// handed to the sweep task and to every caller.
#[derive(Debug)]
pub struct TtlCache<V> {
    entries: Arc<DashMap<String, CacheEntry<V>>>,
    sweeper: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl<V> Clone for TtlCache<V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            sweeper: Arc::clone(&self.sweeper),
        }
    }
}

impl<V> Default for TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            sweeper: Arc::new(Mutex::new(None)),
        }
    }

    /// Returns the stored value only while it is still live. An expired
    /// entry is treated as absent even if the sweep has not run yet, and is
    /// dropped on the way out.
    pub fn get(&self, key: &str) -> Option<V> {
        {
            let entry = self.entries.get(key)?;
            if Instant::now() < entry.expires_at {
                return Some(entry.value.clone());
            }
        }
        // Read hit an expired entry; remove it unless a fresher one raced in.
        self.entries
            .remove_if(key, |_, entry| Instant::now() >= entry.expires_at);
        None
    }

    /// Stores or overwrites the entry for `key` with `expires_at = now + ttl`.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// True iff an entry exists for `key` and is not expired.
    pub fn has(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .map(|entry| Instant::now() < entry.expires_at)
            .unwrap_or(false)
    }

    /// Removes the entry if present; no-op otherwise.
    pub fn remove(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Removes all entries.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of stored entries, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Begin a recurring sweep that drops expired entries.
    ///
    /// Idempotent: calling again while a sweeper is alive is a no-op, so no
    /// duplicate sweep loops can pile up.
    pub fn start_sweep(&self, period: Duration) {
        let mut guard = self.sweeper.lock().unwrap();
        if guard.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let period = period.max(Duration::from_millis(1));
        let entries = Arc::clone(&self.entries);
        *guard = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let before = entries.len();
                let now = Instant::now();
                entries.retain(|_, entry| entry.expires_at > now);
                let removed = before.saturating_sub(entries.len());
                if removed > 0 {
                    tracing::debug!(removed, remaining = entries.len(), "cache sweep");
                }
            }
        }));
    }

    /// Halt the sweep and release its task. Safe to call when the sweep was
    /// never started, and safe to call twice.
    pub fn stop(&self) {
        if let Some(handle) = self.sweeper.lock().unwrap().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[test]
    fn set_then_get_before_ttl() {
        let cache = TtlCache::new();
        cache.set("k", "v".to_string(), Duration::from_secs(60));
        assert_eq!(cache.get("k"), Some("v".to_string()));
        assert!(cache.has("k"));
    }

    #[tokio::test]
    async fn expired_entry_is_absent_without_sweep() {
        let cache = TtlCache::new();
        cache.set("k", 1u32, Duration::from_millis(10));
        sleep(Duration::from_millis(25)).await;

        assert_eq!(cache.get("k"), None);
        assert!(!cache.has("k"));
        // The lazy read also dropped the entry.
        assert!(cache.is_empty());
    }

    #[test]
    fn overwrite_replaces_entry() {
        let cache = TtlCache::new();
        cache.set("k", 1u32, Duration::from_secs(60));
        cache.set("k", 2u32, Duration::from_secs(60));
        assert_eq!(cache.get("k"), Some(2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn remove_is_noop_when_absent() {
        let cache: TtlCache<u32> = TtlCache::new();
        cache.remove("missing");
        assert!(cache.is_empty());
    }

    #[test]
    fn clear_empties_everything() {
        let cache = TtlCache::new();
        cache.set("a", 1u32, Duration::from_secs(60));
        cache.set("b", 2u32, Duration::from_secs(60));
        cache.clear();
        assert!(!cache.has("a"));
        assert!(!cache.has("b"));
        assert!(cache.is_empty());
    }

    #[test]
    fn callers_get_copies() {
        let cache = TtlCache::new();
        cache.set("k", vec![1u8, 2, 3], Duration::from_secs(60));
        let mut copy = cache.get("k").unwrap();
        copy.push(4);
        assert_eq!(cache.get("k"), Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn sweep_removes_expired_entries() {
        let cache = TtlCache::new();
        cache.set("short", 1u32, Duration::from_millis(10));
        cache.set("long", 2u32, Duration::from_secs(60));
        cache.start_sweep(Duration::from_millis(20));

        sleep(Duration::from_millis(60)).await;

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("long"), Some(2));
        cache.stop();
    }

    #[tokio::test]
    async fn start_sweep_is_idempotent() {
        let cache: TtlCache<u32> = TtlCache::new();
        cache.start_sweep(Duration::from_millis(10));
        let first = cache
            .sweeper
            .lock()
            .unwrap()
            .as_ref()
            .map(|h| h.is_finished());
        cache.start_sweep(Duration::from_millis(10));
        assert_eq!(first, Some(false));
        // Still exactly one sweeper slot occupied.
        assert!(cache.sweeper.lock().unwrap().is_some());
        cache.stop();
    }

    #[tokio::test]
    async fn stop_is_safe_without_start() {
        let cache: TtlCache<u32> = TtlCache::new();
        cache.stop();
        cache.stop();
    }

    #[tokio::test]
    async fn clones_share_the_map() {
        let cache = TtlCache::new();
        let other = cache.clone();
        other.set("k", 7u32, Duration::from_secs(60));
        assert_eq!(cache.get("k"), Some(7));
    }
}
