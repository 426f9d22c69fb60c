//! Memory Store - Concurrent `HashMap` Backend
//!
//! An in-process store using `DashMap`. It honours TTLs and Redis-style glob
//! patterns, so it can stand in for Redis in tests and single-process setups.

use anyhow::Result;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Stored value with expiration tracking
#[derive(Debug, Clone)]
struct StoreEntry {
    value: Vec<u8>,
    ttl: Duration,
    /// `None` when the TTL is too large to represent; such entries never expire
    expires_at: Option<Instant>,
}

impl StoreEntry {
    fn new(value: Vec<u8>, ttl: Duration) -> Self {
        Self {
            value,
            ttl,
            expires_at: Instant::now().checked_add(ttl),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// Concurrent in-memory store
///
/// **Limitations**:
/// - Not shared across processes
/// - No eviction policy besides TTL; call [`MemoryStore::cleanup_expired`] periodically
///
/// **Example**:
/// ```rust
/// use court_availability_cache::backends::MemoryStore;
/// use court_availability_cache::KeyValueStore;
/// use std::time::Duration;
///
/// # async fn example() -> anyhow::Result<()> {
/// let store = MemoryStore::new();
/// store.set_with_ttl("slots:1:2:2024-05-01", b"[]", Duration::from_secs(60)).await?;
/// let keys = store.scan_keys("slots:1:*").await?;
/// assert_eq!(keys, vec!["slots:1:2:2024-05-01".to_string()]);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct MemoryStore {
    map: Arc<DashMap<String, StoreEntry>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        info!("Initializing in-memory store (DashMap)");
        Self::default()
    }

    /// TTL the key was last written with, if it is still live
    #[must_use]
    pub fn ttl_of(&self, key: &str) -> Option<Duration> {
        self.map
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.ttl)
    }

    /// Drop expired entries, returning how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let mut removed = 0;
        self.map.retain(|_, entry| {
            if entry.is_expired() {
                removed += 1;
                false
            } else {
                true
            }
        });
        if removed > 0 {
            debug!(count = removed, "[Memory] Cleaned up expired entries");
        }
        removed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Redis `MATCH` semantics: `*`, `?`, `[abc]`, `[^a]`, `[a-z]`, `\x`
///
/// Hand-written because `wildmatch`-style crates only cover `*` and `?`.
#[must_use]
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let key: Vec<char> = key.chars().collect();
    match_from(&pattern, &key)
}

fn match_from(pattern: &[char], key: &[char]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some(('*', rest)) => {
            // Collapse runs of '*'
            let rest = trim_stars(rest);
            if rest.is_empty() {
                return true;
            }
            (0..=key.len()).any(|i| key.get(i..).is_some_and(|tail| match_from(rest, tail)))
        }
        Some(('?', rest)) => key
            .split_first()
            .is_some_and(|(_, tail)| match_from(rest, tail)),
        Some(('[', rest)) => {
            let Some((&c, tail)) = key.split_first() else {
                return false;
            };
            match match_class(rest, c) {
                Some((true, after)) => match_from(after, tail),
                Some((false, _)) => false,
                // Unterminated class: treat '[' literally
                None => c == '[' && match_from(rest, tail),
            }
        }
        Some(('\\', rest)) if !rest.is_empty() => match (rest.split_first(), key.split_first()) {
            (Some((p, prest)), Some((k, ktail))) => p == k && match_from(prest, ktail),
            _ => false,
        },
        Some((p, rest)) => key
            .split_first()
            .is_some_and(|(k, tail)| p == k && match_from(rest, tail)),
    }
}

fn trim_stars(mut pattern: &[char]) -> &[char] {
    while let Some(('*', rest)) = pattern.split_first() {
        pattern = rest;
    }
    pattern
}

/// Returns whether `c` is in the class and the pattern after the closing `]`
fn match_class(class: &[char], c: char) -> Option<(bool, &[char])> {
    let (negate, mut body) = match class.split_first() {
        Some(('^', rest)) => (true, rest),
        _ => (false, class),
    };
    let mut matched = false;
    loop {
        match body {
            [] => return None,
            [']', rest @ ..] => return Some((matched != negate, rest)),
            ['\\', escaped, rest @ ..] => {
                matched |= *escaped == c;
                body = rest;
            }
            [lo, '-', hi, rest @ ..] if *hi != ']' => {
                let (lo, hi) = if lo <= hi { (*lo, *hi) } else { (*hi, *lo) };
                matched |= (lo..=hi).contains(&c);
                body = rest;
            }
            [single, rest @ ..] => {
                matched |= *single == c;
                body = rest;
            }
        }
    }
}

use crate::traits::KeyValueStore;
use async_trait::async_trait;

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let Some(entry) = self.map.get(key) else {
            return Ok(None);
        };
        if entry.is_expired() {
            drop(entry); // Release read lock
            // A concurrent write may have replaced the entry meanwhile
            self.map.remove_if(key, |_, entry| entry.is_expired());
            return Ok(None);
        }
        Ok(Some(entry.value.clone()))
    }

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        self.map
            .insert(key.to_string(), StoreEntry::new(value.to_vec(), ttl));
        debug!(key = %key, ttl_secs = %ttl.as_secs(), "[Memory] Stored key with TTL");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.map.remove(key);
        Ok(())
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .map
            .iter()
            .filter(|entry| !entry.value().is_expired() && glob_match(pattern, entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort_unstable();
        debug!(pattern = %pattern, count = keys.len(), "[Memory] Scanned keys matching pattern");
        Ok(keys)
    }

    async fn remove_bulk(&self, keys: &[String]) -> Result<usize> {
        let removed = keys
            .iter()
            .filter(|key| self.map.remove(key.as_str()).is_some())
            .count();
        debug!(count = removed, "[Memory] Removed keys in bulk");
        Ok(removed)
    }

    async fn health_check(&self) -> bool {
        let test_key = "health_check_memory";
        let test_value = b"health_check_value";

        if self
            .set_with_ttl(test_key, test_value, Duration::from_secs(60))
            .await
            .is_err()
        {
            return false;
        }
        match self.get(test_key).await {
            Ok(Some(retrieved)) => {
                let _ = self.remove(test_key).await;
                retrieved == test_value
            }
            _ => false,
        }
    }

    fn name(&self) -> &'static str {
        "Memory"
    }
}
