//! In-process state store
//!
//! Values live in a mutex-guarded map and expire lazily: an expired key is
//! treated as absent on the next access and removed then. Every
//! `SWEEP_EVERY` operations the whole map is swept, so keys that are never
//! read again do not pile up.

use crate::store::{duration_millis, Clock, StateStore, StoreError, StoreResult, SystemClock};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

const SWEEP_EVERY: u64 = 256;

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Set(HashSet<String>),
    SortedSet(BTreeMap<String, f64>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: i64,
}

/// In-memory [`StateStore`] with per-key expiry
///
/// Shared by cloning an `Arc<MemoryStore>` into every component that needs it.
/// [`MemoryStore::set_available`] simulates an unreachable backend.
#[derive(Debug)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
    available: AtomicBool,
    operations: AtomicU64,
}

impl MemoryStore {
    /// Creates a store that expires keys against the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates a store that expires keys against the given clock
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            available: AtomicBool::new(true),
            operations: AtomicU64::new(0),
        }
    }

    /// Toggles availability; while unavailable every call fails
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of live (unexpired) keys
    pub fn len(&self) -> usize {
        let now = self.clock.now_millis();
        self.entries
            .lock()
            .map(|entries| entries.values().filter(|e| e.expires_at > now).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Locks the map after checking availability and evicting `key` if expired
    fn lock_for(&self, key: &str) -> StoreResult<MutexGuard<'_, HashMap<String, Entry>>> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store marked unavailable".to_string()));
        }

        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))?;

        let now = self.clock.now_millis();
        if self.operations.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            entries.retain(|_, e| e.expires_at > now);
        } else if entries.get(key).is_some_and(|e| e.expires_at <= now) {
            entries.remove(key);
        }

        Ok(entries)
    }

    fn expiry(&self, ttl: Duration) -> i64 {
        self.clock.now_millis().saturating_add(duration_millis(ttl))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::WrongType {
        key: key.to_string(),
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let entries = self.lock_for(key)?;
        match entries.get(key).map(|e| &e.value) {
            None => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let expires_at = self.expiry(ttl);
        let mut entries = self.lock_for(key)?;
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<()> {
        let Some(first) = keys.first() else {
            return Ok(());
        };
        let mut entries = self.lock_for(first)?;
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }

    async fn incr(&self, key: &str, ttl: Duration) -> StoreResult<i64> {
        let expires_at = self.expiry(ttl);
        let mut entries = self.lock_for(key)?;

        let current = match entries.get(key).map(|e| &e.value) {
            None => 0,
            Some(Value::Str(s)) => s.parse::<i64>().map_err(|_| wrong_type(key))?,
            Some(_) => return Err(wrong_type(key)),
        };

        let next = current.saturating_add(1);
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(next.to_string()),
                expires_at,
            },
        );
        Ok(next)
    }

    async fn sadd(&self, key: &str, member: &str, ttl: Duration) -> StoreResult<bool> {
        let expires_at = self.expiry(ttl);
        let mut entries = self.lock_for(key)?;

        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Set(HashSet::new()),
            expires_at,
        });
        entry.expires_at = expires_at;

        match &mut entry.value {
            Value::Set(set) => Ok(set.insert(member.to_string())),
            _ => Err(wrong_type(key)),
        }
    }

    async fn srem(&self, key: &str, member: &str) -> StoreResult<()> {
        let mut entries = self.lock_for(key)?;
        match entries.get_mut(key).map(|e| &mut e.value) {
            None => Ok(()),
            Some(Value::Set(set)) => {
                set.remove(member);
                Ok(())
            }
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        let entries = self.lock_for(key)?;
        match entries.get(key).map(|e| &e.value) {
            None => Ok(Vec::new()),
            Some(Value::Set(set)) => {
                let mut members: Vec<String> = set.iter().cloned().collect();
                members.sort();
                Ok(members)
            }
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn zadd(&self, key: &str, member: &str, score: f64, ttl: Duration) -> StoreResult<()> {
        let expires_at = self.expiry(ttl);
        let mut entries = self.lock_for(key)?;

        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::SortedSet(BTreeMap::new()),
            expires_at,
        });
        entry.expires_at = expires_at;

        match &mut entry.value {
            Value::SortedSet(zset) => {
                zset.insert(member.to_string(), score);
                Ok(())
            }
            _ => Err(wrong_type(key)),
        }
    }

    async fn zremrangebyscore(&self, key: &str, min: f64, max: f64) -> StoreResult<u64> {
        let mut entries = self.lock_for(key)?;
        match entries.get_mut(key).map(|e| &mut e.value) {
            None => Ok(0),
            Some(Value::SortedSet(zset)) => {
                let before = zset.len();
                zset.retain(|_, score| *score < min || *score > max);
                Ok((before - zset.len()) as u64)
            }
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn zcard(&self, key: &str) -> StoreResult<u64> {
        let entries = self.lock_for(key)?;
        match entries.get(key).map(|e| &e.value) {
            None => Ok(0),
            Some(Value::SortedSet(zset)) => Ok(zset.len() as u64),
            Some(_) => Err(wrong_type(key)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ManualClock;

    fn store_with_clock() -> (MemoryStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        (MemoryStore::with_clock(clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_get_set_and_expiry() {
        let (store, clock) = store_with_clock();
        let ttl = Duration::from_secs(10);

        assert_eq!(store.get("k").await.unwrap(), None);
        store.set_ex("k", "v", ttl).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));

        clock.advance(Duration::from_secs(10));
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_untouched_expired_keys_are_swept() {
        let (store, clock) = store_with_clock();
        for i in 0..10 {
            store
                .set_ex(&format!("domain-{}", i), "v", Duration::from_secs(1))
                .await
                .unwrap();
        }
        store.set_ex("live", "v", Duration::from_secs(60)).await.unwrap();
        clock.advance(Duration::from_secs(2));

        for _ in 0..SWEEP_EVERY {
            store.get("live").await.unwrap();
        }

        assert_eq!(store.entries.lock().unwrap().len(), 1);
        assert_eq!(store.get("live").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_incr_counts_from_zero_and_refreshes_ttl() {
        let (store, clock) = store_with_clock();
        let ttl = Duration::from_secs(5);

        assert_eq!(store.incr("c", ttl).await.unwrap(), 1);
        clock.advance(Duration::from_secs(4));
        assert_eq!(store.incr("c", ttl).await.unwrap(), 2);
        clock.advance(Duration::from_secs(4));
        assert_eq!(store.get("c").await.unwrap(), Some("2".to_string()));

        clock.advance(Duration::from_secs(2));
        assert_eq!(store.incr("c", ttl).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_incr_on_non_integer_is_wrong_type() {
        let (store, _) = store_with_clock();
        store.set_ex("k", "abc", Duration::from_secs(5)).await.unwrap();
        assert!(matches!(
            store.incr("k", Duration::from_secs(5)).await,
            Err(StoreError::WrongType { .. })
        ));
    }

    #[tokio::test]
    async fn test_sets() {
        let (store, _) = store_with_clock();
        let ttl = Duration::from_secs(60);

        assert!(store.sadd("s", "b", ttl).await.unwrap());
        assert!(store.sadd("s", "a", ttl).await.unwrap());
        assert!(!store.sadd("s", "a", ttl).await.unwrap());
        assert_eq!(store.smembers("s").await.unwrap(), vec!["a", "b"]);

        store.srem("s", "a").await.unwrap();
        assert_eq!(store.smembers("s").await.unwrap(), vec!["b"]);
        assert!(store.smembers("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sorted_set_window() {
        let (store, _) = store_with_clock();
        let ttl = Duration::from_secs(60);

        for (member, score) in [("a", 1.0), ("b", 2.0), ("c", 3.0), ("d", 4.0)] {
            store.zadd("z", member, score, ttl).await.unwrap();
        }
        assert_eq!(store.zcard("z").await.unwrap(), 4);

        let removed = store.zremrangebyscore("z", f64::NEG_INFINITY, 2.0).await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.zcard("z").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_delete() {
        let (store, _) = store_with_clock();
        let ttl = Duration::from_secs(60);
        store.set_ex("a", "1", ttl).await.unwrap();
        store.set_ex("b", "2", ttl).await.unwrap();

        store
            .delete(&["a".to_string(), "b".to_string(), "c".to_string()])
            .await
            .unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_is_distinct_from_absent() {
        let (store, _) = store_with_clock();
        assert!(matches!(store.get("k").await, Ok(None)));

        store.set_available(false);
        assert!(matches!(store.get("k").await, Err(StoreError::Unavailable(_))));
        assert!(store.incr("k", Duration::from_secs(1)).await.is_err());

        store.set_available(true);
        assert!(store.get("k").await.is_ok());
    }
}
