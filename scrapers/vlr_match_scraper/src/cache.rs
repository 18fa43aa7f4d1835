//! Last good result set per query.
//!
//! Entries are immutable once built; a refresh swaps in a new `Arc` so readers
//! never see a half-written entry. Expired entries stay in place as the stale
//! fallback until a refresh overwrites them or the LRU bound evicts them.

use chrono::{DateTime, Utc};
use lru::LruCache;
use nonzero_ext::nonzero;
use std::{
    collections::HashMap,
    num::NonZeroUsize,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};
use tracing::debug;

use crate::types::{MatchRecord, QueryKey};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: QueryKey,
    pub records: Vec<MatchRecord>,
    pub fetched_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::days(36_500));
        now.signed_duration_since(self.fetched_at) > ttl
    }
}

pub struct KeyLock<'a> {
    cache: &'a MatchCache,
    key: QueryKey,
    mutex: Arc<tokio::sync::Mutex<()>>,
}

impl KeyLock<'_> {
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.mutex.lock().await
    }
}

impl Drop for KeyLock<'_> {
    fn drop(&mut self) {
        let mut inflight = lock(&self.cache.inflight);
        // The map and this handle are the last two owners.
        let last = inflight
            .get(&self.key)
            .is_some_and(|m| Arc::ptr_eq(m, &self.mutex) && Arc::strong_count(m) == 2);
        if last {
            inflight.remove(&self.key);
        }
    }
}

pub struct MatchCache {
    entries: Mutex<LruCache<QueryKey, Arc<CacheEntry>>>,
    inflight: Mutex<HashMap<QueryKey, Arc<tokio::sync::Mutex<()>>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MatchCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(nonzero!(256usize));
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Entry for `key` if it is still within its TTL.
    pub fn get(&self, key: &QueryKey) -> Option<Arc<CacheEntry>> {
        self.get_at(key, Utc::now())
    }

    pub fn get_at(&self, key: &QueryKey, now: DateTime<Utc>) -> Option<Arc<CacheEntry>> {
        match self.get_or_stale_at(key, now) {
            Some((entry, false)) => Some(entry),
            _ => None,
        }
    }

    /// Last good entry regardless of age, flagged `true` when past its TTL.
    pub fn get_or_stale(&self, key: &QueryKey) -> Option<(Arc<CacheEntry>, bool)> {
        self.get_or_stale_at(key, Utc::now())
    }

    pub fn get_or_stale_at(
        &self,
        key: &QueryKey,
        now: DateTime<Utc>,
    ) -> Option<(Arc<CacheEntry>, bool)> {
        let entry = lock(&self.entries).get(key).cloned()?;
        let stale = entry.is_expired_at(now);
        Some((entry, stale))
    }

    pub fn put(&self, key: QueryKey, records: Vec<MatchRecord>, ttl: Duration) -> Arc<CacheEntry> {
        self.put_at(key, records, ttl, Utc::now())
    }

    pub fn put_at(
        &self,
        key: QueryKey,
        records: Vec<MatchRecord>,
        ttl: Duration,
        fetched_at: DateTime<Utc>,
    ) -> Arc<CacheEntry> {
        let entry = Arc::new(CacheEntry {
            key: key.clone(),
            records,
            fetched_at,
            ttl,
        });
        debug!("Caching {} records for {} (ttl {:?})", entry.records.len(), key, ttl);
        lock(&self.entries).put(key, Arc::clone(&entry));
        entry
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Async lock shared by every request for `key`; holding it while
    /// refreshing keeps concurrent misses down to one fetch. The map entry
    /// goes away when the last handle drops, cancelled requests included.
    pub fn key_lock(&self, key: &QueryKey) -> KeyLock<'_> {
        let mutex = Arc::clone(lock(&self.inflight).entry(key.clone()).or_default());
        KeyLock {
            cache: self,
            key: key.clone(),
            mutex,
        }
    }

    #[cfg(test)]
    fn inflight_len(&self) -> usize {
        lock(&self.inflight).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MatchStatus, QueryKind};
    use chrono::TimeZone;

    fn record(team_a: &str) -> MatchRecord {
        MatchRecord {
            team_a: team_a.to_string(),
            team_b: "DRX".to_string(),
            score_a: Some(2),
            score_b: Some(0),
            status: MatchStatus::Completed,
            start_time: None,
            tournament: "Masters Toronto".to_string(),
            stage: None,
            match_url: "https://www.vlr.gg/1".to_string(),
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 9, 12, 0, 0).unwrap()
    }

    fn key(kind: QueryKind) -> QueryKey {
        QueryKey::new(kind, None, 5)
    }

    #[test]
    fn test_fresh_then_stale() {
        let cache = MatchCache::new(8);
        let ttl = Duration::from_secs(300);
        cache.put_at(key(QueryKind::Results), vec![record("LOUD")], ttl, t0());

        let within = t0() + chrono::Duration::seconds(300);
        let after = t0() + chrono::Duration::seconds(301);

        assert!(cache.get_at(&key(QueryKind::Results), within).is_some());
        assert!(cache.get_at(&key(QueryKind::Results), after).is_none());

        let (entry, stale) = cache.get_or_stale_at(&key(QueryKind::Results), after).unwrap();
        assert!(stale);
        assert_eq!(entry.records[0].team_a, "LOUD");
        assert!(cache.get_or_stale_at(&key(QueryKind::Upcoming), after).is_none());
    }

    #[test]
    fn test_put_replaces_whole_entry() {
        let cache = MatchCache::new(8);
        let ttl = Duration::from_secs(300);
        let first = cache.put_at(key(QueryKind::Results), vec![record("LOUD")], ttl, t0());
        cache.put_at(
            key(QueryKind::Results),
            vec![record("FNATIC"), record("NRG")],
            ttl,
            t0() + chrono::Duration::seconds(10),
        );

        // Readers holding the old entry keep a consistent view.
        assert_eq!(first.records.len(), 1);
        let (current, _) = cache.get_or_stale_at(&key(QueryKind::Results), t0()).unwrap();
        assert_eq!(current.records.len(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_lru_bound() {
        let cache = MatchCache::new(2);
        let ttl = Duration::from_secs(300);
        for filter in ["sentinels", "fnatic", "paper rex"] {
            cache.put_at(
                QueryKey::new(QueryKind::Team, Some(filter), 5),
                vec![record(filter)],
                ttl,
                t0(),
            );
        }

        assert_eq!(cache.len(), 2);
        let evicted = QueryKey::new(QueryKind::Team, Some("sentinels"), 5);
        assert!(cache.get_or_stale_at(&evicted, t0()).is_none());
    }

    #[tokio::test]
    async fn test_key_lock_is_shared_and_released() {
        let cache = MatchCache::new(8);
        let k = key(QueryKind::Results);

        let a = cache.key_lock(&k);
        let b = cache.key_lock(&k);
        assert!(Arc::ptr_eq(&a.mutex, &b.mutex));

        let guard = a.lock().await;
        assert!(b.mutex.try_lock().is_err());
        drop(guard);

        drop(a);
        assert_eq!(cache.inflight_len(), 1);
        drop(b);
        assert_eq!(cache.inflight_len(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_releases_key_lock() {
        let cache = MatchCache::new(8);
        let k = key(QueryKind::Upcoming);

        let holder = cache.key_lock(&k);
        let guard = holder.lock().await;

        let waiter = async {
            let key_lock = cache.key_lock(&k);
            let _guard = key_lock.lock().await;
        };
        assert!(tokio::time::timeout(Duration::from_millis(10), waiter)
            .await
            .is_err());
        assert_eq!(cache.inflight_len(), 1);

        drop(guard);
        drop(holder);
        assert_eq!(cache.inflight_len(), 0);
    }
}
