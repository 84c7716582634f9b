use docstore::filter_evaluator::OptionalFilterExpr;
use lru::LruCache;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::command::SortSpec;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    table: String,
    fingerprint: u64,
}

fn fingerprint(query_text: &str, filter: Option<&OptionalFilterExpr>, sort: SortSpec) -> u64 {
    let mut hasher = DefaultHasher::new();
    query_text.hash(&mut hasher);
    sort.descending.hash(&mut hasher);
    if let Some(f) = filter {
        for clause in &f.clauses {
            clause.column.hash(&mut hasher);
            // FilterOp has no Hash derive; discriminate on the Display-free
            // debug form, which is stable within one process run.
            format!("{:?}", clause.op).hash(&mut hasher);
            clause.value.hash(&mut hasher);
        }
    }
    hasher.finish()
}

struct CacheEntry {
    docids: Vec<u32>,
    total: u64,
    inserted_at: Instant,
    compute_ms: u64,
    bytes: usize,
}

impl CacheEntry {
    fn new(docids: Vec<u32>, total: u64, compute_ms: u64) -> Self {
        let bytes = docids.len() * std::mem::size_of::<u32>() + 64;
        CacheEntry { docids, total, inserted_at: Instant::now(), compute_ms, bytes }
    }
}

/// What a cache hit hands back to the caller (spec §4.6 debug block:
/// `cache_age_ms`, `cache_saved_ms`).
pub struct CacheHit {
    pub docids: Vec<u32>,
    pub total: u64,
    pub age_ms: u64,
    pub saved_ms: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub bytes_used: usize,
    pub hits: u64,
    pub misses: u64,
}

struct Inner {
    entries: LruCache<CacheKey, CacheEntry>,
    enabled: bool,
    bytes_used: usize,
    hits: u64,
    misses: u64,
}

/// Fingerprint-keyed cache of full (unpaginated) match sets, keyed on
/// table + normalized query text + filter set + sort direction (spec §2
/// component 10, §4.7). Stores the ascending docid sequence and the
/// filtered total so a repeated SEARCH/COUNT can skip both boolean
/// evaluation and filter application; LIMIT/OFFSET are applied by the
/// caller against the cached sequence, never baked into the key.
pub struct ResultCache {
    inner: Mutex<Inner>,
    max_bytes: usize,
    ttl: Duration,
}

impl ResultCache {
    pub fn new(max_bytes: usize, ttl_seconds: u64) -> Self {
        ResultCache {
            inner: Mutex::new(Inner {
                // LruCache itself is capacity-unbounded here; eviction is
                // driven by `bytes_used` against `max_bytes`, matching the
                // memory-budget style cache in spec §4.7 rather than an
                // entry-count budget.
                entries: LruCache::new(NonZeroUsize::new(1_000_000).expect("nonzero")),
                enabled: true,
                bytes_used: 0,
                hits: 0,
                misses: 0,
            }),
            max_bytes,
            ttl: Duration::from_secs(ttl_seconds),
        }
    }

    pub fn enable(&self) {
        self.inner.lock().expect("cache lock poisoned").enabled = true;
    }

    /// Disables lookups and inserts without destroying existing entries
    /// (spec §4.7, CACHE DISABLE), so a subsequent CACHE ENABLE sees a warm
    /// cache rather than starting cold.
    pub fn disable(&self) {
        self.inner.lock().expect("cache lock poisoned").enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.lock().expect("cache lock poisoned").enabled
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        inner.entries.clear();
        inner.bytes_used = 0;
    }

    /// Drops every entry for `table`, used when a SYNC or DDL-triggered
    /// rebuild invalidates results that reference stale docids (spec §4.7,
    /// §4.9 DDL row: "cache entries for the table are invalidated").
    pub fn invalidate_table(&self, table: &str) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        let stale: Vec<CacheKey> = inner
            .entries
            .iter()
            .filter(|(k, _)| k.table == table)
            .map(|(k, _)| k.clone())
            .collect();
        for key in stale {
            if let Some(entry) = inner.entries.pop(&key) {
                inner.bytes_used -= entry.bytes;
            }
        }
    }

    pub fn get(
        &self,
        table: &str,
        query_text: &str,
        filter: Option<&OptionalFilterExpr>,
        sort: SortSpec,
    ) -> Option<CacheHit> {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        if !inner.enabled {
            return None;
        }
        let key = CacheKey { table: table.to_string(), fingerprint: fingerprint(query_text, filter, sort) };
        let ttl = self.ttl;
        let expired = inner.entries.get(&key).map(|e| e.inserted_at.elapsed() > ttl).unwrap_or(false);
        if expired {
            if let Some(entry) = inner.entries.pop(&key) {
                inner.bytes_used -= entry.bytes;
            }
            inner.misses += 1;
            return None;
        }
        match inner.entries.get(&key) {
            Some(entry) => {
                let hit = CacheHit {
                    docids: entry.docids.clone(),
                    total: entry.total,
                    age_ms: entry.inserted_at.elapsed().as_millis() as u64,
                    saved_ms: entry.compute_ms,
                };
                inner.hits += 1;
                Some(hit)
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Inserts a result set, evicting least-recently-used entries until the
    /// configured byte budget is satisfied (spec §4.7). The caller decides
    /// whether a query was expensive enough to be worth caching
    /// (`min_query_cost_ms`); this method always stores what it is given.
    pub fn put(
        &self,
        table: &str,
        query_text: &str,
        filter: Option<&OptionalFilterExpr>,
        sort: SortSpec,
        docids: Vec<u32>,
        total: u64,
        compute_ms: u64,
    ) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        if !inner.enabled {
            return;
        }
        let key = CacheKey { table: table.to_string(), fingerprint: fingerprint(query_text, filter, sort) };
        let entry = CacheEntry::new(docids, total, compute_ms);
        let new_bytes = entry.bytes;

        if let Some(old) = inner.entries.put(key, entry) {
            inner.bytes_used -= old.bytes;
        }
        inner.bytes_used += new_bytes;

        let max_bytes = self.max_bytes;
        while inner.bytes_used > max_bytes {
            match inner.entries.pop_lru() {
                Some((_, evicted)) => inner.bytes_used -= evicted.bytes,
                None => break,
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().expect("cache lock poisoned");
        CacheStats { entries: inner.entries.len(), bytes_used: inner.bytes_used, hits: inner.hits, misses: inner.misses }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn miss_then_hit() {
        let cache = ResultCache::new(1024 * 1024, 60);
        assert!(cache.get("posts", "hello", None, SortSpec::default()).is_none());
        cache.put("posts", "hello", None, SortSpec::default(), vec![1, 2, 3], 3, 5);
        let hit = cache.get("posts", "hello", None, SortSpec::default()).unwrap();
        assert_eq!(hit.docids, vec![1, 2, 3]);
        assert_eq!(hit.total, 3);
        assert_eq!(hit.saved_ms, 5);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn disable_preserves_entries() {
        let cache = ResultCache::new(1024 * 1024, 60);
        cache.put("posts", "hello", None, SortSpec::default(), vec![1], 1, 0);
        cache.disable();
        assert!(cache.get("posts", "hello", None, SortSpec::default()).is_none());
        cache.enable();
        assert!(cache.get("posts", "hello", None, SortSpec::default()).is_some());
    }

    #[test]
    fn clear_empties_cache() {
        let cache = ResultCache::new(1024 * 1024, 60);
        cache.put("posts", "hello", None, SortSpec::default(), vec![1], 1, 0);
        cache.clear();
        assert_eq!(cache.stats().entries, 0);
        assert_eq!(cache.stats().bytes_used, 0);
    }

    #[test]
    fn invalidate_table_only_affects_that_table() {
        let cache = ResultCache::new(1024 * 1024, 60);
        cache.put("posts", "hello", None, SortSpec::default(), vec![1], 1, 0);
        cache.put("comments", "hello", None, SortSpec::default(), vec![9], 1, 0);
        cache.invalidate_table("posts");
        assert!(cache.get("posts", "hello", None, SortSpec::default()).is_none());
        assert!(cache.get("comments", "hello", None, SortSpec::default()).is_some());
    }

    #[test]
    fn byte_budget_evicts_least_recently_used() {
        let entry_bytes = 1 * std::mem::size_of::<u32>() + 64;
        let cache = ResultCache::new(entry_bytes, 60);
        cache.put("posts", "a", None, SortSpec::default(), vec![1], 1, 0);
        cache.put("posts", "b", None, SortSpec::default(), vec![2], 1, 0);
        assert!(cache.get("posts", "a", None, SortSpec::default()).is_none());
        assert!(cache.get("posts", "b", None, SortSpec::default()).is_some());
    }
}
