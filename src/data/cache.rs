//! Point-budgeted LRU cache for decoded features.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::trace;

use crate::config::DEFAULT_CACHE_POINTS;
use crate::feature::Feature;

/// Values whose cache cost is their number of geographic points.
pub trait PointCount {
    fn point_count(&self) -> usize;
}

impl PointCount for Feature {
    fn point_count(&self) -> usize {
        self.len()
    }
}

impl<T: PointCount + ?Sized> PointCount for Arc<T> {
    fn point_count(&self) -> usize {
        (**self).point_count()
    }
}

impl PointCount for [Feature] {
    fn point_count(&self) -> usize {
        self.iter().map(Feature::len).sum()
    }
}

impl PointCount for Vec<Feature> {
    fn point_count(&self) -> usize {
        self.as_slice().point_count()
    }
}

/// Top bit set marks ids handed out by [`DatabaseId::unique`].
const UNIQUE_BIT: u64 = 1 << 63;

static NEXT_UNIQUE: AtomicU64 = AtomicU64::new(0);

/// Identity of a feature database within a shared cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DatabaseId(u64);

impl DatabaseId {
    /// Hash a database name, eight bytes at a time with xorshift mixing.
    /// Equal names give equal ids, so the name must identify the data,
    /// e.g. a canonical file path.
    pub fn from_name(name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut seed = 0u64;
        for chunk in bytes.chunks(8) {
            let mut word = [0u8; 8];
            word[..chunk.len()].copy_from_slice(chunk);
            seed = mix(seed, u64::from_le_bytes(word));
        }
        DatabaseId(mix(seed, bytes.len() as u64) & !UNIQUE_BIT)
    }

    /// Fresh id shared with no other database in this process
    pub fn unique() -> Self {
        DatabaseId(UNIQUE_BIT | NEXT_UNIQUE.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

#[inline(always)]
fn mix(a: u64, b: u64) -> u64 {
    let mut seed = a.wrapping_mul(2654435761).wrapping_add(b.wrapping_mul(2246822519));
    seed ^= seed << 13;
    seed ^= seed >> 7;
    seed ^= seed << 17;
    seed
}

/// Cache key: database identity plus the feature (or bin) id within it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub database: DatabaseId,
    pub id: u64,
}

impl CacheKey {
    pub fn new(database: DatabaseId, id: u64) -> Self {
        Self { database, id }
    }
}

/// Cache statistics snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
    pub points: usize,
}

struct CacheInner<V> {
    entries: LruCache<CacheKey, V>,
    total_points: usize,
    max_points: usize,
}

impl<V: PointCount> CacheInner<V> {
    /// Drop least recently used entries until the budget holds.
    fn evict(&mut self) -> u64 {
        let mut evicted = 0;
        while self.total_points > self.max_points {
            match self.entries.pop_lru() {
                Some((key, value)) => {
                    let points = value.point_count();
                    self.total_points = self.total_points.saturating_sub(points);
                    trace!(id = key.id, points, "evicted cache entry");
                    evicted += 1;
                }
                None => {
                    self.total_points = 0;
                    break;
                }
            }
        }
        evicted
    }
}

/// LRU cache bounded by total point count rather than entry count.
///
/// Both lookups and inserts count as access. After every insert the least
/// recently used entries are evicted until the total is back within
/// capacity; an entry larger than the whole capacity evicts itself.
/// Internally locked, so one cache can be shared by concurrent readers.
pub struct FeatureCache<V = Arc<Feature>> {
    inner: Mutex<CacheInner<V>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<V: PointCount + Clone> Default for FeatureCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_POINTS)
    }
}

impl<V: PointCount + Clone> FeatureCache<V> {
    pub fn new(max_points: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: LruCache::unbounded(),
                total_points: 0,
                max_points,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Look up an entry, marking it most recently used.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let mut inner = self.inner.lock();
        match inner.entries.get(key) {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Check if a key exists without updating LRU order.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner.lock().entries.contains(key)
    }

    /// Insert or replace an entry, then evict down to capacity.
    pub fn put(&self, key: CacheKey, value: V) {
        let mut inner = self.inner.lock();
        let points = value.point_count();
        if let Some(old) = inner.entries.put(key, value) {
            inner.total_points = inner.total_points.saturating_sub(old.point_count());
        }
        inner.total_points += points;
        let evicted = inner.evict();
        if evicted > 0 {
            self.evictions.fetch_add(evicted, Ordering::Relaxed);
        }
    }

    /// Change the point budget, evicting immediately if it shrank.
    pub fn configure_capacity(&self, max_points: usize) {
        let mut inner = self.inner.lock();
        inner.max_points = max_points;
        let evicted = inner.evict();
        if evicted > 0 {
            self.evictions.fetch_add(evicted, Ordering::Relaxed);
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().max_points
    }

    pub fn total_points(&self) -> usize {
        self.inner.lock().total_points
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.total_points = 0;
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: inner.entries.len(),
            points: inner.total_points,
        }
    }
}
