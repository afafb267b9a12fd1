use std::sync::atomic::{AtomicU64, Ordering};

/// Engine statistics for monitoring hit rates, network traffic and collection.
///
/// All counters are atomics updated with `Relaxed` ordering; they are monotonic
/// observations, never used for synchronization.
///
/// # Counters
///
/// * `hits` - Reads answered from a settled entry (value or cached error)
/// * `misses` - Reads that started a fetch
/// * `coalesced` - Reads that joined a fetch already in flight
/// * `fetches` - Transport calls issued for cached keys (misses and touch refetches)
/// * `failures` - Fetches that were cached as errors
/// * `touches` - Completed touch operations
/// * `evictions` - Entries removed by touch, garbage collection or cascade
///
/// # Examples
///
/// ```
/// use fetchlito_core::CacheStats;
///
/// let stats = CacheStats::new();
///
/// stats.record_hit();
/// stats.record_hit();
/// stats.record_miss();
/// stats.record_coalesced();
///
/// assert_eq!(stats.hits(), 2);
/// assert_eq!(stats.total_reads(), 4);
/// assert!((stats.hit_rate() - 0.5).abs() < 0.001);
/// ```
#[derive(Debug)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    fetches: AtomicU64,
    failures: AtomicU64,
    touches: AtomicU64,
    evictions: AtomicU64,
}

impl CacheStats {
    /// Creates a new `CacheStats` instance with zero counters.
    pub fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
            fetches: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            touches: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_fetch(&self) {
        self.fetches.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_touch(&self) {
        self.touches.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_evictions(&self, count: usize) {
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn coalesced(&self) -> u64 {
        self.coalesced.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn fetches(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn touches(&self) -> u64 {
        self.touches.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Returns the total number of reads (hits + misses + coalesced joins).
    #[inline]
    pub fn total_reads(&self) -> u64 {
        self.hits() + self.misses() + self.coalesced()
    }

    /// Fraction of reads answered without waiting on the network.
    ///
    /// Returns 0.0 if there have been no reads.
    #[inline]
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_reads();
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }

    #[inline]
    pub fn miss_rate(&self) -> f64 {
        1.0 - self.hit_rate()
    }

    /// Resets all statistics counters to zero.
    pub fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.coalesced,
            &self.fetches,
            &self.failures,
            &self.touches,
            &self.evictions,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for CacheStats {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for CacheStats {
    fn clone(&self) -> Self {
        Self {
            hits: AtomicU64::new(self.hits()),
            misses: AtomicU64::new(self.misses()),
            coalesced: AtomicU64::new(self.coalesced()),
            fetches: AtomicU64::new(self.fetches()),
            failures: AtomicU64::new(self.failures()),
            touches: AtomicU64::new(self.touches()),
            evictions: AtomicU64::new(self.evictions()),
        }
    }
}
