use tracing::{debug, info};
use whack_domain::config::CacheConfig;
use whack_domain::dns_message::{MAX_MESSAGE_LEN, MAX_NAME_LEN};
use whack_domain::CacheStats;

use super::clock::{Clock, CoarseClock};
use super::entry::CacheEntry;
use super::hash::djb2;
use super::metrics::CacheMetrics;

/// Fixed-capacity, direct-mapped cache of raw DNS responses.
///
/// Each name maps to exactly one slot (`djb2(name) % capacity`); a colliding
/// insert silently replaces whatever was there. All slots are allocated up
/// front. Not synchronized: one owner, one thread.
pub struct ResponseCache<C: Clock = CoarseClock> {
    slots: Box<[CacheEntry]>,
    default_ttl: u32,
    clock: C,
    metrics: CacheMetrics,
}

impl ResponseCache<CoarseClock> {
    pub fn new(max_entries: usize, default_ttl: u32) -> Self {
        Self::with_clock(max_entries, default_ttl, CoarseClock)
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_entries, config.default_ttl)
    }
}

impl<C: Clock> ResponseCache<C> {
    /// A `max_entries` of 0 is treated as 1.
    pub fn with_clock(max_entries: usize, default_ttl: u32, clock: C) -> Self {
        let max_entries = max_entries.max(1);
        let slots = (0..max_entries).map(|_| CacheEntry::empty()).collect();

        info!(max_entries, default_ttl, "Response cache initialized");

        Self {
            slots,
            default_ttl,
            clock,
            metrics: CacheMetrics::default(),
        }
    }

    #[inline]
    pub fn slot_index(&self, domain: &str) -> usize {
        djb2(domain) as usize % self.slots.len()
    }

    /// The stored response for `domain` if its slot holds that name and it
    /// has not expired. A stale slot is invalidated on the way.
    pub fn lookup(&mut self, domain: &str) -> Option<&[u8]> {
        if domain.len() > MAX_NAME_LEN {
            self.metrics.misses += 1;
            return None;
        }
        let now = self.clock.now_secs();
        let idx = self.slot_index(domain);
        let entry = &mut self.slots[idx];

        if entry.valid && entry.is_expired(now) {
            entry.valid = false;
            self.metrics.expirations += 1;
        }
        if !entry.valid || entry.domain != domain {
            self.metrics.misses += 1;
            return None;
        }

        self.metrics.hits += 1;
        Some(entry.response())
    }

    /// Stores `response` under `domain`, replacing the slot's occupant.
    ///
    /// A `ttl` of 0 means the cache's default TTL. Names over 255 bytes and
    /// empty or oversized payloads are ignored.
    pub fn insert(&mut self, domain: &str, response: &[u8], ttl: u32) {
        if domain.len() > MAX_NAME_LEN || response.is_empty() || response.len() > MAX_MESSAGE_LEN {
            self.metrics.rejected += 1;
            debug!(
                domain_len = domain.len(),
                response_len = response.len(),
                "Cache insert rejected"
            );
            return;
        }
        let ttl = if ttl == 0 { self.default_ttl } else { ttl };
        let now = self.clock.now_secs();
        let idx = self.slot_index(domain);
        let entry = &mut self.slots[idx];

        if entry.valid && entry.domain != domain && !entry.is_expired(now) {
            self.metrics.collisions += 1;
        }
        entry.fill(domain, response, now, ttl);
        self.metrics.insertions += 1;
    }

    /// Invalidates every expired entry. Returns how many were removed.
    pub fn cleanup(&mut self) -> usize {
        let now = self.clock.now_secs();
        let mut removed = 0;
        for entry in self.slots.iter_mut() {
            if entry.valid && entry.is_expired(now) {
                entry.valid = false;
                removed += 1;
            }
        }
        self.metrics.expirations += removed as u64;
        if removed > 0 {
            debug!(removed, "Expired cache entries invalidated");
        }
        removed
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats::new(self.metrics.hits, self.metrics.misses)
    }

    pub fn metrics(&self) -> CacheMetrics {
        self.metrics
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of valid slots, expired or not.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|e| e.valid).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn default_ttl(&self) -> u32 {
        self.default_ttl
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn entry(&self, domain: &str) -> &CacheEntry {
        &self.slots[self.slot_index(domain)]
    }
}
