/// Hit/miss counters of the response cache.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// `hits / (hits + misses)`, `0.0` before any lookup.
    pub hit_ratio: f64,
}

impl CacheStats {
    pub fn new(hits: u64, misses: u64) -> Self {
        let total = hits + misses;
        let hit_ratio = if total > 0 {
            hits as f64 / total as f64
        } else {
            0.0
        };
        Self {
            hits,
            misses,
            hit_ratio,
        }
    }

    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }

    pub fn hit_percent(&self) -> f64 {
        self.hit_ratio * 100.0
    }
}
