/// Cache counters. Owned by the single I/O thread, so plain integers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub insertions: u64,
    /// Inserts that replaced a live entry for a different name.
    pub collisions: u64,
    /// Entries invalidated because they were found stale.
    pub expirations: u64,
    /// Inserts ignored for an oversized name or payload.
    pub rejected: u64,
}

