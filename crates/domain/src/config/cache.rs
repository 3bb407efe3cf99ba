use serde::{Deserialize, Serialize};

use super::errors::ConfigError;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Number of direct-mapped slots, allocated up front.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// TTL in seconds applied when an insert passes 0.
    #[serde(default = "default_ttl")]
    pub default_ttl: u32,

    /// Seconds between expiry sweeps.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            default_ttl: default_ttl(),
            cleanup_interval: default_cleanup_interval(),
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_entries == 0 {
            return Err(ConfigError::invalid("cache.max_entries", "must be > 0"));
        }
        if self.cleanup_interval == 0 {
            return Err(ConfigError::invalid("cache.cleanup_interval", "must be > 0"));
        }
        Ok(())
    }
}

fn default_max_entries() -> usize {
    10_000
}

fn default_ttl() -> u32 {
    3600
}

fn default_cleanup_interval() -> u64 {
    60
}
