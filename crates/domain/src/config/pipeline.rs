use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::ConfigError;

/// How DNS messages sit inside received frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    /// Ethernet II / IPv4 / UDP encapsulation.
    #[default]
    Udp,
    /// The frame bytes are the DNS message itself.
    Raw,
}

impl Framing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Framing::Udp => "udp",
            Framing::Raw => "raw",
        }
    }
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Framing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "udp" => Ok(Framing::Udp),
            "raw" => Ok(Framing::Raw),
            _ => Err(format!("Unknown framing: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub framing: Framing,

    /// TTL in seconds for responses cached by the echo path.
    #[serde(default = "default_echo_ttl")]
    pub echo_ttl: u32,

    /// Transmit budget per second; 0 disables the limit.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,

    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: i32,

    /// Seconds between aggregate counter reports.
    #[serde(default = "default_stats_interval")]
    pub stats_interval: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            framing: Framing::default(),
            echo_ttl: default_echo_ttl(),
            rate_limit: default_rate_limit(),
            poll_timeout_ms: default_poll_timeout_ms(),
            stats_interval: default_stats_interval(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_timeout_ms < 0 {
            return Err(ConfigError::invalid("pipeline.poll_timeout_ms", "must be >= 0"));
        }
        Ok(())
    }
}

fn default_echo_ttl() -> u32 {
    3600
}

fn default_rate_limit() -> u32 {
    5000
}

fn default_poll_timeout_ms() -> i32 {
    1000
}

fn default_stats_interval() -> u64 {
    10
}
