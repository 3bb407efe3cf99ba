use serde::{Deserialize, Serialize};

use super::errors::ConfigError;

pub const DEFAULT_RING_SIZE: u32 = 4096;
pub const DEFAULT_BATCH_SIZE: u32 = 64;
pub const DEFAULT_FRAME_SIZE: u32 = 2048;
pub const DEFAULT_NUM_FRAMES: u32 = 4096;

/// Smallest UMEM chunk the kernel accepts.
pub const MIN_FRAME_SIZE: u32 = 2048;

/// AF_XDP socket and UMEM geometry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct XskConfig {
    /// Network interface to bind, e.g. `"eth0"`.
    #[serde(default)]
    pub interface: String,

    #[serde(default)]
    pub queue_id: u32,

    #[serde(default = "default_num_frames")]
    pub num_frames: u32,

    #[serde(default = "default_frame_size")]
    pub frame_size: u32,

    #[serde(default = "default_ring_size")]
    pub rx_ring_size: u32,

    #[serde(default = "default_ring_size")]
    pub tx_ring_size: u32,

    #[serde(default = "default_ring_size")]
    pub fill_ring_size: u32,

    #[serde(default = "default_ring_size")]
    pub comp_ring_size: u32,

    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Extra `sxdp_flags` bits. The need-wakeup flag is always added.
    #[serde(default)]
    pub bind_flags: u16,

    /// Ask for a zero-copy (native driver) binding, falling back to copy mode.
    #[serde(default = "default_true")]
    pub zero_copy: bool,

    /// Completion-ring drain attempts made by `close` before giving up.
    #[serde(default = "default_close_drain_retries")]
    pub close_drain_retries: u32,
}

impl Default for XskConfig {
    fn default() -> Self {
        Self {
            interface: String::new(),
            queue_id: 0,
            num_frames: default_num_frames(),
            frame_size: default_frame_size(),
            rx_ring_size: default_ring_size(),
            tx_ring_size: default_ring_size(),
            fill_ring_size: default_ring_size(),
            comp_ring_size: default_ring_size(),
            batch_size: default_batch_size(),
            bind_flags: 0,
            zero_copy: true,
            close_drain_retries: default_close_drain_retries(),
        }
    }
}

impl XskConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interface.is_empty() {
            return Err(ConfigError::invalid("xsk.interface", "must be set"));
        }
        if self.num_frames == 0 {
            return Err(ConfigError::invalid("xsk.num_frames", "must be > 0"));
        }
        if !self.frame_size.is_power_of_two() || self.frame_size < MIN_FRAME_SIZE {
            return Err(ConfigError::invalid(
                "xsk.frame_size",
                format!("must be a power of two >= {}", MIN_FRAME_SIZE),
            ));
        }
        for (name, size) in [
            ("xsk.rx_ring_size", self.rx_ring_size),
            ("xsk.tx_ring_size", self.tx_ring_size),
            ("xsk.fill_ring_size", self.fill_ring_size),
            ("xsk.comp_ring_size", self.comp_ring_size),
        ] {
            if !size.is_power_of_two() {
                return Err(ConfigError::invalid(name, "must be a power of two"));
            }
        }
        if self.batch_size == 0 {
            return Err(ConfigError::invalid("xsk.batch_size", "must be > 0"));
        }
        Ok(())
    }
}

fn default_num_frames() -> u32 {
    DEFAULT_NUM_FRAMES
}

fn default_frame_size() -> u32 {
    DEFAULT_FRAME_SIZE
}

fn default_ring_size() -> u32 {
    DEFAULT_RING_SIZE
}

fn default_batch_size() -> u32 {
    DEFAULT_BATCH_SIZE
}

fn default_true() -> bool {
    true
}

fn default_close_drain_retries() -> u32 {
    1000
}
