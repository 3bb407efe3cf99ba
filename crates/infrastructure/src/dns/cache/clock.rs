use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Source of the cache's notion of "now", in whole seconds.
///
/// Only differences between readings matter, so the epoch is arbitrary.
pub trait Clock {
    fn now_secs(&self) -> u64;
}

/// `CLOCK_MONOTONIC_COARSE`: a vDSO read with tick resolution, cheap enough
/// for the per-packet path and immune to wall-clock jumps.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoarseClock;

impl Clock for CoarseClock {
    #[inline]
    fn now_secs(&self) -> u64 {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        unsafe {
            libc::clock_gettime(libc::CLOCK_MONOTONIC_COARSE, &mut ts);
        }
        ts.tv_sec as u64
    }
}

/// Hand-driven clock for exercising expiry without sleeping.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start)),
        }
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now_secs(&self) -> u64 {
        self.now.load(Ordering::Relaxed)
    }
}
