//! Direct-mapped response cache keyed by question name.

pub mod clock;
pub mod entry;
pub mod hash;
pub mod metrics;
pub mod storage;

pub use clock::{Clock, CoarseClock, ManualClock};
pub use entry::CacheEntry;
pub use hash::djb2;
pub use metrics::CacheMetrics;
pub use storage::ResponseCache;
