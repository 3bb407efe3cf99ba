//! whack domain layer
pub mod cache_stats;
pub mod config;
pub mod dns_message;
pub mod errors;
pub mod record_type;

pub use cache_stats::CacheStats;
pub use config::{CliOverrides, Config};
pub use dns_message::{DnsHeader, DnsMessage, DnsQuestion};
pub use errors::{CodecError, XskError};
pub use record_type::RecordType;
