pub mod cache;
pub mod codec;
pub mod packet;
pub mod pipeline;
pub mod query_builder;
pub mod rate_limit;
pub mod server;

pub use cache::{CacheEntry, CacheMetrics, Clock, CoarseClock, ManualClock, ResponseCache};
pub use packet::UdpFrame;
pub use pipeline::{BatchOutcome, Pipeline, PipelineStats};
pub use query_builder::QueryBuilder;
pub use rate_limit::TxBudget;
pub use server::{ServerReport, XdpServer};
