pub mod cache;
pub mod errors;
pub mod logging;
pub mod pipeline;
pub mod root;
pub mod runtime;
pub mod xsk;

pub use cache::CacheConfig;
pub use errors::ConfigError;
pub use logging::LoggingConfig;
pub use pipeline::{Framing, PipelineConfig};
pub use root::{CliOverrides, Config};
pub use runtime::RuntimeConfig;
pub use xsk::XskConfig;
