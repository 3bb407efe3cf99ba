mod limits;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use whack_domain::config::LoggingConfig;
use whack_domain::{CliOverrides, Config};

pub use limits::raise_memlock_limit;

pub fn load_config(path: Option<&str>, overrides: CliOverrides) -> anyhow::Result<Config> {
    let config = Config::load(path, overrides)?;
    config.validate()?;
    Ok(config)
}

/// Installs the global subscriber. `RUST_LOG` wins over `logging.level`.
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let result = if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_thread_names(true)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_thread_names(true)
            .try_init()
    };

    match result {
        Ok(()) => info!(level = %config.level, json = config.json, "Logging initialized"),
        Err(e) => warn!(error = %e, "Logging already initialized"),
    }
}
