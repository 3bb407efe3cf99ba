use serde::{Deserialize, Serialize};

use super::cache::CacheConfig;
use super::errors::ConfigError;
use super::logging::LoggingConfig;
use super::pipeline::{Framing, PipelineConfig};
use super::runtime::RuntimeConfig;
use super::xsk::XskConfig;

const LOCAL_CONFIG: &str = "whack.toml";
const SYSTEM_CONFIG: &str = "/etc/whack/config.toml";

/// Main configuration structure for whack
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// AF_XDP socket and UMEM geometry
    #[serde(default)]
    pub xsk: XskConfig,

    /// Response cache sizing and expiry
    #[serde(default)]
    pub cache: CacheConfig,

    /// Receive/echo pipeline behavior
    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl Config {
    /// Load configuration from file or use defaults
    ///
    /// Priority order:
    /// 1. Explicitly provided path
    /// 2. whack.toml in current directory
    /// 3. /etc/whack/config.toml
    /// 4. Default configuration
    ///
    /// Command-line overrides are applied on top of whichever source won.
    pub fn load(path: Option<&str>, cli_overrides: CliOverrides) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = path {
            Self::from_file(path)?
        } else if std::path::Path::new(LOCAL_CONFIG).exists() {
            Self::from_file(LOCAL_CONFIG)?
        } else if std::path::Path::new(SYSTEM_CONFIG).exists() {
            Self::from_file(SYSTEM_CONFIG)?
        } else {
            Self::default()
        };

        config.apply_cli_overrides(cli_overrides);
        Ok(config)
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_string(), e.to_string()))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    fn apply_cli_overrides(&mut self, overrides: CliOverrides) {
        if let Some(interface) = overrides.interface {
            self.xsk.interface = interface;
        }
        if let Some(batch_size) = overrides.batch_size {
            self.xsk.batch_size = batch_size;
        }
        if overrides.no_zero_copy {
            self.xsk.zero_copy = false;
        }
        if let Some(size) = overrides.cache_size {
            self.cache.max_entries = size;
        }
        if let Some(ttl) = overrides.cache_ttl {
            self.cache.default_ttl = ttl;
        }
        if let Some(limit) = overrides.rate_limit {
            self.pipeline.rate_limit = limit;
        }
        if let Some(framing) = overrides.framing {
            self.pipeline.framing = framing;
        }
        if let Some(core) = overrides.cpu_core {
            self.runtime.cpu_core = Some(core);
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.xsk.validate()?;
        self.cache.validate()?;
        self.pipeline.validate()?;
        Ok(())
    }

    pub fn save(&self, path: &str) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Parse(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, toml_string)
            .map_err(|e| ConfigError::FileWrite(path.to_string(), e.to_string()))?;
        Ok(())
    }
}

/// Command-line overrides for configuration
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub interface: Option<String>,
    pub batch_size: Option<u32>,
    pub no_zero_copy: bool,
    pub cache_size: Option<usize>,
    pub cache_ttl: Option<u32>,
    pub rate_limit: Option<u32>,
    pub framing: Option<Framing>,
    pub cpu_core: Option<usize>,
    pub log_level: Option<String>,
}
