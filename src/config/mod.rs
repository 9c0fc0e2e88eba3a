//! Weaver configuration.
//!
//! Loaded from YAML files and environment variables. Every section has
//! defaults, so an empty configuration is valid.

mod dispatch;

pub use dispatch::{
    DispatchConfig, ExecutorConfig, ProxyConfig, DEFAULT_EXECUTOR, DEFAULT_POOL_SIZE,
};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "weft.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "WEFT_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "WEFT";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "WEFT_LOG";

use serde::Deserialize;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Failed to parse config: {0}")]
    Parse(String),
}

/// Main weaver configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WeftConfig {
    /// Async dispatch defaults.
    pub dispatch: DispatchConfig,
    /// Built-in executor pools.
    pub executor: ExecutorConfig,
    /// Proxy generation.
    pub proxy: ProxyConfig,
}

impl WeftConfig {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `weft.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `WEFT_CONFIG` environment variable (if set)
    /// 4. Environment variables with `WEFT__` prefix, `__` between sections
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Parse configuration from a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        Self::default()
    }
}
