//! Async dispatch and executor configuration.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

use crate::dispatch::ExceptionPolicy;

/// Default executor pool name.
pub const DEFAULT_EXECUTOR: &str = "default";
/// Default executor pool size.
pub const DEFAULT_POOL_SIZE: usize = 8;

/// Defaults applied to async-tagged methods that do not set their own.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Pool used when a method names none.
    pub default_executor: String,
    /// Timeout in milliseconds. 0 disables the timeout.
    pub timeout_ms: u64,
    /// Exception policy used when a method sets none.
    pub policy: ExceptionPolicy,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_executor: DEFAULT_EXECUTOR.to_string(),
            timeout_ms: 0,
            policy: ExceptionPolicy::default(),
        }
    }
}

impl DispatchConfig {
    /// Configured timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

/// Worker pools for the built-in tokio executor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Pool name to maximum concurrent jobs.
    pub pools: HashMap<String, usize>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            pools: HashMap::from([(DEFAULT_EXECUTOR.to_string(), DEFAULT_POOL_SIZE)]),
        }
    }
}

/// Proxy generation settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// When false, `wrap` always returns the bare instance.
    pub enabled: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}
