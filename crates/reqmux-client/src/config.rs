//! Multiplexer settings.
//!
//! Sources are layered, later ones winning:
//!
//! - built-in defaults (batch of 4 within 8-32 ms, 30 MiB / 5 min memory cache)
//! - an optional YAML file
//! - `REQMUX_`-prefixed environment variables, with `__` between sections
//!   (`REQMUX_BATCH__MAX_DELAY_MS=50`)
//!
//! ```ignore
//! use reqmux_client::{MultiplexerBuilder, MultiplexerConfig};
//!
//! let settings = MultiplexerConfig::load("reqmux.yaml")?;
//! let mux = MultiplexerBuilder::from_config(&settings).build()?;
//! ```

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use reqmux_domain::FetchPolicy;
use serde::{Deserialize, Serialize};

const ENV_PREFIX: &str = "REQMUX";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiplexerConfig {
    /// Batch endpoint for the HTTP transport. Optional when a custom
    /// transport is attached to the builder.
    pub endpoint: Option<String>,
    /// Per-send HTTP timeout. Must be non-zero.
    pub request_timeout_secs: u64,
    /// Applied to requests that do not pick a policy themselves.
    pub default_fetch_policy: FetchPolicy,
    /// Flush triggers.
    pub batch: BatchSettings,
    /// Memory cache attached by `MultiplexerBuilder::from_config`.
    pub cache: CacheSettings,
    /// Subscriber settings for `init_logging`.
    pub logging: LoggingSettings,
}

impl Default for MultiplexerConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            request_timeout_secs: 30,
            default_fetch_policy: FetchPolicy::CacheFirst,
            batch: BatchSettings::default(),
            cache: CacheSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

/// ```yaml
/// batch:
///   size: 5
///   min_delay_ms: 10
///   max_delay_ms: 50
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    /// Distinct keys that trigger an immediate flush.
    pub size: usize,
    /// Quiet period after the latest arrival.
    pub min_delay_ms: u64,
    /// Longest the first request of a batch may wait.
    pub max_delay_ms: u64,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            size: 4,
            min_delay_ms: 8,
            max_delay_ms: 32,
        }
    }
}

impl BatchSettings {
    /// `min_delay_ms` as a `Duration`.
    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    /// `max_delay_ms` as a `Duration`.
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Without a cache every fetch policy degrades to network-only.
    pub enabled: bool,
    /// Budget measured with the approximate JSON weigher.
    pub max_bytes: u64,
    /// Lifetime of each entry from the moment it is written.
    pub ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_bytes: 30 * 1024 * 1024,
            ttl_secs: 5 * 60,
        }
    }
}

impl CacheSettings {
    /// `ttl_secs` as a `Duration`.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Verbosity accepted in settings files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Level for every target unless `RUST_LOG` is set.
    pub level: LogLevel,
    /// One JSON object per line instead of human-readable text.
    pub json: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    /// A source could not be read or a value had the wrong type.
    #[error("could not read multiplexer settings: {0}")]
    Load(#[from] ConfigError),

    #[error("settings file {path} does not exist")]
    FileNotFound { path: String },

    #[error("invalid setting `{field}`: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

impl MultiplexerConfig {
    /// Reads `path` as YAML on top of the defaults, then applies
    /// environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        Self::assemble(Some(path))
    }

    /// Defaults plus environment overrides, no file.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        Self::assemble(None)
    }

    fn assemble(file: Option<&Path>) -> Result<Self, ConfigLoadError> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml));
        }
        let settings: Self = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Checks cross-field constraints that deserialization cannot express.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.batch.size == 0 {
            return Err(ConfigLoadError::Invalid {
                field: "batch.size",
                message: "a batch must hold at least one request".to_string(),
            });
        }
        if self.batch.min_delay_ms > self.batch.max_delay_ms {
            return Err(ConfigLoadError::Invalid {
                field: "batch.min_delay_ms",
                message: format!(
                    "{} ms exceeds batch.max_delay_ms ({} ms)",
                    self.batch.min_delay_ms, self.batch.max_delay_ms
                ),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigLoadError::Invalid {
                field: "request_timeout_secs",
                message: "every request would time out immediately".to_string(),
            });
        }
        if matches!(self.endpoint.as_deref(), Some(e) if e.trim().is_empty()) {
            return Err(ConfigLoadError::Invalid {
                field: "endpoint",
                message: "must not be blank".to_string(),
            });
        }
        if self.cache.enabled && self.cache.max_bytes == 0 {
            return Err(ConfigLoadError::Invalid {
                field: "cache.max_bytes",
                message: "an enabled cache needs a non-zero budget".to_string(),
            });
        }
        Ok(())
    }
}
