//! Subscriber setup for the multiplexer's `tracing` events.
//!
//! The engine logs batch lifecycle at `debug` (arm, flush, absorb, stale
//! drop) and protocol or transport failures at `warn`. A typical JSON line:
//!
//! ```json
//! {"timestamp":"...","level":"DEBUG","target":"reqmux_client::multiplexer::engine","fields":{"message":"flushing batch","rank":3,"keys":2,"requests":5}}
//! ```

use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingSettings;

const REQMUX_TARGETS: [&str; 2] = ["reqmux_client", "reqmux_domain"];

/// Output encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Compact single-line text for terminals.
    #[default]
    Text,
    /// One JSON object per event, for log shippers.
    Json,
}

/// Subscriber settings for [`init_logging`].
///
/// # Example
///
/// ```rust,ignore
/// let settings = MultiplexerConfig::load("reqmux.yaml")?;
/// let logging = LoggingConfig::from_settings(&settings.logging)
///     .with_level(Level::WARN)
///     .with_reqmux_level(Level::DEBUG);
/// init_logging(&logging);
/// ```
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Output encoding.
    pub format: LogFormat,
    /// Level for every target when `RUST_LOG` is unset.
    pub level: Level,
    /// Overrides `level` for the reqmux crates only, so batch tracing can be
    /// turned up without the HTTP stack's noise.
    pub reqmux_level: Option<Level>,
    /// Emit span enter/exit events.
    pub span_events: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            level: Level::INFO,
            reqmux_level: None,
            span_events: false,
        }
    }
}

impl LoggingConfig {
    /// Builds from the `logging` section of the settings file.
    ///
    /// # Arguments
    ///
    /// * `settings` - Level and JSON switch as loaded by `MultiplexerConfig`
    pub fn from_settings(settings: &LoggingSettings) -> Self {
        Self {
            format: if settings.json {
                LogFormat::Json
            } else {
                LogFormat::Text
            },
            level: settings.level.into(),
            ..Self::default()
        }
    }

    /// Sets the output encoding.
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets the level applied to every target.
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Sets a separate level for `reqmux_client` and `reqmux_domain`.
    ///
    /// # Arguments
    ///
    /// * `level` - Level for the reqmux targets; others keep `level`
    pub fn with_reqmux_level(mut self, level: Level) -> Self {
        self.reqmux_level = Some(level);
        self
    }

    /// Turns on span enter/exit events.
    pub fn with_span_events(mut self) -> Self {
        self.span_events = true;
        self
    }

    /// Filter directives, e.g. `warn,reqmux_client=debug,reqmux_domain=debug`.
    pub fn directives(&self) -> String {
        let mut directives = self.level.to_string().to_lowercase();
        if let Some(level) = self.reqmux_level {
            let level = level.to_string().to_lowercase();
            for target in REQMUX_TARGETS {
                directives.push_str(&format!(",{target}={level}"));
            }
        }
        directives
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.directives()))
    }

    fn fmt_span(&self) -> FmtSpan {
        if self.span_events {
            FmtSpan::ENTER | FmtSpan::EXIT
        } else {
            FmtSpan::NONE
        }
    }
}

/// Installs the global subscriber.
///
/// `RUST_LOG`, when set, replaces the directives built from `config`.
///
/// # Arguments
///
/// * `config` - Format, levels and span settings
///
/// # Returns
///
/// `false` if a global subscriber was already set; the existing one is kept.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let registry = tracing_subscriber::registry().with(config.filter());

    let installed = match config.format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_span_events(config.fmt_span())
                    .with_current_span(true)
                    .with_target(true),
            )
            .try_init(),
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .compact()
                    .with_span_events(config.fmt_span())
                    .with_target(true),
            )
            .try_init(),
    };

    installed.is_ok()
}

/// JSON subscriber that logs every level to `writer`; scope it with
/// `tracing::subscriber::with_default` to capture output.
pub fn capture_subscriber<W>(writer: W) -> impl tracing::Subscriber + Send + Sync
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::registry().with(EnvFilter::new("trace")).with(
        fmt::layer()
            .json()
            .with_writer(writer)
            .with_current_span(true)
            .with_target(true),
    )
}
