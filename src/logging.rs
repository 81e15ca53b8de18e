//! Tracing subscriber setup.
//!
//! One `fmt` layer on a registry. `application.log_level` sets the default
//! directive, `RUST_LOG` overrides it when present, and
//! `application.log_format` picks the line format.
//!
//! # Example
//! ```no_run
//! use rust_rcs::{config::ServerConfig, logging};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServerConfig::load()?;
//! logging::init_from_config(&config)?;
//! tracing::info!("server starting");
//! # Ok(())
//! # }
//! ```

use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

use crate::config::{LogFormat, ServerConfig};

/// Resolved subscriber settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is unset
    pub level: Level,
    /// Line format
    pub format: LogFormat,
}

impl LoggingConfig {
    /// Resolve the `[application]` logging keys
    pub fn from_server_config(config: &ServerConfig) -> Result<Self, String> {
        Ok(Self {
            level: parse_log_level(&config.application.log_level)?,
            format: config.application.log_format,
        })
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::builder()
            .with_default_directive(LevelFilter::from_level(self.level).into())
            .from_env_lossy()
    }

    fn layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let filter = self.filter();
        let base = fmt::layer().with_thread_names(true);
        match self.format {
            LogFormat::Pretty => base
                .pretty()
                .with_file(true)
                .with_line_number(true)
                .with_filter(filter)
                .boxed(),
            LogFormat::Compact => base.compact().with_ansi(false).with_filter(filter).boxed(),
            LogFormat::Json => base
                .json()
                .with_current_span(true)
                .with_filter(filter)
                .boxed(),
        }
    }
}

/// Install the global subscriber described by `config`
pub fn init_from_config(config: &ServerConfig) -> Result<(), String> {
    init(&LoggingConfig::from_server_config(config)?)
}

/// Install the global subscriber. A subscriber that is already installed is
/// left in place and reported as success.
pub fn init(config: &LoggingConfig) -> Result<(), String> {
    match tracing_subscriber::registry().with(config.layer()).try_init() {
        Ok(()) => Ok(()),
        Err(e) if e.to_string().contains("already been set") => Ok(()),
        Err(e) => Err(format!("Failed to initialize logging: {e}")),
    }
}

/// Parse a level name, case-insensitively
pub fn parse_log_level(level: &str) -> Result<Level, String> {
    level.trim().parse::<Level>().map_err(|_| {
        format!("Invalid log level '{level}'. Must be one of: trace, debug, info, warn, error")
    })
}
