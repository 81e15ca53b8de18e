//! Server Configuration using Figment
//!
//! Strongly-typed configuration for the remote-control server. Configuration is
//! layered from:
//! 1. built-in defaults (every field has one)
//! 2. a TOML file (`config/rcs.toml` by default)
//! 3. environment variables prefixed with `RUST_RCS_`, nested with `__`
//!
//! # Example
//! ```no_run
//! use rust_rcs::config::ServerConfig;
//!
//! let config = ServerConfig::load()?;
//! println!("Listening on port {}", config.transport.port);
//! # Ok::<(), rust_rcs::error::RcsError>(())
//! ```

use crate::error::{RcsError, RcsResult};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Default configuration file location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/rcs.toml";

/// Top-level server configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Socket listener settings
    pub transport: TransportConfig,
    /// Stepped magnet move settings
    pub magnet: MagnetConfig,
    /// Beam blanking settings
    pub beam_blank: BeamBlankConfig,
    /// Scan snapshot formatting
    pub scan: ScanConfig,
    /// Cup configuration settings
    pub cups: CupsConfig,
    /// Names of fixed hardware parameters
    pub hardware: HardwareNames,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log line format
    pub log_format: LogFormat,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "Remote Control Server".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Compact,
        }
    }
}

/// Log line format, `application.log_format`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line with source locations and colors
    Pretty,
    /// One plain line per event
    #[default]
    Compact,
    /// One JSON object per event
    Json,
}

/// Which socket type the listener uses. Exactly one is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// One command per datagram
    Udp,
    /// One command per connection
    Tcp,
}

/// Socket listener configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// UDP or TCP
    pub mode: TransportMode,
    /// Interface to bind, e.g. `0.0.0.0`
    pub bind_address: String,
    /// Listening port
    pub port: u16,
    /// Receive buffer size in bytes; longer datagrams are truncated
    pub buffer_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            mode: TransportMode::Udp,
            bind_address: "0.0.0.0".to_string(),
            port: 1069,
            buffer_size: 1024,
        }
    }
}

impl TransportConfig {
    /// `bind_address:port` as a socket address string
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

/// Stepped magnet move configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MagnetConfig {
    /// Moves larger than this (DAC units) are stepped
    pub move_threshold: f64,
    /// Number of steps a large move is divided into
    pub steps: u32,
    /// Delay between steps in milliseconds (0 = no delay)
    pub step_time_ms: u64,
}

impl Default for MagnetConfig {
    fn default() -> Self {
        Self {
            move_threshold: 0.25,
            steps: 20,
            step_time_ms: 0,
        }
    }
}

/// Beam blanking configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeamBlankConfig {
    /// When false `BlankBeam` always answers OK without touching hardware
    pub enabled: bool,
    /// Y-Symmetry value written while the beam is blanked
    pub blank_value: f64,
}

impl Default for BeamBlankConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            blank_value: -50.0,
        }
    }
}

/// Scan snapshot configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Append detector tags after each value
    pub tag_data: bool,
    /// Tag of the ion-counter channel, always reported last
    pub ion_counter_tag: String,
    /// Capacity of the spectrum event channel
    pub channel_capacity: usize,
    /// `SetIntegrationTime` restarts monitoring when true, otherwise it is a no-op
    pub allow_integration_time_change: bool,
    /// Collector identifier to detector tag, e.g. `"CUP 4" = "H2"`
    pub detectors: BTreeMap<String, String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        let detectors = [
            ("CUP 4", "H2"),
            ("CUP 3", "H1"),
            ("CUP 2", "AX"),
            ("CUP 1", "L1"),
            ("CUP 0", "L2"),
            ("CDD 0", "CDD"),
        ]
        .into_iter()
        .map(|(id, tag)| (id.to_string(), tag.to_string()))
        .collect();

        Self {
            tag_data: true,
            ion_counter_tag: "CDD".to_string(),
            channel_capacity: 16,
            allow_integration_time_change: false,
            detectors,
        }
    }
}

/// Cup configuration settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CupsConfig {
    /// Cup configuration `SetSubCupConfiguration` activates sub-cups within
    pub cup_configuration: String,
    /// Parameters reported by `GetSubCupParameters`, in order
    pub sub_cup_parameters: Vec<String>,
}

impl Default for CupsConfig {
    fn default() -> Self {
        Self {
            cup_configuration: "Argon".to_string(),
            sub_cup_parameters: [
                "Deflection H2 Set",
                "Deflection H1 Set",
                "Deflection AX Set",
                "Deflection L1 Set",
                "Deflection L2 Set",
                "Deflection CDD Set",
                "CDD Supply Set",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Hardware parameter names the fixed verbs address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareNames {
    /// Parameter driven by `GetMagnetDAC` / `SetMagnetDAC`
    pub magnet_dac: String,
    /// Deflector used for beam blanking
    pub y_symmetry: String,
    /// Valve parameter driven by `Open` / `Close`
    pub ion_pump_valve: String,
}

impl Default for HardwareNames {
    fn default() -> Self {
        Self {
            magnet_dac: "Field Set".to_string(),
            y_symmetry: "Y-Symmetry Set".to_string(),
            ion_pump_valve: "Valve Ion Pump Set".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from the default file and environment variables
    ///
    /// Environment variables override the file with prefix `RUST_RCS_`.
    /// Example: `RUST_RCS_TRANSPORT__PORT=1070`
    pub fn load() -> RcsResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path. A missing file leaves the
    /// defaults in place.
    pub fn load_from<P: AsRef<Path>>(path: P) -> RcsResult<Self> {
        let config: Self = Self::figment(path.as_ref()).extract()?;
        config.validate().map_err(RcsError::Configuration)?;
        Ok(config)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(ServerConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("RUST_RCS_").split("__"))
    }

    /// Render the configuration as TOML
    pub fn to_toml_string(&self) -> RcsResult<String> {
        toml::to_string_pretty(self).map_err(|e| RcsError::Configuration(e.to_string()))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.transport.buffer_size == 0 {
            return Err("transport.buffer_size must be greater than 0".to_string());
        }

        if self.magnet.steps == 0 {
            return Err("magnet.steps must be at least 1".to_string());
        }

        if !self.magnet.move_threshold.is_finite() || self.magnet.move_threshold < 0.0 {
            return Err(format!(
                "Invalid magnet.move_threshold {}. Must be a non-negative number",
                self.magnet.move_threshold
            ));
        }

        if self.scan.detectors.is_empty() {
            return Err("scan.detectors must name at least one detector".to_string());
        }

        if self.scan.channel_capacity == 0 {
            return Err("scan.channel_capacity must be greater than 0".to_string());
        }

        let mut tags = HashSet::new();
        for tag in self.scan.detectors.values() {
            if !tags.insert(tag) {
                return Err(format!("Duplicate detector tag: {tag}"));
            }
        }

        if self.cups.cup_configuration.trim().is_empty() {
            return Err("cups.cup_configuration must not be empty".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.transport.port, 1069);
        assert_eq!(config.transport.mode, TransportMode::Udp);
        assert_eq!(config.magnet.steps, 20);
        assert_eq!(config.cups.cup_configuration, "Argon");
        assert_eq!(config.scan.detectors.get("CDD 0").map(String::as_str), Some("CDD"));
    }

    #[test]
    fn load_from_file_merges_over_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "rcs.toml",
                r#"
[transport]
mode = "tcp"
port = 2000

[magnet]
steps = 10
step_time_ms = 5
"#,
            )?;

            let config = ServerConfig::load_from("rcs.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.transport.mode, TransportMode::Tcp);
            assert_eq!(config.transport.port, 2000);
            assert_eq!(config.transport.bind_address, "0.0.0.0");
            assert_eq!(config.magnet.steps, 10);
            assert_eq!(config.magnet.step_time_ms, 5);
            assert_eq!(config.magnet.move_threshold, 0.25);
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "rcs.toml",
                r#"
[transport]
port = 2000

[beam_blank]
enabled = false
"#,
            )?;
            jail.set_env("RUST_RCS_TRANSPORT__PORT", "1070");
            jail.set_env("RUST_RCS_BEAM_BLANK__ENABLED", "true");

            let config = ServerConfig::load_from("rcs.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.transport.port, 1070);
            assert!(config.beam_blank.enabled);
            Ok(())
        });
    }

    #[test]
    fn log_format_from_file_and_environment() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("rcs.toml", "[application]\nlog_format = \"pretty\"\n")?;
            let config = ServerConfig::load_from("rcs.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.application.log_format, LogFormat::Pretty);

            jail.set_env("RUST_RCS_APPLICATION__LOG_FORMAT", "json");
            let config = ServerConfig::load_from("rcs.toml").map_err(|e| e.to_string())?;
            assert_eq!(config.application.log_format, LogFormat::Json);
            Ok(())
        });
    }

    #[test]
    fn unknown_log_format_rejected() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("rcs.toml", "[application]\nlog_format = \"xml\"\n")?;
            let err = ServerConfig::load_from("rcs.toml").unwrap_err();
            assert!(matches!(err, RcsError::Config(_)));
            Ok(())
        });
    }

    #[test]
    fn missing_file_yields_defaults() {
        figment::Jail::expect_with(|_jail| {
            let config = ServerConfig::load_from("absent.toml").map_err(|e| e.to_string())?;
            assert_eq!(config, ServerConfig::default());
            Ok(())
        });
    }

    #[test]
    fn invalid_log_level_rejected() {
        let mut config = ServerConfig::default();
        config.application.log_level = "chatty".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_steps_rejected() {
        let mut config = ServerConfig::default();
        config.magnet.steps = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn negative_threshold_rejected() {
        let mut config = ServerConfig::default();
        config.magnet.move_threshold = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_detector_table_rejected() {
        let mut config = ServerConfig::default();
        config.scan.detectors.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn duplicate_detector_tags_rejected() {
        let mut config = ServerConfig::default();
        config.scan.detectors.insert("CUP 9".into(), "H2".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_rendering_loads_back() {
        figment::Jail::expect_with(|jail| {
            let mut config = ServerConfig::default();
            config.beam_blank.enabled = true;
            let rendered = config.to_toml_string().map_err(|e| e.to_string())?;
            jail.create_file("rendered.toml", &rendered)?;

            let loaded = ServerConfig::load_from("rendered.toml").map_err(|e| e.to_string())?;
            assert_eq!(loaded, config);
            Ok(())
        });
    }
}
