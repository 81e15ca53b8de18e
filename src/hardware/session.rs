//! Instrument Session Contract
//!
//! The instrument driver is an external collaborator. This module defines the
//! narrow surface the server consumes from it:
//!
//! - named parameter reads and writes
//! - cup / sub-cup configuration enumeration and activation
//! - scan-transition control (`initialize_scan`, `start_monitoring`)
//! - tune parameter application
//! - delivery of completed spectra through a bounded channel
//!
//! # Contract
//!
//! - Parameter names are opaque strings; the instrument decides validity.
//! - `get_parameter` fails for unknown or unreadable names.
//! - `set_parameter` fails when the instrument rejects the write.
//! - Configuration data is owned by the instrument. The server receives
//!   snapshots and requests mutations through the methods below.
//! - Every method is attempted once. The server never retries.
//!
//! # Thread Safety
//! - All methods take `&self`; implementations use interior mutability.
//! - `subscribe_spectra` hands the implementation a sender it may push to from
//!   any thread.

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::hardware::cups::CupConfiguration;
use crate::hardware::tuning::TuneSettings;

/// One acquired point of a spectrum series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectrumPoint {
    /// Mass the point was acquired at
    pub mass: f64,
    /// Detector reading (volts for Faraday cups, counts for ion counters)
    pub analog: f64,
}

impl SpectrumPoint {
    /// Create a point
    pub fn new(mass: f64, analog: f64) -> Self {
        Self { mass, analog }
    }
}

/// A completed spectrum as delivered by the instrument: ordered series of points.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Spectrum {
    /// One series per detector channel, in acquisition order
    pub series: Vec<Vec<SpectrumPoint>>,
}

impl Spectrum {
    /// Build a spectrum from its series
    pub fn new(series: Vec<Vec<SpectrumPoint>>) -> Self {
        Self { series }
    }

    /// Iterate over every point of every series in order
    pub fn points(&self) -> impl Iterator<Item = &SpectrumPoint> {
        self.series.iter().flatten()
    }
}

/// Acquisition mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanType {
    /// Continuous acquisition at one mass
    Monitor,
    /// Stepped acquisition across a mass range
    Sweep,
}

/// Parameters of a scan transition
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementInfo {
    /// Monitor or sweep
    pub scan_type: ScanType,
    /// Integration time per point
    pub integration_time_ms: f64,
    /// Settling time before each point
    pub settling_time_ms: u32,
    /// Mass to monitor; `None` means the master collector's mass
    pub mass: Option<f64>,
}

/// The instrument driver as seen by the server.
#[async_trait]
pub trait InstrumentSession: Send + Sync {
    /// Read a named hardware parameter
    async fn get_parameter(&self, name: &str) -> Result<f64>;

    /// Write a named hardware parameter
    async fn set_parameter(&self, name: &str, value: f64) -> Result<()>;

    /// All cup configurations known to the instrument
    async fn cup_configurations(&self) -> Result<Vec<CupConfiguration>>;

    /// Names of the active `(cup configuration, sub-cup configuration)` pair
    async fn active_configuration(&self) -> Result<(String, String)>;

    /// Mark a cup / sub-cup pair active, by identifier
    async fn set_active_configuration(&self, cup_id: &str, sub_cup_id: &str) -> Result<()>;

    /// Push the hardware parameter set belonging to a cup / sub-cup pair
    async fn set_hardware_parameters(&self, cup_id: &str, sub_cup_id: &str) -> Result<()>;

    /// Ask the instrument to physically switch to the active configuration
    async fn request_cup_configuration_change(&self) -> Result<()>;

    /// Set the `active` flag of one collector in a cup configuration
    async fn set_collector_active(&self, cup_id: &str, collector_id: &str, active: bool)
        -> Result<()>;

    /// Prepare the instrument for script-driven scanning using its current
    /// measurement settings
    async fn initialize_scan(&self) -> Result<()>;

    /// Current measurement settings
    async fn measurement_info(&self) -> Result<MeasurementInfo>;

    /// Start a monitor scan with the given settings
    async fn start_monitoring(&self, info: MeasurementInfo) -> Result<()>;

    /// Replace the live tune parameters with a stored block
    async fn apply_tune_parameters(&self, settings: &TuneSettings) -> Result<()>;

    /// Register the channel completed spectra are delivered to. A later
    /// registration replaces the earlier one.
    fn subscribe_spectra(&self, sink: mpsc::Sender<Spectrum>);

    /// Drop the registered spectrum channel
    fn unsubscribe_spectra(&self);
}
