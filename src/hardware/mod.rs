//! Instrument collaborators.
//!
//! The spectrometer driver and the tune-setting store live outside this crate.
//! This module defines the traits the server consumes from them, their data
//! model, and an in-memory mock used for tests and simulated operation.
//!
//! - [`session`]: `InstrumentSession` trait, spectra and measurement settings
//! - [`cups`]: cup / sub-cup configurations and collector items
//! - [`tuning`]: `TuneSettingsStore` trait and tune blocks
//! - [`mock`]: `MockInstrument` and `MockTuneStore`

pub mod cups;
pub mod mock;
pub mod session;
pub mod tuning;

pub use cups::{CollectorItem, CollectorType, CupConfiguration, SubCupConfiguration};
pub use session::{InstrumentSession, MeasurementInfo, ScanType, Spectrum, SpectrumPoint};
pub use tuning::{TuneSettings, TuneSettingsStore};
