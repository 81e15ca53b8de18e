//! Mock Instrument
//!
//! In-memory stand-in for the instrument session and the tune-setting store.
//! Used by the test suite and by `rust_rcs serve --mock` to run the server
//! without a spectrometer attached.
//!
//! # Behavior
//!
//! - Parameters live in a name → value map. Writes update the map, so a read
//!   after a write returns the written value.
//! - Reads of unknown names fail, writes of unknown names create them.
//! - Every write attempt (accepted or rejected) is appended to a write log.
//! - Failures can be injected per parameter name or per write index.
//! - Spectra are pushed into the registered channel by [`MockInstrument::emit_spectrum`]
//!   or by the simulated acquisition task.
//!
//! # Example
//!
//! ```rust,ignore
//! let instrument = MockInstrument::argus();
//! instrument.set_parameter("Field Set", 5.0).await?;
//! assert_eq!(instrument.get_parameter("Field Set").await?, 5.0);
//! assert_eq!(instrument.writes_to("Field Set"), vec![5.0]);
//! ```

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};

use crate::hardware::cups::{CollectorItem, CupConfiguration, SubCupConfiguration};
use crate::hardware::session::{
    InstrumentSession, MeasurementInfo, ScanType, Spectrum, SpectrumPoint,
};
use crate::hardware::tuning::{TuneSettings, TuneSettingsStore};

#[derive(Debug)]
struct MockState {
    parameters: HashMap<String, f64>,
    writes: Vec<(String, f64)>,
    rejected_names: HashSet<String>,
    rejected_write_indices: HashSet<usize>,
    cup_configurations: Vec<CupConfiguration>,
    active: (String, String),
    hardware_parameter_pushes: Vec<(String, String)>,
    configuration_change_requests: usize,
    reject_configuration_change: bool,
    measurement_info: MeasurementInfo,
    scan_initializations: usize,
    monitoring_requests: Vec<MeasurementInfo>,
    applied_tunes: Vec<String>,
}

/// Simulated spectrometer session
///
/// Cheap to clone; clones share state.
#[derive(Debug, Clone)]
pub struct MockInstrument {
    state: Arc<Mutex<MockState>>,
    sink: Arc<Mutex<Option<mpsc::Sender<Spectrum>>>>,
}

impl MockInstrument {
    /// Empty instrument: no parameters, no cup configurations
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                parameters: HashMap::new(),
                writes: Vec::new(),
                rejected_names: HashSet::new(),
                rejected_write_indices: HashSet::new(),
                cup_configurations: Vec::new(),
                active: (String::new(), String::new()),
                hardware_parameter_pushes: Vec::new(),
                configuration_change_requests: 0,
                reject_configuration_change: false,
                measurement_info: MeasurementInfo {
                    scan_type: ScanType::Monitor,
                    integration_time_ms: 1048.576,
                    settling_time_ms: 0,
                    mass: None,
                },
                scan_initializations: 0,
                monitoring_requests: Vec::new(),
                applied_tunes: Vec::new(),
            })),
            sink: Arc::new(Mutex::new(None)),
        }
    }

    /// Instrument preloaded like a five-cup multicollector with one ion counter
    ///
    /// Cup configuration `Argon` (sub-cups `Ar40`, `Ar36`) is active with
    /// collectors H2..L2 on masses 40..36 and `CDD 0` on 36. A second
    /// counter `CDD 1` has no mass assigned.
    pub fn argus() -> Self {
        let instrument = Self::new();
        {
            let mut state = instrument.state.lock();
            for (name, value) in [
                ("Field Set", 4.5),
                ("Y-Symmetry Set", 12.5),
                ("Z-Symmetry Set", 3.2),
                ("Z-Focus Set", 60.0),
                ("Extraction Lens Set", 85.0),
                ("Ion Repeller Set", -1.5),
                ("Trap Voltage Set", 120.0),
                ("Trap Voltage Readback", 120.3),
                ("Electron Energy Set", 100.0),
                ("Electron Energy Readback", 99.8),
                ("Acceleration Reference Set", 4.5),
                ("Valve Ion Pump Set", 0.0),
                ("Deflection H2 Set", 10.0),
                ("Deflection H1 Set", 20.0),
                ("Deflection AX Set", 30.0),
                ("Deflection L1 Set", 40.0),
                ("Deflection L2 Set", 50.0),
                ("Deflection CDD Set", 60.0),
                ("CDD Supply Set", 1800.0),
            ] {
                state.parameters.insert(name.to_string(), value);
            }

            state.cup_configurations = vec![
                CupConfiguration {
                    identifier: "cc-1".into(),
                    name: "Argon".into(),
                    sub_cup_configurations: vec![
                        SubCupConfiguration::new("sc-1", "Ar40"),
                        SubCupConfiguration::new("sc-2", "Ar36"),
                    ],
                    collector_items: vec![
                        CollectorItem::faraday("CUP 4", Some(40.0)),
                        CollectorItem::faraday("CUP 3", Some(39.0)),
                        CollectorItem::faraday("CUP 2", Some(38.0)),
                        CollectorItem::faraday("CUP 1", Some(37.0)),
                        CollectorItem::faraday("CUP 0", Some(35.5)),
                        CollectorItem::counter("CDD 0", Some(36.0)),
                        CollectorItem::counter("CDD 1", None),
                    ],
                },
                CupConfiguration {
                    identifier: "cc-2".into(),
                    name: "Helium".into(),
                    sub_cup_configurations: vec![SubCupConfiguration::new("sc-3", "He4")],
                    collector_items: vec![
                        CollectorItem::faraday("CUP 2", Some(4.0)),
                        CollectorItem::counter("CDD 0", Some(3.0)),
                    ],
                },
            ];
            state.active = ("cc-1".into(), "sc-1".into());
        }
        instrument
    }

    /// Set a parameter value without logging a write (builder style)
    pub fn with_parameter(self, name: &str, value: f64) -> Self {
        self.state.lock().parameters.insert(name.to_string(), value);
        self
    }

    /// Current value of a parameter, bypassing the session interface
    pub fn value(&self, name: &str) -> Option<f64> {
        self.state.lock().parameters.get(name).copied()
    }

    /// Reject every write to `name`
    pub fn reject_writes_to(&self, name: &str) {
        self.state.lock().rejected_names.insert(name.to_string());
    }

    /// Reject the `index`-th write attempt (1-based, counted over all names)
    pub fn reject_write_number(&self, index: usize) {
        self.state.lock().rejected_write_indices.insert(index);
    }

    /// Make `request_cup_configuration_change` fail
    pub fn reject_configuration_changes(&self, reject: bool) {
        self.state.lock().reject_configuration_change = reject;
    }

    /// Every write attempt, in order
    pub fn writes(&self) -> Vec<(String, f64)> {
        self.state.lock().writes.clone()
    }

    /// Values written to one parameter, in order
    pub fn writes_to(&self, name: &str) -> Vec<f64> {
        self.state
            .lock()
            .writes
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| *v)
            .collect()
    }

    /// Number of configuration change requests received
    pub fn configuration_change_requests(&self) -> usize {
        self.state.lock().configuration_change_requests
    }

    /// Cup / sub-cup identifier pairs whose hardware parameters were pushed
    pub fn hardware_parameter_pushes(&self) -> Vec<(String, String)> {
        self.state.lock().hardware_parameter_pushes.clone()
    }

    /// Snapshot of the active cup configuration
    pub fn active_cup(&self) -> Option<CupConfiguration> {
        let state = self.state.lock();
        state
            .cup_configurations
            .iter()
            .find(|c| c.identifier == state.active.0)
            .cloned()
    }

    /// Number of `initialize_scan` calls
    pub fn scan_initializations(&self) -> usize {
        self.state.lock().scan_initializations
    }

    /// Monitor scans requested so far
    pub fn monitoring_requests(&self) -> Vec<MeasurementInfo> {
        self.state.lock().monitoring_requests.clone()
    }

    /// Names of tune settings applied so far
    pub fn applied_tunes(&self) -> Vec<String> {
        self.state.lock().applied_tunes.clone()
    }

    /// True while a spectrum channel is registered
    pub fn has_subscriber(&self) -> bool {
        self.sink.lock().is_some()
    }

    /// Deliver a spectrum to the registered channel. Returns false when nobody
    /// is subscribed or the channel is full.
    pub fn emit_spectrum(&self, spectrum: Spectrum) -> bool {
        match self.sink.lock().as_ref() {
            Some(sink) => sink.try_send(spectrum).is_ok(),
            None => false,
        }
    }

    /// Build a spectrum with one point per massed collector of the active
    /// configuration. Readings are derived from `cycle` so consecutive
    /// spectra differ.
    pub fn synthesize_spectrum(&self, cycle: u64) -> Spectrum {
        let Some(cup) = self.active_cup() else {
            return Spectrum::default();
        };
        let series = cup
            .collector_items
            .iter()
            .filter_map(|c| c.mass)
            .enumerate()
            .map(|(i, mass)| {
                let phase = (cycle as f64 * 0.1) + i as f64;
                vec![SpectrumPoint::new(mass, 1.0 + 0.05 * phase.sin())]
            })
            .collect();
        Spectrum::new(series)
    }

    /// Spawn a task that emits a synthesized spectrum every `period`
    pub fn start_simulated_scans(&self, period: Duration) -> JoinHandle<()> {
        let instrument = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(period);
            let mut cycle = 0u64;
            loop {
                ticker.tick().await;
                cycle += 1;
                let spectrum = instrument.synthesize_spectrum(cycle);
                if !instrument.emit_spectrum(spectrum) && !instrument.has_subscriber() {
                    tracing::debug!("MockInstrument: no spectrum subscriber, stopping simulation");
                    break;
                }
            }
        })
    }
}

impl Default for MockInstrument {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InstrumentSession for MockInstrument {
    async fn get_parameter(&self, name: &str) -> Result<f64> {
        self.state
            .lock()
            .parameters
            .get(name)
            .copied()
            .ok_or_else(|| anyhow!("MockInstrument: unknown parameter '{}'", name))
    }

    async fn set_parameter(&self, name: &str, value: f64) -> Result<()> {
        let mut state = self.state.lock();
        state.writes.push((name.to_string(), value));
        let index = state.writes.len();
        if state.rejected_names.contains(name) || state.rejected_write_indices.contains(&index) {
            bail!("MockInstrument: write #{} of {} to '{}' rejected", index, value, name);
        }
        state.parameters.insert(name.to_string(), value);
        Ok(())
    }

    async fn cup_configurations(&self) -> Result<Vec<CupConfiguration>> {
        Ok(self.state.lock().cup_configurations.clone())
    }

    async fn active_configuration(&self) -> Result<(String, String)> {
        let state = self.state.lock();
        let (cup_id, sub_id) = &state.active;
        let cup = state
            .cup_configurations
            .iter()
            .find(|c| &c.identifier == cup_id)
            .ok_or_else(|| anyhow!("MockInstrument: no active cup configuration"))?;
        let sub = cup
            .sub_cup_configurations
            .iter()
            .find(|s| &s.identifier == sub_id)
            .map(|s| s.name.clone())
            .unwrap_or_default();
        Ok((cup.name.clone(), sub))
    }

    async fn set_active_configuration(&self, cup_id: &str, sub_cup_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        if !state.cup_configurations.iter().any(|c| c.identifier == cup_id) {
            bail!("MockInstrument: unknown cup configuration id '{}'", cup_id);
        }
        state.active = (cup_id.to_string(), sub_cup_id.to_string());
        Ok(())
    }

    async fn set_hardware_parameters(&self, cup_id: &str, sub_cup_id: &str) -> Result<()> {
        self.state
            .lock()
            .hardware_parameter_pushes
            .push((cup_id.to_string(), sub_cup_id.to_string()));
        Ok(())
    }

    async fn request_cup_configuration_change(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.configuration_change_requests += 1;
        if state.reject_configuration_change {
            bail!("MockInstrument: configuration change rejected");
        }
        Ok(())
    }

    async fn set_collector_active(
        &self,
        cup_id: &str,
        collector_id: &str,
        active: bool,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let collector = state
            .cup_configurations
            .iter_mut()
            .find(|c| c.identifier == cup_id)
            .and_then(|c| {
                c.collector_items
                    .iter_mut()
                    .find(|item| item.identifier == collector_id)
            })
            .ok_or_else(|| {
                anyhow!("MockInstrument: no collector '{}' in '{}'", collector_id, cup_id)
            })?;
        collector.active = active;
        Ok(())
    }

    async fn initialize_scan(&self) -> Result<()> {
        self.state.lock().scan_initializations += 1;
        Ok(())
    }

    async fn measurement_info(&self) -> Result<MeasurementInfo> {
        Ok(self.state.lock().measurement_info.clone())
    }

    async fn start_monitoring(&self, info: MeasurementInfo) -> Result<()> {
        let mut state = self.state.lock();
        state.monitoring_requests.push(info.clone());
        state.measurement_info = info;
        Ok(())
    }

    async fn apply_tune_parameters(&self, settings: &TuneSettings) -> Result<()> {
        let mut state = self.state.lock();
        for (name, value) in &settings.parameters {
            state.parameters.insert(name.clone(), *value);
        }
        state.applied_tunes.push(settings.name.clone());
        Ok(())
    }

    fn subscribe_spectra(&self, sink: mpsc::Sender<Spectrum>) {
        *self.sink.lock() = Some(sink);
    }

    fn unsubscribe_spectra(&self) {
        *self.sink.lock() = None;
    }
}

/// In-memory tune-setting store
#[derive(Debug, Clone, Default)]
pub struct MockTuneStore {
    entries: BTreeMap<String, TuneSettings>,
}

impl MockTuneStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry (builder style)
    pub fn with_entry(mut self, settings: TuneSettings) -> Self {
        self.entries.insert(settings.name.clone(), settings);
        self
    }

    /// Store preloaded with two source tunes
    pub fn sample() -> Self {
        Self::new()
            .with_entry(
                TuneSettings::new("Argon")
                    .with_parameter("Trap Voltage Set", 120.0)
                    .with_parameter("Electron Energy Set", 100.0),
            )
            .with_entry(
                TuneSettings::new("HighSens")
                    .with_parameter("Trap Voltage Set", 200.0)
                    .with_parameter("Electron Energy Set", 90.0),
            )
    }
}

impl TuneSettingsStore for MockTuneStore {
    fn entries(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn read_entry(&self, name: &str) -> Option<TuneSettings> {
        self.entries.get(name).cloned()
    }
}
