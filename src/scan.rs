//! Scan Data Aggregator
//!
//! The instrument delivers completed spectra asynchronously. The aggregator
//! drains them from a bounded channel on its own task and turns each one into
//! the flat, comma-separated snapshot string returned by `GetData`.
//!
//! # Snapshot layout
//!
//! For every point of every series, the first collector of the active cup
//! configuration with the same mass names the detector; its identifier is
//! mapped to a tag (`CUP 4` → `H2`, ...). Points without a matching collector
//! are skipped. The entries are collected as `value, tag` pairs, the whole list
//! is reversed, and the ion-counter reading is appended last:
//!
//! ```text
//! resolved order   H2=1.1  H1=2.2  AX=3.3  CDD=9
//! snapshot         AX,3.3,H1,2.2,H2,1.1,CDD,9
//! ```
//!
//! The reversal and the trailing ion-counter entry are a display convention
//! clients depend on.
//!
//! # Locking
//!
//! The active cup configuration is resolved and the new snapshot built before
//! the write lock is taken; the lock only covers the swap. `GetData` reads
//! under the same lock, so a reader never sees a partially rebuilt value.

use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

use crate::config::ScanConfig;
use crate::cup_config::CupConfigurationManager;
use crate::error::RcsResult;
use crate::hardware::{CupConfiguration, Spectrum};
use crate::parameter::format_value;

/// Latest scan snapshot, shared between the aggregator and the dispatcher
#[derive(Debug, Clone, Default)]
pub struct ScanSnapshot {
    inner: Arc<RwLock<String>>,
}

impl ScanSnapshot {
    /// Empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot text (empty until the first spectrum arrives)
    pub async fn get(&self) -> String {
        self.inner.read().await.clone()
    }
}

/// Build the snapshot string for one spectrum
pub fn build_snapshot(spectrum: &Spectrum, cup: &CupConfiguration, config: &ScanConfig) -> String {
    let ion_counter_tag = config.ion_counter_tag.as_str();
    let mut data: Vec<String> = Vec::new();
    let mut ion_counter: Option<f64> = None;

    for point in spectrum.points() {
        let Some(item) = cup.collector_at_mass(point.mass) else {
            continue;
        };
        let tag = config
            .detectors
            .get(&item.identifier)
            .map(String::as_str)
            .unwrap_or("");

        if tag == ion_counter_tag {
            ion_counter = Some(point.analog);
        } else {
            data.push(format_value(point.analog));
            if config.tag_data {
                data.push(tag.to_string());
            }
        }
    }

    data.reverse();
    if let Some(counts) = ion_counter {
        if config.tag_data {
            data.push(ion_counter_tag.to_string());
        }
        data.push(format_value(counts));
    }

    data.join(",")
}

/// Consumes spectrum events and maintains the shared [`ScanSnapshot`]
pub struct ScanDataAggregator {
    snapshot: ScanSnapshot,
    cups: Arc<CupConfigurationManager>,
    config: ScanConfig,
}

impl ScanDataAggregator {
    /// Aggregator publishing into `snapshot`
    pub fn new(snapshot: ScanSnapshot, cups: Arc<CupConfigurationManager>, config: ScanConfig) -> Self {
        Self {
            snapshot,
            cups,
            config,
        }
    }

    /// Rebuild the snapshot from one spectrum
    pub async fn ingest(&self, spectrum: &Spectrum) -> RcsResult<()> {
        let cup = self.cups.active_cup_configuration().await?;
        let rebuilt = build_snapshot(spectrum, &cup, &self.config);
        tracing::trace!(snapshot = rebuilt.as_str(), "Scan snapshot updated");
        *self.snapshot.inner.write().await = rebuilt;
        Ok(())
    }

    /// Drain the channel until every sender is dropped
    pub async fn run(self, mut spectra: mpsc::Receiver<Spectrum>) {
        while let Some(spectrum) = spectra.recv().await {
            if let Err(e) = self.ingest(&spectrum).await {
                tracing::warn!(error = %e, "Dropping spectrum");
            }
        }
        tracing::debug!("Spectrum channel closed, aggregator stopping");
    }

    /// Run on a background task
    pub fn spawn(self, spectra: mpsc::Receiver<Spectrum>) -> JoinHandle<()> {
        tokio::spawn(self.run(spectra))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CupsConfig;
    use crate::hardware::mock::MockInstrument;
    use crate::hardware::{
        CollectorItem, InstrumentSession, MeasurementInfo, SpectrumPoint, TuneSettings,
    };
    use crate::parameter::ParameterGateway;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Mock session whose active-configuration lookup waits for `gate`
    struct GatedSession {
        inner: MockInstrument,
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl InstrumentSession for GatedSession {
        async fn get_parameter(&self, name: &str) -> anyhow::Result<f64> {
            self.inner.get_parameter(name).await
        }

        async fn set_parameter(&self, name: &str, value: f64) -> anyhow::Result<()> {
            self.inner.set_parameter(name, value).await
        }

        async fn cup_configurations(&self) -> anyhow::Result<Vec<CupConfiguration>> {
            self.inner.cup_configurations().await
        }

        async fn active_configuration(&self) -> anyhow::Result<(String, String)> {
            self.gate.notified().await;
            self.inner.active_configuration().await
        }

        async fn set_active_configuration(&self, cup_id: &str, sub_cup_id: &str) -> anyhow::Result<()> {
            self.inner.set_active_configuration(cup_id, sub_cup_id).await
        }

        async fn set_hardware_parameters(&self, cup_id: &str, sub_cup_id: &str) -> anyhow::Result<()> {
            self.inner.set_hardware_parameters(cup_id, sub_cup_id).await
        }

        async fn request_cup_configuration_change(&self) -> anyhow::Result<()> {
            self.inner.request_cup_configuration_change().await
        }

        async fn set_collector_active(
            &self,
            cup_id: &str,
            collector_id: &str,
            active: bool,
        ) -> anyhow::Result<()> {
            self.inner.set_collector_active(cup_id, collector_id, active).await
        }

        async fn initialize_scan(&self) -> anyhow::Result<()> {
            self.inner.initialize_scan().await
        }

        async fn measurement_info(&self) -> anyhow::Result<MeasurementInfo> {
            self.inner.measurement_info().await
        }

        async fn start_monitoring(&self, info: MeasurementInfo) -> anyhow::Result<()> {
            self.inner.start_monitoring(info).await
        }

        async fn apply_tune_parameters(&self, settings: &TuneSettings) -> anyhow::Result<()> {
            self.inner.apply_tune_parameters(settings).await
        }

        fn subscribe_spectra(&self, sink: mpsc::Sender<Spectrum>) {
            self.inner.subscribe_spectra(sink);
        }

        fn unsubscribe_spectra(&self) {
            self.inner.unsubscribe_spectra();
        }
    }

    fn cup_with(collector_items: Vec<CollectorItem>) -> CupConfiguration {
        CupConfiguration {
            identifier: "cc-1".into(),
            name: "Argon".into(),
            sub_cup_configurations: Vec::new(),
            collector_items,
        }
    }

    fn argus_cup() -> CupConfiguration {
        cup_with(vec![
            CollectorItem::faraday("CUP 4", Some(40.0)),
            CollectorItem::faraday("CUP 3", Some(39.0)),
            CollectorItem::faraday("CUP 2", Some(38.0)),
            CollectorItem::faraday("CUP 1", Some(37.0)),
            CollectorItem::faraday("CUP 0", Some(35.5)),
            CollectorItem::counter("CDD 0", Some(36.0)),
        ])
    }

    fn full_spectrum() -> Spectrum {
        Spectrum::new(vec![
            vec![SpectrumPoint::new(40.0, 1.5)],
            vec![SpectrumPoint::new(39.0, 2.5)],
            vec![SpectrumPoint::new(36.0, 120.0)],
            vec![SpectrumPoint::new(38.0, 3.5)],
            vec![SpectrumPoint::new(37.0, 4.5)],
            vec![SpectrumPoint::new(35.5, 5.5)],
        ])
    }

    #[test]
    fn tagged_snapshot_reverses_and_appends_ion_counter() {
        let snapshot = build_snapshot(&full_spectrum(), &argus_cup(), &ScanConfig::default());
        assert_eq!(snapshot, "L2,5.5,L1,4.5,AX,3.5,H1,2.5,H2,1.5,CDD,120");
    }

    #[test]
    fn untagged_snapshot() {
        let config = ScanConfig {
            tag_data: false,
            ..ScanConfig::default()
        };
        let snapshot = build_snapshot(&full_spectrum(), &argus_cup(), &config);
        assert_eq!(snapshot, "5.5,4.5,3.5,2.5,1.5,120");
    }

    #[test]
    fn unmatched_points_are_skipped() {
        let spectrum = Spectrum::new(vec![vec![
            SpectrumPoint::new(40.0, 1.0),
            SpectrumPoint::new(12.0, 99.0),
        ]]);
        let snapshot = build_snapshot(&spectrum, &argus_cup(), &ScanConfig::default());
        assert_eq!(snapshot, "H2,1");
    }

    #[test]
    fn unknown_identifier_gets_empty_tag() {
        let cup = cup_with(vec![CollectorItem::faraday("CUP 9", Some(44.0))]);
        let spectrum = Spectrum::new(vec![vec![SpectrumPoint::new(44.0, 0.5)]]);
        let snapshot = build_snapshot(&spectrum, &cup, &ScanConfig::default());
        assert_eq!(snapshot, ",0.5");
    }

    #[test]
    fn last_ion_counter_reading_wins() {
        let spectrum = Spectrum::new(vec![
            vec![SpectrumPoint::new(36.0, 10.0)],
            vec![SpectrumPoint::new(36.0, 11.0)],
        ]);
        let snapshot = build_snapshot(&spectrum, &argus_cup(), &ScanConfig::default());
        assert_eq!(snapshot, "CDD,11");
    }

    #[test]
    fn empty_spectrum_gives_empty_snapshot() {
        let snapshot = build_snapshot(&Spectrum::default(), &argus_cup(), &ScanConfig::default());
        assert_eq!(snapshot, "");
    }

    #[tokio::test]
    async fn aggregator_task_updates_shared_snapshot() {
        let instrument = MockInstrument::argus();
        let cups = Arc::new(CupConfigurationManager::new(
            ParameterGateway::new(Arc::new(instrument.clone())),
            CupsConfig::default(),
        ));
        let snapshot = ScanSnapshot::new();
        let (tx, rx) = mpsc::channel(4);
        instrument.subscribe_spectra(tx);

        let handle = ScanDataAggregator::new(snapshot.clone(), cups, ScanConfig::default()).spawn(rx);

        assert_eq!(snapshot.get().await, "");
        assert!(instrument.emit_spectrum(full_spectrum()));
        instrument.unsubscribe_spectra();
        handle.await.unwrap();

        assert_eq!(
            snapshot.get().await,
            "L2,5.5,L1,4.5,AX,3.5,H1,2.5,H2,1.5,CDD,120"
        );
    }

    #[tokio::test]
    async fn snapshot_stays_readable_while_cup_lookup_is_pending() {
        let gate = Arc::new(Notify::new());
        let session = Arc::new(GatedSession {
            inner: MockInstrument::argus(),
            gate: Arc::clone(&gate),
        });
        let cups = Arc::new(CupConfigurationManager::new(
            ParameterGateway::new(session),
            CupsConfig::default(),
        ));
        let snapshot = ScanSnapshot::new();
        let aggregator = ScanDataAggregator::new(snapshot.clone(), cups, ScanConfig::default());

        let spectrum = Spectrum::new(vec![vec![SpectrumPoint::new(40.0, 1.0)]]);
        let ingest = tokio::spawn(async move { aggregator.ingest(&spectrum).await });
        tokio::task::yield_now().await;

        let current = tokio::time::timeout(Duration::from_secs(1), snapshot.get())
            .await
            .expect("snapshot read blocked by a pending cup lookup");
        assert_eq!(current, "");

        gate.notify_one();
        ingest.await.unwrap().unwrap();
        assert_eq!(snapshot.get().await, "H2,1");
    }
}
