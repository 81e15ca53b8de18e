//! Server context
//!
//! One value owning everything a request handler needs: configuration, the
//! instrument session, the hardware-coordination components and the mutable
//! protocol state (blank state, scan snapshot). It is created once at startup
//! and passed by reference into the dispatcher.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::beam_blank::BeamBlankController;
use crate::config::ServerConfig;
use crate::cup_config::CupConfigurationManager;
use crate::hardware::{InstrumentSession, TuneSettingsStore};
use crate::magnet::MagnetStepper;
use crate::parameter::ParameterGateway;
use crate::scan::{ScanDataAggregator, ScanSnapshot};
use crate::tuning::TuningManager;

/// Shared state and components behind every request
pub struct ServerContext {
    config: ServerConfig,
    session: Arc<dyn InstrumentSession>,
    gateway: ParameterGateway,
    magnet: MagnetStepper,
    beam_blank: BeamBlankController,
    cups: Arc<CupConfigurationManager>,
    tuning: TuningManager,
    snapshot: ScanSnapshot,
}

impl ServerContext {
    /// Wire every component to one instrument session and tune store
    pub fn new(
        config: ServerConfig,
        session: Arc<dyn InstrumentSession>,
        tune_store: Arc<dyn TuneSettingsStore>,
    ) -> Self {
        let gateway = ParameterGateway::new(Arc::clone(&session));
        let magnet = MagnetStepper::new(
            gateway.clone(),
            config.hardware.magnet_dac.clone(),
            config.magnet.clone(),
        );
        let beam_blank = BeamBlankController::new(
            gateway.clone(),
            config.hardware.y_symmetry.clone(),
            config.beam_blank.clone(),
        );
        let cups = Arc::new(CupConfigurationManager::new(gateway.clone(), config.cups.clone()));
        let tuning = TuningManager::new(Arc::clone(&session), tune_store);

        Self {
            config,
            session,
            gateway,
            magnet,
            beam_blank,
            cups,
            tuning,
            snapshot: ScanSnapshot::new(),
        }
    }

    /// Put the instrument into script-scan mode and seed the blank controller.
    /// Failures are logged; the server still starts.
    pub async fn prepare(&self) {
        if let Err(e) = self.session.initialize_scan().await {
            tracing::warn!(error = %e, "Could not initialize script scan");
        }
        self.beam_blank.prime().await;
    }

    /// Subscribe to spectrum delivery and run the aggregator on its own task
    pub fn start_scan_aggregator(&self) -> JoinHandle<()> {
        let (tx, rx) = mpsc::channel(self.config.scan.channel_capacity);
        self.session.subscribe_spectra(tx);
        ScanDataAggregator::new(
            self.snapshot.clone(),
            Arc::clone(&self.cups),
            self.config.scan.clone(),
        )
        .spawn(rx)
    }

    /// Detach from spectrum delivery; the aggregator task ends once the
    /// channel drains
    pub fn shutdown(&self) {
        tracing::info!("Stop Server");
        self.session.unsubscribe_spectra();
    }

    /// Detach from spectrum delivery and wait for the aggregator task.
    /// A panicked or cancelled task is logged.
    pub async fn stop_scan_aggregator(&self, handle: JoinHandle<()>) {
        self.shutdown();
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Scan aggregator task failed");
        }
    }

    /// Loaded server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The instrument session
    pub fn session(&self) -> &Arc<dyn InstrumentSession> {
        &self.session
    }

    /// Named parameter access
    pub fn gateway(&self) -> &ParameterGateway {
        &self.gateway
    }

    /// Magnet DAC stepper
    pub fn magnet(&self) -> &MagnetStepper {
        &self.magnet
    }

    /// Beam blanking controller
    pub fn beam_blank(&self) -> &BeamBlankController {
        &self.beam_blank
    }

    /// Cup configuration manager
    pub fn cups(&self) -> &CupConfigurationManager {
        &self.cups
    }

    /// Tune settings
    pub fn tuning(&self) -> &TuningManager {
        &self.tuning
    }

    /// Latest `GetData` snapshot
    pub fn snapshot(&self) -> &ScanSnapshot {
        &self.snapshot
    }
}
