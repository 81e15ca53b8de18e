//! Tune settings: list stored entries and load one into the instrument.

use std::sync::Arc;

use crate::error::{RcsError, RcsResult};
use crate::hardware::{InstrumentSession, TuneSettingsStore};

/// Lists and applies stored tune settings
pub struct TuningManager {
    session: Arc<dyn InstrumentSession>,
    store: Arc<dyn TuneSettingsStore>,
}

impl TuningManager {
    /// Manager over a session and a tune store
    pub fn new(session: Arc<dyn InstrumentSession>, store: Arc<dyn TuneSettingsStore>) -> Self {
        Self { session, store }
    }

    /// Stored tune-setting names, comma-joined
    pub fn list(&self) -> String {
        self.store.entries().join(",")
    }

    /// Load the named tune block into the instrument
    pub async fn apply(&self, name: &str) -> RcsResult<()> {
        let settings = self.store.read_entry(name).ok_or_else(|| {
            tracing::error!("Could not load tune setting '{}'", name);
            RcsError::TuneSettings(format!("could not set tuning settings {name}"))
        })?;

        self.session
            .apply_tune_parameters(&settings)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Tune setting '{}' could not be applied", name);
                RcsError::TuneSettings(format!("could not set tuning settings {name}"))
            })?;

        tracing::info!("Tune setting '{}' successfully loaded", name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::{MockInstrument, MockTuneStore};

    #[tokio::test]
    async fn apply_known_entry_updates_parameters() {
        let instrument = MockInstrument::argus();
        let tuning = TuningManager::new(
            Arc::new(instrument.clone()),
            Arc::new(MockTuneStore::sample()),
        );

        assert_eq!(tuning.list(), "Argon,HighSens");
        tuning.apply("HighSens").await.unwrap();
        assert_eq!(instrument.applied_tunes(), vec!["HighSens".to_string()]);
        assert_eq!(instrument.value("Trap Voltage Set"), Some(200.0));
    }

    #[tokio::test]
    async fn missing_entry_is_error() {
        let instrument = MockInstrument::argus();
        let tuning = TuningManager::new(Arc::new(instrument.clone()), Arc::new(MockTuneStore::new()));
        let err = tuning.apply("Nope").await.unwrap_err();
        assert_eq!(err.reply(), "Error: could not set tuning settings Nope");
        assert!(instrument.applied_tunes().is_empty());
    }
}
