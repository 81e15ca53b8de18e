//! Tuning-setting store contract.

use std::collections::BTreeMap;

/// Stored block of tune parameter values
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TuneSettings {
    /// Store entry name
    pub name: String,
    /// Parameter values keyed by parameter name
    pub parameters: BTreeMap<String, f64>,
}

impl TuneSettings {
    /// Empty block
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: BTreeMap::new(),
        }
    }

    /// Add a parameter value (builder style)
    pub fn with_parameter(mut self, name: impl Into<String>, value: f64) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }
}

/// Persisted tune settings, keyed by name.
pub trait TuneSettingsStore: Send + Sync {
    /// Names of all stored entries
    fn entries(&self) -> Vec<String>;

    /// Load one entry. `None` when missing or not a tune block.
    fn read_entry(&self, name: &str) -> Option<TuneSettings>;
}
