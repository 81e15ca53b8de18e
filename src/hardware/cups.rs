//! Cup configuration data model.
//!
//! A cup configuration assigns detector channels (collectors) to masses. Each
//! cup configuration holds several sub-cup configurations (deflection presets).
//! Exactly one cup / sub-cup pair is active on the instrument at a time.

/// Kind of detector behind a collector item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorType {
    /// Faraday cup, analog current measurement
    Faraday,
    /// Ion counter (CDD) channel
    CounterCup,
}

/// One detector channel of a cup configuration
#[derive(Debug, Clone, PartialEq)]
pub struct CollectorItem {
    /// Instrument identifier, e.g. `CUP 4` or `CDD 0`
    pub identifier: String,
    /// Assigned mass. `None` means the collector is not wired to a channel.
    pub mass: Option<f64>,
    /// Faraday cup or ion counter
    pub collector_type: CollectorType,
    /// Whether the collector takes part in acquisition
    pub active: bool,
}

impl CollectorItem {
    /// Create a Faraday collector
    pub fn faraday(identifier: impl Into<String>, mass: Option<f64>) -> Self {
        Self {
            identifier: identifier.into(),
            mass,
            collector_type: CollectorType::Faraday,
            active: true,
        }
    }

    /// Create an ion-counter collector, initially inactive
    pub fn counter(identifier: impl Into<String>, mass: Option<f64>) -> Self {
        Self {
            identifier: identifier.into(),
            mass,
            collector_type: CollectorType::CounterCup,
            active: false,
        }
    }

    /// True for counter cups that have a mass assigned
    pub fn is_connected_counter(&self) -> bool {
        self.collector_type == CollectorType::CounterCup && self.mass.is_some()
    }
}

/// Deflection preset within a cup configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SubCupConfiguration {
    /// Instrument identifier
    pub identifier: String,
    /// Display name used by the protocol
    pub name: String,
}

impl SubCupConfiguration {
    /// Create a sub-cup configuration
    pub fn new(identifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
        }
    }
}

/// Named set of collectors and sub-cup presets
#[derive(Debug, Clone, PartialEq)]
pub struct CupConfiguration {
    /// Instrument identifier
    pub identifier: String,
    /// Display name used by the protocol
    pub name: String,
    /// Sub-cup presets, in instrument order
    pub sub_cup_configurations: Vec<SubCupConfiguration>,
    /// Detector channels
    pub collector_items: Vec<CollectorItem>,
}

impl CupConfiguration {
    /// Find a sub-cup configuration by exact name
    pub fn find_sub_cup(&self, name: &str) -> Option<&SubCupConfiguration> {
        self.sub_cup_configurations.iter().find(|s| s.name == name)
    }

    /// First collector whose assigned mass equals `mass`
    pub fn collector_at_mass(&self, mass: f64) -> Option<&CollectorItem> {
        self.collector_items.iter().find(|c| c.mass == Some(mass))
    }
}
