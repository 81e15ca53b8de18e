//! Parameter Gateway - named hardware parameter access
//!
//! Thin layer over [`InstrumentSession`] that every other component builds on.
//! It turns collaborator failures into [`RcsError::HardwareRead`] /
//! [`RcsError::HardwareWrite`] and renders results as protocol reply lines.
//!
//! Parameters carry no schema: any string is a valid lookup and the instrument
//! decides whether the name exists. Each read or write is attempted exactly once.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use rust_rcs::hardware::mock::MockInstrument;
//! use rust_rcs::parameter::ParameterGateway;
//!
//! # tokio_test::block_on(async {
//! let gateway = ParameterGateway::new(Arc::new(MockInstrument::argus()));
//! assert_eq!(gateway.read_reply("Trap Voltage Readback").await, "120.3");
//! assert_eq!(gateway.write_reply("Trap Voltage Set", 130.0).await, "OK");
//! # })
//! ```

use std::sync::Arc;

use crate::error::{RcsError, RcsResult};
use crate::hardware::InstrumentSession;

/// Reply for a successful write.
pub const OK_REPLY: &str = "OK";

/// Render a numeric reply the way the protocol expects (`120.3`, `5`, `-50`).
pub fn format_value(value: f64) -> String {
    value.to_string()
}

/// Named read/write access to instrument parameters
#[derive(Clone)]
pub struct ParameterGateway {
    session: Arc<dyn InstrumentSession>,
}

impl ParameterGateway {
    /// Gateway over one instrument session
    pub fn new(session: Arc<dyn InstrumentSession>) -> Self {
        Self { session }
    }

    /// The underlying instrument session
    pub fn session(&self) -> &Arc<dyn InstrumentSession> {
        &self.session
    }

    /// Read a parameter value
    pub async fn read(&self, name: &str) -> RcsResult<f64> {
        self.session.get_parameter(name).await.map_err(|e| {
            tracing::debug!(parameter = name, error = %e, "Parameter read failed");
            RcsError::HardwareRead(name.to_string())
        })
    }

    /// Write a parameter value
    pub async fn write(&self, name: &str, value: f64) -> RcsResult<()> {
        self.session.set_parameter(name, value).await.map_err(|e| {
            tracing::warn!(parameter = name, value, error = %e, "Parameter write rejected");
            RcsError::HardwareWrite {
                name: name.to_string(),
                value,
            }
        })
    }

    /// Read a parameter and render the reply line
    pub async fn read_reply(&self, name: &str) -> String {
        self.read_scaled_reply(name, 1.0).await
    }

    /// Read a parameter, multiply by `scale`, and render the reply line
    pub async fn read_scaled_reply(&self, name: &str, scale: f64) -> String {
        match self.read(name).await {
            Ok(value) => format_value(value * scale),
            Err(e) => e.reply(),
        }
    }

    /// Write a parameter and render the reply line
    pub async fn write_reply(&self, name: &str, value: f64) -> String {
        match self.write(name, value).await {
            Ok(()) => OK_REPLY.to_string(),
            Err(e) => e.reply(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::MockInstrument;

    fn gateway() -> (ParameterGateway, MockInstrument) {
        let instrument = MockInstrument::argus();
        (ParameterGateway::new(Arc::new(instrument.clone())), instrument)
    }

    #[test]
    fn numeric_formatting() {
        assert_eq!(format_value(120.3), "120.3");
        assert_eq!(format_value(5.0), "5");
        assert_eq!(format_value(-50.0), "-50");
        assert_eq!(format_value(0.25), "0.25");
    }

    #[tokio::test]
    async fn read_reply_formats_value() {
        let (gateway, _) = gateway();
        assert_eq!(gateway.read_reply("Trap Voltage Readback").await, "120.3");
    }

    #[tokio::test]
    async fn scaled_read_reply() {
        let (gateway, _) = gateway();
        assert_eq!(
            gateway.read_scaled_reply("Acceleration Reference Set", 1000.0).await,
            "4500"
        );
    }

    #[tokio::test]
    async fn unknown_read_maps_to_hardware_read_error() {
        let (gateway, _) = gateway();
        let err = gateway.read("Nope").await.unwrap_err();
        assert!(matches!(err, RcsError::HardwareRead(ref n) if n == "Nope"));
        assert_eq!(gateway.read_reply("Nope").await, "Error: Invalid Command");
    }

    #[tokio::test]
    async fn write_reply_ok_and_error() {
        let (gateway, instrument) = gateway();
        assert_eq!(gateway.write_reply("Z-Focus Set", 61.5).await, "OK");
        assert_eq!(instrument.value("Z-Focus Set"), Some(61.5));

        instrument.reject_writes_to("Z-Focus Set");
        assert_eq!(
            gateway.write_reply("Z-Focus Set", 70.0).await,
            "Error: could not set Z-Focus Set to 70"
        );
        assert_eq!(instrument.writes_to("Z-Focus Set"), vec![61.5, 70.0]);
    }
}
