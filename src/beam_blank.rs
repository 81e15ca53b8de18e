//! Beam Blank Controller
//!
//! Blanks the ion beam by driving the Y-Symmetry steering voltage far off axis
//! and restores it afterwards.
//!
//! ```text
//!              BlankBeam true
//!   Unblanked ----------------> Blanked
//!      ^   capture Y, write -50    |
//!      |                           |
//!      +---------------------------+
//!        BlankBeam false: write captured Y
//! ```
//!
//! Requests that do not change state answer `OK` without touching hardware.
//! The captured value is taken once per Unblanked → Blanked transition and is
//! never overwritten while blanked. A rejected write leaves the state unchanged.

use tokio::sync::Mutex;

use crate::config::BeamBlankConfig;
use crate::parameter::{ParameterGateway, OK_REPLY};

/// Blanking state owned by the server context
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlankState {
    /// Whether the beam is currently deflected away
    pub is_blanked: bool,
    /// Y-Symmetry value to restore on unblank
    pub last_unblanked_y_symmetry: f64,
}

impl Default for BlankState {
    fn default() -> Self {
        Self {
            is_blanked: false,
            last_unblanked_y_symmetry: 0.0,
        }
    }
}

/// Two-state blank/unblank controller
pub struct BeamBlankController {
    gateway: ParameterGateway,
    parameter: String,
    config: BeamBlankConfig,
    state: Mutex<BlankState>,
}

impl BeamBlankController {
    /// Controller writing blank values to the `parameter` deflector
    pub fn new(gateway: ParameterGateway, parameter: impl Into<String>, config: BeamBlankConfig) -> Self {
        Self {
            gateway,
            parameter: parameter.into(),
            config,
            state: Mutex::new(BlankState::default()),
        }
    }

    /// True when blanking requests act on hardware
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Seed the restore value with the current Y-Symmetry reading
    pub async fn prime(&self) {
        match self.gateway.read(&self.parameter).await {
            Ok(value) => self.state.lock().await.last_unblanked_y_symmetry = value,
            Err(e) => tracing::warn!(error = %e, "Could not read initial Y-Symmetry"),
        }
    }

    /// Current state
    pub async fn state(&self) -> BlankState {
        *self.state.lock().await
    }

    /// Blank (`true`) or unblank (`false`) the beam and return the reply line
    pub async fn set_blanked(&self, blank: bool) -> String {
        if !self.config.enabled {
            return OK_REPLY.to_string();
        }

        let mut state = self.state.lock().await;
        match (blank, state.is_blanked) {
            (true, false) => {
                let current = match self.gateway.read(&self.parameter).await {
                    Ok(value) => value,
                    Err(e) => return e.reply(),
                };
                if let Err(e) = self.gateway.write(&self.parameter, self.config.blank_value).await {
                    return e.reply();
                }
                state.last_unblanked_y_symmetry = current;
                state.is_blanked = true;
                tracing::info!(restore = current, "Beam blanked");
                OK_REPLY.to_string()
            }
            (false, true) => {
                let restore = state.last_unblanked_y_symmetry;
                if let Err(e) = self.gateway.write(&self.parameter, restore).await {
                    return e.reply();
                }
                state.is_blanked = false;
                tracing::info!(restore, "Beam unblanked");
                OK_REPLY.to_string()
            }
            _ => OK_REPLY.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::MockInstrument;
    use std::sync::Arc;

    const Y: &str = "Y-Symmetry Set";

    fn controller(instrument: &MockInstrument, enabled: bool) -> BeamBlankController {
        BeamBlankController::new(
            ParameterGateway::new(Arc::new(instrument.clone())),
            Y,
            BeamBlankConfig {
                enabled,
                ..BeamBlankConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn disabled_controller_never_touches_hardware() {
        let instrument = MockInstrument::argus();
        let blank = controller(&instrument, false);
        assert_eq!(blank.set_blanked(true).await, "OK");
        assert_eq!(blank.set_blanked(false).await, "OK");
        assert!(instrument.writes().is_empty());
        assert!(!blank.state().await.is_blanked);
    }

    #[tokio::test]
    async fn blank_twice_writes_once() {
        let instrument = MockInstrument::argus();
        let blank = controller(&instrument, true);
        assert_eq!(blank.set_blanked(true).await, "OK");
        assert_eq!(blank.set_blanked(true).await, "OK");
        assert_eq!(instrument.writes_to(Y), vec![-50.0]);
    }

    #[tokio::test]
    async fn unblank_restores_exact_value() {
        let instrument = MockInstrument::argus().with_parameter(Y, 12.345678901234567);
        let blank = controller(&instrument, true);
        blank.set_blanked(true).await;
        assert_eq!(instrument.value(Y), Some(-50.0));
        assert_eq!(blank.set_blanked(false).await, "OK");
        assert_eq!(
            instrument.value(Y).map(f64::to_bits),
            Some(12.345678901234567_f64.to_bits())
        );
    }

    #[tokio::test]
    async fn unblank_when_unblanked_is_noop() {
        let instrument = MockInstrument::argus();
        let blank = controller(&instrument, true);
        assert_eq!(blank.set_blanked(false).await, "OK");
        assert!(instrument.writes().is_empty());
    }

    #[tokio::test]
    async fn capture_not_overwritten_while_blanked() {
        let instrument = MockInstrument::argus();
        let blank = controller(&instrument, true);
        blank.set_blanked(true).await;
        blank.set_blanked(true).await;
        assert_eq!(blank.state().await.last_unblanked_y_symmetry, 12.5);
    }

    #[tokio::test]
    async fn rejected_blank_write_keeps_state() {
        let instrument = MockInstrument::argus();
        instrument.reject_writes_to(Y);
        let blank = controller(&instrument, true);
        assert_eq!(
            blank.set_blanked(true).await,
            "Error: could not set Y-Symmetry Set to -50"
        );
        assert!(!blank.state().await.is_blanked);
    }

    #[tokio::test]
    async fn prime_reads_current_value() {
        let instrument = MockInstrument::argus();
        let blank = controller(&instrument, true);
        blank.prime().await;
        assert_eq!(blank.state().await.last_unblanked_y_symmetry, 12.5);
    }
}
