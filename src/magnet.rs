//! Magnet Stepper
//!
//! Large jumps of the analyzer magnet DAC can overshoot or stress the magnet
//! supply, so moves larger than the configured threshold are split into a fixed
//! number of equal steps.
//!
//! # Algorithm
//!
//! ```text
//! current = read(Field Set)
//! |target - current| <= threshold  ->  write(target)
//! otherwise                         ->  for i in 1..=steps: write(current + sign * i * step)
//!                                       where step = |target - current| / steps
//! ```
//!
//! Stepping is best-effort: a rejected intermediate write is logged and the
//! remaining steps are still issued. The reply is the outcome of the last write.

use std::time::Duration;

use crate::config::MagnetConfig;
use crate::parameter::{ParameterGateway, OK_REPLY};

/// Planned sequence of DAC writes for one `SetMagnetDAC` call
#[derive(Debug, Clone, PartialEq)]
pub struct MagnetMove {
    /// DAC value before the move
    pub start: f64,
    /// Requested DAC value
    pub target: f64,
    /// 1 for a direct write
    pub step_count: u32,
    /// Pause between consecutive steps
    pub step_delay: Duration,
}

impl MagnetMove {
    /// Plan a move from `start` to `target`
    pub fn plan(start: f64, target: f64, config: &MagnetConfig) -> Self {
        let deviation = (target - start).abs();
        let step_count = if deviation > config.move_threshold {
            config.steps.max(1)
        } else {
            1
        };
        Self {
            start,
            target,
            step_count,
            step_delay: Duration::from_millis(config.step_time_ms),
        }
    }

    /// True when the move is split into steps
    pub fn is_stepped(&self) -> bool {
        self.step_count > 1
    }

    /// DAC values to write, in order. The last value equals `target` up to
    /// floating-point rounding.
    pub fn setpoints(&self) -> Vec<f64> {
        if !self.is_stepped() {
            return vec![self.target];
        }
        let sign = if self.target > self.start { 1.0 } else { -1.0 };
        let step = (self.target - self.start).abs() / f64::from(self.step_count);
        (1..=self.step_count)
            .map(|i| self.start + sign * f64::from(i) * step)
            .collect()
    }
}

/// Executes magnet moves through the parameter gateway
#[derive(Clone)]
pub struct MagnetStepper {
    gateway: ParameterGateway,
    parameter: String,
    config: MagnetConfig,
}

impl MagnetStepper {
    /// Stepper driving the `parameter` DAC
    pub fn new(gateway: ParameterGateway, parameter: impl Into<String>, config: MagnetConfig) -> Self {
        Self {
            gateway,
            parameter: parameter.into(),
            config,
        }
    }

    /// Move the magnet DAC to `target` and return the reply of the last write
    pub async fn set_dac(&self, target: f64) -> String {
        let current = match self.gateway.read(&self.parameter).await {
            Ok(value) => value,
            Err(e) => return e.reply(),
        };

        let plan = MagnetMove::plan(current, target, &self.config);
        if plan.is_stepped() {
            tracing::info!(
                from = current,
                to = target,
                steps = plan.step_count,
                "Stepping magnet DAC"
            );
        } else {
            tracing::debug!(from = current, to = target, "Direct magnet DAC write");
        }

        let setpoints = plan.setpoints();
        let last = setpoints.len();
        let mut reply = OK_REPLY.to_string();
        for (i, value) in setpoints.into_iter().enumerate() {
            reply = self.gateway.write_reply(&self.parameter, value).await;
            if reply != OK_REPLY {
                tracing::warn!(step = i + 1, of = last, value, "Magnet step failed, continuing");
            }
            if i + 1 < last && !plan.step_delay.is_zero() {
                tokio::time::sleep(plan.step_delay).await;
            }
        }
        reply
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::MockInstrument;
    use std::sync::Arc;
    use tracing_test::traced_test;

    fn stepper(instrument: &MockInstrument, config: MagnetConfig) -> MagnetStepper {
        MagnetStepper::new(
            ParameterGateway::new(Arc::new(instrument.clone())),
            "Field Set",
            config,
        )
    }

    #[test]
    fn small_move_is_single_write() {
        let plan = MagnetMove::plan(4.5, 4.7, &MagnetConfig::default());
        assert!(!plan.is_stepped());
        assert_eq!(plan.setpoints(), vec![4.7]);
    }

    #[test]
    fn threshold_is_inclusive() {
        let plan = MagnetMove::plan(4.5, 4.75, &MagnetConfig::default());
        assert!(!plan.is_stepped());
    }

    #[test]
    fn downward_steps_are_monotonic() {
        let plan = MagnetMove::plan(8.0, 2.0, &MagnetConfig::default());
        let points = plan.setpoints();
        assert_eq!(points.len(), 20);
        assert!(points.windows(2).all(|w| w[1] < w[0]));
        assert!(points[0] < 8.0);
        assert!((points[19] - 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn large_move_writes_every_step() {
        // current 4.5, threshold 0.25, 20 steps
        let instrument = MockInstrument::argus();
        let reply = stepper(&instrument, MagnetConfig::default()).set_dac(5.0).await;

        assert_eq!(reply, "OK");
        let writes = instrument.writes_to("Field Set");
        assert_eq!(writes.len(), 20);
        assert!(writes.windows(2).all(|w| w[1] > w[0]));
        assert!(writes[0] > 4.5);
        assert!((writes[19] - 5.0).abs() < 1e-9);
    }

    #[tokio::test]
    #[traced_test]
    async fn failed_intermediate_step_does_not_abort() {
        let instrument = MockInstrument::argus();
        instrument.reject_write_number(3);
        let reply = stepper(&instrument, MagnetConfig::default()).set_dac(6.0).await;

        assert_eq!(instrument.writes_to("Field Set").len(), 20);
        assert_eq!(reply, "OK");
        assert!(logs_contain("Magnet step failed, continuing"));
    }

    #[tokio::test]
    async fn failed_last_step_is_the_reply() {
        let instrument = MockInstrument::argus();
        instrument.reject_write_number(20);
        let reply = stepper(&instrument, MagnetConfig::default()).set_dac(6.5).await;

        assert!(reply.starts_with("Error: could not set Field Set to "));
    }

    #[tokio::test]
    async fn unreadable_dac_writes_nothing() {
        let instrument = MockInstrument::new();
        let reply = stepper(&instrument, MagnetConfig::default()).set_dac(5.0).await;
        assert_eq!(reply, "Error: Invalid Command");
        assert!(instrument.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn step_delay_applies_between_writes() {
        let instrument = MockInstrument::argus();
        let config = MagnetConfig {
            steps: 4,
            step_time_ms: 100,
            ..MagnetConfig::default()
        };
        let start = tokio::time::Instant::now();
        stepper(&instrument, config).set_dac(9.0).await;
        assert_eq!(instrument.writes_to("Field Set").len(), 4);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(300) && elapsed < Duration::from_millis(400));
    }
}
