//! Command Dispatcher
//!
//! Parses one request line, `Verb[ Argument]`, and routes it to the component
//! that services it. Every request produces exactly one reply line without a
//! terminator.
//!
//! Verbs are matched exactly and case-sensitively. Anything unknown, and any
//! missing or unparsable argument, answers [`INVALID_COMMAND_REPLY`]; a bad
//! request never affects the next one.
//!
//! ```text
//! "SetTrapVoltage 120.5"   ->  Verb::SetTrapVoltage, "120.5"   ->  "OK"
//! "GetTrapVoltage"         ->  Verb::GetTrapVoltage, ""        ->  "120.3"
//! "FooBar 1"               ->  (no verb)                       ->  "Error: Invalid Command"
//! ```

use std::sync::Arc;

use crate::context::ServerContext;
use crate::error::{RcsError, RcsResult, INVALID_COMMAND_REPLY};
use crate::hardware::ScanType;
use crate::parameter::{format_value, OK_REPLY};

const ACCELERATION_REFERENCE: &str = "Acceleration Reference Set";
const TRAP_VOLTAGE_READBACK: &str = "Trap Voltage Readback";
const TRAP_VOLTAGE_SET: &str = "Trap Voltage Set";
const ELECTRON_ENERGY_READBACK: &str = "Electron Energy Readback";
const ELECTRON_ENERGY_SET: &str = "Electron Energy Set";
const ION_REPELLER: &str = "Ion Repeller Set";
const Z_SYMMETRY: &str = "Z-Symmetry Set";
const Z_FOCUS: &str = "Z-Focus Set";
const EXTRACTION_LENS: &str = "Extraction Lens Set";
const ION_COUNTER_SUPPLY: &str = "CDD Supply Set";

const VALVE_OPEN: f64 = 1.0;
const VALVE_CLOSED: f64 = 0.0;

/// Every verb the server understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    /// Names of the stored tune files, one per line
    GetTuningSettingsList,
    /// Apply a stored tune file by name
    SetTuningSettings,
    /// Latest scan snapshot
    GetData,
    /// Restart scanning with a new integration time in seconds
    SetIntegrationTime,
    /// Blank (`true`) or unblank (`false`) the beam
    BlankBeam,
    /// Names of every cup configuration
    GetCupConfigurationList,
    /// Sub-cup names of a named cup configuration
    GetSubCupConfigurationList,
    /// Name of the active cup configuration
    GetActiveCupConfiguration,
    /// Name of the active sub-cup configuration
    GetActiveSubCupConfiguration,
    /// Configured sub-cup parameters as `name,value` pairs
    GetSubCupParameters,
    /// Activate a sub-cup of the default cup configuration
    SetSubCupConfiguration,
    /// Switch the ion-counter collectors on
    ActivateIonCounter,
    /// Switch the ion-counter collectors off
    DeactivateIonCounter,
    /// Open the ion pump valve
    Open,
    /// Close the ion pump valve
    Close,
    /// `True` when the ion pump valve is open
    GetValveState,
    /// Magnet field set value
    GetMagnetDAC,
    /// Step the magnet to a new field value
    SetMagnetDAC,
    /// Acceleration voltage in volts
    GetHighVoltage,
    /// Set the acceleration voltage in volts
    SetHighVoltage,
    /// Acceleration voltage in kilovolts
    GetHV,
    /// Set the acceleration voltage in volts, stored as kilovolts
    SetHV,
    /// Trap voltage readback
    GetTrapVoltage,
    /// Write the trap voltage set value
    SetTrapVoltage,
    /// Electron energy readback
    GetElectronEnergy,
    /// Write the electron energy set value
    SetElectronEnergy,
    /// Read the ion repeller set value
    GetIonRepeller,
    /// Write the ion repeller set value
    SetIonRepeller,
    /// Read the y symmetry set value
    GetYSymmetry,
    /// Write the y symmetry set value
    SetYSymmetry,
    /// Read the z symmetry set value
    GetZSymmetry,
    /// Write the z symmetry set value
    SetZSymmetry,
    /// Read the z focus set value
    GetZFocus,
    /// Write the z focus set value
    SetZFocus,
    /// Read the extraction lens set value
    GetExtractionLens,
    /// Write the extraction lens set value
    SetExtractionLens,
    /// Deflection of one detector
    GetDeflection,
    /// Write the deflection of one detector from `detector,value`
    SetDeflection,
    /// Ion-counter supply voltage
    GetIonCounterVoltage,
    /// Write the ion counter voltage set value
    SetIonCounterVoltage,
    /// Any instrument parameter by name
    GetParameter,
    /// Write any instrument parameter from `name,value`
    SetParameter,
}

impl Verb {
    /// Every verb, in protocol table order
    pub const ALL: [Verb; 42] = [
        Verb::GetTuningSettingsList,
        Verb::SetTuningSettings,
        Verb::GetData,
        Verb::SetIntegrationTime,
        Verb::BlankBeam,
        Verb::GetCupConfigurationList,
        Verb::GetSubCupConfigurationList,
        Verb::GetActiveCupConfiguration,
        Verb::GetActiveSubCupConfiguration,
        Verb::GetSubCupParameters,
        Verb::SetSubCupConfiguration,
        Verb::ActivateIonCounter,
        Verb::DeactivateIonCounter,
        Verb::Open,
        Verb::Close,
        Verb::GetValveState,
        Verb::GetMagnetDAC,
        Verb::SetMagnetDAC,
        Verb::GetHighVoltage,
        Verb::SetHighVoltage,
        Verb::GetHV,
        Verb::SetHV,
        Verb::GetTrapVoltage,
        Verb::SetTrapVoltage,
        Verb::GetElectronEnergy,
        Verb::SetElectronEnergy,
        Verb::GetIonRepeller,
        Verb::SetIonRepeller,
        Verb::GetYSymmetry,
        Verb::SetYSymmetry,
        Verb::GetZSymmetry,
        Verb::SetZSymmetry,
        Verb::GetZFocus,
        Verb::SetZFocus,
        Verb::GetExtractionLens,
        Verb::SetExtractionLens,
        Verb::GetDeflection,
        Verb::SetDeflection,
        Verb::GetIonCounterVoltage,
        Verb::SetIonCounterVoltage,
        Verb::GetParameter,
        Verb::SetParameter,
    ];

    /// Look up a verb by its exact protocol spelling
    pub fn from_name(name: &str) -> Option<Self> {
        let verb = match name {
            "GetTuningSettingsList" => Verb::GetTuningSettingsList,
            "SetTuningSettings" => Verb::SetTuningSettings,
            "GetData" => Verb::GetData,
            "SetIntegrationTime" => Verb::SetIntegrationTime,
            "BlankBeam" => Verb::BlankBeam,
            "GetCupConfigurationList" => Verb::GetCupConfigurationList,
            "GetSubCupConfigurationList" => Verb::GetSubCupConfigurationList,
            "GetActiveCupConfiguration" => Verb::GetActiveCupConfiguration,
            "GetActiveSubCupConfiguration" => Verb::GetActiveSubCupConfiguration,
            "GetSubCupParameters" => Verb::GetSubCupParameters,
            "SetSubCupConfiguration" => Verb::SetSubCupConfiguration,
            "ActivateIonCounter" => Verb::ActivateIonCounter,
            "DeactivateIonCounter" => Verb::DeactivateIonCounter,
            "Open" => Verb::Open,
            "Close" => Verb::Close,
            "GetValveState" => Verb::GetValveState,
            "GetMagnetDAC" => Verb::GetMagnetDAC,
            "SetMagnetDAC" => Verb::SetMagnetDAC,
            "GetHighVoltage" => Verb::GetHighVoltage,
            "SetHighVoltage" => Verb::SetHighVoltage,
            "GetHV" => Verb::GetHV,
            "SetHV" => Verb::SetHV,
            "GetTrapVoltage" => Verb::GetTrapVoltage,
            "SetTrapVoltage" => Verb::SetTrapVoltage,
            "GetElectronEnergy" => Verb::GetElectronEnergy,
            "SetElectronEnergy" => Verb::SetElectronEnergy,
            "GetIonRepeller" => Verb::GetIonRepeller,
            "SetIonRepeller" => Verb::SetIonRepeller,
            "GetYSymmetry" => Verb::GetYSymmetry,
            "SetYSymmetry" => Verb::SetYSymmetry,
            "GetZSymmetry" => Verb::GetZSymmetry,
            "SetZSymmetry" => Verb::SetZSymmetry,
            "GetZFocus" => Verb::GetZFocus,
            "SetZFocus" => Verb::SetZFocus,
            "GetExtractionLens" => Verb::GetExtractionLens,
            "SetExtractionLens" => Verb::SetExtractionLens,
            "GetDeflection" => Verb::GetDeflection,
            "SetDeflection" => Verb::SetDeflection,
            "GetIonCounterVoltage" => Verb::GetIonCounterVoltage,
            "SetIonCounterVoltage" => Verb::SetIonCounterVoltage,
            "GetParameter" => Verb::GetParameter,
            "SetParameter" => Verb::SetParameter,
            _ => return None,
        };
        Some(verb)
    }

    /// Protocol spelling of the verb
    pub fn name(self) -> &'static str {
        match self {
            Verb::GetTuningSettingsList => "GetTuningSettingsList",
            Verb::SetTuningSettings => "SetTuningSettings",
            Verb::GetData => "GetData",
            Verb::SetIntegrationTime => "SetIntegrationTime",
            Verb::BlankBeam => "BlankBeam",
            Verb::GetCupConfigurationList => "GetCupConfigurationList",
            Verb::GetSubCupConfigurationList => "GetSubCupConfigurationList",
            Verb::GetActiveCupConfiguration => "GetActiveCupConfiguration",
            Verb::GetActiveSubCupConfiguration => "GetActiveSubCupConfiguration",
            Verb::GetSubCupParameters => "GetSubCupParameters",
            Verb::SetSubCupConfiguration => "SetSubCupConfiguration",
            Verb::ActivateIonCounter => "ActivateIonCounter",
            Verb::DeactivateIonCounter => "DeactivateIonCounter",
            Verb::Open => "Open",
            Verb::Close => "Close",
            Verb::GetValveState => "GetValveState",
            Verb::GetMagnetDAC => "GetMagnetDAC",
            Verb::SetMagnetDAC => "SetMagnetDAC",
            Verb::GetHighVoltage => "GetHighVoltage",
            Verb::SetHighVoltage => "SetHighVoltage",
            Verb::GetHV => "GetHV",
            Verb::SetHV => "SetHV",
            Verb::GetTrapVoltage => "GetTrapVoltage",
            Verb::SetTrapVoltage => "SetTrapVoltage",
            Verb::GetElectronEnergy => "GetElectronEnergy",
            Verb::SetElectronEnergy => "SetElectronEnergy",
            Verb::GetIonRepeller => "GetIonRepeller",
            Verb::SetIonRepeller => "SetIonRepeller",
            Verb::GetYSymmetry => "GetYSymmetry",
            Verb::SetYSymmetry => "SetYSymmetry",
            Verb::GetZSymmetry => "GetZSymmetry",
            Verb::SetZSymmetry => "SetZSymmetry",
            Verb::GetZFocus => "GetZFocus",
            Verb::SetZFocus => "SetZFocus",
            Verb::GetExtractionLens => "GetExtractionLens",
            Verb::SetExtractionLens => "SetExtractionLens",
            Verb::GetDeflection => "GetDeflection",
            Verb::SetDeflection => "SetDeflection",
            Verb::GetIonCounterVoltage => "GetIonCounterVoltage",
            Verb::SetIonCounterVoltage => "SetIonCounterVoltage",
            Verb::GetParameter => "GetParameter",
            Verb::SetParameter => "SetParameter",
        }
    }
}

/// One parsed request line
#[derive(Debug, Clone, PartialEq)]
pub struct Command<'a> {
    /// The matched verb
    pub verb: Verb,
    /// Everything after the first space, trimmed; empty when absent
    pub argument: &'a str,
}

impl<'a> Command<'a> {
    /// Split a request line into verb and argument
    pub fn parse(line: &'a str) -> RcsResult<Self> {
        let line = line.trim();
        let (verb, argument) = match line.split_once(' ') {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };
        let verb = Verb::from_name(verb).ok_or_else(|| RcsError::InvalidCommand(verb.to_string()))?;
        Ok(Self { verb, argument })
    }

    /// The argument, or `MissingArgument` when there is none
    pub fn require_argument(&self) -> RcsResult<&'a str> {
        if self.argument.is_empty() {
            Err(RcsError::MissingArgument(self.verb.name()))
        } else {
            Ok(self.argument)
        }
    }

    /// The argument parsed as a finite number
    pub fn number(&self) -> RcsResult<f64> {
        parse_number(self.require_argument()?)
    }

    /// A `name,value` argument. Fields after the value are ignored.
    pub fn name_value(&self) -> RcsResult<(&'a str, f64)> {
        let argument = self.require_argument()?;
        let mut fields = argument.split(',');
        let name = fields.next().unwrap_or_default().trim();
        let value = fields.next().ok_or(RcsError::MissingArgument(self.verb.name()))?;
        if name.is_empty() {
            return Err(RcsError::MissingArgument(self.verb.name()));
        }
        Ok((name, parse_number(value)?))
    }
}

fn parse_number(text: &str) -> RcsResult<f64> {
    let text = text.trim();
    match text.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(RcsError::InvalidNumber(text.to_string())),
    }
}

/// Routes request lines to the server components
#[derive(Clone)]
pub struct CommandDispatcher {
    context: Arc<ServerContext>,
}

impl CommandDispatcher {
    /// Dispatcher over a shared server context
    pub fn new(context: Arc<ServerContext>) -> Self {
        Self { context }
    }

    /// The context every handler runs against
    pub fn context(&self) -> &Arc<ServerContext> {
        &self.context
    }

    /// Execute one request line and return the reply line
    pub async fn execute(&self, line: &str) -> String {
        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(e) => {
                tracing::debug!(request = line.trim(), error = %e, "Rejected request");
                return e.reply();
            }
        };
        tracing::debug!(verb = command.verb.name(), argument = command.argument, "Executing");

        match self.handle(&command).await {
            Ok(reply) => reply,
            Err(e) => {
                if e.is_protocol() {
                    tracing::debug!(error = %e, "Malformed request");
                }
                e.reply()
            }
        }
    }

    async fn handle(&self, command: &Command<'_>) -> RcsResult<String> {
        let ctx = &*self.context;
        let gateway = ctx.gateway();
        let hardware = &ctx.config().hardware;

        let reply = match command.verb {
            Verb::GetTuningSettingsList => ctx.tuning().list(),
            Verb::SetTuningSettings => {
                ctx.tuning().apply(command.require_argument()?).await?;
                OK_REPLY.to_string()
            }
            Verb::GetData => ctx.snapshot().get().await,
            Verb::SetIntegrationTime => self.set_integration_time(command.number()?).await?,
            Verb::BlankBeam => {
                if !ctx.beam_blank().is_enabled() {
                    return Ok(OK_REPLY.to_string());
                }
                let blank = command.require_argument()? == "true";
                ctx.beam_blank().set_blanked(blank).await
            }

            Verb::GetCupConfigurationList => ctx.cups().cup_configuration_names().await?.join("\r"),
            Verb::GetSubCupConfigurationList => ctx
                .cups()
                .sub_cup_configuration_names(command.require_argument()?)
                .await?
                .join("\r"),
            Verb::GetActiveCupConfiguration => ctx.cups().active_cup_name().await?,
            Verb::GetActiveSubCupConfiguration => ctx.cups().active_sub_cup_name().await?,
            Verb::GetSubCupParameters => ctx.cups().sub_cup_parameters().await,
            Verb::SetSubCupConfiguration => {
                let name = command.require_argument()?;
                match ctx.cups().activate_sub_cup(name).await {
                    Ok(()) => OK_REPLY.to_string(),
                    Err(e) => {
                        tracing::error!(sub_cup = name, error = %e, "Could not set sub cup");
                        format!("Error: could not set sub cup to {name}")
                    }
                }
            }

            Verb::ActivateIonCounter | Verb::DeactivateIonCounter => {
                let active = command.verb == Verb::ActivateIonCounter;
                if let Err(e) = ctx.cups().set_ion_counter_state(active).await {
                    tracing::warn!(error = %e, "Ion counter state unchanged");
                }
                OK_REPLY.to_string()
            }

            Verb::Open => gateway.write_reply(&hardware.ion_pump_valve, VALVE_OPEN).await,
            Verb::Close => gateway.write_reply(&hardware.ion_pump_valve, VALVE_CLOSED).await,
            Verb::GetValveState => {
                let open = gateway.read(&hardware.ion_pump_valve).await? == VALVE_OPEN;
                tracing::debug!(open, "Valve state");
                let state = if open { "True" } else { "False" };
                state.to_string()
            }

            Verb::GetMagnetDAC => gateway.read_reply(&hardware.magnet_dac).await,
            Verb::SetMagnetDAC => ctx.magnet().set_dac(command.number()?).await,

            Verb::GetHighVoltage => gateway.read_scaled_reply(ACCELERATION_REFERENCE, 1000.0).await,
            Verb::GetHV => gateway.read_reply(ACCELERATION_REFERENCE).await,
            Verb::SetHighVoltage | Verb::SetHV => {
                let volts = command.number()?;
                gateway.write_reply(ACCELERATION_REFERENCE, volts / 1000.0).await
            }

            Verb::GetTrapVoltage => gateway.read_reply(TRAP_VOLTAGE_READBACK).await,
            Verb::SetTrapVoltage => gateway.write_reply(TRAP_VOLTAGE_SET, command.number()?).await,
            Verb::GetElectronEnergy => gateway.read_reply(ELECTRON_ENERGY_READBACK).await,
            Verb::SetElectronEnergy => {
                gateway.write_reply(ELECTRON_ENERGY_SET, command.number()?).await
            }
            Verb::GetIonRepeller => gateway.read_reply(ION_REPELLER).await,
            Verb::SetIonRepeller => gateway.write_reply(ION_REPELLER, command.number()?).await,
            Verb::GetYSymmetry => gateway.read_reply(&hardware.y_symmetry).await,
            Verb::SetYSymmetry => {
                gateway.write_reply(&hardware.y_symmetry, command.number()?).await
            }
            Verb::GetZSymmetry => gateway.read_reply(Z_SYMMETRY).await,
            Verb::SetZSymmetry => gateway.write_reply(Z_SYMMETRY, command.number()?).await,
            Verb::GetZFocus => gateway.read_reply(Z_FOCUS).await,
            Verb::SetZFocus => gateway.write_reply(Z_FOCUS, command.number()?).await,
            Verb::GetExtractionLens => gateway.read_reply(EXTRACTION_LENS).await,
            Verb::SetExtractionLens => {
                gateway.write_reply(EXTRACTION_LENS, command.number()?).await
            }

            Verb::GetDeflection => {
                let name = deflection_parameter(command.require_argument()?);
                gateway.read_reply(&name).await
            }
            Verb::SetDeflection => {
                let (detector, value) = command.name_value()?;
                gateway.write_reply(&deflection_parameter(detector), value).await
            }
            Verb::GetIonCounterVoltage => gateway.read_reply(ION_COUNTER_SUPPLY).await,
            Verb::SetIonCounterVoltage => {
                gateway.write_reply(ION_COUNTER_SUPPLY, command.number()?).await
            }

            Verb::GetParameter => gateway.read_reply(command.require_argument()?).await,
            Verb::SetParameter => {
                let (name, value) = command.name_value()?;
                gateway.write_reply(name, value).await
            }
        };
        Ok(reply)
    }

    async fn set_integration_time(&self, seconds: f64) -> RcsResult<String> {
        let ctx = &*self.context;
        if !ctx.config().scan.allow_integration_time_change {
            tracing::debug!(seconds, "Integration time change disabled, ignoring");
            return Ok(OK_REPLY.to_string());
        }

        let rejected = || RcsError::HardwareWrite {
            name: "integration time".to_string(),
            value: seconds,
        };
        let session = ctx.session();
        let mut info = session.measurement_info().await.map_err(|e| {
            tracing::error!(error = %e, "Could not read measurement settings");
            rejected()
        })?;
        info.scan_type = ScanType::Monitor;
        info.integration_time_ms = seconds * 1000.0;

        session.start_monitoring(info).await.map_err(|e| {
            tracing::error!(error = %e, "Could not start the modified monitor scan");
            rejected()
        })?;
        tracing::info!("Integration time set to {} s", format_value(seconds));
        Ok(OK_REPLY.to_string())
    }
}

fn deflection_parameter(detector: &str) -> String {
    format!("Deflection {} Set", detector.trim())
}
