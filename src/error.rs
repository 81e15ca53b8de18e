//! Custom error types for the remote-control server.
//!
//! `RcsError` is the single error enum for the library. Using the `thiserror`
//! crate it gathers everything that can go wrong while serving a request, from a
//! malformed command line to a socket failure.
//!
//! ## Error Hierarchy
//!
//! - **Protocol** (`InvalidCommand`, `MissingArgument`, `InvalidNumber`): the
//!   command line does not name a known verb or its argument cannot be parsed.
//! - **`HardwareWrite`**: the instrument rejected a parameter write.
//! - **`HardwareRead`**: a parameter could not be read (unknown name, driver fault).
//! - **`ConfigurationLookup`**: a named cup or sub-cup configuration does not exist.
//! - **`CupChangeRejected`**: the instrument refused the configuration change request.
//! - **`TuneSettings`**: a stored tune setting could not be loaded or applied.
//! - **`Transport`**: socket I/O failure. Only fatal during bind.
//! - **`Config`** / **`Configuration`**: configuration parse and validation errors.
//!
//! Everything except `Transport` and the configuration variants is turned into a
//! single reply line by [`RcsError::reply`] at the handler boundary, so a bad
//! request never escapes to the socket loop.

use thiserror::Error;

/// Convenience alias for results using the server error type.
pub type RcsResult<T> = std::result::Result<T, RcsError>;

/// Reply sent for unknown verbs, malformed arguments and failed reads.
pub const INVALID_COMMAND_REPLY: &str = "Error: Invalid Command";

/// Errors raised while serving a request or starting the server
#[derive(Error, Debug)]
pub enum RcsError {
    /// Verb not in the command table
    #[error("Unknown command verb '{0}'")]
    InvalidCommand(String),

    /// Verb needs an argument that was not sent
    #[error("Command '{0}' requires an argument")]
    MissingArgument(&'static str),

    /// Argument is not a finite number
    #[error("Could not parse '{0}' as a number")]
    InvalidNumber(String),

    /// Instrument refused a parameter write
    #[error("Instrument rejected write of {value} to '{name}'")]
    HardwareWrite {
        /// Parameter name
        name: String,
        /// Value that was refused
        value: f64,
    },

    /// Instrument could not read a parameter
    #[error("Could not read parameter '{0}'")]
    HardwareRead(String),

    /// Cup or sub-cup lookup failed
    #[error("Configuration lookup failed: {0}")]
    ConfigurationLookup(String),

    /// Instrument refused to switch cup configuration
    #[error("Instrument rejected the cup configuration change request")]
    CupChangeRejected,

    /// Tune settings could not be loaded or applied
    #[error("Tune settings error: {0}")]
    TuneSettings(String),

    /// Socket bind or I/O failure
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Configuration could not be extracted
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration failed validation
    #[error("Configuration validation error: {0}")]
    Configuration(String),
}

impl RcsError {
    /// Render the error as the single reply line sent back to the client.
    pub fn reply(&self) -> String {
        match self {
            RcsError::HardwareWrite { name, value } => {
                format!("Error: could not set {name} to {value}")
            }
            RcsError::ConfigurationLookup(msg) => format!("Error: {msg}"),
            RcsError::CupChangeRejected => {
                "Error: could not request cup configuration change".to_string()
            }
            RcsError::TuneSettings(msg) => format!("Error: {msg}"),
            RcsError::Transport(err) => format!("Error: {err}"),
            RcsError::Config(err) => format!("Error: {err}"),
            RcsError::Configuration(msg) => format!("Error: {msg}"),
            RcsError::InvalidCommand(_)
            | RcsError::MissingArgument(_)
            | RcsError::InvalidNumber(_)
            | RcsError::HardwareRead(_) => INVALID_COMMAND_REPLY.to_string(),
        }
    }

    /// True for errors caused by the request text rather than the instrument.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            RcsError::InvalidCommand(_) | RcsError::MissingArgument(_) | RcsError::InvalidNumber(_)
        )
    }
}

impl From<figment::Error> for RcsError {
    fn from(value: figment::Error) -> Self {
        RcsError::Config(Box::new(value))
    }
}
