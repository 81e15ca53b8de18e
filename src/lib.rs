//! # Rust RCS Library
//!
//! Remote-control server for a multicollector mass-spectrometer control
//! surface. Clients send one-line text commands over UDP or TCP
//! (`SetTrapVoltage 120.5`, `GetData`, ...) and receive one-line replies. The
//! server translates them into instrument operations through the
//! [`hardware::InstrumentSession`] trait.
//!
//! ## Crate Structure
//!
//! - **`config`**: Figment-based server configuration (TOML file + `RUST_RCS_` env).
//! - **`logging`**: `tracing` subscriber setup.
//! - **`error`**: `RcsError` and its wire replies.
//! - **`hardware`**: the instrument session contract, cup data model, tune store
//!   trait and the in-memory mock instrument.
//! - **`parameter`**: named parameter reads and writes rendered as replies.
//! - **`magnet`**: stepped magnet DAC moves.
//! - **`beam_blank`**: the blank/unblank state machine.
//! - **`cup_config`**: cup / sub-cup activation and queries.
//! - **`tuning`**: stored tune settings.
//! - **`scan`**: spectrum aggregation into the `GetData` snapshot.
//! - **`context`**: `ServerContext`, owning all of the above.
//! - **`dispatcher`**: request parsing and routing.
//! - **`network`**: UDP / TCP listeners and a one-shot client.

pub mod beam_blank;
pub mod config;
pub mod context;
pub mod cup_config;
pub mod dispatcher;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod magnet;
pub mod network;
pub mod parameter;
pub mod scan;
pub mod tuning;
