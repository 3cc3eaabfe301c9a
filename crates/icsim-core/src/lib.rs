//! icsim-core - Instrument cluster ECU simulation core
//!
//! Listens on a CAN bus, decodes door-lock, turn-signal and speed telemetry,
//! and answers a simplified UDS SecurityAccess (0x27) handshake that can
//! unlock the simulated vehicle.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   BusFrame   ┌─────────────┐  TelemetryUpdate  ┌──────────────┐
//! │ CanTransport │ ───────────▶ │ BusListener │ ────────────────▶ │ VehicleStore │
//! │ (SocketCAN)  │ ◀─────────── │             │ ── UdsRequest ──▶ │  + Security  │
//! └──────────────┘  UdsResponse └─────────────┘                   └──────┬───────┘
//!                                                                        │ snapshot
//!                                                          ┌─────────────┴──────────┐
//!                                                          │ PresentationDriver     │
//!                                                          │ diff → Dashboard       │
//!                                                          │ check_auto_relock      │
//!                                                          └────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`codec`] - Pure payload decoders (telemetry and UDS requests)
//! - [`layout`] - Active field layout, named vehicle models, randomization
//! - [`security`] - SecurityAccess seed/key state machine
//! - [`state`] - Shared vehicle state store and change detection
//! - [`listener`] - Bus receive/dispatch loop
//! - [`presentation`] - Fixed-rate snapshot/diff/redraw driver
//! - [`transport`] - CAN transport abstraction (SocketCAN, mock)
//! - [`tester`] - Tester side of the SecurityAccess handshake
//! - [`config`] - Startup configuration
//! - [`uds`] - UDS protocol constants

pub mod codec;
pub mod config;
pub mod error;
pub mod layout;
pub mod listener;
pub mod presentation;
pub mod security;
pub mod state;
pub mod tester;
pub mod transport;
pub mod uds;

pub use codec::TelemetryUpdate;
pub use config::{ResolvedConfig, SimConfig};
pub use error::ConfigError;
pub use layout::{Channel, FieldLayout, SpeedModel, VehicleModel};
pub use listener::BusListener;
pub use presentation::{Dashboard, LogDashboard, PresentationDriver};
pub use security::{SecurityAccess, SecurityState};
pub use state::{diff, RedrawFlags, VehicleState, VehicleStore};
pub use tester::{SecurityTester, TesterError, UnlockOutcome};
pub use transport::{BusFrame, CanTransport, TransportError};
pub use uds::{UdsRequest, UdsResponse};
