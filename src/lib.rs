//! # Remote Vehicle Simulator
//!
//! Control and telemetry simulation for a single remotely operated vehicle.
//! Commands are acknowledged asynchronously after a randomized latency, may
//! fail by policy, and are correlated back to the request that issued them.
//!
//! ## Features
//!
//! - **Vehicle model**: throttle/steering driven speed, battery drain, heating and dead reckoning
//! - **Simulated transport**: latency and failure injection with exactly one ack per command
//! - **Correlation**: unique ids per command and round-trip latency measurement
//! - **Bounded memory**: fixed-capacity pending sets and histories
//!
//! ## Quick Start
//!
//! ```rust
//! use rovsim::{SimConfig, SimulationContext};
//!
//! let mut ctx = SimulationContext::new(&SimConfig::default()).unwrap();
//! let id = ctx.execute("start", Default::default(), "docs").unwrap();
//!
//! // Telemetry first, then any ack that came due
//! for event in ctx.tick() {
//!     println!("{:?}", event);
//! }
//! # let _ = id;
//! ```
//!
//! ## Architecture
//!
//! - [`vehicle`] - Vehicle state and physics step
//! - [`command`] - Typed commands parsed from request parameters
//! - [`fault_injection`] - Latency and failure policy
//! - [`scheduler`] - Pending commands ordered by completion time
//! - [`transport`] - Transport trait and the simulated implementation
//! - [`controller`] - Correlation ids and pending actions
//! - [`session`] - Host-owned context with histories and summary
//! - [`protocol`] - Line-delimited JSON messages for the simulator server

#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]

pub mod command;
pub mod config;
pub mod controller;
pub mod events;
pub mod fault_injection;
pub mod protocol;
pub mod scheduler;
pub mod session;
pub mod telemetry;
pub mod transport;
pub mod util;
pub mod vehicle;

// Re-export main public types for convenience
pub use command::VehicleCommand;
pub use config::SimConfig;
pub use controller::Controller;
pub use events::{Ack, Action, CommandParams};
pub use fault_injection::MockPolicy;
pub use protocol::{ClientCommand, ClientMessage, CommandRequest, ServerMessage};
pub use session::SimulationContext;
pub use telemetry::TelemetrySnapshot;
pub use transport::{SimTransport, Transport, TransportEvent};
pub use vehicle::{DriveMode, Lights, VehicleModel};
