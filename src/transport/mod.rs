pub mod sim;

pub use sim::SimTransport;

use crate::command::CommandError;
use crate::events::Ack;
use crate::fault_injection::{MockPolicy, PolicyError};
use crate::protocol::CommandRequest;
use crate::scheduler::SchedulerError;
use crate::telemetry::TelemetrySnapshot;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::trace;

/// Everything a transport reports back to its host.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Telemetry(TelemetrySnapshot),
    Ack(Ack),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("invalid command: {0}")]
    InvalidCommand(#[from] CommandError),
    #[error("command queue full: {0}")]
    QueueFull(#[from] SchedulerError),
    #[error("transport not connected")]
    NotConnected,
}

/// Receives telemetry and acks in emission order.
pub trait TransportObserver {
    fn on_telemetry(&mut self, snapshot: TelemetrySnapshot);
    fn on_ack(&mut self, ack: Ack);
}

impl TransportObserver for Vec<TransportEvent> {
    fn on_telemetry(&mut self, snapshot: TelemetrySnapshot) {
        self.push(TransportEvent::Telemetry(snapshot));
    }

    fn on_ack(&mut self, ack: Ack) {
        self.push(TransportEvent::Ack(ack));
    }
}

impl TransportObserver for std::sync::mpsc::Sender<TransportEvent> {
    fn on_telemetry(&mut self, snapshot: TelemetrySnapshot) {
        if self.send(TransportEvent::Telemetry(snapshot)).is_err() {
            trace!("telemetry dropped, receiver gone");
        }
    }

    fn on_ack(&mut self, ack: Ack) {
        if self.send(TransportEvent::Ack(ack)).is_err() {
            trace!("ack dropped, receiver gone");
        }
    }
}

impl TransportObserver for tokio::sync::mpsc::UnboundedSender<TransportEvent> {
    fn on_telemetry(&mut self, snapshot: TelemetrySnapshot) {
        if self.send(TransportEvent::Telemetry(snapshot)).is_err() {
            trace!("telemetry dropped, receiver gone");
        }
    }

    fn on_ack(&mut self, ack: Ack) {
        if self.send(TransportEvent::Ack(ack)).is_err() {
            trace!("ack dropped, receiver gone");
        }
    }
}

/// Command path to one vehicle.
pub trait Transport {
    fn device_id(&self) -> &str;

    fn connect(&mut self) -> Result<(), TransportError>;

    fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Submit a command. Never blocks; effects surface on a later `tick`.
    fn send_command(&mut self, request: CommandRequest) -> Result<(), TransportError> {
        self.send_command_at(request, Utc::now())
    }

    fn send_command_at(&mut self, request: CommandRequest, now: DateTime<Utc>) -> Result<(), TransportError>;

    fn tick(&mut self, noise_level: f64) {
        self.tick_at(noise_level, Utc::now());
    }

    /// Advance the simulation to `now`. Telemetry is emitted before any ack.
    fn tick_at(&mut self, noise_level: f64, now: DateTime<Utc>);

    fn as_policy_configurable(&mut self) -> Option<&mut dyn PolicyConfigurable> {
        None
    }

    fn as_rechargeable(&mut self) -> Option<&mut dyn Rechargeable> {
        None
    }
}

/// Optional capability: latency and failure policy can be replaced.
pub trait PolicyConfigurable {
    fn policy(&self) -> MockPolicy;

    /// Applies to commands submitted after the call only.
    fn set_policy(&mut self, policy: MockPolicy) -> Result<(), PolicyError>;
}

/// Optional capability: the battery can be refilled out of band.
pub trait Rechargeable {
    fn recharge_battery(&mut self);
}
