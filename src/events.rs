use crate::util::CorrelationId;
use crate::vehicle::{DriveMode, Lights, VehicleStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type CommandParams = Map<String, Value>;

pub const ACK_MESSAGE_OK: &str = "OK";
pub const ACK_MESSAGE_SIMULATED_FAILURE: &str = "Simulated failure";

/// A command in flight, as recorded by the controller at dispatch time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub correlation_id: CorrelationId,
    pub command: String,
    pub params: CommandParams,
    pub requested_by: String,
    #[serde(with = "crate::util::iso_micros")]
    pub ts_start: DateTime<Utc>,
}

/// Vehicle fields captured when an ack is emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckResult {
    pub running: bool,
    pub status: VehicleStatus,
    pub mode: DriveMode,
    pub throttle: f64,
    pub steering: f64,
    pub lights: Lights,
    pub firmware: String,
}

/// Final acknowledgment for exactly one submitted command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    pub correlation_id: CorrelationId,
    pub command: String,
    pub accepted: bool,
    pub message: String,
    #[serde(with = "crate::util::iso_micros")]
    pub ts_end: DateTime<Utc>,
    pub result: AckResult,
}

/// Round-trip latency in whole milliseconds, rounded to nearest.
pub fn compute_latency_ms(action: &Action, ack: &Ack) -> i64 {
    let elapsed = ack.ts_end - action.ts_start;
    match elapsed.num_microseconds() {
        Some(micros) => (micros as f64 / 1000.0).round() as i64,
        None => elapsed.num_milliseconds(),
    }
}
