use crate::vehicle::{DriveMode, Lights, VehicleStatus};
use chrono::{DateTime, Utc};
use heapless::HistoryBuffer;
use serde::{Deserialize, Serialize};

pub const TELEMETRY_HISTORY_SIZE: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryMetrics {
    pub speed: f64,
    pub battery: f64,
    pub temperature: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    pub lat: f64,
    pub lon: f64,
}

/// Full vehicle record emitted on every tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    pub device_id: String,
    pub status: VehicleStatus,
    pub metrics: TelemetryMetrics,
    pub gps: GpsFix,
    pub mode: DriveMode,
    pub throttle: f64,
    pub steering: f64,
    pub seq: u64,
    #[serde(with = "crate::util::iso_micros")]
    pub ts: DateTime<Utc>,
    pub lights: Lights,
    pub horn: bool,
    pub firmware: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct TelemetryStats {
    pub total_received: u64,
    pub sequence_gaps_detected: u32,
    pub last_sequence: Option<u64>,
}

/// Bounded history of the most recent snapshots.
pub struct TelemetryHistory {
    snapshots: HistoryBuffer<TelemetrySnapshot, TELEMETRY_HISTORY_SIZE>,
    stats: TelemetryStats,
}

impl TelemetryHistory {
    pub fn new() -> Self {
        Self {
            snapshots: HistoryBuffer::new(),
            stats: TelemetryStats::default(),
        }
    }

    pub fn record(&mut self, snapshot: TelemetrySnapshot) {
        if let Some(last) = self.stats.last_sequence {
            if snapshot.seq != last + 1 {
                self.stats.sequence_gaps_detected += 1;
            }
        }
        self.stats.last_sequence = Some(snapshot.seq);
        self.stats.total_received += 1;
        self.snapshots.write(snapshot);
    }

    pub fn latest(&self) -> Option<&TelemetrySnapshot> {
        self.snapshots.recent()
    }

    /// Snapshots from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &TelemetrySnapshot> {
        self.snapshots.oldest_ordered()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.len() == 0
    }

    /// Drop buffered snapshots. Gap tracking restarts with the next record.
    pub fn clear(&mut self) {
        self.snapshots.clear();
        self.stats.last_sequence = None;
    }

    pub fn get_stats(&self) -> &TelemetryStats {
        &self.stats
    }
}

impl Default for TelemetryHistory {
    fn default() -> Self {
        Self::new()
    }
}
