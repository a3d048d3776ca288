use crate::config::{ConfigError, SimConfig};
use crate::controller::{Controller, ControllerError};
use crate::events::{compute_latency_ms, Ack, CommandParams};
use crate::fault_injection::MockPolicy;
use crate::telemetry::{TelemetryHistory, TelemetrySnapshot};
use crate::transport::{SimTransport, Transport, TransportEvent};
use crate::util::CorrelationId;
use chrono::{DateTime, Utc};
use heapless::HistoryBuffer;
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, Receiver};
use tracing::{debug, warn};

pub const ACK_LOG_SIZE: usize = 256;
pub const ACTIVITY_LOG_SIZE: usize = 256;

/// One processed acknowledgment with its measured round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckLogEntry {
    #[serde(with = "crate::util::iso_micros")]
    pub ts: DateTime<Utc>,
    pub correlation_id: CorrelationId,
    pub command: String,
    pub accepted: bool,
    pub message: String,
    /// `None` when no pending action matched the ack.
    pub latency_ms: Option<i64>,
}

/// One command issued through the context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    #[serde(with = "crate::util::iso_micros")]
    pub ts: DateTime<Utc>,
    pub command: String,
    pub params: CommandParams,
    pub correlation_id: CorrelationId,
    pub requested_by: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ActivitySummary {
    pub total: usize,
    pub successes: usize,
    pub failures: usize,
    pub avg_latency_ms: Option<f64>,
}

/// Host-owned simulation state: controller, event intake and bounded histories.
pub struct SimulationContext<T = SimTransport> {
    controller: Controller<T>,
    events: Receiver<TransportEvent>,
    telemetry: TelemetryHistory,
    ack_log: HistoryBuffer<AckLogEntry, ACK_LOG_SIZE>,
    activity: HistoryBuffer<ActivityEntry, ACTIVITY_LOG_SIZE>,
    last_ack: Option<Ack>,
    noise_level: f64,
}

impl SimulationContext<SimTransport> {
    /// Build a simulated vehicle from validated configuration.
    pub fn new(config: &SimConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let (sender, receiver) = mpsc::channel::<TransportEvent>();
        let transport = SimTransport::with_policy(&config.device_id, sender, config.policy, config.seed);
        // Derive a distinct stream for correlation ids so seeded runs stay reproducible
        let controller_seed = config.seed.map(|seed| seed.wrapping_add(1));

        Ok(Self::with_transport(
            Controller::with_seed(transport, controller_seed),
            receiver,
            config.noise_level,
        ))
    }
}

impl<T: Transport> SimulationContext<T> {
    /// `events` must receive everything the controller's transport emits.
    pub fn with_transport(controller: Controller<T>, events: Receiver<TransportEvent>, noise_level: f64) -> Self {
        Self {
            controller,
            events,
            telemetry: TelemetryHistory::new(),
            ack_log: HistoryBuffer::new(),
            activity: HistoryBuffer::new(),
            last_ack: None,
            noise_level,
        }
    }

    pub fn execute(
        &mut self,
        command: &str,
        params: CommandParams,
        requested_by: &str,
    ) -> Result<CorrelationId, ControllerError> {
        self.execute_at(command, params, requested_by, Utc::now())
    }

    pub fn execute_at(
        &mut self,
        command: &str,
        params: CommandParams,
        requested_by: &str,
        now: DateTime<Utc>,
    ) -> Result<CorrelationId, ControllerError> {
        let correlation_id = self
            .controller
            .execute_at(command, params.clone(), requested_by, now)?;

        self.activity.write(ActivityEntry {
            ts: now,
            command: command.to_string(),
            params,
            correlation_id,
            requested_by: requested_by.to_string(),
        });

        Ok(correlation_id)
    }

    pub fn tick(&mut self) -> Vec<TransportEvent> {
        self.tick_at(Utc::now())
    }

    /// Tick the transport, then fold every emitted event into the histories.
    /// Returns the events in emission order.
    pub fn tick_at(&mut self, now: DateTime<Utc>) -> Vec<TransportEvent> {
        self.controller.transport_mut().tick_at(self.noise_level, now);

        let events: Vec<TransportEvent> = self.events.try_iter().collect();
        for event in &events {
            match event {
                TransportEvent::Telemetry(snapshot) => self.telemetry.record(snapshot.clone()),
                TransportEvent::Ack(ack) => self.record_ack(ack),
            }
        }
        events
    }

    fn record_ack(&mut self, ack: &Ack) {
        let latency_ms = match self.controller.clear_action(&ack.correlation_id) {
            Some(action) => Some(compute_latency_ms(&action, ack)),
            None => {
                warn!("Ack for unknown correlation id {:?}", ack.correlation_id.as_str());
                None
            }
        };

        debug!(
            "Ack {} for {}: accepted={} latency={:?}",
            ack.correlation_id, ack.command, ack.accepted, latency_ms
        );

        self.ack_log.write(AckLogEntry {
            ts: ack.ts_end,
            correlation_id: ack.correlation_id,
            command: ack.command.clone(),
            accepted: ack.accepted,
            message: ack.message.clone(),
            latency_ms,
        });
        self.last_ack = Some(ack.clone());
    }

    /// Totals over the retained ack log.
    pub fn summary(&self) -> ActivitySummary {
        let mut summary = ActivitySummary::default();
        let mut latency_total = 0i64;
        let mut latency_count = 0usize;

        for entry in self.ack_log.oldest_ordered() {
            summary.total += 1;
            if entry.accepted {
                summary.successes += 1;
            } else {
                summary.failures += 1;
            }
            if let Some(latency) = entry.latency_ms {
                latency_total += latency;
                latency_count += 1;
            }
        }

        if latency_count > 0 {
            summary.avg_latency_ms = Some(latency_total as f64 / latency_count as f64);
        }
        summary
    }

    pub fn set_policy(&mut self, policy: MockPolicy) -> Result<bool, ControllerError> {
        self.controller
            .set_mock_policy(policy.min_latency_ms, policy.max_latency_ms, policy.failure_rate)
    }

    pub fn recharge_battery(&mut self) -> bool {
        self.controller.recharge_battery()
    }

    pub fn reset_telemetry(&mut self) {
        self.telemetry.clear();
    }

    pub fn telemetry(&self) -> &TelemetryHistory {
        &self.telemetry
    }

    pub fn latest_telemetry(&self) -> Option<&TelemetrySnapshot> {
        self.telemetry.latest()
    }

    /// Oldest first.
    pub fn ack_log(&self) -> impl Iterator<Item = &AckLogEntry> {
        self.ack_log.oldest_ordered()
    }

    /// Oldest first.
    pub fn activity(&self) -> impl Iterator<Item = &ActivityEntry> {
        self.activity.oldest_ordered()
    }

    pub fn last_ack(&self) -> Option<&Ack> {
        self.last_ack.as_ref()
    }

    pub fn noise_level(&self) -> f64 {
        self.noise_level
    }

    pub fn set_noise_level(&mut self, noise_level: f64) {
        self.noise_level = noise_level.clamp(0.0, 1.0);
    }

    pub fn controller(&self) -> &Controller<T> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut Controller<T> {
        &mut self.controller
    }
}
