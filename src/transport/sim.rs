use super::{PolicyConfigurable, Rechargeable, Transport, TransportError, TransportEvent, TransportObserver};
use crate::command::VehicleCommand;
use crate::events::{Ack, ACK_MESSAGE_OK, ACK_MESSAGE_SIMULATED_FAILURE};
use crate::fault_injection::{FailureInjectionStats, FailureInjector, MockPolicy, PolicyError};
use crate::protocol::CommandRequest;
use crate::scheduler::{CommandScheduler, PendingCommand, SchedulerStats};
use crate::vehicle::VehicleModel;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::mpsc::Sender;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct TransportStats {
    pub ticks: u64,
    pub commands_submitted: u32,
    pub commands_rejected: u32,
    pub commands_applied: u32,
    pub simulated_failures: u32,
    pub acks_emitted: u32,
}

/// In-process transport backed by a simulated vehicle.
///
/// Commands are held until their randomized completion time and only touch the
/// vehicle when they succeed. Nothing advances between `tick` calls.
pub struct SimTransport<O = Sender<TransportEvent>> {
    vehicle: VehicleModel,
    injector: FailureInjector,
    scheduler: CommandScheduler,
    observer: O,
    stats: TransportStats,
}

impl<O: TransportObserver> SimTransport<O> {
    pub fn new(device_id: &str, observer: O) -> Self {
        Self::with_policy(device_id, observer, MockPolicy::default(), None)
    }

    /// Build with an explicit policy; a seed makes every draw reproducible.
    pub fn with_policy(device_id: &str, observer: O, policy: MockPolicy, seed: Option<u64>) -> Self {
        let mut injector = FailureInjector::new(policy, seed);
        let vehicle = VehicleModel::new(device_id, injector.rng_mut());

        Self {
            vehicle,
            injector,
            scheduler: CommandScheduler::new(),
            observer,
            stats: TransportStats::default(),
        }
    }

    fn complete(&mut self, pending: PendingCommand, now: DateTime<Utc>) {
        let correlation_id = pending.request.correlation_id();

        let (accepted, message) = if pending.will_fail {
            self.stats.simulated_failures += 1;
            info!("Simulated failure for {} ({})", pending.request.command, correlation_id);
            (false, ACK_MESSAGE_SIMULATED_FAILURE.to_string())
        } else {
            match self.vehicle.apply(&pending.command) {
                Ok(()) => {
                    self.stats.commands_applied += 1;
                    debug!("Applied {} ({})", pending.command.name(), correlation_id);
                    (true, ACK_MESSAGE_OK.to_string())
                }
                Err(e) => {
                    warn!("Could not apply {} ({}): {}", pending.request.command, correlation_id, e);
                    (false, e.to_string())
                }
            }
        };

        let ack = Ack {
            correlation_id,
            command: pending.request.command,
            accepted,
            message,
            ts_end: now,
            result: self.vehicle.ack_result(),
        };

        self.stats.acks_emitted += 1;
        self.observer.on_ack(ack);
    }

    pub fn vehicle(&self) -> &VehicleModel {
        &self.vehicle
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    pub fn pending_count(&self) -> usize {
        self.scheduler.len()
    }

    pub fn get_stats(&self) -> &TransportStats {
        &self.stats
    }

    pub fn get_scheduler_stats(&self) -> &SchedulerStats {
        self.scheduler.get_stats()
    }

    pub fn get_failure_stats(&self) -> &FailureInjectionStats {
        self.injector.get_stats()
    }
}

impl<O: TransportObserver> Transport for SimTransport<O> {
    fn device_id(&self) -> &str {
        self.vehicle.device_id()
    }

    fn connect(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn send_command_at(&mut self, request: CommandRequest, now: DateTime<Utc>) -> Result<(), TransportError> {
        let command = match VehicleCommand::parse(&request.command, &request.params) {
            Ok(command) => command,
            Err(e) => {
                self.stats.commands_rejected += 1;
                return Err(e.into());
            }
        };

        let verdict = self.injector.draw();
        let completion_time = now + Duration::milliseconds(verdict.latency_ms as i64);
        let correlation_id = request.correlation_id();

        if let Err(e) = self.scheduler.schedule(request, command, completion_time, verdict.will_fail) {
            self.stats.commands_rejected += 1;
            warn!("Rejected command {}: {}", correlation_id, e);
            return Err(e.into());
        }

        self.stats.commands_submitted += 1;
        debug!(
            "Scheduled command {} in {} ms (will_fail={})",
            correlation_id, verdict.latency_ms, verdict.will_fail
        );

        Ok(())
    }

    /// Advance physics, emit telemetry, then complete every command due at `now`.
    fn tick_at(&mut self, noise_level: f64, now: DateTime<Utc>) {
        self.stats.ticks += 1;

        let snapshot = self.vehicle.step(noise_level, self.injector.rng_mut(), now);
        self.observer.on_telemetry(snapshot);

        for pending in self.scheduler.take_due(now) {
            self.complete(pending, now);
        }
    }

    fn as_policy_configurable(&mut self) -> Option<&mut dyn PolicyConfigurable> {
        Some(self)
    }

    fn as_rechargeable(&mut self) -> Option<&mut dyn Rechargeable> {
        Some(self)
    }
}

impl<O: TransportObserver> PolicyConfigurable for SimTransport<O> {
    fn policy(&self) -> MockPolicy {
        *self.injector.get_policy()
    }

    fn set_policy(&mut self, policy: MockPolicy) -> Result<(), PolicyError> {
        self.injector.set_policy(policy)?;
        info!(
            "Mock policy set: {}..{} ms, failure rate {}",
            policy.min_latency_ms, policy.max_latency_ms, policy.failure_rate
        );
        Ok(())
    }
}

impl<O: TransportObserver> Rechargeable for SimTransport<O> {
    fn recharge_battery(&mut self) {
        self.vehicle.recharge();
        info!("Battery recharged on {}", self.vehicle.device_id());
    }
}
