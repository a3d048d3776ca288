use crate::command::{CommandError, VehicleCommand};
use crate::events::{Action, CommandParams};
use crate::fault_injection::{MockPolicy, PolicyError};
use crate::protocol::{CommandMeta, CommandRequest};
use crate::transport::{Transport, TransportError};
use crate::util::{gen_correlation_id, CorrelationId};
use chrono::{DateTime, Utc};
use heapless::FnvIndexMap;
use rand::rngs::StdRng;
use rand::SeedableRng;
use static_assertions::const_assert;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const MAX_PENDING_ACTIONS: usize = 64;

// FnvIndexMap capacity must be a power of two
const_assert!(MAX_PENDING_ACTIONS.is_power_of_two());

pub type PendingActions = FnvIndexMap<CorrelationId, Action, MAX_PENDING_ACTIONS>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControllerError {
    #[error("invalid command: {0}")]
    InvalidCommand(#[from] CommandError),
    #[error("pending action set full ({0} in flight)")]
    PendingSetFull(usize),
    #[error("transport rejected command: {0}")]
    Transport(#[from] TransportError),
    #[error("invalid mock policy: {0}")]
    InvalidPolicy(#[from] PolicyError),
}

/// Front door for issuing commands to one vehicle.
///
/// Every accepted command gets a fresh correlation id and stays pending here
/// until the host clears it on the matching ack.
pub struct Controller<T> {
    transport: T,
    pending: PendingActions,
    rng: StdRng,
}

impl<T: Transport> Controller<T> {
    pub fn new(transport: T) -> Self {
        Self::with_seed(transport, None)
    }

    pub fn with_seed(transport: T, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            transport,
            pending: PendingActions::new(),
            rng,
        }
    }

    /// Returns the new action's correlation id. Ids are unique among in-flight
    /// actions only: once an action is cleared, a later command stamped in the
    /// same millisecond may draw the same id.
    pub fn execute(
        &mut self,
        command: &str,
        params: CommandParams,
        requested_by: &str,
    ) -> Result<CorrelationId, ControllerError> {
        self.execute_at(command, params, requested_by, Utc::now())
    }

    /// Record an action stamped at `now` and forward it to the transport.
    pub fn execute_at(
        &mut self,
        command: &str,
        params: CommandParams,
        requested_by: &str,
        now: DateTime<Utc>,
    ) -> Result<CorrelationId, ControllerError> {
        VehicleCommand::parse(command, &params)?;

        if self.pending.len() >= MAX_PENDING_ACTIONS {
            warn!("Dropping {}: {} actions already pending", command, self.pending.len());
            return Err(ControllerError::PendingSetFull(self.pending.len()));
        }

        let mut correlation_id = gen_correlation_id(&now, &mut self.rng);
        while self.pending.contains_key(&correlation_id) {
            correlation_id = gen_correlation_id(&now, &mut self.rng);
        }

        let action = Action {
            correlation_id,
            command: command.to_string(),
            params: params.clone(),
            requested_by: requested_by.to_string(),
            ts_start: now,
        };
        let request = CommandRequest {
            command: command.to_string(),
            params,
            meta: Some(CommandMeta {
                correlation_id,
                requested_by: requested_by.to_string(),
                ts_start: now,
            }),
        };

        if self.pending.insert(correlation_id, action).is_err() {
            return Err(ControllerError::PendingSetFull(self.pending.len()));
        }

        if let Err(e) = self.transport.send_command_at(request, now) {
            self.pending.remove(&correlation_id);
            warn!("Transport refused {} ({}): {}", command, correlation_id, e);
            return Err(e.into());
        }

        debug!("Dispatched {} as {} for {}", command, correlation_id, requested_by);
        Ok(correlation_id)
    }

    pub fn get_action(&self, correlation_id: &str) -> Option<&Action> {
        self.pending.get(correlation_id)
    }

    pub fn clear_action(&mut self, correlation_id: &str) -> Option<Action> {
        self.pending.remove(correlation_id)
    }

    /// Returns `Ok(false)` when the transport has no configurable policy.
    pub fn set_mock_policy(
        &mut self,
        min_latency_ms: u64,
        max_latency_ms: u64,
        failure_rate: f64,
    ) -> Result<bool, ControllerError> {
        let policy = MockPolicy::new(min_latency_ms, max_latency_ms, failure_rate)?;

        match self.transport.as_policy_configurable() {
            Some(configurable) => {
                configurable.set_policy(policy)?;
                Ok(true)
            }
            None => {
                debug!("Transport {} has no mock policy, ignoring", self.transport.device_id());
                Ok(false)
            }
        }
    }

    pub fn mock_policy(&mut self) -> Option<MockPolicy> {
        self.transport
            .as_policy_configurable()
            .map(|configurable| configurable.policy())
    }

    /// Returns whether the transport supports recharging.
    pub fn recharge_battery(&mut self) -> bool {
        match self.transport.as_rechargeable() {
            Some(rechargeable) => {
                rechargeable.recharge_battery();
                true
            }
            None => {
                info!("Transport {} cannot recharge, ignoring", self.transport.device_id());
                false
            }
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_actions(&self) -> impl Iterator<Item = &Action> {
        self.pending.values()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}
