use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_MIN_LATENCY_MS: u64 = 100;
const DEFAULT_MAX_LATENCY_MS: u64 = 800;
const DEFAULT_FAILURE_RATE: f64 = 0.0;

/// Latency bounds and failure probability for simulated command completion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MockPolicy {
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
    pub failure_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum PolicyError {
    #[error("min latency {min_ms} ms exceeds max latency {max_ms} ms")]
    InvertedLatency { min_ms: u64, max_ms: u64 },
    #[error("failure rate {0} is outside [0, 1]")]
    FailureRateOutOfRange(f64),
}

impl MockPolicy {
    pub fn new(min_latency_ms: u64, max_latency_ms: u64, failure_rate: f64) -> Result<Self, PolicyError> {
        let policy = Self {
            min_latency_ms,
            max_latency_ms,
            failure_rate,
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.min_latency_ms > self.max_latency_ms {
            return Err(PolicyError::InvertedLatency {
                min_ms: self.min_latency_ms,
                max_ms: self.max_latency_ms,
            });
        }
        if !(0.0..=1.0).contains(&self.failure_rate) {
            return Err(PolicyError::FailureRateOutOfRange(self.failure_rate));
        }
        Ok(())
    }
}

impl Default for MockPolicy {
    fn default() -> Self {
        Self {
            min_latency_ms: DEFAULT_MIN_LATENCY_MS,
            max_latency_ms: DEFAULT_MAX_LATENCY_MS,
            failure_rate: DEFAULT_FAILURE_RATE,
        }
    }
}

/// Outcome drawn for one submitted command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub latency_ms: u64,
    pub will_fail: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FailureInjectionStats {
    pub total_draws: u32,
    pub failures_scheduled: u32,
    pub total_latency_ms: u64,
    pub max_latency_ms: u64,
}

impl FailureInjectionStats {
    pub fn average_latency_ms(&self) -> Option<u64> {
        if self.total_draws == 0 {
            None
        } else {
            Some(self.total_latency_ms / u64::from(self.total_draws))
        }
    }
}

/// Draws latency and failure outcomes according to the current policy.
#[derive(Debug)]
pub struct FailureInjector {
    policy: MockPolicy,
    stats: FailureInjectionStats,
    rng: StdRng,
}

impl FailureInjector {
    pub fn new(policy: MockPolicy, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            policy,
            stats: FailureInjectionStats::default(),
            rng,
        }
    }

    /// Decide latency and failure for a command submitted now.
    pub fn draw(&mut self) -> Verdict {
        let latency_ms = self
            .rng
            .gen_range(self.policy.min_latency_ms..=self.policy.max_latency_ms);
        let will_fail = self.rng.gen_bool(self.policy.failure_rate);

        self.stats.total_draws += 1;
        self.stats.total_latency_ms += latency_ms;
        self.stats.max_latency_ms = self.stats.max_latency_ms.max(latency_ms);
        if will_fail {
            self.stats.failures_scheduled += 1;
        }

        Verdict { latency_ms, will_fail }
    }

    pub fn get_policy(&self) -> &MockPolicy {
        &self.policy
    }

    pub fn set_policy(&mut self, policy: MockPolicy) -> Result<(), PolicyError> {
        policy.validate()?;
        self.policy = policy;
        Ok(())
    }

    pub fn get_stats(&self) -> &FailureInjectionStats {
        &self.stats
    }

    /// Shared generator for the rest of the simulation.
    pub fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}
