use crate::fault_injection::{MockPolicy, PolicyError};
use crate::vehicle::DEFAULT_DEVICE_ID;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_TICK_PERIOD_MS: u64 = 1000;
pub const DEFAULT_NOISE_LEVEL: f64 = 0.1;
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid policy: {0}")]
    InvalidPolicy(#[from] PolicyError),
    #[error("noise level {0} is outside [0, 1]")]
    InvalidNoiseLevel(f64),
    #[error("tick period must be positive")]
    ZeroTickPeriod,
    #[error("device id must not be empty")]
    EmptyDeviceId,
    #[error("invalid listen address {0}")]
    InvalidListenAddr(String),
}

/// Runtime settings for one simulated vehicle and its server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub device_id: String,
    pub tick_period_ms: u64,
    pub noise_level: f64,
    pub policy: MockPolicy,
    pub seed: Option<u64>,
    pub listen_addr: String,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            device_id: DEFAULT_DEVICE_ID.to_string(),
            tick_period_ms: DEFAULT_TICK_PERIOD_MS,
            noise_level: DEFAULT_NOISE_LEVEL,
            policy: MockPolicy {
                min_latency_ms: 150,
                max_latency_ms: 900,
                failure_rate: 0.05,
            },
            seed: None,
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
        }
    }
}

impl SimConfig {
    /// Missing fields fall back to defaults. The result is validated.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device_id.trim().is_empty() {
            return Err(ConfigError::EmptyDeviceId);
        }
        if self.tick_period_ms == 0 {
            return Err(ConfigError::ZeroTickPeriod);
        }
        if !(0.0..=1.0).contains(&self.noise_level) {
            return Err(ConfigError::InvalidNoiseLevel(self.noise_level));
        }
        self.policy.validate()?;
        self.socket_addr()?;
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen_addr
            .parse()
            .map_err(|_| ConfigError::InvalidListenAddr(self.listen_addr.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SimConfig::default();
        assert_eq!(config.device_id, "rov-local");
        assert_eq!(config.tick_period_ms, 1000);
        assert_eq!(config.policy.min_latency_ms, 150);
        assert_eq!(config.policy.max_latency_ms, 900);
        assert!(config.validate().is_ok());
        assert_eq!(config.socket_addr().unwrap().port(), 8080);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = SimConfig::from_json_str(r#"{"device_id":"rov-7","seed":42}"#).unwrap();
        assert_eq!(config.device_id, "rov-7");
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.noise_level, DEFAULT_NOISE_LEVEL);
        assert_eq!(config.listen_addr, DEFAULT_LISTEN_ADDR);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            SimConfig::from_json_str(r#"{"noise_level":2.0}"#),
            Err(ConfigError::InvalidNoiseLevel(_))
        ));
        assert!(matches!(
            SimConfig::from_json_str(r#"{"tick_period_ms":0}"#),
            Err(ConfigError::ZeroTickPeriod)
        ));
        assert!(matches!(
            SimConfig::from_json_str(r#"{"policy":{"min_latency_ms":10,"max_latency_ms":1,"failure_rate":0.0}}"#),
            Err(ConfigError::InvalidPolicy(_))
        ));
        assert!(matches!(
            SimConfig::from_json_str(r#"{"listen_addr":"nowhere"}"#),
            Err(ConfigError::InvalidListenAddr(_))
        ));
        assert!(matches!(SimConfig::from_json_str("{"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            SimConfig::from_json_file("/nonexistent/rovsim.json"),
            Err(ConfigError::Io(_))
        ));
    }
}
