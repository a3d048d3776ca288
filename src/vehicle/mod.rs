pub mod dynamics;

use crate::command::VehicleCommand;
use crate::events::AckResult;
use crate::telemetry::{GpsFix, TelemetryMetrics, TelemetrySnapshot};
use crate::util::{clamp, round_to};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

pub const DEFAULT_DEVICE_ID: &str = "rov-local";
pub const DEFAULT_FIRMWARE: &str = "1.0.0";

const INITIAL_BATTERY_PCT: f64 = 100.0;
const INITIAL_TEMPERATURE_C: f64 = 28.0;
const INITIAL_LAT: f64 = 41.133;
const INITIAL_LON: f64 = -8.617;

/// Drive mode. Unknown names are stored verbatim and drive like `Manual`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DriveMode {
    Manual,
    Cruise,
    Sport,
    Eco,
    Other(String),
}

impl DriveMode {
    pub fn as_str(&self) -> &str {
        match self {
            DriveMode::Manual => "manual",
            DriveMode::Cruise => "cruise",
            DriveMode::Sport => "sport",
            DriveMode::Eco => "eco",
            DriveMode::Other(name) => name,
        }
    }

    /// Top speed in km/h reached at full throttle.
    pub fn max_speed_kmh(&self) -> f64 {
        match self {
            DriveMode::Cruise => 10.0,
            DriveMode::Sport => 14.0,
            DriveMode::Eco => 7.0,
            DriveMode::Manual | DriveMode::Other(_) => 8.0,
        }
    }
}

impl From<String> for DriveMode {
    fn from(name: String) -> Self {
        match name.as_str() {
            "manual" => DriveMode::Manual,
            "cruise" => DriveMode::Cruise,
            "sport" => DriveMode::Sport,
            "eco" => DriveMode::Eco,
            _ => DriveMode::Other(name),
        }
    }
}

impl From<&str> for DriveMode {
    fn from(name: &str) -> Self {
        DriveMode::from(name.to_string())
    }
}

impl From<DriveMode> for String {
    fn from(mode: DriveMode) -> Self {
        match mode {
            DriveMode::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

/// Light setting. Unknown names are stored verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Lights {
    Off,
    Low,
    High,
    Hazard,
    Other(String),
}

impl Lights {
    pub fn as_str(&self) -> &str {
        match self {
            Lights::Off => "off",
            Lights::Low => "low",
            Lights::High => "high",
            Lights::Hazard => "hazard",
            Lights::Other(name) => name,
        }
    }
}

impl From<String> for Lights {
    fn from(name: String) -> Self {
        match name.as_str() {
            "off" => Lights::Off,
            "low" => Lights::Low,
            "high" => Lights::High,
            "hazard" => Lights::Hazard,
            _ => Lights::Other(name),
        }
    }
}

impl From<&str> for Lights {
    fn from(name: &str) -> Self {
        Lights::from(name.to_string())
    }
}

impl From<Lights> for String {
    fn from(lights: Lights) -> Self {
        match lights {
            Lights::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleStatus {
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ControlError {
    #[error("throttle must be a finite number, got {0}")]
    NonFiniteThrottle(f64),
    #[error("steering must be a finite number, got {0}")]
    NonFiniteSteering(f64),
}

/// Physical and operational state of one simulated vehicle.
#[derive(Debug, Clone)]
pub struct VehicleModel {
    device_id: String,
    firmware: String,

    running: bool,
    status: VehicleStatus,
    mode: DriveMode,
    throttle: f64,
    steering: f64,
    lights: Lights,
    horn: bool,

    speed_kmh: f64,
    battery_pct: f64,
    temperature_c: f64,
    lat: f64,
    lon: f64,
    sequence: u64,
    last_update: DateTime<Utc>,

    heading_rad: f64,
}

impl VehicleModel {
    pub fn new<R: Rng + ?Sized>(device_id: &str, rng: &mut R) -> Self {
        Self {
            device_id: device_id.to_string(),
            firmware: DEFAULT_FIRMWARE.to_string(),
            running: false,
            status: VehicleStatus::Stopped,
            mode: DriveMode::Manual,
            throttle: 0.0,
            steering: 0.0,
            lights: Lights::Off,
            horn: false,
            speed_kmh: 0.0,
            battery_pct: INITIAL_BATTERY_PCT,
            temperature_c: INITIAL_TEMPERATURE_C,
            lat: INITIAL_LAT,
            lon: INITIAL_LON,
            sequence: 0,
            last_update: Utc::now(),
            heading_rad: rng.gen_range(0.0..core::f64::consts::TAU),
        }
    }

    pub fn start(&mut self) {
        self.running = true;
        self.sync_status();
    }

    pub fn stop(&mut self) {
        self.halt();
    }

    /// Same physical effect as `stop`; the distinction lives in the command name.
    pub fn emergency_stop(&mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        self.running = false;
        self.throttle = 0.0;
        self.speed_kmh = 0.0;
        self.sync_status();
    }

    pub fn set_controls(&mut self, mode: DriveMode, throttle: f64, steering: f64) -> Result<(), ControlError> {
        if !throttle.is_finite() {
            return Err(ControlError::NonFiniteThrottle(throttle));
        }
        if !steering.is_finite() {
            return Err(ControlError::NonFiniteSteering(steering));
        }

        self.mode = mode;
        self.throttle = clamp(throttle, 0.0, 1.0);
        self.steering = clamp(steering, -1.0, 1.0);
        Ok(())
    }

    pub fn set_aux(&mut self, lights: Lights, horn: bool) {
        self.lights = lights;
        self.horn = horn;
    }

    /// Label change only; no version validation.
    pub fn update_firmware(&mut self, version: &str) {
        self.firmware = version.trim().to_string();
    }

    pub fn recharge(&mut self) {
        self.battery_pct = INITIAL_BATTERY_PCT;
    }

    /// Dispatch a typed command to its mutator. Missing parameters keep the current value.
    pub fn apply(&mut self, command: &VehicleCommand) -> Result<(), ControlError> {
        match command {
            VehicleCommand::Start => self.start(),
            VehicleCommand::Stop => self.stop(),
            VehicleCommand::EmergencyStop(_) => self.emergency_stop(),
            VehicleCommand::SetControls(params) => {
                let mode = params.mode.clone().unwrap_or_else(|| self.mode.clone());
                let throttle = params.throttle.unwrap_or(self.throttle);
                let steering = params.steering.unwrap_or(self.steering);
                self.set_controls(mode, throttle, steering)?;
            }
            VehicleCommand::SetAux(params) => {
                let lights = params.lights.clone().unwrap_or_else(|| self.lights.clone());
                let horn = params.horn.unwrap_or(self.horn);
                self.set_aux(lights, horn);
            }
            VehicleCommand::FirmwareUpdate(params) => {
                if let Some(version) = &params.version {
                    self.update_firmware(version);
                }
            }
            VehicleCommand::Unrecognized(name) => {
                trace!("ignoring unrecognized command {}", name);
            }
        }
        Ok(())
    }

    /// Advance one fixed tick and return the resulting telemetry.
    pub fn step<R: Rng + ?Sized>(&mut self, noise_level: f64, rng: &mut R, now: DateTime<Utc>) -> TelemetrySnapshot {
        let target_speed = self.throttle * self.mode.max_speed_kmh();
        self.speed_kmh = dynamics::approach_speed(self.speed_kmh, target_speed);

        let drain_noise = rng.gen_range(-dynamics::DRAIN_NOISE_PCT..=dynamics::DRAIN_NOISE_PCT) * noise_level;
        let (battery_lo, battery_hi) = dynamics::BATTERY_RANGE;
        self.battery_pct = clamp(
            self.battery_pct - (dynamics::battery_drain(self.throttle) + drain_noise),
            battery_lo,
            battery_hi,
        );

        let temp_noise = rng.gen_range(-dynamics::TEMP_NOISE_C..=dynamics::TEMP_NOISE_C) * noise_level;
        let (temp_lo, temp_hi) = dynamics::TEMPERATURE_RANGE;
        self.temperature_c = clamp(
            self.temperature_c + dynamics::temperature_delta(self.throttle, self.running) + temp_noise,
            temp_lo,
            temp_hi,
        );

        self.heading_rad += clamp(self.steering, -1.0, 1.0) * dynamics::STEERING_RATE_RAD;
        let (lat, lon) = dynamics::dead_reckon(self.lat, self.lon, self.heading_rad, self.speed_kmh);
        self.lat = lat;
        self.lon = lon;

        self.sync_status();
        self.sequence += 1;
        self.last_update = now;

        self.telemetry()
    }

    fn sync_status(&mut self) {
        self.status = if self.running { VehicleStatus::Running } else { VehicleStatus::Stopped };
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            device_id: self.device_id.clone(),
            status: self.status,
            metrics: TelemetryMetrics {
                speed: round_to(self.speed_kmh, 3),
                battery: round_to(self.battery_pct, 3),
                temperature: round_to(self.temperature_c, 3),
            },
            gps: GpsFix { lat: self.lat, lon: self.lon },
            mode: self.mode.clone(),
            throttle: round_to(self.throttle, 3),
            steering: round_to(self.steering, 3),
            seq: self.sequence,
            ts: self.last_update,
            lights: self.lights.clone(),
            horn: self.horn,
            firmware: self.firmware.clone(),
        }
    }

    /// Operational fields reported back in every ack.
    pub fn ack_result(&self) -> AckResult {
        AckResult {
            running: self.running,
            status: self.status,
            mode: self.mode.clone(),
            throttle: self.throttle,
            steering: self.steering,
            lights: self.lights.clone(),
            firmware: self.firmware.clone(),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn firmware(&self) -> &str {
        &self.firmware
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn status(&self) -> VehicleStatus {
        self.status
    }

    pub fn mode(&self) -> &DriveMode {
        &self.mode
    }

    pub fn throttle(&self) -> f64 {
        self.throttle
    }

    pub fn steering(&self) -> f64 {
        self.steering
    }

    pub fn lights(&self) -> &Lights {
        &self.lights
    }

    pub fn horn(&self) -> bool {
        self.horn
    }

    pub fn speed_kmh(&self) -> f64 {
        self.speed_kmh
    }

    pub fn battery_pct(&self) -> f64 {
        self.battery_pct
    }

    pub fn temperature_c(&self) -> f64 {
        self.temperature_c
    }

    pub fn position(&self) -> (f64, f64) {
        (self.lat, self.lon)
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn heading_rad(&self) -> f64 {
        self.heading_rad
    }

    pub fn last_update(&self) -> DateTime<Utc> {
        self.last_update
    }
}
