//! First-order vehicle dynamics for one fixed simulation tick.

pub const SPEED_RESPONSE: f64 = 0.25;

pub const BASE_DRAIN_PCT: f64 = 0.005;
pub const THROTTLE_DRAIN_PCT: f64 = 0.02;
pub const DRAIN_NOISE_PCT: f64 = 0.002;

pub const THROTTLE_HEATING_C: f64 = 0.8;
pub const IDLE_COOLING_C: f64 = 0.05;
pub const TEMP_NOISE_C: f64 = 0.05;

pub const STEERING_RATE_RAD: f64 = 0.08;
// Dead-reckoning horizon per tick
pub const POSITION_STEP_S: f64 = 0.2;
pub const METERS_PER_DEG_LAT: f64 = 111_000.0;

pub const BATTERY_RANGE: (f64, f64) = (0.0, 100.0);
pub const TEMPERATURE_RANGE: (f64, f64) = (10.0, 90.0);

/// Exponential approach toward the target, never negative.
pub fn approach_speed(current_kmh: f64, target_kmh: f64) -> f64 {
    (current_kmh + (target_kmh - current_kmh) * SPEED_RESPONSE).max(0.0)
}

/// Battery drain for one tick before noise.
pub fn battery_drain(throttle: f64) -> f64 {
    BASE_DRAIN_PCT + throttle * THROTTLE_DRAIN_PCT
}

/// Temperature change for one tick before noise.
pub fn temperature_delta(throttle: f64, running: bool) -> f64 {
    let cooling = if running { 0.0 } else { IDLE_COOLING_C };
    throttle * THROTTLE_HEATING_C - cooling
}

/// Flat-earth projection of one tick of travel along `heading_rad`.
///
/// Returns the new `(lat, lon)` rounded to six decimals.
pub fn dead_reckon(lat: f64, lon: f64, heading_rad: f64, speed_kmh: f64) -> (f64, f64) {
    let speed_ms = speed_kmh / 3.6;
    let dx = speed_ms * heading_rad.cos() * POSITION_STEP_S;
    let dy = speed_ms * heading_rad.sin() * POSITION_STEP_S;

    let dlat = dy / METERS_PER_DEG_LAT;
    let dlon = dx / (METERS_PER_DEG_LAT * lat.to_radians().cos());

    (crate::util::round_to(lat + dlat, 6), crate::util::round_to(lon + dlon, 6))
}
