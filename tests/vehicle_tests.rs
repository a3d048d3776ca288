use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rovsim::vehicle::VehicleStatus;
use rovsim::*;

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn vehicle() -> (VehicleModel, StdRng) {
    let mut rng = StdRng::seed_from_u64(2024);
    let vehicle = VehicleModel::new("rov-int", &mut rng);
    (vehicle, rng)
}

#[test]
fn test_initial_state() {
    let (vehicle, _) = vehicle();
    assert_eq!(vehicle.device_id(), "rov-int");
    assert_eq!(vehicle.firmware(), "1.0.0");
    assert!(!vehicle.is_running());
    assert_eq!(vehicle.status(), VehicleStatus::Stopped);
    assert_eq!(vehicle.mode(), &DriveMode::Manual);
    assert_eq!(vehicle.lights(), &Lights::Off);
    assert_eq!(vehicle.battery_pct(), 100.0);
    assert_eq!(vehicle.temperature_c(), 28.0);
    assert_eq!(vehicle.position(), (41.133, -8.617));
    assert_eq!(vehicle.sequence(), 0);
    assert!((0.0..std::f64::consts::TAU).contains(&vehicle.heading_rad()));
}

#[test]
fn test_controls_clamped() {
    let (mut vehicle, _) = vehicle();

    vehicle.set_controls(DriveMode::Cruise, 1.7, -3.0).unwrap();
    assert_eq!(vehicle.throttle(), 1.0);
    assert_eq!(vehicle.steering(), -1.0);

    vehicle.set_controls(DriveMode::Eco, -0.4, 0.25).unwrap();
    assert_eq!(vehicle.throttle(), 0.0);
    assert_eq!(vehicle.steering(), 0.25);
    assert_eq!(vehicle.mode(), &DriveMode::Eco);
}

#[test]
fn test_unknown_mode_and_lights_stored_verbatim() {
    let (mut vehicle, mut rng) = vehicle();
    vehicle.set_controls(DriveMode::from("turbo"), 1.0, 0.0).unwrap();
    vehicle.set_aux(Lights::from("strobe"), true);

    let snapshot = vehicle.step(0.0, &mut rng, base_time());
    assert_eq!(snapshot.mode.as_str(), "turbo");
    assert_eq!(snapshot.lights.as_str(), "strobe");
    // Unknown modes fall back to the manual speed cap
    assert!((snapshot.metrics.speed - 2.0).abs() < 1e-9);
}

#[test]
fn test_status_tracks_running() {
    let (mut vehicle, _) = vehicle();

    vehicle.start();
    assert_eq!(vehicle.status(), VehicleStatus::Running);

    vehicle.set_controls(DriveMode::Sport, 0.8, 0.0).unwrap();
    vehicle.emergency_stop();
    assert_eq!(vehicle.status(), VehicleStatus::Stopped);
    assert_eq!(vehicle.throttle(), 0.0);
    assert_eq!(vehicle.speed_kmh(), 0.0);

    vehicle.start();
    vehicle.stop();
    assert!(!vehicle.is_running());
    assert_eq!(vehicle.status(), VehicleStatus::Stopped);
}

#[test]
fn test_sequence_increments_only_on_step() {
    let (mut vehicle, mut rng) = vehicle();

    for expected in 1..=25u64 {
        vehicle.start();
        vehicle.set_aux(Lights::High, expected % 2 == 0);
        let snapshot = vehicle.step(0.5, &mut rng, base_time() + Duration::seconds(expected as i64));
        assert_eq!(snapshot.seq, expected);
    }

    vehicle.stop();
    vehicle.update_firmware("2.0.0");
    assert_eq!(vehicle.sequence(), 25);
}

#[test]
fn test_speed_approaches_sport_cap() {
    let (mut vehicle, mut rng) = vehicle();
    vehicle.start();
    vehicle.set_controls(DriveMode::Sport, 1.0, 0.0).unwrap();

    let mut expected = 0.0;
    for tick in 0..30 {
        expected += 0.25 * (14.0 - expected);
        let snapshot = vehicle.step(0.0, &mut rng, base_time() + Duration::seconds(tick));
        assert!((snapshot.metrics.speed - expected).abs() < 1e-3, "tick {}: {}", tick, snapshot.metrics.speed);
        assert!(snapshot.metrics.speed <= 14.0);
    }
    assert!(vehicle.speed_kmh() > 13.9);
}

#[test]
fn test_battery_floor_and_temperature_ceiling() {
    let (mut vehicle, mut rng) = vehicle();
    vehicle.start();
    vehicle.set_controls(DriveMode::Sport, 1.0, 0.3).unwrap();

    for tick in 0..5000 {
        let snapshot = vehicle.step(1.0, &mut rng, base_time() + Duration::seconds(tick));
        assert!((0.0..=100.0).contains(&snapshot.metrics.battery));
        assert!((10.0..=90.0).contains(&snapshot.metrics.temperature));
    }

    assert_eq!(vehicle.battery_pct(), 0.0);
    assert_eq!(vehicle.temperature_c(), 90.0);
}

#[test]
fn test_idle_vehicle_cools_to_floor() {
    let (mut vehicle, mut rng) = vehicle();

    for tick in 0..1000 {
        vehicle.step(0.0, &mut rng, base_time() + Duration::seconds(tick));
    }
    assert_eq!(vehicle.temperature_c(), 10.0);
    assert_eq!(vehicle.speed_kmh(), 0.0);
    assert_eq!(vehicle.position(), (41.133, -8.617));
}

#[test]
fn test_moving_vehicle_changes_position() {
    let (mut vehicle, mut rng) = vehicle();
    vehicle.start();
    vehicle.set_controls(DriveMode::Cruise, 1.0, 0.5).unwrap();

    let start = vehicle.position();
    let heading = vehicle.heading_rad();
    for tick in 0..20 {
        vehicle.step(0.0, &mut rng, base_time() + Duration::seconds(tick));
    }

    assert_ne!(vehicle.position(), start);
    assert!((vehicle.heading_rad() - (heading + 20.0 * 0.5 * 0.08)).abs() < 1e-9);
}

#[test]
fn test_snapshot_wire_shape() {
    let (mut vehicle, mut rng) = vehicle();
    let snapshot = vehicle.step(0.0, &mut rng, Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 59).unwrap());
    let value = serde_json::to_value(&snapshot).unwrap();

    assert_eq!(value["deviceId"], "rov-int");
    assert_eq!(value["status"], "stopped");
    assert_eq!(value["mode"], "manual");
    assert_eq!(value["lights"], "off");
    assert_eq!(value["seq"], 1);
    assert_eq!(value["ts"], "2024-02-29T23:59:59.000000Z");
    assert!(value["metrics"]["battery"].is_number());
    assert!(value["gps"]["lat"].is_number());
    assert_eq!(value["firmware"], "1.0.0");
}
