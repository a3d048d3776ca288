use chrono::{Duration, TimeZone, Utc};
use rovsim::protocol::*;
use rovsim::*;
use serde_json::Value;

fn context() -> SimulationContext {
    let config = SimConfig {
        policy: MockPolicy::new(0, 0, 0.0).unwrap(),
        seed: Some(5),
        noise_level: 0.0,
        ..SimConfig::default()
    };
    SimulationContext::new(&config).unwrap()
}

#[test]
fn test_tick_events_encode_as_tagged_lines() {
    let mut ctx = context();
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let id = ctx.execute_at("start", CommandParams::new(), "tcp:test", now).unwrap();

    let mut encoder = LineEncoder::new();
    let lines: Vec<String> = ctx
        .tick_at(now + Duration::milliseconds(1))
        .into_iter()
        .map(|event| encoder.encode(&ServerMessage::from(event)).unwrap().to_string())
        .collect();
    assert_eq!(lines.len(), 2);

    let telemetry: Value = serde_json::from_str(lines[0].trim_end()).unwrap();
    assert_eq!(telemetry["type"], "telemetry");
    assert_eq!(telemetry["deviceId"], "rov-local");
    assert_eq!(telemetry["ts"], "2024-06-01T12:00:00.001000Z");

    let ack: Value = serde_json::from_str(lines[1].trim_end()).unwrap();
    assert_eq!(ack["type"], "ack");
    assert_eq!(ack["correlation_id"], id.as_str());
    assert_eq!(ack["accepted"], true);
    assert_eq!(ack["message"], "OK");
    assert_eq!(ack["result"]["status"], "running");

    match parse_server_message(lines[1].trim_end()).unwrap() {
        ServerMessage::Ack(parsed) => assert_eq!(parsed.correlation_id, id),
        other => panic!("expected ack, got {:?}", other),
    }
}

#[test]
fn test_client_command_drives_context() {
    let mut ctx = context();
    let line = r#"{"command":"set_controls","params":{"mode":"eco","throttle":0.5}}"#;

    let ClientMessage::Command(request) = parse_client_message(line).unwrap() else {
        panic!("expected command");
    };
    let id = ctx.execute(&request.command, request.params, "tcp:test").unwrap();
    assert!(ctx.controller().get_action(&id).is_some());
}

#[test]
fn test_request_meta_wire_names() {
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let request = CommandRequest {
        command: "stop".to_string(),
        params: CommandParams::new(),
        meta: Some(CommandMeta {
            correlation_id: "1717243200000-4242".parse().unwrap(),
            requested_by: "ops".to_string(),
            ts_start: now,
        }),
    };

    let value = serde_json::to_value(&request).unwrap();
    assert_eq!(value["meta"]["correlationId"], "1717243200000-4242");
    assert_eq!(value["meta"]["requestedBy"], "ops");
    assert_eq!(value["meta"]["ts_start"], "2024-06-01T12:00:00.000000Z");
}

#[test]
fn test_policy_reply_shape() {
    let mut encoder = LineEncoder::new();
    let policy = MockPolicy::new(150, 900, 0.05).unwrap();
    let line = encoder.encode(&ServerMessage::PolicyUpdated { policy }).unwrap();

    let value: Value = serde_json::from_str(line.trim_end()).unwrap();
    assert_eq!(value["type"], "policy_updated");
    assert_eq!(value["policy"]["min_latency_ms"], 150);
    assert_eq!(value["policy"]["max_latency_ms"], 900);
}

#[test]
fn test_invalid_policy_line_rejected_by_context() {
    let mut ctx = context();
    let line = r#"{"set_policy":{"min_latency_ms":900,"max_latency_ms":150,"failure_rate":0.0}}"#;

    let ClientMessage::SetPolicy { set_policy } = parse_client_message(line).unwrap() else {
        panic!("expected policy update");
    };
    assert!(ctx.set_policy(set_policy).is_err());
    assert_eq!(ctx.controller_mut().mock_policy(), Some(MockPolicy::new(0, 0, 0.0).unwrap()));
}

fn acks_for(ctx: &mut SimulationContext, now: chrono::DateTime<Utc>) -> Vec<Ack> {
    ctx.tick_at(now)
        .into_iter()
        .filter_map(|event| match event {
            TransportEvent::Ack(ack) => Some(ack),
            TransportEvent::Telemetry(_) => None,
        })
        .collect()
}

#[test]
fn test_ack_before_dispatch_reply_still_matches() {
    let mut ctx = context();
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let other = ctx.execute_at("start", CommandParams::new(), "tcp:other", now).unwrap();
    let mine = ctx.execute_at("stop", CommandParams::new(), "tcp:mine", now).unwrap();
    let acks = acks_for(&mut ctx, now + Duration::milliseconds(1));
    assert_eq!(acks.len(), 2);

    // Zero latency lets both acks go out ahead of the dispatch reply
    let mut tracker = AckTracker::new();
    for ack in acks {
        assert!(tracker.observe(ServerMessage::Ack(ack)).is_none());
    }
    assert!(tracker.correlation_id().is_none());

    let outcome = tracker.observe(ServerMessage::Dispatched { correlation_id: mine }).unwrap();
    let ack = outcome.unwrap();
    assert_eq!(ack.correlation_id, mine);
    assert_ne!(ack.correlation_id, other);
    assert_eq!(ack.command, "stop");
}

#[test]
fn test_dispatch_reply_then_ack() {
    let mut ctx = context();
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let id = ctx.execute_at("start", CommandParams::new(), "tcp:test", now).unwrap();

    let mut tracker = AckTracker::new();
    assert!(tracker.observe(ServerMessage::Dispatched { correlation_id: id }).is_none());
    assert_eq!(tracker.correlation_id(), Some(id));

    let mut acks = acks_for(&mut ctx, now + Duration::milliseconds(1));
    let ack = acks.pop().unwrap();
    let outcome = tracker.observe(ServerMessage::Ack(ack)).unwrap();
    assert_eq!(outcome.unwrap().correlation_id, id);
}

#[test]
fn test_error_reply_ends_wait() {
    let mut tracker = AckTracker::new();
    let line = r#"{"type":"error","message":"unknown mode: warp"}"#;
    let outcome = tracker.observe(parse_server_message(line).unwrap()).unwrap();
    assert_eq!(outcome, Err("unknown mode: warp".to_string()));
}
