use crate::events::{Ack, CommandParams};
use crate::fault_injection::MockPolicy;
use crate::telemetry::TelemetrySnapshot;
use crate::transport::TransportEvent;
use crate::util::CorrelationId;
use arrayvec::ArrayString;
use chrono::{DateTime, Utc};
use heapless::HistoryBuffer;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_COMMAND_SIZE: usize = 1024;
pub const MAX_EVENT_SIZE: usize = 2048;

pub type EventBuffer = ArrayString<MAX_EVENT_SIZE>;

/// Correlation metadata attached to every forwarded command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandMeta {
    #[serde(rename = "correlationId")]
    pub correlation_id: CorrelationId,
    #[serde(rename = "requestedBy")]
    pub requested_by: String,
    #[serde(with = "crate::util::iso_micros")]
    pub ts_start: DateTime<Utc>,
}

/// A command as sent to a transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command: String,
    #[serde(default)]
    pub params: CommandParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<CommandMeta>,
}

impl CommandRequest {
    pub fn correlation_id(&self) -> CorrelationId {
        self.meta
            .as_ref()
            .map(|meta| meta.correlation_id)
            .unwrap_or_default()
    }
}

/// Metadata a client may attach to a command line. The server stamps its own
/// correlation id and start time, so only the requester is read and anything
/// else is ignored.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClientMeta {
    #[serde(default, rename = "requestedBy", skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<String>,
}

/// A command as sent by a simulator client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientCommand {
    pub command: String,
    #[serde(default)]
    pub params: CommandParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ClientMeta>,
}

impl ClientCommand {
    pub fn requested_by(&self) -> Option<&str> {
        self.meta.as_ref().and_then(|meta| meta.requested_by.as_deref())
    }
}

/// Inbound line from a simulator client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientMessage {
    SetPolicy { set_policy: MockPolicy },
    Command(ClientCommand),
}

/// Outbound line to simulator clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Telemetry(TelemetrySnapshot),
    Ack(Ack),
    Dispatched { correlation_id: CorrelationId },
    PolicyUpdated { policy: MockPolicy },
    Error { message: String },
}

impl From<TransportEvent> for ServerMessage {
    fn from(event: TransportEvent) -> Self {
        match event {
            TransportEvent::Telemetry(snapshot) => ServerMessage::Telemetry(snapshot),
            TransportEvent::Ack(ack) => ServerMessage::Ack(ack),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("invalid JSON format: {0}")]
    InvalidJson(String),
    #[error("message of {0} bytes exceeds buffer size")]
    MessageTooLarge(usize),
    #[error("serialization failed: {0}")]
    SerializationError(String),
}

pub fn parse_client_message(line: &str) -> Result<ClientMessage, ProtocolError> {
    if line.len() > MAX_COMMAND_SIZE {
        return Err(ProtocolError::MessageTooLarge(line.len()));
    }
    serde_json::from_str(line).map_err(|e| ProtocolError::InvalidJson(e.to_string()))
}

pub fn parse_server_message(line: &str) -> Result<ServerMessage, ProtocolError> {
    serde_json::from_str(line).map_err(|e| ProtocolError::InvalidJson(e.to_string()))
}

/// Encodes outbound messages into a preallocated, bounded line buffer.
#[derive(Debug)]
pub struct LineEncoder {
    buffer: EventBuffer,
}

impl LineEncoder {
    pub fn new() -> Self {
        Self {
            buffer: ArrayString::new(),
        }
    }

    /// Serialize one message as a newline-terminated line.
    pub fn encode<T: Serialize>(&mut self, message: &T) -> Result<&str, ProtocolError> {
        self.buffer.clear();

        let json = serde_json::to_string(message).map_err(|e| ProtocolError::SerializationError(e.to_string()))?;

        if json.len() + 1 > MAX_EVENT_SIZE {
            return Err(ProtocolError::MessageTooLarge(json.len()));
        }
        self.buffer.push_str(&json);
        self.buffer.push('\n');

        Ok(self.buffer.as_str())
    }
}

impl Default for LineEncoder {
    fn default() -> Self {
        Self::new()
    }
}

pub const EARLY_ACK_BUFFER_SIZE: usize = 64;

/// Client-side matching of a dispatch reply to its ack.
///
/// The ack can reach the client before the `dispatched` reply naming its id,
/// so acks seen while the id is unknown are held and checked once it arrives.
#[derive(Debug)]
pub struct AckTracker {
    correlation_id: Option<CorrelationId>,
    early_acks: HistoryBuffer<Ack, EARLY_ACK_BUFFER_SIZE>,
}

impl AckTracker {
    pub fn new() -> Self {
        Self {
            correlation_id: None,
            early_acks: HistoryBuffer::new(),
        }
    }

    pub fn correlation_id(&self) -> Option<CorrelationId> {
        self.correlation_id
    }

    /// Feed one server message. Returns the matching ack, or the server's
    /// rejection of the request, once either is known.
    pub fn observe(&mut self, message: ServerMessage) -> Option<Result<Ack, String>> {
        match (message, self.correlation_id) {
            (ServerMessage::Dispatched { correlation_id }, None) => {
                self.correlation_id = Some(correlation_id);
                self.early_acks
                    .oldest_ordered()
                    .find(|ack| ack.correlation_id == correlation_id)
                    .cloned()
                    .map(Ok)
            }
            (ServerMessage::Error { message }, None) => Some(Err(message)),
            (ServerMessage::Ack(ack), None) => {
                self.early_acks.write(ack);
                None
            }
            (ServerMessage::Ack(ack), Some(id)) if ack.correlation_id == id => Some(Ok(ack)),
            _ => None,
        }
    }
}

impl Default for AckTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command_without_meta() {
        let message = parse_client_message(r#"{"command":"start"}"#).unwrap();
        match message {
            ClientMessage::Command(request) => {
                assert_eq!(request.command, "start");
                assert!(request.params.is_empty());
                assert!(request.meta.is_none());
                assert!(request.requested_by().is_none());
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_parse_command_with_meta() {
        let line = r#"{"command":"set_aux","params":{"lights":"high","horn":true},
            "meta":{"correlationId":"1704067200000-4321","requestedBy":"ui","ts_start":"2024-01-01T00:00:00.000000Z"}}"#;
        let ClientMessage::Command(request) = parse_client_message(line).unwrap() else {
            panic!("expected command");
        };
        assert_eq!(request.requested_by(), Some("ui"));
        assert_eq!(request.params["lights"], "high");
    }

    #[test]
    fn test_partial_client_meta_accepted() {
        let long_id = "9".repeat(64);
        let line = format!(
            r#"{{"command":"start","meta":{{"correlationId":"{}","ts_start":"yesterday"}}}}"#,
            long_id
        );
        let ClientMessage::Command(request) = parse_client_message(&line).unwrap() else {
            panic!("expected command");
        };
        assert_eq!(request.command, "start");
        assert!(request.requested_by().is_none());

        let line = r#"{"command":"stop","meta":{"requestedBy":"pilot"}}"#;
        let ClientMessage::Command(request) = parse_client_message(line).unwrap() else {
            panic!("expected command");
        };
        assert_eq!(request.requested_by(), Some("pilot"));
    }

    #[test]
    fn test_parse_policy_update() {
        let line = r#"{"set_policy":{"min_latency_ms":0,"max_latency_ms":50,"failure_rate":0.5}}"#;
        let message = parse_client_message(line).unwrap();
        assert_eq!(
            message,
            ClientMessage::SetPolicy {
                set_policy: MockPolicy { min_latency_ms: 0, max_latency_ms: 50, failure_rate: 0.5 }
            }
        );
    }

    #[test]
    fn test_oversized_line_rejected() {
        let line = format!(r#"{{"command":"{}"}}"#, "x".repeat(MAX_COMMAND_SIZE));
        assert!(matches!(parse_client_message(&line), Err(ProtocolError::MessageTooLarge(_))));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(parse_client_message("not json"), Err(ProtocolError::InvalidJson(_))));
        assert!(matches!(parse_client_message(r#"{"params":{}}"#), Err(ProtocolError::InvalidJson(_))));
    }

    #[test]
    fn test_encoder_tags_messages() {
        let mut encoder = LineEncoder::new();
        let line = encoder
            .encode(&ServerMessage::Dispatched { correlation_id: CorrelationId::from("1-1000").unwrap() })
            .unwrap();

        assert!(line.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(value["type"], "dispatched");
        assert_eq!(value["correlation_id"], "1-1000");
    }

    #[test]
    fn test_encoder_rejects_oversized_message() {
        let mut encoder = LineEncoder::new();
        let message = ServerMessage::Error { message: "e".repeat(MAX_EVENT_SIZE) };
        assert!(matches!(encoder.encode(&message), Err(ProtocolError::MessageTooLarge(_))));
    }
}
