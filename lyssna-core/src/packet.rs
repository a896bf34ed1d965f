//! ## lyssna-core::packet
//! A captured unit of wire data.

use bytes::Bytes;
use chrono::{DateTime, Utc};

use lyssna_protocols::{ContentType, Direction, Value};

/// Directed packet as surfaced to observers.
///
/// Immutable once built; clones share the raw buffer and decoded payload.
#[derive(Clone, Debug, PartialEq)]
pub struct Packet {
    /// Monotonic per-client sequence number, starting at 1.
    pub sequence: u64,
    pub direction: Direction,
    pub captured_at: DateTime<Utc>,
    pub content_type: ContentType,
    pub raw: Bytes,
    /// `None` when the body was not AMF3 or failed to decode.
    pub decoded: Option<Value>,
    pub action: Option<String>,
    pub command_id: Option<u32>,
    /// Registry category of the action, or its name prefix when unregistered.
    pub category: Option<String>,
}

impl Packet {
    pub fn new(sequence: u64, direction: Direction, content_type: ContentType, raw: Bytes) -> Self {
        Self {
            sequence,
            direction,
            captured_at: Utc::now(),
            content_type,
            raw,
            decoded: None,
            action: None,
            command_id: None,
            category: None,
        }
    }

    pub fn with_decoded(mut self, decoded: Value) -> Self {
        self.decoded = Some(decoded);
        self
    }

    pub fn hex(&self) -> String {
        hex::encode(&self.raw)
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Label used in logs: the action name, else `cmd:<id>`, else `unknown`.
    pub fn label(&self) -> String {
        match (&self.action, self.command_id) {
            (Some(action), _) => action.clone(),
            (None, Some(id)) => format!("cmd:{id}"),
            (None, None) => "unknown".into(),
        }
    }

    /// The `data` member of a decoded envelope, if any.
    pub fn data(&self) -> Option<&Value> {
        self.decoded.as_ref().and_then(|v| v.get("data"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_prefers_action() {
        let mut packet = Packet::new(
            1,
            Direction::Request,
            ContentType::Amf3,
            Bytes::from_static(&[0xde, 0xad]),
        );
        assert_eq!(packet.label(), "unknown");
        packet.command_id = Some(1001);
        assert_eq!(packet.label(), "cmd:1001");
        packet.action = Some("hero.hireHero".into());
        assert_eq!(packet.label(), "hero.hireHero");
        assert_eq!(packet.hex(), "dead");
    }

    #[test]
    fn data_reads_decoded_envelope() {
        let payload = Value::object([("data", Value::object([("castleId", Value::Integer(5))]))]);
        let packet = Packet::new(2, Direction::Response, ContentType::Amf3, Bytes::new())
            .with_decoded(payload);
        assert_eq!(
            packet.data().and_then(|d| d.get("castleId")),
            Some(&Value::Integer(5))
        );
    }
}
