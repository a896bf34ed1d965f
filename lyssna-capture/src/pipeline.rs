//! Per-frame processing: decode, name, build the packet.

use std::sync::Arc;

use tracing::{debug, trace};

use lyssna_core::Packet;
use lyssna_protocols::{ContentType, DecodeError, Decoder, Frame, Value};
use lyssna_registry::{category_of, ActionRegistry};

/// Envelope member holding the action name.
const ACTION_FIELD: &str = "action";
/// Envelope member holding the numeric command id.
const COMMAND_FIELD: &str = "cmd";

/// Turns frames into packets. Stateless apart from the shared registry.
#[derive(Debug, Clone)]
pub struct FramePipeline {
    registry: Arc<ActionRegistry>,
    decoder: Decoder,
}

impl FramePipeline {
    pub fn new(registry: Arc<ActionRegistry>, max_depth: usize) -> Self {
        Self {
            registry,
            decoder: Decoder::with_max_depth(max_depth),
        }
    }

    /// Builds the packet for `frame`. A decode failure still yields a packet,
    /// with `decoded` unset, alongside the error.
    pub fn process(&self, sequence: u64, frame: Frame) -> (Packet, Option<DecodeError>) {
        let mut packet = Packet::new(sequence, frame.direction, frame.content_type, frame.body);
        if packet.content_type != ContentType::Amf3 {
            return (packet, None);
        }

        match self.decoder.decode(&packet.raw) {
            Ok((value, consumed)) => {
                if consumed < packet.raw.len() {
                    debug!(
                        sequence,
                        trailing = packet.raw.len() - consumed,
                        "Ignoring bytes after AMF3 value"
                    );
                }
                self.resolve(&mut packet, &value);
                packet.decoded = Some(value);
                trace!(sequence, action = %packet.label(), "Decoded packet");
                (packet, None)
            }
            Err(err) => (packet, Some(err)),
        }
    }

    /// Fills in `action` and `command_id` from the envelope, using the
    /// registry for whichever of the two is missing, then the category of the
    /// resolved action.
    fn resolve(&self, packet: &mut Packet, value: &Value) {
        let action = value.get(ACTION_FIELD).and_then(Value::as_str);
        let command_id = value
            .get(COMMAND_FIELD)
            .and_then(Value::as_i64)
            .and_then(|id| u32::try_from(id).ok());

        packet.command_id = command_id.or_else(|| {
            action
                .and_then(|name| self.registry.lookup(name))
                .and_then(|d| d.command_id)
        });
        packet.action = action.map(str::to_owned).or_else(|| {
            command_id
                .and_then(|id| self.registry.lookup_by_command_id(id))
                .map(|d| d.name.clone())
        });

        let definition = packet
            .action
            .as_deref()
            .and_then(|name| self.registry.lookup(name))
            .or_else(|| command_id.and_then(|id| self.registry.lookup_by_command_id(id)));
        packet.category = match definition {
            Some(definition) => Some(definition.category.clone()),
            None => packet.action.as_deref().map(|name| category_of(name).to_owned()),
        };
    }
}

#[cfg(test)]
mod tests {
    use lyssna_protocols::{amf3, Direction};

    use super::*;

    fn pipeline() -> FramePipeline {
        FramePipeline::new(Arc::new(ActionRegistry::builtin()), 64)
    }

    fn amf3_frame(value: &Value) -> Frame {
        Frame::new(
            Direction::Request,
            ContentType::Amf3,
            amf3::encode(value).unwrap(),
        )
    }

    #[test]
    fn name_resolved_from_command_id() {
        let frame = amf3_frame(&Value::object([("cmd", Value::Integer(1001))]));
        let (packet, err) = pipeline().process(3, frame);
        assert!(err.is_none());
        assert_eq!(packet.sequence, 3);
        assert_eq!(packet.action.as_deref(), Some("hero.hireHero"));
        assert_eq!(packet.command_id, Some(1001));
    }

    #[test]
    fn command_id_resolved_from_name() {
        let frame = amf3_frame(&Value::object([("action", Value::from("castle.getCastleInfo"))]));
        let (packet, _) = pipeline().process(1, frame);
        assert_eq!(packet.command_id, Some(2001));
    }

    #[test]
    fn category_comes_from_registry() {
        let registry = ActionRegistry::from_json_str(
            r#"{"shop.buy": {"id": 6001, "category": "store"}}"#,
        )
        .unwrap();
        let pipeline = FramePipeline::new(Arc::new(registry), 64);

        let (packet, _) = pipeline.process(1, amf3_frame(&Value::object([("cmd", Value::Integer(6001))])));
        assert_eq!(packet.action.as_deref(), Some("shop.buy"));
        assert_eq!(packet.category.as_deref(), Some("store"));

        let (packet, _) = pipeline.process(
            2,
            amf3_frame(&Value::object([("action", Value::from("mail.send"))])),
        );
        assert_eq!(packet.category.as_deref(), Some("mail"));
    }

    #[test]
    fn unknown_command_keeps_id() {
        let frame = amf3_frame(&Value::object([("cmd", Value::Integer(77777))]));
        let (packet, _) = pipeline().process(1, frame);
        assert_eq!(packet.command_id, Some(77777));
        assert!(packet.action.is_none());
        assert!(packet.category.is_none());
    }

    #[test]
    fn malformed_body_keeps_raw_bytes() {
        let frame = Frame::new(Direction::Response, ContentType::Amf3, vec![0x06, 0x09, 0x41]);
        let (packet, err) = pipeline().process(9, frame);
        assert!(matches!(err, Some(DecodeError::Truncated { .. })));
        assert!(packet.decoded.is_none());
        assert_eq!(packet.hex(), "060941");
    }

    #[test]
    fn text_frames_are_not_decoded() {
        let frame = Frame::new(Direction::Response, ContentType::Text, &b"hello"[..]);
        let (packet, err) = pipeline().process(1, frame);
        assert!(err.is_none());
        assert!(packet.decoded.is_none());
    }
}
