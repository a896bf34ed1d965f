//! ## lyssna-protocols::amf3
//! AMF3 codec with the full back-reference scheme.
//!
//! Every value starts with a one-byte marker. Lengths and references use the
//! 29-bit variable-length integer (U29). Strings, composite values and object
//! traits each have a reference table; the first occurrence is written inline
//! and indexed in insertion order, later occurrences are written as an index.
//!
//! Tables live for a single `decode`/`encode` call.

mod decoder;
mod encoder;

use thiserror::Error;

use crate::value::Value;

pub use decoder::Decoder;
pub use encoder::Encoder;

/// Default nesting ceiling for decoding and encoding.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Largest value a U29 can carry.
pub const MAX_U29: u32 = 0x1FFF_FFFF;

/// Externalizable classes whose body is a single wrapped value.
pub const EXTERNALIZABLE_WRAPPERS: [&str; 3] = [
    "flex.messaging.io.ArrayCollection",
    "flex.messaging.io.ArrayList",
    "flex.messaging.io.ObjectProxy",
];

/// Member name holding the wrapped value of an externalizable wrapper.
pub const EXTERNALIZABLE_SOURCE: &str = "source";

pub(crate) mod marker {
    pub const UNDEFINED: u8 = 0x00;
    pub const NULL: u8 = 0x01;
    pub const FALSE: u8 = 0x02;
    pub const TRUE: u8 = 0x03;
    pub const INTEGER: u8 = 0x04;
    pub const DOUBLE: u8 = 0x05;
    pub const STRING: u8 = 0x06;
    pub const XML_DOCUMENT: u8 = 0x07;
    pub const DATE: u8 = 0x08;
    pub const ARRAY: u8 = 0x09;
    pub const OBJECT: u8 = 0x0A;
    pub const XML: u8 = 0x0B;
    pub const BYTE_ARRAY: u8 = 0x0C;
}

/// Errors that can occur while decoding AMF3 input.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum DecodeError {
    #[error("Input truncated at offset {offset} ({needed} more bytes needed)")]
    Truncated { offset: usize, needed: usize },
    #[error("Unsupported type marker 0x{marker:02x} at offset {offset}")]
    UnsupportedMarker { marker: u8, offset: usize },
    #[error("String reference {index} out of range (table holds {len})")]
    StringReference { index: usize, len: usize },
    #[error("Object reference {index} out of range (table holds {len})")]
    ObjectReference { index: usize, len: usize },
    #[error("Traits reference {index} out of range (table holds {len})")]
    TraitsReference { index: usize, len: usize },
    #[error("Object reference {0} points at a value that is still being decoded")]
    CyclicReference(usize),
    #[error("Invalid UTF-8 at offset {0}")]
    InvalidUtf8(usize),
    #[error("Nesting depth exceeds limit of {0}")]
    DepthExceeded(usize),
    #[error("Unsupported externalizable class '{0}'")]
    UnsupportedExternalizable(String),
}

/// Errors that can occur while encoding a value.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum EncodeError {
    #[error("Nesting depth exceeds limit of {0}")]
    DepthExceeded(usize),
    #[error("Length or count {0} does not fit the 29-bit encoding")]
    LengthOverflow(usize),
    #[error("Object of class '{0}' has an empty dynamic member name")]
    EmptyDynamicKey(String),
    #[error("Array has an empty associative key")]
    EmptyAssociativeKey,
    #[error("Sealed member '{member}' of class '{class}' is missing or out of order")]
    SealedMemberMismatch { class: String, member: String },
    #[error("Object of non-dynamic class '{0}' has members beyond its sealed traits")]
    UndeclaredMembers(String),
    #[error("Externalizable object '{0}' must hold exactly one 'source' member")]
    ExternalizableShape(String),
    #[error("Unsupported externalizable class '{0}'")]
    UnsupportedExternalizable(String),
}

pub(crate) fn is_wrapper_class(class_name: &str) -> bool {
    EXTERNALIZABLE_WRAPPERS.contains(&class_name)
}

/// Decodes one value from the start of `input`, returning it with the number
/// of bytes consumed.
pub fn decode(input: &[u8]) -> Result<(Value, usize), DecodeError> {
    Decoder::new().decode(input)
}

/// Encodes one value.
pub fn encode(value: &Value) -> Result<Vec<u8>, EncodeError> {
    Encoder::new().encode(value)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;

    use super::*;
    use crate::value::{Array, Object, Properties, Traits, INTEGER_MAX, INTEGER_MIN};

    fn round_trip(value: &Value) -> Value {
        let bytes = encode(value).unwrap();
        let (decoded, consumed) = decode(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        decoded
    }

    #[test]
    fn integers_use_minimal_u29() {
        assert_eq!(encode(&Value::Integer(0)).unwrap(), vec![0x04, 0x00]);
        assert_eq!(encode(&Value::Integer(127)).unwrap(), vec![0x04, 0x7F]);
        assert_eq!(encode(&Value::Integer(128)).unwrap(), vec![0x04, 0x81, 0x00]);
        assert_eq!(encode(&Value::Integer(0x3FFF)).unwrap(), vec![0x04, 0xFF, 0x7F]);
        assert_eq!(
            encode(&Value::Integer(0x4000)).unwrap(),
            vec![0x04, 0x81, 0x80, 0x00]
        );
        assert_eq!(
            encode(&Value::Integer(-1)).unwrap(),
            vec![0x04, 0xFF, 0xFF, 0xFF, 0xFF]
        );
    }

    #[test]
    fn integer_bounds_round_trip() {
        for i in [INTEGER_MIN, -1, 0, 1, 1001, INTEGER_MAX] {
            assert_eq!(round_trip(&Value::Integer(i)), Value::Integer(i));
        }
    }

    #[test]
    fn out_of_range_integers_become_doubles() {
        let value = Value::Integer(INTEGER_MAX + 1);
        let bytes = encode(&value).unwrap();
        assert_eq!(bytes[0], marker::DOUBLE);
        assert_eq!(round_trip(&value), Value::Double(f64::from(INTEGER_MAX + 1)));
    }

    #[test]
    fn doubles_round_trip_bit_for_bit() {
        let weird = f64::from_bits(0x7FF8_0000_0000_0001);
        for d in [0.0, -0.0, 1.5, f64::MIN_POSITIVE, f64::INFINITY, weird] {
            let decoded = round_trip(&Value::Double(d));
            match decoded {
                Value::Double(out) => assert_eq!(out.to_bits(), d.to_bits()),
                other => panic!("expected double, got {other:?}"),
            }
        }
    }

    #[test]
    fn repeated_string_is_written_once() {
        let value = Value::array(vec![Value::from("hero"), Value::from("hero")]);
        let bytes = encode(&value).unwrap();
        assert_eq!(
            bytes,
            vec![0x09, 0x05, 0x01, 0x06, 0x09, b'h', b'e', b'r', b'o', 0x06, 0x00]
        );

        let (decoded, _) = decode(&bytes).unwrap();
        let dense = &decoded.as_array().unwrap().dense;
        assert_eq!(dense[0], dense[1]);
        assert_eq!(dense[0].as_str(), Some("hero"));
    }

    #[test]
    fn empty_string_is_never_referenced() {
        let value = Value::array(vec![Value::from(""), Value::from("")]);
        let bytes = encode(&value).unwrap();
        assert_eq!(bytes, vec![0x09, 0x05, 0x01, 0x06, 0x01, 0x06, 0x01]);
    }

    #[test]
    fn anonymous_object_layout() {
        let value = Value::object([("a", Value::Integer(1))]);
        let bytes = encode(&value).unwrap();
        assert_eq!(bytes, vec![0x0A, 0x0B, 0x01, 0x03, b'a', 0x04, 0x01, 0x01]);
        assert_eq!(round_trip(&value), value);
    }

    #[test]
    fn shared_object_becomes_reference_and_keeps_identity() {
        let shared = Arc::new(Object::anonymous(
            [("castleId", Value::Integer(5))].into_iter().collect(),
        ));
        let value = Value::Array(Arc::new(Array::dense(vec![
            Value::Object(shared.clone()),
            Value::Object(shared),
        ])));

        let bytes = encode(&value).unwrap();
        // Slot 0 is the outer array, slot 1 the object.
        assert_eq!(&bytes[bytes.len() - 2..], &[0x0A, 0x02]);

        let (decoded, _) = decode(&bytes).unwrap();
        let dense = &decoded.as_array().unwrap().dense;
        match (&dense[0], &dense[1]) {
            (Value::Object(a), Value::Object(b)) => assert!(Arc::ptr_eq(a, b)),
            other => panic!("expected two objects, got {other:?}"),
        }
        assert_eq!(encode(&decoded).unwrap(), bytes);
    }

    #[test]
    fn equal_but_distinct_objects_share_traits_only() {
        let value = Value::array(vec![
            Value::object([("x", Value::Integer(1))]),
            Value::object([("x", Value::Integer(1))]),
        ]);
        let bytes = encode(&value).unwrap();
        // Second object: inline object, traits reference 0, then the
        // member name as string reference 0.
        assert_eq!(
            &bytes[bytes.len() - 6..],
            &[0x0A, 0x01, 0x00, 0x04, 0x01, 0x01]
        );
        assert_eq!(round_trip(&value), value);
    }

    #[test]
    fn sealed_object_round_trips() {
        let mut properties = Properties::new();
        properties.insert("heroName", Value::from("Aurelia"));
        properties.insert("level", Value::Integer(12));
        properties.insert("extra", Value::Boolean(true));
        let value = Value::Object(Arc::new(Object {
            traits: Traits {
                class_name: "com.evony.Hero".into(),
                sealed: vec!["heroName".into(), "level".into()],
                dynamic: true,
                externalizable: false,
            },
            properties,
        }));
        assert_eq!(round_trip(&value), value);
    }

    #[test]
    fn externalizable_wrapper_round_trips() {
        let mut properties = Properties::new();
        properties.insert(
            EXTERNALIZABLE_SOURCE,
            Value::array(vec![Value::Integer(1), Value::Integer(2)]),
        );
        let value = Value::Object(Arc::new(Object {
            traits: Traits::externalizable("flex.messaging.io.ArrayCollection"),
            properties,
        }));
        assert_eq!(round_trip(&value), value);
    }

    #[test]
    fn unknown_externalizable_is_rejected() {
        // Object, externalizable traits, class "x".
        let bytes = [0x0A, 0x07, 0x03, b'x'];
        assert_eq!(
            decode(&bytes),
            Err(DecodeError::UnsupportedExternalizable("x".into()))
        );
    }

    #[test]
    fn associative_array_round_trips() {
        let mut associative = Properties::new();
        associative.insert("name", Value::from("troops"));
        let value = Value::Array(Arc::new(Array {
            associative,
            dense: vec![Value::Integer(3)],
        }));
        assert_eq!(round_trip(&value), value);
    }

    #[test]
    fn composite_scalars_round_trip() {
        let value = Value::array(vec![
            Value::date(1_700_000_000_000.0),
            Value::byte_array(&[1, 2, 3]),
            Value::Xml(Arc::from("<a/>")),
            Value::XmlDocument(Arc::from("<b/>")),
            Value::Undefined,
            Value::Null,
            Value::Boolean(false),
        ]);
        assert_eq!(round_trip(&value), value);
    }

    #[test]
    fn truncated_input_is_an_error() {
        assert_eq!(
            decode(&[]),
            Err(DecodeError::Truncated {
                offset: 0,
                needed: 1
            })
        );
        assert_eq!(
            decode(&[0x06, 0x09, b'h']),
            Err(DecodeError::Truncated {
                offset: 2,
                needed: 3
            })
        );
        assert!(matches!(
            decode(&[0x05, 0x00, 0x01]),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn out_of_range_references_are_errors() {
        assert_eq!(
            decode(&[0x06, 0x02]),
            Err(DecodeError::StringReference { index: 1, len: 0 })
        );
        assert_eq!(
            decode(&[0x0A, 0x00]),
            Err(DecodeError::ObjectReference { index: 0, len: 0 })
        );
        assert_eq!(
            decode(&[0x0A, 0x05]),
            Err(DecodeError::TraitsReference { index: 1, len: 0 })
        );
    }

    #[test]
    fn self_reference_is_rejected() {
        // Array of one element that references the array itself.
        assert_eq!(
            decode(&[0x09, 0x03, 0x01, 0x09, 0x00]),
            Err(DecodeError::CyclicReference(0))
        );
    }

    #[test]
    fn unsupported_marker_is_an_error() {
        assert_eq!(
            decode(&[0x11]),
            Err(DecodeError::UnsupportedMarker {
                marker: 0x11,
                offset: 0
            })
        );
    }

    #[test]
    fn invalid_utf8_is_an_error() {
        assert_eq!(decode(&[0x06, 0x03, 0xFF]), Err(DecodeError::InvalidUtf8(2)));
    }

    #[test]
    fn nesting_beyond_ceiling_is_rejected() {
        let mut bytes = Vec::new();
        for _ in 0..(DEFAULT_MAX_DEPTH + 5) {
            bytes.extend_from_slice(&[0x09, 0x03, 0x01]);
        }
        bytes.push(0x01);
        assert_eq!(
            decode(&bytes),
            Err(DecodeError::DepthExceeded(DEFAULT_MAX_DEPTH))
        );

        let mut value = Value::Null;
        for _ in 0..(DEFAULT_MAX_DEPTH + 5) {
            value = Value::array(vec![value]);
        }
        assert_eq!(
            encode(&value),
            Err(EncodeError::DepthExceeded(DEFAULT_MAX_DEPTH))
        );
    }

    #[test]
    fn custom_depth_limit() {
        let value = Value::array(vec![Value::array(vec![Value::Null])]);
        let bytes = encode(&value).unwrap();
        assert!(Decoder::with_max_depth(2).decode(&bytes).is_ok());
        assert_eq!(
            Decoder::with_max_depth(1).decode(&bytes),
            Err(DecodeError::DepthExceeded(1))
        );
    }

    #[test]
    fn empty_dynamic_key_cannot_be_encoded() {
        let value = Value::object([("", Value::Null)]);
        assert_eq!(
            encode(&value),
            Err(EncodeError::EmptyDynamicKey(String::new()))
        );
    }

    #[test]
    fn sealed_member_order_is_enforced() {
        let value = Value::Object(Arc::new(Object {
            traits: Traits {
                class_name: "C".into(),
                sealed: vec!["a".into()],
                dynamic: false,
                externalizable: false,
            },
            properties: [("b", Value::Null)].into_iter().collect(),
        }));
        assert_eq!(
            encode(&value),
            Err(EncodeError::SealedMemberMismatch {
                class: "C".into(),
                member: "a".into()
            })
        );
    }

    #[test]
    fn decode_all_reads_consecutive_values() {
        let mut bytes = encode(&Value::from("hero")).unwrap();
        // Tables reset per value, so the second string is inline again.
        bytes.extend(encode(&Value::from("hero")).unwrap());
        bytes.extend(encode(&Value::Integer(7)).unwrap());
        let values = Decoder::new().decode_all(&bytes).unwrap();
        assert_eq!(
            values,
            vec![Value::from("hero"), Value::from("hero"), Value::Integer(7)]
        );
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Undefined),
            Just(Value::Null),
            any::<bool>().prop_map(Value::Boolean),
            (INTEGER_MIN..=INTEGER_MAX).prop_map(Value::Integer),
            any::<f64>().prop_map(Value::Double),
            "[a-z]{0,6}".prop_map(Value::String),
            any::<i64>().prop_map(|ms| Value::date(ms as f64)),
            proptest::collection::vec(any::<u8>(), 0..8).prop_map(|b| Value::byte_array(&b)),
        ];
        leaf.prop_recursive(4, 32, 4, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::array),
                proptest::collection::vec(("[a-z]{1,4}", inner), 0..4).prop_map(Value::object),
            ]
        })
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(value in arb_value()) {
            let bytes = encode(&value).unwrap();
            let (decoded, consumed) = decode(&bytes).unwrap();
            prop_assert_eq!(consumed, bytes.len());
            prop_assert_eq!(&decoded, &value);
            prop_assert_eq!(encode(&decoded).unwrap(), bytes);
        }

        #[test]
        fn arbitrary_input_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            let _ = decode(&bytes);
        }
    }
}
