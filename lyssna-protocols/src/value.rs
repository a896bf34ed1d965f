//! ## lyssna-protocols::value
//! Decoded value model for the AMF3 codec.
//!
//! Composite values (arrays, objects, dates, byte arrays, XML) are reference
//! counted. Cloning a composite shares it, and the encoder treats shared
//! composites as the same wire object, which is how back-references decoded
//! from a capture are reproduced when the value is written out again.

use std::collections::HashMap;
use std::sync::Arc;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// Smallest value representable by the 29-bit integer encoding.
pub const INTEGER_MIN: i32 = -(1 << 28);
/// Largest value representable by the 29-bit integer encoding.
pub const INTEGER_MAX: i32 = (1 << 28) - 1;

/// A decoded AMF3 value.
#[derive(Debug, Clone)]
pub enum Value {
    Undefined,
    Null,
    Boolean(bool),
    /// Signed integer. Values outside [`INTEGER_MIN`, `INTEGER_MAX`] are
    /// written as doubles.
    Integer(i32),
    Double(f64),
    String(String),
    Date(Arc<Date>),
    Array(Arc<Array>),
    Object(Arc<Object>),
    ByteArray(Arc<[u8]>),
    Xml(Arc<str>),
    XmlDocument(Arc<str>),
}

impl Value {
    /// Builds an anonymous dynamic object from key/value pairs.
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Object(Arc::new(Object::anonymous(entries.into_iter().collect())))
    }

    /// Builds a dense array.
    pub fn array(values: Vec<Value>) -> Self {
        Value::Array(Arc::new(Array::dense(values)))
    }

    pub fn date(epoch_millis: f64) -> Self {
        Value::Date(Arc::new(Date::new(epoch_millis)))
    }

    pub fn byte_array(bytes: &[u8]) -> Self {
        Value::ByteArray(Arc::from(bytes))
    }

    /// Short name of the variant, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::ByteArray(_) => "bytearray",
            Value::Xml(_) => "xml",
            Value::XmlDocument(_) => "xmldocument",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null | Value::Undefined)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the value as an integer when it is an integer or an integral
    /// double (the wire format promotes large integers to doubles).
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(i64::from(*i)),
            Value::Double(d) if d.fract() == 0.0 && d.abs() < 9.007_199_254_740_992e15 => {
                Some(*d as i64)
            }
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(f64::from(*i)),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Looks up a member of an object (or an associative array entry).
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(o) => o.get(key),
            Value::Array(a) => a.associative.get(key),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            // Bitwise so that NaN payloads and signed zeros compare as encoded.
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::ByteArray(a), Value::ByteArray(b)) => a == b,
            (Value::Xml(a), Value::Xml(b)) | (Value::XmlDocument(a), Value::XmlDocument(b)) => {
                a == b
            }
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

/// Milliseconds since the Unix epoch, UTC.
#[derive(Debug, Clone, Copy)]
pub struct Date {
    pub epoch_millis: f64,
}

impl Date {
    pub fn new(epoch_millis: f64) -> Self {
        Self { epoch_millis }
    }
}

impl PartialEq for Date {
    fn eq(&self, other: &Self) -> bool {
        self.epoch_millis.to_bits() == other.epoch_millis.to_bits()
    }
}

/// Insertion-ordered string keyed map used for object members and the
/// associative part of arrays.
///
/// Lookups and inserts go through a key index, so decoding an object stays
/// linear in its member count.
#[derive(Debug, Clone, Default)]
pub struct Properties {
    entries: Vec<(String, Value)>,
    index: HashMap<String, usize>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    /// Inserts a member, replacing the value in place if the key exists.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        let key = key.into();
        match self.index.get(&key) {
            Some(&slot) => Some(std::mem::replace(&mut self.entries[slot].1, value)),
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.index.get(key).map(|&slot| &self.entries[slot].1)
    }

    pub fn get_index(&self, index: usize) -> Option<(&str, &Value)> {
        self.entries.get(index).map(|(k, v)| (k.as_str(), v))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PartialEq for Properties {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut properties = Properties::new();
        for (key, value) in iter {
            properties.insert(key, value);
        }
        properties
    }
}

/// Array with an ordered associative part and a dense part.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Array {
    pub associative: Properties,
    pub dense: Vec<Value>,
}

impl Array {
    pub fn dense(values: Vec<Value>) -> Self {
        Self {
            associative: Properties::new(),
            dense: values,
        }
    }
}

/// Class description shared by objects of the same type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Traits {
    /// Empty for anonymous objects.
    pub class_name: String,
    /// Sealed member names, in wire order.
    pub sealed: Vec<String>,
    pub dynamic: bool,
    pub externalizable: bool,
}

impl Traits {
    /// Traits of an anonymous, fully dynamic object.
    pub fn anonymous() -> Self {
        Self {
            dynamic: true,
            ..Self::default()
        }
    }

    pub fn externalizable(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            externalizable: true,
            ..Self::default()
        }
    }
}

/// Object instance.
///
/// The first `traits.sealed.len()` properties are the sealed members, in
/// trait order; dynamic members follow. Externalizable wrapper objects hold
/// their wrapped value under `source`.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub traits: Traits,
    pub properties: Properties,
}

impl Object {
    pub fn anonymous(properties: Properties) -> Self {
        Self {
            traits: Traits::anonymous(),
            properties,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn class_name(&self) -> &str {
        &self.traits.class_name
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Undefined | Value::Null => serializer.serialize_none(),
            Value::Boolean(b) => serializer.serialize_bool(*b),
            Value::Integer(i) => serializer.serialize_i32(*i),
            Value::Double(d) => serializer.serialize_f64(*d),
            Value::String(s) => serializer.serialize_str(s),
            Value::Date(d) => serializer.serialize_f64(d.epoch_millis),
            Value::Xml(x) | Value::XmlDocument(x) => serializer.serialize_str(x),
            Value::ByteArray(b) => serializer.serialize_str(&hex::encode(b)),
            Value::Array(a) if a.associative.is_empty() => {
                let mut seq = serializer.serialize_seq(Some(a.dense.len()))?;
                for item in &a.dense {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Array(a) => {
                let mut map =
                    serializer.serialize_map(Some(a.associative.len() + a.dense.len()))?;
                for (key, value) in a.associative.iter() {
                    map.serialize_entry(key, value)?;
                }
                for (index, value) in a.dense.iter().enumerate() {
                    map.serialize_entry(&index.to_string(), value)?;
                }
                map.end()
            }
            Value::Object(o) => {
                let mut map = serializer.serialize_map(Some(o.properties.len()))?;
                for (key, value) in o.properties.iter() {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn properties_keep_insertion_order_and_replace_in_place() {
        let mut props = Properties::new();
        props.insert("b", Value::Integer(1));
        props.insert("a", Value::Integer(2));
        assert_eq!(props.insert("b", Value::Integer(3)), Some(Value::Integer(1)));

        let keys: Vec<&str> = props.keys().collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(props.get("b"), Some(&Value::Integer(3)));
    }

    #[test]
    fn doubles_compare_bitwise() {
        assert_eq!(Value::Double(f64::NAN), Value::Double(f64::NAN));
        assert_ne!(Value::Double(0.0), Value::Double(-0.0));
    }

    #[test]
    fn integral_doubles_read_as_integers() {
        assert_eq!(Value::Double(268_435_456.0).as_i64(), Some(268_435_456));
        assert_eq!(Value::Double(1.5).as_i64(), None);
    }

    #[test]
    fn serializes_to_json() {
        let value = Value::object([
            ("cmd", Value::Integer(1001)),
            ("blob", Value::byte_array(&[0xde, 0xad])),
            ("list", Value::array(vec![Value::Null, Value::from("x")])),
        ]);
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#"{"cmd":1001,"blob":"dead","list":[null,"x"]}"#);
    }
}
