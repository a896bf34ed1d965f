use std::collections::HashMap;
use std::sync::Arc;

use super::{
    is_wrapper_class, marker, EncodeError, DEFAULT_MAX_DEPTH, EXTERNALIZABLE_SOURCE, MAX_U29,
};
use crate::value::{Array, Object, Traits, Value, INTEGER_MAX, INTEGER_MIN};

/// AMF3 encoder. Stateless; reference tables are created per call.
///
/// Strings are interned by value and traits by equality. Composite values
/// are interned by identity: two clones of the same `Arc` become one wire
/// object, two equal but separately built values are both written inline.
#[derive(Debug, Clone, Copy)]
pub struct Encoder {
    max_depth: usize,
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder {
    pub fn new() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn encode(&self, value: &Value) -> Result<Vec<u8>, EncodeError> {
        let mut buf = Vec::new();
        self.encode_into(value, &mut buf)?;
        Ok(buf)
    }

    /// Appends the encoding of `value` to `buf`. On error `buf` may hold a
    /// partial encoding.
    pub fn encode_into(&self, value: &Value, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        let mut writer = Writer {
            buf,
            max_depth: self.max_depth,
            strings: HashMap::new(),
            objects: HashMap::new(),
            traits: HashMap::new(),
        };
        writer.write_value(value, 0)
    }
}

fn identity<T: ?Sized>(value: &Arc<T>) -> usize {
    Arc::as_ptr(value) as *const () as usize
}

/// Header for an inline body of `len` bytes or elements.
fn inline_header(len: usize) -> Result<u32, EncodeError> {
    match u32::try_from(len) {
        Ok(n) if n <= MAX_U29 >> 1 => Ok((n << 1) | 1),
        _ => Err(EncodeError::LengthOverflow(len)),
    }
}

fn reference_header(index: usize) -> Result<u32, EncodeError> {
    match u32::try_from(index) {
        Ok(n) if n <= MAX_U29 >> 1 => Ok(n << 1),
        _ => Err(EncodeError::LengthOverflow(index)),
    }
}

struct Writer<'a, 'v> {
    buf: &'a mut Vec<u8>,
    max_depth: usize,
    strings: HashMap<&'v str, usize>,
    objects: HashMap<usize, usize>,
    traits: HashMap<&'v Traits, usize>,
}

impl<'v> Writer<'_, 'v> {
    fn write_u29(&mut self, value: u32) {
        debug_assert!(value <= MAX_U29);
        if value < 0x80 {
            self.buf.push(value as u8);
        } else if value < 0x4000 {
            self.buf.push(((value >> 7) | 0x80) as u8);
            self.buf.push((value & 0x7F) as u8);
        } else if value < 0x20_0000 {
            self.buf.push(((value >> 14) | 0x80) as u8);
            self.buf.push((((value >> 7) & 0x7F) | 0x80) as u8);
            self.buf.push((value & 0x7F) as u8);
        } else {
            self.buf.push(((value >> 22) | 0x80) as u8);
            self.buf.push((((value >> 15) & 0x7F) | 0x80) as u8);
            self.buf.push((((value >> 8) & 0x7F) | 0x80) as u8);
            self.buf.push((value & 0xFF) as u8);
        }
    }

    fn write_f64(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_bits().to_be_bytes());
    }

    fn write_string(&mut self, s: &'v str) -> Result<(), EncodeError> {
        if s.is_empty() {
            self.write_u29(1);
            return Ok(());
        }
        if let Some(&index) = self.strings.get(s) {
            let header = reference_header(index)?;
            self.write_u29(header);
            return Ok(());
        }
        let header = inline_header(s.len())?;
        self.write_u29(header);
        self.buf.extend_from_slice(s.as_bytes());
        let index = self.strings.len();
        self.strings.insert(s, index);
        Ok(())
    }

    /// Writes a reference if the composite was already written and returns
    /// `true`; otherwise records its slot and returns `false`.
    fn write_object_reference(&mut self, key: usize) -> Result<bool, EncodeError> {
        if let Some(&index) = self.objects.get(&key) {
            let header = reference_header(index)?;
            self.write_u29(header);
            return Ok(true);
        }
        let index = self.objects.len();
        self.objects.insert(key, index);
        Ok(false)
    }

    fn write_value(&mut self, value: &'v Value, depth: usize) -> Result<(), EncodeError> {
        if depth > self.max_depth {
            return Err(EncodeError::DepthExceeded(self.max_depth));
        }
        match value {
            Value::Undefined => self.buf.push(marker::UNDEFINED),
            Value::Null => self.buf.push(marker::NULL),
            Value::Boolean(false) => self.buf.push(marker::FALSE),
            Value::Boolean(true) => self.buf.push(marker::TRUE),
            Value::Integer(i) if (INTEGER_MIN..=INTEGER_MAX).contains(i) => {
                self.buf.push(marker::INTEGER);
                self.write_u29((*i as u32) & MAX_U29);
            }
            Value::Integer(i) => {
                self.buf.push(marker::DOUBLE);
                self.write_f64(f64::from(*i));
            }
            Value::Double(d) => {
                self.buf.push(marker::DOUBLE);
                self.write_f64(*d);
            }
            Value::String(s) => {
                self.buf.push(marker::STRING);
                self.write_string(s)?;
            }
            Value::Date(date) => {
                self.buf.push(marker::DATE);
                if !self.write_object_reference(identity(date))? {
                    self.write_u29(1);
                    self.write_f64(date.epoch_millis);
                }
            }
            Value::Xml(text) | Value::XmlDocument(text) => {
                let tag = if matches!(value, Value::Xml(_)) {
                    marker::XML
                } else {
                    marker::XML_DOCUMENT
                };
                self.buf.push(tag);
                if !self.write_object_reference(identity(text))? {
                    let header = inline_header(text.len())?;
                    self.write_u29(header);
                    self.buf.extend_from_slice(text.as_bytes());
                }
            }
            Value::ByteArray(bytes) => {
                self.buf.push(marker::BYTE_ARRAY);
                if !self.write_object_reference(identity(bytes))? {
                    let header = inline_header(bytes.len())?;
                    self.write_u29(header);
                    self.buf.extend_from_slice(bytes);
                }
            }
            Value::Array(array) => {
                self.buf.push(marker::ARRAY);
                if !self.write_object_reference(identity(array))? {
                    self.write_array(array, depth)?;
                }
            }
            Value::Object(object) => {
                self.buf.push(marker::OBJECT);
                if !self.write_object_reference(identity(object))? {
                    self.write_object(object, depth)?;
                }
            }
        }
        Ok(())
    }

    fn write_array(&mut self, array: &'v Array, depth: usize) -> Result<(), EncodeError> {
        let header = inline_header(array.dense.len())?;
        self.write_u29(header);
        for (key, value) in array.associative.iter() {
            if key.is_empty() {
                return Err(EncodeError::EmptyAssociativeKey);
            }
            self.write_string(key)?;
            self.write_value(value, depth + 1)?;
        }
        self.write_string("")?;
        for value in &array.dense {
            self.write_value(value, depth + 1)?;
        }
        Ok(())
    }

    fn write_object(&mut self, object: &'v Object, depth: usize) -> Result<(), EncodeError> {
        let traits = &object.traits;
        let class = traits.class_name.as_str();

        if let Some(&index) = self.traits.get(traits) {
            match u32::try_from(index) {
                Ok(n) if n <= MAX_U29 >> 2 => self.write_u29((n << 2) | 0b01),
                _ => return Err(EncodeError::LengthOverflow(index)),
            }
        } else if traits.externalizable {
            self.write_u29(0b0111);
            self.write_string(class)?;
            self.register_traits(traits);
        } else {
            let count = traits.sealed.len();
            let header = match u32::try_from(count) {
                Ok(n) if n <= MAX_U29 >> 4 => (n << 4) | (u32::from(traits.dynamic) << 3) | 0b011,
                _ => return Err(EncodeError::LengthOverflow(count)),
            };
            self.write_u29(header);
            self.write_string(class)?;
            for name in &traits.sealed {
                self.write_string(name)?;
            }
            self.register_traits(traits);
        }

        if traits.externalizable {
            if !is_wrapper_class(class) {
                return Err(EncodeError::UnsupportedExternalizable(class.to_owned()));
            }
            return match (object.properties.len(), object.get(EXTERNALIZABLE_SOURCE)) {
                (1, Some(source)) => self.write_value(source, depth + 1),
                _ => Err(EncodeError::ExternalizableShape(class.to_owned())),
            };
        }

        for (index, name) in traits.sealed.iter().enumerate() {
            match object.properties.get_index(index) {
                Some((key, value)) if key == name.as_str() => self.write_value(value, depth + 1)?,
                _ => {
                    return Err(EncodeError::SealedMemberMismatch {
                        class: class.to_owned(),
                        member: name.clone(),
                    })
                }
            }
        }

        let dynamic_members = object.properties.iter().skip(traits.sealed.len());
        if traits.dynamic {
            for (key, value) in dynamic_members {
                if key.is_empty() {
                    return Err(EncodeError::EmptyDynamicKey(class.to_owned()));
                }
                self.write_string(key)?;
                self.write_value(value, depth + 1)?;
            }
            self.write_string("")?;
        } else if object.properties.len() > traits.sealed.len() {
            return Err(EncodeError::UndeclaredMembers(class.to_owned()));
        }
        Ok(())
    }

    fn register_traits(&mut self, traits: &'v Traits) {
        let index = self.traits.len();
        self.traits.insert(traits, index);
    }
}
