use std::sync::Arc;

use super::{is_wrapper_class, marker, DecodeError, DEFAULT_MAX_DEPTH, EXTERNALIZABLE_SOURCE};
use crate::value::{Array, Date, Object, Properties, Traits, Value};

/// AMF3 decoder. Stateless; reference tables are created per call.
#[derive(Debug, Clone, Copy)]
pub struct Decoder {
    max_depth: usize,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Decodes one value from the start of `input`.
    ///
    /// Returns the value and the number of bytes consumed.
    pub fn decode(&self, input: &[u8]) -> Result<(Value, usize), DecodeError> {
        let mut reader = Reader::new(input, self.max_depth);
        let value = reader.read_value(0)?;
        Ok((value, reader.pos))
    }

    /// Decodes consecutive values until the input is exhausted. Each value
    /// starts with fresh reference tables.
    pub fn decode_all(&self, input: &[u8]) -> Result<Vec<Value>, DecodeError> {
        let mut values = Vec::new();
        let mut offset = 0;
        while offset < input.len() {
            let mut reader = Reader::new(input, self.max_depth);
            reader.pos = offset;
            values.push(reader.read_value(0)?);
            offset = reader.pos;
        }
        Ok(values)
    }
}

/// Cursor plus the reference tables of a single decode call.
struct Reader<'a> {
    input: &'a [u8],
    pos: usize,
    max_depth: usize,
    strings: Vec<String>,
    /// `None` marks a slot whose value is still being decoded.
    objects: Vec<Option<Value>>,
    traits: Vec<Traits>,
}

impl<'a> Reader<'a> {
    fn new(input: &'a [u8], max_depth: usize) -> Self {
        Self {
            input,
            pos: 0,
            max_depth,
            strings: Vec::new(),
            objects: Vec::new(),
            traits: Vec::new(),
        }
    }

    fn remaining(&self) -> usize {
        self.input.len().saturating_sub(self.pos)
    }

    fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let byte = *self.input.get(self.pos).ok_or(DecodeError::Truncated {
            offset: self.pos,
            needed: 1,
        })?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let remaining = self.remaining();
        if len > remaining {
            return Err(DecodeError::Truncated {
                offset: self.pos,
                needed: len - remaining,
            });
        }
        let input: &'a [u8] = self.input;
        let bytes = &input[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Reads a U29: seven payload bits in each of the first three bytes
    /// while the high bit is set, all eight bits of a fourth byte.
    fn read_u29(&mut self) -> Result<u32, DecodeError> {
        let mut value: u32 = 0;
        for _ in 0..3 {
            let byte = self.read_u8()?;
            value = (value << 7) | u32::from(byte & 0x7F);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        let byte = self.read_u8()?;
        Ok((value << 8) | u32::from(byte))
    }

    fn read_i29(&mut self) -> Result<i32, DecodeError> {
        let raw = self.read_u29()?;
        if raw & 0x1000_0000 != 0 {
            Ok(raw as i32 - (1 << 29))
        } else {
            Ok(raw as i32)
        }
    }

    fn read_f64(&mut self) -> Result<f64, DecodeError> {
        let bytes = self.read_bytes(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(f64::from_bits(u64::from_be_bytes(buf)))
    }

    fn read_utf8(&mut self, len: usize) -> Result<&'a str, DecodeError> {
        let start = self.pos;
        let bytes = self.read_bytes(len)?;
        std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8(start))
    }

    /// Reads a U29S string body, resolving or recording its table entry.
    fn read_string(&mut self) -> Result<String, DecodeError> {
        let header = self.read_u29()?;
        let index_or_len = (header >> 1) as usize;
        if header & 1 == 0 {
            return self
                .strings
                .get(index_or_len)
                .cloned()
                .ok_or(DecodeError::StringReference {
                    index: index_or_len,
                    len: self.strings.len(),
                });
        }
        if index_or_len == 0 {
            return Ok(String::new());
        }
        let s = self.read_utf8(index_or_len)?.to_owned();
        self.strings.push(s.clone());
        Ok(s)
    }

    fn object_reference(&self, header: u32) -> Result<Value, DecodeError> {
        let index = (header >> 1) as usize;
        match self.objects.get(index) {
            Some(Some(value)) => Ok(value.clone()),
            Some(None) => Err(DecodeError::CyclicReference(index)),
            None => Err(DecodeError::ObjectReference {
                index,
                len: self.objects.len(),
            }),
        }
    }

    fn reserve_slot(&mut self) -> usize {
        self.objects.push(None);
        self.objects.len() - 1
    }

    fn fill_slot(&mut self, slot: usize, value: &Value) {
        self.objects[slot] = Some(value.clone());
    }

    fn read_value(&mut self, depth: usize) -> Result<Value, DecodeError> {
        if depth > self.max_depth {
            return Err(DecodeError::DepthExceeded(self.max_depth));
        }
        let offset = self.pos;
        match self.read_u8()? {
            marker::UNDEFINED => Ok(Value::Undefined),
            marker::NULL => Ok(Value::Null),
            marker::FALSE => Ok(Value::Boolean(false)),
            marker::TRUE => Ok(Value::Boolean(true)),
            marker::INTEGER => Ok(Value::Integer(self.read_i29()?)),
            marker::DOUBLE => Ok(Value::Double(self.read_f64()?)),
            marker::STRING => Ok(Value::String(self.read_string()?)),
            marker::XML_DOCUMENT => self.read_xml(true),
            marker::XML => self.read_xml(false),
            marker::DATE => self.read_date(),
            marker::ARRAY => self.read_array(depth),
            marker::OBJECT => self.read_object(depth),
            marker::BYTE_ARRAY => self.read_byte_array(),
            other => Err(DecodeError::UnsupportedMarker {
                marker: other,
                offset,
            }),
        }
    }

    fn read_xml(&mut self, document: bool) -> Result<Value, DecodeError> {
        let header = self.read_u29()?;
        if header & 1 == 0 {
            return self.object_reference(header);
        }
        let slot = self.reserve_slot();
        let text: Arc<str> = Arc::from(self.read_utf8((header >> 1) as usize)?);
        let value = if document {
            Value::XmlDocument(text)
        } else {
            Value::Xml(text)
        };
        self.fill_slot(slot, &value);
        Ok(value)
    }

    fn read_date(&mut self) -> Result<Value, DecodeError> {
        let header = self.read_u29()?;
        if header & 1 == 0 {
            return self.object_reference(header);
        }
        let slot = self.reserve_slot();
        let value = Value::Date(Arc::new(Date::new(self.read_f64()?)));
        self.fill_slot(slot, &value);
        Ok(value)
    }

    fn read_byte_array(&mut self) -> Result<Value, DecodeError> {
        let header = self.read_u29()?;
        if header & 1 == 0 {
            return self.object_reference(header);
        }
        let slot = self.reserve_slot();
        let value = Value::ByteArray(Arc::from(self.read_bytes((header >> 1) as usize)?));
        self.fill_slot(slot, &value);
        Ok(value)
    }

    fn read_array(&mut self, depth: usize) -> Result<Value, DecodeError> {
        let header = self.read_u29()?;
        if header & 1 == 0 {
            return self.object_reference(header);
        }
        let dense_len = (header >> 1) as usize;
        let slot = self.reserve_slot();

        let mut associative = Properties::new();
        loop {
            let key = self.read_string()?;
            if key.is_empty() {
                break;
            }
            let value = self.read_value(depth + 1)?;
            associative.insert(key, value);
        }

        // Every element takes at least one byte; cap the preallocation so a
        // forged length cannot force a huge allocation.
        let mut dense = Vec::with_capacity(dense_len.min(self.remaining()));
        for _ in 0..dense_len {
            dense.push(self.read_value(depth + 1)?);
        }

        let value = Value::Array(Arc::new(Array { associative, dense }));
        self.fill_slot(slot, &value);
        Ok(value)
    }

    fn read_traits(&mut self, header: u32) -> Result<Traits, DecodeError> {
        if header & 0b10 == 0 {
            let index = (header >> 2) as usize;
            return self
                .traits
                .get(index)
                .cloned()
                .ok_or(DecodeError::TraitsReference {
                    index,
                    len: self.traits.len(),
                });
        }

        if header & 0b100 != 0 {
            let traits = Traits::externalizable(self.read_string()?);
            self.traits.push(traits.clone());
            return Ok(traits);
        }

        let dynamic = header & 0b1000 != 0;
        let sealed_count = (header >> 4) as usize;
        let class_name = self.read_string()?;
        let mut sealed = Vec::with_capacity(sealed_count.min(self.remaining()));
        for _ in 0..sealed_count {
            sealed.push(self.read_string()?);
        }

        let traits = Traits {
            class_name,
            sealed,
            dynamic,
            externalizable: false,
        };
        self.traits.push(traits.clone());
        Ok(traits)
    }

    fn read_object(&mut self, depth: usize) -> Result<Value, DecodeError> {
        let header = self.read_u29()?;
        if header & 1 == 0 {
            return self.object_reference(header);
        }
        let slot = self.reserve_slot();
        let traits = self.read_traits(header)?;

        let mut properties = Properties::with_capacity(traits.sealed.len());
        if traits.externalizable {
            if !is_wrapper_class(&traits.class_name) {
                return Err(DecodeError::UnsupportedExternalizable(traits.class_name));
            }
            let source = self.read_value(depth + 1)?;
            properties.insert(EXTERNALIZABLE_SOURCE, source);
        } else {
            for name in &traits.sealed {
                let value = self.read_value(depth + 1)?;
                properties.insert(name.clone(), value);
            }
            if traits.dynamic {
                loop {
                    let key = self.read_string()?;
                    if key.is_empty() {
                        break;
                    }
                    let value = self.read_value(depth + 1)?;
                    properties.insert(key, value);
                }
            }
        }

        let value = Value::Object(Arc::new(Object { traits, properties }));
        self.fill_slot(slot, &value);
        Ok(value)
    }
}
