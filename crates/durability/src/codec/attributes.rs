//! Attribute-set blob encoding
//!
//! ## Format
//!
//! All integers are big-endian.
//!
//! ```text
//! set     := version:i32 (=1) count:i32 entry*
//! entry   := schema_id:i32 payload
//! string  := len:i32 (-1 = null) utf8[len]
//! blob    := len:i32 (-1 = null) bytes[len]
//! array   := count:i32 (-1 = null) element*
//! ```
//!
//! Scalars are fixed width and nested sets recurse with their own header. A
//! set count has no null marker; `-1` there is rejected as corrupt.
//! Keys and type codes are not stored inline: each entry names a schema id,
//! and the [`AttributeSchema`] maps it back to `(key, type code)`. A key
//! reused with a different type gets a secondary id, so both encodings stay
//! decodable.

use std::io::{Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use featuredb_core::attributes::{
    TYPE_ATTRIBUTE_SET, TYPE_BLOB, TYPE_BLOB_ARRAY, TYPE_DOUBLE, TYPE_DOUBLE_ARRAY, TYPE_INT,
    TYPE_INT_ARRAY, TYPE_LONG, TYPE_LONG_ARRAY, TYPE_STRING, TYPE_STRING_ARRAY,
};
use featuredb_core::{AttributeSet, AttributeValue};
use rustc_hash::{FxHashMap, FxHashSet};

use super::traits::CodecError;

/// Format version written at the head of every set
pub const ATTRIBUTES_VERSION: i32 = 1;

const CODEC_ID: &str = "attributes";

/// Nested sets deeper than this are rejected as corrupt
const MAX_DEPTH: usize = 64;

// ============================================================================
// Schema registry
// ============================================================================

/// Registry entry: what a schema id stands for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaEntry {
    /// Attribute key
    pub key: String,
    /// Wire type code
    pub type_code: i32,
}

/// Bidirectional `(key, type code)` ↔ schema id mapping
#[derive(Debug, Clone, Default)]
pub struct AttributeSchema {
    ids: FxHashMap<(String, i32), i32>,
    entries: FxHashMap<i32, SchemaEntry>,
}

impl AttributeSchema {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `id` stands for `(key, type_code)`
    pub fn register(&mut self, id: i32, key: impl Into<String>, type_code: i32) {
        let key = key.into();
        self.ids.insert((key.clone(), type_code), id);
        self.entries.insert(id, SchemaEntry { key, type_code });
    }

    /// Schema id of `(key, type_code)`
    pub fn id_of(&self, key: &str, type_code: i32) -> Option<i32> {
        self.ids.get(&(key.to_string(), type_code)).copied()
    }

    /// Entry behind a schema id
    pub fn entry(&self, id: i32) -> Option<&SchemaEntry> {
        self.entries.get(&id)
    }

    /// Every id registered for `key`, ascending
    pub fn ids_for_key(&self, key: &str) -> Vec<i32> {
        let mut ids: Vec<i32> = self
            .entries
            .iter()
            .filter(|(_, e)| e.key == key)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Smallest id above every registered one
    pub fn next_id(&self) -> i32 {
        self.entries.keys().max().map_or(1, |max| max + 1)
    }

    /// `(key, type code)` pairs in `attributes`, nested sets included, that
    /// have no id yet, in first-encounter order
    pub fn unregistered(&self, attributes: &AttributeSet) -> Vec<(String, i32)> {
        let mut seen = FxHashSet::default();
        let mut missing = Vec::new();
        self.collect_unregistered(attributes, &mut seen, &mut missing);
        missing
    }

    fn collect_unregistered(
        &self,
        attributes: &AttributeSet,
        seen: &mut FxHashSet<(String, i32)>,
        missing: &mut Vec<(String, i32)>,
    ) {
        for (key, value) in attributes.iter() {
            let pair = (key.to_string(), value.type_code());
            if !self.ids.contains_key(&pair) && seen.insert(pair.clone()) {
                missing.push(pair);
            }
            if let AttributeValue::Attributes(nested) = value {
                self.collect_unregistered(nested, seen, missing);
            }
        }
    }

    /// Number of registered ids
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget every entry
    pub fn clear(&mut self) {
        self.ids.clear();
        self.entries.clear();
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Encode `attributes`; every key must already be registered
pub fn encode(attributes: &AttributeSet, schema: &AttributeSchema) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::with_capacity(16 + attributes.len() * 16);
    write_set(&mut buf, attributes, schema)?;
    Ok(buf)
}

fn write_set(buf: &mut Vec<u8>, set: &AttributeSet, schema: &AttributeSchema) -> Result<(), CodecError> {
    write_i32(buf, ATTRIBUTES_VERSION)?;
    write_i32(buf, length(set.len())?)?;
    for (key, value) in set.iter() {
        let type_code = value.type_code();
        let id = schema
            .id_of(key, type_code)
            .ok_or_else(|| CodecError::UnregisteredKey {
                key: key.to_string(),
                type_code,
            })?;
        write_i32(buf, id)?;
        write_value(buf, value, schema)?;
    }
    Ok(())
}

fn write_value(buf: &mut Vec<u8>, value: &AttributeValue, schema: &AttributeSchema) -> Result<(), CodecError> {
    match value {
        AttributeValue::Int(v) => write_i32(buf, *v),
        AttributeValue::Long(v) => buf.write_i64::<BigEndian>(*v).map_err(io_encode),
        AttributeValue::Double(v) => buf.write_f64::<BigEndian>(*v).map_err(io_encode),
        AttributeValue::String(v) => write_bytes(buf, v.as_ref().map(String::as_bytes)),
        AttributeValue::Blob(v) => write_bytes(buf, v.as_deref()),
        AttributeValue::Attributes(nested) => write_set(buf, nested, schema),
        AttributeValue::IntArray(v) => write_array(buf, v.as_deref(), |buf, x| write_i32(buf, *x)),
        AttributeValue::LongArray(v) => write_array(buf, v.as_deref(), |buf, x| {
            buf.write_i64::<BigEndian>(*x).map_err(io_encode)
        }),
        AttributeValue::DoubleArray(v) => write_array(buf, v.as_deref(), |buf, x| {
            buf.write_f64::<BigEndian>(*x).map_err(io_encode)
        }),
        AttributeValue::StringArray(v) => write_array(buf, v.as_deref(), |buf, s| {
            write_bytes(buf, s.as_ref().map(String::as_bytes))
        }),
        AttributeValue::BlobArray(v) => {
            write_array(buf, v.as_deref(), |buf, b| write_bytes(buf, b.as_deref()))
        }
    }
}

fn write_array<T>(
    buf: &mut Vec<u8>,
    items: Option<&[T]>,
    mut write: impl FnMut(&mut Vec<u8>, &T) -> Result<(), CodecError>,
) -> Result<(), CodecError> {
    match items {
        None => write_i32(buf, -1),
        Some(items) => {
            write_i32(buf, length(items.len())?)?;
            items.iter().try_for_each(|item| write(buf, item))
        }
    }
}

fn write_bytes(buf: &mut Vec<u8>, bytes: Option<&[u8]>) -> Result<(), CodecError> {
    match bytes {
        None => write_i32(buf, -1),
        Some(bytes) => {
            write_i32(buf, length(bytes.len())?)?;
            buf.extend_from_slice(bytes);
            Ok(())
        }
    }
}

fn write_i32(buf: &mut Vec<u8>, v: i32) -> Result<(), CodecError> {
    buf.write_i32::<BigEndian>(v).map_err(io_encode)
}

fn length(len: usize) -> Result<i32, CodecError> {
    i32::try_from(len).map_err(|_| CodecError::encode(format!("length {} exceeds i32", len), CODEC_ID))
}

fn io_encode(e: std::io::Error) -> CodecError {
    CodecError::encode(e.to_string(), CODEC_ID)
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode a blob written by [`encode`]
pub fn decode(data: &[u8], schema: &AttributeSchema) -> Result<AttributeSet, CodecError> {
    let mut reader = Reader {
        cursor: Cursor::new(data),
        len: data.len(),
    };
    let set = reader.set(schema, 0)?;
    if reader.remaining() != 0 {
        return Err(reader.corrupt(format!("{} trailing bytes", reader.remaining())));
    }
    Ok(set)
}

struct Reader<'a> {
    cursor: Cursor<&'a [u8]>,
    len: usize,
}

impl Reader<'_> {
    fn set(&mut self, schema: &AttributeSchema, depth: usize) -> Result<AttributeSet, CodecError> {
        if depth > MAX_DEPTH {
            return Err(self.corrupt("attribute sets nested too deeply"));
        }
        let version = self.i32()?;
        if version != ATTRIBUTES_VERSION {
            return Err(self.corrupt(format!("unsupported version {}", version)));
        }
        // sets are never null, unlike strings, blobs and arrays
        let Some(count) = self.count()? else {
            return Err(self.corrupt("null attribute set"));
        };
        let mut set = AttributeSet::new();
        for _ in 0..count {
            let id = self.i32()?;
            let entry = schema.entry(id).ok_or(CodecError::UnknownSchemaId(id))?;
            let value = self.value(entry.type_code, schema, depth)?;
            set.set(entry.key.clone(), value);
        }
        Ok(set)
    }

    fn value(&mut self, type_code: i32, schema: &AttributeSchema, depth: usize) -> Result<AttributeValue, CodecError> {
        Ok(match type_code {
            TYPE_INT => AttributeValue::Int(self.i32()?),
            TYPE_LONG => AttributeValue::Long(self.i64()?),
            TYPE_DOUBLE => AttributeValue::Double(self.f64()?),
            TYPE_STRING => AttributeValue::String(self.string()?),
            TYPE_BLOB => AttributeValue::Blob(self.bytes()?),
            TYPE_ATTRIBUTE_SET => AttributeValue::Attributes(self.set(schema, depth + 1)?),
            TYPE_INT_ARRAY => AttributeValue::IntArray(self.array(|r| r.i32())?),
            TYPE_LONG_ARRAY => AttributeValue::LongArray(self.array(|r| r.i64())?),
            TYPE_DOUBLE_ARRAY => AttributeValue::DoubleArray(self.array(|r| r.f64())?),
            TYPE_STRING_ARRAY => AttributeValue::StringArray(self.array(|r| r.string())?),
            TYPE_BLOB_ARRAY => AttributeValue::BlobArray(self.array(|r| r.bytes())?),
            other => return Err(self.corrupt(format!("unknown type code {}", other))),
        })
    }

    fn array<T>(
        &mut self,
        mut read: impl FnMut(&mut Self) -> Result<T, CodecError>,
    ) -> Result<Option<Vec<T>>, CodecError> {
        let Some(count) = self.count()? else {
            return Ok(None);
        };
        // every element takes at least one byte
        if count > self.remaining() {
            return Err(self.truncated());
        }
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(read(self)?);
        }
        Ok(Some(items))
    }

    fn string(&mut self) -> Result<Option<String>, CodecError> {
        match self.bytes()? {
            None => Ok(None),
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| self.corrupt(e.to_string())),
        }
    }

    fn bytes(&mut self) -> Result<Option<Vec<u8>>, CodecError> {
        let Some(len) = self.count()? else {
            return Ok(None);
        };
        if len > self.remaining() {
            return Err(self.truncated());
        }
        let mut bytes = vec![0u8; len];
        self.cursor.read_exact(&mut bytes).map_err(|_| self.truncated())?;
        Ok(Some(bytes))
    }

    /// Length or count prefix; `None` for the null marker
    fn count(&mut self) -> Result<Option<usize>, CodecError> {
        match self.i32()? {
            -1 => Ok(None),
            n if n < 0 => Err(self.corrupt(format!("negative length {}", n))),
            n => Ok(Some(n as usize)),
        }
    }

    fn i32(&mut self) -> Result<i32, CodecError> {
        self.cursor.read_i32::<BigEndian>().map_err(|_| self.truncated())
    }

    fn i64(&mut self) -> Result<i64, CodecError> {
        self.cursor.read_i64::<BigEndian>().map_err(|_| self.truncated())
    }

    fn f64(&mut self) -> Result<f64, CodecError> {
        self.cursor.read_f64::<BigEndian>().map_err(|_| self.truncated())
    }

    fn remaining(&self) -> usize {
        self.len.saturating_sub(self.cursor.position() as usize)
    }

    fn truncated(&self) -> CodecError {
        self.corrupt(format!("truncated at offset {}", self.cursor.position()))
    }

    fn corrupt(&self, detail: impl Into<String>) -> CodecError {
        CodecError::decode(detail, CODEC_ID, self.len)
    }
}
