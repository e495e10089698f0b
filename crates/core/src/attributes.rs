//! Typed, nestable attribute container
//!
//! An [`AttributeSet`] maps string keys to one of a closed set of value
//! kinds. Strings, blobs and arrays carry an explicit null state that is
//! distinct from "empty", so `Some(String::new())` and `None` survive an
//! encode/decode cycle as different values.

use std::collections::BTreeMap;

// ============================================================================
// Type codes
// ============================================================================

/// Wire type code for `i32` values
pub const TYPE_INT: i32 = 0;
/// Wire type code for `i64` values
pub const TYPE_LONG: i32 = 1;
/// Wire type code for `f64` values
pub const TYPE_DOUBLE: i32 = 2;
/// Wire type code for strings
pub const TYPE_STRING: i32 = 3;
/// Wire type code for binary blobs
pub const TYPE_BLOB: i32 = 4;
/// Wire type code for nested attribute sets
pub const TYPE_ATTRIBUTE_SET: i32 = 5;
/// Wire type code for `i32` arrays
pub const TYPE_INT_ARRAY: i32 = 6;
/// Wire type code for `i64` arrays
pub const TYPE_LONG_ARRAY: i32 = 7;
/// Wire type code for `f64` arrays
pub const TYPE_DOUBLE_ARRAY: i32 = 8;
/// Wire type code for string arrays
pub const TYPE_STRING_ARRAY: i32 = 9;
/// Wire type code for blob arrays
pub const TYPE_BLOB_ARRAY: i32 = 10;

/// A single attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// 32-bit signed integer
    Int(i32),
    /// 64-bit signed integer
    Long(i64),
    /// 64-bit float
    Double(f64),
    /// Nullable UTF-8 string
    String(Option<String>),
    /// Nullable binary blob
    Blob(Option<Vec<u8>>),
    /// Nested attribute set
    Attributes(AttributeSet),
    /// Nullable `i32` array
    IntArray(Option<Vec<i32>>),
    /// Nullable `i64` array
    LongArray(Option<Vec<i64>>),
    /// Nullable `f64` array
    DoubleArray(Option<Vec<f64>>),
    /// Nullable array of nullable strings
    StringArray(Option<Vec<Option<String>>>),
    /// Nullable array of nullable blobs
    BlobArray(Option<Vec<Option<Vec<u8>>>>),
}

impl AttributeValue {
    /// Wire type code of this value
    pub fn type_code(&self) -> i32 {
        match self {
            AttributeValue::Int(_) => TYPE_INT,
            AttributeValue::Long(_) => TYPE_LONG,
            AttributeValue::Double(_) => TYPE_DOUBLE,
            AttributeValue::String(_) => TYPE_STRING,
            AttributeValue::Blob(_) => TYPE_BLOB,
            AttributeValue::Attributes(_) => TYPE_ATTRIBUTE_SET,
            AttributeValue::IntArray(_) => TYPE_INT_ARRAY,
            AttributeValue::LongArray(_) => TYPE_LONG_ARRAY,
            AttributeValue::DoubleArray(_) => TYPE_DOUBLE_ARRAY,
            AttributeValue::StringArray(_) => TYPE_STRING_ARRAY,
            AttributeValue::BlobArray(_) => TYPE_BLOB_ARRAY,
        }
    }
}

/// Unordered key/value attribute container
///
/// Iteration order is by key, which keeps encodings deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeSet {
    values: BTreeMap<String, AttributeValue>,
}

impl AttributeSet {
    /// Create an empty attribute set
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value, replacing any value currently stored under `key`
    pub fn set(&mut self, key: impl Into<String>, value: AttributeValue) {
        self.values.insert(key.into(), value);
    }

    /// Builder-style [`set`](Self::set)
    pub fn with(mut self, key: impl Into<String>, value: AttributeValue) -> Self {
        self.set(key, value);
        self
    }

    /// Set an `i32` value
    pub fn set_int(&mut self, key: impl Into<String>, value: i32) {
        self.set(key, AttributeValue::Int(value));
    }

    /// Set an `i64` value
    pub fn set_long(&mut self, key: impl Into<String>, value: i64) {
        self.set(key, AttributeValue::Long(value));
    }

    /// Set an `f64` value
    pub fn set_double(&mut self, key: impl Into<String>, value: f64) {
        self.set(key, AttributeValue::Double(value));
    }

    /// Set a nullable string value
    pub fn set_string(&mut self, key: impl Into<String>, value: Option<String>) {
        self.set(key, AttributeValue::String(value));
    }

    /// Set a nested attribute set
    pub fn set_attributes(&mut self, key: impl Into<String>, value: AttributeSet) {
        self.set(key, AttributeValue::Attributes(value));
    }

    /// Get the value stored under `key`
    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.values.get(key)
    }

    /// Get an `i32` value, `None` if absent or of another type
    pub fn get_int(&self, key: &str) -> Option<i32> {
        match self.values.get(key) {
            Some(AttributeValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    /// Get an `i64` value, `None` if absent or of another type
    pub fn get_long(&self, key: &str) -> Option<i64> {
        match self.values.get(key) {
            Some(AttributeValue::Long(v)) => Some(*v),
            _ => None,
        }
    }

    /// Get an `f64` value, `None` if absent or of another type
    pub fn get_double(&self, key: &str) -> Option<f64> {
        match self.values.get(key) {
            Some(AttributeValue::Double(v)) => Some(*v),
            _ => None,
        }
    }

    /// Get a non-null string value
    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.values.get(key) {
            Some(AttributeValue::String(Some(v))) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Get a nested attribute set
    pub fn get_attributes(&self, key: &str) -> Option<&AttributeSet> {
        match self.values.get(key) {
            Some(AttributeValue::Attributes(v)) => Some(v),
            _ => None,
        }
    }

    /// Check whether a value is stored under `key`
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Remove and return the value stored under `key`
    pub fn remove(&mut self, key: &str) -> Option<AttributeValue> {
        self.values.remove(key)
    }

    /// Copy every entry of `other` into this set, replacing existing keys
    pub fn merge(&mut self, other: &AttributeSet) {
        for (k, v) in other.iter() {
            self.values.insert(k.to_string(), v.clone());
        }
    }

    /// Iterate over entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterate over keys in order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the set has no entries
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, AttributeValue)> for AttributeSet {
    fn from_iter<I: IntoIterator<Item = (String, AttributeValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_replaces_value_of_other_type() {
        let mut attrs = AttributeSet::new();
        attrs.set_int("lanes", 2);
        attrs.set_string("lanes", Some("two".to_string()));
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs.get_int("lanes"), None);
        assert_eq!(attrs.get_string("lanes"), Some("two"));
    }

    #[test]
    fn test_null_string_differs_from_empty() {
        let mut a = AttributeSet::new();
        a.set_string("s", None);
        let mut b = AttributeSet::new();
        b.set_string("s", Some(String::new()));
        assert_ne!(a, b);
        assert_eq!(a.get_string("s"), None);
        assert_eq!(b.get_string("s"), Some(""));
    }

    #[test]
    fn test_merge_adds_and_replaces() {
        let mut base = AttributeSet::new();
        base.set_int("lanes", 2);
        base.set_string("surface", Some("asphalt".to_string()));

        let mut update = AttributeSet::new();
        update.set_int("lanes", 3);
        update.set_double("width", 7.5);

        base.merge(&update);
        assert_eq!(base.get_int("lanes"), Some(3));
        assert_eq!(base.get_string("surface"), Some("asphalt"));
        assert_eq!(base.get_double("width"), Some(7.5));
    }

    #[test]
    fn test_type_codes_cover_all_kinds() {
        let values = [
            AttributeValue::Int(0),
            AttributeValue::Long(0),
            AttributeValue::Double(0.0),
            AttributeValue::String(None),
            AttributeValue::Blob(None),
            AttributeValue::Attributes(AttributeSet::new()),
            AttributeValue::IntArray(None),
            AttributeValue::LongArray(None),
            AttributeValue::DoubleArray(None),
            AttributeValue::StringArray(None),
            AttributeValue::BlobArray(None),
        ];
        let codes: Vec<i32> = values.iter().map(AttributeValue::type_code).collect();
        assert_eq!(codes, (0..=10).collect::<Vec<_>>());
    }

    #[test]
    fn test_nested_lookup() {
        let inner = AttributeSet::new().with("depth", AttributeValue::Int(1));
        let outer = AttributeSet::new().with("inner", AttributeValue::Attributes(inner));
        assert_eq!(
            outer.get_attributes("inner").and_then(|a| a.get_int("depth")),
            Some(1)
        );
    }
}
