//! Document value types.
//!
//! A [`Value`] is a closed tagged union covering every shape a stored document
//! field can take, including the provider-specific [`Timestamp`].

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};

/// Field map of a document body.
pub type Fields = BTreeMap<String, Value>;

/// An instant in time, stored in UTC with nanosecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// The current instant.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Wrap a chrono datetime.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Parse an ISO-8601 / RFC 3339 string.
    pub fn parse(s: &str) -> Option<Self> {
        DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| Self(dt.with_timezone(&Utc)))
    }

    /// Format as RFC 3339, keeping as many fractional digits as needed.
    pub fn to_iso_string(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }

    /// The wrapped chrono datetime.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_iso_string())
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

/// Declared type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeTag {
    /// UTF-8 string.
    String,
    /// Integer or floating point number.
    Number,
    /// Boolean.
    Boolean,
    /// Provider timestamp.
    Timestamp,
    /// Nested object or list.
    Object,
    /// Null. Only ever produced at runtime, never declared.
    Null,
}

impl TypeTag {
    /// Lowercase name used in validation messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeTag::String => "string",
            TypeTag::Number => "number",
            TypeTag::Boolean => "boolean",
            TypeTag::Timestamp => "timestamp",
            TypeTag::Object => "object",
            TypeTag::Null => "null",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A document field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit floating point.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Provider timestamp.
    Timestamp(Timestamp),
    /// Ordered list of values.
    List(Vec<Value>),
    /// Nested object.
    Object(Fields),
}

impl Value {
    /// Runtime type tag of this value.
    ///
    /// Lists and objects both report [`TypeTag::Object`].
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::Null => TypeTag::Null,
            Value::Bool(_) => TypeTag::Boolean,
            Value::Integer(_) | Value::Float(_) => TypeTag::Number,
            Value::String(_) => TypeTag::String,
            Value::Timestamp(_) => TypeTag::Timestamp,
            Value::List(_) | Value::Object(_) => TypeTag::Object,
        }
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get as bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as a number, widening integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Try to get as string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as timestamp.
    pub fn as_timestamp(&self) -> Option<&Timestamp> {
        match self {
            Value::Timestamp(t) => Some(t),
            _ => None,
        }
    }

    /// Try to get as list.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Try to get as object.
    pub fn as_object(&self) -> Option<&Fields> {
        match self {
            Value::Object(fields) => Some(fields),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{}", s),
            Value::Timestamp(t) => write!(f, "{}", t),
            Value::List(_) | Value::Object(_) => {
                write!(f, "{}", crate::serializer::serialize(self))
            }
        }
    }
}

// Conversion implementations
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Timestamp> for Value {
    fn from(v: Timestamp) -> Self {
        Value::Timestamp(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<Fields> for Value {
    fn from(v: Fields) -> Self {
        Value::Object(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

/// A stored document: identity plus body.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Document id, unique within its collection.
    pub id: String,
    /// Document body.
    pub fields: Fields,
}

impl Document {
    /// Create a document.
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Get a field by name.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

/// Build a [`Fields`] map from `(name, value)` pairs.
pub fn fields<K, V, I>(pairs: I) -> Fields
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Generate a new document id.
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_tags() {
        assert_eq!(Value::from(true).type_tag(), TypeTag::Boolean);
        assert_eq!(Value::from(3).type_tag(), TypeTag::Number);
        assert_eq!(Value::from(2.5).type_tag(), TypeTag::Number);
        assert_eq!(Value::from("x").type_tag(), TypeTag::String);
        assert_eq!(Value::from(Timestamp::now()).type_tag(), TypeTag::Timestamp);
        assert_eq!(Value::List(vec![]).type_tag(), TypeTag::Object);
        assert_eq!(Value::Object(Fields::new()).type_tag(), TypeTag::Object);
        assert_eq!(Value::Null.type_tag(), TypeTag::Null);
    }

    #[test]
    fn test_timestamp_iso_roundtrip() {
        let ts = Timestamp::parse("2025-01-15T10:30:00.123456789Z").unwrap();
        assert_eq!(ts.to_iso_string(), "2025-01-15T10:30:00.123456789Z");
        assert_eq!(Timestamp::parse(&ts.to_iso_string()), Some(ts));
    }

    #[test]
    fn test_timestamp_parse_offset() {
        let ts = Timestamp::parse("2025-01-15T12:00:00+02:00").unwrap();
        assert_eq!(ts.to_iso_string(), "2025-01-15T10:00:00Z");
        assert!(Timestamp::parse("not a date").is_none());
    }

    #[test]
    fn test_as_f64_widens_integers() {
        assert_eq!(Value::Integer(40).as_f64(), Some(40.0));
        assert_eq!(Value::from("40").as_f64(), None);
    }

    #[test]
    fn test_generate_id_unique() {
        let a = generate_id();
        let b = generate_id();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }
}
