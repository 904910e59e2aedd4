//! Schema-agnostic row representation
//!
//! A [`Record`] maps column names to scalar [`Value`]s. The store never models
//! entity-specific schemas; typed views are produced on demand with
//! [`Record::decode`].

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};

use super::error::{RepositoryError, RepositoryOperation};

/// A single scalar column value
///
/// # Example
///
/// ```rust
/// use karat_store::repository::Value;
///
/// let code: Value = "N-001".into();
/// let price: Value = 100.0.into();
/// let missing: Value = Option::<i64>::None.into();
///
/// assert_eq!(code.as_str(), Some("N-001"));
/// assert_eq!(price.as_f64(), Some(100.0));
/// assert!(missing.is_null());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL
    Null,
    /// Boolean (stored as 0/1 in SQLite)
    Bool(bool),
    /// 64-bit integer
    Integer(i64),
    /// 64-bit float
    Real(f64),
    /// Text
    Text(String),
    /// UTC timestamp, bound as RFC 3339 text
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// Whether this is SQL NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Integer view; booleans widen to 0/1
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            Self::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Numeric view; integers widen to floats
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Real(n) => Some(*n),
            Self::Integer(n) => Some(*n as f64),
            _ => None,
        }
    }

    /// Text view
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean view; integers are truthy when non-zero
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Integer(n) => Some(*n != 0),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Integer(n) => write!(f, "{}", n),
            Self::Real(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "{}", s),
            Self::Timestamp(ts) => write!(f, "{}", format_timestamp(ts)),
        }
    }
}

/// Canonical timestamp text used for every stored timestamp
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Integer(i64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Self::Integer(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Real(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(ts: DateTime<Utc>) -> Self {
        Self::Timestamp(ts)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Integer(n) => serializer.serialize_i64(*n),
            Self::Real(n) => serializer.serialize_f64(*n),
            Self::Text(s) => serializer.serialize_str(s),
            Self::Timestamp(ts) => serializer.serialize_str(&format_timestamp(ts)),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        match json {
            serde_json::Value::Null => Ok(Self::Null),
            serde_json::Value::Bool(b) => Ok(Self::Bool(b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(Self::Integer(i)),
                None => n
                    .as_f64()
                    .map(Self::Real)
                    .ok_or_else(|| serde::de::Error::custom("number out of range")),
            },
            serde_json::Value::String(s) => Ok(Self::Text(s)),
            other => Err(serde::de::Error::custom(format!(
                "expected a scalar value, found {}",
                other
            ))),
        }
    }
}

/// One row: column name to scalar value
///
/// Column order is lexical, which keeps generated INSERT/UPDATE statements
/// deterministic for a given set of columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(BTreeMap<String, Value>);

impl Record {
    /// Create an empty record
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style insert
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(column.into(), value.into());
        self
    }

    /// Insert or replace a column value
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(column.into(), value.into())
    }

    /// Insert only when `value` is present; `None` leaves the record untouched
    pub fn set_opt<V: Into<Value>>(&mut self, column: impl Into<String>, value: Option<V>) {
        if let Some(value) = value {
            self.0.insert(column.into(), value.into());
        }
    }

    /// Look up a column value
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    /// Remove a column
    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.0.remove(column)
    }

    /// Integer column shorthand
    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(Value::as_i64)
    }

    /// Text column shorthand
    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(Value::as_str)
    }

    /// Whether the column is present
    pub fn contains(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    /// Column names in iteration order
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Column/value pairs in iteration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the record has no columns
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Deserialize into a typed view
    ///
    /// # Errors
    ///
    /// Returns a `ValidationFailed` error when the record does not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, RepositoryError> {
        let json = serde_json::to_value(self).map_err(|e| {
            RepositoryError::validation_failed(format!("record is not serializable: {}", e))
                .with_operation(RepositoryOperation::Decode)
        })?;
        serde_json::from_value(json).map_err(|e| {
            RepositoryError::validation_failed(format!("record does not match model: {}", e))
                .with_operation(RepositoryOperation::Decode)
        })
    }

    /// Map a driver row back to a record
    ///
    /// SQLite is dynamically typed, so the value's runtime storage class
    /// decides the variant.
    pub(crate) fn from_row(row: &SqliteRow) -> Result<Self, RepositoryError> {
        let mut record = Self::new();
        for column in row.columns() {
            let index = column.ordinal();
            let raw = row.try_get_raw(index)?;
            let value = if raw.is_null() {
                Value::Null
            } else {
                let storage = raw.type_info().name().to_string();
                match storage.as_str() {
                    "INTEGER" | "BOOLEAN" | "INT4" => Value::Integer(row.try_get_unchecked(index)?),
                    "REAL" | "NUMERIC" => Value::Real(row.try_get_unchecked(index)?),
                    "BLOB" => {
                        return Err(RepositoryError::validation_failed(format!(
                            "column '{}' holds a BLOB, which records do not carry",
                            column.name()
                        ))
                        .with_operation(RepositoryOperation::Decode));
                    }
                    _ => Value::Text(row.try_get_unchecked(index)?),
                }
            };
            record.set(column.name(), value);
        }
        Ok(record)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Serde helper for boolean columns that SQLite hands back as 0/1
pub fn bool_from_int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Bool(b) => Ok(b),
        serde_json::Value::Number(n) => Ok(n.as_i64().map_or(false, |n| n != 0)),
        other => Err(serde::de::Error::custom(format!(
            "expected boolean or integer, found {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Piece {
        id: i64,
        code: String,
        sale_price: f64,
        #[serde(deserialize_with = "bool_from_int")]
        is_active: bool,
        note: Option<String>,
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::from("x"), Value::Text("x".to_string()));
        assert_eq!(Value::from(3_i32), Value::Integer(3));
        assert_eq!(Value::from(Some(2.5)), Value::Real(2.5));
        assert_eq!(Value::from(Option::<String>::None), Value::Null);
        assert_eq!(Value::Integer(1).as_bool(), Some(true));
        assert_eq!(Value::Integer(7).as_f64(), Some(7.0));
    }

    #[test]
    fn test_timestamp_formatting() {
        let ts = DateTime::parse_from_rfc3339("2024-05-01T10:20:30.5Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(format_timestamp(&ts), "2024-05-01T10:20:30.500Z");
        assert_eq!(Value::from(ts).to_string(), "2024-05-01T10:20:30.500Z");
    }

    #[test]
    fn test_set_opt_skips_none() {
        let mut record = Record::new();
        record.set_opt("code", Some("R-1"));
        record.set_opt::<i64>("vendor_id", None);
        assert!(record.contains("code"));
        assert!(!record.contains("vendor_id"));
    }

    #[test]
    fn test_columns_are_ordered() {
        let record = Record::new().with("name", "Ring").with("code", "R-1").with("id", 1);
        let columns: Vec<&str> = record.columns().collect();
        assert_eq!(columns, vec!["code", "id", "name"]);
    }

    #[test]
    fn test_decode_coerces_sqlite_shapes() {
        let record = Record::new()
            .with("id", 4)
            .with("code", "N-001")
            .with("sale_price", 100)
            .with("is_active", 1)
            .with("note", Value::Null);
        let piece: Piece = record.decode().unwrap();
        assert_eq!(piece.id, 4);
        assert_eq!(piece.code, "N-001");
        assert_eq!(piece.sale_price, 100.0);
        assert!(piece.is_active);
        assert!(piece.note.is_none());
    }

    #[test]
    fn test_decode_reports_mismatch() {
        let record = Record::new().with("id", "not-a-number");
        let err = record.decode::<Piece>().unwrap_err();
        assert_eq!(err.kind, crate::repository::RepositoryErrorKind::ValidationFailed);
    }

    #[test]
    fn test_record_serializes_as_flat_object() {
        let record = Record::new().with("code", "R-1").with("weight", 1.5);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json, serde_json::json!({"code": "R-1", "weight": 1.5}));
    }
}
