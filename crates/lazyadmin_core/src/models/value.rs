//! Cell and parameter values.
//!
//! [`Value`] is the single currency between callers and every driver: it is
//! what gets bound into placeholders and what fetched cells decode into.

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use tokio_postgres::types::{Format, IsNull, ToSql, Type};

/// Placeholder shown for SQL NULL.
pub const NULL_DISPLAY: &str = "NULL";

/// A single SQL value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// Boolean.
    Bool(bool),
    /// Any integer type.
    Int(i64),
    /// Any floating-point type.
    Float(f64),
    /// Text, and anything rendered as text by the driver.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
}

/// A row keyed by exact column name.
pub type Record = HashMap<String, Value>;

impl Value {
    /// Check for SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Render for display. NULL becomes [`NULL_DISPLAY`], bytes are decoded
    /// as (lossy) UTF-8.
    pub fn to_display(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str(NULL_DISPLAY),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
            Self::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
        }
    }
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
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

// ========== SQLite ==========

impl rusqlite::ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        use rusqlite::types::{ToSqlOutput, Value as SqlValue, ValueRef};

        Ok(match self {
            Self::Null => ToSqlOutput::Owned(SqlValue::Null),
            Self::Bool(b) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*b))),
            Self::Int(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            Self::Float(v) => ToSqlOutput::Owned(SqlValue::Real(*v)),
            Self::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Self::Bytes(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

impl From<rusqlite::types::ValueRef<'_>> for Value {
    fn from(value: rusqlite::types::ValueRef<'_>) -> Self {
        use rusqlite::types::ValueRef;

        match value {
            ValueRef::Null => Self::Null,
            ValueRef::Integer(i) => Self::Int(i),
            ValueRef::Real(v) => Self::Float(v),
            ValueRef::Text(t) => Self::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Self::Bytes(b.to_vec()),
        }
    }
}

// ========== PostgreSQL ==========

type BoxError = Box<dyn Error + Sync + Send>;

/// Binds a [`Value`] to whatever type the server inferred for the placeholder.
///
/// Common scalar types are encoded in binary, parsing text input into the
/// target type. Every other type (NUMERIC, INTERVAL, INET, MONEY, arrays,
/// enums, ...) is sent in text format and coerced by the server.
impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        if self.is_null() {
            return Ok(IsNull::Yes);
        }

        match *ty {
            Type::BOOL => self.as_pg_bool()?.to_sql(ty, out),
            Type::INT2 => i16::try_from(self.as_pg_int()?)?.to_sql(ty, out),
            Type::INT4 => i32::try_from(self.as_pg_int()?)?.to_sql(ty, out),
            Type::INT8 => self.as_pg_int()?.to_sql(ty, out),
            Type::OID => u32::try_from(self.as_pg_int()?)?.to_sql(ty, out),
            Type::FLOAT4 => (self.as_pg_float()? as f32).to_sql(ty, out),
            Type::FLOAT8 => self.as_pg_float()?.to_sql(ty, out),
            Type::BYTEA => match self {
                Self::Bytes(b) => b.as_slice().to_sql(ty, out),
                other => other.to_string().into_bytes().to_sql(ty, out),
            },
            Type::DATE => self.text()?.trim().parse::<NaiveDate>()?.to_sql(ty, out),
            Type::TIME => self.text()?.trim().parse::<NaiveTime>()?.to_sql(ty, out),
            Type::TIMESTAMP => parse_naive_datetime(&self.text()?)?.to_sql(ty, out),
            Type::TIMESTAMPTZ => parse_datetime_utc(&self.text()?)?.to_sql(ty, out),
            Type::UUID => uuid::Uuid::parse_str(self.text()?.trim())?.to_sql(ty, out),
            Type::JSON | Type::JSONB => {
                let json = match self {
                    Self::Text(s) => serde_json::from_str(s)
                        .unwrap_or_else(|_| serde_json::Value::String(s.clone())),
                    Self::Bool(b) => serde_json::Value::Bool(*b),
                    Self::Int(i) => serde_json::Value::from(*i),
                    Self::Float(v) => serde_json::Value::from(*v),
                    other => serde_json::Value::String(other.to_string()),
                };
                json.to_sql(ty, out)
            }
            // Text format, see encode_format
            _ => {
                out.extend_from_slice(self.text()?.as_bytes());
                Ok(IsNull::No)
            }
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    fn encode_format(&self, ty: &Type) -> Format {
        if binds_natively(ty) {
            Format::Binary
        } else {
            Format::Text
        }
    }

    tokio_postgres::types::to_sql_checked!();
}

/// Types with a binary encoding arm in [`Value::to_sql`].
fn binds_natively(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::BOOL
            | Type::INT2
            | Type::INT4
            | Type::INT8
            | Type::OID
            | Type::FLOAT4
            | Type::FLOAT8
            | Type::BYTEA
            | Type::DATE
            | Type::TIME
            | Type::TIMESTAMP
            | Type::TIMESTAMPTZ
            | Type::UUID
            | Type::JSON
            | Type::JSONB
    )
}

impl Value {
    fn text(&self) -> Result<std::borrow::Cow<'_, str>, BoxError> {
        match self {
            Self::Text(s) => Ok(std::borrow::Cow::Borrowed(s.as_str())),
            Self::Bytes(b) => Ok(String::from_utf8_lossy(b)),
            other => Ok(std::borrow::Cow::Owned(other.to_string())),
        }
    }

    fn as_pg_bool(&self) -> Result<bool, BoxError> {
        match self {
            Self::Bool(b) => Ok(*b),
            Self::Int(i) => Ok(*i != 0),
            other => match other.text()?.trim().to_lowercase().as_str() {
                "t" | "true" | "1" | "yes" | "y" | "on" => Ok(true),
                "f" | "false" | "0" | "no" | "n" | "off" => Ok(false),
                s => Err(format!("invalid boolean value: {s:?}").into()),
            },
        }
    }

    fn as_pg_int(&self) -> Result<i64, BoxError> {
        match self {
            Self::Int(i) => Ok(*i),
            Self::Bool(b) => Ok(i64::from(*b)),
            Self::Float(v) if v.fract() == 0.0 => Ok(*v as i64),
            other => Ok(other.text()?.trim().parse::<i64>()?),
        }
    }

    fn as_pg_float(&self) -> Result<f64, BoxError> {
        match self {
            Self::Float(v) => Ok(*v),
            Self::Int(i) => Ok(*i as f64),
            other => Ok(other.text()?.trim().parse::<f64>()?),
        }
    }
}

fn parse_naive_datetime(s: &str) -> Result<NaiveDateTime, BoxError> {
    let s = s.trim();
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(dt);
        }
    }
    let date = s.parse::<NaiveDate>()?;
    Ok(date.and_time(NaiveTime::MIN))
}

fn parse_datetime_utc(s: &str) -> Result<DateTime<Utc>, BoxError> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%d %H:%M:%S%.f %z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, format) {
            return Ok(dt.with_timezone(&Utc));
        }
    }
    // No offset given: treat as UTC.
    Ok(parse_naive_datetime(s)?.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Value::Null.to_display(), "NULL");
        assert_eq!(Value::Int(42).to_display(), "42");
        assert_eq!(Value::Bool(true).to_display(), "true");
        assert_eq!(Value::Text("a@b.com".into()).to_display(), "a@b.com");
        assert_eq!(Value::Bytes(b"raw text".to_vec()).to_display(), "raw text");
        assert_eq!(Value::Float(1.5).to_display(), "1.5");
    }

    #[test]
    fn test_from_option() {
        assert_eq!(Value::from(None::<String>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Text("x".into()));
        assert_eq!(Value::from(7_i32), Value::Int(7));
    }

    #[test]
    fn test_pg_coercions() {
        assert_eq!(Value::Text(" 12 ".into()).as_pg_int().unwrap(), 12);
        assert!(Value::Text("twelve".into()).as_pg_int().is_err());
        assert!(Value::Text("yes".into()).as_pg_bool().unwrap());
        assert!(!Value::Text("f".into()).as_pg_bool().unwrap());
        assert_eq!(Value::Int(3).as_pg_float().unwrap(), 3.0);
    }

    #[test]
    fn test_pg_to_sql_int4_from_text() {
        let mut buf = BytesMut::new();
        let is_null = Value::Text("258".into()).to_sql(&Type::INT4, &mut buf).unwrap();
        assert!(matches!(is_null, IsNull::No));
        assert_eq!(&buf[..], &258_i32.to_be_bytes());
    }

    #[test]
    fn test_pg_to_sql_numeric_uses_text_format() {
        let mut buf = BytesMut::new();
        let price = Value::Text("12.50".into());
        let is_null = price.to_sql_checked(&Type::NUMERIC, &mut buf).unwrap();
        assert!(matches!(is_null, IsNull::No));
        assert_eq!(&buf[..], b"12.50");
        assert!(matches!(price.encode_format(&Type::NUMERIC), Format::Text));

        let mut buf = BytesMut::new();
        Value::Int(5).to_sql_checked(&Type::NUMERIC, &mut buf).unwrap();
        assert_eq!(&buf[..], b"5");
    }

    #[test]
    fn test_pg_to_sql_interval_and_arrays_use_text_format() {
        let mut buf = BytesMut::new();
        let interval = Value::Text("1 day".into());
        interval.to_sql_checked(&Type::INTERVAL, &mut buf).unwrap();
        assert_eq!(&buf[..], b"1 day");
        assert!(matches!(interval.encode_format(&Type::INTERVAL), Format::Text));

        let tags = Value::Text("{a,b}".into());
        assert!(matches!(tags.encode_format(&Type::TEXT_ARRAY), Format::Text));
        assert!(matches!(tags.encode_format(&Type::INET), Format::Text));
    }

    #[test]
    fn test_pg_native_types_stay_binary() {
        let v = Value::Int(1);
        assert!(matches!(v.encode_format(&Type::INT4), Format::Binary));
        assert!(matches!(v.encode_format(&Type::JSONB), Format::Binary));
        assert!(matches!(v.encode_format(&Type::TIMESTAMPTZ), Format::Binary));
    }

    #[test]
    fn test_pg_to_sql_null() {
        let mut buf = BytesMut::new();
        let is_null = Value::Null.to_sql(&Type::INT4, &mut buf).unwrap();
        assert!(matches!(is_null, IsNull::Yes));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_pg_to_sql_int2_overflow_is_error() {
        let mut buf = BytesMut::new();
        assert!(Value::Int(70_000).to_sql(&Type::INT2, &mut buf).is_err());
    }

    #[test]
    fn test_parse_timestamps() {
        let dt = parse_naive_datetime("2024-03-01 10:20:30").unwrap();
        assert_eq!(dt.to_string(), "2024-03-01 10:20:30");
        let dt = parse_naive_datetime("2024-03-01").unwrap();
        assert_eq!(dt.to_string(), "2024-03-01 00:00:00");
        let utc = parse_datetime_utc("2024-03-01T10:20:30+02:00").unwrap();
        assert_eq!(utc.to_rfc3339(), "2024-03-01T08:20:30+00:00");
    }

    #[test]
    fn test_sqlite_value_ref_roundtrip() {
        use rusqlite::types::ValueRef;
        assert_eq!(Value::from(ValueRef::Null), Value::Null);
        assert_eq!(Value::from(ValueRef::Integer(5)), Value::Int(5));
        assert_eq!(Value::from(ValueRef::Text(b"hi")), Value::Text("hi".into()));
        assert_eq!(Value::from(ValueRef::Blob(b"\x01")), Value::Bytes(vec![1]));
    }
}
