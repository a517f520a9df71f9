//! Decoding driver rows into [`Value`]s.

use crate::models::value::Value;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::{Column as _, Row as _, TypeInfo as _, ValueRef as _};
use std::error::Error;
use std::fmt::Write as _;
use std::net::IpAddr;
use tokio_postgres::types::{FromSql, Kind, Type};

type BoxError = Box<dyn Error + Sync + Send>;

/// Rows decoded from one statement, with the column names in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedRows {
    /// Column names.
    pub columns: Vec<String>,
    /// Rows, each with one value per column.
    pub rows: Vec<Vec<Value>>,
    /// Whether more rows were available than were read.
    pub truncated: bool,
}

// ========== SQLite ==========

/// Decode one SQLite row.
pub(crate) fn sqlite_row(row: &rusqlite::Row<'_>, width: usize) -> rusqlite::Result<Vec<Value>> {
    (0..width).map(|i| row.get_ref(i).map(Value::from)).collect()
}

// ========== PostgreSQL ==========

/// A PostgreSQL cell decoded by its column type.
///
/// Accepts every type: known scalar types decode natively, NUMERIC,
/// INTERVAL, INET/CIDR and arrays are rendered from their binary form,
/// enums and domains decode as their underlying text, anything else becomes
/// `<type name>`. See [`pg_decodes_natively`].
pub(crate) struct PgCell(pub Value);

impl<'a> FromSql<'a> for PgCell {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        pg_decode(ty, raw).map(PgCell)
    }

    fn from_sql_null(_ty: &Type) -> Result<Self, BoxError> {
        Ok(PgCell(Value::Null))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

fn pg_decode(ty: &Type, raw: &[u8]) -> Result<Value, BoxError> {
    let value = match *ty {
        Type::BOOL => Value::Bool(bool::from_sql(ty, raw)?),
        Type::INT2 => Value::Int(i16::from_sql(ty, raw)?.into()),
        Type::INT4 => Value::Int(i32::from_sql(ty, raw)?.into()),
        Type::INT8 => Value::Int(i64::from_sql(ty, raw)?),
        Type::OID => Value::Int(u32::from_sql(ty, raw)?.into()),
        Type::FLOAT4 => Value::Float(f32::from_sql(ty, raw)?.into()),
        Type::FLOAT8 => Value::Float(f64::from_sql(ty, raw)?),
        Type::NUMERIC => Value::Text(numeric_to_string(raw)?),
        Type::BYTEA => Value::Bytes(Vec::<u8>::from_sql(ty, raw)?),
        Type::DATE => Value::Text(NaiveDate::from_sql(ty, raw)?.to_string()),
        Type::TIME => Value::Text(NaiveTime::from_sql(ty, raw)?.to_string()),
        Type::TIMESTAMP => Value::Text(NaiveDateTime::from_sql(ty, raw)?.to_string()),
        Type::TIMESTAMPTZ => Value::Text(DateTime::<Utc>::from_sql(ty, raw)?.to_rfc3339()),
        Type::UUID => Value::Text(uuid::Uuid::from_sql(ty, raw)?.to_string()),
        Type::JSON | Type::JSONB => {
            Value::Text(serde_json::Value::from_sql(ty, raw)?.to_string())
        }
        Type::INTERVAL => Value::Text(interval_to_string(raw)?),
        Type::INET | Type::CIDR => Value::Text(inet_to_string(*ty == Type::CIDR, raw)?),
        _ if <String as FromSql<'_>>::accepts(ty) => Value::Text(String::from_sql(ty, raw)?),
        _ => match ty.kind() {
            Kind::Enum(_) => Value::Text(String::from_utf8_lossy(raw).into_owned()),
            Kind::Domain(inner) => pg_decode(inner, raw)?,
            Kind::Array(elem) => Value::Text(array_to_string(elem, raw)?),
            _ => Value::Text(format!("<{}>", ty.name())),
        },
    };
    Ok(value)
}

/// Whether [`pg_decode`] renders `ty` faithfully rather than as `<type name>`.
pub(crate) fn pg_decodes_natively(ty: &Type) -> bool {
    match *ty {
        Type::BOOL
        | Type::INT2
        | Type::INT4
        | Type::INT8
        | Type::OID
        | Type::FLOAT4
        | Type::FLOAT8
        | Type::NUMERIC
        | Type::BYTEA
        | Type::DATE
        | Type::TIME
        | Type::TIMESTAMP
        | Type::TIMESTAMPTZ
        | Type::UUID
        | Type::JSON
        | Type::JSONB
        | Type::INTERVAL
        | Type::INET
        | Type::CIDR => true,
        _ if <String as FromSql<'_>>::accepts(ty) => true,
        _ => match ty.kind() {
            Kind::Enum(_) => true,
            Kind::Domain(inner) | Kind::Array(inner) => pg_decodes_natively(inner),
            _ => false,
        },
    }
}

fn read_i32(buf: &mut &[u8]) -> Result<i32, BoxError> {
    let (head, rest) = buf
        .split_first_chunk::<4>()
        .ok_or_else(|| BoxError::from("truncated value"))?;
    *buf = rest;
    Ok(i32::from_be_bytes(*head))
}

/// Render a binary INTERVAL the way the server's default style does,
/// e.g. `1 year 2 mons 3 days 04:05:06.5`.
fn interval_to_string(raw: &[u8]) -> Result<String, BoxError> {
    let micros = raw
        .first_chunk::<8>()
        .map(|b| i64::from_be_bytes(*b))
        .ok_or_else(|| BoxError::from("truncated interval value"))?;
    let mut rest = &raw[8..];
    let days = read_i32(&mut rest)?;
    let months = read_i32(&mut rest)?;

    let mut parts = Vec::new();
    let mut unit = |n: i32, name: &str| {
        if n != 0 {
            let plural = if n.abs() == 1 { "" } else { "s" };
            parts.push(format!("{n} {name}{plural}"));
        }
    };
    unit(months / 12, "year");
    unit(months % 12, "mon");
    unit(days, "day");

    if micros != 0 || parts.is_empty() {
        let sign = if micros < 0 { "-" } else { "" };
        let abs = micros.unsigned_abs();
        let (secs, frac) = (abs / 1_000_000, abs % 1_000_000);
        let mut time =
            format!("{sign}{:02}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60);
        if frac != 0 {
            write!(time, ".{frac:06}")?;
            let kept = time.trim_end_matches('0').len();
            time.truncate(kept);
        }
        parts.push(time);
    }
    Ok(parts.join(" "))
}

/// Render a binary INET or CIDR value. INET omits a full-length mask.
fn inet_to_string(is_cidr_type: bool, raw: &[u8]) -> Result<String, BoxError> {
    let [family, bits, _is_cidr, _len, addr @ ..] = raw else {
        return Err("truncated inet value".into());
    };
    let (addr, max_bits): (IpAddr, u8) = match (*family, addr.len()) {
        (2, 4) => (IpAddr::from(<[u8; 4]>::try_from(addr)?), 32),
        (3, 16) => (IpAddr::from(<[u8; 16]>::try_from(addr)?), 128),
        _ => return Err("invalid inet value".into()),
    };
    if is_cidr_type || *bits != max_bits {
        Ok(format!("{addr}/{bits}"))
    } else {
        Ok(addr.to_string())
    }
}

/// Render a binary array as an array literal, e.g. `{1,2,NULL}` or
/// `{{a,"b c"},{d,e}}`.
fn array_to_string(elem: &Type, raw: &[u8]) -> Result<String, BoxError> {
    let mut buf = raw;
    let ndim = usize::try_from(read_i32(&mut buf)?)?;
    let _has_nulls = read_i32(&mut buf)?;
    let _elem_oid = read_i32(&mut buf)?;
    let dims = (0..ndim)
        .map(|_| {
            let len = usize::try_from(read_i32(&mut buf)?)?;
            let _lower_bound = read_i32(&mut buf)?;
            Ok(len)
        })
        .collect::<Result<Vec<usize>, BoxError>>()?;

    let mut out = String::new();
    if dims.is_empty() {
        out.push_str("{}");
    } else {
        write_array_level(elem, &dims, &mut buf, &mut out)?;
    }
    Ok(out)
}

fn write_array_level(
    elem: &Type,
    dims: &[usize],
    buf: &mut &[u8],
    out: &mut String,
) -> Result<(), BoxError> {
    let Some((len, inner)) = dims.split_first() else {
        return Ok(());
    };
    out.push('{');
    for i in 0..*len {
        if i > 0 {
            out.push(',');
        }
        if !inner.is_empty() {
            write_array_level(elem, inner, buf, out)?;
            continue;
        }
        let item_len = read_i32(buf)?;
        let Ok(item_len) = usize::try_from(item_len) else {
            out.push_str("NULL");
            continue;
        };
        if buf.len() < item_len {
            return Err("truncated array value".into());
        }
        let (item, rest) = buf.split_at(item_len);
        *buf = rest;
        push_array_item(out, &pg_decode(elem, item)?.to_string());
    }
    out.push('}');
    Ok(())
}

fn push_array_item(out: &mut String, item: &str) {
    let needs_quotes = item.is_empty()
        || item.eq_ignore_ascii_case("NULL")
        || item
            .chars()
            .any(|c| matches!(c, '{' | '}' | ',' | '"' | '\\') || c.is_whitespace());
    if !needs_quotes {
        out.push_str(item);
        return;
    }
    out.push('"');
    for c in item.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
}

/// Render a binary NUMERIC value as decimal text.
fn numeric_to_string(raw: &[u8]) -> Result<String, BoxError> {
    const NUMERIC_NEG: u16 = 0x4000;
    const NUMERIC_NAN: u16 = 0xC000;
    const NUMERIC_PINF: u16 = 0xD000;
    const NUMERIC_NINF: u16 = 0xF000;

    let word = |i: usize| -> Result<[u8; 2], BoxError> {
        raw.get(i..i + 2)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| "truncated numeric value".into())
    };

    let ndigits = usize::from(u16::from_be_bytes(word(0)?));
    let weight = i32::from(i16::from_be_bytes(word(2)?));
    let sign = u16::from_be_bytes(word(4)?);
    let dscale = usize::from(u16::from_be_bytes(word(6)?));

    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        _ => {}
    }

    let digits = (0..ndigits)
        .map(|i| word(8 + 2 * i).map(i16::from_be_bytes))
        .collect::<Result<Vec<_>, _>>()?;
    let digit = |i: i32| -> i16 {
        usize::try_from(i).ok().and_then(|i| digits.get(i).copied()).unwrap_or(0)
    };

    let mut out = String::new();
    if sign == NUMERIC_NEG {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        for i in 0..=weight {
            if i == 0 {
                write!(out, "{}", digit(i))?;
            } else {
                write!(out, "{:04}", digit(i))?;
            }
        }
    }
    if dscale > 0 {
        let mut frac = String::with_capacity(dscale + 4);
        let mut i = weight + 1;
        while frac.len() < dscale {
            write!(frac, "{:04}", digit(i))?;
            i += 1;
        }
        frac.truncate(dscale);
        out.push('.');
        out.push_str(&frac);
    }
    Ok(out)
}

/// Decode one PostgreSQL row.
pub(crate) fn pg_row(row: &tokio_postgres::Row) -> Result<Vec<Value>, tokio_postgres::Error> {
    (0..row.len()).map(|i| row.try_get::<_, PgCell>(i).map(|c| c.0)).collect()
}

/// Decode one PostgreSQL row read over the simple query protocol.
pub(crate) fn pg_text_row(row: &tokio_postgres::SimpleQueryRow) -> Vec<Value> {
    (0..row.len())
        .map(|i| row.get(i).map_or(Value::Null, |s| Value::Text(s.to_string())))
        .collect()
}

// ========== MySQL ==========

/// Decode one MySQL row.
pub(crate) fn mysql_row(row: &sqlx::mysql::MySqlRow) -> Vec<Value> {
    (0..row.columns().len()).map(|i| mysql_cell(row, i)).collect()
}

fn mysql_cell(row: &sqlx::mysql::MySqlRow, idx: usize) -> Value {
    match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(_) => {}
        Err(_) => return Value::Null,
    }

    let type_name = row.columns()[idx].type_info().name().to_string();
    let decoded = match type_name.as_str() {
        "BOOLEAN" => row.try_get::<bool, _>(idx).ok().map(Value::Bool),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            row.try_get::<i64, _>(idx).ok().map(Value::Int)
        }
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => row.try_get::<u64, _>(idx).ok().map(|v| {
            i64::try_from(v).map(Value::Int).unwrap_or_else(|_| Value::Text(v.to_string()))
        }),
        "YEAR" => row.try_get_unchecked::<u16, _>(idx).ok().map(|v| Value::Int(v.into())),
        "FLOAT" => row.try_get::<f32, _>(idx).ok().map(|v| Value::Float(v.into())),
        "DOUBLE" => row.try_get::<f64, _>(idx).ok().map(Value::Float),
        "DATE" => row.try_get::<NaiveDate, _>(idx).ok().map(|v| Value::Text(v.to_string())),
        "TIME" => row.try_get::<NaiveTime, _>(idx).ok().map(|v| Value::Text(v.to_string())),
        "DATETIME" => {
            row.try_get::<NaiveDateTime, _>(idx).ok().map(|v| Value::Text(v.to_string()))
        }
        "TIMESTAMP" => row
            .try_get::<DateTime<Utc>, _>(idx)
            .ok()
            .map(|v| Value::Text(v.naive_utc().to_string())),
        "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
            row.try_get::<Vec<u8>, _>(idx).ok().map(Value::Bytes)
        }
        _ => None,
    };

    decoded
        .or_else(|| row.try_get::<String, _>(idx).ok().map(Value::Text))
        // DECIMAL, JSON, ENUM, SET travel as text on the wire.
        .or_else(|| row.try_get_unchecked::<String, _>(idx).ok().map(Value::Text))
        .or_else(|| {
            row.try_get_unchecked::<Vec<u8>, _>(idx)
                .ok()
                .map(|b| Value::Text(String::from_utf8_lossy(&b).into_owned()))
        })
        .unwrap_or_else(|| Value::Text(format!("<{type_name}>")))
}

/// Column names of a MySQL row.
pub(crate) fn mysql_columns(row: &sqlx::mysql::MySqlRow) -> Vec<String> {
    row.columns().iter().map(|c| c.name().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric(weight: i16, sign: u16, dscale: u16, digits: &[i16]) -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&(digits.len() as u16).to_be_bytes());
        raw.extend_from_slice(&weight.to_be_bytes());
        raw.extend_from_slice(&sign.to_be_bytes());
        raw.extend_from_slice(&dscale.to_be_bytes());
        for d in digits {
            raw.extend_from_slice(&d.to_be_bytes());
        }
        raw
    }

    #[test]
    fn test_numeric_to_string() {
        assert_eq!(numeric_to_string(&numeric(0, 0, 1, &[12, 5000])).unwrap(), "12.5");
        assert_eq!(numeric_to_string(&numeric(-1, 0x4000, 2, &[500])).unwrap(), "-0.05");
        assert_eq!(numeric_to_string(&numeric(1, 0, 0, &[1, 2345])).unwrap(), "12345");
        assert_eq!(numeric_to_string(&numeric(-2, 0, 5, &[1000])).unwrap(), "0.00001");
        assert_eq!(numeric_to_string(&numeric(0, 0, 2, &[])).unwrap(), "0.00");
        assert_eq!(numeric_to_string(&numeric(0, 0xC000, 0, &[])).unwrap(), "NaN");
        assert!(numeric_to_string(&[0, 1]).is_err());
    }

    #[test]
    fn test_pg_decode_scalars() {
        assert_eq!(pg_decode(&Type::INT4, &42i32.to_be_bytes()).unwrap(), Value::Int(42));
        assert_eq!(pg_decode(&Type::BOOL, &[1]).unwrap(), Value::Bool(true));
        assert_eq!(pg_decode(&Type::TEXT, b"hello").unwrap(), Value::Text("hello".into()));
        assert_eq!(pg_decode(&Type::BYTEA, b"\x00\x01").unwrap(), Value::Bytes(vec![0, 1]));
        assert_eq!(
            pg_decode(&Type::MONEY, &1250i64.to_be_bytes()).unwrap(),
            Value::Text("<money>".into())
        );
    }

    fn interval(micros: i64, days: i32, months: i32) -> Vec<u8> {
        let mut raw = micros.to_be_bytes().to_vec();
        raw.extend_from_slice(&days.to_be_bytes());
        raw.extend_from_slice(&months.to_be_bytes());
        raw
    }

    #[test]
    fn test_pg_decode_interval() {
        let text = |raw: Vec<u8>| pg_decode(&Type::INTERVAL, &raw).unwrap().to_string();
        let hms = (4 * 3600 + 5 * 60 + 6) * 1_000_000;
        assert_eq!(text(interval(hms, 3, 14)), "1 year 2 mons 3 days 04:05:06");
        assert_eq!(text(interval(0, 1, 0)), "1 day");
        assert_eq!(text(interval(1_500_000, 0, 0)), "00:00:01.5");
        assert_eq!(text(interval(-90 * 1_000_000, 0, 0)), "-00:01:30");
        assert_eq!(text(interval(0, 0, 0)), "00:00:00");
        assert!(pg_decode(&Type::INTERVAL, &[0u8; 12]).is_err());
    }

    #[test]
    fn test_pg_decode_inet() {
        let v4 = [2, 32, 0, 4, 10, 0, 0, 1];
        assert_eq!(pg_decode(&Type::INET, &v4).unwrap().to_string(), "10.0.0.1");
        let net = [2, 24, 1, 4, 192, 168, 1, 0];
        assert_eq!(pg_decode(&Type::CIDR, &net).unwrap().to_string(), "192.168.1.0/24");
        let mut v6 = vec![3, 128, 0, 16];
        v6.extend_from_slice(&std::net::Ipv6Addr::LOCALHOST.octets());
        assert_eq!(pg_decode(&Type::INET, &v6).unwrap().to_string(), "::1");
    }

    fn array(elem_oid: u32, dims: &[i32], items: &[Option<&[u8]>]) -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&(dims.len() as i32).to_be_bytes());
        raw.extend_from_slice(&i32::from(items.iter().any(Option::is_none)).to_be_bytes());
        raw.extend_from_slice(&elem_oid.to_be_bytes());
        for len in dims {
            raw.extend_from_slice(&len.to_be_bytes());
            raw.extend_from_slice(&1i32.to_be_bytes());
        }
        for item in items {
            match item {
                Some(bytes) => {
                    raw.extend_from_slice(&(bytes.len() as i32).to_be_bytes());
                    raw.extend_from_slice(bytes);
                }
                None => raw.extend_from_slice(&(-1i32).to_be_bytes()),
            }
        }
        raw
    }

    #[test]
    fn test_pg_decode_arrays() {
        let one = 1i32.to_be_bytes();
        let two = 2i32.to_be_bytes();
        let ints = array(
            Type::INT4.oid(),
            &[3],
            &[Some(one.as_slice()), None, Some(two.as_slice())],
        );
        assert_eq!(
            pg_decode(&Type::INT4_ARRAY, &ints).unwrap(),
            Value::Text("{1,NULL,2}".into())
        );

        let tags = array(
            Type::TEXT.oid(),
            &[2, 2],
            &[
                Some(b"a".as_slice()),
                Some(b"b c".as_slice()),
                Some(br#"say "hi""#.as_slice()),
                Some(b"".as_slice()),
            ],
        );
        assert_eq!(
            pg_decode(&Type::TEXT_ARRAY, &tags).unwrap().to_string(),
            r#"{{a,"b c"},{"say \"hi\"",""}}"#
        );

        let empty = array(Type::INT4.oid(), &[], &[]);
        assert_eq!(pg_decode(&Type::INT4_ARRAY, &empty).unwrap().to_string(), "{}");
    }

    #[test]
    fn test_pg_decodes_natively() {
        assert!(pg_decodes_natively(&Type::INT4));
        assert!(pg_decodes_natively(&Type::VARCHAR));
        assert!(pg_decodes_natively(&Type::INTERVAL));
        assert!(pg_decodes_natively(&Type::TEXT_ARRAY));
        assert!(!pg_decodes_natively(&Type::MONEY));
        assert!(!pg_decodes_natively(&Type::TIMETZ));
        assert!(!pg_decodes_natively(&Type::INT4_RANGE));
    }

    #[test]
    fn test_pg_cell_null() {
        assert_eq!(PgCell::from_sql_null(&Type::INT4).unwrap().0, Value::Null);
    }

    #[test]
    fn test_sqlite_row_decoding() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let mut stmt = conn.prepare("SELECT 1, 'a', NULL, X'6869', 2.5").unwrap();
        let values = stmt.query_row([], |row| sqlite_row(row, 5)).unwrap();
        assert_eq!(
            values,
            vec![
                Value::Int(1),
                Value::Text("a".into()),
                Value::Null,
                Value::Bytes(b"hi".to_vec()),
                Value::Float(2.5),
            ]
        );
    }
}
