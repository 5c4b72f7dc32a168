//! # Value Codec
//!
//! Converts scalar `Value`s to a persistable `(TypeTag, text)` pair and back.
//!
//! - Decimals keep their exact base-10 text
//! - Dates and datetimes use fixed-width text read back at fixed offsets
//! - Booleans are `"1"`/`"0"`; `"True"` also decodes as true
//! - Byte sequences are base64
//! - Streams persist as their bucket key; resolving that key back into bytes
//!   is the fact store's job, so `decode` rejects the `stream` tag

use crate::primitives::{DATE_WIDTH, DATETIME_WIDTH};
use crate::{FactGraphError, Value};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

/// Persisted type tag of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Str,
    Bytes,
    Int,
    Float,
    Decimal,
    Date,
    DateTime,
    Bool,
    None,
    Stream,
}

impl TypeTag {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Str => "str",
            Self::Bytes => "bytes",
            Self::Int => "int",
            Self::Float => "float",
            Self::Decimal => "decimal",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Bool => "bool",
            Self::None => "none",
            Self::Stream => "stream",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TypeTag {
    type Err = FactGraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "str" => Self::Str,
            "bytes" => Self::Bytes,
            "int" => Self::Int,
            "float" => Self::Float,
            "decimal" => Self::Decimal,
            "date" => Self::Date,
            "datetime" => Self::DateTime,
            "bool" => Self::Bool,
            "none" => Self::None,
            "stream" => Self::Stream,
            other => return Err(FactGraphError::unsupported("", other)),
        })
    }
}

/// The tag a value would be persisted under.
#[must_use]
pub fn type_tag(value: &Value) -> TypeTag {
    match value {
        Value::Str(_) => TypeTag::Str,
        Value::Bytes(_) => TypeTag::Bytes,
        Value::Int(_) => TypeTag::Int,
        Value::Float(_) => TypeTag::Float,
        Value::Decimal(_) => TypeTag::Decimal,
        Value::Date(_) => TypeTag::Date,
        Value::DateTime(_) => TypeTag::DateTime,
        Value::Bool(_) => TypeTag::Bool,
        Value::Null => TypeTag::None,
        Value::Stream(_) => TypeTag::Stream,
    }
}

/// Encode a value to its persisted form.
///
/// A stream encodes only after it has been written to a bucket (its blob
/// carries a key); a fresh stream is `UnsupportedValueType`. Dates outside
/// years 1..=9999 cannot be written at fixed width and are rejected.
pub fn encode(value: &Value) -> Result<(TypeTag, String), FactGraphError> {
    let tag = type_tag(value);
    let text = match value {
        Value::Str(s) => s.clone(),
        Value::Bytes(b) => BASE64.encode(b),
        Value::Int(i) => i.to_string(),
        Value::Float(x) => x.to_string(),
        Value::Decimal(d) => d.to_string(),
        Value::Date(d) => {
            check_year(d.year(), tag, value)?;
            d.format("%Y-%m-%d").to_string()
        }
        Value::DateTime(dt) => {
            check_year(dt.year(), tag, value)?;
            dt.format("%Y-%m-%d %H:%M:%S").to_string()
        }
        Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        Value::Null => String::new(),
        Value::Stream(blob) => blob
            .key()
            .map(str::to_string)
            .ok_or_else(|| FactGraphError::unsupported("", "stream"))?,
    };
    Ok((tag, text))
}

/// Decode persisted text back into a value of the tagged type.
pub fn decode(tag: TypeTag, text: &str) -> Result<Value, FactGraphError> {
    let malformed = || FactGraphError::MalformedValue {
        type_name: tag.as_str().to_string(),
        text: text.to_string(),
    };
    Ok(match tag {
        TypeTag::Str => Value::Str(text.to_string()),
        TypeTag::Bytes => Value::Bytes(BASE64.decode(text).map_err(|_| malformed())?),
        TypeTag::Int => Value::Int(text.parse().map_err(|_| malformed())?),
        TypeTag::Float => Value::Float(text.parse().map_err(|_| malformed())?),
        TypeTag::Decimal => Value::Decimal(Decimal::from_str(text).map_err(|_| malformed())?),
        TypeTag::Date => Value::Date(parse_date(text).ok_or_else(malformed)?),
        TypeTag::DateTime => Value::DateTime(parse_datetime(text).ok_or_else(malformed)?),
        TypeTag::Bool => Value::Bool(text == "1" || text == "True"),
        TypeTag::None => Value::Null,
        TypeTag::Stream => return Err(FactGraphError::unsupported("", "stream")),
    })
}

/// Comparison key for index lookups.
///
/// Values that compare equal produce the same key: decimals are normalised
/// so `5` and `5.0` collide, and negative zero folds into zero.
pub fn index_key(value: &Value) -> Result<String, FactGraphError> {
    let (tag, text) = match value {
        Value::Decimal(d) => (TypeTag::Decimal, d.normalize().to_string()),
        Value::Float(x) if *x == 0.0 => (TypeTag::Float, "0".to_string()),
        other => encode(other)?,
    };
    Ok(format!("{tag}:{text}"))
}

/// Index key of a stream stored under `bucket_key`.
#[must_use]
pub fn stream_key(bucket_key: &str) -> String {
    format!("{}:{bucket_key}", TypeTag::Stream)
}

/// The value as it reads back after a write: datetimes lose sub-second
/// precision. Streams and null pass through unchanged.
pub fn normalize(value: &Value) -> Result<Value, FactGraphError> {
    match value {
        Value::Null | Value::Stream(_) => Ok(value.clone()),
        _ => {
            let (tag, text) = encode(value)?;
            decode(tag, &text)
        }
    }
}

/// Whether two values are the same stored value, compared by index key.
///
/// NaN equals NaN, `5` equals `5.0` as decimals, and values that cannot be
/// encoded equal nothing.
pub fn same_value(a: &Value, b: &Value) -> bool {
    match (index_key(a), index_key(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn check_year(year: i32, tag: TypeTag, value: &Value) -> Result<(), FactGraphError> {
    if (1..=9999).contains(&year) {
        Ok(())
    } else {
        Err(FactGraphError::MalformedValue {
            type_name: tag.as_str().to_string(),
            text: value.to_string(),
        })
    }
}

fn field<T: FromStr>(text: &str, start: usize, end: usize) -> Option<T> {
    text.get(start..end)?.parse().ok()
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    if text.len() < DATE_WIDTH {
        return None;
    }
    NaiveDate::from_ymd_opt(field(text, 0, 4)?, field(text, 5, 7)?, field(text, 8, 10)?)
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    if text.len() < DATETIME_WIDTH {
        return None;
    }
    parse_date(text)?.and_hms_opt(
        field(text, 11, 13)?,
        field(text, 14, 16)?,
        field(text, 17, 19)?,
    )
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Blob;

    fn roundtrip(value: Value) -> Value {
        let (tag, text) = encode(&value).expect("encode");
        decode(tag, &text).expect("decode")
    }

    #[test]
    fn decimal_keeps_exact_text() {
        let value = Value::Decimal(Decimal::from_str("2.40").expect("decimal"));
        let (tag, text) = encode(&value).expect("encode");
        assert_eq!(tag, TypeTag::Decimal);
        assert_eq!(text, "2.40");
        assert_eq!(roundtrip(value.clone()), value);
    }

    #[test]
    fn date_is_fixed_width() {
        let date = NaiveDate::from_ymd_opt(21, 1, 2).expect("date");
        let (_, text) = encode(&Value::Date(date)).expect("encode");
        assert_eq!(text, "0021-01-02");
        assert_eq!(roundtrip(Value::Date(date)), Value::Date(date));
    }

    #[test]
    fn datetime_truncates_to_seconds() {
        let dt = NaiveDate::from_ymd_opt(2021, 1, 1)
            .and_then(|d| d.and_hms_milli_opt(12, 10, 1, 999))
            .expect("datetime");
        let (tag, text) = encode(&Value::DateTime(dt)).expect("encode");
        assert_eq!(tag, TypeTag::DateTime);
        assert_eq!(text, "2021-01-01 12:10:01");

        let expected = NaiveDate::from_ymd_opt(2021, 1, 1)
            .and_then(|d| d.and_hms_opt(12, 10, 1))
            .expect("datetime");
        assert_eq!(decode(tag, &text).expect("decode"), Value::DateTime(expected));
    }

    #[test]
    fn out_of_range_year_rejected_at_write() {
        let date = NaiveDate::from_ymd_opt(10_000, 1, 1).expect("date");
        assert!(matches!(
            encode(&Value::Date(date)),
            Err(FactGraphError::MalformedValue { .. })
        ));
    }

    #[test]
    fn bool_accepts_legacy_true() {
        assert_eq!(decode(TypeTag::Bool, "1").expect("decode"), Value::Bool(true));
        assert_eq!(decode(TypeTag::Bool, "True").expect("decode"), Value::Bool(true));
        assert_eq!(decode(TypeTag::Bool, "0").expect("decode"), Value::Bool(false));
        assert_eq!(encode(&Value::Bool(false)).expect("encode").1, "0");
    }

    #[test]
    fn bytes_survive_arbitrary_content() {
        let bytes: Vec<u8> = (0..=255).collect();
        assert_eq!(roundtrip(Value::Bytes(bytes.clone())), Value::Bytes(bytes));
    }

    #[test]
    fn float_roundtrip_is_exact() {
        for x in [1.245, 22.1, -0.5, 1e300, f64::MIN_POSITIVE] {
            assert_eq!(roundtrip(Value::Float(x)), Value::Float(x));
        }
    }

    #[test]
    fn unknown_tag_is_unsupported() {
        let err = TypeTag::from_str("complex").expect_err("unknown tag");
        assert!(matches!(
            err,
            FactGraphError::UnsupportedValueType { ref type_name, .. } if type_name == "complex"
        ));
    }

    #[test]
    fn malformed_int_reports_text() {
        let err = decode(TypeTag::Int, "twelve").expect_err("malformed");
        assert_eq!(err.to_string(), "malformed int value: \"twelve\"");
    }

    #[test]
    fn fresh_stream_cannot_encode() {
        let value = Value::Stream(Blob::new(b"abc".to_vec()));
        assert!(matches!(
            encode(&value),
            Err(FactGraphError::UnsupportedValueType { .. })
        ));
        let stored = Value::Stream(Blob::stored("k1", b"abc".to_vec()));
        assert_eq!(encode(&stored).expect("encode"), (TypeTag::Stream, "k1".to_string()));
    }

    #[test]
    fn index_key_normalises_equal_values() {
        let five = Value::Decimal(Decimal::from_str("5").expect("decimal"));
        let five_point_zero = Value::Decimal(Decimal::from_str("5.0").expect("decimal"));
        assert_eq!(five, five_point_zero);
        assert_eq!(
            index_key(&five).expect("key"),
            index_key(&five_point_zero).expect("key")
        );
        assert_ne!(
            index_key(&Value::Int(12)).expect("key"),
            index_key(&Value::Str("12".into())).expect("key")
        );
    }

    #[test]
    fn tag_names_match_value_type_names() {
        let values = [
            Value::Str(String::new()),
            Value::Bytes(Vec::new()),
            Value::Int(0),
            Value::Float(0.0),
            Value::Decimal(Decimal::ZERO),
            Value::Null,
            Value::Bool(true),
        ];
        for value in values {
            assert_eq!(type_tag(&value).as_str(), value.type_name());
            assert_eq!(TypeTag::from_str(value.type_name()).expect("tag"), type_tag(&value));
        }
    }

    #[test]
    fn normalize_matches_read_back() {
        let dt = NaiveDate::from_ymd_opt(2020, 6, 1)
            .and_then(|d| d.and_hms_milli_opt(12, 0, 0, 500))
            .expect("datetime");
        let whole = NaiveDate::from_ymd_opt(2020, 6, 1)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .expect("datetime");
        assert_eq!(
            normalize(&Value::DateTime(dt)).expect("normalize"),
            Value::DateTime(whole)
        );
        assert_eq!(normalize(&Value::Null).expect("normalize"), Value::Null);
        assert!(normalize(&Value::Float(f64::NAN)).is_ok());
    }

    #[test]
    fn same_value_compares_stored_form() {
        let nan = Value::Float(f64::NAN);
        assert!(same_value(&nan, &nan));
        assert!(same_value(&Value::Float(-0.0), &Value::Float(0.0)));
        assert!(!same_value(&Value::Int(12), &Value::Float(12.0)));
        let fresh = Value::Stream(Blob::new(b"abc".to_vec()));
        assert!(!same_value(&fresh, &fresh));
    }
}
