//! # JSON Bridge
//!
//! Converts between `serde_json` values and `Data` / `Value`.
//!
//! Plain JSON maps one to one: strings, integers, other numbers, booleans
//! and null become `Str`, `Int`, `Float`, `Bool` and `Null`. Scalars JSON
//! cannot express travel as tagged objects:
//!
//! ```json
//! {"__type__": "decimal", "value": "20.40"}
//! {"__type__": "date", "value": "2015-01-01"}
//! {"__type__": "datetime", "value": "2019-05-02T10:30:00"}
//! {"__type__": "bytes", "value": "aW1hZ2U="}
//! {"__type__": "stream", "value": "aW1hZ2U="}
//! ```
//!
//! Byte payloads are base64.

use crate::digester::Data;
use crate::{Blob, Entity, FactGraphError, Value};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde_json::{Map, Number, Value as Json, json};
use std::str::FromStr;

const TYPE_KEY: &str = "__type__";
const VALUE_KEY: &str = "value";

impl Data {
    /// Convert parsed JSON into nested data.
    pub fn from_json(json: &Json) -> Result<Self, FactGraphError> {
        Ok(match json {
            Json::Object(map) if is_tagged(map) => Self::Scalar(tagged_scalar(map)?),
            Json::Object(map) => Self::Map(
                map.iter()
                    .map(|(k, v)| {
                        Self::from_json(v)
                            .map(|data| (k.clone(), data))
                            .map_err(|e| e.for_attribute(k))
                    })
                    .collect::<Result<_, _>>()?,
            ),
            Json::Array(items) => Self::List(
                items
                    .iter()
                    .map(Self::from_json)
                    .collect::<Result<_, _>>()?,
            ),
            scalar => Self::Scalar(value_from_json(scalar)?),
        })
    }

    /// Render as JSON, tagging scalars JSON cannot express.
    #[must_use]
    pub fn to_json(&self) -> Json {
        match self {
            Self::Map(map) => Json::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Self::List(items) => Json::Array(items.iter().map(Self::to_json).collect()),
            Self::Scalar(value) => value_to_json(value),
        }
    }
}

/// Convert a JSON scalar (or tagged object) into a `Value`.
///
/// Arrays and plain objects are not scalars and are rejected.
pub fn value_from_json(json: &Json) -> Result<Value, FactGraphError> {
    Ok(match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::String(s) => Value::Str(s.clone()),
        Json::Number(n) => number(n)?,
        Json::Object(map) if is_tagged(map) => tagged_scalar(map)?,
        Json::Object(_) => return Err(FactGraphError::unsupported("", "object")),
        Json::Array(_) => return Err(FactGraphError::unsupported("", "list")),
    })
}

/// Render a `Value` as JSON.
#[must_use]
pub fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Str(s) => Json::String(s.clone()),
        Value::Int(i) => Json::Number(Number::from(*i)),
        Value::Float(x) => Number::from_f64(*x).map_or(Json::Null, Json::Number),
        Value::Bool(b) => Json::Bool(*b),
        Value::Null => Json::Null,
        Value::Decimal(d) => tagged("decimal", d.to_string()),
        Value::Date(d) => tagged("date", d.format("%Y-%m-%d").to_string()),
        Value::DateTime(dt) => tagged("datetime", dt.format("%Y-%m-%dT%H:%M:%S").to_string()),
        Value::Bytes(b) => tagged("bytes", BASE64.encode(b)),
        Value::Stream(blob) => tagged("stream", BASE64.encode(blob.as_bytes())),
    }
}

/// Render an entity's attributes as a JSON object.
#[must_use]
pub fn entity_to_json(entity: &Entity) -> Json {
    Json::Object(
        entity
            .iter()
            .map(|(k, v)| (k.clone(), value_to_json(v)))
            .collect(),
    )
}

fn tagged(type_name: &str, text: String) -> Json {
    json!({ TYPE_KEY: type_name, VALUE_KEY: text })
}

fn is_tagged(map: &Map<String, Json>) -> bool {
    map.len() == 2 && map.contains_key(TYPE_KEY) && map.contains_key(VALUE_KEY)
}

fn number(n: &Number) -> Result<Value, FactGraphError> {
    if let Some(i) = n.as_i64() {
        return Ok(Value::Int(i));
    }
    if n.is_u64() {
        return Err(FactGraphError::unsupported("", "u64"));
    }
    n.as_f64()
        .map(Value::Float)
        .ok_or_else(|| FactGraphError::unsupported("", "number"))
}

fn tagged_scalar(map: &Map<String, Json>) -> Result<Value, FactGraphError> {
    let type_name = map.get(TYPE_KEY).and_then(Json::as_str).unwrap_or_default();
    let Some(text) = map.get(VALUE_KEY).and_then(Json::as_str) else {
        return Err(FactGraphError::MalformedValue {
            type_name: type_name.to_string(),
            text: map.get(VALUE_KEY).map(Json::to_string).unwrap_or_default(),
        });
    };
    let malformed = || FactGraphError::MalformedValue {
        type_name: type_name.to_string(),
        text: text.to_string(),
    };
    Ok(match type_name {
        "decimal" => Value::Decimal(Decimal::from_str(text).map_err(|_| malformed())?),
        "date" => Value::Date(NaiveDate::from_str(text).map_err(|_| malformed())?),
        "datetime" => {
            let dt = NaiveDateTime::from_str(text)
                .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S"))
                .map_err(|_| malformed())?;
            Value::DateTime(dt)
        }
        "bytes" => Value::Bytes(BASE64.decode(text).map_err(|_| malformed())?),
        "stream" => Value::Stream(Blob::new(BASE64.decode(text).map_err(|_| malformed())?)),
        other => return Err(FactGraphError::unsupported("", other)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_json_maps_to_data() {
        let json = json!({"name": "Joe", "age": 12, "score": 1.5, "ok": true, "tags": ["a", null]});
        let data = Data::from_json(&json).expect("from_json");
        assert_eq!(data.get("name"), Some(&Data::from("Joe")));
        assert_eq!(data.get("age"), Some(&Data::from(12)));
        assert_eq!(data.get("score"), Some(&Data::from(1.5)));
        assert_eq!(data.get("ok"), Some(&Data::from(true)));
        assert_eq!(
            data.get("tags"),
            Some(&Data::list([Data::from("a"), Data::Scalar(Value::Null)]))
        );
        assert_eq!(data.to_json(), json);
    }

    #[test]
    fn tagged_scalars_round_trip() {
        let json = json!({
            "wage": {"__type__": "decimal", "value": "12.10"},
            "born": {"__type__": "date", "value": "1991-01-02"},
            "seen": {"__type__": "datetime", "value": "2019-05-02T10:30:00"},
            "raw": {"__type__": "bytes", "value": "aW1hZ2U="}
        });
        let data = Data::from_json(&json).expect("from_json");
        assert_eq!(
            data.get("wage"),
            Some(&Data::from(Decimal::from_str("12.10").expect("decimal")))
        );
        assert_eq!(
            data.get("raw"),
            Some(&Data::Scalar(Value::Bytes(b"image".to_vec())))
        );
        assert_eq!(data.to_json(), json);
    }

    #[test]
    fn datetime_accepts_space_separator() {
        let json = json!({"__type__": "datetime", "value": "2019-05-02 10:30:00"});
        assert!(matches!(value_from_json(&json), Ok(Value::DateTime(_))));
    }

    #[test]
    fn large_unsigned_is_unsupported() {
        let json = json!({"big": u64::MAX});
        let err = Data::from_json(&json).expect_err("u64");
        assert_eq!(err.to_string(), "unsupported type <type u64> in value \"big\"");
    }

    #[test]
    fn non_scalar_value_is_unsupported() {
        assert!(value_from_json(&json!([1, 2])).is_err());
        assert!(value_from_json(&json!({"a": 1})).is_err());
    }

    #[test]
    fn unknown_tag_is_unsupported() {
        let json = json!({"__type__": "complex", "value": "1+2j"});
        assert!(matches!(
            value_from_json(&json),
            Err(FactGraphError::UnsupportedValueType { .. })
        ));
    }

    #[test]
    fn entity_renders_as_object() {
        let entity = Entity::new().with("name", "Pat").with("score", 5);
        assert_eq!(entity_to_json(&entity), json!({"name": "Pat", "score": 5}));
    }
}
