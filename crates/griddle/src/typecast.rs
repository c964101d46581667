//! Save/load conversion between in-memory typed values and their wire
//! representation. Every backend goes through these two functions so type
//! fidelity (dates, booleans, money rounding, JSON fields) is identical
//! regardless of where a row is stored.

use crate::Field;

use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use griddle_core::{Error, FieldType, Result, Row, Value};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Converts a typed in-memory value into its storage representation.
pub(crate) fn save_value(field: &Field, value: &Value) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }

    match field.field_type() {
        FieldType::String | FieldType::Text => Ok(Value::String(stringify(value)?)),
        FieldType::Integer => Ok(Value::I64(to_i64(value)?)),
        FieldType::Float => Ok(Value::F64(to_f64(value)?)),
        FieldType::Money => Ok(Value::F64(round_money(to_f64(value)?))),
        FieldType::Boolean => {
            let truthy = to_bool(field, value)?;
            Ok(match (truthy, field.enum_pair()) {
                (Some(flag), Some((falsy, truthy))) => {
                    if flag {
                        truthy.clone()
                    } else {
                        falsy.clone()
                    }
                }
                (Some(flag), None) => Value::I64(flag as i64),
                (None, _) => Value::Null,
            })
        }
        FieldType::Date => {
            let format = field.format().unwrap_or(DATE_FORMAT);
            match value {
                Value::Date(date) => Ok(Value::String(date.format(format).to_string())),
                Value::DateTime(dt) => {
                    Ok(Value::String(dt.date_naive().format(format).to_string()))
                }
                Value::String(s) => Ok(Value::String(s.clone())),
                other => Err(conversion_error(other, "date")),
            }
        }
        FieldType::Time => match value {
            Value::Time(time) => {
                let format = field
                    .format()
                    .unwrap_or(if has_subsecond(time) { "%H:%M:%S%.6f" } else { TIME_FORMAT });
                Ok(Value::String(time.format(format).to_string()))
            }
            Value::String(s) => Ok(Value::String(s.clone())),
            other => Err(conversion_error(other, "time")),
        },
        FieldType::DateTime => match value {
            Value::DateTime(dt) => {
                let local = match field.timezone() {
                    Some(tz) => dt.with_timezone(&tz).naive_local(),
                    None => dt.naive_utc(),
                };
                let format = field.format().unwrap_or(if has_subsecond(&local) {
                    "%Y-%m-%d %H:%M:%S%.6f"
                } else {
                    DATETIME_FORMAT
                });
                Ok(Value::String(local.format(format).to_string()))
            }
            Value::String(s) => Ok(Value::String(s.clone())),
            other => Err(conversion_error(other, "datetime")),
        },
        FieldType::Array | FieldType::Object => {
            let json = match value {
                Value::Json(json) => json.clone(),
                other => value_to_json(other),
            };
            let encoded = serde_json::to_string(&json)
                .map_err(|err| Error::invalid_format(format!("cannot encode value as json: {err}")))?;
            Ok(Value::String(encoded))
        }
    }
}

/// Converts a storage value back into its typed in-memory form. Inverse of
/// [`save_value`] for every representable value.
pub(crate) fn load_value(field: &Field, value: &Value) -> Result<Value> {
    // A LOB arriving as raw bytes is drained to text before any parse
    let drained;
    let value = match value {
        Value::Bytes(bytes) => {
            let text = core::str::from_utf8(bytes)
                .map_err(|_| Error::invalid_format("binary value is not valid utf-8"))?;
            drained = Value::String(text.to_string());
            &drained
        }
        other => other,
    };

    if value.is_null() {
        return Ok(Value::Null);
    }

    match field.field_type() {
        FieldType::String | FieldType::Text => Ok(Value::String(stringify(value)?)),
        FieldType::Integer => Ok(Value::I64(to_i64(value)?)),
        FieldType::Float => Ok(Value::F64(to_f64(value)?)),
        FieldType::Money => Ok(Value::F64(round_money(to_f64(value)?))),
        FieldType::Boolean => Ok(match to_bool(field, value)? {
            Some(flag) => Value::Bool(flag),
            None => Value::Null,
        }),
        FieldType::Date => match value {
            Value::Date(_) => Ok(value.clone()),
            Value::String(s) => Ok(Value::Date(parse_date(field, s)?)),
            other => Err(conversion_error(other, "date")),
        },
        FieldType::Time => match value {
            Value::Time(_) => Ok(value.clone()),
            Value::String(s) => Ok(Value::Time(parse_time(field, s)?)),
            other => Err(conversion_error(other, "time")),
        },
        FieldType::DateTime => match value {
            Value::DateTime(_) => Ok(value.clone()),
            Value::String(s) => Ok(Value::DateTime(parse_datetime(field, s)?)),
            other => Err(conversion_error(other, "datetime")),
        },
        FieldType::Array | FieldType::Object => match value {
            Value::Json(_) => Ok(value.clone()),
            Value::List(_) => Ok(Value::Json(value_to_json(value))),
            Value::String(s) => {
                let json: serde_json::Value = serde_json::from_str(s)
                    .map_err(|err| Error::invalid_format(format!("cannot decode json {s:?}: {err}")))?;
                Ok(Value::Json(json))
            }
            other => Err(conversion_error(other, "json")),
        },
    }
}

/// Money values are stored with four decimal places, rounding half away
/// from zero.
fn round_money(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

fn conversion_error(value: &Value, target: &str) -> Error {
    Error::invalid_format(format!("cannot convert {} to {target}", value.type_name()))
}

pub(crate) fn stringify(value: &Value) -> Result<String> {
    Ok(match value {
        Value::String(s) => s.clone(),
        Value::I64(v) => v.to_string(),
        Value::F64(v) => v.to_string(),
        Value::Bool(v) => if *v { "1" } else { "0" }.to_string(),
        Value::Date(v) => v.format(DATE_FORMAT).to_string(),
        Value::Time(v) => v.format(TIME_FORMAT).to_string(),
        Value::DateTime(v) => v.naive_utc().format(DATETIME_FORMAT).to_string(),
        Value::Bytes(bytes) => core::str::from_utf8(bytes)
            .map_err(|_| Error::invalid_format("binary value is not valid utf-8"))?
            .to_string(),
        Value::Json(json) => serde_json::to_string(json)
            .map_err(|err| Error::invalid_format(format!("cannot encode value as json: {err}")))?,
        other => return Err(conversion_error(other, "string")),
    })
}

fn to_i64(value: &Value) -> Result<i64> {
    match value {
        Value::I64(v) => Ok(*v),
        Value::F64(v) => Ok(*v as i64),
        Value::Bool(v) => Ok(*v as i64),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| Error::invalid_format(format!("cannot parse {s:?} as an integer"))),
        other => Err(conversion_error(other, "integer")),
    }
}

fn to_f64(value: &Value) -> Result<f64> {
    match value {
        Value::F64(v) => Ok(*v),
        Value::I64(v) => Ok(*v as f64),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| Error::invalid_format(format!("cannot parse {s:?} as a number"))),
        other => Err(conversion_error(other, "float")),
    }
}

/// Boolean interpretation. An empty string is "unknown" and maps to null.
fn to_bool(field: &Field, value: &Value) -> Result<Option<bool>> {
    if let Some((falsy, truthy)) = field.enum_pair() {
        if value == falsy {
            return Ok(Some(false));
        }
        if value == truthy {
            return Ok(Some(true));
        }
    }
    match value {
        Value::Bool(v) => Ok(Some(*v)),
        Value::I64(0) => Ok(Some(false)),
        Value::I64(1) => Ok(Some(true)),
        Value::String(s) if s.is_empty() => Ok(None),
        Value::String(s) if s == "0" => Ok(Some(false)),
        Value::String(s) if s == "1" => Ok(Some(true)),
        other => Err(conversion_error(other, "boolean")),
    }
}

fn has_subsecond(time: &impl Timelike) -> bool {
    time.nanosecond() % 1_000_000_000 != 0
}

fn parse_date(field: &Field, s: &str) -> Result<NaiveDate> {
    let formats = [field.format().unwrap_or(DATE_FORMAT), DATE_FORMAT];
    for format in formats {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return Ok(date);
        }
    }
    Err(Error::invalid_format(format!("cannot parse {s:?} as a date")))
}

fn parse_time(field: &Field, s: &str) -> Result<NaiveTime> {
    // %.f also matches the absence of a fraction
    let formats = [field.format().unwrap_or("%H:%M:%S%.f"), "%H:%M:%S%.f"];
    for format in formats {
        if let Ok(time) = NaiveTime::parse_from_str(s, format) {
            return Ok(time);
        }
    }
    Err(Error::invalid_format(format!("cannot parse {s:?} as a time")))
}

fn parse_datetime(field: &Field, s: &str) -> Result<chrono::DateTime<Utc>> {
    let formats = [
        field.format().unwrap_or("%Y-%m-%d %H:%M:%S%.f"),
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
    ];
    for format in formats {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return localize(field, naive);
        }
    }
    Err(Error::invalid_format(format!("cannot parse {s:?} as a datetime")))
}

/// Interprets a parsed naive timestamp in the field's persisted timezone
/// and converts it to UTC.
fn localize(field: &Field, naive: NaiveDateTime) -> Result<chrono::DateTime<Utc>> {
    match field.timezone() {
        Some(tz) => tz
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| Error::invalid_format(format!("ambiguous local time {naive}"))),
        None => Ok(Utc.from_utc_datetime(&naive)),
    }
}

/// Timezone used for tests and for parsing offsets in configuration.
#[allow(dead_code)]
pub(crate) fn fixed_offset(hours: i32) -> Option<FixedOffset> {
    FixedOffset::east_opt(hours * 3600)
}

pub(crate) fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(v) => serde_json::Value::Bool(*v),
        Value::I64(v) => serde_json::Value::from(*v),
        Value::F64(v) => serde_json::Value::from(*v),
        Value::String(v) => serde_json::Value::String(v.clone()),
        Value::Bytes(v) => serde_json::Value::String(String::from_utf8_lossy(v).into_owned()),
        Value::Date(v) => serde_json::Value::String(v.format(DATE_FORMAT).to_string()),
        Value::Time(v) => serde_json::Value::String(v.format(TIME_FORMAT).to_string()),
        Value::DateTime(v) => {
            serde_json::Value::String(v.naive_utc().format(DATETIME_FORMAT).to_string())
        }
        Value::Json(v) => v.clone(),
        Value::List(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
    }
}

pub(crate) fn json_to_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(v) => Value::Bool(*v),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(v) => Value::I64(v),
            None => Value::F64(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(v) => Value::String(v.clone()),
        serde_json::Value::Array(items) => Value::List(items.iter().map(json_to_value).collect()),
        object @ serde_json::Value::Object(_) => Value::Json(object.clone()),
    }
}

pub(crate) fn row_to_json(row: &Row) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = row
        .iter()
        .map(|(name, value)| (name.clone(), value_to_json(value)))
        .collect();
    serde_json::Value::Object(map)
}

pub(crate) fn json_to_row(json: &serde_json::Value) -> Result<Row> {
    let object = json
        .as_object()
        .ok_or_else(|| Error::invalid_format("embedded row must be a json object"))?;
    Ok(object
        .iter()
        .map(|(name, value)| (name.clone(), json_to_value(value)))
        .collect())
}
