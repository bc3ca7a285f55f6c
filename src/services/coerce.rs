// src/services/coerce.rs
//! Lenient type coercion for upstream payloads. Anything that does not parse becomes
//! "missing" (`None`) instead of an error.
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Coerce a JSON value to a finite float. Numbers pass through unchanged.
pub fn coerce_numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

/// Coerce a JSON string holding a date or timestamp to a naive datetime.
/// Plain dates land on midnight.
pub fn coerce_datetime(value: &Value) -> Option<NaiveDateTime> {
    let text = value.as_str()?.trim();

    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(text, format) {
            return Some(datetime);
        }
    }
    DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.naive_utc())
}

pub fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(coerce_numeric))
}

pub fn lenient_datetime<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(coerce_datetime))
}
