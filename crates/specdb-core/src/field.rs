//! Typed field values and the slot model shared by every diff-updatable entity.
//!
//! Raw document values arrive as `serde_json::Value`. Each target slot declares
//! a [`SlotKind`]; [`coerce`] turns the raw value into a [`FieldValue`] of that
//! kind, and [`same_value`] decides whether the stored and incoming values
//! differ.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SubsecRound, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use thiserror::Error;

/// The declared type of a slot on a [`DiffTarget`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Text,
    Integer,
    Float,
    Bool,
    Decimal,
    /// ISO-8601 string, with or without a trailing `Z`. Naive values are UTC.
    Timestamp,
    /// Integer seconds since the Unix epoch.
    UnixTimestamp,
    /// Set of strings; order is irrelevant for comparison.
    List,
    /// External id of a shared entity (attribute component, energy label, ...).
    Reference,
}

impl std::fmt::Display for SlotKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SlotKind::Text => "text",
            SlotKind::Integer => "integer",
            SlotKind::Float => "float",
            SlotKind::Bool => "bool",
            SlotKind::Decimal => "decimal",
            SlotKind::Timestamp => "timestamp",
            SlotKind::UnixTimestamp => "unix timestamp",
            SlotKind::List => "list",
            SlotKind::Reference => "reference",
        };
        f.write_str(name)
    }
}

/// A coerced slot value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Decimal(Decimal),
    Timestamp(DateTime<Utc>),
    List(Vec<String>),
}

impl FieldValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    #[must_use]
    pub fn into_text(self) -> Option<String> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_integer(self) -> Option<i64> {
        match self {
            FieldValue::Integer(n) => Some(n),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_float(self) -> Option<f64> {
        match self {
            FieldValue::Float(n) => Some(n),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_bool(self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(b),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_decimal(self) -> Option<Decimal> {
        match self {
            FieldValue::Decimal(d) => Some(d),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_timestamp(self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Timestamp(ts) => Some(ts),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_list(self) -> Option<Vec<String>> {
        match self {
            FieldValue::List(items) => Some(items),
            _ => None,
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Null => f.write_str("null"),
            FieldValue::Text(s) => write!(f, "{s:?}"),
            FieldValue::Integer(n) => write!(f, "{n}"),
            FieldValue::Float(n) => write!(f, "{n}"),
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Decimal(d) => write!(f, "{d}"),
            FieldValue::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
            FieldValue::List(items) => write!(f, "{items:?}"),
        }
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<Decimal> for FieldValue {
    fn from(value: Decimal) -> Self {
        FieldValue::Decimal(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(value)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(value: Vec<String>) -> Self {
        FieldValue::List(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(FieldValue::Null, Into::into)
    }
}

/// An entity whose fields can be diff-updated slot by slot.
pub trait DiffTarget {
    /// Entity kind used in logs and issues, e.g. `"product"`.
    fn entity(&self) -> &'static str;

    /// Human-readable identity of this record, e.g. the external id.
    fn key(&self) -> String;

    /// Declared kind of `slot`, or `None` if the entity has no such slot.
    fn slot_kind(&self, slot: &str) -> Option<SlotKind>;

    /// Current value of `slot`; unset slots read as [`FieldValue::Null`].
    fn get(&self, slot: &str) -> FieldValue;

    /// Overwrite `slot`. Values are always of the slot's declared kind.
    fn set(&mut self, slot: &str, value: FieldValue);
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("cannot coerce {raw} to {kind}: {reason}")]
pub struct CoercionError {
    pub kind: SlotKind,
    pub raw: String,
    pub reason: String,
}

impl CoercionError {
    fn new(kind: SlotKind, raw: &Value, reason: impl Into<String>) -> Self {
        Self {
            kind,
            raw: raw.to_string(),
            reason: reason.into(),
        }
    }
}

/// Python-style truthiness of a raw document value.
///
/// `null`, `false`, `0`, `0.0`, `""`, `[]` and `{}` are falsy.
#[must_use]
pub fn is_truthy(raw: &Value) -> bool {
    match raw {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Coerce a raw document value into the given slot kind.
///
/// `null` coerces to [`FieldValue::Null`] for every kind.
///
/// # Errors
///
/// Returns [`CoercionError`] when the raw shape cannot represent the kind,
/// e.g. `"yesterday"` for a [`SlotKind::Timestamp`] slot.
pub fn coerce(kind: SlotKind, raw: &Value) -> Result<FieldValue, CoercionError> {
    if raw.is_null() {
        return Ok(FieldValue::Null);
    }

    match kind {
        SlotKind::Text => Ok(FieldValue::Text(value_to_text(raw))),
        SlotKind::Integer | SlotKind::Reference => {
            coerce_integer(kind, raw).map(FieldValue::Integer)
        }
        SlotKind::Float => match raw {
            Value::Number(n) => n
                .as_f64()
                .map(FieldValue::Float)
                .ok_or_else(|| CoercionError::new(kind, raw, "number out of range")),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(FieldValue::Float)
                .map_err(|e| CoercionError::new(kind, raw, e.to_string())),
            _ => Err(CoercionError::new(kind, raw, "expected a number")),
        },
        SlotKind::Bool => coerce_bool(raw)
            .ok_or_else(|| CoercionError::new(kind, raw, "expected a boolean")),
        SlotKind::Decimal => {
            let text = match raw {
                Value::Number(n) => n.to_string(),
                Value::String(s) => s.trim().to_string(),
                _ => return Err(CoercionError::new(kind, raw, "expected a decimal")),
            };
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .map(FieldValue::Decimal)
                .map_err(|e| CoercionError::new(kind, raw, e.to_string()))
        }
        SlotKind::Timestamp => match raw {
            Value::String(s) => parse_timestamp(s)
                .map(FieldValue::Timestamp)
                .ok_or_else(|| CoercionError::new(kind, raw, "not an ISO-8601 timestamp")),
            _ => Err(CoercionError::new(kind, raw, "expected an ISO-8601 string")),
        },
        SlotKind::UnixTimestamp => {
            let secs = coerce_integer(kind, raw)?;
            DateTime::from_timestamp(secs, 0)
                .map(FieldValue::Timestamp)
                .ok_or_else(|| CoercionError::new(kind, raw, "seconds out of range"))
        }
        SlotKind::List => match raw {
            Value::Array(items) => Ok(FieldValue::List(
                items
                    .iter()
                    .filter(|item| !item.is_null())
                    .map(value_to_text)
                    .collect(),
            )),
            Value::Object(_) => Err(CoercionError::new(kind, raw, "expected a list")),
            scalar => Ok(FieldValue::List(vec![value_to_text(scalar)])),
        },
    }
}

/// Compare a stored and an incoming value under the slot's comparison rule.
///
/// List slots compare as multisets, so `["a","b"]` equals `["b","a"]`.
/// Everything else compares by value (`365.00` equals `365` for decimals).
#[must_use]
pub fn same_value(kind: SlotKind, stored: &FieldValue, incoming: &FieldValue) -> bool {
    match (kind, stored, incoming) {
        (SlotKind::List, FieldValue::List(a), FieldValue::List(b)) => {
            if a.len() != b.len() {
                return false;
            }
            let mut a = a.clone();
            let mut b = b.clone();
            a.sort_unstable();
            b.sort_unstable();
            a == b
        }
        _ => stored == incoming,
    }
}

/// Fractional-second digits a stored timestamp keeps (Postgres `TIMESTAMPTZ`).
pub const TIMESTAMP_PRECISION: u16 = 6;

/// Parse an ISO-8601 timestamp with an optional `Z` or offset suffix.
///
/// Values without a suffix, and bare dates, are interpreted as UTC. Fractions
/// finer than microseconds are truncated so a stored value reads back equal.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    parse_iso(raw.trim()).map(|ts| ts.trunc_subsecs(TIMESTAMP_PRECISION))
}

fn parse_iso(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn value_to_text(raw: &Value) -> String {
    match raw {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn coerce_integer(kind: SlotKind, raw: &Value) -> Result<i64, CoercionError> {
    match raw {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| CoercionError::new(kind, raw, "expected an integer")),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| CoercionError::new(kind, raw, e.to_string())),
        _ => Err(CoercionError::new(kind, raw, "expected an integer")),
    }
}

fn coerce_bool(raw: &Value) -> Option<FieldValue> {
    let b = match raw {
        Value::Bool(b) => *b,
        Value::Number(n) => match n.as_i64() {
            Some(0) => false,
            Some(1) => true,
            _ => return None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => true,
            "false" | "no" | "0" => false,
            _ => return None,
        },
        _ => return None,
    };
    Some(FieldValue::Bool(b))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    #[test]
    fn truthiness_matches_python_rules() {
        let falsy = [
            json!(null),
            json!(false),
            json!(0),
            json!(0.0),
            json!(""),
            json!([]),
            json!({}),
        ];
        for falsy in falsy {
            assert!(!is_truthy(&falsy), "{falsy} should be falsy");
        }
        let truthy = [
            json!(true),
            json!(1),
            json!(-2.5),
            json!("0"),
            json!(" "),
            json!(["a"]),
            json!({"k": 1}),
        ];
        for truthy in truthy {
            assert!(is_truthy(&truthy), "{truthy} should be truthy");
        }
    }

    #[test]
    fn timestamp_with_z_suffix_is_utc() {
        let parsed = coerce(SlotKind::Timestamp, &json!("2025-01-04T19:23:15Z")).unwrap();
        let expected = Utc.with_ymd_and_hms(2025, 1, 4, 19, 23, 15).unwrap();
        assert_eq!(parsed, FieldValue::Timestamp(expected));
    }

    #[test]
    fn timestamp_without_suffix_is_read_as_utc() {
        let parsed = coerce(SlotKind::Timestamp, &json!("2025-01-04T19:23:15")).unwrap();
        let expected = Utc.with_ymd_and_hms(2025, 1, 4, 19, 23, 15).unwrap();
        assert_eq!(parsed, FieldValue::Timestamp(expected));
    }

    #[test]
    fn timestamp_with_offset_is_normalized() {
        let parsed = coerce(SlotKind::Timestamp, &json!("2025-01-04T20:23:15+01:00")).unwrap();
        let expected = Utc.with_ymd_and_hms(2025, 1, 4, 19, 23, 15).unwrap();
        assert_eq!(parsed, FieldValue::Timestamp(expected));
    }

    #[test]
    fn sub_microsecond_fraction_is_truncated() {
        let parsed = coerce(SlotKind::Timestamp, &json!("2025-01-04T19:23:15.1234567Z")).unwrap();
        let stored = Utc.with_ymd_and_hms(2025, 1, 4, 19, 23, 15).unwrap()
            + chrono::Duration::microseconds(123_456);
        assert_eq!(parsed, FieldValue::Timestamp(stored));
        assert!(same_value(
            SlotKind::Timestamp,
            &FieldValue::Timestamp(stored),
            &parsed
        ));
    }

    #[test]
    fn naive_fraction_is_truncated_too() {
        let parsed = coerce(SlotKind::Timestamp, &json!("2025-01-04T19:23:15.999999999")).unwrap();
        let FieldValue::Timestamp(ts) = parsed else {
            panic!("expected timestamp, got {parsed:?}");
        };
        assert_eq!(ts.timestamp_subsec_nanos(), 999_999_000);
    }

    #[test]
    fn bare_date_is_midnight_utc() {
        let parsed = coerce(SlotKind::Timestamp, &json!("2024-11-29")).unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 11, 29, 0, 0, 0).unwrap();
        assert_eq!(parsed, FieldValue::Timestamp(expected));
    }

    #[test]
    fn unparseable_timestamp_is_a_coercion_error() {
        let err = coerce(SlotKind::Timestamp, &json!("yesterday")).unwrap_err();
        assert_eq!(err.kind, SlotKind::Timestamp);
        assert_eq!(err.raw, "\"yesterday\"");
    }

    #[test]
    fn unix_seconds_become_timestamp() {
        let parsed = coerce(SlotKind::UnixTimestamp, &json!(1_736_018_595)).unwrap();
        let expected = Utc.with_ymd_and_hms(2025, 1, 4, 19, 23, 15).unwrap();
        assert_eq!(parsed, FieldValue::Timestamp(expected));
    }

    #[test]
    fn text_slot_stringifies_scalars() {
        assert_eq!(coerce(SlotKind::Text, &json!(16)).unwrap(), FieldValue::Text("16".into()));
        assert_eq!(coerce(SlotKind::Text, &json!(true)).unwrap(), FieldValue::Text("true".into()));
        assert_eq!(
            coerce(SlotKind::Text, &json!("DDR5")).unwrap(),
            FieldValue::Text("DDR5".into())
        );
    }

    #[test]
    fn decimal_slot_accepts_strings_and_numbers() {
        let from_str = coerce(SlotKind::Decimal, &json!("365.00")).unwrap();
        let from_num = coerce(SlotKind::Decimal, &json!(365)).unwrap();
        assert!(same_value(SlotKind::Decimal, &from_str, &from_num));
        assert!(coerce(SlotKind::Decimal, &json!("three hundred")).is_err());
    }

    #[test]
    fn bool_slot_accepts_common_spellings() {
        assert_eq!(coerce(SlotKind::Bool, &json!("Yes")).unwrap(), FieldValue::Bool(true));
        assert_eq!(coerce(SlotKind::Bool, &json!(0)).unwrap(), FieldValue::Bool(false));
        assert!(coerce(SlotKind::Bool, &json!("maybe")).is_err());
    }

    #[test]
    fn list_comparison_ignores_order() {
        let a = coerce(SlotKind::List, &json!(["a", "b"])).unwrap();
        let b = coerce(SlotKind::List, &json!(["b", "a"])).unwrap();
        assert!(same_value(SlotKind::List, &a, &b));
    }

    #[test]
    fn list_comparison_respects_multiplicity() {
        let a = FieldValue::List(vec!["a".into(), "a".into(), "b".into()]);
        let b = FieldValue::List(vec!["a".into(), "b".into(), "b".into()]);
        assert!(!same_value(SlotKind::List, &a, &b));
    }

    #[test]
    fn scalar_in_list_slot_becomes_single_element() {
        let parsed = coerce(SlotKind::List, &json!("8712345678901")).unwrap();
        assert_eq!(parsed, FieldValue::List(vec!["8712345678901".into()]));
    }

    #[test]
    fn null_coerces_to_null_for_every_kind() {
        for kind in [SlotKind::Text, SlotKind::Decimal, SlotKind::Timestamp, SlotKind::List] {
            assert!(coerce(kind, &Value::Null).unwrap().is_null());
        }
    }

    #[test]
    fn option_conversion_maps_none_to_null() {
        let none: Option<String> = None;
        assert_eq!(FieldValue::from(none), FieldValue::Null);
        assert_eq!(FieldValue::from(Some(3_i64)), FieldValue::Integer(3));
    }
}
