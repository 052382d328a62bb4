//! Scalar values carried by rows on either side of a comparison.
//!
//! [`Value`] is the single value type shared by raw rows, normalized values
//! and match keys. [`FieldKind`] is the optional type a field mapping declares
//! for a field; [`coerce_value()`] converts a raw value into that kind before
//! normalization.

use std::{
    fmt,
    hash::{Hash, Hasher},
    str::FromStr,
};

use anyhow::{Result, anyhow};
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::{Decimal, prelude::FromPrimitive};
use serde::{Deserialize, Serialize};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y", "%Y/%m/%d"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    String(String),
    Integer(i64),
    Float(f64),
    Decimal(Decimal),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

// Only floats beyond the decimal range survive normalization, and those are
// finite, so bitwise identity is enough for keys.
impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::String(s) => s.hash(state),
            Value::Integer(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Decimal(d) => d.hash(state),
            Value::Boolean(b) => b.hash(state),
            Value::Date(d) => d.hash(state),
            Value::DateTime(dt) => dt.hash(state),
        }
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_) | Value::Decimal(_))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::String(_) => "string",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Decimal(_) => "decimal",
            Value::Boolean(_) => "boolean",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
        }
    }

    pub fn as_display(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                    (*f as i64).to_string()
                } else {
                    f.to_string()
                }
            }
            Value::Decimal(d) => d.to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<Decimal> for Value {
    fn from(value: Decimal) -> Self {
        Value::Decimal(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Declared type of a mapped field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Integer,
    Decimal,
    Boolean,
    Date,
    DateTime,
}

impl FieldKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::Decimal => "decimal",
            FieldKind::Boolean => "boolean",
            FieldKind::Date => "date",
            FieldKind::DateTime => "datetime",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, FieldKind::Integer | FieldKind::Decimal)
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "string" | "text" => Ok(FieldKind::String),
            "integer" | "int" => Ok(FieldKind::Integer),
            "decimal" | "float" | "number" | "numeric" => Ok(FieldKind::Decimal),
            "boolean" | "bool" => Ok(FieldKind::Boolean),
            "date" => Ok(FieldKind::Date),
            "datetime" | "timestamp" => Ok(FieldKind::DateTime),
            other => Err(anyhow!("Unknown field kind '{other}'")),
        }
    }
}

pub fn parse_naive_date(value: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

pub fn parse_naive_datetime(value: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

pub fn parse_decimal(value: &str) -> Option<Decimal> {
    Decimal::from_str(value)
        .or_else(|_| Decimal::from_scientific(value))
        .ok()
}

/// Converts `value` into `kind`, returning `None` when the value cannot
/// represent that kind. Blank strings become [`Value::Null`] for every kind
/// other than [`FieldKind::String`].
pub fn coerce_value(value: &Value, kind: FieldKind) -> Option<Value> {
    if value.is_null() {
        return Some(Value::Null);
    }
    if kind != FieldKind::String
        && let Value::String(s) = value
        && s.trim().is_empty()
    {
        return Some(Value::Null);
    }
    match kind {
        FieldKind::String => Some(match value {
            Value::String(_) => value.clone(),
            other => Value::String(other.as_display()),
        }),
        FieldKind::Integer => match value {
            Value::Integer(_) => Some(value.clone()),
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => {
                i64::from_f64(*f).map(Value::Integer)
            }
            Value::Decimal(d) if d.fract().is_zero() => i64::try_from(*d).ok().map(Value::Integer),
            Value::String(s) => s.trim().parse::<i64>().ok().map(Value::Integer),
            _ => None,
        },
        FieldKind::Decimal => match value {
            Value::Integer(_) | Value::Float(_) | Value::Decimal(_) => Some(value.clone()),
            Value::String(s) => parse_decimal(s.trim()).map(Value::Decimal),
            _ => None,
        },
        FieldKind::Boolean => match value {
            Value::Boolean(_) => Some(value.clone()),
            Value::Integer(0) => Some(Value::Boolean(false)),
            Value::Integer(1) => Some(Value::Boolean(true)),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "yes" | "y" | "1" => Some(Value::Boolean(true)),
                "false" | "f" | "no" | "n" | "0" => Some(Value::Boolean(false)),
                _ => None,
            },
            _ => None,
        },
        FieldKind::Date => match value {
            Value::Date(_) => Some(value.clone()),
            Value::DateTime(dt) => Some(Value::Date(dt.date())),
            Value::String(s) => {
                let trimmed = s.trim();
                parse_naive_date(trimmed)
                    .or_else(|| parse_naive_datetime(trimmed).map(|dt| dt.date()))
                    .map(Value::Date)
            }
            _ => None,
        },
        FieldKind::DateTime => match value {
            Value::DateTime(_) => Some(value.clone()),
            Value::Date(d) => d.and_hms_opt(0, 0, 0).map(Value::DateTime),
            Value::String(s) => {
                let trimmed = s.trim();
                parse_naive_datetime(trimmed)
                    .or_else(|| parse_naive_date(trimmed).and_then(|d| d.and_hms_opt(0, 0, 0)))
                    .map(Value::DateTime)
            }
            _ => None,
        },
    }
}
