//! Value and column-name canonicalization.
//!
//! [`normalize()`] turns a raw [`Value`] into the form used for key matching
//! and field comparison. It is a pure function of the value and the
//! [`NormalizationConfig`], and applying it twice yields the same result as
//! applying it once.
//!
//! - Strings are trimmed when `trim_strings` is set.
//! - With `null_empty_equal`, absent values, empty strings and whitespace-only
//!   strings all collapse to [`Value::Null`].
//! - Integers, floats and decimals all become [`Value::Decimal`] with trailing
//!   zeros stripped, rounded half away from zero when
//!   `numeric_round_precision` is set. Finite floats beyond the decimal range
//!   are integral and stay [`Value::Float`].
//! - Every other value passes through unchanged.
//!
//! [`canonicalize_name()`] is the column-name form used by the mapping
//! suggester and is unrelated to value normalization.

use std::sync::OnceLock;

use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy, prelude::FromPrimitive};
use serde::{Deserialize, Serialize};

use crate::{
    data::{FieldKind, Value, coerce_value},
    error::NormalizationError,
};

pub const DEFAULT_ROUND_PRECISION: i32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationConfig {
    /// Strip leading and trailing whitespace from strings.
    pub trim_strings: bool,
    /// Treat absent, empty and whitespace-only values as one empty value.
    pub null_empty_equal: bool,
    /// Decimal places numeric values are rounded to before comparison.
    pub numeric_round_precision: Option<i32>,
    /// Treat undeclared fields with date-like names as datetimes.
    pub detect_temporal_fields: bool,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            trim_strings: true,
            null_empty_equal: true,
            numeric_round_precision: Some(DEFAULT_ROUND_PRECISION),
            detect_temporal_fields: false,
        }
    }
}

impl NormalizationConfig {
    /// Configuration that only canonicalizes numeric representation.
    pub fn exact() -> Self {
        Self {
            trim_strings: false,
            null_empty_equal: false,
            numeric_round_precision: None,
            detect_temporal_fields: false,
        }
    }

    pub fn validate(&self) -> Result<(), NormalizationError> {
        self.rounding_scale().map(|_| ())
    }

    fn rounding_scale(&self) -> Result<Option<u32>, NormalizationError> {
        match self.numeric_round_precision {
            Some(precision) if precision < 0 => {
                Err(NormalizationError::NegativePrecision(precision))
            }
            Some(precision) => Ok(Some(precision.unsigned_abs())),
            None => Ok(None),
        }
    }
}

pub fn normalize(value: &Value, config: &NormalizationConfig) -> Result<Value, NormalizationError> {
    let scale = config.rounding_scale()?;
    let normalized = match value {
        Value::Null => Value::Null,
        Value::String(s) => {
            if config.null_empty_equal && s.trim().is_empty() {
                Value::Null
            } else if config.trim_strings {
                Value::String(s.trim().to_string())
            } else {
                value.clone()
            }
        }
        Value::Integer(i) => canonical_number(Decimal::from(*i), scale),
        Value::Float(f) => canonical_float(*f, scale)?,
        Value::Decimal(d) => canonical_number(*d, scale),
        other => other.clone(),
    };
    Ok(normalized)
}

/// Normalizes the value of a mapped field, coercing it to the field's declared
/// kind first. Undeclared fields with temporal names are coerced leniently
/// when `detect_temporal_fields` is set.
pub fn normalize_field(
    value: &Value,
    field: &str,
    kind: Option<FieldKind>,
    config: &NormalizationConfig,
) -> Result<Value, NormalizationError> {
    let coerced = match kind {
        Some(kind) => coerce_value(value, kind).ok_or_else(|| NormalizationError::TypeMismatch {
            field: field.to_string(),
            expected: kind.as_str(),
            found: value.type_name(),
            value: value.as_display(),
        })?,
        None if config.detect_temporal_fields && looks_temporal(field) => {
            coerce_value(value, FieldKind::DateTime).unwrap_or_else(|| value.clone())
        }
        None => value.clone(),
    };
    normalize(&coerced, config).map_err(|err| err.for_field(field))
}

/// Lower-cases `name` and strips every character that is not a letter or
/// digit, so `"Employee_ID"` and `"employee id"` both become `"employeeid"`.
/// Non-ASCII letters and digits are kept.
pub fn canonicalize_name(name: &str) -> String {
    let lowered = name.to_lowercase();
    separator_pattern().replace_all(&lowered, "").into_owned()
}

pub fn looks_temporal(field: &str) -> bool {
    temporal_pattern().is_match(field)
}

fn canonical_number(value: Decimal, scale: Option<u32>) -> Value {
    let rounded = match scale {
        Some(dp) => value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero),
        None => value,
    };
    Value::Decimal(rounded.normalize())
}

fn canonical_float(value: f64, scale: Option<u32>) -> Result<Value, NormalizationError> {
    if !value.is_finite() {
        return Err(NormalizationError::NonFiniteNumber {
            field: String::new(),
        });
    }
    if let Some(decimal) = Decimal::from_f64(value) {
        return Ok(canonical_number(decimal, scale));
    }
    // beyond the decimal range every f64 is integral, so rounding is a no-op
    Ok(Value::Float(value))
}

fn separator_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"[^\p{Alphabetic}\p{Nd}]").expect("separator pattern is valid")
    })
}

fn temporal_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(date|time|_dt$|_dt_|_dttm)").expect("temporal pattern is valid")
    })
}
