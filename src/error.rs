//! Error kinds raised by the comparison engine.
//!
//! Every failure is scoped to one table pair. [`PairError`] attaches the pair
//! so that batch callers can report each pair's outcome on its own.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::{data::Value, mapping::TableMapping, trace::Side};

/// Problems with the mapping itself or with rows that do not fit it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MappingError {
    #[error("key field '{field}' is missing from {side} row {row}")]
    MissingKeyField {
        side: Side,
        field: String,
        row: usize,
    },
    #[error("no key fields are mapped for this table pair")]
    NoKeyFields,
    #[error("no compared fields are mapped for this table pair")]
    NoComparedFields,
    #[error("no field mappings exist for table pair {0}")]
    UnknownTablePair(String),
}

/// Two rows on the same side produced the same match key.
#[derive(Debug, Clone, PartialEq, Error)]
#[error(
    "duplicate key ({}) on {side} side: rows {first_row} and {second_row}",
    format_key(.key)
)]
pub struct DuplicateKeyError {
    pub side: Side,
    pub key: Vec<Value>,
    pub first_row: usize,
    pub second_row: usize,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizationError {
    #[error("numeric rounding precision must not be negative (got {0})")]
    NegativePrecision(i32),
    #[error("field '{field}' holds a non-finite number")]
    NonFiniteNumber { field: String },
    #[error("field '{field}' is declared {expected} but holds {found} value '{value}'")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        found: &'static str,
        value: String,
    },
}

impl NormalizationError {
    /// Attaches the field name to errors raised before the field was known.
    pub(crate) fn for_field(self, name: &str) -> Self {
        match self {
            NormalizationError::NonFiniteNumber { field } if field.is_empty() => {
                NormalizationError::NonFiniteNumber {
                    field: name.to_string(),
                }
            }
            other => other,
        }
    }

    pub fn field(&self) -> Option<&str> {
        match self {
            NormalizationError::NegativePrecision(_) => None,
            NormalizationError::NonFiniteNumber { field }
            | NormalizationError::TypeMismatch { field, .. } => Some(field),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Mapping,
    DuplicateKey,
    Normalization,
    Fetch,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Mapping => "MappingError",
            ErrorKind::DuplicateKey => "DuplicateKeyError",
            ErrorKind::Normalization => "NormalizationError",
            ErrorKind::Fetch => "FetchError",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
pub enum CompareError {
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error(transparent)]
    DuplicateKey(#[from] DuplicateKeyError),
    #[error(transparent)]
    Normalization(#[from] NormalizationError),
    #[error("fetching {side} table '{table}' failed: {source:#}")]
    Fetch {
        side: Side,
        table: String,
        #[source]
        source: anyhow::Error,
    },
}

impl CompareError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CompareError::Mapping(_) => ErrorKind::Mapping,
            CompareError::DuplicateKey(_) => ErrorKind::DuplicateKey,
            CompareError::Normalization(_) => ErrorKind::Normalization,
            CompareError::Fetch { .. } => ErrorKind::Fetch,
        }
    }

    /// Field responsible for the failure, when one can be named.
    pub fn field(&self) -> Option<&str> {
        match self {
            CompareError::Mapping(MappingError::MissingKeyField { field, .. }) => Some(field),
            CompareError::Normalization(err) => err.field(),
            _ => None,
        }
    }
}

/// A [`CompareError`] tagged with the table pair it aborted.
#[derive(Debug, Error)]
#[error("{kind} in table pair {pair}{}: {source}", field_suffix(.source))]
pub struct PairError {
    pub pair: TableMapping,
    pub kind: ErrorKind,
    #[source]
    pub source: CompareError,
}

impl PairError {
    pub fn new(pair: &TableMapping, source: CompareError) -> Self {
        Self {
            pair: pair.clone(),
            kind: source.kind(),
            source,
        }
    }

    pub fn field(&self) -> Option<&str> {
        self.source.field()
    }
}

fn field_suffix(source: &CompareError) -> String {
    source
        .field()
        .map(|field| format!(" (field '{field}')"))
        .unwrap_or_default()
}

pub(crate) fn format_key(key: &[Value]) -> String {
    key.iter()
        .map(|value| format!("'{value}'"))
        .collect::<Vec<_>>()
        .join(", ")
}
