//! Select statements issued against one side of a table pair.
//!
//! The query text is what a trace record shows in god mode. The CSV source
//! executes the same [`SelectQuery`] structurally, so the text always describes
//! what was actually read.

use std::fmt::Write as _;

use itertools::Itertools;
use serde::Serialize;

use crate::{
    data::Value,
    mapping::{FieldMapping, TableMapping, compared_fields, key_fields},
    trace::Side,
};

/// Rows fetched per table when tracing a single entity.
pub const DEFAULT_TRACE_LIMIT: usize = 200;

/// Restricts a query to rows whose `column` holds one of `values`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyFilter {
    pub column: String,
    pub values: Vec<Value>,
}

impl KeyFilter {
    /// Filter on the first key field of `side`, if the mapping has one.
    pub fn on_first_key(fields: &[FieldMapping], side: Side, values: Vec<Value>) -> Option<Self> {
        key_fields(fields).next().map(|mapping| Self {
            column: mapping.field(side).to_string(),
            values,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectQuery {
    pub table: String,
    pub columns: Vec<String>,
    pub filter: Option<KeyFilter>,
    pub limit: Option<usize>,
}

impl SelectQuery {
    pub fn new(table: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            table: table.into(),
            columns,
            filter: None,
            limit: None,
        }
    }

    /// Key fields then compared fields of `side`, each column once.
    pub fn for_side(pair: &TableMapping, fields: &[FieldMapping], side: Side) -> Self {
        let columns = key_fields(fields)
            .chain(compared_fields(fields))
            .map(|mapping| mapping.field(side).to_string())
            .unique()
            .collect();
        Self::new(pair.table(side), columns)
    }

    pub fn with_filter(mut self, filter: Option<KeyFilter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn to_sql(&self) -> String {
        let select_list = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns.iter().map(|c| quote_ident(c)).join(", ")
        };
        let mut sql = format!("SELECT {select_list} FROM {}", quote_table(&self.table));
        if let Some(filter) = &self.filter {
            if filter.values.is_empty() {
                sql.push_str(" WHERE 1 = 0");
            } else {
                let _ = write!(
                    sql,
                    " WHERE {} IN ({})",
                    quote_ident(&filter.column),
                    filter.values.iter().map(quote_literal).join(", ")
                );
            }
        }
        if let Some(limit) = self.limit {
            let _ = write!(sql, " LIMIT {limit}");
        }
        sql
    }
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quotes each dot-separated part of a qualified table name.
pub fn quote_table(name: &str) -> String {
    name.split('.').map(quote_ident).join(".")
}

pub fn quote_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(_) | Value::Float(_) | Value::Decimal(_) => value.as_display(),
        Value::Boolean(true) => "TRUE".to_string(),
        Value::Boolean(false) => "FALSE".to_string(),
        other => format!("'{}'", other.as_display().replace('\'', "''")),
    }
}
