//! Data-access collaborators that execute a [`SelectQuery`].
//!
//! The engine never talks to storage directly. A [`RowSource`] lists the
//! columns of a table (for introspection) and returns the rows a query
//! selects. [`CsvSource`] reads `<table>.csv` (or `.tsv`) files below a
//! directory, one directory per environment; [`MemorySource`] serves rows held
//! in memory.
//!
//! Columns named by a query but absent from the table are left out of the
//! returned rows, so a missing key field surfaces as a mapping error when the
//! rows are indexed.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result, anyhow};
use encoding_rs::{Encoding, UTF_8};
use log::{debug, warn};

use crate::{
    data::Value,
    io_utils::{self, printable_delimiter},
    query::SelectQuery,
    rows::{RawRow, RowSchema},
};

pub trait RowSource: Send + Sync {
    /// Column names of `table` in storage order.
    fn columns(&self, table: &str) -> Result<Vec<String>>;

    /// Rows selected by `query`, in storage order.
    fn fetch(&self, query: &SelectQuery) -> Result<Vec<RawRow>>;
}

/// Maps stored columns onto the columns a query selects.
struct Projection {
    schema: Arc<RowSchema>,
    positions: Vec<usize>,
    filter: Option<(usize, Vec<String>)>,
    matches_nothing: bool,
}

impl Projection {
    fn new(table: &str, stored: &[String], query: &SelectQuery) -> Self {
        let lookup: HashMap<&str, usize> = stored
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.as_str(), idx))
            .collect();
        let selected: Vec<(&str, usize)> = if query.columns.is_empty() {
            stored.iter().map(String::as_str).zip(0..).collect()
        } else {
            query
                .columns
                .iter()
                .filter_map(|column| match lookup.get(column.as_str()) {
                    Some(&idx) => Some((column.as_str(), idx)),
                    None => {
                        debug!("Column '{column}' not present in table '{table}'");
                        None
                    }
                })
                .collect()
        };

        let mut matches_nothing = false;
        let filter = query.filter.as_ref().and_then(|filter| {
            let Some(&idx) = lookup.get(filter.column.as_str()) else {
                warn!(
                    "Filter column '{}' not present in table '{table}'; no rows selected",
                    filter.column
                );
                matches_nothing = true;
                return None;
            };
            let wanted = filter
                .values
                .iter()
                .map(|value| value.as_display().trim().to_string())
                .collect();
            Some((idx, wanted))
        });

        Self {
            schema: RowSchema::new(selected.iter().map(|(name, _)| *name)),
            positions: selected.iter().map(|(_, idx)| *idx).collect(),
            filter,
            matches_nothing,
        }
    }

    fn accepts(&self, stored: &[Value]) -> bool {
        if self.matches_nothing {
            return false;
        }
        let Some((idx, wanted)) = &self.filter else {
            return true;
        };
        let text = stored.get(*idx).map(Value::as_display).unwrap_or_default();
        let text = text.trim();
        wanted.iter().any(|value| value == text)
    }

    fn project(&self, stored: &[Value]) -> RawRow {
        let values = self
            .positions
            .iter()
            .map(|&idx| stored.get(idx).cloned().unwrap_or(Value::Null))
            .collect();
        RawRow::new(Arc::clone(&self.schema), values)
    }
}

/// Reads one file per table from a directory.
#[derive(Debug, Clone)]
pub struct CsvSource {
    root: PathBuf,
    delimiter: Option<u8>,
    encoding: &'static Encoding,
}

impl CsvSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            delimiter: None,
            encoding: UTF_8,
        }
    }

    pub fn with_delimiter(mut self, delimiter: Option<u8>) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_encoding(mut self, encoding: &'static Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<table>.csv`, falling back to `<root>/<table>.tsv`.
    pub fn table_path(&self, table: &str) -> Result<PathBuf> {
        ["csv", "tsv"]
            .iter()
            .map(|ext| self.root.join(format!("{table}.{ext}")))
            .find(|path| path.is_file())
            .ok_or_else(|| {
                anyhow!(
                    "No data file for table '{table}' under {:?} (expected {table}.csv or {table}.tsv)",
                    self.root
                )
            })
    }

    fn open(&self, table: &str) -> Result<(PathBuf, csv::Reader<std::io::BufReader<std::fs::File>>)> {
        let path = self.table_path(table)?;
        let delimiter = io_utils::resolve_input_delimiter(&path, self.delimiter);
        debug!(
            "Reading table '{table}' from {:?} with delimiter '{}'",
            path,
            printable_delimiter(delimiter)
        );
        let reader = io_utils::open_csv_reader_from_path(&path, delimiter)?;
        Ok((path, reader))
    }
}

impl RowSource for CsvSource {
    fn columns(&self, table: &str) -> Result<Vec<String>> {
        let (path, mut reader) = self.open(table)?;
        io_utils::reader_headers(&mut reader, self.encoding)
            .with_context(|| format!("Reading headers from {path:?}"))
    }

    fn fetch(&self, query: &SelectQuery) -> Result<Vec<RawRow>> {
        let (path, mut reader) = self.open(&query.table)?;
        let headers = io_utils::reader_headers(&mut reader, self.encoding)
            .with_context(|| format!("Reading headers from {path:?}"))?;
        let projection = Projection::new(&query.table, &headers, query);

        let mut rows = Vec::new();
        let mut record = csv::ByteRecord::new();
        let mut line = 1usize;
        while reader
            .read_byte_record(&mut record)
            .with_context(|| format!("Reading {path:?}"))?
        {
            line += 1;
            if query.limit.is_some_and(|limit| rows.len() >= limit) {
                break;
            }
            let stored: Vec<Value> = io_utils::decode_record(&record, self.encoding)
                .with_context(|| format!("Decoding line {line} of {path:?}"))?
                .into_iter()
                .map(Value::String)
                .collect();
            if projection.accepts(&stored) {
                rows.push(projection.project(&stored));
            }
        }
        Ok(rows)
    }
}

/// Tables held in memory, keyed by table name.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    tables: HashMap<String, (Vec<String>, Vec<Vec<Value>>)>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table<C, S>(mut self, table: &str, columns: C, rows: Vec<Vec<Value>>) -> Self
    where
        C: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns = columns.into_iter().map(Into::into).collect();
        self.tables.insert(table.to_string(), (columns, rows));
        self
    }

    fn table(&self, table: &str) -> Result<&(Vec<String>, Vec<Vec<Value>>)> {
        self.tables
            .get(table)
            .ok_or_else(|| anyhow!("Unknown table '{table}'"))
    }
}

impl RowSource for MemorySource {
    fn columns(&self, table: &str) -> Result<Vec<String>> {
        Ok(self.table(table)?.0.clone())
    }

    fn fetch(&self, query: &SelectQuery) -> Result<Vec<RawRow>> {
        let (columns, stored) = self.table(&query.table)?;
        let projection = Projection::new(&query.table, columns, query);
        Ok(stored
            .iter()
            .filter(|values| projection.accepts(values))
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|values| projection.project(values))
            .collect())
    }
}
