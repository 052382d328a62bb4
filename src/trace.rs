//! Execution tracing around data fetches.
//!
//! Each fetch is wrapped in a [`TraceSpan`]: the span starts its timer before
//! the fetch runs and always yields a [`TraceRecord`], whether the fetch
//! succeeded or failed. A failed fetch produces a record with a zero row
//! count and the original error is handed back unchanged.

use std::{fmt, time::Instant};

use log::{debug, warn};
use serde::{Deserialize, Serialize, Serializer};

/// Which environment a table, row or fetch belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceRecord {
    pub table: String,
    pub side: Side,
    #[serde(serialize_with = "serialize_sql")]
    pub sql_text: Option<String>,
    pub elapsed_ms: f64,
    pub row_count: usize,
}

impl TraceRecord {
    /// Drops the query text, for output shown outside god mode.
    pub fn redacted(self) -> Self {
        Self {
            sql_text: None,
            ..self
        }
    }

    pub fn sql_display(&self) -> &str {
        self.sql_text.as_deref().unwrap_or("hidden")
    }
}

fn serialize_sql<S>(sql: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(sql.as_deref().unwrap_or("hidden"))
}

/// Results whose size a trace record can report.
pub trait RowCount {
    fn row_count(&self) -> usize;
}

impl<T> RowCount for Vec<T> {
    fn row_count(&self) -> usize {
        self.len()
    }
}

/// Timer held for the duration of one fetch.
#[derive(Debug)]
pub struct TraceSpan {
    table: String,
    side: Side,
    sql_text: Option<String>,
    started: Instant,
    finished: bool,
}

impl TraceSpan {
    pub fn start(table: &str, side: Side, sql_text: Option<&str>) -> Self {
        if let Some(sql) = sql_text {
            debug!("[{side}] {table}: {sql}");
        }
        Self {
            table: table.to_string(),
            side,
            sql_text: sql_text.map(str::to_string),
            started: Instant::now(),
            finished: false,
        }
    }

    pub fn finish(mut self, row_count: usize) -> TraceRecord {
        self.finished = true;
        TraceRecord {
            table: std::mem::take(&mut self.table),
            side: self.side,
            sql_text: self.sql_text.take(),
            elapsed_ms: self.started.elapsed().as_secs_f64() * 1000.0,
            row_count,
        }
    }
}

impl Drop for TraceSpan {
    fn drop(&mut self) {
        if !self.finished {
            warn!(
                "Trace span for {} table '{}' ended without a record after {:.3} ms",
                self.side,
                self.table,
                self.started.elapsed().as_secs_f64() * 1000.0
            );
        }
    }
}

/// Runs `operation` inside a trace span and returns its result together with
/// the record. The result is passed through untouched.
pub fn record<T, E, F>(
    table: &str,
    side: Side,
    sql_text: Option<&str>,
    operation: F,
) -> (Result<T, E>, TraceRecord)
where
    T: RowCount,
    F: FnOnce() -> Result<T, E>,
{
    let span = TraceSpan::start(table, side, sql_text);
    let result = operation();
    let row_count = result.as_ref().map(|rows| rows.row_count()).unwrap_or(0);
    (result, span.finish(row_count))
}

/// Collects the trace records of one request.
#[derive(Debug, Default)]
pub struct TraceRecorder {
    god_mode: bool,
    records: Vec<TraceRecord>,
}

impl TraceRecorder {
    /// With `god_mode` off, recorded query text is redacted.
    pub fn new(god_mode: bool) -> Self {
        Self {
            god_mode,
            records: Vec::new(),
        }
    }

    pub fn record<T, E, F>(
        &mut self,
        table: &str,
        side: Side,
        sql_text: Option<&str>,
        operation: F,
    ) -> Result<T, E>
    where
        T: RowCount,
        F: FnOnce() -> Result<T, E>,
    {
        let (result, record) = record(table, side, sql_text, operation);
        debug!(
            "[{side}] {table}: {} row(s) in {:.3} ms",
            record.row_count, record.elapsed_ms
        );
        self.records.push(if self.god_mode {
            record
        } else {
            record.redacted()
        });
        result
    }

    pub fn records(&self) -> &[TraceRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<TraceRecord> {
        self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_captures_row_count_and_sql() {
        let (result, record) = record("hr.worker", Side::Left, Some("SELECT 1"), || {
            Ok::<_, String>(vec![1, 2, 3])
        });
        assert_eq!(result.unwrap().len(), 3);
        assert_eq!(record.row_count, 3);
        assert_eq!(record.table, "hr.worker");
        assert_eq!(record.side, Side::Left);
        assert_eq!(record.sql_display(), "SELECT 1");
        assert!(record.elapsed_ms >= 0.0);
    }

    #[test]
    fn failed_fetch_still_yields_record_and_original_error() {
        let (result, record) = record("hr.worker", Side::Right, None, || {
            Err::<Vec<u8>, _>("connection reset".to_string())
        });
        assert_eq!(result.unwrap_err(), "connection reset");
        assert_eq!(record.row_count, 0);
        assert_eq!(record.side, Side::Right);
    }

    #[test]
    fn recorder_redacts_sql_outside_god_mode() {
        let mut recorder = TraceRecorder::new(false);
        let rows: Result<Vec<u8>, String> =
            recorder.record("t", Side::Left, Some("SELECT * FROM t"), || Ok(vec![0]));
        assert!(rows.is_ok());
        let _ = recorder.record("t", Side::Right, Some("SELECT * FROM t"), || {
            Err::<Vec<u8>, _>("boom".to_string())
        });
        let records = recorder.into_records();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.sql_text.is_none()));
        assert_eq!(records[1].row_count, 0);
        let json = serde_json::to_value(&records[0]).unwrap();
        assert_eq!(json["sql_text"], "hidden");
    }

    #[test]
    fn recorder_keeps_sql_in_god_mode() {
        let mut recorder = TraceRecorder::new(true);
        let _ = recorder.record("t", Side::Left, Some("SELECT 1"), || Ok::<_, ()>(vec![1]));
        assert_eq!(recorder.records()[0].sql_display(), "SELECT 1");
    }
}
