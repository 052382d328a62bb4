//! Serializable reports and plain-text summaries of request outcomes.

use std::{
    borrow::Cow,
    fmt::Write as _,
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    compare::{ComparisonCounts, ComparisonResult, FieldSummary},
    error::{ErrorKind, PairError},
    mapping::{TableMapping, UnmappedFields},
    session::{EntityFrame, PairOutcome, TraceOutcome},
    trace::TraceRecord,
};

#[derive(Debug, Serialize)]
pub struct FailureReport<'a> {
    pub kind: ErrorKind,
    pub field: Option<&'a str>,
    pub message: String,
}

impl<'a> From<&'a PairError> for FailureReport<'a> {
    fn from(err: &'a PairError) -> Self {
        Self {
            kind: err.kind,
            field: err.field(),
            message: err.source.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PairEntry<'a> {
    Compared {
        pair: &'a TableMapping,
        counts: ComparisonCounts,
        field_summary: Vec<FieldSummary>,
        result: &'a ComparisonResult,
        unmapped: &'a UnmappedFields,
        traces: &'a [TraceRecord],
    },
    Failed {
        pair: &'a TableMapping,
        error: FailureReport<'a>,
    },
}

#[derive(Debug, Serialize)]
pub struct CompareReport<'a> {
    pub generated_at: DateTime<Utc>,
    pub totals: ComparisonCounts,
    pub failed_pairs: usize,
    pub pairs: Vec<PairEntry<'a>>,
}

impl<'a> CompareReport<'a> {
    pub fn new(outcomes: &'a [PairOutcome]) -> Self {
        let mut totals = ComparisonCounts::default();
        let mut failed_pairs = 0;
        let pairs = outcomes
            .iter()
            .map(|outcome| match outcome {
                PairOutcome::Compared(report) => {
                    let counts = report.result.counts();
                    totals.left_only += counts.left_only;
                    totals.right_only += counts.right_only;
                    totals.mismatched_rows += counts.mismatched_rows;
                    totals.field_differences += counts.field_differences;
                    totals.matched += counts.matched;
                    PairEntry::Compared {
                        pair: &report.pair,
                        counts,
                        field_summary: report.result.field_summary(),
                        result: &report.result,
                        unmapped: &report.unmapped,
                        traces: &report.traces,
                    }
                }
                PairOutcome::Failed(err) => {
                    failed_pairs += 1;
                    PairEntry::Failed {
                        pair: &err.pair,
                        error: FailureReport::from(err),
                    }
                }
            })
            .collect();
        Self {
            generated_at: Utc::now(),
            totals,
            failed_pairs,
            pairs,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TraceEntry<'a> {
    Traced {
        #[serde(flatten)]
        frame: &'a EntityFrame,
    },
    Failed {
        pair: &'a TableMapping,
        error: FailureReport<'a>,
    },
}

impl<'a> From<&'a TraceOutcome> for TraceEntry<'a> {
    fn from(outcome: &'a TraceOutcome) -> Self {
        match outcome {
            TraceOutcome::Traced(frame) => TraceEntry::Traced { frame },
            TraceOutcome::Failed(err) => TraceEntry::Failed {
                pair: &err.pair,
                error: FailureReport::from(err),
            },
        }
    }
}

/// Pretty-printed JSON to `path`, or to stdout when no path is given.
pub fn write_json<T: Serialize>(path: Option<&Path>, value: &T) -> Result<()> {
    match path {
        Some(path) => {
            let file =
                File::create(path).with_context(|| format!("Creating output file {path:?}"))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, value)
                .with_context(|| format!("Writing report to {path:?}"))?;
            writeln!(writer)?;
            writer.flush()?;
        }
        None => {
            let stdout = io::stdout();
            let mut writer = stdout.lock();
            serde_json::to_writer_pretty(&mut writer, value).context("Writing report to stdout")?;
            writeln!(writer)?;
        }
    }
    Ok(())
}

/// One line per table pair with its bucket sizes or error.
pub fn summary_table(outcomes: &[PairOutcome]) -> String {
    let headers = ["table pair", "left only", "right only", "mismatched", "matched", "status"]
        .map(String::from);
    let rows: Vec<Vec<String>> = outcomes
        .iter()
        .map(|outcome| match outcome {
            PairOutcome::Compared(report) => {
                let counts = report.result.counts();
                vec![
                    report.pair.to_string(),
                    counts.left_only.to_string(),
                    counts.right_only.to_string(),
                    counts.mismatched_rows.to_string(),
                    counts.matched.to_string(),
                    if report.result.is_clean() { "clean" } else { "drift" }.to_string(),
                ]
            }
            PairOutcome::Failed(err) => {
                let mut row = vec![err.pair.to_string()];
                row.extend(std::iter::repeat_n("-".to_string(), 4));
                row.push(err.kind.to_string());
                row
            }
        })
        .collect();
    render_table(&headers, &rows)
}

pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count().max(3)).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(single_line(cell).chars().count());
        }
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(headers, &widths));
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let _ = writeln!(output, "{}", format_row(&rule, &widths));
    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths));
    }
    output
}

fn format_row(values: &[String], widths: &[usize]) -> String {
    let line = values
        .iter()
        .zip(widths)
        .map(|(value, width)| format!("{:<width$}", single_line(value), width = *width))
        .collect::<Vec<_>>()
        .join("  ");
    line.trim_end().to_string()
}

fn single_line(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}
