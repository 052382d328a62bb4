//! Comparison requests over the two environments.
//!
//! A [`Session`] ties a [`MappingSet`] to a left and a right [`RowSource`].
//! Every fetch runs through a [`TraceRecorder`] so the report shows what was
//! read, how long it took and how many rows came back. Failures never cross
//! table pairs: each pair of a batch produces its own [`PairOutcome`].

use std::thread;

use anyhow::{Context, Result, anyhow};
use log::{debug, info, warn};
use serde::Serialize;

use crate::{
    compare::{self, ComparisonResult},
    data::Value,
    error::{CompareError, MappingError, PairError},
    index::FieldAccessor,
    mapping::{
        FieldMapping, MappingSet, TableMapping, TablePair, UnmappedFields, key_fields,
        unmapped_fields, validate_fields,
    },
    normalize::NormalizationConfig,
    query::{DEFAULT_TRACE_LIMIT, KeyFilter, SelectQuery},
    rows::RawRow,
    source::RowSource,
    suggest::{MappingSuggestion, SuggestConfig, suggest_with},
    trace::{Side, TraceRecord, TraceRecorder},
};

#[derive(Debug, Clone, PartialEq)]
pub struct CompareOptions {
    pub normalization: NormalizationConfig,
    /// Keep query text in trace records.
    pub god_mode: bool,
    /// Restrict both sides to rows whose first key field holds one of these.
    pub key_values: Vec<Value>,
    /// Rows fetched per side and table pair.
    pub limit: Option<usize>,
    /// Rows fetched per side when tracing an entity.
    pub trace_limit: usize,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            normalization: NormalizationConfig::default(),
            god_mode: false,
            key_values: Vec::new(),
            limit: None,
            trace_limit: DEFAULT_TRACE_LIMIT,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PairReport {
    pub pair: TableMapping,
    pub result: ComparisonResult,
    pub unmapped: UnmappedFields,
    pub traces: Vec<TraceRecord>,
}

#[derive(Debug)]
pub enum PairOutcome {
    Compared(PairReport),
    Failed(PairError),
}

impl PairOutcome {
    pub fn pair(&self) -> &TableMapping {
        match self {
            PairOutcome::Compared(report) => &report.pair,
            PairOutcome::Failed(err) => &err.pair,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, PairOutcome::Failed(_))
    }
}

/// Rows of one entity in both tables of a pair.
#[derive(Debug, Serialize)]
pub struct EntityFrame {
    pub pair: TableMapping,
    pub key_value: Value,
    pub left_rows: Vec<RawRow>,
    pub right_rows: Vec<RawRow>,
    pub traces: Vec<TraceRecord>,
}

#[derive(Debug)]
pub enum TraceOutcome {
    Traced(EntityFrame),
    Failed(PairError),
}

#[derive(Debug, Serialize)]
pub struct Introspection {
    pub pair: TableMapping,
    pub left_columns: Vec<String>,
    pub right_columns: Vec<String>,
    pub suggestions: Vec<MappingSuggestion>,
    pub unmapped: UnmappedFields,
    /// Field mappings already declared for the pair.
    pub mapped: Vec<FieldMapping>,
}

pub struct Session<'s> {
    mappings: &'s MappingSet,
    left: &'s dyn RowSource,
    right: &'s dyn RowSource,
    options: CompareOptions,
}

impl<'s> Session<'s> {
    pub fn new(
        mappings: &'s MappingSet,
        left: &'s dyn RowSource,
        right: &'s dyn RowSource,
        options: CompareOptions,
    ) -> Self {
        Self {
            mappings,
            left,
            right,
            options,
        }
    }

    pub fn mappings(&self) -> &'s MappingSet {
        self.mappings
    }

    pub fn options(&self) -> &CompareOptions {
        &self.options
    }

    fn source(&self, side: Side) -> &'s dyn RowSource {
        match side {
            Side::Left => self.left,
            Side::Right => self.right,
        }
    }

    fn fetch(
        &self,
        recorder: &mut TraceRecorder,
        pair: &TableMapping,
        query: &SelectQuery,
        side: Side,
    ) -> Result<Vec<RawRow>, PairError> {
        let sql = query.to_sql();
        recorder
            .record(&query.table, side, Some(sql.as_str()), || {
                self.source(side).fetch(query)
            })
            .map_err(|source| {
                PairError::new(
                    pair,
                    CompareError::Fetch {
                        side,
                        table: query.table.clone(),
                        source,
                    },
                )
            })
    }

    fn columns(&self, pair: &TableMapping, side: Side) -> Result<Vec<String>, PairError> {
        let table = pair.table(side);
        self.source(side).columns(table).map_err(|source| {
            PairError::new(
                pair,
                CompareError::Fetch {
                    side,
                    table: table.to_string(),
                    source,
                },
            )
        })
    }

    /// Fetches and compares both tables of `pair`.
    pub fn compare_pair(&self, pair: &TablePair) -> Result<PairReport, PairError> {
        let table = &pair.table;
        let fields = pair.fields.as_slice();
        let fail = |err: CompareError| PairError::new(table, err);
        validate_fields(fields).map_err(|err| fail(err.into()))?;
        self.options
            .normalization
            .validate()
            .map_err(|err| fail(err.into()))?;

        let mut recorder = TraceRecorder::new(self.options.god_mode);
        let query = |side: Side| {
            let filter = if self.options.key_values.is_empty() {
                None
            } else {
                KeyFilter::on_first_key(fields, side, self.options.key_values.clone())
            };
            SelectQuery::for_side(table, fields, side)
                .with_filter(filter)
                .with_limit(self.options.limit)
        };
        let left_rows = self.fetch(&mut recorder, table, &query(Side::Left), Side::Left)?;
        let right_rows = self.fetch(&mut recorder, table, &query(Side::Right), Side::Right)?;

        let accessor = FieldAccessor::new(fields, &self.options.normalization).with_value_maps(
            self.mappings.value_maps(table, Side::Left),
            self.mappings.value_maps(table, Side::Right),
        );
        let result = compare::compare_pair(table, &left_rows, &right_rows, &accessor)?;
        let unmapped = unmapped_fields(
            &self.columns(table, Side::Left)?,
            &self.columns(table, Side::Right)?,
            fields,
        );

        let counts = result.counts();
        info!(
            "{}: {} left-only, {} right-only, {} mismatched row(s), {} matched",
            table, counts.left_only, counts.right_only, counts.mismatched_rows, counts.matched
        );
        Ok(PairReport {
            pair: table.clone(),
            result,
            unmapped,
            traces: recorder.into_records(),
        })
    }

    /// Compares pairs on worker threads, at most one per available core at a
    /// time. Outcomes keep the order of `pairs`.
    pub fn compare_pairs(&self, pairs: &[&TablePair]) -> Vec<PairOutcome> {
        let workers = thread::available_parallelism().map_or(1, usize::from);
        debug!(
            "Comparing {} table pair(s) on up to {} worker(s)",
            pairs.len(),
            workers
        );
        pairs
            .chunks(workers)
            .flat_map(|chunk| self.compare_chunk(chunk))
            .collect()
    }

    fn compare_chunk(&self, pairs: &[&TablePair]) -> Vec<PairOutcome> {
        thread::scope(|scope| {
            let handles: Vec<_> = pairs
                .iter()
                .map(|pair| scope.spawn(move || self.compare_pair(pair)))
                .collect();
            handles
                .into_iter()
                .zip(pairs)
                .map(|(handle, pair)| {
                    let outcome = handle.join().unwrap_or_else(|_| {
                        Err(PairError::new(
                            &pair.table,
                            CompareError::Fetch {
                                side: Side::Left,
                                table: pair.table.left_table.clone(),
                                source: anyhow!("comparison worker panicked"),
                            },
                        ))
                    });
                    match outcome {
                        Ok(report) => PairOutcome::Compared(report),
                        Err(err) => {
                            warn!("{err}");
                            PairOutcome::Failed(err)
                        }
                    }
                })
                .collect()
        })
    }

    /// Compares every active pair of the mapping set.
    pub fn compare_active(&self) -> Vec<PairOutcome> {
        let pairs: Vec<&TablePair> = self.mappings.active_pairs().collect();
        debug!("Comparing {} active table pair(s)", pairs.len());
        self.compare_pairs(&pairs)
    }

    /// Rows of both tables of each pair whose first key field equals
    /// `key_value`, sorted by key fields.
    pub fn trace_entity(&self, pairs: &[&TablePair], key_value: &Value) -> Vec<TraceOutcome> {
        pairs
            .iter()
            .map(|pair| match self.trace_pair(pair, key_value) {
                Ok(frame) => TraceOutcome::Traced(frame),
                Err(err) => {
                    warn!("{err}");
                    TraceOutcome::Failed(err)
                }
            })
            .collect()
    }

    fn trace_pair(&self, pair: &TablePair, key_value: &Value) -> Result<EntityFrame, PairError> {
        let table = &pair.table;
        let fields = pair.fields.as_slice();
        if key_fields(fields).next().is_none() {
            return Err(PairError::new(table, MappingError::NoKeyFields.into()));
        }
        let mut recorder = TraceRecorder::new(self.options.god_mode);
        let mut fetch_side = |side: Side| -> Result<Vec<RawRow>, PairError> {
            let query = SelectQuery::for_side(table, fields, side)
                .with_filter(KeyFilter::on_first_key(fields, side, vec![key_value.clone()]))
                .with_limit(Some(self.options.trace_limit));
            let mut rows = self.fetch(&mut recorder, table, &query, side)?;
            sort_by_key_fields(&mut rows, fields, side);
            Ok(rows)
        };
        let left_rows = fetch_side(Side::Left)?;
        let right_rows = fetch_side(Side::Right)?;
        Ok(EntityFrame {
            pair: table.clone(),
            key_value: key_value.clone(),
            left_rows,
            right_rows,
            traces: recorder.into_records(),
        })
    }

    /// Column listings, suggestions and unmapped columns for `pair`.
    pub fn introspect(&self, pair: &TablePair, config: &SuggestConfig) -> Result<Introspection> {
        let table = &pair.table;
        let left_columns = self
            .left
            .columns(&table.left_table)
            .with_context(|| format!("Listing columns of left table '{}'", table.left_table))?;
        let right_columns = self
            .right
            .columns(&table.right_table)
            .with_context(|| format!("Listing columns of right table '{}'", table.right_table))?;
        let suggestions = suggest_with(&left_columns, &right_columns, config);
        let unmapped = unmapped_fields(&left_columns, &right_columns, &pair.fields);
        debug!(
            "{}: {} suggestion(s), {} left and {} right column(s) unmapped",
            table,
            suggestions.len(),
            unmapped.left.len(),
            unmapped.right.len()
        );
        Ok(Introspection {
            pair: table.clone(),
            left_columns,
            right_columns,
            suggestions,
            unmapped,
            mapped: pair.fields.clone(),
        })
    }
}

fn sort_by_key_fields(rows: &mut [RawRow], fields: &[FieldMapping], side: Side) {
    rows.sort_by_cached_key(|row| {
        key_fields(fields)
            .map(|mapping| {
                row.get(mapping.field(side))
                    .map(|value| value.as_display().trim().to_string())
                    .unwrap_or_default()
            })
            .collect::<Vec<_>>()
    });
}
