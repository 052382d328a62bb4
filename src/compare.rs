//! Classification of two row sets into left-only, right-only and mismatched.
//!
//! Rows are matched on their [`MatchKey`]. Matched rows whose compared fields
//! are all equal after normalization are counted but not reported, so the
//! result grows with the amount of drift rather than with the data volume.
//!
//! Output order is part of the contract: `left_only` follows the left input,
//! `right_only` follows the right input and `mismatched` follows the order in
//! which keys were first seen on the left.

use std::collections::HashMap;

use log::debug;
use serde::Serialize;

use crate::{
    data::Value,
    error::{CompareError, PairError},
    index::{FieldAccessor, MatchKey, RowIndex},
    mapping::{FieldMapping, TableMapping, compared_fields, validate_fields},
    normalize::NormalizationConfig,
    rows::RawRow,
    trace::Side,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDiff {
    pub field_name: String,
    pub right_field: String,
    pub left_value: Value,
    pub right_value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowMismatch {
    pub key: MatchKey,
    pub field_diffs: Vec<FieldDiff>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComparisonResult {
    pub left_only: Vec<RawRow>,
    pub right_only: Vec<RawRow>,
    pub mismatched: Vec<RowMismatch>,
    /// Keys present on both sides with no field differences.
    pub matched: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ComparisonCounts {
    pub left_only: usize,
    pub right_only: usize,
    pub mismatched_rows: usize,
    pub field_differences: usize,
    pub matched: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSummary {
    pub left_field: String,
    pub right_field: String,
    pub difference_count: usize,
}

impl ComparisonResult {
    /// True when the two sides agree on every key and compared field.
    pub fn is_clean(&self) -> bool {
        self.left_only.is_empty() && self.right_only.is_empty() && self.mismatched.is_empty()
    }

    pub fn counts(&self) -> ComparisonCounts {
        ComparisonCounts {
            left_only: self.left_only.len(),
            right_only: self.right_only.len(),
            mismatched_rows: self.mismatched.len(),
            field_differences: self.mismatched.iter().map(|m| m.field_diffs.len()).sum(),
            matched: self.matched,
        }
    }

    /// Difference counts per mapped field pair, most frequent first.
    pub fn field_summary(&self) -> Vec<FieldSummary> {
        let mut counts: HashMap<(&str, &str), usize> = HashMap::new();
        for diff in self.mismatched.iter().flat_map(|m| &m.field_diffs) {
            *counts
                .entry((diff.field_name.as_str(), diff.right_field.as_str()))
                .or_insert(0) += 1;
        }
        let mut summary: Vec<FieldSummary> = counts
            .into_iter()
            .map(|((left, right), difference_count)| FieldSummary {
                left_field: left.to_string(),
                right_field: right.to_string(),
                difference_count,
            })
            .collect();
        summary.sort_by(|a, b| {
            b.difference_count
                .cmp(&a.difference_count)
                .then_with(|| a.left_field.cmp(&b.left_field))
                .then_with(|| a.right_field.cmp(&b.right_field))
        });
        summary
    }
}

/// Compares two row sets of one table pair.
pub fn compare(
    left_rows: &[RawRow],
    right_rows: &[RawRow],
    fields: &[FieldMapping],
    config: &NormalizationConfig,
) -> Result<ComparisonResult, CompareError> {
    let accessor = FieldAccessor::new(fields, config);
    compare_with(left_rows, right_rows, &accessor)
}

/// Same as [`compare()`], reading fields through a prepared accessor (for
/// example one carrying value maps).
pub fn compare_with(
    left_rows: &[RawRow],
    right_rows: &[RawRow],
    accessor: &FieldAccessor<'_>,
) -> Result<ComparisonResult, CompareError> {
    validate_fields(accessor.fields())?;
    let left_index = RowIndex::build(left_rows, accessor, Side::Left)?;
    let right_index = RowIndex::build(right_rows, accessor, Side::Right)?;

    let mut result = ComparisonResult::default();
    for (key, left_row) in left_index.iter() {
        let Some(right_row) = right_index.get(key) else {
            result.left_only.push(left_row.clone());
            continue;
        };
        let field_diffs = diff_fields(left_row, right_row, accessor)?;
        if field_diffs.is_empty() {
            result.matched += 1;
        } else {
            result.mismatched.push(RowMismatch {
                key: key.clone(),
                field_diffs,
            });
        }
    }
    result.right_only = right_index
        .iter()
        .filter(|(key, _)| !left_index.contains(key))
        .map(|(_, row)| row.clone())
        .collect();

    debug!(
        "Classified {} left / {} right row(s): {} left-only, {} right-only, {} mismatched, {} matched",
        left_index.len(),
        right_index.len(),
        result.left_only.len(),
        result.right_only.len(),
        result.mismatched.len(),
        result.matched
    );
    Ok(result)
}

fn diff_fields(
    left_row: &RawRow,
    right_row: &RawRow,
    accessor: &FieldAccessor<'_>,
) -> Result<Vec<FieldDiff>, CompareError> {
    let mut diffs = Vec::new();
    for mapping in compared_fields(accessor.fields()) {
        let left_value = accessor.value(left_row, mapping, Side::Left)?;
        let right_value = accessor.value(right_row, mapping, Side::Right)?;
        if left_value != right_value {
            diffs.push(FieldDiff {
                field_name: mapping.left_field.clone(),
                right_field: mapping.right_field.clone(),
                left_value,
                right_value,
            });
        }
    }
    Ok(diffs)
}

/// Compares one table pair, tagging any failure with the pair.
pub fn compare_pair(
    pair: &TableMapping,
    left_rows: &[RawRow],
    right_rows: &[RawRow],
    accessor: &FieldAccessor<'_>,
) -> Result<ComparisonResult, PairError> {
    compare_with(left_rows, right_rows, accessor).map_err(|err| PairError::new(pair, err))
}
