//! Field-mapping suggestions from raw column names.
//!
//! For each left column the suggester looks for, in order:
//!
//! 1. a right column with the identical name (`exact`),
//! 2. a right column with the same canonical name, ignoring case and
//!    separators (`normalized`),
//! 3. the right column whose canonical name is closest by Levenshtein
//!    distance, provided the distance relative to the longer name stays within
//!    [`SuggestConfig::fuzzy_threshold`] (`fuzzy`).
//!
//! Each left column yields at most one suggestion. Suggestions bootstrap a
//! mapping for a human to confirm and are never used as field mappings as-is.

use std::fmt;

use log::debug;
use rapidfuzz::distance::levenshtein;
use serde::{Deserialize, Serialize};

use crate::normalize::canonicalize_name;

pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.2;

/// Match quality, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    Exact,
    Normalized,
    Fuzzy,
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConfidenceTier::Exact => "exact",
            ConfidenceTier::Normalized => "normalized",
            ConfidenceTier::Fuzzy => "fuzzy",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappingSuggestion {
    pub left_field: String,
    pub right_field: String,
    pub confidence_tier: ConfidenceTier,
    /// Relative edit distance between canonical names; zero unless fuzzy.
    pub distance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestConfig {
    /// Largest relative edit distance accepted for a fuzzy suggestion.
    pub fuzzy_threshold: f64,
}

impl Default for SuggestConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
        }
    }
}

struct Candidate<'a> {
    raw: &'a str,
    canonical: String,
}

pub fn suggest<L, R>(left_columns: &[L], right_columns: &[R]) -> Vec<MappingSuggestion>
where
    L: AsRef<str>,
    R: AsRef<str>,
{
    suggest_with(left_columns, right_columns, &SuggestConfig::default())
}

pub fn suggest_with<L, R>(
    left_columns: &[L],
    right_columns: &[R],
    config: &SuggestConfig,
) -> Vec<MappingSuggestion>
where
    L: AsRef<str>,
    R: AsRef<str>,
{
    let candidates: Vec<Candidate<'_>> = right_columns
        .iter()
        .map(|c| Candidate {
            raw: c.as_ref(),
            canonical: canonicalize_name(c.as_ref()),
        })
        .collect();

    let mut suggestions: Vec<MappingSuggestion> = left_columns
        .iter()
        .filter_map(|left| best_candidate(left.as_ref(), &candidates, config))
        .collect();
    suggestions.sort_by(|a, b| {
        a.confidence_tier
            .cmp(&b.confidence_tier)
            .then_with(|| a.left_field.cmp(&b.left_field))
    });
    suggestions
}

fn best_candidate(
    left: &str,
    candidates: &[Candidate<'_>],
    config: &SuggestConfig,
) -> Option<MappingSuggestion> {
    let suggestion = |right: &str, confidence_tier, distance| MappingSuggestion {
        left_field: left.to_string(),
        right_field: right.to_string(),
        confidence_tier,
        distance,
    };

    if let Some(hit) = candidates.iter().find(|c| c.raw == left) {
        return Some(suggestion(hit.raw, ConfidenceTier::Exact, 0.0));
    }
    let canonical = canonicalize_name(left);
    if canonical.is_empty() {
        return None;
    }
    if let Some(hit) = candidates.iter().find(|c| c.canonical == canonical) {
        return Some(suggestion(hit.raw, ConfidenceTier::Normalized, 0.0));
    }

    let mut best: Option<(&Candidate<'_>, f64)> = None;
    for candidate in candidates.iter().filter(|c| !c.canonical.is_empty()) {
        let distance = relative_distance(&canonical, &candidate.canonical);
        if best.is_none_or(|(_, current)| distance < current) {
            best = Some((candidate, distance));
        }
    }
    let (hit, distance) = best?;
    if distance <= config.fuzzy_threshold {
        debug!(
            "Fuzzy match '{}' -> '{}' at distance {:.3}",
            left, hit.raw, distance
        );
        Some(suggestion(hit.raw, ConfidenceTier::Fuzzy, distance))
    } else {
        None
    }
}

/// Levenshtein distance divided by the length of the longer name.
pub fn relative_distance(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 0.0;
    }
    levenshtein::distance(a.chars(), b.chars()) as f64 / longest as f64
}
