//! Table and field correspondences between the two environments.
//!
//! The mapping file is YAML. Each table pair nests its field mappings, and an
//! optional `values` list holds per-field value maps:
//!
//! ```yaml
//! tables:
//!   - left_table: wd_dev.worker_core
//!     right_table: wd_prod.worker_core
//!     fields:
//!       - { left_field: employee_id, right_field: employee_id, is_key: true }
//!       - { left_field: first_name, right_field: fname }
//!       - { left_field: base_salary, right_field: base_pay, kind: decimal }
//! values:
//!   - { table: wd_prod.worker_core, field: is_active, table_value: "Y", canonical_value: "true" }
//! ```

use std::{borrow::Cow, collections::HashMap, fmt, fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result, anyhow, ensure};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    data::{FieldKind, Value},
    error::MappingError,
    trace::Side,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableMapping {
    pub left_table: String,
    pub right_table: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl TableMapping {
    pub fn new(left_table: impl Into<String>, right_table: impl Into<String>) -> Self {
        Self {
            left_table: left_table.into(),
            right_table: right_table.into(),
            active: true,
        }
    }

    pub fn table(&self, side: Side) -> &str {
        match side {
            Side::Left => &self.left_table,
            Side::Right => &self.right_table,
        }
    }
}

impl fmt::Display for TableMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.left_table, self.right_table)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub left_field: String,
    pub right_field: String,
    #[serde(default)]
    pub is_key: bool,
    #[serde(default = "default_true")]
    pub compare: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FieldKind>,
}

impl FieldMapping {
    pub fn new(left_field: impl Into<String>, right_field: impl Into<String>) -> Self {
        Self {
            left_field: left_field.into(),
            right_field: right_field.into(),
            is_key: false,
            compare: true,
            kind: None,
        }
    }

    /// Key field that is not itself checked for value drift.
    pub fn key(left_field: impl Into<String>, right_field: impl Into<String>) -> Self {
        Self {
            is_key: true,
            compare: false,
            ..Self::new(left_field, right_field)
        }
    }

    pub fn with_kind(mut self, kind: FieldKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn field(&self, side: Side) -> &str {
        match side {
            Side::Left => &self.left_field,
            Side::Right => &self.right_field,
        }
    }
}

/// Key fields in mapping order.
pub fn key_fields(fields: &[FieldMapping]) -> impl Iterator<Item = &FieldMapping> {
    fields.iter().filter(|f| f.is_key)
}

/// Fields checked for value drift, in mapping order.
pub fn compared_fields(fields: &[FieldMapping]) -> impl Iterator<Item = &FieldMapping> {
    fields.iter().filter(|f| f.compare)
}

/// Rejects field lists that cannot produce a meaningful comparison.
pub fn validate_fields(fields: &[FieldMapping]) -> Result<(), MappingError> {
    if key_fields(fields).next().is_none() {
        return Err(MappingError::NoKeyFields);
    }
    if compared_fields(fields).next().is_none() {
        return Err(MappingError::NoComparedFields);
    }
    Ok(())
}

/// Replaces a table's stored value with its canonical counterpart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueMapping {
    pub table: String,
    pub field: String,
    pub table_value: Value,
    pub canonical_value: Value,
}

/// Value maps for one table, grouped by field.
#[derive(Debug, Clone, Default)]
pub struct ValueMaps {
    by_field: HashMap<String, Vec<(String, Value)>>,
}

impl ValueMaps {
    pub fn for_table<'a>(table: &str, mappings: impl IntoIterator<Item = &'a ValueMapping>) -> Self {
        let mut by_field: HashMap<String, Vec<(String, Value)>> = HashMap::new();
        for mapping in mappings.into_iter().filter(|m| m.table == table) {
            by_field
                .entry(mapping.field.clone())
                .or_default()
                .push((mapping.table_value.as_display(), mapping.canonical_value.clone()));
        }
        Self { by_field }
    }

    pub fn is_empty(&self) -> bool {
        self.by_field.is_empty()
    }

    /// Returns the canonical value for `value` in `field`, or `value` itself
    /// when no map applies. Values are matched on their trimmed text form.
    pub fn apply<'v>(&self, field: &str, value: &'v Value) -> Cow<'v, Value> {
        let Some(entries) = self.by_field.get(field) else {
            return Cow::Borrowed(value);
        };
        if value.is_null() {
            return Cow::Borrowed(value);
        }
        let text = value.as_display();
        let text = text.trim();
        entries
            .iter()
            .find(|(from, _)| from == text)
            .map(|(_, to)| Cow::Owned(to.clone()))
            .unwrap_or(Cow::Borrowed(value))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TablePair {
    #[serde(flatten)]
    pub table: TableMapping,
    #[serde(default)]
    pub fields: Vec<FieldMapping>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingSet {
    #[serde(default)]
    pub tables: Vec<TablePair>,
    #[serde(default)]
    pub values: Vec<ValueMapping>,
}

impl MappingSet {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening mapping file {path:?}"))?;
        let set: MappingSet = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing mapping file {path:?}"))?;
        set.ensure_unique_pairs()?;
        debug!(
            "Loaded {} table pair(s) and {} value map(s) from {:?}",
            set.tables.len(),
            set.values.len(),
            path
        );
        Ok(set)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let set: MappingSet = serde_yaml::from_str(text).context("Parsing mapping document")?;
        set.ensure_unique_pairs()?;
        Ok(set)
    }

    fn ensure_unique_pairs(&self) -> Result<()> {
        for (idx, pair) in self.tables.iter().enumerate() {
            ensure!(
                !self.tables[..idx].iter().any(|p| {
                    p.table.left_table == pair.table.left_table
                        && p.table.right_table == pair.table.right_table
                }),
                "Table pair {} is declared more than once",
                pair.table
            );
        }
        Ok(())
    }

    pub fn active_pairs(&self) -> impl Iterator<Item = &TablePair> {
        self.tables.iter().filter(|p| p.table.active)
    }

    pub fn pair(&self, left_table: &str, right_table: &str) -> Option<&TablePair> {
        self.tables
            .iter()
            .find(|p| p.table.left_table == left_table && p.table.right_table == right_table)
    }

    pub fn pair_for_left(&self, left_table: &str) -> Option<&TablePair> {
        self.tables.iter().find(|p| p.table.left_table == left_table)
    }

    pub fn require_pair(&self, left_table: &str, right_table: &str) -> Result<&TablePair> {
        self.pair(left_table, right_table).ok_or_else(|| {
            anyhow!(MappingError::UnknownTablePair(format!(
                "{left_table} -> {right_table}"
            )))
        })
    }

    pub fn value_maps(&self, pair: &TableMapping, side: Side) -> ValueMaps {
        ValueMaps::for_table(pair.table(side), &self.values)
    }
}

/// Columns of each side that no field mapping mentions, in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UnmappedFields {
    pub left: Vec<String>,
    pub right: Vec<String>,
}

impl UnmappedFields {
    pub fn is_empty(&self) -> bool {
        self.left.is_empty() && self.right.is_empty()
    }
}

pub fn unmapped_fields<L, R>(
    left_columns: &[L],
    right_columns: &[R],
    fields: &[FieldMapping],
) -> UnmappedFields
where
    L: AsRef<str>,
    R: AsRef<str>,
{
    let unmapped = |columns: Vec<&str>, side: Side| -> Vec<String> {
        columns
            .into_iter()
            .filter(|c| !fields.iter().any(|f| f.field(side) == *c))
            .map(str::to_string)
            .collect()
    };
    UnmappedFields {
        left: unmapped(left_columns.iter().map(AsRef::as_ref).collect(), Side::Left),
        right: unmapped(right_columns.iter().map(AsRef::as_ref).collect(), Side::Right),
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
tables:
  - left_table: wd_dev.worker_core
    right_table: wd_prod.worker_core
    fields:
      - { left_field: employee_id, right_field: employee_id, is_key: true }
      - { left_field: first_name, right_field: fname }
      - { left_field: active_flag, right_field: is_active, kind: boolean }
  - left_table: wd_dev.worker_org
    right_table: wd_prod.worker_org
    active: false
    fields:
      - { left_field: employee_id, right_field: employee_id, is_key: true, compare: false }
values:
  - { table: wd_prod.worker_core, field: is_active, table_value: "Y", canonical_value: "true" }
"#;

    #[test]
    fn parses_nested_mapping_document() {
        let set = MappingSet::from_yaml(SAMPLE).unwrap();
        assert_eq!(set.tables.len(), 2);
        let core = set.pair("wd_dev.worker_core", "wd_prod.worker_core").unwrap();
        assert_eq!(core.fields.len(), 3);
        assert!(core.fields[0].is_key && core.fields[0].compare);
        assert!(!core.fields[1].is_key && core.fields[1].compare);
        assert_eq!(core.fields[2].kind, Some(FieldKind::Boolean));
        assert_eq!(set.active_pairs().count(), 1);
        assert!(!set.pair_for_left("wd_dev.worker_org").unwrap().fields[0].compare);
    }

    #[test]
    fn rejects_duplicate_pairs() {
        let doc = r#"
tables:
  - { left_table: a, right_table: b }
  - { left_table: a, right_table: b, active: false }
"#;
        let err = MappingSet::from_yaml(doc).unwrap_err();
        assert!(err.to_string().contains("declared more than once"));
    }

    #[test]
    fn validate_fields_requires_keys_and_compared_fields() {
        assert_eq!(
            validate_fields(&[FieldMapping::new("a", "b")]),
            Err(MappingError::NoKeyFields)
        );
        assert_eq!(
            validate_fields(&[FieldMapping::key("id", "id")]),
            Err(MappingError::NoComparedFields)
        );
        assert!(validate_fields(&[FieldMapping::key("id", "id"), FieldMapping::new("a", "b")]).is_ok());
    }

    #[test]
    fn value_maps_apply_to_their_table_only() {
        let set = MappingSet::from_yaml(SAMPLE).unwrap();
        let pair = &set.tables[0].table;
        let right = set.value_maps(pair, Side::Right);
        let left = set.value_maps(pair, Side::Left);
        assert!(left.is_empty());
        assert_eq!(
            right.apply("is_active", &Value::from(" Y ")).into_owned(),
            Value::from("true")
        );
        assert_eq!(
            right.apply("is_active", &Value::from("N")).into_owned(),
            Value::from("N")
        );
    }

    #[test]
    fn unmapped_fields_keep_source_order() {
        let fields = vec![
            FieldMapping::key("emp_id", "employee_id"),
            FieldMapping::new("name", "full_name"),
        ];
        let report = unmapped_fields(
            &["emp_id", "dept", "name", "grade"],
            &["employee_id", "full_name", "cost_center"],
            &fields,
        );
        assert_eq!(report.left, vec!["dept", "grade"]);
        assert_eq!(report.right, vec!["cost_center"]);
    }
}
