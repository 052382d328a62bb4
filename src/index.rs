//! Match-key index over the rows of one side of a table pair.
//!
//! A [`MatchKey`] is the tuple of normalized key-field values of a row, taken
//! in field-mapping order. Two rows on the same side that produce the same key
//! abort the build with a [`DuplicateKeyError`]: duplicate keys point at a
//! mapping problem and are never resolved by keeping one of the rows.

use std::{collections::HashMap, fmt};

use log::debug;
use serde::Serialize;

use crate::{
    data::Value,
    error::{CompareError, DuplicateKeyError, MappingError, NormalizationError},
    mapping::{FieldMapping, ValueMaps, key_fields},
    normalize::{NormalizationConfig, normalize_field},
    rows::RawRow,
    trace::Side,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct MatchKey(Vec<Value>);

impl MatchKey {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    pub fn into_values(self) -> Vec<Value> {
        self.0
    }
}

impl fmt::Display for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|value| format!("{:?}", value.as_display()))
            .collect();
        if parts.len() == 1 {
            write!(f, "({},)", parts[0])
        } else {
            write!(f, "({})", parts.join(", "))
        }
    }
}

/// Reads mapped fields out of rows by name, applying value maps, declared
/// kinds and normalization.
#[derive(Debug, Clone)]
pub struct FieldAccessor<'a> {
    fields: &'a [FieldMapping],
    config: &'a NormalizationConfig,
    left_maps: ValueMaps,
    right_maps: ValueMaps,
}

impl<'a> FieldAccessor<'a> {
    pub fn new(fields: &'a [FieldMapping], config: &'a NormalizationConfig) -> Self {
        Self {
            fields,
            config,
            left_maps: ValueMaps::default(),
            right_maps: ValueMaps::default(),
        }
    }

    pub fn with_value_maps(mut self, left: ValueMaps, right: ValueMaps) -> Self {
        self.left_maps = left;
        self.right_maps = right;
        self
    }

    pub fn fields(&self) -> &'a [FieldMapping] {
        self.fields
    }

    pub fn config(&self) -> &'a NormalizationConfig {
        self.config
    }

    fn value_maps(&self, side: Side) -> &ValueMaps {
        match side {
            Side::Left => &self.left_maps,
            Side::Right => &self.right_maps,
        }
    }

    /// Normalized value of `mapping` in `row`. A field the row does not carry
    /// reads as absent.
    pub fn value(
        &self,
        row: &RawRow,
        mapping: &FieldMapping,
        side: Side,
    ) -> Result<Value, NormalizationError> {
        let field = mapping.field(side);
        let raw = row.get(field).unwrap_or(&Value::Null);
        let mapped = self.value_maps(side).apply(field, raw);
        normalize_field(&mapped, field, mapping.kind, self.config)
    }

    /// Match key of `row`; `row_number` is the 1-based input position used in
    /// error messages.
    pub fn match_key(
        &self,
        row: &RawRow,
        side: Side,
        row_number: usize,
    ) -> Result<MatchKey, CompareError> {
        let mut values = Vec::new();
        for mapping in key_fields(self.fields) {
            let field = mapping.field(side);
            if !row.has_field(field) {
                return Err(MappingError::MissingKeyField {
                    side,
                    field: field.to_string(),
                    row: row_number,
                }
                .into());
            }
            values.push(self.value(row, mapping, side)?);
        }
        if values.is_empty() {
            return Err(MappingError::NoKeyFields.into());
        }
        Ok(MatchKey(values))
    }
}

#[derive(Debug)]
pub struct RowIndex<'r> {
    side: Side,
    rows: &'r [RawRow],
    keys: Vec<MatchKey>,
    positions: HashMap<MatchKey, usize>,
}

impl<'r> RowIndex<'r> {
    pub fn build(
        rows: &'r [RawRow],
        accessor: &FieldAccessor<'_>,
        side: Side,
    ) -> Result<Self, CompareError> {
        accessor.config().validate()?;
        let mut keys = Vec::with_capacity(rows.len());
        let mut positions = HashMap::with_capacity(rows.len());
        for (idx, row) in rows.iter().enumerate() {
            let key = accessor.match_key(row, side, idx + 1)?;
            if let Some(&first) = positions.get(&key) {
                return Err(DuplicateKeyError {
                    side,
                    key: key.into_values(),
                    first_row: first + 1,
                    second_row: idx + 1,
                }
                .into());
            }
            positions.insert(key.clone(), idx);
            keys.push(key);
        }
        debug!(
            "Indexed {} {} row(s) on {} key field(s)",
            rows.len(),
            side,
            key_fields(accessor.fields()).count()
        );
        Ok(Self {
            side,
            rows,
            keys,
            positions,
        })
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn get(&self, key: &MatchKey) -> Option<&'r RawRow> {
        self.positions.get(key).map(|&idx| &self.rows[idx])
    }

    pub fn contains(&self, key: &MatchKey) -> bool {
        self.positions.contains_key(key)
    }

    /// Keys and rows in input order.
    pub fn iter(&self) -> impl Iterator<Item = (&MatchKey, &'r RawRow)> + '_ {
        let rows = self.rows;
        self.keys.iter().zip(rows.iter())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Builds the index of `rows` for `side` using the key fields of `fields`.
pub fn build_index<'r>(
    rows: &'r [RawRow],
    fields: &[FieldMapping],
    side: Side,
    config: &NormalizationConfig,
) -> Result<RowIndex<'r>, CompareError> {
    let accessor = FieldAccessor::new(fields, config);
    RowIndex::build(rows, &accessor, side)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> Vec<FieldMapping> {
        vec![
            FieldMapping::key("emp_id", "employee_id"),
            FieldMapping::key("region", "region_code"),
            FieldMapping::new("name", "full_name"),
        ]
    }

    #[test]
    fn keys_follow_field_mapping_order_and_side() {
        let rows = vec![
            RawRow::from_pairs([("region_code", " EU "), ("employee_id", "1")]),
            RawRow::from_pairs([("region_code", "US"), ("employee_id", "2")]),
        ];
        let index =
            build_index(&rows, &fields(), Side::Right, &NormalizationConfig::default()).unwrap();
        let keys: Vec<&MatchKey> = index.iter().map(|(key, _)| key).collect();
        assert_eq!(
            keys[0],
            &MatchKey::new(vec![Value::from("1"), Value::from("EU")])
        );
        assert_eq!(index.len(), 2);
        let probe = MatchKey::new(vec![Value::from("2"), Value::from("US")]);
        assert_eq!(index.get(&probe), Some(&rows[1]));
    }

    #[test]
    fn match_key_displays_as_tuple() {
        assert_eq!(MatchKey::new(vec![Value::from("1")]).to_string(), r#"("1",)"#);
        assert_eq!(
            MatchKey::new(vec![Value::from("1"), Value::Integer(2)]).to_string(),
            r#"("1", "2")"#
        );
    }

    #[test]
    fn missing_key_field_is_a_mapping_error() {
        let rows = vec![RawRow::from_pairs([("emp_id", "1")])];
        let err =
            build_index(&rows, &fields(), Side::Left, &NormalizationConfig::default()).unwrap_err();
        match err {
            CompareError::Mapping(MappingError::MissingKeyField { side, field, row }) => {
                assert_eq!(side, Side::Left);
                assert_eq!(field, "region");
                assert_eq!(row, 1);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn duplicate_keys_name_both_rows() {
        let rows = vec![
            RawRow::from_pairs([("emp_id", "1"), ("region", "EU")]),
            RawRow::from_pairs([("emp_id", "2"), ("region", "EU")]),
            RawRow::from_pairs([("emp_id", "1 "), ("region", "EU")]),
        ];
        let err =
            build_index(&rows, &fields(), Side::Left, &NormalizationConfig::default()).unwrap_err();
        match err {
            CompareError::DuplicateKey(dup) => {
                assert_eq!(dup.first_row, 1);
                assert_eq!(dup.second_row, 3);
                assert_eq!(dup.key, vec![Value::from("1"), Value::from("EU")]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn no_key_fields_is_rejected() {
        let rows = vec![RawRow::from_pairs([("a", "1")])];
        let err = build_index(
            &rows,
            &[FieldMapping::new("a", "a")],
            Side::Left,
            &NormalizationConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CompareError::Mapping(MappingError::NoKeyFields)));
    }

    #[test]
    fn numeric_keys_match_across_representations() {
        let config = NormalizationConfig::default();
        let key_only = [FieldMapping::key("id", "id")];
        let left = vec![RawRow::from_pairs([("id", Value::Integer(7))])];
        let right = vec![RawRow::from_pairs([("id", Value::Float(7.0))])];
        let left_index = build_index(&left, &key_only, Side::Left, &config).unwrap();
        let right_index = build_index(&right, &key_only, Side::Right, &config).unwrap();
        let (key, _) = left_index.iter().next().unwrap();
        assert!(right_index.contains(key));
    }
}
