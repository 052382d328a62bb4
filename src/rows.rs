//! Rows as returned by a data source.
//!
//! A [`RawRow`] is an ordered field-name-to-value mapping. Rows fetched from
//! the same table share one [`RowSchema`], so looking a field up by a name
//! chosen at runtime is a hash lookup into the shared schema rather than a
//! scan of every row.

use std::{collections::HashMap, sync::Arc};

use log::warn;
use serde::{Serialize, Serializer, ser::SerializeMap};

use crate::data::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowSchema {
    columns: Vec<String>,
    positions: HashMap<String, usize>,
}

impl RowSchema {
    pub fn new<I, S>(columns: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        let mut positions = HashMap::with_capacity(columns.len());
        for (idx, name) in columns.iter().enumerate() {
            positions.entry(name.clone()).or_insert(idx);
        }
        Arc::new(Self { columns, positions })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    schema: Arc<RowSchema>,
    values: Vec<Value>,
}

impl RawRow {
    /// Builds a row over `schema`. Missing trailing values are filled with
    /// [`Value::Null`]; surplus values are dropped with a warning.
    pub fn new(schema: Arc<RowSchema>, mut values: Vec<Value>) -> Self {
        if values.len() > schema.len() {
            warn!(
                "Dropping {} value(s) beyond the {} known column(s)",
                values.len() - schema.len(),
                schema.len()
            );
        }
        values.resize(schema.len(), Value::Null);
        Self { schema, values }
    }

    /// Builds a standalone row from `(field, value)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let (columns, values): (Vec<String>, Vec<Value>) = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .unzip();
        Self::new(RowSchema::new(columns), values)
    }

    pub fn schema(&self) -> &Arc<RowSchema> {
        &self.schema
    }

    /// Value of `field`, or `None` when the row's schema has no such field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.schema
            .position(field)
            .and_then(|idx| self.values.get(idx))
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.schema.contains(field)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.schema
            .columns()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Serialize for RawRow {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
