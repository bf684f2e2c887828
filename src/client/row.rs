//! Labeled result rows.

use std::ops::Index;
use std::sync::Arc;

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

static NULL: Value = Value::Null;

/// One result row, labeled with the column schema of the query that produced it.
///
/// Rows from the same cursor share one schema allocation. Values are kept
/// in column order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    /// Label `values` with `columns`.
    ///
    /// Missing trailing values read as `null`; surplus values are kept but
    /// are not addressable by name.
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Column names in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Values in column order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consume the row, keeping only its values.
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Value of the named column, `None` if no such column exists.
    ///
    /// With duplicate column names the first match wins.
    pub fn get(&self, column: &str) -> Option<&Value> {
        let position = self.columns.iter().position(|c| c == column)?;
        Some(self.values.get(position).unwrap_or(&NULL))
    }

    /// Value at a column position.
    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Number of columns, which can differ from the number of values.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Iterate over `(column, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), self.values.get(i).unwrap_or(&NULL)))
    }
}

impl Index<&str> for Row {
    type Output = Value;

    /// Missing columns index as `null`, like `serde_json::Value`.
    fn index(&self, column: &str) -> &Value {
        self.get(column).unwrap_or(&NULL)
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in self.iter() {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// Build the shared schema for a result set.
pub(crate) fn schema(columns: Vec<String>) -> Arc<[String]> {
    Arc::from(columns)
}
