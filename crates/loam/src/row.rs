//! Raw result rows returned by the executor boundary.

use crate::error::{OrmError, OrmResult};
use crate::value::Value;
use std::collections::BTreeMap;

/// A single result row: column name to value.
///
/// Column names are unique per row; ordering follows the name, not the
/// select list, which is irrelevant to hydration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: BTreeMap<String, Value>,
}

impl Row {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column setter, mainly for embedders and tests.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.columns.insert(column.into(), value.into());
        self
    }

    /// Set a column value.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.columns.insert(column.into(), value.into());
    }

    /// Get a column value.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    /// Get a column value, erroring when the column is missing.
    pub fn try_get(&self, column: &str) -> OrmResult<&Value> {
        self.columns
            .get(column)
            .ok_or_else(|| OrmError::decode(column, "column missing from row"))
    }

    /// Whether the row carries the given column.
    pub fn contains(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Iterate over `(column, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.columns.iter()
    }

    /// Consume the row into an attribute snapshot.
    pub fn into_attributes(self) -> BTreeMap<String, Value> {
        self.columns
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_and_get() {
        let row = Row::new().with("id", 1i64).with("name", "alice");
        assert_eq!(row.get("id"), Some(&Value::Int(1)));
        assert_eq!(row.get("name"), Some(&Value::Text("alice".into())));
        assert!(row.get("missing").is_none());
    }

    #[test]
    fn try_get_missing_is_decode_error() {
        let row = Row::new();
        let err = row.try_get("id").unwrap_err();
        assert!(matches!(err, OrmError::Decode { .. }));
    }
}
