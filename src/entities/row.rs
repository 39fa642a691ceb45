use super::validate::{
    MissingColumnSnafu, ModelError, NullColumnSnafu, Result, UnexpectedTypeSnafu,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single result row as handed over by a host connection.
///
/// Values are kept as JSON scalars/arrays keyed by column name so that the
/// mapping layer never depends on the wire representation of the driver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRow {
    columns: Map<String, Value>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly useful for fixtures.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.columns.insert(column.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    fn value(&self, column: &str) -> Result<&Value> {
        match self.columns.get(column) {
            None => MissingColumnSnafu { column }.fail(),
            Some(Value::Null) => NullColumnSnafu { column }.fail(),
            Some(value) => Ok(value),
        }
    }

    pub fn get_str(&self, column: &str) -> Result<&str> {
        self.value(column)?
            .as_str()
            .ok_or_else(|| unexpected(column, "text"))
    }

    pub fn get_opt_str(&self, column: &str) -> Result<Option<&str>> {
        match self.columns.get(column) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.get_str(column).map(Some),
        }
    }

    pub fn get_i64(&self, column: &str) -> Result<i64> {
        self.value(column)?
            .as_i64()
            .ok_or_else(|| unexpected(column, "bigint"))
    }

    pub fn get_opt_i64(&self, column: &str) -> Result<Option<i64>> {
        match self.columns.get(column) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.get_i64(column).map(Some),
        }
    }

    pub fn get_f64(&self, column: &str) -> Result<f64> {
        self.value(column)?
            .as_f64()
            .ok_or_else(|| unexpected(column, "double precision"))
    }

    pub fn get_bool(&self, column: &str) -> Result<bool> {
        self.value(column)?
            .as_bool()
            .ok_or_else(|| unexpected(column, "boolean"))
    }

    pub fn get_str_array(&self, column: &str) -> Result<Vec<String>> {
        let items = self
            .value(column)?
            .as_array()
            .ok_or_else(|| unexpected(column, "text[]"))?;
        items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| unexpected(column, "text[]"))
            })
            .collect()
    }

    pub fn get_bool_array(&self, column: &str) -> Result<Vec<bool>> {
        let items = self
            .value(column)?
            .as_array()
            .ok_or_else(|| unexpected(column, "boolean[]"))?;
        items
            .iter()
            .map(|item| item.as_bool().ok_or_else(|| unexpected(column, "boolean[]")))
            .collect()
    }
}

fn unexpected(column: &str, expected: &'static str) -> ModelError {
    UnexpectedTypeSnafu { column, expected }.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn typed_getters_read_their_columns() {
        let row = RawRow::new()
            .with("table_name", "t1")
            .with("table_size", 8192)
            .with("bloat_percentage", 12.5)
            .with("not_null", true)
            .with("columns", json!(["a", "b"]))
            .with("columns_not_null", json!([true, false]));

        assert_eq!(row.get_str("table_name"), Ok("t1"));
        assert_eq!(row.get_i64("table_size"), Ok(8192));
        assert_eq!(row.get_f64("bloat_percentage"), Ok(12.5));
        assert_eq!(row.get_f64("table_size"), Ok(8192.0));
        assert_eq!(row.get_bool("not_null"), Ok(true));
        assert_eq!(
            row.get_str_array("columns"),
            Ok(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(row.get_bool_array("columns_not_null"), Ok(vec![true, false]));
    }

    #[test]
    fn missing_null_and_mistyped_columns_are_errors() {
        let row = RawRow::new()
            .with("table_name", Value::Null)
            .with("table_size", "big");

        assert!(matches!(
            row.get_str("index_name"),
            Err(ModelError::MissingColumn { .. })
        ));
        assert!(matches!(
            row.get_str("table_name"),
            Err(ModelError::NullColumn { .. })
        ));
        assert!(matches!(
            row.get_i64("table_size"),
            Err(ModelError::UnexpectedType {
                expected: "bigint",
                ..
            })
        ));
        assert_eq!(row.get_opt_str("table_name"), Ok(None));
    }
}
