use super::validate::{not_blank, same_table, EmptyListSnafu, ModelError, Result};
use super::{
    columns_from_row, identity_ordering, Column, DbObject, Entity, EntityKind, PgObjectType,
    RawRow, TableNameAware,
};
use itertools::Itertools;
use std::fmt;

/// A foreign key constraint and the columns it spans, in constraint order.
#[derive(Debug, Clone)]
pub struct ForeignKey {
    table_name: String,
    constraint_name: String,
    columns: Vec<Column>,
}

impl ForeignKey {
    pub fn new(
        table_name: impl Into<String>,
        constraint_name: impl Into<String>,
        columns: Vec<Column>,
    ) -> Result<Self> {
        let table_name = not_blank(table_name, "tableName")?;
        let constraint_name = not_blank(constraint_name, "constraintName")?;
        if columns.is_empty() {
            return EmptyListSnafu {
                field: "columnsInConstraint",
            }
            .fail();
        }
        if columns.iter().any(|c| c.table_name() != table_name) {
            return Err(ModelError::MixedTables);
        }
        Ok(Self {
            table_name,
            constraint_name,
            columns,
        })
    }

    pub fn of_column(constraint_name: impl Into<String>, column: Column) -> Result<Self> {
        let table_name = column.table_name().to_string();
        Self::new(table_name, constraint_name, vec![column])
    }

    pub fn constraint_name(&self) -> &str {
        &self.constraint_name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    fn from_prefixed(row: &RawRow, prefix: &str) -> Result<Self> {
        let table_name = row.get_str("table_name")?;
        let columns = columns_from_row(
            row,
            table_name,
            &format!("{prefix}columns"),
            &format!("{prefix}columns_not_null"),
        )?;
        Self::new(
            table_name,
            row.get_str(&format!("{prefix}constraint_name"))?,
            columns,
        )
    }
}

impl DbObject for ForeignKey {
    fn name(&self) -> String {
        self.constraint_name.clone()
    }

    fn object_type(&self) -> PgObjectType {
        PgObjectType::Constraint
    }
}

impl TableNameAware for ForeignKey {
    fn table_name(&self) -> &str {
        &self.table_name
    }
}

impl Entity for ForeignKey {
    const KIND: EntityKind = EntityKind::ForeignKey;
    type Key = (String, String);

    fn identity(&self) -> (String, String) {
        (self.table_name.clone(), self.constraint_name.clone())
    }

    fn from_row(row: &RawRow) -> Result<Self> {
        Self::from_prefixed(row, "")
    }
}

impl fmt::Display for ForeignKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} on {} [{}]",
            self.constraint_name,
            self.table_name,
            self.columns.iter().map(|c| c.column_name()).join(", ")
        )
    }
}

/// Foreign keys of one table that duplicate or overlap each other.
#[derive(Debug, Clone)]
pub struct DuplicatedForeignKeys {
    table_name: String,
    foreign_keys: Vec<ForeignKey>,
}

impl DuplicatedForeignKeys {
    pub fn new(foreign_keys: Vec<ForeignKey>) -> Result<Self> {
        let table_name = same_table(
            foreign_keys.iter().map(|fk| fk.table_name()),
            "foreignKeys",
        )?;
        let mut foreign_keys = foreign_keys;
        foreign_keys.sort();
        foreign_keys.dedup();
        if foreign_keys.len() < 2 {
            return Err(ModelError::TooFewItems {
                field: "foreignKeys",
            });
        }
        Ok(Self {
            table_name,
            foreign_keys,
        })
    }

    pub fn foreign_keys(&self) -> &[ForeignKey] {
        &self.foreign_keys
    }
}

impl DbObject for DuplicatedForeignKeys {
    fn name(&self) -> String {
        self.foreign_keys.iter().map(|fk| fk.constraint_name()).join(",")
    }

    fn object_type(&self) -> PgObjectType {
        PgObjectType::Constraint
    }
}

impl TableNameAware for DuplicatedForeignKeys {
    fn table_name(&self) -> &str {
        &self.table_name
    }
}

impl Entity for DuplicatedForeignKeys {
    const KIND: EntityKind = EntityKind::DuplicatedForeignKeys;
    type Key = (String, Vec<String>);

    fn identity(&self) -> (String, Vec<String>) {
        (
            self.table_name.clone(),
            self.foreign_keys
                .iter()
                .map(|fk| fk.constraint_name().to_string())
                .collect(),
        )
    }

    fn from_row(row: &RawRow) -> Result<Self> {
        Self::new(vec![
            ForeignKey::from_prefixed(row, "")?,
            ForeignKey::from_prefixed(row, "duplicate_")?,
        ])
    }
}

impl fmt::Display for DuplicatedForeignKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            self.table_name,
            self.foreign_keys.iter().map(|fk| fk.to_string()).join("; ")
        )
    }
}

identity_ordering!(ForeignKey, DuplicatedForeignKeys);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn foreign_key_requires_columns_of_its_table() {
        assert!(ForeignKey::new("t", "fk", vec![]).is_err());
        let column = Column::not_null("other", "c").unwrap();
        assert_eq!(
            ForeignKey::new("t", "fk", vec![column]).unwrap_err(),
            ModelError::MixedTables
        );
    }

    #[test]
    fn duplicated_foreign_keys_map_both_sides() {
        let row = RawRow::new()
            .with("table_name", "client_preferences")
            .with("constraint_name", "c_phone_email_fk")
            .with("columns", json!(["phone", "email"]))
            .with("columns_not_null", json!([true, true]))
            .with("duplicate_constraint_name", "c_email_phone_fk")
            .with("duplicate_columns", json!(["email", "phone"]))
            .with("duplicate_columns_not_null", json!([true, true]));

        let keys = DuplicatedForeignKeys::from_row(&row).unwrap();
        assert_eq!(keys.name(), "c_email_phone_fk,c_phone_email_fk");
        assert_eq!(keys.foreign_keys()[0].columns().len(), 2);
    }

    #[test]
    fn duplicated_foreign_keys_equality_ignores_order() {
        let fk = |name: &str| {
            ForeignKey::of_column(name, Column::nullable("t", "c").unwrap()).unwrap()
        };
        let first = DuplicatedForeignKeys::new(vec![fk("a"), fk("b")]).unwrap();
        let second = DuplicatedForeignKeys::new(vec![fk("b"), fk("a")]).unwrap();
        assert_eq!(first, second);
    }
}
