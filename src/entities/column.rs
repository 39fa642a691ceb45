use super::validate::{not_blank, ModelError, Result};
use super::{identity_ordering, DbObject, Entity, EntityKind, PgObjectType, RawRow, TableNameAware};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A table column with its nullability.
#[derive(Debug, Clone)]
pub struct Column {
    table_name: String,
    column_name: String,
    not_null: bool,
}

impl Column {
    pub fn new(
        table_name: impl Into<String>,
        column_name: impl Into<String>,
        not_null: bool,
    ) -> Result<Self> {
        Ok(Self {
            table_name: not_blank(table_name, "tableName")?,
            column_name: not_blank(column_name, "columnName")?,
            not_null,
        })
    }

    pub fn not_null(table_name: impl Into<String>, column_name: impl Into<String>) -> Result<Self> {
        Self::new(table_name, column_name, true)
    }

    pub fn nullable(table_name: impl Into<String>, column_name: impl Into<String>) -> Result<Self> {
        Self::new(table_name, column_name, false)
    }

    pub fn column_name(&self) -> &str {
        &self.column_name
    }

    pub fn is_not_null(&self) -> bool {
        self.not_null
    }
}

impl DbObject for Column {
    fn name(&self) -> String {
        self.column_name.clone()
    }

    fn object_type(&self) -> PgObjectType {
        PgObjectType::Column
    }
}

impl TableNameAware for Column {
    fn table_name(&self) -> &str {
        &self.table_name
    }
}

impl Entity for Column {
    const KIND: EntityKind = EntityKind::Column;
    type Key = (String, String);

    fn identity(&self) -> (String, String) {
        (self.table_name.clone(), self.column_name.clone())
    }

    fn from_row(row: &RawRow) -> Result<Self> {
        Self::new(
            row.get_str("table_name")?,
            row.get_str("column_name")?,
            row.get_bool("column_not_null")?,
        )
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nullability = if self.not_null { "not null" } else { "nullable" };
        write!(f, "{}.{} ({})", self.table_name, self.column_name, nullability)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialType {
    SmallSerial,
    Serial,
    BigSerial,
}

impl SerialType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SerialType::SmallSerial => "smallserial",
            SerialType::Serial => "serial",
            SerialType::BigSerial => "bigserial",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "smallserial" => Ok(SerialType::SmallSerial),
            "serial" => Ok(SerialType::Serial),
            "bigserial" => Ok(SerialType::BigSerial),
            _ => Err(ModelError::Unparseable {
                what: "serial type",
                value: value.to_string(),
            }),
        }
    }
}

/// A column backed by a sequence through a serial pseudo-type.
#[derive(Debug, Clone)]
pub struct ColumnWithSerialType {
    column: Column,
    serial_type: SerialType,
    sequence_name: String,
}

impl ColumnWithSerialType {
    pub fn new(
        column: Column,
        serial_type: SerialType,
        sequence_name: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            column,
            serial_type,
            sequence_name: not_blank(sequence_name, "sequenceName")?,
        })
    }

    pub fn column(&self) -> &Column {
        &self.column
    }

    pub fn serial_type(&self) -> SerialType {
        self.serial_type
    }

    pub fn sequence_name(&self) -> &str {
        &self.sequence_name
    }
}

impl DbObject for ColumnWithSerialType {
    fn name(&self) -> String {
        self.column.name()
    }

    fn object_type(&self) -> PgObjectType {
        PgObjectType::Column
    }
}

impl TableNameAware for ColumnWithSerialType {
    fn table_name(&self) -> &str {
        self.column.table_name()
    }
}

impl Entity for ColumnWithSerialType {
    const KIND: EntityKind = EntityKind::ColumnWithSerialType;
    type Key = (String, String, String);

    fn identity(&self) -> (String, String, String) {
        let (table, column) = self.column.identity();
        (table, column, self.sequence_name.clone())
    }

    fn from_row(row: &RawRow) -> Result<Self> {
        Self::new(
            Column::from_row(row)?,
            SerialType::parse(row.get_str("column_type")?)?,
            row.get_str("sequence_name")?,
        )
    }
}

impl fmt::Display for ColumnWithSerialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} using {}",
            self.column,
            self.serial_type.as_str(),
            self.sequence_name
        )
    }
}

identity_ordering!(Column, ColumnWithSerialType);
