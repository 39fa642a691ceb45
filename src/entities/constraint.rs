use super::validate::{not_blank, ModelError, Result};
use super::{identity_ordering, DbObject, Entity, EntityKind, PgObjectType, RawRow, TableNameAware};
use serde::{Deserialize, Serialize};
use std::fmt;

/// `pg_constraint.contype` values the diagnostics report on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintType {
    Check,
    ForeignKey,
    PrimaryKey,
    Unique,
    Exclusion,
}

impl ConstraintType {
    pub fn from_pg_code(code: &str) -> Result<Self> {
        match code.trim() {
            "c" => Ok(ConstraintType::Check),
            "f" => Ok(ConstraintType::ForeignKey),
            "p" => Ok(ConstraintType::PrimaryKey),
            "u" => Ok(ConstraintType::Unique),
            "x" => Ok(ConstraintType::Exclusion),
            other => Err(ModelError::Unparseable {
                what: "constraint type",
                value: other.to_string(),
            }),
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ConstraintType::Check => "check",
            ConstraintType::ForeignKey => "foreign key",
            ConstraintType::PrimaryKey => "primary key",
            ConstraintType::Unique => "unique",
            ConstraintType::Exclusion => "exclusion",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Constraint {
    table_name: String,
    constraint_name: String,
    constraint_type: ConstraintType,
}

impl Constraint {
    pub fn new(
        table_name: impl Into<String>,
        constraint_name: impl Into<String>,
        constraint_type: ConstraintType,
    ) -> Result<Self> {
        Ok(Self {
            table_name: not_blank(table_name, "tableName")?,
            constraint_name: not_blank(constraint_name, "constraintName")?,
            constraint_type,
        })
    }

    pub fn constraint_name(&self) -> &str {
        &self.constraint_name
    }

    pub fn constraint_type(&self) -> ConstraintType {
        self.constraint_type
    }
}

impl DbObject for Constraint {
    fn name(&self) -> String {
        self.constraint_name.clone()
    }

    fn object_type(&self) -> PgObjectType {
        PgObjectType::Constraint
    }
}

impl TableNameAware for Constraint {
    fn table_name(&self) -> &str {
        &self.table_name
    }
}

impl Entity for Constraint {
    const KIND: EntityKind = EntityKind::Constraint;
    type Key = (String, String);

    fn identity(&self) -> (String, String) {
        (self.table_name.clone(), self.constraint_name.clone())
    }

    fn from_row(row: &RawRow) -> Result<Self> {
        Self::new(
            row.get_str("table_name")?,
            row.get_str("constraint_name")?,
            ConstraintType::from_pg_code(row.get_str("constraint_type")?)?,
        )
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} on {} ({})",
            self.constraint_name,
            self.table_name,
            self.constraint_type.description()
        )
    }
}

identity_ordering!(Constraint);
