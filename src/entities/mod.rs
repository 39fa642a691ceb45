use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

mod column;
mod constraint;
mod foreign_key;
mod function;
mod index;
mod object;
mod row;
mod sequence;
mod table;
mod validate;

pub use column::{Column, ColumnWithSerialType, SerialType};
pub use constraint::{Constraint, ConstraintType};
pub use foreign_key::{DuplicatedForeignKeys, ForeignKey};
pub use function::StoredFunction;
pub use index::{
    DuplicatedIndexes, Index, IndexWithBloat, IndexWithColumns, IndexWithNulls, IndexWithSize,
    UnusedIndex,
};
pub use object::AnyObject;
pub use row::RawRow;
pub use sequence::SequenceState;
pub use table::{Table, TableWithBloat, TableWithMissingIndex};
pub use validate::ModelError;

/// Closed set of result shapes a diagnostic can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Table,
    TableWithBloat,
    TableWithMissingIndex,
    Index,
    IndexWithSize,
    UnusedIndex,
    IndexWithBloat,
    IndexWithNulls,
    IndexWithColumns,
    DuplicatedIndexes,
    Column,
    ColumnWithSerialType,
    ForeignKey,
    DuplicatedForeignKeys,
    StoredFunction,
    Constraint,
    SequenceState,
    AnyObject,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Table => "Table",
            EntityKind::TableWithBloat => "TableWithBloat",
            EntityKind::TableWithMissingIndex => "TableWithMissingIndex",
            EntityKind::Index => "Index",
            EntityKind::IndexWithSize => "IndexWithSize",
            EntityKind::UnusedIndex => "UnusedIndex",
            EntityKind::IndexWithBloat => "IndexWithBloat",
            EntityKind::IndexWithNulls => "IndexWithNulls",
            EntityKind::IndexWithColumns => "IndexWithColumns",
            EntityKind::DuplicatedIndexes => "DuplicatedIndexes",
            EntityKind::Column => "Column",
            EntityKind::ColumnWithSerialType => "ColumnWithSerialType",
            EntityKind::ForeignKey => "ForeignKey",
            EntityKind::DuplicatedForeignKeys => "DuplicatedForeignKeys",
            EntityKind::StoredFunction => "StoredFunction",
            EntityKind::Constraint => "Constraint",
            EntityKind::SequenceState => "SequenceState",
            EntityKind::AnyObject => "AnyObject",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of database object a finding points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PgObjectType {
    Table,
    PartitionedTable,
    Index,
    PartitionedIndex,
    Sequence,
    View,
    MaterializedView,
    Constraint,
    Function,
    Column,
}

impl PgObjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PgObjectType::Table => "table",
            PgObjectType::PartitionedTable => "partitioned table",
            PgObjectType::Index => "index",
            PgObjectType::PartitionedIndex => "partitioned index",
            PgObjectType::Sequence => "sequence",
            PgObjectType::View => "view",
            PgObjectType::MaterializedView => "materialized view",
            PgObjectType::Constraint => "constraint",
            PgObjectType::Function => "function",
            PgObjectType::Column => "column",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ModelError> {
        let kind = match value.trim().to_ascii_lowercase().as_str() {
            "table" => PgObjectType::Table,
            "partitioned table" => PgObjectType::PartitionedTable,
            "index" => PgObjectType::Index,
            "partitioned index" => PgObjectType::PartitionedIndex,
            "sequence" => PgObjectType::Sequence,
            "view" => PgObjectType::View,
            "materialized view" => PgObjectType::MaterializedView,
            "constraint" => PgObjectType::Constraint,
            "function" => PgObjectType::Function,
            "column" => PgObjectType::Column,
            _ => {
                return Err(ModelError::Unparseable {
                    what: "object type",
                    value: value.to_string(),
                })
            }
        };
        Ok(kind)
    }
}

/// Anything a diagnostic can point at.
pub trait DbObject {
    fn name(&self) -> String;
    fn object_type(&self) -> PgObjectType;
}

pub trait TableNameAware {
    fn table_name(&self) -> &str;
}

pub trait IndexNameAware {
    fn index_names(&self) -> Vec<&str>;
}

pub trait TableSizeAware {
    fn table_size_in_bytes(&self) -> i64;
}

pub trait IndexSizeAware {
    fn index_size_in_bytes(&self) -> i64;
}

pub trait BloatAware {
    fn bloat_size_in_bytes(&self) -> i64;
    fn bloat_percentage(&self) -> f64;
}

/// A validated finding produced by one diagnostic.
///
/// Equality, hashing and ordering of every entity go through [`Entity::identity`],
/// so derived values (total sizes, usage counters) never split one object into
/// two findings.
pub trait Entity:
    DbObject + fmt::Display + fmt::Debug + Clone + Ord + Send + Sync + 'static
{
    const KIND: EntityKind;

    type Key: Ord + Hash + Clone + fmt::Debug + Send;

    fn identity(&self) -> Self::Key;

    fn from_row(row: &RawRow) -> Result<Self, ModelError>;

    /// Folds another observation of the same object into this one, keeping the
    /// largest value seen for every host-local statistic. Structural entities
    /// have nothing to fold.
    fn absorb_max(&mut self, _other: &Self) {}
}

/// Maps one raw row into a diagnostic's entity.
pub trait RowMapper<T>: Send + Sync {
    fn map(&self, row: &RawRow) -> Result<T, ModelError>;
}

/// The mapper every entity carries via [`Entity::from_row`].
#[derive(Debug, Clone, Copy, Default)]
pub struct EntityMapper;

impl<T: Entity> RowMapper<T> for EntityMapper {
    fn map(&self, row: &RawRow) -> Result<T, ModelError> {
        T::from_row(row)
    }
}

/// Derives `PartialEq`, `Eq`, `Hash`, `PartialOrd` and `Ord` from `Entity::identity`.
macro_rules! identity_ordering {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl PartialEq for $ty {
                fn eq(&self, other: &Self) -> bool {
                    $crate::entities::Entity::identity(self) == $crate::entities::Entity::identity(other)
                }
            }

            impl Eq for $ty {}

            impl std::hash::Hash for $ty {
                fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                    std::hash::Hash::hash(&$crate::entities::Entity::identity(self), state);
                }
            }

            impl PartialOrd for $ty {
                fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
                    Some(self.cmp(other))
                }
            }

            impl Ord for $ty {
                fn cmp(&self, other: &Self) -> std::cmp::Ordering {
                    $crate::entities::Entity::identity(self).cmp(&$crate::entities::Entity::identity(other))
                }
            }
        )+
    };
}

pub(crate) use identity_ordering;

/// Reads paired `<prefix>` / `<prefix>_not_null` array columns into columns of one table.
pub(crate) fn columns_from_row(
    row: &RawRow,
    table_name: &str,
    names_column: &str,
    not_null_column: &str,
) -> Result<Vec<Column>, ModelError> {
    let names = row.get_str_array(names_column)?;
    let not_null = row.get_bool_array(not_null_column)?;
    if names.len() != not_null.len() {
        return Err(ModelError::UnexpectedType {
            column: not_null_column.to_string(),
            expected: "one flag per column",
        });
    }
    names
        .into_iter()
        .zip(not_null)
        .map(|(name, not_null)| Column::new(table_name, name, not_null))
        .collect()
}
