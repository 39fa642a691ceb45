use crate::entities::EntityKind;
use serde::{Deserialize, Serialize};
use snafu::Snafu;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
pub enum CatalogError {
    #[snafu(display("Unknown diagnostic: {}", id))]
    UnknownDiagnostic { id: String },

    #[snafu(display("No query resource registered for diagnostic {}", diagnostic))]
    MissingQuery { diagnostic: Diagnostic },
}

type Result<T, E = CatalogError> = std::result::Result<T, E>;

/// How the answer of a diagnostic relates to the host it runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostScope {
    /// Schema-level facts: one authoritative host is enough.
    Invariant,
    /// Statistics-level facts that differ per host; every reachable host is queried.
    Variant(MergeRule),
}

/// How per-host results of a host-variant diagnostic are folded together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeRule {
    /// Keep the largest value each host observed for the same object.
    MaxObserved,
    /// Keep every object reported by any host.
    Union,
}

/// Parameters bound to a diagnostic query, in positional order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryParam {
    SchemaName,
    BloatPercentageThreshold,
    RemainingPercentageThreshold,
}

const SCHEMA_ONLY: &[QueryParam] = &[QueryParam::SchemaName];
const SCHEMA_AND_BLOAT: &[QueryParam] = &[
    QueryParam::SchemaName,
    QueryParam::BloatPercentageThreshold,
];
const SCHEMA_AND_REMAINING: &[QueryParam] = &[
    QueryParam::SchemaName,
    QueryParam::RemainingPercentageThreshold,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Diagnostic {
    InvalidIndexes,
    DuplicatedIndexes,
    IntersectedIndexes,
    UnusedIndexes,
    ForeignKeysWithoutIndex,
    TablesWithMissingIndexes,
    TablesWithoutPrimaryKey,
    IndexesWithNullValues,
    BloatedIndexes,
    BloatedTables,
    TablesWithoutDescription,
    ColumnsWithoutDescription,
    ColumnsWithJsonType,
    ColumnsWithSerialTypes,
    FunctionsWithoutDescription,
    IndexesWithBoolean,
    NotValidConstraints,
    BtreeIndexesOnArrayColumns,
    SequenceOverflow,
    PrimaryKeysWithSerialTypes,
    DuplicatedForeignKeys,
    IntersectedForeignKeys,
    PossibleObjectNameOverflow,
    TablesNotLinkedToOthers,
    ForeignKeysWithUnmatchedColumnType,
    TablesWithZeroOrOneColumn,
    ObjectsNotFollowingNamingConvention,
    ColumnsNotFollowingNamingConvention,
    PrimaryKeysWithVarchar,
    ColumnsWithFixedLengthVarchar,
    IndexesWithUnnecessaryWhereClause,
}

impl Diagnostic {
    /// Every registered diagnostic in reporting order.
    pub const ALL: [Diagnostic; 31] = [
        Diagnostic::InvalidIndexes,
        Diagnostic::DuplicatedIndexes,
        Diagnostic::IntersectedIndexes,
        Diagnostic::UnusedIndexes,
        Diagnostic::ForeignKeysWithoutIndex,
        Diagnostic::TablesWithMissingIndexes,
        Diagnostic::TablesWithoutPrimaryKey,
        Diagnostic::IndexesWithNullValues,
        Diagnostic::BloatedIndexes,
        Diagnostic::BloatedTables,
        Diagnostic::TablesWithoutDescription,
        Diagnostic::ColumnsWithoutDescription,
        Diagnostic::ColumnsWithJsonType,
        Diagnostic::ColumnsWithSerialTypes,
        Diagnostic::FunctionsWithoutDescription,
        Diagnostic::IndexesWithBoolean,
        Diagnostic::NotValidConstraints,
        Diagnostic::BtreeIndexesOnArrayColumns,
        Diagnostic::SequenceOverflow,
        Diagnostic::PrimaryKeysWithSerialTypes,
        Diagnostic::DuplicatedForeignKeys,
        Diagnostic::IntersectedForeignKeys,
        Diagnostic::PossibleObjectNameOverflow,
        Diagnostic::TablesNotLinkedToOthers,
        Diagnostic::ForeignKeysWithUnmatchedColumnType,
        Diagnostic::TablesWithZeroOrOneColumn,
        Diagnostic::ObjectsNotFollowingNamingConvention,
        Diagnostic::ColumnsNotFollowingNamingConvention,
        Diagnostic::PrimaryKeysWithVarchar,
        Diagnostic::ColumnsWithFixedLengthVarchar,
        Diagnostic::IndexesWithUnnecessaryWhereClause,
    ];

    pub fn all() -> impl Iterator<Item = Diagnostic> {
        Self::ALL.into_iter()
    }

    /// Identifier used as the query resource key and in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Diagnostic::InvalidIndexes => "invalid_indexes",
            Diagnostic::DuplicatedIndexes => "duplicated_indexes",
            Diagnostic::IntersectedIndexes => "intersected_indexes",
            Diagnostic::UnusedIndexes => "unused_indexes",
            Diagnostic::ForeignKeysWithoutIndex => "foreign_keys_without_index",
            Diagnostic::TablesWithMissingIndexes => "tables_with_missing_indexes",
            Diagnostic::TablesWithoutPrimaryKey => "tables_without_primary_key",
            Diagnostic::IndexesWithNullValues => "indexes_with_null_values",
            Diagnostic::BloatedIndexes => "bloated_indexes",
            Diagnostic::BloatedTables => "bloated_tables",
            Diagnostic::TablesWithoutDescription => "tables_without_description",
            Diagnostic::ColumnsWithoutDescription => "columns_without_description",
            Diagnostic::ColumnsWithJsonType => "columns_with_json_type",
            Diagnostic::ColumnsWithSerialTypes => "columns_with_serial_types",
            Diagnostic::FunctionsWithoutDescription => "functions_without_description",
            Diagnostic::IndexesWithBoolean => "indexes_with_boolean",
            Diagnostic::NotValidConstraints => "not_valid_constraints",
            Diagnostic::BtreeIndexesOnArrayColumns => "btree_indexes_on_array_columns",
            Diagnostic::SequenceOverflow => "sequence_overflow",
            Diagnostic::PrimaryKeysWithSerialTypes => "primary_keys_with_serial_types",
            Diagnostic::DuplicatedForeignKeys => "duplicated_foreign_keys",
            Diagnostic::IntersectedForeignKeys => "intersected_foreign_keys",
            Diagnostic::PossibleObjectNameOverflow => "possible_object_name_overflow",
            Diagnostic::TablesNotLinkedToOthers => "tables_not_linked_to_others",
            Diagnostic::ForeignKeysWithUnmatchedColumnType => {
                "foreign_keys_with_unmatched_column_type"
            }
            Diagnostic::TablesWithZeroOrOneColumn => "tables_with_zero_or_one_column",
            Diagnostic::ObjectsNotFollowingNamingConvention => {
                "objects_not_following_naming_convention"
            }
            Diagnostic::ColumnsNotFollowingNamingConvention => {
                "columns_not_following_naming_convention"
            }
            Diagnostic::PrimaryKeysWithVarchar => "primary_keys_with_varchar",
            Diagnostic::ColumnsWithFixedLengthVarchar => "columns_with_fixed_length_varchar",
            Diagnostic::IndexesWithUnnecessaryWhereClause => {
                "indexes_with_unnecessary_where_clause"
            }
        }
    }

    /// Human readable plural noun phrase for log messages.
    pub fn description(&self) -> &'static str {
        match self {
            Diagnostic::InvalidIndexes => "invalid (broken) indexes",
            Diagnostic::DuplicatedIndexes => "duplicated (completely identical) indexes",
            Diagnostic::IntersectedIndexes => "intersected (partially identical) indexes",
            Diagnostic::UnusedIndexes => "unused indexes",
            Diagnostic::ForeignKeysWithoutIndex => "foreign keys without associated index",
            Diagnostic::TablesWithMissingIndexes => "tables with missing indexes",
            Diagnostic::TablesWithoutPrimaryKey => "tables without primary key",
            Diagnostic::IndexesWithNullValues => "indexes with null values",
            Diagnostic::BloatedIndexes => "indexes with bloat",
            Diagnostic::BloatedTables => "tables with bloat",
            Diagnostic::TablesWithoutDescription => "tables without description",
            Diagnostic::ColumnsWithoutDescription => "columns without description",
            Diagnostic::ColumnsWithJsonType => "columns with json type",
            Diagnostic::ColumnsWithSerialTypes => "columns with serial types",
            Diagnostic::FunctionsWithoutDescription => "functions without description",
            Diagnostic::IndexesWithBoolean => "indexes with boolean",
            Diagnostic::NotValidConstraints => "not valid constraints",
            Diagnostic::BtreeIndexesOnArrayColumns => "btree indexes on array columns",
            Diagnostic::SequenceOverflow => "sequences with potential overflow",
            Diagnostic::PrimaryKeysWithSerialTypes => "primary keys with serial types",
            Diagnostic::DuplicatedForeignKeys => "duplicated (completely identical) foreign keys",
            Diagnostic::IntersectedForeignKeys => {
                "intersected (partially identical) foreign keys"
            }
            Diagnostic::PossibleObjectNameOverflow => "objects whose names may have been truncated",
            Diagnostic::TablesNotLinkedToOthers => "tables not linked to other tables",
            Diagnostic::ForeignKeysWithUnmatchedColumnType => {
                "foreign keys with unmatched column type"
            }
            Diagnostic::TablesWithZeroOrOneColumn => "tables with zero or one column",
            Diagnostic::ObjectsNotFollowingNamingConvention => {
                "objects not following naming convention"
            }
            Diagnostic::ColumnsNotFollowingNamingConvention => {
                "columns not following naming convention"
            }
            Diagnostic::PrimaryKeysWithVarchar => "primary keys with varchar",
            Diagnostic::ColumnsWithFixedLengthVarchar => "columns with fixed length varchar",
            Diagnostic::IndexesWithUnnecessaryWhereClause => {
                "indexes with unnecessary where clause"
            }
        }
    }

    /// Entity every row of this diagnostic maps into.
    pub fn entity_kind(&self) -> EntityKind {
        match self {
            Diagnostic::InvalidIndexes | Diagnostic::BtreeIndexesOnArrayColumns => {
                EntityKind::Index
            }
            Diagnostic::DuplicatedIndexes | Diagnostic::IntersectedIndexes => {
                EntityKind::DuplicatedIndexes
            }
            Diagnostic::UnusedIndexes => EntityKind::UnusedIndex,
            Diagnostic::ForeignKeysWithoutIndex | Diagnostic::ForeignKeysWithUnmatchedColumnType => {
                EntityKind::ForeignKey
            }
            Diagnostic::TablesWithMissingIndexes => EntityKind::TableWithMissingIndex,
            Diagnostic::TablesWithoutPrimaryKey
            | Diagnostic::TablesWithoutDescription
            | Diagnostic::TablesNotLinkedToOthers
            | Diagnostic::TablesWithZeroOrOneColumn => EntityKind::Table,
            Diagnostic::IndexesWithNullValues => EntityKind::IndexWithNulls,
            Diagnostic::BloatedIndexes => EntityKind::IndexWithBloat,
            Diagnostic::BloatedTables => EntityKind::TableWithBloat,
            Diagnostic::ColumnsWithoutDescription
            | Diagnostic::ColumnsWithJsonType
            | Diagnostic::ColumnsNotFollowingNamingConvention
            | Diagnostic::ColumnsWithFixedLengthVarchar => EntityKind::Column,
            Diagnostic::ColumnsWithSerialTypes | Diagnostic::PrimaryKeysWithSerialTypes => {
                EntityKind::ColumnWithSerialType
            }
            Diagnostic::FunctionsWithoutDescription => EntityKind::StoredFunction,
            Diagnostic::IndexesWithBoolean
            | Diagnostic::PrimaryKeysWithVarchar
            | Diagnostic::IndexesWithUnnecessaryWhereClause => EntityKind::IndexWithColumns,
            Diagnostic::NotValidConstraints => EntityKind::Constraint,
            Diagnostic::SequenceOverflow => EntityKind::SequenceState,
            Diagnostic::DuplicatedForeignKeys | Diagnostic::IntersectedForeignKeys => {
                EntityKind::DuplicatedForeignKeys
            }
            Diagnostic::PossibleObjectNameOverflow
            | Diagnostic::ObjectsNotFollowingNamingConvention => EntityKind::AnyObject,
        }
    }

    pub fn host_scope(&self) -> HostScope {
        match self {
            Diagnostic::UnusedIndexes
            | Diagnostic::TablesWithMissingIndexes
            | Diagnostic::BloatedIndexes
            | Diagnostic::BloatedTables => HostScope::Variant(MergeRule::MaxObserved),
            // an index build can fail on a single replica only
            Diagnostic::InvalidIndexes => HostScope::Variant(MergeRule::Union),
            _ => HostScope::Invariant,
        }
    }

    pub fn is_host_variant(&self) -> bool {
        matches!(self.host_scope(), HostScope::Variant(_))
    }

    pub fn parameters(&self) -> &'static [QueryParam] {
        match self {
            Diagnostic::BloatedIndexes | Diagnostic::BloatedTables => SCHEMA_AND_BLOAT,
            Diagnostic::SequenceOverflow => SCHEMA_AND_REMAINING,
            _ => SCHEMA_ONLY,
        }
    }

    /// Looks a diagnostic up by its identifier.
    pub fn resolve(id: &str) -> Result<Diagnostic> {
        let wanted = id.trim().to_ascii_lowercase();
        Self::all()
            .find(|d| d.name() == wanted)
            .ok_or_else(|| CatalogError::UnknownDiagnostic { id: id.to_string() })
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Diagnostic {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        Diagnostic::resolve(s)
    }
}
