use super::validate::{
    not_blank, not_negative, same_table, valid_percent, ModelError, Result, UnparseableSnafu,
};
use super::{
    columns_from_row, identity_ordering, BloatAware, Column, DbObject, Entity, EntityKind,
    IndexNameAware, IndexSizeAware, PgObjectType, RawRow, TableNameAware,
};
use itertools::Itertools;
use std::fmt;

/// An index identified by its table and its own name.
#[derive(Debug, Clone)]
pub struct Index {
    table_name: String,
    index_name: String,
}

impl Index {
    pub fn new(table_name: impl Into<String>, index_name: impl Into<String>) -> Result<Self> {
        Ok(Self {
            table_name: not_blank(table_name, "tableName")?,
            index_name: not_blank(index_name, "indexName")?,
        })
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }
}

impl DbObject for Index {
    fn name(&self) -> String {
        self.index_name.clone()
    }

    fn object_type(&self) -> PgObjectType {
        PgObjectType::Index
    }
}

impl TableNameAware for Index {
    fn table_name(&self) -> &str {
        &self.table_name
    }
}

impl IndexNameAware for Index {
    fn index_names(&self) -> Vec<&str> {
        vec![self.index_name.as_str()]
    }
}

impl Entity for Index {
    const KIND: EntityKind = EntityKind::Index;
    type Key = (String, String);

    fn identity(&self) -> (String, String) {
        (self.table_name.clone(), self.index_name.clone())
    }

    fn from_row(row: &RawRow) -> Result<Self> {
        Self::new(row.get_str("table_name")?, row.get_str("index_name")?)
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.index_name, self.table_name)
    }
}

/// An index together with its size on disk.
#[derive(Debug, Clone)]
pub struct IndexWithSize {
    index: Index,
    index_size_in_bytes: i64,
}

impl IndexWithSize {
    pub fn new(
        table_name: impl Into<String>,
        index_name: impl Into<String>,
        index_size_in_bytes: i64,
    ) -> Result<Self> {
        Ok(Self {
            index: Index::new(table_name, index_name)?,
            index_size_in_bytes: not_negative(index_size_in_bytes, "indexSizeInBytes")?,
        })
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn index_name(&self) -> &str {
        self.index.index_name()
    }

    fn max_size(&mut self, other: &IndexWithSize) {
        self.index_size_in_bytes = self.index_size_in_bytes.max(other.index_size_in_bytes);
    }
}

impl DbObject for IndexWithSize {
    fn name(&self) -> String {
        self.index.name()
    }

    fn object_type(&self) -> PgObjectType {
        PgObjectType::Index
    }
}

impl TableNameAware for IndexWithSize {
    fn table_name(&self) -> &str {
        self.index.table_name()
    }
}

impl IndexNameAware for IndexWithSize {
    fn index_names(&self) -> Vec<&str> {
        self.index.index_names()
    }
}

impl IndexSizeAware for IndexWithSize {
    fn index_size_in_bytes(&self) -> i64 {
        self.index_size_in_bytes
    }
}

impl Entity for IndexWithSize {
    const KIND: EntityKind = EntityKind::IndexWithSize;
    type Key = (String, String);

    fn identity(&self) -> (String, String) {
        self.index.identity()
    }

    fn from_row(row: &RawRow) -> Result<Self> {
        Self::new(
            row.get_str("table_name")?,
            row.get_str("index_name")?,
            row.get_i64("index_size")?,
        )
    }

    fn absorb_max(&mut self, other: &Self) {
        self.max_size(other);
    }
}

impl fmt::Display for IndexWithSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes)", self.index, self.index_size_in_bytes)
    }
}

/// An index that is rarely or never used for scans.
#[derive(Debug, Clone)]
pub struct UnusedIndex {
    index: IndexWithSize,
    index_scans: i64,
}

impl UnusedIndex {
    pub fn new(
        table_name: impl Into<String>,
        index_name: impl Into<String>,
        index_size_in_bytes: i64,
        index_scans: i64,
    ) -> Result<Self> {
        Ok(Self {
            index: IndexWithSize::new(table_name, index_name, index_size_in_bytes)?,
            index_scans: not_negative(index_scans, "indexScans")?,
        })
    }

    pub fn index_name(&self) -> &str {
        self.index.index_name()
    }

    pub fn index_scans(&self) -> i64 {
        self.index_scans
    }
}

impl DbObject for UnusedIndex {
    fn name(&self) -> String {
        self.index.name()
    }

    fn object_type(&self) -> PgObjectType {
        PgObjectType::Index
    }
}

impl TableNameAware for UnusedIndex {
    fn table_name(&self) -> &str {
        self.index.table_name()
    }
}

impl IndexNameAware for UnusedIndex {
    fn index_names(&self) -> Vec<&str> {
        self.index.index_names()
    }
}

impl IndexSizeAware for UnusedIndex {
    fn index_size_in_bytes(&self) -> i64 {
        self.index.index_size_in_bytes
    }
}

impl Entity for UnusedIndex {
    const KIND: EntityKind = EntityKind::UnusedIndex;
    type Key = (String, String);

    fn identity(&self) -> (String, String) {
        self.index.identity()
    }

    fn from_row(row: &RawRow) -> Result<Self> {
        Self::new(
            row.get_str("table_name")?,
            row.get_str("index_name")?,
            row.get_i64("index_size")?,
            row.get_i64("index_scans")?,
        )
    }

    fn absorb_max(&mut self, other: &Self) {
        self.index.max_size(&other.index);
        self.index_scans = self.index_scans.max(other.index_scans);
    }
}

impl fmt::Display for UnusedIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {} scans", self.index, self.index_scans)
    }
}

/// An index whose estimated bloat crossed the configured percentage.
#[derive(Debug, Clone)]
pub struct IndexWithBloat {
    index: IndexWithSize,
    bloat_size_in_bytes: i64,
    bloat_percentage: f64,
}

impl IndexWithBloat {
    pub fn new(
        index: IndexWithSize,
        bloat_size_in_bytes: i64,
        bloat_percentage: f64,
    ) -> Result<Self> {
        Ok(Self {
            index,
            bloat_size_in_bytes: not_negative(bloat_size_in_bytes, "bloatSizeInBytes")?,
            bloat_percentage: valid_percent(bloat_percentage, "bloatPercentage")?,
        })
    }
}

impl DbObject for IndexWithBloat {
    fn name(&self) -> String {
        self.index.name()
    }

    fn object_type(&self) -> PgObjectType {
        PgObjectType::Index
    }
}

impl TableNameAware for IndexWithBloat {
    fn table_name(&self) -> &str {
        self.index.table_name()
    }
}

impl IndexNameAware for IndexWithBloat {
    fn index_names(&self) -> Vec<&str> {
        self.index.index_names()
    }
}

impl IndexSizeAware for IndexWithBloat {
    fn index_size_in_bytes(&self) -> i64 {
        self.index.index_size_in_bytes
    }
}

impl BloatAware for IndexWithBloat {
    fn bloat_size_in_bytes(&self) -> i64 {
        self.bloat_size_in_bytes
    }

    fn bloat_percentage(&self) -> f64 {
        self.bloat_percentage
    }
}

impl Entity for IndexWithBloat {
    const KIND: EntityKind = EntityKind::IndexWithBloat;
    type Key = (String, String);

    fn identity(&self) -> (String, String) {
        self.index.identity()
    }

    fn from_row(row: &RawRow) -> Result<Self> {
        Self::new(
            IndexWithSize::from_row(row)?,
            row.get_i64("bloat_size")?,
            row.get_f64("bloat_percentage")?,
        )
    }

    fn absorb_max(&mut self, other: &Self) {
        self.index.max_size(&other.index);
        self.bloat_size_in_bytes = self.bloat_size_in_bytes.max(other.bloat_size_in_bytes);
        self.bloat_percentage = self.bloat_percentage.max(other.bloat_percentage);
    }
}

impl fmt::Display for IndexWithBloat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, bloat {} bytes / {:.2}%",
            self.index, self.bloat_size_in_bytes, self.bloat_percentage
        )
    }
}

/// A non-unique index built over nullable columns.
#[derive(Debug, Clone)]
pub struct IndexWithNulls {
    index: IndexWithSize,
    nullable_column: String,
}

impl IndexWithNulls {
    pub fn new(index: IndexWithSize, nullable_column: impl Into<String>) -> Result<Self> {
        Ok(Self {
            index,
            nullable_column: not_blank(nullable_column, "nullableColumn")?,
        })
    }

    pub fn nullable_column(&self) -> &str {
        &self.nullable_column
    }
}

impl DbObject for IndexWithNulls {
    fn name(&self) -> String {
        self.index.name()
    }

    fn object_type(&self) -> PgObjectType {
        PgObjectType::Index
    }
}

impl TableNameAware for IndexWithNulls {
    fn table_name(&self) -> &str {
        self.index.table_name()
    }
}

impl IndexNameAware for IndexWithNulls {
    fn index_names(&self) -> Vec<&str> {
        self.index.index_names()
    }
}

impl IndexSizeAware for IndexWithNulls {
    fn index_size_in_bytes(&self) -> i64 {
        self.index.index_size_in_bytes
    }
}

impl Entity for IndexWithNulls {
    const KIND: EntityKind = EntityKind::IndexWithNulls;
    type Key = (String, String);

    fn identity(&self) -> (String, String) {
        self.index.identity()
    }

    fn from_row(row: &RawRow) -> Result<Self> {
        Self::new(
            IndexWithSize::from_row(row)?,
            row.get_str("nullable_fields")?,
        )
    }
}

impl fmt::Display for IndexWithNulls {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, nullable: {}", self.index, self.nullable_column)
    }
}

/// An index reported together with the columns that triggered the finding.
#[derive(Debug, Clone)]
pub struct IndexWithColumns {
    index: IndexWithSize,
    columns: Vec<Column>,
}

impl IndexWithColumns {
    pub fn new(index: IndexWithSize, columns: Vec<Column>) -> Result<Self> {
        if columns.is_empty() {
            return Err(ModelError::EmptyList { field: "columns" });
        }
        if columns
            .iter()
            .any(|column| column.table_name() != index.table_name())
        {
            return Err(ModelError::MixedTables);
        }
        Ok(Self { index, columns })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }
}

impl DbObject for IndexWithColumns {
    fn name(&self) -> String {
        self.index.name()
    }

    fn object_type(&self) -> PgObjectType {
        PgObjectType::Index
    }
}

impl TableNameAware for IndexWithColumns {
    fn table_name(&self) -> &str {
        self.index.table_name()
    }
}

impl IndexNameAware for IndexWithColumns {
    fn index_names(&self) -> Vec<&str> {
        self.index.index_names()
    }
}

impl IndexSizeAware for IndexWithColumns {
    fn index_size_in_bytes(&self) -> i64 {
        self.index.index_size_in_bytes
    }
}

impl Entity for IndexWithColumns {
    const KIND: EntityKind = EntityKind::IndexWithColumns;
    type Key = (String, String);

    fn identity(&self) -> (String, String) {
        self.index.identity()
    }

    fn from_row(row: &RawRow) -> Result<Self> {
        let index = IndexWithSize::from_row(row)?;
        let columns = columns_from_row(row, index.table_name(), "columns", "columns_not_null")?;
        Self::new(index, columns)
    }
}

impl fmt::Display for IndexWithColumns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, columns [{}]",
            self.index,
            self.columns.iter().map(|c| c.column_name()).join(", ")
        )
    }
}

/// Two or more indexes of one table that cover the same (or overlapping) keys.
///
/// Identity is the table plus the *set* of index names: neither the order the
/// rows arrived in nor the cached total size take part in equality.
#[derive(Debug, Clone)]
pub struct DuplicatedIndexes {
    table_name: String,
    indexes: Vec<IndexWithSize>,
    total_size: i64,
}

impl DuplicatedIndexes {
    pub fn new(indexes: Vec<IndexWithSize>) -> Result<Self> {
        let table_name = same_table(indexes.iter().map(|i| i.table_name()), "duplicatedIndexes")?;
        let mut indexes = indexes;
        indexes.sort();
        indexes.dedup();
        if indexes.len() < 2 {
            return Err(ModelError::TooFewItems {
                field: "duplicatedIndexes",
            });
        }
        let total_size = indexes.iter().map(|i| i.index_size_in_bytes).sum();
        Ok(Self {
            table_name,
            indexes,
            total_size,
        })
    }

    /// Parses the aggregate form `idx=<name>, size=<bytes>; idx=<name>, size=<bytes>`.
    pub fn parse(table_name: impl Into<String>, aggregate: &str) -> Result<Self> {
        let table_name = not_blank(table_name, "tableName")?;
        let aggregate = not_blank(aggregate, "duplicatedAsString")?;
        let indexes = aggregate
            .split(';')
            .map(|part| parse_index_with_size(&table_name, part))
            .collect::<Result<Vec<_>>>()?;
        Self::new(indexes)
    }

    pub fn indexes(&self) -> &[IndexWithSize] {
        &self.indexes
    }

    pub fn total_size(&self) -> i64 {
        self.total_size
    }
}

fn parse_index_with_size(table_name: &str, part: &str) -> Result<IndexWithSize> {
    let mut name = None;
    let mut size = None;
    for field in part.split(',') {
        match field.trim().split_once('=') {
            Some(("idx", value)) => name = Some(value.trim()),
            Some(("size", value)) => {
                size = Some(value.trim().parse::<i64>().map_err(|_| {
                    UnparseableSnafu {
                        what: "index size",
                        value: value.trim(),
                    }
                    .build()
                })?)
            }
            _ => {}
        }
    }
    match (name, size) {
        (Some(name), Some(size)) => IndexWithSize::new(table_name, name, size),
        _ => UnparseableSnafu {
            what: "duplicated index entry",
            value: part.trim(),
        }
        .fail(),
    }
}

impl DbObject for DuplicatedIndexes {
    fn name(&self) -> String {
        self.indexes.iter().map(|i| i.index_name()).join(",")
    }

    fn object_type(&self) -> PgObjectType {
        PgObjectType::Index
    }
}

impl TableNameAware for DuplicatedIndexes {
    fn table_name(&self) -> &str {
        &self.table_name
    }
}

impl IndexNameAware for DuplicatedIndexes {
    fn index_names(&self) -> Vec<&str> {
        self.indexes.iter().map(|i| i.index_name()).collect()
    }
}

impl IndexSizeAware for DuplicatedIndexes {
    fn index_size_in_bytes(&self) -> i64 {
        self.total_size
    }
}

impl Entity for DuplicatedIndexes {
    const KIND: EntityKind = EntityKind::DuplicatedIndexes;
    type Key = (String, Vec<String>);

    fn identity(&self) -> (String, Vec<String>) {
        // indexes are kept sorted by (table, name), so this is already canonical
        (
            self.table_name.clone(),
            self.indexes.iter().map(|i| i.index_name().to_string()).collect(),
        )
    }

    fn from_row(row: &RawRow) -> Result<Self> {
        Self::parse(row.get_str("table_name")?, row.get_str("duplicated_indexes")?)
    }
}

impl fmt::Display for DuplicatedIndexes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (total {} bytes): [{}]",
            self.table_name,
            self.total_size,
            self.indexes
                .iter()
                .map(|i| format!("{} ({} bytes)", i.index_name(), i.index_size_in_bytes))
                .join(", ")
        )
    }
}

identity_ordering!(
    Index,
    IndexWithSize,
    UnusedIndex,
    IndexWithBloat,
    IndexWithNulls,
    IndexWithColumns,
    DuplicatedIndexes,
);
