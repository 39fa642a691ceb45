use super::validate::{not_blank, not_negative, valid_percent, Result};
use super::{
    identity_ordering, BloatAware, DbObject, Entity, EntityKind, PgObjectType, RawRow,
    TableNameAware, TableSizeAware,
};
use std::fmt;

/// A table together with its size on disk.
#[derive(Debug, Clone)]
pub struct Table {
    table_name: String,
    table_size_in_bytes: i64,
}

impl Table {
    pub fn new(table_name: impl Into<String>, table_size_in_bytes: i64) -> Result<Self> {
        Ok(Self {
            table_name: not_blank(table_name, "tableName")?,
            table_size_in_bytes: not_negative(table_size_in_bytes, "tableSizeInBytes")?,
        })
    }

    pub fn of(table_name: impl Into<String>) -> Result<Self> {
        Self::new(table_name, 0)
    }

    fn max_size(&mut self, other: &Table) {
        self.table_size_in_bytes = self.table_size_in_bytes.max(other.table_size_in_bytes);
    }
}

impl DbObject for Table {
    fn name(&self) -> String {
        self.table_name.clone()
    }

    fn object_type(&self) -> PgObjectType {
        PgObjectType::Table
    }
}

impl TableNameAware for Table {
    fn table_name(&self) -> &str {
        &self.table_name
    }
}

impl TableSizeAware for Table {
    fn table_size_in_bytes(&self) -> i64 {
        self.table_size_in_bytes
    }
}

impl Entity for Table {
    const KIND: EntityKind = EntityKind::Table;
    type Key = String;

    fn identity(&self) -> String {
        self.table_name.clone()
    }

    fn from_row(row: &RawRow) -> Result<Self> {
        let size = row.get_opt_i64("table_size")?.unwrap_or(0);
        Self::new(row.get_str("table_name")?, size)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes)", self.table_name, self.table_size_in_bytes)
    }
}

/// A table whose estimated bloat crossed the configured percentage.
#[derive(Debug, Clone)]
pub struct TableWithBloat {
    table: Table,
    bloat_size_in_bytes: i64,
    bloat_percentage: f64,
}

impl TableWithBloat {
    pub fn new(table: Table, bloat_size_in_bytes: i64, bloat_percentage: f64) -> Result<Self> {
        Ok(Self {
            table,
            bloat_size_in_bytes: not_negative(bloat_size_in_bytes, "bloatSizeInBytes")?,
            bloat_percentage: valid_percent(bloat_percentage, "bloatPercentage")?,
        })
    }

    pub fn table(&self) -> &Table {
        &self.table
    }
}

impl DbObject for TableWithBloat {
    fn name(&self) -> String {
        self.table.name()
    }

    fn object_type(&self) -> PgObjectType {
        PgObjectType::Table
    }
}

impl TableNameAware for TableWithBloat {
    fn table_name(&self) -> &str {
        self.table.table_name()
    }
}

impl TableSizeAware for TableWithBloat {
    fn table_size_in_bytes(&self) -> i64 {
        self.table.table_size_in_bytes
    }
}

impl BloatAware for TableWithBloat {
    fn bloat_size_in_bytes(&self) -> i64 {
        self.bloat_size_in_bytes
    }

    fn bloat_percentage(&self) -> f64 {
        self.bloat_percentage
    }
}

impl Entity for TableWithBloat {
    const KIND: EntityKind = EntityKind::TableWithBloat;
    type Key = String;

    fn identity(&self) -> String {
        self.table.identity()
    }

    fn from_row(row: &RawRow) -> Result<Self> {
        let table = Table::new(row.get_str("table_name")?, row.get_i64("table_size")?)?;
        Self::new(
            table,
            row.get_i64("bloat_size")?,
            row.get_f64("bloat_percentage")?,
        )
    }

    fn absorb_max(&mut self, other: &Self) {
        self.table.max_size(&other.table);
        self.bloat_size_in_bytes = self.bloat_size_in_bytes.max(other.bloat_size_in_bytes);
        self.bloat_percentage = self.bloat_percentage.max(other.bloat_percentage);
    }
}

impl fmt::Display for TableWithBloat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} bytes, bloat {} bytes / {:.2}%)",
            self.table.table_name,
            self.table.table_size_in_bytes,
            self.bloat_size_in_bytes,
            self.bloat_percentage
        )
    }
}

/// A table that is scanned sequentially far more often than through an index.
#[derive(Debug, Clone)]
pub struct TableWithMissingIndex {
    table: Table,
    seq_scans: i64,
    index_scans: i64,
}

impl TableWithMissingIndex {
    pub fn new(table: Table, seq_scans: i64, index_scans: i64) -> Result<Self> {
        Ok(Self {
            table,
            seq_scans: not_negative(seq_scans, "seqScans")?,
            index_scans: not_negative(index_scans, "indexScans")?,
        })
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn seq_scans(&self) -> i64 {
        self.seq_scans
    }

    pub fn index_scans(&self) -> i64 {
        self.index_scans
    }
}

impl DbObject for TableWithMissingIndex {
    fn name(&self) -> String {
        self.table.name()
    }

    fn object_type(&self) -> PgObjectType {
        PgObjectType::Table
    }
}

impl TableNameAware for TableWithMissingIndex {
    fn table_name(&self) -> &str {
        self.table.table_name()
    }
}

impl TableSizeAware for TableWithMissingIndex {
    fn table_size_in_bytes(&self) -> i64 {
        self.table.table_size_in_bytes
    }
}

impl Entity for TableWithMissingIndex {
    const KIND: EntityKind = EntityKind::TableWithMissingIndex;
    type Key = String;

    fn identity(&self) -> String {
        self.table.identity()
    }

    fn from_row(row: &RawRow) -> Result<Self> {
        let table = Table::new(row.get_str("table_name")?, row.get_i64("table_size")?)?;
        Self::new(table, row.get_i64("seq_scans")?, row.get_i64("index_scans")?)
    }

    fn absorb_max(&mut self, other: &Self) {
        self.table.max_size(&other.table);
        self.seq_scans = self.seq_scans.max(other.seq_scans);
        self.index_scans = self.index_scans.max(other.index_scans);
    }
}

impl fmt::Display for TableWithMissingIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} bytes, {} seq scans, {} index scans)",
            self.table.table_name, self.table.table_size_in_bytes, self.seq_scans, self.index_scans
        )
    }
}

identity_ordering!(Table, TableWithBloat, TableWithMissingIndex);
