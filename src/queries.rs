use crate::catalog::{CatalogError, Diagnostic};
use snafu::{ResultExt, Snafu};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Snafu)]
pub enum QueryError {
    #[snafu(display("Failed to read query directory {}: {}", path.display(), source))]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Failed to read query file {}: {}", path.display(), source))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Invalid query file name: {:?}", name))]
    InvalidFileName { name: String },

    #[snafu(display("Query file {} is empty", path.display()))]
    EmptyQuery { path: PathBuf },
}

type Result<T, E = QueryError> = std::result::Result<T, E>;

const SQL_EXTENSION: &str = ".sql";

macro_rules! embedded_queries {
    ($($key:literal),+ $(,)?) => {
        &[$(($key, include_str!(concat!("../sql/", $key, ".sql")))),+]
    };
}

const EMBEDDED: &[(&str, &str)] = embedded_queries!(
    "invalid_indexes",
    "duplicated_indexes",
    "intersected_indexes",
    "unused_indexes",
    "foreign_keys_without_index",
    "tables_with_missing_indexes",
    "tables_without_primary_key",
    "indexes_with_null_values",
    "bloated_indexes",
    "bloated_tables",
    "tables_without_description",
    "columns_without_description",
    "columns_with_json_type",
    "columns_with_serial_types",
    "functions_without_description",
    "indexes_with_boolean",
    "not_valid_constraints",
    "btree_indexes_on_array_columns",
    "sequence_overflow",
    "primary_keys_with_serial_types",
    "duplicated_foreign_keys",
    "intersected_foreign_keys",
    "possible_object_name_overflow",
    "tables_not_linked_to_others",
    "foreign_keys_with_unmatched_column_type",
    "tables_with_zero_or_one_column",
    "objects_not_following_naming_convention",
    "columns_not_following_naming_convention",
    "primary_keys_with_varchar",
    "columns_with_fixed_length_varchar",
    "indexes_with_unnecessary_where_clause",
);

/// SQL text for diagnostics, keyed by query resource key.
///
/// The text is opaque here: it is only ever handed to a connection together
/// with bound parameters.
#[derive(Debug, Clone, Default)]
pub struct QueryCatalog {
    queries: BTreeMap<String, Arc<str>>,
}

impl QueryCatalog {
    pub fn embedded() -> Self {
        let queries = EMBEDDED
            .iter()
            .map(|(key, sql)| (key.to_string(), Arc::from(*sql)))
            .collect();
        Self { queries }
    }

    /// Loads only the `*.sql` files found in `dir`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let mut catalog = Self::default();
        catalog.load_dir(dir.as_ref())?;
        Ok(catalog)
    }

    /// Embedded queries, with any `*.sql` file in `dir` taking precedence.
    pub fn with_overrides(dir: impl AsRef<Path>) -> Result<Self> {
        let mut catalog = Self::embedded();
        catalog.load_dir(dir.as_ref())?;
        Ok(catalog)
    }

    fn load_dir(&mut self, dir: &Path) -> Result<()> {
        let entries = fs::read_dir(dir).context(ReadDirSnafu { path: dir })?;
        for entry in entries {
            let entry = entry.context(ReadDirSnafu { path: dir })?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let Some(key) = query_key(&file_name)? else {
                debug!("Skipping non-SQL file {}", path.display());
                continue;
            };
            let sql = fs::read_to_string(&path).context(ReadFileSnafu { path: &path })?;
            if sql.trim().is_empty() {
                return EmptyQuerySnafu { path }.fail();
            }
            if Diagnostic::resolve(&key).is_err() {
                warn!("Query file {} does not match any diagnostic", path.display());
            }
            debug!("Loaded query {} from {}", key, path.display());
            self.queries.insert(key, Arc::from(sql));
        }
        Ok(())
    }

    pub fn insert(&mut self, key: impl Into<String>, sql: impl Into<Arc<str>>) {
        self.queries.insert(key.into(), sql.into());
    }

    pub fn get(&self, key: &str) -> Option<Arc<str>> {
        self.queries.get(key).cloned()
    }

    pub fn sql_for(&self, diagnostic: Diagnostic) -> Result<Arc<str>, CatalogError> {
        self.get(diagnostic.name())
            .ok_or(CatalogError::MissingQuery { diagnostic })
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Diagnostics that have no query text registered.
    pub fn missing(&self) -> Vec<Diagnostic> {
        Diagnostic::all()
            .filter(|d| !self.queries.contains_key(d.name()))
            .collect()
    }

    /// Fails on the first registered diagnostic without a query.
    pub fn validate(&self) -> Result<(), CatalogError> {
        match self.missing().first() {
            Some(diagnostic) => Err(CatalogError::MissingQuery {
                diagnostic: *diagnostic,
            }),
            None => Ok(()),
        }
    }
}

/// Returns the resource key for an `.sql` file name, `None` for other files.
fn query_key(file_name: &str) -> Result<Option<String>> {
    if file_name.trim().is_empty() {
        return InvalidFileNameSnafu { name: file_name }.fail();
    }
    let lower = file_name.to_ascii_lowercase();
    if !lower.ends_with(SQL_EXTENSION) {
        return Ok(None);
    }
    let stem = &file_name[..file_name.len() - SQL_EXTENSION.len()];
    if stem.trim().is_empty() {
        return InvalidFileNameSnafu { name: file_name }.fail();
    }
    Ok(Some(stem.to_ascii_lowercase()))
}
