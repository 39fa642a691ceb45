use crate::checks::Exclusions;
use crate::cluster::{HostIdentity, PgConnectionFactory};
use crate::context::{
    SchemaContext, DEFAULT_BLOAT_PERCENTAGE_THRESHOLD, DEFAULT_REMAINING_PERCENTAGE_THRESHOLD,
    DEFAULT_SCHEMA_NAME,
};
use crate::entities::ModelError;
use crate::queries::{QueryCatalog, QueryError};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("Failed to read config file: {}", source))]
    FileRead { source: std::io::Error },

    #[snafu(display("Failed to parse YAML config: {}", source))]
    YamlParse { source: serde_yaml::Error },

    #[snafu(display("Invalid schema settings: {}", source))]
    InvalidSchema { source: ModelError },

    #[snafu(display("Invalid value for {}: {}", field, message))]
    InvalidValue { field: &'static str, message: String },

    #[snafu(display("Failed to load queries: {}", source))]
    Queries { source: QueryError },
}

type Result<T, E = ConfigError> = std::result::Result<T, E>;

fn default_schema() -> String {
    DEFAULT_SCHEMA_NAME.to_string()
}

fn default_bloat_threshold() -> f64 {
    DEFAULT_BLOAT_PERCENTAGE_THRESHOLD
}

fn default_remaining_threshold() -> f64 {
    DEFAULT_REMAINING_PERCENTAGE_THRESHOLD
}

fn default_query_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

/// Connection and check settings for one cluster.
#[derive(Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub hosts: Vec<HostIdentity>,
    pub database: String,
    pub username: String,
    pub password: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_bloat_threshold")]
    pub bloat_percentage_threshold: f64,
    #[serde(default = "default_remaining_threshold")]
    pub remaining_percentage_threshold: f64,
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Directory of `*.sql` files overriding the embedded queries.
    #[serde(default)]
    pub queries_dir: Option<PathBuf>,
    #[serde(default)]
    pub exclusions: Exclusions,
}

impl fmt::Debug for ClusterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterConfig")
            .field("name", &self.name)
            .field("hosts", &self.hosts)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"***")
            .field("schema", &self.schema)
            .field("query_timeout_secs", &self.query_timeout_secs)
            .field("queries_dir", &self.queries_dir)
            .finish_non_exhaustive()
    }
}

impl ClusterConfig {
    pub fn from_connection_params(
        hosts: Vec<HostIdentity>,
        database: String,
        username: String,
        password: String,
        schema: String,
    ) -> Self {
        Self {
            name: None,
            hosts,
            database,
            username,
            password,
            schema,
            bloat_percentage_threshold: DEFAULT_BLOAT_PERCENTAGE_THRESHOLD,
            remaining_percentage_threshold: DEFAULT_REMAINING_PERCENTAGE_THRESHOLD,
            query_timeout_secs: default_query_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            queries_dir: None,
            exclusions: Exclusions::default(),
        }
    }

    pub fn from_config_file(path: &str) -> Result<Vec<Self>> {
        let content = fs::read_to_string(path).context(FileReadSnafu)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Vec<Self>> {
        let configs: Vec<ClusterConfig> = serde_yaml::from_str(content).context(YamlParseSnafu)?;
        for config in &configs {
            config.validate()?;
        }
        Ok(configs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.hosts.is_empty() {
            return InvalidValueSnafu {
                field: "hosts",
                message: "at least one host is required",
            }
            .fail();
        }
        if self.query_timeout_secs == 0 {
            return InvalidValueSnafu {
                field: "query_timeout_secs",
                message: "must be positive",
            }
            .fail();
        }
        self.exclusions
            .validate()
            .map_err(|err| ConfigError::InvalidValue {
                field: "exclusions",
                message: err.to_string(),
            })?;
        self.schema_context()?;
        Ok(())
    }

    /// Label used in logs and report headers.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{}@{}", self.database, self.hosts.iter().join(",")),
        }
    }

    pub fn schema_context(&self) -> Result<SchemaContext> {
        SchemaContext::new(
            &self.schema,
            self.bloat_percentage_threshold,
            self.remaining_percentage_threshold,
        )
        .context(InvalidSchemaSnafu)
    }

    pub fn query_catalog(&self) -> Result<QueryCatalog> {
        match &self.queries_dir {
            Some(dir) => QueryCatalog::with_overrides(dir).context(QueriesSnafu),
            None => Ok(QueryCatalog::embedded()),
        }
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn connection_factory(&self) -> PgConnectionFactory {
        PgConnectionFactory::new(
            &self.database,
            &self.username,
            &self.password,
            Duration::from_secs(self.connect_timeout_secs),
        )
    }
}
