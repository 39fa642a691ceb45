use crate::entities::RawRow;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use snafu::Snafu;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub const DEFAULT_PORT: u16 = 5432;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConnectionError {
    #[snafu(display("Failed to connect to {}: {}", host, source))]
    Connect {
        host: HostIdentity,
        source: sqlx::Error,
    },

    #[snafu(display("Query {} failed on {}: {}", key, host, source))]
    Query {
        host: HostIdentity,
        key: String,
        source: sqlx::Error,
    },

    #[snafu(display("Column {} has unsupported type {}", column, type_name))]
    UnsupportedColumnType { column: String, type_name: String },

    #[snafu(display("Host {} is unavailable: {}", host, message))]
    Unavailable { host: HostIdentity, message: String },

    #[snafu(display("Invalid host address: {:?}", address))]
    InvalidAddress { address: String },
}

type Result<T, E = ConnectionError> = std::result::Result<T, E>;

/// Address of one cluster member. Used as the dedup and ordering key of a topology.
///
/// Host names are lowercased so differently cased spellings of one member collapse.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HostIdentity {
    #[serde(deserialize_with = "lowercase_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn lowercase_host<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    String::deserialize(deserializer).map(|host| host.to_ascii_lowercase())
}

impl HostIdentity {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into().to_ascii_lowercase(),
            port,
        }
    }
}

impl fmt::Display for HostIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for HostIdentity {
    type Err = ConnectionError;

    /// Parses `host`, `host:port` or `[v6addr]:port`.
    fn from_str(address: &str) -> Result<Self> {
        let invalid = || ConnectionError::InvalidAddress {
            address: address.to_string(),
        };
        let address = address.trim();
        if address.is_empty() {
            return Err(invalid());
        }

        let (host, port) = if let Some(rest) = address.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
            match tail.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None if tail.is_empty() => (host, None),
                None => return Err(invalid()),
            }
        } else {
            match address.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (address, None),
            }
        };

        if host.trim().is_empty() {
            return Err(invalid());
        }
        let port = match port {
            Some(port) => port.parse::<u16>().map_err(|_| invalid())?,
            None => DEFAULT_PORT,
        };
        Ok(Self::new(host, port))
    }
}

/// Parameter value bound positionally to a diagnostic query.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundValue {
    Text(String),
    Float(f64),
}

/// One diagnostic query ready to be executed on a host.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub key: String,
    pub sql: Arc<str>,
    pub params: Vec<BoundValue>,
}

impl QueryRequest {
    pub fn new(key: impl Into<String>, sql: impl Into<Arc<str>>) -> Self {
        Self {
            key: key.into(),
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn bind(mut self, value: BoundValue) -> Self {
        self.params.push(value);
        self
    }
}

/// A live connection to a single cluster member.
#[async_trait]
pub trait HostConnection: Send + Sync + fmt::Debug {
    fn host(&self) -> &HostIdentity;

    async fn execute(&self, request: &QueryRequest) -> Result<Vec<RawRow>>;

    async fn close(&self);
}

/// Opens connections to cluster members.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn connect(&self, host: &HostIdentity) -> Result<Arc<dyn HostConnection>>;
}
