use super::host::{
    BoundValue, ConnectSnafu, ConnectionError, ConnectionFactory, HostConnection, HostIdentity,
    QueryRequest, QuerySnafu,
};
use crate::entities::RawRow;
use async_trait::async_trait;
use serde_json::Value;
use snafu::ResultExt;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Row, TypeInfo};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

type Result<T, E = ConnectionError> = std::result::Result<T, E>;

const APPLICATION_NAME: &str = "pghealth";

/// Credentials shared by every member of one cluster.
#[derive(Clone)]
pub struct PgConnectionFactory {
    database: String,
    username: String,
    password: String,
    connect_timeout: Duration,
}

impl PgConnectionFactory {
    pub fn new(
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            database: database.into(),
            username: username.into(),
            password: password.into(),
            connect_timeout,
        }
    }

    fn options_for(&self, host: &HostIdentity) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&host.host)
            .port(host.port)
            .database(&self.database)
            .username(&self.username)
            .password(&self.password)
            .application_name(APPLICATION_NAME)
    }
}

impl fmt::Debug for PgConnectionFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgConnectionFactory")
            .field("database", &self.database)
            .field("username", &self.username)
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ConnectionFactory for PgConnectionFactory {
    async fn connect(&self, host: &HostIdentity) -> Result<Arc<dyn HostConnection>> {
        info!("Connecting to PostgreSQL at {}", host);

        let pool = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(self.connect_timeout)
            .connect_with(self.options_for(host))
            .await
            .context(ConnectSnafu { host: host.clone() })?;

        debug!("Connected to {} database {}", host, self.database);
        Ok(Arc::new(PgHostConnection {
            host: host.clone(),
            pool,
        }))
    }
}

/// A small pool bound to one cluster member.
#[derive(Debug)]
pub struct PgHostConnection {
    host: HostIdentity,
    pool: PgPool,
}

#[async_trait]
impl HostConnection for PgHostConnection {
    fn host(&self) -> &HostIdentity {
        &self.host
    }

    async fn execute(&self, request: &QueryRequest) -> Result<Vec<RawRow>> {
        let mut query = sqlx::query(&request.sql);
        for param in &request.params {
            query = match param {
                BoundValue::Text(value) => query.bind(value.as_str()),
                BoundValue::Float(value) => query.bind(*value),
            };
        }

        let rows = query.fetch_all(&self.pool).await.context(QuerySnafu {
            host: self.host.clone(),
            key: request.key.as_str(),
        })?;
        debug!("{} returned {} rows on {}", request.key, rows.len(), self.host);

        rows.iter()
            .map(|row| self.to_raw_row(row, &request.key))
            .collect()
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

impl PgHostConnection {
    fn to_raw_row(&self, row: &PgRow, key: &str) -> Result<RawRow> {
        let mut raw = RawRow::new();
        for column in row.columns() {
            let index = column.ordinal();
            let decoded: std::result::Result<Value, sqlx::Error> =
                match column.type_info().name() {
                    "TEXT" | "VARCHAR" | "NAME" | "BPCHAR" => {
                        row.try_get::<Option<String>, _>(index).map(Value::from)
                    }
                    "INT2" => row.try_get::<Option<i16>, _>(index).map(Value::from),
                    "INT4" => row.try_get::<Option<i32>, _>(index).map(Value::from),
                    "INT8" => row.try_get::<Option<i64>, _>(index).map(Value::from),
                    "FLOAT4" => row.try_get::<Option<f32>, _>(index).map(Value::from),
                    "FLOAT8" => row.try_get::<Option<f64>, _>(index).map(Value::from),
                    "BOOL" => row.try_get::<Option<bool>, _>(index).map(Value::from),
                    "TEXT[]" | "VARCHAR[]" | "NAME[]" => {
                        row.try_get::<Option<Vec<String>>, _>(index).map(Value::from)
                    }
                    "BOOL[]" => row.try_get::<Option<Vec<bool>>, _>(index).map(Value::from),
                    "INT8[]" => row.try_get::<Option<Vec<i64>>, _>(index).map(Value::from),
                    other => {
                        return Err(ConnectionError::UnsupportedColumnType {
                            column: column.name().to_string(),
                            type_name: other.to_string(),
                        })
                    }
                };
            let value = decoded.context(QuerySnafu {
                host: self.host.clone(),
                key,
            })?;
            raw.insert(column.name(), value);
        }
        Ok(raw)
    }
}
