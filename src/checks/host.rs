use super::exclusions::ExclusionFilter;
use crate::catalog::{Diagnostic, QueryParam};
use crate::cluster::{BoundValue, ConnectionError, HostConnection, HostIdentity, QueryRequest};
use crate::context::SchemaContext;
use crate::entities::{Entity, EntityMapper, ModelError, RowMapper};
use snafu::{ResultExt, Snafu};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Failure of one diagnostic on one host. Always recoverable at the cluster level.
#[derive(Debug, Snafu)]
pub enum HostError {
    #[snafu(display("{} unreachable while running {}: {}", host, diagnostic, source))]
    Unreachable {
        host: HostIdentity,
        diagnostic: Diagnostic,
        source: ConnectionError,
    },

    #[snafu(display("{} timed out after {:?} while running {}", host, after, diagnostic))]
    Timeout {
        host: HostIdentity,
        diagnostic: Diagnostic,
        after: Duration,
    },

    #[snafu(display("{} returned an invalid row for {}: {}", host, diagnostic, source))]
    InvalidEntity {
        host: HostIdentity,
        diagnostic: Diagnostic,
        source: ModelError,
    },
}

impl HostError {
    pub fn host(&self) -> &HostIdentity {
        match self {
            HostError::Unreachable { host, .. }
            | HostError::Timeout { host, .. }
            | HostError::InvalidEntity { host, .. } => host,
        }
    }
}

type Result<T, E = HostError> = std::result::Result<T, E>;

/// One diagnostic bound to one cluster member.
pub struct CheckOnHost<T> {
    diagnostic: Diagnostic,
    connection: Arc<dyn HostConnection>,
    sql: Arc<str>,
    mapper: Arc<dyn RowMapper<T>>,
}

impl<T> Clone for CheckOnHost<T> {
    fn clone(&self) -> Self {
        Self {
            diagnostic: self.diagnostic,
            connection: Arc::clone(&self.connection),
            sql: Arc::clone(&self.sql),
            mapper: Arc::clone(&self.mapper),
        }
    }
}

impl<T: Entity> CheckOnHost<T> {
    pub fn new(diagnostic: Diagnostic, connection: Arc<dyn HostConnection>, sql: Arc<str>) -> Self {
        Self {
            diagnostic,
            connection,
            sql,
            mapper: Arc::new(EntityMapper),
        }
    }

    /// Replaces the entity's own row mapping.
    pub fn with_mapper(mut self, mapper: Arc<dyn RowMapper<T>>) -> Self {
        self.mapper = mapper;
        self
    }

    pub fn diagnostic(&self) -> Diagnostic {
        self.diagnostic
    }

    pub fn host(&self) -> &HostIdentity {
        self.connection.host()
    }

    fn request(&self, ctx: &SchemaContext) -> QueryRequest {
        self.diagnostic.parameters().iter().fold(
            QueryRequest::new(self.diagnostic.name(), Arc::clone(&self.sql)),
            |request, param| {
                request.bind(match param {
                    QueryParam::SchemaName => BoundValue::Text(ctx.schema_name().to_string()),
                    QueryParam::BloatPercentageThreshold => {
                        BoundValue::Float(ctx.bloat_percentage_threshold())
                    }
                    QueryParam::RemainingPercentageThreshold => {
                        BoundValue::Float(ctx.remaining_percentage_threshold())
                    }
                })
            },
        )
    }

    /// Runs the query and maps every row, sorted by entity identity.
    ///
    /// A single malformed row fails the whole host result.
    pub async fn run(&self, ctx: &SchemaContext, timeout: Duration) -> Result<Vec<T>> {
        let host = self.host().clone();
        let request = self.request(ctx);
        let rows = match tokio::time::timeout(timeout, self.connection.execute(&request)).await {
            Ok(rows) => rows.context(UnreachableSnafu {
                host: host.clone(),
                diagnostic: self.diagnostic,
            })?,
            Err(_) => {
                return TimeoutSnafu {
                    host,
                    diagnostic: self.diagnostic,
                    after: timeout,
                }
                .fail()
            }
        };

        let mut entities = rows
            .iter()
            .map(|row| self.mapper.map(row))
            .collect::<std::result::Result<Vec<T>, ModelError>>()
            .context(InvalidEntitySnafu {
                host: host.clone(),
                diagnostic: self.diagnostic,
            })?;
        entities.sort();
        debug!("{} found {} item(s) on {}", self.diagnostic, entities.len(), host);
        Ok(entities)
    }

    /// [`CheckOnHost::run`] followed by the exclusion filter.
    pub async fn check(
        &self,
        ctx: &SchemaContext,
        filter: &ExclusionFilter<T>,
        timeout: Duration,
    ) -> Result<Vec<T>> {
        let entities = self.run(ctx, timeout).await?;
        Ok(filter.apply(entities))
    }
}
