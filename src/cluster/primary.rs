use super::host::{HostConnection, QueryRequest};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Resource key of the probe query, reserved so it never collides with a diagnostic.
pub const PRIMARY_PROBE_KEY: &str = "primary_host_probe";

const PRIMARY_PROBE_SQL: &str = "select not pg_catalog.pg_is_in_recovery() as is_primary";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostRole {
    Primary,
    Replica,
    Unreachable,
}

impl HostRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostRole::Primary => "primary",
            HostRole::Replica => "replica",
            HostRole::Unreachable => "unreachable",
        }
    }
}

/// Decides whether a connection points at the current cluster primary.
#[async_trait]
pub trait PrimaryHostDeterminer: Send + Sync {
    async fn determine_role(&self, connection: &dyn HostConnection) -> HostRole;

    async fn is_primary(&self, connection: &dyn HostConnection) -> bool {
        self.determine_role(connection).await == HostRole::Primary
    }
}

/// Read-only `pg_is_in_recovery()` probe.
#[derive(Debug, Clone)]
pub struct RecoveryProbeDeterminer {
    timeout: Duration,
}

impl RecoveryProbeDeterminer {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for RecoveryProbeDeterminer {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl PrimaryHostDeterminer for RecoveryProbeDeterminer {
    async fn determine_role(&self, connection: &dyn HostConnection) -> HostRole {
        let request = QueryRequest::new(PRIMARY_PROBE_KEY, PRIMARY_PROBE_SQL);
        let rows = match tokio::time::timeout(self.timeout, connection.execute(&request)).await {
            Ok(Ok(rows)) => rows,
            Ok(Err(err)) => {
                warn!("Primary probe failed on {}: {}", connection.host(), err);
                return HostRole::Unreachable;
            }
            Err(_) => {
                warn!(
                    "Primary probe timed out on {} after {:?}",
                    connection.host(),
                    self.timeout
                );
                return HostRole::Unreachable;
            }
        };

        match rows.first().map(|row| row.get_bool("is_primary")) {
            Some(Ok(true)) => HostRole::Primary,
            Some(Ok(false)) => HostRole::Replica,
            Some(Err(err)) => {
                warn!("Unexpected primary probe result on {}: {}", connection.host(), err);
                HostRole::Unreachable
            }
            None => {
                warn!("Primary probe returned no rows on {}", connection.host());
                HostRole::Unreachable
            }
        }
    }
}
