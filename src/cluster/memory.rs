//! In-process cluster used by tests and dry runs.
//!
//! Every host answers from canned rows keyed by query resource key. Hosts can be
//! made unreachable, slow, or failing for selected queries, and every executed
//! query is recorded so callers can assert which hosts were contacted.

use super::host::{ConnectionError, ConnectionFactory, HostConnection, HostIdentity, QueryRequest};
use super::primary::{HostRole, PRIMARY_PROBE_KEY};
use crate::entities::RawRow;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

type Result<T, E = ConnectionError> = std::result::Result<T, E>;

#[derive(Debug, Clone)]
pub struct InMemoryHost {
    identity: HostIdentity,
    role: HostRole,
    rows: HashMap<String, Vec<RawRow>>,
    failing_keys: HashSet<String>,
    delay: Option<Duration>,
}

impl InMemoryHost {
    pub fn primary(identity: HostIdentity) -> Self {
        Self::with_role(identity, HostRole::Primary)
    }

    pub fn replica(identity: HostIdentity) -> Self {
        Self::with_role(identity, HostRole::Replica)
    }

    /// A host that refuses connections.
    pub fn unreachable(identity: HostIdentity) -> Self {
        Self::with_role(identity, HostRole::Unreachable)
    }

    fn with_role(identity: HostIdentity, role: HostRole) -> Self {
        Self {
            identity,
            role,
            rows: HashMap::new(),
            failing_keys: HashSet::new(),
            delay: None,
        }
    }

    pub fn identity(&self) -> &HostIdentity {
        &self.identity
    }

    pub fn with_rows(mut self, key: impl Into<String>, rows: Vec<RawRow>) -> Self {
        self.rows.insert(key.into(), rows);
        self
    }

    /// Makes the query with this resource key fail on this host.
    pub fn failing(mut self, key: impl Into<String>) -> Self {
        self.failing_keys.insert(key.into());
        self
    }

    /// Every query on this host, the primary probe included, waits this long first.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[derive(Debug, Default)]
struct CallLog {
    executed: Vec<(HostIdentity, String)>,
    connected: Vec<HostIdentity>,
    closed: Vec<HostIdentity>,
}

/// A set of [`InMemoryHost`]s acting as a [`ConnectionFactory`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryCluster {
    hosts: Arc<HashMap<HostIdentity, InMemoryHost>>,
    log: Arc<Mutex<CallLog>>,
}

impl InMemoryCluster {
    pub fn new(hosts: impl IntoIterator<Item = InMemoryHost>) -> Self {
        let hosts = hosts
            .into_iter()
            .map(|host| (host.identity.clone(), host))
            .collect();
        Self {
            hosts: Arc::new(hosts),
            log: Arc::default(),
        }
    }

    fn log(&self) -> MutexGuard<'_, CallLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Diagnostic queries executed on `host`, in call order. Primary probes are not recorded.
    pub fn executed_on(&self, host: &HostIdentity) -> Vec<String> {
        self.log()
            .executed
            .iter()
            .filter(|(h, _)| h == host)
            .map(|(_, key)| key.clone())
            .collect()
    }

    pub fn executed(&self) -> Vec<(HostIdentity, String)> {
        self.log().executed.clone()
    }

    pub fn connected(&self) -> Vec<HostIdentity> {
        self.log().connected.clone()
    }

    pub fn closed(&self) -> Vec<HostIdentity> {
        self.log().closed.clone()
    }

    /// Connections opened and not closed yet.
    pub fn open_connections(&self) -> usize {
        let log = self.log();
        log.connected.len().saturating_sub(log.closed.len())
    }
}

#[async_trait]
impl ConnectionFactory for InMemoryCluster {
    async fn connect(&self, host: &HostIdentity) -> Result<Arc<dyn HostConnection>> {
        let Some(member) = self.hosts.get(host) else {
            return Err(ConnectionError::Unavailable {
                host: host.clone(),
                message: "unknown host".to_string(),
            });
        };
        if member.role == HostRole::Unreachable {
            return Err(ConnectionError::Unavailable {
                host: host.clone(),
                message: "connection refused".to_string(),
            });
        }
        self.log().connected.push(host.clone());
        Ok(Arc::new(InMemoryConnection {
            member: member.clone(),
            cluster: self.clone(),
        }))
    }
}

#[derive(Debug)]
struct InMemoryConnection {
    member: InMemoryHost,
    cluster: InMemoryCluster,
}

#[async_trait]
impl HostConnection for InMemoryConnection {
    fn host(&self) -> &HostIdentity {
        &self.member.identity
    }

    async fn execute(&self, request: &QueryRequest) -> Result<Vec<RawRow>> {
        let host = &self.member.identity;
        if request.key != PRIMARY_PROBE_KEY {
            self.cluster
                .log()
                .executed
                .push((host.clone(), request.key.clone()));
        }
        if let Some(delay) = self.member.delay {
            tokio::time::sleep(delay).await;
        }

        if request.key == PRIMARY_PROBE_KEY {
            let is_primary = self.member.role == HostRole::Primary;
            return Ok(vec![RawRow::new().with("is_primary", is_primary)]);
        }
        if self.member.failing_keys.contains(&request.key) {
            return Err(ConnectionError::Unavailable {
                host: host.clone(),
                message: format!("query {} failed", request.key),
            });
        }
        Ok(self
            .member
            .rows
            .get(&request.key)
            .cloned()
            .unwrap_or_default())
    }

    async fn close(&self) {
        self.cluster.log().closed.push(self.member.identity.clone());
    }
}
