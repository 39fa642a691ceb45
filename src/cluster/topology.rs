use super::host::{ConnectionError, ConnectionFactory, HostConnection, HostIdentity};
use super::primary::{HostRole, PrimaryHostDeterminer};
use itertools::Itertools;
use serde::Serialize;
use snafu::Snafu;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

#[derive(Debug, Snafu)]
pub enum TopologyError {
    #[snafu(display("No host addresses were supplied"))]
    NoHosts,

    #[snafu(display("Cluster unavailable: none of {} host(s) is reachable", attempted))]
    ClusterUnavailable { attempted: usize },

    #[snafu(display("Topology construction was cancelled"))]
    Cancelled,
}

type Result<T, E = TopologyError> = std::result::Result<T, E>;

/// A reachable cluster member with its resolved role.
#[derive(Debug, Clone)]
pub struct TopologyMember {
    identity: HostIdentity,
    role: HostRole,
    connection: Arc<dyn HostConnection>,
}

impl TopologyMember {
    pub fn identity(&self) -> &HostIdentity {
        &self.identity
    }

    pub fn role(&self) -> HostRole {
        self.role
    }

    pub fn is_primary(&self) -> bool {
        self.role == HostRole::Primary
    }

    pub fn connection(&self) -> &Arc<dyn HostConnection> {
        &self.connection
    }
}

/// Role summary of one member, detached from its connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberSummary {
    pub host: HostIdentity,
    pub role: HostRole,
}

enum Probe {
    Resolved(Arc<dyn HostConnection>, HostRole),
    Failed(ConnectionError),
    Cancelled,
}

/// Resolves once the batch asks every probe to stop, or once the batch is gone.
async fn stopped(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stop| *stop).await;
}

/// Members of one cluster for the lifetime of a single diagnostic batch.
///
/// Addresses keep the order in which they were supplied and at most one
/// reachable member is flagged primary. Addresses that could not be reached
/// while building stay listed so every diagnostic can account for them.
#[derive(Debug)]
pub struct ClusterTopology {
    addresses: Vec<HostIdentity>,
    members: Vec<TopologyMember>,
    unreachable: Vec<HostIdentity>,
}

impl ClusterTopology {
    /// Connects to every address concurrently and probes its role.
    ///
    /// Unreachable hosts are left out of the members. When several hosts claim
    /// to be primary the first one in input order wins and the others are
    /// demoted to replicas.
    pub async fn build(
        addresses: &[HostIdentity],
        factory: Arc<dyn ConnectionFactory>,
        determiner: Arc<dyn PrimaryHostDeterminer>,
    ) -> Result<Self> {
        Self::build_until(addresses, factory, determiner, std::future::pending::<()>()).await
    }

    /// Like [`ClusterTopology::build`], but stops as soon as `cancel` completes.
    ///
    /// Pending probes are told to stop and every connection opened so far is
    /// closed before [`TopologyError::Cancelled`] is returned.
    pub async fn build_until(
        addresses: &[HostIdentity],
        factory: Arc<dyn ConnectionFactory>,
        determiner: Arc<dyn PrimaryHostDeterminer>,
        cancel: impl Future<Output = ()>,
    ) -> Result<Self> {
        let addresses: Vec<HostIdentity> = addresses.iter().unique().cloned().collect();
        if addresses.is_empty() {
            return NoHostsSnafu.fail();
        }
        tokio::pin!(cancel);

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut probes = JoinSet::new();
        for (position, identity) in addresses.iter().cloned().enumerate() {
            let factory = Arc::clone(&factory);
            let determiner = Arc::clone(&determiner);
            let mut stop = stop_rx.clone();
            probes.spawn(async move {
                let connected = tokio::select! {
                    connected = factory.connect(&identity) => connected,
                    _ = stopped(&mut stop) => return (position, identity, Probe::Cancelled),
                };
                let connection = match connected {
                    Ok(connection) => connection,
                    Err(err) => return (position, identity, Probe::Failed(err)),
                };
                let probe = tokio::select! {
                    role = determiner.determine_role(connection.as_ref()) => {
                        Probe::Resolved(connection, role)
                    }
                    _ = stopped(&mut stop) => {
                        connection.close().await;
                        Probe::Cancelled
                    }
                };
                (position, identity, probe)
            });
        }

        let mut probed = Vec::with_capacity(addresses.len());
        let mut unreachable = Vec::new();
        let mut cancelled = false;
        loop {
            let joined = tokio::select! {
                joined = probes.join_next() => match joined {
                    Some(joined) => joined,
                    None => break,
                },
                _ = &mut cancel, if !cancelled => {
                    debug!("Stopping {} pending host probe(s)", probes.len());
                    cancelled = true;
                    let _ = stop_tx.send(true);
                    continue;
                }
            };
            match joined {
                Ok((position, identity, Probe::Resolved(connection, HostRole::Unreachable))) => {
                    warn!("Dropping {} from topology: primary probe failed", identity);
                    connection.close().await;
                    debug!("Closed connection to {} (position {})", identity, position);
                    unreachable.push(identity);
                }
                Ok((position, identity, Probe::Resolved(connection, role))) => {
                    probed.push((
                        position,
                        TopologyMember {
                            identity,
                            role,
                            connection,
                        },
                    ));
                }
                Ok((_, identity, Probe::Failed(err))) => {
                    warn!("Dropping {} from topology: {}", identity, err);
                    unreachable.push(identity);
                }
                Ok((_, identity, Probe::Cancelled)) => {
                    debug!("Probe of {} stopped", identity);
                }
                Err(err) => warn!("Host probe task failed: {}", err),
            }
        }

        if cancelled {
            for (_, member) in &probed {
                member.connection.close().await;
            }
            warn!(
                "Topology construction cancelled, closed {} connection(s)",
                probed.len()
            );
            return CancelledSnafu.fail();
        }

        if probed.is_empty() {
            return ClusterUnavailableSnafu {
                attempted: addresses.len(),
            }
            .fail();
        }

        probed.sort_by_key(|(position, _)| *position);
        let mut members: Vec<TopologyMember> =
            probed.into_iter().map(|(_, member)| member).collect();
        unreachable.sort_by_key(|host| addresses.iter().position(|a| a == host));

        let mut primary: Option<HostIdentity> = None;
        for member in members.iter_mut().filter(|m| m.is_primary()) {
            if let Some(elected) = &primary {
                warn!(
                    "Split brain: {} also reports primary, keeping {} and treating {} as replica",
                    member.identity, elected, member.identity
                );
                member.role = HostRole::Replica;
                continue;
            }
            primary = Some(member.identity.clone());
        }

        match &primary {
            Some(primary) => info!(
                "Cluster topology: primary {}, {} reachable host(s), {} unreachable",
                primary,
                members.len(),
                unreachable.len()
            ),
            None => warn!(
                "No primary among {} reachable host(s); running in replica-only mode",
                members.len()
            ),
        }

        Ok(Self {
            addresses,
            members,
            unreachable,
        })
    }

    pub fn members(&self) -> &[TopologyMember] {
        &self.members
    }

    pub fn primary(&self) -> Option<&TopologyMember> {
        self.members.iter().find(|m| m.is_primary())
    }

    pub fn has_primary(&self) -> bool {
        self.primary().is_some()
    }

    /// No reachable member is primary; invariant diagnostics are answered by replicas.
    pub fn is_replica_only(&self) -> bool {
        !self.has_primary()
    }

    /// Addresses that could not be connected to or probed, in input order.
    pub fn unreachable(&self) -> &[HostIdentity] {
        &self.unreachable
    }

    /// Input position of `host`, used to order host lists the way they were supplied.
    pub fn position(&self, host: &HostIdentity) -> Option<usize> {
        self.addresses.iter().position(|a| a == host)
    }

    /// Hosts to try, in order, for a host-invariant diagnostic: the primary
    /// first, then the remaining members in input order.
    pub fn invariant_candidates(&self) -> Vec<&TopologyMember> {
        self.primary()
            .into_iter()
            .chain(self.members.iter().filter(|m| !m.is_primary()))
            .collect()
    }

    /// Every supplied address with its role, unreachable ones included.
    pub fn summary(&self) -> Vec<MemberSummary> {
        self.addresses
            .iter()
            .map(|host| MemberSummary {
                host: host.clone(),
                role: self
                    .members
                    .iter()
                    .find(|m| m.identity() == host)
                    .map_or(HostRole::Unreachable, TopologyMember::role),
            })
            .collect()
    }

    /// Closes every member connection.
    pub async fn close(&self) {
        for member in &self.members {
            member.connection.close().await;
        }
        debug!("Closed {} cluster connection(s)", self.members.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::memory::{InMemoryCluster, InMemoryHost};
    use crate::cluster::primary::RecoveryProbeDeterminer;
    use std::time::Duration;

    fn host(name: &str) -> HostIdentity {
        HostIdentity::new(name, 5432)
    }

    async fn build(cluster: &InMemoryCluster, names: &[&str]) -> Result<ClusterTopology> {
        let addresses: Vec<HostIdentity> = names.iter().map(|n| host(n)).collect();
        ClusterTopology::build(
            &addresses,
            Arc::new(cluster.clone()),
            Arc::new(RecoveryProbeDeterminer::default()),
        )
        .await
    }

    #[tokio::test]
    async fn keeps_input_order_and_dedups() {
        let cluster = InMemoryCluster::new([
            InMemoryHost::replica(host("r1")),
            InMemoryHost::primary(host("p")),
            InMemoryHost::replica(host("r2")),
        ]);
        let topology = build(&cluster, &["r1", "p", "r1", "r2"]).await.unwrap();

        let order: Vec<&str> = topology.members().iter().map(|m| m.identity().host.as_str()).collect();
        assert_eq!(order, vec!["r1", "p", "r2"]);
        assert_eq!(topology.primary().unwrap().identity(), &host("p"));

        let candidates: Vec<&str> = topology
            .invariant_candidates()
            .iter()
            .map(|m| m.identity().host.as_str())
            .collect();
        assert_eq!(candidates, vec!["p", "r1", "r2"]);
    }

    #[tokio::test]
    async fn split_brain_keeps_first_primary() {
        let cluster = InMemoryCluster::new([
            InMemoryHost::primary(host("a")),
            InMemoryHost::primary(host("b")),
        ]);
        let topology = build(&cluster, &["b", "a"]).await.unwrap();
        assert_eq!(topology.primary().unwrap().identity(), &host("b"));
        assert_eq!(topology.members()[1].role(), HostRole::Replica);
    }

    #[tokio::test]
    async fn unreachable_hosts_are_dropped() {
        let cluster = InMemoryCluster::new([
            InMemoryHost::unreachable(host("p")),
            InMemoryHost::replica(host("r1")),
        ]);
        let topology = build(&cluster, &["p", "r1"]).await.unwrap();
        assert_eq!(topology.members().len(), 1);
        assert!(topology.is_replica_only());
        assert_eq!(topology.unreachable(), &[host("p")]);
        assert_eq!(
            topology.summary(),
            vec![
                MemberSummary {
                    host: host("p"),
                    role: HostRole::Unreachable,
                },
                MemberSummary {
                    host: host("r1"),
                    role: HostRole::Replica,
                },
            ]
        );
    }

    #[tokio::test]
    async fn mixed_case_addresses_share_one_member() {
        let cluster = InMemoryCluster::new([InMemoryHost::primary(host("db1"))]);
        let addresses = vec![
            "DB1:5432".parse::<HostIdentity>().unwrap(),
            "db1:5432".parse::<HostIdentity>().unwrap(),
        ];
        let topology = ClusterTopology::build(
            &addresses,
            Arc::new(cluster.clone()),
            Arc::new(RecoveryProbeDeterminer::default()),
        )
        .await
        .unwrap();
        assert_eq!(topology.members().len(), 1);
        assert_eq!(cluster.connected(), vec![host("db1")]);
    }

    #[tokio::test]
    async fn cancelled_build_closes_opened_connections() {
        let cluster = InMemoryCluster::new([
            InMemoryHost::primary(host("p")),
            InMemoryHost::replica(host("r1")),
            InMemoryHost::replica(host("r2")).with_delay(Duration::from_millis(500)),
        ]);
        let addresses: Vec<HostIdentity> = ["p", "r1", "r2"].iter().map(|n| host(n)).collect();
        let result = ClusterTopology::build_until(
            &addresses,
            Arc::new(cluster.clone()),
            Arc::new(RecoveryProbeDeterminer::default()),
            tokio::time::sleep(Duration::from_millis(50)),
        )
        .await;

        assert!(matches!(result, Err(TopologyError::Cancelled)));
        assert_eq!(cluster.connected().len(), 3);
        assert_eq!(cluster.open_connections(), 0);
    }

    #[tokio::test]
    async fn all_unreachable_is_cluster_unavailable() {
        let cluster = InMemoryCluster::new([
            InMemoryHost::unreachable(host("p")),
            InMemoryHost::unreachable(host("r1")),
        ]);
        assert!(matches!(
            build(&cluster, &["p", "r1", "r2"]).await,
            Err(TopologyError::ClusterUnavailable { attempted: 3 })
        ));
        assert!(matches!(build(&cluster, &[]).await, Err(TopologyError::NoHosts)));
    }

    #[tokio::test]
    async fn close_releases_every_connection() {
        let cluster = InMemoryCluster::new([
            InMemoryHost::primary(host("p")),
            InMemoryHost::replica(host("r1")),
        ]);
        let topology = build(&cluster, &["p", "r1"]).await.unwrap();
        assert_eq!(cluster.open_connections(), 2);
        topology.close().await;
        assert_eq!(cluster.open_connections(), 0);
    }
}
