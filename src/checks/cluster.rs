use super::exclusions::ExclusionFilter;
use super::host::{CheckOnHost, HostError};
use crate::catalog::{Diagnostic, HostScope, MergeRule};
use crate::cluster::{ClusterTopology, HostConnection, HostIdentity};
use crate::context::SchemaContext;
use crate::entities::{Entity, RowMapper};
use snafu::Snafu;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, warn};

#[derive(Debug, Snafu)]
pub enum CheckError {
    #[snafu(display(
        "{} failed on every reachable host ({} failure(s))",
        diagnostic,
        failures.len()
    ))]
    AllHostsFailed {
        diagnostic: Diagnostic,
        failures: Vec<HostError>,
    },
}

type Result<T, E = CheckError> = std::result::Result<T, E>;

/// Reconciled findings of one diagnostic across the cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutcome<T> {
    pub diagnostic: Diagnostic,
    pub findings: Vec<T>,
    /// Hosts that answered.
    pub queried_hosts: Vec<HostIdentity>,
    /// Hosts whose result is missing from `findings`.
    pub failed_hosts: Vec<HostIdentity>,
    /// The cluster primary is among `queried_hosts`. False in replica-only mode.
    pub answered_by_primary: bool,
}

impl<T> CheckOutcome<T> {
    /// Some hosts that should have contributed did not.
    pub fn is_degraded(&self) -> bool {
        !self.failed_hosts.is_empty()
    }
}

/// One diagnostic bound to a cluster topology.
///
/// Host-invariant diagnostics run on the primary, falling back to replicas in
/// input order. Host-variant diagnostics run on every reachable member
/// concurrently and their results are merged per [`MergeRule`].
///
/// Hosts that were unreachable while the topology was built count as failed
/// for every variant diagnostic, and for invariant ones a replica had to answer.
pub struct CheckOnCluster<T> {
    diagnostic: Diagnostic,
    topology: Arc<ClusterTopology>,
    sql: Arc<str>,
    mapper: Option<Arc<dyn RowMapper<T>>>,
    query_timeout: Duration,
}

impl<T: Entity> CheckOnCluster<T> {
    pub fn new(
        diagnostic: Diagnostic,
        topology: Arc<ClusterTopology>,
        sql: Arc<str>,
        query_timeout: Duration,
    ) -> Self {
        Self {
            diagnostic,
            topology,
            sql,
            mapper: None,
            query_timeout,
        }
    }

    pub fn with_mapper(mut self, mapper: Arc<dyn RowMapper<T>>) -> Self {
        self.mapper = Some(mapper);
        self
    }

    pub fn diagnostic(&self) -> Diagnostic {
        self.diagnostic
    }

    fn on_host(&self, connection: &Arc<dyn HostConnection>) -> CheckOnHost<T> {
        let check = CheckOnHost::new(self.diagnostic, Arc::clone(connection), Arc::clone(&self.sql));
        match &self.mapper {
            Some(mapper) => check.with_mapper(Arc::clone(mapper)),
            None => check,
        }
    }

    /// Runs the diagnostic and returns its reconciled, filtered findings in natural order.
    ///
    /// Dropping the returned future aborts every in-flight host query.
    pub async fn run(
        &self,
        ctx: &SchemaContext,
        filter: &ExclusionFilter<T>,
    ) -> Result<CheckOutcome<T>> {
        let mut outcome = match self.diagnostic.host_scope() {
            HostScope::Invariant => self.run_invariant(ctx).await?,
            HostScope::Variant(rule) => self.run_variant(ctx, rule).await?,
        };
        outcome.findings = filter.apply(outcome.findings);
        outcome.findings.sort();
        Ok(outcome)
    }

    async fn run_invariant(&self, ctx: &SchemaContext) -> Result<CheckOutcome<T>> {
        let mut failures = Vec::new();
        for member in self.topology.invariant_candidates() {
            match self
                .on_host(member.connection())
                .run(ctx, self.query_timeout)
                .await
            {
                Ok(findings) => {
                    debug!("{} answered by {}", self.diagnostic, member.identity());
                    let mut failed_hosts: Vec<HostIdentity> =
                        failures.iter().map(|f: &HostError| f.host().clone()).collect();
                    if !member.is_primary() {
                        // the primary may be among the hosts that never connected
                        failed_hosts.extend(self.topology.unreachable().iter().cloned());
                    }
                    return Ok(CheckOutcome {
                        diagnostic: self.diagnostic,
                        findings,
                        queried_hosts: vec![member.identity().clone()],
                        failed_hosts: self.in_input_order(failed_hosts),
                        answered_by_primary: member.is_primary(),
                    });
                }
                Err(err) => {
                    warn!("{}; trying the next host", err);
                    failures.push(err);
                }
            }
        }
        AllHostsFailedSnafu {
            diagnostic: self.diagnostic,
            failures,
        }
        .fail()
    }

    async fn run_variant(&self, ctx: &SchemaContext, rule: MergeRule) -> Result<CheckOutcome<T>> {
        let mut tasks = JoinSet::new();
        for (position, member) in self.topology.members().iter().enumerate() {
            let check = self.on_host(member.connection());
            let ctx = ctx.clone();
            let timeout = self.query_timeout;
            tasks.spawn(async move { (position, check.run(&ctx, timeout).await) });
        }

        let mut answers = Vec::with_capacity(self.topology.members().len());
        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((position, Ok(findings))) => answers.push((position, findings)),
                Ok((_, Err(err))) => {
                    warn!("{}; continuing with the remaining hosts", err);
                    failures.push(err);
                }
                Err(err) => warn!("{} task failed: {}", self.diagnostic, err),
            }
        }

        if answers.is_empty() {
            return AllHostsFailedSnafu {
                diagnostic: self.diagnostic,
                failures,
            }
            .fail();
        }

        // merge in topology order so Union keeps the earliest host's copy
        answers.sort_by_key(|(position, _)| *position);
        let members = self.topology.members();
        let queried_hosts = answers
            .iter()
            .map(|(position, _)| members[*position].identity().clone())
            .collect();
        let answered_by_primary = answers
            .iter()
            .any(|(position, _)| members[*position].is_primary());
        let failed_hosts = self.in_input_order(
            self.topology
                .unreachable()
                .iter()
                .cloned()
                .chain(failures.iter().map(|f| f.host().clone()))
                .collect(),
        );

        Ok(CheckOutcome {
            diagnostic: self.diagnostic,
            findings: reconcile(answers.into_iter().map(|(_, findings)| findings), rule),
            queried_hosts,
            failed_hosts,
            answered_by_primary,
        })
    }

    fn in_input_order(&self, mut hosts: Vec<HostIdentity>) -> Vec<HostIdentity> {
        hosts.sort_by_key(|host| self.topology.position(host));
        hosts.dedup();
        hosts
    }
}

/// Folds per-host findings into one list keyed by entity identity.
pub fn reconcile<T: Entity>(per_host: impl IntoIterator<Item = Vec<T>>, rule: MergeRule) -> Vec<T> {
    let mut merged: BTreeMap<T::Key, T> = BTreeMap::new();
    for entity in per_host.into_iter().flatten() {
        match merged.entry(entity.identity()) {
            Entry::Vacant(slot) => {
                slot.insert(entity);
            }
            Entry::Occupied(mut slot) => {
                if rule == MergeRule::MaxObserved {
                    slot.get_mut().absorb_max(&entity);
                }
            }
        }
    }
    merged.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Index, UnusedIndex};

    fn unused(index: &str, scans: i64) -> UnusedIndex {
        UnusedIndex::new("t", index, 100, scans).unwrap()
    }

    #[test]
    fn max_observed_keeps_largest_statistic() {
        let merged = reconcile(
            vec![vec![unused("i1", 0), unused("i2", 1)], vec![unused("i1", 3)]],
            MergeRule::MaxObserved,
        );
        let scans: Vec<i64> = merged.iter().map(|u| u.index_scans()).collect();
        assert_eq!(scans, vec![3, 1]);
    }

    #[test]
    fn union_keeps_every_object_once() {
        let merged = reconcile(
            vec![
                vec![Index::new("t", "b").unwrap()],
                vec![Index::new("t", "a").unwrap(), Index::new("t", "b").unwrap()],
            ],
            MergeRule::Union,
        );
        let names: Vec<&str> = merged.iter().map(|i| i.index_name()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn degraded_only_with_failed_hosts() {
        let mut outcome = CheckOutcome::<Index> {
            diagnostic: Diagnostic::InvalidIndexes,
            findings: Vec::new(),
            queried_hosts: vec![HostIdentity::new("p", 5432)],
            failed_hosts: Vec::new(),
            answered_by_primary: true,
        };
        assert!(!outcome.is_degraded());
        outcome.failed_hosts.push(HostIdentity::new("r", 5432));
        assert!(outcome.is_degraded());
    }
}
