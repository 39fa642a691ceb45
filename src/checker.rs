use crate::catalog::{CatalogError, Diagnostic};
use crate::checks::{
    skip_bloat_under_threshold, skip_indexes_by_name, skip_small_indexes, skip_small_tables,
    skip_tables_by_name, ChecksRegistry, ExclusionFilter, Exclusions, ExclusionsError,
    RegistryError,
};
use crate::cluster::{
    ClusterTopology, ConnectionFactory, HostIdentity, PrimaryHostDeterminer,
    RecoveryProbeDeterminer, TopologyError,
};
use crate::context::SchemaContext;
use crate::entities::{
    AnyObject, Column, ColumnWithSerialType, Constraint, DuplicatedForeignKeys, DuplicatedIndexes,
    Entity, ForeignKey, Index, IndexWithBloat, IndexWithColumns, IndexWithNulls, SequenceState,
    StoredFunction, Table, TableWithBloat, TableWithMissingIndex, UnusedIndex,
};
use crate::models::{DiagnosticReport, HealthReport};
use crate::queries::QueryCatalog;
use snafu::{ResultExt, Snafu};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Snafu)]
pub enum CheckerError {
    #[snafu(display("Invalid exclusions: {}", source))]
    InvalidExclusions { source: ExclusionsError },

    #[snafu(display("Query catalog is incomplete: {}", source))]
    IncompleteCatalog { source: CatalogError },

    #[snafu(display("Failed to build cluster topology: {}", source))]
    Topology { source: TopologyError },

    #[snafu(display("Failed to resolve diagnostic: {}", source))]
    Registry { source: RegistryError },

    #[snafu(display("Diagnostic batch was cancelled"))]
    Cancelled,
}

type Result<T, E = CheckerError> = std::result::Result<T, E>;

/// Runs every diagnostic against one cluster and collects one report per diagnostic.
///
/// Each batch builds its own topology and closes every connection before it
/// returns, whether it succeeds, fails or is cancelled.
pub struct HealthChecker {
    hosts: Vec<HostIdentity>,
    factory: Arc<dyn ConnectionFactory>,
    determiner: Arc<dyn PrimaryHostDeterminer>,
    queries: QueryCatalog,
    query_timeout: Duration,
    cluster_name: Option<String>,
}

impl HealthChecker {
    pub fn new(hosts: Vec<HostIdentity>, factory: Arc<dyn ConnectionFactory>) -> Self {
        Self {
            hosts,
            factory,
            determiner: Arc::new(RecoveryProbeDeterminer::default()),
            queries: QueryCatalog::embedded(),
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            cluster_name: None,
        }
    }

    pub fn with_determiner(mut self, determiner: Arc<dyn PrimaryHostDeterminer>) -> Self {
        self.determiner = determiner;
        self
    }

    pub fn with_queries(mut self, queries: QueryCatalog) -> Self {
        self.queries = queries;
        self
    }

    pub fn with_query_timeout(mut self, query_timeout: Duration) -> Self {
        self.query_timeout = query_timeout;
        self
    }

    pub fn with_cluster_name(mut self, name: impl Into<String>) -> Self {
        self.cluster_name = Some(name.into());
        self
    }

    pub async fn log_all(&self, exclusions: &Exclusions, ctx: &SchemaContext) -> Result<HealthReport> {
        self.log_all_until(exclusions, ctx, std::future::pending::<()>())
            .await
    }

    /// Like [`HealthChecker::log_all`], but gives up as soon as `cancel` completes.
    ///
    /// On cancellation in-flight host queries are aborted, the topology is
    /// closed and no partial result is returned.
    pub async fn log_all_until(
        &self,
        exclusions: &Exclusions,
        ctx: &SchemaContext,
        cancel: impl Future<Output = ()>,
    ) -> Result<HealthReport> {
        exclusions.validate().context(InvalidExclusionsSnafu)?;
        self.queries.validate().context(IncompleteCatalogSnafu)?;
        tokio::pin!(cancel);

        info!("Checking {} host(s) in schema {}", self.hosts.len(), ctx);
        let topology = ClusterTopology::build_until(
            &self.hosts,
            Arc::clone(&self.factory),
            Arc::clone(&self.determiner),
            cancel.as_mut(),
        )
        .await;
        let topology = match topology {
            Err(TopologyError::Cancelled) => {
                warn!("Diagnostic batch cancelled while building the topology");
                return CancelledSnafu.fail();
            }
            topology => Arc::new(topology.context(TopologySnafu)?),
        };
        if topology.is_replica_only() {
            warn!("No primary reachable, invariant diagnostics will be answered by replicas");
        }

        let reports = tokio::select! {
            reports = self.run_all(&topology, exclusions, ctx) => Some(reports),
            _ = &mut cancel => None,
        };
        topology.close().await;

        let Some(reports) = reports else {
            warn!("Diagnostic batch cancelled, partial results discarded");
            return CancelledSnafu.fail();
        };
        let report = HealthReport {
            cluster: self.cluster_name.clone(),
            schema: ctx.schema_name().to_string(),
            replica_only: topology.is_replica_only(),
            members: topology.summary(),
            reports: reports?,
        };
        for line in report.log_lines() {
            debug!("{}", line);
        }
        Ok(report)
    }

    async fn run_all(
        &self,
        topology: &Arc<ClusterTopology>,
        exclusions: &Exclusions,
        ctx: &SchemaContext,
    ) -> Result<Vec<DiagnosticReport>> {
        let registry = ChecksRegistry::new(Arc::clone(topology), &self.queries, self.query_timeout)
            .context(RegistrySnafu)?;
        let mut reports = Vec::with_capacity(Diagnostic::ALL.len());
        for diagnostic in Diagnostic::all() {
            reports.push(run_diagnostic(&registry, diagnostic, exclusions, ctx).await?);
        }
        Ok(reports)
    }
}

/// Dispatches `diagnostic` to its entity type and the exclusion filter the caller configured for it.
async fn run_diagnostic(
    registry: &ChecksRegistry,
    diagnostic: Diagnostic,
    exclusions: &Exclusions,
    ctx: &SchemaContext,
) -> Result<DiagnosticReport> {
    match diagnostic {
        Diagnostic::InvalidIndexes => {
            run_check::<Index>(registry, diagnostic, ctx, ExclusionFilter::keep_all()).await
        }
        Diagnostic::DuplicatedIndexes => {
            let filter = skip_indexes_by_name(ctx, &exclusions.duplicated_indexes);
            run_check::<DuplicatedIndexes>(registry, diagnostic, ctx, filter).await
        }
        Diagnostic::IntersectedIndexes => {
            let filter = skip_indexes_by_name(ctx, &exclusions.intersected_indexes);
            run_check::<DuplicatedIndexes>(registry, diagnostic, ctx, filter).await
        }
        Diagnostic::UnusedIndexes => {
            let filter = skip_small_indexes::<UnusedIndex>(exclusions.index_size_threshold_bytes)
                .and(skip_indexes_by_name(ctx, &exclusions.unused_indexes));
            run_check::<UnusedIndex>(registry, diagnostic, ctx, filter).await
        }
        Diagnostic::ForeignKeysWithoutIndex | Diagnostic::ForeignKeysWithUnmatchedColumnType => {
            run_check::<ForeignKey>(registry, diagnostic, ctx, ExclusionFilter::keep_all()).await
        }
        Diagnostic::TablesWithMissingIndexes => {
            let filter = skip_small_tables::<TableWithMissingIndex>(exclusions.table_size_threshold_bytes)
                .and(skip_tables_by_name(ctx, &exclusions.tables_with_missing_indexes));
            run_check::<TableWithMissingIndex>(registry, diagnostic, ctx, filter).await
        }
        Diagnostic::TablesWithoutPrimaryKey => {
            let filter = skip_small_tables::<Table>(exclusions.table_size_threshold_bytes)
                .and(skip_tables_by_name(ctx, &exclusions.tables_without_primary_key));
            run_check::<Table>(registry, diagnostic, ctx, filter).await
        }
        Diagnostic::IndexesWithNullValues => {
            let filter = skip_indexes_by_name(ctx, &exclusions.indexes_with_null_values);
            run_check::<IndexWithNulls>(registry, diagnostic, ctx, filter).await
        }
        Diagnostic::BloatedIndexes => {
            let filter = skip_bloat_under_threshold::<IndexWithBloat>(
                exclusions.index_bloat_size_threshold_bytes,
                exclusions.index_bloat_percentage_threshold,
            )
            .and(skip_small_indexes(exclusions.index_size_threshold_bytes));
            run_check::<IndexWithBloat>(registry, diagnostic, ctx, filter).await
        }
        Diagnostic::BloatedTables => {
            let filter = skip_bloat_under_threshold::<TableWithBloat>(
                exclusions.table_bloat_size_threshold_bytes,
                exclusions.table_bloat_percentage_threshold,
            )
            .and(skip_small_tables(exclusions.table_size_threshold_bytes));
            run_check::<TableWithBloat>(registry, diagnostic, ctx, filter).await
        }
        Diagnostic::TablesWithoutDescription
        | Diagnostic::TablesNotLinkedToOthers
        | Diagnostic::TablesWithZeroOrOneColumn => {
            run_check::<Table>(registry, diagnostic, ctx, ExclusionFilter::keep_all()).await
        }
        Diagnostic::ColumnsWithoutDescription
        | Diagnostic::ColumnsWithJsonType
        | Diagnostic::ColumnsNotFollowingNamingConvention
        | Diagnostic::ColumnsWithFixedLengthVarchar => {
            run_check::<Column>(registry, diagnostic, ctx, ExclusionFilter::keep_all()).await
        }
        Diagnostic::ColumnsWithSerialTypes | Diagnostic::PrimaryKeysWithSerialTypes => {
            run_check::<ColumnWithSerialType>(registry, diagnostic, ctx, ExclusionFilter::keep_all()).await
        }
        Diagnostic::FunctionsWithoutDescription => {
            run_check::<StoredFunction>(registry, diagnostic, ctx, ExclusionFilter::keep_all()).await
        }
        Diagnostic::IndexesWithBoolean
        | Diagnostic::PrimaryKeysWithVarchar
        | Diagnostic::IndexesWithUnnecessaryWhereClause => {
            run_check::<IndexWithColumns>(registry, diagnostic, ctx, ExclusionFilter::keep_all()).await
        }
        Diagnostic::NotValidConstraints => {
            run_check::<Constraint>(registry, diagnostic, ctx, ExclusionFilter::keep_all()).await
        }
        Diagnostic::BtreeIndexesOnArrayColumns => {
            let filter = skip_indexes_by_name(ctx, &exclusions.btree_indexes_on_array_columns);
            run_check::<Index>(registry, diagnostic, ctx, filter).await
        }
        Diagnostic::SequenceOverflow => {
            run_check::<SequenceState>(registry, diagnostic, ctx, ExclusionFilter::keep_all()).await
        }
        Diagnostic::DuplicatedForeignKeys | Diagnostic::IntersectedForeignKeys => {
            run_check::<DuplicatedForeignKeys>(registry, diagnostic, ctx, ExclusionFilter::keep_all()).await
        }
        Diagnostic::PossibleObjectNameOverflow | Diagnostic::ObjectsNotFollowingNamingConvention => {
            run_check::<AnyObject>(registry, diagnostic, ctx, ExclusionFilter::keep_all()).await
        }
    }
}

async fn run_check<T: Entity>(
    registry: &ChecksRegistry,
    diagnostic: Diagnostic,
    ctx: &SchemaContext,
    filter: ExclusionFilter<T>,
) -> Result<DiagnosticReport> {
    let check = registry
        .get_check::<T>(diagnostic)
        .context(RegistrySnafu)?;
    let report = match check.run(ctx, &filter).await {
        Ok(outcome) => {
            let report = DiagnosticReport::from_outcome(&outcome);
            if !report.findings.is_empty() {
                warn!(
                    "There are {} in the database {:?}",
                    report.description, report.findings
                );
            }
            if outcome.is_degraded() {
                warn!(
                    "{} is based on partial data: {} host(s) did not answer",
                    diagnostic,
                    outcome.failed_hosts.len()
                );
            }
            report
        }
        Err(err) => {
            error!("{}", err);
            DiagnosticReport::failed(diagnostic, &err)
        }
    };
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::memory::{InMemoryCluster, InMemoryHost};
    use crate::entities::RawRow;
    use crate::models::ReportStatus;

    fn host(name: &str) -> HostIdentity {
        HostIdentity::new(name, 5432)
    }

    fn checker(cluster: &InMemoryCluster, hosts: &[&str]) -> HealthChecker {
        HealthChecker::new(
            hosts.iter().map(|h| host(h)).collect(),
            Arc::new(cluster.clone()),
        )
        .with_query_timeout(Duration::from_secs(1))
    }

    #[tokio::test]
    async fn every_diagnostic_reports_once() {
        let cluster = InMemoryCluster::new([InMemoryHost::primary(host("p"))]);
        let report = checker(&cluster, &["p"])
            .log_all(&Exclusions::empty(), &SchemaContext::public())
            .await
            .unwrap();
        assert_eq!(report.reports.len(), Diagnostic::ALL.len());
        assert!(report.log_lines().iter().all(|line| line.ends_with(":0")));
        assert_eq!(cluster.open_connections(), 0);
    }

    #[tokio::test]
    async fn exclusions_are_applied_per_diagnostic() {
        let cluster = InMemoryCluster::new([InMemoryHost::primary(host("p")).with_rows(
            "tables_without_primary_key",
            vec![
                RawRow::new().with("table_name", "t1").with("table_size", 10),
                RawRow::new().with("table_name", "t2").with("table_size", 100_000),
                RawRow::new().with("table_name", "t3").with("table_size", 100_000),
            ],
        )]);
        let exclusions = Exclusions {
            tables_without_primary_key: vec!["t3".to_string()],
            table_size_threshold_bytes: 1024,
            ..Exclusions::default()
        };
        let report = checker(&cluster, &["p"])
            .log_all(&exclusions, &SchemaContext::public())
            .await
            .unwrap();
        let tables = report
            .reports
            .iter()
            .find(|r| r.diagnostic == Diagnostic::TablesWithoutPrimaryKey)
            .unwrap();
        assert_eq!(tables.findings, vec!["t2 (100000 bytes)"]);
    }

    #[tokio::test]
    async fn failing_diagnostic_does_not_abort_siblings() {
        let cluster = InMemoryCluster::new([InMemoryHost::primary(host("p")).failing("unused_indexes")]);
        let report = checker(&cluster, &["p"])
            .log_all(&Exclusions::empty(), &SchemaContext::public())
            .await
            .unwrap();
        assert_eq!(report.count_by_status(ReportStatus::Failed), 1);
        assert!(report.log_lines().contains(&"unused_indexes:failed".to_string()));
        assert_eq!(report.reports.len(), Diagnostic::ALL.len());
    }

    #[tokio::test]
    async fn incomplete_catalog_fails_before_connecting() {
        let cluster = InMemoryCluster::new([InMemoryHost::primary(host("p"))]);
        let result = checker(&cluster, &["p"])
            .with_queries(QueryCatalog::default())
            .log_all(&Exclusions::empty(), &SchemaContext::public())
            .await;
        assert!(matches!(result, Err(CheckerError::IncompleteCatalog { .. })));
        assert!(cluster.connected().is_empty());
    }

    #[tokio::test]
    async fn invalid_exclusions_are_rejected() {
        let cluster = InMemoryCluster::new([InMemoryHost::primary(host("p"))]);
        let exclusions = Exclusions {
            index_size_threshold_bytes: -1,
            ..Exclusions::default()
        };
        let result = checker(&cluster, &["p"])
            .log_all(&exclusions, &SchemaContext::public())
            .await;
        assert!(matches!(result, Err(CheckerError::InvalidExclusions { .. })));
    }
}
