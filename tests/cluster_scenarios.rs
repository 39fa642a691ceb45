//! End-to-end reconciliation scenarios against the in-memory cluster.

use pghealth::catalog::Diagnostic;
use pghealth::checker::{CheckerError, HealthChecker};
use pghealth::checks::{
    skip_indexes_by_name, CheckError, ChecksRegistry, ExclusionFilter, Exclusions, HostError,
    RegistryError,
};
use pghealth::cluster::memory::{InMemoryCluster, InMemoryHost};
use pghealth::cluster::{
    ClusterTopology, HostIdentity, HostRole, MemberSummary, RecoveryProbeDeterminer, TopologyError,
};
use pghealth::context::SchemaContext;
use pghealth::entities::{Index, RawRow, Table, UnusedIndex};
use pghealth::models::ReportStatus;
use pghealth::queries::QueryCatalog;
use std::sync::Arc;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_millis(500);

fn host(name: &str) -> HostIdentity {
    HostIdentity::new(name, 5432)
}

fn table(name: &str) -> RawRow {
    RawRow::new().with("table_name", name).with("table_size", 0)
}

fn unused(index: &str, scans: i64) -> RawRow {
    RawRow::new()
        .with("table_name", "t")
        .with("index_name", index)
        .with("index_size", 16384)
        .with("index_scans", scans)
}

async fn registry(cluster: &InMemoryCluster, hosts: &[&str]) -> Result<ChecksRegistry, TopologyError> {
    let addresses: Vec<HostIdentity> = hosts.iter().map(|h| host(h)).collect();
    let topology = ClusterTopology::build(
        &addresses,
        Arc::new(cluster.clone()),
        Arc::new(RecoveryProbeDeterminer::default()),
    )
    .await?;
    Ok(ChecksRegistry::new(Arc::new(topology), &QueryCatalog::embedded(), TIMEOUT).unwrap())
}

fn three_node_cluster(primary: InMemoryHost, r1: InMemoryHost, r2: InMemoryHost) -> InMemoryCluster {
    InMemoryCluster::new([primary, r1, r2])
}

#[tokio::test]
async fn host_invariant_diagnostic_queries_only_the_primary() {
    let cluster = three_node_cluster(
        InMemoryHost::primary(host("p"))
            .with_rows("tables_without_primary_key", vec![table("t2"), table("t1")]),
        InMemoryHost::replica(host("r1")).with_rows("tables_without_primary_key", vec![table("t9")]),
        InMemoryHost::replica(host("r2")),
    );
    let registry = registry(&cluster, &["r1", "p", "r2"]).await.unwrap();

    let outcome = registry
        .get_check::<Table>(Diagnostic::TablesWithoutPrimaryKey)
        .unwrap()
        .run(&SchemaContext::public(), &ExclusionFilter::keep_all())
        .await
        .unwrap();

    let names: Vec<String> = outcome.findings.iter().map(|t| t.to_string()).collect();
    assert_eq!(names, vec!["t1 (0 bytes)", "t2 (0 bytes)"]);
    assert!(!outcome.is_degraded());
    assert_eq!(cluster.executed_on(&host("p")), vec!["tables_without_primary_key"]);
    assert!(cluster.executed_on(&host("r1")).is_empty());
    assert!(cluster.executed_on(&host("r2")).is_empty());
}

#[tokio::test]
async fn host_invariant_diagnostic_falls_back_to_first_replica() {
    let cluster = three_node_cluster(
        InMemoryHost::unreachable(host("p")),
        InMemoryHost::replica(host("r1"))
            .with_rows("tables_without_primary_key", vec![table("t1"), table("t2")]),
        InMemoryHost::replica(host("r2")),
    );
    let registry = registry(&cluster, &["p", "r1", "r2"]).await.unwrap();

    let outcome = registry
        .get_check::<Table>(Diagnostic::TablesWithoutPrimaryKey)
        .unwrap()
        .run(&SchemaContext::public(), &ExclusionFilter::keep_all())
        .await
        .unwrap();

    assert_eq!(outcome.findings.len(), 2);
    assert_eq!(outcome.queried_hosts, vec![host("r1")]);
    assert!(!outcome.answered_by_primary);
    assert_eq!(outcome.failed_hosts, vec![host("p")]);
    assert!(cluster.executed_on(&host("r2")).is_empty());
}

#[tokio::test]
async fn failing_primary_hands_over_to_replica_and_degrades() {
    let cluster = three_node_cluster(
        InMemoryHost::primary(host("p")).failing("tables_without_primary_key"),
        InMemoryHost::replica(host("r1"))
            .with_rows("tables_without_primary_key", vec![table("t1")]),
        InMemoryHost::replica(host("r2")),
    );
    let registry = registry(&cluster, &["p", "r1", "r2"]).await.unwrap();

    let outcome = registry
        .get_check::<Table>(Diagnostic::TablesWithoutPrimaryKey)
        .unwrap()
        .run(&SchemaContext::public(), &ExclusionFilter::keep_all())
        .await
        .unwrap();

    assert_eq!(outcome.findings, vec![Table::of("t1").unwrap()]);
    assert_eq!(outcome.failed_hosts, vec![host("p")]);
    assert!(outcome.is_degraded());
}

#[tokio::test]
async fn host_variant_diagnostic_keeps_maximum_usage() {
    let cluster = three_node_cluster(
        InMemoryHost::primary(host("p")).with_rows("unused_indexes", vec![unused("i1", 0)]),
        InMemoryHost::replica(host("r1")).with_rows("unused_indexes", vec![unused("i1", 3)]),
        InMemoryHost::replica(host("r2")),
    );
    let registry = registry(&cluster, &["p", "r1", "r2"]).await.unwrap();

    let outcome = registry
        .get_check::<UnusedIndex>(Diagnostic::UnusedIndexes)
        .unwrap()
        .run(&SchemaContext::public(), &ExclusionFilter::keep_all())
        .await
        .unwrap();

    assert_eq!(outcome.findings.len(), 1);
    assert_eq!(outcome.findings[0].index_name(), "i1");
    assert_eq!(outcome.findings[0].index_scans(), 3);
    assert_eq!(outcome.queried_hosts, vec![host("p"), host("r1"), host("r2")]);
    for member in ["p", "r1", "r2"] {
        assert_eq!(cluster.executed_on(&host(member)), vec!["unused_indexes"]);
    }
}

#[tokio::test]
async fn exclusions_apply_after_merge() {
    let cluster = three_node_cluster(
        InMemoryHost::primary(host("p")).with_rows("unused_indexes", vec![unused("i1", 0)]),
        InMemoryHost::replica(host("r1"))
            .with_rows("unused_indexes", vec![unused("i1", 3), unused("i2", 0)]),
        InMemoryHost::replica(host("r2")),
    );
    let registry = registry(&cluster, &["p", "r1", "r2"]).await.unwrap();
    let ctx = SchemaContext::public();
    let filter = skip_indexes_by_name::<UnusedIndex>(&ctx, &["i1".to_string()]);

    let outcome = registry
        .get_check::<UnusedIndex>(Diagnostic::UnusedIndexes)
        .unwrap()
        .run(&ctx, &filter)
        .await
        .unwrap();

    let names: Vec<&str> = outcome.findings.iter().map(|i| i.index_name()).collect();
    assert_eq!(names, vec!["i2"]);
}

#[tokio::test]
async fn two_of_three_hosts_give_degraded_result() {
    let cluster = three_node_cluster(
        InMemoryHost::primary(host("p")).with_rows("invalid_indexes", vec![
            RawRow::new().with("table_name", "t").with("index_name", "i_p"),
        ]),
        InMemoryHost::replica(host("r1")).with_rows("invalid_indexes", vec![
            RawRow::new().with("table_name", "t").with("index_name", "i_r1"),
        ]),
        InMemoryHost::replica(host("r2")).failing("invalid_indexes"),
    );
    let registry = registry(&cluster, &["p", "r1", "r2"]).await.unwrap();

    let outcome = registry
        .get_check::<Index>(Diagnostic::InvalidIndexes)
        .unwrap()
        .run(&SchemaContext::public(), &ExclusionFilter::keep_all())
        .await
        .unwrap();

    let names: Vec<&str> = outcome.findings.iter().map(|i| i.index_name()).collect();
    assert_eq!(names, vec!["i_p", "i_r1"]);
    assert!(outcome.is_degraded());
    assert_eq!(outcome.failed_hosts, vec![host("r2")]);
}

#[tokio::test]
async fn slow_host_is_treated_as_unreachable() {
    let cluster = three_node_cluster(
        InMemoryHost::primary(host("p")).with_rows("unused_indexes", vec![unused("i1", 1)]),
        InMemoryHost::replica(host("r1")),
        InMemoryHost::replica(host("r2")).with_delay(Duration::from_millis(100)),
    );
    let addresses = [host("p"), host("r1"), host("r2")];
    let topology = ClusterTopology::build(
        &addresses,
        Arc::new(cluster.clone()),
        Arc::new(RecoveryProbeDeterminer::new(Duration::from_secs(1))),
    )
    .await
    .unwrap();
    let registry =
        ChecksRegistry::new(Arc::new(topology), &QueryCatalog::embedded(), Duration::from_millis(20))
            .unwrap();

    let outcome = registry
        .get_check::<UnusedIndex>(Diagnostic::UnusedIndexes)
        .unwrap()
        .run(&SchemaContext::public(), &ExclusionFilter::keep_all())
        .await
        .unwrap();

    assert_eq!(outcome.findings.len(), 1);
    assert_eq!(outcome.failed_hosts, vec![host("r2")]);
}

#[tokio::test]
async fn every_host_failing_is_a_failed_result_not_an_empty_one() {
    let cluster = InMemoryCluster::new([
        InMemoryHost::primary(host("p")).failing("unused_indexes"),
        InMemoryHost::replica(host("r1")).failing("unused_indexes"),
    ]);
    let registry = registry(&cluster, &["p", "r1"]).await.unwrap();

    let result = registry
        .get_check::<UnusedIndex>(Diagnostic::UnusedIndexes)
        .unwrap()
        .run(&SchemaContext::public(), &ExclusionFilter::keep_all())
        .await;

    match result {
        Err(CheckError::AllHostsFailed { failures, .. }) => {
            assert_eq!(failures.len(), 2);
            assert!(failures
                .iter()
                .all(|f| matches!(f, HostError::Unreachable { .. })));
        }
        other => panic!("expected AllHostsFailed, got {:?}", other.map(|o| o.findings)),
    }
}

#[tokio::test]
async fn all_hosts_unreachable_is_cluster_unavailable() {
    let cluster = three_node_cluster(
        InMemoryHost::unreachable(host("p")),
        InMemoryHost::unreachable(host("r1")),
        InMemoryHost::unreachable(host("r2")),
    );
    assert!(matches!(
        registry(&cluster, &["p", "r1", "r2"]).await,
        Err(TopologyError::ClusterUnavailable { attempted: 3 })
    ));

    let result = HealthChecker::new(vec![host("p"), host("r1"), host("r2")], Arc::new(cluster))
        .log_all(&Exclusions::empty(), &SchemaContext::public())
        .await;
    assert!(matches!(result, Err(CheckerError::Topology { .. })));
}

#[tokio::test]
async fn reconciliation_is_idempotent() {
    let cluster = three_node_cluster(
        InMemoryHost::primary(host("p"))
            .with_rows("unused_indexes", vec![unused("i2", 0), unused("i1", 4)]),
        InMemoryHost::replica(host("r1"))
            .with_rows("unused_indexes", vec![unused("i3", 0), unused("i1", 2)]),
        InMemoryHost::replica(host("r2")).with_delay(Duration::from_millis(5)),
    );
    let registry = registry(&cluster, &["p", "r1", "r2"]).await.unwrap();
    let check = registry
        .get_check::<UnusedIndex>(Diagnostic::UnusedIndexes)
        .unwrap();
    let ctx = SchemaContext::public();

    let first = check.run(&ctx, &ExclusionFilter::keep_all()).await.unwrap();
    let second = check.run(&ctx, &ExclusionFilter::keep_all()).await.unwrap();

    assert_eq!(first, second);
    let rendered: Vec<String> = first.findings.iter().map(|i| i.to_string()).collect();
    let again: Vec<String> = second.findings.iter().map(|i| i.to_string()).collect();
    assert_eq!(rendered, again);
}

#[tokio::test]
async fn requesting_the_wrong_entity_type_fails_eagerly() {
    let cluster = InMemoryCluster::new([InMemoryHost::primary(host("p"))]);
    let registry = registry(&cluster, &["p"]).await.unwrap();
    assert!(matches!(
        registry.get_check::<Index>(Diagnostic::TablesWithoutPrimaryKey),
        Err(RegistryError::TypeMismatch { .. })
    ));
    assert!(cluster.executed().is_empty());
}

#[tokio::test]
async fn batch_reports_every_diagnostic_in_catalog_order() {
    let cluster = three_node_cluster(
        InMemoryHost::primary(host("p"))
            .with_rows("tables_without_primary_key", vec![table("t1")])
            .with_rows("unused_indexes", vec![unused("i1", 0)]),
        InMemoryHost::replica(host("r1")).with_rows("unused_indexes", vec![unused("i1", 7)]),
        InMemoryHost::replica(host("r2")).failing("bloated_tables"),
    );
    let report = HealthChecker::new(vec![host("p"), host("r1"), host("r2")], Arc::new(cluster.clone()))
        .with_cluster_name("orders")
        .log_all(&Exclusions::empty(), &SchemaContext::public())
        .await
        .unwrap();

    let order: Vec<Diagnostic> = report.reports.iter().map(|r| r.diagnostic).collect();
    assert_eq!(order, Diagnostic::ALL.to_vec());

    let lines = report.log_lines();
    assert!(lines.contains(&"tables_without_primary_key:1".to_string()));
    assert!(lines.contains(&"unused_indexes:1".to_string()));
    let bloated = report
        .reports
        .iter()
        .find(|r| r.diagnostic == Diagnostic::BloatedTables)
        .unwrap();
    assert_eq!(bloated.status, ReportStatus::Degraded);
    assert_eq!(report.members.len(), 3);
    assert_eq!(cluster.open_connections(), 0);
}

#[tokio::test]
async fn cancelled_batch_discards_results_and_closes_connections() {
    let cluster = three_node_cluster(
        InMemoryHost::primary(host("p")),
        InMemoryHost::replica(host("r1")),
        InMemoryHost::replica(host("r2")).with_delay(Duration::from_millis(50)),
    );
    let checker = HealthChecker::new(vec![host("p"), host("r1"), host("r2")], Arc::new(cluster.clone()))
        .with_determiner(Arc::new(RecoveryProbeDeterminer::new(Duration::from_secs(5))))
        .with_query_timeout(Duration::from_secs(5));

    let result = checker
        .log_all_until(
            &Exclusions::empty(),
            &SchemaContext::public(),
            tokio::time::sleep(Duration::from_millis(150)),
        )
        .await;

    assert!(matches!(result, Err(CheckerError::Cancelled)));
    assert_eq!(cluster.open_connections(), 0);
}

#[tokio::test]
async fn host_unreachable_at_connect_degrades_variant_results() {
    let cluster = three_node_cluster(
        InMemoryHost::primary(host("p"))
            .with_rows("unused_indexes", vec![unused("i1", 0)])
            .with_rows("tables_without_primary_key", vec![table("t1")]),
        InMemoryHost::replica(host("r1")).with_rows("unused_indexes", vec![unused("i1", 3)]),
        InMemoryHost::unreachable(host("r2")),
    );
    let report = HealthChecker::new(vec![host("p"), host("r1"), host("r2")], Arc::new(cluster.clone()))
        .log_all(&Exclusions::empty(), &SchemaContext::public())
        .await
        .unwrap();

    let unused_indexes = report
        .reports
        .iter()
        .find(|r| r.diagnostic == Diagnostic::UnusedIndexes)
        .unwrap();
    assert_eq!(unused_indexes.status, ReportStatus::Degraded);
    assert_eq!(unused_indexes.findings.len(), 1);
    assert_eq!(unused_indexes.queried_hosts, vec![host("p"), host("r1")]);
    assert_eq!(unused_indexes.failed_hosts, vec![host("r2")]);

    // the primary answered, so a missing replica does not weaken structural results
    let without_pk = report
        .reports
        .iter()
        .find(|r| r.diagnostic == Diagnostic::TablesWithoutPrimaryKey)
        .unwrap();
    assert_eq!(without_pk.status, ReportStatus::Ok);
    assert!(without_pk.answered_by_primary);

    assert!(!report.replica_only);
    assert_eq!(
        report.members.last(),
        Some(&MemberSummary {
            host: host("r2"),
            role: HostRole::Unreachable,
        })
    );
    assert_eq!(cluster.open_connections(), 0);
}

#[tokio::test]
async fn replica_only_cluster_is_reported_explicitly() {
    let cluster = three_node_cluster(
        InMemoryHost::unreachable(host("p")),
        InMemoryHost::replica(host("r1")).with_rows("tables_without_primary_key", vec![table("t1")]),
        InMemoryHost::replica(host("r2")),
    );
    let report = HealthChecker::new(vec![host("p"), host("r1"), host("r2")], Arc::new(cluster))
        .log_all(&Exclusions::empty(), &SchemaContext::public())
        .await
        .unwrap();

    assert!(report.replica_only);
    assert!(report.reports.iter().all(|r| !r.answered_by_primary));
    let without_pk = report
        .reports
        .iter()
        .find(|r| r.diagnostic == Diagnostic::TablesWithoutPrimaryKey)
        .unwrap();
    assert_eq!(without_pk.findings, vec!["t1 (0 bytes)"]);
    assert_eq!(without_pk.queried_hosts, vec![host("r1")]);
    assert_eq!(without_pk.status, ReportStatus::Degraded);
    assert_eq!(without_pk.failed_hosts, vec![host("p")]);
}

#[tokio::test]
async fn cancelling_while_the_topology_is_built_closes_opened_connections() {
    let cluster = three_node_cluster(
        InMemoryHost::primary(host("p")),
        InMemoryHost::replica(host("r1")),
        InMemoryHost::replica(host("r2")).with_delay(Duration::from_millis(500)),
    );
    let checker = HealthChecker::new(vec![host("p"), host("r1"), host("r2")], Arc::new(cluster.clone()))
        .with_determiner(Arc::new(RecoveryProbeDeterminer::new(Duration::from_secs(5))));

    let result = checker
        .log_all_until(
            &Exclusions::empty(),
            &SchemaContext::public(),
            tokio::time::sleep(Duration::from_millis(50)),
        )
        .await;

    assert!(matches!(result, Err(CheckerError::Cancelled)));
    assert_eq!(cluster.connected().len(), 3);
    assert_eq!(cluster.open_connections(), 0);
    assert!(cluster.executed().is_empty());
}
