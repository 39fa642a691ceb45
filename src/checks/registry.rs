use super::cluster::CheckOnCluster;
use crate::catalog::{CatalogError, Diagnostic};
use crate::cluster::ClusterTopology;
use crate::entities::{Entity, EntityKind};
use crate::queries::QueryCatalog;
use snafu::{ResultExt, Snafu};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Snafu)]
pub enum RegistryError {
    #[snafu(display("Catalog error: {}", source))]
    Catalog { source: CatalogError },

    #[snafu(display(
        "Diagnostic {} produces {} but {} was requested",
        diagnostic,
        actual,
        expected
    ))]
    TypeMismatch {
        diagnostic: Diagnostic,
        expected: EntityKind,
        actual: EntityKind,
    },
}

type Result<T, E = RegistryError> = std::result::Result<T, E>;

/// Every diagnostic bound to one topology.
///
/// Query resources are resolved when the registry is built, so a missing query
/// fails before any host is contacted.
#[derive(Debug)]
pub struct ChecksRegistry {
    topology: Arc<ClusterTopology>,
    queries: BTreeMap<Diagnostic, Arc<str>>,
    query_timeout: Duration,
}

impl ChecksRegistry {
    pub fn new(
        topology: Arc<ClusterTopology>,
        catalog: &QueryCatalog,
        query_timeout: Duration,
    ) -> Result<Self> {
        let queries = Diagnostic::all()
            .map(|diagnostic| Ok((diagnostic, catalog.sql_for(diagnostic)?)))
            .collect::<std::result::Result<BTreeMap<_, _>, CatalogError>>()
            .context(CatalogSnafu)?;
        Ok(Self {
            topology,
            queries,
            query_timeout,
        })
    }

    pub fn topology(&self) -> &Arc<ClusterTopology> {
        &self.topology
    }

    /// Typed handle for `diagnostic`; `T` must be the entity the diagnostic produces.
    pub fn get_check<T: Entity>(&self, diagnostic: Diagnostic) -> Result<CheckOnCluster<T>> {
        let actual = diagnostic.entity_kind();
        if actual != T::KIND {
            return TypeMismatchSnafu {
                diagnostic,
                expected: T::KIND,
                actual,
            }
            .fail();
        }
        let sql = self
            .queries
            .get(&diagnostic)
            .cloned()
            .ok_or(CatalogError::MissingQuery { diagnostic })
            .context(CatalogSnafu)?;
        Ok(CheckOnCluster::new(
            diagnostic,
            Arc::clone(&self.topology),
            sql,
            self.query_timeout,
        ))
    }

    pub fn get_check_by_name<T: Entity>(&self, id: &str) -> Result<CheckOnCluster<T>> {
        let diagnostic = Diagnostic::resolve(id).context(CatalogSnafu)?;
        self.get_check(diagnostic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::memory::{InMemoryCluster, InMemoryHost};
    use crate::cluster::{HostIdentity, RecoveryProbeDeterminer};
    use crate::entities::{Table, UnusedIndex};
    use rstest::rstest;

    async fn topology() -> Arc<ClusterTopology> {
        let host = HostIdentity::new("p", 5432);
        let cluster = InMemoryCluster::new([InMemoryHost::primary(host.clone())]);
        let topology = ClusterTopology::build(
            &[host],
            Arc::new(cluster),
            Arc::new(RecoveryProbeDeterminer::default()),
        )
        .await
        .unwrap();
        Arc::new(topology)
    }

    #[tokio::test]
    async fn typed_lookup() {
        let registry =
            ChecksRegistry::new(topology().await, &QueryCatalog::embedded(), Duration::from_secs(1))
                .unwrap();
        let check = registry
            .get_check::<Table>(Diagnostic::TablesWithoutPrimaryKey)
            .unwrap();
        assert_eq!(check.diagnostic(), Diagnostic::TablesWithoutPrimaryKey);

        assert!(matches!(
            registry.get_check::<Table>(Diagnostic::UnusedIndexes),
            Err(RegistryError::TypeMismatch {
                expected: EntityKind::Table,
                actual: EntityKind::UnusedIndex,
                ..
            })
        ));
    }

    #[rstest]
    #[case("unused_indexes", true)]
    #[case(" UNUSED_INDEXES ", true)]
    #[case("unused", false)]
    #[tokio::test]
    async fn lookup_by_name(#[case] id: &str, #[case] found: bool) {
        let registry =
            ChecksRegistry::new(topology().await, &QueryCatalog::embedded(), Duration::from_secs(1))
                .unwrap();
        let result = registry.get_check_by_name::<UnusedIndex>(id);
        assert_eq!(result.is_ok(), found);
        if !found {
            assert!(matches!(
                result,
                Err(RegistryError::Catalog {
                    source: CatalogError::UnknownDiagnostic { .. }
                })
            ));
        }
    }

    #[tokio::test]
    async fn missing_query_fails_eagerly() {
        let mut catalog = QueryCatalog::default();
        catalog.insert("unused_indexes", "select 1");
        assert!(matches!(
            ChecksRegistry::new(topology().await, &catalog, Duration::from_secs(1)),
            Err(RegistryError::Catalog {
                source: CatalogError::MissingQuery { .. }
            })
        ));
    }
}
