use crate::context::SchemaContext;
use crate::entities::{
    BloatAware, IndexNameAware, IndexSizeAware, TableNameAware, TableSizeAware,
};
use serde::{Deserialize, Serialize};
use snafu::Snafu;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// A conjunction of keep-predicates applied to reconciled findings.
///
/// An empty filter keeps everything. Combining filters with [`ExclusionFilter::and`]
/// keeps an entity only when every predicate keeps it, so the order of
/// composition never changes the outcome.
pub struct ExclusionFilter<T> {
    predicates: Vec<Predicate<T>>,
}

impl<T> Clone for ExclusionFilter<T> {
    fn clone(&self) -> Self {
        Self {
            predicates: self.predicates.clone(),
        }
    }
}

impl<T> fmt::Debug for ExclusionFilter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExclusionFilter")
            .field("predicates", &self.predicates.len())
            .finish()
    }
}

impl<T> Default for ExclusionFilter<T> {
    fn default() -> Self {
        Self::keep_all()
    }
}

impl<T> ExclusionFilter<T> {
    pub fn keep_all() -> Self {
        Self {
            predicates: Vec::new(),
        }
    }

    pub fn from_fn(keep: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        Self {
            predicates: vec![Arc::new(keep)],
        }
    }

    pub fn and(mut self, other: ExclusionFilter<T>) -> Self {
        self.predicates.extend(other.predicates);
        self
    }

    pub fn keeps(&self, entity: &T) -> bool {
        self.predicates.iter().all(|keep| keep(entity))
    }

    pub fn apply(&self, entities: Vec<T>) -> Vec<T> {
        if self.predicates.is_empty() {
            return entities;
        }
        entities.into_iter().filter(|e| self.keeps(e)).collect()
    }
}

fn name_set(ctx: &SchemaContext, names: &[String]) -> HashSet<String> {
    names
        .iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .flat_map(|name| [name.to_lowercase(), ctx.enrich_with_schema(name).to_lowercase()])
        .collect()
}

/// Drops entities whose table name matches one of `names`, bare or schema-qualified.
pub fn skip_tables_by_name<T>(ctx: &SchemaContext, names: &[String]) -> ExclusionFilter<T>
where
    T: TableNameAware + 'static,
{
    let excluded = name_set(ctx, names);
    if excluded.is_empty() {
        return ExclusionFilter::keep_all();
    }
    ExclusionFilter::from_fn(move |entity: &T| {
        !excluded.contains(&entity.table_name().to_lowercase())
    })
}

/// Drops entities that reference any index named in `names`.
pub fn skip_indexes_by_name<T>(ctx: &SchemaContext, names: &[String]) -> ExclusionFilter<T>
where
    T: IndexNameAware + 'static,
{
    let excluded = name_set(ctx, names);
    if excluded.is_empty() {
        return ExclusionFilter::keep_all();
    }
    ExclusionFilter::from_fn(move |entity: &T| {
        !entity
            .index_names()
            .iter()
            .any(|name| excluded.contains(&name.to_lowercase()))
    })
}

/// Drops tables smaller than `threshold_bytes`.
pub fn skip_small_tables<T>(threshold_bytes: i64) -> ExclusionFilter<T>
where
    T: TableSizeAware + 'static,
{
    if threshold_bytes <= 0 {
        return ExclusionFilter::keep_all();
    }
    ExclusionFilter::from_fn(move |entity: &T| entity.table_size_in_bytes() >= threshold_bytes)
}

/// Drops indexes smaller than `threshold_bytes`.
pub fn skip_small_indexes<T>(threshold_bytes: i64) -> ExclusionFilter<T>
where
    T: IndexSizeAware + 'static,
{
    if threshold_bytes <= 0 {
        return ExclusionFilter::keep_all();
    }
    ExclusionFilter::from_fn(move |entity: &T| entity.index_size_in_bytes() >= threshold_bytes)
}

/// Keeps an entity only when both its bloat size and bloat percentage reach the thresholds.
pub fn skip_bloat_under_threshold<T>(
    size_threshold_bytes: i64,
    percentage_threshold: f64,
) -> ExclusionFilter<T>
where
    T: BloatAware + 'static,
{
    ExclusionFilter::from_fn(move |entity: &T| {
        entity.bloat_size_in_bytes() >= size_threshold_bytes
            && entity.bloat_percentage() >= percentage_threshold
    })
}

#[derive(Debug, Clone, PartialEq, Snafu)]
pub enum ExclusionsError {
    #[snafu(display("{} cannot be less than zero, got {}", field, value))]
    NegativeThreshold { field: &'static str, value: i64 },

    #[snafu(display("{} should be in the range from 0 to 100 inclusive, got {}", field, value))]
    InvalidPercentage { field: &'static str, value: f64 },
}

/// Caller-supplied exclusions for one batch, grouped by the diagnostic they apply to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Exclusions {
    pub duplicated_indexes: Vec<String>,
    pub intersected_indexes: Vec<String>,
    pub unused_indexes: Vec<String>,
    pub tables_with_missing_indexes: Vec<String>,
    pub tables_without_primary_key: Vec<String>,
    pub indexes_with_null_values: Vec<String>,
    pub btree_indexes_on_array_columns: Vec<String>,
    pub index_size_threshold_bytes: i64,
    pub table_size_threshold_bytes: i64,
    pub index_bloat_size_threshold_bytes: i64,
    pub index_bloat_percentage_threshold: f64,
    pub table_bloat_size_threshold_bytes: i64,
    pub table_bloat_percentage_threshold: f64,
}

impl Exclusions {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<(), ExclusionsError> {
        for (field, value) in [
            ("index_size_threshold_bytes", self.index_size_threshold_bytes),
            ("table_size_threshold_bytes", self.table_size_threshold_bytes),
            ("index_bloat_size_threshold_bytes", self.index_bloat_size_threshold_bytes),
            ("table_bloat_size_threshold_bytes", self.table_bloat_size_threshold_bytes),
        ] {
            if value < 0 {
                return NegativeThresholdSnafu { field, value }.fail();
            }
        }
        for (field, value) in [
            ("index_bloat_percentage_threshold", self.index_bloat_percentage_threshold),
            ("table_bloat_percentage_threshold", self.table_bloat_percentage_threshold),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return InvalidPercentageSnafu { field, value }.fail();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Index, IndexWithBloat, IndexWithSize, Table, TableWithBloat};
    use rstest::rstest;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_filter_keeps_everything() {
        let filter = ExclusionFilter::<Table>::keep_all();
        let tables = vec![Table::of("t1").unwrap(), Table::of("t2").unwrap()];
        assert_eq!(filter.apply(tables.clone()), tables);
    }

    #[rstest]
    #[case("public", &["T1"], "t1", false)]
    #[case("public", &["t2"], "t1", true)]
    #[case("custom", &["t1"], "custom.t1", false)]
    #[case("custom", &["custom.t1"], "custom.t1", false)]
    #[case("custom", &[" "], "custom.t1", true)]
    fn tables_by_name(
        #[case] schema: &str,
        #[case] excluded: &[&str],
        #[case] table: &str,
        #[case] kept: bool,
    ) {
        let ctx = SchemaContext::of(schema).unwrap();
        let filter = skip_tables_by_name::<Table>(&ctx, &names(excluded));
        assert_eq!(filter.keeps(&Table::of(table).unwrap()), kept);
    }

    #[test]
    fn indexes_by_name() {
        let ctx = SchemaContext::public();
        let filter = skip_indexes_by_name::<Index>(&ctx, &names(&["i1"]));
        assert!(!filter.keeps(&Index::new("t", "I1").unwrap()));
        assert!(filter.keeps(&Index::new("t", "i2").unwrap()));
    }

    #[rstest]
    #[case(0, true)]
    #[case(100, true)]
    #[case(101, false)]
    fn small_indexes(#[case] threshold: i64, #[case] kept: bool) {
        let index = IndexWithSize::new("t", "i", 100).unwrap();
        assert_eq!(skip_small_indexes::<IndexWithSize>(threshold).keeps(&index), kept);
    }

    #[rstest]
    #[case(10, 5.0, true)]
    #[case(11, 5.0, false)]
    #[case(10, 5.1, false)]
    #[case(0, 0.0, true)]
    fn bloat_requires_both_thresholds(
        #[case] size_threshold: i64,
        #[case] percentage_threshold: f64,
        #[case] kept: bool,
    ) {
        let bloated = TableWithBloat::new(Table::new("t", 200).unwrap(), 10, 5.0).unwrap();
        let filter = skip_bloat_under_threshold::<TableWithBloat>(size_threshold, percentage_threshold);
        assert_eq!(filter.keeps(&bloated), kept);
    }

    #[test]
    fn composed_filters_drop_when_any_predicate_drops() {
        let index = IndexWithBloat::new(IndexWithSize::new("t", "i", 50).unwrap(), 40, 80.0).unwrap();
        let bloat = skip_bloat_under_threshold::<IndexWithBloat>(10, 10.0);
        assert!(bloat.keeps(&index));
        let composed = bloat.and(skip_small_indexes(100));
        assert!(!composed.keeps(&index));
    }

    #[test]
    fn exclusions_validate_thresholds() {
        assert!(Exclusions::empty().validate().is_ok());
        let negative = Exclusions {
            table_size_threshold_bytes: -1,
            ..Exclusions::default()
        };
        assert!(matches!(
            negative.validate(),
            Err(ExclusionsError::NegativeThreshold { .. })
        ));
        let percent = Exclusions {
            index_bloat_percentage_threshold: 101.0,
            ..Exclusions::default()
        };
        assert!(percent.validate().is_err());
    }

    #[test]
    fn exclusions_deserialize_with_defaults() {
        let exclusions: Exclusions =
            serde_yaml::from_str("unused_indexes: [i1, i2]\nindex_size_threshold_bytes: 8192").unwrap();
        assert_eq!(exclusions.unused_indexes, names(&["i1", "i2"]));
        assert_eq!(exclusions.index_size_threshold_bytes, 8192);
        assert!(exclusions.duplicated_indexes.is_empty());
    }
}
