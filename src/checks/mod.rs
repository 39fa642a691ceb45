mod cluster;
mod exclusions;
mod host;
mod registry;

pub use cluster::{reconcile, CheckError, CheckOnCluster, CheckOutcome};
pub use exclusions::{
    skip_bloat_under_threshold, skip_indexes_by_name, skip_small_indexes, skip_small_tables,
    skip_tables_by_name, ExclusionFilter, Exclusions, ExclusionsError,
};
pub use host::{CheckOnHost, HostError};
pub use registry::{ChecksRegistry, RegistryError};
