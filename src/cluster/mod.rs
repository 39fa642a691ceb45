mod host;
pub mod memory;
mod postgres;
mod primary;
mod topology;

pub use host::{
    BoundValue, ConnectionError, ConnectionFactory, HostConnection, HostIdentity, QueryRequest,
    DEFAULT_PORT,
};
pub use postgres::{PgConnectionFactory, PgHostConnection};
pub use primary::{HostRole, PrimaryHostDeterminer, RecoveryProbeDeterminer, PRIMARY_PROBE_KEY};
pub use topology::{ClusterTopology, MemberSummary, TopologyError, TopologyMember};
