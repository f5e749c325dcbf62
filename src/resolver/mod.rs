mod error;
mod priority;
mod probe;
mod resolve;

pub use error::ResolveError;
pub use priority::{
    DEFAULT_IPV4_OTHER_SCORE, DEFAULT_NON_IPV4_SCORE, Priority, PriorityTable, RankedAddress, Tier,
    is_ipv4_literal,
};
pub use probe::{DEFAULT_HEALTH_PATH, HttpProbe, Probe, ProbeTarget};
pub use resolve::{DEFAULT_PROBE_TIMEOUT, ResolutionResult, Resolver, ResolverOptions};
