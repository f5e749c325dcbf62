use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    /// The descriptor carried no candidate addresses
    #[error("server {hostname} has no candidate addresses")]
    NoAddresses { hostname: String },

    #[error("resolution cancelled")]
    Cancelled,

    #[error("resolution deadline of {0:?} elapsed")]
    DeadlineElapsed(Duration),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

impl ResolveError {
    /// True when the caller abandoned the call rather than the input being bad
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineElapsed(_))
    }
}
