mod credential;
mod servers;

pub use credential::CredentialStore;
pub use servers::{MAX_RECENT, ServerStore, StoredServer};
