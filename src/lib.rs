pub mod cli;
pub mod config;
pub mod descriptor;
pub mod discovery;
pub mod resolver;
pub mod state;

pub use config::Config;
pub use descriptor::ServerDescriptor;
pub use resolver::{ResolutionResult, ResolveError, Resolver};
