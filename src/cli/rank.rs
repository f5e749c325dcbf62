use anyhow::{Context, Result};

use crate::config::Config;
use crate::descriptor::{ServerDescriptor, base_url};
use crate::resolver::Resolver;
use crate::state::ServerStore;

/// Print the priority order of addresses without probing them
pub fn rank_addresses(config: &Config, addresses: Vec<String>, port: Option<u16>) -> Result<()> {
    let server = if addresses.is_empty() {
        ServerStore::new(&config.paths.data_dir)
            .current()?
            .map(|stored| stored.server)
            .context("No addresses given and no current server set")?
    } else {
        ServerDescriptor::from_addresses(
            "manual",
            addresses,
            port.unwrap_or(config.discovery.default_port),
        )
    };

    let resolver = Resolver::from_config(&config.resolver)?;

    for (rank, candidate) in resolver.rank(&server)?.iter().enumerate() {
        println!(
            "{:>2}. {:<40} {:>4}  {}",
            rank + 1,
            base_url(&candidate.address, server.port)
                .unwrap_or_else(|| format!("{} (not dialable)", candidate.address)),
            candidate.priority.score,
            candidate.priority.label
        );
    }

    let best = resolver.rank_offline(&server)?;
    println!(
        "\nBest guess: {}",
        best.base_url.as_deref().unwrap_or(best.address.as_str())
    );

    Ok(())
}
