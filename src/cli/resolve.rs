use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::Config;
use crate::descriptor::ServerDescriptor;
use crate::discovery;
use crate::resolver::{ResolveError, Resolver};
use crate::state::{CredentialStore, ServerStore, StoredServer};

/// Where the candidate addresses for `resolve` come from
pub enum Target {
    /// Addresses given on the command line
    Addresses {
        host: Option<String>,
        addresses: Vec<String>,
        port: Option<u16>,
    },
    /// A server announced on the LAN, by name
    Discovered(String),
    /// The stored current server, or the first one discovered
    Default,
}

pub async fn resolve_server(config: &Config, target: Target, save: bool) -> Result<()> {
    let store = ServerStore::new(&config.paths.data_dir);
    let server = pick_descriptor(config, &store, target).await?;

    let credentials = CredentialStore::load(&config.paths.data_dir)?;
    let resolver = Resolver::from_config(&config.resolver)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupted, cancelling resolution");
            on_interrupt.cancel();
        }
    });

    let outcome = resolver
        .resolve_with_cancel(&server, credentials.token(), &cancel)
        .await;
    interrupt.abort();

    let result = match outcome {
        Ok(result) => result,
        Err(e @ ResolveError::Cancelled) => {
            println!("Resolution cancelled");
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    println!("Server:   {} ({})", server.device_name, server.hostname);
    match &result.base_url {
        Some(url) => println!("URL:      {}", url),
        None => println!("URL:      none ({} cannot be dialed)", result.address),
    }
    println!(
        "Status:   {}",
        if result.verified {
            "reachable"
        } else {
            "unverified (no address answered, using highest priority)"
        }
    );
    println!("Priority: {}", result.priority);
    if result.reachable.is_empty() {
        println!("Reachable: none");
    } else {
        println!("Reachable: {}", result.reachable.join(", "));
    }

    if save {
        store.set_current(&StoredServer::from_resolution(&server, &result)?)?;
        println!("Saved as current server");
    }

    Ok(())
}

async fn pick_descriptor(
    config: &Config,
    store: &ServerStore,
    target: Target,
) -> Result<ServerDescriptor> {
    match target {
        Target::Addresses {
            host,
            addresses,
            port,
        } => Ok(ServerDescriptor::from_addresses(
            host.as_deref().unwrap_or("manual"),
            addresses,
            port.unwrap_or(config.discovery.default_port),
        )),

        Target::Discovered(name) => {
            let servers = discovery::browse(&config.discovery).await?;

            if let Some(found) = discovery::find_server(&servers, &name) {
                let is_current = store
                    .current()?
                    .is_some_and(|c| c.server.fullname == found.fullname);
                if is_current {
                    store.refresh_addresses(found.addresses.clone())?;
                }
                return Ok(found.clone());
            }

            // Not announcing right now; fall back to the last known addresses
            store
                .find_recent(&name)?
                .map(|recent| recent.server)
                .with_context(|| format!("No server named '{}' found on the network", name))
        }

        Target::Default => {
            if let Some(current) = store.current()? {
                return Ok(current.server);
            }

            let servers = discovery::browse(&config.discovery).await?;
            servers
                .into_iter()
                .next()
                .context("No current server and none found on the network")
        }
    }
}
