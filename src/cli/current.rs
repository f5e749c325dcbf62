use anyhow::Result;

use crate::config::Config;
use crate::state::ServerStore;

pub fn show_current(config: &Config) -> Result<()> {
    let store = ServerStore::new(&config.paths.data_dir);

    match store.current()? {
        Some(current) => {
            println!("Current server:");
            println!("  Name: {}", current.server.device_name);
            println!("  Host: {}", current.server.hostname);
            println!("  URL: {}", current.url);
            println!("  Verified: {}", current.verified);
            println!("  Addresses: {}", current.server.addresses.join(", "));
            if let Some(ref user) = current.username {
                println!("  User: {}", user);
            }
            println!("  Last connected: {}", current.last_connected.to_rfc3339());
        }
        None => {
            println!("No current server.");
            println!("Pick one with: aaxion resolve --save");
        }
    }

    let recent = store.recent()?;
    if !recent.is_empty() {
        println!();
        println!("Recent servers:");
        for server in recent {
            println!("  {}: {}", server.server.device_name, server.url);
        }
    }

    Ok(())
}

pub fn forget_current(config: &Config) -> Result<()> {
    let store = ServerStore::new(&config.paths.data_dir);
    if store.clear_current()? {
        println!("Current server cleared");
    } else {
        println!("No current server set");
    }
    Ok(())
}
