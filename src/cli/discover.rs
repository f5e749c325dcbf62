use anyhow::Result;

use crate::config::Config;
use crate::discovery;

pub async fn discover_servers(config: &Config) -> Result<()> {
    let servers = discovery::browse(&config.discovery).await?;

    if servers.is_empty() {
        println!("No servers found for {}", config.discovery.service_type);
        return Ok(());
    }

    println!("Found {} server(s):", servers.len());
    for server in &servers {
        println!("  {} ({}:{})", server.device_name, server.hostname, server.port);
        for address in &server.addresses {
            println!("    {}", address);
        }
        if let Some(version) = server.txt.get("version") {
            println!("    version {}", version);
        }
    }

    Ok(())
}
