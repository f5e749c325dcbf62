use anyhow::{Context, Result};
use mdns_sd::{ServiceDaemon, ServiceEvent};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::DiscoveryConfig;
use crate::descriptor::{ServerDescriptor, clean_addresses, device_name_from_hostname};

/// Browse the local network for servers during the configured scan window.
///
/// Announcements are deduplicated by instance name. The daemon is shut down
/// before returning so the next scan can bind again.
pub async fn browse(config: &DiscoveryConfig) -> Result<Vec<ServerDescriptor>> {
    let mdns = ServiceDaemon::new().context("Failed to start mDNS daemon")?;
    let receiver = mdns
        .browse(&config.service_type)
        .with_context(|| format!("Failed to browse for {}", config.service_type))?;

    info!(
        "Scanning for {} ({} ms)",
        config.service_type, config.scan_ms
    );

    let deadline = tokio::time::Instant::now() + Duration::from_millis(config.scan_ms);
    let mut servers = Vec::new();
    let mut seen = HashSet::new();

    loop {
        let event = match tokio::time::timeout_at(deadline, receiver.recv_async()).await {
            Ok(Ok(event)) => event,
            Ok(Err(e)) => {
                debug!("mDNS channel closed: {}", e);
                break;
            }
            Err(_) => break,
        };

        if let ServiceEvent::ServiceResolved(info) = event {
            let fullname = info.get_fullname().to_string();
            if !seen.insert(fullname.clone()) {
                continue;
            }

            let txt: BTreeMap<String, String> = info
                .get_properties()
                .iter()
                .map(|prop| (prop.key().to_string(), prop.val_str().to_string()))
                .collect();
            let addresses = info
                .get_addresses()
                .iter()
                .map(|ip| ip.to_string())
                .collect();

            let server = descriptor_from_announcement(
                info.get_hostname(),
                &fullname,
                info.get_port(),
                addresses,
                txt,
            );
            info!(
                "Found {} at {:?} port {}",
                server.hostname, server.addresses, server.port
            );
            servers.push(server);
        }
    }

    if let Err(e) = mdns.shutdown() {
        warn!("Failed to shut down mDNS daemon cleanly: {}", e);
    }

    info!("Discovery finished, {} server(s) found", servers.len());
    Ok(servers)
}

/// Build a descriptor from a resolved announcement.
///
/// Addresses arrive unordered, so they are sorted to keep resolution
/// tie-breaks repeatable across scans. The display name comes from the `h`
/// or `name` TXT record, falling back to the hostname label.
pub fn descriptor_from_announcement(
    hostname: &str,
    fullname: &str,
    port: u16,
    addresses: Vec<String>,
    txt: BTreeMap<String, String>,
) -> ServerDescriptor {
    let mut addresses = clean_addresses(addresses);
    addresses.sort();
    addresses.dedup();

    let device_name = txt
        .get("h")
        .or_else(|| txt.get("name"))
        .filter(|name| !name.is_empty())
        .cloned()
        .unwrap_or_else(|| device_name_from_hostname(hostname));

    ServerDescriptor {
        hostname: hostname.to_string(),
        fullname: fullname.to_string(),
        device_name,
        port,
        addresses,
        txt,
    }
}

/// Find a server by device name or hostname (with or without `.local.`)
pub fn find_server<'a>(servers: &'a [ServerDescriptor], name: &str) -> Option<&'a ServerDescriptor> {
    servers.iter().find(|server| server.matches_name(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn announcement(hostname: &str, txt: &[(&str, &str)]) -> ServerDescriptor {
        descriptor_from_announcement(
            hostname,
            &format!("{}._aaxion._tcp.local.", device_name_from_hostname(hostname)),
            8080,
            vec![
                "192.168.1.20".into(),
                "fe80::1".into(),
                " 10.0.0.5".into(),
                "192.168.1.20".into(),
                "".into(),
            ],
            txt.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_addresses_sorted_and_deduplicated() {
        let server = announcement("nas.local.", &[]);
        assert_eq!(
            server.addresses,
            vec!["10.0.0.5", "192.168.1.20", "fe80::1"]
        );
    }

    #[test]
    fn test_device_name_from_txt() {
        assert_eq!(announcement("nas.local.", &[("h", "Living Room")]).device_name, "Living Room");
        assert_eq!(announcement("nas.local.", &[("name", "Den")]).device_name, "Den");
        assert_eq!(announcement("nas.local.", &[("h", "")]).device_name, "nas");
    }

    #[test]
    fn test_find_server() {
        let servers = vec![
            announcement("nas.local.", &[]),
            announcement("media.local.", &[("h", "Media Box")]),
        ];

        assert_eq!(find_server(&servers, "nas").unwrap().hostname, "nas.local.");
        assert_eq!(find_server(&servers, "nas.local").unwrap().hostname, "nas.local.");
        assert_eq!(find_server(&servers, "Media Box").unwrap().hostname, "media.local.");
        assert_eq!(find_server(&servers, "media.local.").unwrap().hostname, "media.local.");
        assert!(find_server(&servers, "attic").is_none());
    }
}
