use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A server announced on the local network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    /// mDNS hostname, e.g. `nas.local.`
    pub hostname: String,
    /// Full DNS-SD instance name
    pub fullname: String,
    /// Human-readable device name
    pub device_name: String,
    pub port: u16,
    /// Candidate addresses in announcement order
    pub addresses: Vec<String>,
    #[serde(default)]
    pub txt: BTreeMap<String, String>,
}

impl ServerDescriptor {
    /// Build a descriptor for a server known only by its addresses
    pub fn from_addresses(hostname: &str, addresses: Vec<String>, port: u16) -> Self {
        Self {
            hostname: hostname.to_string(),
            fullname: hostname.to_string(),
            device_name: device_name_from_hostname(hostname),
            port,
            addresses: clean_addresses(addresses),
            txt: BTreeMap::new(),
        }
    }

    /// Match on device name or hostname, with or without `.local.`
    pub fn matches_name(&self, name: &str) -> bool {
        self.device_name == name
            || device_name_from_hostname(&self.hostname) == device_name_from_hostname(name)
    }
}

/// Trim each address and drop blanks, keeping order
pub fn clean_addresses(addresses: Vec<String>) -> Vec<String> {
    addresses
        .into_iter()
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .collect()
}

/// Strip the `.local.` suffix from an mDNS hostname
pub fn device_name_from_hostname(hostname: &str) -> String {
    hostname
        .trim_end_matches('.')
        .trim_end_matches(".local")
        .to_string()
}

/// Whether an HTTP URL can be built for this address.
///
/// Zoned IPv6 addresses (`fe80::1%eth0`) cannot be written into a URL host.
pub fn is_dialable(address: &str) -> bool {
    !address.is_empty() && !address.contains('%')
}

/// Compose `http://{address}:{port}`, bracketing IPv6 literals.
/// Returns `None` for addresses that cannot appear in a URL.
pub fn base_url(address: &str, port: u16) -> Option<String> {
    if !is_dialable(address) {
        return None;
    }

    if address.contains(':') {
        Some(format!("http://[{}]:{}", address, port))
    } else {
        Some(format!("http://{}:{}", address, port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_ipv4() {
        assert_eq!(base_url("10.0.0.5", 8080).as_deref(), Some("http://10.0.0.5:8080"));
    }

    #[test]
    fn test_base_url_ipv6_bracketed() {
        assert_eq!(base_url("fe80::1", 8080).as_deref(), Some("http://[fe80::1]:8080"));
    }

    #[test]
    fn test_scoped_ipv6_has_no_url() {
        assert!(!is_dialable("fe80::1%eth0"));
        assert_eq!(base_url("fe80::1%eth0", 8080), None);
        assert!(is_dialable("fe80::1"));
    }

    #[test]
    fn test_device_name_from_hostname() {
        assert_eq!(device_name_from_hostname("nas.local."), "nas");
        assert_eq!(device_name_from_hostname("nas.local"), "nas");
        assert_eq!(device_name_from_hostname("nas"), "nas");
    }

    #[test]
    fn test_addresses_trimmed_on_construction() {
        let desc = ServerDescriptor::from_addresses(
            "nas.local.",
            vec![" 10.0.0.5".into(), "".into(), "192.168.1.20\n".into()],
            8080,
        );
        assert_eq!(desc.addresses, vec!["10.0.0.5", "192.168.1.20"]);
    }

    #[test]
    fn test_matches_name() {
        let mut desc = ServerDescriptor::from_addresses("nas.local.", vec![], 8080);
        desc.device_name = "Living Room".to_string();

        assert!(desc.matches_name("nas"));
        assert!(desc.matches_name("nas.local"));
        assert!(desc.matches_name("nas.local."));
        assert!(desc.matches_name("Living Room"));
        assert!(!desc.matches_name("attic"));
    }

    #[test]
    fn test_serde_roundtrip_keeps_address_order() {
        let desc = ServerDescriptor::from_addresses(
            "nas.local.",
            vec!["192.168.1.20".into(), "10.0.0.5".into()],
            8080,
        );
        let json = serde_json::to_string(&desc).unwrap();
        let back: ServerDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, desc);
        assert_eq!(back.device_name, "nas");
    }
}
