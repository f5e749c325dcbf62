use anyhow::{Context, Result};
use ipnetwork::Ipv4Network;
use std::net::Ipv4Addr;

pub const DEFAULT_IPV4_OTHER_SCORE: u32 = 25;
pub const DEFAULT_NON_IPV4_SCORE: u32 = 1;

/// An IPv4 range and the score addresses inside it receive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tier {
    pub network: Ipv4Network,
    pub score: u32,
    pub label: String,
}

impl Tier {
    pub fn new(network: &str, score: u32, label: &str) -> Result<Self> {
        let network = network
            .parse::<Ipv4Network>()
            .with_context(|| format!("Invalid tier network '{}'", network))?;
        Ok(Self {
            network,
            score,
            label: label.to_string(),
        })
    }
}

/// Score assigned to a single address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Priority {
    pub score: u32,
    pub label: String,
}

/// An address with its priority and its position in the input list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedAddress {
    pub address: String,
    pub index: usize,
    pub priority: Priority,
}

/// Network-locality ranking for candidate addresses.
///
/// An IPv4 address takes the score of the most specific tier that contains
/// it. IPv4 addresses outside every tier score `ipv4_other_score`, anything
/// that is not an IPv4 literal scores `non_ipv4_score`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityTable {
    tiers: Vec<Tier>,
    ipv4_other_score: u32,
    non_ipv4_score: u32,
}

impl PriorityTable {
    pub fn new(tiers: Vec<Tier>, ipv4_other_score: u32, non_ipv4_score: u32) -> Self {
        Self {
            tiers,
            ipv4_other_score,
            non_ipv4_score,
        }
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    pub fn score(&self, address: &str) -> Priority {
        let Some(ip) = parse_ipv4(address) else {
            return Priority {
                score: self.non_ipv4_score,
                label: "non-ipv4".to_string(),
            };
        };

        self.tiers
            .iter()
            .filter(|tier| tier.network.contains(ip))
            // Ties on prefix length keep the earlier table entry
            .rev()
            .max_by_key(|tier| tier.network.prefix())
            .map(|tier| Priority {
                score: tier.score,
                label: tier.label.clone(),
            })
            .unwrap_or_else(|| Priority {
                score: self.ipv4_other_score,
                label: "ipv4-other".to_string(),
            })
    }

    /// Rank addresses by score, highest first. Equal scores keep input order.
    pub fn rank(&self, addresses: &[String]) -> Vec<RankedAddress> {
        let mut ranked: Vec<RankedAddress> = addresses
            .iter()
            .enumerate()
            .map(|(index, address)| RankedAddress {
                address: address.clone(),
                index,
                priority: self.score(address),
            })
            .collect();

        // sort_by is stable
        ranked.sort_by(|a, b| b.priority.score.cmp(&a.priority.score));
        ranked
    }
}

impl Default for PriorityTable {
    fn default() -> Self {
        let tiers = [
            (Ipv4Addr::new(10, 0, 0, 0), 24, 100, "wired-lan"),
            (Ipv4Addr::new(192, 168, 1, 0), 24, 50, "wifi-primary"),
            (Ipv4Addr::new(192, 168, 0, 0), 16, 40, "wifi-secondary"),
            (Ipv4Addr::new(172, 17, 0, 0), 16, 30, "docker"),
            (Ipv4Addr::new(169, 254, 0, 0), 16, 20, "link-local"),
        ]
        .into_iter()
        .filter_map(|(addr, prefix, score, label)| {
            Ipv4Network::new(addr, prefix).ok().map(|network| Tier {
                network,
                score,
                label: label.to_string(),
            })
        })
        .collect();

        Self::new(tiers, DEFAULT_IPV4_OTHER_SCORE, DEFAULT_NON_IPV4_SCORE)
    }
}

pub fn is_ipv4_literal(address: &str) -> bool {
    parse_ipv4(address).is_some()
}

fn parse_ipv4(address: &str) -> Option<Ipv4Addr> {
    address.parse::<Ipv4Addr>().ok()
}
