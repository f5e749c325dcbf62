use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::ResolveError;
use super::priority::{PriorityTable, RankedAddress, is_ipv4_literal};
use super::probe::{DEFAULT_HEALTH_PATH, HttpProbe, Probe, ProbeTarget};
use crate::config::ResolverConfig;
use crate::descriptor::{ServerDescriptor, base_url, is_dialable};

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// The address picked for a server
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionResult {
    pub address: String,
    pub port: u16,
    /// `None` when the address cannot be written into a URL
    pub base_url: Option<String>,
    /// The address answered its health probe
    pub verified: bool,
    pub priority: u32,
    /// Every address that answered, highest priority first
    pub reachable: Vec<String>,
}

impl ResolutionResult {
    fn new(candidate: &RankedAddress, port: u16, verified: bool, reachable: Vec<String>) -> Self {
        Self {
            address: candidate.address.clone(),
            port,
            base_url: base_url(&candidate.address, port),
            verified,
            priority: candidate.priority.score,
            reachable,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolverOptions {
    pub table: PriorityTable,
    pub probe_timeout: Duration,
    /// Bound on the whole scatter-gather, on top of the per-probe timeout
    pub deadline: Option<Duration>,
    /// Probe IPv6 literals and hostnames. When off they are still ranked for
    /// the fallback, just never considered reachable.
    pub probe_non_ipv4: bool,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            table: PriorityTable::default(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            deadline: None,
            probe_non_ipv4: true,
        }
    }
}

impl From<&ResolverConfig> for ResolverOptions {
    fn from(config: &ResolverConfig) -> Self {
        Self {
            table: config.priority_table(),
            probe_timeout: Duration::from_millis(config.probe_timeout_ms),
            deadline: config.deadline_ms.map(Duration::from_millis),
            probe_non_ipv4: config.probe_non_ipv4,
        }
    }
}

enum Gathered {
    Done(Vec<bool>),
    Cancelled,
    DeadlineElapsed(Duration),
}

/// Picks one base URL for a discovered server.
///
/// Every candidate is probed concurrently and the call waits for all probes
/// before ranking, so latency is bounded by the probe timeout rather than
/// the number of addresses. Reachable addresses win over unreachable ones;
/// among them the highest priority wins. When nothing answers, the highest
/// priority address is returned unverified.
pub struct Resolver<P: Probe> {
    options: ResolverOptions,
    probe: Arc<P>,
}

impl Resolver<HttpProbe> {
    pub fn from_config(config: &ResolverConfig) -> Result<Self, ResolveError> {
        let options = ResolverOptions::from(config);
        let health_path = if config.health_path.is_empty() {
            DEFAULT_HEALTH_PATH
        } else {
            config.health_path.as_str()
        };
        let probe = HttpProbe::new(health_path, options.probe_timeout)?;
        Ok(Self::new(options, probe))
    }
}

impl<P: Probe> Resolver<P> {
    pub fn new(options: ResolverOptions, probe: P) -> Self {
        Self {
            options,
            probe: Arc::new(probe),
        }
    }

    pub async fn resolve(
        &self,
        server: &ServerDescriptor,
        credential: Option<&str>,
    ) -> Result<ResolutionResult, ResolveError> {
        self.resolve_with_cancel(server, credential, &CancellationToken::new())
            .await
    }

    /// Resolve, giving up as soon as `cancel` fires or the configured
    /// deadline passes. Outstanding probes are aborted and awaited before
    /// returning.
    pub async fn resolve_with_cancel(
        &self,
        server: &ServerDescriptor,
        credential: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ResolutionResult, ResolveError> {
        let ranked = self.rank(server)?;

        if cancel.is_cancelled() {
            return Err(ResolveError::Cancelled);
        }

        debug!(
            "Probing {} addresses for {}",
            ranked.len(),
            server.hostname
        );

        let mut probes = JoinSet::new();
        for candidate in &ranked {
            if !is_dialable(&candidate.address) {
                debug!("Skipping undialable address {}", candidate.address);
                continue;
            }
            if !self.options.probe_non_ipv4 && !is_ipv4_literal(&candidate.address) {
                debug!("Skipping probe for non-IPv4 address {}", candidate.address);
                continue;
            }

            let probe = Arc::clone(&self.probe);
            let target = ProbeTarget {
                address: candidate.address.clone(),
                port: server.port,
                token: credential.map(String::from),
            };
            let index = candidate.index;
            let timeout = self.options.probe_timeout;

            probes.spawn(async move {
                let reachable = tokio::time::timeout(timeout, probe.probe(&target))
                    .await
                    .unwrap_or(false);
                (index, reachable)
            });
        }

        let deadline = self.options.deadline;
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => Gathered::Cancelled,
            () = sleep_until_deadline(deadline) => {
                Gathered::DeadlineElapsed(deadline.unwrap_or_default())
            }
            reachable = gather(&mut probes, server.addresses.len()) => Gathered::Done(reachable),
        };

        let reachable = match outcome {
            Gathered::Done(reachable) => reachable,
            Gathered::Cancelled => {
                probes.shutdown().await;
                info!("Resolution of {} cancelled", server.hostname);
                return Err(ResolveError::Cancelled);
            }
            Gathered::DeadlineElapsed(limit) => {
                probes.shutdown().await;
                warn!(
                    "Resolution of {} exceeded deadline of {:?}",
                    server.hostname, limit
                );
                return Err(ResolveError::DeadlineElapsed(limit));
            }
        };

        let result = select(&ranked, &reachable, server.port)?;
        if result.verified {
            info!(
                "Selected {} for {} (priority {}, {} reachable)",
                result.address,
                server.hostname,
                result.priority,
                result.reachable.len()
            );
        } else {
            warn!(
                "No reachable address for {}, falling back to {}",
                server.hostname, result.address
            );
        }

        Ok(result)
    }

    /// Pick by priority alone, without touching the network
    pub fn rank_offline(&self, server: &ServerDescriptor) -> Result<ResolutionResult, ResolveError> {
        let ranked = self.rank(server)?;
        select(&ranked, &[], server.port)
    }

    pub fn rank(&self, server: &ServerDescriptor) -> Result<Vec<RankedAddress>, ResolveError> {
        if server.addresses.is_empty() {
            return Err(ResolveError::NoAddresses {
                hostname: server.hostname.clone(),
            });
        }
        Ok(self.options.table.rank(&server.addresses))
    }
}

/// First reachable candidate in rank order. Otherwise the top-ranked
/// dialable one, and the top-ranked one when none is dialable.
fn select(
    ranked: &[RankedAddress],
    reachable: &[bool],
    port: u16,
) -> Result<ResolutionResult, ResolveError> {
    let is_reachable = |c: &&RankedAddress| reachable.get(c.index).copied().unwrap_or(false);
    let answered: Vec<&RankedAddress> = ranked.iter().filter(is_reachable).collect();
    let addresses = answered.iter().map(|c| c.address.clone()).collect();

    if let Some(candidate) = answered.first() {
        return Ok(ResolutionResult::new(candidate, port, true, addresses));
    }

    ranked
        .iter()
        .find(|c| is_dialable(&c.address))
        .or_else(|| ranked.first())
        .map(|candidate| ResolutionResult::new(candidate, port, false, addresses))
        .ok_or_else(|| ResolveError::NoAddresses {
            hostname: String::new(),
        })
}

async fn gather(probes: &mut JoinSet<(usize, bool)>, total: usize) -> Vec<bool> {
    let mut reachable = vec![false; total];
    while let Some(joined) = probes.join_next().await {
        match joined {
            Ok((index, ok)) => {
                if let Some(slot) = reachable.get_mut(index) {
                    *slot = ok;
                }
            }
            Err(e) => warn!("Probe task failed: {}", e),
        }
    }
    reachable
}

async fn sleep_until_deadline(deadline: Option<Duration>) {
    match deadline {
        Some(limit) => tokio::time::sleep(limit).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    const SLACK: Duration = Duration::from_millis(10);

    #[derive(Clone, Copy)]
    enum Behaviour {
        Up,
        Down,
        Hang,
    }

    #[derive(Default)]
    struct ScriptedProbe {
        script: HashMap<String, Behaviour>,
        started: AtomicUsize,
        live: Arc<AtomicUsize>,
        tokens: Mutex<Vec<Option<String>>>,
    }

    impl ScriptedProbe {
        fn new(script: &[(&str, Behaviour)]) -> Self {
            Self {
                script: script
                    .iter()
                    .map(|(addr, b)| (addr.to_string(), *b))
                    .collect(),
                ..Default::default()
            }
        }
    }

    struct LiveGuard(Arc<AtomicUsize>);

    impl Drop for LiveGuard {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl Probe for ScriptedProbe {
        async fn probe(&self, target: &ProbeTarget) -> bool {
            self.started.fetch_add(1, Ordering::SeqCst);
            self.live.fetch_add(1, Ordering::SeqCst);
            let _guard = LiveGuard(Arc::clone(&self.live));
            self.tokens.lock().unwrap().push(target.token.clone());

            match self.script.get(&target.address).copied().unwrap_or(Behaviour::Down) {
                Behaviour::Up => true,
                Behaviour::Down => false,
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    true
                }
            }
        }
    }

    fn options() -> ResolverOptions {
        ResolverOptions {
            probe_timeout: Duration::from_millis(100),
            ..Default::default()
        }
    }

    fn server(addresses: &[&str]) -> ServerDescriptor {
        ServerDescriptor::from_addresses(
            "nas.local.",
            addresses.iter().map(|s| s.to_string()).collect(),
            8080,
        )
    }

    #[tokio::test]
    async fn test_prefers_highest_tier_when_all_reachable() {
        let probe = ScriptedProbe::new(&[
            ("10.0.0.5", Behaviour::Up),
            ("192.168.1.20", Behaviour::Up),
            ("8.8.8.8", Behaviour::Up),
        ]);
        let resolver = Resolver::new(options(), probe);

        for order in [
            ["10.0.0.5", "192.168.1.20", "8.8.8.8"],
            ["8.8.8.8", "192.168.1.20", "10.0.0.5"],
            ["192.168.1.20", "10.0.0.5", "8.8.8.8"],
        ] {
            let result = resolver.resolve(&server(&order), None).await.unwrap();
            assert_eq!(result.address, "10.0.0.5");
            assert_eq!(result.base_url.as_deref(), Some("http://10.0.0.5:8080"));
            assert!(result.verified);
        }
    }

    #[tokio::test]
    async fn test_reachability_overrides_priority() {
        let probe = ScriptedProbe::new(&[
            ("10.0.0.5", Behaviour::Hang),
            ("192.168.1.20", Behaviour::Up),
        ]);
        let resolver = Resolver::new(options(), probe);

        let result = resolver
            .resolve(&server(&["10.0.0.5", "192.168.1.20"]), None)
            .await
            .unwrap();
        assert_eq!(result.address, "192.168.1.20");
        assert!(result.verified);
    }

    #[tokio::test]
    async fn test_falls_back_to_highest_priority_when_nothing_reachable() {
        let probe = ScriptedProbe::new(&[
            ("10.0.0.5", Behaviour::Down),
            ("192.168.1.20", Behaviour::Hang),
        ]);
        let resolver = Resolver::new(options(), probe);

        let result = resolver
            .resolve(&server(&["192.168.1.20", "10.0.0.5"]), None)
            .await
            .unwrap();
        assert_eq!(result.address, "10.0.0.5");
        assert!(!result.verified);
    }

    #[tokio::test]
    async fn test_empty_addresses_fail_without_probing() {
        let resolver = Resolver::new(options(), ScriptedProbe::default());

        let err = resolver.resolve(&server(&[]), None).await.unwrap_err();
        assert!(matches!(err, ResolveError::NoAddresses { ref hostname } if hostname == "nas.local."));
        assert_eq!(resolver.probe.started.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_bounded_by_probe_timeout() {
        let addresses: Vec<String> = (1..=40).map(|i| format!("192.168.1.{}", i)).collect();
        let script: Vec<(&str, Behaviour)> =
            addresses.iter().map(|a| (a.as_str(), Behaviour::Hang)).collect();
        let resolver = Resolver::new(options(), ScriptedProbe::new(&script));
        let desc = ServerDescriptor::from_addresses("nas.local.", addresses.clone(), 8080);

        let start = Instant::now();
        let result = resolver.resolve(&desc, None).await.unwrap();
        let elapsed = start.elapsed();

        let limit = resolver.options.probe_timeout;
        assert!(elapsed >= limit, "took {:?}", elapsed);
        assert!(elapsed <= limit + SLACK, "took {:?}", elapsed);
        assert_eq!(resolver.probe.started.load(Ordering::SeqCst), 40);
        assert!(addresses.contains(&result.address));
        assert_eq!(result.address, "192.168.1.1");
    }

    #[tokio::test]
    async fn test_repeat_resolution_is_stable() {
        let probe = ScriptedProbe::new(&[
            ("192.168.1.30", Behaviour::Up),
            ("192.168.1.20", Behaviour::Up),
        ]);
        let resolver = Resolver::new(options(), probe);
        let desc = server(&["192.168.1.30", "192.168.1.20"]);

        let first = resolver.resolve(&desc, None).await.unwrap();
        let second = resolver.resolve(&desc, None).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.address, "192.168.1.30");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_aborts_outstanding_probes() {
        let probe = ScriptedProbe::new(&[
            ("10.0.0.5", Behaviour::Hang),
            ("192.168.1.20", Behaviour::Hang),
            ("192.168.1.21", Behaviour::Up),
        ]);
        let mut opts = options();
        opts.probe_timeout = Duration::from_secs(10);
        let resolver = Resolver::new(opts, probe);
        let token = CancellationToken::new();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let err = resolver
            .resolve_with_cancel(
                &server(&["10.0.0.5", "192.168.1.20", "192.168.1.21"]),
                None,
                &token,
            )
            .await
            .unwrap_err();
        let elapsed = start.elapsed();

        assert!(elapsed <= Duration::from_millis(50) + SLACK, "took {:?}", elapsed);
        assert!(matches!(err, ResolveError::Cancelled));
        assert!(err.is_cancellation());
        assert_eq!(resolver.probe.started.load(Ordering::SeqCst), 3);
        assert_eq!(resolver.probe.live.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_skips_probes() {
        let resolver = Resolver::new(options(), ScriptedProbe::new(&[("10.0.0.5", Behaviour::Up)]));
        let token = CancellationToken::new();
        token.cancel();

        let err = resolver
            .resolve_with_cancel(&server(&["10.0.0.5"]), None, &token)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Cancelled));
        assert_eq!(resolver.probe.started.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overall_deadline() {
        let mut opts = options();
        opts.probe_timeout = Duration::from_secs(10);
        opts.deadline = Some(Duration::from_millis(50));
        let resolver = Resolver::new(opts, ScriptedProbe::new(&[("10.0.0.5", Behaviour::Hang)]));

        let start = Instant::now();
        let err = resolver
            .resolve(&server(&["10.0.0.5"]), None)
            .await
            .unwrap_err();
        let elapsed = start.elapsed();

        assert!(elapsed <= Duration::from_millis(50) + SLACK, "took {:?}", elapsed);
        assert!(matches!(err, ResolveError::DeadlineElapsed(d) if d == Duration::from_millis(50)));
        assert_eq!(resolver.probe.live.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_credential_passed_to_every_probe() {
        let probe = ScriptedProbe::new(&[("10.0.0.5", Behaviour::Up), ("192.168.1.2", Behaviour::Up)]);
        let resolver = Resolver::new(options(), probe);

        resolver
            .resolve(&server(&["10.0.0.5", "192.168.1.2"]), Some("secret"))
            .await
            .unwrap();

        let tokens = resolver.probe.tokens.lock().unwrap().clone();
        assert_eq!(tokens.len(), 2);
        assert!(tokens.iter().all(|t| t.as_deref() == Some("secret")));
    }

    #[tokio::test]
    async fn test_non_ipv4_probed_by_default() {
        let probe = ScriptedProbe::new(&[("fe80::1", Behaviour::Up), ("10.0.0.5", Behaviour::Down)]);
        let resolver = Resolver::new(options(), probe);

        let result = resolver
            .resolve(&server(&["10.0.0.5", "fe80::1"]), None)
            .await
            .unwrap();
        assert_eq!(result.address, "fe80::1");
        assert_eq!(result.base_url.as_deref(), Some("http://[fe80::1]:8080"));
        assert!(result.verified);
    }

    #[tokio::test]
    async fn test_non_ipv4_kept_for_fallback_when_not_probed() {
        let mut opts = options();
        opts.probe_non_ipv4 = false;
        let resolver = Resolver::new(opts, ScriptedProbe::new(&[("fe80::1", Behaviour::Up)]));

        let result = resolver.resolve(&server(&["fe80::1"]), None).await.unwrap();
        assert_eq!(result.address, "fe80::1");
        assert!(!result.verified);
        assert_eq!(resolver.probe.started.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reachable_addresses_listed_in_rank_order() {
        let script = ScriptedProbe::new(&[
            ("192.168.1.20", Behaviour::Up),
            ("10.0.0.5", Behaviour::Down),
            ("8.8.8.8", Behaviour::Up),
            ("172.17.0.2", Behaviour::Up),
        ]);
        let resolver = Resolver::new(options(), script);

        let result = resolver
            .resolve(
                &server(&["8.8.8.8", "10.0.0.5", "172.17.0.2", "192.168.1.20"]),
                None,
            )
            .await
            .unwrap();
        assert_eq!(result.address, "192.168.1.20");
        assert_eq!(result.reachable, vec!["192.168.1.20", "172.17.0.2", "8.8.8.8"]);
    }

    #[tokio::test]
    async fn test_reachable_empty_on_fallback() {
        let resolver = Resolver::new(options(), ScriptedProbe::new(&[("10.0.0.5", Behaviour::Down)]));

        let result = resolver.resolve(&server(&["10.0.0.5"]), None).await.unwrap();
        assert!(!result.verified);
        assert!(result.reachable.is_empty());
    }

    #[tokio::test]
    async fn test_scoped_ipv6_ranked_but_never_dialed() {
        let script = ScriptedProbe::new(&[("fe80::1%eth0", Behaviour::Up), ("10.0.0.5", Behaviour::Up)]);
        let resolver = Resolver::new(options(), script);
        let desc = server(&["fe80::1%eth0", "10.0.0.5"]);

        let ranked = resolver.rank(&desc).unwrap();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[1].address, "fe80::1%eth0");

        let result = resolver.resolve(&desc, None).await.unwrap();
        assert_eq!(result.address, "10.0.0.5");
        assert_eq!(result.reachable, vec!["10.0.0.5"]);
        assert_eq!(resolver.probe.started.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fallback_skips_scoped_ipv6() {
        // Scoped address outranks the IPv4 one here
        let opts = ResolverOptions {
            table: PriorityTable::new(Vec::new(), 0, 5),
            ..options()
        };
        let resolver = Resolver::new(opts, ScriptedProbe::new(&[("10.0.0.5", Behaviour::Down)]));

        let result = resolver
            .resolve(&server(&["fe80::1%eth0", "10.0.0.5"]), None)
            .await
            .unwrap();
        assert_eq!(result.address, "10.0.0.5");
        assert_eq!(result.base_url.as_deref(), Some("http://10.0.0.5:8080"));
        assert!(!result.verified);
    }

    #[tokio::test]
    async fn test_only_scoped_ipv6_falls_back_without_url() {
        let resolver = Resolver::new(options(), ScriptedProbe::new(&[("fe80::1%eth0", Behaviour::Up)]));

        let result = resolver.resolve(&server(&["fe80::1%eth0"]), None).await.unwrap();
        assert_eq!(result.address, "fe80::1%eth0");
        assert_eq!(result.base_url, None);
        assert!(!result.verified);
        assert_eq!(resolver.probe.started.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_rank_offline() {
        let resolver = Resolver::new(options(), ScriptedProbe::default());
        let result = resolver
            .rank_offline(&server(&["fe80::1", "192.168.1.20", "172.17.0.2"]))
            .unwrap();
        assert_eq!(result.address, "192.168.1.20");
        assert!(!result.verified);
        assert_eq!(result.priority, 50);
        assert_eq!(resolver.probe.started.load(Ordering::SeqCst), 0);
    }
}
