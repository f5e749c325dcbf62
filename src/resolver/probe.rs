use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::descriptor::base_url;

/// Lightweight read-only endpoint the backend always serves when healthy
pub const DEFAULT_HEALTH_PATH: &str = "/api/system/get-root-path";

/// One liveness check to perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    pub address: String,
    pub port: u16,
    pub token: Option<String>,
}

impl ProbeTarget {
    pub fn base_url(&self) -> Option<String> {
        base_url(&self.address, self.port)
    }
}

/// Reachability check for a single candidate address.
///
/// Implementations return `true` only for a healthy response. Errors are
/// folded into `false`; the resolver applies its own timeout on top.
pub trait Probe: Send + Sync + 'static {
    fn probe(&self, target: &ProbeTarget) -> impl Future<Output = bool> + Send;
}

/// `GET {base_url}{health_path}` with an optional bearer token
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    health_path: String,
}

impl HttpProbe {
    pub fn new(health_path: &str, timeout: Duration) -> reqwest::Result<Self> {
        // Candidates are LAN addresses, never route them through a proxy
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            health_path: normalize_path(health_path),
        })
    }

    pub fn url_for(&self, target: &ProbeTarget) -> Option<String> {
        target
            .base_url()
            .map(|base| format!("{}{}", base, self.health_path))
    }
}

impl Probe for HttpProbe {
    async fn probe(&self, target: &ProbeTarget) -> bool {
        let Some(url) = self.url_for(target) else {
            debug!("No URL for {}, not probing", target.address);
            return false;
        };
        let mut request = self.client.get(&url);
        if let Some(token) = target.token.as_deref() {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(response) => {
                let reachable = response.status().is_success();
                debug!("Probe {} -> {}", url, response.status());
                reachable
            }
            Err(e) => {
                debug!("Probe {} failed: {}", url, e);
                false
            }
        }
    }
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}
