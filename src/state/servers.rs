use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::descriptor::ServerDescriptor;
use crate::resolver::ResolutionResult;

const CURRENT_FILE: &str = "current_server.json";
const RECENT_FILE: &str = "recent_servers.json";
pub const MAX_RECENT: usize = 5;

/// A server the user has connected to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredServer {
    #[serde(flatten)]
    pub server: ServerDescriptor,
    /// Base URL picked at connect time
    pub url: String,
    pub verified: bool,
    #[serde(default)]
    pub username: Option<String>,
    pub last_connected: DateTime<Utc>,
}

impl StoredServer {
    pub fn from_resolution(server: &ServerDescriptor, result: &ResolutionResult) -> Result<Self> {
        let url = result
            .base_url
            .clone()
            .with_context(|| format!("No usable URL for address {}", result.address))?;
        Ok(Self {
            server: server.clone(),
            url,
            verified: result.verified,
            username: None,
            last_connected: Utc::now(),
        })
    }
}

/// Current and recently used servers, kept as JSON under the data dir.
///
/// Resolution never writes here; callers decide what to persist.
pub struct ServerStore {
    dir: PathBuf,
}

impl ServerStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            dir: data_dir.to_path_buf(),
        }
    }

    pub fn current(&self) -> Result<Option<StoredServer>> {
        read_json(&self.dir.join(CURRENT_FILE))
    }

    /// Make `server` current and move it to the front of the recent list
    pub fn set_current(&self, server: &StoredServer) -> Result<()> {
        write_json(&self.dir.join(CURRENT_FILE), server)?;

        let mut recent = self.recent()?;
        recent.retain(|s| s.server.fullname != server.server.fullname);
        recent.insert(0, server.clone());
        recent.truncate(MAX_RECENT);
        write_json(&self.dir.join(RECENT_FILE), &recent)?;

        info!(
            "Current server set to {} ({})",
            server.server.device_name, server.url
        );
        Ok(())
    }

    pub fn recent(&self) -> Result<Vec<StoredServer>> {
        Ok(read_json(&self.dir.join(RECENT_FILE))?.unwrap_or_default())
    }

    /// Look up a recent server by device name or hostname
    pub fn find_recent(&self, name: &str) -> Result<Option<StoredServer>> {
        Ok(self.recent()?.into_iter().find(|s| s.server.matches_name(name)))
    }

    /// Forget the current server. Returns whether one was set.
    pub fn clear_current(&self) -> Result<bool> {
        let path = self.dir.join(CURRENT_FILE);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)
            .with_context(|| format!("Failed to remove {}", path.display()))?;
        info!("Current server cleared");
        Ok(true)
    }

    /// Replace the current server's addresses after a network change
    pub fn refresh_addresses(&self, addresses: Vec<String>) -> Result<Option<StoredServer>> {
        let Some(mut current) = self.current()? else {
            debug!("No current server to refresh");
            return Ok(None);
        };

        current.server.addresses = addresses;
        current.last_connected = Utc::now();
        write_json(&self.dir.join(CURRENT_FILE), &current)?;
        Ok(Some(current))
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(value))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let content = serde_json::to_string_pretty(value)?;
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}
