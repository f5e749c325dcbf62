use anyhow::{Context, Result};
use prefer::{ConfigValue, FromValue};
use std::path::{Path, PathBuf};

use crate::resolver::{
    DEFAULT_HEALTH_PATH, DEFAULT_IPV4_OTHER_SCORE, DEFAULT_NON_IPV4_SCORE, PriorityTable, Tier,
};

pub const DEFAULT_SERVICE_TYPE: &str = "_aaxion._tcp.local.";
pub const DEFAULT_SERVER_PORT: u16 = 8080;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Config {
    pub resolver: ResolverConfig,
    pub discovery: DiscoveryConfig,
    pub paths: PathConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolverConfig {
    /// Per-address health probe timeout (default: 500)
    pub probe_timeout_ms: u64,
    /// Overall bound on a resolution, unset for none
    pub deadline_ms: Option<u64>,
    pub health_path: String,
    /// Probe IPv6 literals and hostnames as well (default: true)
    pub probe_non_ipv4: bool,
    pub tiers: Vec<Tier>,
    pub ipv4_other_score: u32,
    pub non_ipv4_score: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryConfig {
    /// DNS-SD service type to browse for
    pub service_type: String,
    /// How long to listen for announcements (default: 1500)
    pub scan_ms: u64,
    /// Port used for servers given by address only
    pub default_port: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathConfig {
    pub data_dir: PathBuf,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 500,
            deadline_ms: None,
            health_path: DEFAULT_HEALTH_PATH.to_string(),
            probe_non_ipv4: true,
            tiers: PriorityTable::default().tiers().to_vec(),
            ipv4_other_score: DEFAULT_IPV4_OTHER_SCORE,
            non_ipv4_score: DEFAULT_NON_IPV4_SCORE,
        }
    }
}

impl ResolverConfig {
    pub fn priority_table(&self) -> PriorityTable {
        PriorityTable::new(
            self.tiers.clone(),
            self.ipv4_other_score,
            self.non_ipv4_score,
        )
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            service_type: DEFAULT_SERVICE_TYPE.to_string(),
            scan_ms: 1500,
            default_port: DEFAULT_SERVER_PORT,
        }
    }
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            data_dir: Config::default_data_dir(),
        }
    }
}

// FromValue implementations for prefer integration

fn expect_object<'a>(
    value: &'a ConfigValue,
    type_name: &str,
) -> prefer::Result<&'a std::collections::HashMap<String, ConfigValue>> {
    value
        .as_object()
        .ok_or_else(|| prefer::Error::ConversionError {
            key: String::new(),
            type_name: type_name.into(),
            source: "expected object".into(),
        })
}

/// Read an optional integer field, rejecting values that do not fit `T`
fn checked_int<T: TryFrom<u64>>(
    obj: &std::collections::HashMap<String, ConfigValue>,
    key: &str,
    type_name: &str,
) -> prefer::Result<Option<T>> {
    let Some(value) = obj.get(key) else {
        return Ok(None);
    };
    let conversion_error = |message: String| prefer::Error::ConversionError {
        key: key.into(),
        type_name: type_name.into(),
        source: message.into(),
    };

    let n = value
        .as_u64()
        .ok_or_else(|| conversion_error("expected a non-negative integer".to_string()))?;
    T::try_from(n)
        .map(Some)
        .map_err(|_| conversion_error(format!("{} is out of range", n)))
}

impl FromValue for Config {
    fn from_value(value: &ConfigValue) -> prefer::Result<Self> {
        let obj = expect_object(value, "Config")?;

        Ok(Self {
            resolver: obj
                .get("resolver")
                .map(ResolverConfig::from_value)
                .transpose()?
                .unwrap_or_default(),
            discovery: obj
                .get("discovery")
                .map(DiscoveryConfig::from_value)
                .transpose()?
                .unwrap_or_default(),
            paths: obj
                .get("paths")
                .map(PathConfig::from_value)
                .transpose()?
                .unwrap_or_default(),
        })
    }
}

impl FromValue for ResolverConfig {
    fn from_value(value: &ConfigValue) -> prefer::Result<Self> {
        let obj = expect_object(value, "ResolverConfig")?;
        let defaults = Self::default();

        Ok(Self {
            probe_timeout_ms: obj
                .get("probe_timeout_ms")
                .and_then(|v| v.as_u64())
                .unwrap_or(defaults.probe_timeout_ms),
            deadline_ms: obj.get("deadline_ms").and_then(|v| v.as_u64()),
            health_path: obj
                .get("health_path")
                .and_then(|v| v.as_str())
                .map(String::from)
                .unwrap_or(defaults.health_path),
            probe_non_ipv4: obj
                .get("probe_non_ipv4")
                .and_then(|v| v.as_bool())
                .unwrap_or(defaults.probe_non_ipv4),
            tiers: obj
                .get("tiers")
                .and_then(|v| v.as_array())
                .map(|arr| {
                    arr.iter()
                        .map(Tier::from_value)
                        .collect::<prefer::Result<Vec<_>>>()
                })
                .transpose()?
                .unwrap_or(defaults.tiers),
            ipv4_other_score: checked_int(obj, "ipv4_other_score", "ResolverConfig")?
                .unwrap_or(defaults.ipv4_other_score),
            non_ipv4_score: checked_int(obj, "non_ipv4_score", "ResolverConfig")?
                .unwrap_or(defaults.non_ipv4_score),
        })
    }
}

impl FromValue for Tier {
    fn from_value(value: &ConfigValue) -> prefer::Result<Self> {
        let obj = expect_object(value, "Tier")?;

        let network = obj
            .get("network")
            .and_then(|v| v.as_str())
            .ok_or_else(|| prefer::Error::ConversionError {
                key: "network".into(),
                type_name: "Tier".into(),
                source: "missing network".into(),
            })?;
        let score = checked_int(obj, "score", "Tier")?.ok_or_else(|| {
            prefer::Error::ConversionError {
                key: "score".into(),
                type_name: "Tier".into(),
                source: "missing score".into(),
            }
        })?;
        let label = obj
            .get("label")
            .and_then(|v| v.as_str())
            .unwrap_or(network);

        Tier::new(network, score, label).map_err(|e| prefer::Error::ConversionError {
            key: "network".into(),
            type_name: "Tier".into(),
            source: e.to_string().into(),
        })
    }
}

impl FromValue for DiscoveryConfig {
    fn from_value(value: &ConfigValue) -> prefer::Result<Self> {
        let obj = expect_object(value, "DiscoveryConfig")?;
        let defaults = Self::default();

        Ok(Self {
            service_type: obj
                .get("service_type")
                .and_then(|v| v.as_str())
                .map(String::from)
                .unwrap_or(defaults.service_type),
            scan_ms: obj
                .get("scan_ms")
                .and_then(|v| v.as_u64())
                .unwrap_or(defaults.scan_ms),
            default_port: checked_int(obj, "default_port", "DiscoveryConfig")?
                .unwrap_or(defaults.default_port),
        })
    }
}

impl FromValue for PathConfig {
    fn from_value(value: &ConfigValue) -> prefer::Result<Self> {
        let obj = expect_object(value, "PathConfig")?;

        Ok(Self {
            data_dir: obj
                .get("data_dir")
                .and_then(|v| v.as_str())
                .map(PathBuf::from)
                .unwrap_or_else(Config::default_data_dir),
        })
    }
}

impl Config {
    /// Load config from a specific path (TOML format)
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let toml_value: toml::Value = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        let config_value = toml_to_config_value(toml_value);
        Config::from_value(&config_value)
            .map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))
    }

    /// Load the config if the file exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = self.to_toml_string();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory {}", parent.display())
            })?;
        }
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        Ok(())
    }

    fn to_toml_string(&self) -> String {
        let mut content = String::new();
        let quote = |s: &str| toml::Value::String(s.to_string()).to_string();

        content.push_str("[resolver]\n");
        content.push_str(&format!(
            "probe_timeout_ms = {}\n",
            self.resolver.probe_timeout_ms
        ));
        if let Some(deadline) = self.resolver.deadline_ms {
            content.push_str(&format!("deadline_ms = {}\n", deadline));
        }
        content.push_str(&format!(
            "health_path = {}\n",
            quote(&self.resolver.health_path)
        ));
        content.push_str(&format!(
            "probe_non_ipv4 = {}\n",
            self.resolver.probe_non_ipv4
        ));
        content.push_str(&format!(
            "ipv4_other_score = {}\n",
            self.resolver.ipv4_other_score
        ));
        content.push_str(&format!(
            "non_ipv4_score = {}\n",
            self.resolver.non_ipv4_score
        ));
        for tier in &self.resolver.tiers {
            content.push('\n');
            content.push_str("[[resolver.tiers]]\n");
            content.push_str(&format!("network = \"{}\"\n", tier.network));
            content.push_str(&format!("score = {}\n", tier.score));
            content.push_str(&format!("label = {}\n", quote(&tier.label)));
        }
        content.push('\n');

        content.push_str("[discovery]\n");
        content.push_str(&format!(
            "service_type = {}\n",
            quote(&self.discovery.service_type)
        ));
        content.push_str(&format!("scan_ms = {}\n", self.discovery.scan_ms));
        content.push_str(&format!(
            "default_port = {}\n",
            self.discovery.default_port
        ));
        content.push('\n');

        content.push_str("[paths]\n");
        content.push_str(&format!(
            "data_dir = {}\n",
            quote(&self.paths.data_dir.display().to_string())
        ));

        content
    }

    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("aaxion")
            .join("config.toml")
    }

    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("aaxion")
    }
}

/// Convert toml::Value to prefer::ConfigValue
fn toml_to_config_value(value: toml::Value) -> ConfigValue {
    match value {
        toml::Value::String(s) => ConfigValue::String(s),
        toml::Value::Integer(i) => ConfigValue::Integer(i),
        toml::Value::Float(f) => ConfigValue::Float(f),
        toml::Value::Boolean(b) => ConfigValue::Bool(b),
        toml::Value::Datetime(dt) => ConfigValue::String(dt.to_string()),
        toml::Value::Array(arr) => {
            ConfigValue::Array(arr.into_iter().map(toml_to_config_value).collect())
        }
        toml::Value::Table(table) => ConfigValue::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_config_value(v)))
                .collect(),
        ),
    }
}
