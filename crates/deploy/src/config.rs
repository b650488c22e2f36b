//! Project configuration: compiler settings, paths and target networks.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::{DeployError, NetworkDescriptor};

/// The default name for the kiln configuration file.
pub const KILNCONF_FILENAME: &str = "Kiln.toml";

/// Prefix of environment variables overriding configuration values.
pub const ENV_PREFIX: &str = "KILN_";

/// The default network name.
pub const DEFAULT_NETWORK: &str = "localhost";

/// Solidity compiler settings the artifacts are expected to be built with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolidityConfig {
    /// Compiler version.
    pub version: String,
    /// Optimizer settings.
    pub optimizer: OptimizerConfig,
}

impl Default for SolidityConfig {
    fn default() -> Self {
        Self {
            version: "0.8.19".to_string(),
            optimizer: OptimizerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    pub enabled: bool,
    pub runs: u32,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            runs: 200,
        }
    }
}

/// Project paths, relative to the working directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding compiled artifacts.
    pub artifacts: PathBuf,
    /// Directory deployment records are written to.
    pub deployments: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            artifacts: PathBuf::from("artifacts"),
            deployments: PathBuf::from("deployments"),
        }
    }
}

/// Timing of the deployment workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploySettings {
    /// Bound on submission plus confirmation, in seconds.
    pub confirmation_timeout_secs: u64,
    /// Interval between receipt polls, in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            confirmation_timeout_secs: 300,
            poll_interval_ms: 2_000,
        }
    }
}

impl DeploySettings {
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// A network entry as written in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// JSON-RPC endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Private keys or mnemonics. The first one deploys.
    pub accounts: Vec<String>,
    /// Fixed gas price in wei.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<u64>,
    /// Fixed gas limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<u64>,
    /// Expected chain id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    /// Blocks to wait for, including the inclusion block.
    pub confirmations: u64,
    /// Whether to record successful deployments under the deployments directory.
    pub save_deployments: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            url: None,
            accounts: Vec::new(),
            gas_price: None,
            gas_limit: None,
            chain_id: None,
            confirmations: 1,
            save_deployments: false,
        }
    }
}

/// Top-level configuration, loaded once at startup and passed explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KilnConfig {
    pub solidity: SolidityConfig,
    pub paths: PathsConfig,
    pub deploy: DeploySettings,
    pub networks: BTreeMap<String, NetworkConfig>,
}

impl Default for KilnConfig {
    fn default() -> Self {
        let localhost = NetworkConfig {
            url: Some("http://127.0.0.1:8545".to_string()),
            chain_id: Some(31337),
            ..NetworkConfig::default()
        };

        Self {
            solidity: SolidityConfig::default(),
            paths: PathsConfig::default(),
            deploy: DeploySettings::default(),
            networks: BTreeMap::from([(DEFAULT_NETWORK.to_string(), localhost)]),
        }
    }
}

impl KilnConfig {
    /// Layer defaults, the TOML file (if present) and `KILN_*` environment variables.
    ///
    /// Nested keys use `__` in variable names, e.g.
    /// `KILN_NETWORKS__BASE_GOERLI__ACCOUNTS='["0x..."]'`.
    pub fn load(path: &Path) -> Result<Self> {
        let config_path = Self::resolve_path(path);

        if !config_path.exists() {
            tracing::debug!(path = %config_path.display(), "No configuration file, using defaults");
        }

        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;

        tracing::debug!(
            path = %config_path.display(),
            networks = config.networks.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// A directory resolves to the config file inside it.
    pub fn resolve_path(path: &Path) -> PathBuf {
        if path.is_dir() {
            path.join(KILNCONF_FILENAME)
        } else {
            path.to_path_buf()
        }
    }

    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize kiln config to TOML")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Resolve a named network into a descriptor.
    pub fn network(&self, name: &str) -> Result<NetworkDescriptor, DeployError> {
        let config = self.networks.get(name).ok_or_else(|| {
            let known: Vec<&str> = self.networks.keys().map(String::as_str).collect();
            DeployError::invalid_network(
                name,
                format!("not configured (known networks: {})", known.join(", ")),
            )
        })?;

        NetworkDescriptor::from_config(name, config)
    }
}
