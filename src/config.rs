//! Configuration management for the Stellar bridge
//!
//! Loads configuration from TOML files with environment variable substitution.

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

lazy_static! {
    static ref ENV_VAR: Regex = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub service: ServiceConfig,
    pub api: ApiConfig,
    pub metrics: MetricsConfig,
    pub stellar: StellarConfig,
    pub bridge: BridgeConfig,
    pub evm: EvmConfig,
    pub freighter: FreighterConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub signer: SignerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub instance_id: String,
    /// Wallet snapshot polling interval while a wallet is connected
    pub poll_interval_secs: u64,
    /// Finished swap attempts older than this are dropped from memory
    pub attempt_retention_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    /// Origin of the bridge UI, allowed through CORS
    pub allowed_origin: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StellarConfig {
    pub network: StellarNetwork,
    /// Overrides the network's public Horizon instance
    pub horizon_url: Option<String>,
    pub base_fee: u32,
    /// Validity window of an unsigned payment
    pub tx_timeout_secs: u64,
}

impl StellarConfig {
    pub fn horizon_url(&self) -> &str {
        self.horizon_url
            .as_deref()
            .unwrap_or_else(|| self.network.default_horizon_url())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// Account receiving bridge payments. There is no default: the settlement
    /// destination belongs to whoever operates the bridge.
    pub receiving_address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EvmConfig {
    pub rpc_url: String,
    /// How often the provider is polled for account/chain changes
    pub event_poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FreighterConfig {
    /// Endpoint of the extension bridge running in the user's browser
    pub endpoint: String,
    /// Signing waits on the user, so this is generous
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    pub success_rate: f64,
    pub latency_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            success_rate: 0.8,
            latency_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignerConfig {
    #[serde(default)]
    pub mode: SignerMode,
    /// Environment variable holding an `S...` secret seed (local mode only)
    pub secret_key_env: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SignerMode {
    #[default]
    Freighter,
    Local,
}

/// Stellar networks the bridge can build payments for
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StellarNetwork {
    Testnet,
    Public,
    Futurenet,
}

impl StellarNetwork {
    pub const ALL: [StellarNetwork; 3] = [
        StellarNetwork::Testnet,
        StellarNetwork::Public,
        StellarNetwork::Futurenet,
    ];

    /// Network passphrase hashed into every signature payload
    pub fn passphrase(&self) -> &'static str {
        match self {
            StellarNetwork::Testnet => "Test SDF Network ; September 2015",
            StellarNetwork::Public => "Public Global Stellar Network ; September 2015",
            StellarNetwork::Futurenet => "Test SDF Future Network ; October 2022",
        }
    }

    /// Network name as reported by Freighter
    pub fn name(&self) -> &'static str {
        match self {
            StellarNetwork::Testnet => "TESTNET",
            StellarNetwork::Public => "PUBLIC",
            StellarNetwork::Futurenet => "FUTURENET",
        }
    }

    pub fn default_horizon_url(&self) -> &'static str {
        match self {
            StellarNetwork::Testnet => "https://horizon-testnet.stellar.org",
            StellarNetwork::Public => "https://horizon.stellar.org",
            StellarNetwork::Futurenet => "https://horizon-futurenet.stellar.org",
        }
    }

    /// Parse a Freighter network name
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_uppercase().as_str() {
            "TESTNET" => Some(StellarNetwork::Testnet),
            "PUBLIC" | "MAINNET" => Some(StellarNetwork::Public),
            "FUTURENET" => Some(StellarNetwork::Futurenet),
            _ => None,
        }
    }
}

impl Settings {
    /// Load settings from the file named by `STELLAR_BRIDGE_CONFIG`
    pub fn load() -> Result<Self> {
        let config_path = env::var("STELLAR_BRIDGE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from a specific file
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::parse(&config_str)
    }

    fn parse(raw: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(raw);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if stellar_strkey::ed25519::PublicKey::from_string(&self.bridge.receiving_address)
            .is_err()
        {
            anyhow::bail!(
                "bridge.receiving_address {:?} is not a Stellar account address",
                self.bridge.receiving_address
            );
        }

        if !(0.0..=1.0).contains(&self.simulation.success_rate) {
            anyhow::bail!("simulation.success_rate must be between 0 and 1");
        }

        if self.service.poll_interval_secs == 0 {
            anyhow::bail!("service.poll_interval_secs must be positive");
        }

        if self.stellar.tx_timeout_secs == 0 {
            anyhow::bail!("stellar.tx_timeout_secs must be positive");
        }

        if self.evm.event_poll_interval_ms == 0 {
            anyhow::bail!("evm.event_poll_interval_ms must be positive");
        }

        if self.metrics.enabled && self.metrics.port == self.api.port {
            anyhow::bail!("metrics.port must differ from api.port");
        }

        if self.signer.mode == SignerMode::Local && self.signer.secret_key_env.is_none() {
            anyhow::bail!("signer.secret_key_env is required in local signer mode");
        }

        if self.stellar.network == StellarNetwork::Public {
            tracing::warn!("Bridge configured for the public Stellar network");
        }

        Ok(())
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();

    for cap in ENV_VAR.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}
