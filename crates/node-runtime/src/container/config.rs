//! # Node Configuration
//!
//! Unified configuration for every subsystem and the runtime.
//!
//! Sources, later wins:
//!
//! 1. Built-in defaults
//! 2. TOML file named by `PS_CONFIG`
//! 3. `PS_CHAIN`, `PS_LISTEN`, `PS_CONNECT` (comma separated), `PS_MAX_PEERS`
//!
//! Durations are whole seconds (`*_secs`) or milliseconds (`*_ms`) in the
//! file and converted to `Duration` for the subsystem configs.

use ps_02_peer_connection::PeerConfig;
use ps_03_block_oracle::OracleConfig;
use ps_04_mempool::MempoolConfig;
use ps_telemetry::TelemetryConfig;
use serde::Deserialize;
use shared_types::Chain;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Complete node configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub network: NetworkConfig,
    pub peer: PeerSettings,
    pub oracle: OracleSettings,
    pub mempool: MempoolSettings,
    pub telemetry: TelemetryConfig,
}

/// Configuration errors. The only errors that abort startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl NodeConfig {
    /// Defaults, then `PS_CONFIG`, then the environment. Validated.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("PS_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|var| std::env::var(var).ok())?;
        config.telemetry = config.telemetry.with_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Applies the `PS_*` overrides found through `lookup`.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup("PS_CHAIN") {
            self.network.chain = value.parse().map_err(|_| ConfigError::InvalidEnv {
                var: "PS_CHAIN",
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup("PS_LISTEN") {
            let listen = value.parse().map_err(|_| ConfigError::InvalidEnv {
                var: "PS_LISTEN",
                value: value.clone(),
            })?;
            self.network.listen = Some(listen);
        }
        if let Some(value) = lookup("PS_CONNECT") {
            self.network.connect = value
                .split(',')
                .map(str::trim)
                .filter(|addr| !addr.is_empty())
                .map(|addr| {
                    addr.parse().map_err(|_| ConfigError::InvalidEnv {
                        var: "PS_CONNECT",
                        value: addr.to_string(),
                    })
                })
                .collect::<Result<_, _>>()?;
        }
        if let Some(value) = lookup("PS_MAX_PEERS") {
            self.network.max_peers = value.parse().map_err(|_| ConfigError::InvalidEnv {
                var: "PS_MAX_PEERS",
                value: value.clone(),
            })?;
        }
        Ok(())
    }

    /// Rejects values the subsystems cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.network.max_peers == 0 {
            return invalid("network.max_peers must be at least 1");
        }
        if self.network.heartbeat_interval_ms == 0 || self.network.reconcile_interval_secs == 0 {
            return invalid("scheduler intervals must be positive");
        }
        if self.peer.ping_interval_secs == 0 || self.peer.dead_after_pings == 0 {
            return invalid("peer.ping_interval_secs and peer.dead_after_pings must be positive");
        }
        if self.peer.handshake_timeout_secs == 0 || self.peer.request_timeout_secs == 0 {
            return invalid("peer timeouts must be positive");
        }
        if self.oracle.cache_limit == 0 || self.oracle.max_batch == 0 {
            return invalid("oracle.cache_limit and oracle.max_batch must be positive");
        }
        if self.oracle.default_batch == 0 || self.oracle.default_batch > self.oracle.max_batch {
            return invalid("oracle.default_batch must be within 1..=max_batch");
        }
        if self.oracle.download_timeout_secs == 0 {
            return invalid("oracle.download_timeout_secs must be positive");
        }
        if self.mempool.tx_limit_secs == 0 {
            return invalid("mempool.tx_limit_secs must be positive");
        }
        if self.mempool.tx_limit_secs > self.mempool.txid_limit_secs {
            return invalid("mempool.tx_limit_secs must not exceed txid_limit_secs");
        }
        if self.mempool.max_ids == 0 || self.peer.max_announced == 0 {
            return invalid("mempool.max_ids and peer.max_announced must be positive");
        }
        Ok(())
    }
}

/// Network and scheduler configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub chain: Chain,
    /// Accept inbound connections here.
    pub listen: Option<SocketAddr>,
    /// Peers to dial at startup.
    pub connect: Vec<SocketAddr>,
    /// Live connections, inbound and outbound together.
    pub max_peers: usize,
    /// How long a banned address is refused.
    pub ban_duration_secs: u64,
    /// Oracle and mempool heartbeat period.
    pub heartbeat_interval_ms: u64,
    /// Mempool reconciliation period.
    pub reconcile_interval_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            chain: Chain::Bitcoin,
            listen: None,
            connect: Vec::new(),
            max_peers: 8,
            ban_duration_secs: 24 * 60 * 60,
            heartbeat_interval_ms: 1_000,
            reconcile_interval_secs: 30,
        }
    }
}

impl NetworkConfig {
    pub fn ban_duration(&self) -> Duration {
        Duration::from_secs(self.ban_duration_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }
}

/// Per-connection protocol settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PeerSettings {
    pub ping_interval_secs: u64,
    pub dead_after_pings: u32,
    pub handshake_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub unknown_command_tolerance: u32,
    /// Overrides the default `/peer-sync:<version>/`.
    pub user_agent: Option<String>,
    pub relay: bool,
    /// Transaction ids remembered per peer.
    pub max_announced: usize,
}

impl Default for PeerSettings {
    fn default() -> Self {
        Self {
            ping_interval_secs: 15,
            dead_after_pings: 3,
            handshake_timeout_secs: 10,
            request_timeout_secs: 10,
            unknown_command_tolerance: 10,
            user_agent: None,
            relay: true,
            max_announced: PeerConfig::default().max_announced,
        }
    }
}

impl PeerSettings {
    pub fn to_peer_config(&self) -> PeerConfig {
        let defaults = PeerConfig::default();
        PeerConfig {
            ping_interval: Duration::from_secs(self.ping_interval_secs),
            dead_after_pings: self.dead_after_pings,
            handshake_timeout: Duration::from_secs(self.handshake_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            unknown_command_tolerance: self.unknown_command_tolerance,
            user_agent: self.user_agent.clone().unwrap_or(defaults.user_agent.clone()),
            relay: self.relay,
            max_announced: self.max_announced,
            ..defaults
        }
    }
}

/// Block oracle settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OracleSettings {
    pub cache_limit: usize,
    pub download_timeout_secs: u64,
    pub max_retries: u32,
    pub max_batch: usize,
    pub default_batch: usize,
}

impl Default for OracleSettings {
    fn default() -> Self {
        let defaults = OracleConfig::default();
        Self {
            cache_limit: defaults.cache_limit,
            download_timeout_secs: defaults.download_timeout.as_secs(),
            max_retries: defaults.max_retries,
            max_batch: defaults.max_batch,
            default_batch: defaults.default_batch,
        }
    }
}

impl OracleSettings {
    pub fn to_oracle_config(&self) -> OracleConfig {
        OracleConfig {
            cache_limit: self.cache_limit,
            download_timeout: Duration::from_secs(self.download_timeout_secs),
            max_retries: self.max_retries,
            max_batch: self.max_batch,
            default_batch: self.default_batch,
            ..OracleConfig::default()
        }
    }
}

/// Mempool settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MempoolSettings {
    pub tx_limit_secs: u64,
    pub txid_limit_secs: u64,
    pub max_ids: usize,
}

impl Default for MempoolSettings {
    fn default() -> Self {
        Self {
            tx_limit_secs: 60 * 60,
            txid_limit_secs: 24 * 60 * 60,
            max_ids: MempoolConfig::default().max_ids,
        }
    }
}

impl MempoolSettings {
    pub fn to_mempool_config(&self) -> MempoolConfig {
        MempoolConfig {
            tx_limit: Duration::from_secs(self.tx_limit_secs),
            txid_limit: Duration::from_secs(self.txid_limit_secs),
            max_ids: self.max_ids,
            ..MempoolConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = NodeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.network.reconcile_interval(), Duration::from_secs(30));
        assert_eq!(config.network.ban_duration(), Duration::from_secs(86_400));

        let peer = config.peer.to_peer_config();
        assert_eq!(peer.ping_interval, Duration::from_secs(15));
        assert_eq!(peer.dead_after(), Duration::from_secs(45));

        let mempool = config.mempool.to_mempool_config();
        assert_eq!(mempool.tx_limit, Duration::from_secs(3_600));
        assert_eq!(mempool.txid_limit, Duration::from_secs(86_400));
        assert_eq!(mempool.max_ids, 300_000);
        assert_eq!(peer.max_announced, 50_000);
    }

    #[test]
    fn test_memory_caps_from_toml() {
        let config = NodeConfig::from_toml(
            r#"
            [peer]
            max_announced = 100

            [mempool]
            max_ids = 1000
            "#,
        )
        .unwrap();
        assert_eq!(config.peer.to_peer_config().max_announced, 100);
        assert_eq!(config.mempool.to_mempool_config().max_ids, 1000);

        let mut config = NodeConfig::default();
        config.mempool.max_ids = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = NodeConfig::from_toml(
            r#"
            [network]
            chain = "regtest"
            connect = ["127.0.0.1:18444"]

            [oracle]
            cache_limit = 8

            [telemetry]
            json_logs = true
            "#,
        )
        .unwrap();

        assert_eq!(config.network.chain, Chain::Regtest);
        assert_eq!(config.network.connect.len(), 1);
        assert_eq!(config.network.max_peers, 8);
        assert_eq!(config.oracle.cache_limit, 8);
        assert_eq!(config.oracle.max_batch, 16);
        assert!(config.telemetry.json_logs);
    }

    #[test]
    fn test_bad_toml_is_parse_error() {
        assert!(matches!(
            NodeConfig::from_toml("[network]\nmax_peers = \"many\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = NodeConfig::default();
        config
            .apply_overrides(lookup(&[
                ("PS_CHAIN", "testnet"),
                ("PS_LISTEN", "0.0.0.0:18333"),
                ("PS_CONNECT", "10.0.0.1:18333, 10.0.0.2:18333"),
                ("PS_MAX_PEERS", "3"),
            ]))
            .unwrap();

        assert_eq!(config.network.chain, Chain::Testnet3);
        assert_eq!(config.network.listen, "0.0.0.0:18333".parse().ok());
        assert_eq!(config.network.connect.len(), 2);
        assert_eq!(config.network.max_peers, 3);
    }

    #[test]
    fn test_bad_env_value() {
        let mut config = NodeConfig::default();
        let err = config
            .apply_overrides(lookup(&[("PS_CHAIN", "dogecoin")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { var: "PS_CHAIN", .. }));
    }

    #[test]
    fn test_validate_rejects_inverted_mempool_limits() {
        let mut config = NodeConfig::default();
        config.mempool.tx_limit_secs = 2 * 24 * 60 * 60;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = NodeConfig::default();
        config.network.max_peers = 0;
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.oracle.default_batch = config.oracle.max_batch + 1;
        assert!(config.validate().is_err());
    }
}
