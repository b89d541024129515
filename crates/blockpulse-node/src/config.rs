//! Node configuration.
//!
//! Settings are layered: built-in defaults, then an optional YAML file, then
//! `BLOCKPULSE__*` environment variables (`__` separates nesting levels, e.g.
//! `BLOCKPULSE__HUB__CLIENT_QUEUE_SIZE=32`), then command-line overrides
//! applied by the binary.

use blockpulse_realtime::{HubConfig, SessionConfig};
use blockpulse_types::ChainParams;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Prefix of environment variable overrides.
pub const ENV_PREFIX: &str = "BLOCKPULSE";

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A source could not be read or deserialized.
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    /// A setting is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for the blockpulse node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// HTTP and websocket listen address.
    pub api_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Emit JSON logs.
    pub log_json: bool,
    /// Chain node RPC.
    pub rpc: RpcConfig,
    /// Websocket hub tunables.
    pub hub: HubSettings,
    /// Parameters of the served network.
    pub chain: ChainParams,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            api_addr: SocketAddr::from(([127, 0, 0, 1], 7777)),
            log_level: "info".to_string(),
            log_json: false,
            rpc: RpcConfig::default(),
            hub: HubSettings::default(),
            chain: ChainParams::default(),
        }
    }
}

impl NodeConfig {
    /// Load defaults, the optional file at `path` and environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Yaml)
                    .required(false),
            );
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Check ranges that would make the hub misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.hub.validate()?;
        if self.chain.target_time_per_block_secs == 0 {
            return Err(ConfigError::Invalid(
                "chain.target_time_per_block_secs must be positive".into(),
            ));
        }
        if self.rpc.timeout_secs == 0 {
            return Err(ConfigError::Invalid("rpc.timeout_secs must be positive".into()));
        }
        Ok(())
    }
}

/// Chain node JSON-RPC settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// RPC endpoint. Empty disables transaction decoding and broadcasting.
    pub url: String,
    /// Basic auth user.
    pub user: Option<String>,
    /// Basic auth password.
    pub password: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            user: None,
            password: None,
            timeout_secs: 30,
        }
    }
}

/// Hub and connection tunables as they appear in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubSettings {
    /// Per-client delivery channel capacity.
    pub client_queue_size: usize,
    /// Buffered transactions that trigger a flush.
    pub tx_buffer_size: usize,
    /// Periodic flush interval in milliseconds.
    pub flush_interval_ms: u64,
    /// Heartbeat interval in seconds.
    pub ping_interval_secs: u64,
    /// Producer wait in seconds.
    pub publish_timeout_secs: u64,
    /// Relay channel capacity.
    pub relay_capacity: usize,
    /// Longest accepted request message in bytes.
    pub max_request_bytes: usize,
    /// Rolling read deadline in seconds.
    pub read_timeout_secs: u64,
    /// Write deadline in seconds.
    pub write_timeout_secs: u64,
}

impl Default for HubSettings {
    fn default() -> Self {
        let hub = HubConfig::default();
        let session = SessionConfig::default();
        Self {
            client_queue_size: hub.client_queue_size,
            tx_buffer_size: hub.tx_buffer_size,
            flush_interval_ms: hub.flush_interval.as_millis() as u64,
            ping_interval_secs: hub.ping_interval.as_secs(),
            publish_timeout_secs: hub.publish_timeout.as_secs(),
            relay_capacity: hub.relay_capacity,
            max_request_bytes: session.max_request_bytes,
            read_timeout_secs: session.read_timeout.as_secs(),
            write_timeout_secs: session.write_timeout.as_secs(),
        }
    }
}

impl HubSettings {
    /// Reject zero sizes and intervals.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("hub.client_queue_size", self.client_queue_size as u64),
            ("hub.tx_buffer_size", self.tx_buffer_size as u64),
            ("hub.flush_interval_ms", self.flush_interval_ms),
            ("hub.ping_interval_secs", self.ping_interval_secs),
            ("hub.publish_timeout_secs", self.publish_timeout_secs),
            ("hub.relay_capacity", self.relay_capacity as u64),
            ("hub.max_request_bytes", self.max_request_bytes as u64),
            ("hub.read_timeout_secs", self.read_timeout_secs),
            ("hub.write_timeout_secs", self.write_timeout_secs),
        ];
        match checks.iter().find(|(_, value)| *value == 0) {
            Some((name, _)) => Err(ConfigError::Invalid(format!("{name} must be positive"))),
            None => Ok(()),
        }
    }

    /// Hub loop configuration.
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            client_queue_size: self.client_queue_size,
            tx_buffer_size: self.tx_buffer_size,
            flush_interval: Duration::from_millis(self.flush_interval_ms),
            ping_interval: Duration::from_secs(self.ping_interval_secs),
            publish_timeout: Duration::from_secs(self.publish_timeout_secs),
            relay_capacity: self.relay_capacity,
        }
    }

    /// Per-connection configuration.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            max_request_bytes: self.max_request_bytes,
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            write_timeout: Duration::from_secs(self.write_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_hub() {
        let config = NodeConfig::default();
        config.validate().unwrap();

        let hub = config.hub.hub_config();
        assert_eq!(hub.client_queue_size, 16);
        assert_eq!(hub.tx_buffer_size, 5);
        assert_eq!(hub.flush_interval, Duration::from_secs(3));
        assert_eq!(hub.ping_interval, Duration::from_secs(45));
        assert_eq!(hub.publish_timeout, Duration::from_secs(10));

        let session = config.hub.session_config();
        assert_eq!(session.max_request_bytes, 1 << 20);
        assert_eq!(session.read_timeout, Duration::from_secs(20));
        assert_eq!(session.write_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_zero_values_rejected() {
        let mut config = NodeConfig::default();
        config.hub.client_queue_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("hub.client_queue_size"));

        let mut config = NodeConfig::default();
        config.hub.flush_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.chain.target_time_per_block_secs = 0;
        assert!(config.validate().is_err());
    }

    // Environment is process-wide, so every `load` assertion lives here.
    #[test]
    fn test_load_layers() {
        let missing = NodeConfig::load(Some(Path::new("/nonexistent/blockpulse.yaml"))).unwrap();
        assert_eq!(missing.api_addr, NodeConfig::default().api_addr);

        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "api_addr: \"0.0.0.0:9100\"\nlog_json: true\nhub:\n  client_queue_size: 64\nchain:\n  name: simnet\n  target_time_per_block_secs: 1"
        )
        .unwrap();

        let loaded = NodeConfig::load(Some(file.path())).unwrap();
        assert_eq!(loaded.api_addr.port(), 9100);
        assert!(loaded.log_json);
        assert_eq!(loaded.hub.client_queue_size, 64);
        assert_eq!(loaded.hub.tx_buffer_size, 5);
        assert_eq!(loaded.chain.name, "simnet");

        std::env::set_var("BLOCKPULSE__HUB__TX_BUFFER_SIZE", "9");
        let overridden = NodeConfig::load(Some(file.path()));
        std::env::remove_var("BLOCKPULSE__HUB__TX_BUFFER_SIZE");

        let overridden = overridden.unwrap();
        assert_eq!(overridden.hub.tx_buffer_size, 9);
        assert_eq!(overridden.hub.client_queue_size, 64);
    }
}
