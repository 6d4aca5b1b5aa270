//! # Configuration Management
//!
//! Centralized configuration for the packet client.
//!
//! This module provides structured configuration for the client connection,
//! including the remote endpoint, header defaults, keepalive and timeout
//! settings, the TLS trust policy, and logging.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment-specific overrides via `from_env()`
//!
//! ## Wire Constants
//! The header layout is fixed at 10 bytes and the payload length field
//! carries 24 significant bits, so no payload may exceed `MAX_PAYLOAD_SIZE`.

use crate::error::{ProtocolError, Result};
use crate::transport::tls::TlsClientConfig;
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Protocol version written into every outgoing header
pub const PROTOCOL_VERSION: u8 = 10;

/// Command group written into every outgoing header
pub const DEFAULT_COMMAND: u16 = 0;

/// Reserved opcode of the keepalive request
pub const PING_OPCODE: u16 = 1;

/// Size of the fixed frame header
pub const HEADER_SIZE: usize = 10;

/// Largest payload the 24-bit length field can describe
pub const MAX_PAYLOAD_SIZE: usize = 0x00FF_FFFF;

/// Mask applied to the 4-byte length field
pub const PAYLOAD_LENGTH_MASK: u32 = 0x00FF_FFFF;

/// Output bound for block decompression of inbound payloads
pub const MAX_DECOMPRESSED_SIZE: usize = 99_999;

/// Default TLS port of the remote service
pub const DEFAULT_PORT: u16 = 443;

/// Environment variable prefix used by `from_env()`
const ENV_PREFIX: &str = "TLS_PACKET_CLIENT";

/// Top-level configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct NetworkConfig {
    /// Client connection configuration
    #[serde(default)]
    pub client: ClientConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NetworkConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables on top of the defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(host) = std::env::var(format!("{ENV_PREFIX}_HOST")) {
            config.client.host = host;
        }

        if let Ok(port) = std::env::var(format!("{ENV_PREFIX}_PORT")) {
            config.client.port = port
                .parse::<u16>()
                .map_err(|e| ProtocolError::ConfigError(format!("Invalid port '{port}': {e}")))?;
        }

        if let Ok(interval) = std::env::var(format!("{ENV_PREFIX}_PING_INTERVAL_MS")) {
            if let Ok(val) = interval.parse::<u64>() {
                config.client.ping_interval = Duration::from_millis(val);
            }
        }

        if let Ok(timeout) = std::env::var(format!("{ENV_PREFIX}_CONNECT_TIMEOUT_MS")) {
            if let Ok(val) = timeout.parse::<u64>() {
                config.client.connect_timeout = Duration::from_millis(val);
            }
        }

        if let Ok(insecure) = std::env::var(format!("{ENV_PREFIX}_INSECURE")) {
            config.client.tls.insecure = matches!(insecure.as_str(), "1" | "true" | "yes");
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.client.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Client connection configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Remote host name; also used as the TLS server name unless overridden
    pub host: String,

    /// Remote TCP port
    pub port: u16,

    /// Protocol version byte written into outgoing headers
    pub protocol_version: u8,

    /// Command group written into outgoing headers
    pub command: u16,

    /// Opcode used by the keepalive request
    pub ping_opcode: u16,

    /// Interval between keepalive pings
    #[serde(with = "duration_serde")]
    pub ping_interval: Duration,

    /// Timeout for the TCP connect and TLS handshake
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Optional deadline for each request's response; `None` waits until close
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "opt_duration_serde"
    )]
    pub request_timeout: Option<Duration>,

    /// Pause after a frame fails to decode before reading the next one
    #[serde(with = "duration_serde")]
    pub recv_error_backoff: Duration,

    /// Upper bound on the orderly TLS shutdown during close
    #[serde(with = "duration_serde")]
    pub shutdown_timeout: Duration,

    /// TLS trust policy
    #[serde(default)]
    pub tls: TlsOptions,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: String::from("localhost"),
            port: DEFAULT_PORT,
            protocol_version: PROTOCOL_VERSION,
            command: DEFAULT_COMMAND,
            ping_opcode: PING_OPCODE,
            ping_interval: timeout::KEEPALIVE_INTERVAL,
            connect_timeout: timeout::DEFAULT_TIMEOUT,
            request_timeout: None,
            recv_error_backoff: timeout::RECV_ERROR_BACKOFF,
            shutdown_timeout: timeout::SHUTDOWN_TIMEOUT,
            tls: TlsOptions::default(),
        }
    }
}

impl ClientConfig {
    /// Configuration for `host:port` with every other setting at its default
    pub fn new<S: Into<String>>(host: S, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Override the keepalive interval
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Set a deadline for every request's response
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Replace the TLS trust policy
    pub fn with_tls(mut self, tls: TlsOptions) -> Self {
        self.tls = tls;
        self
    }

    /// The `host:port` pair used for the TCP connect
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Build the TLS client configuration for this endpoint
    pub fn tls_client_config(&self) -> Result<TlsClientConfig> {
        let server_name = self
            .tls
            .server_name
            .clone()
            .unwrap_or_else(|| self.host.clone());
        let mut config = TlsClientConfig::new(server_name);

        if let Some(ca) = &self.tls.ca_cert_path {
            config = config.with_ca_cert(ca.clone());
        }
        if let Some(pin) = &self.tls.pinned_cert_sha256 {
            let hash = hex::decode(pin).map_err(|e| {
                ProtocolError::ConfigError(format!("Invalid pinned certificate hash: {e}"))
            })?;
            config = config.with_pinned_cert_hash(hash);
        }
        if self.tls.insecure {
            config = config.insecure();
        }
        Ok(config)
    }

    /// Validate client configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.host.is_empty() {
            errors.push("Client host cannot be empty".to_string());
        }

        if self.port == 0 {
            errors.push("Client port cannot be 0".to_string());
        }

        // Zero disables keepalive pings
        if !self.ping_interval.is_zero() && self.ping_interval.as_millis() < 100 {
            errors.push("Ping interval too short (minimum: 100ms)".to_string());
        } else if self.ping_interval.as_secs() > 3600 {
            errors.push("Ping interval too long (maximum: 1 hour)".to_string());
        }

        if self.connect_timeout.as_millis() < 100 {
            errors.push("Connection timeout too short (minimum: 100ms)".to_string());
        }

        if let Some(timeout) = self.request_timeout {
            if timeout.as_millis() < 10 {
                errors.push("Request timeout too short (minimum: 10ms)".to_string());
            }
        }

        if self.recv_error_backoff.as_secs() > 60 {
            errors.push("Receive error backoff too long (maximum: 60s)".to_string());
        }

        if let Some(pin) = &self.tls.pinned_cert_sha256 {
            match hex::decode(pin) {
                Ok(bytes) if bytes.len() == 32 => {}
                Ok(bytes) => errors.push(format!(
                    "Pinned certificate hash has {} bytes (expected 32 for SHA-256)",
                    bytes.len()
                )),
                Err(_) => errors.push("Pinned certificate hash is not valid hex".to_string()),
            }
        }

        errors
    }
}

/// TLS trust policy for the client connection
///
/// The default validates the server against the system trust store.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct TlsOptions {
    /// Server name for SNI and certificate validation (defaults to `host`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,

    /// Skip CA validation; only sensible together with `pinned_cert_sha256`
    #[serde(default)]
    pub insecure: bool,

    /// PEM file with additional trusted root certificates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert_path: Option<String>,

    /// Hex-encoded SHA-256 fingerprint of the expected server certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned_cert_sha256: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level used when `RUST_LOG` is not set
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("tls-packet-client"),
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Optional Duration as milliseconds; a missing key means `None`
mod opt_duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration
            .map(|d| d.as_millis() as u64)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
