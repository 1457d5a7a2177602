//! Configuration structures for packetlog

use crate::{PacketLogError, Result};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::{Path, PathBuf};

/// Prefix of environment variables that override file settings,
/// e.g. `PACKETLOG__SERVER__PORT=9100`
pub const ENV_PREFIX: &str = "PACKETLOG";

/// Server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener settings
    pub server: ServerSettings,
    /// Journal settings
    pub storage: StorageSettings,
    /// Diagnostic logging settings
    pub logging: LoggingSettings,
}

/// How accepted connections are scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMode {
    /// Handle one connection to completion before accepting the next
    Serial,
    /// One task per connection; journal access stays serialized
    Concurrent,
}

/// Core server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// IPv4 address to bind to
    pub bind_address: String,
    /// TCP port; 0 picks an ephemeral port
    pub port: u16,
    /// Listen backlog
    pub backlog: u32,
    /// Bytes requested per socket read
    pub read_buffer_size: usize,
    /// Connection scheduling
    pub connection_mode: ConnectionMode,
}

/// Journal configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Journal file path
    pub data_file: PathBuf,
    /// Delete the journal during shutdown
    pub remove_on_shutdown: bool,
}

/// Output format of console logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line human readable
    Pretty,
    /// Single-line human readable
    Compact,
    /// Newline-delimited JSON
    Json,
}

/// Diagnostic logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    /// Console output format
    pub format: LogFormat,
    /// Syslog sink
    pub syslog: SyslogSettings,
    /// Send events to the systemd journal (requires the `journald` feature)
    pub journald: bool,
}

/// Syslog sink settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyslogSettings {
    /// Enable the syslog sink (requires the `syslog-backend` feature)
    pub enabled: bool,
    /// Process name reported to syslog
    pub identifier: String,
    /// Syslog facility name, e.g. `user`, `daemon`, `local0`
    pub facility: String,
}

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server address, `host:port`
    pub address: String,
    /// Connection timeout in seconds
    pub timeout_seconds: u64,
    /// Quiet period after a `\n`-terminated chunk that ends a reply
    pub settle_millis: u64,
    /// Bytes requested per socket read
    pub buffer_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 9000,
            backlog: 5,
            read_buffer_size: 1024,
            connection_mode: ConnectionMode::Concurrent,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from("/var/tmp/aesdsocketdata"),
            remove_on_shutdown: true,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
            syslog: SyslogSettings::default(),
            journald: false,
        }
    }
}

impl Default for SyslogSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            identifier: "packetlog".to_string(),
            facility: "user".to_string(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:9000".to_string(),
            timeout_seconds: 5,
            settle_millis: 200,
            buffer_size: 4096,
        }
    }
}

impl ServerSettings {
    /// Socket address to bind
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: Ipv4Addr = self.bind_address.parse().map_err(|e| {
            PacketLogError::Config(format!(
                "Invalid bind address '{}': {}",
                self.bind_address, e
            ))
        })?;
        Ok(SocketAddr::V4(SocketAddrV4::new(ip, self.port)))
    }
}

impl ServerConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PacketLogError::Config(format!("Failed to read config file: {}", e)))?;

        let config: ServerConfig = toml::from_str(&content)
            .map_err(|e| PacketLogError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Layer defaults, an optional TOML file and `PACKETLOG__*` environment
    /// variables, in that order of precedence.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                ::config::File::from(path)
                    .format(::config::FileFormat::Toml)
                    .required(false),
            );
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: ServerConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| PacketLogError::Config(format!("Failed to load config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.server.socket_addr()?;
        if self.server.backlog == 0 {
            return Err(PacketLogError::Config("Backlog must be at least 1".to_string()));
        }
        if self.server.read_buffer_size == 0 {
            return Err(PacketLogError::Config(
                "Read buffer size must be at least 1".to_string(),
            ));
        }
        if self.storage.data_file.as_os_str().is_empty() {
            return Err(PacketLogError::Config("Data file path cannot be empty".to_string()));
        }
        if self.logging.syslog.enabled && self.logging.syslog.identifier.is_empty() {
            return Err(PacketLogError::Config(
                "Syslog identifier cannot be empty".to_string(),
            ));
        }
        if self.logging.syslog.enabled {
            self.logging.syslog.validate_facility()?;
        }
        Ok(())
    }
}

impl SyslogSettings {
    #[cfg(feature = "syslog-backend")]
    fn validate_facility(&self) -> Result<()> {
        use std::str::FromStr;
        syslog::Facility::from_str(&self.facility)
            .map(|_| ())
            .map_err(|_| PacketLogError::Config(format!("Unknown syslog facility '{}'", self.facility)))
    }

    #[cfg(not(feature = "syslog-backend"))]
    fn validate_facility(&self) -> Result<()> {
        Ok(())
    }
}

impl ClientConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.address.is_empty() {
            return Err(PacketLogError::Config("Server address cannot be empty".to_string()));
        }
        if self.buffer_size == 0 {
            return Err(PacketLogError::Config("Buffer size must be at least 1".to_string()));
        }
        Ok(())
    }
}
