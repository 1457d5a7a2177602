//! Configuration management for packetlog

pub mod settings;

pub use settings::{
    ClientConfig, ConnectionMode, LogFormat, LoggingSettings, ServerConfig, ServerSettings,
    StorageSettings, SyslogSettings, ENV_PREFIX,
};
