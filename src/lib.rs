//! # packetlog - Shared Packet Journal over TCP
//!
//! packetlog is a small TCP daemon that keeps one shared, append-only journal.
//! Clients send newline-terminated packets; every completed packet is appended
//! to the journal file and the full journal is streamed back to the sender.
//!
//! ## Features
//!
//! - **Line Framing**: packets assembled across partial reads, no size cap
//! - **Shared Journal**: one append-only file visible to every client
//! - **Graceful Shutdown**: SIGINT/SIGTERM close sockets and remove the journal
//! - **Daemon Mode**: optional detach from the controlling terminal
//! - **System Logging**: tracing output to the console, syslog and journald
//!
//! ## Quick Start
//!
//! ### Server
//! ```no_run
//! use packetlog::config::ServerConfig;
//! use packetlog::server::LogServer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::from_file("config/server.toml")?;
//!     let server = LogServer::new(config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ### Client
//! ```no_run
//! use packetlog::client::PacketClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = PacketClient::connect("127.0.0.1:9000").await?;
//!     let journal = client.send_line("hello").await?;
//!     println!("{}", String::from_utf8_lossy(&journal));
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod daemon;
pub mod logging;
pub mod server;
pub mod types;

/// Common error types used throughout packetlog
pub mod error {
    use std::fmt;

    /// packetlog error types
    ///
    /// Every error that reaches the server loop is fatal: the loop stops, the
    /// cleanup path runs and the process exits with a failure status.
    #[derive(Debug)]
    pub enum PacketLogError {
        /// I/O operation failed
        Io(std::io::Error),
        /// Configuration error
        Config(String),
        /// Listener or accept-loop error
        Server(String),
        /// Journal file error
        Storage(String),
        /// Per-connection socket error
        Connection(String),
        /// Daemonization error
        Daemon(String),
    }

    impl fmt::Display for PacketLogError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                PacketLogError::Io(e) => write!(f, "I/O error: {}", e),
                PacketLogError::Config(e) => write!(f, "Configuration error: {}", e),
                PacketLogError::Server(e) => write!(f, "Server error: {}", e),
                PacketLogError::Storage(e) => write!(f, "Storage error: {}", e),
                PacketLogError::Connection(e) => write!(f, "Connection error: {}", e),
                PacketLogError::Daemon(e) => write!(f, "Daemon error: {}", e),
            }
        }
    }

    impl std::error::Error for PacketLogError {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            match self {
                PacketLogError::Io(e) => Some(e),
                _ => None,
            }
        }
    }

    impl From<std::io::Error> for PacketLogError {
        fn from(err: std::io::Error) -> Self {
            PacketLogError::Io(err)
        }
    }

    /// Result type alias for packetlog operations
    pub type Result<T> = std::result::Result<T, PacketLogError>;
}

pub use error::{PacketLogError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::client::PacketClient;
    pub use crate::config::{ClientConfig, ConnectionMode, ServerConfig};
    pub use crate::server::{LogServer, LogStore, PacketAssembler, ShutdownController};
    pub use crate::types::{FrameResult, Packet};
    pub use crate::{PacketLogError, Result};
}
