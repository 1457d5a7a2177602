//! packetlog server implementation

pub mod assembler;
pub mod shutdown;
pub mod storage;
pub mod tcp_socket;

use crate::config::ServerConfig;
use crate::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

pub use assembler::PacketAssembler;
pub use shutdown::{ShutdownController, ShutdownListener};
pub use storage::LogStore;
pub use tcp_socket::TcpSocketServer;

/// Main packetlog server: owns the listener, the journal and the shutdown
/// flag, and runs the single cleanup path.
pub struct LogServer {
    config: ServerConfig,
    storage: Arc<LogStore>,
    shutdown: ShutdownController,
    tcp_server: TcpSocketServer,
}

impl LogServer {
    /// Create a server and bind its listening socket
    pub async fn new(config: ServerConfig) -> Result<Self> {
        Self::with_shutdown(config, ShutdownController::new()).await
    }

    /// Create a server that stops when `shutdown` is requested
    pub async fn with_shutdown(config: ServerConfig, shutdown: ShutdownController) -> Result<Self> {
        config.validate()?;

        let storage = Arc::new(LogStore::new(&config));
        let tcp_server =
            TcpSocketServer::bind(&config, Arc::clone(&storage), shutdown.clone()).await?;

        Ok(Self {
            config,
            storage,
            shutdown,
            tcp_server,
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.tcp_server.local_addr()
    }

    /// Handle for requesting shutdown, e.g. from a signal listener
    pub fn shutdown_handle(&self) -> ShutdownController {
        self.shutdown.clone()
    }

    /// Journal backing this server
    pub fn storage(&self) -> Arc<LogStore> {
        Arc::clone(&self.storage)
    }

    /// Serve until shutdown is requested or a fatal error occurs, then
    /// clean up. Cleanup runs on both paths; the error, if any, is returned
    /// after it.
    pub async fn run(self) -> Result<()> {
        let Self {
            config,
            storage,
            tcp_server,
            ..
        } = self;

        if let Ok(addr) = tcp_server.local_addr() {
            let existing = match storage.len().await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(error = %e, "Failed to stat journal");
                    0
                }
            };
            info!(
                address = %addr,
                mode = ?config.server.connection_mode,
                data_file = %storage.path().display(),
                journal_bytes = existing,
                "Server listening"
            );
        }

        let result = tcp_server.start().await;
        match &result {
            Ok(()) => info!("Shutdown requested, exiting"),
            Err(e) => error!(error = %e, "Fatal error, shutting down"),
        }

        Self::cleanup(&config, &storage).await;
        result
    }

    async fn cleanup(config: &ServerConfig, storage: &LogStore) {
        if config.storage.remove_on_shutdown {
            if let Err(e) = storage.remove().await {
                warn!(error = %e, "Failed to remove journal");
            }
        }
        info!("Server shutting down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_config(data_file: std::path::PathBuf) -> ServerConfig {
        let mut config = ServerConfig::default();
        config.server.bind_address = "127.0.0.1".to_string();
        config.server.port = 0;
        config.storage.data_file = data_file;
        config
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_config() {
        let mut config = test_config(std::path::PathBuf::from("/tmp/unused"));
        config.server.backlog = 0;
        assert!(LogServer::new(config).await.is_err());
    }

    #[tokio::test]
    async fn test_run_keeps_journal_when_configured() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("journal");
        let mut config = test_config(path.clone());
        config.storage.remove_on_shutdown = false;

        let server = LogServer::new(config).await.unwrap();
        server.storage().append(b"kept\n").await.unwrap();
        server.shutdown_handle().request();

        server.run().await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"kept\n");
    }

    #[tokio::test]
    async fn test_run_removes_journal() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("journal");

        let server = LogServer::new(test_config(path.clone())).await.unwrap();
        server.storage().append(b"gone\n").await.unwrap();
        server.shutdown_handle().request();

        server.run().await.unwrap();
        assert!(!path.exists());
    }
}
