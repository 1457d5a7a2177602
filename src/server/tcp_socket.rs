//! TCP socket server implementation for packetlog

use crate::config::{ConnectionMode, ServerConfig};
use crate::server::{LogStore, PacketAssembler, ShutdownController, ShutdownListener};
use crate::types::{FrameResult, Packet};
use crate::{PacketLogError, Result};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, info_span, warn, Instrument};

/// How long connection tasks get to notice a graceful shutdown before they
/// are aborted
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// TCP server accepting packet connections
pub struct TcpSocketServer {
    config: ServerConfig,
    listener: TcpListener,
    storage: Arc<LogStore>,
    shutdown: ShutdownController,
}

impl TcpSocketServer {
    /// Bind the listening socket
    pub async fn bind(
        config: &ServerConfig,
        storage: Arc<LogStore>,
        shutdown: ShutdownController,
    ) -> Result<Self> {
        let addr = config.server.socket_addr()?;

        let socket = TcpSocket::new_v4()
            .map_err(|e| PacketLogError::Server(format!("Failed to create socket: {}", e)))?;
        socket
            .set_reuseaddr(true)
            .map_err(|e| PacketLogError::Server(format!("Failed to set SO_REUSEADDR: {}", e)))?;
        socket
            .bind(addr)
            .map_err(|e| PacketLogError::Server(format!("Failed to bind socket to {}: {}", addr, e)))?;
        let listener = socket
            .listen(config.server.backlog)
            .map_err(|e| PacketLogError::Server(format!("Failed to listen on {}: {}", addr, e)))?;

        Ok(Self {
            config: config.clone(),
            listener,
            storage,
            shutdown,
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until shutdown is requested or a fatal error
    /// occurs. The listener and every connection are closed on return.
    pub async fn start(self) -> Result<()> {
        let Self {
            config,
            listener,
            storage,
            shutdown,
        } = self;

        let mut stop = shutdown.subscribe();
        let mut connections: JoinSet<Result<()>> = JoinSet::new();
        let mut next_id: u64 = 0;

        let result = loop {
            if shutdown.is_requested() {
                break Ok(());
            }
            debug!("Waiting for a connection...");

            tokio::select! {
                _ = stop.wait() => break Ok(()),
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = flatten(joined) {
                        break Err(e);
                    }
                }
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            break Err(PacketLogError::Server(format!(
                                "Failed to accept connection: {}",
                                e
                            )));
                        }
                    };

                    next_id += 1;
                    let span = info_span!("connection", id = next_id, peer = %peer);
                    let handler = Self::handle_connection(
                        stream,
                        peer,
                        Arc::clone(&storage),
                        shutdown.subscribe(),
                        config.server.read_buffer_size,
                    )
                    .instrument(span);

                    match config.server.connection_mode {
                        ConnectionMode::Serial => {
                            if let Err(e) = handler.await {
                                break Err(e);
                            }
                        }
                        ConnectionMode::Concurrent => {
                            connections.spawn(handler);
                        }
                    }
                }
            }
        };

        drop(listener);

        if result.is_ok() && !connections.is_empty() {
            let drained = timeout(DRAIN_TIMEOUT, async {
                while let Some(joined) = connections.join_next().await {
                    if let Err(e) = flatten(joined) {
                        error!(error = %e, "Connection failed during shutdown");
                    }
                }
            })
            .await;
            if drained.is_err() {
                warn!(remaining = connections.len(), "Aborting connections after drain timeout");
            }
        }
        connections.shutdown().await;

        result
    }

    /// Drive one connection: frame packets, append each to the journal and
    /// send the whole journal back.
    async fn handle_connection(
        mut stream: TcpStream,
        peer: SocketAddr,
        storage: Arc<LogStore>,
        mut stop: ShutdownListener,
        read_buffer_size: usize,
    ) -> Result<()> {
        info!("Accepted connection from {}", peer.ip());

        let mut assembler = PacketAssembler::new();
        let mut chunk = vec![0u8; read_buffer_size];

        loop {
            let received = tokio::select! {
                _ = stop.wait() => {
                    info!("Closing connection from {} for shutdown", peer.ip());
                    return Ok(());
                }
                received = stream.read(&mut chunk) => received,
            };

            let n = received.map_err(|e| {
                PacketLogError::Connection(format!("Failed to receive data from {}: {}", peer, e))
            })?;
            if n > 0 {
                debug!(bytes = n, "Received data");
            }

            let mut packet = match assembler.feed(&chunk[..n]) {
                FrameResult::Incomplete => continue,
                FrameResult::ConnectionClosed => {
                    info!("Closed connection from {}", peer.ip());
                    return Ok(());
                }
                FrameResult::Complete(packet) => packet,
            };

            loop {
                if !Self::respond(&mut stream, peer, &storage, &packet).await? {
                    info!("Closed connection from {}", peer.ip());
                    return Ok(());
                }
                match assembler.next_buffered() {
                    Some(next) => packet = next,
                    None => break,
                }
            }
        }
    }

    /// Append one packet and stream the journal back. Returns `false` if the
    /// peer went away mid-reply.
    async fn respond(
        stream: &mut TcpStream,
        peer: SocketAddr,
        storage: &LogStore,
        packet: &Packet,
    ) -> Result<bool> {
        let journal = storage.append_and_read(packet.as_bytes()).await?;
        debug!(
            packet_bytes = packet.len(),
            journal_bytes = journal.len(),
            "Appended packet, sending journal"
        );

        match stream.write_all(&journal).await {
            Ok(()) => Ok(true),
            Err(e) if peer_gone(&e) => {
                warn!(error = %e, "Peer went away before the reply was sent");
                Ok(false)
            }
            Err(e) => Err(PacketLogError::Connection(format!(
                "Failed to send data to {}: {}",
                peer, e
            ))),
        }
    }
}

fn peer_gone(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted
    )
}

fn flatten(joined: std::result::Result<Result<()>, JoinError>) -> Result<()> {
    match joined {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => Ok(()),
        Err(e) => Err(PacketLogError::Server(format!("Connection task panicked: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::tempdir;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;

    async fn create_test_server(
        data_file: &Path,
        mode: ConnectionMode,
    ) -> (TcpSocketServer, Arc<LogStore>, ShutdownController) {
        let mut config = ServerConfig::default();
        config.server.bind_address = "127.0.0.1".to_string();
        config.server.port = 0;
        config.server.connection_mode = mode;
        config.storage.data_file = data_file.to_path_buf();

        let storage = Arc::new(LogStore::new(&config));
        let shutdown = ShutdownController::new();
        let server = TcpSocketServer::bind(&config, Arc::clone(&storage), shutdown.clone())
            .await
            .unwrap();

        (server, storage, shutdown)
    }

    /// A connected (client, server-side) stream pair over loopback
    async fn stream_pair() -> (TcpStream, TcpStream, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, peer) = listener.accept().await.unwrap();
        (client, server, peer)
    }

    async fn read_exactly(stream: &mut TcpStream, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        timeout(Duration::from_secs(2), stream.read_exact(&mut buf))
            .await
            .expect("reply timed out")
            .unwrap();
        buf
    }

    #[tokio::test]
    async fn test_bind_reports_ephemeral_port() {
        let temp_dir = tempdir().unwrap();
        let (server, _, _) =
            create_test_server(&temp_dir.path().join("journal"), ConnectionMode::Concurrent).await;

        let addr = server.local_addr().unwrap();
        assert_ne!(addr.port(), 0);
        assert!(addr.ip().is_loopback());
    }

    #[tokio::test]
    async fn test_handle_connection() {
        let temp_dir = tempdir().unwrap();
        let storage = Arc::new(LogStore::at(temp_dir.path().join("journal")));
        let shutdown = ShutdownController::new();

        let (mut client, server, peer) = stream_pair().await;
        let handle = tokio::spawn(TcpSocketServer::handle_connection(
            server,
            peer,
            Arc::clone(&storage),
            shutdown.subscribe(),
            64,
        ));

        client.write_all(b"hello\n").await.unwrap();
        assert_eq!(read_exactly(&mut client, 6).await, b"hello\n");

        client.write_all(b"world\n").await.unwrap();
        assert_eq!(read_exactly(&mut client, 12).await, b"hello\nworld\n");

        drop(client);
        let result = timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_pipelined_packets_get_one_reply_each() {
        let temp_dir = tempdir().unwrap();
        let storage = Arc::new(LogStore::at(temp_dir.path().join("journal")));
        let shutdown = ShutdownController::new();

        let (mut client, server, peer) = stream_pair().await;
        tokio::spawn(TcpSocketServer::handle_connection(
            server,
            peer,
            Arc::clone(&storage),
            shutdown.subscribe(),
            64,
        ));

        client.write_all(b"a\nb\n").await.unwrap();
        assert_eq!(read_exactly(&mut client, 6).await, b"a\na\nb\n");
    }

    #[tokio::test]
    async fn test_unterminated_data_is_dropped_on_close() {
        let temp_dir = tempdir().unwrap();
        let storage = Arc::new(LogStore::at(temp_dir.path().join("journal")));
        let shutdown = ShutdownController::new();

        let (mut client, server, peer) = stream_pair().await;
        let handle = tokio::spawn(TcpSocketServer::handle_connection(
            server,
            peer,
            Arc::clone(&storage),
            shutdown.subscribe(),
            64,
        ));

        client.write_all(b"never finished").await.unwrap();
        client.shutdown().await.unwrap();
        drop(client);

        timeout(Duration::from_secs(1), handle).await.unwrap().unwrap().unwrap();
        assert!(storage.read_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_handler_exits_on_shutdown() {
        let temp_dir = tempdir().unwrap();
        let storage = Arc::new(LogStore::at(temp_dir.path().join("journal")));
        let shutdown = ShutdownController::new();

        let (_client, server, peer) = stream_pair().await;
        let handle = tokio::spawn(TcpSocketServer::handle_connection(
            server,
            peer,
            storage,
            shutdown.subscribe(),
            64,
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.request();

        let result = timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_server_shutdown_response() {
        let temp_dir = tempdir().unwrap();
        let (server, _, shutdown) =
            create_test_server(&temp_dir.path().join("journal"), ConnectionMode::Concurrent).await;

        let server_handle = tokio::spawn(async move { server.start().await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        shutdown.request();

        let result = timeout(Duration::from_secs(2), server_handle).await;
        assert!(result.is_ok());
        assert!(result.unwrap().unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_storage_failure_stops_server() {
        let temp_dir = tempdir().unwrap();
        // A directory cannot be opened for appending
        let (server, _, _) = create_test_server(temp_dir.path(), ConnectionMode::Concurrent).await;
        let addr = server.local_addr().unwrap();

        let server_handle = tokio::spawn(async move { server.start().await });

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"doomed\n").await.unwrap();

        let result = timeout(Duration::from_secs(2), server_handle)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(PacketLogError::Storage(_))));
    }

    #[test]
    fn test_peer_gone_kinds() {
        assert!(peer_gone(&std::io::Error::from(ErrorKind::BrokenPipe)));
        assert!(peer_gone(&std::io::Error::from(ErrorKind::ConnectionReset)));
        assert!(!peer_gone(&std::io::Error::from(ErrorKind::PermissionDenied)));
    }
}
