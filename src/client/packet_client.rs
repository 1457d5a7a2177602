//! packetlog client for sending packets and collecting journal replies

use crate::config::ClientConfig;
use crate::types::TERMINATOR;
use crate::{PacketLogError, Result};
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

/// Client holding one connection to a packetlog server
pub struct PacketClient {
    config: ClientConfig,
    stream: TcpStream,
}

impl PacketClient {
    /// Connect to the server at `address`
    pub async fn connect(address: &str) -> Result<Self> {
        let config = ClientConfig {
            address: address.to_string(),
            ..Default::default()
        };

        Self::with_config(config).await
    }

    /// Connect with custom configuration
    pub async fn with_config(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let stream = timeout(
            Duration::from_secs(config.timeout_seconds),
            TcpStream::connect(&config.address),
        )
        .await
        .map_err(|_| PacketLogError::Connection("Connection timeout".to_string()))?
        .map_err(|e| PacketLogError::Connection(format!("Failed to connect: {}", e)))?;

        Ok(Self { config, stream })
    }

    /// Send one packet and collect the journal the server replies with.
    ///
    /// A terminator is appended if `packet` lacks one.
    pub async fn send_packet(&mut self, packet: &[u8]) -> Result<Bytes> {
        self.write_packet(packet).await?;
        self.read_reply().await
    }

    /// Send a text line and collect the reply
    pub async fn send_line<S: AsRef<str>>(&mut self, line: S) -> Result<Bytes> {
        self.send_packet(line.as_ref().as_bytes()).await
    }

    /// Send raw bytes without framing, e.g. one fragment of a packet
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Read exactly `len` reply bytes
    pub async fn read_reply_exact(&mut self, len: usize) -> Result<Bytes> {
        let mut reply = vec![0u8; len];
        timeout(self.io_timeout(), self.stream.read_exact(&mut reply))
            .await
            .map_err(|_| PacketLogError::Connection("Timed out waiting for reply".to_string()))??;
        Ok(Bytes::from(reply))
    }

    /// Read a reply whose length is unknown.
    ///
    /// The reply is considered complete once the bytes received so far end
    /// in a terminator and nothing more arrives within `settle_millis`.
    pub async fn read_reply(&mut self) -> Result<Bytes> {
        let mut reply = BytesMut::with_capacity(self.config.buffer_size);
        let settle = Duration::from_millis(self.config.settle_millis);

        loop {
            let wait = if reply.last() == Some(&TERMINATOR) {
                settle
            } else {
                self.io_timeout()
            };

            match timeout(wait, self.stream.read_buf(&mut reply)).await {
                Ok(Ok(0)) => {
                    if reply.is_empty() {
                        return Err(PacketLogError::Connection(
                            "Server closed the connection".to_string(),
                        ));
                    }
                    return Ok(reply.freeze());
                }
                Ok(Ok(_)) => {
                    if reply.capacity() == reply.len() {
                        reply.reserve(self.config.buffer_size);
                    }
                }
                Ok(Err(e)) => return Err(PacketLogError::Io(e)),
                Err(_) if wait == settle && !reply.is_empty() => return Ok(reply.freeze()),
                Err(_) => {
                    return Err(PacketLogError::Connection(
                        "Timed out waiting for reply".to_string(),
                    ))
                }
            }
        }
    }

    /// Close the connection to the server
    pub async fn close(mut self) -> Result<()> {
        self.stream.shutdown().await.map_err(PacketLogError::Io)
    }

    async fn write_packet(&mut self, packet: &[u8]) -> Result<()> {
        self.stream.write_all(packet).await?;
        if packet.last() != Some(&TERMINATOR) {
            self.stream.write_all(&[TERMINATOR]).await?;
        }
        self.stream.flush().await?;
        Ok(())
    }

    fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_seconds)
    }
}
