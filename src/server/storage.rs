//! Journal file backing the shared packet log

use crate::config::ServerConfig;
use crate::{PacketLogError, Result};
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, trace};

/// Append-only journal shared by every connection.
///
/// Each operation opens its own file handle and drops it before returning.
/// `append_and_read` holds the writer lock across both halves so a reply is
/// never torn by another connection's append.
#[derive(Debug)]
pub struct LogStore {
    path: PathBuf,
    writer: Mutex<()>,
}

impl LogStore {
    /// Create a store for the configured journal path
    pub fn new(config: &ServerConfig) -> Self {
        Self::at(&config.storage.data_file)
    }

    /// Create a store at an explicit path
    pub fn at<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            writer: Mutex::new(()),
        }
    }

    /// Journal file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one packet, creating the journal if absent
    pub async fn append(&self, packet: &[u8]) -> Result<()> {
        let _guard = self.writer.lock().await;
        self.write_packet(packet).await
    }

    /// Whole journal from the start. A journal not yet created reads as
    /// empty.
    pub async fn read_all(&self) -> Result<Bytes> {
        let mut file = match OpenOptions::new().read(true).open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Bytes::new()),
            Err(e) => return Err(self.error("open for reading", e)),
        };

        let mut contents = Vec::new();
        file.read_to_end(&mut contents)
            .await
            .map_err(|e| self.error("read", e))?;
        trace!(bytes = contents.len(), "Read journal");
        Ok(Bytes::from(contents))
    }

    /// Append a packet and return the journal as it stands right after,
    /// with no other append in between.
    pub async fn append_and_read(&self, packet: &[u8]) -> Result<Bytes> {
        let _guard = self.writer.lock().await;
        self.write_packet(packet).await?;
        self.read_all().await
    }

    /// Current journal size in bytes
    pub async fn len(&self) -> Result<u64> {
        match fs::metadata(&self.path).await {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(self.error("stat", e)),
        }
    }

    /// Delete the journal. Returns `false` when there was nothing to delete.
    pub async fn remove(&self) -> Result<bool> {
        let _guard = self.writer.lock().await;
        match fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "Removed journal");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(self.error("remove", e)),
        }
    }

    async fn write_packet(&self, packet: &[u8]) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.error("open for appending", e))?;

        file.write_all(packet)
            .await
            .map_err(|e| self.error("append to", e))?;
        file.flush().await.map_err(|e| self.error("flush", e))?;
        trace!(bytes = packet.len(), "Appended packet to journal");
        Ok(())
    }

    fn error(&self, action: &str, e: std::io::Error) -> PacketLogError {
        PacketLogError::Storage(format!(
            "Failed to {} {}: {}",
            action,
            self.path.display(),
            e
        ))
    }
}
