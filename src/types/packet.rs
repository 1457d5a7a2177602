//! Packet and framing outcome types

use bytes::Bytes;
use std::fmt;

/// Byte that ends every packet on the wire and in the journal
pub const TERMINATOR: u8 = b'\n';

/// A complete packet: every byte received up to and including the first
/// terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet(Bytes);

impl Packet {
    /// Wrap framed bytes. The caller guarantees they end in [`TERMINATOR`].
    pub(crate) fn new(bytes: Bytes) -> Self {
        debug_assert_eq!(bytes.last(), Some(&TERMINATOR));
        Self(bytes)
    }

    /// Raw bytes, terminator included
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length in bytes, terminator included
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// A packet always holds at least its terminator
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Offsets of embedded NUL bytes
    pub fn nul_positions(&self) -> Vec<usize> {
        self.0
            .iter()
            .enumerate()
            .filter_map(|(i, b)| (*b == 0).then_some(i))
            .collect()
    }
}

impl AsRef<[u8]> for Packet {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = self.0.strip_suffix(&[TERMINATOR]).unwrap_or(&self.0);
        write!(f, "{}", String::from_utf8_lossy(body))
    }
}

/// Outcome of feeding received bytes to a
/// [`PacketAssembler`](crate::server::PacketAssembler)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameResult {
    /// No terminator yet; keep receiving
    Incomplete,
    /// A terminator arrived and completed this packet
    Complete(Packet),
    /// The peer closed the stream; any partial packet was discarded
    ConnectionClosed,
}
