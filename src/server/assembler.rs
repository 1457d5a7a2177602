//! Packet assembly from partial socket reads

use crate::types::{FrameResult, Packet, TERMINATOR};
use bytes::BytesMut;
use tracing::{debug, warn};

/// Initial capacity of a connection's packet buffer
const INITIAL_CAPACITY: usize = 1024;

/// Accumulates received bytes until a terminator completes a packet.
///
/// The buffer grows without bound. Bytes that arrive after the first
/// terminator of a read stay buffered as the start of the next packet and
/// are handed out by [`next_buffered`](Self::next_buffered).
#[derive(Debug)]
pub struct PacketAssembler {
    buffer: BytesMut,
    /// Prefix of `buffer` already scanned and known to hold no terminator
    scanned: usize,
}

impl Default for PacketAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketAssembler {
    /// Create an empty assembler
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    /// Create an empty assembler with a pre-sized buffer
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            scanned: 0,
        }
    }

    /// Feed the bytes of one receive.
    ///
    /// An empty slice is how a zero-length receive is reported: the peer
    /// closed and whatever partial packet is buffered gets dropped.
    pub fn feed(&mut self, bytes: &[u8]) -> FrameResult {
        if bytes.is_empty() {
            let dropped = self.discard();
            if dropped > 0 {
                debug!(bytes = dropped, "Discarding unterminated packet on close");
            }
            return FrameResult::ConnectionClosed;
        }

        self.buffer.extend_from_slice(bytes);

        match self.take_packet() {
            Some(packet) => FrameResult::Complete(packet),
            None => FrameResult::Incomplete,
        }
    }

    /// Next packet already complete in the buffer, if a previous read
    /// carried more than one.
    pub fn next_buffered(&mut self) -> Option<Packet> {
        self.take_packet()
    }

    /// Bytes buffered towards the next packet
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Returns `true` if nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop any partial packet, returning how many bytes were dropped
    pub fn discard(&mut self) -> usize {
        let dropped = self.buffer.len();
        self.buffer.clear();
        self.scanned = 0;
        dropped
    }

    fn take_packet(&mut self) -> Option<Packet> {
        match self.buffer[self.scanned..]
            .iter()
            .position(|b| *b == TERMINATOR)
        {
            Some(offset) => {
                let end = self.scanned + offset + 1;
                self.scanned = 0;
                let packet = Packet::new(self.buffer.split_to(end).freeze());
                let nuls = packet.nul_positions();
                if !nuls.is_empty() {
                    warn!(positions = ?nuls, "Packet contains null characters");
                }
                Some(packet)
            }
            None => {
                self.scanned = self.buffer.len();
                None
            }
        }
    }
}
