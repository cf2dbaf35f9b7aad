//! # Fountain Decoder Stream
//!
//! Reassembles fixed-size packets from a byte stream written in arbitrary
//! chunk sizes, parses each frame header, and feeds the payload to the
//! codec.  Returns the fully decoded message on the write that completes
//! it.
//!
//! Block ids already seen are dropped without touching the codec, so a
//! repeating or lossy channel cannot poison the decode.

use std::collections::HashSet;

use crate::frame::{BlockHeader, HEADER_SIZE};
use cimbar_rateless::{DecodeStatus, Decoder};
use tracing::debug;

/// Reassembling decoder for one fountain stream.
pub struct FountainDecoderStream {
    buffer: Vec<u8>,
    buff_pos: usize,
    decoder: Decoder,
    seen_blocks: HashSet<u16>,
    data_size: u64,
    good: bool,
}

impl FountainDecoderStream {
    /// Build a decoder stream for a `data_size`-byte payload carried in
    /// `packet_size`-byte packets.
    pub fn create(data_size: u64, packet_size: usize) -> Option<Self> {
        if packet_size <= HEADER_SIZE {
            return None;
        }
        cimbar_rateless::init().ok()?;
        let decoder = Decoder::new(data_size, packet_size - HEADER_SIZE).ok()?;

        Some(FountainDecoderStream {
            buffer: vec![0u8; packet_size],
            buff_pos: 0,
            decoder,
            seen_blocks: HashSet::new(),
            data_size,
            good: true,
        })
    }

    /// Distinct block ids observed so far.
    pub fn progress(&self) -> usize {
        self.seen_blocks.len()
    }

    /// Packets needed in the loss-free case.
    pub fn blocks_required(&self) -> usize {
        self.data_size as usize / self.block_size() + 1
    }

    /// Payload bytes per packet.
    pub fn block_size(&self) -> usize {
        self.buffer.len() - HEADER_SIZE
    }

    /// Length of the payload being recovered.
    pub fn data_size(&self) -> u64 {
        self.data_size
    }

    /// Whether the underlying codec is still usable.
    pub fn good(&self) -> bool {
        self.good
    }

    /// Append stream bytes; returns the decoded message on the call that
    /// completes it.
    pub fn write(&mut self, mut data: &[u8]) -> Option<Vec<u8>> {
        while !data.is_empty() && self.good {
            let take = (self.buffer.len() - self.buff_pos).min(data.len());
            self.buffer[self.buff_pos..self.buff_pos + take].copy_from_slice(&data[..take]);
            self.buff_pos += take;
            data = &data[take..];

            if self.buff_pos == self.buffer.len() {
                self.buff_pos = 0;
                if let Some(message) = self.decode_frame() {
                    return Some(message);
                }
            }
        }
        None
    }

    /// Parse and absorb the frame sitting in the packet buffer.
    fn decode_frame(&mut self) -> Option<Vec<u8>> {
        let header = BlockHeader::decode(&mut &self.buffer[..])?;

        // Offering the codec a repeated id would be an error; skip it
        if !self.seen_blocks.insert(header.block_id) {
            return None;
        }

        let payload = &self.buffer[HEADER_SIZE..];
        match self.decoder.decode(header.block_id as u32, payload) {
            Ok(DecodeStatus::NeedMore) => None,
            Ok(DecodeStatus::Decoded) => {
                debug!(
                    blocks = self.seen_blocks.len(),
                    size = self.data_size,
                    "fountain stream decoded"
                );
                let mut message = vec![0u8; self.data_size as usize];
                match self.decoder.recover(&mut message) {
                    Ok(()) => Some(message),
                    Err(err) => {
                        debug!(%err, "recover failed after solve");
                        self.good = false;
                        None
                    }
                }
            }
            Err(err) => {
                debug!(block_id = header.block_id, %err, "codec rejected frame");
                self.good = false;
                None
            }
        }
    }
}
