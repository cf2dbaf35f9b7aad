//! # Fountain Encoder Stream
//!
//! A framed view over the codec: the payload becomes an endless byte
//! stream of fixed-size packets, readable in arbitrary chunk sizes.
//! Packets are generated lazily as the reader drains them.
//!
//! Block ids count up from 0 and skip the last original id exactly once,
//! so the partial-length final block never appears in stream mode and
//! every packet payload is exactly `packet_size - 6` bytes.

use crate::frame::{BlockHeader, HEADER_SIZE, MAX_TOTAL_SIZE};
use cimbar_rateless::Encoder;
use tracing::debug;

/// Packetizing encoder over an owned payload.
pub struct FountainEncoderStream {
    data: Vec<u8>,
    encoder: Encoder,
    encode_id: u8,
    packet_size: usize,
    /// Largest packet size this stream can be resized to
    capacity: usize,
    /// Current packet: header + payload
    buffer: Vec<u8>,
    /// Read position within `buffer`; at the end means "generate next"
    buff_pos: usize,
    /// Next block id to emit
    block: u32,
    good: bool,
}

impl FountainEncoderStream {
    /// Wrap `data` into packets of `packet_size` bytes with encode id 0.
    ///
    /// Returns `None` when the packet size leaves no payload room, the
    /// payload is empty or exceeds the 24-bit length field, or the block
    /// count falls outside the codec's range.
    pub fn create(data: Vec<u8>, packet_size: usize) -> Option<Self> {
        Self::with_encode_id(data, packet_size, 0)
    }

    /// As [`create`](Self::create) with an explicit stream tag.
    pub fn with_encode_id(data: Vec<u8>, packet_size: usize, encode_id: u8) -> Option<Self> {
        if packet_size <= HEADER_SIZE {
            return None;
        }
        if data.is_empty() || data.len() as u64 > MAX_TOTAL_SIZE {
            return None;
        }

        cimbar_rateless::init().ok()?;
        let encoder = Encoder::new(&data, packet_size - HEADER_SIZE).ok()?;

        debug!(
            total_size = data.len(),
            packet_size,
            blocks = encoder.block_count(),
            "fountain encoder stream ready"
        );

        Some(FountainEncoderStream {
            data,
            encoder,
            encode_id,
            packet_size,
            capacity: packet_size,
            buffer: vec![0u8; packet_size],
            buff_pos: packet_size,
            block: 0,
            good: true,
        })
    }

    /// Ids consumed so far (the next block id to emit).
    pub fn block_count(&self) -> usize {
        self.block as usize
    }

    /// Packets a decoder needs in the loss-free case.
    pub fn blocks_required(&self) -> usize {
        self.data.len() / self.block_size() + 1
    }

    /// Payload bytes per packet.
    pub fn block_size(&self) -> usize {
        self.packet_size - HEADER_SIZE
    }

    /// Length of the wrapped payload.
    pub fn data_size(&self) -> usize {
        self.data.len()
    }

    /// Stream tag carried in every packet header.
    pub fn encode_id(&self) -> u8 {
        self.encode_id
    }

    /// Whether the stream can keep producing packets.
    pub fn good(&self) -> bool {
        self.good
    }

    /// Fill `out` with the next bytes of the stream, spanning packet
    /// boundaries as needed.  Returns the bytes produced: `out.len()`
    /// unless the stream has gone bad.
    pub fn readsome(&mut self, out: &mut [u8]) -> usize {
        let mut written = 0usize;
        while written < out.len() && self.good {
            if self.buff_pos >= self.packet_size && !self.generate_packet() {
                break;
            }
            let take = (self.packet_size - self.buff_pos).min(out.len() - written);
            out[written..written + take]
                .copy_from_slice(&self.buffer[self.buff_pos..self.buff_pos + take]);
            self.buff_pos += take;
            written += take;
        }
        written
    }

    /// Switch to a new packet size and restart the stream from block 0.
    ///
    /// Returns false (leaving the stream untouched) when the new size
    /// exceeds the originally allocated buffer.
    pub fn restart_and_resize_buffer(&mut self, new_packet_size: usize) -> bool {
        if new_packet_size > self.capacity || new_packet_size <= HEADER_SIZE {
            return false;
        }

        let Ok(encoder) = Encoder::new(&self.data, new_packet_size - HEADER_SIZE) else {
            return false;
        };

        self.encoder = encoder;
        self.packet_size = new_packet_size;
        self.buffer.resize(new_packet_size, 0);
        self.buff_pos = new_packet_size;
        self.block = 0;
        self.good = true;
        true
    }

    /// Produce the next packet into the internal buffer.
    fn generate_packet(&mut self) -> bool {
        // The partial-length last original block is never emitted
        if self.block == self.encoder.block_count() as u32 - 1 {
            self.block += 1;
        }

        let header = BlockHeader {
            encode_id: self.encode_id,
            total_size: self.data.len() as u32,
            block_id: self.block as u16,
        };
        let mut dest = &mut self.buffer[..];
        header.encode(&mut dest);

        match self.encoder.encode(self.block, &mut self.buffer[HEADER_SIZE..]) {
            Ok(written) if written == self.packet_size - HEADER_SIZE => {
                self.block += 1;
                self.buff_pos = 0;
                true
            }
            _ => {
                self.good = false;
                false
            }
        }
    }
}
