//! # Packet Frame Header
//!
//! Every packet of a fountain stream starts with the same 6 bytes:
//!
//! ```text
//!  0                   1                   2
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |   Encode ID   |         Total Size (24)       |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |           Block ID (16)       |    Payload ...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! `total_size` and `block_id` are big-endian.  The payload fills the rest
//! of the packet: `block_size = packet_size - 6`.

use bytes::{Buf, BufMut};

/// Bytes of header prefixed to each packet payload.
pub const HEADER_SIZE: usize = 6;

/// Largest payload length the 24-bit size field can carry.
pub const MAX_TOTAL_SIZE: u64 = (1 << 24) - 1;

/// Decoded packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Tag identifying the stream configuration; identical in every packet
    /// of one stream.
    pub encode_id: u8,
    /// Length of the original payload in bytes.
    pub total_size: u32,
    /// Packet id; ids below the block count are original block indices.
    pub block_id: u16,
}

impl BlockHeader {
    /// Encode the header into a buffer.
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.encode_id);
        buf.put_uint(self.total_size as u64, 3);
        buf.put_u16(self.block_id);
    }

    /// Decode a header from a buffer.  Returns `None` when too short.
    pub fn decode(buf: &mut impl Buf) -> Option<Self> {
        if buf.remaining() < HEADER_SIZE {
            return None;
        }
        let encode_id = buf.get_u8();
        let total_size = buf.get_uint(3) as u32;
        let block_id = buf.get_u16();
        Some(BlockHeader {
            encode_id,
            total_size,
            block_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn header_layout_is_bit_exact() {
        let hdr = BlockHeader {
            encode_id: 0,
            total_size: 10000,
            block_id: 3,
        };
        let mut buf = Vec::new();
        hdr.encode(&mut buf);
        // 10000 = 0x002710 big-endian
        assert_eq!(buf, [0x00, 0x00, 0x27, 0x10, 0x00, 0x03]);
    }

    #[test]
    fn short_buffer_rejected() {
        let mut short: &[u8] = &[0u8; 5];
        assert!(BlockHeader::decode(&mut short).is_none());
    }

    proptest! {
        #[test]
        fn proptest_header_roundtrip(
            encode_id in any::<u8>(),
            total_size in 0u32..(1 << 24),
            block_id in any::<u16>(),
        ) {
            let hdr = BlockHeader { encode_id, total_size, block_id };
            let mut buf = Vec::new();
            hdr.encode(&mut buf);
            prop_assert_eq!(buf.len(), HEADER_SIZE);
            let decoded = BlockHeader::decode(&mut &buf[..]).unwrap();
            prop_assert_eq!(decoded, hdr);
        }
    }
}
