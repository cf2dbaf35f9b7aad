//! # Skippable-Frame Envelope
//!
//! Helpers around the compressed payload's container format.  A skippable
//! frame carries arbitrary user data that conforming decompressors ignore:
//! a little-endian magic in `0x184D2A50..=0x184D2A5F`, a little-endian
//! 32-bit user-data length, then the data itself.
//!
//! Two kinds of frame are produced here: fixed-length zero padding, and a
//! metadata header whose user data is a version byte `0x01` followed by a
//! UTF-8 filename.

/// Base magic of a skippable frame, little-endian on the wire.
pub const SKIPPABLE_MAGIC: u32 = 0x184D_2A50;

/// Low nibble of the magic is free; all sixteen values are skippable.
const SKIPPABLE_MASK: u32 = 0xFFFF_FFF0;

/// Version byte marking filename metadata.
const METADATA_VERSION: u8 = 0x01;

/// Bytes of frame overhead: magic plus length field.
const FRAME_OVERHEAD: usize = 8;

/// Emit a skippable frame of exactly `len` total bytes of zero padding.
///
/// Lengths below the 9-byte minimum are rounded up to it.
pub fn pad(len: usize) -> Vec<u8> {
    let len = len.max(FRAME_OVERHEAD + 1);

    let mut out = Vec::with_capacity(len);
    out.extend_from_slice(&SKIPPABLE_MAGIC.to_le_bytes());
    out.extend_from_slice(&((len - FRAME_OVERHEAD) as u32).to_le_bytes());
    out.resize(len, 0);
    out
}

/// Emit a skippable frame carrying a filename; total length is
/// `name.len() + 9`.
pub fn write_header(name: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(name.len() + FRAME_OVERHEAD + 1);
    out.extend_from_slice(&SKIPPABLE_MAGIC.to_le_bytes());
    out.extend_from_slice(&((name.len() + 1) as u32).to_le_bytes());
    out.push(METADATA_VERSION);
    out.extend_from_slice(name.as_bytes());
    out
}

/// Parse the filename out of a leading skippable frame, if one is there.
pub fn filename(data: &[u8]) -> Option<String> {
    if data.len() < FRAME_OVERHEAD + 2 {
        return None;
    }

    let magic = u32::from_le_bytes(data[0..4].try_into().unwrap());
    if magic & SKIPPABLE_MASK != SKIPPABLE_MAGIC {
        return None;
    }

    let frame_size = u32::from_le_bytes(data[4..8].try_into().unwrap()) as usize;
    if frame_size < 2 || data.len() < FRAME_OVERHEAD + frame_size {
        return None;
    }

    let payload = &data[FRAME_OVERHEAD..FRAME_OVERHEAD + frame_size];
    if payload[0] != METADATA_VERSION {
        return None;
    }

    String::from_utf8(payload[1..].to_vec()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pad_emits_exact_frame() {
        let frame = pad(20);
        assert_eq!(frame.len(), 20);

        let expected = [
            0x50, 0x2A, 0x4D, 0x18, 0x0c, 0x00, 0x00, 0x00, // header
            0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, // padding
        ];
        assert_eq!(frame, expected);
    }

    #[test]
    fn pad_rounds_tiny_lengths_up() {
        assert_eq!(pad(0).len(), 9);
        assert_eq!(pad(9).len(), 9);
    }

    #[test]
    fn write_header_emits_exact_frame() {
        let frame = write_header("foobar.txt");
        assert_eq!(frame.len(), 19);

        let mut expected = vec![0x50, 0x2A, 0x4D, 0x18, 0x0b, 0x00, 0x00, 0x00, 0x01];
        expected.extend_from_slice(b"foobar.txt");
        assert_eq!(frame, expected);
    }

    #[test]
    fn filename_roundtrip() {
        for name in ["foobar.txt", "a", "files with spaces.tar.gz", "ünïcodé.bin"] {
            let frame = write_header(name);
            assert_eq!(filename(&frame).as_deref(), Some(name), "{name}");
        }
    }

    #[test]
    fn filename_accepts_trailing_data() {
        let mut frame = write_header("data.bin");
        frame.extend_from_slice(&[0xAB; 100]);
        assert_eq!(filename(&frame).as_deref(), Some("data.bin"));
    }

    #[test]
    fn filename_rejects_malformed_input() {
        // Wrong magic
        assert_eq!(filename(&[0u8; 32]), None);
        // Padding frame carries no version byte
        assert_eq!(filename(&pad(20)), None);
        // Truncated frame
        let frame = write_header("foobar.txt");
        assert_eq!(filename(&frame[..10]), None);
        // Empty input
        assert_eq!(filename(&[]), None);
    }

    #[test]
    fn filename_accepts_any_skippable_magic_variant() {
        let mut frame = write_header("x.y");
        frame[0] = 0x5F;
        assert_eq!(filename(&frame).as_deref(), Some("x.y"));
    }
}
