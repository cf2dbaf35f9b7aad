//! # Integration tests: encoder stream ↔ decoder stream
//!
//! The full framed path: payload → packets → byte stream in arbitrary
//! chunk sizes → frame reassembly → codec → payload.

use cimbar_stream::{FountainDecoderStream, FountainEncoderStream};

// ─── Helpers ────────────────────────────────────────────────────────────────

/// `"0123456789"` repeated out to `len` bytes.
fn digits(len: usize) -> Vec<u8> {
    b"0123456789".iter().copied().cycle().take(len).collect()
}

fn trace_setup() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ─── Encoder Stream ─────────────────────────────────────────────────────────

#[test]
fn encoder_produces_endless_stream() {
    let input = digits(10000);
    let mut fes = FountainEncoderStream::create(input, 830).unwrap();

    assert_eq!(fes.block_count(), 0);
    assert_eq!(fes.blocks_required(), 13);
    assert!(fes.good());

    let mut buff = [0u8; 140];
    for _ in 0..1000 {
        assert_eq!(fes.readsome(&mut buff), buff.len());
    }

    assert_eq!(fes.block_count(), 170);
    assert_eq!(fes.blocks_required(), 13);
    assert!(fes.good());
}

#[test]
fn encoder_writes_packet_headers() {
    let input = digits(10000);
    let mut fes = FountainEncoderStream::create(input, 636).unwrap();

    assert_eq!(fes.block_count(), 0);
    assert_eq!(fes.blocks_required(), 16);
    assert!(fes.good());

    let mut buff = [0u8; 636];
    for i in 0..20usize {
        assert_eq!(fes.readsome(&mut buff), buff.len());

        // encode_id
        assert_eq!(buff[0], 0);

        // total size == 10000 == 0x002710, big-endian
        assert_eq!(buff[1], 0);
        assert_eq!(buff[2], 39);
        assert_eq!(buff[3], 16);

        // block_id skips the last original id exactly once
        assert_eq!(buff[4], 0);
        if i + 1 >= fes.blocks_required() {
            assert_eq!(buff[5] as usize, i + 1);
        } else {
            assert_eq!(buff[5] as usize, i);
        }
    }

    assert_eq!(fes.block_count(), 21);
    assert_eq!(fes.blocks_required(), 16);
    assert!(fes.good());
}

#[test]
fn read_chunk_size_does_not_change_the_stream() {
    let input = digits(10000);

    let mut fes1 = FountainEncoderStream::create(input.clone(), 830).unwrap();
    let mut fes2 = FountainEncoderStream::create(input, 830).unwrap();

    let mut oneforty = Vec::new();
    let mut buff1 = [0u8; 140];
    for _ in 0..83 {
        assert_eq!(fes1.readsome(&mut buff1), buff1.len());
        oneforty.extend_from_slice(&buff1);
    }

    let mut full = Vec::new();
    let mut buff2 = [0u8; 830];
    for _ in 0..14 {
        assert_eq!(fes2.readsome(&mut buff2), buff2.len());
        full.extend_from_slice(&buff2);
    }

    assert_eq!(full, oneforty);
    assert_eq!(fes1.block_count(), 15);
    assert_eq!(fes2.block_count(), 15);
}

#[test]
fn first_packet_is_header_plus_leading_payload() {
    let input = digits(1000);
    let mut fes = FountainEncoderStream::create(input.clone(), 400).unwrap();

    let mut buff = [0u8; 400];
    assert_eq!(fes.readsome(&mut buff), buff.len());

    let mut expected = vec![0u8, 0, 0x03, 0xe8, 0, 0];
    expected.extend_from_slice(&input[..394]);
    assert_eq!(&buff[..], &expected[..]);
}

#[test]
fn restart_and_resize_rebuilds_block_params() {
    let input = digits(10000);
    let mut fes = FountainEncoderStream::create(input, 830).unwrap();
    assert_eq!(fes.block_count(), 0);
    assert_eq!(fes.blocks_required(), 13);
    assert!(fes.good());

    assert!(fes.restart_and_resize_buffer(600));

    // Changes the block parameters and the internal buffer size
    assert_eq!(fes.block_count(), 0);
    assert_eq!(fes.blocks_required(), 17);
    assert!(fes.good());

    let mut buff = [0u8; 140];
    for _ in 0..1000 {
        assert_eq!(fes.readsome(&mut buff), buff.len());
    }

    assert_eq!(fes.block_count(), 235);
    assert_eq!(fes.blocks_required(), 17);
    assert!(fes.good());
}

#[test]
fn resize_beyond_buffer_capacity_fails() {
    let input = digits(1000);
    let mut fes = FountainEncoderStream::create(input, 800).unwrap();
    assert_eq!(fes.block_count(), 0);
    assert_eq!(fes.blocks_required(), 2);
    assert!(fes.good());

    assert!(!fes.restart_and_resize_buffer(1200)); // larger than the buffer

    // Stream left unchanged
    assert_eq!(fes.block_count(), 0);
    assert_eq!(fes.blocks_required(), 2);
    assert!(fes.good());
}

#[test]
fn create_rejects_bad_parameters() {
    // No payload room
    assert!(FountainEncoderStream::create(digits(100), 6).is_none());
    // Empty payload
    assert!(FountainEncoderStream::create(Vec::new(), 830).is_none());
    // Too small for two blocks
    assert!(FountainEncoderStream::create(digits(10), 830).is_none());
    // Decoder side mirrors the bounds
    assert!(FountainDecoderStream::create(100, 6).is_none());
}

// ─── Stream Round Trips ─────────────────────────────────────────────────────

#[test]
fn decode_from_small_chunks() {
    trace_setup();
    let input = digits(10000);
    let mut fes = FountainEncoderStream::create(input.clone(), 830).unwrap();

    assert_eq!(fes.block_count(), 0);
    assert_eq!(fes.blocks_required(), 13);
    assert!(fes.good());

    let mut fds = FountainDecoderStream::create(input.len() as u64, 830).unwrap();

    let mut buff = [0u8; 140];
    let mut output = None;
    for _ in 0..1000 {
        assert_eq!(fes.readsome(&mut buff), buff.len());
        if let Some(message) = fds.write(&buff) {
            output = Some(message);
            break;
        }
    }

    let output = output.expect("stream decode completes");
    assert_eq!(output, input);

    assert_eq!(fds.block_size(), 824);
    assert_eq!(fds.data_size(), 10000);
    assert!(fds.good());
    assert_eq!(fds.blocks_required(), fes.blocks_required());
    assert_eq!(fds.progress(), fes.blocks_required());

    assert_eq!(fes.block_count(), 15);
    assert_eq!(fes.blocks_required(), 13);
    assert!(fes.good());
}

#[test]
fn decode_from_whole_packets() {
    let input = digits(10000);
    let mut fes = FountainEncoderStream::create(input.clone(), 830).unwrap();
    let mut fds = FountainDecoderStream::create(input.len() as u64, 830).unwrap();

    let mut buff = [0u8; 830];
    let mut output = None;
    for _ in 0..1000 {
        assert_eq!(fes.readsome(&mut buff), buff.len());
        if let Some(message) = fds.write(&buff) {
            output = Some(message);
            break;
        }
    }

    assert_eq!(output.expect("stream decode completes"), input);
    assert_eq!(fds.block_size(), 824);
    assert_eq!(fds.data_size(), 10000);
    assert!(fds.good());

    assert_eq!(fes.block_count(), 14);
    assert_eq!(fes.blocks_required(), 13);
    assert!(fes.good());
}

#[test]
fn packet_order_does_not_matter() {
    trace_setup();
    let input = digits(5000);
    let mut fes = FountainEncoderStream::create(input.clone(), 500).unwrap();

    // Collect a pool of whole packets, then feed them back permuted
    let mut packets = Vec::new();
    for _ in 0..30 {
        let mut packet = vec![0u8; 500];
        assert_eq!(fes.readsome(&mut packet), packet.len());
        packets.push(packet);
    }
    packets.reverse();
    packets.rotate_left(7);

    let mut fds = FountainDecoderStream::create(input.len() as u64, 500).unwrap();
    let mut output = None;
    for packet in &packets {
        // Arbitrary chunking inside each packet as well
        let (a, b) = packet.split_at(123);
        if let Some(message) = fds.write(a) {
            output = Some(message);
            break;
        }
        if let Some(message) = fds.write(b) {
            output = Some(message);
            break;
        }
    }

    assert_eq!(output.expect("permuted decode completes"), input);
}

#[test]
fn repeated_packets_are_ignored() {
    let input = digits(3000);
    let mut fes = FountainEncoderStream::create(input.clone(), 300).unwrap();

    let mut packet = vec![0u8; 300];
    assert_eq!(fes.readsome(&mut packet), packet.len());

    let mut fds = FountainDecoderStream::create(input.len() as u64, 300).unwrap();

    // The same packet over and over makes no progress
    for _ in 0..10 {
        assert!(fds.write(&packet).is_none());
    }
    assert_eq!(fds.progress(), 1);
    assert!(fds.good());

    // Fresh packets still complete the decode
    let mut output = None;
    for _ in 0..100 {
        assert_eq!(fes.readsome(&mut packet), packet.len());
        if let Some(message) = fds.write(&packet) {
            output = Some(message);
            break;
        }
    }
    assert_eq!(output.expect("decode completes after duplicates"), input);
}
