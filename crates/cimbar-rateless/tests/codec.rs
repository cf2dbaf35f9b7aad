//! # Integration tests: encoder ↔ decoder through the block interface
//!
//! End-to-end scenarios over the codec itself: systematic output, loss
//! patterns, recovery-only decoding, decoder→encoder conversion, and the
//! overhead bound.  The "network" is a plain loop over block ids.

use cimbar_rateless::{DecodeStatus, Decoder, Encoder};
use rand::{RngExt, SeedableRng};

// ─── Helpers ────────────────────────────────────────────────────────────────

fn setup() {
    cimbar_rateless::init().expect("gf256 init");
}

/// `"0123456789"` repeated out to `len` bytes.
fn digits(len: usize) -> Vec<u8> {
    b"0123456789".iter().copied().cycle().take(len).collect()
}

fn random_message(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.random()).collect()
}

// ─── Systematic Property ────────────────────────────────────────────────────

#[test]
fn encoder_emits_original_blocks_verbatim() {
    setup();
    let message = digits(10000);
    let encoder = Encoder::new(&message, 1120).unwrap();
    assert_eq!(encoder.block_count(), 9);

    let mut buff = [0u8; 1120];
    for id in 0..500u32 {
        let written = encoder.encode(id, &mut buff).unwrap();
        if id == 8 {
            // Last original block carries the partial tail
            assert_eq!(written, 1040);
        } else {
            assert_eq!(written, 1120);
        }
        if id < 9 {
            let lo = id as usize * 1120;
            assert_eq!(&buff[..written], &message[lo..lo + written], "id {id}");
        }
    }
}

// ─── Loss Pattern Round Trip ────────────────────────────────────────────────

#[test]
fn round_trip_dropping_every_third_packet() {
    setup();
    let message = digits(10000);
    const PACKET: usize = 1400;

    let encoder = Encoder::new(&message, PACKET).unwrap();
    let mut decoder = Decoder::new(message.len() as u64, PACKET).unwrap();

    let mut block = [0u8; PACKET];
    let mut decoded_blocks = 0usize;
    let mut finished_at = None;

    for block_id in 0..50u32 {
        if block_id % 3 == 0 {
            // 33% packet loss
            continue;
        }
        decoded_blocks += 1;

        let expected_size = if block_id == 7 { 200 } else { PACKET };
        let written = encoder.encode(block_id, &mut block).unwrap();
        assert_eq!(written, expected_size);

        match decoder.decode(block_id, &block[..written]).unwrap() {
            DecodeStatus::NeedMore => {}
            DecodeStatus::Decoded => {
                finished_at = Some(block_id);
                break;
            }
        }
    }

    assert_eq!(finished_at, Some(11));
    assert_eq!(decoded_blocks, 8);
    assert_eq!(decoder.rows_accepted(), 8);

    let mut out = vec![0u8; message.len()];
    decoder.recover(&mut out).unwrap();
    assert_eq!(out, message);
}

// ─── Deterministic Output ───────────────────────────────────────────────────

#[test]
fn encoding_is_consistent_across_instances() {
    setup();
    let message = digits(1000);
    const PACKET: usize = 626;

    let a = Encoder::new(&message, PACKET).unwrap();
    let b = Encoder::new(&message, PACKET).unwrap();
    assert_eq!(a.block_count(), 2);

    let mut block_a = [0u8; PACKET];
    let mut block_b = [0u8; PACKET];
    for id in 0..8u32 {
        let na = a.encode(id, &mut block_a).unwrap();
        let nb = b.encode(id, &mut block_b).unwrap();
        assert_eq!(na, nb);
        assert_eq!(&block_a[..na], &block_b[..nb], "id {id}");
    }

    // Original blocks pass through
    let n0 = a.encode(0, &mut block_a).unwrap();
    assert_eq!(&block_a[..n0], &message[..626]);
    let n1 = a.encode(1, &mut block_a).unwrap();
    assert_eq!(n1, 374);
    assert_eq!(&block_a[..n1], &message[626..]);

    // Blocks 0 and 2 alone recover the message
    let mut decoder = Decoder::new(message.len() as u64, PACKET).unwrap();
    let n0 = a.encode(0, &mut block_a).unwrap();
    assert_eq!(
        decoder.decode(0, &block_a[..n0]).unwrap(),
        DecodeStatus::NeedMore
    );
    let n2 = a.encode(2, &mut block_a).unwrap();
    assert_eq!(
        decoder.decode(2, &block_a[..n2]).unwrap(),
        DecodeStatus::Decoded
    );

    let mut out = vec![0u8; message.len()];
    decoder.recover(&mut out).unwrap();
    assert_eq!(out, message);
}

// ─── Recovery-Only Decoding ─────────────────────────────────────────────────

#[test]
fn counting_down_through_recovery_ids() {
    setup();
    let message = digits(6000);
    const PACKET: usize = 624;

    let encoder = Encoder::new(&message, PACKET).unwrap();
    let mut decoder = Decoder::new(message.len() as u64, PACKET).unwrap();
    assert_eq!(encoder.block_count(), 10);

    let mut block = [0u8; PACKET];
    let mut finished_at = None;

    // Decode backwards, never using the original data blocks
    for block_id in (0..=105u32).rev() {
        let written = encoder.encode(block_id, &mut block).unwrap();
        if decoder.decode(block_id, &block[..written]).unwrap() == DecodeStatus::Decoded {
            finished_at = Some(block_id);
            break;
        }
    }

    assert_eq!(finished_at, Some(96));
    assert_eq!(decoder.rows_accepted(), 10);

    let mut out = vec![0u8; message.len()];
    decoder.recover(&mut out).unwrap();
    assert_eq!(out, message);
}

// ─── Duplicate Rejection ────────────────────────────────────────────────────

#[test]
fn duplicate_block_id_does_not_advance_state() {
    setup();
    let message = digits(500);
    const PACKET: usize = 100;

    let encoder = Encoder::new(&message, PACKET).unwrap();
    let mut decoder = Decoder::new(message.len() as u64, PACKET).unwrap();

    let mut block = [0u8; PACKET];
    let n = encoder.encode(0, &mut block).unwrap();
    assert_eq!(
        decoder.decode(0, &block[..n]).unwrap(),
        DecodeStatus::NeedMore
    );
    let accepted = decoder.rows_accepted();

    // Same id again: rejected, no progress
    assert!(decoder.decode(0, &block[..n]).is_err());
    assert_eq!(decoder.rows_accepted(), accepted);

    // Fresh ids still finish the decode
    for block_id in 1..5u32 {
        let n = encoder.encode(block_id, &mut block).unwrap();
        let status = decoder.decode(block_id, &block[..n]).unwrap();
        if block_id == 4 {
            assert_eq!(status, DecodeStatus::Decoded);
        }
    }

    let mut out = vec![0u8; message.len()];
    decoder.recover(&mut out).unwrap();
    assert_eq!(out, message);
}

// ─── Decoder Becomes Encoder ────────────────────────────────────────────────

#[test]
fn converted_decoder_encodes_identically() {
    setup();
    let message = random_message(2000, 0xC1DE);
    const PACKET: usize = 100;

    let reference = Encoder::new(&message, PACKET).unwrap();
    let n = reference.block_count() as u32;

    // Decode from recovery blocks only
    let mut decoder = Decoder::new(message.len() as u64, PACKET).unwrap();
    let mut block = [0u8; PACKET];
    let mut id = n;
    loop {
        let written = reference.encode(id, &mut block).unwrap();
        if decoder.decode(id, &block[..written]).unwrap() == DecodeStatus::Decoded {
            break;
        }
        id += 1;
        assert!(id < n + 40, "decode did not converge");
    }

    let continued = decoder.into_encoder().unwrap();

    let mut expected = [0u8; PACKET];
    let mut actual = [0u8; PACKET];
    for block_id in 0..(n + 20) {
        let ne = reference.encode(block_id, &mut expected).unwrap();
        let na = continued.encode(block_id, &mut actual).unwrap();
        assert_eq!(ne, na, "length mismatch at id {block_id}");
        assert_eq!(&expected[..ne], &actual[..na], "data mismatch at id {block_id}");
    }
}

// ─── All-Original Fast Path ─────────────────────────────────────────────────

#[test]
fn shuffled_original_blocks_decode_without_solving() {
    setup();
    let message = random_message(3000, 7);
    const PACKET: usize = 250;

    let encoder = Encoder::new(&message, PACKET).unwrap();
    let n = encoder.block_count() as u32;
    let mut decoder = Decoder::new(message.len() as u64, PACKET).unwrap();

    // Originals only, out of order
    let mut ids: Vec<u32> = (0..n).collect();
    ids.reverse();

    let mut block = [0u8; PACKET];
    let mut last = DecodeStatus::NeedMore;
    for &id in &ids {
        let written = encoder.encode(id, &mut block).unwrap();
        last = decoder.decode(id, &block[..written]).unwrap();
    }
    assert_eq!(last, DecodeStatus::Decoded);

    let mut out = vec![0u8; message.len()];
    decoder.recover(&mut out).unwrap();
    assert_eq!(out, message);

    // Single-block recovery agrees
    let mut one = [0u8; PACKET];
    let bytes = decoder.recover_block(3, &mut one).unwrap();
    assert_eq!(&one[..bytes], &message[3 * PACKET..4 * PACKET]);
}

// ─── Single Block Recovery ──────────────────────────────────────────────────

#[test]
fn recover_block_regenerates_lost_originals() {
    setup();
    let message = random_message(1700, 99);
    const PACKET: usize = 128;

    let encoder = Encoder::new(&message, PACKET).unwrap();
    let n = encoder.block_count() as u32;

    let mut decoder = Decoder::new(message.len() as u64, PACKET).unwrap();
    let mut block = [0u8; PACKET];

    // Drop originals 0 and 1, backfill from recovery ids
    let mut fed = 0u32;
    let mut id = 2u32;
    loop {
        let written = encoder.encode(id, &mut block).unwrap();
        let status = decoder.decode(id, &block[..written]).unwrap();
        fed += 1;
        if status == DecodeStatus::Decoded {
            break;
        }
        id += 1;
        assert!(fed < n + 40, "decode did not converge");
    }

    for block_id in [0u32, 1, n - 1] {
        let mut out = [0u8; PACKET];
        let bytes = decoder.recover_block(block_id, &mut out).unwrap();
        let lo = block_id as usize * PACKET;
        assert_eq!(&out[..bytes], &message[lo..(lo + bytes).min(message.len())]);
    }
}

// ─── Sampled Round-Trip Grid ────────────────────────────────────────────────

#[test]
fn round_trip_grid_over_block_counts_and_sizes() {
    setup();

    for &(n, block_bytes) in &[
        (2usize, 1usize),
        (3, 1),
        (7, 3),
        (16, 65),
        (63, 5),
        (64, 2),
        (65, 33),
        (100, 16),
        (300, 8),
        (1000, 4),
        (2047, 1),
        (2048, 1),
        (2049, 1),
    ] {
        let len = n * block_bytes - (block_bytes / 2);
        let message = random_message(len, (n * 31 + block_bytes) as u64);

        let encoder = Encoder::new(&message, block_bytes).unwrap();
        assert_eq!(encoder.block_count() as usize, n, "bad grid entry");

        // Drop roughly a quarter of the originals
        let mut decoder = Decoder::new(len as u64, block_bytes).unwrap();
        let mut block = vec![0u8; block_bytes];
        let mut done = false;

        let feed = |decoder: &mut Decoder, id: u32, block: &mut [u8]| -> DecodeStatus {
            let written = encoder.encode(id, block).unwrap();
            decoder.decode(id, &block[..written]).unwrap()
        };

        for id in 0..n as u32 {
            if id % 4 == 0 {
                continue;
            }
            if feed(&mut decoder, id, &mut block) == DecodeStatus::Decoded {
                done = true;
                break;
            }
        }
        let mut id = n as u32;
        while !done {
            assert!(id < (n + 64) as u32, "N={n} B={block_bytes} did not converge");
            if feed(&mut decoder, id, &mut block) == DecodeStatus::Decoded {
                done = true;
            }
            id += 1;
        }

        let mut out = vec![0u8; len];
        decoder.recover(&mut out).unwrap();
        assert_eq!(out, message, "N={n} B={block_bytes}");
    }
}

// ─── Overhead Bound ─────────────────────────────────────────────────────────

#[test]
fn recovery_overhead_stays_small() {
    setup();

    for &n in &[100usize, 1000] {
        const B: usize = 8;
        let mut over_budget = 0usize;
        let trials = 20usize;

        for trial in 0..trials {
            let message = random_message(n * B, trial as u64 * 7919 + n as u64);
            let encoder = Encoder::new(&message, B).unwrap();
            let mut decoder = Decoder::new(message.len() as u64, B).unwrap();

            // Feed recovery ids only, starting at a per-trial offset
            let mut block = [0u8; B];
            let first = (n + trial * 131) as u32;
            let mut offered = 0usize;
            loop {
                let id = first + offered as u32;
                let written = encoder.encode(id, &mut block).unwrap();
                offered += 1;
                if decoder.decode(id, &block[..written]).unwrap() == DecodeStatus::Decoded {
                    break;
                }
                assert!(offered < n + 30, "N={n} trial={trial} runaway");
            }

            if offered > n + 3 {
                over_budget += 1;
            }

            let mut out = vec![0u8; message.len()];
            decoder.recover(&mut out).unwrap();
            assert_eq!(out, message);
        }

        // Averaged over seeds the codec needs fewer than 4 extra packets
        // nearly always; allow a single outlier per batch
        assert!(over_budget <= 1, "N={n}: {over_budget}/{trials} over budget");
    }
}

// ─── Randomized Round Trips ─────────────────────────────────────────────────

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn proptest_round_trip_any_loss_pattern(
            n in 2usize..24,
            block_bytes in 1usize..48,
            drop_mask in any::<u32>(),
            seed in any::<u64>(),
        ) {
            setup();
            let message = random_message(n * block_bytes, seed);

            let encoder = Encoder::new(&message, block_bytes).unwrap();
            prop_assert_eq!(encoder.block_count() as usize, n);

            let mut decoder = Decoder::new(message.len() as u64, block_bytes).unwrap();
            let mut block = vec![0u8; block_bytes];
            let mut done = false;

            for id in 0..n as u32 {
                if drop_mask & (1 << (id % 32)) != 0 {
                    continue;
                }
                let written = encoder.encode(id, &mut block).unwrap();
                if decoder.decode(id, &block[..written]).unwrap() == DecodeStatus::Decoded {
                    done = true;
                    break;
                }
            }

            let mut id = n as u32;
            while !done {
                prop_assert!(id < (n + 64) as u32, "did not converge");
                let written = encoder.encode(id, &mut block).unwrap();
                done = decoder.decode(id, &block[..written]).unwrap() == DecodeStatus::Decoded;
                id += 1;
            }

            let mut out = vec![0u8; message.len()];
            decoder.recover(&mut out).unwrap();
            prop_assert_eq!(out, message);
        }
    }
}

// ─── Parameter Validation ───────────────────────────────────────────────────

#[test]
fn rejects_out_of_range_block_counts() {
    setup();

    // One block is too few
    assert!(Encoder::new(&digits(10), 10).is_err());
    assert!(Decoder::new(10, 10).is_err());

    // 64001 blocks is too many
    assert!(Decoder::new(64001, 1).is_err());

    // Degenerate sizes
    assert!(Encoder::new(&[], 8).is_err());
    assert!(Decoder::new(0, 8).is_err());
    assert!(Decoder::new(100, 0).is_err());
}

#[test]
fn decode_rejects_wrong_lengths() {
    setup();
    let mut decoder = Decoder::new(1000, 100).unwrap();

    // Non-final block must be exactly block-size
    assert!(decoder.decode(0, &[0u8; 99]).is_err());
    assert!(decoder.decode(0, &[0u8; 101]).is_err());
    assert!(decoder.decode(0, &[0u8; 100]).is_ok());
}
