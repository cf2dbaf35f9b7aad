use cimbar_rateless::{DecodeStatus, Decoder, Encoder};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

fn bench_message(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i as u32).wrapping_mul(2654435761) as u8).collect()
}

/// Benchmark encoder creation (the full matrix solve) and block output.
fn bench_encode(c: &mut Criterion) {
    cimbar_rateless::init().unwrap();

    const BLOCK: usize = 1296;
    let message = bench_message(100 * BLOCK);

    let mut group = c.benchmark_group("encoder");
    group.throughput(Throughput::Bytes(message.len() as u64));

    group.bench_function("create_n100", |b| {
        b.iter(|| Encoder::new(black_box(&message), BLOCK).unwrap());
    });

    let encoder = Encoder::new(&message, BLOCK).unwrap();
    let mut block = vec![0u8; BLOCK];

    group.throughput(Throughput::Bytes(BLOCK as u64));
    group.bench_function("encode_recovery_block", |b| {
        let mut id = 100u32;
        b.iter(|| {
            encoder.encode(black_box(id), &mut block).unwrap();
            id += 1;
        });
    });

    group.finish();
}

/// Benchmark a full decode from recovery blocks only.
fn bench_decode(c: &mut Criterion) {
    cimbar_rateless::init().unwrap();

    const BLOCK: usize = 1296;
    let message = bench_message(100 * BLOCK);
    let encoder = Encoder::new(&message, BLOCK).unwrap();

    // Pre-encode a pool of recovery blocks
    let mut pool = Vec::new();
    for id in 100u32..220 {
        let mut block = vec![0u8; BLOCK];
        let n = encoder.encode(id, &mut block).unwrap();
        block.truncate(n);
        pool.push((id, block));
    }

    let mut group = c.benchmark_group("decoder");
    group.throughput(Throughput::Bytes(message.len() as u64));

    group.bench_function("decode_n100_recovery_only", |b| {
        b.iter(|| {
            let mut decoder = Decoder::new(message.len() as u64, BLOCK).unwrap();
            for (id, block) in &pool {
                if decoder.decode(*id, block).unwrap() == DecodeStatus::Decoded {
                    break;
                }
            }
            let mut out = vec![0u8; message.len()];
            decoder.recover(&mut out).unwrap();
            black_box(out);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
