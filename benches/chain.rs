use bytechain::Chain;
use bytes::Bytes;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

fn append_small(c: &mut Criterion) {
    let mut group = c.benchmark_group("append_small");
    group.bench_function("chain", |b| {
        b.iter(|| {
            let mut chain = Chain::new();
            for _ in 0..1000 {
                chain.append(&b"abcdefghij"[..]);
            }
            chain
        });
    });
    group.bench_function("vec", |b| {
        b.iter(|| {
            let mut vec = Vec::new();
            for _ in 0..1000 {
                vec.extend_from_slice(b"abcdefghij");
            }
            vec
        });
    });
}

fn append_shared(c: &mut Criterion) {
    let mut group = c.benchmark_group("append_shared");
    group.bench_function("chain", |b| {
        let big = Chain::from(vec![0u8; 64 << 10]);
        b.iter_batched(
            Chain::new,
            |mut chain| {
                for _ in 0..16 {
                    chain.append(&big);
                }
                chain
            },
            BatchSize::SmallInput,
        );
    });
    group.bench_function("bytes", |b| {
        let big = Bytes::from(vec![0u8; 64 << 10]);
        b.iter_batched(
            Vec::new,
            |mut vec: Vec<u8>| {
                for _ in 0..16 {
                    vec.extend_from_slice(&big);
                }
                vec
            },
            BatchSize::SmallInput,
        );
    });
}

fn flatten(c: &mut Criterion) {
    let mut group = c.benchmark_group("flatten");
    group.bench_function("chain", |b| {
        b.iter_batched(
            || {
                let mut chain = Chain::new();
                for _ in 0..64 {
                    chain.append(vec![1u8; 1024]);
                }
                chain
            },
            |mut chain| {
                chain.flatten();
                chain
            },
            BatchSize::SmallInput,
        );
    });
}

fn remove_prefix(c: &mut Criterion) {
    let mut group = c.benchmark_group("remove_prefix");
    group.bench_function("chain", |b| {
        b.iter_batched(
            || Chain::from(vec![0u8; 64 << 10]),
            |mut chain| {
                while chain.len() > 1024 {
                    chain.remove_prefix(1024);
                }
                chain
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, append_small, append_shared, flatten, remove_prefix);
criterion_main!(benches);
