use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use cryptcell::cipher::{AesCtr, AesKey, Cipher};
use cryptcell::crypter::{Crypter, Mode2Crypter};
use cryptcell::hash::{Hasher, Sha256Hasher};

fn cipher(seed: u8) -> Box<dyn Cipher> {
    Box::new(AesCtr::new(AesKey::from_bytes(&[seed; 16]).unwrap()))
}

fn hasher() -> Box<dyn Hasher> {
    Box::new(Sha256Hasher::new(b"benchmark hmac key").unwrap())
}

fn crypter() -> Mode2Crypter {
    Mode2Crypter::new(
        hasher(),
        hasher(),
        hasher(),
        hasher(),
        cipher(1),
        cipher(2),
    )
}

fn benchmark_wrap(c: &mut Criterion) {
    let mut group = c.benchmark_group("wrap");
    let mut crypter = crypter();

    // Key sizes dominate the wrapped qualifier, so vary the qualifier.
    let sizes = [("16B", 16), ("256B", 256), ("4KB", 4 * 1024)];
    let row = b"benchmark row";
    let family = b"fam";

    for (name, size) in sizes {
        let qualifier = vec![0u8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(
            criterion::BenchmarkId::new("wrap_qualifier", name),
            &qualifier,
            |b, qualifier| {
                b.iter(|| {
                    crypter
                        .wrap_qualifier(
                            black_box(row),
                            black_box(family),
                            black_box(qualifier),
                            black_box(1_000_000),
                        )
                        .unwrap()
                })
            },
        );
    }
    group.finish();
}

fn benchmark_unwrap(c: &mut Criterion) {
    let mut crypter = crypter();
    let wrapped = crypter
        .wrap_qualifier(b"benchmark row", b"fam", &vec![0u8; 256], 1_000_000)
        .unwrap();

    c.bench_function("unwrap_key_parts_256B", |b| {
        b.iter(|| crypter.unwrap_key_parts(black_box(&wrapped)).unwrap())
    });
}

criterion_group!(benches, benchmark_wrap, benchmark_unwrap);
criterion_main!(benches);
