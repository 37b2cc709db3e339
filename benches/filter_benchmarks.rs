//! Performance benchmarks for the hot paths of the enumeration engine.
//!
//! The acceptance filter sits in front of every discovered name, and
//! request validation runs on every payload a data source emits; both
//! need to stay cheap at high resolver QPS.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use subsleuth::filter::StableBloomFilter;
use subsleuth::requests::{AddrRequest, NameRequest, Tag};

fn bench_filter_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("stable_bloom_insert");
    for size in [10_000usize, 100_000, 1_000_000] {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let filter = StableBloomFilter::new(size, 0.01);
            let mut i = 0u64;
            b.iter(|| {
                i += 1;
                filter.add(black_box(format!("host-{i}.example.com").as_bytes()));
            });
        });
    }
    group.finish();
}

fn bench_filter_lookup(c: &mut Criterion) {
    let filter = StableBloomFilter::new(1_000_000, 0.01);
    for i in 0..50_000u32 {
        filter.add(format!("host-{i}.example.com").as_bytes());
    }

    c.bench_function("stable_bloom_lookup_hit", |b| {
        b.iter(|| filter.test(black_box(b"host-1234.example.com")));
    });
    c.bench_function("stable_bloom_lookup_miss", |b| {
        b.iter(|| filter.test(black_box(b"absent.example.org")));
    });
}

fn bench_request_validation(c: &mut Criterion) {
    c.bench_function("name_request_sanitize", |b| {
        b.iter(|| {
            let mut req = NameRequest::new(
                black_box("*.Some.Deeply.Nested.Host.Example.COM."),
                "example.com",
                Tag::Scrape,
                "bench",
            );
            req.sanitize();
            req.valid()
        });
    });

    c.bench_function("addr_request_valid", |b| {
        b.iter(|| {
            AddrRequest::new(black_box("192.0.2.10"), "example.com", Tag::Dns, "bench").valid()
        });
    });
}

criterion_group!(
    benches,
    bench_filter_insert,
    bench_filter_lookup,
    bench_request_validation
);
criterion_main!(benches);
