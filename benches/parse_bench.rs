//! Performance benchmarks for the bilhete line parser.
//!
//! The parser sits on the ingestion hot path: after an offset reset the
//! whole bilhetes file is re-parsed in one cycle, so per-line cost matters.
//!
//! Run benchmarks with:
//! ```sh
//! cargo bench --bench parse_bench
//! ```

use catraca_bilhetes::parse_line;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

/// A typical entry swipe with a full-width card number.
const ENTRY_LINE: &str = "010 15/10/23 14:05 1234567890123456 03";

/// An exit swipe carrying the optional device sequence counter.
const EXIT_LINE_WITH_SEQ: &str = "011 15/10/23 17:32 0000000000987654 01 004521";

/// A malformed line (missing the turnstile id).
const SHORT_LINE: &str = "010 15/10/23 14:05 1234567890123456";

/// Benchmark parsing a single well-formed line.
fn bench_parse_single(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_single");
    group.throughput(Throughput::Elements(1));

    group.bench_function("entry_line", |b| {
        b.iter(|| {
            let bilhete = parse_line(black_box(ENTRY_LINE)).unwrap();
            black_box(bilhete);
        });
    });

    group.bench_function("exit_line_with_sequence", |b| {
        b.iter(|| {
            let bilhete = parse_line(black_box(EXIT_LINE_WITH_SEQ)).unwrap();
            black_box(bilhete);
        });
    });

    group.finish();
}

/// Benchmark the rejection path for malformed lines.
///
/// Malformed lines are skipped with a warning but still cost a parse
/// attempt each cycle until the offset moves past them.
fn bench_parse_malformed(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_malformed");
    group.throughput(Throughput::Elements(1));

    group.bench_function("short_line", |b| {
        b.iter(|| {
            let result = parse_line(black_box(SHORT_LINE));
            black_box(result.is_err());
        });
    });

    group.finish();
}

/// Benchmark parsing batches the size of a realistic backlog.
fn bench_parse_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_batch");

    for batch_size in [100, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));

        let lines: Vec<String> = (0..*batch_size)
            .map(|i| format!("010 15/10/23 14:05 {:016} {:02}", i, i % 4 + 1))
            .collect();

        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            batch_size,
            |b, _| {
                b.iter(|| {
                    let mut parsed = 0usize;
                    for line in &lines {
                        if parse_line(black_box(line)).is_ok() {
                            parsed += 1;
                        }
                    }
                    black_box(parsed);
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_parse_single,
    bench_parse_malformed,
    bench_parse_batch,
);

criterion_main!(benches);
