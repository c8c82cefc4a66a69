use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use esa_core::tfidf::{normalize_row, prune_row, weight_row};

/// A dense count row with a steep head and a long flat tail.
fn counts_row(n: usize) -> Vec<f64> {
    (0..n).map(|i| if i % 3 == 0 { 0.0 } else { 1.0 + (1000.0 / (1.0 + i as f64)).floor() }).collect()
}

fn bench_row_transform(c: &mut Criterion) {
    let row = counts_row(20_000);
    c.bench_function("weight_normalize_row_20k", |b| {
        b.iter_batched(
            || row.clone(),
            |mut r| {
                weight_row(&mut r, 50_000);
                normalize_row(&mut r);
                black_box(r)
            },
            BatchSize::SmallInput,
        )
    });

    let mut weighted = row.clone();
    weight_row(&mut weighted, 50_000);
    normalize_row(&mut weighted);
    c.bench_function("prune_row_20k", |b| {
        b.iter_batched(
            || weighted.clone(),
            |mut r| black_box(prune_row(&mut r, 100, 0.95)),
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_row_transform);
criterion_main!(benches);
