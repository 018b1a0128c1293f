//! Benchmarks for factor operations
//!
//! This benchmark suite measures the performance of core factor operations including:
//! - Combine (point, interval and vertex factors)
//! - Marginalization (summing out variables)
//! - Filtering (conditioning on evidence)
//! - Normalization
//! - Credal conversions (vertex enumeration, pruning, LP bounds)

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use tensorlogic_credal::factor::convert::{
    halfspace_to_interval, halfspace_to_vertex, interval_to_halfspace,
};
use tensorlogic_credal::{
    BayesianFactor, Domain, FactorOps, IntervalFactor, SimplexSolver, VertexFactor,
};

/// Create a factor with specified cardinality per variable
fn create_factor_with_card(vars: &[usize], card: usize) -> BayesianFactor {
    let domain = Domain::new(vars, &vec![card; vars.len()]).unwrap();
    let size = domain.size();
    let values: Vec<f64> = (0..size).map(|i| (i as f64 + 1.0) / size as f64).collect();
    BayesianFactor::new(domain, values).unwrap()
}

/// Interval prior over one variable, wide enough to have many vertices
fn create_interval_prior(card: usize) -> IntervalFactor {
    let mid = 1.0 / card as f64;
    IntervalFactor::new(
        Domain::var(0, card),
        Domain::empty(),
        vec![mid * 0.5; card],
        vec![(mid * 1.5).min(1.0); card],
    )
    .unwrap()
}

/// Benchmark combine operations
fn bench_combine(c: &mut Criterion) {
    let mut group = c.benchmark_group("combine");

    let f1 = create_factor_with_card(&[0, 1], 2);
    let f2 = create_factor_with_card(&[1, 2], 2);
    group.throughput(Throughput::Elements(8));
    group.bench_function("overlapping_binary", |b| {
        b.iter(|| black_box(f1.combine(&f2).unwrap()));
    });

    for card in [2, 4, 8] {
        let a = create_factor_with_card(&[0, 1, 2], card);
        let b2 = create_factor_with_card(&[2, 3, 4], card);
        group.throughput(Throughput::Elements(card.pow(5) as u64));
        group.bench_with_input(BenchmarkId::new("three_by_three", card), &card, |b, _| {
            b.iter(|| black_box(a.combine(&b2).unwrap()));
        });
    }

    let i1 = IntervalFactor::from_point(&f1, Domain::empty()).unwrap();
    let i2 = IntervalFactor::from_point(&f2, Domain::empty()).unwrap();
    group.bench_function("interval_overlapping_binary", |b| {
        b.iter(|| black_box(i1.combine(&i2).unwrap()));
    });

    let prior = create_interval_prior(4);
    let vertices = halfspace_to_vertex(&interval_to_halfspace(&prior).unwrap()).unwrap();
    let child = VertexFactor::from_point(&create_factor_with_card(&[0, 1], 4), Domain::var(0, 4))
        .unwrap();
    group.bench_function("vertex_prior_times_child", |b| {
        b.iter(|| black_box(vertices.combine(&child).unwrap()));
    });

    group.finish();
}

/// Benchmark marginalization
fn bench_marginalization(c: &mut Criterion) {
    let mut group = c.benchmark_group("marginalization");

    for num_vars in [2, 4, 6, 8] {
        let vars: Vec<usize> = (0..num_vars).collect();
        let factor = create_factor_with_card(&vars, 2);

        group.throughput(Throughput::Elements(1 << num_vars));
        group.bench_with_input(
            BenchmarkId::new("binary_vars", num_vars),
            &factor,
            |b, f| {
                b.iter(|| black_box(f.marginalize(0).unwrap()));
            },
        );
    }

    let factor = create_factor_with_card(&[0, 1, 2, 3], 3);
    group.bench_function("marginalize_to_one", |b| {
        b.iter(|| black_box(factor.marginalize_to(&[3]).unwrap()));
    });

    group.finish();
}

/// Benchmark filtering (evidence)
fn bench_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter");

    for num_vars in [2, 4, 6, 8] {
        let vars: Vec<usize> = (0..num_vars).collect();
        let factor = create_factor_with_card(&vars, 2);

        group.bench_with_input(
            BenchmarkId::new("binary_vars", num_vars),
            &factor,
            |b, f| {
                b.iter(|| black_box(f.filter(num_vars - 1, 1).unwrap()));
            },
        );
    }

    group.finish();
}

/// Benchmark normalization
fn bench_normalization(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalization");

    for card in [2, 8, 32] {
        let factor = create_factor_with_card(&[0, 1], card);
        group.bench_with_input(BenchmarkId::new("point", card), &factor, |b, f| {
            b.iter(|| black_box(f.normalize().unwrap()));
        });

        let interval = IntervalFactor::from_point(&factor, Domain::empty()).unwrap();
        group.bench_with_input(BenchmarkId::new("interval", card), &interval, |b, f| {
            b.iter(|| black_box(f.normalize().unwrap()));
        });
    }

    group.finish();
}

/// Benchmark credal conversions
fn bench_credal_conversions(c: &mut Criterion) {
    let mut group = c.benchmark_group("credal_conversions");
    let solver = SimplexSolver::default();

    for card in [2, 3, 4, 5] {
        let polytope = interval_to_halfspace(&create_interval_prior(card)).unwrap();

        group.bench_with_input(BenchmarkId::new("enumerate_vertices", card), &polytope, |b, p| {
            b.iter(|| black_box(halfspace_to_vertex(p).unwrap()));
        });

        group.bench_with_input(BenchmarkId::new("lp_bounds", card), &polytope, |b, p| {
            b.iter(|| black_box(halfspace_to_interval(p, &solver).unwrap()));
        });

        let vertices = halfspace_to_vertex(&polytope).unwrap();
        group.bench_with_input(BenchmarkId::new("prune", card), &vertices, |b, v| {
            b.iter(|| black_box(v.prune(&solver).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_combine,
    bench_marginalization,
    bench_filter,
    bench_normalization,
    bench_credal_conversions
);
criterion_main!(benches);
