//! Benchmarks for inference algorithms comparison
//!
//! This benchmark suite compares the performance of different inference methods
//! on Markovian chain models `X_0 → X_1 → ... → X_{n-1}`:
//! - Variable Elimination (exact)
//! - Loopy BP (exact for chains after one sweep)
//! - Credal Variable Elimination (exact, vertex enumeration)
//! - ApproxLp (iterated local linear-fractional programs)

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::collections::BTreeMap;
use std::hint::black_box;
use tensorlogic_credal::{
    CausalInference, CausalVE, CredalCausalApproxLp, CredalCausalVE,
    DirectedAcyclicGraph, EliminationOrdering, Evidence, LoopyBeliefPropagation,
    MessagePassingAlgorithm, StructuralCausalModel, VariableElimination,
};

/// Binary chain with exogenous variables of `exogenous` states each.
fn create_chain_scm(length: usize, exogenous: usize) -> StructuralCausalModel {
    let mut dag = DirectedAcyclicGraph::new();
    for v in 0..length {
        dag.add_variable(v);
        if v > 0 {
            dag.add_link(v - 1, v).unwrap();
        }
    }
    let cards: BTreeMap<usize, usize> = (0..length).map(|v| (v, 2)).collect();
    let sizes: BTreeMap<usize, usize> = (0..length).map(|v| (v, exogenous)).collect();

    let mut scm = StructuralCausalModel::markovian_with_sizes(&dag, &cards, &sizes).unwrap();
    scm.fill_with_random_factors(42, 4).unwrap();
    scm
}

/// Benchmark variable elimination
fn bench_variable_elimination(c: &mut Criterion) {
    let mut group = c.benchmark_group("variable_elimination");

    for length in [5, 10, 20] {
        let scm = create_chain_scm(length, 4);
        let model = scm.model();
        let evidence = Evidence::from([(length - 1, 0)]);
        let mut keep = vec![0];
        keep.extend(evidence.keys());
        let order = EliminationOrdering::default()
            .for_model(model, &keep)
            .unwrap();

        group.throughput(Throughput::Elements(length as u64));
        group.bench_with_input(BenchmarkId::new("chain_length", length), &order, |b, order| {
            b.iter(|| {
                let ve = VariableElimination::from_model(model, order.clone())
                    .unwrap()
                    .with_evidence(evidence.clone());
                black_box(ve.run(&[0]).unwrap());
            });
        });
    }

    group.finish();
}

/// Benchmark loopy belief propagation
fn bench_belief_propagation(c: &mut Criterion) {
    let mut group = c.benchmark_group("loopy_belief_propagation");

    for length in [5, 10, 20] {
        let scm = create_chain_scm(length, 4);
        let evidence = Evidence::from([(length - 1, 0)]);

        group.throughput(Throughput::Elements(length as u64));
        group.bench_with_input(
            BenchmarkId::new("chain_length", length),
            scm.model(),
            |b, model| {
                let lbp = LoopyBeliefPropagation::default();
                b.iter(|| {
                    black_box(lbp.query(model, &evidence, 0).unwrap());
                });
            },
        );
    }

    group.finish();
}

/// Benchmark the credal solvers on the same interventional query
fn bench_credal_solvers(c: &mut Criterion) {
    let mut group = c.benchmark_group("credal_solvers");
    group.sample_size(20);

    for length in [2, 3, 4] {
        let scm = create_chain_scm(length, 3);
        let target = [length - 1];
        let doing = Evidence::from([(0, 1)]);
        let none = Evidence::new();

        let vertex = CredalCausalVE::new(&scm).unwrap();
        group.bench_with_input(BenchmarkId::new("vertex", length), &vertex, |b, inf| {
            b.iter(|| {
                black_box(inf.query(&target, &none, &doing).unwrap());
            });
        });

        let linear = CredalCausalApproxLp::new(&scm).unwrap();
        group.bench_with_input(BenchmarkId::new("approx_lp", length), &linear, |b, inf| {
            b.iter(|| {
                black_box(inf.query(&target, &none, &doing).unwrap());
            });
        });
    }

    group.finish();
}

/// Compare all algorithms on one causal query
fn bench_algorithm_comparison(c: &mut Criterion) {
    let mut group = c.benchmark_group("algorithm_comparison");
    group.sample_size(20);

    let scm = create_chain_scm(3, 3);
    let doing = Evidence::from([(1, 0)]);
    let none = Evidence::new();

    let precise = CausalVE::new(scm.clone());
    group.bench_function("causal_ve", |b| {
        b.iter(|| black_box(precise.query(&[2], &none, &doing).unwrap()));
    });

    let vertex = CredalCausalVE::new(&scm).unwrap();
    group.bench_function("credal_causal_ve", |b| {
        b.iter(|| black_box(vertex.query(&[2], &none, &doing).unwrap()));
    });

    let linear = CredalCausalApproxLp::new(&scm).unwrap();
    group.bench_function("credal_causal_approx_lp", |b| {
        b.iter(|| black_box(linear.query(&[2], &none, &doing).unwrap()));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_variable_elimination,
    bench_belief_propagation,
    bench_credal_solvers,
    bench_algorithm_comparison,
);
criterion_main!(benches);
