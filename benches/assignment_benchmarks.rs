//! Assignment and analysis benchmarks
//!
//! Assignment sits on the request path; analysis runs per dashboard refresh.
//!
//! Run with: cargo bench --bench assignment_benchmarks

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use trueno_ab::assignment::{bucket, select_variant, AssignmentEngine};
use trueno_ab::config::EngineConfig;
use trueno_ab::engine::ExperimentEngine;
use trueno_ab::experiment::{Experiment, ExperimentStatus};
use trueno_ab::registry::{ExperimentRegistry, MemoryRegistry};
use trueno_ab::stats::{ArmCounts, BayesianAnalyzer};

const SMALL_SIZE: usize = 1_000;
const MEDIUM_SIZE: usize = 10_000;

fn three_arm() -> Experiment {
    Experiment::builder("bench", "Bench")
        .variant("control", json!({}))
        .variant("variant_1", json!({}))
        .variant("variant_2", json!({}))
        .traffic_allocation(vec![0.5, 0.3, 0.2])
        .build()
        .unwrap()
}

/// Pure hashing + selection, no registry
fn bench_bucket_select(c: &mut Criterion) {
    let exp = three_arm();
    let users: Vec<String> = (0..SMALL_SIZE).map(|i| format!("user_{i}")).collect();

    c.bench_function("bucket_select_1k", |b| {
        b.iter(|| {
            for user in &users {
                black_box(select_variant(&exp, bucket(black_box(user), "bench")));
            }
        });
    });
}

/// Sticky lookups against a populated registry
fn bench_sticky_assign(c: &mut Criterion) {
    let mut group = c.benchmark_group("sticky_assign");

    for size in [SMALL_SIZE, MEDIUM_SIZE] {
        let registry = Arc::new(MemoryRegistry::new());
        registry.create(three_arm()).unwrap();
        registry
            .update_status("bench", ExperimentStatus::Running)
            .unwrap();
        let engine = AssignmentEngine::new(Arc::clone(&registry));
        let users: Vec<String> = (0..size).map(|i| format!("user_{i}")).collect();
        for user in &users {
            engine.assign(user, "bench", None).unwrap();
        }

        group.bench_with_input(BenchmarkId::new("memory_registry", size), &users, |b, users| {
            b.iter(|| {
                for user in users {
                    black_box(engine.assign(user, "bench", None).unwrap());
                }
            });
        });
    }

    group.finish();
}

/// Monte Carlo posterior comparison
fn bench_bayesian(c: &mut Criterion) {
    let mut group = c.benchmark_group("bayesian_analysis");

    for samples in [1_000, 10_000] {
        let analyzer = BayesianAnalyzer::new(samples, Some(42));
        group.bench_with_input(BenchmarkId::new("samples", samples), &analyzer, |b, a| {
            b.iter(|| a.analyze(ArmCounts::new(5_000, 250), ArmCounts::new(5_000, 300)));
        });
    }

    group.finish();
}

/// Full analysis of an experiment with 10k enrolled users
fn bench_full_analysis(c: &mut Criterion) {
    let engine = ExperimentEngine::in_memory(EngineConfig::builder().bayes_seed(1).build());
    engine.create_experiment(three_arm()).unwrap();
    engine.start("bench").unwrap();
    for i in 0..MEDIUM_SIZE {
        let user = format!("user_{i}");
        engine.assign(&user, "bench", None).unwrap();
        if i % 20 == 0 {
            engine.track_conversion(&user, "bench", 25.0).unwrap();
        }
    }

    c.bench_function("analyze_10k_users", |b| {
        b.iter(|| black_box(engine.analyze("bench")));
    });
}

criterion_group!(
    benches,
    bench_bucket_select,
    bench_sticky_assign,
    bench_bayesian,
    bench_full_analysis
);
criterion_main!(benches);
