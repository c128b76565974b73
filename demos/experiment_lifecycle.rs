//! Experiment Lifecycle Example
//!
//! Runs a pricing test end to end: create, enrol simulated traffic, analyze,
//! derive decisions and apply them.
//!
//! Run with: RUST_LOG=trueno_ab=debug cargo run --example experiment_lifecycle

use anyhow::Context;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use tracing_subscriber::EnvFilter;
use trueno_ab::config::EngineConfig;
use trueno_ab::engine::ExperimentEngine;

/// True conversion probability per variant in the simulation.
fn true_rate(variant: &str) -> f64 {
    match variant {
        "variant_1" => 0.065,
        "variant_2" => 0.045,
        _ => 0.05,
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("trueno_ab=info".parse()?))
        .init();

    println!("=== Trueno-AB Experiment Lifecycle ===\n");

    let engine = ExperimentEngine::in_memory(EngineConfig::builder().bayes_seed(42).build());

    // -------------------------------------------------------------------------
    // 1. Create a pricing experiment
    // -------------------------------------------------------------------------
    println!("1. Creating pricing experiment...");

    let experiment_id =
        engine.create_pricing_experiment("Premium plan price", 49.0, &[44.0, 54.0], 1000)?;
    let experiment = engine.start(&experiment_id)?;

    println!("   Experiment ID: {experiment_id}");
    for (variant, share) in experiment.variants().iter().zip(experiment.traffic_allocation()) {
        println!("   {:<10} share {share:.3} config {}", variant.name(), variant.config());
    }
    println!("   Target sample size: {}", experiment.target_sample_size());

    // -------------------------------------------------------------------------
    // 2. Simulate traffic
    // -------------------------------------------------------------------------
    println!("\n2. Enrolling 30,000 simulated users...");

    let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
    for i in 0..30_000 {
        let user = format!("user_{i}");
        let variant = engine.assign(&user, &experiment_id, None)?;
        if rng.random::<f64>() < true_rate(variant.name()) {
            let price = variant.config()["price"].as_f64().context("price missing")?;
            engine.track_conversion(&user, &experiment_id, price)?;
        }
    }

    // -------------------------------------------------------------------------
    // 3. Analyze
    // -------------------------------------------------------------------------
    println!("\n3. Analysis");

    let analysis = engine.try_analyze(&experiment_id)?;
    println!(
        "   {:<10} n={:<6} cr={:.4} rpu={:.3}",
        analysis.control.name,
        analysis.control.participants,
        analysis.control.conversion_rate,
        analysis.control.revenue_per_user
    );
    for v in &analysis.variants {
        println!(
            "   {:<10} n={:<6} cr={:.4} rpu={:.3} p={:.4} P(better)={:.3}{}",
            v.arm.name,
            v.arm.participants,
            v.arm.conversion_rate,
            v.arm.revenue_per_user,
            v.significance.p_value,
            v.bayesian.probability_variant_better,
            if v.is_winner { "  <- winner" } else { "" }
        );
    }
    for recommendation in &analysis.recommendations {
        println!("   * {recommendation}");
    }

    // -------------------------------------------------------------------------
    // 4. Decide and apply
    // -------------------------------------------------------------------------
    println!("\n4. Decisions");

    let report = engine.optimize(&experiment_id)?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    let experiment = engine.apply_actions(&experiment_id, &report.actions)?;
    println!(
        "\n   Status: {}  allocation: {:?}  config version: {}",
        experiment.status(),
        experiment.traffic_allocation(),
        experiment.config_version()
    );

    println!("\n=== Done ===");
    Ok(())
}
