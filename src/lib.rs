//! # Trueno-AB: Deterministic A/B Experimentation Engine
//!
//! Trueno-AB splits traffic between product variants, records exposures and
//! conversions, and decides when a variant has won.
//!
//! ## Components
//!
//! - **Registry**: experiments, assignments, events and a results cache
//!   behind the [`registry::ExperimentRegistry`] trait
//! - **Assignment**: SHA-256 bucketing; same inputs, same variant, no
//!   coordination between callers
//! - **Statistics**: two-proportion z-test, Beta-posterior Monte Carlo,
//!   sample-size planning; numerical trouble degrades instead of failing
//! - **Decisions**: early stop, traffic reallocation, duration extension
//!
//! ## Example Usage
//!
//! ```rust
//! use serde_json::json;
//! use trueno_ab::config::EngineConfig;
//! use trueno_ab::engine::ExperimentEngine;
//! use trueno_ab::experiment::Experiment;
//!
//! let engine = ExperimentEngine::in_memory(EngineConfig::default());
//! engine.create_experiment(
//!     Experiment::builder("checkout-copy", "Checkout copy")
//!         .variant("control", json!({"copy": "Buy now"}))
//!         .variant("variant_1", json!({"copy": "Get yours"}))
//!         .build()?,
//! )?;
//! engine.start("checkout-copy")?;
//!
//! let variant = engine.assign("user-42", "checkout-copy", None)?;
//! engine.track_conversion("user-42", "checkout-copy", 19.99)?;
//! assert!(variant.name() == "control" || variant.name() == "variant_1");
//! # Ok::<(), trueno_ab::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod analysis;
pub mod assignment;
pub mod config;
pub mod decision;
pub mod engine;
pub mod error;
pub mod experiment;
pub mod registry;
pub mod stats;

pub use error::{Error, Result};
