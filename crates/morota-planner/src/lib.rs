//! Configuration optimizer for MOROTA.
//!
//! Decides which robot bays to (re)build from which template, using modules
//! from the pool, and which open task each robot should work on. The search
//! is a seeded genetic algorithm whose generation step is a pure transform
//! of `(population, rng)`.
//!
//! # Modules
//!
//! - [`config`] -- Search and objective parameters
//! - [`problem`] -- Planning inputs: bays, pool, tasks, plan deltas
//! - [`candidate`] -- Encoding, decoding, scoring, materialization
//! - [`operators`] -- Greedy seed, tournament, crossover, mutation, repair
//! - [`search`] -- Populations and the generation step
//! - [`optimizer`] -- From-scratch and incremental entry points

pub mod candidate;
pub mod config;
pub mod operators;
pub mod optimizer;
pub mod problem;
pub mod search;

pub use candidate::{Candidate, Evaluation, Fitness, Gene, Materialized, SearchSpace};
pub use config::OptimizerConfig;
pub use optimizer::{InfeasiblePlanWarning, Optimizer, PlanOutcome};
pub use problem::{Bay, PlanDelta, PlanningProblem, Rebuild};
pub use search::{GenerationMetrics, Population, Scored, evolve, initial_population};
