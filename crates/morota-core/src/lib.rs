//! Scenario loading, configuration and the discrete-time simulation engine
//! for MOROTA.
//!
//! This crate owns the tick cycle that executes an allocation plan: robots
//! move, work and wear out; completed tasks and failed robots trigger
//! incremental re-planning.
//!
//! # Modules
//!
//! - [`clock`] -- Tick counter and fixed time step.
//! - [`config`] -- Configuration loading from `morota-config.yaml` into
//!   strongly-typed structs.
//! - [`scenario`] -- Scenario input and validation.
//! - [`state`] -- [`SimSnapshot`], the state between two ticks.
//! - [`tick`] -- One tick: move, work, detect, re-plan.
//! - [`log`] -- Per-tick records and JSON Lines output.
//! - [`runner`] -- [`Simulation`], the loop around the tick.
//!
//! [`SimSnapshot`]: state::SimSnapshot
//! [`Simulation`]: runner::Simulation

pub mod clock;
pub mod config;
pub mod log;
pub mod runner;
pub mod scenario;
pub mod state;
pub mod tick;

pub use clock::{ClockError, SimClock};
pub use config::{ConfigError, LogFormat, LoggingConfig, MorotaConfig, SimulationSection};
pub use log::{RobotRecord, SimulationLog, TaskRecord, TickEvent, TickRecord};
pub use runner::{
    NoOpCallback, RunnerError, Simulation, SimulationEndReason, SimulationOutcome, TickCallback,
    log_simulation_end, plan_from_scratch,
};
pub use scenario::{Scenario, ScenarioLoadError};
pub use state::{InitialStateError, PendingBuild, RobotState, SimSnapshot};
pub use tick::{TickContext, TickError, TickSummary};
