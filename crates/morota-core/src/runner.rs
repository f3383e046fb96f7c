//! Simulation loop runner.
//!
//! [`Simulation`] owns everything a run needs: the validated scenario, the
//! performance model, the optimizer and the capability cache. It applies the
//! initial plan, records tick 0, then steps the clock until every task is
//! complete or the tick budget runs out. Running out of ticks is a terminal
//! outcome, not an error.

use morota_model::{CapabilityCache, ConfigurationError, DegradationPolicy, Kinematics, PerformanceModel};
use morota_planner::{Optimizer, PlanOutcome, PlanningProblem};
use morota_types::AllocationPlan;
use rand::rngs::StdRng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::ticks_to_time;
use crate::config::MorotaConfig;
use crate::log::{SimulationLog, TickEvent, TickRecord};
use crate::scenario::{Scenario, ScenarioLoadError};
use crate::state::{InitialStateError, SimSnapshot};
use crate::tick::{self, TickContext, TickError, TickSummary};

/// Errors that can occur during the simulation run.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// A tick execution failed.
    #[error("tick error: {source}")]
    Tick {
        /// The underlying tick error.
        #[from]
        source: TickError,
    },

    /// The configured model parameters are invalid.
    #[error("invalid model configuration: {source}")]
    Model {
        /// The underlying model error.
        #[from]
        source: ConfigurationError,
    },

    /// The scenario does not fit the configured model.
    #[error("invalid scenario: {source}")]
    Scenario {
        /// The underlying scenario error.
        #[from]
        source: ScenarioLoadError,
    },

    /// The initial state could not be built.
    #[error("initial state error: {source}")]
    InitialState {
        /// The underlying error.
        #[from]
        source: InitialStateError,
    },
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SimulationEndReason {
    /// Every task reached its effort.
    AllTasksComplete,
    /// The tick budget ran out with tasks still open.
    SimulationBudgetExceeded,
}

impl core::fmt::Display for SimulationEndReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::AllTasksComplete => f.write_str("all tasks complete"),
            Self::SimulationBudgetExceeded => f.write_str("simulation budget exceeded"),
        }
    }
}

/// Result of a simulation run.
#[derive(Debug)]
pub struct SimulationOutcome {
    /// The reason the simulation ended.
    pub end_reason: SimulationEndReason,
    /// Total number of ticks executed.
    pub total_ticks: u64,
    /// Time of the last completion, or the full budget when tasks remain.
    pub makespan: f64,
    /// One record per tick, starting with tick 0.
    pub log: SimulationLog,
    /// State after the last tick.
    pub final_snapshot: SimSnapshot,
}

/// Callback invoked after each tick completes.
pub trait TickCallback {
    /// Called after a tick completes successfully.
    fn on_tick(&mut self, summary: &TickSummary, snapshot: &SimSnapshot);
}

/// A no-op tick callback.
pub struct NoOpCallback;

impl TickCallback for NoOpCallback {
    fn on_tick(&mut self, _summary: &TickSummary, _snapshot: &SimSnapshot) {}
}

/// A configured, ready-to-run simulation.
#[derive(Debug)]
pub struct Simulation {
    scenario: Scenario,
    model: PerformanceModel,
    kinematics: Kinematics,
    degradation: DegradationPolicy,
    optimizer: Optimizer,
    cache: CapabilityCache,
    max_ticks: u64,
    initial: SimSnapshot,
    initial_plan: AllocationPlan,
}

impl Simulation {
    /// Prepare a run of `initial_plan` over `scenario`.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError`] if the configuration does not build a valid
    /// model, the scenario does not fit it, or the time step is invalid.
    pub fn new(scenario: Scenario, config: &MorotaConfig, initial_plan: AllocationPlan) -> Result<Self, RunnerError> {
        let model = config.build_model()?;
        scenario.validate(model.dimension_count())?;
        let initial = SimSnapshot::initial(&scenario, config.simulation.time_step)?;
        Ok(Self {
            scenario,
            model,
            kinematics: config.kinematics,
            degradation: config.degradation.clone(),
            optimizer: Optimizer::new(config.optimizer.clone()),
            cache: CapabilityCache::new(),
            max_ticks: config.simulation.max_ticks,
            initial,
            initial_plan,
        })
    }

    /// The scenario being simulated.
    pub const fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    /// Run to completion without a callback.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Tick`] if a tick fails.
    pub fn run(self, rng: &mut StdRng) -> Result<SimulationOutcome, RunnerError> {
        self.run_with_callback(rng, &mut NoOpCallback)
    }

    /// Run to completion, calling `callback` after every tick.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Tick`] if a tick fails.
    pub fn run_with_callback(
        mut self,
        rng: &mut StdRng,
        callback: &mut dyn TickCallback,
    ) -> Result<SimulationOutcome, RunnerError> {
        let mut ctx = TickContext {
            model: &self.model,
            kinematics: &self.kinematics,
            degradation: &self.degradation,
            optimizer: &self.optimizer,
            templates: &self.scenario.templates,
            depot: self.scenario.depot,
            cache: &mut self.cache,
            rng,
        };

        info!(
            scenario = %self.scenario.name,
            robots = self.scenario.max_robots,
            tasks = self.scenario.tasks.len(),
            modules = self.scenario.modules.len(),
            max_ticks = self.max_ticks,
            dimensions = ?self.model.dimension_names(),
            "Starting simulation"
        );

        let mut snapshot = self.initial;
        let mut events: Vec<TickEvent> = Vec::new();
        tick::assemble(&mut snapshot, &self.initial_plan, &mut ctx, &mut events)?;
        snapshot.plan = self.initial_plan;

        let mut log = SimulationLog::new();
        log.push(TickRecord::capture(&snapshot, events));

        let end_reason = loop {
            if snapshot.all_tasks_complete() {
                break SimulationEndReason::AllTasksComplete;
            }
            if snapshot.clock.tick() >= self.max_ticks {
                break SimulationEndReason::SimulationBudgetExceeded;
            }
            let (next, summary) = tick::step(&snapshot, &mut ctx)?;
            snapshot = next;
            callback.on_tick(&summary, &snapshot);
            log.push(TickRecord::capture(&snapshot, summary.events));
        };

        let (cache_hits, cache_misses) = self.cache.stats();
        debug!(
            cache_hits,
            cache_misses,
            compositions = self.cache.len(),
            "capability cache"
        );

        let makespan = match end_reason {
            SimulationEndReason::AllTasksComplete => snapshot.completed.values().copied().fold(0.0, f64::max),
            SimulationEndReason::SimulationBudgetExceeded => {
                ticks_to_time(self.max_ticks, snapshot.clock.time_step())
            }
        };
        let outcome = SimulationOutcome {
            end_reason,
            total_ticks: snapshot.clock.tick(),
            makespan,
            log,
            final_snapshot: snapshot,
        };
        log_simulation_end(&outcome);
        Ok(outcome)
    }
}

/// Plan a scenario from scratch with the configured optimizer.
///
/// The problem is built from the scenario's initial state: every bay empty
/// at the depot and every module pooled.
///
/// # Errors
///
/// Returns [`RunnerError`] if the configuration or scenario is invalid.
pub fn plan_from_scratch(
    scenario: &Scenario,
    config: &MorotaConfig,
    rng: &mut StdRng,
) -> Result<PlanOutcome, RunnerError> {
    let model = config.build_model()?;
    scenario.validate(model.dimension_count())?;
    let snapshot = SimSnapshot::initial(scenario, config.simulation.time_step)?;
    let problem = PlanningProblem::new(
        &model,
        &config.kinematics,
        &scenario.templates,
        &snapshot.pool,
        scenario.depot,
        snapshot.bays(),
        snapshot.open_tasks.values(),
    );
    let outcome = Optimizer::new(config.optimizer.clone()).plan_from_scratch(&problem, rng);
    if let Some(warning) = &outcome.warning {
        warn!(
            infeasible = warning.infeasible_tasks.len(),
            stripped = warning.stripped_assignments.len(),
            "initial plan leaves tasks infeasible"
        );
    }
    Ok(outcome)
}

/// Log the final simulation result.
pub fn log_simulation_end(outcome: &SimulationOutcome) {
    info!(
        reason = %outcome.end_reason,
        total_ticks = outcome.total_ticks,
        makespan = outcome.makespan,
        completed = outcome.final_snapshot.completed.len(),
        open = outcome.final_snapshot.open_tasks.len(),
        "Simulation ended"
    );
    if outcome.total_ticks == 0 && outcome.end_reason == SimulationEndReason::SimulationBudgetExceeded {
        warn!("Simulation ended with no ticks executed");
    }
}
