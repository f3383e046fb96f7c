//! Optimizer entry points: plan from scratch or re-plan incrementally.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use morota_types::{AllocationPlan, RobotId, TaskFeasibility, TaskId};
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use crate::candidate::{Candidate, Fitness, Materialized, SearchSpace};
use crate::config::OptimizerConfig;
use crate::problem::{PlanDelta, PlanningProblem};
use crate::search::{Population, evolve, initial_population};

/// The optimizer returned a plan that leaves some tasks without a capable
/// robot or had to strip assignments.
///
/// This is carried inside [`PlanOutcome`]; it is never returned as an `Err`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "{} task(s) infeasible for the planned fleet, {} assignment(s) stripped",
    .infeasible_tasks.len(),
    .stripped_assignments.len()
)]
pub struct InfeasiblePlanWarning {
    /// Tasks no robot of the planned fleet can serve.
    pub infeasible_tasks: Vec<TaskId>,
    /// Assignments removed because the robot did not meet the requirement.
    pub stripped_assignments: Vec<(RobotId, TaskId)>,
}

/// Result of one optimizer call.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanOutcome {
    /// The plan to execute. Every assignment in it is feasible.
    pub plan: AllocationPlan,
    /// Verdict for every open task.
    pub feasibility: BTreeMap<TaskId, TaskFeasibility>,
    /// Objective of the returned plan.
    pub objective: f64,
    /// Generations actually run.
    pub generations: u32,
    /// Present when tasks are infeasible or assignments were stripped.
    pub warning: Option<InfeasiblePlanWarning>,
}

impl PlanOutcome {
    /// Tasks with the given verdict, in id order.
    pub fn tasks_with(&self, verdict: TaskFeasibility) -> Vec<TaskId> {
        self.feasibility
            .iter()
            .filter(|&(_, &v)| v == verdict)
            .map(|(&t, _)| t)
            .collect()
    }
}

/// Evolutionary configuration optimizer.
#[derive(Debug, Clone, Default)]
pub struct Optimizer {
    config: OptimizerConfig,
}

impl Optimizer {
    /// Create an optimizer with the given parameters.
    pub const fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    /// The optimizer's parameters.
    pub const fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Plan every bay from scratch.
    pub fn plan_from_scratch(&self, problem: &PlanningProblem<'_>, rng: &mut StdRng) -> PlanOutcome {
        let space = SearchSpace::from_scratch(problem, &self.config);
        self.search(&space, rng)
    }

    /// Re-plan after `delta`.
    ///
    /// Busy robots on still-open tasks keep their modules and task; idle,
    /// failed and empty bays are re-planned. An empty delta returns
    /// `previous` unchanged without touching `rng`.
    pub fn replan_incremental(
        &self,
        previous: &AllocationPlan,
        problem: &PlanningProblem<'_>,
        delta: &PlanDelta,
        rng: &mut StdRng,
    ) -> PlanOutcome {
        let space = SearchSpace::incremental(problem, &self.config, delta);
        if delta.is_empty() {
            let keep = space.keep_candidate();
            let objective = space.fitness(&keep).total();
            let feasibility = space
                .materialize(&keep)
                .map(|m| m.feasibility)
                .unwrap_or_default();
            debug!("empty plan delta, keeping previous plan");
            return PlanOutcome {
                plan: previous.clone(),
                warning: warning_for(&feasibility, Vec::new()),
                feasibility,
                objective,
                generations: 0,
            };
        }
        debug!(
            failed = delta.failed_robots.len(),
            opened = delta.opened_tasks.len(),
            closed = delta.closed_tasks.len(),
            free_bays = space.gene_count(),
            "incremental re-plan"
        );
        self.search(&space, rng)
    }

    fn search(&self, space: &SearchSpace<'_>, rng: &mut StdRng) -> PlanOutcome {
        let mut population = initial_population(space, rng);
        let mut best = population.best().map_or(Fitness::WORST, |s| s.fitness);
        let mut stalled = 0_u32;
        let mut generations = 0_u32;

        while generations < self.config.generations {
            let (next, metrics) = evolve(&population, space, rng);
            population = next;
            generations = generations.saturating_add(1);
            debug!(
                generation = generations,
                best = metrics.best_objective,
                mean = metrics.mean_objective,
                "generation complete"
            );
            if metrics.best_fitness.compare(best) == Ordering::Less {
                best = metrics.best_fitness;
                stalled = 0;
            } else {
                stalled = stalled.saturating_add(1);
                if stalled >= self.config.stall_generations {
                    break;
                }
            }
        }

        let (materialized, objective) = best_materialized(space, &population);
        let warning = warning_for(&materialized.feasibility, materialized.stripped);
        let outcome = PlanOutcome {
            plan: materialized.plan,
            feasibility: materialized.feasibility,
            objective,
            generations,
            warning,
        };
        info!(
            generations,
            objective,
            assigned = outcome.tasks_with(TaskFeasibility::Assigned).len(),
            deferred = outcome.tasks_with(TaskFeasibility::Deferred).len(),
            infeasible = outcome.tasks_with(TaskFeasibility::Infeasible).len(),
            builds = outcome.plan.builds.len(),
            "plan ready"
        );
        if let Some(w) = &outcome.warning {
            warn!(warning = %w, "plan is not fully feasible");
        }
        outcome
    }
}

/// Materialize the best member that decodes, falling back to keeping
/// every bay as it is.
fn best_materialized(space: &SearchSpace<'_>, population: &Population) -> (Materialized, f64) {
    let chosen = population
        .members()
        .iter()
        .filter(|s| s.fitness.total().is_finite())
        .find_map(|s| space.materialize(&s.candidate).ok().map(|m| (m, s.fitness.total())));
    if let Some(found) = chosen {
        return found;
    }
    let keep: Candidate = space.keep_candidate();
    let objective = space.fitness(&keep).total();
    let materialized = space.materialize(&keep).unwrap_or_else(|err| {
        warn!(error = %err, "could not materialize an unchanged fleet");
        Materialized {
            plan: AllocationPlan::new(),
            feasibility: space
                .problem()
                .tasks()
                .iter()
                .map(|t| (t.id, TaskFeasibility::Infeasible))
                .collect(),
            stripped: Vec::new(),
        }
    });
    (materialized, objective)
}

fn warning_for(
    feasibility: &BTreeMap<TaskId, TaskFeasibility>,
    stripped_assignments: Vec<(RobotId, TaskId)>,
) -> Option<InfeasiblePlanWarning> {
    let infeasible_tasks: Vec<TaskId> = feasibility
        .iter()
        .filter(|&(_, &v)| v == TaskFeasibility::Infeasible)
        .map(|(&t, _)| t)
        .collect();
    if infeasible_tasks.is_empty() && stripped_assignments.is_empty() {
        None
    } else {
        Some(InfeasiblePlanWarning {
            infeasible_tasks,
            stripped_assignments,
        })
    }
}
