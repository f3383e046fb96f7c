//! Candidate encoding, decoding and scoring.
//!
//! A candidate carries one [`Gene`] per free bay. The configuration half
//! says whether to (re)build the bay from a template; the assignment half
//! names an open task. Locked bays are not encoded; they keep their
//! modules and task. A bay whose rebuild is already under way is encoded
//! for its task only.
//!
//! A rebuild keeps the bay's own modules where the template uses them and
//! draws the shortfall from the pool, lowest ids first, bay by bay in id
//! order. The simulator applies builds in the same order, so module ids
//! chosen here are always available there. A rebuilt robot is ready once it
//! is back at the depot and reassembled.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use morota_model::{ConfigurationError, ModulePool, compare_costs, feasible};
use morota_types::{
    AllocationPlan, CapabilityVector, Composition, Module, ModuleId, ModuleType, Position, RobotBuild, RobotId,
    RobotTemplate, TaskFeasibility, TaskId,
};

use crate::config::OptimizerConfig;
use crate::problem::{Bay, PlanDelta, PlanningProblem};

/// Genes for one free bay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Gene {
    /// Template index to (re)build from, or `None` to keep the bay as is.
    pub build: Option<usize>,
    /// Index of the open task to work on, or `None` to stay idle.
    pub task: Option<usize>,
}

/// One point in the search space.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Candidate {
    /// One gene per free bay, aligned with [`SearchSpace::free_bays`].
    pub genes: Vec<Gene>,
}

/// A planning problem split into bays the search may change and bays it
/// must keep.
#[derive(Debug)]
pub struct SearchSpace<'a> {
    problem: &'a PlanningProblem<'a>,
    config: &'a OptimizerConfig,
    free: Vec<usize>,
    locked: Vec<usize>,
}

/// A decoded robot: where it will be, from when, and what it can do.
#[derive(Debug, Clone)]
pub(crate) struct Member {
    pub(crate) id: RobotId,
    pub(crate) capability: Option<CapabilityVector>,
    pub(crate) position: Position,
    /// Time before the robot can set off from `position`.
    pub(crate) ready: f64,
    pub(crate) task: Option<usize>,
    pub(crate) rebuilt: bool,
}

/// Lexicographic score: weighted penalties first, then time.
///
/// Any drop in penalty outweighs any rise in cost, so a servable task is
/// served however long it takes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fitness {
    /// Weighted unserved and infeasible counts.
    pub penalty: f64,
    /// Estimated makespan plus rebuild cost.
    pub cost: f64,
}

impl Fitness {
    /// Score of a candidate that does not decode.
    pub const WORST: Self = Self {
        penalty: f64::INFINITY,
        cost: f64::INFINITY,
    };

    /// Order by penalty, then by cost. NaN sorts last.
    pub fn compare(self, other: Self) -> Ordering {
        compare_costs(self.penalty, other.penalty).then_with(|| compare_costs(self.cost, other.cost))
    }

    /// Penalty plus cost, reported as the plan objective.
    pub fn total(self) -> f64 {
        self.penalty + self.cost
    }
}

/// Objective breakdown for one candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    /// Lexicographic score used by the search.
    pub fitness: Fitness,
    /// `fitness.total()`, lower is better.
    pub objective: f64,
    /// Open tasks no feasible robot works on.
    pub unserved: usize,
    /// Assignments whose robot does not meet the requirement.
    pub infeasible: usize,
    /// Bays rebuilt.
    pub rebuilds: usize,
    /// Estimated time until the last served task completes.
    pub makespan: f64,
}

/// A candidate turned into a concrete plan.
#[derive(Debug, Clone)]
pub struct Materialized {
    /// The plan with infeasible assignments removed.
    pub plan: AllocationPlan,
    /// Verdict per open task.
    pub feasibility: BTreeMap<TaskId, TaskFeasibility>,
    /// Assignments removed because the robot could not meet the requirement.
    pub stripped: Vec<(RobotId, TaskId)>,
}

impl<'a> SearchSpace<'a> {
    /// Every bay is free.
    pub fn from_scratch(problem: &'a PlanningProblem<'a>, config: &'a OptimizerConfig) -> Self {
        Self {
            problem,
            config,
            free: (0..problem.bays().len()).collect(),
            locked: Vec::new(),
        }
    }

    /// Busy robots on still-open tasks are locked; the rest are free.
    pub fn incremental(
        problem: &'a PlanningProblem<'a>,
        config: &'a OptimizerConfig,
        delta: &PlanDelta,
    ) -> Self {
        let (locked, free): (Vec<usize>, Vec<usize>) = (0..problem.bays().len())
            .partition(|&i| problem.bays().get(i).is_some_and(|b| problem.is_locked(b, delta)));
        Self {
            problem,
            config,
            free,
            locked,
        }
    }

    /// The underlying problem.
    pub const fn problem(&self) -> &'a PlanningProblem<'a> {
        self.problem
    }

    /// Optimizer parameters.
    pub const fn config(&self) -> &'a OptimizerConfig {
        self.config
    }

    /// Bays encoded by candidates, in id order.
    pub fn free_bays(&self) -> impl Iterator<Item = &Bay<'a>> + '_ {
        self.free.iter().filter_map(|&i| self.problem.bays().get(i))
    }

    /// Bays kept as they are, in id order.
    pub fn locked_bays(&self) -> impl Iterator<Item = &Bay<'a>> + '_ {
        self.locked.iter().filter_map(|&i| self.problem.bays().get(i))
    }

    /// Number of genes per candidate.
    pub const fn gene_count(&self) -> usize {
        self.free.len()
    }

    /// The candidate that changes nothing.
    pub fn keep_candidate(&self) -> Candidate {
        Candidate {
            genes: vec![Gene::default(); self.free.len()],
        }
    }

    /// The template a gene rebuilds its bay into, if the build changes
    /// anything. Bays already being rebuilt ignore the build gene.
    pub(crate) fn rebuild_template(&self, bay: &Bay<'_>, gene: &Gene) -> Option<&'a RobotTemplate> {
        if bay.rebuild.is_some() {
            return None;
        }
        gene.build
            .and_then(|t| self.problem.templates.get(t))
            .filter(|template| reshapes(template, bay))
    }

    fn capability_of(&self, composition: &Composition) -> Result<Option<CapabilityVector>, ConfigurationError> {
        if composition.is_empty() {
            Ok(None)
        } else {
            self.problem.model.capability(composition).map(Some)
        }
    }

    /// A bay that is not rebuilt by the candidate: as it stands, or as its
    /// rebuild in flight will leave it.
    fn settled(&self, bay: &Bay<'_>, task: Option<usize>) -> Result<Member, ConfigurationError> {
        let problem = self.problem;
        let Some(rebuild) = bay.rebuild else {
            return Ok(Member {
                id: bay.id,
                capability: self.capability_of(&bay.composition())?,
                position: bay.position,
                ready: 0.0,
                task,
                rebuilt: false,
            });
        };
        let current = self.capability_of(&bay.composition())?;
        let composition = problem
            .template(rebuild.template)
            .map_or_else(|| bay.composition(), RobotTemplate::composition);
        Ok(Member {
            id: bay.id,
            capability: self.capability_of(&composition)?,
            position: problem.depot,
            ready: problem
                .kinematics
                .rebuild_delay(current.as_ref(), bay.position, problem.depot, rebuild.remaining),
            task,
            rebuilt: false,
        })
    }

    /// Resolve builds and capabilities for every bay.
    pub(crate) fn decode(&self, candidate: &Candidate) -> Result<Vec<Member>, ConfigurationError> {
        let problem = self.problem;
        let kinematics = problem.kinematics;
        let mut available = problem.pool.counts();
        let mut members = Vec::with_capacity(problem.bays().len());

        for (bay, gene) in self.free_bays().zip(&candidate.genes) {
            let Some(template) = self.rebuild_template(bay, gene) else {
                members.push(self.settled(bay, gene.task)?);
                continue;
            };
            take_counts(&mut available, &shortfall(&template.modules, &bay.releasable()))?;
            let current = self.capability_of(&bay.composition())?;
            members.push(Member {
                id: bay.id,
                capability: self.capability_of(&template.composition())?,
                position: problem.depot,
                ready: kinematics.rebuild_delay(
                    current.as_ref(),
                    bay.position,
                    problem.depot,
                    kinematics.reconstruct_duration,
                ),
                task: gene.task,
                rebuilt: true,
            });
        }

        for bay in self.locked_bays() {
            members.push(self.settled(bay, bay.task.and_then(|t| problem.task_index(t)))?);
        }
        Ok(members)
    }

    /// Score a candidate.
    pub fn evaluate(&self, candidate: &Candidate) -> Result<Evaluation, ConfigurationError> {
        let members = self.decode(candidate)?;
        let problem = self.problem;
        let kinematics = problem.kinematics;
        let tasks = problem.tasks();

        // Per task: (latest arrival, summed throughput).
        let mut crews: Vec<Option<(f64, f64)>> = vec![None; tasks.len()];
        let mut infeasible = 0_usize;
        for member in &members {
            let Some(index) = member.task else { continue };
            let (Some(task), Some(slot)) = (tasks.get(index), crews.get_mut(index)) else {
                infeasible = infeasible.saturating_add(1);
                continue;
            };
            match &member.capability {
                Some(cap) if feasible(cap, &task.requirement) => {
                    let arrival = member.ready + kinematics.travel_time(cap, member.position, task.position);
                    let throughput = kinematics.throughput(cap);
                    let (latest, total) = slot.unwrap_or((0.0, 0.0));
                    *slot = Some((latest.max(arrival), total + throughput));
                }
                _ => infeasible = infeasible.saturating_add(1),
            }
        }

        let mut unserved = 0_usize;
        let mut makespan = 0.0_f64;
        for (task, slot) in tasks.iter().zip(&crews) {
            let finish = slot.map_or(f64::INFINITY, |(arrival, throughput)| {
                if throughput > 0.0 {
                    arrival + task.remaining() / throughput
                } else {
                    f64::INFINITY
                }
            });
            if finish.is_finite() {
                makespan = makespan.max(finish);
            } else {
                unserved = unserved.saturating_add(1);
            }
        }

        let rebuilds = members.iter().filter(|m| m.rebuilt).count();
        let config = self.config;
        let fitness = Fitness {
            penalty: config
                .infeasible_penalty
                .mul_add(count_f64(infeasible), config.unserved_penalty * count_f64(unserved)),
            cost: config.rebuild_penalty.mul_add(count_f64(rebuilds), makespan),
        };

        Ok(Evaluation {
            fitness,
            objective: fitness.total(),
            unserved,
            infeasible,
            rebuilds,
            makespan,
        })
    }

    /// Score a candidate, mapping decode errors to [`Fitness::WORST`].
    pub fn fitness(&self, candidate: &Candidate) -> Fitness {
        match self.evaluate(candidate) {
            Ok(eval) => eval.fitness,
            Err(err) => {
                tracing::trace!(error = %err, "candidate rejected");
                Fitness::WORST
            }
        }
    }

    /// Turn a candidate into a concrete plan with module ids.
    pub fn materialize(&self, candidate: &Candidate) -> Result<Materialized, ConfigurationError> {
        let problem = self.problem;
        let mut pool: ModulePool = problem.pool.clone();
        let mut plan = AllocationPlan::new();

        for (bay, gene) in self.free_bays().zip(&candidate.genes) {
            let Some(template) = self.rebuild_template(bay, gene) else {
                continue;
            };
            let (mut modules, missing) = reuse(template, bay);
            let drawn = pool.select(&missing)?;
            pool.take(&drawn)?;
            modules.extend(drawn);
            modules.sort_unstable();
            plan.builds.insert(
                bay.id,
                RobotBuild {
                    template: template.name.clone(),
                    modules,
                },
            );
        }

        let members = self.decode(candidate)?;
        let tasks = problem.tasks();
        let mut stripped = Vec::new();
        for member in &members {
            let Some(task) = member.task.and_then(|i| tasks.get(i)) else {
                continue;
            };
            let ok = member
                .capability
                .as_ref()
                .is_some_and(|cap| feasible(cap, &task.requirement));
            if ok {
                plan.assignments.insert(member.id, task.id);
            } else {
                stripped.push((member.id, task.id));
            }
        }

        let covered = plan.covered_tasks();
        let reachable = self.reachable_capabilities();
        let feasibility = tasks
            .iter()
            .map(|task| {
                let can_serve = |cap: &CapabilityVector| feasible(cap, &task.requirement);
                let verdict = if covered.contains(&task.id) {
                    TaskFeasibility::Assigned
                } else if members.iter().any(|m| m.capability.as_ref().is_some_and(can_serve))
                    || reachable.iter().any(can_serve)
                {
                    TaskFeasibility::Deferred
                } else {
                    TaskFeasibility::Infeasible
                };
                (task.id, verdict)
            })
            .collect();

        Ok(Materialized {
            plan,
            feasibility,
            stripped,
        })
    }

    /// Capabilities of the templates some free bay could be rebuilt into
    /// from its own modules and the current pool.
    fn reachable_capabilities(&self) -> Vec<CapabilityVector> {
        let problem = self.problem;
        let pool = problem.pool.counts();
        problem
            .templates
            .iter()
            .filter(|template| {
                self.free_bays().filter(|bay| bay.rebuild.is_none()).any(|bay| {
                    let mut trial = pool.clone();
                    take_counts(&mut trial, &shortfall(&template.modules, &bay.releasable())).is_ok()
                })
            })
            .filter_map(|template| problem.model.capability(&template.composition()).ok())
            .collect()
    }
}

/// Whether building `template` changes what the bay mounts.
pub(crate) fn reshapes(template: &RobotTemplate, bay: &Bay<'_>) -> bool {
    template.composition() != bay.composition()
}

/// Module counts `needed` asks for beyond what the bay already holds.
pub(crate) fn shortfall(
    needed: &BTreeMap<ModuleType, u32>,
    own: &BTreeMap<ModuleType, u32>,
) -> BTreeMap<ModuleType, u32> {
    needed
        .iter()
        .filter_map(|(&module_type, &n)| {
            let missing = n.saturating_sub(own.get(&module_type).copied().unwrap_or(0));
            (missing > 0).then_some((module_type, missing))
        })
        .collect()
}

/// The bay's own modules a template keeps (lowest ids first), and the
/// counts still to draw from the pool.
fn reuse(template: &RobotTemplate, bay: &Bay<'_>) -> (Vec<ModuleId>, BTreeMap<ModuleType, u32>) {
    let mut own: Vec<&Module> = bay.modules.iter().filter(|m| m.in_service()).collect();
    own.sort_by_key(|m| m.id);
    let mut kept = Vec::new();
    for (&module_type, &needed) in &template.modules {
        kept.extend(
            own.iter()
                .filter(|m| m.module_type == module_type)
                .map(|m| m.id)
                .take(usize::try_from(needed).unwrap_or(usize::MAX)),
        );
    }
    (kept, shortfall(&template.modules, &bay.releasable()))
}

/// Subtract `counts` from `from`, leaving it untouched on a deficit.
pub(crate) fn take_counts(
    from: &mut BTreeMap<ModuleType, u32>,
    counts: &BTreeMap<ModuleType, u32>,
) -> Result<(), ConfigurationError> {
    for (&module_type, &n) in counts {
        let have = from.get(&module_type).copied().unwrap_or(0);
        if have < n {
            return Err(ConfigurationError::PoolDeficit {
                module_type,
                missing: n.saturating_sub(have),
            });
        }
    }
    for (&t, &n) in counts {
        if let Some(entry) = from.get_mut(&t) {
            *entry = entry.saturating_sub(n);
        }
    }
    Ok(())
}

pub(crate) fn count_f64(n: usize) -> f64 {
    u32::try_from(n).map_or(f64::from(u32::MAX), f64::from)
}
