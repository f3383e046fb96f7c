//! Tick cycle: one discrete step of the simulation.
//!
//! Each tick runs through these phases:
//!
//! 1. **Move** -- en-route robots advance towards their task at
//!    `speed * time_step`; arrival switches them to working. Robots
//!    returning for a rebuild head for the depot the same way. Movement
//!    wears modules.
//! 2. **Work** -- working robots accrue `throughput * time_step` progress,
//!    summed per task and applied once every robot has been computed. Work
//!    wears modules; a module at zero health is removed and the robot's
//!    capability recomputed.
//! 3. **Rebuild** -- robots that started the tick at the depot count down
//!    their assembly time. A finished robot mounts its new modules, returns
//!    the ones it no longer needs to the pool and sets off for its task.
//! 4. **Detect** -- completed tasks leave the open set and free their
//!    robots; busy robots that no longer meet their task's requirement
//!    become failed.
//! 5. **Re-plan** -- if anything failed, opened or closed, the optimizer
//!    re-plans incrementally and the new plan is applied.
//!
//! Every per-robot update reads the previous snapshot and writes the next
//! one, so robot order never influences movement or progress.

use std::collections::{BTreeMap, BTreeSet};

use morota_model::{
    Activity, CapabilityCache, ConfigurationError, DegradationPolicy, Kinematics, ModulePool, PerformanceModel,
};
use morota_planner::{Optimizer, PlanDelta, PlanningProblem};
use morota_types::{
    ARRIVAL_EPSILON, AllocationPlan, Module, ModuleFailureEvent, ModuleId, Position, RobotBuild, RobotId,
    RobotStatus, RobotTemplate, Task, TaskFeasibility, TaskId,
};
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use crate::clock::ClockError;
use crate::log::TickEvent;
use crate::state::{PendingBuild, RobotState, SimSnapshot};

/// Errors that can occur during tick execution.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    /// A clock operation failed.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },

    /// A capability computation or pool transfer failed.
    #[error("model error: {source}")]
    Model {
        /// The underlying model error.
        #[from]
        source: ConfigurationError,
    },

    /// A plan names a bay that does not exist.
    #[error("plan references unknown robot {robot}")]
    UnknownRobot {
        /// The missing bay.
        robot: RobotId,
    },
}

/// Everything a tick needs besides the snapshot.
#[derive(Debug)]
pub struct TickContext<'a> {
    /// Performance model.
    pub model: &'a PerformanceModel,
    /// Speed, throughput and rebuild timing.
    pub kinematics: &'a Kinematics,
    /// Module wear model.
    pub degradation: &'a DegradationPolicy,
    /// Optimizer for incremental re-planning.
    pub optimizer: &'a Optimizer,
    /// Buildable templates.
    pub templates: &'a [RobotTemplate],
    /// Depot location.
    pub depot: Position,
    /// Capability memo for the single-threaded simulator.
    pub cache: &'a mut CapabilityCache,
    /// The run's RNG.
    pub rng: &'a mut StdRng,
}

/// Summary of a single tick's execution.
#[derive(Debug, Clone, PartialEq)]
pub struct TickSummary {
    /// The tick number that was executed.
    pub tick: u64,
    /// Simulated time at the end of the tick.
    pub time: f64,
    /// Events in the order they happened.
    pub events: Vec<TickEvent>,
    /// Open tasks remaining.
    pub open_tasks: usize,
    /// Whether the optimizer was called.
    pub replanned: bool,
}

/// Execute one tick.
///
/// # Errors
///
/// Returns [`TickError`] on clock overflow, capability computation failure,
/// or a plan that cannot be applied to the pool.
pub fn step(prev: &SimSnapshot, ctx: &mut TickContext<'_>) -> Result<(SimSnapshot, TickSummary), TickError> {
    let mut next = prev.clone();
    let tick = next.clock.advance()?;
    let dt = next.clock.time_step();
    let mut events = Vec::new();
    let mut delta = PlanDelta::default();

    // --- Move and work ---
    let mut progress: BTreeMap<TaskId, f64> = BTreeMap::new();
    for (old, robot) in prev.robots.iter().zip(next.robots.iter_mut()) {
        let wear = advance_robot(old, robot, &prev.open_tasks, ctx, dt, &mut progress, &mut events);
        if let Some((activity, duration)) = wear {
            wear_modules(robot, activity, duration, tick, ctx, &mut events)?;
        }
    }
    for (task_id, amount) in &progress {
        if let Some(task) = next.open_tasks.get_mut(task_id) {
            task.progress += amount;
        }
    }

    // --- Rebuild ---
    for (old, robot) in prev.robots.iter().zip(next.robots.iter_mut()) {
        if old.status != RobotStatus::Rebuilding {
            continue;
        }
        let Some(pending) = robot.pending.as_mut() else {
            robot.status = RobotStatus::Idle;
            continue;
        };
        pending.remaining -= dt;
        if pending.remaining <= 0.0
            && let Some(released) = finish_rebuild(robot, &mut next.pool, &next.open_tasks, ctx, &mut events)?
        {
            delta.opened_tasks.insert(released);
        }
    }

    // --- Detect ---
    let now = next.clock.elapsed();
    let done: Vec<TaskId> = next
        .open_tasks
        .values()
        .filter(|t| t.is_complete())
        .map(|t| t.id)
        .collect();
    for task_id in done {
        next.open_tasks.remove(&task_id);
        next.completed.insert(task_id, now);
        delta.closed_tasks.insert(task_id);
        info!(tick, task = %task_id, time = now, "task completed");
        events.push(TickEvent::TaskCompleted { task: task_id, time: now });
        for robot in next.robots.iter_mut().filter(|r| r.task == Some(task_id)) {
            robot.task = None;
            if !robot.status.in_rebuild() {
                robot.status = RobotStatus::Idle;
            }
        }
    }
    detect_failures(&mut next, tick, &mut delta, &mut events);

    // --- Re-plan ---
    let replanned = !delta.is_empty();
    if replanned {
        replan(&mut next, &delta, ctx, &mut events)?;
    }

    debug!(
        tick,
        open_tasks = next.open_tasks.len(),
        events = events.len(),
        replanned,
        "tick complete"
    );
    let summary = TickSummary {
        tick,
        time: now,
        events,
        open_tasks: next.open_tasks.len(),
        replanned,
    };
    Ok((next, summary))
}

/// Move or work one robot. Returns the activity and its duration if the
/// robot's modules should wear.
fn advance_robot(
    old: &RobotState,
    robot: &mut RobotState,
    open_tasks: &BTreeMap<TaskId, Task>,
    ctx: &TickContext<'_>,
    dt: f64,
    progress: &mut BTreeMap<TaskId, f64>,
    events: &mut Vec<TickEvent>,
) -> Option<(Activity, f64)> {
    let kinematics = ctx.kinematics;
    if old.status == RobotStatus::Returning {
        return return_to_depot(old, robot, kinematics, ctx.depot, dt, events);
    }
    if !old.status.is_busy() {
        return None;
    }
    let Some(task) = old.task.and_then(|t| open_tasks.get(&t)) else {
        robot.status = RobotStatus::Idle;
        robot.task = None;
        return None;
    };

    if old.status == RobotStatus::Working {
        let amount = kinematics.throughput(&old.capability) * dt;
        *progress.entry(task.id).or_insert(0.0) += amount;
        return Some((Activity::Work, dt));
    }
    let speed = kinematics.speed(&old.capability);
    let (position, travelled) = old.position.step_towards(task.position, speed * dt);
    robot.position = position;
    if position.distance_to(task.position) <= ARRIVAL_EPSILON {
        robot.status = RobotStatus::Working;
        events.push(TickEvent::RobotArrived {
            robot: old.id,
            task: task.id,
        });
    }
    (travelled > 0.0 && speed > 0.0).then(|| (Activity::Move, travelled / speed))
}

/// One step of a returning robot's trip back. A robot that can no longer
/// move is carried to the depot.
fn return_to_depot(
    old: &RobotState,
    robot: &mut RobotState,
    kinematics: &Kinematics,
    depot: Position,
    dt: f64,
    events: &mut Vec<TickEvent>,
) -> Option<(Activity, f64)> {
    let speed = kinematics.speed(&old.capability);
    let (position, travelled) = if old.has_robot() && speed > 0.0 {
        old.position.step_towards(depot, speed * dt)
    } else {
        (depot, 0.0)
    };
    robot.position = position;
    if position.distance_to(depot) <= ARRIVAL_EPSILON {
        robot.position = depot;
        robot.status = RobotStatus::Rebuilding;
        events.push(TickEvent::ReturnedToDepot { robot: old.id });
    }
    (travelled > 0.0).then(|| (Activity::Move, travelled / speed))
}

/// Degrade every mounted module, dropping the ones that fail.
fn wear_modules(
    robot: &mut RobotState,
    activity: Activity,
    duration: f64,
    tick: u64,
    ctx: &mut TickContext<'_>,
    events: &mut Vec<TickEvent>,
) -> Result<(), TickError> {
    let mut any_failed = false;
    for module in &mut robot.modules {
        if ctx.degradation.degrade(module, activity, duration, &mut *ctx.rng) {
            any_failed = true;
            debug!(tick, robot = %robot.id, module = %module.id, module_type = %module.module_type, "module failed");
            events.push(TickEvent::ModuleFailed(ModuleFailureEvent {
                tick,
                robot: robot.id,
                module: module.id,
                module_type: module.module_type,
            }));
        }
    }
    if any_failed {
        robot.modules.retain(Module::in_service);
        robot.refresh_capability(ctx.model, ctx.cache)?;
    }
    Ok(())
}

/// Mark busy robots that can no longer meet their task as failed.
///
/// The task is reopened only when no other busy robot still works on it.
fn detect_failures(next: &mut SimSnapshot, tick: u64, delta: &mut PlanDelta, events: &mut Vec<TickEvent>) {
    let mut dropped = Vec::new();
    for robot in &mut next.robots {
        if !robot.status.is_busy() {
            continue;
        }
        let Some(task) = robot.task.and_then(|t| next.open_tasks.get(&t)) else {
            continue;
        };
        if robot.has_robot() && robot.capability.dominates(&task.requirement) {
            continue;
        }
        warn!(tick, robot = %robot.id, task = %task.id, "robot can no longer meet task requirement");
        robot.status = RobotStatus::Failed;
        delta.failed_robots.insert(robot.id);
        dropped.push(task.id);
        events.push(TickEvent::RobotFailed {
            robot: robot.id,
            task: task.id,
        });
    }
    for task in dropped {
        let still_worked = next
            .robots
            .iter()
            .any(|r| r.status.is_busy() && r.task == Some(task));
        if !still_worked {
            delta.opened_tasks.insert(task);
        }
    }
}

fn replan(
    next: &mut SimSnapshot,
    delta: &PlanDelta,
    ctx: &mut TickContext<'_>,
    events: &mut Vec<TickEvent>,
) -> Result<(), TickError> {
    let outcome = {
        let problem = PlanningProblem::new(
            ctx.model,
            ctx.kinematics,
            ctx.templates,
            &next.pool,
            ctx.depot,
            next.bays(),
            next.open_tasks.values(),
        );
        ctx.optimizer
            .replan_incremental(&next.plan, &problem, delta, &mut *ctx.rng)
    };
    apply_plan(next, &outcome.plan, ctx, events)?;
    events.push(TickEvent::Replanned {
        generations: outcome.generations,
        objective: Some(outcome.objective).filter(|o| o.is_finite()),
        infeasible: outcome.tasks_with(TaskFeasibility::Infeasible),
        deferred: outcome.tasks_with(TaskFeasibility::Deferred),
    });
    next.plan = outcome.plan;
    Ok(())
}

/// Apply the initial plan. The starting fleet is assembled before the
/// clock starts, so its builds finish at once.
///
/// # Errors
///
/// As [`apply_plan`].
pub fn assemble(
    snapshot: &mut SimSnapshot,
    plan: &AllocationPlan,
    ctx: &mut TickContext<'_>,
    events: &mut Vec<TickEvent>,
) -> Result<(), TickError> {
    apply_plan(snapshot, plan, ctx, events)?;
    for robot in &mut snapshot.robots {
        if robot.status == RobotStatus::Rebuilding {
            finish_rebuild(robot, &mut snapshot.pool, &snapshot.open_tasks, ctx, events)?;
        }
    }
    Ok(())
}

/// Apply a plan to a snapshot.
///
/// Builds are started in bay order: the modules the bay lacks are reserved
/// from the pool at once, and the robot heads back to the depot (an empty
/// bay is assembled there directly). A build whose module set already
/// matches the bay, or the rebuild in flight, is skipped. Robots with an
/// open task in the plan are dispatched (or start working if already
/// there); a robot being rebuilt only records the task for later; every
/// other robot becomes idle.
///
/// # Errors
///
/// [`TickError::UnknownRobot`] for a bay that does not exist, or
/// [`TickError::Model`] if the pool does not hold a listed module.
pub fn apply_plan(
    snapshot: &mut SimSnapshot,
    plan: &AllocationPlan,
    ctx: &mut TickContext<'_>,
    events: &mut Vec<TickEvent>,
) -> Result<(), TickError> {
    for (&robot_id, build) in &plan.builds {
        let robot = snapshot
            .robots
            .iter_mut()
            .find(|r| r.id == robot_id)
            .ok_or(TickError::UnknownRobot { robot: robot_id })?;
        let wanted = sorted(&build.modules);
        let unchanged = robot.pending.as_ref().map_or_else(
            || robot.module_ids() == wanted,
            |pending| sorted(&pending.build.modules) == wanted,
        );
        if !unchanged {
            start_rebuild(robot, build, &mut snapshot.pool, ctx, events)?;
        }
    }

    for robot in &mut snapshot.robots {
        let target = plan
            .task_for(robot.id)
            .and_then(|t| snapshot.open_tasks.get(&t));
        if robot.status.in_rebuild() {
            robot.task = target.map(|t| t.id);
            continue;
        }
        let Some(task) = target else {
            robot.status = RobotStatus::Idle;
            robot.task = None;
            continue;
        };
        if robot.task == Some(task.id) && robot.status.is_busy() {
            continue;
        }
        dispatch(robot, task, events);
    }

    for robot in &mut snapshot.robots {
        let due = robot.pending.as_ref().is_some_and(|p| p.remaining <= 0.0);
        if due && robot.status == RobotStatus::Rebuilding {
            finish_rebuild(robot, &mut snapshot.pool, &snapshot.open_tasks, ctx, events)?;
        }
    }
    Ok(())
}

fn sorted(ids: &[ModuleId]) -> Vec<ModuleId> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids
}

/// Reserve the modules a build lacks and send the robot back to the depot.
fn start_rebuild(
    robot: &mut RobotState,
    build: &RobotBuild,
    pool: &mut ModulePool,
    ctx: &TickContext<'_>,
    events: &mut Vec<TickEvent>,
) -> Result<(), TickError> {
    if let Some(cancelled) = robot.pending.take() {
        pool.put(cancelled.reserved)?;
    }
    let mounted: BTreeSet<ModuleId> = robot.modules.iter().map(|m| m.id).collect();
    let missing: Vec<ModuleId> = build
        .modules
        .iter()
        .copied()
        .filter(|id| !mounted.contains(id))
        .collect();
    let reserved = pool.take(&missing)?;
    robot.pending = Some(PendingBuild {
        build: build.clone(),
        reserved,
        remaining: ctx.kinematics.reconstruct_duration,
    });
    robot.task = None;

    let at_depot = robot.position.distance_to(ctx.depot) <= ARRIVAL_EPSILON;
    let mobile = robot.has_robot() && ctx.kinematics.speed(&robot.capability) > 0.0;
    let returning = mobile && !at_depot;
    if returning {
        robot.status = RobotStatus::Returning;
    } else {
        robot.position = ctx.depot;
        robot.status = RobotStatus::Rebuilding;
    }
    debug!(robot = %robot.id, template = %build.template, reserved = missing.len(), returning, "rebuild started");
    events.push(TickEvent::RebuildStarted {
        robot: robot.id,
        template: build.template.clone(),
        returning,
    });
    Ok(())
}

/// Mount a finished rebuild and send the robot to its task.
///
/// Mounted modules the build does not list go back to the pool. Returns the
/// robot's task if the rebuilt robot cannot meet it (a kept module failed
/// on the way back); the robot is then left idle.
fn finish_rebuild(
    robot: &mut RobotState,
    pool: &mut ModulePool,
    open_tasks: &BTreeMap<TaskId, Task>,
    ctx: &mut TickContext<'_>,
    events: &mut Vec<TickEvent>,
) -> Result<Option<TaskId>, TickError> {
    let Some(pending) = robot.pending.take() else {
        return Ok(None);
    };
    let keep: BTreeSet<ModuleId> = pending.build.modules.iter().copied().collect();
    let (mut kept, excess): (Vec<Module>, Vec<Module>) = std::mem::take(&mut robot.modules)
        .into_iter()
        .partition(|m| keep.contains(&m.id));
    pool.put(excess)?;
    kept.extend(pending.reserved);
    kept.sort_by_key(|m| m.id);
    robot.modules = kept;
    robot.position = ctx.depot;
    robot.refresh_capability(ctx.model, ctx.cache)?;
    debug!(robot = %robot.id, template = %pending.build.template, modules = robot.modules.len(), "robot built");
    events.push(TickEvent::RobotBuilt {
        robot: robot.id,
        template: pending.build.template.clone(),
        modules: robot.module_ids(),
    });
    robot.template = Some(pending.build.template);

    let target = robot.task.and_then(|t| open_tasks.get(&t));
    robot.status = RobotStatus::Idle;
    robot.task = None;
    let Some(task) = target else {
        return Ok(None);
    };
    if robot.has_robot() && robot.capability.dominates(&task.requirement) {
        dispatch(robot, task, events);
        return Ok(None);
    }
    warn!(robot = %robot.id, task = %task.id, "rebuilt robot cannot meet its task");
    Ok(Some(task.id))
}

/// Send a robot to `task`, or set it working if it is already there.
fn dispatch(robot: &mut RobotState, task: &Task, events: &mut Vec<TickEvent>) {
    robot.task = Some(task.id);
    robot.status = if robot.position.distance_to(task.position) <= ARRIVAL_EPSILON {
        RobotStatus::Working
    } else {
        RobotStatus::EnRoute
    };
    events.push(TickEvent::RobotDispatched {
        robot: robot.id,
        task: task.id,
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::scenario::Scenario;
    use morota_model::{PerformanceParams, default_dimensions};
    use morota_planner::OptimizerConfig;
    use morota_types::{ModuleType, RequirementVector};
    use rand::SeedableRng;

    struct Fixture {
        model: PerformanceModel,
        kinematics: Kinematics,
        degradation: DegradationPolicy,
        optimizer: Optimizer,
        scenario: Scenario,
        cache: CapabilityCache,
        rng: StdRng,
    }

    impl Fixture {
        fn new(degradation: DegradationPolicy, requirement: [f64; 2], task_x: f64) -> Self {
            let scenario = Scenario {
                name: String::from("tick"),
                depot: Position::default(),
                max_robots: 1,
                tasks: vec![Task {
                    id: TaskId::new(1),
                    position: Position::new(task_x, 0.0),
                    requirement: RequirementVector(requirement.to_vec()),
                    effort: 2.0,
                    progress: 0.0,
                }],
                modules: vec![
                    Module::new(ModuleId::new(0), ModuleType::Body),
                    Module::new(ModuleId::new(1), ModuleType::Body),
                ],
                templates: vec![RobotTemplate {
                    name: String::from("Duo"),
                    slots: 2,
                    modules: BTreeMap::from([(ModuleType::Body, 2)]),
                }],
            };
            Self {
                model: PerformanceModel::new(&PerformanceParams::default(), default_dimensions()).unwrap(),
                kinematics: Kinematics::default(),
                degradation,
                optimizer: Optimizer::new(OptimizerConfig {
                    population_size: 8,
                    generations: 5,
                    ..OptimizerConfig::default()
                }),
                scenario,
                cache: CapabilityCache::new(),
                rng: StdRng::seed_from_u64(1),
            }
        }

        fn ctx(&mut self) -> TickContext<'_> {
            TickContext {
                model: &self.model,
                kinematics: &self.kinematics,
                degradation: &self.degradation,
                optimizer: &self.optimizer,
                templates: &self.scenario.templates,
                depot: self.scenario.depot,
                cache: &mut self.cache,
                rng: &mut self.rng,
            }
        }

        fn built_snapshot(&mut self) -> SimSnapshot {
            let mut snapshot = SimSnapshot::initial(&self.scenario, 1.0).unwrap();
            let mut plan = AllocationPlan::new();
            plan.builds.insert(
                RobotId::new(0),
                RobotBuild {
                    template: String::from("Duo"),
                    modules: vec![ModuleId::new(0), ModuleId::new(1)],
                },
            );
            plan.assignments.insert(RobotId::new(0), TaskId::new(1));
            let mut events = Vec::new();
            assemble(&mut snapshot, &plan, &mut self.ctx(), &mut events).unwrap();
            snapshot.plan = plan;
            snapshot
        }
    }

    #[test]
    fn apply_plan_builds_and_dispatches() {
        let mut fx = Fixture::new(DegradationPolicy::None, [0.4, 0.0], 3.0);
        let snapshot = fx.built_snapshot();
        let robot = snapshot.robot(RobotId::new(0)).unwrap();
        assert_eq!(robot.status, RobotStatus::EnRoute);
        assert_eq!(robot.modules.len(), 2);
        assert!(snapshot.pool.is_empty());
        assert_eq!(robot.capability.len(), 2);
    }

    #[test]
    fn reapplying_same_build_is_a_no_op() {
        let mut fx = Fixture::new(DegradationPolicy::None, [0.4, 0.0], 3.0);
        let mut snapshot = fx.built_snapshot();
        let plan = snapshot.plan.clone();
        let mut events = Vec::new();
        apply_plan(&mut snapshot, &plan, &mut fx.ctx(), &mut events).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn robot_moves_then_works_then_completes() {
        let mut fx = Fixture::new(DegradationPolicy::None, [0.4, 0.0], 1.0);
        let mut snapshot = fx.built_snapshot();
        let mut arrived = false;
        for _ in 0..50 {
            let (next, summary) = step(&snapshot, &mut fx.ctx()).unwrap();
            arrived |= summary
                .events
                .iter()
                .any(|e| matches!(e, TickEvent::RobotArrived { .. }));
            snapshot = next;
            if snapshot.all_tasks_complete() {
                break;
            }
        }
        assert!(arrived);
        assert!(snapshot.all_tasks_complete());
        assert!(snapshot.completed.contains_key(&TaskId::new(1)));
        assert_eq!(snapshot.robot(RobotId::new(0)).unwrap().status, RobotStatus::Idle);
    }

    #[test]
    fn progress_reads_previous_snapshot() {
        let mut fx = Fixture::new(DegradationPolicy::None, [0.0, 0.0], 0.0);
        let snapshot = fx.built_snapshot();
        let robot = snapshot.robot(RobotId::new(0)).unwrap();
        assert_eq!(robot.status, RobotStatus::Working);
        let expected = fx.kinematics.throughput(&robot.capability);
        let (next, _) = step(&snapshot, &mut fx.ctx()).unwrap();
        let task = next.open_tasks.get(&TaskId::new(1)).unwrap();
        assert!((task.progress - expected).abs() < 1e-12);
        // The previous snapshot is untouched.
        assert!(snapshot.open_tasks.get(&TaskId::new(1)).unwrap().progress.abs() < f64::EPSILON);
    }

    #[test]
    fn losing_a_module_fails_the_robot_in_the_same_tick() {
        let policy = DegradationPolicy::Linear {
            work_rate: 2.0,
            move_rate: 0.0,
        };
        let mut fx = Fixture::new(policy, [0.4, 0.0], 0.0);
        let snapshot = fx.built_snapshot();
        let (next, summary) = step(&snapshot, &mut fx.ctx()).unwrap();

        let failed_in_tick = summary
            .events
            .iter()
            .any(|e| matches!(e, TickEvent::RobotFailed { robot, .. } if *robot == RobotId::new(0)));
        assert!(failed_in_tick);
        assert!(summary.replanned);
        let module_failures = summary
            .events
            .iter()
            .filter(|e| matches!(e, TickEvent::ModuleFailed(_)))
            .count();
        assert_eq!(module_failures, 2);
        // Nothing left to rebuild with: the robot is released and the task stays open.
        let robot = next.robot(RobotId::new(0)).unwrap();
        assert_eq!(robot.status, RobotStatus::Idle);
        assert_eq!(robot.task, None);
        assert!(next.open_tasks.contains_key(&TaskId::new(1)));
    }

    #[test]
    fn depot_rebuild_takes_the_assembly_time() {
        let mut fx = Fixture::new(DegradationPolicy::None, [0.4, 0.0], 3.0);
        let plan = fx.built_snapshot().plan;
        let mut snapshot = SimSnapshot::initial(&fx.scenario, 1.0).unwrap();
        let mut events = Vec::new();
        apply_plan(&mut snapshot, &plan, &mut fx.ctx(), &mut events).unwrap();
        snapshot.plan = plan;
        assert!(matches!(
            events.as_slice(),
            [TickEvent::RebuildStarted { returning: false, .. }]
        ));
        let robot = snapshot.robot(RobotId::new(0)).unwrap();
        assert_eq!(robot.status, RobotStatus::Rebuilding);
        assert_eq!(robot.task, Some(TaskId::new(1)));
        assert!(snapshot.pool.is_empty());

        let (snapshot, first) = step(&snapshot, &mut fx.ctx()).unwrap();
        assert!(first.events.is_empty());
        assert_eq!(snapshot.robot(RobotId::new(0)).unwrap().status, RobotStatus::Rebuilding);

        let (snapshot, second) = step(&snapshot, &mut fx.ctx()).unwrap();
        assert!(second
            .events
            .iter()
            .any(|e| matches!(e, TickEvent::RobotBuilt { .. })));
        let robot = snapshot.robot(RobotId::new(0)).unwrap();
        assert_eq!(robot.status, RobotStatus::EnRoute);
        assert_eq!(robot.module_ids(), vec![ModuleId::new(0), ModuleId::new(1)]);
    }

    #[test]
    fn partly_failed_robot_travels_back_before_its_rebuild() {
        let policy = DegradationPolicy::Linear {
            work_rate: 0.25,
            move_rate: 0.0,
        };
        let mut fx = Fixture::new(policy, [0.4, 0.0], 4.0);
        fx.scenario.tasks[0].effort = 50.0;
        fx.scenario.modules[0].health = 0.25;
        fx.scenario
            .modules
            .push(Module::new(ModuleId::new(2), ModuleType::Body));
        let mut snapshot = fx.built_snapshot();

        let mut failure = None;
        for _ in 0..20 {
            let (next, summary) = step(&snapshot, &mut fx.ctx()).unwrap();
            snapshot = next;
            if summary
                .events
                .iter()
                .any(|e| matches!(e, TickEvent::RobotFailed { .. }))
            {
                failure = Some(summary);
                break;
            }
        }
        let failure = failure.unwrap();
        assert!(failure
            .events
            .iter()
            .any(|e| matches!(e, TickEvent::RebuildStarted { returning: true, .. })));
        let robot = snapshot.robot(RobotId::new(0)).unwrap();
        assert_eq!(robot.status, RobotStatus::Returning);
        assert_eq!(robot.task, Some(TaskId::new(1)));
        assert_eq!(robot.module_ids(), vec![ModuleId::new(1)]);
        assert!(robot.position.distance_to(fx.scenario.depot) > 1.0);
        // The missing module is set aside, not left in the pool.
        assert!(!snapshot.pool.contains(ModuleId::new(2)));

        let speed = fx.kinematics.speed(&robot.capability);
        let mut position = robot.position;
        let mut arrived_at = None;
        let mut built = None;
        for _ in 0..30 {
            let (next, summary) = step(&snapshot, &mut fx.ctx()).unwrap();
            snapshot = next;
            let robot = snapshot.robot(RobotId::new(0)).unwrap();
            if arrived_at.is_none() {
                assert!(position.distance_to(robot.position) <= speed + 1e-9);
            }
            position = robot.position;
            if summary
                .events
                .iter()
                .any(|e| matches!(e, TickEvent::ReturnedToDepot { .. }))
            {
                assert_eq!(robot.status, RobotStatus::Rebuilding);
                arrived_at = Some(summary.tick);
            }
            built = summary.events.iter().find_map(|e| {
                if let TickEvent::RobotBuilt { modules, .. } = e {
                    Some((summary.tick, modules.clone()))
                } else {
                    None
                }
            });
            if built.is_some() {
                break;
            }
        }
        let (built_at, modules) = built.unwrap();
        assert_eq!(modules, vec![ModuleId::new(1), ModuleId::new(2)]);
        assert_eq!(built_at, arrived_at.unwrap() + 2);
        let robot = snapshot.robot(RobotId::new(0)).unwrap();
        assert_eq!(robot.position, fx.scenario.depot);
        assert_eq!(robot.status, RobotStatus::EnRoute);
        assert_eq!(robot.task, Some(TaskId::new(1)));
    }

    #[test]
    fn shared_task_reopens_only_when_its_last_robot_fails() {
        let mut fx = Fixture::new(DegradationPolicy::None, [0.4, 0.0], 0.0);
        fx.scenario.max_robots = 2;
        fx.scenario.modules.extend([
            Module::new(ModuleId::new(2), ModuleType::Body),
            Module::new(ModuleId::new(3), ModuleType::Body),
        ]);
        let mut snapshot = SimSnapshot::initial(&fx.scenario, 1.0).unwrap();
        let mut plan = AllocationPlan::new();
        for (robot, modules) in [(0, [0, 1]), (1, [2, 3])] {
            plan.builds.insert(
                RobotId::new(robot),
                RobotBuild {
                    template: String::from("Duo"),
                    modules: modules.map(ModuleId::new).to_vec(),
                },
            );
            plan.assignments.insert(RobotId::new(robot), TaskId::new(1));
        }
        assemble(&mut snapshot, &plan, &mut fx.ctx(), &mut Vec::new()).unwrap();
        assert!(snapshot
            .robots
            .iter()
            .all(|r| r.status == RobotStatus::Working));

        let mut events = Vec::new();
        snapshot.robots[0].modules.clear();
        let mut delta = PlanDelta::default();
        detect_failures(&mut snapshot, 1, &mut delta, &mut events);
        assert_eq!(delta.failed_robots, BTreeSet::from([RobotId::new(0)]));
        assert!(delta.opened_tasks.is_empty());

        snapshot.robots[1].modules.clear();
        let mut delta = PlanDelta::default();
        detect_failures(&mut snapshot, 2, &mut delta, &mut events);
        assert_eq!(delta.failed_robots, BTreeSet::from([RobotId::new(1)]));
        assert_eq!(delta.opened_tasks, BTreeSet::from([TaskId::new(1)]));
        assert_eq!(events.len(), 2);
    }
}
