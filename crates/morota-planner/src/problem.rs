//! What the optimizer plans over: the fleet, the pool, the open tasks.

use std::collections::{BTreeMap, BTreeSet};

use morota_model::{Kinematics, ModulePool, PerformanceModel};
use morota_types::{Composition, Module, ModuleType, Position, RobotId, RobotStatus, RobotTemplate, Task, TaskId};

/// A read-only view of one robot bay at planning time.
#[derive(Debug, Clone, Copy)]
pub struct Bay<'a> {
    /// Bay (robot) id.
    pub id: RobotId,
    /// Current lifecycle status.
    pub status: RobotStatus,
    /// Current location.
    pub position: Position,
    /// Mounted modules. Empty for an unbuilt bay.
    pub modules: &'a [Module],
    /// Task the robot currently holds, if any.
    pub task: Option<TaskId>,
    /// Rebuild in flight, if any.
    pub rebuild: Option<Rebuild<'a>>,
}

/// A rebuild the simulator has started but not finished.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rebuild<'a> {
    /// Template being assembled.
    pub template: &'a str,
    /// Assembly time left once the robot is at the depot.
    pub remaining: f64,
}

impl Bay<'_> {
    /// Composition of the in-service mounted modules.
    pub fn composition(&self) -> Composition {
        Composition::from_modules(self.modules)
    }

    /// Whether the bay holds a robot with at least one working module.
    pub fn has_robot(&self) -> bool {
        self.modules.iter().any(Module::in_service)
    }

    /// Whether the bay holds a robot now or will once its rebuild finishes.
    pub fn will_have_robot(&self) -> bool {
        self.rebuild.is_some() || self.has_robot()
    }

    /// In-service module counts. A rebuild reuses these before drawing on
    /// the pool.
    pub fn releasable(&self) -> BTreeMap<ModuleType, u32> {
        let mut counts = BTreeMap::new();
        for module in self.modules.iter().filter(|m| m.in_service()) {
            let entry = counts.entry(module.module_type).or_insert(0_u32);
            *entry = entry.saturating_add(1);
        }
        counts
    }
}

/// Changes since the previous plan that warrant re-optimization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanDelta {
    /// Robots whose capability no longer meets their task.
    pub failed_robots: BTreeSet<RobotId>,
    /// Tasks that became open (released by failed robots or newly added).
    pub opened_tasks: BTreeSet<TaskId>,
    /// Tasks that were completed.
    pub closed_tasks: BTreeSet<TaskId>,
}

impl PlanDelta {
    /// Whether nothing changed.
    pub fn is_empty(&self) -> bool {
        self.failed_robots.is_empty() && self.opened_tasks.is_empty() && self.closed_tasks.is_empty()
    }
}

/// Everything one optimizer call needs.
#[derive(Debug)]
pub struct PlanningProblem<'a> {
    /// Performance model used to derive capabilities.
    pub model: &'a PerformanceModel,
    /// Speed and throughput derivation.
    pub kinematics: &'a Kinematics,
    /// Buildable templates, in scenario order.
    pub templates: &'a [RobotTemplate],
    /// Unassigned modules.
    pub pool: &'a ModulePool,
    /// Where rebuilt robots start.
    pub depot: Position,
    bays: Vec<Bay<'a>>,
    tasks: Vec<&'a Task>,
}

impl<'a> PlanningProblem<'a> {
    /// Assemble a problem. Bays are sorted by id; only incomplete tasks are
    /// kept, sorted by id.
    pub fn new(
        model: &'a PerformanceModel,
        kinematics: &'a Kinematics,
        templates: &'a [RobotTemplate],
        pool: &'a ModulePool,
        depot: Position,
        mut bays: Vec<Bay<'a>>,
        tasks: impl IntoIterator<Item = &'a Task>,
    ) -> Self {
        bays.sort_by_key(|b| b.id);
        let mut tasks: Vec<&Task> = tasks.into_iter().filter(|t| !t.is_complete()).collect();
        tasks.sort_by_key(|t| t.id);
        Self {
            model,
            kinematics,
            templates,
            pool,
            depot,
            bays,
            tasks,
        }
    }

    /// Bays in id order.
    pub fn bays(&self) -> &[Bay<'a>] {
        &self.bays
    }

    /// Open tasks in id order.
    pub fn tasks(&self) -> &[&'a Task] {
        &self.tasks
    }

    /// A template by name.
    pub fn template(&self, name: &str) -> Option<&'a RobotTemplate> {
        self.templates.iter().find(|t| t.name == name)
    }

    /// Index of an open task, if it is open.
    pub fn task_index(&self, id: TaskId) -> Option<usize> {
        self.tasks.binary_search_by_key(&id, |t| t.id).ok()
    }

    /// Whether a bay keeps its current task and modules during incremental
    /// re-planning: it is busy on a task that is still open and has not
    /// failed.
    pub fn is_locked(&self, bay: &Bay<'_>, delta: &PlanDelta) -> bool {
        bay.status.is_busy()
            && !delta.failed_robots.contains(&bay.id)
            && bay.task.is_some_and(|t| self.task_index(t).is_some())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use morota_model::{PerformanceParams, default_dimensions};
    use morota_types::{ModuleId, RequirementVector};

    #[test]
    fn problem_sorts_and_filters() {
        let model = PerformanceModel::new(&PerformanceParams::default(), default_dimensions()).unwrap();
        let kinematics = Kinematics::default();
        let pool = ModulePool::new();
        let mk = |id: u32, progress: f64| Task {
            id: TaskId::new(id),
            position: Position::default(),
            requirement: RequirementVector(vec![0.0, 0.0]),
            effort: 1.0,
            progress,
        };
        let tasks = [mk(5, 0.0), mk(2, 0.0), mk(3, 1.0)];
        let modules = [Module::new(ModuleId::new(0), ModuleType::Body)];
        let bays = vec![
            Bay {
                id: RobotId::new(1),
                status: RobotStatus::Working,
                position: Position::default(),
                modules: &modules,
                task: Some(TaskId::new(5)),
                rebuild: None,
            },
            Bay {
                id: RobotId::new(0),
                status: RobotStatus::Idle,
                position: Position::default(),
                modules: &[],
                task: None,
                rebuild: Some(Rebuild {
                    template: "Duo",
                    remaining: 1.0,
                }),
            },
        ];
        let problem = PlanningProblem::new(&model, &kinematics, &[], &pool, Position::default(), bays, &tasks);
        let ids: Vec<u32> = problem.tasks().iter().map(|t| t.id.into_inner()).collect();
        assert_eq!(ids, vec![2, 5]);
        assert_eq!(problem.bays()[0].id, RobotId::new(0));
        assert!(!problem.bays()[0].has_robot());
        assert!(problem.bays()[0].will_have_robot());
        assert!(!problem.is_locked(&problem.bays()[0], &PlanDelta::default()));
        assert!(problem.is_locked(&problem.bays()[1], &PlanDelta::default()));
        let failed = PlanDelta {
            failed_robots: BTreeSet::from([RobotId::new(1)]),
            ..PlanDelta::default()
        };
        assert!(!problem.is_locked(&problem.bays()[1], &failed));
    }
}
