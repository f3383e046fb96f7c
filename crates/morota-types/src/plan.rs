//! Allocation plans: robot-to-task assignments plus module-to-robot builds.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::ids::{ModuleId, RobotId, TaskId};

/// Modules to mount on a robot bay, built from a named template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobotBuild {
    /// Template the robot is built from.
    pub template: String,
    /// Modules taken from the pool, one per filled slot.
    pub modules: Vec<ModuleId>,
}

/// A robot-to-task mapping produced by the optimizer.
///
/// `assignments` is a partial function: a robot without an entry is idle.
/// Several robots may share one task. `builds` lists the bays the plan
/// (re)configures; bays absent from it keep their current modules.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AllocationPlan {
    /// Task each robot should work on.
    pub assignments: BTreeMap<RobotId, TaskId>,
    /// Bays that are built or rebuilt by this plan.
    pub builds: BTreeMap<RobotId, RobotBuild>,
}

impl AllocationPlan {
    /// An empty plan: nothing built, everyone idle.
    pub const fn new() -> Self {
        Self {
            assignments: BTreeMap::new(),
            builds: BTreeMap::new(),
        }
    }

    /// The task assigned to `robot`, if any.
    pub fn task_for(&self, robot: RobotId) -> Option<TaskId> {
        self.assignments.get(&robot).copied()
    }

    /// Robots assigned to `task`, in id order.
    pub fn robots_for(&self, task: TaskId) -> Vec<RobotId> {
        self.assignments
            .iter()
            .filter(|&(_, &t)| t == task)
            .map(|(&r, _)| r)
            .collect()
    }

    /// Distinct tasks that have at least one robot.
    pub fn covered_tasks(&self) -> BTreeSet<TaskId> {
        self.assignments.values().copied().collect()
    }

    /// Whether no module is listed by two different builds.
    pub fn modules_are_exclusive(&self) -> bool {
        let mut seen = BTreeSet::new();
        self.builds
            .values()
            .flat_map(|b| b.modules.iter())
            .all(|m| seen.insert(*m))
    }
}
