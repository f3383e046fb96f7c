//! Simulation snapshot: the complete state between two ticks.
//!
//! A tick reads one snapshot and produces the next; nothing else holds
//! mutable simulation state.

use std::collections::BTreeMap;

use morota_model::{CapabilityCache, ConfigurationError, ModulePool, PerformanceModel};
use morota_planner::{Bay, Rebuild};
use morota_types::{
    AllocationPlan, CapabilityVector, Composition, Module, ModuleId, Position, RobotBuild, RobotId, RobotStatus,
    Task, TaskId,
};

use crate::clock::{ClockError, SimClock};
use crate::scenario::Scenario;

/// A rebuild that has been started but not finished.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingBuild {
    /// Target template and the full module list after the rebuild.
    pub build: RobotBuild,
    /// Pool modules set aside for this bay.
    pub reserved: Vec<Module>,
    /// Assembly time left once the robot is at the depot.
    pub remaining: f64,
}

/// One robot bay.
#[derive(Debug, Clone, PartialEq)]
pub struct RobotState {
    /// Bay id.
    pub id: RobotId,
    /// Lifecycle status.
    pub status: RobotStatus,
    /// Current location.
    pub position: Position,
    /// Mounted modules, exclusively owned by this robot.
    pub modules: Vec<Module>,
    /// Template the robot was last built from.
    pub template: Option<String>,
    /// Task the robot holds (kept while `Failed` until re-planning).
    pub task: Option<TaskId>,
    /// Capability of the in-service modules.
    pub capability: CapabilityVector,
    /// Rebuild in flight while `Returning` or `Rebuilding`.
    pub pending: Option<PendingBuild>,
}

impl RobotState {
    /// An empty bay at `position`.
    pub fn empty(id: RobotId, position: Position) -> Self {
        Self {
            id,
            status: RobotStatus::Idle,
            position,
            modules: Vec::new(),
            template: None,
            task: None,
            capability: CapabilityVector::default(),
            pending: None,
        }
    }

    /// Whether the bay holds at least one working module.
    pub fn has_robot(&self) -> bool {
        self.modules.iter().any(Module::in_service)
    }

    /// Ids of the mounted modules, sorted.
    pub fn module_ids(&self) -> Vec<ModuleId> {
        let mut ids: Vec<ModuleId> = self.modules.iter().map(|m| m.id).collect();
        ids.sort_unstable();
        ids
    }

    /// Recompute `capability` from the in-service modules. An empty bay has
    /// an empty capability vector.
    pub fn refresh_capability(
        &mut self,
        model: &PerformanceModel,
        cache: &mut CapabilityCache,
    ) -> Result<(), ConfigurationError> {
        let composition = Composition::from_modules(&self.modules);
        self.capability = if composition.is_empty() {
            CapabilityVector::default()
        } else {
            cache.get_or_compute(model, &composition)?
        };
        Ok(())
    }

    /// Planner view of this bay.
    pub fn as_bay(&self) -> Bay<'_> {
        Bay {
            id: self.id,
            status: self.status,
            position: self.position,
            modules: &self.modules,
            task: self.task,
            rebuild: self.pending.as_ref().map(|p| Rebuild {
                template: p.build.template.as_str(),
                remaining: p.remaining,
            }),
        }
    }
}

/// Complete simulation state at a tick boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct SimSnapshot {
    /// Clock at this boundary.
    pub clock: SimClock,
    /// Bays in id order.
    pub robots: Vec<RobotState>,
    /// Open (incomplete) tasks.
    pub open_tasks: BTreeMap<TaskId, Task>,
    /// Completed tasks with their completion time.
    pub completed: BTreeMap<TaskId, f64>,
    /// Unassigned modules at the depot.
    pub pool: ModulePool,
    /// The plan currently being executed.
    pub plan: AllocationPlan,
}

impl SimSnapshot {
    /// The state before the first tick: every bay empty at the depot, every
    /// module pooled, every task open.
    ///
    /// # Errors
    ///
    /// [`ClockError::InvalidConfig`] for a bad time step, or a duplicate
    /// module id (already rejected by scenario validation).
    pub fn initial(scenario: &Scenario, time_step: f64) -> Result<Self, InitialStateError> {
        let clock = SimClock::new(time_step)?;
        let pool = ModulePool::from_modules(scenario.modules.iter().cloned())?;
        let robots = (0..scenario.max_robots)
            .map(|i| RobotState::empty(RobotId::new(i), scenario.depot))
            .collect();
        let open_tasks = scenario
            .tasks
            .iter()
            .filter(|t| !t.is_complete())
            .map(|t| (t.id, t.clone()))
            .collect();
        Ok(Self {
            clock,
            robots,
            open_tasks,
            completed: BTreeMap::new(),
            pool,
            plan: AllocationPlan::new(),
        })
    }

    /// Planner views of every bay.
    pub fn bays(&self) -> Vec<Bay<'_>> {
        self.robots.iter().map(RobotState::as_bay).collect()
    }

    /// A robot by id.
    pub fn robot(&self, id: RobotId) -> Option<&RobotState> {
        self.robots.iter().find(|r| r.id == id)
    }

    /// Whether every task is complete.
    pub fn all_tasks_complete(&self) -> bool {
        self.open_tasks.is_empty()
    }
}

/// Errors building the initial snapshot.
#[derive(Debug, thiserror::Error)]
pub enum InitialStateError {
    /// Bad time step.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },

    /// The module inventory could not be pooled.
    #[error("module pool error: {source}")]
    Pool {
        /// The underlying pool error.
        #[from]
        source: ConfigurationError,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use morota_model::{PerformanceParams, default_dimensions};
    use morota_types::{ModuleType, RequirementVector, RobotTemplate};

    fn scenario() -> Scenario {
        Scenario {
            name: String::from("s"),
            depot: Position::new(1.0, 2.0),
            max_robots: 3,
            tasks: vec![Task {
                id: TaskId::new(4),
                position: Position::new(5.0, 5.0),
                requirement: RequirementVector(vec![0.0, 0.0]),
                effort: 1.0,
                progress: 0.0,
            }],
            modules: vec![
                Module::new(ModuleId::new(0), ModuleType::Body),
                Module::new(ModuleId::new(1), ModuleType::Limb),
            ],
            templates: vec![RobotTemplate {
                name: String::from("Arm"),
                slots: 2,
                modules: BTreeMap::from([(ModuleType::Body, 1), (ModuleType::Limb, 1)]),
            }],
        }
    }

    #[test]
    fn initial_snapshot_has_empty_bays_at_depot() {
        let snapshot = SimSnapshot::initial(&scenario(), 1.0).unwrap();
        assert_eq!(snapshot.robots.len(), 3);
        assert!(snapshot.robots.iter().all(|r| !r.has_robot() && r.position == Position::new(1.0, 2.0)));
        assert_eq!(snapshot.pool.len(), 2);
        assert_eq!(snapshot.open_tasks.len(), 1);
        assert_eq!(snapshot.clock.tick(), 0);
    }

    #[test]
    fn refresh_capability_ignores_failed_modules() {
        let model = PerformanceModel::new(&PerformanceParams::default(), default_dimensions()).unwrap();
        let mut cache = CapabilityCache::new();
        let mut robot = RobotState::empty(RobotId::new(0), Position::default());
        robot.modules = vec![Module::new(ModuleId::new(0), ModuleType::Body)];
        robot.refresh_capability(&model, &mut cache).unwrap();
        assert_eq!(robot.capability.len(), 2);
        if let Some(m) = robot.modules.first_mut() {
            m.health = 0.0;
        }
        robot.refresh_capability(&model, &mut cache).unwrap();
        assert!(robot.capability.is_empty());
        assert!(!robot.has_robot());
    }

    #[test]
    fn pending_build_shows_as_a_rebuild_to_the_planner() {
        let mut robot = RobotState::empty(RobotId::new(1), Position::new(4.0, 0.0));
        robot.status = RobotStatus::Returning;
        robot.pending = Some(PendingBuild {
            build: RobotBuild {
                template: String::from("Arm"),
                modules: vec![ModuleId::new(0), ModuleId::new(1)],
            },
            reserved: vec![Module::new(ModuleId::new(1), ModuleType::Limb)],
            remaining: 1.5,
        });
        let bay = robot.as_bay();
        assert_eq!(
            bay.rebuild,
            Some(Rebuild {
                template: "Arm",
                remaining: 1.5
            })
        );
        assert!(bay.will_have_robot());
        assert!(!bay.has_robot());
    }

    #[test]
    fn bad_time_step_is_rejected() {
        assert!(matches!(
            SimSnapshot::initial(&scenario(), 0.0),
            Err(InitialStateError::Clock { .. })
        ));
    }
}
