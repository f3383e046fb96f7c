//! Per-tick simulation log.
//!
//! Each tick produces one [`TickRecord`]: robot positions, statuses and
//! capabilities, task progress, and the events that happened during the
//! tick. Records serialize with stable key order (all maps are `BTreeMap`),
//! so identical runs produce byte-identical JSON Lines output.

use std::collections::BTreeMap;
use std::io::Write;

use morota_types::{ModuleFailureEvent, ModuleId, Position, RobotId, RobotStatus, TaskId};
use serde::Serialize;

use crate::state::SimSnapshot;

/// Something that happened during a tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TickEvent {
    /// A bay was (re)built from pool modules.
    RobotBuilt {
        /// The bay.
        robot: RobotId,
        /// Template used.
        template: String,
        /// Modules mounted.
        modules: Vec<ModuleId>,
    },
    /// A rebuild was started and its missing modules reserved.
    RebuildStarted {
        /// The bay.
        robot: RobotId,
        /// Template being assembled.
        template: String,
        /// Whether the robot first travels back to the depot.
        returning: bool,
    },
    /// A returning robot reached the depot.
    ReturnedToDepot {
        /// The robot.
        robot: RobotId,
    },
    /// A robot was sent to a task.
    RobotDispatched {
        /// The robot.
        robot: RobotId,
        /// Its new task.
        task: TaskId,
    },
    /// A robot reached its task and started working.
    RobotArrived {
        /// The robot.
        robot: RobotId,
        /// The task.
        task: TaskId,
    },
    /// A mounted module went out of service.
    ModuleFailed(ModuleFailureEvent),
    /// A robot can no longer meet its task's requirement.
    RobotFailed {
        /// The robot.
        robot: RobotId,
        /// The task it held.
        task: TaskId,
    },
    /// A task reached its effort.
    TaskCompleted {
        /// The task.
        task: TaskId,
        /// Simulated completion time.
        time: f64,
    },
    /// The optimizer produced a new plan.
    Replanned {
        /// Generations run (zero when the previous plan was kept).
        generations: u32,
        /// Objective of the new plan, when finite.
        objective: Option<f64>,
        /// Open tasks no planned robot can serve.
        infeasible: Vec<TaskId>,
        /// Open tasks waiting for a free robot.
        deferred: Vec<TaskId>,
    },
}

/// A robot's state at the end of a tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RobotRecord {
    /// Lifecycle status.
    pub status: RobotStatus,
    /// Location.
    pub position: Position,
    /// Capability vector.
    pub capability: Vec<f64>,
    /// Task held, if any.
    pub task: Option<TaskId>,
    /// Template last built from.
    pub template: Option<String>,
    /// In-service modules mounted.
    pub modules: usize,
}

/// An open task's progress at the end of a tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TaskRecord {
    /// Work accrued.
    pub progress: f64,
    /// Work required.
    pub effort: f64,
    /// Progress as a fraction of effort, capped at one.
    pub ratio: f64,
}

/// One line of the tick log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickRecord {
    /// Tick number (0 is the state after the initial plan).
    pub tick: u64,
    /// Simulated time.
    pub time: f64,
    /// Every bay.
    pub robots: BTreeMap<RobotId, RobotRecord>,
    /// Open tasks.
    pub open_tasks: BTreeMap<TaskId, TaskRecord>,
    /// Completed tasks with their completion time.
    pub completed: BTreeMap<TaskId, f64>,
    /// Modules waiting at the depot.
    pub pool_size: usize,
    /// Events in the order they happened.
    pub events: Vec<TickEvent>,
}

impl TickRecord {
    /// Capture a snapshot and the tick's events.
    pub fn capture(snapshot: &SimSnapshot, events: Vec<TickEvent>) -> Self {
        Self {
            tick: snapshot.clock.tick(),
            time: snapshot.clock.elapsed(),
            robots: snapshot
                .robots
                .iter()
                .map(|r| {
                    (
                        r.id,
                        RobotRecord {
                            status: r.status,
                            position: r.position,
                            capability: r.capability.0.clone(),
                            task: r.task,
                            template: r.template.clone(),
                            modules: r.modules.iter().filter(|m| m.in_service()).count(),
                        },
                    )
                })
                .collect(),
            open_tasks: snapshot
                .open_tasks
                .values()
                .map(|t| {
                    (
                        t.id,
                        TaskRecord {
                            progress: t.progress,
                            effort: t.effort,
                            ratio: t.progress_ratio(),
                        },
                    )
                })
                .collect(),
            completed: snapshot.completed.clone(),
            pool_size: snapshot.pool.len(),
            events,
        }
    }
}

/// The full run log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationLog {
    records: Vec<TickRecord>,
}

impl SimulationLog {
    /// An empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record.
    pub fn push(&mut self, record: TickRecord) {
        self.records.push(record);
    }

    /// Records in tick order.
    pub fn records(&self) -> &[TickRecord] {
        &self.records
    }

    /// Every event of the run, in order, with its tick.
    pub fn events(&self) -> impl Iterator<Item = (u64, &TickEvent)> {
        self.records
            .iter()
            .flat_map(|r| r.events.iter().map(move |e| (r.tick, e)))
    }

    /// Write one JSON object per tick, newline-terminated.
    ///
    /// # Errors
    ///
    /// Propagates I/O and serialization errors.
    pub fn write_jsonl<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        for record in &self.records {
            serde_json::to_writer(&mut writer, record)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()
    }

    /// The JSON Lines rendering as a string.
    ///
    /// # Errors
    ///
    /// Propagates serialization errors.
    pub fn to_jsonl(&self) -> std::io::Result<String> {
        let mut buffer = Vec::new();
        self.write_jsonl(&mut buffer)?;
        String::from_utf8(buffer).map_err(std::io::Error::other)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::scenario::Scenario;
    use morota_types::{Module, ModuleType, RequirementVector, Task};

    fn snapshot() -> SimSnapshot {
        let scenario = Scenario {
            name: String::from("log"),
            depot: Position::default(),
            max_robots: 2,
            tasks: vec![Task {
                id: TaskId::new(1),
                position: Position::new(1.0, 0.0),
                requirement: RequirementVector(vec![0.0, 0.0]),
                effort: 2.0,
                progress: 0.0,
            }],
            modules: vec![Module::new(ModuleId::new(0), ModuleType::Wheel)],
            templates: Vec::new(),
        };
        SimSnapshot::initial(&scenario, 1.0).unwrap()
    }

    #[test]
    fn one_line_per_record_with_tagged_events() {
        let mut log = SimulationLog::new();
        log.push(TickRecord::capture(&snapshot(), Vec::new()));
        log.push(TickRecord::capture(
            &snapshot(),
            vec![TickEvent::TaskCompleted {
                task: TaskId::new(1),
                time: 3.0,
            }],
        ));
        let text = log.to_jsonl().unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["events"][0]["event"], "task_completed");
        assert_eq!(second["robots"]["1"]["status"], "Idle");
        assert_eq!(second["pool_size"], 1);
        assert_eq!(second["open_tasks"]["1"]["ratio"], 0.0);
        assert_eq!(log.events().count(), 1);
    }

    #[test]
    fn rebuild_events_are_tagged() {
        let mut log = SimulationLog::new();
        let mut snapshot = snapshot();
        snapshot.open_tasks.get_mut(&TaskId::new(1)).unwrap().progress = 1.0;
        log.push(TickRecord::capture(
            &snapshot,
            vec![
                TickEvent::RebuildStarted {
                    robot: RobotId::new(0),
                    template: String::from("Duo"),
                    returning: true,
                },
                TickEvent::ReturnedToDepot { robot: RobotId::new(0) },
            ],
        ));
        let line: serde_json::Value = serde_json::from_str(log.to_jsonl().unwrap().trim_end()).unwrap();
        assert_eq!(line["events"][0]["event"], "rebuild_started");
        assert_eq!(line["events"][0]["returning"], true);
        assert_eq!(line["events"][1]["event"], "returned_to_depot");
        assert_eq!(line["open_tasks"]["1"]["ratio"], 0.5);
    }

    #[test]
    fn rendering_is_stable() {
        let mut log = SimulationLog::new();
        log.push(TickRecord::capture(&snapshot(), Vec::new()));
        assert_eq!(log.to_jsonl().unwrap(), log.clone().to_jsonl().unwrap());
    }
}
