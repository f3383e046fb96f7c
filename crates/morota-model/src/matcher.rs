//! Capability/task matching: feasibility, kinematics, cost and ranking.

use std::cmp::Ordering;

use morota_types::{CapabilityVector, Position, RequirementVector, RobotId, Task, TaskId};
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Whether `capability` dominates `requirement` component-wise.
pub fn feasible(capability: &CapabilityVector, requirement: &RequirementVector) -> bool {
    capability.dominates(requirement)
}

/// Derives scalar speed and work throughput from a capability vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Kinematics {
    /// Distance per time unit at full capability in the speed dimension.
    #[serde(default = "default_max_speed")]
    pub max_speed: f64,
    /// Work units per time unit at full capability in the throughput dimension.
    #[serde(default = "default_max_throughput")]
    pub max_throughput: f64,
    /// Capability dimension that drives movement.
    #[serde(default)]
    pub speed_dimension: usize,
    /// Capability dimension that drives work.
    #[serde(default = "default_throughput_dimension")]
    pub throughput_dimension: usize,
    /// Time spent at the depot swapping modules during a rebuild.
    #[serde(default = "default_reconstruct_duration")]
    pub reconstruct_duration: f64,
}

const fn default_max_speed() -> f64 {
    2.0
}

const fn default_max_throughput() -> f64 {
    2.0
}

const fn default_throughput_dimension() -> usize {
    1
}

const fn default_reconstruct_duration() -> f64 {
    2.0
}

impl Default for Kinematics {
    fn default() -> Self {
        Self {
            max_speed: default_max_speed(),
            max_throughput: default_max_throughput(),
            speed_dimension: 0,
            throughput_dimension: default_throughput_dimension(),
            reconstruct_duration: default_reconstruct_duration(),
        }
    }
}

impl Kinematics {
    /// Check scalars and dimension indices against a model with
    /// `dimensions` capability components.
    pub fn validate(&self, dimensions: usize) -> Result<(), ConfigurationError> {
        for (name, value) in [
            ("max_speed", self.max_speed),
            ("max_throughput", self.max_throughput),
            ("reconstruct_duration", self.reconstruct_duration),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigurationError::InvalidParameter { name, value });
            }
        }
        for index in [self.speed_dimension, self.throughput_dimension] {
            if index >= dimensions {
                return Err(ConfigurationError::UnknownDimension { index, dimensions });
            }
        }
        Ok(())
    }

    /// Movement speed of a robot with this capability.
    pub fn speed(&self, capability: &CapabilityVector) -> f64 {
        self.max_speed * capability.component(self.speed_dimension)
    }

    /// Work throughput of a robot with this capability.
    pub fn throughput(&self, capability: &CapabilityVector) -> f64 {
        self.max_throughput * capability.component(self.throughput_dimension)
    }

    /// Time to complete `effort` work units, or infinity if the robot is
    /// infeasible for the requirement or cannot do work at all.
    pub fn cost(
        &self,
        capability: &CapabilityVector,
        requirement: &RequirementVector,
        effort: f64,
    ) -> f64 {
        if !feasible(capability, requirement) {
            return f64::INFINITY;
        }
        let throughput = self.throughput(capability);
        if throughput <= 0.0 {
            return f64::INFINITY;
        }
        effort.max(0.0) / throughput
    }

    /// Straight-line travel time between two locations.
    pub fn travel_time(&self, capability: &CapabilityVector, from: Position, to: Position) -> f64 {
        let distance = from.distance_to(to);
        if distance <= morota_types::ARRIVAL_EPSILON {
            return 0.0;
        }
        let speed = self.speed(capability);
        if speed <= 0.0 {
            return f64::INFINITY;
        }
        distance / speed
    }

    /// Time for a robot at `from` to get back to `depot`. Robots that
    /// cannot move (or have no modules left) are carried back at no cost.
    pub fn return_time(&self, capability: Option<&CapabilityVector>, from: Position, depot: Position) -> f64 {
        let time = capability.map_or(0.0, |cap| self.travel_time(cap, from, depot));
        if time.is_finite() { time } else { 0.0 }
    }

    /// Time until a robot at `from` leaves the depot rebuilt, with
    /// `remaining` assembly time still to go.
    pub fn rebuild_delay(
        &self,
        capability: Option<&CapabilityVector>,
        from: Position,
        depot: Position,
        remaining: f64,
    ) -> f64 {
        self.return_time(capability, from, depot) + remaining.max(0.0)
    }
}

/// A robot available for ranking.
#[derive(Debug, Clone, Copy)]
pub struct RankInput<'a> {
    /// Robot id, used as the secondary tie-break.
    pub robot: RobotId,
    /// The robot's capability.
    pub capability: &'a CapabilityVector,
    /// Where the robot currently is.
    pub position: Position,
}

/// A feasible (robot, task) pair with its cost.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedPair {
    /// The robot.
    pub robot: RobotId,
    /// The task.
    pub task: TaskId,
    /// Work time for the robot alone on the remaining effort.
    pub cost: f64,
    /// Distance from the robot to the task.
    pub distance: f64,
}

/// All feasible pairs ordered by `(cost, robot id, distance)`.
///
/// Pairs that would never finish (infinite cost) are omitted.
pub fn rank_candidates(
    kinematics: &Kinematics,
    robots: &[RankInput<'_>],
    tasks: &[&Task],
) -> Vec<RankedPair> {
    let mut pairs: Vec<RankedPair> = robots
        .iter()
        .flat_map(|r| {
            tasks.iter().filter_map(move |task| {
                let cost = kinematics.cost(r.capability, &task.requirement, task.remaining());
                cost.is_finite().then(|| RankedPair {
                    robot: r.robot,
                    task: task.id,
                    cost,
                    distance: r.position.distance_to(task.position),
                })
            })
        })
        .collect();
    pairs.sort_by(|a, b| {
        a.cost
            .total_cmp(&b.cost)
            .then_with(|| a.robot.cmp(&b.robot))
            .then_with(|| a.distance.total_cmp(&b.distance))
            .then_with(|| a.task.cmp(&b.task))
    });
    pairs
}

/// Deterministic ordering of two costs, treating NaN as worst.
pub fn compare_costs(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.total_cmp(&b),
    }
}
