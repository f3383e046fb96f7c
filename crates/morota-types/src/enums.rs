//! Enumeration types for the MOROTA simulation.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Module types
// ---------------------------------------------------------------------------

/// The kind of a physical robot module.
///
/// Module types differ only in their performance-curve parameters, which
/// live in a lookup table keyed by this enum. Adding a type means adding a
/// variant here and a row to that table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ModuleType {
    /// Chassis module carrying power and the controller.
    Body,
    /// Articulated limb for manipulation and legged locomotion.
    Limb,
    /// Wheel for fast locomotion on flat ground.
    Wheel,
}

impl ModuleType {
    /// Every module type, in table order.
    pub const ALL: [Self; 3] = [Self::Body, Self::Limb, Self::Wheel];

    /// Parse a module type from its name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(name))
    }

    /// The canonical name of this module type.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Body => "Body",
            Self::Limb => "Limb",
            Self::Wheel => "Wheel",
        }
    }
}

impl core::fmt::Display for ModuleType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Robot lifecycle
// ---------------------------------------------------------------------------

/// Per-robot state machine: `Idle -> EnRoute -> Working -> (Idle | Failed)`,
/// with rebuilds going `Returning -> Rebuilding -> (EnRoute | Idle)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RobotStatus {
    /// Waiting for an assignment from the current plan.
    Idle,
    /// Travelling towards the assigned task's location.
    EnRoute,
    /// At the task location, accruing progress.
    Working,
    /// Capability dropped below the task requirement. Returns to `Idle`
    /// when the next re-optimization releases its task.
    Failed,
    /// Travelling back to the depot to be rebuilt.
    Returning,
    /// At the depot while modules are swapped.
    Rebuilding,
}

impl RobotStatus {
    /// Whether the robot currently holds a task.
    pub const fn is_busy(self) -> bool {
        matches!(self, Self::EnRoute | Self::Working)
    }

    /// Whether a rebuild is in flight.
    pub const fn in_rebuild(self) -> bool {
        matches!(self, Self::Returning | Self::Rebuilding)
    }
}

// ---------------------------------------------------------------------------
// Task feasibility
// ---------------------------------------------------------------------------

/// Planner verdict for one open task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TaskFeasibility {
    /// At least one robot is assigned to the task.
    Assigned,
    /// A robot of the planned fleet could serve the task, but none is free
    /// in this epoch.
    Deferred,
    /// No robot of the planned fleet dominates the task's requirement.
    Infeasible,
}
