//! Shared type definitions for the MOROTA modular-robot task allocator.
//!
//! This crate is the single source of truth for the data model shared by the
//! performance model, the configuration optimizer and the simulation engine.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe integer wrappers for module, robot and task ids
//! - [`enums`] -- Module types, robot lifecycle states, task feasibility
//! - [`structs`] -- Modules, compositions, capability vectors, tasks, templates
//! - [`plan`] -- Allocation plans produced by the optimizer

pub mod enums;
pub mod ids;
pub mod plan;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{ModuleType, RobotStatus, TaskFeasibility};
pub use ids::{ModuleId, RobotId, TaskId};
pub use plan::{AllocationPlan, RobotBuild};
pub use structs::{
    ARRIVAL_EPSILON, CapabilityVector, Composition, Module, ModuleFailureEvent, Position,
    RequirementVector, RobotTemplate, Task,
};
