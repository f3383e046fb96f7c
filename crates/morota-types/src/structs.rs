//! Core entity structs: modules, compositions, capability vectors, tasks,
//! robot templates, and runtime events.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::enums::ModuleType;
use crate::ids::{ModuleId, RobotId, TaskId};

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// Distance below which two positions are treated as the same location.
pub const ARRIVAL_EPSILON: f64 = 1e-8;

/// A point in the 2-D task plane.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

impl Position {
    /// Create a position from its coordinates.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance_to(self, other: Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Move towards `target` by at most `max_distance`.
    ///
    /// Returns the new position and the distance actually travelled. The
    /// target is reached exactly (no overshoot) when it is within range.
    pub fn step_towards(self, target: Self, max_distance: f64) -> (Self, f64) {
        let dist = self.distance_to(target);
        if dist <= ARRIVAL_EPSILON || max_distance <= 0.0 {
            return if dist <= ARRIVAL_EPSILON {
                (target, dist)
            } else {
                (self, 0.0)
            };
        }
        if dist <= max_distance {
            return (target, dist);
        }
        let ratio = max_distance / dist;
        let next = Self {
            x: (target.x - self.x).mul_add(ratio, self.x),
            y: (target.y - self.y).mul_add(ratio, self.y),
        };
        (next, max_distance)
    }
}

// ---------------------------------------------------------------------------
// Modules
// ---------------------------------------------------------------------------

/// A physical module instance.
///
/// Modules are moved (never shared) between the pool and the robot that owns
/// them, so one module can never belong to two robots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    /// Persistent module identifier.
    pub id: ModuleId,
    /// The module's type.
    pub module_type: ModuleType,
    /// Remaining health in `[0, 1]`. Zero means out of service.
    pub health: f64,
    /// Accumulated fatigue used by stochastic failure models.
    pub fatigue: f64,
}

impl Module {
    /// A brand-new module at full health.
    pub const fn new(id: ModuleId, module_type: ModuleType) -> Self {
        Self {
            id,
            module_type,
            health: 1.0,
            fatigue: 0.0,
        }
    }

    /// Whether the module still contributes to its robot.
    pub fn in_service(&self) -> bool {
        self.health > 0.0
    }
}

/// A multiset of module types with signed counts.
///
/// Counts are signed so that degenerate compositions (for example, a
/// template minus more failures than it has modules) can be represented and
/// rejected by the performance model instead of silently saturating.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Composition {
    counts: BTreeMap<ModuleType, i64>,
}

impl Composition {
    /// An empty composition.
    pub const fn new() -> Self {
        Self {
            counts: BTreeMap::new(),
        }
    }

    /// Count the in-service modules of a robot.
    pub fn from_modules<'a>(modules: impl IntoIterator<Item = &'a Module>) -> Self {
        let mut composition = Self::new();
        for module in modules {
            if module.in_service() {
                composition.add(module.module_type, 1);
            }
        }
        composition
    }

    /// Build a composition from unsigned per-type counts.
    pub fn from_counts(counts: &BTreeMap<ModuleType, u32>) -> Self {
        let mut composition = Self::new();
        for (&module_type, &count) in counts {
            composition.add(module_type, i64::from(count));
        }
        composition
    }

    /// Return a copy with the count of `module_type` set to `count`.
    #[must_use]
    pub fn with(mut self, module_type: ModuleType, count: i64) -> Self {
        if count == 0 {
            self.counts.remove(&module_type);
        } else {
            self.counts.insert(module_type, count);
        }
        self
    }

    /// Add `delta` modules of `module_type` (may be negative).
    pub fn add(&mut self, module_type: ModuleType, delta: i64) {
        let entry = self.counts.entry(module_type).or_insert(0);
        *entry = entry.saturating_add(delta);
        if *entry == 0 {
            self.counts.remove(&module_type);
        }
    }

    /// Count of a single module type.
    pub fn count(&self, module_type: ModuleType) -> i64 {
        self.counts.get(&module_type).copied().unwrap_or(0)
    }

    /// Total module count across all types.
    pub fn total(&self) -> i64 {
        self.counts
            .values()
            .fold(0_i64, |acc, &n| acc.saturating_add(n))
    }

    /// Iterate over `(type, count)` pairs with non-zero counts.
    pub fn iter(&self) -> impl Iterator<Item = (ModuleType, i64)> + '_ {
        self.counts.iter().map(|(&t, &n)| (t, n))
    }

    /// Whether the composition has no modules at all.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Capability / requirement vectors
// ---------------------------------------------------------------------------

/// A robot's capability, one non-negative component per capability dimension.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityVector(pub Vec<f64>);

/// A task's minimum capability, one component per capability dimension.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequirementVector(pub Vec<f64>);

impl CapabilityVector {
    /// Number of dimensions.
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the vector has no dimensions.
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Component at `dimension`, or zero when out of range.
    pub fn component(&self, dimension: usize) -> f64 {
        self.0.get(dimension).copied().unwrap_or(0.0)
    }

    /// Component-wise `>=` against a requirement.
    ///
    /// Vectors of different length never dominate each other.
    pub fn dominates(&self, requirement: &RequirementVector) -> bool {
        self.0.len() == requirement.0.len()
            && self.0.iter().zip(&requirement.0).all(|(c, r)| c >= r)
    }
}

impl RequirementVector {
    /// Number of dimensions.
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the vector has no dimensions.
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// A spatial task with a capability requirement and a work budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Task identifier.
    pub id: TaskId,
    /// Where the work happens.
    pub position: Position,
    /// Minimum capability an assigned robot must dominate.
    pub requirement: RequirementVector,
    /// Total work units required.
    pub effort: f64,
    /// Work units accrued so far.
    pub progress: f64,
}

impl Task {
    /// Whether accumulated progress has reached the required effort.
    pub fn is_complete(&self) -> bool {
        self.progress >= self.effort
    }

    /// Work units still outstanding (never negative).
    pub fn remaining(&self) -> f64 {
        (self.effort - self.progress).max(0.0)
    }

    /// Fraction of the effort completed, in `[0, 1]`.
    pub fn progress_ratio(&self) -> f64 {
        if self.effort <= 0.0 {
            return 1.0;
        }
        (self.progress / self.effort).clamp(0.0, 1.0)
    }
}

// ---------------------------------------------------------------------------
// Robot templates
// ---------------------------------------------------------------------------

/// A buildable robot configuration: which modules go into which slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobotTemplate {
    /// Template name (unique within a scenario).
    pub name: String,
    /// Number of module slots on the frame.
    pub slots: u32,
    /// Modules required per type.
    pub modules: BTreeMap<ModuleType, u32>,
}

impl RobotTemplate {
    /// Total number of modules the template consumes.
    pub fn module_count(&self) -> u32 {
        self.modules.values().fold(0_u32, |acc, &n| acc.saturating_add(n))
    }

    /// Whether every module fits in a slot.
    pub fn fits_slots(&self) -> bool {
        self.module_count() <= self.slots
    }

    /// The composition of a freshly built robot of this template.
    pub fn composition(&self) -> Composition {
        Composition::from_counts(&self.modules)
    }
}

// ---------------------------------------------------------------------------
// Runtime events
// ---------------------------------------------------------------------------

/// A module went out of service while mounted on a robot.
///
/// This is an expected runtime occurrence, not an error: it drives the
/// robot's capability recomputation and possibly its `Failed` transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleFailureEvent {
    /// Tick during which the module failed.
    pub tick: u64,
    /// Robot that owned the module.
    pub robot: RobotId,
    /// The failed module.
    pub module: ModuleId,
    /// The failed module's type.
    pub module_type: ModuleType,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn step_towards_stops_at_target() {
        let start = Position::new(0.0, 0.0);
        let target = Position::new(3.0, 4.0);
        let (next, travelled) = start.step_towards(target, 10.0);
        assert_eq!(next, target);
        assert!((travelled - 5.0).abs() < 1e-12);
    }

    #[test]
    fn step_towards_moves_partially() {
        let start = Position::new(0.0, 0.0);
        let target = Position::new(10.0, 0.0);
        let (next, travelled) = start.step_towards(target, 2.5);
        assert!((next.x - 2.5).abs() < 1e-12);
        assert!(next.y.abs() < 1e-12);
        assert!((travelled - 2.5).abs() < 1e-12);
    }

    #[test]
    fn step_towards_without_speed_stays_put() {
        let start = Position::new(1.0, 1.0);
        let (next, travelled) = start.step_towards(Position::new(5.0, 5.0), 0.0);
        assert_eq!(next, start);
        assert!(travelled.abs() < f64::EPSILON);
    }

    #[test]
    fn composition_counts_only_in_service_modules() {
        let mut broken = Module::new(ModuleId::new(2), ModuleType::Body);
        broken.health = 0.0;
        let modules = vec![
            Module::new(ModuleId::new(1), ModuleType::Body),
            broken,
            Module::new(ModuleId::new(3), ModuleType::Wheel),
        ];
        let composition = Composition::from_modules(&modules);
        assert_eq!(composition.count(ModuleType::Body), 1);
        assert_eq!(composition.count(ModuleType::Wheel), 1);
        assert_eq!(composition.total(), 2);
    }

    #[test]
    fn composition_with_zero_removes_entry() {
        let composition = Composition::new()
            .with(ModuleType::Limb, 2)
            .with(ModuleType::Limb, 0);
        assert!(composition.is_empty());
    }

    #[test]
    fn dominance_is_reflexive() {
        let cap = CapabilityVector(vec![0.4, 0.2]);
        let req = RequirementVector(vec![0.4, 0.2]);
        assert!(cap.dominates(&req));
    }

    #[test]
    fn dominance_requires_every_component() {
        let cap = CapabilityVector(vec![0.9, 0.1]);
        assert!(!cap.dominates(&RequirementVector(vec![0.5, 0.2])));
    }

    #[test]
    fn dominance_rejects_dimension_mismatch() {
        let cap = CapabilityVector(vec![1.0, 1.0, 1.0]);
        assert!(!cap.dominates(&RequirementVector(vec![0.0, 0.0])));
    }

    #[test]
    fn task_completion_and_remaining() {
        let mut task = Task {
            id: TaskId::new(1),
            position: Position::default(),
            requirement: RequirementVector(vec![0.0, 0.0]),
            effort: 4.0,
            progress: 1.0,
        };
        assert!(!task.is_complete());
        assert!((task.remaining() - 3.0).abs() < 1e-12);
        task.progress = 4.5;
        assert!(task.is_complete());
        assert!(task.remaining().abs() < f64::EPSILON);
        assert!((task.progress_ratio() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn template_slot_check() {
        let mut modules = BTreeMap::new();
        modules.insert(ModuleType::Body, 1);
        modules.insert(ModuleType::Wheel, 4);
        let template = RobotTemplate {
            name: String::from("Rover"),
            slots: 4,
            modules,
        };
        assert_eq!(template.module_count(), 5);
        assert!(!template.fits_slots());
    }
}
