//! Robot modelling for MOROTA: how module compositions turn into
//! capabilities, how capabilities are matched to tasks, how modules wear out,
//! and where unassigned modules wait.
//!
//! # Modules
//!
//! - [`performance`] -- Logistic performance curves and capability aggregation
//! - [`matcher`] -- Feasibility, kinematics, cost and candidate ranking
//! - [`degradation`] -- Health loss and fatigue-failure policies
//! - [`inventory`] -- The unassigned module pool
//! - [`error`] -- Configuration errors

pub mod degradation;
pub mod error;
pub mod inventory;
pub mod matcher;
pub mod performance;

pub use degradation::{Activity, DegradationPolicy, WeibullModel};
pub use error::ConfigurationError;
pub use inventory::ModulePool;
pub use matcher::{Kinematics, RankInput, RankedPair, compare_costs, feasible, rank_candidates};
pub use performance::{
    Aggregation, CapabilityCache, Curve, DimensionRule, PerformanceCurves, PerformanceModel,
    PerformanceParams, default_dimensions,
};
