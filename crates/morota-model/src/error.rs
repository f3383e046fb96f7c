//! Error types for the `morota-model` crate.
//!
//! A [`ConfigurationError`] is fatal for the computation that raised it. The
//! optimizer recovers from it by discarding the offending candidate; at
//! model-construction time it signals malformed parameters and aborts the run.

use morota_types::{ModuleId, ModuleType};

/// Errors raised by the performance model, matcher and module pool.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigurationError {
    /// A composition contains a negative module count.
    #[error("negative count {count} for module type {module_type}")]
    NegativeCount {
        /// The offending module type.
        module_type: ModuleType,
        /// The negative count.
        count: i64,
    },

    /// A performance curve has a non-finite or out-of-range parameter.
    #[error("invalid performance curve for {curve}: {reason}")]
    InvalidCurve {
        /// Which curve (`baseline` or a module type name).
        curve: String,
        /// Explanation of what is wrong.
        reason: String,
    },

    /// A capability dimension has an invalid weight table.
    #[error("invalid capability dimension '{dimension}': {reason}")]
    InvalidDimension {
        /// Name of the dimension.
        dimension: String,
        /// Explanation of what is wrong.
        reason: String,
    },

    /// No capability dimensions were configured.
    #[error("at least one capability dimension must be configured")]
    NoDimensions,

    /// A dimension index points outside the configured capability vector.
    #[error("dimension index {index} out of range for {dimensions} capability dimensions")]
    UnknownDimension {
        /// The requested index.
        index: usize,
        /// Number of configured dimensions.
        dimensions: usize,
    },

    /// A kinematic or degradation parameter is non-finite or negative.
    #[error("invalid parameter {name}: {value}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// The module pool cannot satisfy a request.
    #[error("module pool short of {missing} {module_type} module(s)")]
    PoolDeficit {
        /// Module type in short supply.
        module_type: ModuleType,
        /// How many modules are missing.
        missing: u32,
    },

    /// A module id was requested that is not in the pool.
    #[error("module {0} is not in the pool")]
    ModuleNotInPool(ModuleId),

    /// A module id was returned twice or already exists in the pool.
    #[error("module {0} is already in the pool")]
    DuplicateModule(ModuleId),
}
