//! Error types for the engine binary.
//!
//! [`EngineError`] wraps every failure mode between startup and writing
//! the tick log, so `main` can propagate with `?`.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: morota_core::ConfigError,
    },

    /// The scenario could not be loaded or validated.
    #[error("scenario error: {source}")]
    Scenario {
        /// The underlying scenario error.
        #[from]
        source: morota_core::ScenarioLoadError,
    },

    /// Planning or simulation failed.
    #[error("runner error: {source}")]
    Runner {
        /// The underlying runner error.
        #[from]
        source: morota_core::RunnerError,
    },

    /// Writing the tick log failed.
    #[error("failed to write tick log to {path}: {source}")]
    Output {
        /// Destination that failed.
        path: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}
