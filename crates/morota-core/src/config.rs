//! Configuration loading and typed config structures for MOROTA.
//!
//! The canonical configuration lives in `morota-config.yaml` at the project
//! root. Every section and field has a default, so an empty file (or no
//! file at all) yields a runnable configuration.

use std::path::Path;

use morota_model::{
    ConfigurationError, DegradationPolicy, DimensionRule, Kinematics, PerformanceModel,
    PerformanceParams, default_dimensions,
};
use morota_planner::OptimizerConfig;
use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// `MOROTA_SEED` is set but is not an unsigned integer.
    #[error("MOROTA_SEED must be an unsigned integer, got '{value}'")]
    InvalidSeedOverride {
        /// The rejected value.
        value: String,
        /// Why it did not parse.
        #[source]
        source: std::num::ParseIntError,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration, mirroring `morota-config.yaml`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MorotaConfig {
    /// Run boundaries: seed, tick budget, time step.
    #[serde(default)]
    pub simulation: SimulationSection,

    /// The eight performance-curve scalars.
    #[serde(default)]
    pub performance: PerformanceParams,

    /// Capability dimensions and their aggregation rules.
    #[serde(default = "default_dimensions")]
    pub dimensions: Vec<DimensionRule>,

    /// Speed and throughput derivation.
    #[serde(default)]
    pub kinematics: Kinematics,

    /// Module wear model.
    #[serde(default)]
    pub degradation: DegradationPolicy,

    /// Optimizer parameters.
    #[serde(default)]
    pub optimizer: OptimizerConfig,

    /// Logging output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for MorotaConfig {
    fn default() -> Self {
        Self {
            simulation: SimulationSection::default(),
            performance: PerformanceParams::default(),
            dimensions: default_dimensions(),
            kinematics: Kinematics::default(),
            degradation: DegradationPolicy::default(),
            optimizer: OptimizerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl MorotaConfig {
    /// Load configuration from a YAML file.
    ///
    /// `MOROTA_SEED`, when set, overrides `simulation.seed`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::InvalidSeedOverride`] for a malformed `MOROTA_SEED`.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.simulation.apply_env_overrides()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string. No environment overrides are
    /// applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Build the performance model and check kinematics and degradation
    /// parameters against it.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigurationError`] found.
    pub fn build_model(&self) -> Result<PerformanceModel, ConfigurationError> {
        let model = PerformanceModel::new(&self.performance, self.dimensions.clone())?;
        self.kinematics.validate(model.dimension_count())?;
        self.degradation.validate()?;
        Ok(model)
    }
}

/// Run boundaries.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SimulationSection {
    /// Seed for the run's single RNG.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Tick budget. Reaching it with open tasks ends the run.
    #[serde(default = "default_max_ticks")]
    pub max_ticks: u64,

    /// Simulated time per tick.
    #[serde(default = "default_time_step")]
    pub time_step: f64,
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            max_ticks: default_max_ticks(),
            time_step: default_time_step(),
        }
    }
}

impl SimulationSection {
    /// Apply `MOROTA_SEED` if set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSeedOverride`] if it does not parse.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(value) = std::env::var("MOROTA_SEED") {
            self.seed = value
                .trim()
                .parse()
                .map_err(|source| ConfigError::InvalidSeedOverride { value, source })?;
        }
        Ok(())
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

const fn default_seed() -> u64 {
    42
}

const fn default_max_ticks() -> u64 {
    500
}

const fn default_time_step() -> f64 {
    1.0
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use morota_model::Aggregation;

    #[test]
    fn default_config_is_valid() {
        let config = MorotaConfig::default();
        assert_eq!(config.simulation.seed, 42);
        assert_eq!(config.simulation.max_ticks, 500);
        assert_eq!(config.dimensions.len(), 2);
        assert_eq!(config.degradation, DegradationPolicy::None);
        assert!(config.build_model().is_ok());
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r"
simulation:
  seed: 7
  max_ticks: 50
  time_step: 0.5

performance:
  s0: 1.2
  t0: 2.5
  sB: 2.0
  tB: 1.0
  sL: 1.0
  tL: 2.0
  sW: 1.5
  tW: 1.0

dimensions:
  - name: mobility
    aggregation: product
    baseline_weight: 0.5
    weights:
      Body: 1.0
      Wheel: 2.0
  - name: manipulation
    weights:
      Limb: 3.0

kinematics:
  max_speed: 3.0
  max_throughput: 1.5
  reconstruct_duration: 0.5

degradation:
  policy: weibull
  scale: 200.0
  shape: 1.5

optimizer:
  population_size: 16
  generations: 30
  parallel: false

logging:
  level: debug
  format: json
";
        let config = MorotaConfig::parse(yaml).unwrap();
        assert_eq!(config.simulation.seed, 7);
        assert!((config.simulation.time_step - 0.5).abs() < f64::EPSILON);
        assert!((config.performance.t_limb - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.dimensions.first().map(|d| d.aggregation), Some(Aggregation::Product));
        assert_eq!(config.dimensions.get(1).map(|d| d.aggregation), Some(Aggregation::WeightedMean));
        assert!((config.kinematics.reconstruct_duration - 0.5).abs() < f64::EPSILON);
        assert!(matches!(config.degradation, DegradationPolicy::Weibull(_)));
        assert_eq!(config.optimizer.population_size, 16);
        assert!(!config.optimizer.parallel);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.build_model().is_ok());
    }

    #[test]
    fn parse_minimal_yaml() {
        let config = MorotaConfig::parse("simulation:\n  max_ticks: 9\n").unwrap();
        assert_eq!(config.simulation.max_ticks, 9);
        assert_eq!(config.simulation.seed, 42);
        assert_eq!(config.optimizer, OptimizerConfig::default());
    }

    #[test]
    fn parse_empty_yaml() {
        assert_eq!(MorotaConfig::parse("").unwrap(), MorotaConfig::default());
    }

    #[test]
    fn bad_kinematics_dimension_fails_model_build() {
        let mut config = MorotaConfig::default();
        config.kinematics.speed_dimension = 5;
        assert!(matches!(
            config.build_model(),
            Err(ConfigurationError::UnknownDimension { index: 5, .. })
        ));
    }

    #[test]
    fn load_project_config_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("morota-config.yaml");
        if path.exists() {
            let config = MorotaConfig::from_file(&path);
            assert!(config.is_ok(), "Failed to load project config: {config:?}");
        }
    }
}
