//! Command-line runner for MOROTA.
//!
//! Loads configuration and a scenario, computes an initial plan, simulates
//! it and writes the per-tick log as JSON Lines.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `MOROTA_CONFIG` (default `morota-config.yaml`)
//! 2. Initialize structured logging (tracing)
//! 3. Load the scenario from `MOROTA_SCENARIO` (default `scenario.yaml`)
//! 4. Seed the run's RNG and plan from scratch
//! 5. Run the simulation
//! 6. Write the tick log to `MOROTA_LOG`, or stdout when unset

mod error;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use morota_core::{LogFormat, LoggingConfig, MorotaConfig, Scenario, Simulation, SimulationLog};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

/// Application entry point.
///
/// # Errors
///
/// Returns an error if any loading step, the simulation, or the log output
/// fails.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    init_logging(&config.logging);
    info!(
        seed = config.simulation.seed,
        max_ticks = config.simulation.max_ticks,
        time_step = config.simulation.time_step,
        dimensions = config.dimensions.len(),
        "Configuration loaded"
    );

    let scenario_path = env_path("MOROTA_SCENARIO", "scenario.yaml");
    let scenario = Scenario::from_file(&scenario_path, config.dimensions.len()).map_err(EngineError::from)?;

    let mut rng = StdRng::seed_from_u64(config.simulation.seed);
    let planned = morota_core::plan_from_scratch(&scenario, &config, &mut rng).map_err(EngineError::from)?;
    info!(
        objective = planned.objective,
        generations = planned.generations,
        builds = planned.plan.builds.len(),
        assignments = planned.plan.assignments.len(),
        "Initial plan ready"
    );
    if let Some(warning) = &planned.warning {
        warn!(%warning, "Initial plan is not fully feasible");
    }

    let outcome = Simulation::new(scenario, &config, planned.plan)
        .and_then(|sim| sim.run(&mut rng))
        .map_err(EngineError::from)?;

    write_log(&outcome.log)?;

    info!(
        end_reason = %outcome.end_reason,
        total_ticks = outcome.total_ticks,
        makespan = outcome.makespan,
        "morota-engine shutdown complete"
    );
    Ok(())
}

/// Install the tracing subscriber. `RUST_LOG` wins over `logging.level`.
/// Logs go to stderr so the tick log can own stdout.
fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    match logging.format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn env_path(var: &str, default: &str) -> PathBuf {
    std::env::var_os(var).map_or_else(|| PathBuf::from(default), PathBuf::from)
}

/// Load configuration, falling back to defaults when the file is absent.
fn load_config() -> Result<MorotaConfig, EngineError> {
    let config_path = env_path("MOROTA_CONFIG", "morota-config.yaml");
    if config_path.exists() {
        Ok(MorotaConfig::from_file(&config_path)?)
    } else {
        let mut config = MorotaConfig::default();
        config.simulation.apply_env_overrides()?;
        Ok(config)
    }
}

fn write_log(log: &SimulationLog) -> Result<(), EngineError> {
    let Some(path) = std::env::var_os("MOROTA_LOG") else {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        return log
            .write_jsonl(&mut lock)
            .and_then(|()| lock.flush())
            .map_err(|source| EngineError::Output {
                path: String::from("stdout"),
                source,
            });
    };
    let path = Path::new(&path);
    let output_error = |source| EngineError::Output {
        path: path.display().to_string(),
        source,
    };
    let file = File::create(path).map_err(output_error)?;
    log.write_jsonl(BufWriter::new(file)).map_err(output_error)?;
    info!(path = %path.display(), records = log.records().len(), "Tick log written");
    Ok(())
}
