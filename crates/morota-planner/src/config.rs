//! Optimizer tuning parameters.

use serde::{Deserialize, Serialize};

/// Evolutionary search and objective parameters.
///
/// Every field has a default so a config file may list only the values it
/// wants to change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Candidates per generation.
    #[serde(default = "default_population_size")]
    pub population_size: usize,
    /// Generation budget per optimizer call.
    #[serde(default = "default_generations")]
    pub generations: u32,
    /// Stop early once the best objective has not improved for this many
    /// generations.
    #[serde(default = "default_stall_generations")]
    pub stall_generations: u32,
    /// Candidates compared per tournament.
    #[serde(default = "default_tournament_size")]
    pub tournament_size: usize,
    /// Probability that a child is produced by crossover rather than cloned.
    #[serde(default = "default_crossover_rate")]
    pub crossover_rate: f64,
    /// Per-gene reset probability.
    #[serde(default = "default_mutation_rate")]
    pub mutation_rate: f64,
    /// Best candidates copied unchanged into the next generation.
    #[serde(default = "default_elitism")]
    pub elitism: usize,
    /// Objective penalty per open task that no robot serves.
    #[serde(default = "default_unserved_penalty")]
    pub unserved_penalty: f64,
    /// Objective penalty per assignment whose robot cannot meet the
    /// task's requirement.
    #[serde(default = "default_infeasible_penalty")]
    pub infeasible_penalty: f64,
    /// Objective penalty per bay the plan (re)builds.
    #[serde(default = "default_rebuild_penalty")]
    pub rebuild_penalty: f64,
    /// Evaluate candidates on the rayon thread pool.
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

const fn default_population_size() -> usize {
    24
}

const fn default_generations() -> u32 {
    60
}

const fn default_stall_generations() -> u32 {
    15
}

const fn default_tournament_size() -> usize {
    3
}

const fn default_crossover_rate() -> f64 {
    0.9
}

const fn default_mutation_rate() -> f64 {
    0.1
}

const fn default_elitism() -> usize {
    2
}

const fn default_unserved_penalty() -> f64 {
    100.0
}

const fn default_infeasible_penalty() -> f64 {
    50.0
}

const fn default_rebuild_penalty() -> f64 {
    1.0
}

const fn default_parallel() -> bool {
    true
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            population_size: default_population_size(),
            generations: default_generations(),
            stall_generations: default_stall_generations(),
            tournament_size: default_tournament_size(),
            crossover_rate: default_crossover_rate(),
            mutation_rate: default_mutation_rate(),
            elitism: default_elitism(),
            unserved_penalty: default_unserved_penalty(),
            infeasible_penalty: default_infeasible_penalty(),
            rebuild_penalty: default_rebuild_penalty(),
            parallel: default_parallel(),
        }
    }
}

impl OptimizerConfig {
    /// Population size, at least one.
    pub fn effective_population(&self) -> usize {
        self.population_size.max(1)
    }

    /// Tournament size, at least one.
    pub fn effective_tournament(&self) -> usize {
        self.tournament_size.max(1)
    }

    /// Elite count, never the whole population.
    pub fn effective_elitism(&self) -> usize {
        self.elitism.min(self.effective_population().saturating_sub(1))
    }

    /// A rate clamped to `[0, 1]`; NaN counts as zero.
    pub(crate) const fn clamp_rate(rate: f64) -> f64 {
        if rate.is_nan() { 0.0 } else { rate.clamp(0.0, 1.0) }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let cfg: OptimizerConfig = serde_yml::from_str("generations: 5\nparallel: false\n").unwrap();
        assert_eq!(cfg.generations, 5);
        assert!(!cfg.parallel);
        assert_eq!(cfg.population_size, 24);
        assert_eq!(cfg.elitism, 2);
    }

    #[test]
    fn effective_values_are_sane() {
        let cfg = OptimizerConfig {
            population_size: 0,
            tournament_size: 0,
            elitism: 10,
            ..OptimizerConfig::default()
        };
        assert_eq!(cfg.effective_population(), 1);
        assert_eq!(cfg.effective_tournament(), 1);
        assert_eq!(cfg.effective_elitism(), 0);
        assert!(OptimizerConfig::clamp_rate(f64::NAN).abs() < f64::EPSILON);
        assert!((OptimizerConfig::clamp_rate(3.0) - 1.0).abs() < f64::EPSILON);
    }
}
