//! Generational search: one call to [`evolve`] turns a population into the
//! next one.
//!
//! All randomness is drawn sequentially from the caller's RNG while
//! breeding; scoring happens afterwards, optionally on the rayon pool.
//! Because `par_iter().collect()` preserves order, parallel and sequential
//! runs produce identical populations.

use rand::Rng;
use rayon::prelude::*;

use crate::candidate::{Candidate, Fitness, SearchSpace};
use crate::config::OptimizerConfig;
use crate::operators::{crossover, greedy_seed, mutate, random_candidate, repair, tournament};

/// A candidate and its score.
#[derive(Debug, Clone, PartialEq)]
pub struct Scored {
    /// The candidate.
    pub candidate: Candidate,
    /// Its fitness ([`Fitness::WORST`] if it failed to decode).
    pub fitness: Fitness,
}

/// A generation, sorted best first.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Population {
    members: Vec<Scored>,
}

impl Population {
    fn from_scored(mut members: Vec<Scored>) -> Self {
        members.sort_by(|a, b| a.fitness.compare(b.fitness));
        Self { members }
    }

    /// Members, best first.
    pub fn members(&self) -> &[Scored] {
        &self.members
    }

    /// The best member.
    pub fn best(&self) -> Option<&Scored> {
        self.members.first()
    }

    /// Number of members.
    pub const fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the population is empty.
    pub const fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Summary of one generation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationMetrics {
    /// Best fitness in the new population.
    pub best_fitness: Fitness,
    /// Total of the best fitness.
    pub best_objective: f64,
    /// Mean of the finite objectives, or infinity if none is finite.
    pub mean_objective: f64,
}

impl GenerationMetrics {
    fn of(population: &Population) -> Self {
        let finite: Vec<f64> = population
            .members()
            .iter()
            .map(|s| s.fitness.total())
            .filter(|o| o.is_finite())
            .collect();
        let mean_objective = if finite.is_empty() {
            f64::INFINITY
        } else {
            finite.iter().sum::<f64>() / crate::candidate::count_f64(finite.len())
        };
        let best_fitness = population.best().map_or(Fitness::WORST, |s| s.fitness);
        Self {
            best_fitness,
            best_objective: best_fitness.total(),
            mean_objective,
        }
    }
}

fn score_all(space: &SearchSpace<'_>, config: &OptimizerConfig, candidates: Vec<Candidate>) -> Vec<Scored> {
    let score = |candidate: Candidate| {
        let fitness = space.fitness(&candidate);
        Scored { candidate, fitness }
    };
    if config.parallel {
        candidates.into_par_iter().map(score).collect()
    } else {
        candidates.into_iter().map(score).collect()
    }
}

/// The first generation: the greedy seed, the keep-everything candidate,
/// and random candidates up to the population size. Every member is
/// repaired before scoring.
pub fn initial_population<R: Rng + ?Sized>(space: &SearchSpace<'_>, rng: &mut R) -> Population {
    let config = space.config();
    let size = config.effective_population();
    let mut candidates = vec![greedy_seed(space), space.keep_candidate()];
    while candidates.len() < size {
        candidates.push(random_candidate(space, rng));
    }
    candidates.truncate(size);
    for candidate in &mut candidates {
        repair(space, candidate);
    }
    Population::from_scored(score_all(space, config, candidates))
}

/// Breed the next generation.
///
/// Elites carry over unchanged; the rest are children of two tournament
/// winners, crossed over with probability `crossover_rate`, mutated, and
/// repaired.
pub fn evolve<R: Rng + ?Sized>(
    population: &Population,
    space: &SearchSpace<'_>,
    rng: &mut R,
) -> (Population, GenerationMetrics) {
    let config = space.config();
    let size = config.effective_population();
    let crossover_rate = OptimizerConfig::clamp_rate(config.crossover_rate);
    let mutation_rate = OptimizerConfig::clamp_rate(config.mutation_rate);

    let elites: Vec<Scored> = population
        .members()
        .iter()
        .take(config.effective_elitism())
        .cloned()
        .collect();

    let mut children = Vec::with_capacity(size.saturating_sub(elites.len()));
    while elites.len().saturating_add(children.len()) < size {
        let parents = (
            tournament(population.members(), config.effective_tournament(), rng),
            tournament(population.members(), config.effective_tournament(), rng),
        );
        let (Some(a), Some(b)) = parents else {
            children.push(random_candidate(space, rng));
            continue;
        };
        let mut child = if rng.random_bool(crossover_rate) {
            crossover(a, b, rng)
        } else {
            a.clone()
        };
        mutate(&mut child, mutation_rate, space, rng);
        repair(space, &mut child);
        children.push(child);
    }

    let mut next = elites;
    next.extend(score_all(space, config, children));
    let next = Population::from_scored(next);
    let metrics = GenerationMetrics::of(&next);
    (next, metrics)
}
