//! Genetic operators: seeding, selection, crossover, mutation and repair.

use std::collections::{BTreeMap, BTreeSet};

use morota_model::{RankInput, feasible, rank_candidates};
use morota_types::{CapabilityVector, Position, RobotId, TaskId};
use rand::Rng;

use crate::candidate::{Candidate, Gene, SearchSpace, reshapes, shortfall, take_counts};
use crate::search::Scored;

fn random_choice<R: Rng + ?Sized>(len: usize, rng: &mut R) -> Option<usize> {
    // Zero means "none"; the rest shift down by one.
    rng.random_range(0..=len).checked_sub(1)
}

/// A gene drawn uniformly from every template (plus "keep") and every open
/// task (plus "idle").
pub fn random_gene<R: Rng + ?Sized>(space: &SearchSpace<'_>, rng: &mut R) -> Gene {
    let problem = space.problem();
    Gene {
        build: random_choice(problem.templates.len(), rng),
        task: random_choice(problem.tasks().len(), rng),
    }
}

/// A uniformly random candidate.
pub fn random_candidate<R: Rng + ?Sized>(space: &SearchSpace<'_>, rng: &mut R) -> Candidate {
    Candidate {
        genes: (0..space.gene_count()).map(|_| random_gene(space, rng)).collect(),
    }
}

/// Deterministic greedy candidate.
///
/// Bays whose robot can serve no open task are rebuilt from the template
/// that can serve the most tasks (ties: higher throughput, then lower
/// template index), as far as the pool allows. Free robots are then matched
/// in [`rank_candidates`] order: first one robot per uncovered task, then
/// leftover robots join their cheapest task.
pub fn greedy_seed(space: &SearchSpace<'_>) -> Candidate {
    let problem = space.problem();
    let tasks = problem.tasks();
    let kinematics = problem.kinematics;
    let reach = |cap: &CapabilityVector| tasks.iter().filter(|t| feasible(cap, &t.requirement)).count();
    let template_caps: Vec<Option<CapabilityVector>> = problem
        .templates
        .iter()
        .map(|t| problem.model.capability(&t.composition()).ok())
        .collect();

    let mut available = problem.pool.counts();
    let mut genes = space.keep_candidate().genes;
    let mut robots: Vec<(RobotId, CapabilityVector, Position, usize)> = Vec::new();

    for (index, (bay, gene)) in space.free_bays().zip(genes.iter_mut()).enumerate() {
        let pending = bay.rebuild.and_then(|r| problem.template(r.template));
        let current = match pending {
            Some(template) => problem.model.capability(&template.composition()).ok(),
            None if bay.has_robot() => problem.model.capability(&bay.composition()).ok(),
            None => None,
        };
        let position = if bay.rebuild.is_some() { problem.depot } else { bay.position };
        let current_reach = current.as_ref().map_or(0, reach);

        let mut chosen = None;
        if current_reach == 0 && bay.rebuild.is_none() {
            let mut best: Option<(usize, usize, f64)> = None;
            for (t, cap) in template_caps.iter().enumerate() {
                let Some(cap) = cap else { continue };
                let coverage = reach(cap);
                let throughput = kinematics.throughput(cap);
                let better = best.is_none_or(|(_, c, tp)| coverage > c || (coverage == c && throughput > tp));
                if coverage > 0 && better {
                    let Some(template) = problem.templates.get(t) else { continue };
                    let mut trial = available.clone();
                    if take_counts(&mut trial, &shortfall(&template.modules, &bay.releasable())).is_ok() {
                        best = Some((t, coverage, throughput));
                    }
                }
            }
            let picked = best.and_then(|(t, _, _)| problem.templates.get(t).map(|template| (t, template)));
            if let Some((t, template)) = picked
                && take_counts(&mut available, &shortfall(&template.modules, &bay.releasable())).is_ok()
            {
                gene.build = Some(t);
                chosen = template_caps.get(t).cloned().flatten();
            }
        }

        match (chosen, current) {
            (Some(cap), _) => robots.push((bay.id, cap, problem.depot, index)),
            (None, Some(cap)) => robots.push((bay.id, cap, position, index)),
            (None, None) => {}
        }
    }

    let mut covered: BTreeSet<TaskId> = space.locked_bays().filter_map(|b| b.task).collect();
    let inputs: Vec<RankInput<'_>> = robots
        .iter()
        .map(|(id, cap, position, _)| RankInput {
            robot: *id,
            capability: cap,
            position: *position,
        })
        .collect();
    let pairs = rank_candidates(kinematics, &inputs, tasks);

    let mut assigned: BTreeMap<RobotId, TaskId> = BTreeMap::new();
    for pair in &pairs {
        if !assigned.contains_key(&pair.robot) && !covered.contains(&pair.task) {
            assigned.insert(pair.robot, pair.task);
            covered.insert(pair.task);
        }
    }
    for pair in &pairs {
        assigned.entry(pair.robot).or_insert(pair.task);
    }

    for (id, _, _, index) in &robots {
        if let (Some(task), Some(gene)) = (assigned.get(id), genes.get_mut(*index)) {
            gene.task = problem.task_index(*task);
        }
    }
    Candidate { genes }
}

/// Pick the best of `size` uniformly drawn members. Ties go to the earlier
/// member.
pub fn tournament<'p, R: Rng + ?Sized>(population: &'p [Scored], size: usize, rng: &mut R) -> Option<&'p Candidate> {
    if population.is_empty() {
        return None;
    }
    let mut best: Option<usize> = None;
    for _ in 0..size.max(1) {
        let i = rng.random_range(0..population.len());
        best = match best {
            None => Some(i),
            Some(b) => {
                let (Some(cur), Some(new)) = (population.get(b), population.get(i)) else {
                    continue;
                };
                match new.fitness.compare(cur.fitness) {
                    std::cmp::Ordering::Less => Some(i),
                    std::cmp::Ordering::Equal if i < b => Some(i),
                    _ => Some(b),
                }
            }
        };
    }
    best.and_then(|i| population.get(i)).map(|s| &s.candidate)
}

/// Uniform crossover: each half-gene comes from either parent with equal
/// probability.
pub fn crossover<R: Rng + ?Sized>(a: &Candidate, b: &Candidate, rng: &mut R) -> Candidate {
    Candidate {
        genes: a
            .genes
            .iter()
            .zip(&b.genes)
            .map(|(x, y)| Gene {
                build: if rng.random_bool(0.5) { x.build } else { y.build },
                task: if rng.random_bool(0.5) { x.task } else { y.task },
            })
            .collect(),
    }
}

/// Reset each half-gene to a random value with probability `rate`.
pub fn mutate<R: Rng + ?Sized>(candidate: &mut Candidate, rate: f64, space: &SearchSpace<'_>, rng: &mut R) {
    let problem = space.problem();
    for gene in &mut candidate.genes {
        if rng.random_bool(rate) {
            gene.build = random_choice(problem.templates.len(), rng);
        }
        if rng.random_bool(rate) {
            gene.task = random_choice(problem.tasks().len(), rng);
        }
    }
}

/// Make a candidate respect the pool and slot constraints.
///
/// Builds are resolved in bay order. A build the pool cannot cover, whose
/// template overflows its slots, or that would leave the bay unchanged is
/// dropped and the bay kept as is; so is any build on a bay already being
/// rebuilt. A bay left without a robot loses its task.
pub fn repair(space: &SearchSpace<'_>, candidate: &mut Candidate) {
    let problem = space.problem();
    let mut available = problem.pool.counts();
    for (bay, gene) in space.free_bays().zip(candidate.genes.iter_mut()) {
        if let Some(t) = gene.build {
            let fits = bay.rebuild.is_none()
                && problem.templates.get(t).is_some_and(|template| {
                    let mut trial = available.clone();
                    let ok = template.fits_slots()
                        && reshapes(template, bay)
                        && take_counts(&mut trial, &shortfall(&template.modules, &bay.releasable())).is_ok();
                    if ok {
                        available = trial;
                    }
                    ok
                });
            if !fits {
                gene.build = None;
            }
        }
        if gene.build.is_none() && !bay.will_have_robot() {
            gene.task = None;
        }
        if gene.task.is_some_and(|i| i >= problem.tasks().len()) {
            gene.task = None;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::candidate::Fitness;
    use crate::candidate::tests::{empty_bays, model, pool, task, template};
    use crate::config::OptimizerConfig;
    use crate::problem::PlanningProblem;
    use morota_model::Kinematics;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn greedy_builds_capable_robots_and_covers_tasks() {
        let model = model();
        let kin = Kinematics::default();
        let templates = [template("Solo", 1, 0), template("Duo", 2, 0)];
        let pool = pool(4, 0);
        let tasks = [task(1, [0.4, 0.0], 2.0), task(2, [0.4, 0.0], 6.0)];
        let problem = PlanningProblem::new(&model, &kin, &templates, &pool, Position::default(), empty_bays(3), &tasks);
        let config = OptimizerConfig::default();
        let space = SearchSpace::from_scratch(&problem, &config);
        let seed = greedy_seed(&space);

        let builds: Vec<Option<usize>> = seed.genes.iter().map(|g| g.build).collect();
        assert_eq!(builds, vec![Some(1), Some(1), None]);
        let covered: BTreeSet<usize> = seed.genes.iter().filter_map(|g| g.task).collect();
        assert_eq!(covered.len(), 2);
        let eval = space.evaluate(&seed).unwrap();
        assert_eq!(eval.unserved, 0);
        assert_eq!(eval.infeasible, 0);
    }

    #[test]
    fn greedy_is_deterministic() {
        let model = model();
        let kin = Kinematics::default();
        let templates = [template("Duo", 2, 0), template("Arm", 1, 2)];
        let pool = pool(4, 4);
        let tasks = [task(1, [0.4, 0.0], 2.0), task(2, [0.0, 0.4], 6.0), task(3, [0.2, 0.2], 1.0)];
        let problem = PlanningProblem::new(&model, &kin, &templates, &pool, Position::default(), empty_bays(3), &tasks);
        let config = OptimizerConfig::default();
        let space = SearchSpace::from_scratch(&problem, &config);
        assert_eq!(greedy_seed(&space), greedy_seed(&space));
    }

    #[test]
    fn repair_drops_uncoverable_builds_and_orphan_tasks() {
        let model = model();
        let kin = Kinematics::default();
        let templates = [template("Duo", 2, 0)];
        let pool = pool(3, 0);
        let tasks = [task(1, [0.0, 0.0], 1.0)];
        let problem = PlanningProblem::new(&model, &kin, &templates, &pool, Position::default(), empty_bays(2), &tasks);
        let config = OptimizerConfig::default();
        let space = SearchSpace::from_scratch(&problem, &config);
        let mut candidate = Candidate {
            genes: vec![
                Gene {
                    build: Some(0),
                    task: Some(0),
                },
                Gene {
                    build: Some(0),
                    task: Some(0),
                },
            ],
        };
        repair(&space, &mut candidate);
        assert_eq!(candidate.genes.first().and_then(|g| g.build), Some(0));
        assert_eq!(candidate.genes.get(1).copied(), Some(Gene::default()));
        assert!(space.evaluate(&candidate).is_ok());
    }

    #[test]
    fn random_candidates_stay_in_range() {
        let model = model();
        let kin = Kinematics::default();
        let templates = [template("Duo", 2, 0)];
        let pool = pool(2, 0);
        let tasks = [task(1, [0.0, 0.0], 1.0), task(2, [0.0, 0.0], 1.0)];
        let problem = PlanningProblem::new(&model, &kin, &templates, &pool, Position::default(), empty_bays(4), &tasks);
        let config = OptimizerConfig::default();
        let space = SearchSpace::from_scratch(&problem, &config);
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..50 {
            let c = random_candidate(&space, &mut rng);
            assert_eq!(c.genes.len(), 4);
            assert!(c.genes.iter().all(|g| g.build.is_none_or(|t| t < 1)));
            assert!(c.genes.iter().all(|g| g.task.is_none_or(|t| t < 2)));
        }
    }

    #[test]
    fn tournament_prefers_lower_penalty_then_cost() {
        let pop = vec![
            Scored {
                candidate: Candidate::default(),
                fitness: Fitness {
                    penalty: 0.0,
                    cost: 5.0,
                },
            },
            Scored {
                candidate: Candidate {
                    genes: vec![Gene::default()],
                },
                fitness: Fitness {
                    penalty: 0.0,
                    cost: 1.0,
                },
            },
        ];
        let mut rng = StdRng::seed_from_u64(1);
        let picked = tournament(&pop, 16, &mut rng).unwrap();
        assert_eq!(picked.genes.len(), 1);
        assert!(tournament(&[], 3, &mut rng).is_none());

        // A lower penalty beats any cost.
        let pop = vec![
            Scored {
                candidate: Candidate::default(),
                fitness: Fitness {
                    penalty: 100.0,
                    cost: 0.0,
                },
            },
            Scored {
                candidate: Candidate {
                    genes: vec![Gene::default()],
                },
                fitness: Fitness {
                    penalty: 0.0,
                    cost: 5000.0,
                },
            },
        ];
        let picked = tournament(&pop, 16, &mut rng).unwrap();
        assert_eq!(picked.genes.len(), 1);
    }
}
