//! Module degradation: how mounted modules lose health while a robot moves
//! or works.
//!
//! Three policies are available. `none` leaves modules untouched, `linear`
//! removes a fixed amount of health per time unit, and `weibull` accumulates
//! per-type fatigue and samples failure from the conditional Weibull
//! probability of failing during the step, given survival so far.

use std::collections::BTreeMap;

use morota_types::{Module, ModuleType};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// What a robot did during the step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activity {
    /// Travelling between locations.
    Move,
    /// Working on a task.
    Work,
}

/// Weibull fatigue-failure model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeibullModel {
    /// Scale, in fatigue units (about 63% of modules fail by `H = scale`).
    #[serde(default = "default_scale")]
    pub scale: f64,
    /// Shape.
    #[serde(default = "default_shape")]
    pub shape: f64,
    /// Fatigue per time unit while working, per module type.
    #[serde(default = "default_work_fatigue")]
    pub work_fatigue: BTreeMap<ModuleType, f64>,
    /// Fatigue per time unit while moving, per module type.
    #[serde(default = "default_move_fatigue")]
    pub move_fatigue: BTreeMap<ModuleType, f64>,
}

const fn default_scale() -> f64 {
    300.0
}

const fn default_shape() -> f64 {
    1.2
}

fn default_work_fatigue() -> BTreeMap<ModuleType, f64> {
    BTreeMap::from([
        (ModuleType::Body, 0.5),
        (ModuleType::Limb, 1.0),
        (ModuleType::Wheel, 0.0),
    ])
}

fn default_move_fatigue() -> BTreeMap<ModuleType, f64> {
    BTreeMap::from([
        (ModuleType::Body, 0.5),
        (ModuleType::Limb, 0.5),
        (ModuleType::Wheel, 1.0),
    ])
}

impl Default for WeibullModel {
    fn default() -> Self {
        Self {
            scale: default_scale(),
            shape: default_shape(),
            work_fatigue: default_work_fatigue(),
            move_fatigue: default_move_fatigue(),
        }
    }
}

impl WeibullModel {
    /// Fatigue rate for a module type under an activity.
    pub fn fatigue_rate(&self, activity: Activity, module_type: ModuleType) -> f64 {
        let table = match activity {
            Activity::Move => &self.move_fatigue,
            Activity::Work => &self.work_fatigue,
        };
        table.get(&module_type).copied().unwrap_or(0.0)
    }

    /// Cumulative failure probability `F(H) = 1 - exp(-(H / scale)^shape)`.
    pub fn failure_prob(&self, fatigue: f64) -> f64 {
        if fatigue <= 0.0 {
            return 0.0;
        }
        1.0 - (-(fatigue / self.scale).powf(self.shape)).exp()
    }

    /// Probability of failing while fatigue grows from `fatigue` by `delta`,
    /// given survival up to `fatigue`.
    pub fn failure_prob_step(&self, fatigue: f64, delta: f64) -> f64 {
        if delta <= 0.0 {
            return 0.0;
        }
        let before = self.failure_prob(fatigue);
        if before >= 1.0 {
            return 1.0;
        }
        let after = self.failure_prob(fatigue + delta);
        ((after - before) / (1.0 - before)).clamp(0.0, 1.0)
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        for (name, value) in [("weibull.scale", self.scale), ("weibull.shape", self.shape)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigurationError::InvalidParameter { name, value });
            }
        }
        let rates = self.work_fatigue.values().chain(self.move_fatigue.values());
        for &value in rates {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigurationError::InvalidParameter {
                    name: "weibull.fatigue",
                    value,
                });
            }
        }
        Ok(())
    }
}

/// How modules degrade during simulation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum DegradationPolicy {
    /// Modules never degrade.
    #[default]
    None,
    /// Deterministic health loss per time unit.
    Linear {
        /// Health lost per time unit of work.
        work_rate: f64,
        /// Health lost per time unit of movement.
        move_rate: f64,
    },
    /// Stochastic fatigue failure.
    Weibull(WeibullModel),
}

impl DegradationPolicy {
    /// Reject non-finite or negative rates.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        match self {
            Self::None => Ok(()),
            Self::Linear {
                work_rate,
                move_rate,
            } => {
                for (name, value) in [
                    ("linear.work_rate", *work_rate),
                    ("linear.move_rate", *move_rate),
                ] {
                    if !value.is_finite() || value < 0.0 {
                        return Err(ConfigurationError::InvalidParameter { name, value });
                    }
                }
                Ok(())
            }
            Self::Weibull(model) => model.validate(),
        }
    }

    /// Degrade one in-service module for `duration` time units of `activity`.
    ///
    /// Returns `true` if the module went out of service during this call.
    /// Only the Weibull policy draws from `rng`, exactly once per module
    /// whose fatigue increased.
    pub fn degrade<R: Rng + ?Sized>(
        &self,
        module: &mut Module,
        activity: Activity,
        duration: f64,
        rng: &mut R,
    ) -> bool {
        if !module.in_service() || duration <= 0.0 {
            return false;
        }
        match self {
            Self::None => false,
            Self::Linear {
                work_rate,
                move_rate,
            } => {
                let rate = match activity {
                    Activity::Move => *move_rate,
                    Activity::Work => *work_rate,
                };
                module.health = rate.mul_add(-duration, module.health).max(0.0);
                !module.in_service()
            }
            Self::Weibull(model) => {
                let delta = model.fatigue_rate(activity, module.module_type) * duration;
                if delta <= 0.0 {
                    return false;
                }
                let p = model.failure_prob_step(module.fatigue, delta);
                module.fatigue += delta;
                let roll: f64 = rng.random();
                if roll < p {
                    module.health = 0.0;
                    true
                } else {
                    module.health = (1.0 - model.failure_prob(module.fatigue)).max(f64::MIN_POSITIVE);
                    false
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use morota_types::ModuleId;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn none_policy_leaves_module_intact() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut m = Module::new(ModuleId::new(1), ModuleType::Limb);
        assert!(!DegradationPolicy::None.degrade(&mut m, Activity::Work, 100.0, &mut rng));
        assert!((m.health - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn linear_policy_fails_when_health_runs_out() {
        let mut rng = StdRng::seed_from_u64(1);
        let policy = DegradationPolicy::Linear {
            work_rate: 0.25,
            move_rate: 0.0,
        };
        let mut m = Module::new(ModuleId::new(1), ModuleType::Body);
        assert!(!policy.degrade(&mut m, Activity::Work, 1.0, &mut rng));
        assert!(!policy.degrade(&mut m, Activity::Move, 10.0, &mut rng));
        assert!(!policy.degrade(&mut m, Activity::Work, 2.0, &mut rng));
        assert!(policy.degrade(&mut m, Activity::Work, 1.0, &mut rng));
        assert!(!m.in_service());
        assert!(!policy.degrade(&mut m, Activity::Work, 1.0, &mut rng));
    }

    #[test]
    fn weibull_step_probability_is_conditional() {
        let model = WeibullModel::default();
        assert!(model.failure_prob(0.0).abs() < f64::EPSILON);
        assert!((model.failure_prob(model.scale) - (1.0 - (-1.0_f64).exp())).abs() < 1e-12);
        let p = model.failure_prob_step(100.0, 50.0);
        let expected = (model.failure_prob(150.0) - model.failure_prob(100.0))
            / (1.0 - model.failure_prob(100.0));
        assert!((p - expected).abs() < 1e-12);
        assert!(model.failure_prob_step(100.0, 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn weibull_accumulates_fatigue_and_reports_survival() {
        let mut rng = StdRng::seed_from_u64(3);
        let policy = DegradationPolicy::Weibull(WeibullModel {
            scale: 1.0e9,
            ..WeibullModel::default()
        });
        let mut m = Module::new(ModuleId::new(1), ModuleType::Wheel);
        assert!(!policy.degrade(&mut m, Activity::Move, 2.0, &mut rng));
        assert!((m.fatigue - 2.0).abs() < 1e-12);
        assert!(m.health < 1.0 && m.health > 0.99);
    }

    #[test]
    fn weibull_certain_failure() {
        let mut rng = StdRng::seed_from_u64(3);
        let policy = DegradationPolicy::Weibull(WeibullModel {
            scale: 1.0e-6,
            shape: 4.0,
            ..WeibullModel::default()
        });
        let mut m = Module::new(ModuleId::new(1), ModuleType::Limb);
        assert!(policy.degrade(&mut m, Activity::Work, 1.0, &mut rng));
        assert!(!m.in_service());
    }

    #[test]
    fn policy_parses_from_tagged_yaml() {
        let yaml = "policy: linear\nwork_rate: 0.1\nmove_rate: 0.05\n";
        let policy: DegradationPolicy = serde_yml::from_str(yaml).unwrap();
        assert_eq!(
            policy,
            DegradationPolicy::Linear {
                work_rate: 0.1,
                move_rate: 0.05
            }
        );
        let weibull: DegradationPolicy = serde_yml::from_str("policy: weibull\nshape: 2.0\n").unwrap();
        assert!(matches!(weibull, DegradationPolicy::Weibull(ref w) if (w.shape - 2.0).abs() < 1e-12));
    }

    #[test]
    fn negative_rate_is_invalid() {
        let policy = DegradationPolicy::Linear {
            work_rate: -1.0,
            move_rate: 0.0,
        };
        assert!(policy.validate().is_err());
    }
}
