//! Parametric performance model: module composition to capability vector.
//!
//! Every module type contributes through a logistic curve of its count,
//! `f_X(n) = 1 / (1 + exp(-s_X (n - t_X)))`, and a baseline curve of the
//! same shape is applied to the robot's total module count. Each capability
//! dimension then aggregates the baseline and per-type contributions with a
//! configurable rule.
//!
//! Curve parameters for each module type live in a lookup table
//! ([`PerformanceCurves`]) keyed by [`ModuleType`], so adding a module type
//! never touches this code beyond a table row.

use std::collections::BTreeMap;

use morota_types::{CapabilityVector, Composition, ModuleType};
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

// ---------------------------------------------------------------------------
// Curves
// ---------------------------------------------------------------------------

/// A single logistic curve `1 / (1 + exp(-slope (n - midpoint)))`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Curve {
    /// Steepness. Must be finite and non-negative.
    pub slope: f64,
    /// Count at which the curve evaluates to exactly one half.
    pub midpoint: f64,
}

impl Curve {
    /// Evaluate the curve at module count `n`.
    pub fn eval(self, n: f64) -> f64 {
        1.0 / (1.0 + (-self.slope * (n - self.midpoint)).exp())
    }

    fn validate(self, label: &str) -> Result<(), ConfigurationError> {
        if !self.slope.is_finite() || !self.midpoint.is_finite() {
            return Err(ConfigurationError::InvalidCurve {
                curve: label.to_owned(),
                reason: String::from("slope and midpoint must be finite"),
            });
        }
        if self.slope < 0.0 {
            return Err(ConfigurationError::InvalidCurve {
                curve: label.to_owned(),
                reason: format!("slope {} is negative", self.slope),
            });
        }
        Ok(())
    }
}

/// The eight scalar performance parameters, as read from configuration.
///
/// `s0`/`t0` shape the baseline curve; the remaining pairs shape the Body,
/// Limb and Wheel curves.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceParams {
    /// Baseline slope.
    #[serde(default = "default_baseline_slope")]
    pub s0: f64,
    /// Baseline midpoint (total module count).
    #[serde(default = "default_baseline_midpoint")]
    pub t0: f64,
    /// Body slope.
    #[serde(rename = "sB", default = "default_type_slope")]
    pub s_body: f64,
    /// Body midpoint.
    #[serde(rename = "tB", default = "default_type_midpoint")]
    pub t_body: f64,
    /// Limb slope.
    #[serde(rename = "sL", default = "default_type_slope")]
    pub s_limb: f64,
    /// Limb midpoint.
    #[serde(rename = "tL", default = "default_type_midpoint")]
    pub t_limb: f64,
    /// Wheel slope.
    #[serde(rename = "sW", default = "default_type_slope")]
    pub s_wheel: f64,
    /// Wheel midpoint.
    #[serde(rename = "tW", default = "default_type_midpoint")]
    pub t_wheel: f64,
}

const fn default_baseline_slope() -> f64 {
    1.0
}

const fn default_baseline_midpoint() -> f64 {
    2.0
}

const fn default_type_slope() -> f64 {
    1.5
}

const fn default_type_midpoint() -> f64 {
    1.0
}

impl Default for PerformanceParams {
    fn default() -> Self {
        Self {
            s0: default_baseline_slope(),
            t0: default_baseline_midpoint(),
            s_body: default_type_slope(),
            t_body: default_type_midpoint(),
            s_limb: default_type_slope(),
            t_limb: default_type_midpoint(),
            s_wheel: default_type_slope(),
            t_wheel: default_type_midpoint(),
        }
    }
}

/// Lookup table of logistic curves: one baseline plus one per module type.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceCurves {
    baseline: Curve,
    by_type: BTreeMap<ModuleType, Curve>,
}

impl PerformanceCurves {
    /// Build and validate the table from the eight scalar parameters.
    pub fn from_params(params: &PerformanceParams) -> Result<Self, ConfigurationError> {
        let baseline = Curve {
            slope: params.s0,
            midpoint: params.t0,
        };
        baseline.validate("baseline")?;

        let mut by_type = BTreeMap::new();
        for module_type in ModuleType::ALL {
            let (slope, midpoint) = match module_type {
                ModuleType::Body => (params.s_body, params.t_body),
                ModuleType::Limb => (params.s_limb, params.t_limb),
                ModuleType::Wheel => (params.s_wheel, params.t_wheel),
            };
            let curve = Curve { slope, midpoint };
            curve.validate(module_type.as_str())?;
            by_type.insert(module_type, curve);
        }
        Ok(Self { baseline, by_type })
    }

    /// The baseline curve.
    pub const fn baseline(&self) -> Curve {
        self.baseline
    }

    /// The curve of one module type.
    pub fn curve(&self, module_type: ModuleType) -> Option<Curve> {
        self.by_type.get(&module_type).copied()
    }
}

// ---------------------------------------------------------------------------
// Dimensions
// ---------------------------------------------------------------------------

/// How a dimension combines the baseline and per-type contributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// `(w0 f0 + sum w_X f_X) / (w0 + sum w_X)`.
    #[default]
    WeightedMean,
    /// `w0 f0 + sum w_X f_X`.
    WeightedSum,
    /// `f0^w0 * prod f_X^w_X`.
    Product,
}

/// Aggregation rule for one capability dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionRule {
    /// Dimension name, used in logs.
    pub name: String,
    /// Combination rule.
    #[serde(default)]
    pub aggregation: Aggregation,
    /// Weight of the baseline contribution.
    #[serde(default = "default_baseline_weight")]
    pub baseline_weight: f64,
    /// Weight per module type; missing types weigh zero.
    #[serde(default)]
    pub weights: BTreeMap<ModuleType, f64>,
}

const fn default_baseline_weight() -> f64 {
    1.0
}

impl DimensionRule {
    /// Weight of `module_type` in this dimension.
    pub fn weight(&self, module_type: ModuleType) -> f64 {
        self.weights.get(&module_type).copied().unwrap_or(0.0)
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        let invalid = |reason: String| ConfigurationError::InvalidDimension {
            dimension: self.name.clone(),
            reason,
        };
        let all_weights =
            std::iter::once(self.baseline_weight).chain(self.weights.values().copied());
        let mut total = 0.0;
        for weight in all_weights {
            if !weight.is_finite() || weight < 0.0 {
                return Err(invalid(format!("weight {weight} must be finite and >= 0")));
            }
            total += weight;
        }
        if total <= 0.0 {
            return Err(invalid(String::from("all weights are zero")));
        }
        Ok(())
    }

    fn combine(&self, baseline: f64, contributions: &BTreeMap<ModuleType, f64>) -> f64 {
        let weighted = contributions
            .iter()
            .map(|(&t, &f)| (self.weight(t), f));
        match self.aggregation {
            Aggregation::WeightedMean => {
                let (num, den) = weighted.fold(
                    (self.baseline_weight * baseline, self.baseline_weight),
                    |(num, den), (w, f)| (w.mul_add(f, num), den + w),
                );
                num / den
            }
            Aggregation::WeightedSum => {
                weighted.fold(self.baseline_weight * baseline, |acc, (w, f)| w.mul_add(f, acc))
            }
            Aggregation::Product => weighted
                .fold(baseline.powf(self.baseline_weight), |acc, (w, f)| {
                    acc * f.powf(w)
                }),
        }
    }
}

/// The default two dimensions: `mobility` and `manipulation`.
pub fn default_dimensions() -> Vec<DimensionRule> {
    let rule = |name: &str, body: f64, limb: f64, wheel: f64| DimensionRule {
        name: name.to_owned(),
        aggregation: Aggregation::WeightedMean,
        baseline_weight: 1.0,
        weights: BTreeMap::from([
            (ModuleType::Body, body),
            (ModuleType::Limb, limb),
            (ModuleType::Wheel, wheel),
        ]),
    };
    vec![
        rule("mobility", 2.0, 1.0, 2.0),
        rule("manipulation", 1.0, 3.0, 1.0),
    ]
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// Maps module compositions to capability vectors. Pure and thread-safe.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceModel {
    curves: PerformanceCurves,
    dimensions: Vec<DimensionRule>,
}

impl PerformanceModel {
    /// Build a model, validating every curve and dimension rule.
    pub fn new(
        params: &PerformanceParams,
        dimensions: Vec<DimensionRule>,
    ) -> Result<Self, ConfigurationError> {
        let curves = PerformanceCurves::from_params(params)?;
        if dimensions.is_empty() {
            return Err(ConfigurationError::NoDimensions);
        }
        for rule in &dimensions {
            rule.validate()?;
        }
        tracing::debug!(
            dimensions = dimensions.len(),
            names = ?dimensions.iter().map(|d| d.name.as_str()).collect::<Vec<_>>(),
            "performance model ready"
        );
        Ok(Self { curves, dimensions })
    }

    /// The curve lookup table.
    pub const fn curves(&self) -> &PerformanceCurves {
        &self.curves
    }

    /// Number of capability dimensions.
    pub const fn dimension_count(&self) -> usize {
        self.dimensions.len()
    }

    /// Dimension names in vector order.
    pub fn dimension_names(&self) -> Vec<&str> {
        self.dimensions.iter().map(|d| d.name.as_str()).collect()
    }

    /// Contribution `f_X(n)` of `n` modules of one type.
    pub fn contribution(&self, module_type: ModuleType, count: i64) -> f64 {
        self.curves
            .curve(module_type)
            .map_or(0.0, |c| c.eval(count_as_f64(count)))
    }

    /// Baseline contribution `f0(N)` for a robot with `total` modules.
    pub fn baseline(&self, total: i64) -> f64 {
        self.curves.baseline().eval(count_as_f64(total))
    }

    /// Compute the capability vector of a composition.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::NegativeCount`] if any count is negative.
    pub fn capability(&self, composition: &Composition) -> Result<CapabilityVector, ConfigurationError> {
        if let Some((module_type, count)) = composition.iter().find(|&(_, n)| n < 0) {
            return Err(ConfigurationError::NegativeCount { module_type, count });
        }

        let baseline = self.baseline(composition.total());
        let contributions: BTreeMap<ModuleType, f64> = ModuleType::ALL
            .into_iter()
            .map(|t| (t, self.contribution(t, composition.count(t))))
            .collect();

        Ok(CapabilityVector(
            self.dimensions
                .iter()
                .map(|rule| rule.combine(baseline, &contributions))
                .collect(),
        ))
    }
}

#[allow(clippy::cast_precision_loss)] // module counts are tiny
fn count_as_f64(n: i64) -> f64 {
    n as f64
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Memoizes capability vectors keyed by composition.
///
/// Owned by the single-threaded simulator; the optimizer calls the model
/// directly from its worker threads.
#[derive(Debug, Default)]
pub struct CapabilityCache {
    entries: BTreeMap<Composition, CapabilityVector>,
    hits: u64,
    misses: u64,
}

impl CapabilityCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached vector for `composition`, computing it on a miss.
    pub fn get_or_compute(
        &mut self,
        model: &PerformanceModel,
        composition: &Composition,
    ) -> Result<CapabilityVector, ConfigurationError> {
        if let Some(hit) = self.entries.get(composition) {
            self.hits = self.hits.saturating_add(1);
            return Ok(hit.clone());
        }
        let capability = model.capability(composition)?;
        self.misses = self.misses.saturating_add(1);
        self.entries.insert(composition.clone(), capability.clone());
        Ok(capability)
    }

    /// `(hits, misses)` since creation.
    pub const fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }

    /// Number of distinct compositions cached.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been cached yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
