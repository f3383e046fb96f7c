//! Scenario input: the depot, the fleet size, the module inventory, the
//! robot templates and the task set.
//!
//! A scenario is loaded from YAML into a loosely typed file form, then
//! converted and validated into a [`Scenario`]. All problems are reported as
//! [`ScenarioLoadError`] before any simulation starts.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use morota_types::{
    Module, ModuleId, ModuleType, Position, RequirementVector, RobotTemplate, Task, TaskId,
};
use serde::Deserialize;

/// Errors found while loading or validating a scenario.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioLoadError {
    /// Failed to read the scenario file.
    #[error("failed to read scenario file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Missing or malformed fields.
    #[error("failed to parse scenario YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A module or template names a type that does not exist.
    #[error("unknown module type '{name}'")]
    UnknownModuleType {
        /// The unrecognized name.
        name: String,
    },

    /// Two tasks share an id.
    #[error("duplicate task id {0}")]
    DuplicateTask(TaskId),

    /// Two modules share an id.
    #[error("duplicate module id {0}")]
    DuplicateModule(ModuleId),

    /// Two templates share a name.
    #[error("duplicate template '{0}'")]
    DuplicateTemplate(String),

    /// A task's effort is not a positive finite number.
    #[error("task {task} has invalid effort {effort}")]
    InvalidEffort {
        /// The offending task.
        task: TaskId,
        /// The rejected effort.
        effort: f64,
    },

    /// A task's requirement has the wrong number of components.
    #[error("task {task} requirement has {found} components, expected {expected}")]
    DimensionMismatch {
        /// The offending task.
        task: TaskId,
        /// Configured capability dimensions.
        expected: usize,
        /// Components supplied.
        found: usize,
    },

    /// A requirement component is negative or not finite.
    #[error("task {task} has an invalid requirement component {value}")]
    InvalidRequirement {
        /// The offending task.
        task: TaskId,
        /// The rejected component.
        value: f64,
    },

    /// A template needs more modules than it has slots.
    #[error("template '{name}' uses {modules} modules but has only {slots} slots")]
    TemplateOverflow {
        /// Template name.
        name: String,
        /// Modules the template consumes.
        modules: u32,
        /// Slots on the frame.
        slots: u32,
    },

    /// A module's initial fatigue is negative or not finite.
    #[error("module {module} has invalid fatigue {fatigue}")]
    InvalidFatigue {
        /// The offending module.
        module: ModuleId,
        /// The rejected value.
        fatigue: f64,
    },

    /// A module's initial health is outside `(0, 1]`.
    #[error("module {module} has invalid health {health}")]
    InvalidHealth {
        /// The offending module.
        module: ModuleId,
        /// The rejected value.
        health: f64,
    },

    /// A coordinate is not finite.
    #[error("non-finite coordinate in {what}")]
    InvalidPosition {
        /// Which entity carries the coordinate.
        what: String,
    },

    /// The fleet has no bays.
    #[error("max_robots must be at least 1")]
    NoBays,
}

impl From<serde_yml::Error> for ScenarioLoadError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

// ---------------------------------------------------------------------------
// File form
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScenarioFile {
    name: String,
    depot: [f64; 2],
    max_robots: u32,
    tasks: Vec<TaskEntry>,
    modules: Vec<ModuleEntry>,
    #[serde(default)]
    templates: Vec<TemplateEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TaskEntry {
    id: u32,
    position: [f64; 2],
    requirement: Vec<f64>,
    effort: f64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ModuleEntry {
    id: u32,
    #[serde(rename = "type")]
    module_type: String,
    #[serde(default)]
    fatigue: f64,
    #[serde(default = "full_health")]
    health: f64,
}

const fn full_health() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TemplateEntry {
    name: String,
    slots: u32,
    modules: BTreeMap<String, u32>,
}

fn parse_type(name: &str) -> Result<ModuleType, ScenarioLoadError> {
    ModuleType::from_name(name).ok_or_else(|| ScenarioLoadError::UnknownModuleType {
        name: name.to_owned(),
    })
}

// ---------------------------------------------------------------------------
// Scenario
// ---------------------------------------------------------------------------

/// A validated scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    /// Scenario name, used in logs.
    pub name: String,
    /// Where modules are stored and where rebuilt robots start.
    pub depot: Position,
    /// Number of robot bays.
    pub max_robots: u32,
    /// Tasks, in file order.
    pub tasks: Vec<Task>,
    /// Module inventory, all initially in the pool.
    pub modules: Vec<Module>,
    /// Buildable templates, in file order.
    pub templates: Vec<RobotTemplate>,
}

impl Scenario {
    /// Load and validate a scenario file.
    ///
    /// # Errors
    ///
    /// Any [`ScenarioLoadError`].
    pub fn from_file(path: &Path, dimensions: usize) -> Result<Self, ScenarioLoadError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents, dimensions)
    }

    /// Parse and validate a scenario from YAML.
    ///
    /// # Errors
    ///
    /// Any [`ScenarioLoadError`].
    pub fn from_yaml(yaml: &str, dimensions: usize) -> Result<Self, ScenarioLoadError> {
        let file: ScenarioFile = serde_yml::from_str(yaml)?;

        let tasks = file
            .tasks
            .into_iter()
            .map(|t| {
                let [x, y] = t.position;
                Task {
                    id: TaskId::new(t.id),
                    position: Position::new(x, y),
                    requirement: RequirementVector(t.requirement),
                    effort: t.effort,
                    progress: 0.0,
                }
            })
            .collect();

        let modules = file
            .modules
            .into_iter()
            .map(|m| {
                Ok(Module {
                    fatigue: m.fatigue,
                    health: m.health,
                    ..Module::new(ModuleId::new(m.id), parse_type(&m.module_type)?)
                })
            })
            .collect::<Result<Vec<_>, ScenarioLoadError>>()?;

        let templates = file
            .templates
            .into_iter()
            .map(|t| {
                let modules = t
                    .modules
                    .iter()
                    .map(|(name, &count)| Ok((parse_type(name)?, count)))
                    .collect::<Result<BTreeMap<_, _>, ScenarioLoadError>>()?;
                Ok(RobotTemplate {
                    name: t.name,
                    slots: t.slots,
                    modules,
                })
            })
            .collect::<Result<Vec<_>, ScenarioLoadError>>()?;

        let [depot_x, depot_y] = file.depot;
        let scenario = Self {
            name: file.name,
            depot: Position::new(depot_x, depot_y),
            max_robots: file.max_robots,
            tasks,
            modules,
            templates,
        };
        scenario.validate(dimensions)?;
        tracing::info!(
            scenario = %scenario.name,
            tasks = scenario.tasks.len(),
            modules = scenario.modules.len(),
            templates = scenario.templates.len(),
            max_robots = scenario.max_robots,
            "scenario loaded"
        );
        Ok(scenario)
    }

    /// Check ids, efforts, requirements, templates and coordinates.
    ///
    /// # Errors
    ///
    /// The first problem found, as a [`ScenarioLoadError`].
    pub fn validate(&self, dimensions: usize) -> Result<(), ScenarioLoadError> {
        if self.max_robots == 0 {
            return Err(ScenarioLoadError::NoBays);
        }
        check_position(self.depot, "depot")?;

        let mut task_ids = BTreeSet::new();
        for task in &self.tasks {
            if !task_ids.insert(task.id) {
                return Err(ScenarioLoadError::DuplicateTask(task.id));
            }
            check_position(task.position, &format!("task {}", task.id))?;
            if !task.effort.is_finite() || task.effort <= 0.0 {
                return Err(ScenarioLoadError::InvalidEffort {
                    task: task.id,
                    effort: task.effort,
                });
            }
            if task.requirement.len() != dimensions {
                return Err(ScenarioLoadError::DimensionMismatch {
                    task: task.id,
                    expected: dimensions,
                    found: task.requirement.len(),
                });
            }
            if let Some(&value) = task.requirement.0.iter().find(|v| !v.is_finite() || **v < 0.0) {
                return Err(ScenarioLoadError::InvalidRequirement { task: task.id, value });
            }
        }

        let mut module_ids = BTreeSet::new();
        for module in &self.modules {
            if !module_ids.insert(module.id) {
                return Err(ScenarioLoadError::DuplicateModule(module.id));
            }
            if !module.fatigue.is_finite() || module.fatigue < 0.0 {
                return Err(ScenarioLoadError::InvalidFatigue {
                    module: module.id,
                    fatigue: module.fatigue,
                });
            }
            if !(module.health > 0.0 && module.health <= 1.0) {
                return Err(ScenarioLoadError::InvalidHealth {
                    module: module.id,
                    health: module.health,
                });
            }
        }

        let mut names = BTreeSet::new();
        for template in &self.templates {
            if !names.insert(template.name.as_str()) {
                return Err(ScenarioLoadError::DuplicateTemplate(template.name.clone()));
            }
            if !template.fits_slots() {
                return Err(ScenarioLoadError::TemplateOverflow {
                    name: template.name.clone(),
                    modules: template.module_count(),
                    slots: template.slots,
                });
            }
        }
        Ok(())
    }

    /// Find a template by name.
    pub fn template(&self, name: &str) -> Option<&RobotTemplate> {
        self.templates.iter().find(|t| t.name == name)
    }
}

fn check_position(position: Position, what: &str) -> Result<(), ScenarioLoadError> {
    if position.x.is_finite() && position.y.is_finite() {
        Ok(())
    } else {
        Err(ScenarioLoadError::InvalidPosition {
            what: what.to_owned(),
        })
    }
}
