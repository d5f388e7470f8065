//! Scenario configuration: the per-run simulation options.
//!
//! `ScenarioOptions` is the serde-facing bag of settings. A `ScenarioConfig`
//! wraps one and is never mutated; a changed scenario is a new config.

use std::fmt;

use hn_core::{FlowUnits, UnitConverter};
use hn_network::Network;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HeadlossFormula {
    /// Hazen-Williams
    #[default]
    Hw,
    /// Darcy-Weisbach
    Dw,
    /// Chezy-Manning
    Cm,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "type")]
pub enum QualityModel {
    #[default]
    None,
    Chemical {
        name: String,
        #[serde(default = "default_chemical_units")]
        units: String,
        /// First order bulk reaction coefficient, 1/day.
        #[serde(default)]
        bulk_coeff: f64,
    },
    /// Water age in hours.
    Age,
    /// Percent of flow originating at `node`.
    Trace { node: String },
}

impl QualityModel {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, QualityModel::None)
    }
}

fn default_chemical_units() -> String {
    "mg/L".to_string()
}

/// Simulation options. Times are whole seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScenarioOptions {
    pub duration_s: u64,
    pub hydraulic_step_s: u64,
    pub quality_step_s: u64,
    pub report_step_s: u64,
    pub report_start_s: u64,
    pub pattern_step_s: u64,
    pub pattern_start_s: u64,
    /// Time of day at t = 0, for clock-time controls.
    pub start_clocktime_s: u64,
    pub flow_units: FlowUnits,
    pub headloss: HeadlossFormula,
    /// Relative to water at 20 °C.
    pub viscosity: f64,
    pub specific_gravity: f64,
    /// Convergence criterion: relative change in total flow.
    pub accuracy: f64,
    pub max_trials: u32,
    pub demand_multiplier: f64,
    pub emitter_exponent: f64,
    pub quality: QualityModel,
    pub quality_tolerance: f64,
}

impl Default for ScenarioOptions {
    fn default() -> Self {
        Self {
            duration_s: 24 * 3600,
            hydraulic_step_s: 3600,
            quality_step_s: 300,
            report_step_s: 3600,
            report_start_s: 0,
            pattern_step_s: 3600,
            pattern_start_s: 0,
            start_clocktime_s: 0,
            flow_units: FlowUnits::Lps,
            headloss: HeadlossFormula::Hw,
            viscosity: 1.0,
            specific_gravity: 1.0,
            accuracy: 0.001,
            max_trials: 40,
            demand_multiplier: 1.0,
            emitter_exponent: 0.5,
            quality: QualityModel::None,
            quality_tolerance: 0.01,
        }
    }
}

/// One violated constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid configuration: {}", list(violations))]
pub struct ConfigurationError {
    pub violations: Vec<Violation>,
}

fn list(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Frozen options for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioConfig {
    options: ScenarioOptions,
}

impl ScenarioConfig {
    pub fn create(options: ScenarioOptions) -> Self {
        Self { options }
    }

    /// `create` followed by `validate`.
    pub fn validated(options: ScenarioOptions) -> Result<Self, ConfigurationError> {
        let config = Self::create(options);
        config.validate()?;
        Ok(config)
    }

    pub fn options(&self) -> &ScenarioOptions {
        &self.options
    }

    pub fn duration_s(&self) -> u64 {
        self.options.duration_s
    }

    pub fn hydraulic_step_s(&self) -> u64 {
        self.options.hydraulic_step_s
    }

    pub fn quality(&self) -> &QualityModel {
        &self.options.quality
    }

    pub fn converter(&self) -> UnitConverter {
        UnitConverter::new(self.options.flow_units)
    }

    /// Number of reported instants, t = 0 included.
    ///
    /// A final partial step is cut short at the duration.
    pub fn step_count(&self) -> usize {
        let h = self.options.hydraulic_step_s.max(1);
        (self.options.duration_s.div_ceil(h) + 1) as usize
    }

    /// Check every constraint and report all violations together.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let violations = self.violations();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ConfigurationError { violations })
        }
    }

    /// `validate` plus checks against the network the run will use.
    pub fn validate_for(&self, network: &Network) -> Result<(), ConfigurationError> {
        let mut violations = self.violations();
        if let QualityModel::Trace { node } = &self.options.quality
            && !node.is_empty()
            && network.get_node(node).is_none()
        {
            violations.push(Violation {
                field: "quality.node",
                message: format!("trace node {node} is not in the network"),
            });
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ConfigurationError { violations })
        }
    }

    fn violations(&self) -> Vec<Violation> {
        let o = &self.options;
        let mut out = Vec::new();
        let mut push = |field: &'static str, message: String| {
            out.push(Violation { field, message });
        };

        if o.hydraulic_step_s == 0 {
            push("hydraulic_step_s", "must be positive".into());
        }
        if o.quality_step_s == 0 {
            push("quality_step_s", "must be positive".into());
        }
        if o.report_step_s == 0 {
            push("report_step_s", "must be positive".into());
        }
        if o.pattern_step_s == 0 {
            push("pattern_step_s", "must be positive".into());
        }
        if o.hydraulic_step_s > 0 {
            if o.duration_s < o.hydraulic_step_s {
                push(
                    "duration_s",
                    format!(
                        "{} is shorter than the hydraulic step {}",
                        o.duration_s, o.hydraulic_step_s
                    ),
                );
            }
            if o.report_step_s > 0 && o.report_step_s % o.hydraulic_step_s != 0 {
                push(
                    "report_step_s",
                    format!(
                        "{} is not a multiple of the hydraulic step {}",
                        o.report_step_s, o.hydraulic_step_s
                    ),
                );
            }
            if o.quality.is_enabled() && o.quality_step_s > o.hydraulic_step_s {
                push(
                    "quality_step_s",
                    "must not exceed the hydraulic step".into(),
                );
            }
        }
        if o.start_clocktime_s >= 86_400 {
            push(
                "start_clocktime_s",
                format!("{} is not a time of day", o.start_clocktime_s),
            );
        }
        if o.report_start_s > o.duration_s {
            push("report_start_s", "is after the end of the run".into());
        }
        if !(o.accuracy.is_finite() && o.accuracy > 0.0) {
            push("accuracy", format!("must be positive, got {}", o.accuracy));
        }
        if o.max_trials == 0 {
            push("max_trials", "must be at least 1".into());
        }
        if !(o.demand_multiplier.is_finite() && o.demand_multiplier >= 0.0) {
            push(
                "demand_multiplier",
                format!("must be non-negative, got {}", o.demand_multiplier),
            );
        }
        if !(o.viscosity.is_finite() && o.viscosity > 0.0) {
            push("viscosity", "must be positive".into());
        }
        if !(o.specific_gravity.is_finite() && o.specific_gravity > 0.0) {
            push("specific_gravity", "must be positive".into());
        }
        if !(o.emitter_exponent.is_finite() && o.emitter_exponent > 0.0) {
            push("emitter_exponent", "must be positive".into());
        }
        if !(o.quality_tolerance.is_finite() && o.quality_tolerance > 0.0) {
            push("quality_tolerance", "must be positive".into());
        }
        match &o.quality {
            QualityModel::Trace { node } if node.is_empty() => {
                push("quality.node", "trace node is required".into());
            }
            QualityModel::Chemical { bulk_coeff, .. } if !bulk_coeff.is_finite() => {
                push("quality.bulk_coeff", "must be finite".into());
            }
            _ => {}
        }
        out
    }
}
