//! Plot configuration.
//!
//! These structs mirror what the host persists; the core only reads them.

use crate::error::{PlotError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which value a ranged parameter with a single step is sampled at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SingleStepSample {
    #[default]
    Max,
    Min,
    Midpoint,
}

/// Per-parameter setting: either fixed at `value`, or swept from
/// `min_value` to `max_value` in `floor(value)` steps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterSetting {
    pub fixed: bool,
    pub value: f64,
    #[serde(default)]
    pub min_value: f64,
    #[serde(default)]
    pub max_value: f64,
}

impl ParameterSetting {
    pub fn fixed(value: f64) -> Self {
        Self {
            fixed: true,
            value,
            min_value: value,
            max_value: value,
        }
    }

    pub fn ranged(min_value: f64, max_value: f64, steps: usize) -> Self {
        Self {
            fixed: false,
            value: steps as f64,
            min_value,
            max_value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotSettings {
    /// Maximum time step of the static polyline.
    pub plot_interval: f64,
    /// Maximum time step of the animation track. One sample per tick.
    pub animation_step: f64,
    pub line_width: f64,
    /// Wall-clock budget of one traversal burst before it yields.
    pub yield_threshold_ms: f64,
    /// Absolute tolerance of the parameter containment test.
    pub containment_tolerance: f64,
    /// Dash length of discrete jumps, in world units at zoom 1.
    pub dot_spacing: f64,
    /// Plots that finish faster than this do not raise a "finished" toast.
    pub finished_toast_after_ms: f64,
    pub single_step_sample: SingleStepSample,
    pub parameter_condition: BTreeMap<String, ParameterSetting>,
}

impl Default for PlotSettings {
    fn default() -> Self {
        Self {
            plot_interval: 0.1,
            animation_step: 0.01,
            line_width: 1.0,
            yield_threshold_ms: 200.0,
            containment_tolerance: 1e-4,
            dot_spacing: 10.0,
            finished_toast_after_ms: 1000.0,
            single_step_sample: SingleStepSample::Max,
            parameter_condition: BTreeMap::new(),
        }
    }
}

impl PlotSettings {
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("plot_interval", self.plot_interval),
            ("animation_step", self.animation_step),
            ("dot_spacing", self.dot_spacing),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(PlotError::InvalidSettings(format!(
                    "{name} must be positive and finite, got {value}"
                )));
            }
        }
        if !(self.containment_tolerance >= 0.0) {
            return Err(PlotError::InvalidSettings(format!(
                "containment_tolerance must be non-negative, got {}",
                self.containment_tolerance
            )));
        }
        if !(self.line_width >= 0.0) || !(self.yield_threshold_ms >= 0.0) {
            return Err(PlotError::InvalidSettings(
                "line_width and yield_threshold_ms must be non-negative".to_string(),
            ));
        }
        for (name, setting) in &self.parameter_condition {
            if !setting.fixed && setting.value.floor() < 1.0 {
                return Err(PlotError::InvalidSettings(format!(
                    "parameter {name} needs at least one step, got {}",
                    setting.value
                )));
            }
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        use anyhow::Context;
        let settings: PlotSettings =
            serde_json::from_str(json).context("Invalid plot settings JSON")?;
        settings.validate()?;
        Ok(settings)
    }
}
