//! Parameter grids and the phase applicability test.

use crate::error::{PlotError, Result};
use crate::expression::{normalize_symbol, Binding, Scope};
use crate::settings::{ParameterSetting, SingleStepSample};
use crate::trace::{ParameterDescriptor, ParameterMap, Trace};
use std::collections::BTreeMap;

/// How one free parameter is sampled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterSpec {
    Fixed { value: f64 },
    Ranged { min: f64, max: f64, steps: usize },
}

impl ParameterSpec {
    pub fn from_setting(name: &str, setting: &ParameterSetting) -> Result<Self> {
        if setting.fixed {
            return Ok(ParameterSpec::Fixed {
                value: setting.value,
            });
        }
        let steps = setting.value.floor();
        if !(steps >= 1.0) {
            return Err(PlotError::InvalidSettings(format!(
                "parameter {name} needs at least one step, got {}",
                setting.value
            )));
        }
        Ok(ParameterSpec::Ranged {
            min: setting.min_value,
            max: setting.max_value,
            steps: steps as usize,
        })
    }

    pub fn steps(&self) -> usize {
        match self {
            ParameterSpec::Fixed { .. } => 1,
            ParameterSpec::Ranged { steps, .. } => *steps,
        }
    }

    /// The representative values of this parameter, in ascending step order.
    pub fn values(&self, single_step: SingleStepSample) -> Vec<f64> {
        match *self {
            ParameterSpec::Fixed { value } => vec![value],
            ParameterSpec::Ranged { min, max, steps } if steps <= 1 => vec![match single_step {
                SingleStepSample::Max => max,
                SingleStepSample::Min => min,
                SingleStepSample::Midpoint => (min + max) / 2.0,
            }],
            ParameterSpec::Ranged { min, max, steps } => {
                let delta = (max - min) / (steps - 1) as f64;
                (0..steps)
                    .map(|j| if j + 1 == steps { max } else { min + j as f64 * delta })
                    .collect()
            }
        }
    }
}

/// Resolves how every parameter the trace declares is sampled, in declaration
/// order. Every declared parameter must have a setting.
pub fn parameter_specs(
    trace: &Trace,
    settings: &BTreeMap<String, ParameterSetting>,
) -> Result<Vec<(String, ParameterSpec)>> {
    let normalized: BTreeMap<String, &ParameterSetting> = settings
        .iter()
        .map(|(name, setting)| (normalize_symbol(name), setting))
        .collect();
    trace
        .parameter_names()
        .map(|name| {
            let setting = normalized
                .get(name)
                .ok_or_else(|| PlotError::MissingParameterSetting(name.to_string()))?;
            Ok((name.to_string(), ParameterSpec::from_setting(name, setting)?))
        })
        .collect()
}

/// One concrete assignment of values to the free parameters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterCondition {
    values: BTreeMap<String, f64>,
}

impl ParameterCondition {
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: AsRef<str>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(name, value)| (normalize_symbol(name.as_ref()), value))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(name, value)| (name.as_str(), *value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Scope for ParameterCondition {
    fn lookup(&self, name: &str) -> Option<Binding<'_>> {
        self.get(name).map(Binding::Value)
    }
}

/// Expands parameter specs into the Cartesian grid of conditions.
///
/// The first parameter varies slowest: every value of a later parameter is
/// visited before an earlier one advances. With no parameters the grid has
/// exactly one, empty, condition.
pub fn divide_parameters(
    specs: &[(String, ParameterSpec)],
    single_step: SingleStepSample,
) -> Vec<ParameterCondition> {
    let mut conditions: Vec<BTreeMap<String, f64>> = vec![BTreeMap::new()];
    for (name, spec) in specs {
        let values = spec.values(single_step);
        let key = normalize_symbol(name);
        let mut next = Vec::with_capacity(conditions.len() * values.len());
        for condition in &conditions {
            for &value in &values {
                let mut cell = condition.clone();
                cell.insert(key.clone(), value);
                next.push(cell);
            }
        }
        conditions = next;
    }
    conditions
        .into_iter()
        .map(|values| ParameterCondition { values })
        .collect()
}

/// Whether a phase applies under `condition`.
///
/// Sets are OR-ed and keys within a set are AND-ed. Keys the condition does
/// not mention are ignored. Descriptors are evaluated with the condition as
/// scope and compared with absolute tolerance `tolerance`.
pub fn matches_condition(
    parameter_maps: &[ParameterMap],
    condition: &ParameterCondition,
    tolerance: f64,
) -> Result<bool> {
    for map in parameter_maps {
        if set_matches(map, condition, tolerance)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn set_matches(map: &ParameterMap, condition: &ParameterCondition, tolerance: f64) -> Result<bool> {
    for (name, descriptor) in map {
        let Some(value) = condition.get(name) else {
            continue;
        };
        let included = match descriptor {
            ParameterDescriptor::Point(expr) => {
                let point = expr.evaluate(condition)?;
                (point - value).abs() <= tolerance
            }
            ParameterDescriptor::Interval { lower, upper } => {
                let lb = lower.evaluate(condition)?;
                let ub = upper.evaluate(condition)?;
                lb - tolerance <= value && value <= ub + tolerance
            }
        };
        if !included {
            return Ok(false);
        }
    }
    Ok(true)
}
