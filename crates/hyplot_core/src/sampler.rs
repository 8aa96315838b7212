//! Sampling a single phase into 3D points.

use crate::error::{PlotError, Result};
use crate::expression::{parse, Binding, Expr, Scope};
use crate::geometry::SampledPoint;
use crate::parameter::ParameterCondition;
use crate::trace::{PhaseNode, PhaseTime};
use nalgebra::Point3;
use std::collections::BTreeMap;

/// Every interval phase gets at least this many steps, however coarse the
/// requested maximum step is.
pub const MIN_STEPS: usize = 10;

const TIME_VARIABLE: &str = "t";

/// The three user-chosen projection formulas.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisTriplet {
    pub x: Expr,
    pub y: Expr,
    pub z: Expr,
}

impl AxisTriplet {
    pub fn parse(x: &str, y: &str, z: &str) -> Result<Self> {
        let axis = |name: char, text: &str| {
            parse(text).map_err(|message| PlotError::AxisParse {
                axis: name,
                message,
            })
        };
        Ok(Self {
            x: axis('x', x)?,
            y: axis('y', y)?,
            z: axis('z', z)?,
        })
    }

    fn evaluate(&self, scope: &dyn Scope) -> Result<Point3<f64>> {
        Ok(Point3::new(
            self.x.evaluate(scope)?,
            self.y.evaluate(scope)?,
            self.z.evaluate(scope)?,
        ))
    }
}

/// Evaluation environment of one phase: the time variable, then the
/// phase's variable bindings, then the parameter condition.
struct PhaseScope<'a> {
    condition: &'a ParameterCondition,
    bindings: &'a BTreeMap<String, Expr>,
    time: Option<Binding<'a>>,
}

impl Scope for PhaseScope<'_> {
    fn lookup(&self, name: &str) -> Option<Binding<'_>> {
        if name == TIME_VARIABLE {
            if let Some(time) = self.time {
                return Some(time);
            }
        }
        if let Some(expr) = self.bindings.get(name) {
            return Some(Binding::Expr(expr));
        }
        self.condition.lookup(name)
    }
}

/// Samples one phase under `condition`.
///
/// Phases without simulated data produce nothing. A point phase produces one
/// discrete sample. An interval phase is sampled every
/// `min(max_step, span / MIN_STEPS)` from its start while before its end,
/// and always closes with a sample exactly at the end time.
pub fn sample_phase(
    phase: &PhaseNode,
    condition: &ParameterCondition,
    axes: &AxisTriplet,
    max_step: f64,
) -> Result<Vec<SampledPoint>> {
    if !phase.status.has_data() {
        return Ok(Vec::new());
    }
    if !(max_step > 0.0) {
        return Err(PlotError::InvalidSettings(format!(
            "sampling step must be positive, got {max_step}"
        )));
    }

    let mut scope = PhaseScope {
        condition,
        bindings: &phase.variable_bindings,
        time: None,
    };

    match &phase.time {
        PhaseTime::Point { time } => {
            scope.time = Some(Binding::Expr(time));
            Ok(vec![SampledPoint::new(axes.evaluate(&scope)?, true)])
        }
        PhaseTime::Interval { start, end } => {
            let start_time = start.evaluate(&scope)?;
            let end_time = end.evaluate(&scope)?;
            if !start_time.is_finite() || !end_time.is_finite() {
                return Err(PlotError::SimulationTiming {
                    start: start.to_string(),
                    end: end.to_string(),
                });
            }

            let span = end_time - start_time;
            let step = max_step.min(span / MIN_STEPS as f64);
            let mut points = Vec::new();
            if step > 0.0 {
                let mut k = 0usize;
                loop {
                    let t = start_time + k as f64 * step;
                    // A sample within rounding of the end is the end sample itself.
                    if t >= end_time || end_time - t <= step * 1e-9 {
                        break;
                    }
                    scope.time = Some(Binding::Value(t));
                    points.push(SampledPoint::new(axes.evaluate(&scope)?, false));
                    k += 1;
                }
            }
            scope.time = Some(Binding::Value(end_time));
            points.push(SampledPoint::new(axes.evaluate(&scope)?, false));
            Ok(points)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::SimulationStatus;

    fn axes(x: &str, y: &str, z: &str) -> AxisTriplet {
        AxisTriplet::parse(x, y, z).expect("axes")
    }

    fn interval(start: f64, end: f64) -> PhaseNode {
        PhaseNode::interval(Expr::constant(start), Expr::constant(end))
    }

    #[test]
    fn interval_step_is_capped_by_min_steps() {
        let condition = ParameterCondition::from_pairs([("p", 2.0)]);
        let points =
            sample_phase(&interval(0.0, 1.0), &condition, &axes("t", "p", "0"), 0.5).expect("sample");
        assert_eq!(points.len(), 11);
        for (k, point) in points.iter().enumerate() {
            assert!((point.position.x - k as f64 * 0.1).abs() < 1e-12);
            assert_eq!(point.position.y, 2.0);
            assert_eq!(point.position.z, 0.0);
            assert!(!point.is_discrete);
        }
        assert_eq!(points.last().expect("last").position.x, 1.0);
    }

    #[test]
    fn interval_always_ends_exactly_at_end_time() {
        let condition = ParameterCondition::default();
        for (start, end, step) in [(0.0, 0.3, 0.03), (0.1, 0.7, 0.05), (1.0, 4.0, 0.7), (0.0, 1e-3, 1.0)] {
            let points =
                sample_phase(&interval(start, end), &condition, &axes("t", "0", "0"), step).expect("sample");
            assert!(points.len() >= MIN_STEPS, "only {} points", points.len());
            assert_eq!(points.last().expect("last").position.x, end);
            assert!(points.windows(2).all(|w| w[0].position.x < w[1].position.x));
        }
    }

    #[test]
    fn fine_step_is_used_when_smaller() {
        let condition = ParameterCondition::default();
        let points =
            sample_phase(&interval(0.0, 1.0), &condition, &axes("t", "0", "0"), 0.01).expect("sample");
        assert_eq!(points.len(), 101);
    }

    #[test]
    fn point_phase_emits_one_discrete_sample() {
        let phase = PhaseNode::point(Expr::constant(3.0)).with_binding("x", parse("t * 2").expect("parse"));
        let points = sample_phase(
            &phase,
            &ParameterCondition::default(),
            &axes("t", "x", "1"),
            0.1,
        )
        .expect("sample");
        assert_eq!(points, vec![SampledPoint::new(Point3::new(3.0, 6.0, 1.0), true)]);
    }

    #[test]
    fn bindings_shadow_parameters() {
        let phase = interval(0.0, 1.0).with_binding("p", Expr::constant(5.0));
        let condition = ParameterCondition::from_pairs([("p", 2.0)]);
        let points = sample_phase(&phase, &condition, &axes("p", "0", "0"), 0.5).expect("sample");
        assert!(points.iter().all(|p| p.position.x == 5.0));
    }

    #[test]
    fn phases_without_data_are_skipped() {
        let phase = interval(0.0, 1.0).with_status(SimulationStatus::Other("INCONSISTENCY".into()));
        let points = sample_phase(&phase, &ParameterCondition::default(), &axes("t", "0", "0"), 0.1)
            .expect("sample");
        assert!(points.is_empty());
    }

    #[test]
    fn non_finite_bounds_are_a_timing_error() {
        let phase = PhaseNode::interval(Expr::constant(0.0), parse("1/0").expect("parse"));
        let err = sample_phase(&phase, &ParameterCondition::default(), &axes("t", "0", "0"), 0.1)
            .expect_err("timing");
        assert!(matches!(err, PlotError::SimulationTiming { .. }));
    }

    #[test]
    fn degenerate_interval_emits_only_the_endpoint() {
        let points = sample_phase(
            &interval(2.0, 2.0),
            &ParameterCondition::default(),
            &axes("t", "0", "0"),
            0.1,
        )
        .expect("sample");
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].position.x, 2.0);
    }

    #[test]
    fn axis_parse_errors_name_the_axis() {
        let err = AxisTriplet::parse("t", "x +", "0").expect_err("bad axis");
        assert!(matches!(err, PlotError::AxisParse { axis: 'y', .. }));
    }
}
