//! One plotted line: its axis formulas, traversal and drawn trajectories.

use crate::color::{palette, Color, INACTIVE_GRAY};
use crate::error::{PlotError, Result};
use crate::geometry::assemble_batch;
use crate::parameter::{divide_parameters, parameter_specs};
use crate::playback::PlottedTrajectory;
use crate::sampler::AxisTriplet;
use crate::settings::PlotSettings;
use crate::trace::Trace;
use crate::traits::{Clock, FrameScheduler, LineId, Notifier, Scene, ToastKind};
use crate::traversal::{
    CancelToken, CompletedLeaf, StepOutcome, TraversalConfig, TraversalEngine,
};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// How long a "plot failed" toast stays up.
pub const FAILURE_TOAST_MS: u32 = 3000;

/// The three axis formulas of a line, as typed by the user.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LineSetting {
    pub x: String,
    pub y: String,
    pub z: String,
}

impl LineSetting {
    pub fn new(x: &str, y: &str, z: &str) -> Self {
        Self {
            x: x.to_string(),
            y: y.to_string(),
            z: z.to_string(),
        }
    }

    pub fn is_complete(&self) -> bool {
        ![&self.x, &self.y, &self.z].iter().any(|axis| axis.trim().is_empty())
    }
}

/// Whether the line's axis formulas last parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    #[default]
    Unknown,
    Ready,
    NotReady,
}

/// Where a line stands after a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum LineProgress {
    /// The frame belonged to a traversal that has been replaced.
    Stale,
    Running,
    Completed,
    Interrupted,
    Failed(PlotError),
}

/// The host collaborators a line needs while plotting.
pub struct Host<'a> {
    pub scene: &'a mut dyn Scene,
    pub scheduler: &'a mut dyn FrameScheduler,
    pub clock: &'a dyn Clock,
    pub notifier: &'a mut dyn Notifier,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct LineStyle {
    line_width: f64,
    dot_spacing: f64,
}

pub struct PlotLine {
    id: LineId,
    setting: LineSetting,
    color_angle: f64,
    readiness: Readiness,
    engine: Option<TraversalEngine>,
    cancel: CancelToken,
    generation: u64,
    palette: Vec<Color>,
    style: LineStyle,
    trajectories: Vec<PlottedTrajectory>,
}

impl PlotLine {
    pub fn new(id: LineId, setting: LineSetting) -> Self {
        Self::after_generation(id, setting, 0)
    }

    /// A line whose frame requests are numbered after `generation`, so frames
    /// still queued for a line it replaces are never mistaken for its own.
    pub fn after_generation(id: LineId, setting: LineSetting, generation: u64) -> Self {
        Self {
            id,
            setting,
            color_angle: 0.0,
            readiness: Readiness::Unknown,
            engine: None,
            cancel: CancelToken::new(),
            generation,
            palette: Vec::new(),
            style: LineStyle {
                line_width: 1.0,
                dot_spacing: 10.0,
            },
            trajectories: Vec::new(),
        }
    }

    pub fn id(&self) -> LineId {
        self.id
    }

    pub fn setting(&self) -> &LineSetting {
        &self.setting
    }

    pub fn set_setting(&mut self, setting: LineSetting) {
        self.setting = setting;
        self.readiness = Readiness::Unknown;
    }

    pub fn readiness(&self) -> Readiness {
        self.readiness
    }

    pub fn color_angle(&self) -> f64 {
        self.color_angle
    }

    pub fn set_color_angle(&mut self, angle: f64) {
        self.color_angle = angle;
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_plotting(&self) -> bool {
        self.engine.is_some()
    }

    /// Trajectories drawn so far, in creation order.
    pub fn trajectories(&self) -> &[PlottedTrajectory] {
        &self.trajectories
    }

    /// Checks the axis formulas without plotting.
    pub fn check_axes(&mut self) -> Result<AxisTriplet> {
        match AxisTriplet::parse(&self.setting.x, &self.setting.y, &self.setting.z) {
            Ok(axes) => {
                self.readiness = Readiness::Ready;
                Ok(axes)
            }
            Err(err) => {
                self.readiness = Readiness::NotReady;
                Err(err)
            }
        }
    }

    /// Prepares a traversal of `trace` and schedules its first frame.
    ///
    /// Returns `Ok(false)` when an axis is still empty. Geometry of the
    /// previous plot is removed once the new request has been validated.
    pub fn start_plot(
        &mut self,
        trace: Option<&Trace>,
        settings: &PlotSettings,
        host: &mut Host<'_>,
    ) -> Result<bool> {
        self.cancel_plot();
        if !self.setting.is_complete() {
            return Ok(false);
        }
        let axes = self.check_axes()?;
        let trace = trace.ok_or(PlotError::UndefinedSimulation)?;
        settings.validate()?;
        let specs = parameter_specs(trace, &settings.parameter_condition)?;
        let conditions = divide_parameters(&specs, settings.single_step_sample);

        self.remove_plot(host.scene);
        self.palette = palette(conditions.len(), self.color_angle);
        self.style = LineStyle {
            line_width: settings.line_width,
            dot_spacing: settings.dot_spacing,
        };
        self.cancel = CancelToken::new();
        info!(
            "Plotting line {} ({}, {}, {}) over {} condition(s)",
            self.id.0,
            self.setting.x,
            self.setting.y,
            self.setting.z,
            conditions.len()
        );
        self.engine = Some(TraversalEngine::new(
            Rc::clone(&trace.phases),
            axes,
            conditions,
            TraversalConfig::from(settings),
            self.cancel.clone(),
        ));
        host.scheduler.request_frame(self.id, self.generation);
        Ok(true)
    }

    /// Drops any traversal in flight and plots again from scratch.
    pub fn replot(
        &mut self,
        trace: Option<&Trace>,
        settings: &PlotSettings,
        host: &mut Host<'_>,
    ) -> Result<bool> {
        self.cancel_plot();
        self.start_plot(trace, settings, host)
    }

    /// Interrupts the traversal in flight, if any. Frames already requested
    /// for it become stale.
    pub fn cancel_plot(&mut self) {
        self.cancel.cancel();
        if let Some(mut engine) = self.engine.take() {
            engine.interrupt();
            warn!("Plot of line {} is interrupted", self.id.0);
        }
        self.generation += 1;
    }

    /// Serves one frame request made with `generation`.
    pub fn resume(&mut self, generation: u64, host: &mut Host<'_>) -> LineProgress {
        if generation != self.generation {
            return LineProgress::Stale;
        }
        let Some(mut engine) = self.engine.take() else {
            return LineProgress::Stale;
        };

        let zoom = host.scene.zoom_scale();
        let scene = &mut *host.scene;
        let trajectories = &mut self.trajectories;
        let palette = &self.palette;
        let style = self.style;
        let mut on_leaf = |leaf: CompletedLeaf| {
            let color = palette
                .get(leaf.condition_index)
                .copied()
                .unwrap_or(INACTIVE_GRAY);
            let batch = assemble_batch(
                &leaf.points,
                color,
                style.line_width,
                style.dot_spacing,
                zoom,
            );
            let batch = scene.add_segment_batch(batch);
            let marker = scene.add_marker(color);
            trajectories.push(PlottedTrajectory {
                condition_index: leaf.condition_index,
                color,
                samples: leaf.samples,
                batch,
                marker,
            });
        };

        match engine.resume(host.clock, &mut on_leaf) {
            Ok(StepOutcome::Yielded) => {
                self.engine = Some(engine);
                host.scheduler.request_frame(self.id, self.generation);
                LineProgress::Running
            }
            Ok(StepOutcome::Completed) => {
                info!(
                    "Line {} finished with {} trajectories",
                    self.id.0,
                    self.trajectories.len()
                );
                LineProgress::Completed
            }
            Ok(StepOutcome::Interrupted) => LineProgress::Interrupted,
            Err(err) => {
                let message = err.failure_message();
                error!("Line {}: {}", self.id.0, message);
                host.notifier.toast(&message, FAILURE_TOAST_MS, ToastKind::Error);
                LineProgress::Failed(err)
            }
        }
    }

    /// Removes every segment batch and marker of this line from the scene.
    pub fn remove_plot(&mut self, scene: &mut dyn Scene) {
        for trajectory in self.trajectories.drain(..) {
            scene.remove(trajectory.batch);
            scene.remove(trajectory.marker);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{FrameQueue, ManualClock, MemoryScene, RecordingNotifier};
    use crate::settings::ParameterSetting;

    const TRACE: &str = r#"{
        "name": "ball",
        "variables": ["y"],
        "parameters": {"p": {"lower_bounds": [{"value": "0"}], "upper_bounds": [{"value": "10"}]}},
        "first_phases": [{
            "type": "PP",
            "time": {"time_point": "0"},
            "variable_map": {"y": {"unique_value": "p"}},
            "parameter_maps": [{}],
            "simulation_state": "SIMULATED",
            "children": [{
                "type": "IP",
                "time": {"start_time": "0", "end_time": "1"},
                "variable_map": {"y": {"unique_value": "p - t"}},
                "parameter_maps": [{"p": {"lower_bounds": [{"value": "0"}], "upper_bounds": [{"value": "10"}]}}],
                "simulation_state": "TIME_LIMIT",
                "children": []
            }]
        }]
    }"#;

    struct Fixture {
        scene: MemoryScene,
        queue: FrameQueue,
        clock: ManualClock,
        notifier: RecordingNotifier,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                scene: MemoryScene::new(),
                queue: FrameQueue::new(),
                clock: ManualClock::new(0.0),
                notifier: RecordingNotifier::new(),
            }
        }

        fn host(&mut self) -> Host<'_> {
            Host {
                scene: &mut self.scene,
                scheduler: &mut self.queue,
                clock: &self.clock,
                notifier: &mut self.notifier,
            }
        }

        fn run(&mut self, line: &mut PlotLine) -> LineProgress {
            let mut last = LineProgress::Stale;
            while !self.queue.is_empty() {
                for (_, generation) in self.queue.drain() {
                    last = line.resume(generation, &mut self.host());
                }
            }
            last
        }
    }

    fn settings(steps: usize) -> PlotSettings {
        let mut settings = PlotSettings::default();
        settings
            .parameter_condition
            .insert("p".to_string(), ParameterSetting::ranged(2.0, 4.0, steps));
        settings
    }

    #[test]
    fn plots_one_trajectory_per_condition() {
        let trace = Trace::from_json(TRACE).expect("trace");
        let mut fixture = Fixture::new();
        let mut line = PlotLine::new(LineId(0), LineSetting::new("t", "y", "0"));

        assert!(line
            .start_plot(Some(&trace), &settings(3), &mut fixture.host())
            .expect("start"));
        assert_eq!(line.readiness(), Readiness::Ready);
        assert_eq!(fixture.run(&mut line), LineProgress::Completed);
        assert!(!line.is_plotting());

        let trajectories = line.trajectories();
        assert_eq!(trajectories.len(), 3);
        assert_eq!(fixture.scene.marker_count(), 3);
        assert_eq!(fixture.scene.segment_batches().count(), 3);
        // Fine track: root point plus 101 samples over [0, 1].
        assert_eq!(trajectories[0].samples.len(), 102);
        assert_eq!(trajectories[2].samples[0].y, 4.0);
        assert_ne!(trajectories[0].color, trajectories[1].color);
    }

    #[test]
    fn replot_drops_stale_frames_and_old_geometry() {
        let trace = Trace::from_json(TRACE).expect("trace");
        let mut fixture = Fixture::new();
        let mut line = PlotLine::new(LineId(0), LineSetting::new("t", "y", "0"));

        line.start_plot(Some(&trace), &settings(2), &mut fixture.host())
            .expect("first");
        fixture.run(&mut line);
        assert_eq!(line.trajectories().len(), 2);

        line.start_plot(Some(&trace), &settings(1), &mut fixture.host())
            .expect("second");
        let stale = line.generation() - 1;
        assert_eq!(line.resume(stale, &mut fixture.host()), LineProgress::Stale);
        fixture.run(&mut line);
        assert_eq!(line.trajectories().len(), 1);
        assert_eq!(fixture.scene.len(), 2);
    }

    #[test]
    fn replot_while_yielded_discards_the_partial_plot() {
        let trace = Trace::from_json(TRACE).expect("trace");
        let mut fixture = Fixture::new();
        let mut line = PlotLine::new(LineId(0), LineSetting::new("t", "y", "0"));
        let mut eager = settings(3);
        eager.yield_threshold_ms = 0.0;

        line.start_plot(Some(&trace), &eager, &mut fixture.host())
            .expect("first");
        for _ in 0..2 {
            let requests = fixture.queue.drain();
            assert_eq!(requests.len(), 1);
            let progress = line.resume(requests[0].1, &mut fixture.host());
            assert_eq!(progress, LineProgress::Running);
        }
        assert!(line.is_plotting());
        assert_eq!(line.trajectories().len(), 1);
        let pending = fixture.queue.drain();
        assert_eq!(pending.len(), 1);

        let mut replacement = settings(2);
        replacement.yield_threshold_ms = 0.0;
        line.replot(Some(&trace), &replacement, &mut fixture.host())
            .expect("replot");
        assert!(line.trajectories().is_empty());
        assert!(fixture.scene.is_empty());
        assert_eq!(line.resume(pending[0].1, &mut fixture.host()), LineProgress::Stale);

        assert_eq!(fixture.run(&mut line), LineProgress::Completed);
        let trajectories = line.trajectories();
        assert_eq!(trajectories.len(), 2);
        assert_eq!(trajectories[0].condition_index, 0);
        assert_eq!(trajectories[1].condition_index, 1);
        assert_eq!(fixture.scene.marker_count(), 2);
        assert_eq!(fixture.scene.segment_batches().count(), 2);
    }

    #[test]
    fn bad_axis_marks_line_not_ready() {
        let trace = Trace::from_json(TRACE).expect("trace");
        let mut fixture = Fixture::new();
        let mut line = PlotLine::new(LineId(0), LineSetting::new("t", "y +", "0"));
        let err = line
            .start_plot(Some(&trace), &settings(1), &mut fixture.host())
            .expect_err("axis");
        assert!(matches!(err, PlotError::AxisParse { axis: 'y', .. }));
        assert_eq!(line.readiness(), Readiness::NotReady);
        assert!(fixture.queue.is_empty());
    }

    #[test]
    fn empty_axis_plots_nothing_and_missing_trace_is_an_error() {
        let mut fixture = Fixture::new();
        let mut line = PlotLine::new(LineId(0), LineSetting::new("t", "", "0"));
        assert!(!line
            .start_plot(None, &settings(1), &mut fixture.host())
            .expect("empty axis"));

        line.set_setting(LineSetting::new("t", "y", "0"));
        let err = line
            .start_plot(None, &settings(1), &mut fixture.host())
            .expect_err("no trace");
        assert_eq!(err, PlotError::UndefinedSimulation);
    }

    #[test]
    fn traversal_failure_is_toasted_and_aborts() {
        let broken = TRACE.replace(r#""end_time": "1""#, r#""end_time": "1/0""#);
        let trace = Trace::from_json(&broken).expect("trace");
        let mut fixture = Fixture::new();
        let mut line = PlotLine::new(LineId(0), LineSetting::new("t", "y", "0"));
        line.start_plot(Some(&trace), &settings(1), &mut fixture.host())
            .expect("start");

        let progress = fixture.run(&mut line);
        assert!(matches!(
            progress,
            LineProgress::Failed(PlotError::SimulationTiming { .. })
        ));
        assert!(!line.is_plotting());
        let toasts = fixture.notifier.take_toasts();
        assert_eq!(toasts.len(), 1);
        assert!(toasts[0].message.starts_with("Plot failed: SimulationTimingError("));
        assert_eq!(toasts[0].duration_ms, FAILURE_TOAST_MS);
        assert_eq!(toasts[0].kind, ToastKind::Error);
    }

    #[test]
    fn missing_parameter_setting_is_reported() {
        let trace = Trace::from_json(TRACE).expect("trace");
        let mut fixture = Fixture::new();
        let mut line = PlotLine::new(LineId(0), LineSetting::new("t", "y", "0"));
        let err = line
            .start_plot(Some(&trace), &PlotSettings::default(), &mut fixture.host())
            .expect_err("missing p");
        assert_eq!(err, PlotError::MissingParameterSetting("p".to_string()));
    }
}
