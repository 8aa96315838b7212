//! The set of plot lines drawn over one loaded trace.

use crate::error::{PlotError, Result};
use crate::geometry::build_ribbons;
use crate::line::{Host, LineProgress, LineSetting, PlotLine};
use crate::playback::{PlaybackCursor, PlottedTrajectory};
use crate::settings::PlotSettings;
use crate::trace::Trace;
use crate::traits::{LineId, Scene, SceneHandle, ToastKind};
use log::{debug, info};
use nalgebra::Point3;
use std::collections::BTreeMap;

pub const FINISHED_MESSAGE: &str = "Plot finished.";
pub const FINISHED_TOAST_MS: u32 = 1000;

pub struct PlotLineMap {
    lines: BTreeMap<usize, PlotLine>,
    next_index: usize,
    trace: Option<Trace>,
    settings: PlotSettings,
    cursor: PlaybackCursor,
    ribbons: Vec<SceneHandle>,
    plot_started_ms: Option<f64>,
    /// Highest generation reached by any line that has been dropped.
    retired_generation: u64,
}

impl PlotLineMap {
    pub fn new(settings: PlotSettings) -> Self {
        Self {
            lines: BTreeMap::new(),
            next_index: 0,
            trace: None,
            settings,
            cursor: PlaybackCursor::new(),
            ribbons: Vec::new(),
            plot_started_ms: None,
            retired_generation: 0,
        }
    }

    pub fn settings(&self) -> &PlotSettings {
        &self.settings
    }

    /// Replaces the plot settings. Takes effect on the next replot.
    pub fn set_settings(&mut self, settings: PlotSettings) -> Result<()> {
        settings.validate()?;
        self.settings = settings;
        Ok(())
    }

    pub fn trace(&self) -> Option<&Trace> {
        self.trace.as_ref()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line(&self, id: LineId) -> Option<&PlotLine> {
        self.lines.get(&id.0)
    }

    pub fn line_mut(&mut self, id: LineId) -> Option<&mut PlotLine> {
        self.lines.get_mut(&id.0)
    }

    /// Lines in index order.
    pub fn lines(&self) -> impl Iterator<Item = &PlotLine> {
        self.lines.values()
    }

    pub fn cursor(&self) -> &PlaybackCursor {
        &self.cursor
    }

    /// Installs `trace`, dropping every line and its geometry, and plots the
    /// default line `(t, <first variable>, 0)`.
    pub fn load_trace(&mut self, trace: Trace, host: &mut Host<'_>) -> Result<LineId> {
        self.clear_ranges(host.scene);
        for (_, line) in std::mem::take(&mut self.lines) {
            self.retire(line, host.scene);
        }
        self.next_index = 0;
        self.plot_started_ms = None;
        self.cursor.seek(0);

        let first_variable = trace.variables.first().cloned().unwrap_or_default();
        info!(
            "Loaded trace {} with {} phase(s)",
            trace.name,
            trace.phases.len()
        );
        self.trace = Some(trace);

        let id = self.add_line(LineSetting::new("t", &first_variable, "0"), host.scene);
        self.replot_line(id, host)?;
        Ok(id)
    }

    /// Adds a line at the lowest free index.
    pub fn add_line(&mut self, setting: LineSetting, scene: &mut dyn Scene) -> LineId {
        while self.lines.contains_key(&self.next_index) {
            self.next_index += 1;
        }
        let id = self.add_line_with_index(self.next_index, setting, scene);
        self.next_index += 1;
        id
    }

    /// Adds a line at `index`, replacing any line already there.
    pub fn add_line_with_index(
        &mut self,
        index: usize,
        setting: LineSetting,
        scene: &mut dyn Scene,
    ) -> LineId {
        let id = LineId(index);
        if let Some(previous) = self.lines.remove(&index) {
            self.retire(previous, scene);
        }
        let line = PlotLine::after_generation(id, setting, self.retired_generation);
        self.lines.insert(index, line);
        id
    }

    /// Removes a line and its geometry. The last remaining line is kept.
    pub fn remove_line(&mut self, id: LineId, scene: &mut dyn Scene) -> bool {
        if self.lines.len() <= 1 {
            return false;
        }
        match self.lines.remove(&id.0) {
            Some(line) => {
                self.retire(line, scene);
                true
            }
            None => false,
        }
    }

    fn retire(&mut self, mut line: PlotLine, scene: &mut dyn Scene) {
        line.cancel_plot();
        line.remove_plot(scene);
        self.retired_generation = self.retired_generation.max(line.generation());
    }

    /// Replots one line with its current color angle.
    pub fn replot_line(&mut self, id: LineId, host: &mut Host<'_>) -> Result<bool> {
        let line = self
            .lines
            .get_mut(&id.0)
            .ok_or_else(|| PlotError::InvalidSettings(format!("no line with index {}", id.0)))?;
        let started = line.replot(self.trace.as_ref(), &self.settings, host)?;
        if started {
            self.begin_progress(host);
        }
        Ok(started)
    }

    /// Spreads the lines around the hue wheel and replots all of them.
    ///
    /// Every line is attempted; the first error is returned.
    pub fn replot_all(&mut self, host: &mut Host<'_>) -> Result<()> {
        let count = self.lines.len() as f64;
        let mut first_error = None;
        let mut any_started = false;
        for (&index, line) in self.lines.iter_mut() {
            line.set_color_angle(index as f64 / count * 360.0);
            match line.replot(self.trace.as_ref(), &self.settings, host) {
                Ok(started) => any_started |= started,
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        if any_started {
            self.begin_progress(host);
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// True when no line has a traversal in flight.
    pub fn is_all_ready(&self) -> bool {
        self.lines.values().all(|line| !line.is_plotting())
    }

    /// Serves the frame requests collected since the previous frame.
    ///
    /// Returns true once every line has finished plotting.
    pub fn run_frame<I>(&mut self, requests: I, host: &mut Host<'_>) -> bool
    where
        I: IntoIterator<Item = (LineId, u64)>,
    {
        for (id, generation) in requests {
            let Some(line) = self.lines.get_mut(&id.0) else {
                continue;
            };
            match line.resume(generation, host) {
                LineProgress::Stale => debug!("Dropped stale frame for line {}", id.0),
                LineProgress::Completed => self.cursor.seek(0),
                LineProgress::Running | LineProgress::Interrupted | LineProgress::Failed(_) => {}
            }
        }

        if !self.is_all_ready() {
            return false;
        }
        if let Some(started) = self.plot_started_ms.take() {
            host.notifier.stop_progress();
            let elapsed = host.clock.now_ms() - started;
            info!("Plot finished in {elapsed:.0} ms");
            if elapsed >= self.settings.finished_toast_after_ms {
                host.notifier
                    .toast(FINISHED_MESSAGE, FINISHED_TOAST_MS, ToastKind::Info);
            }
        }
        true
    }

    /// Every drawn trajectory, lines in index order.
    pub fn trajectories(&self) -> Vec<&PlottedTrajectory> {
        self.lines
            .values()
            .flat_map(|line| line.trajectories())
            .collect()
    }

    /// Advances playback by one tick.
    pub fn animate_time(&mut self) {
        self.cursor.advance();
    }

    /// Moves the markers to the current playback time. Returns whether
    /// anything was repainted.
    pub fn animate(&mut self, scene: &mut dyn Scene) -> bool {
        let trajectories: Vec<&PlottedTrajectory> = self
            .lines
            .values()
            .flat_map(|line| line.trajectories())
            .collect();
        self.cursor.render(scene, &trajectories)
    }

    /// Draws the translucent ribbons between neighbouring trajectories,
    /// replacing any drawn before. Returns the number of ribbons.
    pub fn show_ranges(&mut self, scene: &mut dyn Scene) -> usize {
        self.clear_ranges(scene);
        let tracks: Vec<&[Point3<f64>]> = self
            .lines
            .values()
            .flat_map(|line| line.trajectories())
            .map(|trajectory| trajectory.samples.as_slice())
            .collect();
        for surface in build_ribbons(&tracks) {
            self.ribbons.push(scene.add_surface(surface));
        }
        self.ribbons.len()
    }

    pub fn clear_ranges(&mut self, scene: &mut dyn Scene) {
        for handle in self.ribbons.drain(..) {
            scene.remove(handle);
        }
    }

    fn begin_progress(&mut self, host: &mut Host<'_>) {
        if self.plot_started_ms.is_none() {
            self.plot_started_ms = Some(host.clock.now_ms());
            host.notifier.start_progress();
        }
    }
}
