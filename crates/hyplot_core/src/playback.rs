//! Marker animation along the plotted trajectories.

use crate::color::{Color, INACTIVE_GRAY};
use crate::traits::{Scene, SceneHandle};
use log::debug;
use nalgebra::Point3;

/// A trajectory that has been drawn into the scene.
#[derive(Debug, Clone, PartialEq)]
pub struct PlottedTrajectory {
    pub condition_index: usize,
    pub color: Color,
    /// Animation track, one sample per tick.
    pub samples: Vec<Point3<f64>>,
    pub batch: SceneHandle,
    pub marker: SceneHandle,
}

impl PlottedTrajectory {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Shared time index of every animation marker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackCursor {
    time: usize,
    last_rendered: Option<usize>,
}

impl PlaybackCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn time(&self) -> usize {
        self.time
    }

    /// Moves one tick forward. Wrapping happens on the next `render`.
    pub fn advance(&mut self) {
        self.time += 1;
    }

    /// Jumps to `time` and forces the next `render` to repaint.
    pub fn seek(&mut self, time: usize) {
        self.time = time;
        self.last_rendered = None;
    }

    /// Places every marker for the current time index.
    ///
    /// Returns false when nothing changed since the previous call. Markers of
    /// trajectories shorter than the index turn gray; all markers get their
    /// own color back at index 0.
    pub fn render(&mut self, scene: &mut dyn Scene, trajectories: &[&PlottedTrajectory]) -> bool {
        let longest = trajectories.iter().map(|t| t.len()).max().unwrap_or(0);
        if longest == 0 {
            return false;
        }
        if self.time > longest - 1 {
            self.time = 0;
        }
        if self.last_rendered == Some(self.time) {
            return false;
        }

        for trajectory in trajectories {
            if self.time == 0 {
                scene.set_marker_color(trajectory.marker, trajectory.color);
            }
            match trajectory.samples.get(self.time) {
                Some(&position) => scene.set_marker_position(trajectory.marker, position),
                None => scene.set_marker_color(trajectory.marker, INACTIVE_GRAY),
            }
        }
        debug!("Rendered playback time {} of {}", self.time, longest);
        self.last_rendered = Some(self.time);
        true
    }

    /// `advance` followed by `render`.
    pub fn tick(&mut self, scene: &mut dyn Scene, trajectories: &[&PlottedTrajectory]) -> bool {
        self.advance();
        self.render(scene, trajectories)
    }
}
