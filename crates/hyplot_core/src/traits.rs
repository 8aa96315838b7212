use crate::color::Color;
use crate::geometry::{SegmentBatch, Surface};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// Opaque handle of an object added to a `Scene`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SceneHandle(pub u64);

/// Identifier of a plot line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineId(pub usize);

/// The render scene the plotter draws into.
pub trait Scene {
    /// Adds one merged batch of line segments sharing a color and width.
    fn add_segment_batch(&mut self, batch: SegmentBatch) -> SceneHandle;

    /// Adds an animation marker at the origin.
    fn add_marker(&mut self, color: Color) -> SceneHandle;

    fn set_marker_position(&mut self, marker: SceneHandle, position: Point3<f64>);

    fn set_marker_color(&mut self, marker: SceneHandle, color: Color);

    fn add_surface(&mut self, surface: Surface) -> SceneHandle;

    /// Removes a previously added object. Unknown handles are ignored.
    fn remove(&mut self, handle: SceneHandle);

    /// Current camera zoom. Line widths and dash lengths are divided by it.
    fn zoom_scale(&self) -> f64;
}

/// Host hook that calls back into the plotter before the next repaint.
///
/// Requests are served in FIFO order. The `generation` lets the owner drop
/// requests made on behalf of a traversal that has since been replaced.
pub trait FrameScheduler {
    fn request_frame(&mut self, line: LineId, generation: u64);
}

/// Wall clock in milliseconds. Only differences are meaningful.
pub trait Clock {
    fn now_ms(&self) -> f64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToastKind {
    Info,
    Error,
}

/// User-facing transient messages and the busy indicator.
pub trait Notifier {
    fn toast(&mut self, message: &str, duration_ms: u32, kind: ToastKind);

    fn start_progress(&mut self);

    fn stop_progress(&mut self);
}
