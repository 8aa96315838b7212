//! In-process implementations of the host collaborators.

use crate::color::Color;
use crate::geometry::{SegmentBatch, Surface};
use crate::traits::{Clock, FrameScheduler, LineId, Notifier, Scene, SceneHandle, ToastKind};
use nalgebra::Point3;
use std::cell::Cell;
use std::collections::{BTreeMap, VecDeque};

#[derive(Debug, Clone, PartialEq)]
pub enum SceneObject {
    Segments(SegmentBatch),
    Marker { position: Point3<f64>, color: Color },
    Surface(Surface),
}

/// Scene that keeps every object in memory, keyed by handle.
#[derive(Debug, Clone)]
pub struct MemoryScene {
    objects: BTreeMap<SceneHandle, SceneObject>,
    next_handle: u64,
    zoom: f64,
}

impl Default for MemoryScene {
    fn default() -> Self {
        Self {
            objects: BTreeMap::new(),
            next_handle: 0,
            zoom: 1.0,
        }
    }
}

impl MemoryScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = zoom;
    }

    pub fn get(&self, handle: SceneHandle) -> Option<&SceneObject> {
        self.objects.get(&handle)
    }

    pub fn objects(&self) -> impl Iterator<Item = (SceneHandle, &SceneObject)> {
        self.objects.iter().map(|(handle, object)| (*handle, object))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn segment_batches(&self) -> impl Iterator<Item = &SegmentBatch> {
        self.objects.values().filter_map(|object| match object {
            SceneObject::Segments(batch) => Some(batch),
            _ => None,
        })
    }

    pub fn marker_count(&self) -> usize {
        self.objects
            .values()
            .filter(|object| matches!(object, SceneObject::Marker { .. }))
            .count()
    }

    fn insert(&mut self, object: SceneObject) -> SceneHandle {
        let handle = SceneHandle(self.next_handle);
        self.next_handle += 1;
        self.objects.insert(handle, object);
        handle
    }
}

impl Scene for MemoryScene {
    fn add_segment_batch(&mut self, batch: SegmentBatch) -> SceneHandle {
        self.insert(SceneObject::Segments(batch))
    }

    fn add_marker(&mut self, color: Color) -> SceneHandle {
        self.insert(SceneObject::Marker {
            position: Point3::origin(),
            color,
        })
    }

    fn set_marker_position(&mut self, marker: SceneHandle, position: Point3<f64>) {
        if let Some(SceneObject::Marker { position: current, .. }) = self.objects.get_mut(&marker) {
            *current = position;
        }
    }

    fn set_marker_color(&mut self, marker: SceneHandle, color: Color) {
        if let Some(SceneObject::Marker { color: current, .. }) = self.objects.get_mut(&marker) {
            *current = color;
        }
    }

    fn add_surface(&mut self, surface: Surface) -> SceneHandle {
        self.insert(SceneObject::Surface(surface))
    }

    fn remove(&mut self, handle: SceneHandle) {
        self.objects.remove(&handle);
    }

    fn zoom_scale(&self) -> f64 {
        self.zoom
    }
}

/// FIFO of pending frame requests.
#[derive(Debug, Clone, Default)]
pub struct FrameQueue {
    pending: VecDeque<(LineId, u64)>,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Takes the requests queued so far. Requests made while serving them
    /// land in the next drain.
    pub fn drain(&mut self) -> Vec<(LineId, u64)> {
        self.pending.drain(..).collect()
    }
}

impl FrameScheduler for FrameQueue {
    fn request_frame(&mut self, line: LineId, generation: u64) {
        self.pending.push_back((line, generation));
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Cell<f64>,
}

impl ManualClock {
    pub fn new(start_ms: f64) -> Self {
        Self {
            now: Cell::new(start_ms),
        }
    }

    pub fn advance(&self, ms: f64) {
        self.now.set(self.now.get() + ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        self.now.get()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Toast {
    pub message: String,
    pub duration_ms: u32,
    pub kind: ToastKind,
}

/// Notifier that records what it was asked to show.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    pub toasts: Vec<Toast>,
    pub progress_active: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take_toasts(&mut self) -> Vec<Toast> {
        std::mem::take(&mut self.toasts)
    }
}

impl Notifier for RecordingNotifier {
    fn toast(&mut self, message: &str, duration_ms: u32, kind: ToastKind) {
        self.toasts.push(Toast {
            message: message.to_string(),
            duration_ms,
            kind,
        });
    }

    fn start_progress(&mut self) {
        self.progress_active = true;
    }

    fn stop_progress(&mut self) {
        self.progress_active = false;
    }
}
