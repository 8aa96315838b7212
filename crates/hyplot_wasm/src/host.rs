//! Browser-side collaborators: a scene that records commands for the JS
//! renderer, the `Date.now()` clock and a buffered notifier.

use hyplot_core::color::Color;
use hyplot_core::geometry::{SegmentBatch, Surface};
use hyplot_core::line::Host;
use hyplot_core::scene::FrameQueue;
use hyplot_core::traits::{Clock, Notifier, Scene, SceneHandle, ToastKind};
use nalgebra::Point3;
use serde::Serialize;

/// One mutation of the render scene, applied in order by the JS side.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SceneCommand {
    AddSegments {
        handle: u64,
        /// `[x0, y0, z0, x1, y1, z1]` per segment.
        segments: Vec<[f64; 6]>,
        color: u32,
        width: f64,
    },
    AddMarker {
        handle: u64,
        color: u32,
    },
    MoveMarker {
        handle: u64,
        position: [f64; 3],
    },
    SetMarkerColor {
        handle: u64,
        color: u32,
    },
    AddSurface {
        handle: u64,
        vertices: Vec<[f64; 3]>,
        triangles: Vec<[u32; 3]>,
        color: u32,
        opacity: f64,
    },
    Remove {
        handle: u64,
    },
}

fn coords(p: &Point3<f64>) -> [f64; 3] {
    [p.x, p.y, p.z]
}

#[derive(Debug, Default)]
pub struct CommandScene {
    commands: Vec<SceneCommand>,
    next_handle: u64,
    zoom: f64,
}

impl CommandScene {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
            next_handle: 0,
            zoom: 1.0,
        }
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = zoom;
    }

    pub fn pending(&self) -> usize {
        self.commands.len()
    }

    pub fn take_commands(&mut self) -> Vec<SceneCommand> {
        std::mem::take(&mut self.commands)
    }

    fn next(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }
}

impl Scene for CommandScene {
    fn add_segment_batch(&mut self, batch: SegmentBatch) -> SceneHandle {
        let handle = self.next();
        self.commands.push(SceneCommand::AddSegments {
            handle,
            segments: batch
                .segments
                .iter()
                .map(|s| [s.start.x, s.start.y, s.start.z, s.end.x, s.end.y, s.end.z])
                .collect(),
            color: batch.color.as_hex24(),
            width: batch.width,
        });
        SceneHandle(handle)
    }

    fn add_marker(&mut self, color: Color) -> SceneHandle {
        let handle = self.next();
        self.commands.push(SceneCommand::AddMarker {
            handle,
            color: color.as_hex24(),
        });
        SceneHandle(handle)
    }

    fn set_marker_position(&mut self, marker: SceneHandle, position: Point3<f64>) {
        self.commands.push(SceneCommand::MoveMarker {
            handle: marker.0,
            position: coords(&position),
        });
    }

    fn set_marker_color(&mut self, marker: SceneHandle, color: Color) {
        self.commands.push(SceneCommand::SetMarkerColor {
            handle: marker.0,
            color: color.as_hex24(),
        });
    }

    fn add_surface(&mut self, surface: Surface) -> SceneHandle {
        let handle = self.next();
        self.commands.push(SceneCommand::AddSurface {
            handle,
            vertices: surface.vertices.iter().map(coords).collect(),
            triangles: surface.triangles,
            color: surface.color.as_hex24(),
            opacity: surface.opacity,
        });
        SceneHandle(handle)
    }

    fn remove(&mut self, handle: SceneHandle) {
        self.commands.push(SceneCommand::Remove { handle: handle.0 });
    }

    fn zoom_scale(&self) -> f64 {
        self.zoom
    }
}

/// Milliseconds since the epoch from the JS `Date`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsClock;

impl Clock for JsClock {
    fn now_ms(&self) -> f64 {
        js_sys::Date::now()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    Toast {
        message: String,
        duration_ms: u32,
        level: ToastKind,
    },
    StartProgress,
    StopProgress,
}

#[derive(Debug, Default)]
pub struct BufferedNotifier {
    pending: Vec<Notification>,
}

impl BufferedNotifier {
    pub fn take(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.pending)
    }
}

impl Notifier for BufferedNotifier {
    fn toast(&mut self, message: &str, duration_ms: u32, kind: ToastKind) {
        self.pending.push(Notification::Toast {
            message: message.to_string(),
            duration_ms,
            level: kind,
        });
    }

    fn start_progress(&mut self) {
        self.pending.push(Notification::StartProgress);
    }

    fn stop_progress(&mut self) {
        self.pending.push(Notification::StopProgress);
    }
}

/// Everything a `PlotLineMap` talks to, owned next to it.
pub(crate) struct BrowserHost {
    pub(crate) scene: CommandScene,
    pub(crate) frames: FrameQueue,
    pub(crate) clock: JsClock,
    pub(crate) notifier: BufferedNotifier,
}

impl BrowserHost {
    pub(crate) fn new() -> Self {
        Self {
            scene: CommandScene::new(),
            frames: FrameQueue::new(),
            clock: JsClock,
            notifier: BufferedNotifier::default(),
        }
    }

    pub(crate) fn host(&mut self) -> Host<'_> {
        Host {
            scene: &mut self.scene,
            scheduler: &mut self.frames,
            clock: &self.clock,
            notifier: &mut self.notifier,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyplot_core::geometry::Segment;

    #[test]
    fn scene_records_commands_in_order() {
        let mut scene = CommandScene::new();
        let batch = scene.add_segment_batch(SegmentBatch {
            segments: vec![Segment {
                start: Point3::new(0.0, 0.0, 0.0),
                end: Point3::new(1.0, 2.0, 3.0),
            }],
            color: Color::new(255, 0, 0),
            width: 0.5,
        });
        let marker = scene.add_marker(Color::new(0, 0, 255));
        scene.set_marker_position(marker, Point3::new(4.0, 5.0, 6.0));
        scene.remove(batch);

        assert_ne!(batch, marker);
        let commands = scene.take_commands();
        assert_eq!(
            commands,
            vec![
                SceneCommand::AddSegments {
                    handle: 0,
                    segments: vec![[0.0, 0.0, 0.0, 1.0, 2.0, 3.0]],
                    color: 0xff0000,
                    width: 0.5,
                },
                SceneCommand::AddMarker {
                    handle: 1,
                    color: 0x0000ff,
                },
                SceneCommand::MoveMarker {
                    handle: 1,
                    position: [4.0, 5.0, 6.0],
                },
                SceneCommand::Remove { handle: 0 },
            ]
        );
        assert_eq!(scene.pending(), 0);
    }

    #[test]
    fn notifier_buffers_until_taken() {
        let mut notifier = BufferedNotifier::default();
        notifier.start_progress();
        notifier.toast("Plot finished.", 1000, ToastKind::Info);
        notifier.stop_progress();
        assert_eq!(notifier.take().len(), 3);
        assert!(notifier.take().is_empty());
    }
}
