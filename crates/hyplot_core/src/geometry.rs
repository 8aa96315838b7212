//! Turning sampled points into drawable segments.

use crate::color::{Color, RIBBON_WHITE};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// One sample of a trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampledPoint {
    pub position: Point3<f64>,
    /// Produced by a point (discrete) phase rather than an interval.
    pub is_discrete: bool,
}

impl SampledPoint {
    pub fn new(position: Point3<f64>, is_discrete: bool) -> Self {
        Self {
            position,
            is_discrete,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: Point3<f64>,
    pub end: Point3<f64>,
}

impl Segment {
    pub fn length(&self) -> f64 {
        (self.end - self.start).norm()
    }
}

/// Segments of one trajectory, drawn as a single primitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentBatch {
    pub segments: Vec<Segment>,
    pub color: Color,
    pub width: f64,
}

/// Triangle mesh, used for the ribbons between neighbouring trajectories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Surface {
    pub vertices: Vec<Point3<f64>>,
    pub triangles: Vec<[u32; 3]>,
    pub color: Color,
    pub opacity: f64,
}

/// Number of dashes drawn over a jump of `length` with dash length `spacing`.
pub fn dash_count(length: f64, spacing: f64) -> usize {
    if !(spacing > 0.0) || !length.is_finite() {
        return 0;
    }
    let slots = (length / spacing - 1.0) / 2.0;
    if slots < 1.0 {
        0
    } else {
        slots.floor() as usize
    }
}

/// Walks consecutive pairs of `points`.
///
/// A pair whose second point is discrete is a jump between phases and is
/// drawn dashed: the segment is cut into slots of `dot_spacing` and only the
/// odd slots are emitted. Any other non-degenerate pair becomes one solid
/// segment. Coincident pairs are dropped.
pub fn assemble_segments(points: &[SampledPoint], dot_spacing: f64) -> Vec<Segment> {
    let mut segments = Vec::with_capacity(points.len());
    for pair in points.windows(2) {
        let (begin, end) = (pair[0].position, pair[1].position);
        if pair[1].is_discrete {
            let offset = end - begin;
            let length = offset.norm();
            let count = dash_count(length, dot_spacing);
            if count == 0 {
                continue;
            }
            let direction = offset / length;
            for k in 0..count {
                let slot = (2 * k + 1) as f64;
                segments.push(Segment {
                    start: begin + direction * (slot * dot_spacing),
                    end: begin + direction * ((slot + 1.0) * dot_spacing),
                });
            }
        } else if begin != end {
            segments.push(Segment { start: begin, end });
        }
    }
    segments
}

/// Builds the drawable batch for one trajectory at the given camera zoom.
pub fn assemble_batch(
    points: &[SampledPoint],
    color: Color,
    line_width: f64,
    dot_spacing: f64,
    zoom: f64,
) -> SegmentBatch {
    let zoom = if zoom.is_finite() && zoom > 0.0 { zoom } else { 1.0 };
    SegmentBatch {
        segments: assemble_segments(points, dot_spacing / zoom),
        color,
        width: 0.5 * line_width / zoom,
    }
}

/// Triangle strips spanning each pair of consecutive animation tracks, up to
/// the shorter track's length.
pub fn build_ribbons(tracks: &[&[Point3<f64>]]) -> Vec<Surface> {
    let mut surfaces = Vec::new();
    for pair in tracks.windows(2) {
        let shared = pair[0].len().min(pair[1].len());
        let mut vertices = Vec::with_capacity(shared * 2);
        for i in 0..shared {
            vertices.push(pair[0][i]);
            vertices.push(pair[1][i]);
        }
        if vertices.len() < 3 {
            continue;
        }
        let triangles = (0..vertices.len() as u32 - 2)
            .map(|k| [k, k + 1, k + 2])
            .collect();
        surfaces.push(Surface {
            vertices,
            triangles,
            color: RIBBON_WHITE,
            opacity: 0.5,
        });
    }
    surfaces
}
