// THEORY:
// The feature extractor condenses a track's motion history into a fixed-size
// numeric descriptor the classifier can learn from. It is a pure function over
// the retained history window: no state, no side effects, same input same
// output.
//
// Descriptor layout (`FeatureVector::as_array`):
//   0  dx                      last point minus first point, x
//   1  dy                      last point minus first point, y
//   2  avg_speed               path length / elapsed seconds
//   3  direction_changes       reversals between consecutive displacements
//   4  width                   latest bounding box width
//   5  height                  latest bounding box height
//   6  area                    latest region area
//
// A reversal is counted wherever the dot product of two consecutive
// displacement vectors is negative. Zero-length displacements have a zero dot
// product and never count, so a stationary jitter-free object reads as 0.

use crate::core_modules::detection::Point;
use crate::core_modules::track_store::{Track, TrackPoint};
use serde::Serialize;
use std::collections::VecDeque;

pub const FEATURE_LEN: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct FeatureVector {
    pub dx: f64,
    pub dy: f64,
    pub avg_speed: f64,
    pub direction_changes: u32,
    pub width: f64,
    pub height: f64,
    pub area: f64,
}

impl FeatureVector {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn as_array(&self) -> [f64; FEATURE_LEN] {
        [
            self.dx,
            self.dy,
            self.avg_speed,
            self.direction_changes as f64,
            self.width,
            self.height,
            self.area,
        ]
    }

    pub fn is_zero(&self) -> bool {
        self.as_array().iter().all(|v| *v == 0.0)
    }
}

/// Coarse direction of net travel, in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Heading {
    Left,
    Right,
    Up,
    Down,
}

impl Heading {
    /// Dominant axis of `(dx, dy)`; horizontal wins only when strictly larger.
    pub fn from_displacement(dx: f64, dy: f64) -> Option<Self> {
        if dx == 0.0 && dy == 0.0 {
            return None;
        }
        if dx.abs() > dy.abs() {
            Some(if dx < 0.0 { Heading::Left } else { Heading::Right })
        } else {
            Some(if dy < 0.0 { Heading::Up } else { Heading::Down })
        }
    }
}

/// Descriptor for a track's current history window.
pub fn extract(track: &Track) -> FeatureVector {
    let history = track.history();
    if history.len() < 2 {
        return FeatureVector::zero();
    }

    let motion = motion_features(history);
    FeatureVector {
        width: track.latest_bbox.width,
        height: track.latest_bbox.height,
        area: track.latest_area,
        ..motion
    }
}

/// The motion-only part of the descriptor (size fields left at zero).
pub fn motion_features(history: &VecDeque<TrackPoint>) -> FeatureVector {
    if history.len() < 2 {
        return FeatureVector::zero();
    }

    let points: Vec<Point> = history.iter().map(|p| p.position).collect();
    let first = points[0];
    let last = points[points.len() - 1];

    FeatureVector {
        dx: last.x - first.x,
        dy: last.y - first.y,
        avg_speed: average_speed(history),
        direction_changes: direction_change_count(&points),
        ..FeatureVector::zero()
    }
}

/// Path length over elapsed time. Falls back to path length over point count
/// when the window has no positive time span.
pub fn average_speed(history: &VecDeque<TrackPoint>) -> f64 {
    if history.len() < 2 {
        return 0.0;
    }

    let path_length: f64 = history
        .iter()
        .zip(history.iter().skip(1))
        .map(|(a, b)| a.position.distance(&b.position))
        .sum();

    let elapsed = match (history.front(), history.back()) {
        (Some(first), Some(last)) => last.timestamp - first.timestamp,
        _ => 0.0,
    };

    if elapsed.is_finite() && elapsed > 0.0 {
        path_length / elapsed
    } else {
        path_length / history.len() as f64
    }
}

/// Number of positions where travel reverses, i.e. where consecutive
/// displacement vectors have a negative dot product.
pub fn direction_change_count(points: &[Point]) -> u32 {
    if points.len() < 3 {
        return 0;
    }

    let displacements: Vec<(f64, f64)> = points
        .windows(2)
        .map(|w| (w[1].x - w[0].x, w[1].y - w[0].y))
        .collect();

    displacements
        .windows(2)
        .filter(|w| w[0].0 * w[1].0 + w[0].1 * w[1].1 < 0.0)
        .count() as u32
}
