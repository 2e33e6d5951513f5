// THEORY:
// A `Detection` is the single-frame snapshot of a moving region, before the
// tracker has decided who it belongs to. It is a plain data container with no
// memory: the detection source builds a fresh list every frame and the tracker
// reads it once.
//
// Key architectural principles:
// 1.  **Identity-free**: A detection carries geometry and a timestamp, never an
//     id. Identity is the associator's decision.
// 2.  **Tolerant input**: Anything upstream can hand us garbage (NaN centroids,
//     negative sizes). `is_well_formed` is the one gate; the pipeline drops
//     what fails it and carries on with the rest of the frame.

use serde::{Deserialize, Serialize};

/// A position in image coordinates (x to the right, y downwards).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Axis-aligned box, top-left corner plus size.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Integer center of the box, matching how contour centroids are reported
    /// by the usual mask pipelines (`x + w / 2`, truncated).
    pub fn center(&self) -> Point {
        Point::new(
            (self.x + self.width / 2.0).trunc(),
            (self.y + self.height / 2.0).trunc(),
        )
    }
}

/// One candidate region observed in one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub centroid: Point,
    /// Region area in pixels.
    pub area: f64,
    /// Stream time in seconds.
    pub timestamp: f64,
}

impl Detection {
    pub fn new(bbox: BoundingBox, centroid: Point, area: f64, timestamp: f64) -> Self {
        Self {
            bbox,
            centroid,
            area,
            timestamp,
        }
    }

    /// Builds a detection whose centroid is the center of its box.
    pub fn from_bbox(bbox: BoundingBox, area: f64, timestamp: f64) -> Self {
        Self::new(bbox, bbox.center(), area, timestamp)
    }

    /// A detection centered on `centroid` with a nominal 10x10 box.
    pub fn at(centroid: Point, timestamp: f64) -> Self {
        let bbox = BoundingBox::new(centroid.x - 5.0, centroid.y - 5.0, 10.0, 10.0);
        Self::new(bbox, centroid, 100.0, timestamp)
    }

    pub fn is_well_formed(&self) -> bool {
        let b = &self.bbox;
        self.centroid.is_finite()
            && b.x.is_finite()
            && b.y.is_finite()
            && b.width.is_finite()
            && b.height.is_finite()
            && b.width >= 0.0
            && b.height >= 0.0
            && self.area.is_finite()
            && self.area >= 0.0
            && self.timestamp.is_finite()
    }
}

/// Everything the detection source produced for one frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Frame {
    /// Stream time in seconds. Drives reaping even when `detections` is empty.
    pub timestamp: f64,
    pub detections: Vec<Detection>,
}

impl Frame {
    pub fn new(timestamp: f64, detections: Vec<Detection>) -> Self {
        Self {
            timestamp,
            detections,
        }
    }

    pub fn empty(timestamp: f64) -> Self {
        Self::new(timestamp, Vec::new())
    }

    /// A frame whose detections are nominal boxes around `centroids`.
    pub fn from_centroids(timestamp: f64, centroids: &[(f64, f64)]) -> Self {
        let detections = centroids
            .iter()
            .map(|&(x, y)| Detection::at(Point::new(x, y), timestamp))
            .collect();
        Self::new(timestamp, detections)
    }
}
