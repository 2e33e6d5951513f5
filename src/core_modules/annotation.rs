// THEORY:
// Annotation records are the tracker's only output: one per track that was
// seen this frame, carrying what a renderer needs to draw an overlay (id,
// geometry, label, color). Drawing itself belongs to the caller, behind the
// `Annotator` seam.
//
// Colors are a pure function of the track id, so the same object keeps the
// same color for its whole life without any global random state.

use crate::core_modules::classifier::{Behavior, Prediction};
use crate::core_modules::detection::{BoundingBox, Point};
use crate::core_modules::features::Heading;
use crate::core_modules::lifecycle::TrackState;
use crate::core_modules::track_store::TrackId;
use crate::error::TrackerError;
use crate::pipeline::FrameReport;
use image::Rgb;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotation {
    pub id: TrackId,
    pub bbox: BoundingBox,
    pub centroid: Point,
    /// What the classifier said (`Unknown` while it is Cold).
    pub prediction: Prediction,
    /// Label shown to the operator: the prediction, escalated to Suspicious
    /// when the track's recent labels call for it. While the classifier is
    /// Cold this is the weak label.
    pub behavior: Behavior,
    /// The weak label the heuristic assigned this frame.
    pub heuristic: Behavior,
    pub heading: Option<Heading>,
    pub speed: f64,
    pub state: TrackState,
    pub color: [u8; 3],
}

/// Consumer of per-frame annotations (renderers, loggers, network bridges).
pub trait Annotator {
    fn annotate(&mut self, report: &FrameReport) -> Result<(), TrackerError>;
}

/// Writes each frame's annotations as one JSON line.
pub struct JsonLinesAnnotator<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesAnnotator<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Annotator for JsonLinesAnnotator<W> {
    fn annotate(&mut self, report: &FrameReport) -> Result<(), TrackerError> {
        let line = serde_json::to_string(report).map_err(|e| TrackerError::Annotator(e.to_string()))?;
        writeln!(self.out, "{line}").map_err(|e| TrackerError::Annotator(e.to_string()))
    }
}

/// Deterministic, visually distinct color for a track id. Every channel stays
/// in `[100, 255]` so overlays remain readable on dark footage.
pub fn color_for(id: TrackId) -> Rgb<u8> {
    // splitmix64 finalizer
    let mut z = id.value().wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^= z >> 31;

    let channel = |shift: u32| 100 + ((z >> shift) & 0xFF) as u16 * 155 / 255;
    Rgb([channel(0) as u8, channel(8) as u8, channel(16) as u8])
}
