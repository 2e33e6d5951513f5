// THEORY:
// This file is the entry point for the `motion_sentinel` library crate.
//
// The crate turns a stream of per-frame detections into persistent identities
// with a behavior label attached to each one. The public surface is the
// `TrackingPipeline` (single-threaded frame loop) and the `SharedPipeline`
// (the same loop behind one exclusive-access boundary, for deployments where
// detection and rendering live on different tasks). The building blocks live in
// `core_modules` and are public so a caller can swap any one of them out, but
// most consumers only need the pipeline, its config, and its `FrameReport`.
//
// Detection masks and rendering stay outside: frames come in through the
// `DetectionSource` seam and annotation records go out through `Annotator`.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;

pub use config::TrackerConfig;
pub use core_modules::classifier::{Behavior, IncrementalClassifier, Prediction};
pub use core_modules::detection::{BoundingBox, Detection, Frame, Point};
pub use core_modules::track_store::{Track, TrackId, TrackStore};
pub use error::{ConfigError, SourceError, TrackerError};
pub use parallel_pipeline::SharedPipeline;
pub use pipeline::{DetectionSource, FrameReport, TrackingPipeline};
