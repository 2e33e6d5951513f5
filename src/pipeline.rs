// THEORY:
// The `pipeline` module is the top-level API of the tracker. It runs the full
// per-frame stack in one synchronous pass and hands back a `FrameReport`:
//
//   Stage 0: Input hygiene      - drop malformed detections
//   Stage 1: Reaping            - evict tracks past the staleness timeout
//   Stage 2: Association        - continue or spawn tracks
//   Stage 3: Feature Extraction - one descriptor per track seen this frame
//   Stage 4: Classification     - predict, then learn from the weak label
//   Stage 5: End of frame       - let the classifier refit if one is due
//
// One frame's stages all complete before the next frame starts. Nothing
// suspends and nothing is shared, so no locking happens here; see
// `parallel_pipeline` for the version that can be shared between tasks.

use crate::config::TrackerConfig;
use crate::core_modules::annotation::{Annotation, Annotator, color_for};
use crate::core_modules::associator::Associator;
use crate::core_modules::classifier::{self, IncrementalClassifier, Prediction, Readiness, WeakLabeler};
use crate::core_modules::detection::Frame;
use crate::core_modules::features::{self, Heading};
use crate::core_modules::reaper::Reaper;
use crate::core_modules::track_store::{TrackId, TrackStore};
use crate::error::{SourceError, TrackerError};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Upstream producer of frames.
///
/// `Ok(None)` means the stream has ended cleanly. An `Err` is fatal to the
/// frame loop and is handed back to whoever is running it.
pub trait DetectionSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError>;
}

/// Any iterator of ready-made frames is a source that never fails.
pub struct FrameIter<I>(pub I);

impl<I: Iterator<Item = Frame>> DetectionSource for FrameIter<I> {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        Ok(self.0.next())
    }
}

/// Outcome of one frame.
#[derive(Debug, Clone, Serialize)]
pub struct FrameReport {
    pub frame_index: u64,
    pub timestamp: f64,
    /// One record per track that received a detection this frame.
    pub annotations: Vec<Annotation>,
    pub spawned: Vec<TrackId>,
    pub reaped: Vec<TrackId>,
    /// Detections discarded as malformed.
    pub dropped: usize,
    /// Whether the classifier refit its model at the end of this frame.
    pub retrained: bool,
}

/// The main, single-threaded tracking engine.
pub struct TrackingPipeline {
    config: TrackerConfig,
    store: TrackStore,
    associator: Associator,
    reaper: Reaper,
    labeler: WeakLabeler,
    classifier: Box<dyn IncrementalClassifier>,
    frame_count: u64,
    last_timestamp: Option<f64>,
}

impl TrackingPipeline {
    pub fn new(config: TrackerConfig) -> Result<Self, TrackerError> {
        let classifier = classifier::build(&config.classifier);
        Self::with_classifier(config, classifier)
    }

    /// Builds a pipeline around a caller-supplied classifier.
    pub fn with_classifier(
        config: TrackerConfig,
        classifier: Box<dyn IncrementalClassifier>,
    ) -> Result<Self, TrackerError> {
        config.validate()?;
        Ok(Self {
            store: TrackStore::new(config.history_capacity, config.label_history_capacity),
            associator: Associator::new(config.distance_threshold),
            reaper: Reaper::new(config.staleness_timeout_secs),
            labeler: WeakLabeler::new(config.heuristic.clone()),
            classifier,
            config,
            frame_count: 0,
            last_timestamp: None,
        })
    }

    pub fn process_frame(&mut self, frame: Frame) -> FrameReport {
        let frame_index = self.frame_count;
        self.frame_count += 1;
        let now = frame.timestamp;

        if !now.is_finite() {
            let dropped = frame.detections.len();
            warn!(frame = frame_index, dropped, "frame has no usable timestamp, skipping it");
            return FrameReport {
                frame_index,
                timestamp: now,
                annotations: Vec::new(),
                spawned: Vec::new(),
                reaped: Vec::new(),
                dropped,
                retrained: false,
            };
        }

        if let Some(last) = self.last_timestamp {
            if now < last {
                warn!(frame = frame_index, now, last, "frame timestamp went backwards");
            }
        }
        self.last_timestamp = Some(now);

        // --- 0. Input hygiene ---
        // Tracks age on the frame clock, so every surviving detection is
        // stamped with the frame's timestamp.
        let total = frame.detections.len();
        let detections: Vec<_> = frame
            .detections
            .into_iter()
            .filter(|d| d.is_well_formed())
            .map(|mut d| {
                d.timestamp = now;
                d
            })
            .collect();
        let dropped = total - detections.len();
        if dropped > 0 {
            warn!(frame = frame_index, dropped, "discarded malformed detections");
        }

        // --- 1. Reaping ---
        let reaped: Vec<TrackId> = self
            .reaper
            .reap(&mut self.store, now)
            .into_iter()
            .map(|t| t.id)
            .collect();

        // --- 2. Association ---
        let assignments = self.associator.associate(&mut self.store, &detections);
        let spawned: Vec<TrackId> = assignments
            .iter()
            .filter(|a| a.spawned)
            .map(|a| a.track_id)
            .collect();

        // --- 3 & 4. Features and classification ---
        let mut annotations = Vec::with_capacity(assignments.len());
        for assignment in &assignments {
            if let Some(annotation) = self.classify_track(assignment.track_id) {
                annotations.push(annotation);
            }
        }

        // --- 5. End of frame ---
        let retrained = self.classifier.end_frame(now);

        debug!(
            frame = frame_index,
            detections = detections.len(),
            live = self.store.len(),
            spawned = spawned.len(),
            reaped = reaped.len(),
            "frame processed"
        );

        FrameReport {
            frame_index,
            timestamp: now,
            annotations,
            spawned,
            reaped,
            dropped,
            retrained,
        }
    }

    fn classify_track(&mut self, id: TrackId) -> Option<Annotation> {
        let track = self.store.get(id)?;
        let features = features::extract(track);
        let heuristic = self.labeler.label(&features);
        let trainable = self.labeler.should_train(track.history().len());

        let prediction = self.classifier.predict(&features);
        if trainable {
            self.classifier.observe(&features, heuristic);
        }

        let base = prediction.label().unwrap_or(heuristic);
        let behavior = self.labeler.escalate(base, track.label_history());

        let track = self.store.get_mut(id)?;
        track.record_label(behavior);

        Some(Annotation {
            id,
            bbox: track.latest_bbox,
            centroid: track.last_position(),
            prediction,
            behavior,
            heuristic,
            heading: Heading::from_displacement(features.dx, features.dy),
            speed: features.avg_speed,
            state: track.state(),
            color: color_for(id).0,
        })
    }

    /// Pulls frames from `source` until it ends, handing each report to
    /// `annotator`. Returns the number of frames processed. A source error
    /// stops the loop and is returned as is.
    pub fn run<S, A>(&mut self, source: &mut S, annotator: &mut A) -> Result<u64, TrackerError>
    where
        S: DetectionSource + ?Sized,
        A: Annotator + ?Sized,
    {
        info!("frame loop started");
        let mut processed = 0;
        loop {
            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, processed, "detection source failed, stopping frame loop");
                    return Err(e.into());
                }
            };
            let report = self.process_frame(frame);
            annotator.annotate(&report)?;
            processed += 1;
        }
        info!(processed, live = self.store.len(), "frame loop finished");
        Ok(processed)
    }

    pub fn store(&self) -> &TrackStore {
        &self.store
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn readiness(&self) -> Readiness {
        self.classifier.readiness()
    }

    /// Asks the classifier about an arbitrary live track without learning.
    pub fn predict_track(&self, id: TrackId) -> Option<Prediction> {
        let track = self.store.get(id)?;
        Some(self.classifier.predict(&features::extract(track)))
    }

    pub fn frames_processed(&self) -> u64 {
        self.frame_count
    }

    /// Drops all live tracks. Ids already handed out stay retired.
    pub fn teardown(&mut self) {
        info!(live = self.store.len(), "tearing down track store");
        self.store.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetrainPolicy;
    use crate::core_modules::classifier::Behavior;
    use crate::core_modules::detection::{Detection, Point};

    struct Collect(Vec<FrameReport>);

    impl Annotator for Collect {
        fn annotate(&mut self, report: &FrameReport) -> Result<(), TrackerError> {
            self.0.push(report.clone());
            Ok(())
        }
    }

    struct Failing {
        remaining: usize,
    }

    impl DetectionSource for Failing {
        fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
            if self.remaining == 0 {
                return Err(SourceError::Disconnected("camera unplugged".into()));
            }
            self.remaining -= 1;
            Ok(Some(Frame::from_centroids(self.remaining as f64, &[(10.0, 10.0)])))
        }
    }

    #[test]
    fn malformed_detections_are_dropped() {
        let mut pipeline = TrackingPipeline::new(TrackerConfig::default()).unwrap();
        let mut bad = Detection::at(Point::new(0.0, 0.0), 0.0);
        bad.area = f64::NAN;
        let good = Detection::at(Point::new(5.0, 5.0), 0.0);

        let report = pipeline.process_frame(Frame::new(0.0, vec![bad, good]));
        assert_eq!(report.dropped, 1);
        assert_eq!(report.spawned.len(), 1);
        assert_eq!(pipeline.store().len(), 1);
    }

    #[test]
    fn all_malformed_is_an_empty_frame() {
        let mut pipeline = TrackingPipeline::new(TrackerConfig::default()).unwrap();
        let mut bad = Detection::at(Point::new(0.0, 0.0), 0.0);
        bad.bbox.height = -1.0;
        let report = pipeline.process_frame(Frame::new(0.0, vec![bad]));
        assert!(report.annotations.is_empty());
        assert!(pipeline.store().is_empty());
    }

    #[test]
    fn cold_classifier_reports_unknown_and_falls_back_to_the_weak_label() {
        let mut pipeline = TrackingPipeline::new(TrackerConfig::default()).unwrap();
        pipeline.process_frame(Frame::from_centroids(0.0, &[(10.0, 10.0)]));
        let report = pipeline.process_frame(Frame::from_centroids(0.1, &[(10.0, 10.0)]));

        let a = &report.annotations[0];
        assert_eq!(a.prediction, Prediction::Unknown);
        assert_eq!(a.heuristic, Behavior::Idle);
        assert_eq!(a.behavior, Behavior::Idle);
        assert_eq!(pipeline.readiness(), Readiness::Cold);
    }

    #[test]
    fn classifier_warms_up_from_its_own_weak_labels() {
        let mut config = TrackerConfig::default();
        config.classifier.min_samples = 5;
        config.classifier.retrain = RetrainPolicy::EveryFrames { frames: 10 };
        let mut pipeline = TrackingPipeline::new(config).unwrap();

        let mut last = None;
        for i in 0..10 {
            let t = i as f64 * 0.1;
            last = Some(pipeline.process_frame(Frame::from_centroids(t, &[(100.0 + i as f64, 100.0)])));
        }

        assert_eq!(pipeline.readiness(), Readiness::Warm);
        let report = last.unwrap();
        assert!(matches!(report.annotations[0].prediction, Prediction::Label(_)));
    }

    #[test]
    fn run_stops_at_end_of_stream() {
        let frames = (0..5).map(|i| Frame::from_centroids(i as f64 * 0.1, &[(i as f64, 0.0)]));
        let mut pipeline = TrackingPipeline::new(TrackerConfig::default()).unwrap();
        let mut sink = Collect(Vec::new());

        let processed = pipeline.run(&mut FrameIter(frames), &mut sink).unwrap();
        assert_eq!(processed, 5);
        assert_eq!(sink.0.len(), 5);
        assert!(sink.0.iter().all(|r| r.annotations[0].id == TrackId::from(1)));
    }

    #[test]
    fn run_propagates_source_failures() {
        let mut pipeline = TrackingPipeline::new(TrackerConfig::default()).unwrap();
        let mut sink = Collect(Vec::new());
        let result = pipeline.run(&mut Failing { remaining: 3 }, &mut sink);

        assert!(matches!(result, Err(TrackerError::Source(SourceError::Disconnected(_)))));
        assert_eq!(sink.0.len(), 3);
    }

    #[test]
    fn detection_clock_never_overrides_the_frame_clock() {
        let mut pipeline = TrackingPipeline::new(TrackerConfig::default()).unwrap();
        let mut ids = Vec::new();
        for i in 0..6 {
            let detection = Detection::at(Point::new(100.0, 100.0), 0.0);
            let report = pipeline.process_frame(Frame::new(i as f64, vec![detection]));
            assert!(report.reaped.is_empty(), "frame {i}");
            ids.push(report.annotations[0].id.value());
        }
        assert_eq!(ids, vec![1; 6]);

        let track = pipeline.store().get(TrackId::from(1)).unwrap();
        assert_eq!(track.first_seen, 0.0);
        assert_eq!(track.last_seen, 5.0);
        assert_eq!(track.history().back().unwrap().timestamp, 5.0);
    }

    #[test]
    fn non_finite_frame_timestamp_skips_the_frame() {
        let mut pipeline = TrackingPipeline::new(TrackerConfig::default()).unwrap();
        pipeline.process_frame(Frame::from_centroids(0.0, &[(10.0, 10.0)]));

        let report = pipeline.process_frame(Frame::from_centroids(f64::NAN, &[(10.0, 10.0), (300.0, 300.0)]));
        assert_eq!(report.dropped, 2);
        assert!(report.annotations.is_empty());
        assert!(report.spawned.is_empty());
        assert!(!report.retrained);
        assert_eq!(pipeline.store().len(), 1);
        assert_eq!(pipeline.store().get(TrackId::from(1)).unwrap().hits, 1);
        assert_eq!(pipeline.frames_processed(), 2);

        let report = pipeline.process_frame(Frame::from_centroids(0.1, &[(11.0, 10.0)]));
        assert_eq!(report.annotations[0].id, TrackId::from(1));
    }

    #[test]
    fn nan_first_frame_does_not_stall_time_based_retraining() {
        let mut config = TrackerConfig::default();
        config.classifier.min_samples = 3;
        config.classifier.retrain = RetrainPolicy::EverySeconds { seconds: 1.0 };
        let mut pipeline = TrackingPipeline::new(config).unwrap();

        pipeline.process_frame(Frame::empty(f64::NAN));
        let mut retrains = 0;
        for i in 1..100 {
            let t = i as f64 * 0.1;
            let report = pipeline.process_frame(Frame::from_centroids(t, &[(100.0 + i as f64, 100.0)]));
            if report.retrained {
                retrains += 1;
            }
        }
        assert_eq!(pipeline.readiness(), Readiness::Warm);
        assert!(retrains >= 8, "only {retrains} time-based refits");
    }

    #[test]
    fn predict_track_reads_without_learning() {
        let mut config = TrackerConfig::default();
        config.classifier.min_samples = 2;
        config.classifier.retrain = RetrainPolicy::PerObservation;
        let mut pipeline = TrackingPipeline::new(config).unwrap();
        assert_eq!(pipeline.config().classifier.min_samples, 2);
        assert_eq!(pipeline.predict_track(TrackId::from(1)), None);

        for i in 0..4 {
            pipeline.process_frame(Frame::from_centroids(i as f64 * 0.1, &[(100.0 + 3.0 * i as f64, 100.0)]));
        }
        let id = TrackId::from(1);
        let first = pipeline.predict_track(id);
        assert!(matches!(first, Some(Prediction::Label(_))));
        assert_eq!(pipeline.predict_track(id), first);
        assert_eq!(pipeline.predict_track(TrackId::from(2)), None);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = TrackerConfig {
            distance_threshold: -1.0,
            ..TrackerConfig::default()
        };
        assert!(matches!(TrackingPipeline::new(config), Err(TrackerError::Config(_))));
    }
}
