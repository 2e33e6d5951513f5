use motion_sentinel::config::{ModelKind, RetrainPolicy};
use motion_sentinel::core_modules::annotation::JsonLinesAnnotator;
use motion_sentinel::core_modules::classifier::Readiness;
use motion_sentinel::core_modules::lifecycle::TrackState;
use motion_sentinel::pipeline::FrameIter;
use motion_sentinel::{Behavior, Frame, Prediction, TrackId, TrackerConfig, TrackingPipeline};

fn pipeline() -> TrackingPipeline {
    TrackingPipeline::new(TrackerConfig::default()).unwrap()
}

fn ids(report: &motion_sentinel::FrameReport) -> Vec<u64> {
    report.annotations.iter().map(|a| a.id.value()).collect()
}

#[test]
fn object_is_followed_then_reaped_and_a_newcomer_gets_a_fresh_id() {
    let mut p = pipeline();

    let r0 = p.process_frame(Frame::from_centroids(0.0, &[(100.0, 100.0)]));
    assert_eq!(r0.spawned, vec![TrackId::from(1)]);

    let r1 = p.process_frame(Frame::from_centroids(1.0, &[(110.0, 100.0)]));
    assert!(r1.spawned.is_empty());
    assert_eq!(ids(&r1), vec![1]);

    let r2 = p.process_frame(Frame::empty(3.5));
    assert_eq!(r2.reaped, vec![TrackId::from(1)]);
    assert!(p.store().is_empty());

    let r3 = p.process_frame(Frame::from_centroids(5.0, &[(300.0, 300.0)]));
    assert_eq!(r3.spawned, vec![TrackId::from(2)]);
    assert_eq!(p.store().all_ids().into_iter().collect::<Vec<_>>(), vec![TrackId::from(2)]);
}

#[test]
fn a_track_exactly_at_the_timeout_survives() {
    let mut p = pipeline();
    p.process_frame(Frame::from_centroids(0.0, &[(100.0, 100.0)]));
    let report = p.process_frame(Frame::empty(2.0));
    assert!(report.reaped.is_empty());
    assert_eq!(p.store().len(), 1);
}

#[test]
fn stale_track_is_not_resurrected_by_a_nearby_detection() {
    let mut p = pipeline();
    p.process_frame(Frame::from_centroids(0.0, &[(100.0, 100.0)]));
    let report = p.process_frame(Frame::from_centroids(10.0, &[(101.0, 100.0)]));
    assert_eq!(report.reaped, vec![TrackId::from(1)]);
    assert_eq!(report.spawned, vec![TrackId::from(2)]);
}

#[test]
fn parallel_walkers_keep_their_ids() {
    let mut p = pipeline();
    for i in 0..40 {
        let t = i as f64 * 0.1;
        let x = 10.0 + 4.0 * i as f64;
        let report = p.process_frame(Frame::from_centroids(t, &[(x, 100.0), (x, 300.0)]));
        assert_eq!(ids(&report), vec![1, 2], "frame {i}");
    }
    assert_eq!(p.store().len(), 2);
    let track = p.store().get(TrackId::from(1)).unwrap();
    assert_eq!(track.history().len(), 30);
    assert_eq!(track.hits, 40);
    assert_eq!(track.state(), TrackState::Active);
}

#[test]
fn each_track_takes_at_most_one_detection_per_frame() {
    let mut p = pipeline();
    p.process_frame(Frame::from_centroids(0.0, &[(100.0, 100.0)]));
    let report = p.process_frame(Frame::from_centroids(0.1, &[(105.0, 100.0), (102.0, 100.0)]));

    assert_eq!(report.spawned, vec![TrackId::from(2)]);
    assert_eq!(p.store().get(TrackId::from(1)).unwrap().last_position().x, 105.0);
}

#[test]
fn ids_are_never_reused() {
    let mut p = pipeline();
    let mut seen = Vec::new();
    for round in 0..5 {
        let t = round as f64 * 10.0;
        let report = p.process_frame(Frame::from_centroids(t, &[(50.0, 50.0)]));
        seen.extend(report.spawned.iter().map(|id| id.value()));
    }
    assert_eq!(seen, vec![1, 2, 3, 4, 5]);
}

#[test]
fn classifier_is_unknown_until_enough_samples_then_labels() {
    let mut p = pipeline();
    let mut reports = Vec::new();
    for i in 0..16 {
        let t = i as f64 * 0.1;
        reports.push(p.process_frame(Frame::from_centroids(t, &[(20.0 + 5.0 * i as f64, 200.0)])));
    }

    // Samples start at the third point; the eleventh arrives on frame 12.
    for report in &reports[..13] {
        assert_eq!(report.annotations[0].prediction, Prediction::Unknown);
    }
    assert_eq!(p.readiness(), Readiness::Warm);
    for report in &reports[13..] {
        assert_eq!(report.annotations[0].prediction, Prediction::Label(Behavior::Normal));
        assert_eq!(report.annotations[0].behavior, Behavior::Normal);
    }
}

#[test]
fn sustained_erratic_motion_escalates_to_suspicious() {
    let mut p = pipeline();
    let mut behaviors = Vec::new();
    for i in 0..8 {
        let t = i as f64 * 0.1;
        let report = p.process_frame(Frame::from_centroids(t, &[(20.0 + 20.0 * i as f64, 200.0)]));
        let a = &report.annotations[0];
        behaviors.push(a.behavior);
        if i > 0 {
            assert_eq!(a.heuristic, Behavior::Erratic);
        }
    }

    assert_eq!(behaviors[0], Behavior::Idle);
    assert!(behaviors[1..5].iter().all(|b| *b == Behavior::Erratic));
    assert!(behaviors[5..].iter().all(|b| *b == Behavior::Suspicious));
}

#[test]
fn empty_frames_only_age_tracks() {
    let mut p = pipeline();
    p.process_frame(Frame::from_centroids(0.0, &[(0.0, 0.0), (500.0, 500.0)]));
    for i in 1..=4 {
        let report = p.process_frame(Frame::empty(i as f64 * 0.5));
        assert!(report.annotations.is_empty());
        assert!(report.spawned.is_empty());
    }
    assert_eq!(p.store().len(), 2);
    assert_eq!(p.frames_processed(), 5);
}

#[test]
fn softmax_per_observation_config_from_json() {
    let json = r#"{
        "distance_threshold": 40.0,
        "classifier": {
            "min_samples": 4,
            "retrain": { "mode": "per_observation" },
            "model": { "kind": "softmax", "learning_rate": 0.1, "epochs": 1 }
        }
    }"#;
    let config = TrackerConfig::from_json_str(json).unwrap();
    assert_eq!(config.classifier.retrain, RetrainPolicy::PerObservation);
    assert!(matches!(config.classifier.model, ModelKind::Softmax { .. }));
    assert_eq!(config.history_capacity, 30);

    let mut p = TrackingPipeline::new(config).unwrap();
    let mut last = None;
    for i in 0..10 {
        let t = i as f64 * 0.1;
        last = Some(p.process_frame(Frame::from_centroids(t, &[(20.0 + 3.0 * i as f64, 50.0)])));
    }
    assert_eq!(p.readiness(), Readiness::Warm);
    assert!(matches!(last.unwrap().annotations[0].prediction, Prediction::Label(_)));
}

#[test]
fn run_writes_one_json_line_per_frame() {
    let frames = (0..6).map(|i| Frame::from_centroids(i as f64 * 0.1, &[(10.0 + i as f64, 10.0)]));
    let mut p = pipeline();
    let mut annotator = JsonLinesAnnotator::new(Vec::new());

    let processed = p.run(&mut FrameIter(frames), &mut annotator).unwrap();
    assert_eq!(processed, 6);

    let out = String::from_utf8(annotator.into_inner()).unwrap();
    let lines: Vec<serde_json::Value> = out.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    assert_eq!(lines.len(), 6);
    assert_eq!(lines[0]["spawned"][0], 1);
    assert_eq!(lines[5]["annotations"][0]["id"], 1);
    assert_eq!(lines[5]["annotations"][0]["prediction"], "unknown");
}

#[test]
fn teardown_keeps_ids_unique() {
    let mut p = pipeline();
    p.process_frame(Frame::from_centroids(0.0, &[(0.0, 0.0), (200.0, 0.0)]));
    p.teardown();
    assert!(p.store().is_empty());
    let report = p.process_frame(Frame::from_centroids(0.1, &[(0.0, 0.0)]));
    assert_eq!(report.spawned, vec![TrackId::from(3)]);
}
