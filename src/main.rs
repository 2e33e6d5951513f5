// Example runner for the `motion_sentinel` library.
//
// Feeds a small synthetic scene through the tracker and writes one JSON line of
// annotations per frame to stdout. Pass a JSON config path as the first
// argument to override the defaults; set MOTION_SENTINEL_LOG to change the log
// level (logs go to stderr).

use anyhow::{Context, Result};
use motion_sentinel::core_modules::annotation::JsonLinesAnnotator;
use motion_sentinel::pipeline::FrameIter;
use motion_sentinel::{Frame, TrackerConfig, TrackingPipeline};
use std::io;
use tracing::{Level, info};

const FPS: f64 = 10.0;
const FRAMES: usize = 120;

fn main() -> Result<()> {
    let level = std::env::var("MOTION_SENTINEL_LOG")
        .ok()
        .and_then(|v| v.parse::<Level>().ok())
        .unwrap_or(Level::INFO);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => TrackerConfig::from_json_file(&path)
            .with_context(|| format!("loading tracker config from {path}"))?,
        None => TrackerConfig::default(),
    };
    info!(?config, "starting motion sentinel example runner");

    let mut pipeline = TrackingPipeline::new(config).context("building tracking pipeline")?;
    let mut source = FrameIter((0..FRAMES).map(scene_frame));
    let mut annotator = JsonLinesAnnotator::new(io::stdout().lock());

    let processed = pipeline.run(&mut source, &mut annotator)?;
    info!(
        processed,
        live = pipeline.store().len(),
        readiness = ?pipeline.readiness(),
        "scene finished"
    );
    pipeline.teardown();
    Ok(())
}

/// Four objects: a steady walker, a pacer that keeps reversing, one that never
/// moves, and a visitor that leaves halfway through.
fn scene_frame(i: usize) -> Frame {
    let t = i as f64 / FPS;
    let mut centroids = vec![
        (20.0 + 3.0 * i as f64, 100.0),
        (400.0 + if (i / 2) % 2 == 0 { 0.0 } else { 30.0 }, 300.0 + 2.0 * (i % 4) as f64),
        (600.0, 50.0),
    ];
    if i < FRAMES / 2 {
        centroids.push((250.0, 450.0 - 2.0 * i as f64));
    }
    Frame::from_centroids(t, &centroids)
}
