// THEORY:
// The `SharedPipeline` puts a `TrackingPipeline` behind one exclusive-access
// boundary so that separate tasks (a capture task, a renderer, a status
// endpoint) can talk to the same tracker.
//
// Key architectural principles:
// 1.  **One Frame at a Time**: Every frame is processed while holding the
//     lock for the whole frame. Reaping, association and classification
//     of one frame never interleave with another frame or with a reader.
// 2.  **Readers See Whole Frames**: Snapshots take the same lock, so they
//     observe the store either before or after a frame, never halfway.
// 3.  **Back-pressure Through Channels**: The driver task pulls frames from a
//     stream and pushes reports into a bounded `mpsc` channel. A slow
//     consumer slows the driver down instead of growing a queue.

use crate::core_modules::classifier::Readiness;
use crate::core_modules::detection::Frame;
use crate::core_modules::track_store::{Track, TrackId};
use crate::error::{SourceError, TrackerError};
use crate::pipeline::{FrameReport, TrackingPipeline};
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Clone)]
pub struct SharedPipeline {
    inner: Arc<Mutex<TrackingPipeline>>,
}

impl SharedPipeline {
    pub fn new(pipeline: TrackingPipeline) -> Self {
        Self {
            inner: Arc::new(Mutex::new(pipeline)),
        }
    }

    pub async fn process_frame(&self, frame: Frame) -> FrameReport {
        self.inner.lock().await.process_frame(frame)
    }

    /// Copies of every live track, in id order.
    pub async fn snapshot(&self) -> Vec<Track> {
        self.inner.lock().await.store().iter().cloned().collect()
    }

    pub async fn track(&self, id: TrackId) -> Option<Track> {
        self.inner.lock().await.store().get(id).cloned()
    }

    pub async fn track_count(&self) -> usize {
        self.inner.lock().await.store().len()
    }

    pub async fn readiness(&self) -> Readiness {
        self.inner.lock().await.readiness()
    }

    pub async fn teardown(&self) {
        self.inner.lock().await.teardown();
    }

    /// Processes `frames` until the stream ends, sending each report to
    /// `reports`. Returns the number of frames processed.
    pub async fn drive<S>(&self, mut frames: S, reports: mpsc::Sender<FrameReport>) -> Result<u64, TrackerError>
    where
        S: Stream<Item = Result<Frame, SourceError>> + Unpin,
    {
        let mut processed = 0;
        while let Some(next) = frames.next().await {
            let frame = match next {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(error = %e, processed, "frame stream failed");
                    return Err(e.into());
                }
            };
            let report = self.process_frame(frame).await;
            reports
                .send(report)
                .await
                .map_err(|_| TrackerError::ReportChannelClosed)?;
            processed += 1;
        }
        info!(processed, "frame stream finished");
        Ok(processed)
    }

    /// Runs `drive` on its own task.
    pub fn spawn<S>(&self, frames: S, reports: mpsc::Sender<FrameReport>) -> JoinHandle<Result<u64, TrackerError>>
    where
        S: Stream<Item = Result<Frame, SourceError>> + Unpin + Send + 'static,
    {
        let shared = self.clone();
        tokio::spawn(async move { shared.drive(frames, reports).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfig;
    use futures::stream;

    fn shared() -> SharedPipeline {
        SharedPipeline::new(TrackingPipeline::new(TrackerConfig::default()).unwrap())
    }

    #[tokio::test]
    async fn drives_a_stream_to_completion() {
        let pipeline = shared();
        let frames = stream::iter((0..4).map(|i| Ok(Frame::from_centroids(i as f64 * 0.1, &[(10.0 * i as f64, 0.0)]))));
        let (tx, mut rx) = mpsc::channel(8);

        let handle = pipeline.spawn(frames, tx);
        let mut reports = Vec::new();
        while let Some(report) = rx.recv().await {
            reports.push(report);
        }

        assert_eq!(handle.await.unwrap().unwrap(), 4);
        assert_eq!(reports.len(), 4);
        assert_eq!(reports[0].spawned, vec![TrackId::from(1)]);
        assert!(reports[1..].iter().all(|r| r.spawned.is_empty()));
        assert_eq!(pipeline.track_count().await, 1);
    }

    #[tokio::test]
    async fn stream_errors_stop_the_driver() {
        let pipeline = shared();
        let frames = stream::iter(vec![
            Ok(Frame::from_centroids(0.0, &[(0.0, 0.0)])),
            Err(SourceError::Disconnected("socket reset".into())),
            Ok(Frame::from_centroids(0.2, &[(0.0, 0.0)])),
        ]);
        let (tx, mut rx) = mpsc::channel(8);

        let result = pipeline.drive(frames, tx).await;
        assert!(matches!(result, Err(TrackerError::Source(_))));
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn closed_report_channel_is_an_error() {
        let pipeline = shared();
        let frames = stream::iter(vec![Ok(Frame::empty(0.0))]);
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let result = pipeline.drive(frames, tx).await;
        assert!(matches!(result, Err(TrackerError::ReportChannelClosed)));
    }

    #[tokio::test]
    async fn concurrent_submitters_never_share_an_id() {
        let pipeline = shared();
        let mut handles = Vec::new();
        for task in 0..4 {
            let p = pipeline.clone();
            handles.push(tokio::spawn(async move {
                let x = 1000.0 * (task + 1) as f64;
                p.process_frame(Frame::from_centroids(0.0, &[(x, 0.0)])).await
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.extend(handle.await.unwrap().spawned);
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 4);

        let snapshot = pipeline.snapshot().await;
        assert_eq!(snapshot.len(), 4);
        assert!(snapshot.windows(2).all(|w| w[0].id < w[1].id));
    }
}
