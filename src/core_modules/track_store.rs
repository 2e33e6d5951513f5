// THEORY:
// The `track_store` module gives the tracker its memory. It owns every live
// `Track`, each of which represents one object's existence *over time*, as
// opposed to a `Detection`, which is a snapshot in a single frame.
//
// Key architectural principles:
// 1.  **Single Owner**: Tracks live only here. The associator appends to them
//     through `upsert`, the reaper deletes them through `remove`, and every
//     other stage only reads.
// 2.  **Monotonic Identity**: Ids come from an internal counter that only ever
//     moves forward. An id is never handed out twice, not even after its track
//     has been reaped.
// 3.  **Bounded Memory**: A track keeps a fixed number of recent centroids and
//     labels. When a history is full the oldest entry is dropped before the
//     newest is appended.

use crate::core_modules::classifier::Behavior;
use crate::core_modules::detection::{BoundingBox, Detection, Point};
use crate::core_modules::lifecycle::{TrackLifecycle, TrackState};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use tracing::debug;

/// Persistent identity of a tracked object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TrackId(u64);

impl TrackId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TrackId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// One entry of a track's motion history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackPoint {
    pub position: Point,
    /// Stream time in seconds.
    pub timestamp: f64,
}

/// An object being followed across frames.
#[derive(Debug, Clone)]
pub struct Track {
    /// Unique, never reused.
    pub id: TrackId,
    /// Recent centroids, oldest first.
    history: VecDeque<TrackPoint>,
    history_capacity: usize,
    /// Recent behavior labels, oldest first.
    label_history: VecDeque<Behavior>,
    label_capacity: usize,
    /// The bounding box of the most recent matching detection.
    pub latest_bbox: BoundingBox,
    /// The area of the most recent matching detection.
    pub latest_area: f64,
    pub first_seen: f64,
    pub last_seen: f64,
    /// Number of detections this track has absorbed, including the first.
    pub hits: u64,
    lifecycle: TrackLifecycle,
}

impl Track {
    fn new(id: TrackId, detection: &Detection, history_capacity: usize, label_capacity: usize) -> Self {
        let mut history = VecDeque::with_capacity(history_capacity);
        history.push_back(TrackPoint {
            position: detection.centroid,
            timestamp: detection.timestamp,
        });
        Self {
            id,
            history,
            history_capacity,
            label_history: VecDeque::with_capacity(label_capacity),
            label_capacity,
            latest_bbox: detection.bbox,
            latest_area: detection.area,
            first_seen: detection.timestamp,
            last_seen: detection.timestamp,
            hits: 1,
            lifecycle: TrackLifecycle::new(),
        }
    }

    fn absorb(&mut self, detection: &Detection) {
        if self.history.len() == self.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(TrackPoint {
            position: detection.centroid,
            timestamp: detection.timestamp,
        });
        self.latest_bbox = detection.bbox;
        self.latest_area = detection.area;
        self.last_seen = detection.timestamp;
        self.hits += 1;
        self.lifecycle.hit();
    }

    pub fn history(&self) -> &VecDeque<TrackPoint> {
        &self.history
    }

    /// The most recent centroid. A track always has at least one.
    pub fn last_position(&self) -> Point {
        self.history
            .back()
            .map(|p| p.position)
            .unwrap_or_default()
    }

    pub fn label_history(&self) -> &VecDeque<Behavior> {
        &self.label_history
    }

    pub fn record_label(&mut self, label: Behavior) {
        if self.label_history.len() == self.label_capacity {
            self.label_history.pop_front();
        }
        self.label_history.push_back(label);
    }

    pub fn state(&self) -> TrackState {
        self.lifecycle.state()
    }

    pub(crate) fn lifecycle_mut(&mut self) -> &mut TrackLifecycle {
        &mut self.lifecycle
    }
}

/// Holds all live tracks, keyed and ordered by id.
pub struct TrackStore {
    tracks: BTreeMap<TrackId, Track>,
    next_id: u64,
    history_capacity: usize,
    label_capacity: usize,
}

impl TrackStore {
    pub fn new(history_capacity: usize, label_capacity: usize) -> Self {
        Self {
            tracks: BTreeMap::new(),
            next_id: 1,
            history_capacity: history_capacity.max(1),
            label_capacity: label_capacity.max(1),
        }
    }

    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(&id)
    }

    pub fn get_mut(&mut self, id: TrackId) -> Option<&mut Track> {
        self.tracks.get_mut(&id)
    }

    /// Appends `detection` to the live track `id`, or starts a new track when
    /// `id` is `None` or names a track that is no longer live. Returns the id
    /// the detection ended up on.
    pub fn upsert(&mut self, id: Option<TrackId>, detection: &Detection) -> TrackId {
        if let Some(track) = id.and_then(|id| self.tracks.get_mut(&id)) {
            track.absorb(detection);
            return track.id;
        }

        let new_id = TrackId(self.next_id);
        self.next_id += 1;
        self.tracks.insert(
            new_id,
            Track::new(new_id, detection, self.history_capacity, self.label_capacity),
        );
        debug!(track = %new_id, x = detection.centroid.x, y = detection.centroid.y, "track spawned");
        new_id
    }

    /// Removes a track. Removing an id that is not live is a no-op.
    pub fn remove(&mut self, id: TrackId) -> Option<Track> {
        self.tracks.remove(&id)
    }

    pub fn all_ids(&self) -> BTreeSet<TrackId> {
        self.tracks.keys().copied().collect()
    }

    /// Live tracks in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Drops every live track. The id counter is kept, so ids stay unique for
    /// the lifetime of the store.
    pub fn teardown(&mut self) {
        self.tracks.clear();
    }
}
