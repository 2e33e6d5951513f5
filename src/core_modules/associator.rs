// THEORY:
// The associator solves the per-frame "data association problem": which of
// this frame's detections continues which existing track.
//
// It is a greedy nearest-centroid matcher, not a minimum-cost assignment.
// Detections are visited in the order the source produced them. Each one looks
// at the most recent centroid of every track that was live when the frame
// started and has not been claimed yet this frame, and takes the nearest one
// strictly inside the distance threshold. Equal distances go to the track seen
// first in ascending-id order. A detection that finds nothing spawns a track.
//
// Crossing trajectories can be swapped by this scheme. That is an accepted
// property of the heuristic and is left as is.

use crate::core_modules::detection::Detection;
use crate::core_modules::track_store::{TrackId, TrackStore};
use std::collections::HashSet;
use tracing::debug;

/// What happened to one detection this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assignment {
    /// Index into the frame's detection list.
    pub detection_index: usize,
    pub track_id: TrackId,
    /// True when the detection started a new track.
    pub spawned: bool,
}

pub struct Associator {
    distance_threshold: f64,
}

impl Associator {
    pub fn new(distance_threshold: f64) -> Self {
        Self { distance_threshold }
    }

    /// Decides, without touching the store, which live track each detection
    /// continues. `None` means the detection needs a new track.
    pub fn plan(&self, store: &TrackStore, detections: &[Detection]) -> Vec<Option<TrackId>> {
        let mut claimed: HashSet<TrackId> = HashSet::new();
        let mut plan = Vec::with_capacity(detections.len());

        for detection in detections {
            let mut best: Option<(TrackId, f64)> = None;

            for track in store.iter() {
                if claimed.contains(&track.id) {
                    continue;
                }
                let dist = track.last_position().distance(&detection.centroid);
                if dist >= self.distance_threshold {
                    continue;
                }
                match best {
                    Some((_, best_dist)) if best_dist <= dist => {}
                    _ => best = Some((track.id, dist)),
                }
            }

            if let Some((id, _)) = best {
                claimed.insert(id);
            }
            plan.push(best.map(|(id, _)| id));
        }

        plan
    }

    /// Plans the frame and writes it into the store. New tracks receive ids in
    /// detection order.
    pub fn associate(&self, store: &mut TrackStore, detections: &[Detection]) -> Vec<Assignment> {
        let plan = self.plan(store, detections);

        detections
            .iter()
            .zip(plan)
            .enumerate()
            .map(|(detection_index, (detection, matched))| {
                let track_id = store.upsert(matched, detection);
                if let Some(id) = matched {
                    debug!(track = %id, "detection matched");
                }
                Assignment {
                    detection_index,
                    track_id,
                    spawned: matched.is_none(),
                }
            })
            .collect()
    }
}
