// THEORY:
// The reaper gives tracks a way to die. Once per frame it evicts every track
// whose last update is older than the staleness timeout. Everything a track
// remembers (motion history, label history) lives inside the `Track`, so
// removing it from the store drops all per-track memory in one step.
//
// A track is stale when `now - last_seen > timeout`. Exactly `timeout` is
// still alive.

use crate::core_modules::track_store::{Track, TrackId, TrackStore};
use tracing::debug;

pub struct Reaper {
    timeout_secs: f64,
}

impl Reaper {
    pub fn new(timeout_secs: f64) -> Self {
        Self { timeout_secs }
    }

    pub fn is_stale(&self, track: &Track, now: f64) -> bool {
        now - track.last_seen > self.timeout_secs
    }

    /// Removes every stale track and returns them in their terminal state.
    pub fn reap(&self, store: &mut TrackStore, now: f64) -> Vec<Track> {
        let stale: Vec<TrackId> = store
            .iter()
            .filter(|t| self.is_stale(t, now))
            .map(|t| t.id)
            .collect();

        stale
            .into_iter()
            .filter_map(|id| self.reap_id(store, id))
            .collect()
    }

    /// Evicts one track. Reaping an id that is not live is a no-op.
    pub fn reap_id(&self, store: &mut TrackStore, id: TrackId) -> Option<Track> {
        let mut track = store.remove(id)?;
        let lifecycle = track.lifecycle_mut();
        lifecycle.expire();
        lifecycle.reap();
        debug!(track = %id, hits = track.hits, last_seen = track.last_seen, "track reaped");
        Some(track)
    }
}
