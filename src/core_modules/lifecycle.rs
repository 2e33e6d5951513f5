//! Track lifecycle state machine.
//!
//! New → Active → Stale → Reaped. `Reaped` is terminal.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackState {
    /// Created this frame from an unmatched detection.
    New,
    /// Matched at least once after creation.
    Active,
    /// Went longer than the staleness timeout without an update.
    Stale,
    /// Removed from the store. Cannot recover.
    Reaped,
}

/// Controls lifecycle transitions for a single track.
#[derive(Debug, Clone)]
pub struct TrackLifecycle {
    state: TrackState,
}

impl TrackLifecycle {
    pub fn new() -> Self {
        Self {
            state: TrackState::New,
        }
    }

    /// Register a matched detection.
    ///
    /// - New / Active: → Active
    /// - Stale / Reaped: unchanged
    pub fn hit(&mut self) {
        if matches!(self.state, TrackState::New | TrackState::Active) {
            self.state = TrackState::Active;
        }
    }

    /// Register that the staleness timeout elapsed. New tracks that were never
    /// matched again expire the same way Active ones do.
    pub fn expire(&mut self) {
        if matches!(self.state, TrackState::New | TrackState::Active) {
            self.state = TrackState::Stale;
        }
    }

    /// Stale → Reaped. Any other state is left alone.
    pub fn reap(&mut self) {
        if self.state == TrackState::Stale {
            self.state = TrackState::Reaped;
        }
    }

    pub fn state(&self) -> TrackState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state == TrackState::Reaped
    }
}

impl Default for TrackLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
