// THEORY:
// Every number the tracker acts on is injected from here. Nothing in the
// algorithms carries its own constant; each component receives the slice of
// `TrackerConfig` it needs when the pipeline is built.
//
// The defaults are field heuristics, not tuned results. A deployment can
// override any of them per camera from a JSON file.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration for the `TrackingPipeline`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Max centroid distance for a detection to continue an existing track.
    pub distance_threshold: f64,
    /// Number of centroids each track retains; the oldest is dropped on overflow.
    pub history_capacity: usize,
    /// Number of behavior labels each track remembers for escalation.
    pub label_history_capacity: usize,
    /// Seconds without an update after which a track is reaped.
    pub staleness_timeout_secs: f64,
    /// Smallest foreground region (in pixels) the mask detector reports.
    pub min_area: f64,
    pub heuristic: HeuristicConfig,
    pub classifier: ClassifierConfig,
}

/// Thresholds of the weak-labeling rule and the escalation rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicConfig {
    /// Tracks slower than this with no direction change are labeled Idle.
    pub idle_speed: f64,
    /// Tracks faster than this are labeled Erratic.
    pub erratic_speed: f64,
    /// Tracks with more direction changes than this are labeled Erratic.
    pub erratic_direction_changes: u32,
    /// Number of recent labels inspected for escalation to Suspicious.
    pub suspicious_window: usize,
    /// Escalate when more than this many labels in the window are Erratic.
    pub suspicious_erratic_count: usize,
    /// A track contributes training samples once its history holds this many points.
    pub min_history_for_training: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Training samples required before the classifier answers with a real label.
    pub min_samples: usize,
    /// Upper bound on the training buffer; oldest samples are dropped first.
    pub max_buffer: usize,
    pub retrain: RetrainPolicy,
    pub model: ModelKind,
}

/// When the classifier folds new samples into its model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RetrainPolicy {
    /// Refit on the whole buffer every `frames` frames.
    EveryFrames { frames: u64 },
    /// Refit on the whole buffer every `seconds` of stream time.
    EverySeconds { seconds: f64 },
    /// Apply one incremental update per observed sample.
    PerObservation,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelKind {
    Knn { k: usize },
    Softmax { learning_rate: f64, epochs: usize },
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            distance_threshold: 50.0,
            history_capacity: 30,
            label_history_capacity: 30,
            staleness_timeout_secs: 2.0,
            min_area: 150.0,
            heuristic: HeuristicConfig::default(),
            classifier: ClassifierConfig::default(),
        }
    }
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            idle_speed: 5.0,
            erratic_speed: 100.0,
            erratic_direction_changes: 4,
            suspicious_window: 5,
            suspicious_erratic_count: 3,
            min_history_for_training: 3,
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            min_samples: 11,
            max_buffer: 5_000,
            retrain: RetrainPolicy::EveryFrames { frames: 30 },
            model: ModelKind::Knn { k: 3 },
        }
    }
}

impl TrackerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Rejects values the algorithms cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("distance_threshold", self.distance_threshold)?;
        positive("staleness_timeout_secs", self.staleness_timeout_secs)?;
        if !self.min_area.is_finite() || self.min_area < 0.0 {
            return Err(invalid("min_area", "must be a finite, non-negative number"));
        }
        if self.history_capacity < 2 {
            return Err(invalid("history_capacity", "must hold at least 2 points"));
        }
        if self.label_history_capacity == 0 {
            return Err(invalid("label_history_capacity", "must be at least 1"));
        }

        let h = &self.heuristic;
        if !h.idle_speed.is_finite() || h.idle_speed < 0.0 {
            return Err(invalid("heuristic.idle_speed", "must be a finite, non-negative number"));
        }
        positive("heuristic.erratic_speed", h.erratic_speed)?;
        if h.idle_speed >= h.erratic_speed {
            return Err(invalid("heuristic.idle_speed", "must be below erratic_speed"));
        }
        if h.suspicious_window == 0 {
            return Err(invalid("heuristic.suspicious_window", "must be at least 1"));
        }
        if h.suspicious_window > self.label_history_capacity {
            return Err(invalid(
                "heuristic.suspicious_window",
                "cannot exceed label_history_capacity",
            ));
        }
        if h.min_history_for_training < 2 || h.min_history_for_training > self.history_capacity {
            return Err(invalid(
                "heuristic.min_history_for_training",
                "must lie between 2 and history_capacity",
            ));
        }

        let c = &self.classifier;
        if c.min_samples == 0 {
            return Err(invalid("classifier.min_samples", "must be at least 1"));
        }
        if c.max_buffer < c.min_samples {
            return Err(invalid("classifier.max_buffer", "must be at least min_samples"));
        }
        match c.retrain {
            RetrainPolicy::EveryFrames { frames: 0 } => {
                return Err(invalid("classifier.retrain.frames", "must be at least 1"));
            }
            RetrainPolicy::EverySeconds { seconds } => positive("classifier.retrain.seconds", seconds)?,
            _ => {}
        }
        match c.model {
            ModelKind::Knn { k: 0 } => return Err(invalid("classifier.model.k", "must be at least 1")),
            ModelKind::Softmax { learning_rate, epochs } => {
                positive("classifier.model.learning_rate", learning_rate)?;
                if epochs == 0 {
                    return Err(invalid("classifier.model.epochs", "must be at least 1"));
                }
            }
            _ => {}
        }
        Ok(())
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, "must be a finite, positive number"))
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}
