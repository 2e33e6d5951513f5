// THEORY:
// The classifier labels each track's behavior without ever seeing ground truth.
// It learns from its own weak labels: a deterministic rule (`heuristic`) looks
// at the same feature vector and proposes Idle, Normal or Erratic, and those
// proposals become the training set. The learned model generalizes the rule
// over the whole feature vector, while the rule itself stays the bootstrap
// signal and a standing sanity check. The labels are a design choice, not
// truth.
//
// Key architectural principles:
// 1.  **Narrow Seam**: The pipeline only talks to `IncrementalClassifier`
//     (`predict`, `observe`). Any model that can be trained from labeled
//     feature vectors fits behind it.
// 2.  **Cold / Warm Gate**: Until the training buffer holds `min_samples`
//     samples, `predict` answers `Unknown`. From then on it always answers
//     with a label from the closed `Behavior` enum.
// 3.  **Pluggable Refit Policy**: Interval policies refit the model on the
//     whole buffer every N frames or N seconds, inline on the frame thread.
//     That refit is a blocking step and can show up as a latency spike on the
//     frame where it happens. The per-observation policy instead takes one
//     incremental step on every sample.

pub mod heuristic;
pub mod knn;
pub mod softmax;

use crate::config::{ClassifierConfig, ModelKind, RetrainPolicy};
use crate::core_modules::features::{FEATURE_LEN, FeatureVector};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, info};

pub use heuristic::WeakLabeler;
pub use knn::KnnModel;
pub use softmax::SoftmaxModel;

/// The closed set of behavior labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Behavior {
    Idle,
    Normal,
    Erratic,
    /// Escalation of a track that keeps behaving erratically. Never produced
    /// by the weak labeler directly.
    Suspicious,
}

impl Behavior {
    pub const COUNT: usize = 4;

    pub const ALL: [Behavior; Self::COUNT] = [
        Behavior::Idle,
        Behavior::Normal,
        Behavior::Erratic,
        Behavior::Suspicious,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

impl fmt::Display for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Behavior::Idle => "Idle",
            Behavior::Normal => "Normal",
            Behavior::Erratic => "Erratic",
            Behavior::Suspicious => "Suspicious",
        };
        f.write_str(name)
    }
}

/// Result of asking the classifier for a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Prediction {
    /// The classifier is still Cold.
    Unknown,
    Label(Behavior),
}

impl Prediction {
    pub fn label(self) -> Option<Behavior> {
        match self {
            Prediction::Unknown => None,
            Prediction::Label(b) => Some(b),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Cold,
    Warm,
}

/// One weakly-labeled training example.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub features: [f64; FEATURE_LEN],
    pub label: Behavior,
}

impl Sample {
    pub fn new(features: &FeatureVector, label: Behavior) -> Self {
        Self {
            features: features.as_array(),
            label,
        }
    }
}

/// The contract the pipeline relies on.
pub trait IncrementalClassifier: Send {
    fn predict(&self, features: &FeatureVector) -> Prediction;

    /// Adds one weakly-labeled sample.
    fn observe(&mut self, features: &FeatureVector, label: Behavior);

    fn readiness(&self) -> Readiness;

    /// Called once at the end of every frame with the frame's stream time.
    /// Returns true when the model was refit during this call.
    fn end_frame(&mut self, _now: f64) -> bool {
        false
    }
}

/// A concrete learner behind `OnlineClassifier`.
pub trait BehaviorModel: Send {
    /// Replaces the model with one trained on `samples`.
    fn fit(&mut self, samples: &[Sample]);

    /// Folds a single new sample into the current model.
    fn partial_fit(&mut self, sample: &Sample);

    /// `None` when the model has not been trained on anything yet.
    fn predict(&self, features: &[f64; FEATURE_LEN]) -> Option<Behavior>;

    fn name(&self) -> &'static str;
}

impl<M: BehaviorModel + ?Sized> BehaviorModel for Box<M> {
    fn fit(&mut self, samples: &[Sample]) {
        (**self).fit(samples)
    }

    fn partial_fit(&mut self, sample: &Sample) {
        (**self).partial_fit(sample)
    }

    fn predict(&self, features: &[f64; FEATURE_LEN]) -> Option<Behavior> {
        (**self).predict(features)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Buffers weakly-labeled samples and keeps a `BehaviorModel` trained on them.
pub struct OnlineClassifier<M: BehaviorModel> {
    model: M,
    buffer: VecDeque<Sample>,
    min_samples: usize,
    max_buffer: usize,
    policy: RetrainPolicy,
    /// Whether the model has been trained on anything yet.
    fitted: bool,
    frames_since_refit: u64,
    /// Stream time of the last full fit, for `EverySeconds`.
    last_refit_at: Option<f64>,
    /// Set when `observe` performed the first fit; `end_frame` stamps its time.
    warmed_mid_frame: bool,
    refits: u64,
}

impl<M: BehaviorModel> OnlineClassifier<M> {
    pub fn new(model: M, config: &ClassifierConfig) -> Self {
        Self {
            model,
            buffer: VecDeque::with_capacity(config.min_samples),
            min_samples: config.min_samples.max(1),
            max_buffer: config.max_buffer.max(config.min_samples.max(1)),
            policy: config.retrain,
            fitted: false,
            frames_since_refit: 0,
            last_refit_at: None,
            warmed_mid_frame: false,
            refits: 0,
        }
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Number of full refits performed so far.
    pub fn refits(&self) -> u64 {
        self.refits
    }

    fn refit(&mut self) {
        let samples: Vec<Sample> = self.buffer.iter().copied().collect();
        self.model.fit(&samples);
        self.fitted = true;
        self.refits += 1;
        self.frames_since_refit = 0;
        info!(
            model = self.model.name(),
            samples = samples.len(),
            refits = self.refits,
            "behavior model refit"
        );
    }
}

impl<M: BehaviorModel> IncrementalClassifier for OnlineClassifier<M> {
    fn predict(&self, features: &FeatureVector) -> Prediction {
        if self.readiness() == Readiness::Cold {
            return Prediction::Unknown;
        }
        match self.model.predict(&features.as_array()) {
            Some(label) => Prediction::Label(label),
            None => Prediction::Unknown,
        }
    }

    fn observe(&mut self, features: &FeatureVector, label: Behavior) {
        let sample = Sample::new(features, label);
        if self.buffer.len() == self.max_buffer {
            self.buffer.pop_front();
        }
        self.buffer.push_back(sample);

        match self.policy {
            RetrainPolicy::PerObservation => {
                self.model.partial_fit(&sample);
                self.fitted = true;
            }
            RetrainPolicy::EveryFrames { .. } | RetrainPolicy::EverySeconds { .. } => {
                // First fit happens as soon as the buffer is large enough, so a
                // Warm classifier never answers from an empty model.
                if !self.fitted && self.buffer.len() >= self.min_samples {
                    debug!(samples = self.buffer.len(), "classifier warmed up");
                    self.refit();
                    self.warmed_mid_frame = true;
                }
            }
        }
    }

    fn readiness(&self) -> Readiness {
        if self.fitted && self.buffer.len() >= self.min_samples {
            Readiness::Warm
        } else {
            Readiness::Cold
        }
    }

    fn end_frame(&mut self, now: f64) -> bool {
        self.frames_since_refit += 1;

        if !self.fitted || self.buffer.len() < self.min_samples {
            return false;
        }
        if self.warmed_mid_frame {
            self.warmed_mid_frame = false;
            self.last_refit_at = Some(now);
            return false;
        }
        let last = self.last_refit_at.unwrap_or(now);

        let due = match self.policy {
            RetrainPolicy::EveryFrames { frames } => self.frames_since_refit >= frames,
            RetrainPolicy::EverySeconds { seconds } => now - last >= seconds,
            RetrainPolicy::PerObservation => false,
        };
        if due {
            self.refit();
            self.last_refit_at = Some(now);
        }
        due
    }
}

/// Builds the classifier described by `config`.
pub fn build(config: &ClassifierConfig) -> Box<dyn IncrementalClassifier> {
    match config.model {
        ModelKind::Knn { k } => Box::new(OnlineClassifier::new(KnnModel::new(k, config.max_buffer), config)),
        ModelKind::Softmax {
            learning_rate,
            epochs,
        } => Box::new(OnlineClassifier::new(
            SoftmaxModel::new(learning_rate, epochs),
            config,
        )),
    }
}
