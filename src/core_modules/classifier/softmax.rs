use super::{Behavior, BehaviorModel, Sample};
use crate::core_modules::features::FEATURE_LEN;

const CLASSES: usize = Behavior::COUNT;
const MIN_STD: f64 = 1e-9;

/// Running per-feature mean and variance (Welford), used to put features with
/// very different scales (pixels, pixels/s, counts, areas) on one footing.
#[derive(Debug, Clone)]
struct Standardizer {
    count: f64,
    mean: [f64; FEATURE_LEN],
    m2: [f64; FEATURE_LEN],
}

impl Standardizer {
    fn new() -> Self {
        Self {
            count: 0.0,
            mean: [0.0; FEATURE_LEN],
            m2: [0.0; FEATURE_LEN],
        }
    }

    fn update(&mut self, x: &[f64; FEATURE_LEN]) {
        self.count += 1.0;
        for i in 0..FEATURE_LEN {
            let delta = x[i] - self.mean[i];
            self.mean[i] += delta / self.count;
            self.m2[i] += delta * (x[i] - self.mean[i]);
        }
    }

    fn transform(&self, x: &[f64; FEATURE_LEN]) -> [f64; FEATURE_LEN] {
        let mut out = [0.0; FEATURE_LEN];
        for i in 0..FEATURE_LEN {
            let std = if self.count > 0.0 {
                (self.m2[i] / self.count).sqrt()
            } else {
                0.0
            };
            out[i] = if std > MIN_STD {
                (x[i] - self.mean[i]) / std
            } else {
                x[i] - self.mean[i]
            };
        }
        out
    }
}

/// Multinomial logistic regression trained with plain SGD.
///
/// `fit` resets the weights and runs `epochs` passes over the samples;
/// `partial_fit` takes a single gradient step.
pub struct SoftmaxModel {
    weights: [[f64; FEATURE_LEN]; CLASSES],
    bias: [f64; CLASSES],
    learning_rate: f64,
    epochs: usize,
    scaler: Standardizer,
}

impl SoftmaxModel {
    pub fn new(learning_rate: f64, epochs: usize) -> Self {
        Self {
            weights: [[0.0; FEATURE_LEN]; CLASSES],
            bias: [0.0; CLASSES],
            learning_rate,
            epochs: epochs.max(1),
            scaler: Standardizer::new(),
        }
    }

    fn reset(&mut self) {
        self.weights = [[0.0; FEATURE_LEN]; CLASSES];
        self.bias = [0.0; CLASSES];
        self.scaler = Standardizer::new();
    }

    fn logits(&self, z: &[f64; FEATURE_LEN]) -> [f64; CLASSES] {
        let mut out = self.bias;
        for (c, row) in self.weights.iter().enumerate() {
            out[c] += row.iter().zip(z.iter()).map(|(w, x)| w * x).sum::<f64>();
        }
        out
    }

    /// Class probabilities for a feature vector.
    pub fn probabilities(&self, features: &[f64; FEATURE_LEN]) -> [f64; CLASSES] {
        softmax(self.logits(&self.scaler.transform(features)))
    }

    fn step(&mut self, z: &[f64; FEATURE_LEN], label: Behavior) {
        let p = softmax(self.logits(z));
        for c in 0..CLASSES {
            let target = if c == label.index() { 1.0 } else { 0.0 };
            let grad = p[c] - target;
            for (w, x) in self.weights[c].iter_mut().zip(z.iter()) {
                *w -= self.learning_rate * grad * x;
            }
            self.bias[c] -= self.learning_rate * grad;
        }
    }
}

fn softmax(logits: [f64; CLASSES]) -> [f64; CLASSES] {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut out = [0.0; CLASSES];
    let mut sum = 0.0;
    for (o, l) in out.iter_mut().zip(logits.iter()) {
        *o = (l - max).exp();
        sum += *o;
    }
    for o in out.iter_mut() {
        *o /= sum;
    }
    out
}

impl BehaviorModel for SoftmaxModel {
    fn fit(&mut self, samples: &[Sample]) {
        self.reset();
        if samples.is_empty() {
            return;
        }
        for s in samples {
            self.scaler.update(&s.features);
        }
        let standardized: Vec<([f64; FEATURE_LEN], Behavior)> = samples
            .iter()
            .map(|s| (self.scaler.transform(&s.features), s.label))
            .collect();
        for _ in 0..self.epochs {
            for (z, label) in &standardized {
                self.step(z, *label);
            }
        }
    }

    fn partial_fit(&mut self, sample: &Sample) {
        self.scaler.update(&sample.features);
        let z = self.scaler.transform(&sample.features);
        self.step(&z, sample.label);
    }

    fn predict(&self, features: &[f64; FEATURE_LEN]) -> Option<Behavior> {
        if self.scaler.count == 0.0 {
            return None;
        }
        let p = self.probabilities(features);
        let mut best = 0;
        for c in 1..CLASSES {
            if p[c] > p[best] {
                best = c;
            }
        }
        Behavior::from_index(best)
    }

    fn name(&self) -> &'static str {
        "softmax"
    }
}
