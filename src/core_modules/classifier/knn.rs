use super::{Behavior, BehaviorModel, Sample};
use crate::core_modules::features::FEATURE_LEN;
use std::collections::VecDeque;

/// k-nearest-neighbour vote over the raw feature space.
///
/// `fit` swaps in a new reference set; `partial_fit` appends to it. Ties in the
/// vote go to the label with the lowest index.
pub struct KnnModel {
    k: usize,
    max_samples: usize,
    samples: VecDeque<Sample>,
}

impl KnnModel {
    pub fn new(k: usize, max_samples: usize) -> Self {
        Self {
            k: k.max(1),
            max_samples: max_samples.max(1),
            samples: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

fn squared_distance(a: &[f64; FEATURE_LEN], b: &[f64; FEATURE_LEN]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

impl BehaviorModel for KnnModel {
    fn fit(&mut self, samples: &[Sample]) {
        let skip = samples.len().saturating_sub(self.max_samples);
        self.samples = samples[skip..].iter().copied().collect();
    }

    fn partial_fit(&mut self, sample: &Sample) {
        if self.samples.len() == self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(*sample);
    }

    fn predict(&self, features: &[f64; FEATURE_LEN]) -> Option<Behavior> {
        if self.samples.is_empty() {
            return None;
        }

        let mut neighbours: Vec<(f64, Behavior)> = self
            .samples
            .iter()
            .map(|s| (squared_distance(&s.features, features), s.label))
            .collect();
        neighbours.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut votes = [0usize; Behavior::COUNT];
        for (_, label) in neighbours.iter().take(self.k) {
            votes[label.index()] += 1;
        }

        let mut best = 0;
        for (i, count) in votes.iter().enumerate() {
            if *count > votes[best] {
                best = i;
            }
        }
        Behavior::from_index(best)
    }

    fn name(&self) -> &'static str {
        "knn"
    }
}
