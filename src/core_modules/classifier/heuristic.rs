// The weak-labeling rule and the escalation rule. Both are heuristics carried
// over from field scripts, with thresholds injected from `HeuristicConfig`.
// They are not verified against ground truth.

use super::Behavior;
use crate::config::HeuristicConfig;
use crate::core_modules::features::FeatureVector;

pub struct WeakLabeler {
    config: HeuristicConfig,
}

impl WeakLabeler {
    pub fn new(config: HeuristicConfig) -> Self {
        Self { config }
    }

    /// Training label for a feature vector:
    /// - slower than `idle_speed` with no reversals → Idle
    /// - faster than `erratic_speed` or more than `erratic_direction_changes`
    ///   reversals → Erratic
    /// - anything else → Normal
    pub fn label(&self, features: &FeatureVector) -> Behavior {
        if features.avg_speed < self.config.idle_speed && features.direction_changes == 0 {
            Behavior::Idle
        } else if features.avg_speed > self.config.erratic_speed
            || features.direction_changes > self.config.erratic_direction_changes
        {
            Behavior::Erratic
        } else {
            Behavior::Normal
        }
    }

    /// Whether a track with `history_len` points should feed the training buffer.
    pub fn should_train(&self, history_len: usize) -> bool {
        history_len >= self.config.min_history_for_training
    }

    /// Promotes `current` to Suspicious when the track's recent labels show a
    /// sustained erratic pattern. `history` is oldest-first and must not yet
    /// contain `current`.
    pub fn escalate<'a, I>(&self, current: Behavior, history: I) -> Behavior
    where
        I: IntoIterator<Item = &'a Behavior>,
        I::IntoIter: DoubleEndedIterator,
    {
        let window = self.config.suspicious_window;
        let recent: Vec<Behavior> = history.into_iter().rev().take(window).copied().collect();
        if recent.len() < window {
            return current;
        }
        let erratic = recent
            .iter()
            .filter(|b| matches!(b, Behavior::Erratic | Behavior::Suspicious))
            .count();
        if erratic > self.config.suspicious_erratic_count {
            Behavior::Suspicious
        } else {
            current
        }
    }
}
