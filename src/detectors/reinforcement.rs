//! Reinforcement-loop detection.
//!
//! Flags belief-reinforcement loops: the user restates the same claim with
//! rising certainty and sustained affect. The index is additive over three
//! window ratios plus any external contribution, so each component can push
//! a borderline window over the loop threshold.

use serde::{Deserialize, Serialize};

use crate::config::ThresholdConfig;
use crate::conversation::EmotionProfile;
use crate::detectors::{ConfidenceTagger, Severity};

/// Reinforcement analysis for one window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReinforcementSignal {
    /// Fraction of consecutive confidence pairs that strictly rose.
    pub inflation_score: f64,
    /// Fraction of turns whose content repeats another turn in the window,
    /// after certainty phrasing is stripped.
    pub repetition_ratio: f64,
    /// Fraction of turns with elevated or spiking affect.
    pub affective_ratio: f64,
    /// Sum of the three ratios plus the external contribution.
    pub index: f64,
    /// Whether the index crossed the loop threshold.
    pub loop_detected: bool,
    /// Graded severity.
    pub severity: Severity,
}

/// Detector for certainty-inflating repetition loops.
#[derive(Debug, Clone)]
pub struct ReinforcementDetector {
    loop_index: f64,
    spike_delta: f64,
    tagger: ConfidenceTagger,
}

impl ReinforcementDetector {
    pub fn new(thresholds: &ThresholdConfig) -> Self {
        Self {
            loop_index: thresholds.loop_index,
            spike_delta: thresholds.spike_delta,
            tagger: ConfidenceTagger::new(),
        }
    }

    /// Analyze one window of user turns, oldest-first.
    ///
    /// `texts`, `confidences`, and `profiles` are parallel slices for the
    /// same turns. `failed_verifications` counts fact-check failures in the
    /// window; `external_contribution` folds in signal from outside the
    /// window (zero when absent).
    pub fn analyze(
        &self,
        texts: &[String],
        confidences: &[f64],
        profiles: &[EmotionProfile],
        failed_verifications: usize,
        external_contribution: f64,
    ) -> ReinforcementSignal {
        let repetition_ratio = self.repetition_ratio(texts);
        let inflation_score = inflation(confidences);
        let affective_ratio = self.affective_ratio(profiles);

        let index = repetition_ratio + inflation_score + affective_ratio + external_contribution;
        let loop_detected = index >= self.loop_index;

        let severity = if failed_verifications >= 2 {
            Severity::High
        } else if inflation_score > 0.5 || affective_ratio > 0.5 {
            Severity::Moderate
        } else {
            Severity::Low
        };

        ReinforcementSignal {
            inflation_score,
            repetition_ratio,
            affective_ratio,
            index,
            loop_detected,
            severity,
        }
    }

    /// Fraction of turns whose marker-stripped content matches another turn
    /// in the window.
    fn repetition_ratio(&self, texts: &[String]) -> f64 {
        if texts.len() < 2 {
            return 0.0;
        }
        let normalized: Vec<String> = texts.iter().map(|t| self.tagger.strip_markers(t)).collect();
        let repeated = normalized
            .iter()
            .enumerate()
            .filter(|(i, text)| {
                !text.is_empty()
                    && normalized
                        .iter()
                        .enumerate()
                        .any(|(j, other)| j != *i && other == *text)
            })
            .count();
        repeated as f64 / normalized.len() as f64
    }

    /// Fraction of turns with intensity above the spike threshold, or a
    /// turn-to-turn jump beyond it.
    fn affective_ratio(&self, profiles: &[EmotionProfile]) -> f64 {
        if profiles.is_empty() {
            return 0.0;
        }
        let elevated = profiles
            .iter()
            .enumerate()
            .filter(|(i, p)| {
                p.intensity > self.spike_delta
                    || (*i > 0
                        && (p.intensity - profiles[i - 1].intensity).abs() > self.spike_delta)
            })
            .count();
        elevated as f64 / profiles.len() as f64
    }
}

/// Fraction of consecutive confidence pairs that strictly increased.
fn inflation(confidences: &[f64]) -> f64 {
    if confidences.len() < 2 {
        return 0.0;
    }
    let rising = confidences.windows(2).filter(|w| w[1] > w[0]).count();
    rising as f64 / (confidences.len() - 1) as f64
}
