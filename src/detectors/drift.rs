//! Semantic drift tracking over the visible turn window.
//!
//! Embeds each turn and measures how far consecutive turns move apart in
//! embedding space. Keyword-disjoint consecutive pairs are counted as topic
//! shifts so that jumpy-but-related phrasing grades lower than wholesale
//! topic abandonment.

use serde::{Deserialize, Serialize};

use crate::config::ThresholdConfig;
use crate::detectors::Severity;
use crate::providers::{cosine_similarity, Embedder};

/// Drift analysis for one window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftReport {
    /// 1 minus the mean consecutive cosine similarity, in [0,1].
    /// Zero when the window has fewer than two turns.
    pub drift_score: f64,
    /// Consecutive turn pairs sharing no content keywords.
    pub topic_shifts: usize,
    /// Graded severity of the drift.
    pub severity: Severity,
}

/// Drift detector over a turn window.
#[derive(Debug, Clone)]
pub struct DriftTracker {
    threshold: f64,
}

impl DriftTracker {
    pub fn new(thresholds: &ThresholdConfig) -> Self {
        Self {
            threshold: thresholds.drift,
        }
    }

    /// Analyze the window. `texts` is oldest-first.
    pub fn analyze(&self, texts: &[String], embedder: &dyn Embedder) -> DriftReport {
        if texts.len() < 2 {
            return DriftReport {
                drift_score: 0.0,
                topic_shifts: 0,
                severity: Severity::Low,
            };
        }

        let embeddings: Vec<Vec<f64>> = texts.iter().map(|t| embedder.embed(t)).collect();
        let mut similarity_sum = 0.0;
        for pair in embeddings.windows(2) {
            similarity_sum += cosine_similarity(&pair[0], &pair[1]);
        }
        let mean_similarity = similarity_sum / (embeddings.len() - 1) as f64;
        let drift_score = (1.0 - mean_similarity).clamp(0.0, 1.0);

        let topic_shifts = texts
            .windows(2)
            .filter(|pair| {
                let a = content_keywords(&pair[0]);
                let b = content_keywords(&pair[1]);
                !a.iter().any(|w| b.contains(w))
            })
            .count();

        let severity = if drift_score > self.threshold && topic_shifts >= 3 {
            Severity::High
        } else if drift_score > self.threshold {
            Severity::Moderate
        } else {
            Severity::Low
        };

        DriftReport {
            drift_score,
            topic_shifts,
            severity,
        }
    }
}

/// Content words: alphanumeric tokens longer than three characters.
fn content_keywords(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 3)
        .map(|w| w.to_string())
        .collect()
}
