//! Confidence tagging - epistemic certainty from lexical markers.
//!
//! Scores text by hedging vs. assertive markers and optionally folds in
//! corroborating sources from the claim verifier. Distinguishes speculation
//! from grounded assertion and feeds certainty-inflation tracking.

use serde::{Deserialize, Serialize};

use crate::providers::VerificationOutcome;

/// Markers that pull the score toward speculation.
const HEDGING_MARKERS: &[&str] = &["maybe", "possibly", "some say", "unclear", "allegedly"];

/// Markers that pull the score toward assertion.
const ASSERTIVE_MARKERS: &[&str] = &[
    "definitely",
    "clearly",
    "proven",
    "confirmed",
    "without doubt",
];

/// Whether a claim passed external verification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    /// Corroborated by at least one trusted source.
    Verified,
    /// Not checked, or checked and not corroborated.
    #[default]
    Unverified,
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerificationStatus::Verified => write!(f, "verified"),
            VerificationStatus::Unverified => write!(f, "unverified"),
        }
    }
}

/// Confidence result for one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceScore {
    /// Certainty in [0,1]; 0.5 is the neutral baseline.
    pub score: f64,
    /// Verification status from the claim verifier, when available.
    pub verification: VerificationStatus,
    /// Corroborating source identifiers.
    pub sources: Vec<String>,
}

impl ConfidenceScore {
    /// Heuristic-only score with no verification data.
    pub fn unverified(score: f64) -> Self {
        Self {
            score: score.clamp(0.0, 1.0),
            verification: VerificationStatus::Unverified,
            sources: Vec::new(),
        }
    }
}

/// Lexical confidence tagger.
#[derive(Debug, Clone, Default)]
pub struct ConfidenceTagger;

impl ConfidenceTagger {
    pub fn new() -> Self {
        Self
    }

    /// Raw lexical score: 0.5 baseline, -0.1 per hedging marker, +0.1 per
    /// assertive marker, clamped to [0,1].
    pub fn tag(&self, text: &str) -> f64 {
        let lowered = text.to_lowercase();
        let mut score: f64 = 0.5;
        for marker in HEDGING_MARKERS {
            if lowered.contains(marker) {
                score -= 0.1;
            }
        }
        for marker in ASSERTIVE_MARKERS {
            if lowered.contains(marker) {
                score += 0.1;
            }
        }
        score.clamp(0.0, 1.0)
    }

    /// Full confidence score. Corroborating sources add a diminishing boost
    /// of `min(0.2, 0.05 * source_count)`; a missing verification outcome
    /// falls back to the lexical score alone.
    pub fn score(&self, text: &str, verification: Option<&VerificationOutcome>) -> ConfidenceScore {
        let mut score = self.tag(text);

        match verification {
            Some(outcome) => {
                let boost = (0.05 * outcome.sources.len() as f64).min(0.2);
                score = (score + boost).clamp(0.0, 1.0);
                ConfidenceScore {
                    score,
                    verification: if outcome.verified == Some(true) {
                        VerificationStatus::Verified
                    } else {
                        VerificationStatus::Unverified
                    },
                    sources: outcome.sources.clone(),
                }
            }
            None => ConfidenceScore::unverified(score),
        }
    }

    /// Strip confidence markers from text, for content comparison that
    /// ignores certainty phrasing.
    pub fn strip_markers(&self, text: &str) -> String {
        let mut stripped = text.to_lowercase();
        for marker in ASSERTIVE_MARKERS.iter().chain(HEDGING_MARKERS.iter()) {
            stripped = stripped.replace(marker, " ");
        }
        stripped.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neutral_baseline() {
        let tagger = ConfidenceTagger::new();
        assert_eq!(tagger.tag("The sky is blue today."), 0.5);
    }

    #[test]
    fn test_hedging_lowers_score() {
        let tagger = ConfidenceTagger::new();
        assert!((tagger.tag("Maybe it will rain.") - 0.4).abs() < 1e-9);
        assert!((tagger.tag("Maybe, possibly, it is unclear.") - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_assertive_raises_score() {
        let tagger = ConfidenceTagger::new();
        assert!((tagger.tag("It is definitely true.") - 0.6).abs() < 1e-9);
        assert!((tagger.tag("Clearly proven, confirmed without doubt.") - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_score_clamped_to_unit_interval() {
        let tagger = ConfidenceTagger::new();
        let score =
            tagger.tag("maybe possibly some say unclear allegedly maybe possibly unclear");
        assert!(score >= 0.0);
        let score = tagger.tag("definitely clearly proven confirmed without doubt definitely");
        assert!(score <= 1.0);
    }

    #[test]
    fn test_source_boost_diminishing_return() {
        let tagger = ConfidenceTagger::new();
        let outcome = VerificationOutcome {
            verified: Some(true),
            sources: vec!["a".into(), "b".into()],
        };
        let scored = tagger.score("The sky is blue.", Some(&outcome));
        assert!((scored.score - 0.6).abs() < 1e-9);
        assert_eq!(scored.verification, VerificationStatus::Verified);

        // Six sources cap at +0.2, not +0.3.
        let outcome = VerificationOutcome {
            verified: Some(true),
            sources: (0..6).map(|i| format!("s{}", i)).collect(),
        };
        let scored = tagger.score("The sky is blue.", Some(&outcome));
        assert!((scored.score - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_failed_verification_is_unverified() {
        let tagger = ConfidenceTagger::new();
        let outcome = VerificationOutcome {
            verified: Some(false),
            sources: vec![],
        };
        let scored = tagger.score("They implanted a chip.", Some(&outcome));
        assert_eq!(scored.verification, VerificationStatus::Unverified);
    }

    #[test]
    fn test_missing_verification_falls_back_to_heuristic() {
        let tagger = ConfidenceTagger::new();
        let scored = tagger.score("It is definitely true.", None);
        assert!((scored.score - 0.6).abs() < 1e-9);
        assert_eq!(scored.verification, VerificationStatus::Unverified);
        assert!(scored.sources.is_empty());
    }

    #[test]
    fn test_strip_markers_removes_certainty_phrasing() {
        let tagger = ConfidenceTagger::new();
        let a = tagger.strip_markers("Maybe the moon base is real");
        let b = tagger.strip_markers("Definitely the moon base is real");
        let c = tagger.strip_markers("Without doubt the moon base is real");
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(a, "the moon base is real");
    }
}
