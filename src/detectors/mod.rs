//! Signal detector implementations.
//!
//! Six independent analyzers, each a pure function of the visible turn
//! window:
//! - [`ConfidenceTagger`]: hedging vs. assertive lexical certainty
//! - [`EmotionAnalyzer`] + [`EscalationDetector`]: affective spikes and
//!   gradual escalation
//! - [`RealityModeClassifier`]: grounded / speculative / fictional /
//!   indulgent context
//! - [`DriftTracker`]: semantic dissimilarity across the window
//! - [`ReinforcementDetector`]: belief-reinforcement loops with rising
//!   certainty
//! - [`MirroringDetector`]: agent responses that validate user assertions
//!
//! None of the detectors mutate shared state, so they can run against the
//! same window concurrently. Any external dependency that is unavailable
//! drops the detector to its heuristic-only path; a detector never aborts
//! the pipeline.

mod confidence;
mod drift;
mod emotion;
mod mirroring;
mod reality;
mod reinforcement;

pub use confidence::*;
pub use drift::*;
pub use emotion::*;
pub use mirroring::*;
pub use reality::*;
pub use reinforcement::*;

use serde::{Deserialize, Serialize};

/// Per-detector severity grading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Nothing noteworthy.
    #[default]
    Low,
    /// Signal present, below intervention strength.
    Moderate,
    /// Signal strong enough to force escalation on its own.
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Moderate => write!(f, "moderate"),
            Severity::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "moderate" => Ok(Severity::Moderate),
            "high" => Ok(Severity::High),
            _ => Err(format!("Unknown severity: {}", s)),
        }
    }
}

/// The joined output of all six detectors for one turn.
///
/// The composite evaluator only runs once every field is populated (join
/// barrier; no partial fusion).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalSnapshot {
    /// Confidence of the current turn's text.
    pub confidence: ConfidenceScore,
    /// Spike / gradual escalation report.
    pub escalation: EscalationReport,
    /// Reality-mode classification.
    pub reality: RealityModeResult,
    /// Semantic drift over the window.
    pub drift: DriftReport,
    /// Reinforcement-loop analysis over the window.
    pub reinforcement: ReinforcementSignal,
    /// Mirroring comparison; absent when the history does not end in a
    /// user-then-agent exchange.
    pub mirroring: Option<MirroringResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Moderate);
        assert!(Severity::Moderate < Severity::High);
    }

    #[test]
    fn test_severity_display_round_trip() {
        for s in [Severity::Low, Severity::Moderate, Severity::High] {
            let parsed: Severity = s.to_string().parse().unwrap();
            assert_eq!(parsed, s);
        }
    }

    #[test]
    fn test_severity_from_str_invalid() {
        let result = "extreme".parse::<Severity>();
        assert!(result.is_err());
        assert_eq!(result.unwrap_err(), "Unknown severity: extreme");
    }
}
