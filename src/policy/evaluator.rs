//! Composite severity evaluation.
//!
//! Fuses the six detector outputs into one escalation tier. Fusion is
//! max-based: the strongest single signal sets the tier, so detectors never
//! dilute each other. One conjunction overrides the max: a high-severity
//! reinforcement loop inside an indulgent frame that the agent is mirroring
//! grades critical.

use serde::{Deserialize, Serialize};

use crate::conversation::EscalationTier;
use crate::detectors::{EscalationType, RealityMode, Severity, SignalSnapshot};

/// One signal's contribution to the fused tier, kept for the audit
/// rationale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalContribution {
    /// Which detector contributed.
    pub signal: String,
    /// Human-readable reading of the signal.
    pub detail: String,
    /// Tier this signal argues for on its own.
    pub tier: EscalationTier,
}

impl SignalContribution {
    fn new(signal: &str, detail: String, tier: EscalationTier) -> Self {
        Self {
            signal: signal.to_string(),
            detail,
            tier,
        }
    }
}

/// Fused assessment for one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeAssessment {
    /// The fused tier.
    pub tier: EscalationTier,
    /// Every non-trivial signal contribution, strongest first.
    pub contributions: Vec<SignalContribution>,
    /// Whether the critical conjunction fired.
    pub critical_conjunction: bool,
}

/// Max-fusion severity evaluator.
#[derive(Debug, Clone, Default)]
pub struct CompositeSeverityEvaluator;

impl CompositeSeverityEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Fuse one complete snapshot.
    pub fn evaluate(&self, snapshot: &SignalSnapshot) -> CompositeAssessment {
        let mut contributions = Vec::new();

        match snapshot.escalation.escalation_type {
            EscalationType::Spike => contributions.push(SignalContribution::new(
                "emotion",
                format!(
                    "affective spike, intensity delta {:.2}",
                    snapshot.escalation.delta_intensity
                ),
                EscalationTier::Moderate,
            )),
            EscalationType::Gradual => contributions.push(SignalContribution::new(
                "emotion",
                format!(
                    "gradual escalation over {} turns",
                    snapshot.escalation.period.turns
                ),
                EscalationTier::Low,
            )),
            EscalationType::None => {}
        }

        match snapshot.reality.mode {
            RealityMode::Indulgent => contributions.push(SignalContribution::new(
                "reality",
                "unverifiable narrative asserted as literal".to_string(),
                EscalationTier::High,
            )),
            RealityMode::Fantasy | RealityMode::Fictional | RealityMode::Roleplay => {
                contributions.push(SignalContribution::new(
                    "reality",
                    format!("non-grounded frame: {}", snapshot.reality.mode),
                    EscalationTier::Low,
                ))
            }
            _ => {}
        }

        match snapshot.drift.severity {
            Severity::High => contributions.push(SignalContribution::new(
                "drift",
                format!(
                    "drift {:.2} with {} topic shifts",
                    snapshot.drift.drift_score, snapshot.drift.topic_shifts
                ),
                EscalationTier::Moderate,
            )),
            Severity::Moderate => contributions.push(SignalContribution::new(
                "drift",
                format!("drift {:.2}", snapshot.drift.drift_score),
                EscalationTier::Low,
            )),
            Severity::Low => {}
        }

        match snapshot.reinforcement.severity {
            Severity::High => contributions.push(SignalContribution::new(
                "reinforcement",
                format!(
                    "reinforcement loop with failed fact-checks, index {:.2}",
                    snapshot.reinforcement.index
                ),
                EscalationTier::High,
            )),
            Severity::Moderate => contributions.push(SignalContribution::new(
                "reinforcement",
                format!("reinforcement index {:.2}", snapshot.reinforcement.index),
                EscalationTier::Moderate,
            )),
            Severity::Low if snapshot.reinforcement.loop_detected => {
                contributions.push(SignalContribution::new(
                    "reinforcement",
                    format!(
                        "loop threshold crossed, index {:.2}",
                        snapshot.reinforcement.index
                    ),
                    EscalationTier::Low,
                ))
            }
            Severity::Low => {}
        }

        let mut mirrored = false;
        if let Some(mirroring) = &snapshot.mirroring {
            mirrored = mirroring.mirrored;
            if mirroring.epistemic_mismatch {
                contributions.push(SignalContribution::new(
                    "mirroring",
                    "agent asserted a claim the verifier rejected".to_string(),
                    EscalationTier::High,
                ));
            } else if mirroring.mirrored {
                contributions.push(SignalContribution::new(
                    "mirroring",
                    format!(
                        "agent mirrored the user at similarity {:.2}",
                        mirroring.similarity
                    ),
                    EscalationTier::Moderate,
                ));
            }
        }

        let critical_conjunction = snapshot.reinforcement.severity == Severity::High
            && snapshot.reality.mode == RealityMode::Indulgent
            && mirrored;

        let tier = if critical_conjunction {
            EscalationTier::Critical
        } else {
            contributions
                .iter()
                .map(|c| c.tier)
                .max()
                .unwrap_or(EscalationTier::None)
        };

        contributions.sort_by(|a, b| b.tier.cmp(&a.tier));

        CompositeAssessment {
            tier,
            contributions,
            critical_conjunction,
        }
    }
}
