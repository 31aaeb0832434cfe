//! Mitigation text and confidence overlays.
//!
//! All user-facing strings the policy can attach to a turn live here. The
//! wording stays non-clinical: these are framing adjustments, not diagnoses.

use crate::conversation::EscalationTier;
use crate::detectors::RealityMode;
use crate::policy::SignalContribution;

/// Confidence overlay band for the agent's reply. `None` above 0.9: the
/// claim is confident enough to stand on its own.
pub fn confidence_overlay(score: f64) -> Option<&'static str> {
    if score >= 0.9 {
        None
    } else if score >= 0.7 {
        Some("This is generally supported, though some details may vary.")
    } else if score >= 0.5 {
        Some("This is uncertain; treat it as one possibility among several.")
    } else {
        Some("This claim could not be verified. Consider checking a trusted source.")
    }
}

/// Grounding language injected during soft mitigation, shaped by the
/// detected tone and frame.
pub fn mitigation_message(tone: &str, mode: RealityMode) -> String {
    let opener = match tone {
        "hostile" => "It sounds like this is really frustrating.",
        "fearful" => "It sounds like this feels frightening right now.",
        "mournful" => "It sounds like this is weighing on you.",
        _ => "Let's take a moment with this.",
    };

    let grounding = match mode {
        RealityMode::Indulgent => {
            "I can't confirm that account, and I don't want to build on it as if it were settled. \
             What we can do is look at what's verifiable."
        }
        RealityMode::Fantasy | RealityMode::Fictional | RealityMode::Roleplay => {
            "Happy to stay in this frame as fiction. If any part of it starts to feel real, \
             let's step out and talk about it directly."
        }
        _ => "Let's separate what's confirmed from what's still open before going further.",
    };

    format!("{} {}", opener, grounding)
}

/// Notice shown while the conversation is paused.
pub fn pause_notice() -> String {
    "This conversation is paused while a safety review runs. \
     Nothing you wrote is lost, and a person can pick this up with you if needed."
        .to_string()
}

/// Short summary routed with a referral or external escalation. References
/// the transcript by conversation id; never inlines turn content.
pub fn referral_summary(
    conversation_id: &str,
    tier: EscalationTier,
    contributions: &[SignalContribution],
) -> String {
    let signals = if contributions.is_empty() {
        "no individual signal above threshold".to_string()
    } else {
        contributions
            .iter()
            .map(|c| format!("{}: {}", c.signal, c.detail))
            .collect::<Vec<_>>()
            .join("; ")
    };
    format!(
        "Conversation {} escalated at tier {}. Signals: {}. \
         Automated signal summary; not a clinical assessment.",
        conversation_id, tier, signals
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlay_bands() {
        assert!(confidence_overlay(0.95).is_none());
        assert!(confidence_overlay(0.9).is_none());
        assert!(confidence_overlay(0.8).unwrap().contains("generally supported"));
        assert!(confidence_overlay(0.6).unwrap().contains("uncertain"));
        assert!(confidence_overlay(0.3).unwrap().contains("could not be verified"));
    }

    #[test]
    fn test_mitigation_message_shapes_by_tone_and_mode() {
        let msg = mitigation_message("hostile", RealityMode::Indulgent);
        assert!(msg.contains("frustrating"));
        assert!(msg.contains("can't confirm"));

        let msg = mitigation_message("neutral", RealityMode::Fantasy);
        assert!(msg.contains("fiction"));
    }

    #[test]
    fn test_referral_summary_includes_disclaimer_and_signals() {
        let contributions = vec![SignalContribution {
            signal: "reinforcement".to_string(),
            detail: "index 2.40".to_string(),
            tier: EscalationTier::High,
        }];
        let summary = referral_summary("conv-7", EscalationTier::High, &contributions);
        assert!(summary.contains("conv-7"));
        assert!(summary.contains("tier high"));
        assert!(summary.contains("reinforcement: index 2.40"));
        assert!(summary.contains("not a clinical assessment"));
    }
}
