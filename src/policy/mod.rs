//! Escalation policy.
//!
//! The policy state machine consumes the composite assessment for a turn and
//! moves the conversation through monitoring, soft mitigation, pause,
//! referral and external escalation. Transitions chain forward within a
//! single turn, but only the final state's action executes. Tier changes are
//! monotone upward; the only way down is the calm-streak de-escalation rule.

mod evaluator;
mod mitigation;
mod scope;

pub use evaluator::*;
pub use mitigation::*;
pub use scope::*;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ThresholdConfig;
use crate::conversation::{ConversationState, EmotionProfile, EscalationTier};
use crate::detectors::SignalSnapshot;
use crate::error::PipelineResult;

// ============================================================================
// States, actions, flags
// ============================================================================

/// Policy state machine position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyState {
    /// Passive observation.
    #[default]
    Monitoring,
    /// Grounding language injected into responses.
    SoftMitigation,
    /// Generation halted pending a safety notice.
    Paused,
    /// Handed to the crisis module.
    Referred,
    /// Escalated to a human contact outside the platform.
    ExternalEscalated,
    /// Concern resolved after mitigation. Terminal.
    Contained,
}

impl PolicyState {
    /// No transitions leave a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PolicyState::Contained | PolicyState::ExternalEscalated)
    }
}

impl std::fmt::Display for PolicyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyState::Monitoring => write!(f, "monitoring"),
            PolicyState::SoftMitigation => write!(f, "soft_mitigation"),
            PolicyState::Paused => write!(f, "paused"),
            PolicyState::Referred => write!(f, "referred"),
            PolicyState::ExternalEscalated => write!(f, "external_escalated"),
            PolicyState::Contained => write!(f, "contained"),
        }
    }
}

/// Urgency for channel routing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    #[default]
    Normal,
    Moderate,
    High,
}

impl std::fmt::Display for Urgency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Urgency::Normal => write!(f, "normal"),
            Urgency::Moderate => write!(f, "moderate"),
            Urgency::High => write!(f, "high"),
        }
    }
}

/// Content conditions that can force a pause on their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentFlag {
    /// A confident claim the verifier rejected or could not check.
    UnverifiableClaim,
    /// Active distress above the referral intensity.
    EmotionalDistress,
    /// The user treats the agent or its narrative as a real entity.
    SyntheticIdentityConfusion,
    /// The turn contains language suggesting harm.
    HarmfulSuggestion,
}

impl std::fmt::Display for ContentFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentFlag::UnverifiableClaim => write!(f, "unverifiable_claim"),
            ContentFlag::EmotionalDistress => write!(f, "emotional_distress"),
            ContentFlag::SyntheticIdentityConfusion => {
                write!(f, "synthetic_identity_confusion")
            }
            ContentFlag::HarmfulSuggestion => write!(f, "harmful_suggestion"),
        }
    }
}

/// The single action executed for a turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Record and continue.
    #[default]
    Observe,
    /// Inject grounding language.
    SoftMitigation,
    /// Halt generation and show a safety notice.
    Pause,
    /// Hand off to the crisis module.
    Referral,
    /// Notify a human escalation contact.
    ExternalEscalation,
    /// Close out a resolved concern.
    Containment,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Observe => write!(f, "observe"),
            Action::SoftMitigation => write!(f, "soft_mitigation"),
            Action::Pause => write!(f, "pause"),
            Action::Referral => write!(f, "referral"),
            Action::ExternalEscalation => write!(f, "external_escalation"),
            Action::Containment => write!(f, "containment"),
        }
    }
}

impl std::str::FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "observe" => Ok(Action::Observe),
            "soft_mitigation" => Ok(Action::SoftMitigation),
            "pause" => Ok(Action::Pause),
            "referral" => Ok(Action::Referral),
            "external_escalation" => Ok(Action::ExternalEscalation),
            "containment" => Ok(Action::Containment),
            _ => Err(format!("Unknown action: {}", s)),
        }
    }
}

const HARMFUL_TRIGGERS: &[&str] = &[
    "hurt yourself",
    "hurt them",
    "stop taking your medication",
    "end it all",
    "they deserve to suffer",
];

/// Detect content flags for the current user turn.
pub fn content_flags(
    user_text: &str,
    snapshot: &SignalSnapshot,
    profile: &EmotionProfile,
    referral_intensity: f64,
) -> Vec<ContentFlag> {
    let mut flags = Vec::new();
    let lowered = user_text.to_lowercase();

    if HARMFUL_TRIGGERS.iter().any(|t| lowered.contains(t)) {
        flags.push(ContentFlag::HarmfulSuggestion);
    }
    if snapshot.reality.mode == crate::detectors::RealityMode::Indulgent {
        flags.push(ContentFlag::UnverifiableClaim);
    }
    if profile.has_active_distress() && profile.intensity >= referral_intensity {
        flags.push(ContentFlag::EmotionalDistress);
    }
    if snapshot
        .mirroring
        .as_ref()
        .map(|m| m.epistemic_mismatch)
        .unwrap_or(false)
    {
        flags.push(ContentFlag::SyntheticIdentityConfusion);
    }
    flags
}

// ============================================================================
// Policy decision
// ============================================================================

/// What the policy decided for one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDecision {
    /// State after all chained transitions.
    pub state: PolicyState,
    /// The one action to execute.
    pub action: Action,
    /// Tier after this turn.
    pub tier: EscalationTier,
    /// Routing urgency.
    pub urgency: Urgency,
    /// Per-signal rationale from the composite evaluator.
    pub rationale: Vec<SignalContribution>,
    /// Content flags detected this turn.
    pub content_flags: Vec<ContentFlag>,
    /// Confidence overlay to attach to the agent's reply, if any.
    pub overlay: Option<String>,
    /// User-facing mitigation or pause text for the action, if any.
    pub message: Option<String>,
}

/// The escalation policy state machine.
#[derive(Debug, Clone)]
pub struct EscalationPolicy {
    referral_intensity: f64,
    calm_turns_to_deescalate: u32,
}

impl EscalationPolicy {
    pub fn new(thresholds: &ThresholdConfig) -> Self {
        Self {
            referral_intensity: thresholds.referral_intensity,
            calm_turns_to_deescalate: thresholds.calm_turns_to_deescalate,
        }
    }

    /// Apply one turn's assessment to the conversation.
    ///
    /// Raises the tier to the assessed level (never lowers it), advances the
    /// calm streak, chains state transitions forward, and returns the single
    /// action for the final state. Terminal states absorb every input.
    pub fn apply(
        &self,
        conversation: &mut ConversationState,
        assessment: &CompositeAssessment,
        snapshot: &SignalSnapshot,
        profile: &EmotionProfile,
        user_text: &str,
    ) -> PipelineResult<PolicyDecision> {
        let entered = conversation.policy_state();
        let entered_tier = conversation.tier();
        let target_tier = assessment.tier.max(entered_tier);
        conversation.raise_tier(target_tier)?;

        let flags = content_flags(user_text, snapshot, profile, self.referral_intensity);
        let distress = flags.contains(&ContentFlag::EmotionalDistress);
        let urgency = route_urgency(conversation.tier(), distress);

        // Calm-streak damping. Loops and mirrored validation block the streak
        // even when the fused tier is low.
        let mirrored = snapshot
            .mirroring
            .as_ref()
            .map(|m| m.mirrored)
            .unwrap_or(false);
        let calm = assessment.tier <= EscalationTier::Low
            && target_tier <= entered_tier
            && !snapshot.reinforcement.loop_detected
            && !mirrored
            && flags.is_empty();

        let mut deescalated = false;
        if calm {
            let streak = conversation.note_calm(true);
            if streak >= self.calm_turns_to_deescalate {
                conversation.step_down_tier();
                conversation.reset_calm_streak();
                deescalated = true;
                debug!(
                    conversation_id = %conversation.id,
                    tier = %conversation.tier(),
                    "Calm streak de-escalated one tier"
                );
            }
        } else {
            conversation.note_calm(false);
        }

        let pause_forcing = flags
            .iter()
            .any(|f| matches!(f, ContentFlag::HarmfulSuggestion | ContentFlag::SyntheticIdentityConfusion));

        let mut state = entered;
        if entered.is_terminal() {
            // Absorbing; record only.
        } else if deescalated && entered == PolicyState::SoftMitigation {
            state = PolicyState::Contained;
        } else {
            let tier = conversation.tier();
            if state == PolicyState::Monitoring && tier >= EscalationTier::Low {
                state = PolicyState::SoftMitigation;
            }
            if state == PolicyState::SoftMitigation
                && (tier >= EscalationTier::High || pause_forcing)
            {
                state = PolicyState::Paused;
            }
            if state == PolicyState::Paused {
                let eligible = (entered == PolicyState::Paused && tier >= EscalationTier::High)
                    || (tier >= EscalationTier::High && distress);
                if eligible {
                    state = PolicyState::Referred;
                }
            }
            if state == PolicyState::Referred
                && (tier == EscalationTier::Critical || urgency == Urgency::High)
            {
                state = PolicyState::ExternalEscalated;
            }
        }
        conversation.set_policy_state(state);

        let action = if state != entered {
            match state {
                PolicyState::Monitoring => Action::Observe,
                PolicyState::SoftMitigation => Action::SoftMitigation,
                PolicyState::Paused => Action::Pause,
                PolicyState::Referred => Action::Referral,
                PolicyState::ExternalEscalated => Action::ExternalEscalation,
                PolicyState::Contained => Action::Containment,
            }
        } else {
            Action::Observe
        };

        if action != Action::Observe {
            info!(
                conversation_id = %conversation.id,
                from = %entered,
                to = %state,
                tier = %conversation.tier(),
                action = %action,
                "Policy transition"
            );
        }

        let message = match action {
            Action::SoftMitigation => Some(mitigation_message(
                &snapshot.escalation.editorial_tone,
                snapshot.reality.mode,
            )),
            Action::Pause => Some(pause_notice()),
            Action::Referral | Action::ExternalEscalation => Some(referral_summary(
                &conversation.id,
                conversation.tier(),
                &assessment.contributions,
            )),
            _ => None,
        };

        Ok(PolicyDecision {
            state,
            action,
            tier: conversation.tier(),
            urgency,
            rationale: assessment.contributions.clone(),
            content_flags: flags,
            overlay: confidence_overlay(snapshot.confidence.score).map(|s| s.to_string()),
            message,
        })
    }
}

/// Urgency for channel routing: critical is always high, high tier with
/// distress is high, otherwise one level below the tier.
pub fn route_urgency(tier: EscalationTier, distress: bool) -> Urgency {
    match tier {
        EscalationTier::Critical => Urgency::High,
        EscalationTier::High if distress => Urgency::High,
        EscalationTier::High | EscalationTier::Moderate => Urgency::Moderate,
        _ => Urgency::Normal,
    }
}
