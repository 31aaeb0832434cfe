//! Conversation state and the core data model.
//!
//! This module owns the per-conversation record: the append-only turn
//! history, the rolling emotion history, the current memory scope and the
//! current escalation tier. The escalation policy and the memory scope
//! controller are its sole mutators; everything else gets read-only views.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};
use crate::policy::PolicyState;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    /// The human participant.
    User,
    /// The synthetic agent.
    Agent,
}

impl std::fmt::Display for Speaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Speaker::User => write!(f, "user"),
            Speaker::Agent => write!(f, "agent"),
        }
    }
}

impl std::str::FromStr for Speaker {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Speaker::User),
            "agent" => Ok(Speaker::Agent),
            _ => Err(format!("Unknown speaker: {}", s)),
        }
    }
}

/// One utterance in the dialogue. Immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Who spoke.
    pub speaker: Speaker,
    /// Raw utterance text.
    pub text: String,
    /// When the turn was recorded.
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    /// Create a turn stamped with the current time.
    pub fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a user turn.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Speaker::User, text)
    }

    /// Create an agent turn.
    pub fn agent(text: impl Into<String>) -> Self {
        Self::new(Speaker::Agent, text)
    }
}

/// The fixed eight-label emotion set (Plutchik wheel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionLabel {
    Joy,
    Trust,
    Fear,
    Surprise,
    Sadness,
    Disgust,
    Anger,
    Anticipation,
}

impl EmotionLabel {
    /// All labels in wheel order. Index positions match
    /// [`EmotionProfile::weights`].
    pub const ALL: [EmotionLabel; 8] = [
        EmotionLabel::Joy,
        EmotionLabel::Trust,
        EmotionLabel::Fear,
        EmotionLabel::Surprise,
        EmotionLabel::Sadness,
        EmotionLabel::Disgust,
        EmotionLabel::Anger,
        EmotionLabel::Anticipation,
    ];

    /// Labels treated as distress for referral gating.
    pub const DISTRESS: [EmotionLabel; 3] =
        [EmotionLabel::Sadness, EmotionLabel::Fear, EmotionLabel::Anger];

    /// Index into the weight vector.
    pub fn index(&self) -> usize {
        Self::ALL.iter().position(|l| l == self).unwrap_or(0)
    }
}

impl std::fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EmotionLabel::Joy => "joy",
            EmotionLabel::Trust => "trust",
            EmotionLabel::Fear => "fear",
            EmotionLabel::Surprise => "surprise",
            EmotionLabel::Sadness => "sadness",
            EmotionLabel::Disgust => "disgust",
            EmotionLabel::Anger => "anger",
            EmotionLabel::Anticipation => "anticipation",
        };
        write!(f, "{}", s)
    }
}

/// Per-turn affective profile. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionProfile {
    /// Presence weight per label in [0,1], indexed by [`EmotionLabel::ALL`].
    pub weights: [f64; 8],
    /// Overall affective intensity in [0,1].
    pub intensity: f64,
    /// Valence in [-1,1]; negative is unpleasant affect.
    pub valence: f64,
}

impl EmotionProfile {
    /// A flat, neutral profile.
    pub fn neutral() -> Self {
        Self {
            weights: [0.0; 8],
            intensity: 0.0,
            valence: 0.0,
        }
    }

    /// Weight for a single label.
    pub fn weight(&self, label: EmotionLabel) -> f64 {
        self.weights[label.index()]
    }

    /// Labels with non-zero presence.
    pub fn active_labels(&self) -> Vec<EmotionLabel> {
        EmotionLabel::ALL
            .iter()
            .copied()
            .filter(|l| self.weights[l.index()] > 0.0)
            .collect()
    }

    /// Sum of absolute per-label differences against another profile.
    pub fn vector_shift(&self, other: &EmotionProfile) -> f64 {
        self.weights
            .iter()
            .zip(other.weights.iter())
            .map(|(a, b)| (a - b).abs())
            .sum()
    }

    /// Count of labels active here but not in the previous profile.
    pub fn newly_active(&self, previous: &EmotionProfile) -> usize {
        EmotionLabel::ALL
            .iter()
            .filter(|l| self.weights[l.index()] > 0.0 && previous.weights[l.index()] == 0.0)
            .count()
    }

    /// Whether any distress label (sadness, fear, anger) is active.
    pub fn has_active_distress(&self) -> bool {
        EmotionLabel::DISTRESS
            .iter()
            .any(|l| self.weights[l.index()] > 0.0)
    }
}

/// Visibility of conversation history to downstream response generation.
///
/// Ordering is by narrowness: `Default < Limited < Restricted`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryScope {
    /// Full history visible.
    #[default]
    Default,
    /// Reduced context; sensitive spans withheld.
    Limited,
    /// New turns recorded for audit only, invisible to generation.
    Restricted,
}

impl std::fmt::Display for MemoryScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemoryScope::Default => write!(f, "default"),
            MemoryScope::Limited => write!(f, "limited"),
            MemoryScope::Restricted => write!(f, "restricted"),
        }
    }
}

impl std::str::FromStr for MemoryScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "default" => Ok(MemoryScope::Default),
            "limited" => Ok(MemoryScope::Limited),
            "restricted" => Ok(MemoryScope::Restricted),
            _ => Err(format!("Unknown memory scope: {}", s)),
        }
    }
}

/// The pipeline's assessed severity level driving intervention.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationTier {
    /// No concerning signal.
    #[default]
    None,
    /// Weak signal; watch.
    Low,
    /// Clear signal; mitigate.
    Moderate,
    /// Strong signal; interrupt.
    High,
    /// Delusion-reinforcement conjunction; hand off.
    Critical,
}

impl EscalationTier {
    /// One tier lower, saturating at `None`.
    pub fn step_down(&self) -> EscalationTier {
        match self {
            EscalationTier::None | EscalationTier::Low => EscalationTier::None,
            EscalationTier::Moderate => EscalationTier::Low,
            EscalationTier::High => EscalationTier::Moderate,
            EscalationTier::Critical => EscalationTier::High,
        }
    }
}

impl std::fmt::Display for EscalationTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EscalationTier::None => write!(f, "none"),
            EscalationTier::Low => write!(f, "low"),
            EscalationTier::Moderate => write!(f, "moderate"),
            EscalationTier::High => write!(f, "high"),
            EscalationTier::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for EscalationTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(EscalationTier::None),
            "low" => Ok(EscalationTier::Low),
            "moderate" => Ok(EscalationTier::Moderate),
            "high" => Ok(EscalationTier::High),
            "critical" => Ok(EscalationTier::Critical),
            _ => Err(format!("Unknown escalation tier: {}", s)),
        }
    }
}

/// A turn plus the bookkeeping the conversation attaches at append time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedTurn {
    /// The immutable turn.
    pub turn: Turn,
    /// Appended while scope was restricted; kept for audit, hidden from the
    /// downstream context window.
    pub audit_only: bool,
}

/// Per-conversation state. One instance per active conversation, owned
/// exclusively by that conversation's processing context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    /// Conversation identifier.
    pub id: String,
    turns: Vec<RecordedTurn>,
    emotion_history: Vec<EmotionProfile>,
    scope: MemoryScope,
    tier: EscalationTier,
    policy_state: PolicyState,
    calm_streak: u32,
    verification_history: Vec<Option<bool>>,
}

impl ConversationState {
    /// Create a fresh conversation in monitoring state.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            turns: Vec::new(),
            emotion_history: Vec::new(),
            scope: MemoryScope::Default,
            tier: EscalationTier::None,
            policy_state: PolicyState::Monitoring,
            calm_streak: 0,
            verification_history: Vec::new(),
        }
    }

    /// Append a turn. Turns appended under restricted scope are flagged
    /// audit-only.
    pub(crate) fn append_turn(&mut self, turn: Turn) {
        let audit_only = self.scope == MemoryScope::Restricted;
        self.turns.push(RecordedTurn { turn, audit_only });
    }

    /// Record the emotion profile computed for the latest turn.
    pub(crate) fn record_emotion(&mut self, profile: EmotionProfile) {
        self.emotion_history.push(profile);
    }

    /// Full ordered history, audit-only turns included.
    pub fn history(&self) -> &[RecordedTurn] {
        &self.turns
    }

    /// Turns visible to downstream response generation. Audit-only turns are
    /// excluded; under limited scope only the most recent turns are exposed,
    /// and under restricted scope nothing is exposed at all.
    pub fn context_window(&self, limit: usize) -> Vec<&Turn> {
        match self.scope {
            MemoryScope::Restricted => Vec::new(),
            MemoryScope::Default => self
                .turns
                .iter()
                .filter(|r| !r.audit_only)
                .map(|r| &r.turn)
                .collect(),
            MemoryScope::Limited => {
                let visible: Vec<&Turn> = self
                    .turns
                    .iter()
                    .filter(|r| !r.audit_only)
                    .map(|r| &r.turn)
                    .collect();
                let start = visible.len().saturating_sub(limit);
                visible[start..].to_vec()
            }
        }
    }

    /// Record the fact-check verdict for the latest user turn. `None` means
    /// the verifier was unavailable or undecided.
    pub(crate) fn record_verification(&mut self, verified: Option<bool>) {
        self.verification_history.push(verified);
    }

    /// The most recent fact-check verdict, if any was recorded.
    pub fn last_verification(&self) -> Option<Option<bool>> {
        self.verification_history.last().copied()
    }

    /// Count of failed fact-checks among the last `n` recorded verdicts.
    pub fn failed_verifications(&self, n: usize) -> usize {
        let start = self.verification_history.len().saturating_sub(n);
        self.verification_history[start..]
            .iter()
            .filter(|v| **v == Some(false))
            .count()
    }

    /// Rolling emotion history, oldest first.
    pub fn emotion_history(&self) -> &[EmotionProfile] {
        &self.emotion_history
    }

    /// Current memory scope.
    pub fn scope(&self) -> MemoryScope {
        self.scope
    }

    /// Current escalation tier.
    pub fn tier(&self) -> EscalationTier {
        self.tier
    }

    /// Current policy state.
    pub fn policy_state(&self) -> PolicyState {
        self.policy_state
    }

    /// Consecutive calm turns observed so far.
    pub fn calm_streak(&self) -> u32 {
        self.calm_streak
    }

    /// Raise the tier. Lowering is only legal through
    /// [`ConversationState::step_down_tier`].
    pub(crate) fn raise_tier(&mut self, tier: EscalationTier) -> PipelineResult<()> {
        if tier < self.tier {
            return Err(PipelineError::PolicyViolation {
                message: format!(
                    "tier may not decrease from {} to {} outside de-escalation",
                    self.tier, tier
                ),
            });
        }
        self.tier = tier;
        Ok(())
    }

    /// Drop exactly one tier level (the de-escalation rule).
    pub(crate) fn step_down_tier(&mut self) {
        self.tier = self.tier.step_down();
    }

    /// Narrow the memory scope. Widening requires an explicit reset.
    pub(crate) fn narrow_scope(&mut self, scope: MemoryScope) -> PipelineResult<()> {
        if scope < self.scope {
            return Err(PipelineError::PolicyViolation {
                message: format!(
                    "scope may not widen from {} to {} without explicit reset",
                    self.scope, scope
                ),
            });
        }
        self.scope = scope;
        Ok(())
    }

    /// Explicit scope reset back to default.
    pub(crate) fn reset_scope(&mut self) {
        self.scope = MemoryScope::Default;
    }

    /// Move the policy state machine.
    pub(crate) fn set_policy_state(&mut self, state: PolicyState) {
        self.policy_state = state;
    }

    /// Advance or clear the calm-turn streak.
    pub(crate) fn note_calm(&mut self, calm: bool) -> u32 {
        if calm {
            self.calm_streak += 1;
        } else {
            self.calm_streak = 0;
        }
        self.calm_streak
    }

    /// Clear the streak after a de-escalation fires so damping restarts.
    pub(crate) fn reset_calm_streak(&mut self) {
        self.calm_streak = 0;
    }

    /// Texts of the most recent `n` turns, oldest first.
    pub fn recent_texts(&self, n: usize) -> Vec<&str> {
        let start = self.turns.len().saturating_sub(n);
        self.turns[start..].iter().map(|r| r.turn.text.as_str()).collect()
    }

    /// The most recent user turn followed immediately by an agent turn, if
    /// the history ends in such a pair.
    pub fn last_exchange(&self) -> Option<(&Turn, &Turn)> {
        let len = self.turns.len();
        if len < 2 {
            return None;
        }
        let (a, b) = (&self.turns[len - 2].turn, &self.turns[len - 1].turn);
        if a.speaker == Speaker::User && b.speaker == Speaker::Agent {
            Some((a, b))
        } else {
            None
        }
    }
}
