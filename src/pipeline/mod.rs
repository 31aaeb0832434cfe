//! The per-turn safety pipeline.
//!
//! [`SafetyPipeline`] owns the conversation registry and runs the full
//! sequence for each turn: validate, prefetch verification, run the six
//! detectors, fuse severities, apply the escalation policy, narrow scope,
//! execute the decided action's side effect, and append the decision to the
//! audit log. Turns for the same conversation are serialized on a
//! per-conversation lock; different conversations proceed concurrently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::audit::{AuditStore, CorrectionRecord, EscalationDecision, HandoffStatus};
use crate::config::Config;
use crate::conversation::{ConversationState, EmotionProfile, Speaker, Turn};
use crate::detectors::{
    ConfidenceTagger, DriftTracker, EmotionAnalyzer, EscalationDetector, MirroringDetector,
    RealityModeClassifier, ReinforcementDetector, SignalSnapshot,
};
use crate::error::{PipelineError, PipelineResult, StorageResult};
use crate::policy::{
    Action, CompositeSeverityEvaluator, EscalationPolicy, MemoryScopeController, PolicyDecision,
    SignalContribution, Urgency,
};
use crate::providers::{
    ClaimVerifier, CrisisModule, Embedder, FileTranscriptStore, HandoffPayload, HashEmbedder,
    HumanNotifier, TranscriptStore, VerificationOutcome,
};

/// Longest turn accepted, in characters.
const MAX_TURN_CHARS: usize = 16_384;

/// Everything the pipeline produced for one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnOutcome {
    /// Audit record identifier for this turn's decision.
    pub decision_id: String,
    /// The policy decision.
    pub decision: PolicyDecision,
    /// The fused detector snapshot the decision was made from.
    pub snapshot: SignalSnapshot,
}

/// The turn-processing pipeline.
pub struct SafetyPipeline {
    config: Config,
    tagger: ConfidenceTagger,
    analyzer: EmotionAnalyzer,
    classifier: RealityModeClassifier,
    escalation: EscalationDetector,
    drift: DriftTracker,
    reinforcement: ReinforcementDetector,
    mirroring: MirroringDetector,
    evaluator: CompositeSeverityEvaluator,
    policy: EscalationPolicy,
    scope: MemoryScopeController,
    embedder: Arc<dyn Embedder>,
    verifier: Option<Arc<dyn ClaimVerifier>>,
    crisis: Option<Arc<dyn CrisisModule>>,
    notifier: Option<Arc<dyn HumanNotifier>>,
    transcripts: Arc<dyn TranscriptStore>,
    audit: Arc<dyn AuditStore>,
    conversations: Mutex<HashMap<String, Arc<Mutex<ConversationState>>>>,
}

impl SafetyPipeline {
    /// Create a pipeline with the default hash embedder and file transcript
    /// store. External collaborators are attached with the `with_*` methods.
    pub fn new(config: Config, audit: Arc<dyn AuditStore>) -> Self {
        let thresholds = config.thresholds.clone();
        let embedder: Arc<dyn Embedder> =
            Arc::new(HashEmbedder::new(config.providers.embedding_dims));
        let transcripts: Arc<dyn TranscriptStore> =
            Arc::new(FileTranscriptStore::new("./data/transcripts"));

        Self {
            tagger: ConfidenceTagger::new(),
            analyzer: EmotionAnalyzer::new(),
            classifier: RealityModeClassifier::new(),
            escalation: EscalationDetector::new(&thresholds),
            drift: DriftTracker::new(&thresholds),
            reinforcement: ReinforcementDetector::new(&thresholds),
            mirroring: MirroringDetector::new(&thresholds),
            evaluator: CompositeSeverityEvaluator::new(),
            policy: EscalationPolicy::new(&thresholds),
            scope: MemoryScopeController::new(),
            embedder,
            verifier: None,
            crisis: None,
            notifier: None,
            transcripts,
            audit,
            conversations: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Attach a claim verifier.
    pub fn with_verifier(mut self, verifier: Arc<dyn ClaimVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Attach a crisis module for referrals.
    pub fn with_crisis_module(mut self, crisis: Arc<dyn CrisisModule>) -> Self {
        self.crisis = Some(crisis);
        self
    }

    /// Attach a human notifier for external escalation.
    pub fn with_notifier(mut self, notifier: Arc<dyn HumanNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Replace the embedder.
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = embedder;
        self
    }

    /// Replace the transcript store.
    pub fn with_transcript_store(mut self, transcripts: Arc<dyn TranscriptStore>) -> Self {
        self.transcripts = transcripts;
        self
    }

    /// Process one turn end to end.
    pub async fn process_turn(
        &self,
        conversation_id: &str,
        turn: Turn,
    ) -> PipelineResult<TurnOutcome> {
        validate_turn(conversation_id, &turn)?;

        let conversation = self.get_or_create(conversation_id).await;
        let mut conv = conversation.lock().await;

        // Verification runs before the turn is appended so the snapshot and
        // the mirroring comparison both see it.
        let verification = if turn.speaker == Speaker::User {
            self.prefetch_verification(&turn.text).await
        } else {
            None
        };

        let profile = self.analyzer.analyze(&turn.text);
        conv.append_turn(turn.clone());
        if turn.speaker == Speaker::User {
            conv.record_emotion(profile.clone());
            conv.record_verification(verification.as_ref().and_then(|v| v.verified));
        }

        let snapshot = self.build_snapshot(&conv, &turn, verification.as_ref());
        let assessment = self.evaluator.evaluate(&snapshot);

        let decision = self
            .policy
            .apply(&mut conv, &assessment, &snapshot, &profile, &turn.text)?;
        self.scope.apply(&mut conv)?;

        let (channel, handoff_status) = self.execute_action(&conv, &decision).await;

        let mut record =
            EscalationDecision::new(conversation_id, decision.tier, decision.action)
                .with_rationale(decision.rationale.clone())
                .with_handoff_status(handoff_status);
        if let Some(channel) = &channel {
            record = record.with_channel(channel);
        }
        let decision_id = record.id.clone();
        self.audit.append_decision(&record).await?;

        info!(
            conversation_id = %conversation_id,
            speaker = %turn.speaker,
            tier = %decision.tier,
            action = %decision.action,
            state = %decision.state,
            scope = %conv.scope(),
            "Turn processed"
        );

        // A failed delivery is recorded on the decision, not surfaced as an
        // error; the turn itself was processed.
        Ok(TurnOutcome {
            decision_id,
            decision,
            snapshot,
        })
    }

    /// Read-only view of a conversation's current state.
    pub async fn get_state(&self, conversation_id: &str) -> PipelineResult<ConversationState> {
        let map = self.conversations.lock().await;
        let conversation =
            map.get(conversation_id)
                .ok_or_else(|| PipelineError::UnknownConversation {
                    conversation_id: conversation_id.to_string(),
                })?;
        let conv = conversation.lock().await;
        Ok(conv.clone())
    }

    /// Explicit operator scope reset. Recorded in the audit log.
    pub async fn reset_scope(&self, conversation_id: &str, reason: &str) -> PipelineResult<()> {
        let map = self.conversations.lock().await;
        let conversation =
            map.get(conversation_id)
                .ok_or_else(|| PipelineError::UnknownConversation {
                    conversation_id: conversation_id.to_string(),
                })?;
        let mut conv = conversation.lock().await;
        conv.reset_scope();

        let record = EscalationDecision::new(conversation_id, conv.tier(), Action::Observe)
            .with_rationale(vec![SignalContribution {
                signal: "operator".to_string(),
                detail: format!("scope reset: {}", reason),
                tier: conv.tier(),
            }]);
        self.audit.append_decision(&record).await?;

        info!(conversation_id = %conversation_id, reason = %reason, "Memory scope reset");
        Ok(())
    }

    /// Append a retrospective correction to a recorded decision.
    pub async fn record_correction(
        &self,
        decision_id: &str,
        reason: &str,
    ) -> StorageResult<CorrectionRecord> {
        let correction = CorrectionRecord::new(decision_id, reason);
        self.audit.append_correction(&correction).await?;
        info!(decision_id = %decision_id, "Correction recorded");
        Ok(correction)
    }

    /// The most recent `n` audit decisions, newest first.
    pub async fn audit_trace(&self, n: usize) -> StorageResult<Vec<EscalationDecision>> {
        self.audit.recent_decisions(n).await
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn get_or_create(&self, conversation_id: &str) -> Arc<Mutex<ConversationState>> {
        let mut map = self.conversations.lock().await;
        map.entry(conversation_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(ConversationState::new(conversation_id))))
            .clone()
    }

    /// Fetch a verification outcome, degrading to `None` on any failure. An
    /// outer deadline bounds the client's own retries.
    async fn prefetch_verification(&self, text: &str) -> Option<VerificationOutcome> {
        let verifier = self.verifier.as_ref()?;
        let budget = Duration::from_millis(
            self.config.request.timeout_ms * (self.config.request.max_retries as u64 + 2),
        );

        match tokio::time::timeout(budget, verifier.verify(text)).await {
            Ok(Ok(outcome)) => Some(outcome),
            Ok(Err(e)) => {
                warn!(error = %e, "Claim verification unavailable; continuing unchecked");
                None
            }
            Err(_) => {
                warn!(budget_ms = budget.as_millis(), "Claim verification deadline exceeded");
                None
            }
        }
    }

    fn build_snapshot(
        &self,
        conv: &ConversationState,
        turn: &Turn,
        verification: Option<&VerificationOutcome>,
    ) -> SignalSnapshot {
        let window = self.config.thresholds.window_size;

        let confidence = self.tagger.score(&turn.text, verification);
        let reality = self.classifier.classify(&turn.text);

        // Escalation and reinforcement run over the user side of the window.
        let (user_texts, user_timestamps) = user_window(conv, window);
        let profiles: Vec<EmotionProfile> = {
            let history = conv.emotion_history();
            let start = history.len().saturating_sub(window);
            history[start..].to_vec()
        };
        let escalation = self.escalation.detect(&profiles, &user_timestamps);

        let drift_texts: Vec<String> = conv
            .recent_texts(window)
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        let drift = self.drift.analyze(&drift_texts, self.embedder.as_ref());

        let confidences: Vec<f64> = user_texts.iter().map(|t| self.tagger.tag(t)).collect();
        let failed = conv.failed_verifications(window);
        let reinforcement =
            self.reinforcement
                .analyze(&user_texts, &confidences, &profiles, failed, 0.0);

        let mirroring = if turn.speaker == Speaker::Agent {
            conv.last_exchange().map(|(user, agent)| {
                let user_conf = self.tagger.tag(&user.text);
                let agent_conf = self.tagger.tag(&agent.text);
                let user_outcome = conv.last_verification().flatten().map(|verified| {
                    VerificationOutcome {
                        verified: Some(verified),
                        sources: Vec::new(),
                    }
                });
                self.mirroring.analyze(
                    &user.text,
                    &agent.text,
                    user_conf,
                    agent_conf,
                    user_outcome.as_ref(),
                    None,
                    self.embedder.as_ref(),
                )
            })
        } else {
            None
        };

        debug!(
            conversation_id = %conv.id,
            confidence = confidence.score,
            reality = %reality.mode,
            drift = drift.drift_score,
            reinforcement_index = reinforcement.index,
            "Signal snapshot assembled"
        );

        SignalSnapshot {
            confidence,
            escalation,
            reality,
            drift,
            reinforcement,
            mirroring,
        }
    }

    /// Channel for an urgency, falling back past consent-gated channels when
    /// no consent is on file.
    fn route_channel(&self, decision: &PolicyDecision) -> String {
        let channels = &self.config.channels;
        let preferred = channels.for_urgency(decision.urgency).to_string();
        if !channels.requires_consent(&preferred) {
            return preferred;
        }
        warn!(
            channel = %preferred,
            "Preferred channel requires consent; falling back"
        );
        if !channels.requires_consent(&channels.moderate) {
            return channels.moderate.clone();
        }
        channels.normal.clone()
    }

    /// Execute the decided action's external side effect, if it has one.
    /// Failures are recorded, never retried beyond the client's own policy.
    async fn execute_action(
        &self,
        conv: &ConversationState,
        decision: &PolicyDecision,
    ) -> (Option<String>, HandoffStatus) {
        match decision.action {
            Action::Referral => {
                let channel = self.route_channel(decision);
                let live = decision.urgency == Urgency::High;
                let status = self.deliver_referral(conv, decision, live).await;
                (Some(channel), status)
            }
            Action::ExternalEscalation => {
                let channel = self.route_channel(decision);
                let status = self.deliver_escalation(conv, decision, &channel).await;
                (Some(channel), status)
            }
            _ => (None, HandoffStatus::NotRequired),
        }
    }

    async fn deliver_referral(
        &self,
        conv: &ConversationState,
        decision: &PolicyDecision,
        live_handoff: bool,
    ) -> HandoffStatus {
        let crisis = match &self.crisis {
            Some(c) => c,
            None => {
                warn!(conversation_id = %conv.id, "No crisis module configured for referral");
                return HandoffStatus::Failed;
            }
        };

        let turns: Vec<Turn> = conv.history().iter().map(|r| r.turn.clone()).collect();
        let transcript_ref = match self.transcripts.save(&conv.id, &turns).await {
            Ok(reference) => reference,
            Err(e) => {
                warn!(conversation_id = %conv.id, error = %e, "Transcript save failed");
                return HandoffStatus::Failed;
            }
        };

        let payload = HandoffPayload {
            transcript_ref,
            severity: decision.tier.to_string(),
            tag: self.config.providers.crisis_module_id.clone(),
            disclaimer: "Automated signal summary; not a clinical assessment.".to_string(),
            live_handoff,
        };

        match crisis.notify(&payload).await {
            Ok(()) => HandoffStatus::Sent,
            Err(e) => {
                warn!(conversation_id = %conv.id, error = %e, "Crisis handoff failed");
                HandoffStatus::Failed
            }
        }
    }

    async fn deliver_escalation(
        &self,
        conv: &ConversationState,
        decision: &PolicyDecision,
        channel: &str,
    ) -> HandoffStatus {
        let notifier = match &self.notifier {
            Some(n) => n,
            None => {
                warn!(conversation_id = %conv.id, "No notifier configured for escalation");
                return HandoffStatus::Failed;
            }
        };

        let summary = decision
            .message
            .clone()
            .unwrap_or_else(|| format!("Conversation {} escalated", conv.id));

        match notifier
            .send(channel, &self.config.channels.default_contact, &summary)
            .await
        {
            Ok(()) => HandoffStatus::Sent,
            Err(e) => {
                warn!(conversation_id = %conv.id, error = %e, "Escalation notify failed");
                HandoffStatus::Failed
            }
        }
    }
}

fn validate_turn(conversation_id: &str, turn: &Turn) -> PipelineResult<()> {
    if conversation_id.trim().is_empty() {
        return Err(PipelineError::InvalidTurnInput {
            reason: "conversation id is empty".to_string(),
        });
    }
    if turn.text.trim().is_empty() {
        return Err(PipelineError::InvalidTurnInput {
            reason: "turn text is empty".to_string(),
        });
    }
    if turn.text.chars().count() > MAX_TURN_CHARS {
        return Err(PipelineError::InvalidTurnInput {
            reason: format!("turn text exceeds {} characters", MAX_TURN_CHARS),
        });
    }
    Ok(())
}

/// User-side texts and timestamps for the last `window` user turns.
fn user_window(conv: &ConversationState, window: usize) -> (Vec<String>, Vec<DateTime<Utc>>) {
    let user_turns: Vec<&Turn> = conv
        .history()
        .iter()
        .map(|r| &r.turn)
        .filter(|t| t.speaker == Speaker::User)
        .collect();
    let start = user_turns.len().saturating_sub(window);
    let texts = user_turns[start..].iter().map(|t| t.text.clone()).collect();
    let timestamps = user_turns[start..].iter().map(|t| t.timestamp).collect();
    (texts, timestamps)
}
