//! End-to-end pipeline tests: turns in, decisions and audit records out.
//!
//! External collaborators are stubbed in-process; the audit log runs on an
//! in-memory SQLite database.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tempfile::tempdir;

use dialogue_sentinel::audit::{AuditStore, HandoffStatus, SqliteAuditLog};
use dialogue_sentinel::config::{
    ChannelConfig, Config, DatabaseConfig, LogFormat, LoggingConfig, ProviderConfig, RequestConfig,
    ThresholdConfig,
};
use dialogue_sentinel::conversation::{EscalationTier, MemoryScope, Turn};
use dialogue_sentinel::detectors::{RealityMode, VerificationStatus};
use dialogue_sentinel::error::ProviderResult;
use dialogue_sentinel::pipeline::SafetyPipeline;
use dialogue_sentinel::policy::{Action, ContentFlag, PolicyState};
use dialogue_sentinel::providers::{
    ClaimVerifier, CrisisModule, FileTranscriptStore, HandoffPayload, HumanNotifier,
    VerificationOutcome,
};

fn test_config() -> Config {
    Config {
        database: DatabaseConfig {
            path: PathBuf::from(":memory:"),
            max_connections: 1,
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
            format: LogFormat::Pretty,
        },
        request: RequestConfig {
            timeout_ms: 2000,
            max_retries: 0,
            retry_delay_ms: 100,
        },
        thresholds: ThresholdConfig::default(),
        providers: ProviderConfig::default(),
        channels: ChannelConfig::default(),
    }
}

async fn test_pipeline() -> (SafetyPipeline, Arc<SqliteAuditLog>, tempfile::TempDir) {
    let audit = Arc::new(SqliteAuditLog::new_in_memory().await.unwrap());
    let dir = tempdir().unwrap();
    let pipeline = SafetyPipeline::new(test_config(), audit.clone())
        .with_transcript_store(Arc::new(FileTranscriptStore::new(dir.path())));
    (pipeline, audit, dir)
}

/// Verifier stub returning a fixed outcome.
struct StubVerifier {
    outcome: VerificationOutcome,
}

#[async_trait]
impl ClaimVerifier for StubVerifier {
    async fn verify(&self, _claim: &str) -> ProviderResult<VerificationOutcome> {
        Ok(self.outcome.clone())
    }
}

/// Crisis module stub that records every handoff.
#[derive(Default)]
struct RecordingCrisis {
    calls: Mutex<Vec<HandoffPayload>>,
}

#[async_trait]
impl CrisisModule for RecordingCrisis {
    async fn notify(&self, payload: &HandoffPayload) -> ProviderResult<()> {
        self.calls.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

/// Notifier stub that records every send.
#[derive(Default)]
struct RecordingNotifier {
    calls: Mutex<Vec<(String, String, String)>>,
}

#[async_trait]
impl HumanNotifier for RecordingNotifier {
    async fn send(&self, channel: &str, contact: &str, summary: &str) -> ProviderResult<()> {
        self.calls.lock().unwrap().push((
            channel.to_string(),
            contact.to_string(),
            summary.to_string(),
        ));
        Ok(())
    }
}

#[tokio::test]
async fn test_calm_turn_observes_and_audits() {
    let (pipeline, audit, _dir) = test_pipeline().await;

    let outcome = pipeline
        .process_turn("conv-1", Turn::user("hello there"))
        .await
        .unwrap();

    assert_eq!(outcome.decision.state, PolicyState::Monitoring);
    assert_eq!(outcome.decision.action, Action::Observe);
    assert_eq!(outcome.decision.tier, EscalationTier::None);
    assert_eq!(audit.count_decisions().await.unwrap(), 1);

    let recorded = audit.get_decision(&outcome.decision_id).await.unwrap().unwrap();
    assert_eq!(recorded.conversation_id, "conv-1");
    assert_eq!(recorded.handoff_status, HandoffStatus::NotRequired);
}

#[tokio::test]
async fn test_empty_turn_is_rejected() {
    let (pipeline, audit, _dir) = test_pipeline().await;

    let result = pipeline.process_turn("conv-1", Turn::user("   ")).await;
    assert!(result.is_err());
    assert_eq!(audit.count_decisions().await.unwrap(), 0);
}

#[tokio::test]
async fn test_distress_spike_triggers_soft_mitigation() {
    let (pipeline, _audit, _dir) = test_pipeline().await;

    let outcome = pipeline
        .process_turn(
            "conv-1",
            Turn::user("I'm terrified and furious about all of this!"),
        )
        .await
        .unwrap();

    assert_eq!(outcome.decision.state, PolicyState::SoftMitigation);
    assert_eq!(outcome.decision.action, Action::SoftMitigation);
    assert!(outcome.decision.content_flags.contains(&ContentFlag::EmotionalDistress));
    assert!(outcome.decision.message.is_some());
}

#[tokio::test]
async fn test_fantasy_framing_stays_unescalated() {
    let (pipeline, _audit, _dir) = test_pipeline().await;

    let outcome = pipeline
        .process_turn(
            "conv-1",
            Turn::user("The wizard rode a dragon to the spaceship."),
        )
        .await
        .unwrap();

    assert_eq!(outcome.snapshot.reality.mode, RealityMode::Fantasy);
    assert_eq!(outcome.decision.state, PolicyState::Monitoring);
    assert_eq!(outcome.decision.action, Action::Observe);
    assert!(outcome.decision.tier <= EscalationTier::Low);
}

#[tokio::test]
async fn test_sustained_indulgent_framing_escalates_to_referral() {
    let (pipeline, audit, _dir) = test_pipeline().await;
    let crisis = Arc::new(RecordingCrisis::default());
    let pipeline = pipeline.with_crisis_module(crisis.clone());

    let text = "They're watching me, I know the truth.";

    let first = pipeline.process_turn("conv-1", Turn::user(text)).await.unwrap();
    assert_eq!(first.decision.state, PolicyState::Paused);
    assert_eq!(first.decision.action, Action::Pause);
    assert_eq!(first.decision.tier, EscalationTier::High);

    let second = pipeline.process_turn("conv-1", Turn::user(text)).await.unwrap();
    assert_eq!(second.decision.state, PolicyState::Referred);
    assert_eq!(second.decision.action, Action::Referral);

    // The crisis module received exactly one handoff with a transcript
    // reference, not the transcript itself.
    let calls = crisis.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].severity, "high");
    assert!(calls[0].transcript_ref.ends_with(".json"));
    drop(calls);

    let recorded = audit.get_decision(&second.decision_id).await.unwrap().unwrap();
    assert_eq!(recorded.action, Action::Referral);
    assert_eq!(recorded.channel.as_deref(), Some("staff_email"));
    assert_eq!(recorded.handoff_status, HandoffStatus::Sent);
}

#[tokio::test]
async fn test_referred_conversation_restricts_scope_and_flags_audit_only() {
    let (pipeline, _audit, _dir) = test_pipeline().await;
    let pipeline = pipeline.with_crisis_module(Arc::new(RecordingCrisis::default()));

    let text = "They're watching me, I know the truth.";
    pipeline.process_turn("conv-1", Turn::user(text)).await.unwrap();
    pipeline.process_turn("conv-1", Turn::user(text)).await.unwrap();

    let state = pipeline.get_state("conv-1").await.unwrap();
    assert_eq!(state.policy_state(), PolicyState::Referred);
    assert_eq!(state.scope(), MemoryScope::Restricted);

    // Turns after restriction are kept for audit but hidden downstream.
    let outcome = pipeline.process_turn("conv-1", Turn::user("ok")).await.unwrap();
    assert_eq!(outcome.decision.action, Action::Observe);

    let state = pipeline.get_state("conv-1").await.unwrap();
    assert!(state.history().last().unwrap().audit_only);
    assert!(state.context_window(10).is_empty());
}

#[tokio::test]
async fn test_failed_handoff_is_recorded_not_fatal() {
    // No crisis module attached; the referral cannot be delivered.
    let (pipeline, audit, _dir) = test_pipeline().await;

    let text = "They're watching me, I know the truth.";
    pipeline.process_turn("conv-1", Turn::user(text)).await.unwrap();
    let second = pipeline.process_turn("conv-1", Turn::user(text)).await.unwrap();

    assert_eq!(second.decision.action, Action::Referral);
    let recorded = audit.get_decision(&second.decision_id).await.unwrap().unwrap();
    assert_eq!(recorded.handoff_status, HandoffStatus::Failed);
}

#[tokio::test]
async fn test_mirrored_agent_turn_is_flagged() {
    let (pipeline, _audit, _dir) = test_pipeline().await;

    let text = "This is definitely proven and confirmed.";
    pipeline.process_turn("conv-1", Turn::user(text)).await.unwrap();
    let outcome = pipeline.process_turn("conv-1", Turn::agent(text)).await.unwrap();

    let mirroring = outcome.snapshot.mirroring.expect("agent turn analyzes mirroring");
    assert!(mirroring.mirrored);
    assert!(mirroring.similarity > 0.99);
    assert_eq!(outcome.decision.state, PolicyState::SoftMitigation);
}

#[tokio::test]
async fn test_epistemic_mismatch_forces_pause() {
    let (pipeline, _audit, _dir) = test_pipeline().await;
    let pipeline = pipeline.with_verifier(Arc::new(StubVerifier {
        outcome: VerificationOutcome {
            verified: Some(false),
            sources: vec![],
        },
    }));

    let text = "This is definitely proven and confirmed.";
    let first = pipeline.process_turn("conv-1", Turn::user(text)).await.unwrap();
    assert_eq!(first.snapshot.confidence.verification, VerificationStatus::Unverified);

    // The agent echoes the contradicted claim with high confidence.
    let outcome = pipeline.process_turn("conv-1", Turn::agent(text)).await.unwrap();
    let mirroring = outcome.snapshot.mirroring.expect("agent turn analyzes mirroring");
    assert!(mirroring.epistemic_mismatch);
    assert!(outcome
        .decision
        .content_flags
        .contains(&ContentFlag::SyntheticIdentityConfusion));
    assert_eq!(outcome.decision.state, PolicyState::Paused);
}

#[tokio::test]
async fn test_repeated_failed_verifications_escalate() {
    let (pipeline, _audit, _dir) = test_pipeline().await;
    let pipeline = pipeline.with_verifier(Arc::new(StubVerifier {
        outcome: VerificationOutcome {
            verified: Some(false),
            sources: vec![],
        },
    }));

    let text = "The archive was stolen from me.";
    let first = pipeline.process_turn("conv-1", Turn::user(text)).await.unwrap();
    assert_eq!(first.decision.action, Action::Observe);

    let second = pipeline.process_turn("conv-1", Turn::user(text)).await.unwrap();
    assert_eq!(second.decision.tier, EscalationTier::High);
    assert_eq!(second.decision.state, PolicyState::Paused);
}

#[tokio::test]
async fn test_reinforcement_loop_detected_over_repeated_turns() {
    let (pipeline, _audit, _dir) = test_pipeline().await;

    let turns = [
        "Maybe the neighbors rigged the election against me, I am furious",
        "Definitely the neighbors rigged the election against me, I am furious",
        "Clearly the neighbors rigged the election against me, I am furious",
    ];
    let mut last = None;
    for text in turns {
        last = Some(pipeline.process_turn("conv-1", Turn::user(text)).await.unwrap());
    }

    let outcome = last.unwrap();
    assert!(outcome.snapshot.reinforcement.loop_detected);
    assert!(outcome.snapshot.reinforcement.repetition_ratio > 0.99);
    assert!(outcome.decision.tier >= EscalationTier::Moderate);
}

#[tokio::test]
async fn test_get_state_unknown_conversation_errors() {
    let (pipeline, _audit, _dir) = test_pipeline().await;
    assert!(pipeline.get_state("nope").await.is_err());
}

#[tokio::test]
async fn test_correction_round_trip() {
    let (pipeline, audit, _dir) = test_pipeline().await;

    let outcome = pipeline.process_turn("conv-1", Turn::user("hello")).await.unwrap();
    let correction = pipeline
        .record_correction(&outcome.decision_id, "graded too low")
        .await
        .unwrap();

    let corrections = audit.decision_corrections(&outcome.decision_id).await.unwrap();
    assert_eq!(corrections.len(), 1);
    assert_eq!(corrections[0].id, correction.id);
    assert_eq!(corrections[0].reason, "graded too low");
}

#[tokio::test]
async fn test_operator_scope_reset_is_audited() {
    let (pipeline, audit, _dir) = test_pipeline().await;
    let pipeline = pipeline.with_crisis_module(Arc::new(RecordingCrisis::default()));

    let text = "They're watching me, I know the truth.";
    pipeline.process_turn("conv-1", Turn::user(text)).await.unwrap();
    pipeline.process_turn("conv-1", Turn::user(text)).await.unwrap();
    assert_eq!(
        pipeline.get_state("conv-1").await.unwrap().scope(),
        MemoryScope::Restricted
    );

    pipeline.reset_scope("conv-1", "reviewed by staff").await.unwrap();
    assert_eq!(
        pipeline.get_state("conv-1").await.unwrap().scope(),
        MemoryScope::Default
    );

    // The reset left its own audit record.
    let decisions = audit.conversation_decisions("conv-1").await.unwrap();
    let reset = decisions.last().unwrap();
    assert!(reset.rationale.iter().any(|c| c.signal == "operator"));
}

#[tokio::test]
async fn test_concurrent_conversations_do_not_interfere() {
    let (pipeline, _audit, _dir) = test_pipeline().await;
    let pipeline = Arc::new(pipeline);

    let hot = "They're watching me, I know the truth.";
    let a = {
        let p = pipeline.clone();
        tokio::spawn(async move { p.process_turn("conv-a", Turn::user(hot)).await })
    };
    let b = {
        let p = pipeline.clone();
        tokio::spawn(async move { p.process_turn("conv-b", Turn::user("good morning")).await })
    };
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    assert_eq!(
        pipeline.get_state("conv-a").await.unwrap().tier(),
        EscalationTier::High
    );
    assert_eq!(
        pipeline.get_state("conv-b").await.unwrap().tier(),
        EscalationTier::None
    );
}
