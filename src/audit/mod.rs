//! Append-only audit log for escalation decisions.
//!
//! Every escalation decision is recorded with its rationale; a wrong
//! decision is never rewritten, it gets a retrospective correction appended
//! that points at it. Export and import preserve insertion order so a
//! migrated log replays identically.

mod sqlite;

pub use sqlite::SqliteAuditLog;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::conversation::EscalationTier;
use crate::error::StorageResult;
use crate::policy::{Action, SignalContribution};

/// Delivery status of the side effect attached to a decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffStatus {
    /// The action had no external delivery.
    #[default]
    NotRequired,
    /// Delivered to the crisis module or notifier.
    Sent,
    /// Delivery failed after retry; recorded and surfaced, not retried
    /// again.
    Failed,
}

impl std::fmt::Display for HandoffStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandoffStatus::NotRequired => write!(f, "not_required"),
            HandoffStatus::Sent => write!(f, "sent"),
            HandoffStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for HandoffStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "not_required" => Ok(HandoffStatus::NotRequired),
            "sent" => Ok(HandoffStatus::Sent),
            "failed" => Ok(HandoffStatus::Failed),
            _ => Err(format!("Unknown handoff status: {}", s)),
        }
    }
}

/// One recorded escalation decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationDecision {
    /// Unique decision identifier.
    pub id: String,
    /// Conversation the decision belongs to.
    pub conversation_id: String,
    /// Tier at decision time.
    pub tier: EscalationTier,
    /// Action the policy executed.
    pub action: Action,
    /// Per-signal rationale.
    pub rationale: Vec<SignalContribution>,
    /// Channel the side effect was routed over, if any.
    pub channel: Option<String>,
    /// Delivery status of the side effect.
    pub handoff_status: HandoffStatus,
    /// When the decision was recorded.
    pub created_at: DateTime<Utc>,
}

impl EscalationDecision {
    /// Create a new decision record.
    pub fn new(conversation_id: impl Into<String>, tier: EscalationTier, action: Action) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            tier,
            action,
            rationale: Vec::new(),
            channel: None,
            handoff_status: HandoffStatus::NotRequired,
            created_at: Utc::now(),
        }
    }

    /// Attach the signal rationale.
    pub fn with_rationale(mut self, rationale: Vec<SignalContribution>) -> Self {
        self.rationale = rationale;
        self
    }

    /// Set the routed channel.
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    /// Set the delivery status.
    pub fn with_handoff_status(mut self, status: HandoffStatus) -> Self {
        self.handoff_status = status;
        self
    }
}

/// A retrospective correction pointing at an earlier decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionRecord {
    /// Unique correction identifier.
    pub id: String,
    /// The decision being corrected.
    pub decision_id: String,
    /// Why the decision was wrong or incomplete.
    pub reason: String,
    /// When the correction was recorded.
    pub created_at: DateTime<Utc>,
}

impl CorrectionRecord {
    /// Create a new correction for a decision.
    pub fn new(decision_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            decision_id: decision_id.into(),
            reason: reason.into(),
            created_at: Utc::now(),
        }
    }
}

/// Complete ordered dump of the log for migration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditExport {
    /// Decisions in insertion order.
    pub decisions: Vec<EscalationDecision>,
    /// Corrections in insertion order.
    pub corrections: Vec<CorrectionRecord>,
}

/// Audit log persistence. Append-only: no operation updates or deletes a
/// recorded entry.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append a decision.
    async fn append_decision(&self, decision: &EscalationDecision) -> StorageResult<()>;

    /// Append a correction. Fails if the referenced decision does not exist.
    async fn append_correction(&self, correction: &CorrectionRecord) -> StorageResult<()>;

    /// Get a decision by ID.
    async fn get_decision(&self, id: &str) -> StorageResult<Option<EscalationDecision>>;

    /// The most recent `limit` decisions, newest first.
    async fn recent_decisions(&self, limit: usize) -> StorageResult<Vec<EscalationDecision>>;

    /// All decisions for one conversation, oldest first.
    async fn conversation_decisions(
        &self,
        conversation_id: &str,
    ) -> StorageResult<Vec<EscalationDecision>>;

    /// Corrections recorded against a decision, oldest first.
    async fn decision_corrections(&self, decision_id: &str)
        -> StorageResult<Vec<CorrectionRecord>>;

    /// Total decisions recorded.
    async fn count_decisions(&self) -> StorageResult<i64>;

    /// Dump the whole log in insertion order.
    async fn export(&self) -> StorageResult<AuditExport>;

    /// Load an exported log, preserving order. Entries whose IDs already
    /// exist are skipped.
    async fn import(&self, export: &AuditExport) -> StorageResult<()>;
}
