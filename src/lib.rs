//! # Dialogue Sentinel
//!
//! A conversational-safety pipeline that fuses per-turn detector signals into
//! a composite severity and drives a one-way escalation state machine with an
//! append-only audit trail.
//!
//! ## Features
//!
//! - **Confidence Tagging**: Hedging/assertive marker scoring with optional
//!   external fact-check boosts
//! - **Emotional Escalation**: Spike and gradual escalation detection over a
//!   rolling emotion-profile window
//! - **Reality Mode Classification**: Grounded, fictional, speculative,
//!   roleplay, humor, and indulgent-delusion framing
//! - **Semantic Drift**: Embedding-based topic-coherence tracking
//! - **Reinforcement Loops**: Repetition, confidence inflation, and affective
//!   amplification fused into a loop index
//! - **Mirroring Detection**: Agent turns that echo the user with unearned
//!   confidence, including epistemic mismatches
//! - **Escalation Policy**: Monitoring through soft mitigation, pause,
//!   referral, and external escalation, with calm-streak de-escalation
//! - **Audit Log**: Append-only decision records with retrospective
//!   corrections, export, and import
//!
//! ## Architecture
//!
//! ```text
//! Turn → Detectors → SignalSnapshot → CompositeSeverityEvaluator
//!                                            ↓
//!        Audit (SQLite) ← EscalationPolicy → MemoryScopeController
//!                                            ↓
//!                          Crisis Module / Human Notifier (HTTP)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use dialogue_sentinel::{Config, SafetyPipeline, SqliteAuditLog};
//! use dialogue_sentinel::conversation::Turn;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let audit = Arc::new(SqliteAuditLog::new(&config.database).await?);
//!     let pipeline = SafetyPipeline::new(config, audit);
//!     let outcome = pipeline.process_turn("conv-1", Turn::user("hello")).await?;
//!     println!("{}", outcome.decision.action);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Append-only audit log for escalation decisions and corrections.
pub mod audit;
/// Configuration management, thresholds, and channel routing.
pub mod config;
/// Conversation state: turns, emotion history, scope, and tier.
pub mod conversation;
/// Per-turn signal detectors and the fused snapshot.
pub mod detectors;
/// Error types and result aliases for the application.
pub mod error;
/// The turn-processing pipeline that ties everything together.
pub mod pipeline;
/// Severity fusion, escalation policy, mitigation text, and scope control.
pub mod policy;
/// External collaborators: verification, embeddings, crisis handoff,
/// transcripts.
pub mod providers;

pub use audit::{AuditStore, SqliteAuditLog};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use pipeline::{SafetyPipeline, TurnOutcome};
