//! Agent-mirroring detection.
//!
//! Compares the last user turn against the agent's reply. An agent that
//! restates a user's unverified claim with high confidence is validating it,
//! and a failed fact-check on the user side turns that into an epistemic
//! mismatch that the policy treats as high severity.

use serde::{Deserialize, Serialize};

use crate::config::ThresholdConfig;
use crate::providers::{cosine_similarity, Embedder, VerificationOutcome};

/// Mirroring comparison for one user-then-agent exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirroringResult {
    /// Cosine similarity between the user turn and the agent reply.
    pub similarity: f64,
    /// Whether the agent mirrored the user with high confidence.
    pub mirrored: bool,
    /// Agent confidence minus user confidence.
    pub confidence_delta: f64,
    /// Whether the agent asserted a claim the verifier rejected.
    pub epistemic_mismatch: bool,
}

/// Detector for validating-agent responses.
#[derive(Debug, Clone)]
pub struct MirroringDetector {
    similarity_threshold: f64,
    confidence_threshold: f64,
}

impl MirroringDetector {
    pub fn new(thresholds: &ThresholdConfig) -> Self {
        Self {
            similarity_threshold: thresholds.mirror_similarity,
            confidence_threshold: thresholds.mirror_confidence,
        }
    }

    /// Compare the latest exchange.
    ///
    /// `user_verification` is the verifier outcome for the user's claim;
    /// `agent_verification` for the agent's reply. Either may be absent when
    /// the verifier is unavailable.
    #[allow(clippy::too_many_arguments)]
    pub fn analyze(
        &self,
        user_text: &str,
        agent_text: &str,
        user_confidence: f64,
        agent_confidence: f64,
        user_verification: Option<&VerificationOutcome>,
        agent_verification: Option<&VerificationOutcome>,
        embedder: &dyn Embedder,
    ) -> MirroringResult {
        let user_vec = embedder.embed(user_text);
        let agent_vec = embedder.embed(agent_text);
        let similarity = cosine_similarity(&user_vec, &agent_vec);

        let mirrored = similarity > self.similarity_threshold
            && agent_confidence > self.confidence_threshold;

        let user_failed = user_verification.map(|v| v.verified == Some(false)).unwrap_or(false);
        let agent_asserts = match agent_verification {
            Some(v) => v.verified == Some(true),
            None => agent_confidence >= self.confidence_threshold,
        };
        let epistemic_mismatch = user_failed && agent_asserts;

        MirroringResult {
            similarity,
            mirrored,
            confidence_delta: agent_confidence - user_confidence,
            epistemic_mismatch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::HashEmbedder;

    fn detector() -> MirroringDetector {
        MirroringDetector::new(&ThresholdConfig::default())
    }

    fn failed() -> VerificationOutcome {
        VerificationOutcome {
            verified: Some(false),
            sources: vec![],
        }
    }

    #[test]
    fn test_identical_reply_with_high_confidence_mirrors() {
        let embedder = HashEmbedder::new(128);
        let result = detector().analyze(
            "the satellites follow my car every night",
            "the satellites follow my car every night",
            0.6,
            0.8,
            None,
            None,
            &embedder,
        );
        assert!(result.similarity > 0.99);
        assert!(result.mirrored);
        assert!((result.confidence_delta - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_low_confidence_reply_does_not_mirror() {
        let embedder = HashEmbedder::new(128);
        let result = detector().analyze(
            "the satellites follow my car every night",
            "the satellites follow my car every night",
            0.6,
            0.4,
            None,
            None,
            &embedder,
        );
        assert!(!result.mirrored);
    }

    #[test]
    fn test_unrelated_reply_does_not_mirror() {
        let embedder = HashEmbedder::new(128);
        let result = detector().analyze(
            "the satellites follow my car every night",
            "would you like to talk about something grounding instead",
            0.6,
            0.9,
            None,
            None,
            &embedder,
        );
        assert!(result.similarity < 0.85);
        assert!(!result.mirrored);
    }

    #[test]
    fn test_mismatch_on_failed_claim_and_confident_echo() {
        let embedder = HashEmbedder::new(128);
        let result = detector().analyze(
            "the implant broadcasts my thoughts",
            "yes, the implant broadcasts your thoughts",
            0.5,
            0.8,
            Some(&failed()),
            None,
            &embedder,
        );
        assert!(result.epistemic_mismatch);
    }

    #[test]
    fn test_no_mismatch_without_failed_verification() {
        let embedder = HashEmbedder::new(128);
        let result = detector().analyze(
            "the implant broadcasts my thoughts",
            "yes, the implant broadcasts your thoughts",
            0.5,
            0.8,
            None,
            None,
            &embedder,
        );
        assert!(!result.epistemic_mismatch);
    }

    #[test]
    fn test_no_mismatch_when_agent_hedges() {
        let embedder = HashEmbedder::new(128);
        let result = detector().analyze(
            "the implant broadcasts my thoughts",
            "there is no evidence that implants can broadcast thoughts",
            0.5,
            0.4,
            Some(&failed()),
            None,
            &embedder,
        );
        assert!(!result.epistemic_mismatch);
    }
}
