//! Reality-mode classification.
//!
//! Labels the conversational frame of a turn: grounded fact, speculation,
//! fiction, fantasy, roleplay, humor, or an indulgent frame where the user
//! treats an unverifiable narrative as literal reality. Indulgent frames are
//! the dangerous ones and win every tie.

use serde::{Deserialize, Serialize};

/// Conversational frame of a turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RealityMode {
    /// Verifiable, factual framing.
    Grounded,
    /// Hypothetical or what-if framing.
    Speculative,
    /// Narrative or literary framing.
    Fictional,
    /// Overt fantasy elements.
    Fantasy,
    /// Declared persona or pretend-play.
    Roleplay,
    /// Jokes and satire.
    Humor,
    /// Unverifiable narrative asserted as literal reality.
    Indulgent,
    /// No trigger matched.
    #[default]
    Ambiguous,
}

impl RealityMode {
    /// Tie-break priority; higher wins. Indulgent outranks everything.
    fn priority(&self) -> u8 {
        match self {
            RealityMode::Indulgent => 7,
            RealityMode::Fantasy => 6,
            RealityMode::Fictional => 5,
            RealityMode::Roleplay => 4,
            RealityMode::Speculative => 3,
            RealityMode::Humor => 2,
            RealityMode::Grounded => 1,
            RealityMode::Ambiguous => 0,
        }
    }
}

impl std::fmt::Display for RealityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RealityMode::Grounded => write!(f, "grounded"),
            RealityMode::Speculative => write!(f, "speculative"),
            RealityMode::Fictional => write!(f, "fictional"),
            RealityMode::Fantasy => write!(f, "fantasy"),
            RealityMode::Roleplay => write!(f, "roleplay"),
            RealityMode::Humor => write!(f, "humor"),
            RealityMode::Indulgent => write!(f, "indulgent"),
            RealityMode::Ambiguous => write!(f, "ambiguous"),
        }
    }
}

/// Classification result for one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealityModeResult {
    /// Winning mode after tie-break.
    pub mode: RealityMode,
    /// Share of all matched triggers belonging to the winning mode.
    pub confidence: f64,
    /// Trigger phrases that matched, across all modes.
    pub matched_terms: Vec<String>,
    /// Short framing note for downstream response shaping.
    pub editorial_note: String,
}

const TRIGGERS: [(RealityMode, &[&str]); 7] = [
    (
        RealityMode::Indulgent,
        &[
            "they're watching me",
            "i'm being tracked",
            "they implanted",
            "i know the truth",
            "they're not real",
        ],
    ),
    (
        RealityMode::Fantasy,
        &["dragon", "wizard", "spaceship", "magic", "teleport", "sorcery"],
    ),
    (
        RealityMode::Fictional,
        &["novel", "story", "character", "plot", "narrative", "author"],
    ),
    (
        RealityMode::Speculative,
        &["what if", "imagine", "hypothetical", "suppose", "theoretically"],
    ),
    (
        RealityMode::Roleplay,
        &["as if", "pretend", "i'm playing", "in character", "my persona"],
    ),
    (
        RealityMode::Humor,
        &["joke", "kidding", "funny", "satire", "pun"],
    ),
    (
        RealityMode::Grounded,
        &["confirmed", "real", "documented", "evidence", "actual", "verified"],
    ),
];

fn editorial_note(mode: RealityMode) -> &'static str {
    match mode {
        RealityMode::Indulgent => "Consider escalation or reality-mode prompt",
        RealityMode::Fantasy | RealityMode::Fictional | RealityMode::Roleplay => {
            "Consider soft mitigation or clarification prompt"
        }
        RealityMode::Grounded => "No mitigation needed",
        RealityMode::Speculative | RealityMode::Humor => "",
        RealityMode::Ambiguous => "No clear mode detected",
    }
}

/// Keyword-trigger reality-mode classifier.
#[derive(Debug, Clone, Default)]
pub struct RealityModeClassifier;

impl RealityModeClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify one turn.
    ///
    /// The mode with the most trigger hits wins, ties broken by priority
    /// (indulgent outranks every other mode), and confidence is that mode's
    /// share of all hits.
    pub fn classify(&self, text: &str) -> RealityModeResult {
        let lowered = text.to_lowercase();

        let mut matched_terms = Vec::new();
        let mut best: Option<(RealityMode, usize)> = None;
        let mut total_hits = 0usize;

        for (mode, triggers) in TRIGGERS {
            let hits: Vec<&str> = triggers
                .iter()
                .filter(|t| lowered.contains(*t))
                .copied()
                .collect();
            if hits.is_empty() {
                continue;
            }
            total_hits += hits.len();
            let count = hits.len();
            matched_terms.extend(hits.iter().map(|t| t.to_string()));

            let replace = match best {
                None => true,
                Some((best_mode, best_count)) => {
                    count > best_count
                        || (count == best_count && mode.priority() > best_mode.priority())
                }
            };
            if replace {
                best = Some((mode, count));
            }
        }

        match best {
            Some((mode, count)) => RealityModeResult {
                mode,
                confidence: count as f64 / total_hits as f64,
                matched_terms,
                editorial_note: editorial_note(mode).to_string(),
            },
            None => RealityModeResult {
                mode: RealityMode::Ambiguous,
                confidence: 0.0,
                matched_terms,
                editorial_note: editorial_note(RealityMode::Ambiguous).to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> RealityModeClassifier {
        RealityModeClassifier::new()
    }

    #[test]
    fn test_ambiguous_when_no_triggers() {
        let result = classifier().classify("Lunch at noon works for me.");
        assert_eq!(result.mode, RealityMode::Ambiguous);
        assert_eq!(result.confidence, 0.0);
        assert!(result.matched_terms.is_empty());
    }

    #[test]
    fn test_fantasy_classification() {
        let result = classifier().classify("The wizard cast a spell on the dragon.");
        assert_eq!(result.mode, RealityMode::Fantasy);
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.matched_terms.len(), 2);
    }

    #[test]
    fn test_speculative_classification() {
        let result = classifier().classify("What if the grid went down for a week?");
        assert_eq!(result.mode, RealityMode::Speculative);
    }

    #[test]
    fn test_humor_classification() {
        let result = classifier().classify("Just kidding, that was a joke.");
        assert_eq!(result.mode, RealityMode::Humor);
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn test_indulgent_classification() {
        let result = classifier().classify("They're watching me, I know the truth.");
        assert_eq!(result.mode, RealityMode::Indulgent);
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.matched_terms.len(), 2);
    }

    #[test]
    fn test_indulgent_wins_ties() {
        // One grounded hit vs. one indulgent hit: indulgent outranks.
        let result = classifier().classify("It's real: they're watching me.");
        assert_eq!(result.mode, RealityMode::Indulgent);
        assert!((result.confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_grounded_majority_beats_indulgent_phrase() {
        // Indulgent competes in the argmax; it does not short-circuit.
        let result =
            classifier().classify("This is confirmed real evidence: they implanted a chip in me.");
        assert_eq!(result.mode, RealityMode::Grounded);
        assert!((result.confidence - 0.75).abs() < 1e-9);
        assert_eq!(result.matched_terms.len(), 4);
    }

    #[test]
    fn test_tie_breaks_by_priority() {
        // One fantasy hit vs. one grounded hit: fantasy outranks grounded.
        let result = classifier().classify("The dragon is documented.");
        assert_eq!(result.mode, RealityMode::Fantasy);
        assert!((result.confidence - 0.5).abs() < 1e-9);
        assert_eq!(result.matched_terms.len(), 2);
    }

    #[test]
    fn test_majority_beats_priority() {
        // Two grounded hits beat one fantasy hit despite lower priority.
        let result = classifier().classify("Documented and verified, no magic involved.");
        assert_eq!(result.mode, RealityMode::Grounded);
        assert!((result.confidence - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_editorial_note_mapping() {
        let result = classifier().classify("The wizard cast a spell.");
        assert!(result.editorial_note.contains("soft mitigation"));

        let result = classifier().classify("They're watching me.");
        assert!(result.editorial_note.contains("escalation"));

        let result = classifier().classify("Documented and verified.");
        assert_eq!(result.editorial_note, "No mitigation needed");

        let result = classifier().classify("Lunch at noon works for me.");
        assert_eq!(result.editorial_note, "No clear mode detected");
    }
}
