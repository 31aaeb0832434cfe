//! Emotional escalation detection over Plutchik emotion vectors.
//!
//! Computes a per-turn [`EmotionProfile`] from keyword cues, then flags
//! affective spikes between consecutive turns and gradual escalation across
//! the rolling window. Spike outranks gradual in the reported type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ThresholdConfig;
use crate::conversation::{EmotionLabel, EmotionProfile};

/// Keyword cues per emotion label. Deliberately small; a real deployment
/// would swap in a classifier behind the same profile type.
const EMOTION_CUES: [(&EmotionLabel, &[&str]); 8] = [
    (
        &EmotionLabel::Joy,
        &["happy", "joy", "delighted", "wonderful", "love", "grateful"],
    ),
    (
        &EmotionLabel::Trust,
        &["trust", "believe in", "reliable", "faith", "count on"],
    ),
    (
        &EmotionLabel::Fear,
        &["scared", "afraid", "nervous", "anxious", "terrified"],
    ),
    (
        &EmotionLabel::Surprise,
        &["shocked", "surprised", "unexpected", "can't believe"],
    ),
    (
        &EmotionLabel::Sadness,
        &["sad", "grief", "loss", "mourning", "depressed", "lonely", "hopeless"],
    ),
    (
        &EmotionLabel::Disgust,
        &["disgusting", "gross", "revolting", "sick of"],
    ),
    (
        &EmotionLabel::Anger,
        &["angry", "furious", "hate", "rage", "idiot", "stupid"],
    ),
    (
        &EmotionLabel::Anticipation,
        &["can't wait", "looking forward", "excited", "eager", "hope"],
    ),
];

/// Lexical emotion analyzer producing immutable per-turn profiles.
#[derive(Debug, Clone, Default)]
pub struct EmotionAnalyzer;

impl EmotionAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Build the emotion profile for one turn.
    pub fn analyze(&self, text: &str) -> EmotionProfile {
        let lowered = text.to_lowercase();
        let mut weights = [0.0_f64; 8];

        for (label, cues) in EMOTION_CUES {
            let hits = cues.iter().filter(|c| lowered.contains(*c)).count();
            weights[label.index()] = (hits as f64 * 0.5).min(1.0);
        }

        let max_weight = weights.iter().cloned().fold(0.0, f64::max);
        let active = weights.iter().filter(|w| **w > 0.0).count();
        let emphasis = if text.contains('!') { 0.2 } else { 0.0 };
        let breadth = 0.1 * active.saturating_sub(1) as f64;
        let intensity = if active == 0 {
            0.0
        } else {
            (max_weight + emphasis + breadth).min(1.0)
        };

        let positive = weights[EmotionLabel::Joy.index()]
            + weights[EmotionLabel::Trust.index()]
            + weights[EmotionLabel::Anticipation.index()];
        let negative = weights[EmotionLabel::Fear.index()]
            + weights[EmotionLabel::Sadness.index()]
            + weights[EmotionLabel::Disgust.index()]
            + weights[EmotionLabel::Anger.index()];
        let valence = (positive - negative).clamp(-1.0, 1.0);

        EmotionProfile {
            weights,
            intensity,
            valence,
        }
    }
}

/// Suggested editorial tone for the dominant emotion.
pub fn map_emotion_to_tone(profile: &EmotionProfile) -> &'static str {
    let dominant = EmotionLabel::ALL
        .iter()
        .max_by(|a, b| {
            profile
                .weight(**a)
                .partial_cmp(&profile.weight(**b))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .copied();

    match dominant {
        Some(label) if profile.weight(label) > 0.0 => match label {
            EmotionLabel::Anger | EmotionLabel::Disgust => "hostile",
            EmotionLabel::Fear => "fearful",
            EmotionLabel::Sadness => "mournful",
            EmotionLabel::Surprise => "startled",
            EmotionLabel::Joy | EmotionLabel::Trust | EmotionLabel::Anticipation => "uplifted",
        },
        _ => "neutral",
    }
}

/// Kind of escalation observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationType {
    /// No escalation.
    #[default]
    None,
    /// Sharp turn-to-turn shift.
    Spike,
    /// Slow build across the window.
    Gradual,
}

impl std::fmt::Display for EscalationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EscalationType::None => write!(f, "none"),
            EscalationType::Spike => write!(f, "spike"),
            EscalationType::Gradual => write!(f, "gradual"),
        }
    }
}

/// Window metadata for an escalation episode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EscalationPeriod {
    /// Turns in the observed window.
    pub turns: usize,
    /// Wall-clock span of the window.
    pub duration_seconds: i64,
}

/// Escalation detection result for one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationReport {
    /// Spike, gradual, or none. Spike takes priority.
    pub escalation_type: EscalationType,
    /// Intensity delta against the previous turn.
    pub delta_intensity: f64,
    /// Summed per-label shift against the previous turn.
    pub delta_vector: f64,
    /// Window metadata.
    pub period: EscalationPeriod,
    /// Suggested editorial tone for the current profile.
    pub editorial_tone: String,
}

/// Detector for affective spikes and gradual escalation.
#[derive(Debug, Clone)]
pub struct EscalationDetector {
    spike_delta: f64,
    gradual_intensity: f64,
}

impl EscalationDetector {
    pub fn new(thresholds: &ThresholdConfig) -> Self {
        Self {
            spike_delta: thresholds.spike_delta,
            gradual_intensity: thresholds.gradual_intensity,
        }
    }

    /// Spike: intensity delta beyond threshold, or at least two newly
    /// activated emotion labels.
    pub fn detect_spike(&self, current: &EmotionProfile, previous: &EmotionProfile) -> bool {
        let delta_intensity = (current.intensity - previous.intensity).abs();
        delta_intensity > self.spike_delta || current.newly_active(previous) >= 2
    }

    /// Gradual: the last three intensities sum beyond threshold, or the
    /// cumulative vector shift across the window reaches 3.
    pub fn detect_gradual(&self, history: &[EmotionProfile]) -> bool {
        if history.len() < 3 {
            return false;
        }
        let last3 = &history[history.len() - 3..];
        let cumulative_intensity: f64 = last3.iter().map(|p| p.intensity).sum();
        let cumulative_shift = last3[2].vector_shift(&last3[0]);

        cumulative_intensity > self.gradual_intensity || cumulative_shift >= 3.0
    }

    /// Full report for the current turn against the rolling history.
    /// `history` includes the current profile as its last element.
    pub fn detect(
        &self,
        history: &[EmotionProfile],
        timestamps: &[DateTime<Utc>],
    ) -> EscalationReport {
        let current = history.last().cloned().unwrap_or_else(EmotionProfile::neutral);
        let previous = if history.len() >= 2 {
            history[history.len() - 2].clone()
        } else {
            EmotionProfile::neutral()
        };

        let escalation_type = if self.detect_spike(&current, &previous) {
            EscalationType::Spike
        } else if self.detect_gradual(history) {
            EscalationType::Gradual
        } else {
            EscalationType::None
        };

        let duration_seconds = match (timestamps.first(), timestamps.last()) {
            (Some(first), Some(last)) if timestamps.len() >= 2 => {
                (*last - *first).num_seconds()
            }
            _ => 0,
        };

        EscalationReport {
            escalation_type,
            delta_intensity: (current.intensity - previous.intensity).abs(),
            delta_vector: current.vector_shift(&previous),
            period: EscalationPeriod {
                turns: history.len(),
                duration_seconds,
            },
            editorial_tone: map_emotion_to_tone(&current).to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn detector() -> EscalationDetector {
        EscalationDetector::new(&ThresholdConfig::default())
    }

    #[test]
    fn test_analyze_neutral_text() {
        let analyzer = EmotionAnalyzer::new();
        let profile = analyzer.analyze("The meeting is at three.");
        assert_eq!(profile.intensity, 0.0);
        assert_eq!(profile.valence, 0.0);
        assert!(profile.active_labels().is_empty());
    }

    #[test]
    fn test_analyze_anger() {
        let analyzer = EmotionAnalyzer::new();
        let profile = analyzer.analyze("I am furious about this!");
        assert!(profile.weight(EmotionLabel::Anger) > 0.0);
        assert!(profile.intensity > 0.4);
        assert!(profile.valence < 0.0);
    }

    #[test]
    fn test_analyze_mixed_positive() {
        let analyzer = EmotionAnalyzer::new();
        let profile = analyzer.analyze("I'm so happy and excited");
        assert!(profile.weight(EmotionLabel::Joy) > 0.0);
        assert!(profile.weight(EmotionLabel::Anticipation) > 0.0);
        assert!(profile.valence > 0.0);
    }

    #[test]
    fn test_tone_mapping() {
        let analyzer = EmotionAnalyzer::new();
        assert_eq!(map_emotion_to_tone(&analyzer.analyze("I hate this")), "hostile");
        assert_eq!(
            map_emotion_to_tone(&analyzer.analyze("I'm terrified and anxious")),
            "fearful"
        );
        assert_eq!(
            map_emotion_to_tone(&analyzer.analyze("so lonely and depressed")),
            "mournful"
        );
        assert_eq!(map_emotion_to_tone(&analyzer.analyze("fine, thanks")), "neutral");
    }

    #[test]
    fn test_spike_on_intensity_delta() {
        let analyzer = EmotionAnalyzer::new();
        let calm = analyzer.analyze("Everything is normal.");
        let hot = analyzer.analyze("I am furious, full of rage!");
        assert!(detector().detect_spike(&hot, &calm));
        assert!(!detector().detect_spike(&calm, &calm));
    }

    #[test]
    fn test_spike_on_new_labels() {
        let analyzer = EmotionAnalyzer::new();
        let previous = analyzer.analyze("Nothing much happening.");
        let current = analyzer.analyze("I'm scared and so sad");
        // Two newly activated labels trigger a spike regardless of delta.
        assert!(detector().detect_spike(&current, &previous));
    }

    #[test]
    fn test_gradual_requires_three_turns() {
        let analyzer = EmotionAnalyzer::new();
        let profile = analyzer.analyze("I'm angry");
        assert!(!detector().detect_gradual(&[profile.clone(), profile.clone()]));
    }

    #[test]
    fn test_gradual_on_sustained_intensity() {
        let analyzer = EmotionAnalyzer::new();
        let history: Vec<_> = (0..3).map(|_| analyzer.analyze("I'm furious!")).collect();
        assert!(detector().detect_gradual(&history));
    }

    #[test]
    fn test_spike_outranks_gradual() {
        let analyzer = EmotionAnalyzer::new();
        let history = vec![
            analyzer.analyze("I'm furious!"),
            analyzer.analyze("I'm furious!"),
            analyzer.analyze("Calm again."),
            analyzer.analyze("I am terrified and full of rage!"),
        ];
        let now = Utc::now();
        let timestamps: Vec<_> = (0..4).map(|i| now + Duration::seconds(i * 30)).collect();
        let report = detector().detect(&history, &timestamps);
        assert_eq!(report.escalation_type, EscalationType::Spike);
        assert_eq!(report.period.turns, 4);
        assert_eq!(report.period.duration_seconds, 90);
    }

    #[test]
    fn test_no_escalation_report() {
        let analyzer = EmotionAnalyzer::new();
        let history = vec![analyzer.analyze("hello"), analyzer.analyze("hi there")];
        let report = detector().detect(&history, &[]);
        assert_eq!(report.escalation_type, EscalationType::None);
        assert_eq!(report.period.duration_seconds, 0);
        assert_eq!(report.editorial_tone, "neutral");
    }
}
