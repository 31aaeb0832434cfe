use std::env;
use std::path::PathBuf;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub thresholds: ThresholdConfig,
    pub providers: ProviderConfig,
    pub channels: ChannelConfig,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration for external collaborators
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Detector and policy thresholds.
///
/// These are tuning defaults, not contracts; every value can be overridden
/// through the environment.
#[derive(Debug, Clone)]
pub struct ThresholdConfig {
    /// Intensity delta that counts as an emotional spike.
    pub spike_delta: f64,
    /// Sum of the last three intensities that counts as gradual escalation.
    pub gradual_intensity: f64,
    /// Semantic drift score above which drift is flagged.
    pub drift: f64,
    /// Reinforcement index at which a loop is declared.
    pub loop_index: f64,
    /// Cosine similarity above which an agent turn mirrors the user.
    pub mirror_similarity: f64,
    /// Agent confidence required for a mirroring flag.
    pub mirror_confidence: f64,
    /// Emotional intensity above which a referral is warranted.
    pub referral_intensity: f64,
    /// Turns the window-based detectors look back over.
    pub window_size: usize,
    /// Consecutive calm turns required before de-escalating one tier.
    pub calm_turns_to_deescalate: u32,
}

/// External collaborator endpoints. Empty URL disables the provider and the
/// detectors run heuristic-only.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub verifier_url: Option<String>,
    pub crisis_url: Option<String>,
    pub notifier_url: Option<String>,
    pub crisis_module_id: String,
    pub embedding_dims: usize,
}

/// Escalation channel routing, keyed by urgency.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub high: String,
    pub moderate: String,
    pub normal: String,
    /// Channels that must obtain user consent before routing a referral.
    pub consent_required: Vec<String>,
    /// Fallback contact when no regional contact is configured.
    pub default_contact: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/sentinel.db".to_string()),
            ),
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: env_parse("REQUEST_TIMEOUT_MS", 5000),
            max_retries: env_parse("MAX_RETRIES", 1),
            retry_delay_ms: env_parse("RETRY_DELAY_MS", 500),
        };

        let thresholds = ThresholdConfig {
            spike_delta: env_parse("THRESHOLD_SPIKE_DELTA", 0.4),
            gradual_intensity: env_parse("THRESHOLD_GRADUAL_INTENSITY", 0.6),
            drift: env_parse("THRESHOLD_DRIFT", 0.4),
            loop_index: env_parse("THRESHOLD_LOOP_INDEX", 2.0),
            mirror_similarity: env_parse("THRESHOLD_MIRROR_SIMILARITY", 0.85),
            mirror_confidence: env_parse("THRESHOLD_MIRROR_CONFIDENCE", 0.7),
            referral_intensity: env_parse("THRESHOLD_REFERRAL_INTENSITY", 0.5),
            window_size: env_parse("DETECTOR_WINDOW_SIZE", 5),
            calm_turns_to_deescalate: env_parse("CALM_TURNS_TO_DEESCALATE", 3),
        };

        let providers = ProviderConfig {
            verifier_url: env::var("VERIFIER_URL").ok().filter(|s| !s.is_empty()),
            crisis_url: env::var("CRISIS_URL").ok().filter(|s| !s.is_empty()),
            notifier_url: env::var("NOTIFIER_URL").ok().filter(|s| !s.is_empty()),
            crisis_module_id: env::var("CRISIS_MODULE_ID")
                .unwrap_or_else(|_| "local-support-relay".to_string()),
            embedding_dims: env_parse("EMBEDDING_DIMS", 128),
        };

        let channels = ChannelConfig {
            high: env::var("CHANNEL_HIGH").unwrap_or_else(|_| "secure_sms_gateway".to_string()),
            moderate: env::var("CHANNEL_MODERATE").unwrap_or_else(|_| "staff_email".to_string()),
            normal: env::var("CHANNEL_NORMAL").unwrap_or_else(|_| "log_only".to_string()),
            consent_required: env::var("CHANNELS_CONSENT_REQUIRED")
                .map(|s| {
                    s.split(',')
                        .map(|c| c.trim().to_string())
                        .filter(|c| !c.is_empty())
                        .collect()
                })
                .unwrap_or_else(|_| vec!["secure_sms_gateway".to_string()]),
            default_contact: env::var("DEFAULT_CONTACT")
                .unwrap_or_else(|_| "Platform Safeguard Desk".to_string()),
        };

        Ok(Config {
            database,
            logging,
            request,
            thresholds,
            providers,
            channels,
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            max_retries: 1,
            retry_delay_ms: 500,
        }
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            spike_delta: 0.4,
            gradual_intensity: 0.6,
            drift: 0.4,
            loop_index: 2.0,
            mirror_similarity: 0.85,
            mirror_confidence: 0.7,
            referral_intensity: 0.5,
            window_size: 5,
            calm_turns_to_deescalate: 3,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            verifier_url: None,
            crisis_url: None,
            notifier_url: None,
            crisis_module_id: "local-support-relay".to_string(),
            embedding_dims: 128,
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            high: "secure_sms_gateway".to_string(),
            moderate: "staff_email".to_string(),
            normal: "log_only".to_string(),
            consent_required: vec!["secure_sms_gateway".to_string()],
            default_contact: "Platform Safeguard Desk".to_string(),
        }
    }
}

impl ChannelConfig {
    /// Channel for a given urgency level.
    pub fn for_urgency(&self, urgency: crate::policy::Urgency) -> &str {
        match urgency {
            crate::policy::Urgency::High => &self.high,
            crate::policy::Urgency::Moderate => &self.moderate,
            crate::policy::Urgency::Normal => &self.normal,
        }
    }

    /// Whether the channel needs explicit consent before routing.
    pub fn requires_consent(&self, channel: &str) -> bool {
        self.consent_required.iter().any(|c| c == channel)
    }
}
