//! Transcript storage.
//!
//! Referrals carry a reference to the stored transcript, never the raw
//! turns. The file-backed store writes one JSON document per conversation
//! and returns its path as the reference.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::info;

use crate::conversation::Turn;
use crate::error::{ProviderError, ProviderResult};

/// Durable transcript storage for referrals.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Persist the turns and return an opaque transcript reference.
    async fn save(&self, conversation_id: &str, turns: &[Turn]) -> ProviderResult<String>;
}

/// Stores transcripts as JSON files under a directory.
#[derive(Debug, Clone)]
pub struct FileTranscriptStore {
    dir: PathBuf,
}

impl FileTranscriptStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl TranscriptStore for FileTranscriptStore {
    async fn save(&self, conversation_id: &str, turns: &[Turn]) -> ProviderResult<String> {
        let sanitized: String = conversation_id
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        let path = self.dir.join(format!("{}.json", sanitized));

        let body = serde_json::to_vec_pretty(turns).map_err(|e| ProviderError::InvalidResponse {
            message: format!("Failed to serialize transcript: {}", e),
        })?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| ProviderError::Unavailable {
                message: format!("Failed to create transcript directory: {}", e),
                retries: 0,
            })?;
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| ProviderError::Unavailable {
                message: format!("Failed to write transcript: {}", e),
                retries: 0,
            })?;

        let reference = path.to_string_lossy().to_string();
        info!(conversation_id = %conversation_id, transcript_ref = %reference, "Transcript saved");
        Ok(reference)
    }
}
