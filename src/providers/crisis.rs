//! Crisis-module handoff and human notification clients.
//!
//! The crisis module receives a structured handoff when a conversation is
//! referred; the human notifier routes a short summary to an escalation
//! channel. Both are fire-and-forget from the pipeline's perspective: the
//! caller records success or failure in the audit log and moves on.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::RequestConfig;
use crate::error::{ProviderError, ProviderResult};

/// Structured referral handed to the crisis module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffPayload {
    /// Reference to the stored transcript, not the transcript itself.
    pub transcript_ref: String,
    /// Escalation tier at handoff time.
    pub severity: String,
    /// Identifier of the receiving module.
    pub tag: String,
    /// Non-clinical disclaimer shown to the receiving operator.
    pub disclaimer: String,
    /// Whether a live human takes over the conversation.
    pub live_handoff: bool,
}

/// Referral target for paused conversations.
#[async_trait]
pub trait CrisisModule: Send + Sync {
    /// Deliver a referral handoff.
    async fn notify(&self, payload: &HandoffPayload) -> ProviderResult<()>;
}

/// Outbound channel to a human escalation contact.
#[async_trait]
pub trait HumanNotifier: Send + Sync {
    /// Send a summary over the named channel.
    async fn send(&self, channel: &str, contact: &str, summary: &str) -> ProviderResult<()>;
}

#[derive(Debug, Serialize)]
struct NotifyRequest<'a> {
    channel: &'a str,
    contact: &'a str,
    summary: &'a str,
}

/// Shared retry-with-backoff POST used by both HTTP clients.
async fn post_with_retry<B: Serialize>(
    client: &Client,
    url: &str,
    body: &B,
    request_config: &RequestConfig,
    what: &str,
) -> ProviderResult<()> {
    let mut last_error = None;
    let mut retries = 0;

    while retries <= request_config.max_retries {
        if retries > 0 {
            let delay =
                Duration::from_millis(request_config.retry_delay_ms * (2_u64.pow(retries - 1)));
            warn!(
                target = what,
                retry = retries,
                delay_ms = delay.as_millis(),
                "Retrying delivery"
            );
            tokio::time::sleep(delay).await;
        }

        let start = Instant::now();
        let result = client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                info!(
                    target = what,
                    latency_ms = start.elapsed().as_millis(),
                    "Delivery succeeded"
                );
                return Ok(());
            }
            Ok(response) => {
                let status = response.status().as_u16();
                let message = response.text().await.unwrap_or_default();
                error!(target = what, status, retry = retries, "Delivery rejected");
                last_error = Some(ProviderError::Api { status, message });
                retries += 1;
            }
            Err(e) => {
                let err = if e.is_timeout() {
                    ProviderError::Timeout {
                        timeout_ms: request_config.timeout_ms,
                    }
                } else {
                    ProviderError::Http(e)
                };
                error!(target = what, error = %err, retry = retries, "Delivery failed");
                last_error = Some(err);
                retries += 1;
            }
        }
    }

    Err(ProviderError::Unavailable {
        message: last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "Unknown error".to_string()),
        retries,
    })
}

/// HTTP crisis-module client.
#[derive(Clone)]
pub struct HttpCrisisModule {
    client: Client,
    base_url: String,
    request_config: RequestConfig,
}

impl HttpCrisisModule {
    pub fn new(base_url: &str, request_config: RequestConfig) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(ProviderError::Http)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            request_config,
        })
    }
}

#[async_trait]
impl CrisisModule for HttpCrisisModule {
    async fn notify(&self, payload: &HandoffPayload) -> ProviderResult<()> {
        let url = format!("{}/v1/handoff", self.base_url);
        post_with_retry(&self.client, &url, payload, &self.request_config, "crisis_module").await
    }
}

/// HTTP human-notifier client.
#[derive(Clone)]
pub struct HttpHumanNotifier {
    client: Client,
    base_url: String,
    request_config: RequestConfig,
}

impl HttpHumanNotifier {
    pub fn new(base_url: &str, request_config: RequestConfig) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(ProviderError::Http)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            request_config,
        })
    }
}

#[async_trait]
impl HumanNotifier for HttpHumanNotifier {
    async fn send(&self, channel: &str, contact: &str, summary: &str) -> ProviderResult<()> {
        let url = format!("{}/v1/notify", self.base_url);
        let body = NotifyRequest {
            channel,
            contact,
            summary,
        };
        post_with_retry(&self.client, &url, &body, &self.request_config, "human_notifier").await
    }
}
