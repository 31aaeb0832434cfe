//! Claim verification client.
//!
//! Sends claims to an external fact-check endpoint and reports whether they
//! were corroborated. The pipeline treats a missing or failing verifier as
//! "unchecked", never as "false".

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::RequestConfig;
use crate::error::{ProviderError, ProviderResult};

/// Outcome of a fact-check request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    /// `Some(true)` corroborated, `Some(false)` contradicted, `None` the
    /// verifier could not decide.
    pub verified: Option<bool>,
    /// Corroborating source identifiers.
    pub sources: Vec<String>,
}

/// External claim verification.
#[async_trait]
pub trait ClaimVerifier: Send + Sync {
    /// Verify one claim.
    async fn verify(&self, claim: &str) -> ProviderResult<VerificationOutcome>;
}

#[derive(Debug, Serialize)]
struct VerifyRequest<'a> {
    claim: &'a str,
}

/// Client for an HTTP claim-verification endpoint.
#[derive(Clone)]
pub struct HttpClaimVerifier {
    client: Client,
    base_url: String,
    request_config: RequestConfig,
}

impl HttpClaimVerifier {
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

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn execute_request(&self, url: &str, claim: &str) -> ProviderResult<VerificationOutcome> {
        debug!(claim_len = claim.len(), "Calling claim verifier");

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(&VerifyRequest { claim })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout {
                        timeout_ms: self.request_config.timeout_ms,
                    }
                } else {
                    ProviderError::Http(e)
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        let outcome: VerificationOutcome =
            response
                .json()
                .await
                .map_err(|e| ProviderError::InvalidResponse {
                    message: format!("Failed to parse verification response: {}", e),
                })?;

        Ok(outcome)
    }
}

#[async_trait]
impl ClaimVerifier for HttpClaimVerifier {
    async fn verify(&self, claim: &str) -> ProviderResult<VerificationOutcome> {
        let url = format!("{}/v1/verify", self.base_url);

        let mut last_error = None;
        let mut retries = 0;

        while retries <= self.request_config.max_retries {
            if retries > 0 {
                let delay = Duration::from_millis(
                    self.request_config.retry_delay_ms * (2_u64.pow(retries - 1)),
                );
                warn!(
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying verification request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match self.execute_request(&url, claim).await {
                Ok(outcome) => {
                    let latency = start.elapsed();
                    info!(
                        verified = ?outcome.verified,
                        sources = outcome.sources.len(),
                        latency_ms = latency.as_millis(),
                        "Claim verification succeeded"
                    );
                    return Ok(outcome);
                }
                Err(e) => {
                    let latency = start.elapsed();
                    error!(
                        error = %e,
                        latency_ms = latency.as_millis(),
                        retry = retries,
                        "Claim verification failed"
                    );
                    last_error = Some(e);
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation_trims_trailing_slash() {
        let verifier = HttpClaimVerifier::new("http://localhost:9000/", RequestConfig::default());
        assert!(verifier.is_ok());
        assert_eq!(verifier.unwrap().base_url(), "http://localhost:9000");
    }

    #[test]
    fn test_outcome_deserialization() {
        let outcome: VerificationOutcome =
            serde_json::from_str(r#"{"verified": false, "sources": []}"#).unwrap();
        assert_eq!(outcome.verified, Some(false));
        assert!(outcome.sources.is_empty());

        let outcome: VerificationOutcome =
            serde_json::from_str(r#"{"verified": null, "sources": ["registry-a"]}"#).unwrap();
        assert_eq!(outcome.verified, None);
        assert_eq!(outcome.sources.len(), 1);
    }
}
