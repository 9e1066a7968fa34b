//! Client for the external text-completion capability.
//!
//! One outbound call: given a prompt and a token budget, return generated
//! text or fail. The call is single-shot; retry policy lives with the
//! caller's requeue mechanism.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::ProviderError;

pub const DEFAULT_COMPLETION_URL: &str =
    "https://api.openai.com/v1/engines/davinci-codex/completions";

/// Token budget applied when the resource spec does not set one.
pub const DEFAULT_MAX_TOKENS: i64 = 64;

/// Instructional header prepended to every user prompt.
const PROMPT_PREFIX: &str =
    "# Below is a series of YAML files used to create resources in a Kubernetes cluster\n";

/// Sequences at which the provider stops generating.
const STOP_SEQUENCES: [&str; 3] = ["#\n#\n", "\n\n---\n\n", "\n\n"];

const TEMPERATURE: f64 = 0.12;
const TOP_P: f64 = 1.0;

/// Generation seam used by the reconcile engine.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Generate a completion for `prompt` within `max_tokens`.
    async fn complete(&self, prompt: &str, max_tokens: i64) -> Result<String, ProviderError>;
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    prompt: String,
    max_tokens: i64,
    stop: &'a [&'a str],
    temperature: f64,
    top_p: f64,
    frequency_penalty: f64,
    presence_penalty: f64,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    text: String,
}

/// HTTP client for the completion endpoint. The bearer credential is read
/// once at startup and held for the process lifetime.
#[derive(Debug)]
pub struct CompletionClient {
    http: reqwest::Client,
    endpoint: Url,
    api_key: String,
}

impl CompletionClient {
    /// Build a client with an explicit request timeout.
    pub fn new(
        endpoint: &str,
        api_key: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| ProviderError::invalid_endpoint(endpoint, e.to_string()))?;
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(ProviderError::Request)?;
        Ok(Self {
            http,
            endpoint,
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl CompletionBackend for CompletionClient {
    async fn complete(&self, prompt: &str, max_tokens: i64) -> Result<String, ProviderError> {
        let body = CompletionRequest {
            prompt: format!("{PROMPT_PREFIX}{prompt}"),
            max_tokens,
            stop: &STOP_SEQUENCES,
            temperature: TEMPERATURE,
            top_p: TOP_P,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        };

        debug!(max_tokens, "requesting completion");
        let resp = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: CompletionResponse = resp.json().await?;
        let first = parsed.choices.into_iter().next().ok_or(ProviderError::NoChoices)?;
        Ok(first.text)
    }
}
