/// LLM Client: the only path from the outreach service to the Anthropic
/// Messages API. Used for CV structuring, expertise keyword extraction,
/// match analysis, and email and cover-letter drafting.
///
/// Each stage holds its own clone with the sampling temperature it needs;
/// clones share the underlying HTTP connection pool.
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub mod prompts;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// The model used for all LLM calls; recorded on every generated draft.
pub const MODEL: &str = "claude-sonnet-4-5";
const MAX_TOKENS: u32 = 4096;
const MAX_ATTEMPTS: u32 = 3;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
/// Temperature used unless a stage asks for another one.
pub const DEFAULT_TEMPERATURE: f64 = 0.3;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Gave up after {attempts} attempts")]
    Exhausted { attempts: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    system: &'a str,
    messages: [Message<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

impl MessagesResponse {
    /// Concatenates every text block; tool and other block types are ignored.
    fn into_text(self) -> Option<String> {
        let text: String = self
            .content
            .into_iter()
            .filter(|b| b.block_type == "text")
            .filter_map(|b| b.text)
            .collect();
        let trimmed = text.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Result of a single HTTP attempt.
enum Attempt {
    Done(MessagesResponse),
    Retry(LlmError),
    Fail(LlmError),
}

#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
    temperature: f64,
}

impl LlmClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    /// Returns a clone that samples at `temperature` (clamped to 0.0..=1.0).
    pub fn with_temperature(&self, temperature: f64) -> Self {
        Self {
            temperature: temperature.clamp(0.0, 1.0),
            ..self.clone()
        }
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Sends one user message and returns the model's text.
    /// Transport failures, 429 and 5xx are retried with exponential backoff;
    /// other 4xx responses fail immediately.
    async fn complete(&self, prompt: &str, system: &str) -> Result<String, LlmError> {
        let request = MessagesRequest {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            temperature: self.temperature,
            system,
            messages: [Message {
                role: "user",
                content: prompt,
            }],
        };

        let mut last_error = None;
        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                let delay = backoff(attempt);
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "LLM call failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }

            match self.attempt(&request).await {
                Attempt::Done(response) => {
                    debug!(
                        input_tokens = response.usage.input_tokens,
                        output_tokens = response.usage.output_tokens,
                        temperature = self.temperature,
                        "LLM call succeeded"
                    );
                    return response.into_text().ok_or(LlmError::EmptyContent);
                }
                Attempt::Retry(e) => last_error = Some(e),
                Attempt::Fail(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or(LlmError::Exhausted {
            attempts: MAX_ATTEMPTS,
        }))
    }

    async fn attempt(&self, request: &MessagesRequest<'_>) -> Attempt {
        let response = match self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(request)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return Attempt::Retry(LlmError::Http(e)),
        };

        let status = response.status();
        if status.is_success() {
            return match response.json::<MessagesResponse>().await {
                Ok(body) => Attempt::Done(body),
                Err(e) => Attempt::Fail(LlmError::Http(e)),
            };
        }

        let body = response.text().await.unwrap_or_default();
        let error = LlmError::Api {
            status: status.as_u16(),
            message: api_error_message(body),
        };
        if is_retryable(status) {
            warn!("LLM API returned {status}");
            Attempt::Retry(error)
        } else {
            Attempt::Fail(error)
        }
    }

    /// Calls the LLM and deserializes its reply as JSON.
    /// The prompt must instruct the model to return valid JSON.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        prompt: &str,
        system: &str,
    ) -> Result<T, LlmError> {
        let text = self.complete(prompt, system).await?;
        serde_json::from_str(json_payload(&text)).map_err(LlmError::Parse)
    }

    /// Calls the LLM and returns the trimmed plain-text reply.
    pub async fn call_text(&self, prompt: &str, system: &str) -> Result<String, LlmError> {
        self.complete(prompt, system).await
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// 1s, 2s, 4s, ...
fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(1000 << attempt.saturating_sub(1).min(6))
}

/// Pulls `error.message` out of an API error body, or returns the raw body.
fn api_error_message(body: String) -> String {
    serde_json::from_str::<ApiErrorEnvelope>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body)
}

/// Strips markdown code fences (```json or bare ```) around a JSON reply.
fn json_payload(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim_end()
        .strip_suffix("```")
        .unwrap_or(rest)
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_payload_with_json_tag() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(json_payload(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_json_payload_without_tag_or_closing_fence() {
        assert_eq!(json_payload("```\n[\"a\"]\n```"), "[\"a\"]");
        assert_eq!(json_payload("```json\n[\"a\"]"), "[\"a\"]");
        assert_eq!(json_payload("  {\"k\": 1}  "), "{\"k\": 1}");
    }

    #[test]
    fn test_response_text_joins_text_blocks() {
        let response: MessagesResponse = serde_json::from_str(
            r#"{
                "content": [
                    {"type": "tool_use", "text": null},
                    {"type": "text", "text": "Dear Professor"},
                    {"type": "text", "text": " Sen,"}
                ],
                "usage": {"input_tokens": 10, "output_tokens": 3}
            }"#,
        )
        .unwrap();
        assert_eq!(response.into_text().as_deref(), Some("Dear Professor Sen,"));
    }

    #[test]
    fn test_blank_response_has_no_text() {
        let response: MessagesResponse = serde_json::from_str(
            r#"{"content": [{"type": "text", "text": "  "}], "usage": {"input_tokens": 1, "output_tokens": 0}}"#,
        )
        .unwrap();
        assert!(response.into_text().is_none());
    }

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff(1), Duration::from_secs(1));
        assert_eq!(backoff(2), Duration::from_secs(2));
        assert_eq!(backoff(3), Duration::from_secs(4));
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(StatusCode::BAD_GATEWAY));
        assert!(!is_retryable(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn test_api_error_message_prefers_envelope() {
        let body = r#"{"type":"error","error":{"type":"invalid_request_error","message":"bad model"}}"#;
        assert_eq!(api_error_message(body.to_string()), "bad model");
        assert_eq!(api_error_message("gateway down".to_string()), "gateway down");
    }

    #[test]
    fn test_with_temperature_clamps() {
        let llm = LlmClient::new("key".to_string());
        assert_eq!(llm.temperature(), DEFAULT_TEMPERATURE);
        assert_eq!(llm.with_temperature(1.7).temperature(), 1.0);
        assert_eq!(llm.with_temperature(0.1).temperature(), 0.1);
    }
}
