//! Anthropic messages API scorer.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use gradewise_core::traits::{parse_criterion_score, CriterionScore, CriterionScorer, ScoreRequest};
use gradewise_core::ScorerError;

use crate::http::{send_error, status_error};
use crate::prompt::{criterion_prompt, SYSTEM_PROMPT};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-haiku-4-5-20251001";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 300;

/// Scores criteria through the Anthropic `/v1/messages` API.
pub struct AnthropicScorer {
    name: String,
    api_key: String,
    base_url: String,
    model: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl AnthropicScorer {
    pub fn new(api_key: &str, base_url: Option<String>, model: Option<String>) -> Self {
        let timeout = Duration::from_secs(DEFAULT_TIMEOUT_SECS);
        let model = model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        Self {
            name: format!("anthropic/{model}"),
            api_key: api_key.to_string(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model,
            timeout,
            client: build_client(timeout),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self.client = build_client(timeout);
        self
    }
}

fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    temperature: f64,
    system: String,
    messages: Vec<AnthropicMessage>,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicError {
    error: AnthropicErrorBody,
}

#[derive(Deserialize)]
struct AnthropicErrorBody {
    message: String,
}

fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<AnthropicError>(body)
        .ok()
        .map(|e| e.error.message)
}

#[async_trait]
impl CriterionScorer for AnthropicScorer {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, request), fields(model = %self.model, criterion = %request.criterion.id))]
    async fn score(&self, request: &ScoreRequest) -> Result<CriterionScore, ScorerError> {
        let body = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: MAX_TOKENS,
            temperature: 0.0,
            system: SYSTEM_PROMPT.to_string(),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: criterion_prompt(request),
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error(e, self.timeout.as_millis() as u64))?;

        if !response.status().is_success() {
            return Err(status_error(response, error_message).await);
        }

        let api_response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| ScorerError::Malformed(format!("failed to parse response: {e}")))?;

        let text = api_response
            .content
            .into_iter()
            .find(|block| block.kind == "text")
            .and_then(|block| block.text)
            .ok_or_else(|| ScorerError::Malformed("response has no text block".into()))?;

        parse_criterion_score(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gradewise_core::model::Criterion;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> ScoreRequest {
        ScoreRequest {
            content: "The French Revolution began in 1789.".into(),
            assignment_title: "History quiz".into(),
            criterion: Criterion::new("accuracy", "Accuracy", None),
        }
    }

    #[tokio::test]
    async fn successful_score() {
        let server = MockServer::start().await;

        let response_body = serde_json::json!({
            "content": [{"type": "text", "text": "{\"score\": 5, \"reason\": \"Date is correct.\"}"}],
            "model": DEFAULT_MODEL,
            "usage": {"input_tokens": 50, "output_tokens": 20}
        });

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key"))
            .and(header("anthropic-version", API_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(&response_body))
            .mount(&server)
            .await;

        let scorer = AnthropicScorer::new("test-key", Some(server.uri()), None);
        let score = scorer.score(&request()).await.unwrap();
        assert_eq!(score.score, 5.0);
        assert_eq!(score.rationale, "Date is correct.");
    }

    #[tokio::test]
    async fn authentication_failure() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "type": "error",
                "error": {"type": "authentication_error", "message": "invalid x-api-key"}
            })))
            .mount(&server)
            .await;

        let scorer = AnthropicScorer::new("bad-key", Some(server.uri()), None);
        let err = scorer.score(&request()).await.unwrap_err();
        assert!(matches!(err, ScorerError::AuthenticationFailed(ref m) if m == "invalid x-api-key"));
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn rate_limiting() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let scorer = AnthropicScorer::new("test-key", Some(server.uri()), None);
        let err = scorer.score(&request()).await.unwrap_err();
        assert_eq!(err.retry_after_ms(), Some(7000));
        assert!(!err.is_permanent());
    }

    #[tokio::test]
    async fn slow_response_times_out() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let scorer = AnthropicScorer::new("test-key", Some(server.uri()), None)
            .with_timeout(Duration::from_millis(50));
        let err = scorer.score(&request()).await.unwrap_err();
        assert!(matches!(err, ScorerError::Timeout(50)));
    }
}
