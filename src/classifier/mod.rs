//! Review sentiment classifier backed by the Anthropic Messages API.
//!
//! One review per request, deterministic decoding (temperature 0). A
//! failed classification never aborts the batch: any transport, parse,
//! or validation error is logged and converted into the fixed neutral
//! fallback judgment.

use crate::models::{Classification, Judgment, Sentiment};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Instruction prompt sent with every review. The review text is
/// appended at the placeholder by `build_prompt`.
const CLASSIFY_PROMPT: &str = r#"Analyze this app review and provide a JSON response with the following structure:
{
    "sentiment": "positive/negative/neutral",
    "topics": ["topic1", "topic2", ...],
    "issues": ["issue1", "issue2", ...],
    "praises": ["praise1", "praise2", ...]
}

Review text: {review_text}

Respond ONLY with the JSON object, no other text."#;

/// Classifier seam. The aggregator only depends on this trait, so
/// tests can substitute a deterministic stub.
#[async_trait]
pub trait ReviewClassifier: Send + Sync {
    /// Classify one review's text. Infallible by design; failures
    /// surface as `Classification::Fallback`.
    async fn classify(&self, review_text: &str) -> Classification;
}

/// Configuration for the Anthropic classifier.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// API key for the Anthropic API. Must be non-empty.
    pub api_key: String,
    /// Model name (e.g. "claude-3-7-sonnet-20250219").
    pub model: String,
    /// Base URL of the API.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout_seconds: u64,
    /// Response token cap.
    pub max_tokens: u32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "claude-3-7-sonnet-20250219".to_string(),
            base_url: ANTHROPIC_API_BASE.to_string(),
            timeout_seconds: 60,
            max_tokens: 1000,
        }
    }
}

/// Internal error while talking to or interpreting the model. Never
/// escapes `classify`; folded into the fallback judgment instead.
#[derive(Debug, Error)]
enum ClassifyError {
    #[error("request timed out")]
    Timeout,

    #[error("cannot connect to the Anthropic API: {0}")]
    Connection(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("invalid model response: {0}")]
    InvalidResponse(String),
}

/// Anthropic Messages API client implementing `ReviewClassifier`.
pub struct AnthropicClassifier {
    config: ClassifierConfig,
    http_client: reqwest::Client,
}

impl AnthropicClassifier {
    /// Create a classifier. Fails when no API key was provided.
    pub fn new(config: ClassifierConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            anyhow::bail!("Anthropic API key is not set (use --api-key or ANTHROPIC_API_KEY)");
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Send one Messages API request and return the raw response text.
    async fn send_prompt(&self, prompt: &str) -> Result<String, ClassifyError> {
        let url = format!("{}/v1/messages", self.config.base_url);

        let request = MessagesRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            temperature: 0.0,
            messages: vec![RequestMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let response = self
            .http_client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClassifyError::Timeout
                } else {
                    ClassifyError::Connection(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifyError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let messages_response: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ClassifyError::InvalidResponse(e.to_string()))?;

        let text = messages_response
            .content
            .into_iter()
            .find(|block| block.block_type == "text")
            .map(|block| block.text)
            .ok_or_else(|| {
                ClassifyError::InvalidResponse("no text block in response".to_string())
            })?;

        Ok(text)
    }
}

#[async_trait]
impl ReviewClassifier for AnthropicClassifier {
    async fn classify(&self, review_text: &str) -> Classification {
        let prompt = build_prompt(review_text);

        let result = match self.send_prompt(&prompt).await {
            Ok(response_text) => parse_judgment(&response_text),
            Err(e) => Err(e),
        };

        match result {
            Ok(judgment) => {
                debug!("Review classified as {}", judgment.sentiment);
                Classification::Classified(judgment)
            }
            Err(e) => {
                warn!("Classification failed, using neutral fallback: {}", e);
                Classification::Fallback {
                    judgment: Judgment::fallback(),
                    reason: e.to_string(),
                }
            }
        }
    }
}

/// Substitute the review text into the instruction prompt.
fn build_prompt(review_text: &str) -> String {
    CLASSIFY_PROMPT.replace("{review_text}", review_text)
}

/// Parse and validate a judgment from the raw model response.
///
/// Takes the substring between the first `{` and the last `}` so that
/// stray prose around the JSON object is tolerated. Requires all four
/// keys; `mixed` sentiment normalizes to neutral.
fn parse_judgment(response_text: &str) -> Result<Judgment, ClassifyError> {
    let start = response_text
        .find('{')
        .ok_or_else(|| ClassifyError::InvalidResponse("no JSON object found".to_string()))?;
    let end = response_text
        .rfind('}')
        .ok_or_else(|| ClassifyError::InvalidResponse("no JSON object found".to_string()))?;
    if end < start {
        return Err(ClassifyError::InvalidResponse(
            "no JSON object found".to_string(),
        ));
    }

    let json: Value = serde_json::from_str(&response_text[start..=end])
        .map_err(|e| ClassifyError::InvalidResponse(format!("malformed JSON: {}", e)))?;

    for key in ["sentiment", "topics", "issues", "praises"] {
        if json.get(key).is_none() {
            return Err(ClassifyError::InvalidResponse(format!(
                "missing required key: {}",
                key
            )));
        }
    }

    let raw_sentiment = json["sentiment"].as_str().ok_or_else(|| {
        ClassifyError::InvalidResponse("sentiment is not a string".to_string())
    })?;
    let sentiment = Sentiment::parse(raw_sentiment).ok_or_else(|| {
        ClassifyError::InvalidResponse(format!("invalid sentiment value: {}", raw_sentiment))
    })?;

    Ok(Judgment {
        sentiment,
        topics: string_list(&json["topics"]),
        issues: string_list(&json["issues"]),
        praises: string_list(&json["praises"]),
    })
}

/// Collect the string elements of a JSON array, dropping anything else.
fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

// Anthropic Messages API types

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<RequestMessage>,
}

#[derive(Debug, Serialize)]
struct RequestMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_prompt_includes_review() {
        let prompt = build_prompt("Crashes on startup");
        assert!(prompt.contains("Review text: Crashes on startup"));
        assert!(prompt.contains("\"sentiment\""));
        assert!(!prompt.contains("{review_text}"));
    }

    #[test]
    fn test_parse_judgment_valid() {
        let response = r#"{"sentiment": "positive", "topics": ["gameplay"], "issues": [], "praises": ["fun", "graphics"]}"#;
        let judgment = parse_judgment(response).unwrap();
        assert_eq!(judgment.sentiment, Sentiment::Positive);
        assert_eq!(judgment.topics, vec!["gameplay"]);
        assert!(judgment.issues.is_empty());
        assert_eq!(judgment.praises, vec!["fun", "graphics"]);
    }

    #[test]
    fn test_parse_judgment_tolerates_surrounding_prose() {
        let response = r#"Here is the analysis:
{"sentiment": "negative", "topics": ["stability"], "issues": ["crashes"], "praises": []}
Hope that helps!"#;
        let judgment = parse_judgment(response).unwrap();
        assert_eq!(judgment.sentiment, Sentiment::Negative);
        assert_eq!(judgment.issues, vec!["crashes"]);
    }

    #[test]
    fn test_parse_judgment_normalizes_mixed() {
        let response =
            r#"{"sentiment": "mixed", "topics": [], "issues": [], "praises": []}"#;
        let judgment = parse_judgment(response).unwrap();
        assert_eq!(judgment.sentiment, Sentiment::Neutral);
    }

    #[test]
    fn test_parse_judgment_missing_key() {
        let response = r#"{"sentiment": "positive", "topics": [], "issues": []}"#;
        assert!(parse_judgment(response).is_err());
    }

    #[test]
    fn test_parse_judgment_invalid_sentiment() {
        let response =
            r#"{"sentiment": "ecstatic", "topics": [], "issues": [], "praises": []}"#;
        assert!(parse_judgment(response).is_err());
    }

    #[test]
    fn test_parse_judgment_no_json() {
        assert!(parse_judgment("I could not analyze this review.").is_err());
        assert!(parse_judgment("").is_err());
        assert!(parse_judgment("} {").is_err());
    }

    #[test]
    fn test_new_requires_api_key() {
        let config = ClassifierConfig::default();
        assert!(AnthropicClassifier::new(config).is_err());

        let config = ClassifierConfig {
            api_key: "sk-test".to_string(),
            ..ClassifierConfig::default()
        };
        assert!(AnthropicClassifier::new(config).is_ok());
    }
}
