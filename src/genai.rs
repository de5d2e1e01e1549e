//! Minimal client for the Gemini `generateContent` API.
//!
//! Shared by the evidence lookup (search-grounded) and the narrative
//! synthesizer. Transient failures (transport errors, 429, 5xx) are retried
//! with a linear backoff; everything else is returned to the caller.

use std::time::Duration;

use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ModelsConfig;

#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status}: {body}")]
    Api { status: u16, body: String },
    #[error("failed to parse response: {0}")]
    Parse(String),
    #[error("collaborator not configured: {0}")]
    NotConfigured(String),
}

impl CollaboratorError {
    fn is_transient(&self) -> bool {
        match self {
            CollaboratorError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            CollaboratorError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

const RETRY_BACKOFF: Duration = Duration::from_millis(500);

pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    max_retries: u32,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String, cfg: &ModelsConfig) -> Result<Self, CollaboratorError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            model,
            temperature: cfg.temperature,
            max_tokens: cfg.max_output_tokens,
            max_retries: cfg.max_retries,
        })
    }

    /// Build a client with the API key taken from `cfg.api_key_env`.
    pub fn from_env(model: &str, cfg: &ModelsConfig) -> Result<Self, CollaboratorError> {
        let api_key = std::env::var(&cfg.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                CollaboratorError::NotConfigured(format!("environment variable {} is not set", cfg.api_key_env))
            })?;
        Self::new(api_key, model.to_string(), cfg)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Request body for `generateContent`; `search` attaches the Google
    /// Search grounding tool.
    pub fn build_request_body(prompt: &str, search: bool, temperature: f32, max_tokens: u32) -> serde_json::Value {
        let mut body = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }],
            }],
            "generationConfig": {
                "temperature": temperature,
                "maxOutputTokens": max_tokens,
            },
        });

        if search {
            body["tools"] = json!([{ "google_search": {} }]);
        }

        body
    }

    /// Concatenate the text parts of the first candidate.
    pub fn extract_text(resp: &serde_json::Value) -> Result<String, CollaboratorError> {
        let parts = resp["candidates"][0]["content"]["parts"]
            .as_array()
            .ok_or_else(|| CollaboratorError::Parse("missing candidates[0].content.parts".into()))?;

        let text: String = parts
            .iter()
            .filter_map(|p| p["text"].as_str())
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            return Err(CollaboratorError::Parse("response contained no text".into()));
        }
        Ok(text.trim().to_string())
    }

    /// Send `prompt` and return the model's text, retrying transient failures.
    pub async fn generate(&self, prompt: &str, search: bool) -> Result<String, CollaboratorError> {
        let body = Self::build_request_body(prompt, search, self.temperature, self.max_tokens);
        let mut attempt = 0;
        loop {
            match self.send_once(&body).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(model = %self.model, attempt, error = %e, "Transient model error, retrying");
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once(&self, body: &serde_json::Value) -> Result<String, CollaboratorError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        debug!(model = %self.model, "Gemini request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Api { status, body });
        }

        let resp: serde_json::Value = response.json().await?;
        Self::extract_text(&resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_structure() {
        let body = GeminiClient::build_request_body("Why the spike?", false, 0.1, 4096);

        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[0]["parts"][0]["text"], "Why the spike?");

        let temp = body["generationConfig"]["temperature"].as_f64().unwrap();
        assert!((temp - 0.1).abs() < 1e-6, "temperature should be ~0.1, got {temp}");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 4096);
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_request_body_with_search_tool() {
        let body = GeminiClient::build_request_body("q", true, 0.5, 2048);
        assert!(body["tools"][0].get("google_search").is_some());
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let resp = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "A dance " }, { "text": "challenge." }] }
            }]
        });
        assert_eq!(GeminiClient::extract_text(&resp).unwrap(), "A dance challenge.");
    }

    #[test]
    fn test_extract_text_missing_candidates() {
        let resp = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        assert!(matches!(
            GeminiClient::extract_text(&resp),
            Err(CollaboratorError::Parse(_))
        ));
    }

    #[test]
    fn test_transient_classification() {
        assert!(CollaboratorError::Api { status: 503, body: String::new() }.is_transient());
        assert!(CollaboratorError::Api { status: 429, body: String::new() }.is_transient());
        assert!(!CollaboratorError::Api { status: 400, body: String::new() }.is_transient());
        assert!(!CollaboratorError::NotConfigured("x".into()).is_transient());
    }

    #[test]
    fn test_from_env_requires_key() {
        let cfg = ModelsConfig {
            api_key_env: "TRACKSPIKE_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..ModelsConfig::default()
        };
        assert!(matches!(
            GeminiClient::from_env("gemini-2.5-pro", &cfg),
            Err(CollaboratorError::NotConfigured(_))
        ));
    }
}
