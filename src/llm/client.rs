// src/llm/client.rs

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Text generation used for memory consolidation. `generate` may fail on
/// transport or API errors; callers own the retry policy.
#[async_trait]
pub trait SummarizationClient: Send + Sync {
    async fn generate(&self, model_id: &str, prompt: &str) -> Result<String>;
}

/// Client for the Gemini `generateContent` REST endpoint.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    api_base: String,
    timeout: Option<Duration>,
}

impl GeminiClient {
    pub const DEFAULT_API_BASE: &'static str = "https://generativelanguage.googleapis.com";

    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            api_base: Self::DEFAULT_API_BASE.to_string(),
            timeout: None,
        }
    }

    pub fn with_base_url(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn endpoint(&self, model_id: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base.trim_end_matches('/'),
            model_id
        )
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: CandidateContent,
}

#[derive(Deserialize, Default)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

/// Concatenated text of the first candidate, empty when there is none.
fn candidate_text(response: GenerateResponse) -> String {
    response
        .candidates
        .into_iter()
        .next()
        .map(|candidate| {
            candidate
                .content
                .parts
                .into_iter()
                .map(|part| part.text)
                .collect::<String>()
        })
        .unwrap_or_default()
}

#[async_trait]
impl SummarizationClient for GeminiClient {
    async fn generate(&self, model_id: &str, prompt: &str) -> Result<String> {
        let payload = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
        };

        let mut request = self
            .client
            .post(self.endpoint(model_id))
            .header("x-goog-api-key", &self.api_key)
            .json(&payload);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .context("failed to send generateContent request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            anyhow::bail!("Gemini API error {status}: {body}");
        }

        let response: GenerateResponse = response
            .json()
            .await
            .context("failed to parse generateContent response")?;

        let text = candidate_text(response);
        if text.is_empty() {
            anyhow::bail!("Gemini returned no candidate text");
        }
        Ok(text)
    }
}
