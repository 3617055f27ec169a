//! Google Gemini backend adapter (`--gemini`, spec §6).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{OrganizerError, Result};
use crate::llm::backend::LlmBackend;

pub struct GeminiBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiBackend {
    pub fn new(api_key: String, model: Option<String>, timeout: std::time::Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key,
            model: model.unwrap_or_else(|| "gemini-1.5-flash".to_string()),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        )
    }
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Deserialize)]
struct ResponseContent {
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: String,
}

#[async_trait]
impl LlmBackend for GeminiBackend {
    async fn send(&self, prompt: &str) -> Result<String> {
        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
        };

        let resp = self
            .client
            .post(self.endpoint())
            .json(&body)
            .send()
            .await
            .map_err(|e| OrganizerError::BackendUnavailable(format!("gemini: {e}")))?;

        if !resp.status().is_success() {
            return Err(OrganizerError::BackendUnavailable(format!(
                "gemini returned status {}",
                resp.status()
            )));
        }

        let parsed: GenerateContentResponse = resp
            .json()
            .await
            .map_err(|e| OrganizerError::Schema(format!("gemini response decode error: {e}")))?;

        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| OrganizerError::Schema("gemini response had no candidates".into()))
    }

    async fn health_check(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(OrganizerError::BackendUnavailable(
                "GOOGLE_API_KEY is not set".into(),
            ));
        }
        // Gemini has no dedicated health endpoint; a minimal prompt
        // confirms both connectivity and key validity.
        self.send("reply with the single word: ok").await.map(|_| ())
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}
