//! Local Ollama backend adapter (`--local`, spec §6).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{OrganizerError, Result};
use crate::llm::backend::LlmBackend;

pub struct OllamaBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaBackend {
    pub fn new(base_url: String, model: Option<String>, timeout: std::time::Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url,
            model: model.unwrap_or_else(|| "llama3".to_string()),
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[allow(dead_code)]
    models: Vec<serde_json::Value>,
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    async fn send(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url.trim_end_matches('/'));
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| OrganizerError::BackendUnavailable(format!("ollama: {e}")))?;

        if !resp.status().is_success() {
            return Err(OrganizerError::BackendUnavailable(format!(
                "ollama returned status {}",
                resp.status()
            )));
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| OrganizerError::Schema(format!("ollama response decode error: {e}")))?;
        Ok(parsed.response)
    }

    async fn health_check(&self) -> Result<()> {
        let url = format!("{}/api/tags", self.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| OrganizerError::BackendUnavailable(format!("ollama unreachable: {e}")))?;
        if !resp.status().is_success() {
            return Err(OrganizerError::BackendUnavailable(format!(
                "ollama health check returned {}",
                resp.status()
            )));
        }
        let _: TagsResponse = resp
            .json()
            .await
            .map_err(|e| OrganizerError::BackendUnavailable(format!("ollama health check decode error: {e}")))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "ollama"
    }
}
