//! OpenAI backend adapter (`--openai`, spec §6).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{OrganizerError, Result};
use crate::llm::backend::LlmBackend;

const ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

pub struct OpenAiBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiBackend {
    pub fn new(api_key: String, model: Option<String>, timeout: std::time::Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key,
            model: model.unwrap_or_else(|| "gpt-4o-mini".to_string()),
        }
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    async fn send(&self, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let resp = self
            .client
            .post(ENDPOINT)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| OrganizerError::BackendUnavailable(format!("openai: {e}")))?;

        if !resp.status().is_success() {
            return Err(OrganizerError::BackendUnavailable(format!(
                "openai returned status {}",
                resp.status()
            )));
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| OrganizerError::Schema(format!("openai response decode error: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| OrganizerError::Schema("openai response had no choices".into()))
    }

    async fn health_check(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(OrganizerError::BackendUnavailable(
                "OPENAI_API_KEY is not set".into(),
            ));
        }
        self.send("reply with the single word: ok").await.map(|_| ())
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
