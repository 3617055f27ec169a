//! The generic contract every concrete LLM backend implements (spec §4.4).
//!
//! The classifier treats a backend as an opaque prompt-in, text-out
//! function plus a cheap health probe. This mirrors the shape of the
//! teacher's AI HTTP client (model selection + `send_message` +
//! `validate_api_key`) generalized across the three backend families this
//! spec actually names.

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Sends `prompt` and returns the raw text response. No parsing or
    /// validation happens here; that is the classifier's job.
    async fn send(&self, prompt: &str) -> Result<String>;

    /// A cheap reachability check, performed once per run and cached by
    /// the caller.
    async fn health_check(&self) -> Result<()>;

    fn name(&self) -> &'static str;
}
