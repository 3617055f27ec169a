//! LLM classifier: semantic fallback for files the rule engine left
//! unresolved (spec §4.4).

pub mod backend;
pub mod gemini;
pub mod ollama;
pub mod openai;
pub mod ratelimit;

use serde::Deserialize;
use tracing::{info, warn};

use crate::model::{Category, Classification, ClassificationSource, FileRecord};

pub use backend::LlmBackend;

const MAX_ATTEMPTS: u32 = crate::config::MAX_LLM_ATTEMPTS;

/// The exact response shape the backend must produce (spec §4.4).
#[derive(Debug, Deserialize)]
struct LlmResponse {
    category: String,
    subcategory: String,
    subject: String,
    year: i32,
    suggested_name: String,
    confidence: i64,
    rationale: String,
}

/// Strict two-stage parse: a direct `serde_json` decode, then one retry
/// after stripping a single pair of markdown code fences. Unlike a lenient
/// prose-scanning parser, anything still not bare JSON after that is
/// treated as invalid — the spec requires the backend emit structured data
/// with no surrounding prose at all, so recovering prose-wrapped JSON would
/// hide exactly the failure mode the retry loop exists to catch.
fn parse_response(raw: &str) -> std::result::Result<LlmResponse, String> {
    if let Ok(parsed) = serde_json::from_str::<LlmResponse>(raw.trim()) {
        return Ok(parsed);
    }

    let stripped = strip_code_fence(raw.trim());
    serde_json::from_str::<LlmResponse>(&stripped).map_err(|e| e.to_string())
}

fn strip_code_fence(s: &str) -> String {
    let s = s.trim();
    if let Some(rest) = s.strip_prefix("```") {
        let rest = rest.trim_start_matches("json").trim_start();
        if let Some(end) = rest.rfind("```") {
            return rest[..end].trim().to_string();
        }
    }
    s.to_string()
}

fn validate(response: LlmResponse) -> std::result::Result<Classification, Vec<&'static str>> {
    let mut problems = Vec::new();

    let category = Category::parse(&response.category);
    if category.is_none() {
        problems.push("category");
    }
    if response.subcategory.trim().is_empty() || response.subcategory.len() > 200 {
        problems.push("subcategory");
    }
    if response.subject.trim().is_empty() || response.subject.len() > 200 {
        problems.push("subject");
    }
    if !(1900..=2100).contains(&response.year) {
        problems.push("year");
    }
    if response.suggested_name.trim().is_empty() || response.suggested_name.len() > 250 {
        problems.push("suggested_name");
    }
    if !(0..=100).contains(&response.confidence) {
        problems.push("confidence");
    }
    if response.rationale.trim().is_empty() {
        problems.push("rationale");
    }

    if !problems.is_empty() {
        return Err(problems);
    }

    Ok(Classification {
        category: category.unwrap(),
        subcategory: response.subcategory,
        subject: response.subject,
        year: response.year,
        suggested_name: response.suggested_name,
        confidence: response.confidence as u8,
        rationale: response.rationale,
        source: ClassificationSource::Llm,
    })
}

/// Builds the prompt for one FileRecord (spec §4.4's prompt contract).
fn build_prompt(record: &FileRecord, correction: Option<&str>) -> String {
    let categories: Vec<&str> = Category::all().iter().map(|c| c.as_str()).collect();
    let excerpt = record.excerpt.as_deref().unwrap_or("");
    let year = record
        .modified_at
        .map(|d| d.format("%Y").to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let mut prompt = format!(
        "Classify this file into exactly one of these categories: {categories}.\n\
         Respond with structured data only: a single JSON object with exactly \
         these fields and no surrounding prose, code fences, or commentary:\n\
         category (one of the categories above), subcategory (string), \
         subject (short string), year (integer 1900-2100), \
         suggested_name (format YYYY-MM-DD__Category__Subject, no extension), \
         confidence (integer 0-100), rationale (short string).\n\n\
         File: base_name={base_name} extension={extension} size_bytes={size} \
         modification_year={year}\n\
         Excerpt:\n{excerpt}\n",
        categories = categories.join(", "),
        base_name = record.base_name(),
        extension = record.extension,
        size = record.size_bytes,
    );

    if let Some(directive) = correction {
        prompt.push_str("\n");
        prompt.push_str(directive);
    }

    prompt
}

/// Fallback classification used when no LLM backend is configured at all
/// (`--rules-only`, spec §6): unresolved files go straight to the inbox
/// rather than attempting a request that was never going to be made.
pub fn backend_unavailable_fallback(record: &FileRecord) -> Classification {
    Classification {
        category: Category::inbox(),
        subcategory: String::new(),
        subject: record.stem(),
        year: 0,
        suggested_name: format!("0000-00-00__{}__{}", Category::inbox(), record.stem()),
        confidence: 0,
        rationale: "no LLM backend configured (rules-only mode)".to_string(),
        source: ClassificationSource::Fallback,
    }
}

/// Classifies one FileRecord against `backend`, retrying up to
/// [`MAX_ATTEMPTS`] times on decode or validation failure. On persistent
/// failure returns the inbox fallback Classification (spec §4.4).
pub async fn classify(backend: &dyn LlmBackend, record: &FileRecord) -> Classification {
    let mut correction: Option<String> = None;

    for attempt in 1..=MAX_ATTEMPTS {
        let prompt = build_prompt(record, correction.as_deref());

        let raw = match send_with_backoff(backend, &prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(file = %record.path.display(), attempt, error = %e, "LLM request failed");
                correction = Some(
                    "Previous response could not be delivered; emit structured data only."
                        .to_string(),
                );
                continue;
            }
        };

        match parse_response(&raw) {
            Ok(response) => match validate(response) {
                Ok(classification) => {
                    info!(file = %record.path.display(), attempt, "LLM classification succeeded");
                    return classification;
                }
                Err(problems) => {
                    warn!(file = %record.path.display(), attempt, fields = ?problems, "LLM response failed schema validation");
                    correction = Some(format!(
                        "Previous response was missing or had malformed fields: {}. \
                         Emit structured data only with all fields corrected.",
                        problems.join(", ")
                    ));
                }
            },
            Err(_) => {
                warn!(file = %record.path.display(), attempt, "LLM response was not valid structured data");
                correction = Some(
                    "Previous response was not valid structured data; emit structured data only."
                        .to_string(),
                );
            }
        }
    }

    Classification {
        category: Category::inbox(),
        subcategory: String::new(),
        subject: record.stem(),
        year: 0,
        suggested_name: format!("0000-00-00__{}__{}", Category::inbox(), record.stem()),
        confidence: 0,
        rationale: format!("LLM classification failed after {MAX_ATTEMPTS} attempts"),
        source: ClassificationSource::Fallback,
    }
}

async fn send_with_backoff(backend: &dyn LlmBackend, prompt: &str) -> crate::error::Result<String> {
    let mut last_err = None;
    for attempt in 1..=ratelimit::MAX_BACKOFF_ATTEMPTS {
        match backend.send(prompt).await {
            Ok(text) => return Ok(text),
            Err(e) => {
                last_err = Some(e);
                if attempt < ratelimit::MAX_BACKOFF_ATTEMPTS {
                    tokio::time::sleep(ratelimit::backoff_delay(attempt)).await;
                }
            }
        }
    }
    Err(last_err.unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct ScriptedBackend {
        responses: Vec<String>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmBackend for ScriptedBackend {
        async fn send(&self, _prompt: &str) -> crate::error::Result<String> {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .responses
                .get(idx)
                .cloned()
                .unwrap_or_else(|| self.responses.last().cloned().unwrap()))
        }

        async fn health_check(&self) -> crate::error::Result<()> {
            Ok(())
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn record() -> FileRecord {
        FileRecord {
            path: std::path::PathBuf::from("/in/report.pdf"),
            size_bytes: 5000,
            modified_at: None,
            created_at: None,
            extension: "pdf".into(),
            mime_guess: None,
            sha256: "abc123".into(),
            excerpt: Some("quarterly earnings report".into()),
        }
    }

    #[tokio::test]
    async fn valid_response_on_first_attempt_is_accepted() {
        let backend = ScriptedBackend {
            responses: vec![serde_json::json!({
                "category": "01_Trabalho",
                "subcategory": "Reports",
                "subject": "Quarterly Earnings",
                "year": 2024,
                "suggested_name": "2024-01-01__01_Trabalho__Quarterly_Earnings",
                "confidence": 92,
                "rationale": "financial report content"
            })
            .to_string()],
            calls: AtomicUsize::new(0),
        };
        let result = classify(&backend, &record()).await;
        assert_eq!(result.category, Category::Trabalho);
        assert_eq!(result.confidence, 92);
        assert!(result.llm_used());
    }

    #[tokio::test]
    async fn malformed_output_three_times_routes_to_inbox_with_zero_confidence() {
        let backend = Arc::new(ScriptedBackend {
            responses: vec!["not json at all".to_string(); 3],
            calls: AtomicUsize::new(0),
        });
        let result = classify(backend.as_ref(), &record()).await;
        assert_eq!(result.category, Category::Inbox);
        assert_eq!(result.confidence, 0);
        assert_eq!(result.source, ClassificationSource::Fallback);
    }

    #[tokio::test]
    async fn code_fence_wrapped_json_is_recovered_on_retry() {
        let backend = ScriptedBackend {
            responses: vec![
                "```json\n{\"category\":\"03_Estudos\",\"subcategory\":\"Notes\",\"subject\":\"Algebra\",\"year\":2023,\"suggested_name\":\"2023-00-00__03_Estudos__Algebra\",\"confidence\":88,\"rationale\":\"class notes\"}\n```".to_string(),
            ],
            calls: AtomicUsize::new(0),
        };
        let result = classify(&backend, &record()).await;
        assert_eq!(result.category, Category::Estudos);
        assert_eq!(result.confidence, 88);
    }

    #[test]
    fn parse_response_rejects_prose_wrapped_json() {
        let raw = "Sure, here you go: {\"category\":\"01_Trabalho\"}";
        assert!(parse_response(raw).is_err());
    }
}
