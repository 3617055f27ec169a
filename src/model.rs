//! Core data types flowing through the pipeline.
//!
//! Each type corresponds to one stage boundary: `FileRecord` is Scan/Extract
//! output, `Classification` is Rule/LLM output, `PlanItem`/`Plan` is Planner
//! output, `ExecutionResult`/`Manifest` is Executor output. Nothing here
//! mutates a value produced by an earlier stage; later stages only add new
//! records that reference the earlier ones by path or id.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The six fixed destination categories (spec §6). Any other value is a
/// `ConfigError`/`SchemaError` depending on where it originates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "01_Trabalho")]
    Trabalho,
    #[serde(rename = "02_Financas")]
    Financas,
    #[serde(rename = "03_Estudos")]
    Estudos,
    #[serde(rename = "04_Livros")]
    Livros,
    #[serde(rename = "05_Pessoal")]
    Pessoal,
    #[serde(rename = "90_Inbox_Organizar")]
    Inbox,
}

impl Category {
    /// The stable identifier string used on disk and in prompts/config.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Trabalho => "01_Trabalho",
            Category::Financas => "02_Financas",
            Category::Estudos => "03_Estudos",
            Category::Livros => "04_Livros",
            Category::Pessoal => "05_Pessoal",
            Category::Inbox => "90_Inbox_Organizar",
        }
    }

    /// The category used for low-confidence / failed classifications.
    pub fn inbox() -> Category {
        Category::Inbox
    }

    pub fn is_inbox(&self) -> bool {
        matches!(self, Category::Inbox)
    }

    pub fn all() -> &'static [Category] {
        &[
            Category::Trabalho,
            Category::Financas,
            Category::Estudos,
            Category::Livros,
            Category::Pessoal,
            Category::Inbox,
        ]
    }

    /// Parse a category from its on-disk identifier string. Used to
    /// validate LLM responses and rule configuration.
    pub fn parse(s: &str) -> Option<Category> {
        Category::all().iter().copied().find(|c| c.as_str() == s)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a Classification came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassificationSource {
    /// A deterministic rule matched; carries the rule id.
    Rule(String),
    /// The LLM classifier produced a validated response.
    Llm,
    /// No rule matched and the LLM classifier could not produce a valid
    /// response after retries.
    Fallback,
}

impl std::fmt::Display for ClassificationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassificationSource::Rule(id) => write!(f, "rule:{id}"),
            ClassificationSource::Llm => write!(f, "llm"),
            ClassificationSource::Fallback => write!(f, "fallback"),
        }
    }
}

/// One discovered file. Created by Scan, enriched once by Extract, then
/// immutable (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    /// Lowercase, without the leading dot.
    pub extension: String,
    pub mime_guess: Option<String>,
    pub sha256: String,
    /// Set by Extract; absent immediately after Scan.
    pub excerpt: Option<String>,
}

impl FileRecord {
    pub fn base_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// The maximum excerpt length the Extractor ever emits (spec §4.2).
pub const MAX_EXCERPT_BYTES: usize = 8 * 1024;
pub const TRUNCATION_SENTINEL: &str = "[content truncated]";

/// A classification decision for one file (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub category: Category,
    pub subcategory: String,
    pub subject: String,
    /// 0 when unknown.
    pub year: i32,
    /// `YYYY-MM-DD__Category__Subject`, no extension.
    pub suggested_name: String,
    pub confidence: u8,
    pub rationale: String,
    pub source: ClassificationSource,
}

impl Classification {
    pub fn llm_used(&self) -> bool {
        matches!(self.source, ClassificationSource::Llm)
    }
}

/// One executable intent produced by the Planner (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Move,
    Copy,
    Rename,
    Skip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanItem {
    pub action: Action,
    pub source: PathBuf,
    /// Absent iff action is Skip.
    pub destination: Option<PathBuf>,
    pub reason: String,
    pub confidence: u8,
    pub rule_id: Option<String>,
    pub llm_used: bool,
    /// SHA-256 recorded at plan time, used for the Executor's
    /// `source_changed` pre-execution check.
    pub source_hash: String,
    pub source_size: u64,
}

/// Ordered collection of PlanItems plus run metadata (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub plan_id: String,
    pub generated_at: DateTime<Utc>,
    pub base_root: PathBuf,
    pub items: Vec<PlanItem>,
}

impl Plan {
    pub fn counts_by_action(&self) -> [(Action, usize); 4] {
        let mut counts = [
            (Action::Move, 0usize),
            (Action::Copy, 0),
            (Action::Rename, 0),
            (Action::Skip, 0),
        ];
        for item in &self.items {
            for (action, count) in counts.iter_mut() {
                if *action == item.action {
                    *count += 1;
                }
            }
        }
        counts
    }
}

/// Status of one PlanItem after Execute (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Applied,
    DryRun,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub source: PathBuf,
    pub status: ExecutionStatus,
    pub error_kind: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// The destination actually used; may differ from the planned one if
    /// a fresh collision was found at execute time.
    pub final_destination: Option<PathBuf>,
}

/// Append-only record of one Execute run (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub plan_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub apply_mode: bool,
    pub results: Vec<ExecutionResult>,
}

impl Manifest {
    pub fn new(plan_id: impl Into<String>, apply_mode: bool) -> Self {
        Self {
            plan_id: plan_id.into(),
            started_at: Utc::now(),
            finished_at: None,
            apply_mode,
            results: Vec::new(),
        }
    }

    pub fn push(&mut self, result: ExecutionResult) {
        self.results.push(result);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn has_failures(&self) -> bool {
        self.results
            .iter()
            .any(|r| r.status == ExecutionStatus::Failed)
    }

    /// Run-level exit code per spec §7: 0 if every item applied, dry-run,
    /// or skipped; 1 if any item failed.
    pub fn exit_code(&self) -> i32 {
        if self.has_failures() {
            1
        } else {
            0
        }
    }
}

/// Strips any path prefix so two FileRecords for the same relative file
/// under different roots compare equal by name. Used only by tests and the
/// planner's stable-ordering key.
pub fn lexical_sort_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
