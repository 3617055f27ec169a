//! Run configuration: scan thresholds, exclusion lists, rule definitions,
//! and LLM backend selection.
//!
//! `AppConfig` carries everything that isn't loaded from a rules file;
//! `RulesConfig` is loaded separately from YAML (spec §4.3) so a user can
//! iterate on rules without touching the rest of the configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{OrganizerError, Result};

pub const DEFAULT_MIN_SIZE_BYTES: u64 = 1024;
pub const DEFAULT_CONFIDENCE_THRESHOLD: u8 = 85;
pub const DEFAULT_EXTRACT_WORKERS: usize = 4;
pub const DEFAULT_LLM_CONCURRENCY: usize = 2;
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_FILE_OP_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_SCAN_QUEUE_CAPACITY: usize = 256;
pub const MAX_LLM_ATTEMPTS: u32 = 3;
pub const COLLISION_VERSION_CAP: u32 = 999;

fn default_excluded_dirs() -> Vec<String> {
    [
        ".git",
        ".ssh",
        ".gnupg",
        ".vscode",
        ".idea",
        "node_modules",
        "__pycache__",
        "venv",
        "$RECYCLE.BIN",
        "System Volume Information",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_excluded_extensions() -> Vec<String> {
    ["exe", "dll", "sys", "msi", "bat", "ps1", "sh"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Which LLM backend (if any) to use for semantic classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Local,
    Gemini,
    OpenAi,
    /// Rule engine only; unresolved files fall straight to the inbox.
    RulesOnly,
}

/// Non-rules configuration for a run. Loaded from CLI flags with
/// environment-variable and default fallbacks; never from a singleton.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub min_size_bytes: u64,
    pub excluded_dirs: Vec<String>,
    pub excluded_extensions: Vec<String>,
    pub extract_workers: usize,
    pub llm_concurrency: usize,
    pub llm_requests_per_minute: u32,
    pub llm_timeout_secs: u64,
    pub file_op_timeout_secs: u64,
    pub confidence_threshold: u8,
    pub backend: BackendKind,
    pub model: Option<String>,
    pub copy_mode: bool,
    pub base_root: PathBuf,
    pub plans_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        let base_root = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            min_size_bytes: DEFAULT_MIN_SIZE_BYTES,
            excluded_dirs: default_excluded_dirs(),
            excluded_extensions: default_excluded_extensions(),
            extract_workers: DEFAULT_EXTRACT_WORKERS,
            // "derived from backend tier" (spec §4.4) — approximated here
            // as half the available cores, floored at the documented
            // minimum, since there is no backend-capacity signal to read
            // from a local process.
            llm_concurrency: (num_cpus::get() / 2).max(DEFAULT_LLM_CONCURRENCY),
            llm_requests_per_minute: 60,
            llm_timeout_secs: DEFAULT_LLM_TIMEOUT_SECS,
            file_op_timeout_secs: DEFAULT_FILE_OP_TIMEOUT_SECS,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            backend: BackendKind::default(),
            model: None,
            copy_mode: false,
            base_root: base_root.join("Organized"),
            plans_dir: PathBuf::from("plans"),
            logs_dir: PathBuf::from("logs"),
        }
    }
}

impl AppConfig {
    pub fn is_excluded_dir(&self, base_name: &str) -> bool {
        self.excluded_dirs.iter().any(|d| d == base_name)
    }

    pub fn is_excluded_extension(&self, ext: &str) -> bool {
        self.excluded_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(ext))
    }
}

/// One rule as loaded from the YAML rules file (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDef {
    pub id: String,
    /// Glob on base name; brace-expansion over comma-separated extensions
    /// supported, e.g. `*.{jpg,jpeg,png}`.
    pub glob: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub min_size_bytes: Option<u64>,
    #[serde(default)]
    pub max_size_bytes: Option<u64>,
    pub category: String,
    #[serde(default)]
    pub subcategory: String,
    pub confidence: u8,
}

/// The ordered rule list (spec §4.3). Order is significant: first full
/// match wins.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RulesConfig {
    #[serde(default)]
    pub rules: Vec<RuleDef>,
}

impl RulesConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| OrganizerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: RulesConfig = serde_yaml::from_str(&text)
            .map_err(|e| OrganizerError::Config(format!("invalid rules file {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for rule in &self.rules {
            if crate::model::Category::parse(&rule.category).is_none() {
                return Err(OrganizerError::Config(format!(
                    "rule `{}` references unknown category `{}`",
                    rule.id, rule.category
                )));
            }
            if rule.confidence > 100 {
                return Err(OrganizerError::Config(format!(
                    "rule `{}` has confidence {} outside 0..=100",
                    rule.id, rule.confidence
                )));
            }
        }
        Ok(())
    }
}

/// Loads `.env` (falling back to `../.env`) for LLM backend API keys, the
/// same two-location lookup the teacher's bootstrap performs.
pub fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        let _ = dotenvy::from_filename("../.env");
    }
}

/// Reads the environment variables the LLM backends consume (spec §6).
pub struct BackendEnv {
    pub google_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub ollama_base_url: String,
}

impl BackendEnv {
    pub fn from_env() -> Self {
        Self {
            google_api_key: std::env::var("GOOGLE_API_KEY").ok(),
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            ollama_base_url: std::env::var("OLLAMA_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_spec_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.min_size_bytes, 1024);
        assert_eq!(cfg.confidence_threshold, 85);
        assert!(cfg.is_excluded_dir(".git"));
        assert!(cfg.is_excluded_dir("node_modules"));
        assert!(!cfg.is_excluded_dir("src"));
        assert!(cfg.is_excluded_extension("SH"));
    }

    #[test]
    fn rules_config_rejects_unknown_category() {
        let yaml = r#"
rules:
  - id: bogus
    glob: "*.txt"
    category: "99_Nonexistent"
    confidence: 50
"#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.yaml");
        std::fs::write(&path, yaml).unwrap();
        let err = RulesConfig::load(&path).unwrap_err();
        assert!(matches!(err, OrganizerError::Config(_)));
    }

    #[test]
    fn rules_config_loads_valid_yaml() {
        let yaml = r#"
rules:
  - id: images
    glob: "*.{jpg,jpeg,png}"
    category: "05_Pessoal"
    subcategory: "Midia/Imagens"
    confidence: 95
"#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.yaml");
        std::fs::write(&path, yaml).unwrap();
        let config = RulesConfig::load(&path).unwrap();
        assert_eq!(config.rules.len(), 1);
        assert_eq!(config.rules[0].id, "images");
    }

    #[test]
    fn backend_env_defaults_ollama_base_url() {
        std::env::remove_var("OLLAMA_BASE_URL");
        let env = BackendEnv::from_env();
        assert_eq!(env.ollama_base_url, "http://localhost:11434");
    }
}
