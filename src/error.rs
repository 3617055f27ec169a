//! Error kinds shared across every pipeline stage.
//!
//! Mirrors the abstract error taxonomy of the file-organizer core: each
//! variant maps to exactly one of the stable kinds a caller can match on,
//! independent of the underlying cause (`std::io::Error`, a parse failure,
//! an HTTP error, ...).

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type returned by any stage of the pipeline.
#[derive(Debug, Error)]
pub enum OrganizerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("extraction failed for {path}: {reason}")]
    Extraction { path: PathBuf, reason: String },

    #[error("LLM backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("invalid LLM response schema: {0}")]
    Schema(String),

    #[error("destination collision could not be resolved for {base_name} (cap {cap} reached)")]
    Collision { base_name: String, cap: u32 },

    #[error("integrity check failed for {path}: expected {expected}, got {actual}")]
    Integrity {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("plan file is corrupt: {0}")]
    CorruptPlan(String),
}

impl OrganizerError {
    /// The abstract, stable kind this error belongs to (spec §7).
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrganizerError::Config(_) => ErrorKind::Config,
            OrganizerError::Io { .. } => ErrorKind::Io,
            OrganizerError::Extraction { .. } => ErrorKind::Extraction,
            OrganizerError::BackendUnavailable(_) => ErrorKind::BackendUnavailable,
            OrganizerError::Schema(_) => ErrorKind::Schema,
            OrganizerError::Collision { .. } => ErrorKind::Collision,
            OrganizerError::Integrity { .. } => ErrorKind::Integrity,
            OrganizerError::CorruptPlan(_) => ErrorKind::Config,
        }
    }

    /// Process exit code a fatal instance of this error should produce.
    ///
    /// Per-item failures (extraction, integrity, collision, io) are handled
    /// locally by their stage and never reach `main` as a fatal error; this
    /// mapping only matters for the errors that abort a run before it
    /// completes.
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::Config => 2,
            _ => 1,
        }
    }
}

/// Stable, implementation-independent error kind (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Io,
    Extraction,
    BackendUnavailable,
    Schema,
    Collision,
    Integrity,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Config => "ConfigError",
            ErrorKind::Io => "IoError",
            ErrorKind::Extraction => "ExtractionError",
            ErrorKind::BackendUnavailable => "BackendUnavailable",
            ErrorKind::Schema => "SchemaError",
            ErrorKind::Collision => "CollisionError",
            ErrorKind::Integrity => "IntegrityError",
        };
        write!(f, "{s}")
    }
}

pub type Result<T> = std::result::Result<T, OrganizerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_is_fatal_exit_code_two() {
        let err = OrganizerError::Config("missing rules file".into());
        assert_eq!(err.exit_code(), 2);
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn backend_unavailable_exit_code_one() {
        let err = OrganizerError::BackendUnavailable("ollama: connection refused".into());
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn kind_display_matches_spec_names() {
        assert_eq!(ErrorKind::Io.to_string(), "IoError");
        assert_eq!(ErrorKind::Collision.to_string(), "CollisionError");
    }
}
