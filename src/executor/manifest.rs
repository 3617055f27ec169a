//! Atomic manifest persistence (spec §4.6, §9 "Crash safety").
//!
//! Grounded directly on the teacher's `wal::journal::WALManager`: write to
//! a temp file in the same directory, then rename into place, so a reader
//! never observes a partially-written manifest. `fs2` provides the same
//! advisory locking primitive the teacher uses around its journal
//! read-modify-write cycle.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{OrganizerError, Result};
use crate::model::Manifest;

pub struct ManifestWriter {
    logs_dir: PathBuf,
}

impl ManifestWriter {
    pub fn new(logs_dir: PathBuf) -> Self {
        Self { logs_dir }
    }

    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.logs_dir).map_err(|source| OrganizerError::Io {
            path: self.logs_dir.clone(),
            source,
        })
    }

    fn manifest_path(&self, timestamp: &str) -> PathBuf {
        self.logs_dir.join(format!("manifest_{timestamp}.json"))
    }

    fn lock_path(&self) -> PathBuf {
        self.logs_dir.join(".manifest.lock")
    }

    /// Serializes `manifest` to `<logs_dir>/manifest_<timestamp>.json`
    /// atomically: write to a sibling temp file, fsync, then rename. Held
    /// under an advisory lock so a concurrent writer (there should be at
    /// most one per run, but crash recovery may overlap briefly) can't
    /// interleave writes.
    pub fn write(&self, manifest: &Manifest, timestamp: &str) -> Result<PathBuf> {
        self.ensure_dir()?;

        let lock_file = File::create(self.lock_path()).map_err(|source| OrganizerError::Io {
            path: self.lock_path(),
            source,
        })?;
        lock_file.lock_exclusive().map_err(|source| OrganizerError::Io {
            path: self.lock_path(),
            source,
        })?;

        let final_path = self.manifest_path(timestamp);
        let tmp_path = self.logs_dir.join(format!(".manifest_{timestamp}.tmp"));

        let json = serde_json::to_string_pretty(manifest)
            .map_err(|e| OrganizerError::Config(format!("failed to serialize manifest: {e}")))?;

        {
            let mut tmp_file = File::create(&tmp_path).map_err(|source| OrganizerError::Io {
                path: tmp_path.clone(),
                source,
            })?;
            tmp_file.write_all(json.as_bytes()).map_err(|source| OrganizerError::Io {
                path: tmp_path.clone(),
                source,
            })?;
            tmp_file.sync_all().map_err(|source| OrganizerError::Io {
                path: tmp_path.clone(),
                source,
            })?;
        }

        fs::rename(&tmp_path, &final_path).map_err(|source| OrganizerError::Io {
            path: final_path.clone(),
            source,
        })?;

        FileExt::unlock(&lock_file).ok();

        Ok(final_path)
    }

    pub fn load(path: &Path) -> Result<Manifest> {
        let text = fs::read_to_string(path).map_err(|source| OrganizerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|e| OrganizerError::CorruptPlan(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExecutionResult, ExecutionStatus};
    use chrono::Utc;
    use tempfile::tempdir;

    #[test]
    fn write_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let writer = ManifestWriter::new(dir.path().to_path_buf());

        let mut manifest = Manifest::new("plan-1", true);
        manifest.push(ExecutionResult {
            source: PathBuf::from("/in/a.txt"),
            status: ExecutionStatus::Applied,
            error_kind: None,
            timestamp: Utc::now(),
            final_destination: Some(PathBuf::from("/out/a.txt")),
        });
        manifest.finish();

        let path = writer.write(&manifest, "20260101_000000").unwrap();
        assert!(path.exists());

        let loaded = ManifestWriter::load(&path).unwrap();
        assert_eq!(loaded.plan_id, "plan-1");
        assert_eq!(loaded.results.len(), 1);
    }

    #[test]
    fn write_leaves_no_temp_file_behind() {
        let dir = tempdir().unwrap();
        let writer = ManifestWriter::new(dir.path().to_path_buf());
        let manifest = Manifest::new("plan-2", false);
        writer.write(&manifest, "20260101_000001").unwrap();

        let leftover_tmp = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().ends_with(".tmp"));
        assert!(!leftover_tmp);
    }
}
