//! Scanner: walks root paths and emits FileRecords (spec §4.1).
//!
//! Traversal is depth-first, does not follow symlinks, and is strictly
//! ordered by discovery — callers receive a lazy, non-restartable sequence.
//! `walkdir` gives us that ordering directly, unlike a rayon-backed walker
//! which would reorder work across threads. Each file's stat+hash runs on
//! a blocking task bounded by a per-file-operation timeout (spec §5); the
//! run-level cancellation token is checked between files.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::cancellation::CancellationToken;
use crate::config::AppConfig;
use crate::model::FileRecord;

/// Outcome of scanning one root: the records found plus counters for
/// anything skipped along the way. Mirrors the teacher's `ScanStats`
/// builder-accumulator pattern.
#[derive(Debug, Default, Clone)]
pub struct ScanStats {
    pub files_scanned: usize,
    pub files_skipped_excluded_dir: usize,
    pub files_skipped_excluded_ext: usize,
    pub files_skipped_too_small: usize,
    pub files_skipped_unreadable: usize,
    pub directories_skipped: usize,
}

pub struct Scanner<'a> {
    config: &'a AppConfig,
}

impl<'a> Scanner<'a> {
    pub fn new(config: &'a AppConfig) -> Self {
        Self { config }
    }

    /// Walks `roots` in order, returning every accepted FileRecord plus the
    /// accumulated stats. `file_op_timeout` bounds each file's stat+hash;
    /// a file that exceeds it is counted unreadable rather than hanging
    /// the whole scan. `cancellation` is checked between roots and between
    /// files so an expired run deadline stops the walk early.
    pub async fn scan(
        &self,
        roots: &[PathBuf],
        file_op_timeout: Duration,
        cancellation: &CancellationToken,
    ) -> (Vec<FileRecord>, ScanStats) {
        let mut records = Vec::new();
        let mut stats = ScanStats::default();

        for root in roots {
            if cancellation.is_cancelled() {
                break;
            }
            self.scan_root(root, file_op_timeout, cancellation, &mut records, &mut stats).await;
        }

        (records, stats)
    }

    async fn scan_root(
        &self,
        root: &Path,
        file_op_timeout: Duration,
        cancellation: &CancellationToken,
        records: &mut Vec<FileRecord>,
        stats: &mut ScanStats,
    ) {
        let walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| self.should_descend(entry));

        for entry in walker {
            if cancellation.is_cancelled() {
                break;
            }

            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    if err.io_error().is_some() {
                        warn!(root = %root.display(), error = %err, "directory walk error, subtree skipped");
                        stats.directories_skipped += 1;
                    }
                    continue;
                }
            };

            if entry.file_type().is_dir() || entry.file_type().is_symlink() {
                continue;
            }

            let extension = entry
                .path()
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();

            if !extension.is_empty() && self.config.is_excluded_extension(&extension) {
                stats.files_skipped_excluded_ext += 1;
                continue;
            }

            let path = entry.path().to_path_buf();
            let min_size_bytes = self.config.min_size_bytes;

            let outcome = tokio::time::timeout(
                file_op_timeout,
                tokio::task::spawn_blocking(move || stat_and_hash(&path, extension, min_size_bytes)),
            )
            .await;

            match outcome {
                Ok(Ok(Accepted::Record(record))) => {
                    stats.files_scanned += 1;
                    records.push(record);
                }
                Ok(Ok(Accepted::SkippedTooSmall)) => stats.files_skipped_too_small += 1,
                Ok(Ok(Accepted::SkippedUnreadable)) => stats.files_skipped_unreadable += 1,
                Ok(Err(_join_err)) => stats.files_skipped_unreadable += 1,
                Err(_elapsed) => {
                    warn!(root = %root.display(), "file stat/hash timed out, skipping");
                    stats.files_skipped_unreadable += 1;
                }
            }
        }
    }

    fn should_descend(&self, entry: &walkdir::DirEntry) -> bool {
        if !entry.file_type().is_dir() {
            return true;
        }
        let name = entry.file_name().to_string_lossy();
        // The root itself has an empty relative name check skipped implicitly
        // because WalkDir's depth-0 entry is always descended into.
        if entry.depth() > 0 && self.config.is_excluded_dir(&name) {
            debug!(dir = %entry.path().display(), "skipping excluded directory");
            return false;
        }
        true
    }
}

enum Accepted {
    Record(FileRecord),
    SkippedTooSmall,
    SkippedUnreadable,
}

fn stat_and_hash(path: &Path, extension: String, min_size_bytes: u64) -> Accepted {
    let metadata = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to stat file, skipping");
            return Accepted::SkippedUnreadable;
        }
    };

    if metadata.len() < min_size_bytes {
        return Accepted::SkippedTooSmall;
    }

    let sha256 = match hash_file(path) {
        Ok(h) => h,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "failed to hash file, skipping");
            return Accepted::SkippedUnreadable;
        }
    };

    let mime_guess = mime_guess::from_path(path).first().map(|m| m.to_string());
    let modified_at = metadata.modified().ok().map(chrono::DateTime::<chrono::Utc>::from);
    let created_at = metadata.created().ok().map(chrono::DateTime::<chrono::Utc>::from);

    Accepted::Record(FileRecord {
        path: path.to_path_buf(),
        size_bytes: metadata.len(),
        modified_at,
        created_at,
        extension,
        mime_guess,
        sha256,
        excerpt: None,
    })
}

/// Streams a file once, computing its SHA-256 without loading it fully
/// into memory.
fn hash_file(path: &Path) -> std::io::Result<String> {
    use std::io::Read;

    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    fn config() -> AppConfig {
        AppConfig {
            min_size_bytes: 4,
            ..AppConfig::default()
        }
    }

    #[tokio::test]
    async fn scan_finds_accepted_files_and_skips_excluded() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("keep.txt"), b"hello world").unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join(".git").join("HEAD"), b"ref: refs/heads/main").unwrap();
        fs::write(dir.path().join("tool.exe"), b"binarycontent").unwrap();
        fs::write(dir.path().join("tiny.txt"), b"ab").unwrap();

        let cfg = config();
        let scanner = Scanner::new(&cfg);
        let (records, stats) = scanner
            .scan(&[dir.path().to_path_buf()], TEST_TIMEOUT, &CancellationToken::new())
            .await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].base_name(), "keep.txt");
        assert_eq!(stats.files_scanned, 1);
        assert_eq!(stats.files_skipped_excluded_ext, 1);
        assert_eq!(stats.files_skipped_too_small, 1);
    }

    #[tokio::test]
    async fn scan_computes_stable_sha256() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"same content").unwrap();
        fs::write(dir.path().join("b.txt"), b"same content").unwrap();

        let cfg = config();
        let scanner = Scanner::new(&cfg);
        let (records, _) = scanner
            .scan(&[dir.path().to_path_buf()], TEST_TIMEOUT, &CancellationToken::new())
            .await;

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sha256, records[1].sha256);
    }

    #[tokio::test]
    async fn empty_root_yields_zero_records() {
        let dir = tempdir().unwrap();
        let cfg = config();
        let scanner = Scanner::new(&cfg);
        let (records, stats) = scanner
            .scan(&[dir.path().to_path_buf()], TEST_TIMEOUT, &CancellationToken::new())
            .await;
        assert!(records.is_empty());
        assert_eq!(stats.files_scanned, 0);
    }

    #[tokio::test]
    async fn cancelled_before_scan_yields_no_records() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("keep.txt"), b"hello world").unwrap();

        let cfg = config();
        let scanner = Scanner::new(&cfg);
        let cancellation = CancellationToken::new();
        cancellation.cancel();

        let (records, _) = scanner.scan(&[dir.path().to_path_buf()], TEST_TIMEOUT, &cancellation).await;
        assert!(records.is_empty());
    }
}
