//! Executor: applies a Plan under a safety policy (spec §4.6).
//!
//! Mutation primitives are grounded on the teacher's
//! `commands::filesystem::move_file`/`copy_file` (rename-or-copy-then-
//! delete across devices) strengthened with the hash verification spec's
//! Hard Invariant (a) requires before any source is unlinked. Each
//! mutation and hash check runs on a blocking task bounded by the
//! configured per-file-operation timeout (spec §5); the run-level
//! cancellation token is checked between items so a triggered deadline
//! stops new work without aborting anything already in flight.

pub mod manifest;

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::cancellation::CancellationToken;
use crate::error::{OrganizerError, Result};
use crate::model::{Action, ExecutionResult, ExecutionStatus, Manifest, Plan, PlanItem};
use crate::planner::resolve_collision;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    DryRun,
    Apply,
}

pub struct Executor {
    mode: Mode,
    file_op_timeout: Duration,
}

impl Executor {
    pub fn new(mode: Mode, file_op_timeout: Duration) -> Self {
        Self { mode, file_op_timeout }
    }

    /// Executes every item in `plan` in order, accumulating a Manifest.
    /// Per spec §5, PlanItems are processed strictly sequentially — no
    /// concurrency is permitted once Planning hands off to Execute. Once
    /// `cancellation` fires, no further item is started; whatever manifest
    /// has accumulated so far is still returned and finished.
    pub async fn run(&self, plan: &Plan, cancellation: &CancellationToken) -> Manifest {
        let mut manifest = Manifest::new(plan.plan_id.clone(), self.mode == Mode::Apply);
        let mut destinations_seen: HashSet<PathBuf> = HashSet::new();

        for item in &plan.items {
            if cancellation.is_cancelled() {
                warn!("run cancelled, stopping before remaining plan items");
                break;
            }
            let result = self.execute_item(item, &mut destinations_seen).await;
            manifest.push(result);
        }

        manifest.finish();
        manifest
    }

    async fn execute_item(&self, item: &PlanItem, destinations_seen: &mut HashSet<PathBuf>) -> ExecutionResult {
        if item.action == Action::Skip {
            return ExecutionResult {
                source: item.source.clone(),
                status: ExecutionStatus::Skipped,
                error_kind: None,
                timestamp: Utc::now(),
                final_destination: None,
            };
        }

        // Checked before anything else, independent of whether the source
        // still exists: a destination already holding the planned content
        // means a prior run (MOVE/RENAME *or* COPY) already completed this
        // item. Without this, COPY never removes its source, so a re-run
        // would see the source still matching and fall through into
        // `revalidate_destination`, which would treat its own prior output
        // as a fresh collision and copy the file again.
        if let Some(result) = self.destination_already_done(item).await {
            return result;
        }

        if let Some(result) = self.check_source_unchanged(item) {
            return result;
        }

        let Some(planned_dest) = &item.destination else {
            return ExecutionResult {
                source: item.source.clone(),
                status: ExecutionStatus::Skipped,
                error_kind: None,
                timestamp: Utc::now(),
                final_destination: None,
            };
        };

        let final_dest = match self.revalidate_destination(planned_dest, destinations_seen) {
            Ok(path) => path,
            Err(e) => {
                warn!(source = %item.source.display(), error = %e, "collision could not be resolved");
                return ExecutionResult {
                    source: item.source.clone(),
                    status: ExecutionStatus::Failed,
                    error_kind: Some(e.kind().to_string()),
                    timestamp: Utc::now(),
                    final_destination: None,
                };
            }
        };

        if self.mode == Mode::DryRun {
            destinations_seen.insert(final_dest.clone());
            return ExecutionResult {
                source: item.source.clone(),
                status: ExecutionStatus::DryRun,
                error_kind: None,
                timestamp: Utc::now(),
                final_destination: Some(final_dest),
            };
        }

        if let Some(parent) = final_dest.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!(path = %parent.display(), error = %e, "failed to create destination directory");
                return ExecutionResult {
                    source: item.source.clone(),
                    status: ExecutionStatus::Failed,
                    error_kind: Some("IoError".into()),
                    timestamp: Utc::now(),
                    final_destination: None,
                };
            }
        }

        let outcome = match item.action {
            Action::Move => self.do_move(&item.source, &final_dest, &item.source_hash).await,
            Action::Copy => self.do_copy(&item.source, &final_dest, &item.source_hash).await,
            Action::Rename => self.do_rename(&item.source, &final_dest, &item.source_hash).await,
            Action::Skip => unreachable!("skip handled above"),
        };

        destinations_seen.insert(final_dest.clone());

        match outcome {
            Ok(()) => {
                info!(source = %item.source.display(), destination = %final_dest.display(), action = ?item.action, "applied");
                ExecutionResult {
                    source: item.source.clone(),
                    status: ExecutionStatus::Applied,
                    error_kind: None,
                    timestamp: Utc::now(),
                    final_destination: Some(final_dest),
                }
            }
            Err(e) => {
                warn!(source = %item.source.display(), error = %e, "execution failed");
                ExecutionResult {
                    source: item.source.clone(),
                    status: ExecutionStatus::Failed,
                    error_kind: Some(e.kind().to_string()),
                    timestamp: Utc::now(),
                    final_destination: None,
                }
            }
        }
    }

    /// Idempotence check (spec §8): if the planned destination already
    /// exists and its content hash matches what was recorded at plan time,
    /// this item was already applied by an earlier run. Fires regardless
    /// of whether the source still exists, which is what makes re-running
    /// a completed COPY plan item a no-op rather than a second copy.
    async fn destination_already_done(&self, item: &PlanItem) -> Option<ExecutionResult> {
        let dest = item.destination.as_ref()?;
        if !dest.exists() {
            return None;
        }
        match self.hash_with_timeout(dest.clone()).await {
            Ok(hash) if hash == item.source_hash => Some(ExecutionResult {
                source: item.source.clone(),
                status: ExecutionStatus::Skipped,
                error_kind: None,
                timestamp: Utc::now(),
                final_destination: Some(dest.clone()),
            }),
            _ => None,
        }
    }

    /// Verifies the source still exists with the size recorded at plan
    /// time (spec §4.6 pre-execution checks). `destination_already_done`
    /// runs first, so by the time this is reached a missing source is
    /// always a genuine `source_changed` failure, not a completed run.
    fn check_source_unchanged(&self, item: &PlanItem) -> Option<ExecutionResult> {
        let metadata = match fs::metadata(&item.source) {
            Ok(m) => m,
            Err(_) => {
                return Some(ExecutionResult {
                    source: item.source.clone(),
                    status: ExecutionStatus::Failed,
                    error_kind: Some("source_changed".to_string()),
                    timestamp: Utc::now(),
                    final_destination: None,
                });
            }
        };

        if metadata.len() != item.source_size {
            return Some(ExecutionResult {
                source: item.source.clone(),
                status: ExecutionStatus::Failed,
                error_kind: Some("source_changed".to_string()),
                timestamp: Utc::now(),
                final_destination: None,
            });
        }

        None
    }

    /// Re-checks the planned destination against the live filesystem and
    /// any destination already claimed earlier in this same run,
    /// re-versioning if a fresh collision has appeared (spec §4.6).
    fn revalidate_destination(&self, planned: &Path, seen: &HashSet<PathBuf>) -> Result<PathBuf> {
        let mut taken = seen.clone();
        if planned.exists() {
            taken.insert(planned.to_path_buf());
        }
        resolve_collision(planned, &taken)
    }

    async fn do_move(&self, source: &Path, dest: &Path, expected_hash: &str) -> Result<()> {
        if dest.exists() {
            return Err(destination_exists_error(dest));
        }

        let rename_src = source.to_path_buf();
        let rename_dest = dest.to_path_buf();
        let renamed = self
            .run_blocking(dest.to_path_buf(), move || fs::rename(&rename_src, &rename_dest))
            .await;

        if renamed.is_ok() {
            return Ok(());
        }

        // Cross-device (or a transient rename failure): copy, verify, then
        // unlink the source only once the copy is confirmed intact.
        self.copy_with_verification(source, dest, expected_hash).await?;

        let remove_src = source.to_path_buf();
        if let Err(e) = self.run_blocking(source.to_path_buf(), move || fs::remove_file(&remove_src)).await {
            let _ = fs::remove_file(dest);
            return Err(e);
        }
        Ok(())
    }

    async fn do_copy(&self, source: &Path, dest: &Path, expected_hash: &str) -> Result<()> {
        if dest.exists() {
            return Err(destination_exists_error(dest));
        }
        self.copy_with_verification(source, dest, expected_hash).await
    }

    async fn do_rename(&self, source: &Path, dest: &Path, expected_hash: &str) -> Result<()> {
        // Same semantics as MOVE; RENAME is only distinguished by the
        // planner to record intent (same-directory rename vs. cross-dir
        // move), the mutation itself falls back identically across
        // devices.
        self.do_move(source, dest, expected_hash).await
    }

    async fn copy_with_verification(&self, source: &Path, dest: &Path, expected_hash: &str) -> Result<()> {
        let copy_src = source.to_path_buf();
        let copy_dest = dest.to_path_buf();
        self.run_blocking(dest.to_path_buf(), move || fs::copy(&copy_src, &copy_dest).map(|_| ()))
            .await?;

        let actual_hash = match self.hash_with_timeout(dest.to_path_buf()).await {
            Ok(h) => h,
            Err(e) => {
                let _ = fs::remove_file(dest);
                return Err(e);
            }
        };

        if actual_hash != expected_hash {
            let _ = fs::remove_file(dest);
            return Err(OrganizerError::Integrity {
                path: dest.to_path_buf(),
                expected: expected_hash.to_string(),
                actual: actual_hash,
            });
        }

        Ok(())
    }

    /// Runs a blocking filesystem mutation on a blocking task, bounded by
    /// `file_op_timeout` (spec §5 per-file-operation timeout).
    async fn run_blocking<F>(&self, path: PathBuf, f: F) -> Result<()>
    where
        F: FnOnce() -> std::io::Result<()> + Send + 'static,
    {
        match tokio::time::timeout(self.file_op_timeout, tokio::task::spawn_blocking(f)).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(source))) => Err(OrganizerError::Io { path, source }),
            Ok(Err(_join_err)) => Err(OrganizerError::Io {
                path,
                source: std::io::Error::new(std::io::ErrorKind::Other, "file operation task panicked"),
            }),
            Err(_elapsed) => Err(OrganizerError::Io {
                path,
                source: std::io::Error::new(std::io::ErrorKind::TimedOut, "file operation timed out"),
            }),
        }
    }

    async fn hash_with_timeout(&self, path: PathBuf) -> Result<String> {
        let hash_path = path.clone();
        match tokio::time::timeout(self.file_op_timeout, tokio::task::spawn_blocking(move || hash_file(&hash_path))).await {
            Ok(Ok(Ok(hash))) => Ok(hash),
            Ok(Ok(Err(source))) => Err(OrganizerError::Io { path, source }),
            Ok(Err(_join_err)) => Err(OrganizerError::Io {
                path,
                source: std::io::Error::new(std::io::ErrorKind::Other, "hash task panicked"),
            }),
            Err(_elapsed) => Err(OrganizerError::Io {
                path,
                source: std::io::Error::new(std::io::ErrorKind::TimedOut, "hash timed out"),
            }),
        }
    }
}

fn destination_exists_error(dest: &Path) -> OrganizerError {
    OrganizerError::Collision {
        base_name: dest.display().to_string(),
        cap: 0,
    }
}

fn hash_file(path: &Path) -> std::io::Result<String> {
    use std::io::Read;

    let mut file = fs::File::open(path)?;
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
    use crate::model::ExecutionStatus;
    use tempfile::tempdir;

    const TEST_TIMEOUT: Duration = Duration::from_secs(5);

    fn sha256_of(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    fn item(source: PathBuf, destination: PathBuf, action: Action, hash: String, size: u64) -> PlanItem {
        PlanItem {
            action,
            source,
            destination: Some(destination),
            reason: "test".into(),
            confidence: 95,
            rule_id: None,
            llm_used: false,
            source_hash: hash,
            source_size: size,
        }
    }

    fn plan_of(item: PlanItem, base_root: PathBuf) -> Plan {
        Plan {
            plan_id: "p1".into(),
            generated_at: Utc::now(),
            base_root,
            items: vec![item],
        }
    }

    #[tokio::test]
    async fn dry_run_performs_no_mutation() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("a.txt");
        fs::write(&src, b"hello").unwrap();
        let dest = dir.path().join("out").join("a.txt");

        let plan = plan_of(item(src.clone(), dest.clone(), Action::Move, sha256_of(b"hello"), 5), dir.path().to_path_buf());

        let executor = Executor::new(Mode::DryRun, TEST_TIMEOUT);
        let manifest = executor.run(&plan, &CancellationToken::new()).await;

        assert!(src.exists());
        assert!(!dest.exists());
        assert_eq!(manifest.results[0].status, ExecutionStatus::DryRun);
    }

    #[tokio::test]
    async fn apply_move_relocates_file_and_verifies_hash() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("a.txt");
        fs::write(&src, b"hello").unwrap();
        let dest = dir.path().join("out").join("a.txt");

        let plan = plan_of(item(src.clone(), dest.clone(), Action::Move, sha256_of(b"hello"), 5), dir.path().to_path_buf());

        let executor = Executor::new(Mode::Apply, TEST_TIMEOUT);
        let manifest = executor.run(&plan, &CancellationToken::new()).await;

        assert!(!src.exists());
        assert!(dest.exists());
        assert_eq!(manifest.results[0].status, ExecutionStatus::Applied);
    }

    #[tokio::test]
    async fn source_vanished_between_plan_and_execute_fails_with_source_changed() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("gone.txt");
        let dest = dir.path().join("out").join("gone.txt");

        let plan = plan_of(item(src.clone(), dest.clone(), Action::Move, sha256_of(b"hello"), 5), dir.path().to_path_buf());

        let executor = Executor::new(Mode::Apply, TEST_TIMEOUT);
        let manifest = executor.run(&plan, &CancellationToken::new()).await;

        assert_eq!(manifest.results[0].status, ExecutionStatus::Failed);
        assert_eq!(manifest.results[0].error_kind.as_deref(), Some("source_changed"));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn rerunning_completed_move_plan_is_idempotent() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("a.txt");
        fs::write(&src, b"hello").unwrap();
        let dest = dir.path().join("out").join("a.txt");

        let plan = plan_of(item(src.clone(), dest.clone(), Action::Move, sha256_of(b"hello"), 5), dir.path().to_path_buf());

        let executor = Executor::new(Mode::Apply, TEST_TIMEOUT);
        let first = executor.run(&plan, &CancellationToken::new()).await;
        assert_eq!(first.results[0].status, ExecutionStatus::Applied);

        let second = executor.run(&plan, &CancellationToken::new()).await;
        assert_eq!(second.results[0].status, ExecutionStatus::Skipped);
        assert_eq!(second.exit_code(), 0);
    }

    /// COPY never removes its source, so the source still matches
    /// `source_hash` on a re-run; without the destination-first check this
    /// used to be mistaken for a fresh collision and copied a second time.
    #[tokio::test]
    async fn rerunning_completed_copy_plan_is_idempotent() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("a.txt");
        fs::write(&src, b"hello").unwrap();
        let dest = dir.path().join("out").join("a.txt");

        let plan = plan_of(item(src.clone(), dest.clone(), Action::Copy, sha256_of(b"hello"), 5), dir.path().to_path_buf());

        let executor = Executor::new(Mode::Apply, TEST_TIMEOUT);
        let first = executor.run(&plan, &CancellationToken::new()).await;
        assert_eq!(first.results[0].status, ExecutionStatus::Applied);
        assert!(src.exists(), "COPY must retain its source");

        let second = executor.run(&plan, &CancellationToken::new()).await;
        assert_eq!(second.results[0].status, ExecutionStatus::Skipped);
        assert_eq!(second.exit_code(), 0);

        // No `_v2` sibling should have appeared next to the original copy.
        assert!(!dest.with_file_name("a_v2.txt").exists());
    }

    #[tokio::test]
    async fn integrity_mismatch_removes_destination_and_fails_item() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("a.txt");
        fs::write(&src, b"hello").unwrap();
        let dest = dir.path().join("out").join("a.txt");

        // Deliberately wrong hash to trigger the integrity check.
        let plan = plan_of(item(src.clone(), dest.clone(), Action::Copy, sha256_of(b"WRONG"), 5), dir.path().to_path_buf());

        let executor = Executor::new(Mode::Apply, TEST_TIMEOUT);
        let manifest = executor.run(&plan, &CancellationToken::new()).await;

        assert_eq!(manifest.results[0].status, ExecutionStatus::Failed);
        assert_eq!(manifest.results[0].error_kind.as_deref(), Some("IntegrityError"));
        assert!(src.exists(), "source must be preserved on copy failure");
        assert!(!dest.exists(), "partial destination must be removed");
    }

    #[tokio::test]
    async fn cancellation_stops_before_remaining_items() {
        let dir = tempdir().unwrap();
        let src_a = dir.path().join("a.txt");
        let src_b = dir.path().join("b.txt");
        fs::write(&src_a, b"hello").unwrap();
        fs::write(&src_b, b"world").unwrap();
        let dest_a = dir.path().join("out").join("a.txt");
        let dest_b = dir.path().join("out").join("b.txt");

        let plan = Plan {
            plan_id: "p1".into(),
            generated_at: Utc::now(),
            base_root: dir.path().to_path_buf(),
            items: vec![
                item(src_a.clone(), dest_a.clone(), Action::Move, sha256_of(b"hello"), 5),
                item(src_b.clone(), dest_b.clone(), Action::Move, sha256_of(b"world"), 5),
            ],
        };

        let cancellation = CancellationToken::new();
        cancellation.cancel();

        let executor = Executor::new(Mode::Apply, TEST_TIMEOUT);
        let manifest = executor.run(&plan, &cancellation).await;

        assert!(manifest.results.is_empty());
        assert!(src_a.exists());
        assert!(src_b.exists());
    }
}
