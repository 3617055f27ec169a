//! Bounded-queue orchestration across Scan → Extract → Rule/LLM → Plan →
//! Execute (spec §5).
//!
//! Scan feeds a bounded channel, hashing each file on its own
//! timeout-bounded blocking task; a small fixed pool of Extract workers
//! drains it, running the inline rule match, and forwards unresolved
//! records into a second bounded channel for the LLM worker pool.
//! Planning and Execution stay single-threaded consumers, as the spec
//! requires no concurrency between PlanItems.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cancellation::CancellationToken;
use crate::config::{AppConfig, RulesConfig};
use crate::llm::LlmBackend;
use crate::model::{Classification, FileRecord};
use crate::scanner::{ScanStats, Scanner};

/// Output of the Scan/Extract/Classify stages: every FileRecord paired
/// with its Classification, ready for the Planner.
pub struct PipelineOutput {
    pub classified: Vec<(FileRecord, Classification)>,
    pub scan_stats: ScanStats,
}

/// Runs Scan, Extract, Rule-match and (when `backend` is present)
/// LLM-classify for every root, returning the classified records.
///
/// `backend` is `None` in rules-only mode: unresolved files go straight to
/// the inbox fallback without any network call, matching the CLI's
/// `--rules-only` selector (spec §6).
pub async fn run(
    config: Arc<AppConfig>,
    rules: Arc<RulesConfig>,
    roots: Vec<PathBuf>,
    backend: Option<Arc<dyn LlmBackend>>,
    cancellation: CancellationToken,
) -> PipelineOutput {
    let file_op_timeout = Duration::from_secs(config.file_op_timeout_secs);

    let (scanned, scan_stats) = {
        let scanner = Scanner::new(&config);
        scanner.scan(&roots, file_op_timeout, &cancellation).await
    };

    info!(files = scanned.len(), "scan complete");

    let (record_tx, record_rx) = mpsc::channel::<FileRecord>(crate::config::DEFAULT_SCAN_QUEUE_CAPACITY);
    for record in scanned {
        if record_tx.send(record).await.is_err() {
            break;
        }
    }
    drop(record_tx);

    let extracted = run_extract_stage(config.extract_workers, file_op_timeout, cancellation.clone(), record_rx).await;

    let (resolved, unresolved): (Vec<_>, Vec<_>) = extracted
        .into_iter()
        .map(|record| {
            let view = crate::rules::RuleView::from(&record);
            let classification = crate::rules::classify(&rules.rules, &view);
            (record, classification)
        })
        .partition(|(_, classification)| classification.is_some());

    let mut classified: Vec<(FileRecord, Classification)> = resolved
        .into_iter()
        .map(|(record, classification)| (record, classification.unwrap()))
        .collect();

    let unresolved_records: Vec<FileRecord> = unresolved.into_iter().map(|(r, _)| r).collect();

    if !unresolved_records.is_empty() {
        let llm_results = match &backend {
            Some(backend) => {
                run_llm_stage(
                    config.llm_concurrency,
                    config.llm_requests_per_minute,
                    Arc::clone(backend),
                    unresolved_records,
                    cancellation.clone(),
                )
                .await
            }
            None => unresolved_records
                .into_iter()
                .map(|record| {
                    let classification = crate::llm::backend_unavailable_fallback(&record);
                    (record, classification)
                })
                .collect(),
        };
        classified.extend(llm_results);
    }

    classified.sort_by(|a, b| a.0.path.cmp(&b.0.path));

    PipelineOutput {
        classified,
        scan_stats,
    }
}

/// Runs a small fixed pool of Extract workers over `record_rx`, returning
/// every enriched FileRecord. Each extraction runs on its own blocking
/// task bounded by `file_op_timeout` (spec §5); a timed-out or panicked
/// extraction falls back to the unenriched record rather than dropping it.
/// `cancellation` is checked before a worker pulls its next record, so a
/// triggered run deadline stops new extractions from starting.
async fn run_extract_stage(
    workers: usize,
    file_op_timeout: Duration,
    cancellation: CancellationToken,
    record_rx: mpsc::Receiver<FileRecord>,
) -> Vec<FileRecord> {
    let record_rx = Arc::new(tokio::sync::Mutex::new(record_rx));
    let mut handles: Vec<JoinHandle<Vec<FileRecord>>> = Vec::with_capacity(workers.max(1));

    for _ in 0..workers.max(1) {
        let record_rx = Arc::clone(&record_rx);
        let cancellation = cancellation.clone();
        handles.push(tokio::spawn(async move {
            let mut out = Vec::new();
            loop {
                if cancellation.is_cancelled() {
                    break;
                }
                let next = {
                    let mut rx = record_rx.lock().await;
                    rx.recv().await
                };
                match next {
                    Some(record) => {
                        let fallback = record.clone();
                        let enriched = match tokio::time::timeout(
                            file_op_timeout,
                            tokio::task::spawn_blocking(move || crate::extractor::extract(record)),
                        )
                        .await
                        {
                            Ok(Ok(enriched)) => enriched,
                            Ok(Err(_join_err)) => {
                                warn!(path = %fallback.path.display(), "extract task panicked, keeping unenriched record");
                                fallback
                            }
                            Err(_elapsed) => {
                                warn!(path = %fallback.path.display(), "extraction timed out, keeping unenriched record");
                                fallback
                            }
                        };
                        out.push(enriched);
                    }
                    None => break,
                }
            }
            out
        }));
    }

    let mut all = Vec::new();
    for handle in handles {
        if let Ok(mut batch) = handle.await {
            all.append(&mut batch);
        }
    }
    all
}

/// Runs the LLM worker pool: bounded concurrency, shared rate limiter,
/// one classification per unresolved record. `cancellation` is checked
/// before each record is dispatched so a triggered run deadline stops new
/// classification requests from starting; requests already in flight run
/// to completion (bounded by the backend's own per-request timeout).
async fn run_llm_stage(
    concurrency: usize,
    requests_per_minute: u32,
    backend: Arc<dyn LlmBackend>,
    records: Vec<FileRecord>,
    cancellation: CancellationToken,
) -> Vec<(FileRecord, Classification)> {
    let limiter = Arc::new(crate::llm::ratelimit::RateLimiter::new(requests_per_minute));
    let semaphore = Arc::new(tokio::sync::Semaphore::new(concurrency.max(1)));

    let mut handles = Vec::with_capacity(records.len());
    for record in records {
        if cancellation.is_cancelled() {
            break;
        }
        let backend = Arc::clone(&backend);
        let limiter = Arc::clone(&limiter);
        let semaphore = Arc::clone(&semaphore);
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            limiter.acquire().await;
            let classification = crate::llm::classify(backend.as_ref(), &record).await;
            (record, classification)
        }));
    }

    let mut out = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(pair) => out.push(pair),
            Err(e) => warn!(error = %e, "LLM classification task panicked"),
        }
    }
    out
}

/// Destinations already present on disk under `base_root`, consulted by
/// the Planner's collision check before any plan item is emitted.
pub fn existing_destination_paths(base_root: &std::path::Path) -> HashSet<PathBuf> {
    let mut set = HashSet::new();
    if !base_root.exists() {
        return set;
    }
    for entry in walkdir::WalkDir::new(base_root)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if entry.file_type().is_file() {
            set.insert(entry.path().to_path_buf());
        }
    }
    set
}
