use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use fileorganizer::cancellation::CancellationToken;
use fileorganizer::cli::{Cli, Command};
use fileorganizer::config::{AppConfig, BackendEnv, BackendKind, RulesConfig};
use fileorganizer::error::OrganizerError;
use fileorganizer::executor::manifest::ManifestWriter;
use fileorganizer::executor::{Executor, Mode};
use fileorganizer::llm::backend::LlmBackend;
use fileorganizer::llm::gemini::GeminiBackend;
use fileorganizer::llm::ollama::OllamaBackend;
use fileorganizer::llm::openai::OpenAiBackend;
use fileorganizer::model::Plan;
use fileorganizer::planner;
use tracing::error;

/// Installed once per run: cancels `token` on Ctrl+C so an in-progress
/// scan/plan/execute stops starting new work instead of being killed
/// mid-mutation (spec §5).
fn install_ctrl_c_handler(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    fileorganizer::init(cli.verbose, cli.quiet);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build async runtime");

    let code = runtime.block_on(run(cli));
    ExitCode::from(code as u8)
}

fn backend_kind_from_cli(cli: &Cli) -> BackendKind {
    if cli.gemini {
        BackendKind::Gemini
    } else if cli.openai {
        BackendKind::OpenAi
    } else if cli.rules_only {
        BackendKind::RulesOnly
    } else {
        BackendKind::Local
    }
}

fn build_backend(
    kind: BackendKind,
    model: Option<String>,
    timeout_secs: u64,
) -> Option<Result<Arc<dyn LlmBackend>, OrganizerError>> {
    let env = BackendEnv::from_env();
    let timeout = std::time::Duration::from_secs(timeout_secs);

    match kind {
        BackendKind::RulesOnly => None,
        BackendKind::Local => Some(Ok(Arc::new(OllamaBackend::new(env.ollama_base_url, model, timeout)))),
        BackendKind::Gemini => match env.google_api_key {
            Some(key) => Some(Ok(Arc::new(GeminiBackend::new(key, model, timeout)))),
            None => Some(Err(OrganizerError::Config(
                "--gemini requires GOOGLE_API_KEY to be set".into(),
            ))),
        },
        BackendKind::OpenAi => match env.openai_api_key {
            Some(key) => Some(Ok(Arc::new(OpenAiBackend::new(key, model, timeout)))),
            None => Some(Err(OrganizerError::Config(
                "--openai requires OPENAI_API_KEY to be set".into(),
            ))),
        },
    }
}

async fn run(cli: Cli) -> i32 {
    let backend_kind = backend_kind_from_cli(&cli);

    match &cli.command {
        Command::Info => run_info(backend_kind, cli.model.clone()).await,
        Command::Scan { dir } => run_scan(dir).await,
        Command::Plan {
            dir,
            destination,
            rules,
            rules_only,
            copy,
            min_confidence,
        } => {
            let effective_kind = if *rules_only { BackendKind::RulesOnly } else { backend_kind };
            run_plan(
                dir.clone(),
                destination.clone(),
                rules.clone(),
                effective_kind,
                cli.model.clone(),
                *copy,
                *min_confidence,
            )
            .await
        }
        Command::Execute { plan_file, apply } => run_execute(plan_file, *apply).await,
    }
}

async fn run_info(backend_kind: BackendKind, model: Option<String>) -> i32 {
    let config = AppConfig::default();
    println!("fileorganizer {}", env!("CARGO_PKG_VERSION"));
    println!("base root: {}", config.base_root.display());
    println!("confidence threshold: {}", config.confidence_threshold);
    println!("backend: {backend_kind:?}");

    if let Some(result) = build_backend(backend_kind, model, config.llm_timeout_secs) {
        match result {
            Ok(backend) => match backend.health_check().await {
                Ok(()) => println!("backend health check: ok"),
                Err(e) => println!("backend health check: failed ({e})"),
            },
            Err(e) => println!("backend configuration error: {e}"),
        }
    } else {
        println!("backend health check: skipped (rules-only mode)");
    }

    0
}

async fn run_scan(dir: &std::path::Path) -> i32 {
    if !dir.exists() {
        error!(dir = %dir.display(), "scan root does not exist");
        return 2;
    }

    let config = AppConfig::default();
    let cancellation = CancellationToken::new();
    install_ctrl_c_handler(cancellation.clone());
    let scanner = fileorganizer::scanner::Scanner::new(&config);
    let (records, stats) = scanner
        .scan(
            &[dir.to_path_buf()],
            Duration::from_secs(config.file_op_timeout_secs),
            &cancellation,
        )
        .await;

    println!("scanned {} files under {}", records.len(), dir.display());
    println!("  skipped (excluded dir subtree): {}", stats.directories_skipped);
    println!("  skipped (excluded extension): {}", stats.files_skipped_excluded_ext);
    println!("  skipped (below size threshold): {}", stats.files_skipped_too_small);
    println!("  skipped (unreadable): {}", stats.files_skipped_unreadable);

    0
}

async fn run_plan(
    dir: PathBuf,
    destination: Option<PathBuf>,
    rules_path: Option<PathBuf>,
    backend_kind: BackendKind,
    model: Option<String>,
    copy: bool,
    min_confidence: Option<u8>,
) -> i32 {
    if !dir.exists() {
        error!(dir = %dir.display(), "plan root does not exist");
        return 2;
    }

    let mut config = AppConfig::default();
    if let Some(base_root) = destination {
        config.base_root = base_root;
    }
    config.copy_mode = copy;
    if let Some(threshold) = min_confidence {
        config.confidence_threshold = threshold;
    }
    let config = Arc::new(config);

    let rules = match rules_path {
        Some(path) => match RulesConfig::load(&path) {
            Ok(r) => r,
            Err(e) => {
                error!(error = %e, "failed to load rules file");
                return 2;
            }
        },
        None => RulesConfig::default(),
    };
    let rules = Arc::new(rules);

    let backend: Option<Arc<dyn LlmBackend>> = match build_backend(backend_kind, model, config.llm_timeout_secs) {
        None => None,
        Some(Err(e)) => {
            error!(error = %e, "backend configuration error");
            return 2;
        }
        Some(Ok(backend)) => {
            if let Err(e) = backend.health_check().await {
                error!(error = %e, "LLM backend health check failed");
                return 2;
            }
            Some(backend)
        }
    };

    let cancellation = CancellationToken::new();
    install_ctrl_c_handler(cancellation.clone());

    let output = fileorganizer::pipeline::run(Arc::clone(&config), rules, vec![dir], backend, cancellation).await;

    let existing = fileorganizer::pipeline::existing_destination_paths(&config.base_root);
    let plan = match planner::build_plan(&config, output.classified, &existing) {
        Ok(plan) => plan,
        Err(e) => {
            error!(error = %e, "failed to build plan");
            return 2;
        }
    };

    if let Err(e) = write_plan_artifacts(&config.plans_dir, &plan) {
        error!(error = %e, "failed to write plan artifacts");
        return 2;
    }

    println!("plan {} generated with {} items", plan.plan_id, plan.items.len());
    0
}

fn write_plan_artifacts(plans_dir: &std::path::Path, plan: &Plan) -> std::io::Result<()> {
    std::fs::create_dir_all(plans_dir)?;
    let (structured_name, human_name) = planner::artifact_names(plan);

    let json = serde_json::to_string_pretty(plan).expect("plan always serializes");
    std::fs::write(plans_dir.join(structured_name), json)?;

    let summary = planner::render_human_summary(plan);
    std::fs::write(plans_dir.join(human_name), summary)?;

    Ok(())
}

async fn run_execute(plan_file: &std::path::Path, apply: bool) -> i32 {
    let text = match std::fs::read_to_string(plan_file) {
        Ok(t) => t,
        Err(e) => {
            error!(error = %e, "failed to read plan file");
            return 2;
        }
    };

    let plan: Plan = match serde_json::from_str(&text) {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "plan file is corrupt");
            return 2;
        }
    };

    let config = AppConfig::default();
    let cancellation = CancellationToken::new();
    install_ctrl_c_handler(cancellation.clone());

    let mode = if apply { Mode::Apply } else { Mode::DryRun };
    let executor = Executor::new(mode, Duration::from_secs(config.file_op_timeout_secs));
    let manifest = executor.run(&plan, &cancellation).await;

    let writer = ManifestWriter::new(config.logs_dir);
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
    if let Err(e) = writer.write(&manifest, &timestamp) {
        error!(error = %e, "failed to persist manifest");
        return 1;
    }

    println!(
        "executed plan {} ({} results, mode={})",
        manifest.plan_id,
        manifest.results.len(),
        if apply { "apply" } else { "dry-run" }
    );

    manifest.exit_code()
}
