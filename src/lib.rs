pub mod cancellation;
pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod extractor;
pub mod llm;
pub mod model;
pub mod pipeline;
pub mod planner;
pub mod rules;
pub mod scanner;

use tracing_subscriber::EnvFilter;

/// Loads `.env` (for LLM backend API keys) and initializes structured
/// logging. `--verbose`/`--quiet` set the default filter; `RUST_LOG`
/// always takes precedence when set.
pub fn init(verbose: bool, quiet: bool) {
    config::load_dotenv();

    let default_filter = if quiet {
        "warn"
    } else if verbose {
        "debug,fileorganizer=trace"
    } else {
        "warn,fileorganizer=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();
}
