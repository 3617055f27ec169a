//! Command-line surface (spec §6).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "fileorganizer", author, version, about = "Scan, classify, plan and execute file organization", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase log verbosity (overridden by RUST_LOG if set).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all but warning/error output.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Use the local Ollama backend.
    #[arg(long, global = true, conflicts_with_all = ["gemini", "openai", "rules_only"])]
    pub local: bool,

    /// Use the Gemini backend.
    #[arg(long, global = true, conflicts_with_all = ["local", "openai", "rules_only"])]
    pub gemini: bool,

    /// Use the OpenAI backend.
    #[arg(long, global = true, conflicts_with_all = ["local", "gemini", "rules_only"])]
    pub openai: bool,

    /// Disable the LLM classifier entirely; unresolved files go to inbox.
    #[arg(long, global = true, conflicts_with_all = ["local", "gemini", "openai"])]
    pub rules_only: bool,

    /// Model name override passed to the selected backend.
    #[arg(long, global = true)]
    pub model: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print backend and configuration status.
    Info,

    /// Print scan statistics for one or more root directories.
    Scan {
        dir: PathBuf,
    },

    /// Generate a plan for one or more root directories.
    Plan {
        dir: PathBuf,

        #[arg(long)]
        destination: Option<PathBuf>,

        #[arg(long)]
        rules: Option<PathBuf>,

        #[arg(long)]
        rules_only: bool,

        #[arg(long)]
        copy: bool,

        #[arg(long)]
        min_confidence: Option<u8>,
    },

    /// Execute a previously generated plan file.
    Execute {
        plan_file: PathBuf,

        /// Perform real filesystem mutations; default is dry-run.
        #[arg(long)]
        apply: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plan_subcommand_with_flags() {
        let cli = Cli::parse_from([
            "fileorganizer",
            "--gemini",
            "plan",
            "/tmp/in",
            "--copy",
            "--min-confidence",
            "90",
        ]);
        assert!(cli.gemini);
        match cli.command {
            Command::Plan { dir, copy, min_confidence, .. } => {
                assert_eq!(dir, PathBuf::from("/tmp/in"));
                assert!(copy);
                assert_eq!(min_confidence, Some(90));
            }
            _ => panic!("expected Plan subcommand"),
        }
    }

    #[test]
    fn backend_selectors_are_mutually_exclusive() {
        let result = Cli::try_parse_from(["fileorganizer", "--local", "--gemini", "info"]);
        assert!(result.is_err());
    }

    #[test]
    fn execute_defaults_to_dry_run() {
        let cli = Cli::parse_from(["fileorganizer", "execute", "plans/plan_1.json"]);
        match cli.command {
            Command::Execute { apply, .. } => assert!(!apply),
            _ => panic!("expected Execute subcommand"),
        }
    }
}
