//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// tinyrag-rs: hybrid retrieval with a ReAct agent loop.
///
/// Build a database from raw documents, query it directly, or chat
/// through the tool-using agent.
#[derive(Parser, Debug)]
#[command(name = "tinyrag-rs")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output (debug-level logs).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest an input file or directory and build a database.
    ///
    /// The database is named after the input basename and created under
    /// the configured database root.
    Build {
        /// Path to the JSON config file.
        #[arg(short, long)]
        config: PathBuf,

        /// Input file or directory to ingest.
        #[arg(short, long)]
        path: PathBuf,
    },

    /// Load a database and answer one query through the direct RAG path.
    Search {
        /// Path to the JSON config file.
        #[arg(short, long)]
        config: PathBuf,

        /// Input path the database was built from (names the database).
        #[arg(short, long)]
        path: PathBuf,

        /// Fan recall out over every database under the configured root.
        #[arg(long)]
        multi_db: bool,

        /// The question to answer.
        #[arg(short, long, default_value = "请介绍一下南京")]
        question: String,

        /// Number of evidence passages to keep.
        #[arg(long, default_value = "6")]
        topk: usize,
    },

    /// Run the ReAct agent loop; interactive when no question is given.
    Chat {
        /// Path to the JSON config file.
        #[arg(short, long)]
        config: PathBuf,

        /// Database name (directory under the configured root).
        #[arg(long)]
        db_name: String,

        /// Override the configured database root.
        #[arg(long)]
        db_root_dir: Option<String>,

        /// Non-interactive mode: answer one question and exit.
        #[arg(short, long)]
        question: Option<String>,

        /// Default topk injected into tool calls.
        #[arg(long, default_value = "5")]
        topk: usize,

        /// Hard cap on agent loop iterations.
        #[arg(long, default_value = "6")]
        max_steps: usize,

        /// Wall-clock deadline per LLM call, in seconds.
        #[arg(long, default_value = "180")]
        llm_timeout_sec: u64,

        /// Print each step's history after the answer (default on).
        #[arg(long, overrides_with = "no_show_steps")]
        show_steps: bool,

        /// Suppress the per-step history output.
        #[arg(long)]
        no_show_steps: bool,
    },
}

impl Commands {
    /// Effective show-steps flag for `chat` (defaults to on).
    #[must_use]
    pub const fn show_steps(&self) -> bool {
        match self {
            Self::Chat { no_show_steps, .. } => !*no_show_steps,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_structure_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_build() {
        let cli = Cli::parse_from(["tinyrag-rs", "build", "--config", "c.json", "--path", "data/raw"]);
        match cli.command {
            Commands::Build { config, path } => {
                assert_eq!(config, PathBuf::from("c.json"));
                assert_eq!(path, PathBuf::from("data/raw"));
            }
            other => panic!("expected Build, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_search_multi_db() {
        let cli = Cli::parse_from([
            "tinyrag-rs", "search", "--config", "c.json", "--path", "data/raw/wiki.json", "--multi-db",
        ]);
        match cli.command {
            Commands::Search {
                multi_db, question, topk, ..
            } => {
                assert!(multi_db);
                assert_eq!(topk, 6);
                assert!(!question.is_empty());
            }
            other => panic!("expected Search, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_chat_defaults() {
        let cli = Cli::parse_from(["tinyrag-rs", "chat", "--config", "c.json", "--db-name", "law"]);
        assert!(cli.command.show_steps());
        match cli.command {
            Commands::Chat {
                db_name,
                question,
                topk,
                max_steps,
                llm_timeout_sec,
                ..
            } => {
                assert_eq!(db_name, "law");
                assert!(question.is_none());
                assert_eq!(topk, 5);
                assert_eq!(max_steps, 6);
                assert_eq!(llm_timeout_sec, 180);
            }
            other => panic!("expected Chat, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_chat_no_show_steps() {
        let cli = Cli::parse_from([
            "tinyrag-rs", "chat", "--config", "c.json", "--db-name", "law", "--no-show-steps",
        ]);
        assert!(!cli.command.show_steps());
    }
}
