//! Command execution.
//!
//! Wires config, models, ingestion, and the search/agent pipelines behind
//! the CLI surface. The chat command is an interactive REPL, so this
//! module talks to stdout directly.

#![allow(clippy::print_stdout)]

use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::agent::{AgentOptions, RagBackend, RagSearchTool, ReActAgent, SearchOnlineTool, ToolRegistry};
use crate::chunking::SentenceSplitter;
use crate::config::RagConfig;
use crate::error::{ConfigError, Result};
use crate::ingest::{IngestOptions, load_docs_for_build};
use crate::rag::{TinyRag, build_models};
use crate::search::{FusionOptions, Searcher};

use super::parser::{Cli, Commands};

/// Executes the parsed CLI command, returning the text to print.
///
/// # Errors
///
/// Propagates config, ingest, index, and pipeline errors.
pub fn execute(cli: &Cli) -> Result<String> {
    match &cli.command {
        Commands::Build { config, path } => run_build(config, path),
        Commands::Search {
            config,
            path,
            multi_db,
            question,
            topk,
        } => run_search(config, path, *multi_db, question, *topk),
        Commands::Chat {
            config,
            db_name,
            db_root_dir,
            question,
            topk,
            max_steps,
            llm_timeout_sec,
            ..
        } => run_chat(&ChatArgs {
            config,
            db_name,
            db_root_dir: db_root_dir.as_deref(),
            question: question.as_deref(),
            topk: *topk,
            max_steps: *max_steps,
            llm_timeout_sec: *llm_timeout_sec,
            show_steps: cli.command.show_steps(),
        }),
    }
}

fn load_config(path: &Path) -> Result<RagConfig> {
    Ok(RagConfig::load(path)?)
}

fn ingest_options(config: &RagConfig) -> IngestOptions {
    IngestOptions {
        json_text_key: config.json_text_key.clone(),
        recursive: true,
        suffix_allowlist: None,
        pdf_mode: config.pdf_mode(),
        splitter: SentenceSplitter::new(config.sentence_size),
    }
}

fn run_build(config_path: &Path, input: &Path) -> Result<String> {
    let mut config = load_config(config_path)?;
    config.source_path = input.display().to_string();

    let docs = load_docs_for_build(input, &ingest_options(&config))?;
    info!(count = docs.len(), "load docs success");

    let mut rag = TinyRag::from_config(config)?;
    rag.build(&docs)?;

    Ok(format!(
        "database built at {} ({} source documents)\n",
        rag.base_dir().display(),
        docs.len()
    ))
}

fn run_search(
    config_path: &Path,
    input: &Path,
    multi_db: bool,
    question: &str,
    topk: usize,
) -> Result<String> {
    let mut config = load_config(config_path)?;
    config.source_path = input.display().to_string();
    if multi_db {
        config.multi_db = true;
    }

    let mut rag = TinyRag::from_config(config)?;
    rag.load()?;
    let output = rag.search(question, topk)?;
    Ok(format!("{output}\n"))
}

struct ChatArgs<'a> {
    config: &'a Path,
    db_name: &'a str,
    db_root_dir: Option<&'a str>,
    question: Option<&'a str>,
    topk: usize,
    max_steps: usize,
    llm_timeout_sec: u64,
    show_steps: bool,
}

fn run_chat(args: &ChatArgs<'_>) -> Result<String> {
    let mut config = load_config(args.config)?;
    config.db_name = args.db_name.to_string();
    if let Some(root) = args.db_root_dir {
        config.db_root_dir = root.to_string();
    }

    let base_dir = config.resolve_db_dir()?;
    if !base_dir.is_dir() {
        return Err(ConfigError::DatabaseNotFound {
            path: base_dir.display().to_string(),
        }
        .into());
    }
    println!("数据库目录：{}", base_dir.display());

    let (llm, embedder, reranker) = build_models(&config)?;

    println!("开始加载数据库（大库可能需要几十秒到数分钟）...");
    let mut searcher = Searcher::new(embedder, reranker);
    searcher.load_db(&base_dir)?;
    let searcher = Arc::new(searcher);

    let fusion = FusionOptions {
        rrf_k: config.rrf_k,
        bm25_weight: config.bm25_weight,
        emb_weight: config.emb_weight,
    };
    let recall_factor = config.recall_factor.unwrap_or(4).max(1);

    let mut registry = ToolRegistry::new();
    registry.register(Box::new(RagSearchTool::new(
        RagBackend::Single(Arc::clone(&searcher)),
        Arc::clone(&llm),
        recall_factor,
        fusion,
    )))?;
    registry.register(Box::new(SearchOnlineTool::new()))?;

    let agent = ReActAgent::new(
        Arc::clone(&llm),
        registry,
        AgentOptions {
            max_steps: args.max_steps,
            default_topk: args.topk,
            max_tool_calls: 2,
            llm_timeout: Duration::from_secs(args.llm_timeout_sec.max(1)),
        },
    );

    println!("ReAct agent 就绪。");

    if let Some(question) = args.question {
        let run = agent.run(question)?;
        if args.show_steps && !run.history.is_empty() {
            println!("\n--- 步骤历史 ---\n{}\n", run.history);
        }
        return Ok(format!("{}\n", run.answer));
    }

    println!("输入 exit/quit 退出。");
    let stdin = std::io::stdin();
    loop {
        print!("\n用户> ");
        std::io::stdout().flush().ok();

        let mut line = String::new();
        let read = stdin.lock().read_line(&mut line)?;
        if read == 0 {
            break; // EOF
        }
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question.to_lowercase().as_str(), "exit" | "quit" | "q") {
            break;
        }

        let run = agent.run(question)?;
        if args.show_steps && !run.history.is_empty() {
            println!("\n--- 步骤历史 ---\n{}", run.history);
        }
        println!("\n助手>\n{}", run.answer);
    }

    Ok(String::new())
}
