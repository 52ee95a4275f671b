//! Command-line interface.
//!
//! `build` ingests and indexes a corpus, `search` answers one query
//! through the direct RAG path, and `chat` runs the ReAct agent loop.

pub mod commands;
pub mod parser;

pub use commands::execute;
pub use parser::{Cli, Commands};
