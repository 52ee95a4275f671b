//! Document ingestion.
//!
//! Reads heterogeneous inputs (plain text, Markdown, PDF, JSON/JSONL
//! records) into ordered [`Document`]s with source metadata, ready for
//! chunking. Unsupported extensions are skipped with a warning; unreadable
//! files abort the build.

pub mod pdf;

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::chunking::SentenceSplitter;
use crate::config::PdfMode;
use crate::error::{IngestError, Result};
use crate::passage::{DocType, PassageMeta, make_doc_id};

/// A source document before chunking: raw text plus origin metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Deterministic document id.
    pub id: String,
    /// Raw text content.
    pub text: String,
    /// Origin metadata carried through to every chunk.
    pub meta: PassageMeta,
}

/// Options controlling ingestion.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Key used to pull text out of JSON/JSONL records.
    pub json_text_key: String,
    /// Recurse into subdirectories.
    pub recursive: bool,
    /// Restrict to these extensions (lowercase, no dot). `None` = all
    /// recognized types.
    pub suffix_allowlist: Option<Vec<String>>,
    /// PDF interpretation mode.
    pub pdf_mode: PdfMode,
    /// Sentence splitter used by the PDF reader's merge pass.
    pub splitter: SentenceSplitter,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            json_text_key: "completion".to_string(),
            recursive: true,
            suffix_allowlist: None,
            pdf_mode: PdfMode::Plain,
            splitter: SentenceSplitter::default(),
        }
    }
}

/// Loads an input file or directory into documents for a build.
///
/// Files are visited in sorted path order so rebuilds see identical input
/// order.
///
/// # Errors
///
/// Returns [`IngestError::InputNotFound`] for a missing input, and
/// propagates read/parse failures (fatal to the build).
pub fn load_docs_for_build(input: &Path, options: &IngestOptions) -> Result<Vec<Document>> {
    if !input.exists() {
        return Err(IngestError::InputNotFound {
            path: input.display().to_string(),
        }
        .into());
    }

    let mut files = Vec::new();
    if input.is_dir() {
        collect_files(input, options.recursive, &mut files)?;
        files.sort();
    } else {
        files.push(input.to_path_buf());
    }

    let mut docs = Vec::new();
    for file in files {
        let Some(ext) = file
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
        else {
            continue;
        };
        if let Some(allow) = &options.suffix_allowlist
            && !allow.iter().any(|a| a == &ext)
        {
            continue;
        }

        match DocType::from_extension(&ext) {
            Some(DocType::Pdf) => match options.pdf_mode {
                PdfMode::Plain => docs.extend(pdf::read_plain_pdf(&file, &options.splitter)?),
                PdfMode::Case => docs.extend(pdf::read_case_pdf(&file)?),
            },
            Some(DocType::Txt) => {
                if let Some(doc) = read_single_text(&file, DocType::Txt)? {
                    docs.push(doc);
                }
            }
            Some(DocType::Md) => {
                if let Some(doc) = read_markdown(&file)? {
                    docs.push(doc);
                }
            }
            Some(DocType::Json | DocType::Jsonl) => {
                docs.extend(read_json_records(&file, &ext, &options.json_text_key)?);
            }
            Some(DocType::Docx | DocType::Pptx) => {
                warn!(path = %file.display(), "office formats are not supported, skipping");
            }
            None => {
                warn!(path = %file.display(), "unsupported file type, skipping");
            }
        }
    }

    Ok(docs)
}

/// Collects files under a directory, optionally recursing.
fn collect_files(dir: &Path, recursive: bool, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir).map_err(|e| IngestError::ReadFailed {
        path: dir.display().to_string(),
        reason: e.to_string(),
    })? {
        let entry = entry.map_err(|e| IngestError::ReadFailed {
            path: dir.display().to_string(),
            reason: e.to_string(),
        })?;
        let path = entry.path();
        if path.is_dir() {
            if recursive {
                collect_files(&path, recursive, out)?;
            }
        } else {
            out.push(path);
        }
    }
    Ok(())
}

/// Reads a file as text, tolerating non-UTF-8 bytes.
fn read_text_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| IngestError::ReadFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Reads a whole-file text document (txt).
fn read_single_text(path: &Path, doc_type: DocType) -> Result<Option<Document>> {
    let text = read_text_file(path)?;
    if text.trim().is_empty() {
        return Ok(None);
    }
    let source_path = path.display().to_string();
    let doc_id = make_doc_id(&source_path, 0, 0);
    let meta = PassageMeta {
        source_path: Some(source_path),
        doc_id: Some(doc_id.clone()),
        doc_type: Some(doc_type),
        ..PassageMeta::default()
    };
    Ok(Some(Document {
        id: doc_id,
        text,
        meta,
    }))
}

#[allow(clippy::unwrap_used)]
static CODE_FENCE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)```.*?```").unwrap());
#[allow(clippy::unwrap_used)]
static IMAGE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"!\[([^\]]*)\]\([^)]*\)").unwrap());
#[allow(clippy::unwrap_used)]
static LINK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\([^)]*\)").unwrap());
#[allow(clippy::unwrap_used)]
static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s{0,3}#{1,6}\s*").unwrap());
#[allow(clippy::unwrap_used)]
static EMPHASIS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[*_]{1,3}([^*_]+)[*_]{1,3}").unwrap());
#[allow(clippy::unwrap_used)]
static BLOCKQUOTE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s{0,3}>\s?").unwrap());

/// Strips Markdown syntax down to plain text.
#[must_use]
pub fn markdown_to_text(raw: &str) -> String {
    let text = CODE_FENCE_RE.replace_all(raw, " ");
    let text = IMAGE_RE.replace_all(&text, "$1");
    let text = LINK_RE.replace_all(&text, "$1");
    let text = HEADING_RE.replace_all(&text, "");
    let text = BLOCKQUOTE_RE.replace_all(&text, "");
    let text = EMPHASIS_RE.replace_all(&text, "$1");
    text.replace('`', "")
}

/// Reads a Markdown document, stripped to plain text.
fn read_markdown(path: &Path) -> Result<Option<Document>> {
    let raw = read_text_file(path)?;
    let text = markdown_to_text(&raw);
    if text.trim().is_empty() {
        return Ok(None);
    }
    let source_path = path.display().to_string();
    let doc_id = make_doc_id(&source_path, 0, 0);
    let meta = PassageMeta {
        source_path: Some(source_path),
        doc_id: Some(doc_id.clone()),
        doc_type: Some(DocType::Md),
        ..PassageMeta::default()
    };
    Ok(Some(Document {
        id: doc_id,
        text,
        meta,
    }))
}

/// Recursively collects every string stored under `text_key`.
fn extract_texts(value: &serde_json::Value, text_key: &str, out: &mut Vec<String>) {
    match value {
        serde_json::Value::String(s) => out.push(s.clone()),
        serde_json::Value::Array(items) => {
            for item in items {
                extract_texts(item, text_key, out);
            }
        }
        serde_json::Value::Object(map) => {
            if let Some(serde_json::Value::String(s)) = map.get(text_key) {
                out.push(s.clone());
            }
        }
        _ => {}
    }
}

/// Reads JSON/JSONL text records, one document per non-empty record.
fn read_json_records(path: &Path, ext: &str, text_key: &str) -> Result<Vec<Document>> {
    let raw = read_text_file(path)?;
    let doc_type = if ext == "jsonl" {
        DocType::Jsonl
    } else {
        DocType::Json
    };

    let mut texts = Vec::new();
    if doc_type == DocType::Jsonl {
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let value: serde_json::Value =
                serde_json::from_str(line).map_err(|e| IngestError::ParseFailed {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
            extract_texts(&value, text_key, &mut texts);
        }
    } else {
        let value: serde_json::Value =
            serde_json::from_str(&raw).map_err(|e| IngestError::ParseFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        extract_texts(&value, text_key, &mut texts);
    }

    let source_path = path.display().to_string();
    Ok(texts
        .into_iter()
        .filter(|t| !t.trim().is_empty())
        .enumerate()
        .map(|(record_index, text)| {
            let doc_id = make_doc_id(&source_path, 0, record_index);
            let meta = PassageMeta {
                source_path: Some(source_path.clone()),
                doc_id: Some(doc_id.clone()),
                record_index: Some(record_index),
                doc_type: Some(doc_type),
                text_key: Some(text_key.to_string()),
                ..PassageMeta::default()
            };
            Document {
                id: doc_id,
                text,
                meta,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_missing_input() {
        let result = load_docs_for_build(Path::new("/nonexistent/input"), &IngestOptions::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_txt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "南京是一座历史文化名城。").unwrap();

        let docs = load_docs_for_build(&path, &IngestOptions::default()).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].meta.doc_type, Some(DocType::Txt));
        assert!(docs[0].text.contains("南京"));
        assert!(docs[0].meta.doc_id.is_some());
    }

    #[test]
    fn test_empty_txt_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.txt");
        fs::write(&path, "   \n  ").unwrap();

        let docs = load_docs_for_build(&path, &IngestOptions::default()).unwrap();
        assert!(docs.is_empty());
    }

    #[test]
    fn test_markdown_stripped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.md");
        fs::write(
            &path,
            "# Title\n\nSome **bold** text with a [link](https://example.com).\n\n```rust\ncode here\n```\n",
        )
        .unwrap();

        let docs = load_docs_for_build(&path, &IngestOptions::default()).unwrap();
        assert_eq!(docs.len(), 1);
        let text = &docs[0].text;
        assert!(text.contains("bold"));
        assert!(text.contains("link"));
        assert!(!text.contains('#'));
        assert!(!text.contains("https://example.com"));
        assert!(!text.contains("code here"));
    }

    #[test]
    fn test_jsonl_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.jsonl");
        fs::write(
            &path,
            "{\"completion\": \"第一条记录\"}\n{\"completion\": \"第二条记录\"}\n{\"other\": \"ignored\"}\n",
        )
        .unwrap();

        let docs = load_docs_for_build(&path, &IngestOptions::default()).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].meta.record_index, Some(0));
        assert_eq!(docs[1].meta.record_index, Some(1));
        assert_ne!(docs[0].id, docs[1].id);
        assert_eq!(docs[0].meta.doc_type, Some(DocType::Jsonl));
    }

    #[test]
    fn test_json_array_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        fs::write(
            &path,
            r#"[{"completion": "甲"}, {"completion": "乙"}, "裸字符串"]"#,
        )
        .unwrap();

        let docs = load_docs_for_build(&path, &IngestOptions::default()).unwrap();
        assert_eq!(docs.len(), 3);
    }

    #[test]
    fn test_json_custom_text_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        fs::write(&path, r#"[{"body": "内容"}]"#).unwrap();

        let options = IngestOptions {
            json_text_key: "body".to_string(),
            ..IngestOptions::default()
        };
        let docs = load_docs_for_build(&path, &options).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].meta.text_key.as_deref(), Some("body"));
    }

    #[test]
    fn test_invalid_json_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();

        let result = load_docs_for_build(&path, &IngestOptions::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_directory_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.txt"), "乙文件内容").unwrap();
        fs::write(dir.path().join("a.txt"), "甲文件内容").unwrap();
        fs::write(dir.path().join("c.exe"), "binary").unwrap();

        let docs = load_docs_for_build(dir.path(), &IngestOptions::default()).unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs[0].meta.source_path.as_deref().unwrap().ends_with("a.txt"));
        assert!(docs[1].meta.source_path.as_deref().unwrap().ends_with("b.txt"));
    }

    #[test]
    fn test_suffix_allowlist() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "文本").unwrap();
        fs::write(dir.path().join("b.md"), "标记").unwrap();

        let options = IngestOptions {
            suffix_allowlist: Some(vec!["md".to_string()]),
            ..IngestOptions::default()
        };
        let docs = load_docs_for_build(dir.path(), &options).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].meta.doc_type, Some(DocType::Md));
    }

    #[test]
    fn test_recursive_directory() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("nested");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("deep.txt"), "深层文件").unwrap();

        let docs = load_docs_for_build(dir.path(), &IngestOptions::default()).unwrap();
        assert_eq!(docs.len(), 1);

        let options = IngestOptions {
            recursive: false,
            ..IngestOptions::default()
        };
        let docs = load_docs_for_build(dir.path(), &options).unwrap();
        assert!(docs.is_empty());
    }

    #[test]
    fn test_markdown_to_text_rules() {
        let text = markdown_to_text("## Heading\n> quote\n*em* and `code`");
        assert!(!text.contains('#'));
        assert!(!text.contains('>'));
        assert!(!text.contains('*'));
        assert!(!text.contains('`'));
        assert!(text.contains("Heading"));
        assert!(text.contains("quote"));
        assert!(text.contains("em"));
        assert!(text.contains("code"));
    }
}
