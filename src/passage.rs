//! Passage representation for tinyrag-rs.
//!
//! Passages (chunks) are the atomic retrieval unit. Each passage carries a
//! deterministic identifier derived from its immutable origin, the indexed
//! text, an optional alternate lexical-index string, and structural
//! metadata (statute location, case sections, page ranges, source URL).

use std::fmt;
use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};

/// Source document type recognized by ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocType {
    /// PDF document (paginated).
    Pdf,
    /// Plain text file.
    Txt,
    /// Markdown file.
    Md,
    /// Word document.
    Docx,
    /// PowerPoint document.
    Pptx,
    /// Single JSON file with text records.
    Json,
    /// JSON-lines file with one record per line.
    Jsonl,
}

impl DocType {
    /// Parses a file extension (without dot, lowercase) into a doc type.
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "pdf" => Some(Self::Pdf),
            "txt" => Some(Self::Txt),
            "md" => Some(Self::Md),
            "docx" => Some(Self::Docx),
            "pptx" => Some(Self::Pptx),
            "json" => Some(Self::Json),
            "jsonl" => Some(Self::Jsonl),
            _ => None,
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pdf => "pdf",
            Self::Txt => "txt",
            Self::Md => "md",
            Self::Docx => "docx",
            Self::Pptx => "pptx",
            Self::Json => "json",
            Self::Jsonl => "jsonl",
        };
        f.write_str(s)
    }
}

/// Structural metadata attached to a passage.
///
/// All fields are optional; absent fields are omitted from the JSONL
/// manifest. Unrecognized keys round-trip through `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PassageMeta {
    /// Path of the source file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,

    /// Deterministic document id this passage belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,

    /// Page number (1-based) for paginated sources.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,

    /// First page of a multi-page passage (case sections).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_start: Option<u32>,

    /// Last page of a multi-page passage (case sections).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_end: Option<u32>,

    /// Record index within a JSON/JSONL source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_index: Option<usize>,

    /// Sequential chunk index within the document (0-based).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<usize>,

    /// Source document type.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<DocType>,

    /// Statute name (e.g. 中华人民共和国民法典).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub law: Option<String>,

    /// Statute book (编).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub book: Option<String>,

    /// Statute chapter (章).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter: Option<String>,

    /// Statute section (节).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,

    /// Statute article (条).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub article: Option<String>,

    /// PDF ingestion mode marker ("case" for judicial-case PDFs).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_mode: Option<String>,

    /// Judicial case title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_title: Option<String>,

    /// Section headings present in the case document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_sections: Option<Vec<String>>,

    /// First paragraph index of the case section.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_para_start: Option<u32>,

    /// Last paragraph index of the case section.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_para_end: Option<u32>,

    /// Source URL for online results.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Key used to pull text out of JSON records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_key: Option<String>,

    /// Unrecognized keys, preserved for manifest round-trips.
    #[serde(flatten, default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PassageMeta {
    /// Returns `true` if the metadata marks a statute passage.
    #[must_use]
    pub const fn is_law(&self) -> bool {
        self.law.is_some() || self.article.is_some() || self.book.is_some() || self.chapter.is_some()
    }

    /// Returns `true` if the metadata marks a judicial-case passage.
    #[must_use]
    pub fn is_case(&self) -> bool {
        self.pdf_mode.as_deref() == Some("case")
            || self.case_title.is_some()
            || self.case_para_start.is_some()
            || self.case_para_end.is_some()
    }
}

/// The atomic retrieval unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    /// Deterministic identifier, unique within a database.
    pub id: String,

    /// The content indexed and returned.
    pub text: String,

    /// Alternate string fed to the lexical index (structural anchors
    /// prepended so keyword queries can hit by article number).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_text: Option<String>,

    /// Structural metadata.
    pub meta: PassageMeta,
}

impl Passage {
    /// Creates a passage with the given id, text, and metadata.
    #[must_use]
    pub const fn new(id: String, text: String, meta: PassageMeta) -> Self {
        Self {
            id,
            text,
            index_text: None,
            meta,
        }
    }

    /// Returns the string the lexical index should see.
    #[must_use]
    pub fn lexical_text(&self) -> &str {
        self.index_text.as_deref().unwrap_or(&self.text)
    }

    /// Key used to de-duplicate passages across recall sources.
    ///
    /// Prefers the passage id, then the document id, then the full text.
    #[must_use]
    pub fn dedup_key(&self) -> String {
        if !self.id.is_empty() {
            return format!("id:{}", self.id);
        }
        if let Some(doc_id) = self.meta.doc_id.as_deref()
            && !doc_id.is_empty()
        {
            return format!("doc_id:{doc_id}");
        }
        format!("text:{}", self.text)
    }
}

/// FNV-1a 64-bit hash. Stable across platforms and releases, which the
/// deterministic id scheme depends on.
fn fnv1a_64(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = OFFSET;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// Builds the deterministic document id from its immutable origin.
#[must_use]
pub fn make_doc_id(source_path: &str, page: u32, record_index: usize) -> String {
    let seed = format!("{source_path}\u{1}{page}\u{1}{record_index}");
    format!("doc-{:016x}", fnv1a_64(seed.as_bytes()))
}

/// Builds the deterministic chunk id from its document id and position.
#[must_use]
pub fn make_chunk_id(doc_id: &str, chunk_index: usize) -> String {
    format!("{doc_id}-c{chunk_index}")
}

/// Writes passages to a JSONL manifest, one `{id, text, meta}` per line,
/// in insertion order.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn write_manifest(path: &Path, passages: &[Passage]) -> Result<()> {
    let file = fs::File::create(path)?;
    let mut writer = BufWriter::new(file);
    for passage in passages {
        serde_json::to_writer(&mut writer, passage)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads a JSONL manifest back into a passage list.
///
/// # Errors
///
/// Returns an error if the file cannot be read or a line fails to parse.
pub fn read_manifest(path: &Path) -> Result<Vec<Passage>> {
    let file = fs::File::open(path).map_err(|e| IngestError::ReadFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let reader = BufReader::new(file);
    let mut out = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        out.push(serde_json::from_str(&line)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_meta() -> PassageMeta {
        PassageMeta {
            source_path: Some("data/raw/civil_code.txt".to_string()),
            doc_id: Some(make_doc_id("data/raw/civil_code.txt", 0, 0)),
            chunk_index: Some(3),
            doc_type: Some(DocType::Txt),
            law: Some("中华人民共和国民法典".to_string()),
            article: Some("第四百六十四条".to_string()),
            ..PassageMeta::default()
        }
    }

    #[test]
    fn test_doc_id_deterministic() {
        let a = make_doc_id("a.pdf", 1, 0);
        let b = make_doc_id("a.pdf", 1, 0);
        assert_eq!(a, b);
        assert!(a.starts_with("doc-"));
    }

    #[test]
    fn test_doc_id_distinguishes_inputs() {
        assert_ne!(make_doc_id("a.pdf", 1, 0), make_doc_id("a.pdf", 2, 0));
        assert_ne!(make_doc_id("a.pdf", 1, 0), make_doc_id("a.pdf", 1, 1));
        assert_ne!(make_doc_id("a.pdf", 1, 0), make_doc_id("b.pdf", 1, 0));
    }

    #[test]
    fn test_chunk_id_shape() {
        let doc_id = make_doc_id("a.txt", 0, 0);
        let id = make_chunk_id(&doc_id, 7);
        assert!(id.starts_with(&doc_id));
        assert!(id.ends_with("-c7"));
    }

    #[test]
    fn test_doc_type_from_extension() {
        assert_eq!(DocType::from_extension("pdf"), Some(DocType::Pdf));
        assert_eq!(DocType::from_extension("jsonl"), Some(DocType::Jsonl));
        assert_eq!(DocType::from_extension("exe"), None);
    }

    #[test]
    fn test_meta_is_law() {
        assert!(sample_meta().is_law());
        assert!(!PassageMeta::default().is_law());

        let meta = PassageMeta {
            chapter: Some("第二章".to_string()),
            ..PassageMeta::default()
        };
        assert!(meta.is_law());
    }

    #[test]
    fn test_meta_is_case() {
        let meta = PassageMeta {
            pdf_mode: Some("case".to_string()),
            ..PassageMeta::default()
        };
        assert!(meta.is_case());

        let meta = PassageMeta {
            case_title: Some("某某合同纠纷案".to_string()),
            ..PassageMeta::default()
        };
        assert!(meta.is_case());
        assert!(!sample_meta().is_case());
    }

    #[test]
    fn test_lexical_text_prefers_index_text() {
        let mut p = Passage::new("x".to_string(), "正文".to_string(), PassageMeta::default());
        assert_eq!(p.lexical_text(), "正文");
        p.index_text = Some("《民法典》 正文".to_string());
        assert_eq!(p.lexical_text(), "《民法典》 正文");
    }

    #[test]
    fn test_dedup_key_priority() {
        let meta = PassageMeta {
            doc_id: Some("doc-1".to_string()),
            ..PassageMeta::default()
        };
        let p = Passage::new("c1".to_string(), "t".to_string(), meta.clone());
        assert_eq!(p.dedup_key(), "id:c1");

        let p = Passage::new(String::new(), "t".to_string(), meta);
        assert_eq!(p.dedup_key(), "doc_id:doc-1");

        let p = Passage::new(String::new(), "t".to_string(), PassageMeta::default());
        assert_eq!(p.dedup_key(), "text:t");
    }

    #[test]
    fn test_meta_serialization_skips_none() {
        let meta = PassageMeta {
            source_path: Some("a.txt".to_string()),
            ..PassageMeta::default()
        };
        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains("source_path"));
        assert!(!json.contains("case_title"));
        assert!(!json.contains("null"));
    }

    #[test]
    fn test_meta_extra_round_trip() {
        let json = r#"{"source_path":"a.txt","custom_key":"kept"}"#;
        let meta: PassageMeta = serde_json::from_str(json).unwrap();
        assert_eq!(meta.extra.get("custom_key").and_then(|v| v.as_str()), Some("kept"));

        let back = serde_json::to_string(&meta).unwrap();
        assert!(back.contains("custom_key"));
    }

    #[test]
    fn test_manifest_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("split_sentence.jsonl");

        let passages = vec![
            Passage {
                id: "doc-1-c0".to_string(),
                text: "第一条内容。".to_string(),
                index_text: Some("《民法典》 第一条内容。".to_string()),
                meta: sample_meta(),
            },
            Passage::new("doc-1-c1".to_string(), "第二条内容。".to_string(), PassageMeta::default()),
        ];

        write_manifest(&path, &passages).unwrap();
        let loaded = read_manifest(&path).unwrap();
        assert_eq!(loaded, passages);
    }

    #[test]
    fn test_manifest_missing_file() {
        let result = read_manifest(Path::new("/nonexistent/manifest.jsonl"));
        assert!(result.is_err());
    }
}
