//! PDF reading.
//!
//! Plain mode extracts page texts, removes mid-line hyphenation, cuts at
//! the references section, and merges consecutive sentences within a page
//! to roughly 300 text units (CJK characters, otherwise words).
//!
//! Case mode targets judicial-case PDFs: it detects the section headings
//! 基本案情 / 裁判理由 / 裁判要旨 and emits one document per section with
//! the case title and page range attached.

use std::path::Path;
use std::sync::LazyLock;

use oxidize_pdf::parser::{PdfDocument, PdfReader};
use regex::Regex;

use crate::chunking::{SentenceSplitter, contains_cjk};
use crate::error::IngestError;
use crate::ingest::Document;
use crate::passage::{DocType, PassageMeta, make_doc_id};

/// Target merged-segment length in text units.
const MERGE_LEN_THRESHOLD: usize = 300;

/// Section headings recognized in judicial-case PDFs.
const CASE_SECTION_HEADINGS: [&str; 3] = ["基本案情", "裁判理由", "裁判要旨"];

/// Mid-line hyphenation: `foo-\nbar` rejoins to `foobar`.
#[allow(clippy::unwrap_used)]
static HYPHEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-\n(\w+)").unwrap());

/// Reads the raw page texts of a PDF, one string per page.
///
/// # Errors
///
/// Returns [`IngestError::ParseFailed`] when the PDF cannot be opened or
/// its text extracted.
pub fn read_pdf_pages(path: &Path) -> Result<Vec<String>, IngestError> {
    let reader = PdfReader::open(path).map_err(|e| IngestError::ReadFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let doc = PdfDocument::new(reader);
    let pages = doc.extract_text().map_err(|e| IngestError::ParseFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(pages
        .into_iter()
        .map(|page| page.text.replace("\r\n", "\n"))
        .collect())
}

/// Applies the in-page cleanup rules: hyphenation removal, then newlines
/// collapsed to spaces.
#[must_use]
pub fn clean_page_text(raw: &str) -> String {
    let dehyphenated = HYPHEN_RE.replace_all(raw, "$1");
    dehyphenated.replace('\n', " ")
}

/// Returns `true` if the sentence starts the references section, after
/// which nothing is indexed.
#[must_use]
pub fn is_reference_marker(sentence: &str) -> bool {
    let stripped = sentence.trim();
    let lower = stripped.to_lowercase();
    lower == "references"
        || lower.starts_with("references ")
        || stripped == "参考文献"
        || stripped.starts_with("参考文献")
}

/// Length of a text in merge units: characters for CJK text, otherwise
/// whitespace-delimited words.
#[must_use]
pub fn text_unit_len(text: &str) -> usize {
    if contains_cjk(text) {
        text.chars().count()
    } else {
        text.split_whitespace().count()
    }
}

/// Merges consecutive sentences within the same page until the combined
/// length reaches the threshold, then cuts.
fn merge_page_sentences(page_sents: Vec<(u32, String)>) -> Vec<(u32, String)> {
    let mut merged: Vec<(u32, String)> = Vec::new();
    let mut cur_page: Option<u32> = None;
    let mut cur_sent = String::new();

    for (page, sent) in page_sents {
        match cur_page {
            None => {
                cur_page = Some(page);
                cur_sent = sent;
            }
            Some(p) if p == page => {
                if text_unit_len(&cur_sent) + text_unit_len(&sent) < MERGE_LEN_THRESHOLD {
                    cur_sent.push(' ');
                    cur_sent.push_str(&sent);
                } else {
                    merged.push((p, std::mem::take(&mut cur_sent)));
                    cur_page = Some(page);
                    cur_sent = sent;
                }
            }
            Some(p) => {
                merged.push((p, std::mem::take(&mut cur_sent)));
                cur_page = Some(page);
                cur_sent = sent;
            }
        }
    }

    if let Some(p) = cur_page
        && !cur_sent.is_empty()
    {
        merged.push((p, cur_sent));
    }
    merged
}

/// Converts pre-extracted page texts into plain-mode documents.
///
/// Exposed separately from [`read_plain_pdf`] so the rules are testable
/// without a PDF fixture, and so callers with their own extraction can
/// reuse them.
#[must_use]
pub fn plain_documents_from_pages(
    source_path: &str,
    pages: &[String],
    splitter: &SentenceSplitter,
) -> Vec<Document> {
    let mut page_sents: Vec<(u32, String)> = Vec::new();
    let mut ref_hit = false;

    #[allow(clippy::cast_possible_truncation)]
    for (idx, raw) in pages.iter().enumerate() {
        let page_no = idx as u32 + 1;
        let cleaned = clean_page_text(raw);
        for sent in splitter.split_text(&cleaned) {
            if is_reference_marker(&sent) {
                ref_hit = true;
                break;
            }
            page_sents.push((page_no, sent));
        }
        if ref_hit {
            break;
        }
    }

    let merged = merge_page_sentences(page_sents);

    merged
        .into_iter()
        .enumerate()
        .map(|(record_index, (page, text))| {
            let doc_id = make_doc_id(source_path, page, record_index);
            let meta = PassageMeta {
                source_path: Some(source_path.to_string()),
                doc_id: Some(doc_id.clone()),
                page: Some(page),
                record_index: Some(record_index),
                doc_type: Some(DocType::Pdf),
                ..PassageMeta::default()
            };
            Document {
                id: doc_id,
                text,
                meta,
            }
        })
        .collect()
}

/// Reads a plain PDF into sentence-merged documents.
///
/// # Errors
///
/// Returns an error when the PDF cannot be read.
pub fn read_plain_pdf(
    path: &Path,
    splitter: &SentenceSplitter,
) -> Result<Vec<Document>, IngestError> {
    let pages = read_pdf_pages(path)?;
    Ok(plain_documents_from_pages(
        &path.display().to_string(),
        &pages,
        splitter,
    ))
}

/// One detected judicial-case section.
#[derive(Debug, Clone)]
struct CaseSection {
    name: String,
    body: Vec<String>,
    page_start: u32,
    page_end: u32,
    para_start: u32,
    para_end: u32,
}

/// Matches a case-section heading line, tolerating 【】 brackets and a
/// trailing colon.
fn heading_name(line: &str) -> Option<&'static str> {
    let stripped = line
        .trim()
        .trim_start_matches('【')
        .trim_end_matches('】')
        .trim_end_matches('：')
        .trim_end_matches(':')
        .trim();
    CASE_SECTION_HEADINGS
        .iter()
        .find(|h| stripped == **h)
        .copied()
}

/// Converts pre-extracted page texts into case-mode documents.
///
/// The case title is the first non-empty, non-heading line. Each detected
/// section becomes one document carrying `pdf_mode="case"`, the title, its
/// page range, and its paragraph range. Pages without any detected heading
/// yield no documents.
#[must_use]
pub fn case_documents_from_pages(source_path: &str, pages: &[String]) -> Vec<Document> {
    let mut title = String::new();
    let mut sections: Vec<CaseSection> = Vec::new();
    let mut current: Option<CaseSection> = None;
    let mut para_no: u32 = 0;

    #[allow(clippy::cast_possible_truncation)]
    for (idx, raw) in pages.iter().enumerate() {
        let page_no = idx as u32 + 1;
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            para_no += 1;

            if let Some(name) = heading_name(line) {
                if let Some(section) = current.take() {
                    sections.push(section);
                }
                current = Some(CaseSection {
                    name: name.to_string(),
                    body: Vec::new(),
                    page_start: page_no,
                    page_end: page_no,
                    para_start: para_no,
                    para_end: para_no,
                });
                continue;
            }

            if let Some(section) = current.as_mut() {
                section.body.push(line.to_string());
                section.page_end = page_no;
                section.para_end = para_no;
            } else if title.is_empty() {
                title = line.to_string();
            }
        }
    }
    if let Some(section) = current.take() {
        sections.push(section);
    }

    sections
        .into_iter()
        .enumerate()
        .filter(|(_, s)| !s.body.is_empty())
        .map(|(record_index, section)| {
            let doc_id = make_doc_id(source_path, section.page_start, record_index);
            let meta = PassageMeta {
                source_path: Some(source_path.to_string()),
                doc_id: Some(doc_id.clone()),
                page_start: Some(section.page_start),
                page_end: Some(section.page_end),
                record_index: Some(record_index),
                doc_type: Some(DocType::Pdf),
                pdf_mode: Some("case".to_string()),
                case_title: Some(title.clone()),
                case_sections: Some(vec![section.name.clone()]),
                case_para_start: Some(section.para_start),
                case_para_end: Some(section.para_end),
                ..PassageMeta::default()
            };
            Document {
                id: doc_id,
                text: section.body.join("\n"),
                meta,
            }
        })
        .collect()
}

/// Reads a judicial-case PDF into one document per detected section.
///
/// # Errors
///
/// Returns an error when the PDF cannot be read.
pub fn read_case_pdf(path: &Path) -> Result<Vec<Document>, IngestError> {
    let pages = read_pdf_pages(path)?;
    Ok(case_documents_from_pages(
        &path.display().to_string(),
        &pages,
    ))
}
