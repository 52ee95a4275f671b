//! Chunking: turning ingested documents into stable, metadata-rich
//! passages.
//!
//! Splitting is deterministic: identical input bytes and configuration
//! produce identical chunk ids in identical order. Documents are
//! independent, so chunking fans out across a rayon pool and results are
//! gathered back in document order.

pub mod law;
pub mod splitter;

pub use law::{is_enum_item, is_introducer, law_index_prefix, merge_law_sentences};
pub use splitter::{DEFAULT_SENTENCE_SIZE, SentenceSplitter, contains_cjk};

use rayon::prelude::*;

use crate::ingest::Document;
use crate::passage::{Passage, make_chunk_id, make_doc_id};

/// Default minimum passage length in characters.
pub const DEFAULT_MIN_CHUNK_LEN: usize = 20;

/// Chunks one document into passages.
///
/// Statute documents get a second merge pass so enumeration items never
/// stand alone, and a structural anchor prepended to their lexical index
/// text. Case-PDF documents arrive pre-sectioned from the reader and pass
/// through as single passages.
#[must_use]
pub fn chunk_document(
    doc: &Document,
    splitter: &SentenceSplitter,
    min_chunk_len: usize,
) -> Vec<Passage> {
    let text = doc.text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let doc_id = resolve_doc_id(doc);

    // Case sections are already one retrieval unit each.
    if doc.meta.is_case() {
        if text.chars().count() < min_chunk_len {
            return Vec::new();
        }
        let mut meta = doc.meta.clone();
        meta.doc_id = Some(doc_id.clone());
        meta.chunk_index = Some(0);
        return vec![Passage::new(
            make_chunk_id(&doc_id, 0),
            text.to_string(),
            meta,
        )];
    }

    let mut sentences = splitter.split_text(text);

    let is_law = doc.meta.is_law();
    if is_law {
        sentences = merge_law_sentences(&sentences, splitter.sentence_size);
    }

    sentences.retain(|s| s.chars().count() >= min_chunk_len);

    let law_prefix = if is_law {
        law_index_prefix(&doc.meta)
    } else {
        String::new()
    };

    sentences
        .into_iter()
        .enumerate()
        .map(|(idx, sentence)| {
            let mut meta = doc.meta.clone();
            meta.doc_id = Some(doc_id.clone());
            meta.chunk_index = Some(idx);
            let mut passage = Passage::new(make_chunk_id(&doc_id, idx), sentence, meta);
            if !law_prefix.is_empty() {
                passage.index_text = Some(format!("{law_prefix}\n{}", passage.text));
            }
            passage
        })
        .collect()
}

/// Chunks a batch of documents in parallel, preserving document order.
#[must_use]
pub fn chunk_documents(
    docs: &[Document],
    splitter: &SentenceSplitter,
    min_chunk_len: usize,
) -> Vec<Passage> {
    docs.par_iter()
        .map(|doc| chunk_document(doc, splitter, min_chunk_len))
        .collect::<Vec<_>>()
        .into_iter()
        .flatten()
        .collect()
}

/// Resolves the document id: explicit id, then metadata, then derived from
/// the immutable origin.
fn resolve_doc_id(doc: &Document) -> String {
    if !doc.id.trim().is_empty() {
        return doc.id.clone();
    }
    if let Some(doc_id) = doc.meta.doc_id.as_deref()
        && !doc_id.trim().is_empty()
    {
        return doc_id.to_string();
    }
    make_doc_id(
        doc.meta.source_path.as_deref().unwrap_or(""),
        doc.meta.page.unwrap_or(0),
        doc.meta.record_index.unwrap_or(0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passage::PassageMeta;

    fn doc(text: &str, meta: PassageMeta) -> Document {
        Document {
            id: String::new(),
            text: text.to_string(),
            meta,
        }
    }

    fn law_meta() -> PassageMeta {
        PassageMeta {
            source_path: Some("law/civil_code.txt".to_string()),
            law: Some("中华人民共和国民法典".to_string()),
            article: Some("第四百六十四条".to_string()),
            ..PassageMeta::default()
        }
    }

    #[test]
    fn test_chunk_document_basic() {
        let splitter = SentenceSplitter::default();
        let d = doc("这是第一句也足够长了。这也是一个足够长的第二句话。", PassageMeta::default());
        let passages = chunk_document(&d, &splitter, 5);

        assert_eq!(passages.len(), 2);
        assert_eq!(passages[0].meta.chunk_index, Some(0));
        assert_eq!(passages[1].meta.chunk_index, Some(1));
        // Both chunks share the document id prefix
        let doc_id = passages[0].meta.doc_id.clone().unwrap();
        assert!(passages[1].id.starts_with(&doc_id));
    }

    #[test]
    fn test_chunk_index_monotonic() {
        let splitter = SentenceSplitter::default();
        let d = doc("一句话够长够长。两句话够长够长。三句话够长够长。", PassageMeta::default());
        let passages = chunk_document(&d, &splitter, 2);
        let indices: Vec<usize> = passages.iter().filter_map(|p| p.meta.chunk_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_min_chunk_len_filter() {
        let splitter = SentenceSplitter::default();
        let d = doc("短。这一句的长度显然超过了十个字符。", PassageMeta::default());
        let passages = chunk_document(&d, &splitter, 10);
        assert_eq!(passages.len(), 1);
        for p in &passages {
            assert!(p.text.chars().count() >= 10);
        }
    }

    #[test]
    fn test_law_enum_merged_with_introducer() {
        let splitter = SentenceSplitter::new(512);
        let d = doc(
            "当事人订立合同，有下列情形之一的：\n（一）情形甲；\n（二）情形乙。",
            law_meta(),
        );
        let passages = chunk_document(&d, &splitter, 5);
        assert_eq!(passages.len(), 1);
        assert!(passages[0].text.contains("（一）"));
        assert!(passages[0].text.contains("（二）"));
    }

    #[test]
    fn test_law_index_text_prefix() {
        let splitter = SentenceSplitter::default();
        let d = doc("依法成立的合同，受法律保护，对当事人具有法律约束力。", law_meta());
        let passages = chunk_document(&d, &splitter, 5);
        assert_eq!(passages.len(), 1);
        let index_text = passages[0].index_text.as_deref().unwrap();
        assert!(index_text.starts_with("《中华人民共和国民法典》"));
        assert!(index_text.contains("（简称：民法典）"));
        assert!(index_text.ends_with(&passages[0].text));
    }

    #[test]
    fn test_non_law_has_no_index_text() {
        let splitter = SentenceSplitter::default();
        let d = doc("普通文本的一个完整句子在这里。", PassageMeta::default());
        let passages = chunk_document(&d, &splitter, 5);
        assert_eq!(passages.len(), 1);
        assert!(passages[0].index_text.is_none());
    }

    #[test]
    fn test_case_document_passes_through() {
        let meta = PassageMeta {
            pdf_mode: Some("case".to_string()),
            case_title: Some("某某纠纷案".to_string()),
            page_start: Some(1),
            page_end: Some(3),
            ..PassageMeta::default()
        };
        let splitter = SentenceSplitter::default();
        let d = doc("基本案情的完整内容。包含多个句子。但作为一个整体保留。", meta);
        let passages = chunk_document(&d, &splitter, 5);
        assert_eq!(passages.len(), 1);
        assert_eq!(passages[0].meta.chunk_index, Some(0));
        assert!(passages[0].text.contains("多个句子"));
    }

    #[test]
    fn test_empty_document() {
        let splitter = SentenceSplitter::default();
        let d = doc("   ", PassageMeta::default());
        assert!(chunk_document(&d, &splitter, 5).is_empty());
    }

    #[test]
    fn test_deterministic_ids_across_runs() {
        let splitter = SentenceSplitter::default();
        let meta = PassageMeta {
            source_path: Some("a.txt".to_string()),
            ..PassageMeta::default()
        };
        let d = doc("内容足够长的第一句话。内容足够长的第二句话。", meta);

        let first = chunk_document(&d, &splitter, 5);
        let second = chunk_document(&d, &splitter, 5);
        let ids_a: Vec<&str> = first.iter().map(|p| p.id.as_str()).collect();
        let ids_b: Vec<&str> = second.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn test_chunk_documents_preserves_order() {
        let splitter = SentenceSplitter::default();
        let docs: Vec<Document> = (0..8)
            .map(|i| {
                let meta = PassageMeta {
                    source_path: Some(format!("doc{i}.txt")),
                    ..PassageMeta::default()
                };
                doc("这是一个内容足够长的句子。", meta)
            })
            .collect();

        let passages = chunk_documents(&docs, &splitter, 5);
        assert_eq!(passages.len(), 8);
        for (i, p) in passages.iter().enumerate() {
            assert_eq!(p.meta.source_path.as_deref(), Some(format!("doc{i}.txt").as_str()));
        }
    }

    #[test]
    fn test_explicit_doc_id_wins() {
        let splitter = SentenceSplitter::default();
        let d = Document {
            id: "doc-override".to_string(),
            text: "内容足够长的一句话。".to_string(),
            meta: PassageMeta::default(),
        };
        let passages = chunk_document(&d, &splitter, 5);
        assert_eq!(passages[0].id, "doc-override-c0");
    }
}
