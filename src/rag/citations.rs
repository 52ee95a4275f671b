//! Context block and citation list construction.
//!
//! One numbered context line and one citation line per reranked passage,
//! in rank order. The citation format chain: statute location, then case
//! location, then URL, then PDF page, then plain source path, then the
//! unknown-source fallback.

use crate::passage::{Passage, PassageMeta};

/// Character cap for an expanded case context entry.
const CASE_CONTEXT_CAP: usize = 6000;
/// Sentinel appended when a context entry is truncated.
const TRUNCATED_SENTINEL: &str = "…（已截断）";

/// Header under which the citation list is appended to a final answer.
pub const CITATION_HEADER: &str = "引用信息如下：";

/// Formats a statute location: `law | book | chapter | section | article`
/// with placeholders for missing parts.
fn format_law_location(meta: &PassageMeta) -> String {
    let law = meta.law.as_deref().unwrap_or("").trim();
    let part = |value: Option<&str>, missing: &str| -> String {
        let v = value.unwrap_or("").trim();
        if v.is_empty() {
            missing.to_string()
        } else {
            v.to_string()
        }
    };

    let mut parts: Vec<String> = Vec::new();
    if !law.is_empty() {
        parts.push(law.to_string());
    }
    parts.push(part(meta.book.as_deref(), "未知编"));
    parts.push(part(meta.chapter.as_deref(), "未知章"));
    parts.push(part(meta.section.as_deref(), "未分节"));
    parts.push(part(meta.article.as_deref(), "未知条"));
    parts.join(" | ")
}

/// Formats a case location: `title | 第ps~pe页 | 章节=...`.
fn format_case_location(meta: &PassageMeta) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(title) = meta.case_title.as_deref().map(str::trim)
        && !title.is_empty()
    {
        parts.push(title.to_string());
    }
    match (meta.page_start, meta.page_end) {
        (Some(ps), Some(pe)) => parts.push(format!("第{ps}~{pe}页")),
        _ => {
            if let Some(page) = meta.page {
                parts.push(format!("第{page}页"));
            }
        }
    }
    if let Some(sections) = meta.case_sections.as_deref() {
        let mut uniq: Vec<&str> = Vec::new();
        for s in sections.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
            if !uniq.contains(&s) {
                uniq.push(s);
            }
        }
        if !uniq.is_empty() {
            parts.push(format!("章节={}", uniq.join(",")));
        }
    }
    parts.join(" | ")
}

/// Formats the source of a passage for its citation line.
#[must_use]
pub fn format_source(meta: &PassageMeta) -> String {
    let source_path = meta.source_path.as_deref().unwrap_or("").trim();

    if meta.is_law() {
        let loc = format_law_location(meta);
        if source_path.is_empty() {
            return loc;
        }
        return format!("{source_path} | {loc}");
    }

    if meta.is_case() {
        let loc = format_case_location(meta);
        let mut parts: Vec<&str> = Vec::new();
        if !source_path.is_empty() {
            parts.push(source_path);
        }
        if !loc.is_empty() {
            parts.push(&loc);
        }
        let joined = parts.join(" | ");
        if joined.is_empty() {
            return "未知来源".to_string();
        }
        return joined;
    }

    if let Some(url) = meta.url.as_deref().map(str::trim)
        && !url.is_empty()
    {
        return format!("url={url}");
    }

    if !source_path.is_empty() {
        if let Some(page) = meta.page {
            return format!("{source_path} 第{page}页");
        }
        return source_path.to_string();
    }

    "未知来源".to_string()
}

/// Truncates to a character count, appending the truncation sentinel.
fn cap_chars(text: &str, cap: usize) -> String {
    if text.chars().count() <= cap {
        return text.to_string();
    }
    let cut: String = text.chars().take(cap).collect();
    format!("{cut}{TRUNCATED_SENTINEL}")
}

/// Context text for one passage. Case passages expand to the case title
/// plus their bracketed section blocks, capped at 6000 characters.
fn context_text(passage: &Passage) -> String {
    if !passage.meta.is_case() {
        return passage.text.trim().to_string();
    }

    let mut blocks: Vec<String> = Vec::new();
    if let Some(title) = passage.meta.case_title.as_deref().map(str::trim)
        && !title.is_empty()
    {
        blocks.push(title.to_string());
    }
    let body = passage.text.trim();
    match passage.meta.case_sections.as_deref() {
        Some(sections) if !sections.is_empty() => {
            for name in sections {
                blocks.push(format!("【{name}】\n{body}"));
            }
        }
        _ => blocks.push(body.to_string()),
    }
    cap_chars(&blocks.join("\n"), CASE_CONTEXT_CAP)
}

/// Builds the numbered context block and the citation lines, one entry per
/// reranked passage, in rank order. The two lists always have the same
/// length.
#[must_use]
pub fn build_context_and_citations(ranked: &[(f32, Passage)]) -> (String, Vec<String>) {
    let mut context_lines: Vec<String> = Vec::new();
    let mut cite_lines: Vec<String> = Vec::new();

    for (i, (_, passage)) in ranked.iter().enumerate() {
        let rank = i + 1;
        context_lines.push(format!("[{rank}] {}", context_text(passage)));
        cite_lines.push(format!("[{rank}] {}", format_source(&passage.meta)));
    }

    (context_lines.join("\n"), cite_lines)
}

/// Appends the citation list to a final answer under the standard header.
#[must_use]
pub fn append_citations(answer: &str, cite_lines: &[String]) -> String {
    if cite_lines.is_empty() {
        return answer.to_string();
    }
    format!(
        "{}\n\n{CITATION_HEADER}\n{}",
        answer.trim_end(),
        cite_lines.join("\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passage::Passage;

    fn ranked(passages: Vec<Passage>) -> Vec<(f32, Passage)> {
        passages.into_iter().map(|p| (1.0, p)).collect()
    }

    #[test]
    fn test_law_citation_with_placeholders() {
        let meta = PassageMeta {
            source_path: Some("law/civil_code.txt".to_string()),
            law: Some("中华人民共和国民法典".to_string()),
            book: Some("第三编".to_string()),
            article: Some("第四百六十四条".to_string()),
            ..PassageMeta::default()
        };
        let source = format_source(&meta);
        assert_eq!(
            source,
            "law/civil_code.txt | 中华人民共和国民法典 | 第三编 | 未知章 | 未分节 | 第四百六十四条"
        );
    }

    #[test]
    fn test_case_citation() {
        let meta = PassageMeta {
            source_path: Some("cases/guiding_001.pdf".to_string()),
            pdf_mode: Some("case".to_string()),
            case_title: Some("某某合同纠纷案".to_string()),
            page_start: Some(2),
            page_end: Some(5),
            case_sections: Some(vec!["基本案情".to_string(), "基本案情".to_string()]),
            ..PassageMeta::default()
        };
        let source = format_source(&meta);
        assert_eq!(
            source,
            "cases/guiding_001.pdf | 某某合同纠纷案 | 第2~5页 | 章节=基本案情"
        );
    }

    #[test]
    fn test_url_citation() {
        let meta = PassageMeta {
            url: Some("https://example.com/page".to_string()),
            source_path: Some("online".to_string()),
            ..PassageMeta::default()
        };
        assert_eq!(format_source(&meta), "url=https://example.com/page");
    }

    #[test]
    fn test_pdf_page_citation() {
        let meta = PassageMeta {
            source_path: Some("docs/paper.pdf".to_string()),
            page: Some(7),
            ..PassageMeta::default()
        };
        assert_eq!(format_source(&meta), "docs/paper.pdf 第7页");
    }

    #[test]
    fn test_plain_file_citation() {
        let meta = PassageMeta {
            source_path: Some("notes.txt".to_string()),
            ..PassageMeta::default()
        };
        assert_eq!(format_source(&meta), "notes.txt");
    }

    #[test]
    fn test_unknown_source_citation() {
        assert_eq!(format_source(&PassageMeta::default()), "未知来源");
    }

    #[test]
    fn test_context_and_citations_counts_match() {
        let passages = vec![
            Passage::new("a".to_string(), "第一段证据".to_string(), PassageMeta::default()),
            Passage::new("b".to_string(), "第二段证据".to_string(), PassageMeta::default()),
            Passage::new("c".to_string(), "第三段证据".to_string(), PassageMeta::default()),
        ];
        let (context, cites) = build_context_and_citations(&ranked(passages));
        assert_eq!(context.lines().count(), 3);
        assert_eq!(cites.len(), 3);
        assert!(context.starts_with("[1] 第一段证据"));
        assert_eq!(cites[0], "[1] 未知来源");
    }

    #[test]
    fn test_case_context_expansion() {
        let meta = PassageMeta {
            source_path: Some("cases/c.pdf".to_string()),
            pdf_mode: Some("case".to_string()),
            case_title: Some("指导案例某某案".to_string()),
            case_sections: Some(vec!["裁判理由".to_string()]),
            page_start: Some(1),
            page_end: Some(2),
            ..PassageMeta::default()
        };
        let passage = Passage::new("c".to_string(), "法院认为合同有效。".to_string(), meta);
        let (context, cites) = build_context_and_citations(&[(0.9, passage)]);

        assert!(context.contains("指导案例某某案"));
        assert!(context.contains("【裁判理由】"));
        assert!(context.contains("法院认为合同有效。"));
        assert_eq!(cites.len(), 1);
    }

    #[test]
    fn test_case_context_truncated() {
        let meta = PassageMeta {
            pdf_mode: Some("case".to_string()),
            case_title: Some("长案例".to_string()),
            case_sections: Some(vec!["基本案情".to_string()]),
            ..PassageMeta::default()
        };
        let passage = Passage::new("c".to_string(), "事".repeat(7000), meta);
        let (context, _) = build_context_and_citations(&[(0.9, passage)]);
        assert!(context.contains("…（已截断）"));
        // Capped at 6000 chars plus marker and prefix lines
        assert!(context.chars().count() < 6100);
    }

    #[test]
    fn test_append_citations() {
        let cites = vec!["[1] a.txt".to_string(), "[2] 未知来源".to_string()];
        let out = append_citations("回答内容。\n", &cites);
        assert!(out.contains("引用信息如下："));
        assert!(out.ends_with("[2] 未知来源"));

        let out = append_citations("回答内容。", &[]);
        assert_eq!(out, "回答内容。");
    }
}
