//! Statute-aware sentence handling.
//!
//! Legal text enumerates conditions as `（一）… （二）…` items introduced by a
//! sentence ending in a colon. Those items must never stand alone as
//! passages, so a second pass merges them with their introducer. Statute
//! passages also get a structural anchor prepended to their lexical index
//! text so keyword queries can hit by article number.

use std::sync::LazyLock;

use regex::Regex;

use crate::passage::PassageMeta;

/// Matches enumeration items like `（一）`, `(2)`, `（十三）`.
#[allow(clippy::unwrap_used)]
static LAW_ENUM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*[（(][一二三四五六七八九十百千0-9]+[)）]").unwrap());

/// Minimum merged passage length in characters before a flush is allowed.
const MIN_MERGE_CHARS: usize = 120;

/// Returns `true` if the sentence is an enumeration item.
#[must_use]
pub fn is_enum_item(sentence: &str) -> bool {
    LAW_ENUM_RE.is_match(sentence)
}

/// Returns `true` if the sentence introduces an enumeration.
#[must_use]
pub fn is_introducer(sentence: &str) -> bool {
    sentence.ends_with('：') || sentence.ends_with(':')
}

/// Merges statute sentences so enumeration items stay with their
/// introducing sentence.
///
/// A buffer accumulates sentences; it flushes when it already holds at
/// least [`MIN_MERGE_CHARS`] characters and the next sentence would push it
/// past `max_chars`, or immediately once it reaches `max_chars`. A sentence
/// ending in a colon defers the flush so at least one item joins it.
/// Merged passages join their sentences with newlines.
#[must_use]
pub fn merge_law_sentences(sentences: &[String], max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);

    let mut out: Vec<String> = Vec::new();
    let mut buf: Vec<String> = Vec::new();

    let buf_len = |buf: &[String]| -> usize {
        let chars: usize = buf.iter().map(|s| s.chars().count()).sum();
        chars + buf.len().saturating_sub(1)
    };

    let flush = |out: &mut Vec<String>, buf: &mut Vec<String>| {
        if buf.is_empty() {
            return;
        }
        let text = buf
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        if !text.is_empty() {
            out.push(text);
        }
        buf.clear();
    };

    for sentence in sentences.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        let cur_len = buf_len(&buf);
        let sent_chars = sentence.chars().count();
        if !buf.is_empty() && cur_len >= MIN_MERGE_CHARS && cur_len + 1 + sent_chars > max_chars {
            flush(&mut out, &mut buf);
        }

        buf.push(sentence.to_string());

        // An introducer waits for at least one enumeration item.
        if is_introducer(sentence) {
            continue;
        }

        if buf_len(&buf) >= max_chars {
            flush(&mut out, &mut buf);
        }
    }

    flush(&mut out, &mut buf);
    out
}

/// Builds the structural anchor prepended to a statute passage's index
/// text, e.g. `《中华人民共和国民法典》 （简称：民法典） 第三编 第二章 第一节 第四百六十四条`.
///
/// The short-name alias covers the common query form without the
/// 中华人民共和国 prefix.
#[must_use]
pub fn law_index_prefix(meta: &PassageMeta) -> String {
    let law = meta.law.as_deref().unwrap_or("").trim();
    let book = meta.book.as_deref().unwrap_or("").trim();
    let chapter = meta.chapter.as_deref().unwrap_or("").trim();
    let section = {
        let s = meta.section.as_deref().unwrap_or("").trim();
        if s.is_empty() { "未分节" } else { s }
    };
    let article = meta.article.as_deref().unwrap_or("").trim();

    let alias = law
        .strip_prefix("中华人民共和国")
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .unwrap_or("");

    let mut parts: Vec<String> = Vec::new();
    if !law.is_empty() {
        parts.push(format!("《{law}》"));
    }
    if !alias.is_empty() && alias != law {
        parts.push(format!("（简称：{alias}）"));
    }
    for p in [book, chapter, section, article] {
        if !p.is_empty() {
            parts.push(p.to_string());
        }
    }
    parts.join(" ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_is_enum_item() {
        assert!(is_enum_item("（一）情形甲；"));
        assert!(is_enum_item("(2) 情形乙。"));
        assert!(is_enum_item("  （十三）情形丙"));
        assert!(!is_enum_item("第一条 规定如下："));
    }

    #[test]
    fn test_is_introducer() {
        assert!(is_introducer("有下列情形之一的："));
        assert!(is_introducer("including:"));
        assert!(!is_introducer("正常句子。"));
    }

    #[test]
    fn test_merge_introducer_with_items() {
        let sents = strings(&["其有下列情形之一的：", "（一）情形甲；", "（二）情形乙。"]);
        let merged = merge_law_sentences(&sents, 512);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0], "其有下列情形之一的：\n（一）情形甲；\n（二）情形乙。");
    }

    #[test]
    fn test_merge_respects_max_chars() {
        // Two long sentences that each exceed the minimum; the second would
        // overflow the ceiling, so they flush separately.
        let long_a = "甲".repeat(150);
        let long_b = "乙".repeat(150);
        let merged = merge_law_sentences(&[long_a.clone(), long_b.clone()], 200);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0], long_a);
        assert_eq!(merged[1], long_b);
    }

    #[test]
    fn test_merge_grows_to_minimum() {
        // Short sentences keep merging even past several flush opportunities
        // because the buffer stays under the minimum.
        let sents = strings(&["第一句。", "第二句。", "第三句。"]);
        let merged = merge_law_sentences(&sents, 512);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].lines().count(), 3);
    }

    #[test]
    fn test_merge_flushes_at_ceiling() {
        let long = "条".repeat(600);
        let merged = merge_law_sentences(&[long, "尾句。".to_string()], 512);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_merge_skips_empty() {
        let sents = strings(&["", "  ", "正文。"]);
        let merged = merge_law_sentences(&sents, 512);
        assert_eq!(merged, vec!["正文。"]);
    }

    #[test]
    fn test_law_index_prefix_full() {
        let meta = PassageMeta {
            law: Some("中华人民共和国民法典".to_string()),
            book: Some("第三编".to_string()),
            chapter: Some("第二章".to_string()),
            section: Some("第一节".to_string()),
            article: Some("第四百六十四条".to_string()),
            ..PassageMeta::default()
        };
        assert_eq!(
            law_index_prefix(&meta),
            "《中华人民共和国民法典》 （简称：民法典） 第三编 第二章 第一节 第四百六十四条"
        );
    }

    #[test]
    fn test_law_index_prefix_missing_section() {
        let meta = PassageMeta {
            law: Some("中华人民共和国刑法".to_string()),
            chapter: Some("第一章".to_string()),
            article: Some("第三条".to_string()),
            ..PassageMeta::default()
        };
        let prefix = law_index_prefix(&meta);
        assert!(prefix.contains("未分节"));
        assert!(prefix.contains("（简称：刑法）"));
    }

    #[test]
    fn test_law_index_prefix_no_alias_without_prefix() {
        let meta = PassageMeta {
            law: Some("民法典".to_string()),
            article: Some("第一条".to_string()),
            ..PassageMeta::default()
        };
        let prefix = law_index_prefix(&meta);
        assert!(prefix.starts_with("《民法典》"));
        assert!(!prefix.contains("简称"));
    }
}
