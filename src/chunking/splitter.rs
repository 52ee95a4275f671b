//! Sentence splitting.
//!
//! Text containing CJK characters goes through a rule-based splitter that
//! hard-breaks on sentence-final punctuation and blank lines, and
//! soft-breaks on pause punctuation once a segment grows past
//! `sentence_size`. Other text uses Unicode sentence segmentation.

use unicode_segmentation::UnicodeSegmentation;

/// Default maximum accumulated segment length, in characters.
pub const DEFAULT_SENTENCE_SIZE: usize = 2048;

/// Hard sentence-final punctuation for CJK text.
const HARD_BREAKS: [char; 5] = ['。', '！', '？', '；', '…'];

/// Pause punctuation that may break an oversized segment.
const SOFT_BREAKS: [char; 3] = ['，', '、', '：'];

/// Closing quotes that belong to the sentence they terminate.
const CLOSERS: [char; 3] = ['”', '』', '」'];

/// Returns `true` if the text contains any CJK ideograph.
#[must_use]
pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(is_cjk)
}

/// Returns `true` for characters in the Han ideograph blocks.
#[must_use]
pub const fn is_cjk(ch: char) -> bool {
    matches!(ch,
        '\u{4e00}'..='\u{9fff}'
        | '\u{3400}'..='\u{4dbf}'
        | '\u{f900}'..='\u{faff}'
        | '\u{20000}'..='\u{2a6df}')
}

/// Rule-based sentence splitter with a configurable size ceiling.
#[derive(Debug, Clone)]
pub struct SentenceSplitter {
    /// Maximum accumulated segment length in characters before soft breaks
    /// start cutting.
    pub sentence_size: usize,
}

impl Default for SentenceSplitter {
    fn default() -> Self {
        Self::new(DEFAULT_SENTENCE_SIZE)
    }
}

impl SentenceSplitter {
    /// Creates a splitter with the given size ceiling (clamped to ≥ 1).
    #[must_use]
    pub const fn new(sentence_size: usize) -> Self {
        Self {
            sentence_size: if sentence_size == 0 { 1 } else { sentence_size },
        }
    }

    /// Splits text into sentences.
    ///
    /// Routes CJK-bearing text through the rule-based splitter and
    /// everything else through Unicode sentence segmentation.
    #[must_use]
    pub fn split_text(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        if contains_cjk(text) {
            self.split_cjk(text)
        } else {
            split_unicode_sentences(text)
        }
    }

    /// Rule-based splitting for CJK text.
    ///
    /// Hard breaks: 。！？；… and blank lines. Soft breaks: ，、： once the
    /// accumulated segment exceeds `sentence_size` characters. Closing
    /// quotes stay attached to the sentence they terminate.
    fn split_cjk(&self, text: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut buf = String::new();
        let mut buf_chars = 0usize;

        let mut chars = text.chars().peekable();
        while let Some(ch) = chars.next() {
            match ch {
                '\r' => {}
                '\n' => {
                    // A blank line is a hard break; a single newline stays
                    // inside the segment.
                    let mut newline_run = 1;
                    while matches!(chars.peek(), Some(&('\n' | '\r'))) {
                        if chars.next() == Some('\n') {
                            newline_run += 1;
                        }
                    }
                    if newline_run > 1 {
                        flush(&mut out, &mut buf, &mut buf_chars);
                    } else if !buf.is_empty() {
                        buf.push('\n');
                        buf_chars += 1;
                    }
                }
                c if HARD_BREAKS.contains(&c) => {
                    buf.push(c);
                    buf_chars += 1;
                    while let Some(&next) = chars.peek() {
                        if CLOSERS.contains(&next) {
                            buf.push(next);
                            buf_chars += 1;
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    flush(&mut out, &mut buf, &mut buf_chars);
                }
                c if SOFT_BREAKS.contains(&c) => {
                    buf.push(c);
                    buf_chars += 1;
                    if buf_chars >= self.sentence_size {
                        flush(&mut out, &mut buf, &mut buf_chars);
                    }
                }
                c => {
                    buf.push(c);
                    buf_chars += 1;
                }
            }
        }
        flush(&mut out, &mut buf, &mut buf_chars);
        out
    }
}

/// Unicode sentence segmentation for non-CJK text.
fn split_unicode_sentences(text: &str) -> Vec<String> {
    text.split_sentence_bounds()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Pushes the trimmed buffer onto `out` when non-empty.
fn flush(out: &mut Vec<String>, buf: &mut String, buf_chars: &mut usize) {
    let trimmed = buf.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
    buf.clear();
    *buf_chars = 0;
}
