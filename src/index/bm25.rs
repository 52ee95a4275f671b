//! Lexical BM25 index.
//!
//! Okapi BM25 over an in-memory inverted index, persisted to the
//! database's `bm_corpus/` directory. Han-ideograph runs contribute both
//! unigrams and adjacent bigrams to the token bag so article numbers and
//! multi-character terms both match; other text is lowercased and split on
//! non-alphanumeric runs.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::RecallHit;
use crate::chunking::splitter::is_cjk;
use crate::error::{IndexError, Result};
use crate::passage::{Passage, read_manifest, write_manifest};

/// File holding the inverted index and document statistics.
const POSTINGS_FILE: &str = "postings.bin";
/// File holding the passage list in insertion order.
const PASSAGES_FILE: &str = "passages.jsonl";

/// Okapi BM25 parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Bm25Params {
    /// Term-frequency saturation.
    pub k1: f32,
    /// Document-length normalization strength.
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

/// Serialized index structures (everything except the passage list).
#[derive(Serialize, Deserialize)]
struct Bm25Disk {
    params: Bm25Params,
    postings: HashMap<String, Vec<(u32, u32)>>,
    doc_lens: Vec<u32>,
}

/// Lexical BM25 index over passages.
#[derive(Debug, Default)]
pub struct Bm25Index {
    params: Bm25Params,
    /// term -> (insertion index, term frequency), in insertion order.
    postings: HashMap<String, Vec<(u32, u32)>>,
    /// Token count per document, by insertion index.
    doc_lens: Vec<u32>,
    /// Passages in insertion order.
    passages: Vec<Passage>,
}

impl Bm25Index {
    /// Creates an empty index with default parameters.
    #[must_use]
    pub fn new() -> Self {
        Self::with_params(Bm25Params::default())
    }

    /// Creates an empty index with custom parameters.
    #[must_use]
    pub fn with_params(params: Bm25Params) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }

    /// Number of indexed passages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.passages.len()
    }

    /// Returns `true` if nothing has been indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    /// Returns the passage at an insertion index.
    #[must_use]
    pub fn passage(&self, index: usize) -> Option<&Passage> {
        self.passages.get(index)
    }

    /// Indexes a batch of passages. Uses `index_text` when present, else
    /// `text`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn insert_batch(&mut self, passages: &[Passage]) {
        for passage in passages {
            let doc_index = self.passages.len() as u32;
            let tokens = tokenize(passage.lexical_text());
            let mut tf: HashMap<&str, u32> = HashMap::new();
            for token in &tokens {
                *tf.entry(token.as_str()).or_insert(0) += 1;
            }
            for (token, count) in tf {
                self.postings
                    .entry(token.to_string())
                    .or_default()
                    .push((doc_index, count));
            }
            self.doc_lens.push(tokens.len() as u32);
            self.passages.push(passage.clone());
        }
    }

    /// Average document length over the corpus.
    #[allow(clippy::cast_precision_loss)]
    fn avgdl(&self) -> f32 {
        if self.doc_lens.is_empty() {
            return 0.0;
        }
        self.doc_lens.iter().map(|&l| f64::from(l)).sum::<f64>() as f32
            / self.doc_lens.len() as f32
    }

    /// Searches the index, returning at most `k` hits sorted by descending
    /// score (ties broken by insertion index).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn search(&self, query: &str, k: usize) -> Vec<RecallHit> {
        if k == 0 || self.passages.is_empty() {
            return Vec::new();
        }

        let mut terms = tokenize(query);
        terms.sort_unstable();
        terms.dedup();

        let n = self.passages.len() as f32;
        let avgdl = self.avgdl().max(f32::EPSILON);

        let mut scores: HashMap<u32, f32> = HashMap::new();
        for term in &terms {
            let Some(list) = self.postings.get(term) else {
                continue;
            };
            let df = list.len() as f32;
            let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
            for &(doc, tf) in list {
                let tf = tf as f32;
                let len = f64::from(self.doc_lens[doc as usize]) as f32;
                let denom = tf + self.params.k1 * (1.0 - self.params.b + self.params.b * len / avgdl);
                *scores.entry(doc).or_insert(0.0) += idf * tf * (self.params.k1 + 1.0) / denom;
            }
        }

        let mut ranked: Vec<(u32, f32)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked.truncate(k);

        ranked
            .into_iter()
            .map(|(doc, score)| RecallHit {
                index: doc as usize,
                passage: self.passages[doc as usize].clone(),
                score,
            })
            .collect()
    }

    /// Persists the index into `dir` (`bm_corpus/`).
    ///
    /// # Errors
    ///
    /// Returns an error if files cannot be written.
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        let disk = Bm25Disk {
            params: self.params,
            postings: self.postings.clone(),
            doc_lens: self.doc_lens.clone(),
        };
        let encoded = bincode::serialize(&disk).map_err(IndexError::from)?;
        fs::write(dir.join(POSTINGS_FILE), encoded)?;
        write_manifest(&dir.join(PASSAGES_FILE), &self.passages)?;
        Ok(())
    }

    /// Loads a persisted index from `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::MissingIndex`] if the directory or its files
    /// are absent, and a serialization error for corrupt data.
    pub fn load(dir: &Path) -> Result<Self> {
        let postings_path = dir.join(POSTINGS_FILE);
        if !postings_path.is_file() {
            return Err(IndexError::MissingIndex {
                path: postings_path.display().to_string(),
            }
            .into());
        }
        let bytes = fs::read(&postings_path)?;
        let disk: Bm25Disk = bincode::deserialize(&bytes).map_err(IndexError::from)?;
        let passages = read_manifest(&dir.join(PASSAGES_FILE))?;
        Ok(Self {
            params: disk.params,
            postings: disk.postings,
            doc_lens: disk.doc_lens,
            passages,
        })
    }
}

/// Tokenizes text into the BM25 token bag.
///
/// Han runs emit unigrams plus adjacent bigrams; other alphanumeric runs
/// are lowercased whole tokens.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut latin_run = String::new();
    let mut cjk_run: Vec<char> = Vec::new();

    let flush_latin = |run: &mut String, tokens: &mut Vec<String>| {
        if !run.is_empty() {
            tokens.push(std::mem::take(run));
        }
    };
    let flush_cjk = |run: &mut Vec<char>, tokens: &mut Vec<String>| {
        if run.is_empty() {
            return;
        }
        for &ch in run.iter() {
            tokens.push(ch.to_string());
        }
        for pair in run.windows(2) {
            tokens.push(pair.iter().collect());
        }
        run.clear();
    };

    for ch in text.chars() {
        if is_cjk(ch) {
            flush_latin(&mut latin_run, &mut tokens);
            cjk_run.push(ch);
        } else if ch.is_alphanumeric() {
            flush_cjk(&mut cjk_run, &mut tokens);
            latin_run.extend(ch.to_lowercase());
        } else {
            flush_latin(&mut latin_run, &mut tokens);
            flush_cjk(&mut cjk_run, &mut tokens);
        }
    }
    flush_latin(&mut latin_run, &mut tokens);
    flush_cjk(&mut cjk_run, &mut tokens);

    tokens
}
