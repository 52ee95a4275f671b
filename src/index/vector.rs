//! Dense vector index.
//!
//! An inverted-file (IVF-flat) index over L2 distance. Vectors are
//! partitioned under a coarse k-means quantizer trained at save time;
//! queries probe the nearest lists. Small corpora keep a single list, which
//! makes the search exact. The forward payload stays aligned with insertion
//! order so the BM25 and vector sides share one index space.
//!
//! On-disk layout inside the database's `faiss_idx/` directory:
//! `index_<dim>/invert_index.faiss` (quantizer + vectors) and
//! `index_<dim>/forward_index.txt` (passage payload, one JSON per line).

use std::fs;
use std::path::Path;

use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::RecallHit;
use crate::error::{IndexError, Result};
use crate::passage::{Passage, read_manifest, write_manifest};

/// Inverted-file structure file name.
const INVERT_FILE: &str = "invert_index.faiss";
/// Forward payload file name.
const FORWARD_FILE: &str = "forward_index.txt";

/// Upper bound on coarse clusters.
const MAX_NLIST: usize = 256;
/// k-means refinement iterations.
const KMEANS_ITERS: usize = 8;
/// Lists probed per query (at least enough to fill `k`).
const DEFAULT_NPROBE: usize = 8;

/// Serialized index structures (everything except the forward payload).
#[derive(Serialize, Deserialize)]
struct VectorDisk {
    dim: usize,
    centroids: Vec<f32>,
    lists: Vec<Vec<u32>>,
    vectors: Vec<f32>,
}

/// IVF-flat vector index over L2 distance.
#[derive(Debug)]
pub struct VectorIndex {
    dim: usize,
    /// Flat row-major vector storage, insertion order.
    vectors: Vec<f32>,
    /// Passage payload, insertion order.
    passages: Vec<Passage>,
    /// Coarse centroids, flat row-major. Empty until trained.
    centroids: Vec<f32>,
    /// Vector ids per centroid.
    lists: Vec<Vec<u32>>,
}

impl VectorIndex {
    /// Creates an empty index for `dim`-dimensional vectors.
    #[must_use]
    pub const fn new(dim: usize) -> Self {
        Self {
            dim,
            vectors: Vec::new(),
            passages: Vec::new(),
            centroids: Vec::new(),
            lists: Vec::new(),
        }
    }

    /// The vector dimension this index was built with.
    #[must_use]
    pub const fn dim(&self) -> usize {
        self.dim
    }

    /// Number of indexed vectors.
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

    /// Inserts a batch of vectors with their passages, preserving order.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::EmbeddingMismatch`] when the batch lengths
    /// differ and [`IndexError::DimensionMismatch`] for wrong-width vectors.
    pub fn insert_batch(&mut self, embeddings: &[Vec<f32>], passages: &[Passage]) -> Result<()> {
        if embeddings.len() != passages.len() {
            return Err(IndexError::EmbeddingMismatch {
                requested: passages.len(),
                received: embeddings.len(),
            }
            .into());
        }
        for embedding in embeddings {
            if embedding.len() != self.dim {
                return Err(IndexError::DimensionMismatch {
                    found: embedding.len(),
                    expected: self.dim,
                }
                .into());
            }
        }
        for (embedding, passage) in embeddings.iter().zip(passages) {
            self.vectors.extend_from_slice(embedding);
            self.passages.push(passage.clone());
        }
        // Inserts invalidate any previous training
        self.centroids.clear();
        self.lists.clear();
        Ok(())
    }

    fn vector(&self, index: usize) -> &[f32] {
        &self.vectors[index * self.dim..(index + 1) * self.dim]
    }

    /// Trains the coarse quantizer and assigns every vector to a list.
    ///
    /// Deterministic: centroids seed from evenly spaced vectors and refine
    /// for a fixed number of iterations.
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn train(&mut self) {
        let n = self.len();
        if n == 0 {
            return;
        }
        let nlist = (n as f64).sqrt().ceil() as usize;
        let nlist = nlist.clamp(1, MAX_NLIST.min(n));

        // Seed from evenly spaced vectors
        let mut centroids: Vec<f32> = Vec::with_capacity(nlist * self.dim);
        for i in 0..nlist {
            let pick = i * n / nlist;
            centroids.extend_from_slice(self.vector(pick));
        }

        let mut assignments = vec![0usize; n];
        for _ in 0..KMEANS_ITERS {
            // Assign
            for (idx, slot) in assignments.iter_mut().enumerate() {
                *slot = nearest_centroid(&centroids, self.dim, self.vector(idx));
            }
            // Update
            let mut sums = vec![0.0f64; nlist * self.dim];
            let mut counts = vec![0usize; nlist];
            for (idx, &cluster) in assignments.iter().enumerate() {
                counts[cluster] += 1;
                let v = self.vector(idx);
                for (d, &x) in v.iter().enumerate() {
                    sums[cluster * self.dim + d] += f64::from(x);
                }
            }
            for cluster in 0..nlist {
                if counts[cluster] == 0 {
                    continue; // empty cluster keeps its previous centroid
                }
                for d in 0..self.dim {
                    centroids[cluster * self.dim + d] =
                        (sums[cluster * self.dim + d] / counts[cluster] as f64) as f32;
                }
            }
        }

        let mut lists: Vec<Vec<u32>> = vec![Vec::new(); nlist];
        for (idx, &cluster) in assignments.iter().enumerate() {
            lists[cluster].push(idx as u32);
        }

        self.centroids = centroids;
        self.lists = lists;
    }

    /// Searches for the `k` nearest vectors, sorted by ascending L2
    /// distance (ties broken by insertion index).
    ///
    /// Probes the nearest coarse lists, widening until at least `k`
    /// candidates are gathered or every list has been visited. An untrained
    /// index scans exhaustively.
    #[must_use]
    pub fn search(&self, query: &[f32], k: usize) -> Vec<RecallHit> {
        if k == 0 || self.is_empty() {
            return Vec::new();
        }
        if query.len() != self.dim {
            warn!(
                expected = self.dim,
                got = query.len(),
                "query vector dimension mismatch, returning empty recall"
            );
            return Vec::new();
        }

        let candidates: Vec<u32> = if self.centroids.is_empty() {
            let len = u32::try_from(self.len()).unwrap_or(u32::MAX);
            (0..len).collect()
        } else {
            let nlist = self.lists.len();
            let mut order: Vec<(usize, f32)> = (0..nlist)
                .map(|c| {
                    (
                        c,
                        l2_distance(&self.centroids[c * self.dim..(c + 1) * self.dim], query),
                    )
                })
                .collect();
            order.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

            let mut picked = Vec::new();
            for (rank, &(cluster, _)) in order.iter().enumerate() {
                if rank >= DEFAULT_NPROBE && picked.len() >= k {
                    break;
                }
                picked.extend_from_slice(&self.lists[cluster]);
            }
            picked
        };

        let mut ranked: Vec<(u32, f32)> = candidates
            .into_iter()
            .map(|idx| (idx, l2_distance(self.vector(idx as usize), query)))
            .collect();
        ranked.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked.truncate(k);

        ranked
            .into_iter()
            .map(|(idx, distance)| RecallHit {
                index: idx as usize,
                passage: self.passages[idx as usize].clone(),
                score: distance,
            })
            .collect()
    }

    /// Persists the index under `faiss_dir/index_<dim>/`, training the
    /// quantizer first if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if files cannot be written.
    pub fn save(&mut self, faiss_dir: &Path) -> Result<()> {
        if self.centroids.is_empty() {
            self.train();
        }
        let index_dir = faiss_dir.join(format!("index_{}", self.dim));
        fs::create_dir_all(&index_dir)?;

        let disk = VectorDisk {
            dim: self.dim,
            centroids: self.centroids.clone(),
            lists: self.lists.clone(),
            vectors: self.vectors.clone(),
        };
        let encoded = bincode::serialize(&disk).map_err(IndexError::from)?;
        fs::write(index_dir.join(INVERT_FILE), encoded)?;
        write_manifest(&index_dir.join(FORWARD_FILE), &self.passages)?;
        Ok(())
    }

    /// Loads a persisted index, validating the dimension against the
    /// current embedder.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::DimensionMismatch`] when the persisted
    /// dimension differs from `expected_dim`, and
    /// [`IndexError::MissingIndex`] when no index exists.
    pub fn load(faiss_dir: &Path, expected_dim: usize) -> Result<Self> {
        let index_dir = faiss_dir.join(format!("index_{expected_dim}"));
        let invert_path = index_dir.join(INVERT_FILE);
        if !invert_path.is_file() {
            if let Some(found) = find_other_dim(faiss_dir) {
                return Err(IndexError::DimensionMismatch {
                    found,
                    expected: expected_dim,
                }
                .into());
            }
            return Err(IndexError::MissingIndex {
                path: invert_path.display().to_string(),
            }
            .into());
        }

        let file = fs::File::open(&invert_path)?;
        // Note: unsafe is needed for memory-mapped I/O (memmap2)
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };
        let disk: VectorDisk = bincode::deserialize(&mmap).map_err(IndexError::from)?;
        if disk.dim != expected_dim {
            return Err(IndexError::DimensionMismatch {
                found: disk.dim,
                expected: expected_dim,
            }
            .into());
        }

        let passages = read_manifest(&index_dir.join(FORWARD_FILE))?;
        Ok(Self {
            dim: disk.dim,
            vectors: disk.vectors,
            passages,
            centroids: disk.centroids,
            lists: disk.lists,
        })
    }
}

/// Finds the dimension of any persisted `index_<d>` subdirectory.
fn find_other_dim(faiss_dir: &Path) -> Option<usize> {
    let entries = fs::read_dir(faiss_dir).ok()?;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(dim) = name.strip_prefix("index_")
            && let Ok(dim) = dim.parse::<usize>()
        {
            return Some(dim);
        }
    }
    None
}

/// Index of the centroid nearest to `query`.
fn nearest_centroid(centroids: &[f32], dim: usize, query: &[f32]) -> usize {
    let mut best = 0usize;
    let mut best_dist = f32::INFINITY;
    for (c, chunk) in centroids.chunks_exact(dim).enumerate() {
        let dist = l2_distance(chunk, query);
        if dist < best_dist {
            best = c;
            best_dist = dist;
        }
    }
    best
}

/// Euclidean (L2) distance between two equal-length vectors.
#[must_use]
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}
