//! In-memory vector index over extracted-text artifacts.
//!
//! Built from scratch on every processing action: read each artifact, chunk
//! it, embed every chunk in batches, keep `(chunk, vector)` pairs in a `Vec`.
//! Search is brute-force cosine similarity over all stored vectors.
//! Chunks whose text hash was already seen (headers, license pages, the same
//! file in two formats) are dropped before embedding.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::chunk::chunk_text;
use crate::config::ChunkingConfig;
use crate::embedding::{cosine_similarity, Embedder};
use crate::models::{Chunk, RetrievedChunk};
use crate::progress::{ProgressEvent, ProgressReporter};

struct IndexEntry {
    chunk: Chunk,
    vector: Vec<f32>,
}

pub struct VectorIndex {
    entries: Vec<IndexEntry>,
    sources: Vec<PathBuf>,
    model: String,
}

impl VectorIndex {
    /// Chunk and embed every artifact.
    ///
    /// Fails if an artifact cannot be read, the embedder fails, or the
    /// artifacts hold no text at all.
    pub async fn build(
        artifacts: &[PathBuf],
        embedder: &dyn Embedder,
        chunking: &ChunkingConfig,
        batch_size: usize,
        progress: &dyn ProgressReporter,
    ) -> Result<Self> {
        let mut chunks = Vec::new();
        let mut seen = HashSet::new();
        let mut duplicates = 0usize;
        for artifact in artifacts {
            let text = read_artifact(artifact)?;
            for chunk in chunk_text(artifact, &text, chunking) {
                if seen.insert(chunk.hash.clone()) {
                    chunks.push(chunk);
                } else {
                    duplicates += 1;
                }
            }
        }

        if chunks.is_empty() {
            bail!("No text to index in {} artifact(s)", artifacts.len());
        }

        let total = chunks.len() as u64;
        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let batch_vectors = embedder
                .embed(&texts)
                .await
                .with_context(|| format!("Embedding failed ({})", embedder.model_name()))?;
            if batch_vectors.len() != batch.len() {
                bail!(
                    "Embedder returned {} vectors for {} chunks",
                    batch_vectors.len(),
                    batch.len()
                );
            }
            vectors.extend(batch_vectors);
            progress.report(ProgressEvent::Embedding {
                done: vectors.len() as u64,
                total,
            });
        }

        tracing::info!(
            artifacts = artifacts.len(),
            chunks = chunks.len(),
            duplicates,
            model = embedder.model_name(),
            "index built"
        );

        Ok(Self {
            entries: chunks
                .into_iter()
                .zip(vectors)
                .map(|(chunk, vector)| IndexEntry { chunk, vector })
                .collect(),
            sources: artifacts.to_vec(),
            model: embedder.model_name().to_string(),
        })
    }

    /// The `top_k` most similar chunks, best first.
    pub fn search(&self, query: &[f32], top_k: usize) -> Vec<RetrievedChunk> {
        let mut scored: Vec<(f32, &IndexEntry)> = self
            .entries
            .iter()
            .map(|e| (cosine_similarity(query, &e.vector), e))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(top_k)
            .map(|(score, e)| RetrievedChunk {
                chunk: e.chunk.clone(),
                score,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Artifacts the index was built from.
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }
}

fn read_artifact(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read artifact {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
