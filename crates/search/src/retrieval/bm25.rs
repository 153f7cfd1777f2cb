//! BM25 lexical search over an in-memory corpus
//!
//! The ranking structure (document frequencies, IDF table, average length) is
//! rebuilt from the full corpus on every write. Writers take the lock exclusively,
//! so searches never observe a half-built table.

use super::{
    admits, sort_by_score, IndexedChunk, MetadataFilter, RetrievalMode, RetrievedChunk, Retriever,
    SearchRequest,
};
use coursefind_common::errors::Result;
use coursefind_common::text::tokenize;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::debug;

/// Term frequency saturation
pub const DEFAULT_K1: f32 = 1.5;

/// Length normalization
pub const DEFAULT_B: f32 = 0.75;

struct Bm25Entry {
    chunk: IndexedChunk,
    term_freqs: HashMap<String, usize>,
    length: usize,
}

impl Bm25Entry {
    fn new(chunk: IndexedChunk) -> Self {
        let tokens = tokenize(&chunk.text);
        let length = tokens.len();
        let mut term_freqs = HashMap::new();
        for token in tokens {
            *term_freqs.entry(token).or_insert(0) += 1;
        }
        Self {
            chunk,
            term_freqs,
            length,
        }
    }
}

#[derive(Default)]
struct Corpus {
    entries: BTreeMap<String, Bm25Entry>,
    idf: HashMap<String, f32>,
    avg_length: f32,
}

impl Corpus {
    fn rebuild(&mut self) {
        let n = self.entries.len() as f32;

        let mut doc_freqs: HashMap<&str, usize> = HashMap::new();
        let mut total_length = 0usize;
        for entry in self.entries.values() {
            total_length += entry.length;
            for term in entry.term_freqs.keys() {
                *doc_freqs.entry(term.as_str()).or_insert(0) += 1;
            }
        }

        self.idf = doc_freqs
            .into_iter()
            .map(|(term, df)| {
                let df = df as f32;
                (term.to_string(), (1.0 + (n - df + 0.5) / (df + 0.5)).ln())
            })
            .collect();

        self.avg_length = if self.entries.is_empty() {
            0.0
        } else {
            total_length as f32 / n
        };
    }
}

/// BM25 lexical index
pub struct Bm25Index {
    k1: f32,
    b: f32,
    corpus: RwLock<Corpus>,
}

impl Default for Bm25Index {
    fn default() -> Self {
        Self::new()
    }
}

impl Bm25Index {
    pub fn new() -> Self {
        Self::with_params(DEFAULT_K1, DEFAULT_B)
    }

    pub fn with_params(k1: f32, b: f32) -> Self {
        Self {
            k1,
            b,
            corpus: RwLock::new(Corpus::default()),
        }
    }

    /// Upsert chunks and rebuild the ranking structure
    pub async fn add(&self, chunks: &[IndexedChunk]) -> usize {
        let mut corpus = self.corpus.write().await;
        for chunk in chunks {
            corpus
                .entries
                .insert(chunk.chunk_id.clone(), Bm25Entry::new(chunk.clone()));
        }
        corpus.rebuild();

        debug!(added = chunks.len(), total = corpus.entries.len(), "Lexical index rebuilt");
        chunks.len()
    }

    /// Remove chunks and rebuild, returning how many were present
    pub async fn remove(&self, chunk_ids: &[String]) -> usize {
        let mut corpus = self.corpus.write().await;
        let removed = chunk_ids
            .iter()
            .filter(|id| corpus.entries.remove(id.as_str()).is_some())
            .count();
        if removed > 0 {
            corpus.rebuild();
        }
        removed
    }

    /// Score every corpus entry and return the `top_k` with a positive score
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Vec<RetrievedChunk> {
        let terms = tokenize(query);
        if terms.is_empty() {
            return Vec::new();
        }

        let corpus = self.corpus.read().await;
        let mut results: Vec<RetrievedChunk> = corpus
            .entries
            .values()
            .filter(|e| admits(filter, &e.chunk.metadata))
            .filter_map(|entry| {
                let score = self.score(&corpus, entry, &terms);
                (score > 0.0).then(|| {
                    let mut result = RetrievedChunk::from_indexed(&entry.chunk, RetrievalMode::Lexical);
                    result.lexical_score = Some(score);
                    result.score = score;
                    result
                })
            })
            .collect();

        sort_by_score(&mut results);
        results.truncate(top_k);
        results
    }

    fn score(&self, corpus: &Corpus, entry: &Bm25Entry, terms: &[String]) -> f32 {
        let length_norm = if corpus.avg_length > 0.0 {
            entry.length as f32 / corpus.avg_length
        } else {
            0.0
        };

        terms
            .iter()
            .filter_map(|term| {
                let tf = *entry.term_freqs.get(term)? as f32;
                let idf = corpus.idf.get(term).copied().unwrap_or(0.0);
                Some(idf * tf * (self.k1 + 1.0) / (tf + self.k1 * (1.0 - self.b + self.b * length_norm)))
            })
            .sum()
    }

    pub async fn contains(&self, chunk_id: &str) -> bool {
        self.corpus.read().await.entries.contains_key(chunk_id)
    }

    pub async fn len(&self) -> usize {
        self.corpus.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.corpus.read().await.entries.is_empty()
    }
}

#[async_trait::async_trait]
impl Retriever for Bm25Index {
    async fn retrieve(&self, request: &SearchRequest) -> Result<Vec<RetrievedChunk>> {
        Ok(self
            .search(&request.query, request.limit, request.filter.as_ref())
            .await)
    }

    fn mode(&self) -> RetrievalMode {
        RetrievalMode::Lexical
    }
}
