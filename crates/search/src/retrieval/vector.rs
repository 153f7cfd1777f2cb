//! In-memory vector index
//!
//! Stores one embedding per chunk and answers nearest-neighbour queries by
//! brute-force cosine similarity.

use super::{
    admits, sort_by_score, IndexedChunk, MetadataFilter, RetrievalMode, RetrievedChunk, Retriever,
    SearchRequest,
};
use coursefind_common::embeddings::{cosine_similarity, Embedder};
use coursefind_common::errors::{AppError, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

struct VectorEntry {
    chunk: IndexedChunk,
    embedding: Vec<f32>,
}

/// Vector index backed by an external embedder
pub struct VectorIndex {
    embedder: Arc<dyn Embedder>,
    entries: RwLock<HashMap<String, VectorEntry>>,
}

impl VectorIndex {
    /// Create an empty index
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    /// Embed and upsert `chunks`.
    ///
    /// All or nothing: if any embedding fails, nothing is written.
    pub async fn add(&self, chunks: &[IndexedChunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;

        if embeddings.len() != chunks.len() {
            return Err(AppError::EmbeddingError {
                message: format!(
                    "Expected {} embeddings, received {}",
                    chunks.len(),
                    embeddings.len()
                ),
            });
        }

        let mut entries = self.entries.write().await;
        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            entries.insert(
                chunk.chunk_id.clone(),
                VectorEntry {
                    chunk: chunk.clone(),
                    embedding,
                },
            );
        }

        debug!(added = chunks.len(), total = entries.len(), "Vector index updated");
        Ok(chunks.len())
    }

    /// Embed the query and return the `top_k` most similar chunks
    pub async fn try_search(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievedChunk>> {
        if self.is_empty().await {
            return Ok(Vec::new());
        }
        let embedding = self.embedder.embed(query).await?;
        Ok(self.search_by_vector(&embedding, top_k, filter, None).await)
    }

    /// Rank stored chunks against `vector`, optionally skipping one document's chunks
    pub async fn search_by_vector(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
        exclude_document: Option<&str>,
    ) -> Vec<RetrievedChunk> {
        let entries = self.entries.read().await;

        let mut results: Vec<RetrievedChunk> = entries
            .values()
            .filter(|e| exclude_document != Some(e.chunk.document_id.as_str()))
            .filter(|e| admits(filter, &e.chunk.metadata))
            .map(|e| scored(&e.chunk, cosine_similarity(vector, &e.embedding)))
            .collect();

        sort_by_score(&mut results);
        results.truncate(top_k);
        results
    }

    /// Score specific chunks against the query; unknown ids are skipped.
    ///
    /// Chunks are kept with similarity 0.0 if the query cannot be embedded.
    pub async fn score_chunks(&self, query: &str, chunk_ids: &[String]) -> Vec<RetrievedChunk> {
        let query_embedding = match self.embedder.embed(query).await {
            Ok(embedding) => Some(embedding),
            Err(e) => {
                warn!(error = %e, "Failed to embed query for context scoring");
                None
            }
        };

        let entries = self.entries.read().await;
        let mut seen = HashSet::new();
        chunk_ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .filter_map(|id| entries.get(id))
            .map(|e| {
                let similarity = query_embedding
                    .as_deref()
                    .map_or(0.0, |q| cosine_similarity(q, &e.embedding));
                scored(&e.chunk, similarity)
            })
            .collect()
    }

    /// Mean of the stored embeddings of `chunk_ids`, or `None` if none are stored
    pub async fn mean_embedding(&self, chunk_ids: &[String]) -> Option<Vec<f32>> {
        let entries = self.entries.read().await;
        let vectors: Vec<&Vec<f32>> = chunk_ids
            .iter()
            .filter_map(|id| entries.get(id))
            .map(|e| &e.embedding)
            .collect();

        let first = vectors.first()?;
        let mut mean = vec![0.0f32; first.len()];
        for vector in &vectors {
            for (slot, value) in mean.iter_mut().zip(vector.iter()) {
                *slot += value;
            }
        }
        let count = vectors.len() as f32;
        mean.iter_mut().for_each(|x| *x /= count);
        Some(mean)
    }

    /// Remove a chunk; absent ids are not an error
    pub async fn delete(&self, chunk_id: &str) -> bool {
        self.entries.write().await.remove(chunk_id).is_some()
    }

    /// Remove several chunks, returning how many were present
    pub async fn delete_many(&self, chunk_ids: &[String]) -> usize {
        let mut entries = self.entries.write().await;
        chunk_ids
            .iter()
            .filter(|id| entries.remove(id.as_str()).is_some())
            .count()
    }

    pub async fn contains(&self, chunk_id: &str) -> bool {
        self.entries.read().await.contains_key(chunk_id)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

fn scored(chunk: &IndexedChunk, similarity: f32) -> RetrievedChunk {
    let mut result = RetrievedChunk::from_indexed(chunk, RetrievalMode::Semantic);
    result.similarity_score = Some(similarity);
    result.score = similarity.clamp(0.0, 1.0);
    result
}

#[async_trait::async_trait]
impl Retriever for VectorIndex {
    /// Semantic retrieval; an embedding failure yields an empty list
    async fn retrieve(&self, request: &SearchRequest) -> Result<Vec<RetrievedChunk>> {
        match self
            .try_search(&request.query, request.limit, request.filter.as_ref())
            .await
        {
            Ok(results) => Ok(results),
            Err(e) => {
                warn!(
                    error = %e,
                    model = self.embedder.model_name(),
                    "Vector search failed, returning no results"
                );
                Ok(Vec::new())
            }
        }
    }

    fn mode(&self) -> RetrievalMode {
        RetrievalMode::Semantic
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::chunk;
    use super::*;
    use async_trait::async_trait;
    use coursefind_common::embeddings::MockEmbedder;
    use serde_json::json;

    struct BrokenEmbedder;

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(AppError::ServiceUnavailable {
                message: "embedding service unreachable".to_string(),
            })
        }

        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(AppError::ServiceUnavailable {
                message: "embedding service unreachable".to_string(),
            })
        }

        fn model_name(&self) -> &str {
            "broken"
        }

        fn dimension(&self) -> usize {
            8
        }
    }

    fn index() -> VectorIndex {
        VectorIndex::new(Arc::new(MockEmbedder::new(64)))
    }

    #[tokio::test]
    async fn test_search_ranks_matching_chunk_first() {
        let index = index();
        index
            .add(&[
                chunk("a", 0, "recursion base case stack frames"),
                chunk("b", 0, "database indexes and query planners"),
            ])
            .await
            .unwrap();

        let results = index.try_search("recursion base case", 2, None).await.unwrap();
        assert_eq!(results[0].chunk_id, "a_chunk_0");
        assert!(results[0].similarity_score.unwrap() > results[1].similarity_score.unwrap());
        assert!((0.0..=1.0).contains(&results[0].score));
    }

    #[tokio::test]
    async fn test_exact_text_has_full_similarity() {
        let index = index();
        index.add(&[chunk("a", 0, "binary search trees")]).await.unwrap();
        let results = index.try_search("Binary search trees", 1, None).await.unwrap();
        assert!((results[0].similarity_score.unwrap() - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_empty_index_returns_nothing() {
        let results = index().retrieve(&SearchRequest::new("anything", RetrievalMode::Semantic, 5)).await;
        assert!(results.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_filter_applies_before_truncation() {
        let index = index();
        let mut tagged = chunk("b", 0, "graph traversal basics");
        tagged.metadata.insert("course_id".to_string(), json!("cs201"));
        index
            .add(&[chunk("a", 0, "graph traversal basics explained"), tagged])
            .await
            .unwrap();

        let filter = MetadataFilter([("course_id".to_string(), json!("cs201"))].into_iter().collect());
        let results = index.try_search("graph traversal basics explained", 1, Some(&filter)).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document_id, "b");
    }

    #[tokio::test]
    async fn test_embedding_failure_is_all_or_nothing() {
        let index = VectorIndex::new(Arc::new(BrokenEmbedder));
        assert!(index.add(&[chunk("a", 0, "text")]).await.is_err());
        assert!(index.is_empty().await);

        let results = index
            .retrieve(&SearchRequest::new("text", RetrievalMode::Semantic, 3))
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let index = index();
        index.add(&[chunk("a", 0, "text"), chunk("a", 1, "more text")]).await.unwrap();

        assert!(index.delete("a_chunk_0").await);
        assert!(!index.delete("a_chunk_0").await);
        assert!(!index.delete("never-existed").await);
        assert_eq!(index.delete_many(&["a_chunk_1".to_string(), "zzz".to_string()]).await, 1);
        assert!(index.is_empty().await);
    }

    #[tokio::test]
    async fn test_score_chunks_and_mean_embedding() {
        let index = index();
        index
            .add(&[chunk("a", 0, "sorting algorithms"), chunk("a", 1, "merge sort")])
            .await
            .unwrap();

        let ids = vec!["a_chunk_1".to_string(), "missing".to_string(), "a_chunk_1".to_string()];
        let scored = index.score_chunks("merge sort", &ids).await;
        assert_eq!(scored.len(), 1);
        assert!(scored[0].similarity_score.unwrap() > 0.99);

        let mean = index
            .mean_embedding(&["a_chunk_0".to_string(), "a_chunk_1".to_string()])
            .await
            .unwrap();
        assert_eq!(mean.len(), 64);
        assert!(index.mean_embedding(&["missing".to_string()]).await.is_none());
    }
}
