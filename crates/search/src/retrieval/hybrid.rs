//! Hybrid retrieval combining vector and BM25 search
//!
//! Uses weighted fusion to combine results from both retrievers

use super::{
    bm25::Bm25Index, fusion::WeightedFusion, vector::VectorIndex, RetrievalMode, RetrievedChunk,
    Retriever, SearchRequest,
};
use coursefind_common::errors::Result;
use std::sync::Arc;
use tracing::warn;

/// Hybrid retriever combining vector and BM25
pub struct HybridRetriever {
    vector: Arc<VectorIndex>,
    bm25: Arc<Bm25Index>,
    fusion: WeightedFusion,
    candidate_multiplier: usize,
}

impl HybridRetriever {
    /// Create a new hybrid retriever over shared indices
    pub fn new(
        vector: Arc<VectorIndex>,
        bm25: Arc<Bm25Index>,
        fusion: WeightedFusion,
        candidate_multiplier: usize,
    ) -> Self {
        Self {
            vector,
            bm25,
            fusion,
            candidate_multiplier: candidate_multiplier.max(1),
        }
    }

    pub fn fusion(&self) -> &WeightedFusion {
        &self.fusion
    }
}

#[async_trait::async_trait]
impl Retriever for HybridRetriever {
    async fn retrieve(&self, request: &SearchRequest) -> Result<Vec<RetrievedChunk>> {
        // Fetch more results from each retriever for better fusion
        let mut expanded = request.clone();
        expanded.limit = request.limit.saturating_mul(self.candidate_multiplier);

        // Execute both searches in parallel
        let (vector_results, bm25_results) = tokio::join!(
            self.vector.retrieve(&expanded),
            self.bm25.retrieve(&expanded)
        );

        let vector_results = vector_results.unwrap_or_else(|e| {
            warn!(error = %e, "Semantic half of hybrid search failed");
            Vec::new()
        });
        let bm25_results = bm25_results.unwrap_or_else(|e| {
            warn!(error = %e, "Lexical half of hybrid search failed");
            Vec::new()
        });

        Ok(self.fusion.fuse(vector_results, bm25_results, request.limit))
    }

    fn mode(&self) -> RetrievalMode {
        RetrievalMode::Hybrid
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::chunk;
    use super::*;
    use coursefind_common::embeddings::MockEmbedder;

    #[tokio::test]
    async fn test_hybrid_merges_both_indices() {
        let vector = Arc::new(VectorIndex::new(Arc::new(MockEmbedder::new(64))));
        let bm25 = Arc::new(Bm25Index::new());
        let chunks = vec![
            chunk("rec", 0, "recursion needs a base case"),
            chunk("db", 0, "databases use indexes"),
        ];
        vector.add(&chunks).await.unwrap();
        bm25.add(&chunks).await;

        let hybrid = HybridRetriever::new(vector, bm25, WeightedFusion::default(), 2);
        let results = hybrid
            .retrieve(&SearchRequest::new("recursion base case", RetrievalMode::Hybrid, 1))
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        let top = &results[0];
        assert_eq!(top.document_id, "rec");
        assert!(top.similarity_score.unwrap() > 0.0);
        assert!(top.lexical_score.unwrap() > 0.0);
        assert_eq!(top.final_score, Some(top.score));
    }
}
