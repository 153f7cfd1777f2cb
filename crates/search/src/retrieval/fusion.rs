//! Weighted score fusion for combining semantic and lexical results
//!
//! `final = similarity * semantic_weight + min(lexical / normalization, 1) * lexical_weight`
//!
//! A chunk found by only one retriever scores 0 for the other. Similarity is
//! floored at 0 and the fused score clamped to [0, 1].

use super::{sort_by_score, RetrievalMode, RetrievedChunk};
use std::collections::HashMap;

/// Fusion parameters
#[derive(Debug, Clone)]
pub struct WeightedFusion {
    /// Weight for vector similarity
    pub semantic_weight: f32,

    /// Weight for normalized BM25 score
    pub lexical_weight: f32,

    /// BM25 score mapped to 1.0
    pub normalization: f32,
}

impl Default for WeightedFusion {
    fn default() -> Self {
        Self {
            semantic_weight: 0.7,
            lexical_weight: 0.3,
            normalization: 10.0,
        }
    }
}

impl WeightedFusion {
    /// Create with custom weights
    pub fn new(semantic_weight: f32, lexical_weight: f32, normalization: f32) -> Self {
        Self {
            semantic_weight,
            lexical_weight,
            normalization,
        }
    }

    /// Bounded approximation of the unbounded BM25 range
    pub fn normalize(&self, lexical_score: f32) -> f32 {
        if self.normalization <= 0.0 {
            return 0.0;
        }
        (lexical_score / self.normalization).clamp(0.0, 1.0)
    }

    /// Weighted sum, clamped to [0, 1]
    pub fn final_score(&self, similarity: f32, lexical: f32) -> f32 {
        let score =
            similarity.max(0.0) * self.semantic_weight + self.normalize(lexical) * self.lexical_weight;
        score.clamp(0.0, 1.0)
    }

    /// Merge by chunk id, score, sort descending and truncate to `limit`
    pub fn fuse(
        &self,
        semantic_results: Vec<RetrievedChunk>,
        lexical_results: Vec<RetrievedChunk>,
        limit: usize,
    ) -> Vec<RetrievedChunk> {
        let mut merged: HashMap<String, RetrievedChunk> = HashMap::new();

        for chunk in semantic_results {
            merged.insert(chunk.chunk_id.clone(), chunk);
        }

        for chunk in lexical_results {
            match merged.get_mut(&chunk.chunk_id) {
                Some(existing) => existing.lexical_score = chunk.lexical_score,
                None => {
                    merged.insert(chunk.chunk_id.clone(), chunk);
                }
            }
        }

        let mut results: Vec<RetrievedChunk> = merged
            .into_values()
            .map(|mut chunk| {
                let similarity = *chunk.similarity_score.get_or_insert(0.0);
                let lexical = *chunk.lexical_score.get_or_insert(0.0);
                let final_score = self.final_score(similarity, lexical);

                chunk.final_score = Some(final_score);
                chunk.score = final_score;
                chunk.retrieval_mode = RetrievalMode::Hybrid;
                chunk
            })
            .collect();

        sort_by_score(&mut results);
        results.truncate(limit);
        results
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::chunk;
    use super::*;

    fn semantic(id: &str, similarity: f32) -> RetrievedChunk {
        let mut result = RetrievedChunk::from_indexed(&chunk(id, 0, "text"), RetrievalMode::Semantic);
        result.similarity_score = Some(similarity);
        result.score = similarity;
        result
    }

    fn lexical(id: &str, score: f32) -> RetrievedChunk {
        let mut result = RetrievedChunk::from_indexed(&chunk(id, 0, "text"), RetrievalMode::Lexical);
        result.lexical_score = Some(score);
        result.score = score;
        result
    }

    #[test]
    fn test_weighted_fusion() {
        let fusion = WeightedFusion::default();

        // a: 0.9 * 0.7 + 0.2 * 0.3 = 0.69
        // b: 0.8 * 0.7 + 1.0 * 0.3 = 0.86
        // c: lexical only, 0.5 * 0.3 = 0.15
        let results = fusion.fuse(
            vec![semantic("a", 0.9), semantic("b", 0.8)],
            vec![lexical("b", 14.0), lexical("a", 2.0), lexical("c", 5.0)],
            10,
        );

        let ids: Vec<_> = results.iter().map(|r| r.document_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert!((results[0].final_score.unwrap() - 0.86).abs() < 1e-5);
        assert!((results[1].final_score.unwrap() - 0.69).abs() < 1e-5);
        assert_eq!(results[2].similarity_score, Some(0.0));
        assert!(results.iter().all(|r| r.retrieval_mode == RetrievalMode::Hybrid));
    }

    #[test]
    fn test_fusion_truncates() {
        let fusion = WeightedFusion::default();
        let results = fusion.fuse(
            vec![semantic("a", 0.9), semantic("b", 0.8), semantic("c", 0.7)],
            vec![],
            2,
        );
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_fusion_is_monotonic() {
        let fusion = WeightedFusion::default();
        let grid = [-0.5f32, 0.0, 0.2, 0.5, 0.9, 1.0];
        let lexical_grid = [0.0f32, 1.0, 5.0, 9.9, 10.0, 25.0];

        for &sa in &grid {
            for &sb in grid.iter().filter(|&&s| s <= sa) {
                for &la in &lexical_grid {
                    for &lb in lexical_grid.iter().filter(|&&l| l <= la) {
                        assert!(
                            fusion.final_score(sa, la) >= fusion.final_score(sb, lb),
                            "({}, {}) vs ({}, {})",
                            sa,
                            la,
                            sb,
                            lb
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_final_score_is_bounded() {
        let fusion = WeightedFusion::default();
        assert!((fusion.final_score(1.0, 1000.0) - 1.0).abs() < 1e-6);
        assert_eq!(fusion.final_score(-1.0, 0.0), 0.0);

        let heavy = WeightedFusion::new(1.0, 1.0, 10.0);
        assert_eq!(heavy.final_score(1.0, 20.0), 1.0);
        let results = heavy.fuse(vec![semantic("a", 0.9)], vec![lexical("a", 10.0)], 1);
        assert_eq!(results[0].final_score, Some(1.0));
    }
}
