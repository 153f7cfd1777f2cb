//! Retrieval orchestrator
//!
//! Owns the document lifecycle across both indices, dispatches searches to the
//! right retriever and drives answer synthesis.

use crate::retrieval::{
    Bm25Index, HybridRetriever, IndexedChunk, Metadata, RetrievalMode, RetrievedChunk, Retriever,
    SearchRequest, VectorIndex, WeightedFusion,
};
use chrono::{DateTime, Utc};
use coursefind_common::{
    config::{AppConfig, SearchConfig},
    context::{
        AnswerLength, AnswerSynthesizer, SynthesisContext, SynthesizedAnswer, MAX_CONTEXT_CHUNKS,
    },
    embeddings::{create_embedder, Embedder},
    errors::{AppError, Result},
    llm::create_language_model,
    metrics,
    text::TextProcessor,
};
use serde::Serialize;
use serde_json::json;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

/// Query expansions appended after corpus-derived suggestions
const SUGGESTION_TEMPLATES: &[&str] = &[
    "{q} tutorial",
    "{q} guide",
    "{q} examples",
    "{q} definition",
    "{q} overview",
    "how to {q}",
    "{q} best practices",
    "{q} fundamentals",
    "advanced {q}",
    "{q} applications",
];

/// Lock stripes serializing writes that target the same document id
const WRITE_LOCK_STRIPES: usize = 64;

/// A document submitted for indexing
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub content: String,
    pub metadata: Metadata,
}

/// Result of a successful `index_document`
#[derive(Debug, Clone, Serialize)]
pub struct IndexOutcome {
    pub document_id: String,
    pub chunk_count: usize,
    /// Characters after cleaning
    pub cleaned_length: usize,
    pub embedding_dimensions: usize,
    pub processing_time_ms: u64,
    pub indexed_at: DateTime<Utc>,
}

/// An answer together with the chunks it was grounded on
#[derive(Debug, Clone)]
pub struct GeneratedAnswer {
    pub answer: SynthesizedAnswer,
    pub sources: Vec<RetrievedChunk>,
}

/// Corpus statistics
#[derive(Debug, Clone, Serialize)]
pub struct CorpusStats {
    pub documents: usize,
    pub chunks: usize,
    pub vector_chunks: usize,
    pub lexical_chunks: usize,
}

struct DocumentRecord {
    title: String,
    chunk_ids: Vec<String>,
    keywords: Vec<String>,
}

/// The search engine shared by all request handlers
pub struct SearchEngine {
    processor: TextProcessor,
    vector: Arc<VectorIndex>,
    lexical: Arc<Bm25Index>,
    hybrid: HybridRetriever,
    synthesizer: AnswerSynthesizer,
    config: SearchConfig,
    documents: RwLock<HashMap<String, DocumentRecord>>,
    write_locks: Vec<Mutex<()>>,
}

impl SearchEngine {
    /// Assemble an engine with empty indices
    pub fn new(
        config: SearchConfig,
        embedder: Arc<dyn Embedder>,
        synthesizer: AnswerSynthesizer,
    ) -> Self {
        let vector = Arc::new(VectorIndex::new(embedder));
        let lexical = Arc::new(Bm25Index::new());
        let fusion = WeightedFusion::new(
            config.semantic_weight,
            config.lexical_weight,
            config.lexical_normalization,
        );
        let hybrid = HybridRetriever::new(
            vector.clone(),
            lexical.clone(),
            fusion,
            config.hybrid_candidate_multiplier,
        );

        Self {
            processor: TextProcessor::new(),
            vector,
            lexical,
            hybrid,
            synthesizer,
            config,
            documents: RwLock::new(HashMap::new()),
            write_locks: (0..WRITE_LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Build the engine and its model clients from application config
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let model = create_language_model(&config.llm)?;
        let synthesizer = AnswerSynthesizer::new(
            model,
            config.llm.temperature,
            Duration::from_secs(config.llm.timeout_secs),
        );

        info!(
            embedding_model = embedder.model_name(),
            dimension = embedder.dimension(),
            llm_model = synthesizer.model_name(),
            "Search engine initialized"
        );

        Ok(Self::new(config.search.clone(), embedder, synthesizer))
    }

    /// Writes to one document id never interleave; other ids proceed in parallel
    fn write_lock(&self, document_id: &str) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        document_id.hash(&mut hasher);
        &self.write_locks[hasher.finish() as usize % self.write_locks.len()]
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn embedding_dimension(&self) -> usize {
        self.vector.dimension()
    }

    /// Clean, chunk and add a document to both indices.
    ///
    /// Re-indexing an existing id replaces its chunks. Fails only on invalid
    /// input or when the vector index write fails, in which case a previously
    /// indexed version stays untouched.
    pub async fn index_document(&self, document: Document) -> Result<IndexOutcome> {
        let start = Instant::now();

        if document.id.trim().is_empty() {
            return Err(AppError::validation("content_id", "content_id must not be empty"));
        }

        let cleaned = self.processor.clean(&document.content);
        if cleaned.is_empty() {
            return Err(AppError::validation(
                "content",
                "content must contain indexable text",
            ));
        }

        let text_chunks =
            self.processor
                .chunk(&cleaned, self.config.max_chunk_size, self.config.chunk_overlap);
        let keywords = self
            .processor
            .extract_keywords(&cleaned, self.config.keyword_count);
        let created_at = Utc::now().to_rfc3339();

        let _guard = self.write_lock(&document.id).lock().await;

        let chunks: Vec<IndexedChunk> = text_chunks
            .iter()
            .enumerate()
            .map(|(index, text_chunk)| {
                let mut metadata = document.metadata.clone();
                metadata.insert("original_id".to_string(), json!(document.id));
                metadata.insert("title".to_string(), json!(document.title));
                metadata.insert("chunk_index".to_string(), json!(index));
                metadata.insert("chunk_size".to_string(), json!(text_chunk.size));
                metadata.insert("created_at".to_string(), json!(created_at));
                if index == 0 {
                    metadata.insert("keywords".to_string(), json!(keywords));
                }

                IndexedChunk {
                    chunk_id: format!("{}_chunk_{}", document.id, index),
                    document_id: document.id.clone(),
                    text: text_chunk.text.clone(),
                    metadata,
                }
            })
            .collect();

        if let Err(e) = self.vector.add(&chunks).await {
            metrics::record_indexing(start.elapsed().as_secs_f64(), 0, false);
            error!(
                document_id = %document.id,
                error = %e,
                "Vector index write failed, document not indexed"
            );
            return Err(e);
        }

        self.lexical.add(&chunks).await;

        let chunk_ids: Vec<String> = chunks.iter().map(|c| c.chunk_id.clone()).collect();
        let previous = self.documents.write().await.insert(
            document.id.clone(),
            DocumentRecord {
                title: document.title.clone(),
                chunk_ids: chunk_ids.clone(),
                keywords,
            },
        );

        // Drop chunks of a previous version that the new one did not overwrite
        if let Some(previous) = previous {
            let current: HashSet<&String> = chunk_ids.iter().collect();
            let stale: Vec<String> = previous
                .chunk_ids
                .into_iter()
                .filter(|id| !current.contains(id))
                .collect();
            if !stale.is_empty() {
                self.vector.delete_many(&stale).await;
                self.lexical.remove(&stale).await;
                debug!(document_id = %document.id, stale = stale.len(), "Removed stale chunks");
            }
        }

        let processing_time = start.elapsed();
        metrics::record_indexing(processing_time.as_secs_f64(), chunks.len(), true);

        info!(
            document_id = %document.id,
            chunks = chunks.len(),
            cleaned_length = cleaned.chars().count(),
            latency_ms = processing_time.as_millis() as u64,
            "Document indexed"
        );

        Ok(IndexOutcome {
            document_id: document.id,
            chunk_count: chunks.len(),
            cleaned_length: cleaned.chars().count(),
            embedding_dimensions: self.vector.dimension(),
            processing_time_ms: processing_time.as_millis() as u64,
            indexed_at: Utc::now(),
        })
    }

    /// Run a search in the requested mode.
    ///
    /// `score` on each result is the mode's relevance in [0, 1]: similarity for
    /// semantic, normalized BM25 for lexical, the fused score for hybrid.
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<RetrievedChunk>> {
        if request.query.trim().is_empty() {
            return Err(AppError::validation("query", "query must not be empty"));
        }
        if request.limit == 0 {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let retriever: &dyn Retriever = match request.mode {
            RetrievalMode::Semantic => self.vector.as_ref(),
            RetrievalMode::Lexical => self.lexical.as_ref(),
            RetrievalMode::Hybrid => &self.hybrid,
        };

        let mut results = retriever.retrieve(request).await?;

        if request.mode == RetrievalMode::Lexical {
            let fusion = self.hybrid.fusion();
            for result in &mut results {
                result.score = fusion.normalize(result.lexical_score.unwrap_or(0.0));
            }
        }

        let elapsed = start.elapsed();
        metrics::record_search(elapsed.as_secs_f64(), retriever.mode().as_str(), results.len());
        debug!(
            mode = %request.mode,
            results = results.len(),
            latency_ms = elapsed.as_millis() as u64,
            "Search completed"
        );

        Ok(results)
    }

    /// Answer a question from the corpus.
    ///
    /// With `context_ids`, exactly those chunks (or all chunks of those documents)
    /// are used. Otherwise a hybrid search runs and only results at or above the
    /// similarity threshold are kept. With no usable context the synthesizer is
    /// not called and the fixed "not enough information" answer is returned.
    pub async fn generate_answer(
        &self,
        query: &str,
        context_ids: Option<&[String]>,
        length: AnswerLength,
    ) -> Result<GeneratedAnswer> {
        if query.trim().is_empty() {
            return Err(AppError::validation("query", "query must not be empty"));
        }

        let start = Instant::now();

        let mut sources = match context_ids {
            Some(ids) if !ids.is_empty() => {
                let chunk_ids = self.resolve_context_ids(ids).await;
                self.vector.score_chunks(query, &chunk_ids).await
            }
            _ => {
                let request =
                    SearchRequest::new(query, RetrievalMode::Hybrid, self.config.max_retrieval_docs);
                self.search(&request)
                    .await?
                    .into_iter()
                    .filter(|c| c.similarity_score.unwrap_or(0.0) >= self.config.similarity_threshold)
                    .collect()
            }
        };

        if sources.is_empty() {
            metrics::record_answer(start.elapsed().as_secs_f64(), "insufficient_context");
            info!(query = %query, "No context above threshold, skipping synthesis");
            return Ok(GeneratedAnswer {
                answer: SynthesizedAnswer::not_enough_information(),
                sources: Vec::new(),
            });
        }

        sources.truncate(MAX_CONTEXT_CHUNKS);
        let contexts: Vec<SynthesisContext> = sources
            .iter()
            .map(|s| SynthesisContext {
                chunk_id: s.chunk_id.clone(),
                title: s.title().to_string(),
                content: s.content.clone(),
                similarity_score: s.similarity_score.unwrap_or(0.0),
            })
            .collect();

        let answer = self.synthesizer.generate(query, &contexts, length).await;

        let outcome = if answer.is_fallback() { "fallback" } else { "generated" };
        metrics::record_answer(start.elapsed().as_secs_f64(), outcome);
        info!(
            query = %query,
            sources = sources.len(),
            confidence = answer.confidence,
            outcome,
            "Answer generated"
        );

        Ok(GeneratedAnswer { answer, sources })
    }

    /// Expand document ids into their chunk ids; other ids pass through
    async fn resolve_context_ids(&self, ids: &[String]) -> Vec<String> {
        let documents = self.documents.read().await;
        ids.iter()
            .flat_map(|id| match documents.get(id) {
                Some(record) => record.chunk_ids.clone(),
                None => vec![id.clone()],
            })
            .collect()
    }

    /// Remove every chunk of a document from both indices.
    ///
    /// Unknown ids are not an error; returns the number of chunks removed.
    pub async fn delete_document(&self, document_id: &str) -> usize {
        let _guard = self.write_lock(document_id).lock().await;
        let record = self.documents.write().await.remove(document_id);
        let Some(record) = record else {
            debug!(document_id, "Delete requested for unknown document");
            return 0;
        };

        let removed_vector = self.vector.delete_many(&record.chunk_ids).await;
        let removed_lexical = self.lexical.remove(&record.chunk_ids).await;

        if removed_vector != removed_lexical {
            warn!(
                document_id,
                removed_vector, removed_lexical, "Indices disagreed on document chunks"
            );
        }

        info!(document_id, chunks = record.chunk_ids.len(), "Document deleted");
        removed_vector.max(removed_lexical)
    }

    /// Documents similar to `document_id`, best chunk per document
    pub async fn find_similar(
        &self,
        document_id: &str,
        max_results: usize,
        threshold: f32,
    ) -> Vec<RetrievedChunk> {
        let chunk_ids = match self.documents.read().await.get(document_id) {
            Some(record) => record.chunk_ids.clone(),
            None => return Vec::new(),
        };

        let Some(centroid) = self.vector.mean_embedding(&chunk_ids).await else {
            return Vec::new();
        };

        let ranked = self
            .vector
            .search_by_vector(&centroid, usize::MAX, None, Some(document_id))
            .await;

        let mut seen = HashSet::new();
        ranked
            .into_iter()
            .filter(|c| c.similarity_score.unwrap_or(0.0) >= threshold)
            .filter(|c| seen.insert(c.document_id.clone()))
            .take(max_results)
            .collect()
    }

    /// Query completions: matching titles, keyword completions, then templates
    pub async fn suggest(&self, query: &str, limit: usize) -> Vec<String> {
        let query = query.trim();
        if query.is_empty() || limit == 0 {
            return Vec::new();
        }

        let lowered = query.to_lowercase();
        let (head, last_word) = match lowered.rsplit_once(char::is_whitespace) {
            Some((head, last)) => (Some(head.trim_end()), last),
            None => (None, lowered.as_str()),
        };

        let mut candidates = Vec::new();
        {
            let documents = self.documents.read().await;

            let mut titles: Vec<&str> = documents
                .values()
                .map(|d| d.title.as_str())
                .filter(|t| t.to_lowercase().contains(&lowered))
                .collect();
            titles.sort_unstable();
            candidates.extend(titles.into_iter().map(str::to_string));

            let mut keywords: Vec<&str> = documents
                .values()
                .flat_map(|d| d.keywords.iter().map(String::as_str))
                .filter(|k| k.starts_with(last_word) && *k != last_word)
                .collect();
            keywords.sort_unstable();
            candidates.extend(keywords.into_iter().map(|k| match head {
                Some(head) => format!("{} {}", head, k),
                None => k.to_string(),
            }));
        }

        candidates.extend(SUGGESTION_TEMPLATES.iter().map(|t| t.replace("{q}", query)));

        let mut seen = HashSet::new();
        candidates
            .into_iter()
            .filter(|s| seen.insert(s.to_lowercase()))
            .take(limit)
            .collect()
    }

    pub async fn stats(&self) -> CorpusStats {
        let documents = self.documents.read().await.len();
        let vector_chunks = self.vector.len().await;
        let lexical_chunks = self.lexical.len().await;

        CorpusStats {
            documents,
            chunks: vector_chunks.max(lexical_chunks),
            vector_chunks,
            lexical_chunks,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use coursefind_common::context::{FALLBACK_ANSWER, NOT_ENOUGH_INFORMATION};
    use coursefind_common::embeddings::MockEmbedder;
    use coursefind_common::llm::{Completion, CompletionRequest, LanguageModel, MockLanguageModel};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Language model that counts calls and optionally fails
    pub(crate) struct CountingModel {
        pub calls: AtomicUsize,
        pub fail: bool,
    }

    impl CountingModel {
        pub fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl LanguageModel for CountingModel {
        async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AppError::LanguageModelError {
                    message: "model offline".to_string(),
                });
            }
            MockLanguageModel.complete(request).await
        }

        fn model_name(&self) -> &str {
            "counting"
        }
    }

    pub(crate) fn engine_with(
        model: Arc<dyn LanguageModel>,
        threshold: f32,
    ) -> SearchEngine {
        let config = SearchConfig {
            similarity_threshold: threshold,
            max_chunk_size: 200,
            chunk_overlap: 50,
            ..SearchConfig::default()
        };
        let synthesizer = AnswerSynthesizer::new(model, 0.7, Duration::from_secs(5));
        SearchEngine::new(config, Arc::new(MockEmbedder::new(384)), synthesizer)
    }

    fn engine() -> SearchEngine {
        engine_with(Arc::new(MockLanguageModel), 0.7)
    }

    fn document(id: &str, title: &str, content: &str) -> Document {
        Document {
            id: id.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            metadata: Metadata::new(),
        }
    }

    const RECURSION: &str = "Recursion is a technique where a function calls itself. \
        Every recursion needs a base case. The base case stops the recursion. \
        Without a base case, recursion never ends. Recursion is common in tree algorithms.";

    const DATABASES: &str = "Databases store information in tables. \
        Relational databases use SQL for queries. Indexes speed up database lookups.";

    #[tokio::test]
    async fn test_lexical_search_ranks_relevant_document_first() {
        let engine = engine();
        engine.index_document(document("doc-1", "Recursion Basics", RECURSION)).await.unwrap();
        engine.index_document(document("doc-2", "Databases 101", DATABASES)).await.unwrap();

        let results = engine
            .search(&SearchRequest::new("base case", RetrievalMode::Lexical, 3))
            .await
            .unwrap();

        assert!(!results.is_empty());
        assert_eq!(results[0].document_id, "doc-1");
        assert!(results.iter().all(|r| r.document_id != "doc-2"));
        assert!(results.iter().all(|r| (0.0..=1.0).contains(&r.score)));
    }

    #[tokio::test]
    async fn test_index_search_delete_round_trip() {
        let engine = engine();
        let outcome = tokio_test::assert_ok!(
            engine
                .index_document(document("doc-7", "Heaps", "A binary heap keeps the minimum at the root."))
                .await
        );
        assert_eq!(outcome.chunk_count, 1);
        assert_eq!(outcome.embedding_dimensions, 384);

        let request = SearchRequest::new("minimum at the root", RetrievalMode::Lexical, 5);
        let results = engine.search(&request).await.unwrap();
        assert!(results.iter().any(|r| r.document_id == "doc-7"));
        assert_eq!(results[0].metadata["original_id"], json!("doc-7"));

        assert_eq!(engine.delete_document("doc-7").await, 1);
        let results = engine.search(&request).await.unwrap();
        assert!(results.iter().all(|r| r.document_id != "doc-7"));
        assert!(!engine.vector.contains("doc-7_chunk_0").await);
        assert!(!engine.lexical.contains("doc-7_chunk_0").await);
    }

    #[tokio::test]
    async fn test_chunk_metadata() {
        let engine = engine();
        let mut doc = document("doc-3", "Recursion Basics", RECURSION);
        doc.metadata.insert("course_id".to_string(), json!("cs101"));
        engine.index_document(doc).await.unwrap();

        let results = engine
            .search(&SearchRequest::new("recursion", RetrievalMode::Lexical, 10))
            .await
            .unwrap();
        let first = results
            .iter()
            .find(|r| r.chunk_id == "doc-3_chunk_0")
            .unwrap();

        assert_eq!(first.metadata["course_id"], json!("cs101"));
        assert_eq!(first.metadata["title"], json!("Recursion Basics"));
        assert_eq!(first.metadata["chunk_index"], json!(0));
        assert!(first.metadata.contains_key("created_at"));
        assert!(first.metadata["chunk_size"].as_u64().unwrap() <= 200);
        assert_eq!(first.metadata["keywords"][0], json!("recursion"));
    }

    #[tokio::test]
    async fn test_concurrent_reindex_keeps_one_version() {
        let engine = engine();
        let version = |label: &str, sentences: usize| {
            let text = (1..=sentences)
                .map(|i| format!("{} sentence {} covers sorting routines.", label, i))
                .collect::<Vec<_>>()
                .join(" ");
            document("doc-1", "Sorting", &text)
        };

        for _ in 0..10 {
            let (first, second) = tokio::join!(
                engine.index_document(version("Alpha", 10)),
                engine.index_document(version("Beta", 14))
            );
            first.unwrap();
            second.unwrap();

            let chunk_ids = engine.documents.read().await["doc-1"].chunk_ids.clone();
            let chunks = engine.vector.score_chunks("sorting", &chunk_ids).await;
            assert_eq!(chunks.len(), chunk_ids.len());
            let label = if chunks[0].content.contains("Alpha") { "Alpha" } else { "Beta" };
            assert!(chunks.iter().all(|c| c.content.contains(label)));

            let stats = engine.stats().await;
            assert_eq!(stats.vector_chunks, chunk_ids.len());
            assert_eq!(stats.lexical_chunks, chunk_ids.len());
        }
    }

    #[tokio::test]
    async fn test_reindex_replaces_chunks() {
        let engine = engine();
        engine.index_document(document("doc-1", "Recursion Basics", RECURSION)).await.unwrap();
        assert!(engine.stats().await.chunks > 1);

        engine
            .index_document(document("doc-1", "Recursion Basics", "Short replacement text."))
            .await
            .unwrap();

        let stats = engine.stats().await;
        assert_eq!(stats.documents, 1);
        assert_eq!(stats.chunks, 1);
        assert_eq!(stats.vector_chunks, stats.lexical_chunks);
        assert!(engine
            .search(&SearchRequest::new("base case", RetrievalMode::Lexical, 5))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_invalid_input_is_rejected() {
        let engine = engine();
        let err = engine.index_document(document("doc-1", "Empty", "  @@ ")).await.unwrap_err();
        assert!(err.is_client_error());

        let err = engine
            .search(&SearchRequest::new("  ", RetrievalMode::Hybrid, 5))
            .await
            .unwrap_err();
        assert!(err.is_client_error());

        assert!(engine.generate_answer("", None, AnswerLength::Short).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_corpus_yields_empty_results() {
        let engine = engine();
        for mode in [RetrievalMode::Semantic, RetrievalMode::Lexical, RetrievalMode::Hybrid] {
            let results = engine.search(&SearchRequest::new("recursion", mode, 5)).await.unwrap();
            assert!(results.is_empty());
        }
    }

    #[tokio::test]
    async fn test_answer_without_documents_is_not_enough_information() {
        let model = CountingModel::new(false);
        let engine = engine_with(model.clone(), 0.7);

        let generated = engine
            .generate_answer("What is recursion?", None, AnswerLength::Medium)
            .await
            .unwrap();

        assert_eq!(generated.answer.answer, NOT_ENOUGH_INFORMATION);
        assert_eq!(generated.answer.confidence, 0.0);
        assert!(generated.sources.is_empty());
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_threshold_gates_synthesis() {
        let model = CountingModel::new(false);
        let engine = engine_with(model.clone(), 0.7);
        engine.index_document(document("doc-2", "Databases 101", DATABASES)).await.unwrap();

        let generated = engine
            .generate_answer("How do recursive functions terminate?", None, AnswerLength::Short)
            .await
            .unwrap();

        assert_eq!(generated.answer.answer, NOT_ENOUGH_INFORMATION);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_answer_uses_sources_above_threshold() {
        let model = CountingModel::new(false);
        let engine = engine_with(model.clone(), 0.3);
        engine
            .index_document(document(
                "doc-1",
                "Recursion Basics",
                "Recursion is a function that calls itself. Recursion needs a base case.",
            ))
            .await
            .unwrap();

        let generated = engine
            .generate_answer("recursion function", None, AnswerLength::Medium)
            .await
            .unwrap();

        assert_eq!(generated.sources.len(), 1);
        assert_eq!(generated.sources[0].document_id, "doc-1");
        assert!(generated.answer.confidence > 0.0 && generated.answer.confidence <= 1.0);
        assert_eq!(generated.answer.related_questions.len(), 3);
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_context_ids_bypass_retrieval() {
        let model = CountingModel::new(false);
        let engine = engine_with(model.clone(), 0.99);
        engine.index_document(document("doc-2", "Databases 101", DATABASES)).await.unwrap();

        let ids = vec!["doc-2".to_string()];
        let generated = engine
            .generate_answer("What is recursion?", Some(&ids), AnswerLength::Short)
            .await
            .unwrap();
        assert!(!generated.sources.is_empty());
        assert!(generated.sources.iter().all(|s| s.document_id == "doc-2"));
        assert!(model.calls.load(Ordering::SeqCst) > 0);

        let unknown = vec!["nope".to_string()];
        let generated = engine
            .generate_answer("What is recursion?", Some(&unknown), AnswerLength::Short)
            .await
            .unwrap();
        assert_eq!(generated.answer.answer, NOT_ENOUGH_INFORMATION);
    }

    #[tokio::test]
    async fn test_model_failure_falls_back() {
        let engine = engine_with(CountingModel::new(true), 0.0);
        engine.index_document(document("doc-1", "Recursion Basics", RECURSION)).await.unwrap();

        let generated = engine
            .generate_answer("recursion base case", None, AnswerLength::Long)
            .await
            .unwrap();

        assert_eq!(generated.answer.answer, FALLBACK_ANSWER);
        assert_eq!(generated.answer.confidence, 0.0);
        assert!(generated.answer.error.is_some());
        assert!(!generated.sources.is_empty());
    }

    #[tokio::test]
    async fn test_delete_unknown_document_succeeds() {
        let engine = engine();
        assert_eq!(engine.delete_document("doc-1").await, 0);
        assert_eq!(engine.delete_document("doc-1").await, 0);
    }

    #[tokio::test]
    async fn test_find_similar_excludes_source_document() {
        let engine = engine();
        engine.index_document(document("a", "Recursion Basics", RECURSION)).await.unwrap();
        engine
            .index_document(document(
                "b",
                "Recursive Thinking",
                "A recursion calls itself until the base case. Recursion and base case go together.",
            ))
            .await
            .unwrap();
        engine.index_document(document("c", "Databases 101", DATABASES)).await.unwrap();

        let similar = engine.find_similar("a", 5, 0.0).await;
        assert_eq!(similar[0].document_id, "b");
        assert!(similar.iter().all(|r| r.document_id != "a"));

        let ids: HashSet<_> = similar.iter().map(|r| r.document_id.clone()).collect();
        assert_eq!(ids.len(), similar.len());

        assert!(engine.find_similar("a", 5, 1.01).await.is_empty());
        assert!(engine.find_similar("missing", 5, 0.0).await.is_empty());
    }

    #[tokio::test]
    async fn test_metadata_filter_limits_results() {
        let engine = engine();
        let mut cs101 = document("a", "Recursion Basics", RECURSION);
        cs101.metadata.insert("course_id".to_string(), json!("cs101"));
        let mut cs102 = document("b", "Recursion Again", RECURSION);
        cs102.metadata.insert("course_id".to_string(), json!("cs102"));
        engine.index_document(cs101).await.unwrap();
        engine.index_document(cs102).await.unwrap();

        let filter = crate::retrieval::MetadataFilter(
            [("course_id".to_string(), json!("cs102"))].into_iter().collect(),
        );
        let request = SearchRequest::new("recursion", RetrievalMode::Hybrid, 10).with_filter(filter);
        let results = engine.search(&request).await.unwrap();

        assert!(!results.is_empty());
        assert!(results.iter().all(|r| r.document_id == "b"));
    }

    #[tokio::test]
    async fn test_suggestions() {
        let engine = engine();
        engine.index_document(document("doc-1", "Recursion Basics", RECURSION)).await.unwrap();

        let suggestions = engine.suggest("recur", 5).await;
        assert_eq!(suggestions[0], "Recursion Basics");
        assert!(suggestions.contains(&"recursion".to_string()));
        assert_eq!(suggestions.len(), 5);

        let suggestions = engine.suggest("graphs", 3).await;
        assert_eq!(suggestions, vec!["graphs tutorial", "graphs guide", "graphs examples"]);

        assert!(engine.suggest("  ", 5).await.is_empty());
    }
}
