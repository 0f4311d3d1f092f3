use std::sync::Arc;

use crate::error::SearchError;
use crate::models::RetrievedPassage;
use crate::services::embedding::EmbeddingBatcher;
use crate::services::store::KnowledgeStore;

/// Embeds a query and returns the most similar stored passages.
pub struct Retriever {
    batcher: Arc<EmbeddingBatcher>,
    store: Arc<dyn KnowledgeStore>,
    min_similarity: Option<f32>,
}

impl Retriever {
    pub fn new(batcher: Arc<EmbeddingBatcher>, store: Arc<dyn KnowledgeStore>) -> Self {
        Self {
            batcher,
            store,
            min_similarity: None,
        }
    }

    pub fn with_min_similarity(mut self, min_similarity: Option<f32>) -> Self {
        self.min_similarity = min_similarity;
        self
    }

    /// Up to `top_k` passages by descending similarity.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedPassage>, SearchError> {
        if query.trim().is_empty() {
            return Err(SearchError::InvalidQuery("query must not be empty".to_string()));
        }
        if top_k == 0 {
            return Err(SearchError::InvalidQuery(
                "top_k must be at least 1".to_string(),
            ));
        }

        let vector = self.batcher.embed_query(query).await?;
        let matches = self.store.nearest(&vector, top_k).await?;

        let mut passages: Vec<RetrievedPassage> = matches
            .into_iter()
            .map(RetrievedPassage::from)
            .filter(|p| self.min_similarity.is_none_or(|min| p.similarity >= min))
            .collect();
        passages.truncate(top_k);

        tracing::debug!(results = passages.len(), top_k, "retrieved passages");
        Ok(passages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EmbeddingError;
    use crate::models::{Document, Passage};
    use crate::services::embedding::tests::{FakeProvider, TEST_DIMENSION, test_config, vec_for};
    use crate::services::store::MemoryStore;

    async fn seeded(texts: &[&str]) -> (Arc<FakeProvider>, Arc<dyn KnowledgeStore>, Document) {
        let provider = Arc::new(FakeProvider::default());
        let store: Arc<dyn KnowledgeStore> = Arc::new(MemoryStore::new(TEST_DIMENSION));

        let document = Document::new("faq.txt", "text/plain", "sum".to_string());
        let passages: Vec<Passage> = texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                Passage::new(document.id, i as u32, text.to_string()).with_embedding(vec_for(text))
            })
            .collect();
        store.upsert_document(&document, &passages).await.unwrap();

        (provider, store, document)
    }

    fn retriever(provider: Arc<FakeProvider>, store: Arc<dyn KnowledgeStore>) -> Retriever {
        let batcher = Arc::new(EmbeddingBatcher::new(provider, &test_config()));
        Retriever::new(batcher, store)
    }

    #[tokio::test]
    async fn test_returns_exact_match_first() {
        let (provider, store, document) =
            seeded(&["refund policy", "shipping", "a much longer passage about returns"]).await;
        let retriever = retriever(provider.clone(), store);

        let results = retriever.search("refund policy", 2).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].text, "refund policy");
        assert_eq!(results[0].document_id, document.id);
        assert!((results[0].similarity - 1.0).abs() < 1e-5);
        assert!(results[0].similarity >= results[1].similarity);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_similarities_are_in_unit_range() {
        let (provider, store, _) = seeded(&["alpha", "beta", "gamma", "delta"]).await;
        let retriever = retriever(provider, store);

        let results = retriever.search("zeta", 10).await.unwrap();

        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|p| (0.0..=1.0).contains(&p.similarity)));
        assert!(results.windows(2).all(|w| w[0].similarity >= w[1].similarity));
    }

    #[tokio::test]
    async fn test_empty_corpus_returns_nothing() {
        let provider = Arc::new(FakeProvider::default());
        let store: Arc<dyn KnowledgeStore> = Arc::new(MemoryStore::new(TEST_DIMENSION));
        let retriever = retriever(provider, store);

        assert!(retriever.search("anything", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_min_similarity_filters_results() {
        let (provider, store, _) = seeded(&["refund policy", "x"]).await;
        let retriever = retriever(provider, store).with_min_similarity(Some(0.9999));

        let results = retriever.search("refund policy", 5).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text, "refund policy");
    }

    #[tokio::test]
    async fn test_invalid_queries_are_rejected_without_calls() {
        let (provider, store, _) = seeded(&["a"]).await;
        let retriever = retriever(provider.clone(), store);

        assert!(matches!(
            retriever.search("   ", 5).await,
            Err(SearchError::InvalidQuery(_))
        ));
        assert!(matches!(
            retriever.search("query", 0).await,
            Err(SearchError::InvalidQuery(_))
        ));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_embedding_failure_propagates() {
        let provider = Arc::new(FakeProvider::failing_with(vec![EmbeddingError::Unauthorized(
            "bad key".to_string(),
        )]));
        let store: Arc<dyn KnowledgeStore> = Arc::new(MemoryStore::new(TEST_DIMENSION));
        let retriever = retriever(provider, store);

        assert!(matches!(
            retriever.search("query", 5).await,
            Err(SearchError::EmbeddingError(EmbeddingError::Unauthorized(_)))
        ));
    }
}
