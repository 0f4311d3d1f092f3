//! Storage abstraction for documents, passages and conversations.
//!
//! The pipeline only talks to the [`KnowledgeStore`] trait, so the backend
//! (PostgreSQL/pgvector or the in-process memory store) is chosen from
//! configuration.

mod memory;
mod pgvector;

pub use memory::MemoryStore;
pub use pgvector::PgVectorStore;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    Conversation, ConversationSummary, ConversationTurn, Document, Passage, PassageMatch,
    StoreConfig, StoreDriver,
};

/// Row counts reported by `status`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub documents: u64,
    pub passages: u64,
    pub embedded_passages: u64,
    pub conversations: u64,
}

/// Abstract trait for persistence operations.
///
/// Implementations must order `nearest` by ascending cosine distance, break
/// ties by `(document_id, ordinal)`, and skip passages without an embedding.
/// Turns are returned in creation order.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Check if the store is reachable.
    async fn health_check(&self) -> Result<bool, StoreError>;

    /// Create tables/indexes if they don't exist.
    async fn initialize(&self) -> Result<(), StoreError>;

    async fn stats(&self) -> Result<StoreStats, StoreError>;

    /// Insert or update a document together with its passages.
    async fn upsert_document(
        &self,
        document: &Document,
        passages: &[Passage],
    ) -> Result<(), StoreError>;

    async fn get_document(&self, id: Uuid) -> Result<Option<Document>, StoreError>;

    async fn list_documents(&self) -> Result<Vec<Document>, StoreError>;

    /// Delete a document and its passages. Returns false when it did not exist.
    async fn delete_document(&self, id: Uuid) -> Result<bool, StoreError>;

    /// The `k` embedded passages closest to `query`.
    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<PassageMatch>, StoreError>;

    async fn create_conversation(&self, conversation: &Conversation) -> Result<(), StoreError>;

    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>, StoreError>;

    /// Conversations, newest first.
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, StoreError>;

    /// Delete a conversation and its turns. Returns false when it did not exist.
    async fn delete_conversation(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Append `turns` in order, inserting `new_conversation` first when given.
    ///
    /// Either everything is stored or nothing is; turns must belong to
    /// `new_conversation` or to a conversation that already exists.
    async fn record_exchange(
        &self,
        new_conversation: Option<&Conversation>,
        turns: &[ConversationTurn],
    ) -> Result<(), StoreError>;

    /// All turns of a conversation in creation order.
    async fn turns(&self, conversation_id: Uuid) -> Result<Vec<ConversationTurn>, StoreError>;

    /// The last `limit` turns, still in creation order.
    async fn recent_turns(
        &self,
        conversation_id: Uuid,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, StoreError>;

    fn driver(&self) -> StoreDriver;
}

/// Reject vectors whose length differs from the deployment's dimension.
pub(crate) fn check_dimension(vector: &[f32], expected: usize) -> Result<(), StoreError> {
    if vector.len() != expected {
        return Err(StoreError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

/// Order by ascending distance, then `(document_id, ordinal)`, and keep the first `k`.
pub(crate) fn rank_matches(mut matches: Vec<PassageMatch>, k: usize) -> Vec<PassageMatch> {
    matches.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then_with(|| a.document_id.cmp(&b.document_id))
            .then_with(|| a.ordinal.cmp(&b.ordinal))
    });
    matches.truncate(k);
    matches
}

/// Create a store backend based on configuration.
pub async fn create_store(
    config: &StoreConfig,
    dimension: usize,
) -> Result<Arc<dyn KnowledgeStore>, StoreError> {
    match config.driver {
        StoreDriver::PostgreSQL => {
            let store = PgVectorStore::connect(config, dimension).await?;
            Ok(Arc::new(store))
        }
        StoreDriver::Memory => {
            let store = match config.resolved_snapshot_path() {
                Some(path) => MemoryStore::open(path, dimension).await?,
                None => MemoryStore::new(dimension),
            };
            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_dimension() {
        assert!(check_dimension(&[0.0; 4], 4).is_ok());
        assert!(matches!(
            check_dimension(&[0.0; 3], 4),
            Err(StoreError::DimensionMismatch {
                expected: 4,
                actual: 3
            })
        ));
    }

    fn passage_match(document_id: Uuid, ordinal: u32, distance: f32) -> PassageMatch {
        PassageMatch {
            passage_id: Uuid::new_v4(),
            document_id,
            ordinal,
            text: format!("passage {ordinal}"),
            distance,
        }
    }

    #[test]
    fn test_rank_matches_breaks_ties_by_document_then_ordinal() {
        let low = Uuid::from_u128(1);
        let high = Uuid::from_u128(2);
        let ranked = rank_matches(
            vec![
                passage_match(high, 0, 0.25),
                passage_match(low, 3, 0.25),
                passage_match(low, 1, 0.25),
                passage_match(high, 5, 0.1),
                passage_match(low, 0, 0.9),
            ],
            4,
        );

        let keys: Vec<(Uuid, u32)> = ranked.iter().map(|m| (m.document_id, m.ordinal)).collect();
        assert_eq!(keys, vec![(high, 5), (low, 1), (low, 3), (high, 0)]);
    }

    #[tokio::test]
    async fn test_create_memory_store_with_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            driver: StoreDriver::Memory,
            snapshot_path: Some(dir.path().join("corpus.json")),
            ..Default::default()
        };

        let store = create_store(&config, 3).await.unwrap();
        assert_eq!(store.driver(), StoreDriver::Memory);
        assert!(store.health_check().await.unwrap());
    }
}
