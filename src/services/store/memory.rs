//! In-process store with an optional JSON snapshot on disk.

use std::path::PathBuf;
use std::sync::RwLock;

use async_trait::async_trait;
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{KnowledgeStore, StoreStats, check_dimension, rank_matches};
use crate::error::StoreError;
use crate::models::{
    Conversation, ConversationSummary, ConversationTurn, Document, Passage, PassageMatch,
    StoreDriver,
};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Corpus {
    documents: Vec<Document>,
    passages: Vec<Passage>,
    conversations: Vec<Conversation>,
    turns: Vec<ConversationTurn>,
}

impl Corpus {
    fn check_dimensions(&self, dimension: usize) -> Result<(), StoreError> {
        self.passages
            .iter()
            .filter_map(|p| p.embedding.as_deref())
            .try_for_each(|embedding| check_dimension(embedding, dimension))
    }
}

pub struct MemoryStore {
    corpus: RwLock<Corpus>,
    snapshot_path: Option<PathBuf>,
    /// Serializes snapshot writes so the file always ends at the latest state.
    persist_lock: Mutex<()>,
    dimension: usize,
}

impl MemoryStore {
    /// Empty store that lives only as long as the process.
    pub fn new(dimension: usize) -> Self {
        Self {
            corpus: RwLock::new(Corpus::default()),
            snapshot_path: None,
            persist_lock: Mutex::new(()),
            dimension,
        }
    }

    /// Store backed by a JSON snapshot, loaded now and rewritten after each change.
    ///
    /// A snapshot holding embeddings of another dimension is refused.
    pub async fn open(path: PathBuf, dimension: usize) -> Result<Self, StoreError> {
        let corpus: Corpus = match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| StoreError::SnapshotError(format!("{}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Corpus::default(),
            Err(e) => return Err(StoreError::SnapshotError(e.to_string())),
        };
        corpus.check_dimensions(dimension)?;

        Ok(Self {
            corpus: RwLock::new(corpus),
            snapshot_path: Some(path),
            persist_lock: Mutex::new(()),
            dimension,
        })
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Corpus>, StoreError> {
        self.corpus
            .read()
            .map_err(|_| StoreError::QueryError("store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Corpus>, StoreError> {
        self.corpus
            .write()
            .map_err(|_| StoreError::UpsertError("store lock poisoned".to_string()))
    }

    async fn persist(&self) -> Result<(), StoreError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        // Read the corpus only once the previous write has finished.
        let _writing = self.persist_lock.lock().await;
        let content = {
            let corpus = self.read()?;
            serde_json::to_string(&*corpus)
                .map_err(|e| StoreError::SnapshotError(e.to_string()))?
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::SnapshotError(e.to_string()))?;
        }

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| StoreError::SnapshotError(e.to_string()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| StoreError::SnapshotError(e.to_string()))
    }
}

/// `1 - cos(a, b)`; a zero vector is treated as orthogonal to everything.
fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let a = ArrayView1::from(a);
    let b = ArrayView1::from(b);
    let norms = a.dot(&a).sqrt() * b.dot(&b).sqrt();
    if norms == 0.0 {
        return 1.0;
    }
    1.0 - a.dot(&b) / norms
}

#[async_trait]
impl KnowledgeStore for MemoryStore {
    async fn health_check(&self) -> Result<bool, StoreError> {
        Ok(self.read().is_ok())
    }

    async fn initialize(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let corpus = self.read()?;
        Ok(StoreStats {
            documents: corpus.documents.len() as u64,
            passages: corpus.passages.len() as u64,
            embedded_passages: corpus.passages.iter().filter(|p| p.is_searchable()).count()
                as u64,
            conversations: corpus.conversations.len() as u64,
        })
    }

    async fn upsert_document(
        &self,
        document: &Document,
        passages: &[Passage],
    ) -> Result<(), StoreError> {
        for passage in passages {
            if let Some(embedding) = &passage.embedding {
                check_dimension(embedding, self.dimension)?;
            }
        }

        {
            let mut corpus = self.write()?;
            match corpus.documents.iter_mut().find(|d| d.id == document.id) {
                Some(existing) => *existing = document.clone(),
                None => corpus.documents.push(document.clone()),
            }
            let document_id = document.id;
            let kept = passages.len() as u32;
            corpus
                .passages
                .retain(|p| p.document_id != document_id || p.ordinal < kept);
            for passage in passages {
                match corpus.passages.iter_mut().find(|p| p.id == passage.id) {
                    Some(existing) => *existing = passage.clone(),
                    None => corpus.passages.push(passage.clone()),
                }
            }
        }

        self.persist().await
    }

    async fn get_document(&self, id: Uuid) -> Result<Option<Document>, StoreError> {
        Ok(self.read()?.documents.iter().find(|d| d.id == id).cloned())
    }

    async fn list_documents(&self) -> Result<Vec<Document>, StoreError> {
        Ok(self.read()?.documents.clone())
    }

    async fn delete_document(&self, id: Uuid) -> Result<bool, StoreError> {
        let removed = {
            let mut corpus = self.write()?;
            let before = corpus.documents.len();
            corpus.documents.retain(|d| d.id != id);
            let removed = corpus.documents.len() != before;
            if removed {
                corpus.passages.retain(|p| p.document_id != id);
            }
            removed
        };

        if removed {
            self.persist().await?;
        }
        Ok(removed)
    }

    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<PassageMatch>, StoreError> {
        check_dimension(query, self.dimension)?;

        let corpus = self.read()?;
        let mut matches = Vec::new();
        for passage in &corpus.passages {
            let Some(embedding) = &passage.embedding else {
                continue;
            };
            check_dimension(embedding, self.dimension)?;
            matches.push(PassageMatch {
                passage_id: passage.id,
                document_id: passage.document_id,
                ordinal: passage.ordinal,
                text: passage.text.clone(),
                distance: cosine_distance(query, embedding),
            });
        }

        Ok(rank_matches(matches, k))
    }

    async fn create_conversation(&self, conversation: &Conversation) -> Result<(), StoreError> {
        self.write()?.conversations.push(conversation.clone());
        self.persist().await
    }

    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>, StoreError> {
        Ok(self
            .read()?
            .conversations
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, StoreError> {
        let corpus = self.read()?;
        let mut summaries: Vec<ConversationSummary> = corpus
            .conversations
            .iter()
            .map(|c| ConversationSummary {
                conversation: c.clone(),
                turn_count: corpus
                    .turns
                    .iter()
                    .filter(|t| t.conversation_id == c.id)
                    .count() as u64,
            })
            .collect();
        // Newest first; insertion order breaks timestamp ties.
        summaries.reverse();
        summaries.sort_by(|a, b| b.conversation.created_at.cmp(&a.conversation.created_at));
        Ok(summaries)
    }

    async fn delete_conversation(&self, id: Uuid) -> Result<bool, StoreError> {
        let removed = {
            let mut corpus = self.write()?;
            let before = corpus.conversations.len();
            corpus.conversations.retain(|c| c.id != id);
            let removed = corpus.conversations.len() != before;
            if removed {
                corpus.turns.retain(|t| t.conversation_id != id);
            }
            removed
        };

        if removed {
            self.persist().await?;
        }
        Ok(removed)
    }

    async fn record_exchange(
        &self,
        new_conversation: Option<&Conversation>,
        turns: &[ConversationTurn],
    ) -> Result<(), StoreError> {
        {
            let mut corpus = self.write()?;
            let orphan = turns.iter().find(|t| {
                new_conversation.is_none_or(|c| c.id != t.conversation_id)
                    && !corpus.conversations.iter().any(|c| c.id == t.conversation_id)
            });
            if let Some(turn) = orphan {
                return Err(StoreError::UpsertError(format!(
                    "conversation {} does not exist",
                    turn.conversation_id
                )));
            }
            if let Some(conversation) = new_conversation {
                corpus.conversations.push(conversation.clone());
            }
            corpus.turns.extend_from_slice(turns);
        }
        self.persist().await
    }

    async fn turns(&self, conversation_id: Uuid) -> Result<Vec<ConversationTurn>, StoreError> {
        Ok(self
            .read()?
            .turns
            .iter()
            .filter(|t| t.conversation_id == conversation_id)
            .cloned()
            .collect())
    }

    async fn recent_turns(
        &self,
        conversation_id: Uuid,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, StoreError> {
        let mut turns = self.turns(conversation_id).await?;
        let skip = turns.len().saturating_sub(limit);
        Ok(turns.split_off(skip))
    }

    fn driver(&self) -> StoreDriver {
        StoreDriver::Memory
    }
}
