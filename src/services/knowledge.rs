use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use crate::error::{
    AskError, EmbeddingError, ExtractError, GenerationError, IngestError, SearchError, StoreError,
};
use crate::models::{
    ChatResponse, Config, Conversation, ConversationSummary, ConversationTurn, Document,
    SearchResults, SourceReference,
};
use crate::services::chunker::TextChunker;
use crate::services::composer::{AnswerComposer, GenerationProvider};
use crate::services::embedding::{EmbeddingBatcher, EmbeddingProvider};
use crate::services::extract::{self, ContentType};
use crate::services::retriever::Retriever;
use crate::services::store::{KnowledgeStore, StoreStats};
use crate::utils::calculate_checksum;

/// Ingestion, question answering and corpus management over one store.
///
/// Providers are optional so that listing and deleting work without
/// credentials; operations that need a missing provider fail with its
/// `MissingApiKey` error.
pub struct KnowledgeBase {
    config: Config,
    store: Arc<dyn KnowledgeStore>,
    chunker: TextChunker,
    batcher: Option<Arc<EmbeddingBatcher>>,
    composer: Option<AnswerComposer>,
}

impl KnowledgeBase {
    pub fn new(config: Config, store: Arc<dyn KnowledgeStore>) -> Self {
        Self {
            chunker: TextChunker::new(&config.chunking),
            config,
            store,
            batcher: None,
            composer: None,
        }
    }

    pub fn with_embedder(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.batcher = Some(Arc::new(EmbeddingBatcher::new(
            provider,
            &self.config.embedding,
        )));
        self
    }

    pub fn with_generator(mut self, provider: Arc<dyn GenerationProvider>) -> Self {
        self.composer = Some(AnswerComposer::new(provider, &self.config.generation));
        self
    }

    pub fn store(&self) -> &Arc<dyn KnowledgeStore> {
        &self.store
    }

    pub async fn stats(&self) -> Result<StoreStats, StoreError> {
        self.store.stats().await
    }

    fn batcher(&self) -> Result<&Arc<EmbeddingBatcher>, EmbeddingError> {
        self.batcher.as_ref().ok_or(EmbeddingError::MissingApiKey)
    }

    fn retriever(&self) -> Result<Retriever, EmbeddingError> {
        Ok(
            Retriever::new(self.batcher()?.clone(), self.store.clone())
                .with_min_similarity(self.config.search.min_similarity),
        )
    }

    /// Extract, chunk, embed and persist an upload.
    pub async fn ingest(
        &self,
        filename: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<Document, IngestError> {
        if bytes.is_empty() {
            return Err(IngestError::EmptyUpload);
        }
        let content_type: ContentType = content_type.parse()?;
        let batcher = self.batcher()?;

        // pdftotext is a blocking child process.
        let text = tokio::task::spawn_blocking(move || extract::extract(&bytes, content_type))
            .await
            .map_err(|e| ExtractError::Failed(e.to_string()))??;

        let chunks = self.chunker.chunk(&text);
        if chunks.is_empty() {
            return Err(IngestError::EmptyDocument(filename.to_string()));
        }

        tracing::info!(filename, chunks = chunks.len(), "ingesting document");

        let embeddings = batcher.embed(&chunks).await?;

        let mut document = Document::new(filename, content_type.mime(), calculate_checksum(&text));
        let passages: Vec<_> = document
            .passages(chunks)
            .into_iter()
            .zip(embeddings)
            .map(|(passage, embedding)| passage.with_embedding(embedding))
            .collect();
        document.processed = true;
        document.chunk_count = passages.len() as u32;

        self.store.upsert_document(&document, &passages).await?;

        tracing::info!(document_id = %document.id, passages = passages.len(), "document stored");
        Ok(document)
    }

    /// Answer a question, continuing `conversation_id` or opening a new conversation.
    ///
    /// Nothing is written until the answer exists; a new conversation and both
    /// turns are then stored together.
    pub async fn ask(
        &self,
        question: &str,
        conversation_id: Option<Uuid>,
        top_k: Option<usize>,
    ) -> Result<ChatResponse, AskError> {
        if question.trim().is_empty() {
            return Err(AskError::EmptyQuestion);
        }
        let composer = self
            .composer
            .as_ref()
            .ok_or(GenerationError::MissingApiKey)?;
        let retriever = self.retriever().map_err(SearchError::from)?;

        let (conversation, history, is_new) = match conversation_id {
            Some(id) => {
                let conversation = self
                    .store
                    .get_conversation(id)
                    .await?
                    .ok_or(AskError::ConversationNotFound(id))?;
                let history = self
                    .store
                    .recent_turns(id, composer.history_limit())
                    .await?;
                (conversation, history, false)
            }
            None => (Conversation::from_question(question), Vec::new(), true),
        };
        let user_turn = ConversationTurn::user(conversation.id, question);

        let top_k = top_k.unwrap_or(self.config.search.top_k as usize);
        let retrieved = retriever.search(question, top_k).await?;
        let answer = composer.answer(question, &retrieved, &history).await?;

        let assistant_turn =
            ConversationTurn::assistant(conversation.id, answer.clone(), retrieved.clone());
        self.store
            .record_exchange(is_new.then_some(&conversation), &[user_turn, assistant_turn])
            .await?;

        Ok(ChatResponse {
            answer,
            conversation_id: conversation.id,
            sources: retrieved.iter().map(SourceReference::from).collect(),
        })
    }

    pub async fn search(&self, query: &str, top_k: usize) -> Result<SearchResults, SearchError> {
        let start = Instant::now();
        let results = self.retriever()?.search(query, top_k).await?;
        Ok(SearchResults::new(
            query.to_string(),
            results,
            start.elapsed().as_millis() as u64,
        ))
    }

    pub async fn list_documents(&self) -> Result<Vec<Document>, StoreError> {
        self.store.list_documents().await
    }

    pub async fn get_document(&self, id: Uuid) -> Result<Document, IngestError> {
        self.store
            .get_document(id)
            .await?
            .ok_or(IngestError::NotFound(id))
    }

    pub async fn delete_document(&self, id: Uuid) -> Result<(), IngestError> {
        if !self.store.delete_document(id).await? {
            return Err(IngestError::NotFound(id));
        }
        Ok(())
    }

    pub async fn create_conversation(&self, title: Option<String>) -> Result<Conversation, StoreError> {
        let conversation = Conversation::new(title);
        self.store.create_conversation(&conversation).await?;
        Ok(conversation)
    }

    pub async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, StoreError> {
        self.store.list_conversations().await
    }

    pub async fn conversation_turns(
        &self,
        id: Uuid,
    ) -> Result<(Conversation, Vec<ConversationTurn>), AskError> {
        let conversation = self
            .store
            .get_conversation(id)
            .await?
            .ok_or(AskError::ConversationNotFound(id))?;
        let turns = self.store.turns(id).await?;
        Ok((conversation, turns))
    }

    pub async fn delete_conversation(&self, id: Uuid) -> Result<(), AskError> {
        if !self.store.delete_conversation(id).await? {
            return Err(AskError::ConversationNotFound(id));
        }
        Ok(())
    }
}
