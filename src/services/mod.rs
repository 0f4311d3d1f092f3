mod chunker;
mod composer;
mod embedding;
mod extract;
mod knowledge;
mod retriever;
mod store;

pub use chunker::TextChunker;
pub use composer::{
    AnswerComposer, AnthropicProvider, ChatMessage, FALLBACK_ANSWER, GenerationProvider,
    SYSTEM_PROMPT, build_context, build_user_prompt,
};
pub use embedding::{
    EmbeddingBatcher, EmbeddingProvider, IndexedEmbedding, InputType, VoyageProvider,
};
pub use extract::{ContentType, extract, pdftotext_available};
pub use knowledge::KnowledgeBase;
pub use retriever::Retriever;
pub use store::{KnowledgeStore, MemoryStore, PgVectorStore, StoreStats, create_store};
