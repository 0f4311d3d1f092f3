mod config;
mod conversation;
mod document;
mod search;

pub use config::{
    ANTHROPIC_API_KEY_ENV, CONFIG_PATH_ENV, ChunkingConfig, Config, DEFAULT_EMBEDDING_DIMENSION,
    DEFAULT_EMBEDDING_MODEL, DEFAULT_GENERATION_MODEL, EmbeddingConfig, GenerationConfig,
    SearchConfig, StoreConfig, StoreDriver, VOYAGE_API_KEY_ENV,
};
pub use conversation::{Conversation, ConversationSummary, ConversationTurn, Role, TITLE_MAX_CHARS};
pub use document::{Document, Passage};
pub use search::{
    ChatResponse, OutputFormat, PassageMatch, RetrievedPassage, SOURCE_PREVIEW_CHARS,
    SearchResults, SourceReference,
};
