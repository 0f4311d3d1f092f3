//! Error types for the knowledge base.

use thiserror::Error;

use crate::utils::retry::Retryable;

/// Errors related to configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("path error: {0}")]
    PathError(String),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Errors raised while turning an upload into plain text.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("content type '{0}' is not supported (allowed: PDF, DOCX, TXT)")]
    UnsupportedContentType(String),

    #[error("{0} not found; install poppler-utils to extract PDF text")]
    ToolNotFound(String),

    #[error("extraction failed: {0}")]
    Failed(String),

    #[error("DOCX archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors related to embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding API key not configured (set embedding.api_key or VOYAGE_API_KEY)")]
    MissingApiKey,

    #[error("embedding provider rejected the credential: {0}")]
    Unauthorized(String),

    #[error("embedding provider rate limited the request: {0}")]
    RateLimited(String),

    #[error("embedding server error: {0}")]
    ServerError(String),

    #[error("embedding request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding timeout")]
    Timeout,
}

impl Retryable for EmbeddingError {
    fn is_retryable(&self) -> bool {
        matches!(self, EmbeddingError::RateLimited(_))
    }
}

/// Errors related to answer generation.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation API key not configured (set generation.api_key or ANTHROPIC_API_KEY)")]
    MissingApiKey,

    #[error("generation provider error: status {status}: {body}")]
    ServerError { status: u16, body: String },

    #[error("generation request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("invalid generation response: {0}")]
    InvalidResponse(String),

    #[error("generation timeout")]
    Timeout,
}

/// Errors related to the document/conversation store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to connect to store: {0}")]
    ConnectionError(String),

    #[error("schema error: {0}")]
    SchemaError(String),

    #[error("upsert error: {0}")]
    UpsertError(String),

    #[error("query error: {0}")]
    QueryError(String),

    #[error("delete error: {0}")]
    DeleteError(String),

    #[error("PostgreSQL error: {0}")]
    PostgresError(String),

    #[error("pgvector extension error: {0}")]
    PgVectorExtensionError(String),

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("snapshot error: {0}")]
    SnapshotError(String),
}

/// Errors related to search operations.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("embedding error: {0}")]
    EmbeddingError(#[from] EmbeddingError),

    #[error("store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

/// Errors related to document ingestion.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("no file content provided")]
    EmptyUpload,

    #[error("document '{0}' contains no extractable text")]
    EmptyDocument(String),

    #[error("extraction error: {0}")]
    ExtractError(#[from] ExtractError),

    #[error("embedding error: {0}")]
    EmbeddingError(#[from] EmbeddingError),

    #[error("store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("document not found: {0}")]
    NotFound(uuid::Uuid),
}

/// Errors related to answering questions.
#[derive(Debug, Error)]
pub enum AskError {
    #[error("question is required")]
    EmptyQuestion,

    #[error("conversation not found: {0}")]
    ConversationNotFound(uuid::Uuid),

    #[error("search error: {0}")]
    SearchError(#[from] SearchError),

    #[error("generation error: {0}")]
    GenerationError(#[from] GenerationError),

    #[error("store error: {0}")]
    StoreError(#[from] StoreError),
}

/// Application-level errors that wrap domain errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("search error: {0}")]
    Search(#[from] SearchError),

    #[error("ask error: {0}")]
    Ask(#[from] AskError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Other(String),
}
