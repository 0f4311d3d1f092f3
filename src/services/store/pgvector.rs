use async_trait::async_trait;
use pgvector::Vector;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use std::time::Duration;
use uuid::Uuid;

use super::{KnowledgeStore, StoreStats, check_dimension, rank_matches};
use crate::error::StoreError;
use crate::models::{
    Conversation, ConversationSummary, ConversationTurn, Document, Passage, PassageMatch,
    RetrievedPassage, Role, StoreConfig, StoreDriver,
};

/// Extra rows fetched past `k` so distance ties at the cut are ranked in Rust.
const NEAREST_TIE_SLACK: usize = 16;

pub struct PgVectorStore {
    pool: PgPool,
    documents: String,
    passages: String,
    conversations: String,
    turns: String,
    schema: Option<String>,
    dimension: usize,
}

impl PgVectorStore {
    pub async fn connect(config: &StoreConfig, dimension: usize) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_max)
            .acquire_timeout(Duration::from_secs(config.pool_acquire_timeout.into()))
            .connect(&config.url)
            .await
            .map_err(|e| StoreError::ConnectionError(e.to_string()))?;

        let store = Self {
            pool,
            documents: config.qualified("documents"),
            passages: config.qualified("passages"),
            conversations: config.qualified("conversations"),
            turns: config.qualified("conversation_turns"),
            schema: config.schema.clone(),
            dimension,
        };

        store.check_pgvector_extension().await?;

        Ok(store)
    }

    async fn check_pgvector_extension(&self) -> Result<(), StoreError> {
        let result: Option<(String,)> =
            sqlx::query_as("SELECT extname FROM pg_extension WHERE extname = 'vector'")
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StoreError::PostgresError(e.to_string()))?;

        if result.is_none() {
            return Err(StoreError::PgVectorExtensionError(
                "pgvector extension is not installed. Run: CREATE EXTENSION vector;".to_string(),
            ));
        }

        Ok(())
    }

    async fn execute(&self, sql: &str) -> Result<(), StoreError> {
        sqlx::query(sql)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| StoreError::SchemaError(e.to_string()))
    }

    async fn count(&self, sql: &str) -> Result<u64, StoreError> {
        let row: (i64,) = sqlx::query_as(sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::QueryError(e.to_string()))?;
        Ok(row.0 as u64)
    }

    fn index_name(table: &str, suffix: &str) -> String {
        let bare = table.rsplit('.').next().unwrap_or(table);
        format!("{}_{}", bare, suffix)
    }

    fn document_from_row(row: &PgRow) -> Document {
        Document {
            id: row.get("id"),
            filename: row.get("filename"),
            content_type: row.get("content_type"),
            checksum: row.get("checksum"),
            uploaded_at: row.get("uploaded_at"),
            processed: row.get("processed"),
            chunk_count: row.get::<i32, _>("chunk_count") as u32,
        }
    }

    fn conversation_from_row(row: &PgRow) -> Conversation {
        Conversation {
            id: row.get("id"),
            title: row.get("title"),
            created_at: row.get("created_at"),
        }
    }

    fn turn_from_row(row: &PgRow) -> Result<ConversationTurn, StoreError> {
        let role: String = row.get("role");
        let role: Role = role.parse().map_err(StoreError::QueryError)?;
        let sources: Option<String> = row.get("sources");
        let sources = sources
            .map(|json| serde_json::from_str::<Vec<RetrievedPassage>>(&json))
            .transpose()
            .map_err(|e| StoreError::QueryError(format!("invalid sources: {}", e)))?;

        Ok(ConversationTurn {
            id: row.get("id"),
            conversation_id: row.get("conversation_id"),
            role,
            text: row.get("text"),
            sources,
            created_at: row.get("created_at"),
        })
    }

    async fn select_turns(
        &self,
        conversation_id: Uuid,
        limit: Option<usize>,
    ) -> Result<Vec<ConversationTurn>, StoreError> {
        // Take the newest `limit` rows, then restore chronological order.
        let query = match limit {
            Some(limit) => format!(
                r#"
                SELECT * FROM (
                    SELECT id, conversation_id, role, text, sources, created_at, seq
                    FROM {}
                    WHERE conversation_id = $1
                    ORDER BY seq DESC
                    LIMIT {}
                ) recent
                ORDER BY seq ASC
                "#,
                self.turns, limit
            ),
            None => format!(
                r#"
                SELECT id, conversation_id, role, text, sources, created_at, seq
                FROM {}
                WHERE conversation_id = $1
                ORDER BY seq ASC
                "#,
                self.turns
            ),
        };

        let rows = sqlx::query(&query)
            .bind(conversation_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryError(e.to_string()))?;

        rows.iter().map(Self::turn_from_row).collect()
    }
}

#[async_trait]
impl KnowledgeStore for PgVectorStore {
    async fn health_check(&self) -> Result<bool, StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| true)
            .map_err(|e| StoreError::ConnectionError(e.to_string()))
    }

    async fn initialize(&self) -> Result<(), StoreError> {
        if let Some(schema) = &self.schema {
            self.execute(&format!("CREATE SCHEMA IF NOT EXISTS {}", schema))
                .await?;
        }

        let tables = [
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS {} (
                    id UUID PRIMARY KEY,
                    filename TEXT NOT NULL,
                    content_type TEXT NOT NULL,
                    checksum TEXT NOT NULL,
                    uploaded_at TIMESTAMPTZ NOT NULL,
                    processed BOOLEAN NOT NULL DEFAULT FALSE,
                    chunk_count INTEGER NOT NULL DEFAULT 0
                )
                "#,
                self.documents
            ),
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS {} (
                    id UUID PRIMARY KEY,
                    document_id UUID NOT NULL REFERENCES {}(id) ON DELETE CASCADE,
                    ordinal INTEGER NOT NULL,
                    text TEXT NOT NULL,
                    embedding vector({}),
                    created_at TIMESTAMPTZ NOT NULL,
                    UNIQUE (document_id, ordinal)
                )
                "#,
                self.passages, self.documents, self.dimension
            ),
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS {} (
                    id UUID PRIMARY KEY,
                    title TEXT,
                    created_at TIMESTAMPTZ NOT NULL
                )
                "#,
                self.conversations
            ),
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS {} (
                    seq BIGSERIAL PRIMARY KEY,
                    id UUID NOT NULL UNIQUE,
                    conversation_id UUID NOT NULL REFERENCES {}(id) ON DELETE CASCADE,
                    role TEXT NOT NULL,
                    text TEXT NOT NULL,
                    sources TEXT,
                    created_at TIMESTAMPTZ NOT NULL
                )
                "#,
                self.turns, self.conversations
            ),
        ];

        for table_sql in &tables {
            self.execute(table_sql).await?;
        }

        let indices = [
            format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} USING hnsw (embedding vector_cosine_ops)",
                Self::index_name(&self.passages, "embedding_idx"),
                self.passages
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} (document_id)",
                Self::index_name(&self.passages, "document_id_idx"),
                self.passages
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} (conversation_id, seq)",
                Self::index_name(&self.turns, "conversation_idx"),
                self.turns
            ),
        ];

        for index_sql in &indices {
            self.execute(index_sql).await?;
        }

        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        Ok(StoreStats {
            documents: self
                .count(&format!("SELECT COUNT(*) FROM {}", self.documents))
                .await?,
            passages: self
                .count(&format!("SELECT COUNT(*) FROM {}", self.passages))
                .await?,
            embedded_passages: self
                .count(&format!(
                    "SELECT COUNT(*) FROM {} WHERE embedding IS NOT NULL",
                    self.passages
                ))
                .await?,
            conversations: self
                .count(&format!("SELECT COUNT(*) FROM {}", self.conversations))
                .await?,
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

        let document_query = format!(
            r#"
            INSERT INTO {} (id, filename, content_type, checksum, uploaded_at, processed, chunk_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                filename = EXCLUDED.filename,
                content_type = EXCLUDED.content_type,
                checksum = EXCLUDED.checksum,
                uploaded_at = EXCLUDED.uploaded_at,
                processed = EXCLUDED.processed,
                chunk_count = EXCLUDED.chunk_count
            "#,
            self.documents
        );

        let passage_query = format!(
            r#"
            INSERT INTO {} (id, document_id, ordinal, text, embedding, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                text = EXCLUDED.text,
                embedding = EXCLUDED.embedding,
                created_at = EXCLUDED.created_at
            "#,
            self.passages
        );

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::UpsertError(e.to_string()))?;

        sqlx::query(&document_query)
            .bind(document.id)
            .bind(&document.filename)
            .bind(&document.content_type)
            .bind(&document.checksum)
            .bind(document.uploaded_at)
            .bind(document.processed)
            .bind(document.chunk_count as i32)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::UpsertError(e.to_string()))?;

        let prune_query = format!(
            "DELETE FROM {} WHERE document_id = $1 AND ordinal >= $2",
            self.passages
        );
        sqlx::query(&prune_query)
            .bind(document.id)
            .bind(passages.len() as i32)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::UpsertError(e.to_string()))?;

        for passage in passages {
            let embedding = passage.embedding.clone().map(Vector::from);

            sqlx::query(&passage_query)
                .bind(passage.id)
                .bind(passage.document_id)
                .bind(passage.ordinal as i32)
                .bind(&passage.text)
                .bind(embedding)
                .bind(passage.created_at)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::UpsertError(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::UpsertError(e.to_string()))?;

        Ok(())
    }

    async fn get_document(&self, id: Uuid) -> Result<Option<Document>, StoreError> {
        let query = format!("SELECT * FROM {} WHERE id = $1", self.documents);
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryError(e.to_string()))?;

        Ok(row.as_ref().map(Self::document_from_row))
    }

    async fn list_documents(&self) -> Result<Vec<Document>, StoreError> {
        let query = format!("SELECT * FROM {} ORDER BY uploaded_at ASC", self.documents);
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryError(e.to_string()))?;

        Ok(rows.iter().map(Self::document_from_row).collect())
    }

    async fn delete_document(&self, id: Uuid) -> Result<bool, StoreError> {
        let query = format!("DELETE FROM {} WHERE id = $1", self.documents);
        let result = sqlx::query(&query)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::DeleteError(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<PassageMatch>, StoreError> {
        check_dimension(query, self.dimension)?;
        let embedding = Vector::from(query.to_vec());

        // Distance-only ORDER BY so the HNSW index serves the scan.
        let sql = format!(
            r#"
            SELECT
                id,
                document_id,
                ordinal,
                text,
                (embedding <=> $1) AS distance
            FROM {}
            WHERE embedding IS NOT NULL
            ORDER BY embedding <=> $1
            LIMIT {}
            "#,
            self.passages,
            k.saturating_add(NEAREST_TIE_SLACK)
        );

        let rows = sqlx::query(&sql)
            .bind(&embedding)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryError(e.to_string()))?;

        let matches: Vec<PassageMatch> = rows
            .into_iter()
            .map(|row: PgRow| {
                let distance: f64 = row.get("distance");
                PassageMatch {
                    passage_id: row.get("id"),
                    document_id: row.get("document_id"),
                    ordinal: row.get::<i32, _>("ordinal") as u32,
                    text: row.get("text"),
                    distance: distance as f32,
                }
            })
            .collect();

        Ok(rank_matches(matches, k))
    }

    async fn create_conversation(&self, conversation: &Conversation) -> Result<(), StoreError> {
        let query = format!(
            "INSERT INTO {} (id, title, created_at) VALUES ($1, $2, $3)",
            self.conversations
        );
        sqlx::query(&query)
            .bind(conversation.id)
            .bind(&conversation.title)
            .bind(conversation.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::UpsertError(e.to_string()))?;
        Ok(())
    }

    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>, StoreError> {
        let query = format!(
            "SELECT id, title, created_at FROM {} WHERE id = $1",
            self.conversations
        );
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryError(e.to_string()))?;

        Ok(row.as_ref().map(Self::conversation_from_row))
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, StoreError> {
        let query = format!(
            r#"
            SELECT c.id, c.title, c.created_at, COUNT(t.seq) AS turn_count
            FROM {} c
            LEFT JOIN {} t ON t.conversation_id = c.id
            GROUP BY c.id, c.title, c.created_at
            ORDER BY c.created_at DESC
            "#,
            self.conversations, self.turns
        );

        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryError(e.to_string()))?;

        Ok(rows
            .iter()
            .map(|row| ConversationSummary {
                conversation: Self::conversation_from_row(row),
                turn_count: row.get::<i64, _>("turn_count") as u64,
            })
            .collect())
    }

    async fn delete_conversation(&self, id: Uuid) -> Result<bool, StoreError> {
        let query = format!("DELETE FROM {} WHERE id = $1", self.conversations);
        let result = sqlx::query(&query)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::DeleteError(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_exchange(
        &self,
        new_conversation: Option<&Conversation>,
        turns: &[ConversationTurn],
    ) -> Result<(), StoreError> {
        let conversation_query = format!(
            "INSERT INTO {} (id, title, created_at) VALUES ($1, $2, $3)",
            self.conversations
        );
        let turn_query = format!(
            r#"
            INSERT INTO {} (id, conversation_id, role, text, sources, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
            self.turns
        );

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::UpsertError(e.to_string()))?;

        if let Some(conversation) = new_conversation {
            sqlx::query(&conversation_query)
                .bind(conversation.id)
                .bind(&conversation.title)
                .bind(conversation.created_at)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::UpsertError(e.to_string()))?;
        }

        // seq is assigned in insertion order, which is the read order.
        for turn in turns {
            let sources = turn
                .sources
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(|e| StoreError::UpsertError(e.to_string()))?;

            sqlx::query(&turn_query)
                .bind(turn.id)
                .bind(turn.conversation_id)
                .bind(turn.role.as_str())
                .bind(&turn.text)
                .bind(sources)
                .bind(turn.created_at)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::UpsertError(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::UpsertError(e.to_string()))?;

        Ok(())
    }

    async fn turns(&self, conversation_id: Uuid) -> Result<Vec<ConversationTurn>, StoreError> {
        self.select_turns(conversation_id, None).await
    }

    async fn recent_turns(
        &self,
        conversation_id: Uuid,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, StoreError> {
        self.select_turns(conversation_id, Some(limit)).await
    }

    fn driver(&self) -> StoreDriver {
        StoreDriver::PostgreSQL
    }
}
