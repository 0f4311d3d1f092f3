use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An uploaded document; owns its passages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub filename: String,
    pub content_type: String,
    pub checksum: String,
    pub uploaded_at: DateTime<Utc>,
    pub processed: bool,
    pub chunk_count: u32,
}

/// A bounded slice of a document's text, the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub id: Uuid,
    pub document_id: Uuid,
    pub text: String,
    pub ordinal: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
}

impl Document {
    pub fn new(filename: impl Into<String>, content_type: impl Into<String>, checksum: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            filename: filename.into(),
            content_type: content_type.into(),
            checksum,
            uploaded_at: Utc::now(),
            processed: false,
            chunk_count: 0,
        }
    }

    /// Build the passages for this document's chunks, in emission order.
    pub fn passages(&self, chunks: Vec<String>) -> Vec<Passage> {
        chunks
            .into_iter()
            .enumerate()
            .map(|(idx, text)| Passage::new(self.id, idx as u32, text))
            .collect()
    }
}

impl Passage {
    /// Deterministic passage id derived from the parent document and ordinal.
    pub fn generate_id(document_id: Uuid, ordinal: u32) -> Uuid {
        let name = format!("{}:{}", document_id, ordinal);
        Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
    }

    pub fn new(document_id: Uuid, ordinal: u32, text: String) -> Self {
        Self {
            id: Self::generate_id(document_id, ordinal),
            document_id,
            text,
            ordinal,
            embedding: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Only embedded passages take part in retrieval.
    pub fn is_searchable(&self) -> bool {
        self.embedding.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passage_generate_id() {
        let doc_id = Uuid::new_v4();
        let id = Passage::generate_id(doc_id, 5);
        assert_eq!(id, Passage::generate_id(doc_id, 5));
        assert_ne!(id, Passage::generate_id(doc_id, 6));
        assert_ne!(id, Passage::generate_id(Uuid::new_v4(), 5));
    }

    #[test]
    fn test_document_passages_follow_chunk_order() {
        let doc = Document::new("guide.txt", "text/plain", "abc".to_string());
        let passages = doc.passages(vec!["first".to_string(), "second".to_string()]);

        assert_eq!(passages.len(), 2);
        assert_eq!(passages[0].ordinal, 0);
        assert_eq!(passages[1].ordinal, 1);
        assert_eq!(passages[1].text, "second");
        assert!(passages.iter().all(|p| p.document_id == doc.id));
        assert!(!passages[0].is_searchable());
    }

    #[test]
    fn test_with_embedding_makes_searchable() {
        let passage = Passage::new(Uuid::new_v4(), 0, "text".to_string()).with_embedding(vec![1.0]);
        assert!(passage.is_searchable());
    }
}
