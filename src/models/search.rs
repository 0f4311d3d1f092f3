//! Search-related models for queries and results.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::truncate_with_ellipsis;

/// Characters of passage text echoed back as a source preview.
pub const SOURCE_PREVIEW_CHARS: usize = 200;

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// Machine-parseable JSON format
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("unknown output format: {}", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Nearest-neighbour hit as returned by the store, before similarity shaping.
#[derive(Debug, Clone, PartialEq)]
pub struct PassageMatch {
    pub passage_id: Uuid,
    pub document_id: Uuid,
    pub ordinal: u32,
    pub text: String,
    /// Cosine distance to the query vector.
    pub distance: f32,
}

/// A passage returned by the retriever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub document_id: Uuid,
    pub passage_id: Uuid,
    pub ordinal: u32,
    pub text: String,
    /// `1 - cosine distance`, clamped to 0.0-1.0
    pub similarity: f32,
}

impl From<PassageMatch> for RetrievedPassage {
    fn from(m: PassageMatch) -> Self {
        Self {
            document_id: m.document_id,
            passage_id: m.passage_id,
            ordinal: m.ordinal,
            text: m.text,
            similarity: (1.0 - m.distance).clamp(0.0, 1.0),
        }
    }
}

/// Collection of search results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResults {
    /// Query that was executed
    pub query: String,

    /// Matching passages, most similar first
    pub results: Vec<RetrievedPassage>,

    /// Query execution time in milliseconds
    pub duration_ms: u64,
}

impl SearchResults {
    pub fn new(query: String, results: Vec<RetrievedPassage>, duration_ms: u64) -> Self {
        Self {
            query,
            results,
            duration_ms,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }
}

/// Source attribution returned alongside an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReference {
    pub document_id: Uuid,
    pub text: String,
    pub similarity: f32,
}

impl From<&RetrievedPassage> for SourceReference {
    fn from(p: &RetrievedPassage) -> Self {
        Self {
            document_id: p.document_id,
            text: truncate_with_ellipsis(&p.text, SOURCE_PREVIEW_CHARS),
            similarity: p.similarity,
        }
    }
}

/// Result of an ask operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    pub conversation_id: Uuid,
    pub sources: Vec<SourceReference>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage_match(distance: f32) -> PassageMatch {
        PassageMatch {
            passage_id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            ordinal: 0,
            text: "text".to_string(),
            distance,
        }
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("yaml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_similarity_from_distance() {
        let p: RetrievedPassage = passage_match(0.25).into();
        assert!((p.similarity - 0.75).abs() < f32::EPSILON);
    }

    #[test]
    fn test_similarity_is_clamped() {
        let opposite: RetrievedPassage = passage_match(1.6).into();
        assert_eq!(opposite.similarity, 0.0);
        let rounding: RetrievedPassage = passage_match(-0.000_01).into();
        assert_eq!(rounding.similarity, 1.0);
    }

    #[test]
    fn test_source_reference_preview() {
        let mut p: RetrievedPassage = passage_match(0.1).into();
        p.text = "x".repeat(300);
        let source = SourceReference::from(&p);
        assert_eq!(source.text.chars().count(), SOURCE_PREVIEW_CHARS + 3);
        assert!(source.text.ends_with("..."));
    }

    #[test]
    fn test_search_results() {
        let results = SearchResults::new("test".to_string(), vec![], 50);
        assert!(results.is_empty());
        assert_eq!(results.len(), 0);
        assert_eq!(results.duration_ms, 50);
    }
}
