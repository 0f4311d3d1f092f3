use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::search::RetrievedPassage;
use crate::utils::truncate_with_ellipsis;

/// Maximum characters of the question kept as an implicit conversation title.
pub const TITLE_MAX_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            _ => Err(format!("unknown role: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Conversation listing entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub turn_count: u64,
}

/// One immutable message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: Role,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<RetrievedPassage>>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(title: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title,
            created_at: Utc::now(),
        }
    }

    /// Conversation implicitly opened by a question; titled after it.
    pub fn from_question(question: &str) -> Self {
        Self::new(Some(truncate_with_ellipsis(question, TITLE_MAX_CHARS)))
    }
}

impl ConversationTurn {
    pub fn user(conversation_id: Uuid, text: impl Into<String>) -> Self {
        Self::new(conversation_id, Role::User, text.into(), None)
    }

    pub fn assistant(
        conversation_id: Uuid,
        text: impl Into<String>,
        sources: Vec<RetrievedPassage>,
    ) -> Self {
        Self::new(conversation_id, Role::Assistant, text.into(), Some(sources))
    }

    fn new(
        conversation_id: Uuid,
        role: Role,
        text: String,
        sources: Option<Vec<RetrievedPassage>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            role,
            text,
            sources,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_from_long_question_is_truncated() {
        let question = "q".repeat(80);
        let conversation = Conversation::from_question(&question);
        let title = conversation.title.unwrap();
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS + 3);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn test_title_from_short_question_is_kept() {
        let conversation = Conversation::from_question("How do refunds work?");
        assert_eq!(conversation.title.as_deref(), Some("How do refunds work?"));
    }

    #[test]
    fn test_role_parse_and_display() {
        assert_eq!("user".parse::<Role>().unwrap(), Role::User);
        assert_eq!(Role::Assistant.to_string(), "assistant");
        assert!("system".parse::<Role>().is_err());
    }

    #[test]
    fn test_turn_constructors() {
        let id = Uuid::new_v4();
        let user = ConversationTurn::user(id, "hi");
        assert_eq!(user.role, Role::User);
        assert!(user.sources.is_none());

        let assistant = ConversationTurn::assistant(id, "hello", vec![]);
        assert_eq!(assistant.role, Role::Assistant);
        assert_eq!(assistant.sources, Some(vec![]));
    }
}
