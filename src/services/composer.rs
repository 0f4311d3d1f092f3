use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::error::GenerationError;
use crate::models::{ConversationTurn, GenerationConfig, RetrievedPassage, Role};

pub const SYSTEM_PROMPT: &str = "You are a helpful customer support assistant.
Answer questions based ONLY on the provided context documents.
If the answer isn't in the context, say so clearly.
Always cite which document section you're referencing.
Be concise but complete.";

/// Answer returned when the provider produced no text.
pub const FALLBACK_ANSWER: &str = "Unable to generate response";

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// One role-tagged message sent to the generation provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

impl From<&ConversationTurn> for ChatMessage {
    fn from(turn: &ConversationTurn) -> Self {
        Self {
            role: turn.role,
            content: turn.text.clone(),
        }
    }
}

/// Remote text generation.
///
/// `Ok(None)` means the call succeeded but carried no text content.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(
        &self,
        system: &str,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<Option<String>, GenerationError>;

    fn model(&self) -> &str;
}

pub struct AnthropicProvider {
    client: Client,
    url: String,
    model: String,
    api_key: String,
}

impl AnthropicProvider {
    pub fn new(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(GenerationError::MissingApiKey)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
            model: config.model.clone(),
            api_key,
        })
    }

    fn headers(&self) -> Result<HeaderMap, GenerationError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(self.api_key.trim())
                .map_err(|e| GenerationError::InvalidResponse(format!("invalid API key: {}", e)))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

/// Non-2xx replies are never retried; status and body are kept for the caller.
fn status_error(status: StatusCode, body: String) -> GenerationError {
    GenerationError::ServerError {
        status: status.as_u16(),
        body,
    }
}

#[async_trait]
impl GenerationProvider for AnthropicProvider {
    async fn generate(
        &self,
        system: &str,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<Option<String>, GenerationError> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens,
            system,
            messages,
        };

        let response = self
            .client
            .post(&self.url)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout
                } else {
                    GenerationError::RequestError(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(status_error(status, body));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        Ok(parsed.first_text())
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

impl MessagesResponse {
    fn first_text(self) -> Option<String> {
        self.content
            .into_iter()
            .find_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .filter(|text| !text.trim().is_empty())
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

/// Builds the grounded prompt and asks the provider for an answer.
pub struct AnswerComposer {
    provider: Arc<dyn GenerationProvider>,
    max_tokens: u32,
    history_limit: usize,
}

impl AnswerComposer {
    pub fn new(provider: Arc<dyn GenerationProvider>, config: &GenerationConfig) -> Self {
        Self {
            provider,
            max_tokens: config.max_tokens,
            history_limit: config.history_limit,
        }
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    /// Generate an answer from retrieved passages and prior turns.
    ///
    /// `history` must be chronological; only its last `history_limit` turns
    /// are sent.
    pub async fn answer(
        &self,
        question: &str,
        retrieved: &[RetrievedPassage],
        history: &[ConversationTurn],
    ) -> Result<String, GenerationError> {
        let messages = self.build_messages(question, retrieved, history);

        tracing::info!(
            model = self.provider.model(),
            passages = retrieved.len(),
            messages = messages.len(),
            "generating answer"
        );

        let answer = self
            .provider
            .generate(SYSTEM_PROMPT, &messages, self.max_tokens)
            .await?;

        Ok(answer.unwrap_or_else(|| {
            tracing::warn!("generation returned no text, using fallback answer");
            FALLBACK_ANSWER.to_string()
        }))
    }

    fn build_messages(
        &self,
        question: &str,
        retrieved: &[RetrievedPassage],
        history: &[ConversationTurn],
    ) -> Vec<ChatMessage> {
        let skip = history.len().saturating_sub(self.history_limit);
        let mut messages: Vec<ChatMessage> =
            history[skip..].iter().map(ChatMessage::from).collect();
        messages.push(ChatMessage::user(build_user_prompt(
            question,
            &build_context(retrieved),
        )));
        messages
    }
}

/// `[Document i]` blocks, numbered from 1 in retrieval order.
pub fn build_context(retrieved: &[RetrievedPassage]) -> String {
    retrieved
        .iter()
        .enumerate()
        .map(|(i, passage)| format!("[Document {}]\n{}\n\n", i + 1, passage.text))
        .collect()
}

pub fn build_user_prompt(question: &str, context: &str) -> String {
    format!(
        "Context documents:\n{}\n\nQuestion: {}\n\nProvide a helpful answer based on the context above.",
        context, question
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use uuid::Uuid;

    /// Provider that records requests and replays scripted answers.
    #[derive(Default)]
    pub struct FakeGenerator {
        replies: Mutex<VecDeque<Result<Option<String>, GenerationError>>>,
        requests: Mutex<Vec<(String, Vec<ChatMessage>, u32)>>,
    }

    impl FakeGenerator {
        pub fn replying(replies: Vec<Result<Option<String>, GenerationError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                ..Default::default()
            }
        }

        pub fn requests(&self) -> Vec<(String, Vec<ChatMessage>, u32)> {
            self.requests.lock().unwrap().clone()
        }

        pub fn last_messages(&self) -> Vec<ChatMessage> {
            self.requests()
                .last()
                .map(|r| r.1.clone())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl GenerationProvider for FakeGenerator {
        async fn generate(
            &self,
            system: &str,
            messages: &[ChatMessage],
            max_tokens: u32,
        ) -> Result<Option<String>, GenerationError> {
            self.requests
                .lock()
                .unwrap()
                .push((system.to_string(), messages.to_vec(), max_tokens));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Some("generated answer".to_string())))
        }

        fn model(&self) -> &str {
            "fake-generate"
        }
    }

    fn passage(text: &str, similarity: f32) -> RetrievedPassage {
        RetrievedPassage {
            document_id: Uuid::new_v4(),
            passage_id: Uuid::new_v4(),
            ordinal: 0,
            text: text.to_string(),
            similarity,
        }
    }

    fn composer(provider: Arc<FakeGenerator>, history_limit: usize) -> AnswerComposer {
        let config = GenerationConfig {
            history_limit,
            ..Default::default()
        };
        AnswerComposer::new(provider, &config)
    }

    #[test]
    fn test_context_numbers_passages_from_one() {
        let context = build_context(&[passage("first", 0.9), passage("second", 0.8)]);
        assert_eq!(context, "[Document 1]\nfirst\n\n[Document 2]\nsecond\n\n");
        assert_eq!(build_context(&[]), "");
    }

    #[test]
    fn test_user_prompt_layout() {
        let prompt = build_user_prompt("How do refunds work?", "[Document 1]\nRefunds.\n\n");
        assert!(prompt.starts_with("Context documents:\n[Document 1]\nRefunds."));
        assert!(prompt.contains("Question: How do refunds work?"));
        assert!(prompt.ends_with("Provide a helpful answer based on the context above."));
    }

    #[tokio::test]
    async fn test_sends_system_prompt_and_single_user_message() {
        let provider = Arc::new(FakeGenerator::default());
        let composer = composer(provider.clone(), 10);

        let answer = composer
            .answer("What is the refund window?", &[passage("30 days", 0.9)], &[])
            .await
            .unwrap();

        assert_eq!(answer, "generated answer");
        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        let (system, messages, max_tokens) = &requests[0];
        assert_eq!(system, SYSTEM_PROMPT);
        assert_eq!(*max_tokens, 1024);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
        assert!(messages[0].content.contains("[Document 1]\n30 days"));
    }

    #[tokio::test]
    async fn test_empty_retrieval_still_calls_provider() {
        let provider = Arc::new(FakeGenerator::default());
        let composer = composer(provider.clone(), 10);

        composer.answer("Anything?", &[], &[]).await.unwrap();

        let messages = provider.last_messages();
        assert!(messages[0].content.starts_with("Context documents:\n\n\nQuestion: Anything?"));
    }

    #[tokio::test]
    async fn test_history_is_bounded_to_most_recent_turns() {
        let provider = Arc::new(FakeGenerator::default());
        let composer = composer(provider.clone(), 3);
        let conversation_id = Uuid::new_v4();
        let history: Vec<ConversationTurn> = (0..6)
            .map(|i| {
                if i % 2 == 0 {
                    ConversationTurn::user(conversation_id, format!("turn {i}"))
                } else {
                    ConversationTurn::assistant(conversation_id, format!("turn {i}"), vec![])
                }
            })
            .collect();

        composer.answer("next", &[], &history).await.unwrap();

        let messages = provider.last_messages();
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents.len(), 4);
        assert_eq!(&contents[..3], &["turn 3", "turn 4", "turn 5"]);
        assert_eq!(messages[0].role, Role::Assistant);
        assert_eq!(messages[1].role, Role::User);
        assert!(contents[3].contains("Question: next"));
    }

    #[tokio::test]
    async fn test_missing_text_falls_back() {
        let provider = Arc::new(FakeGenerator::replying(vec![Ok(None)]));
        let composer = composer(provider, 10);

        let answer = composer.answer("q", &[], &[]).await.unwrap();
        assert_eq!(answer, FALLBACK_ANSWER);
    }

    #[tokio::test]
    async fn test_provider_error_propagates() {
        let provider = Arc::new(FakeGenerator::replying(vec![Err(
            GenerationError::ServerError {
                status: 500,
                body: "boom".to_string(),
            },
        )]));
        let composer = composer(provider, 10);

        assert!(matches!(
            composer.answer("q", &[], &[]).await,
            Err(GenerationError::ServerError { status: 500, .. })
        ));
    }

    #[test]
    fn test_status_error_keeps_status_and_body() {
        for code in [401, 403, 429, 500, 529] {
            let status = StatusCode::from_u16(code).unwrap();
            match status_error(status, format!("reply {code}")) {
                GenerationError::ServerError { status, body } => {
                    assert_eq!(status, code);
                    assert_eq!(body, format!("reply {code}"));
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }

        let message = status_error(StatusCode::TOO_MANY_REQUESTS, "overloaded".into()).to_string();
        assert!(message.contains("429"));
        assert!(message.contains("overloaded"));
    }

    #[test]
    fn test_response_first_text_block() {
        let json = r#"{"content":[{"type":"tool_use","id":"x"},{"type":"text","text":"Hello"},{"type":"text","text":"again"}]}"#;
        let parsed: MessagesResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.first_text().as_deref(), Some("Hello"));

        let empty: MessagesResponse = serde_json::from_str(r#"{"content":[]}"#).unwrap();
        assert_eq!(empty.first_text(), None);
    }

    #[test]
    fn test_request_serialization() {
        let messages = vec![ChatMessage::user("hi")];
        let request = MessagesRequest {
            model: "claude-3-haiku-20240307",
            max_tokens: 1024,
            system: SYSTEM_PROMPT,
            messages: &messages,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hi");
        assert_eq!(json["max_tokens"], 1024);
    }

    #[test]
    fn test_provider_requires_api_key() {
        assert!(matches!(
            AnthropicProvider::new(&GenerationConfig::default()),
            Err(GenerationError::MissingApiKey)
        ));
    }
}
