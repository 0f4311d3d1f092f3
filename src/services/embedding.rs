//! Embedding provider client and the sequential batcher built on top of it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use crate::error::EmbeddingError;
use crate::models::EmbeddingConfig;
use crate::utils::retry::{RetryConfig, with_retry};

/// Input type hint sent to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    /// For indexing passages
    Document,
    /// For search queries
    Query,
}

/// One vector of a provider response, tagged with its input position.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IndexedEmbedding {
    pub index: usize,
    pub embedding: Vec<f32>,
}

/// Remote embedding service. Entries may come back in any order.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(
        &self,
        texts: &[String],
        input_type: InputType,
    ) -> Result<Vec<IndexedEmbedding>, EmbeddingError>;

    fn model(&self) -> &str;
}

/// Request body for the embeddings endpoint.
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
    input_type: InputType,
}

/// Response from the embeddings endpoint.
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    data: Vec<IndexedEmbedding>,
}

/// Voyage AI compatible embeddings client.
#[derive(Debug, Clone)]
pub struct VoyageProvider {
    client: Client,
    url: String,
    model: String,
    api_key: String,
}

impl VoyageProvider {
    /// Create a new provider; fails when no credential is configured.
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(EmbeddingError::MissingApiKey)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Classify a non-2xx provider reply. Only 429 comes back retryable.
fn status_error(status: StatusCode, body: &str) -> EmbeddingError {
    let detail = format!("status {}: {}", status, body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => EmbeddingError::Unauthorized(detail),
        StatusCode::TOO_MANY_REQUESTS => EmbeddingError::RateLimited(detail),
        _ => EmbeddingError::ServerError(detail),
    }
}

#[async_trait]
impl EmbeddingProvider for VoyageProvider {
    async fn embed(
        &self,
        texts: &[String],
        input_type: InputType,
    ) -> Result<Vec<IndexedEmbedding>, EmbeddingError> {
        let request = EmbedRequest {
            model: &self.model,
            input: texts,
            input_type,
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(self.api_key.trim())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EmbeddingError::Timeout
                } else {
                    EmbeddingError::RequestError(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let body: EmbedResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                EmbeddingError::Timeout
            } else {
                EmbeddingError::InvalidResponse(e.to_string())
            }
        })?;

        Ok(body.data)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Splits inputs into provider-sized batches and embeds them one after another.
///
/// Batches run strictly in sequence with a fixed pause between them; only
/// rate-limit failures are retried.
#[derive(Clone)]
pub struct EmbeddingBatcher {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    dimension: usize,
    retry: RetryConfig,
    inter_batch_delay: Duration,
}

impl EmbeddingBatcher {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: &EmbeddingConfig) -> Self {
        Self {
            provider,
            batch_size: (config.batch_size as usize).max(1),
            dimension: config.dimension as usize,
            retry: RetryConfig::new(config.max_attempts)
                .with_base_delay(Duration::from_millis(config.retry_base_delay_ms)),
            inter_batch_delay: Duration::from_millis(config.inter_batch_delay_ms),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    /// Embed passages. Output length and order match `texts`.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.embed_with_type(texts, InputType::Document).await
    }

    /// Embed a single search query.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_with_type(&[text.to_string()], InputType::Query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("empty embedding response".to_string()))
    }

    async fn embed_with_type(
        &self,
        texts: &[String],
        input_type: InputType,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let total_batches = texts.len().div_ceil(self.batch_size);
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for (i, batch) in texts.chunks(self.batch_size).enumerate() {
            tracing::info!(
                batch = i + 1,
                total_batches,
                texts = batch.len(),
                "processing embedding batch"
            );

            let embeddings = with_retry(&self.retry, || self.embed_single_batch(batch, input_type))
                .await
                .into_result()?;
            all_embeddings.extend(embeddings);

            if i + 1 < total_batches {
                sleep(self.inter_batch_delay).await;
            }
        }

        Ok(all_embeddings)
    }

    /// One provider call, with the response put back into input order.
    async fn embed_single_batch(
        &self,
        batch: &[String],
        input_type: InputType,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let data = self.provider.embed(batch, input_type).await?;
        order_by_index(data, batch.len(), self.dimension)
    }
}

/// Sort a provider response by `index` and check it covers `0..expected` exactly.
fn order_by_index(
    mut data: Vec<IndexedEmbedding>,
    expected: usize,
    dimension: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if data.is_empty() {
        return Err(EmbeddingError::InvalidResponse(
            "response contained no embeddings".to_string(),
        ));
    }
    if data.len() != expected {
        return Err(EmbeddingError::InvalidResponse(format!(
            "expected {} embeddings, got {}",
            expected,
            data.len()
        )));
    }

    data.sort_by_key(|d| d.index);

    for (position, item) in data.iter().enumerate() {
        if item.index != position {
            return Err(EmbeddingError::InvalidResponse(format!(
                "missing embedding for input {}",
                position
            )));
        }
        if item.embedding.len() != dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: dimension,
                actual: item.embedding.len(),
            });
        }
    }

    Ok(data.into_iter().map(|d| d.embedding).collect())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::utils::retry::Retryable;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    pub const TEST_DIMENSION: usize = 3;

    /// Deterministic vector for a text.
    pub fn vec_for(text: &str) -> Vec<f32> {
        let first = text.bytes().next().map_or(0.0, f32::from);
        vec![text.len() as f32, first, 1.0]
    }

    /// Scripted provider: each call pops the next script entry (`Some` fails
    /// the call); once the script is exhausted it answers with `vec_for` of each
    /// input, in reversed index order.
    #[derive(Default)]
    pub struct FakeProvider {
        script: Mutex<VecDeque<Option<EmbeddingError>>>,
        calls: Mutex<Vec<(Vec<String>, InputType, Instant)>>,
    }

    impl FakeProvider {
        pub fn scripted(script: Vec<Option<EmbeddingError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                ..Default::default()
            }
        }

        pub fn failing_with(failures: Vec<EmbeddingError>) -> Self {
            Self::scripted(failures.into_iter().map(Some).collect())
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub fn batch_sizes(&self) -> Vec<usize> {
            self.calls.lock().unwrap().iter().map(|c| c.0.len()).collect()
        }

        pub fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().iter().map(|c| c.2).collect()
        }

        pub fn input_types(&self) -> Vec<InputType> {
            self.calls.lock().unwrap().iter().map(|c| c.1).collect()
        }
    }

    #[async_trait]
    impl EmbeddingProvider for FakeProvider {
        async fn embed(
            &self,
            texts: &[String],
            input_type: InputType,
        ) -> Result<Vec<IndexedEmbedding>, EmbeddingError> {
            self.calls
                .lock()
                .unwrap()
                .push((texts.to_vec(), input_type, Instant::now()));

            if let Some(Some(error)) = self.script.lock().unwrap().pop_front() {
                return Err(error);
            }

            Ok(texts
                .iter()
                .enumerate()
                .rev()
                .map(|(index, text)| IndexedEmbedding {
                    index,
                    embedding: vec_for(text),
                })
                .collect())
        }

        fn model(&self) -> &str {
            "fake-embed"
        }
    }

    pub fn test_config() -> EmbeddingConfig {
        EmbeddingConfig {
            dimension: TEST_DIMENSION as u32,
            batch_size: 2,
            max_attempts: 3,
            retry_base_delay_ms: 1_000,
            inter_batch_delay_ms: 500,
            ..Default::default()
        }
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    fn rate_limited() -> EmbeddingError {
        EmbeddingError::RateLimited("status 429".to_string())
    }

    #[tokio::test]
    async fn test_reordered_response_is_restored() {
        let provider = Arc::new(FakeProvider::default());
        let batcher = EmbeddingBatcher::new(provider.clone(), &test_config());

        let result = batcher.embed(&texts(&["a", "b"])).await.unwrap();

        assert_eq!(result, vec![vec_for("a"), vec_for("b")]);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_preserve_order_and_size() {
        let provider = Arc::new(FakeProvider::default());
        let batcher = EmbeddingBatcher::new(provider.clone(), &test_config());
        let input = texts(&["one", "two", "three", "four", "five"]);

        let result = batcher.embed(&input).await.unwrap();

        assert_eq!(result.len(), input.len());
        for (text, vector) in input.iter().zip(&result) {
            assert_eq!(vector, &vec_for(text));
        }
        assert_eq!(provider.batch_sizes(), vec![2, 2, 1]);
        assert!(provider.input_types().iter().all(|t| *t == InputType::Document));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inter_batch_delay_only_between_batches() {
        let provider = Arc::new(FakeProvider::default());
        let batcher = EmbeddingBatcher::new(provider.clone(), &test_config());
        let started = Instant::now();

        batcher
            .embed(&texts(&["a", "b", "c", "d"]))
            .await
            .unwrap();

        let times = provider.call_times();
        assert_eq!(times.len(), 2);
        assert!(times[1] - times[0] >= Duration::from_millis(500));
        // No pause after the final batch.
        assert!(started.elapsed() < Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_then_success() {
        let config = test_config();
        let failures = (1..config.max_attempts).map(|_| rate_limited()).collect();
        let provider = Arc::new(FakeProvider::failing_with(failures));
        let batcher = EmbeddingBatcher::new(provider.clone(), &config);
        let started = Instant::now();

        let result = batcher.embed(&texts(&["a", "b"])).await.unwrap();

        assert_eq!(result, vec![vec_for("a"), vec_for("b")]);
        assert_eq!(provider.call_count(), config.max_attempts as usize);
        // Linear backoff: 1s then 2s.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_exhausted_propagates() {
        let config = test_config();
        let failures = (0..10).map(|_| rate_limited()).collect();
        let provider = Arc::new(FakeProvider::failing_with(failures));
        let batcher = EmbeddingBatcher::new(provider.clone(), &config);

        let err = batcher.embed(&texts(&["a"])).await.unwrap_err();

        assert!(matches!(err, EmbeddingError::RateLimited(_)));
        assert_eq!(provider.call_count(), config.max_attempts as usize);
    }

    #[tokio::test]
    async fn test_non_rate_limit_errors_are_not_retried() {
        for error in [
            EmbeddingError::Unauthorized("status 401".to_string()),
            EmbeddingError::ServerError("status 500".to_string()),
            EmbeddingError::Timeout,
        ] {
            let provider = Arc::new(FakeProvider::failing_with(vec![error]));
            let batcher = EmbeddingBatcher::new(provider.clone(), &test_config());

            assert!(batcher.embed(&texts(&["a"])).await.is_err());
            assert_eq!(provider.call_count(), 1);
        }
    }

    #[tokio::test]
    async fn test_failure_in_later_batch_stops_processing() {
        let provider = Arc::new(FakeProvider::scripted(vec![
            None,
            Some(EmbeddingError::ServerError("status 500".to_string())),
        ]));
        let mut config = test_config();
        config.inter_batch_delay_ms = 0;
        let batcher = EmbeddingBatcher::new(provider.clone(), &config);

        let err = batcher
            .embed(&texts(&["a", "b", "c", "d", "e"]))
            .await
            .unwrap_err();

        assert!(matches!(err, EmbeddingError::ServerError(_)));
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_embed_query_uses_query_type() {
        let provider = Arc::new(FakeProvider::default());
        let batcher = EmbeddingBatcher::new(provider.clone(), &test_config());

        let vector = batcher.embed_query("refund policy").await.unwrap();

        assert_eq!(vector, vec_for("refund policy"));
        assert_eq!(provider.input_types(), vec![InputType::Query]);
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_calls() {
        let provider = Arc::new(FakeProvider::default());
        let batcher = EmbeddingBatcher::new(provider.clone(), &test_config());

        assert!(batcher.embed(&[]).await.unwrap().is_empty());
        assert_eq!(provider.call_count(), 0);
    }

    #[test]
    fn test_order_by_index_rejects_empty_response() {
        let err = order_by_index(vec![], 2, 3).unwrap_err();
        assert!(matches!(err, EmbeddingError::InvalidResponse(_)));
    }

    #[test]
    fn test_order_by_index_rejects_duplicate_index() {
        let data = vec![
            IndexedEmbedding { index: 0, embedding: vec![0.0; 3] },
            IndexedEmbedding { index: 0, embedding: vec![0.0; 3] },
        ];
        assert!(matches!(
            order_by_index(data, 2, 3),
            Err(EmbeddingError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_order_by_index_rejects_wrong_dimension() {
        let data = vec![IndexedEmbedding { index: 0, embedding: vec![0.0; 4] }];
        assert!(matches!(
            order_by_index(data, 1, 3),
            Err(EmbeddingError::DimensionMismatch { expected: 3, actual: 4 })
        ));
    }

    #[test]
    fn test_provider_requires_api_key() {
        let config = EmbeddingConfig::default();
        assert!(matches!(
            VoyageProvider::new(&config),
            Err(EmbeddingError::MissingApiKey)
        ));
    }

    #[test]
    fn test_provider_url_trimming() {
        let config = EmbeddingConfig {
            url: "https://embeddings.example.com/v1/embeddings/".to_string(),
            api_key: Some("secret".to_string()),
            ..Default::default()
        };
        let provider = VoyageProvider::new(&config).unwrap();
        assert_eq!(provider.url(), "https://embeddings.example.com/v1/embeddings");
        assert_eq!(provider.model(), "voyage-2");
    }

    #[test]
    fn test_status_error_classification() {
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, "bad key"),
            EmbeddingError::Unauthorized(_)
        ));
        assert!(matches!(
            status_error(StatusCode::FORBIDDEN, ""),
            EmbeddingError::Unauthorized(_)
        ));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, "slow down"),
            EmbeddingError::RateLimited(_)
        ));
        assert!(matches!(
            status_error(StatusCode::INTERNAL_SERVER_ERROR, ""),
            EmbeddingError::ServerError(_)
        ));
        assert!(matches!(
            status_error(StatusCode::SERVICE_UNAVAILABLE, ""),
            EmbeddingError::ServerError(_)
        ));

        let detail = status_error(StatusCode::TOO_MANY_REQUESTS, "slow down").to_string();
        assert!(detail.contains("429"));
        assert!(detail.contains("slow down"));
    }

    #[test]
    fn test_only_rate_limits_are_retryable() {
        let retryable: Vec<u16> = [401, 403, 404, 429, 500, 502, 503]
            .into_iter()
            .filter(|code| {
                status_error(StatusCode::from_u16(*code).unwrap(), "").is_retryable()
            })
            .collect();
        assert_eq!(retryable, vec![429]);
    }

    #[test]
    fn test_request_serialization() {
        let input = texts(&["a"]);
        let request = EmbedRequest {
            model: "voyage-2",
            input: &input,
            input_type: InputType::Query,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"model": "voyage-2", "input": ["a"], "input_type": "query"})
        );
    }

    #[test]
    fn test_response_deserialization() {
        let body: EmbedResponse = serde_json::from_str(
            r#"{"object":"list","data":[{"object":"embedding","index":1,"embedding":[0.5]},{"index":0,"embedding":[0.25]}],"model":"voyage-2"}"#,
        )
        .unwrap();
        let ordered = order_by_index(body.data, 2, 1).unwrap();
        assert_eq!(ordered, vec![vec![0.25], vec![0.5]]);
    }
}
