//! Clients for OpenAI-compatible embedding and chat completion endpoints.

use crate::completion::Prompt;
use crate::traits::{CompletionService, Embedder};
use crate::{CompletionError, EmbeddingError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";
const ADA_002_DIMENSIONS: usize = 1_536;

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub embedding_model: String,
    pub embedding_dimensions: Option<usize>,
    pub chat_model: String,
    pub temperature: f32,
    pub timeout: Duration,
    pub max_retries: usize,
    pub batch_size: usize,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dimensions: None,
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: 0.7,
            timeout: Duration::from_secs(60),
            max_retries: 3,
            batch_size: 64,
        }
    }
}

impl OpenAiConfig {
    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn build_client(&self) -> Result<Client, String> {
        if self.api_key.trim().is_empty() {
            return Err("missing OpenAI API key".to_string());
        }
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", self.api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).map_err(|_| "invalid OpenAI API key".to_string())?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Client::builder()
            .timeout(self.timeout)
            .default_headers(headers)
            .build()
            .map_err(|error| format!("failed to build OpenAI HTTP client: {error}"))
    }
}

enum SendFailure {
    Status { status: StatusCode, body: String },
    Transport(reqwest::Error),
}

/// Posts `body`, retrying rate limits, server errors and transport failures
/// with capped exponential backoff.
async fn post_with_retry<B: Serialize + ?Sized>(
    client: &Client,
    url: &str,
    body: &B,
    max_retries: usize,
) -> Result<reqwest::Response, SendFailure> {
    let mut attempt = 0usize;
    loop {
        match client.post(url).json(body).send().await {
            Ok(response) if response.status().is_success() => return Ok(response),
            Ok(response) => {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "<body unavailable>".to_string());
                if should_retry(status) && attempt < max_retries {
                    attempt += 1;
                    debug!(%status, attempt, "retrying OpenAI request");
                    tokio::time::sleep(retry_backoff(attempt)).await;
                    continue;
                }
                return Err(SendFailure::Status { status, body });
            }
            Err(error) => {
                if is_retryable_error(&error) && attempt < max_retries {
                    attempt += 1;
                    debug!(%error, attempt, "retrying OpenAI request");
                    tokio::time::sleep(retry_backoff(attempt)).await;
                    continue;
                }
                return Err(SendFailure::Transport(error));
            }
        }
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect()
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(250 * (1 << capped))
}

#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: Option<usize>,
    max_retries: usize,
    batch_size: usize,
}

impl OpenAiEmbedder {
    pub fn new(config: &OpenAiConfig) -> Result<Self, EmbeddingError> {
        if config.embedding_model.trim().is_empty() {
            return Err(EmbeddingError::Config("missing embedding model name".to_string()));
        }
        let client = config.build_client().map_err(EmbeddingError::Config)?;
        Ok(Self {
            client,
            endpoint: config.endpoint("embeddings"),
            model: config.embedding_model.clone(),
            dimensions: config.embedding_dimensions,
            max_retries: config.max_retries,
            batch_size: config.batch_size.max(1),
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions.unwrap_or(ADA_002_DIMENSIONS)
    }

    async fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(inputs.len());
        for batch in inputs.chunks(self.batch_size) {
            let request = EmbeddingRequest {
                model: &self.model,
                input: batch,
                dimensions: self.dimensions,
            };
            let response = post_with_retry(&self.client, &self.endpoint, &request, self.max_retries)
                .await
                .map_err(|failure| match failure {
                    SendFailure::Status { status, body } => EmbeddingError::Api {
                        status: status.as_u16(),
                        message: body,
                    },
                    SendFailure::Transport(error) => EmbeddingError::Http(error),
                })?;

            let mut parsed: EmbeddingResponse = response.json().await?;
            if parsed.data.len() != batch.len() {
                return Err(EmbeddingError::Response(format!(
                    "received {} embeddings for {} inputs",
                    parsed.data.len(),
                    batch.len()
                )));
            }
            parsed.data.sort_by_key(|entry| entry.index);
            vectors.extend(parsed.data.into_iter().map(|entry| entry.embedding));
        }
        Ok(vectors)
    }
}

#[derive(Clone)]
pub struct OpenAiChat {
    client: Client,
    endpoint: String,
    model: String,
    temperature: f32,
    max_retries: usize,
}

impl OpenAiChat {
    pub fn new(config: &OpenAiConfig) -> Result<Self, CompletionError> {
        if config.chat_model.trim().is_empty() {
            return Err(CompletionError::Config("missing chat model name".to_string()));
        }
        let client = config.build_client().map_err(CompletionError::Config)?;
        Ok(Self {
            client,
            endpoint: config.endpoint("chat/completions"),
            model: config.chat_model.clone(),
            temperature: config.temperature,
            max_retries: config.max_retries,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

fn chat_request<'a>(model: &'a str, temperature: f32, prompt: &'a Prompt) -> ChatRequest<'a> {
    ChatRequest {
        model,
        temperature,
        messages: prompt
            .messages()
            .into_iter()
            .map(|(role, content)| ChatMessage {
                role: role.as_str(),
                content,
            })
            .collect(),
    }
}

#[async_trait]
impl CompletionService for OpenAiChat {
    async fn complete(&self, prompt: &Prompt) -> Result<String, CompletionError> {
        let body = chat_request(&self.model, self.temperature, prompt);
        let response = post_with_retry(&self.client, &self.endpoint, &body, self.max_retries)
            .await
            .map_err(|failure| match failure {
                SendFailure::Status { status, body } => CompletionError::Api {
                    status: status.as_u16(),
                    message: body,
                },
                SendFailure::Transport(error) => CompletionError::Http(error),
            })?;

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .ok_or_else(|| CompletionError::Response("response had no message content".to_string()))
    }
}
