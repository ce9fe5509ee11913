//! Service fakes shared by unit tests.

use crate::completion::Prompt;
use crate::traits::{CompletionService, Embedder};
use crate::{CompletionError, EmbeddingError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Replies from a queue (repeating the last reply) and keeps every prompt.
pub(crate) struct RecordingCompletion {
    replies: Mutex<VecDeque<String>>,
    last: Mutex<String>,
    prompts: Mutex<Vec<Prompt>>,
}

impl RecordingCompletion {
    pub(crate) fn replying(reply: &str) -> Self {
        Self::with_replies(vec![reply])
    }

    pub(crate) fn with_replies(replies: Vec<&str>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(str::to_string).collect()),
            last: Mutex::new(String::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().expect("prompts lock").clone()
    }

    pub(crate) fn calls(&self) -> usize {
        self.prompts.lock().expect("prompts lock").len()
    }
}

#[async_trait]
impl CompletionService for RecordingCompletion {
    async fn complete(&self, prompt: &Prompt) -> Result<String, CompletionError> {
        self.prompts.lock().expect("prompts lock").push(prompt.clone());
        let mut last = self.last.lock().expect("last lock");
        if let Some(next) = self.replies.lock().expect("replies lock").pop_front() {
            *last = next;
        }
        Ok(last.clone())
    }
}

pub(crate) struct FailingCompletion;

#[async_trait]
impl CompletionService for FailingCompletion {
    async fn complete(&self, _prompt: &Prompt) -> Result<String, CompletionError> {
        Err(CompletionError::Api {
            status: 401,
            message: "invalid api key".to_string(),
        })
    }
}

pub(crate) struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn dimensions(&self) -> usize {
        8
    }

    async fn embed_batch(&self, _inputs: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(EmbeddingError::Api {
            status: 503,
            message: "service unavailable".to_string(),
        })
    }
}

/// Never finishes within a test's patience.
pub(crate) struct StalledEmbedder;

#[async_trait]
impl Embedder for StalledEmbedder {
    fn dimensions(&self) -> usize {
        8
    }

    async fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        Ok(inputs.iter().map(|_| vec![0.0; 8]).collect())
    }
}
