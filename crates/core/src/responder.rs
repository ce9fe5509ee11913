use crate::completion::Prompt;
use crate::index::VectorIndex;
use crate::memory::ConversationMemory;
use crate::models::RetrievedChunk;
use crate::traits::CompletionService;
use crate::ResponderError;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_TOP_K: usize = 4;

#[derive(Debug, Clone, Copy)]
pub struct RetrievalConfig {
    /// Chunks retrieved per question.
    pub top_k: usize,
    /// Rewrite follow-up questions into standalone ones before retrieval.
    pub condense_question: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            condense_question: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub retrieval_query: String,
    pub sources: Vec<RetrievedChunk>,
}

#[derive(Clone)]
pub struct Responder {
    completion: Arc<dyn CompletionService>,
    config: RetrievalConfig,
}

impl Responder {
    pub fn new(completion: Arc<dyn CompletionService>, config: RetrievalConfig) -> Self {
        Self { completion, config }
    }

    pub fn config(&self) -> RetrievalConfig {
        self.config
    }

    /// Answers `question` from the chunks nearest to it plus the full memory.
    /// Does not touch `memory`; recording the exchange is the caller's job.
    pub async fn answer(
        &self,
        question: &str,
        index: Option<&VectorIndex>,
        memory: &ConversationMemory,
    ) -> Result<Answer, ResponderError> {
        let index = index.ok_or(ResponderError::NotReady)?;

        let retrieval_query = if self.config.condense_question && !memory.is_empty() {
            let condensed = self
                .completion
                .complete(&Prompt::condense(memory.history(), question))
                .await?;
            debug!(%condensed, "condensed follow-up question");
            condensed.trim().to_string()
        } else {
            question.to_string()
        };

        let sources = index.query(&retrieval_query, self.config.top_k).await?;
        let prompt = Prompt::answer(&sources, memory.history(), question);
        let text = self.completion.complete(&prompt).await?;

        info!(
            sources = sources.len(),
            history = memory.len(),
            "answer generated"
        );

        Ok(Answer {
            text,
            retrieval_query,
            sources,
        })
    }
}
