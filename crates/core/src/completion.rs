use crate::models::{RetrievedChunk, Role, Turn};
use serde::{Deserialize, Serialize};

pub const ANSWER_INSTRUCTIONS: &str = "Use the following pieces of context from the uploaded document to answer the user's question. \
If the context does not contain the answer, say that you don't know instead of making one up.";

pub const CONDENSE_INSTRUCTIONS: &str = "Given the conversation so far and a follow-up question, rephrase the follow-up question \
as a standalone question in its original language. Reply with the question only.";

/// Structured request for a chat completion: instructions plus context, the
/// replayed conversation, and the new question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub system: String,
    pub history: Vec<Turn>,
    pub question: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

impl From<Role> for MessageRole {
    fn from(value: Role) -> Self {
        match value {
            Role::User => MessageRole::User,
            Role::Assistant => MessageRole::Assistant,
        }
    }
}

impl Prompt {
    pub fn answer(context: &[RetrievedChunk], history: &[Turn], question: &str) -> Self {
        Self {
            system: format!("{ANSWER_INSTRUCTIONS}\n\n{}", render_context(context)),
            history: history.to_vec(),
            question: question.to_string(),
        }
    }

    pub fn condense(history: &[Turn], question: &str) -> Self {
        Self {
            system: CONDENSE_INSTRUCTIONS.to_string(),
            history: history.to_vec(),
            question: question.to_string(),
        }
    }

    /// Flattens into chat messages: system first, the history in order, then the question.
    pub fn messages(&self) -> Vec<(MessageRole, &str)> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        messages.push((MessageRole::System, self.system.as_str()));
        for turn in &self.history {
            messages.push((MessageRole::from(turn.role), turn.text.as_str()));
        }
        messages.push((MessageRole::User, self.question.as_str()));
        messages
    }
}

fn render_context(context: &[RetrievedChunk]) -> String {
    if context.is_empty() {
        return "Context: (no matching passages)".to_string();
    }

    let mut rendered = String::from("Context:");
    for hit in context {
        rendered.push_str(&format!(
            "\n\n[page {}, offset {}]\n{}",
            hit.chunk.page, hit.chunk.offset, hit.chunk.text
        ));
    }
    rendered
}
