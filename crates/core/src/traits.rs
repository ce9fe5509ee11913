use crate::auth::User;
use crate::completion::Prompt;
use crate::{AuthError, CompletionError, EmbeddingError};
use async_trait::async_trait;

#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;

    /// Returns one vector per input, in input order.
    async fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_batch(&[text])
            .await?
            .pop()
            .ok_or_else(|| EmbeddingError::Response("no embedding returned".to_string()))
    }
}

#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, prompt: &Prompt) -> Result<String, CompletionError>;
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_user(&self, username: &str) -> Result<Option<User>, AuthError>;

    /// Fails with `AuthError::DuplicateUser` when the username is taken.
    async fn insert_user(&self, user: &User) -> Result<(), AuthError>;
}
