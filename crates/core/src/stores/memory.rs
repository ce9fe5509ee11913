use crate::auth::User;
use crate::traits::CredentialStore;
use crate::AuthError;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Users keyed by username; a key is inserted at most once.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryCredentialStore {
    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_user(&self, username: &str) -> Result<Option<User>, AuthError> {
        Ok(self.users.read().await.get(username).cloned())
    }

    async fn insert_user(&self, user: &User) -> Result<(), AuthError> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.username) {
            return Err(AuthError::DuplicateUser(user.username.clone()));
        }
        users.insert(user.username.clone(), user.clone());
        Ok(())
    }
}
