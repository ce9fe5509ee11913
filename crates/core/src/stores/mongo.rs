use crate::auth::User;
use crate::traits::CredentialStore;
use crate::AuthError;
use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, Collection, IndexModel};
use std::time::Duration;
use tracing::info;

pub const DEFAULT_DATABASE: &str = "user_database";
pub const DEFAULT_COLLECTION: &str = "users";

const DUPLICATE_KEY: i32 = 11000;

fn is_duplicate_key(error: &mongodb::error::Error) -> bool {
    matches!(
        error.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY
    )
}

/// Users kept as one document per account in a MongoDB collection, looked up
/// by `username`.
#[derive(Clone)]
pub struct MongoCredentialStore {
    users: Collection<User>,
}

impl std::fmt::Debug for MongoCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoCredentialStore")
            .field("namespace", &self.users.namespace().to_string())
            .finish_non_exhaustive()
    }
}

impl MongoCredentialStore {
    /// Parses a `mongodb://` or `mongodb+srv://` connection string. The driver
    /// connects lazily, so an unreachable cluster surfaces on first use.
    pub async fn connect(
        uri: &str,
        database: &str,
        collection: &str,
        timeout: Duration,
    ) -> Result<Self, AuthError> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(AuthError::Configuration("connection string is empty".to_string()));
        }

        let mut options = ClientOptions::parse(uri)
            .await
            .map_err(|error| AuthError::Configuration(error.to_string()))?;
        options.app_name = Some("docchat".to_string());
        options.server_selection_timeout = Some(timeout);
        options.connect_timeout = Some(timeout);
        let hosts = options
            .hosts
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");

        let client = Client::with_options(options)
            .map_err(|error| AuthError::Configuration(error.to_string()))?;
        let users = client.database(database).collection::<User>(collection);
        info!(%hosts, %database, %collection, "credential store configured");
        Ok(Self { users })
    }

    /// Makes the collection reject a second account with the same username.
    pub async fn ensure_unique_username(&self) -> Result<(), AuthError> {
        let index = IndexModel::builder()
            .keys(doc! { "username": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.users.create_index(index).await?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for MongoCredentialStore {
    async fn find_user(&self, username: &str) -> Result<Option<User>, AuthError> {
        Ok(self.users.find_one(doc! { "username": username }).await?)
    }

    async fn insert_user(&self, user: &User) -> Result<(), AuthError> {
        match self.users.insert_one(user).await {
            Ok(_) => Ok(()),
            Err(error) if is_duplicate_key(&error) => {
                Err(AuthError::DuplicateUser(user.username.clone()))
            }
            Err(error) => Err(error.into()),
        }
    }
}
