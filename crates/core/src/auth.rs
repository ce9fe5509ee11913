use crate::traits::CredentialStore;
use crate::AuthError;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};
use uuid::Uuid;

/// Stored account. `username` is the unique key of the credential store and
/// `password` always holds a PHC-format hash, never the plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub username: String,
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_repeat: String,
}

impl Registration {
    fn validate(&self) -> Result<(), AuthError> {
        let required = [
            ("username", &self.username),
            ("name", &self.name),
            ("email", &self.email),
            ("password", &self.password),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(AuthError::InvalidArgument(format!("The {field} field is required.")));
            }
        }
        if self.username.trim() != self.username || self.username.contains(char::is_whitespace) {
            return Err(AuthError::InvalidArgument(
                "Usernames cannot contain spaces.".to_string(),
            ));
        }
        if !self.email.contains('@') {
            return Err(AuthError::InvalidArgument("Email is not valid.".to_string()));
        }
        if self.password != self.password_repeat {
            return Err(AuthError::InvalidArgument("Passwords do not match.".to_string()));
        }
        Ok(())
    }
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes())
        .map_err(|error| AuthError::PasswordHash(error.to_string()))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|error| AuthError::PasswordHash(error.to_string()))
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Hash checked against when a login names no stored user, so that unknown
/// and known usernames cost the same Argon2 work.
fn unknown_user_hash() -> &'static str {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| hash_password("docchat-unknown-user").unwrap_or_default())
}

/// Registration and login on top of a credential store. An authenticator
/// built with `unconfigured` fails every call with the configuration reason.
#[derive(Clone)]
pub struct Authenticator {
    store: Result<Arc<dyn CredentialStore>, String>,
}

impl Authenticator {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store: Ok(store) }
    }

    pub fn unconfigured(reason: impl Into<String>) -> Self {
        Self {
            store: Err(reason.into()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.store.is_ok()
    }

    fn store(&self) -> Result<&Arc<dyn CredentialStore>, AuthError> {
        self.store
            .as_ref()
            .map_err(|reason| AuthError::Configuration(reason.clone()))
    }

    pub async fn register(&self, registration: &Registration) -> Result<User, AuthError> {
        let store = self.store()?;
        registration.validate()?;

        if store.find_user(&registration.username).await?.is_some() {
            return Err(AuthError::DuplicateUser(registration.username.clone()));
        }

        let user = User {
            username: registration.username.clone(),
            name: registration.name.trim().to_string(),
            email: registration.email.trim().to_string(),
            password: hash_password(&registration.password)?,
        };
        store.insert_user(&user).await?;
        info!(username = %user.username, "user registered");
        Ok(user)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<User, AuthError> {
        let store = self.store()?;
        let user = store.find_user(username).await?;
        let stored = match &user {
            Some(user) => user.password.as_str(),
            None => unknown_user_hash(),
        };
        let verified = verify_password(password, stored);
        match user {
            Some(user) if verified => {
                info!(username = %user.username, "user logged in");
                Ok(user)
            }
            _ => {
                warn!(%username, "login rejected");
                Err(AuthError::InvalidCredentials)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::InMemoryCredentialStore;

    fn alice() -> Registration {
        Registration {
            username: "alice".to_string(),
            name: "Alice Example".to_string(),
            email: "alice@example.com".to_string(),
            password: "s3cret-pass".to_string(),
            password_repeat: "s3cret-pass".to_string(),
        }
    }

    #[tokio::test]
    async fn duplicate_registration_fails_and_password_is_hashed() {
        let store = Arc::new(InMemoryCredentialStore::default());
        let auth = Authenticator::new(store.clone());

        let first = auth.register(&alice()).await.expect("first registration");
        let second = auth.register(&alice()).await;

        assert!(matches!(second, Err(AuthError::DuplicateUser(name)) if name == "alice"));
        assert_ne!(first.password, "s3cret-pass");
        assert!(first.password.starts_with("$argon2"));

        let stored = store
            .find_user("alice")
            .await
            .expect("lookup")
            .expect("user stored");
        assert_ne!(stored.password, "s3cret-pass");
    }

    #[tokio::test]
    async fn login_checks_password() {
        let auth = Authenticator::new(Arc::new(InMemoryCredentialStore::default()));
        auth.register(&alice()).await.expect("registration");

        let user = auth.login("alice", "s3cret-pass").await.expect("login");
        assert_eq!(user.email, "alice@example.com");

        assert!(matches!(
            auth.login("alice", "wrong").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.login("bob", "s3cret-pass").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn registration_is_validated() {
        let auth = Authenticator::new(Arc::new(InMemoryCredentialStore::default()));

        let mismatch = Registration {
            password_repeat: "other".to_string(),
            ..alice()
        };
        let bad_email = Registration {
            email: "alice.example.com".to_string(),
            ..alice()
        };
        let spaced = Registration {
            username: "al ice".to_string(),
            ..alice()
        };

        for registration in [mismatch, bad_email, spaced] {
            assert!(matches!(
                auth.register(&registration).await,
                Err(AuthError::InvalidArgument(_))
            ));
        }
    }

    #[tokio::test]
    async fn unconfigured_store_reports_configuration_error() {
        let auth = Authenticator::unconfigured("MONGO_URI is not set");

        let error = auth.login("alice", "pw").await.expect_err("must fail");
        assert!(matches!(error, AuthError::Configuration(_)));
        assert!(error.user_message().contains("MONGO_URI"));
        assert!(!auth.is_configured());
    }

    #[tokio::test]
    async fn unknown_user_is_checked_against_a_real_hash() {
        let auth = Authenticator::new(Arc::new(InMemoryCredentialStore::default()));
        auth.register(&alice()).await.expect("registration");

        let parsed = PasswordHash::new(unknown_user_hash()).expect("valid PHC string");
        let stored_hash = hash_password("x").expect("hash");
        let stored = PasswordHash::new(&stored_hash).expect("parse");
        assert_eq!(parsed.algorithm, stored.algorithm);
        assert_eq!(parsed.params, stored.params);
        assert!(!verify_password("docchat", unknown_user_hash()));

        assert!(matches!(
            auth.login("mallory", "docchat-unknown-user").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn hashes_are_salted() {
        let first = hash_password("same").expect("hash");
        let second = hash_password("same").expect("hash");
        assert_ne!(first, second);
        assert!(verify_password("same", &first));
        assert!(verify_password("same", &second));
        assert!(!verify_password("same", "not-a-phc-string"));
    }
}
