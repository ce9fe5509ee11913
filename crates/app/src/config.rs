use clap::{ArgAction, Parser, ValueEnum};
use docchat_core::openai::{DEFAULT_BASE_URL, DEFAULT_CHAT_MODEL, DEFAULT_EMBEDDING_MODEL};
use docchat_core::stores::mongo::{DEFAULT_COLLECTION, DEFAULT_DATABASE};
use docchat_core::{
    Authenticator, ChunkingConfig, Distance, InMemoryCredentialStore, IndexConfig,
    MongoCredentialStore, OpenAiConfig, RetrievalConfig, SessionPolicy,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EmbedderKind {
    /// OpenAI-compatible embeddings endpoint.
    Openai,
    /// Offline character trigram hashing.
    Ngram,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DistanceArg {
    L2,
    Cosine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CredentialBackend {
    /// MongoDB deployment reached through the MONGO_URI connection string.
    Mongo,
    /// Process-local store; accounts vanish on restart.
    Memory,
}

#[derive(Debug, Parser)]
#[command(name = "docchat-server", version, about = "Chat with your PDF documents")]
pub struct Cli {
    /// Address to bind the HTTP server to (host:port).
    #[arg(long, env = "DOCCHAT_BIND", default_value = "127.0.0.1:8501")]
    pub bind: String,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long, env = "DOCCHAT_LOG", default_value = "info")]
    pub log_level: String,

    /// API key for the embedding and chat endpoints.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: String,

    /// Base URL for OpenAI-compatible endpoints.
    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub openai_base_url: String,

    /// Embedding model identifier.
    #[arg(long, env = "DOCCHAT_EMBEDDING_MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    pub embedding_model: String,

    /// Optional embedding dimension override.
    #[arg(long, env = "DOCCHAT_EMBEDDING_DIMENSIONS")]
    pub embedding_dimensions: Option<usize>,

    /// Chat completion model identifier.
    #[arg(long, env = "DOCCHAT_CHAT_MODEL", default_value = DEFAULT_CHAT_MODEL)]
    pub chat_model: String,

    /// Sampling temperature for answers.
    #[arg(long, default_value_t = 0.7)]
    pub temperature: f32,

    /// Which embedder builds and queries the index.
    #[arg(long, value_enum, default_value_t = EmbedderKind::Openai)]
    pub embedder: EmbedderKind,

    /// Seconds before a request to an external service times out.
    #[arg(long, default_value_t = 60)]
    pub request_timeout_secs: u64,

    /// Retries for rate-limited or transient service failures.
    #[arg(long, default_value_t = 3)]
    pub max_retries: usize,

    /// Chunks per embedding request.
    #[arg(long, default_value_t = 64)]
    pub embedding_batch_size: usize,

    /// Embedding requests in flight while building an index.
    #[arg(long, default_value_t = 4)]
    pub embedding_concurrency: usize,

    /// Maximum characters per chunk.
    #[arg(long, default_value_t = docchat_core::chunking::DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Characters shared by neighbouring chunks.
    #[arg(long, default_value_t = docchat_core::chunking::DEFAULT_CHUNK_OVERLAP)]
    pub chunk_overlap: usize,

    /// Chunks retrieved per question.
    #[arg(long, default_value_t = docchat_core::responder::DEFAULT_TOP_K)]
    pub top_k: usize,

    /// Vector distance used for retrieval.
    #[arg(long, value_enum, default_value_t = DistanceArg::L2)]
    pub distance: DistanceArg,

    /// Rewrite follow-up questions into standalone ones before retrieval.
    #[arg(long, default_value_t = false)]
    pub condense_question: bool,

    /// Clear the conversation when a new document is processed.
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub clear_memory_on_upload: bool,

    /// Keep questions asked before any upload in the chat transcript.
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub record_not_ready_exchange: bool,

    /// Largest accepted upload in megabytes.
    #[arg(long, default_value_t = 200)]
    pub max_upload_mb: usize,

    /// Minutes after which an untouched browser session is dropped.
    #[arg(long, default_value_t = 120)]
    pub session_idle_minutes: u64,

    /// Require login and registration before using the app.
    #[arg(long, env = "DOCCHAT_AUTH", default_value_t = false)]
    pub auth: bool,

    /// Where user accounts live when authentication is enabled.
    #[arg(long, value_enum, default_value_t = CredentialBackend::Mongo)]
    pub credential_store: CredentialBackend,

    /// MongoDB connection string (`mongodb://` or `mongodb+srv://`).
    #[arg(long, env = "MONGO_URI", hide_env_values = true)]
    pub mongo_uri: Option<String>,

    /// Database holding user accounts.
    #[arg(long, env = "DOCCHAT_MONGO_DATABASE", default_value = DEFAULT_DATABASE)]
    pub mongo_database: String,

    /// Collection holding user accounts.
    #[arg(long, env = "DOCCHAT_MONGO_COLLECTION", default_value = DEFAULT_COLLECTION)]
    pub mongo_collection: String,

    /// Name of the session cookie.
    #[arg(long, default_value = "docchat_session")]
    pub cookie_name: String,

    /// Lifetime of the login cookie in days.
    #[arg(long, default_value_t = 30)]
    pub cookie_expiry_days: u64,

    /// Mark the session cookie `Secure`; set when served over HTTPS.
    #[arg(long, env = "DOCCHAT_SECURE_COOKIE", default_value_t = false)]
    pub secure_cookie: bool,
}

impl Cli {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn openai(&self) -> OpenAiConfig {
        OpenAiConfig {
            api_key: self.openai_api_key.clone(),
            base_url: self.openai_base_url.clone(),
            embedding_model: self.embedding_model.clone(),
            embedding_dimensions: self.embedding_dimensions,
            chat_model: self.chat_model.clone(),
            temperature: self.temperature,
            timeout: self.request_timeout(),
            max_retries: self.max_retries,
            batch_size: self.embedding_batch_size.max(1),
        }
    }

    pub fn chunking(&self) -> ChunkingConfig {
        ChunkingConfig {
            max_chars: self.chunk_size,
            overlap_chars: self.chunk_overlap,
        }
    }

    pub fn index(&self) -> IndexConfig {
        IndexConfig {
            distance: match self.distance {
                DistanceArg::L2 => Distance::L2,
                DistanceArg::Cosine => Distance::Cosine,
            },
            batch_size: self.embedding_batch_size.max(1),
            concurrency: self.embedding_concurrency.max(1),
        }
    }

    pub fn retrieval(&self) -> RetrievalConfig {
        RetrievalConfig {
            top_k: self.top_k.max(1),
            condense_question: self.condense_question,
        }
    }

    pub fn policy(&self) -> SessionPolicy {
        SessionPolicy {
            clear_memory_on_upload: self.clear_memory_on_upload,
            record_not_ready_exchange: self.record_not_ready_exchange,
        }
    }

    pub fn cookie_max_age(&self) -> Option<Duration> {
        self.auth
            .then(|| Duration::from_secs(self.cookie_expiry_days.saturating_mul(86_400)))
    }

    /// `None` when authentication is off. A missing or broken connection string
    /// still yields an authenticator, one that reports the problem to users.
    pub async fn authenticator(&self) -> Option<Authenticator> {
        if !self.auth {
            return None;
        }

        let authenticator = match self.credential_store {
            CredentialBackend::Memory => {
                Authenticator::new(Arc::new(InMemoryCredentialStore::default()))
            }
            CredentialBackend::Mongo => match self.mongo_uri.as_deref() {
                None => {
                    error!("MONGO_URI is not set; login and registration are unavailable");
                    Authenticator::unconfigured("MONGO_URI is not set")
                }
                Some(uri) => match MongoCredentialStore::connect(
                    uri,
                    &self.mongo_database,
                    &self.mongo_collection,
                    self.request_timeout(),
                )
                .await
                {
                    Ok(store) => {
                        let indexer = store.clone();
                        tokio::spawn(async move {
                            if let Err(error) = indexer.ensure_unique_username().await {
                                warn!(%error, "could not ensure the unique username index");
                            }
                        });
                        Authenticator::new(Arc::new(store))
                    }
                    Err(reason) => {
                        error!(%reason, "credential store unavailable");
                        Authenticator::unconfigured(reason.to_string())
                    }
                },
            },
        };
        Some(authenticator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["docchat-server", "--openai-api-key", "sk-test"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).expect("arguments should parse")
    }

    #[tokio::test]
    async fn defaults_match_documented_values() {
        let cli = parse(&[]);
        assert_eq!(cli.chunking(), ChunkingConfig::default());
        assert_eq!(cli.retrieval().top_k, 4);
        assert_eq!(cli.index().distance, Distance::L2);
        assert!(cli.policy().clear_memory_on_upload);
        assert!(cli.cookie_max_age().is_none());
        assert!(cli.authenticator().await.is_none());
        assert_eq!(cli.credential_store, CredentialBackend::Mongo);
        assert_eq!(cli.mongo_database, "user_database");
        assert_eq!(cli.mongo_collection, "users");
        assert!(!cli.secure_cookie);
    }

    #[test]
    fn memory_policy_can_be_turned_off() {
        let cli = parse(&["--clear-memory-on-upload", "false", "--distance", "cosine"]);
        assert!(!cli.policy().clear_memory_on_upload);
        assert_eq!(cli.index().distance, Distance::Cosine);
    }

    #[tokio::test]
    async fn auth_without_connection_secret_is_unconfigured_not_fatal() {
        let mut cli = parse(&["--auth"]);
        cli.mongo_uri = None;
        let authenticator = cli.authenticator().await.expect("auth enabled");
        assert!(!authenticator.is_configured());
        assert_eq!(cli.cookie_max_age(), Some(Duration::from_secs(30 * 86_400)));
    }

    #[tokio::test]
    async fn memory_credential_store_is_configured() {
        let cli = parse(&["--auth", "--credential-store", "memory"]);
        assert!(cli.authenticator().await.expect("auth enabled").is_configured());
    }

    #[tokio::test]
    async fn mongo_connection_string_configures_the_store() {
        let mut cli = parse(&["--auth", "--mongo-collection", "accounts"]);
        cli.mongo_uri = Some("mongodb://localhost:27017".to_string());
        assert!(cli.authenticator().await.expect("auth enabled").is_configured());

        cli.mongo_uri = Some("https://data.example.com/app/v1".to_string());
        assert!(!cli.authenticator().await.expect("auth enabled").is_configured());
    }
}
