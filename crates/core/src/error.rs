use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    DocumentParse(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding api returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("invalid embedding response: {0}")]
    Response(String),

    #[error("embedding client misconfigured: {0}")]
    Config(String),
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("completion api returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("invalid completion response: {0}")]
    Response(String),

    #[error("completion client misconfigured: {0}")]
    Config(String),
}

#[derive(Debug, Error)]
pub enum ResponderError {
    #[error("no document has been processed yet")]
    NotReady,

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Completion(#[from] CompletionError),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("username already exists: {0}")]
    DuplicateUser(String),

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("credential store is not configured: {0}")]
    Configuration(String),

    #[error("invalid registration: {0}")]
    InvalidArgument(String),

    #[error("credential store request failed: {0}")]
    Store(String),

    #[error("password hashing failed: {0}")]
    PasswordHash(String),
}

impl From<mongodb::error::Error> for AuthError {
    fn from(value: mongodb::error::Error) -> Self {
        AuthError::Store(value.to_string())
    }
}

impl AuthError {
    pub fn user_message(&self) -> String {
        match self {
            AuthError::DuplicateUser(_) => {
                "Username already exists. Please choose a different one.".to_string()
            }
            AuthError::InvalidCredentials => "Username/password is incorrect.".to_string(),
            AuthError::Configuration(_) => {
                "Credential store connection string not found. Please set MONGO_URI in your .env file."
                    .to_string()
            }
            AuthError::InvalidArgument(details) => details.clone(),
            AuthError::Store(_) | AuthError::PasswordHash(_) => {
                "Could not reach the user database. Please try again.".to_string()
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error("no document has been processed yet")]
    NotReady,

    #[error(transparent)]
    Completion(#[from] CompletionError),
}

impl From<ResponderError> for SessionError {
    fn from(value: ResponderError) -> Self {
        match value {
            ResponderError::NotReady => SessionError::NotReady,
            ResponderError::Embedding(error) => SessionError::Embedding(error),
            ResponderError::Completion(error) => SessionError::Completion(error),
        }
    }
}

pub const NOT_READY_MESSAGE: &str = "Please upload and process a document first.";
pub const MISSING_UPLOAD_MESSAGE: &str = "Please upload a PDF document first.";

impl SessionError {
    pub fn user_message(&self) -> String {
        match self {
            SessionError::Ingest(IngestError::InvalidArgument(details)) => details.clone(),
            SessionError::Ingest(error) => format!("Could not read the PDF: {error}"),
            SessionError::Embedding(error) => {
                format!("The embedding service failed, please retry: {error}")
            }
            SessionError::NotReady => NOT_READY_MESSAGE.to_string(),
            SessionError::Completion(error) => {
                format!("The language model service failed, please retry: {error}")
            }
        }
    }
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
