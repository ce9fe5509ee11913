pub mod auth;
pub mod chunking;
pub mod completion;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod index;
pub mod ingest;
pub mod memory;
pub mod models;
pub mod openai;
pub mod responder;
pub mod session;
pub mod stores;
pub mod traits;

#[cfg(test)]
mod testing;

pub use auth::{hash_password, verify_password, Authenticator, Registration, User};
pub use chunking::{build_chunks, sliding_windows, ChunkingConfig};
pub use completion::Prompt;
pub use embeddings::{CharacterNgramEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{
    AuthError, CompletionError, EmbeddingError, IngestError, ResponderError, SessionError,
    MISSING_UPLOAD_MESSAGE, NOT_READY_MESSAGE,
};
pub use extractor::{extract_page_texts, LopdfExtractor, PageText, PdfExtractor};
pub use index::{Distance, IndexConfig, VectorIndex};
pub use ingest::{DocumentIngestor, IngestedDocument};
pub use memory::ConversationMemory;
pub use models::{Chunk, DocumentFingerprint, RetrievedChunk, Role, Turn};
pub use openai::{OpenAiChat, OpenAiConfig, OpenAiEmbedder};
pub use responder::{Answer, Responder, RetrievalConfig};
pub use session::{
    DocumentSummary, Reply, ReplyStatus, Session, SessionController, SessionPolicy, SessionState,
    TranscriptEntry,
};
pub use stores::{InMemoryCredentialStore, MongoCredentialStore};
pub use traits::{CompletionService, CredentialStore, Embedder};
