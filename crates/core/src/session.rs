//! Per-session orchestration of ingestion, indexing and answering.

use crate::error::{MISSING_UPLOAD_MESSAGE, NOT_READY_MESSAGE};
use crate::index::{IndexConfig, VectorIndex};
use crate::ingest::DocumentIngestor;
use crate::memory::ConversationMemory;
use crate::models::{DocumentFingerprint, RetrievedChunk, Role};
use crate::responder::Responder;
use crate::traits::Embedder;
use crate::{IngestError, ResponderError, SessionError};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Empty,
    Processing,
    Ready,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionPolicy {
    /// Clear memory and transcript when a new document is processed.
    pub clear_memory_on_upload: bool,
    /// Keep a question asked before any upload, and the notice, in the transcript.
    pub record_not_ready_exchange: bool,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            clear_memory_on_upload: true,
            record_not_ready_exchange: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub fingerprint: DocumentFingerprint,
    pub chunk_count: usize,
    pub processing_ms: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub role: Role,
    pub text: String,
    pub notice: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    Answered,
    NotReady,
    Rejected,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct Reply {
    pub status: ReplyStatus,
    pub text: String,
    pub sources: Vec<RetrievedChunk>,
}

impl Reply {
    fn notice(status: ReplyStatus, text: impl Into<String>) -> Self {
        Self {
            status,
            text: text.into(),
            sources: Vec::new(),
        }
    }
}

/// State owned by one browser session: at most one index, the memory replayed to
/// the model, and the transcript shown to the user.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    state: SessionState,
    index: Option<VectorIndex>,
    memory: ConversationMemory,
    transcript: Vec<TranscriptEntry>,
    document: Option<DocumentSummary>,
    user: Option<String>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Empty,
            index: None,
            memory: ConversationMemory::new(),
            transcript: Vec::new(),
            document: None,
            user: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn index(&self) -> Option<&VectorIndex> {
        self.index.as_ref()
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    pub fn document(&self) -> Option<&DocumentSummary> {
        self.document.as_ref()
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Gives the session a fresh identifier, e.g. after a privilege change.
    pub fn renew_id(&mut self) -> Uuid {
        self.id = Uuid::new_v4();
        self.id
    }

    pub fn sign_in(&mut self, username: impl Into<String>) {
        self.user = Some(username.into());
    }

    /// Drops the user together with everything processed on their behalf.
    pub fn sign_out(&mut self) {
        self.user = None;
        self.reset();
    }

    fn reset(&mut self) {
        self.state = SessionState::Empty;
        self.index = None;
        self.document = None;
        self.memory.clear();
        self.transcript.clear();
    }

    fn record(&mut self, role: Role, text: impl Into<String>, notice: bool) {
        self.transcript.push(TranscriptEntry {
            role,
            text: text.into(),
            notice,
        });
    }
}

/// Holds a session in `Processing`. Unless `finish` is reached, dropping the
/// guard puts the session back to `Empty`.
struct Processing<'a> {
    session: &'a mut Session,
}

impl<'a> Processing<'a> {
    fn begin(session: &'a mut Session, clear_history: bool) -> Self {
        session.state = SessionState::Processing;
        session.index = None;
        session.document = None;
        if clear_history {
            session.memory.clear();
            session.transcript.clear();
        }
        Self { session }
    }

    fn finish(&mut self, index: VectorIndex, summary: DocumentSummary) {
        self.session.index = Some(index);
        self.session.document = Some(summary);
        self.session.state = SessionState::Ready;
    }
}

impl Drop for Processing<'_> {
    fn drop(&mut self) {
        if self.session.state == SessionState::Processing {
            self.session.state = SessionState::Empty;
            self.session.index = None;
            self.session.document = None;
        }
    }
}

#[derive(Clone)]
pub struct SessionController {
    ingestor: DocumentIngestor,
    embedder: Arc<dyn Embedder>,
    index_config: IndexConfig,
    responder: Responder,
    policy: SessionPolicy,
}

impl SessionController {
    pub fn new(
        ingestor: DocumentIngestor,
        embedder: Arc<dyn Embedder>,
        index_config: IndexConfig,
        responder: Responder,
        policy: SessionPolicy,
    ) -> Self {
        Self {
            ingestor,
            embedder,
            index_config,
            responder,
            policy,
        }
    }

    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    /// Replaces the session's index with one built from `bytes`. Any failure,
    /// including the returned future being dropped mid-build, leaves the
    /// session `Empty` with no index.
    pub async fn process_document(
        &self,
        session: &mut Session,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<DocumentSummary, SessionError> {
        if bytes.is_empty() {
            return Err(IngestError::InvalidArgument(MISSING_UPLOAD_MESSAGE.to_string()).into());
        }

        let started = Instant::now();
        let mut processing = Processing::begin(session, self.policy.clear_memory_on_upload);

        match self.build_index(file_name, bytes).await {
            Ok((index, fingerprint)) => {
                let summary = DocumentSummary {
                    chunk_count: index.len(),
                    fingerprint,
                    processing_ms: started.elapsed().as_millis() as u64,
                };
                processing.finish(index, summary.clone());
                info!(
                    session = %processing.session.id,
                    file = %summary.fingerprint.file_name,
                    pages = summary.fingerprint.page_count,
                    chunks = summary.chunk_count,
                    elapsed_ms = summary.processing_ms,
                    "document processed"
                );
                Ok(summary)
            }
            Err(error) => {
                warn!(
                    session = %processing.session.id,
                    file = %file_name,
                    %error,
                    "document processing failed"
                );
                Err(error)
            }
        }
    }

    async fn build_index(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<(VectorIndex, DocumentFingerprint), SessionError> {
        let ingestor = self.ingestor.clone();
        let name = file_name.to_string();
        let document = tokio::task::spawn_blocking(move || ingestor.ingest(&name, &bytes))
            .await
            .map_err(|error| IngestError::Io(std::io::Error::other(error.to_string())))??;

        let index = VectorIndex::build(
            document.chunks,
            Arc::clone(&self.embedder),
            self.index_config,
        )
        .await?;
        Ok((index, document.fingerprint))
    }

    /// Answers a question for the session. Failures come back as notices rather
    /// than errors; only answered exchanges enter the conversation memory.
    pub async fn ask(&self, session: &mut Session, question: &str) -> Reply {
        let question = question.trim();
        if question.is_empty() {
            return Reply::notice(ReplyStatus::Rejected, "Please enter a question.");
        }

        let result = self
            .responder
            .answer(question, session.index.as_ref(), &session.memory)
            .await;

        match result {
            Ok(answer) => {
                session.memory.append(Role::User, question);
                session.memory.append(Role::Assistant, answer.text.clone());
                session.record(Role::User, question, false);
                session.record(Role::Assistant, answer.text.clone(), false);
                Reply {
                    status: ReplyStatus::Answered,
                    text: answer.text,
                    sources: answer.sources,
                }
            }
            Err(ResponderError::NotReady) => {
                if self.policy.record_not_ready_exchange {
                    session.record(Role::User, question, false);
                    session.record(Role::Assistant, NOT_READY_MESSAGE, true);
                }
                Reply::notice(ReplyStatus::NotReady, NOT_READY_MESSAGE)
            }
            Err(error) => {
                let error = SessionError::from(error);
                warn!(session = %session.id, %error, "answer failed");
                let message = error.user_message();
                session.record(Role::User, question, false);
                session.record(Role::Assistant, message.clone(), true);
                Reply::notice(ReplyStatus::Failed, message)
            }
        }
    }

    /// Empties memory and transcript; the document and index stay.
    pub fn clear_history(&self, session: &mut Session) {
        session.memory.clear();
        session.transcript.clear();
    }
}
