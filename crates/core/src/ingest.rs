use crate::chunking::{build_chunks, ChunkingConfig};
use crate::extractor::{extract_page_texts, looks_like_pdf, LopdfExtractor, PdfExtractor};
use crate::{Chunk, DocumentFingerprint, IngestError};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct IngestedDocument {
    pub fingerprint: DocumentFingerprint,
    pub chunks: Vec<Chunk>,
}

#[derive(Clone)]
pub struct DocumentIngestor {
    extractor: Arc<dyn PdfExtractor>,
    config: ChunkingConfig,
}

impl Default for DocumentIngestor {
    fn default() -> Self {
        Self::new(Arc::new(LopdfExtractor), ChunkingConfig::default())
    }
}

impl DocumentIngestor {
    pub fn new(extractor: Arc<dyn PdfExtractor>, config: ChunkingConfig) -> Self {
        Self { extractor, config }
    }

    pub fn config(&self) -> ChunkingConfig {
        self.config
    }

    /// Extracts page text from an uploaded PDF and splits each page into
    /// overlapping windows. Chunks are numbered across pages in page order.
    pub fn ingest(&self, file_name: &str, bytes: &[u8]) -> Result<IngestedDocument, IngestError> {
        self.config.validate()?;

        if bytes.is_empty() {
            return Err(IngestError::InvalidArgument(
                "uploaded file is empty".to_string(),
            ));
        }
        if !looks_like_pdf(bytes) {
            return Err(IngestError::InvalidArgument(
                "uploaded file is not a PDF document".to_string(),
            ));
        }

        let pages = extract_page_texts(self.extractor.as_ref(), bytes)?;
        let checksum = digest_bytes(bytes);
        let fingerprint = DocumentFingerprint {
            document_id: checksum.clone(),
            file_name: file_name.to_string(),
            checksum,
            byte_len: bytes.len(),
            page_count: pages.len(),
            ingested_at: Utc::now(),
        };

        let mut chunks = Vec::new();
        let mut cursor = 0u64;
        for page in pages {
            let (page_chunks, next_cursor) =
                build_chunks(&fingerprint, page.number, &page.text, self.config, cursor)?;
            debug!(page = page.number, chunks = page_chunks.len(), "page chunked");
            cursor = next_cursor;
            chunks.extend(page_chunks);
        }

        Ok(IngestedDocument {
            fingerprint,
            chunks,
        })
    }
}

pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
