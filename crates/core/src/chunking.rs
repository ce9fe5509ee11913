use crate::error::IngestError;
use crate::models::{Chunk, DocumentFingerprint};
use sha2::{Digest, Sha256};

pub const DEFAULT_CHUNK_SIZE: usize = 1_000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_CHUNK_SIZE,
            overlap_chars: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.max_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk size must be positive".to_string(),
            ));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than chunk size {}",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(())
    }

    fn stride(&self) -> usize {
        self.max_chars - self.overlap_chars
    }
}

/// Sliding character window. Returns `(char_offset, text)` pairs; window `i + 1`
/// starts `max_chars - overlap_chars` characters after window `i`, and the last
/// window always ends at the end of the text.
pub fn sliding_windows(text: &str, config: ChunkingConfig) -> Vec<(usize, String)> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let mut windows = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + config.max_chars).min(chars.len());
        windows.push((start, chars[start..end].iter().collect()));
        if end == chars.len() {
            break;
        }
        start += config.stride();
    }

    windows
}

pub fn build_chunks(
    document: &DocumentFingerprint,
    page: u32,
    page_text: &str,
    config: ChunkingConfig,
    global_index: u64,
) -> Result<(Vec<Chunk>, u64), IngestError> {
    config.validate()?;

    let mut chunks = Vec::new();
    let mut cursor = global_index;

    for (offset, text) in sliding_windows(page_text, config) {
        chunks.push(Chunk {
            chunk_id: make_chunk_id(&document.document_id, page, cursor, &text),
            document_id: document.document_id.clone(),
            page,
            offset,
            chunk_index: cursor,
            text,
        });
        cursor = cursor.saturating_add(1);
    }

    Ok((chunks, cursor))
}

fn make_chunk_id(document_id: &str, page: u32, index: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(page.to_le_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fingerprint() -> DocumentFingerprint {
        DocumentFingerprint {
            document_id: "doc-1".to_string(),
            file_name: "manual.pdf".to_string(),
            checksum: "checksum".to_string(),
            byte_len: 0,
            page_count: 1,
            ingested_at: chrono::Utc::now(),
        }
    }

    fn sample_text(len: usize) -> String {
        (0..len)
            .map(|index| char::from(b'a' + (index % 26) as u8))
            .collect()
    }

    #[test]
    fn windows_have_fixed_length_and_overlap() {
        let text = sample_text(2_500);
        let windows = sliding_windows(&text, ChunkingConfig::default());

        let offsets: Vec<usize> = windows.iter().map(|(offset, _)| *offset).collect();
        assert_eq!(offsets, vec![0, 800, 1_600]);

        for (_, piece) in &windows[..windows.len() - 1] {
            assert_eq!(piece.chars().count(), 1_000);
        }
        assert_eq!(windows[2].1.chars().count(), 900);

        for pair in windows.windows(2) {
            let previous: Vec<char> = pair[0].1.chars().collect();
            let next: Vec<char> = pair[1].1.chars().collect();
            assert_eq!(previous[previous.len() - 200..], next[..200]);
        }
    }

    #[test]
    fn windows_cover_every_character() {
        let text = "Überdruckventil prüfen. ".repeat(97);
        let config = ChunkingConfig {
            max_chars: 64,
            overlap_chars: 16,
        };

        let chars: Vec<char> = text.chars().collect();
        let mut covered = vec![false; chars.len()];
        for (offset, piece) in sliding_windows(&text, config) {
            let piece: Vec<char> = piece.chars().collect();
            assert_eq!(chars[offset..offset + piece.len()], piece[..]);
            for slot in covered.iter_mut().skip(offset).take(piece.len()) {
                *slot = true;
            }
        }
        assert!(covered.into_iter().all(|seen| seen));
    }

    #[test]
    fn text_shorter_than_overlap_yields_single_chunk() {
        let windows = sliding_windows("short page", ChunkingConfig::default());
        assert_eq!(windows, vec![(0, "short page".to_string())]);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(sliding_windows("", ChunkingConfig::default()).is_empty());
    }

    #[test]
    fn overlap_must_be_smaller_than_size() {
        let config = ChunkingConfig {
            max_chars: 100,
            overlap_chars: 100,
        };
        let result = build_chunks(&fingerprint(), 1, "text", config, 0);
        assert!(matches!(result, Err(IngestError::InvalidChunkConfig(_))));
    }

    #[test]
    fn chunks_carry_provenance_and_running_index() {
        let config = ChunkingConfig {
            max_chars: 20,
            overlap_chars: 5,
        };
        let text = sample_text(50);
        let (chunks, next) = build_chunks(&fingerprint(), 3, &text, config, 7).expect("chunks");

        assert_eq!(chunks.len(), 3);
        assert_eq!(next, 10);
        assert_eq!(chunks[0].chunk_index, 7);
        assert_eq!(chunks[1].offset, 15);
        assert!(chunks.iter().all(|chunk| chunk.page == 3));
        assert!(chunks.iter().all(|chunk| chunk.document_id == "doc-1"));
        assert_ne!(chunks[0].chunk_id, chunks[1].chunk_id);
    }
}
