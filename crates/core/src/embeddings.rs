use crate::traits::Embedder;
use crate::EmbeddingError;
use async_trait::async_trait;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 128;

/// Offline embedder. Text is split into lowercase words, each word is framed
/// as `^word$` and its character trigrams are hashed into a fixed number of
/// buckets. Punctuation and spacing never produce features of their own.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

const WORD_START: char = '^';
const WORD_END: char = '$';

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
}

/// FNV-1a over the UTF-8 encoding of a character run.
fn bucket_of(gram: &[char], buckets: usize) -> usize {
    let mut buf = [0u8; 4];
    let hash = gram.iter().fold(0xcbf2_9ce4_8422_2325u64, |hash, c| {
        c.encode_utf8(&mut buf)
            .bytes()
            .fold(hash, |hash, byte| (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3))
    });
    (hash % buckets as u64) as usize
}

impl CharacterNgramEmbedder {
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let buckets = self.dimensions.max(1);
        let mut vector = vec![0f32; buckets];

        for word in words(text) {
            let framed: Vec<char> = std::iter::once(WORD_START)
                .chain(word.chars())
                .chain(std::iter::once(WORD_END))
                .collect();
            for gram in framed.windows(3) {
                vector[bucket_of(gram, buckets)] += 1.0;
            }
        }

        let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|value| *value /= norm);
        }
        vector
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions.max(1)
    }

    async fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(inputs.iter().map(|text| self.embed_text(text)).collect())
    }
}
