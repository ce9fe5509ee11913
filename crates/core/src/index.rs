use crate::models::{Chunk, RetrievedChunk};
use crate::traits::Embedder;
use crate::EmbeddingError;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Distance {
    /// Euclidean distance, the metric of a flat L2 index.
    #[default]
    L2,
    /// `1 - cosine similarity`.
    Cosine,
}

impl Distance {
    pub fn between(&self, left: &[f32], right: &[f32]) -> f32 {
        match self {
            Distance::L2 => left
                .iter()
                .zip(right)
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f32>()
                .sqrt(),
            Distance::Cosine => {
                let dot = left.iter().zip(right).map(|(a, b)| a * b).sum::<f32>();
                let left_norm = left.iter().map(|a| a * a).sum::<f32>().sqrt();
                let right_norm = right.iter().map(|b| b * b).sum::<f32>().sqrt();
                if left_norm == 0.0 || right_norm == 0.0 {
                    1.0
                } else {
                    1.0 - dot / (left_norm * right_norm)
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IndexConfig {
    pub distance: Distance,
    /// Inputs per embedding call while building.
    pub batch_size: usize,
    /// Embedding calls in flight while building.
    pub concurrency: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            distance: Distance::L2,
            batch_size: 64,
            concurrency: 4,
        }
    }
}

/// Exact nearest-neighbour index over one document's chunks. Immutable once
/// built; a new document gets a new index.
pub struct VectorIndex {
    entries: Vec<(Chunk, Vec<f32>)>,
    embedder: Arc<dyn Embedder>,
    distance: Distance,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("entries", &self.entries.len())
            .field("distance", &self.distance)
            .finish()
    }
}

impl VectorIndex {
    /// Embeds every chunk. Batches may be embedded concurrently but vectors stay
    /// aligned with chunk order; any failed call fails the whole build.
    pub async fn build(
        chunks: Vec<Chunk>,
        embedder: Arc<dyn Embedder>,
        config: IndexConfig,
    ) -> Result<Self, EmbeddingError> {
        let batch_size = config.batch_size.max(1);
        let batches: Vec<Vec<&str>> = chunks
            .chunks(batch_size)
            .map(|batch| batch.iter().map(|chunk| chunk.text.as_str()).collect())
            .collect();

        let embedded: Vec<Vec<Vec<f32>>> = stream::iter(batches)
            .map(|batch| {
                let embedder = Arc::clone(&embedder);
                async move { embedder.embed_batch(&batch).await }
            })
            .buffered(config.concurrency.max(1))
            .boxed()
            .try_collect()
            .await?;

        let vectors: Vec<Vec<f32>> = embedded.into_iter().flatten().collect();
        if vectors.len() != chunks.len() {
            return Err(EmbeddingError::Response(format!(
                "received {} embeddings for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }
        if let Some(first) = vectors.first() {
            if vectors.iter().any(|vector| vector.len() != first.len()) {
                return Err(EmbeddingError::Response(
                    "embedding dimensions are inconsistent".to_string(),
                ));
            }
        }

        info!(chunks = chunks.len(), distance = ?config.distance, "vector index built");

        Ok(Self {
            entries: chunks.into_iter().zip(vectors).collect(),
            embedder,
            distance: config.distance,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn distance(&self) -> Distance {
        self.distance
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|(chunk, _)| chunk)
    }

    /// Embeds `text` and returns at most `k` chunks by ascending distance.
    /// Equal distances keep insertion order.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<RetrievedChunk>, EmbeddingError> {
        if k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed(text).await?;
        Ok(self.nearest(&query_vector, k))
    }

    pub fn nearest(&self, query_vector: &[f32], k: usize) -> Vec<RetrievedChunk> {
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, (_, vector))| (position, self.distance.between(query_vector, vector)))
            .collect();

        scored.sort_by(|left, right| left.1.total_cmp(&right.1));
        scored
            .into_iter()
            .take(k)
            .map(|(position, distance)| RetrievedChunk {
                chunk: self.entries[position].0.clone(),
                distance,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn chunk(index: u64, text: &str) -> Chunk {
        Chunk {
            chunk_id: format!("chunk-{index}"),
            document_id: "doc".to_string(),
            page: 1,
            offset: index as usize * 10,
            chunk_index: index,
            text: text.to_string(),
        }
    }

    struct FailingEmbedder {
        calls: AtomicUsize,
        fail_on: usize,
    }

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn dimensions(&self) -> usize {
            2
        }

        async fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == self.fail_on {
                return Err(EmbeddingError::Api {
                    status: 429,
                    message: "rate limited".to_string(),
                });
            }
            Ok(inputs.iter().map(|_| vec![0.0, 1.0]).collect())
        }
    }

    /// Maps "x=<n>" to the vector [n, 0].
    struct AxisEmbedder;

    #[async_trait]
    impl Embedder for AxisEmbedder {
        fn dimensions(&self) -> usize {
            2
        }

        async fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(inputs
                .iter()
                .map(|text| {
                    let value = text
                        .strip_prefix("x=")
                        .and_then(|raw| raw.parse::<f32>().ok())
                        .unwrap_or_default();
                    vec![value, 0.0]
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn exact_text_is_its_own_nearest_neighbour() {
        let chunks = vec![
            chunk(0, "Replace the air filter every 500 hours."),
            chunk(1, "The warranty does not cover misuse."),
            chunk(2, "Hydraulic oil must be ISO VG 46."),
        ];
        let index = VectorIndex::build(
            chunks,
            Arc::new(CharacterNgramEmbedder::default()),
            IndexConfig::default(),
        )
        .await
        .expect("index should build");

        let hits = index
            .query("Hydraulic oil must be ISO VG 46.", 2)
            .await
            .expect("query should succeed");

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.chunk_id, "chunk-2");
        assert!(hits[0].distance.abs() < 1e-5);
        assert!(hits[0].distance <= hits[1].distance);
    }

    #[tokio::test]
    async fn results_are_sorted_and_ties_keep_insertion_order() {
        let chunks = vec![
            chunk(0, "x=3"),
            chunk(1, "x=1"),
            chunk(2, "x=-1"),
            chunk(3, "x=5"),
        ];
        let config = IndexConfig {
            batch_size: 1,
            ..IndexConfig::default()
        };
        let index = VectorIndex::build(chunks, Arc::new(AxisEmbedder), config)
            .await
            .expect("index should build");

        let hits = index.query("x=0", 10).await.expect("query");
        let order: Vec<u64> = hits.iter().map(|hit| hit.chunk.chunk_index).collect();
        assert_eq!(order, vec![1, 2, 0, 3]);
        assert_eq!(hits[0].distance, hits[1].distance);
    }

    #[tokio::test]
    async fn query_returns_at_most_k() {
        let chunks = (0..5).map(|index| chunk(index, &format!("x={index}"))).collect();
        let index = VectorIndex::build(chunks, Arc::new(AxisEmbedder), IndexConfig::default())
            .await
            .expect("index should build");

        assert_eq!(index.len(), 5);
        assert_eq!(index.query("x=2", 3).await.expect("query").len(), 3);
        assert!(index.query("x=2", 0).await.expect("query").is_empty());
    }

    #[tokio::test]
    async fn vectors_stay_aligned_with_chunks_across_batches() {
        let chunks: Vec<Chunk> = (0..10).map(|index| chunk(index, &format!("x={index}"))).collect();
        let config = IndexConfig {
            distance: Distance::L2,
            batch_size: 3,
            concurrency: 4,
        };
        let index = VectorIndex::build(chunks, Arc::new(AxisEmbedder), config)
            .await
            .expect("index should build");

        for hit in index.nearest(&[7.0, 0.0], 1) {
            assert_eq!(hit.chunk.chunk_index, 7);
        }
    }

    #[tokio::test]
    async fn any_failed_embedding_call_fails_the_build() {
        let chunks = (0..6).map(|index| chunk(index, "text")).collect();
        let embedder = Arc::new(FailingEmbedder {
            calls: AtomicUsize::new(0),
            fail_on: 1,
        });
        let config = IndexConfig {
            batch_size: 2,
            concurrency: 1,
            ..IndexConfig::default()
        };

        let result = VectorIndex::build(chunks, embedder, config).await;
        assert!(matches!(result, Err(EmbeddingError::Api { status: 429, .. })));
    }

    #[test]
    fn cosine_distance_of_parallel_vectors_is_zero() {
        let distance = Distance::Cosine.between(&[1.0, 2.0], &[2.0, 4.0]);
        assert!(distance.abs() < 1e-6);
        assert_eq!(Distance::Cosine.between(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
        assert_eq!(Distance::L2.between(&[0.0, 0.0], &[3.0, 4.0]), 5.0);
    }
}
