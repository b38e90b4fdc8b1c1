//! Batched ingestion of content chunks into a project's collection.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::defaults;
use crate::error::{EngineError, Result};
use crate::model::{Chunk, CollectionInfo, DistanceMetric, VectorRecord};
use crate::naming::collection_name;
use crate::providers::{EmbedKind, EmbeddingProvider};
use crate::store::VectorStore;

/// Embeds and upserts chunks batch by batch. Batches are strictly sequential:
/// a failed batch stops the run, and the error reports how many chunks were
/// committed before it and which batch failed. Retrying is the caller's call.
pub struct IndexingPipeline {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    metric: DistanceMetric,
    batch_size: usize,
}

impl IndexingPipeline {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            store,
            embedder,
            metric: DistanceMetric::Cosine,
            batch_size: defaults::DEFAULT_BATCH_SIZE,
        }
    }

    /// Wire up from configuration. Fails with `Unsupported` when the
    /// configured distance method is unknown.
    pub fn from_config(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: &AppConfig,
    ) -> Result<Self> {
        let metric: DistanceMetric = config.vector_db_distance_method.parse()?;
        Ok(Self::new(store, embedder)
            .with_metric(metric)
            .with_batch_size(config.index_batch_size))
    }

    pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = metric;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Index `chunks` into the project's collection, creating it if absent
    /// (dimension comes from the embedding provider) and resetting it first
    /// when `reset` is set. Returns the number of chunks indexed.
    ///
    /// Record ids increase monotonically with chunk position; a chunk that
    /// carries its own id keeps it.
    pub async fn index_project(
        &self,
        project_id: &str,
        chunks: &[Chunk],
        reset: bool,
    ) -> Result<usize> {
        let collection = collection_name(project_id);
        self.store
            .create_collection(&collection, self.embedder.dimension(), self.metric, reset)
            .await?;

        let mut committed = 0usize;
        for (batch_idx, batch) in chunks.chunks(self.batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
            let vectors = match self.embedder.embed(&texts, EmbedKind::Document).await {
                Ok(vectors) if vectors.len() == batch.len() => vectors,
                Ok(vectors) => {
                    return Err(EngineError::PartialBatch {
                        committed,
                        failed_batch: batch_idx,
                        reason: format!(
                            "embedding provider returned {} vectors for {} texts",
                            vectors.len(),
                            batch.len()
                        ),
                    });
                }
                Err(err) => {
                    return Err(EngineError::PartialBatch {
                        committed,
                        failed_batch: batch_idx,
                        reason: format!("embedding request failed: {err}"),
                    });
                }
            };

            let base = (batch_idx * self.batch_size) as i64;
            let records: Vec<VectorRecord> = batch
                .iter()
                .zip(vectors)
                .enumerate()
                .map(|(offset, (chunk, vector))| {
                    let id = chunk.id.unwrap_or(base + offset as i64);
                    VectorRecord::new(Some(id), vector, chunk.text.clone())
                        .with_metadata(chunk.metadata.clone())
                })
                .collect();

            match self.store.insert_many(&collection, records, self.batch_size).await {
                Ok(inserted) => committed += inserted,
                Err(EngineError::PartialBatch {
                    committed: batch_committed,
                    reason,
                    ..
                }) => {
                    return Err(EngineError::PartialBatch {
                        committed: committed + batch_committed,
                        failed_batch: batch_idx,
                        reason,
                    });
                }
                Err(err) => {
                    return Err(EngineError::PartialBatch {
                        committed,
                        failed_batch: batch_idx,
                        reason: err.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            "indexed {} chunks into '{}' in batches of {}",
            committed,
            collection,
            self.batch_size
        );
        Ok(committed)
    }

    /// Drop the project's collection if it exists.
    pub async fn reset_collection(&self, project_id: &str) -> Result<()> {
        let collection = collection_name(project_id);
        if self.store.collection_exists(&collection).await? {
            self.store.delete_collection(&collection).await?;
        }
        Ok(())
    }

    pub async fn collection_info(&self, project_id: &str) -> Result<CollectionInfo> {
        self.store
            .collection_info(&collection_name(project_id))
            .await
    }
}
