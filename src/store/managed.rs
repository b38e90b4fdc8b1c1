//! Adapter from an externally managed engine to the [`VectorStore`] contract.
//!
//! Existence, creation, deletion and info calls proxy 1:1 to the engine;
//! native faults and result shapes are translated at this boundary and never
//! escape to callers.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{EngineError, Result};
use crate::model::{CollectionInfo, DistanceMetric, RetrievedDocument, VectorRecord};
use crate::store::engine::{EngineFault, EnginePoint, VectorEngine};
use crate::store::VectorStore;

pub struct ManagedIndexStore {
    engine: Arc<dyn VectorEngine>,
    connected: AtomicBool,
}

impl ManagedIndexStore {
    pub fn new(engine: Arc<dyn VectorEngine>) -> Self {
        Self {
            engine,
            connected: AtomicBool::new(false),
        }
    }

    fn ensure_connected(&self) -> Result<()> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(EngineError::Io(
                "managed index store is not connected".to_string(),
            ));
        }
        Ok(())
    }
}

fn translate(fault: EngineFault) -> EngineError {
    match fault {
        EngineFault::CollectionMissing(name) => EngineError::CollectionNotFound(name),
        EngineFault::DimensionMismatch { expected, actual } => {
            EngineError::DimensionMismatch { expected, actual }
        }
        EngineFault::CollectionExists(name) => {
            EngineError::Upstream(format!("engine: collection already exists: {name}"))
        }
        EngineFault::Internal(message) => EngineError::Upstream(format!("engine: {message}")),
    }
}

fn to_point(record: &VectorRecord, fallback_id: i64) -> EnginePoint {
    EnginePoint {
        id: record.id.unwrap_or(fallback_id),
        vector: record.vector.clone(),
        payload: serde_json::json!({
            "text": record.text.clone(),
            "metadata": record.metadata.clone(),
        }),
    }
}

#[async_trait]
impl VectorStore for ManagedIndexStore {
    async fn connect(&self) -> Result<()> {
        self.engine.open().await.map_err(translate)?;
        self.connected.store(true, Ordering::Release);
        tracing::info!("managed index store connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.engine.close().await.map_err(translate)?;
        self.connected.store(false, Ordering::Release);
        tracing::info!("managed index store disconnected");
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        self.ensure_connected()?;
        self.engine.has_collection(name).await.map_err(translate)
    }

    async fn create_collection(
        &self,
        name: &str,
        dimension: usize,
        metric: DistanceMetric,
        reset_if_exists: bool,
    ) -> Result<bool> {
        self.ensure_connected()?;
        let exists = self.engine.has_collection(name).await.map_err(translate)?;
        if exists && !reset_if_exists {
            tracing::info!("collection '{}' already exists", name);
            return Ok(false);
        }
        if exists {
            self.engine.drop_collection(name).await.map_err(translate)?;
            tracing::info!("collection '{}' reset", name);
        }
        self.engine
            .create_collection(name, dimension, metric)
            .await
            .map_err(translate)?;
        tracing::info!(
            "created collection '{}' (dim={}, metric={})",
            name,
            dimension,
            metric
        );
        Ok(true)
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.ensure_connected()?;
        match self.engine.drop_collection(name).await {
            Ok(()) => {
                tracing::info!("collection '{}' deleted", name);
                Ok(())
            }
            Err(EngineFault::CollectionMissing(_)) => {
                tracing::warn!("delete of missing collection '{}' ignored", name);
                Ok(())
            }
            Err(fault) => Err(translate(fault)),
        }
    }

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo> {
        self.ensure_connected()?;
        let info = self
            .engine
            .describe_collection(name)
            .await
            .map_err(translate)?;
        Ok(CollectionInfo {
            name: name.to_string(),
            dimension: info.dimension,
            metric: info.metric,
            vector_count: info.points_count,
        })
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        self.ensure_connected()?;
        self.engine.list_collections().await.map_err(translate)
    }

    async fn insert_many(
        &self,
        name: &str,
        records: Vec<VectorRecord>,
        batch_size: usize,
    ) -> Result<usize> {
        self.ensure_connected()?;
        if !self.engine.has_collection(name).await.map_err(translate)? {
            return Err(EngineError::CollectionNotFound(name.to_string()));
        }

        let batch_size = batch_size.max(1);
        let mut next_id = self
            .engine
            .describe_collection(name)
            .await
            .map_err(translate)?
            .points_count as i64;

        // One upsert per batch, in batch order, through the whole input.
        // Stopping after the first batch would silently discard the rest.
        let mut committed = 0usize;
        for (batch_idx, batch) in records.chunks(batch_size).enumerate() {
            let mut points = Vec::with_capacity(batch.len());
            for record in batch {
                let point = to_point(record, next_id);
                next_id = next_id.max(point.id + 1);
                points.push(point);
            }
            if let Err(fault) = self.engine.upsert(name, points).await {
                tracing::error!(
                    "batch {} of upsert into '{}' failed after {} committed records: {}",
                    batch_idx,
                    name,
                    committed,
                    fault
                );
                return Err(EngineError::PartialBatch {
                    committed,
                    failed_batch: batch_idx,
                    reason: fault.to_string(),
                });
            }
            committed += batch.len();
            tracing::debug!(
                "committed batch {} ({} records) into '{}'",
                batch_idx,
                batch.len(),
                name
            );
        }
        Ok(committed)
    }

    async fn search_by_vector(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<RetrievedDocument>> {
        self.ensure_connected()?;
        let hits = self
            .engine
            .query(name, vector, limit)
            .await
            .map_err(translate)?;
        // Engine ordering is preserved; it is already descending by similarity.
        Ok(hits
            .into_iter()
            .map(|hit| RetrievedDocument {
                score: hit.score,
                text: hit
                    .payload
                    .get("text")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::engine::EmbeddedEngine;

    fn store() -> ManagedIndexStore {
        ManagedIndexStore::new(Arc::new(EmbeddedEngine::new()))
    }

    fn record(id: i64, vector: Vec<f32>, text: &str) -> VectorRecord {
        VectorRecord::new(Some(id), vector, text)
    }

    #[tokio::test]
    async fn operations_fail_until_connected() {
        let store = store();
        assert!(store.collection_exists("c").await.is_err());
        store.connect().await.unwrap();
        assert!(!store.collection_exists("c").await.unwrap());
    }

    #[tokio::test]
    async fn create_is_idempotent_without_reset() {
        let store = store();
        store.connect().await.unwrap();
        assert!(store
            .create_collection("c", 3, DistanceMetric::Cosine, false)
            .await
            .unwrap());
        assert!(!store
            .create_collection("c", 3, DistanceMetric::Cosine, false)
            .await
            .unwrap());
        let info = store.collection_info("c").await.unwrap();
        assert_eq!(info.dimension, 3);
        assert_eq!(info.vector_count, 0);
    }

    #[tokio::test]
    async fn create_with_reset_empties_the_collection() {
        let store = store();
        store.connect().await.unwrap();
        store
            .create_collection("c", 2, DistanceMetric::Cosine, false)
            .await
            .unwrap();
        store
            .insert_many("c", vec![record(0, vec![1.0, 0.0], "a")], 10)
            .await
            .unwrap();
        assert!(store
            .create_collection("c", 2, DistanceMetric::Cosine, true)
            .await
            .unwrap());
        assert_eq!(store.collection_info("c").await.unwrap().vector_count, 0);
    }

    #[tokio::test]
    async fn every_batch_reaches_the_engine() {
        let store = store();
        store.connect().await.unwrap();
        store
            .create_collection("c", 2, DistanceMetric::Euclidean, false)
            .await
            .unwrap();

        let records: Vec<VectorRecord> = (0..120)
            .map(|i| record(i, vec![i as f32, 1.0], &format!("chunk {i}")))
            .collect();
        let inserted = store.insert_many("c", records, 50).await.unwrap();
        assert_eq!(inserted, 120);
        assert_eq!(store.collection_info("c").await.unwrap().vector_count, 120);

        for probe in [0i64, 49, 50, 99, 100, 119] {
            let hits = store
                .search_by_vector("c", &[probe as f32, 1.0], 1)
                .await
                .unwrap();
            assert_eq!(hits[0].text, format!("chunk {probe}"));
        }
    }

    #[tokio::test]
    async fn failed_batch_reports_partial_progress() {
        let store = store();
        store.connect().await.unwrap();
        store
            .create_collection("c", 2, DistanceMetric::Cosine, false)
            .await
            .unwrap();

        // Second batch carries a wrong-dimension record; the first batch must
        // stay committed and the error must say where it stopped.
        let mut records: Vec<VectorRecord> =
            (0..50).map(|i| record(i, vec![1.0, 0.0], "ok")).collect();
        records.push(record(50, vec![1.0, 0.0, 0.0], "bad"));

        let err = store.insert_many("c", records, 50).await.unwrap_err();
        match err {
            EngineError::PartialBatch {
                committed,
                failed_batch,
                ..
            } => {
                assert_eq!(committed, 50);
                assert_eq!(failed_batch, 1);
            }
            other => panic!("expected PartialBatch, got {other:?}"),
        }
        assert_eq!(store.collection_info("c").await.unwrap().vector_count, 50);
    }

    #[tokio::test]
    async fn search_of_missing_collection_is_not_found() {
        let store = store();
        store.connect().await.unwrap();
        let err = store
            .search_by_vector("ghost", &[1.0, 0.0], 5)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::CollectionNotFound(_)));
    }

    #[tokio::test]
    async fn delete_of_missing_collection_is_a_noop() {
        let store = store();
        store.connect().await.unwrap();
        store.delete_collection("ghost").await.unwrap();
        assert!(!store.collection_exists("ghost").await.unwrap());
    }

    #[tokio::test]
    async fn hits_keep_engine_order_and_text() {
        let store = store();
        store.connect().await.unwrap();
        store
            .create_collection("c", 3, DistanceMetric::Cosine, false)
            .await
            .unwrap();
        store
            .insert_many(
                "c",
                vec![
                    record(0, vec![1.0, 0.0, 0.0], "x axis"),
                    record(1, vec![0.0, 1.0, 0.0], "y axis"),
                    record(2, vec![0.0, 0.0, 1.0], "z axis"),
                ],
                10,
            )
            .await
            .unwrap();

        let hits = store
            .search_by_vector("c", &[0.9, 0.1, 0.0], 3)
            .await
            .unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].text, "x axis");
        assert!(hits[0].score > hits[1].score);
    }
}
