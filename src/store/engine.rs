//! Native contract of an externally managed vector engine.
//!
//! The engine owns its storage and concurrency; this crate only issues calls
//! and translates results. [`EmbeddedEngine`] is the in-process
//! implementation used by default and in tests; a remote engine client
//! implements the same trait.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::model::{normalize_l2, DistanceMetric};

/// Failure shape native to the engine, translated by the adapter.
#[derive(Debug, Error)]
pub enum EngineFault {
    #[error("collection missing: {0}")]
    CollectionMissing(String),

    #[error("collection already exists: {0}")]
    CollectionExists(String),

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("engine internal error: {0}")]
    Internal(String),
}

/// One point as the engine stores it: vector plus an opaque payload document.
#[derive(Debug, Clone)]
pub struct EnginePoint {
    pub id: i64,
    pub vector: Vec<f32>,
    pub payload: serde_json::Value,
}

/// One hit as the engine returns it, already scored higher-is-better.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    pub id: i64,
    pub score: f32,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct EngineCollectionInfo {
    pub dimension: usize,
    pub metric: DistanceMetric,
    pub points_count: usize,
}

#[async_trait]
pub trait VectorEngine: Send + Sync {
    async fn open(&self) -> Result<(), EngineFault>;
    async fn close(&self) -> Result<(), EngineFault>;
    async fn has_collection(&self, name: &str) -> Result<bool, EngineFault>;
    async fn create_collection(
        &self,
        name: &str,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<(), EngineFault>;
    async fn drop_collection(&self, name: &str) -> Result<(), EngineFault>;
    async fn describe_collection(&self, name: &str) -> Result<EngineCollectionInfo, EngineFault>;
    async fn list_collections(&self) -> Result<Vec<String>, EngineFault>;
    /// Insert-or-replace `points`. Every point must match the collection
    /// dimension; on any mismatch the whole call is rejected.
    async fn upsert(&self, name: &str, points: Vec<EnginePoint>) -> Result<(), EngineFault>;
    /// Top-`limit` points by descending similarity, ties broken by ascending
    /// point id.
    async fn query(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, EngineFault>;
}

struct StoredPoint {
    vector: Vec<f32>,
    payload: serde_json::Value,
}

struct EngineCollection {
    dimension: usize,
    metric: DistanceMetric,
    points: BTreeMap<i64, StoredPoint>,
}

impl EngineCollection {
    fn score(&self, query: &[f32], point: &StoredPoint) -> f32 {
        match self.metric {
            // Stored cosine vectors are unit length; the caller's query is
            // normalized in `query()` before scoring.
            DistanceMetric::Cosine | DistanceMetric::Dot => dot(query, &point.vector),
            DistanceMetric::Euclidean => {
                let d2: f32 = query
                    .iter()
                    .zip(point.vector.iter())
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum();
                1.0 / (1.0 + d2)
            }
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// In-process engine: a `RwLock`-guarded collection map. Readers proceed
/// concurrently; writers are exclusive per the engine's own policy.
#[derive(Default)]
pub struct EmbeddedEngine {
    collections: RwLock<HashMap<String, EngineCollection>>,
}

impl EmbeddedEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorEngine for EmbeddedEngine {
    async fn open(&self) -> Result<(), EngineFault> {
        Ok(())
    }

    async fn close(&self) -> Result<(), EngineFault> {
        Ok(())
    }

    async fn has_collection(&self, name: &str) -> Result<bool, EngineFault> {
        Ok(self.collections.read().await.contains_key(name))
    }

    async fn create_collection(
        &self,
        name: &str,
        dimension: usize,
        metric: DistanceMetric,
    ) -> Result<(), EngineFault> {
        let mut collections = self.collections.write().await;
        if collections.contains_key(name) {
            return Err(EngineFault::CollectionExists(name.to_string()));
        }
        collections.insert(
            name.to_string(),
            EngineCollection {
                dimension,
                metric,
                points: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> Result<(), EngineFault> {
        let mut collections = self.collections.write().await;
        if collections.remove(name).is_none() {
            return Err(EngineFault::CollectionMissing(name.to_string()));
        }
        Ok(())
    }

    async fn describe_collection(&self, name: &str) -> Result<EngineCollectionInfo, EngineFault> {
        let collections = self.collections.read().await;
        let collection = collections
            .get(name)
            .ok_or_else(|| EngineFault::CollectionMissing(name.to_string()))?;
        Ok(EngineCollectionInfo {
            dimension: collection.dimension,
            metric: collection.metric,
            points_count: collection.points.len(),
        })
    }

    async fn list_collections(&self) -> Result<Vec<String>, EngineFault> {
        let mut names: Vec<String> = self.collections.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn upsert(&self, name: &str, points: Vec<EnginePoint>) -> Result<(), EngineFault> {
        let mut collections = self.collections.write().await;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| EngineFault::CollectionMissing(name.to_string()))?;

        for point in &points {
            if point.vector.len() != collection.dimension {
                return Err(EngineFault::DimensionMismatch {
                    expected: collection.dimension,
                    actual: point.vector.len(),
                });
            }
        }

        for point in points {
            let mut vector = point.vector;
            if collection.metric.normalizes() {
                normalize_l2(&mut vector);
            }
            collection.points.insert(
                point.id,
                StoredPoint {
                    vector,
                    payload: point.payload,
                },
            );
        }
        Ok(())
    }

    async fn query(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, EngineFault> {
        let collections = self.collections.read().await;
        let collection = collections
            .get(name)
            .ok_or_else(|| EngineFault::CollectionMissing(name.to_string()))?;
        if vector.len() != collection.dimension {
            return Err(EngineFault::DimensionMismatch {
                expected: collection.dimension,
                actual: vector.len(),
            });
        }

        let mut query = vector.to_vec();
        if collection.metric.normalizes() {
            normalize_l2(&mut query);
        }

        let mut hits: Vec<ScoredPoint> = collection
            .points
            .iter()
            .map(|(id, point)| ScoredPoint {
                id: *id,
                score: collection.score(&query, point),
                payload: point.payload.clone(),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(limit);
        Ok(hits)
    }
}
