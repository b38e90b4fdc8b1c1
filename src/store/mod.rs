//! Backend-agnostic vector index store contract and the backend factory.

use async_trait::async_trait;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::{EngineError, Result};
use crate::model::{CollectionInfo, DistanceMetric, RetrievedDocument, VectorRecord};

pub mod engine;
pub mod flat;
pub mod managed;

pub use engine::{EmbeddedEngine, VectorEngine};
pub use flat::FlatIndexStore;
pub use managed::ManagedIndexStore;

/// Uniform contract over every vector index backend.
///
/// Implementations guarantee collection-level consistency under concurrent
/// mutation; callers see the same failure semantics regardless of backend.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Acquire backend resources. Idempotent.
    async fn connect(&self) -> Result<()>;

    /// Release backend resources. The store is unusable until reconnected.
    async fn disconnect(&self) -> Result<()>;

    /// Never fails for a missing collection; that is `Ok(false)`.
    async fn collection_exists(&self, name: &str) -> Result<bool>;

    /// Create `name` with the given dimension and metric, both fixed for the
    /// collection's lifetime. With `reset_if_exists` an existing collection is
    /// deleted and recreated empty. Returns `false` (not an error) when the
    /// collection already exists and no reset was requested.
    async fn create_collection(
        &self,
        name: &str,
        dimension: usize,
        metric: DistanceMetric,
        reset_if_exists: bool,
    ) -> Result<bool>;

    /// Remove the collection and all its records. Deleting a missing
    /// collection is a logged no-op.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo>;

    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Insert `records` in batches of at most `batch_size`, committing each
    /// batch fully before the next begins. On a batch failure the operation
    /// stops and reports the count committed so far via
    /// [`EngineError::PartialBatch`]; it never reports success for records
    /// that were not persisted.
    async fn insert_many(
        &self,
        name: &str,
        records: Vec<VectorRecord>,
        batch_size: usize,
    ) -> Result<usize>;

    async fn insert_one(&self, name: &str, record: VectorRecord) -> Result<usize> {
        self.insert_many(name, vec![record], 1).await
    }

    /// Top-`limit` nearest neighbors of `vector`, sorted by descending
    /// similarity (higher is better for every metric). An existing collection
    /// with no matching vectors yields an empty vec; a missing collection
    /// fails with [`EngineError::CollectionNotFound`].
    async fn search_by_vector(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<RetrievedDocument>>;
}

/// The closed set of available backends. Adding one means a new variant and a
/// new implementation, not another conditional chain in callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    FlatIndex,
    ManagedIndex,
}

impl FromStr for BackendKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "flat" | "faiss" => Ok(BackendKind::FlatIndex),
            "managed" | "embedded" => Ok(BackendKind::ManagedIndex),
            other => Err(EngineError::Unsupported(format!(
                "vector store backend: {other}"
            ))),
        }
    }
}

/// Build the configured store. The managed backend runs over the in-process
/// embedded engine; callers wiring a remote engine construct
/// [`ManagedIndexStore`] directly.
pub fn build_store(config: &AppConfig) -> Result<Arc<dyn VectorStore>> {
    let kind: BackendKind = config.vector_db_backend.parse()?;
    let store: Arc<dyn VectorStore> = match kind {
        BackendKind::FlatIndex => Arc::new(FlatIndexStore::new(&config.vector_db_path)),
        BackendKind::ManagedIndex => {
            Arc::new(ManagedIndexStore::new(Arc::new(EmbeddedEngine::new())))
        }
    };
    Ok(store)
}
